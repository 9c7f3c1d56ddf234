//! Marker replacement.
//!
//! Each resolved marker is replaced by a caption block. The block comes from
//! one of two templates:
//!
//! - **Default**: built in, rendered with [maud](https://maud.lambda.xyz/).
//!   Escaping is automatic and the markup is checked at compile time.
//! - **Override**: a file looked up by name through a [`TemplateRegistry`].
//!   If the name cannot be resolved the error is logged and the default is
//!   used; a missing template never fails a build.
//!
//! ## Default markup
//!
//! ```html
//! <p class="caption-container">
//!   <a class="caption" href="{url}" target="_blank">
//!     <img class="img-polaroid" src="{raw_url}" alt="{title}" title="{title}" width="{width}" height="{height}">
//!   </a>
//!   <span class="caption-text muted">{title}</span>
//! </p>
//! ```
//!
//! `width`/`height` appear only with `include_dimensions` and only when the
//! record has them.
//!
//! ## Override templates
//!
//! Plain text with two constructs:
//!
//! - `{{ name }}` is replaced by the HTML-escaped value of `name`, or
//!   nothing if `name` is unknown.
//! - `{% if name %}...{% endif %}` keeps its body only if `name` is set and
//!   not `false`, `0` or empty. Blocks do not nest.
//!
//! Variables are the record fields (`title`, `raw_url`, `url`, `width`,
//! `height`, `rotation`), `include_dimensions`, and everything in the
//! `[render.context]` config table. Record fields win over context entries
//! of the same name.

use crate::cache::{PhotoCache, PhotoRecord};
use crate::config::RenderConfig;
use crate::tag::{self, PhotoKey};
use maud::{Markup, html};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, error};

static IF_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{%-?\s*if\s+([A-Za-z_][A-Za-z0-9_]*)\s*-?%\}(.*?)\{%-?\s*endif\s*-?%\}")
        .unwrap()
});

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// A named override template could not be resolved.
#[derive(Error, Debug)]
#[error("template \"{name}\" not found: {reason}")]
pub struct TemplateNotFound {
    pub name: String,
    pub reason: String,
}

/// Lookup of override templates by name.
pub trait TemplateRegistry {
    /// Return the template source for `name`.
    fn get_template(&self, name: &str) -> Result<String, TemplateNotFound>;
}

/// Templates stored as files in one directory.
#[derive(Debug, Clone)]
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateRegistry for DirRegistry {
    fn get_template(&self, name: &str) -> Result<String, TemplateNotFound> {
        let path = self.root.join(name);
        std::fs::read_to_string(&path).map_err(|e| TemplateNotFound {
            name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

/// The template a pass renders with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Default,
    Custom { name: String, source: String },
}

impl Template {
    /// Name for diagnostics: the override's file name, or `default`.
    pub fn name(&self) -> &str {
        match self {
            Template::Default => "default",
            Template::Custom { name, .. } => name,
        }
    }
}

/// Resolve the configured template, falling back to the default.
pub fn resolve_template(registry: &impl TemplateRegistry, name: Option<&str>) -> Template {
    let Some(name) = name else {
        return Template::Default;
    };
    match registry.get_template(name) {
        Ok(source) => {
            debug!("Using custom template {}", name);
            Template::Custom {
                name: name.to_string(),
                source,
            }
        }
        Err(e) => {
            error!("Unable to find the custom template {}: {}", name, e.reason);
            Template::Default
        }
    }
}

/// Build-level values available while rendering, beyond the record itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub include_dimensions: bool,
    pub extra: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn from_render_config(config: &RenderConfig) -> Self {
        Self {
            include_dimensions: config.include_dimensions,
            extra: config.context.clone(),
        }
    }
}

/// Render the caption block for one record.
pub fn render(template: &Template, record: &PhotoRecord, ctx: &RenderContext) -> String {
    match template {
        Template::Default => render_default(record, ctx).into_string(),
        Template::Custom { source, .. } => render_custom(source, record, ctx),
    }
}

fn render_default(record: &PhotoRecord, ctx: &RenderContext) -> Markup {
    let (width, height) = if ctx.include_dimensions {
        (record.width, record.height)
    } else {
        (None, None)
    };
    html! {
        p.caption-container {
            a.caption href=(record.url) target="_blank" {
                img.img-polaroid src=(record.raw_url) alt=(record.title) title=(record.title)
                    width=[width] height=[height];
            }
            span.caption-text.muted { (record.title) }
        }
    }
}

fn render_custom(source: &str, record: &PhotoRecord, ctx: &RenderContext) -> String {
    let lookup = |name: &str| -> Option<String> {
        match name {
            "title" => Some(record.title.clone()),
            "raw_url" => Some(record.raw_url.clone()),
            "url" => Some(record.url.clone()),
            "width" => record.width.map(|w| w.to_string()),
            "height" => record.height.map(|h| h.to_string()),
            "rotation" => record.rotation.map(|r| r.to_string()),
            "include_dimensions" => Some(ctx.include_dimensions.to_string()),
            other => ctx.extra.get(other).cloned(),
        }
    };

    let with_blocks = IF_BLOCK.replace_all(source, |caps: &Captures| {
        let keep = lookup(&caps[1]).is_some_and(|v| is_truthy(&v));
        if keep {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    PLACEHOLDER
        .replace_all(&with_blocks, |caps: &Captures| {
            lookup(&caps[1]).map(|v| escape(&v)).unwrap_or_default()
        })
        .into_owned()
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "false" | "0")
}

fn escape(value: &str) -> String {
    html! { (value) }.into_string()
}

/// Outcome of replacing the markers in one document body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacement {
    pub body: String,
    /// Number of distinct markers replaced.
    pub replaced: usize,
    /// Keys found in the body but missing from the cache.
    pub unresolved: Vec<PhotoKey>,
}

/// Replace every resolvable marker in `body`.
///
/// Replacement is literal: every occurrence of a marker's exact text gets the
/// same rendered fragment. Markers whose key is not in the cache are logged
/// once and left as they are.
pub fn replace_markers(
    body: &str,
    cache: &PhotoCache,
    template: &Template,
    ctx: &RenderContext,
) -> Replacement {
    let mut fragments: HashMap<String, Option<String>> = HashMap::new();
    let mut replaced = 0;
    let mut unresolved = Vec::new();

    let out = tag::replace_all(body, |m| {
        if let Some(fragment) = fragments.get(m.literal) {
            return fragment.clone();
        }
        let key = m.key();
        let fragment = match cache.get(&key) {
            Some(record) => {
                replaced += 1;
                Some(render(template, record, ctx))
            }
            None => {
                error!("Could not find info for photo {}", key);
                unresolved.push(key);
                None
            }
        };
        fragments.insert(m.literal.to_string(), fragment.clone());
        fragment
    });

    Replacement {
        body: out,
        replaced,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{record, sunset};
    use tempfile::TempDir;

    /// Registry backed by an in-memory map.
    struct MapRegistry(BTreeMap<String, String>);

    impl TemplateRegistry for MapRegistry {
        fn get_template(&self, name: &str) -> Result<String, TemplateNotFound> {
            self.0.get(name).cloned().ok_or_else(|| TemplateNotFound {
                name: name.to_string(),
                reason: "not in map".to_string(),
            })
        }
    }

    fn registry(entries: &[(&str, &str)]) -> MapRegistry {
        MapRegistry(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    // =========================================================================
    // Default template
    // =========================================================================

    #[test]
    fn default_template_markup() {
        let html = render(&Template::Default, &sunset(), &RenderContext::default());
        assert_eq!(
            html,
            "<p class=\"caption-container\">\
             <a class=\"caption\" href=\"http://flickr.com/42\" target=\"_blank\">\
             <img class=\"img-polaroid\" src=\"http://img/42.jpg\" alt=\"Sunset\" title=\"Sunset\">\
             </a>\
             <span class=\"caption-text muted\">Sunset</span>\
             </p>"
        );
    }

    #[test]
    fn default_template_escapes_title() {
        let html = render(
            &Template::Default,
            &record("<b>\"Tom & Jerry\"</b>"),
            &RenderContext::default(),
        );
        assert!(html.contains("&lt;b&gt;&quot;Tom &amp; Jerry&quot;&lt;/b&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn default_template_dimensions_only_when_enabled() {
        let mut r = sunset();
        r.width = Some(640);
        r.height = Some(480);

        let without = render(&Template::Default, &r, &RenderContext::default());
        assert!(!without.contains("width="));

        let ctx = RenderContext {
            include_dimensions: true,
            ..RenderContext::default()
        };
        let with = render(&Template::Default, &r, &ctx);
        assert!(with.contains("width=\"640\""));
        assert!(with.contains("height=\"480\""));
    }

    #[test]
    fn default_template_dimensions_enabled_but_absent() {
        let ctx = RenderContext {
            include_dimensions: true,
            ..RenderContext::default()
        };
        let html = render(&Template::Default, &sunset(), &ctx);
        assert!(!html.contains("width="));
    }

    // =========================================================================
    // Custom templates
    // =========================================================================

    fn custom(source: &str) -> Template {
        Template::Custom {
            name: "t.html".into(),
            source: source.into(),
        }
    }

    #[test]
    fn custom_template_placeholders() {
        let t = custom("<figure><img src=\"{{raw_url}}\"><figcaption>{{ title }}</figcaption></figure>");
        let html = render(&t, &sunset(), &RenderContext::default());
        assert_eq!(
            html,
            "<figure><img src=\"http://img/42.jpg\"><figcaption>Sunset</figcaption></figure>"
        );
    }

    #[test]
    fn custom_template_escapes_values() {
        let t = custom("{{ title }}");
        let html = render(&t, &record("a < b"), &RenderContext::default());
        assert_eq!(html, "a &lt; b");
    }

    #[test]
    fn custom_template_unknown_variable_is_empty() {
        let t = custom("[{{ nope }}]");
        assert_eq!(render(&t, &sunset(), &RenderContext::default()), "[]");
    }

    #[test]
    fn custom_template_if_block() {
        let t = custom("<img{% if include_dimensions %} width=\"{{width}}\"{% endif %}>");
        let mut r = sunset();
        r.width = Some(500);

        assert_eq!(render(&t, &r, &RenderContext::default()), "<img>");

        let ctx = RenderContext {
            include_dimensions: true,
            ..RenderContext::default()
        };
        assert_eq!(render(&t, &r, &ctx), "<img width=\"500\">");
    }

    #[test]
    fn custom_template_multiline_if_block() {
        let t = custom("a{% if include_dimensions %}\n  w={{ width }}\n{% endif %}b");
        let ctx = RenderContext {
            include_dimensions: true,
            ..RenderContext::default()
        };
        let mut r = sunset();
        r.width = Some(1);
        assert_eq!(render(&t, &r, &ctx), "a\n  w=1\nb");
    }

    #[test]
    fn custom_template_context_values() {
        let t = custom("{{ site_name }}: {{ title }}");
        let mut extra = BTreeMap::new();
        extra.insert("site_name".to_string(), "Blog".to_string());
        extra.insert("title".to_string(), "ignored".to_string());
        let ctx = RenderContext {
            include_dimensions: false,
            extra,
        };
        assert_eq!(render(&t, &sunset(), &ctx), "Blog: Sunset");
    }

    // =========================================================================
    // Template resolution
    // =========================================================================

    #[test]
    fn resolve_no_name_is_default() {
        assert_eq!(resolve_template(&registry(&[]), None), Template::Default);
    }

    #[test]
    fn resolve_known_name() {
        let t = resolve_template(&registry(&[("flickr.html", "{{title}}")]), Some("flickr.html"));
        assert_eq!(
            t,
            Template::Custom {
                name: "flickr.html".into(),
                source: "{{title}}".into()
            }
        );
    }

    #[test]
    fn resolve_unknown_name_falls_back_to_default() {
        let t = resolve_template(&registry(&[]), Some("missing.html"));
        assert_eq!(t, Template::Default);
    }

    #[test]
    fn dir_registry_reads_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("flickr.html"), "<i>{{ title }}</i>").unwrap();
        let reg = DirRegistry::new(tmp.path());

        assert_eq!(reg.get_template("flickr.html").unwrap(), "<i>{{ title }}</i>");
        let err = reg.get_template("other.html").unwrap_err();
        assert_eq!(err.name, "other.html");
    }

    // =========================================================================
    // Marker replacement
    // =========================================================================

    fn cache_with_sunset() -> PhotoCache {
        let mut cache = PhotoCache::empty();
        cache.insert("42".into(), sunset());
        cache
    }

    #[test]
    fn replace_without_markers_is_noop() {
        let body = "<p>Nothing to see.</p>";
        let r = replace_markers(
            body,
            &cache_with_sunset(),
            &Template::Default,
            &RenderContext::default(),
        );
        assert_eq!(r.body, body);
        assert_eq!(r.replaced, 0);
        assert!(r.unresolved.is_empty());
    }

    #[test]
    fn replace_resolved_marker() {
        let body = "<h1>Hi</h1>\n<p>[flickr:id=42]</p>\n<p>Bye</p>";
        let r = replace_markers(
            body,
            &cache_with_sunset(),
            &Template::Default,
            &RenderContext::default(),
        );
        assert!(!r.body.contains("[flickr:id=42]"));
        assert!(r.body.starts_with("<h1>Hi</h1>\n<p class=\"caption-container\">"));
        assert!(r.body.ends_with("</p>\n<p>Bye</p>"));
        assert!(r.body.contains("Sunset"));
        assert!(r.body.contains("http://img/42.jpg"));
        assert_eq!(r.replaced, 1);
    }

    #[test]
    fn replace_duplicate_markers_identically() {
        let body = "<p>[flickr:id=42]</p>\n<p>[flickr:id=42]</p>";
        let r = replace_markers(
            body,
            &cache_with_sunset(),
            &Template::Default,
            &RenderContext::default(),
        );
        let fragment = render(&Template::Default, &sunset(), &RenderContext::default());
        assert_eq!(r.body, format!("{fragment}\n{fragment}"));
        assert_eq!(r.replaced, 1);
    }

    #[test]
    fn replace_leaves_unresolved_marker() {
        let body = "<p>[flickr:id=99]</p>\n<p>[flickr:id=42]</p>";
        let r = replace_markers(
            body,
            &cache_with_sunset(),
            &Template::Default,
            &RenderContext::default(),
        );
        assert!(r.body.starts_with("<p>[flickr:id=99]</p>\n"));
        assert!(!r.body.contains("[flickr:id=42]"));
        assert_eq!(r.unresolved, vec![PhotoKey::from("99")]);
    }

    #[test]
    fn replace_never_touches_rendered_fragments() {
        let mut cache = PhotoCache::empty();
        cache.insert("42".into(), record("[flickr:id=7]"));
        cache.insert("7".into(), record("Seven"));
        let body = "<p>[flickr:id=42]</p>\n<p>[flickr:id=7]</p>";

        let r = replace_markers(
            body,
            &cache,
            &custom("<p>{{ title }}</p>"),
            &RenderContext::default(),
        );
        assert_eq!(r.body, "<p>[flickr:id=7]</p>\n<p>Seven</p>");
        assert_eq!(r.replaced, 2);
    }

    #[test]
    fn template_names() {
        assert_eq!(Template::Default.name(), "default");
        assert_eq!(custom("x").name(), "t.html");
    }

    #[test]
    fn replace_titled_marker_uses_titled_key() {
        let mut cache = cache_with_sunset();
        cache.insert(PhotoKey::new("42", Some("Dusk")), record("Dusk"));
        let body = "<p>[flickr:id=42,title=Dusk]</p>";
        let r = replace_markers(body, &cache, &Template::Default, &RenderContext::default());
        assert!(r.body.contains(">Dusk</span>"));
    }
}
