//! Plugin configuration.
//!
//! Loads and validates `flickrtag.toml`. Every section and key has a
//! built-in default, so the file only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! `flickrtag.toml` in the content directory, or any file passed with
//! `--config`. A missing file means "all defaults".
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [api]
//! key = ""                  # Flickr API key (required to fetch)
//! secret = ""               # Flickr API secret
//! token = ""                # Flickr API token
//! endpoint = "https://api.flickr.com/services/rest/"
//! timeout_secs = 30         # Per-request timeout
//!
//! [cache]
//! # location = "/tmp/com.chrisstreeter.flickrtag-images.cache"
//! persist_partial = true    # Keep photos fetched before a failed fetch
//!
//! [render]
//! include_dimensions = false
//! image_size = "Medium 640" # or "Medium"; anything else means "Medium"
//! swap_rotated_dimensions = false
//! # template_name = "flickr.html"
//! templates_dir = "templates"
//!
//! [render.context]          # Extra variables for override templates
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! ## Credentials
//!
//! Missing credentials never stop a build. They are reported as warnings by
//! [`ApiConfig::missing_credentials`], and fetching fails later only if a
//! photo actually needs to be fetched. A warm cache builds fine offline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the content directory.
pub const CONFIG_FILENAME: &str = "flickrtag.toml";

/// Flickr REST endpoint used unless overridden.
pub const DEFAULT_ENDPOINT: &str = "https://api.flickr.com/services/rest/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Plugin configuration loaded from `flickrtag.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlickrTagConfig {
    /// Flickr API credentials and transport settings.
    pub api: ApiConfig,
    /// Where and how the metadata cache is persisted.
    pub cache: CacheConfig,
    /// Output markup settings.
    pub render: RenderConfig,
}

impl FlickrTagConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.api.endpoint.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api.endpoint must not be empty".into(),
            ));
        }
        if self
            .render
            .template_name
            .as_deref()
            .is_some_and(|n| n.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "render.template_name must not be empty when set".into(),
            ));
        }
        Ok(())
    }
}

/// Flickr API settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub key: String,
    pub secret: String,
    pub token: String,
    /// REST endpoint URL.
    pub endpoint: String,
    /// Global timeout for each API request, in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            secret: String::new(),
            token: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Names of the credential settings that are empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        [
            ("api.token", &self.token),
            ("api.key", &self.key),
            ("api.secret", &self.secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

// Keep credentials out of debug logs.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("ApiConfig")
            .field("key", &redact(&self.key))
            .field("secret", &redact(&self.secret))
            .field("token", &redact(&self.token))
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Metadata cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Path of the persisted cache file.
    pub location: PathBuf,
    /// When a fetch fails partway, save the photos fetched before the
    /// failure so the next build does not fetch them again.
    pub persist_partial: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: default_cache_location(),
            persist_partial: true,
        }
    }
}

fn default_cache_location() -> PathBuf {
    std::env::temp_dir().join("com.chrisstreeter.flickrtag-images.cache")
}

/// Rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Fetch photo dimensions and emit `width`/`height` attributes.
    pub include_dimensions: bool,
    /// Flickr size alias for the embedded image.
    pub image_size: SizeAlias,
    /// Swap width and height for photos rotated by 90 or 270 degrees.
    pub swap_rotated_dimensions: bool,
    /// Name of an override template, looked up in `templates_dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Directory override templates are loaded from, relative to the
    /// content directory unless absolute.
    pub templates_dir: PathBuf,
    /// Extra variables exposed to override templates.
    pub context: BTreeMap<String, String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            include_dimensions: false,
            image_size: SizeAlias::default(),
            swap_rotated_dimensions: false,
            template_name: None,
            templates_dir: PathBuf::from("templates"),
            context: BTreeMap::new(),
        }
    }
}

/// Display size requested from Flickr.
///
/// Only two sizes are supported. Any other label silently means
/// [`SizeAlias::Medium`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SizeAlias {
    /// 640 px on the longest side.
    #[default]
    Medium640,
    /// 500 px on the longest side.
    Medium,
}

impl SizeAlias {
    /// The label Flickr uses for this size in `flickr.photos.getSizes`.
    pub fn label(self) -> &'static str {
        match self {
            SizeAlias::Medium640 => "Medium 640",
            SizeAlias::Medium => "Medium",
        }
    }

    /// Static URL suffix for this size (`{id}_{secret}{suffix}.jpg`).
    pub fn url_suffix(self) -> &'static str {
        match self {
            SizeAlias::Medium640 => "_z",
            SizeAlias::Medium => "",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "Medium 640" => SizeAlias::Medium640,
            _ => SizeAlias::Medium,
        }
    }
}

impl From<String> for SizeAlias {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<SizeAlias> for String {
    fn from(alias: SizeAlias) -> Self {
        alias.label().to_string()
    }
}

impl fmt::Display for SizeAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Parse the contents of a `flickrtag.toml`.
///
/// There is a single config file, so layering is plain serde defaults: a
/// section or key the file leaves out keeps its built-in value.
pub fn parse_config(source: &str) -> Result<FlickrTagConfig, ConfigError> {
    let config: FlickrTagConfig = toml::from_str(source)?;
    config.validate()?;
    Ok(config)
}

/// Load `path`, or the built-in defaults if there is no file there.
pub fn load_config(path: &Path) -> Result<FlickrTagConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(source) => parse_config(&source),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FlickrTagConfig::default()),
        Err(e) => Err(e.into()),
    }
}

/// Returns a fully-commented stock `flickrtag.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# flickrtag configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Flickr API
# ---------------------------------------------------------------------------
[api]
# Credentials from https://www.flickr.com/services/apps/create/
# Builds still run without them, but any photo missing from the cache
# will fail to fetch.
key = ""
secret = ""
token = ""

# REST endpoint.
endpoint = "https://api.flickr.com/services/rest/"

# Timeout for each API request, in seconds.
timeout_secs = 30

# ---------------------------------------------------------------------------
# Metadata cache
# ---------------------------------------------------------------------------
[cache]
# Where fetched photo metadata is kept between builds.
# Defaults to a file in the system temp directory.
# location = "/tmp/com.chrisstreeter.flickrtag-images.cache"

# If a fetch fails partway through, still save the photos fetched before
# the failure so the next build does not fetch them again.
persist_partial = true

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# Fetch photo dimensions and emit width/height attributes on <img>.
include_dimensions = false

# Flickr size to embed: "Medium 640" or "Medium".
# Any other value falls back to "Medium".
image_size = "Medium 640"

# Swap width and height for photos Flickr reports as rotated 90 or 270 degrees.
swap_rotated_dimensions = false

# Override template, looked up in templates_dir. Uses {{ title }}, {{ url }},
# {{ raw_url }}, {{ width }}, {{ height }}, {{ rotation }} placeholders and
# {% if include_dimensions %}...{% endif %} blocks.
# template_name = "flickr.html"

# Directory holding override templates (relative to the content directory).
templates_dir = "templates"

# Extra variables available to override templates.
[render.context]
# site_name = "My Photo Blog"
"##
}
