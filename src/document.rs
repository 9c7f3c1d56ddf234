//! Documents and document collections.
//!
//! The plugin works on rendered HTML bodies. When running standalone, this
//! module plays the site generator's part: it walks a content directory,
//! renders Markdown to HTML, sorts documents into collections, and writes
//! the finished bodies back out.
//!
//! ## Content layout
//!
//! ```text
//! content/
//! ├── flickrtag.toml              # Config (optional)
//! ├── templates/                  # Override templates (never loaded as documents)
//! │   └── flickr.html
//! ├── 2024-06-harbour.md          # Article
//! ├── travel/
//! │   └── lisbon.md               # Article
//! └── pages/
//!     └── about.html              # Page (anything under pages/)
//! ```
//!
//! Markdown (`.md`, `.markdown`) is rendered with pulldown-cmark; HTML
//! (`.html`, `.htm`) is taken as is. Hidden files and directories are
//! skipped. Output keeps each document's relative path with an `.html`
//! extension.

use pulldown_cmark::{Parser, html as md_html};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Top-level directory whose documents form the pages collection.
const PAGES_DIR: &str = "pages";

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Content directory not found: {0}")]
    MissingRoot(PathBuf),
}

/// Which collection a document belongs to.
///
/// The build runs one pass per collection, articles first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Articles,
    Pages,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Articles, Collection::Pages];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Articles => "articles",
            Collection::Pages => "pages",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One generated document: its rendered HTML body and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the content root, forward slashes.
    pub source_path: String,
    pub collection: Collection,
    /// Rendered HTML body. Rewritten in place by the plugin.
    pub content: String,
}

impl Document {
    pub fn new(
        source_path: impl Into<String>,
        collection: Collection,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            collection,
            content: content.into(),
        }
    }

    /// Output path relative to the output root: source path with `.html`.
    pub fn output_path(&self) -> PathBuf {
        Path::new(&self.source_path).with_extension("html")
    }
}

/// Render Markdown to an HTML body.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut html = String::new();
    md_html::push_html(&mut html, parser);
    html
}

/// Load every document under `root`, sorted by path.
///
/// Anything under one of the `exclude` directories is skipped.
pub fn load_documents(root: &Path, exclude: &[PathBuf]) -> Result<Vec<Document>, DocumentError> {
    if !root.is_dir() {
        return Err(DocumentError::MissingRoot(root.to_path_buf()));
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || (!is_hidden(e.file_name()) && !exclude.iter().any(|x| e.path() == x))
        });

    let mut documents = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(kind) = source_kind(path) else {
            continue;
        };
        let relative = path.strip_prefix(root).unwrap_or(path);
        let raw = fs::read_to_string(path)?;
        let content = match kind {
            SourceKind::Markdown => markdown_to_html(&raw),
            SourceKind::Html => raw,
        };
        documents.push(Document::new(
            to_slash_path(relative),
            collection_for(relative),
            content,
        ));
    }
    Ok(documents)
}

/// Write each document to `output_root`, creating directories as needed.
pub fn write_documents(documents: &[Document], output_root: &Path) -> Result<(), DocumentError> {
    for doc in documents {
        let path = output_root.join(doc.output_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &doc.content)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Markdown,
    Html,
}

fn source_kind(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::Markdown)
    } else if HTML_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::Html)
    } else {
        None
    }
}

fn collection_for(relative: &Path) -> Collection {
    match relative.components().next() {
        Some(Component::Normal(first))
            if first == PAGES_DIR && relative.components().count() > 1 =>
        {
            Collection::Pages
        }
        _ => Collection::Articles,
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
