//! # flickrtag
//!
//! Embed Flickr photos in static site articles. Authors write a marker on its
//! own line:
//!
//! ```text
//! [flickr:id=52123456789]
//! [flickr:id=52123456789,title=Harbour at dusk]
//! ```
//!
//! and the build replaces it with a captioned, linked image, using metadata
//! fetched from the Flickr API once and cached on disk after that.
//!
//! # Architecture: One Pass Per Collection
//!
//! The site generator calls the plugin after each document collection
//! (articles, then pages) is rendered to HTML. Each call is one linear pass:
//!
//! ```text
//! 1. Scan       documents  →  requested keys
//! 2. Reconcile  keys       →  misses          (against the on-disk cache)
//! 3. Fetch      misses     →  cache entries   (Flickr API, skipped if none)
//! 4. Persist    cache      →  cache file      (only if something was fetched)
//! 5. Render     cache      →  documents       (markers replaced in place)
//! ```
//!
//! Rendering never starts unless the cache covers every marker it could
//! resolve, so a failed fetch leaves every document untouched.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`tag`] | Marker scanning and the `PhotoKey` cache key |
//! | [`cache`] | On-disk photo metadata cache: load, reconcile, merge, save |
//! | [`flickr`] | `PhotoService` trait, Flickr REST client, record assembly |
//! | [`render`] | Default and override templates, marker replacement |
//! | [`plugin`] | The two host hooks and the pass itself |
//! | [`config`] | `flickrtag.toml` loading, merging, and validation |
//! | [`document`] | Document model, content directory loading and writing |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Keys Follow the Marker
//!
//! A titled marker is cached under `id,title=<title>`, separate from the bare
//! id. The title is part of what the author asked for, so two markers for the
//! same photo with different titles are two different entries.
//!
//! ## Maud for the Default Markup
//!
//! The built-in caption block is a [Maud](https://maud.lambda.xyz/) template:
//! checked at compile time and escaped by default. Override templates are
//! plain files with `{{ placeholder }}` substitution, so a site can restyle
//! the block without rebuilding.
//!
//! ## No Global Client
//!
//! API credentials live in an immutable config value handed to the client at
//! construction. Nothing is stored in process-wide state.

pub mod cache;
pub mod config;
pub mod document;
pub mod flickr;
pub mod output;
pub mod plugin;
pub mod render;
pub mod tag;

pub use plugin::{FlickrTag, PassError, PassReport};

#[cfg(test)]
pub(crate) mod test_helpers;
