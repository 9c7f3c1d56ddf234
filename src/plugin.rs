//! Build pass orchestration.
//!
//! [`FlickrTag`] is the plugin a site generator drives through two hooks:
//!
//! 1. [`FlickrTag::initialize`] once configuration is loaded: validates
//!    the config, warns about missing credentials, builds the API client.
//! 2. [`FlickrTag::collection_generated`] after each document collection is
//!    generated: runs one pass over that collection.
//!
//! A pass moves through fixed steps, never looping back:
//!
//! ```text
//! Scan → Reconcile → Fetch missing? → Persist? → Render → Done
//! ```
//!
//! - **Scan** every document for requested keys.
//! - **Reconcile** the keys against the cache loaded from disk.
//! - **Fetch** each missing photo, one lookup per photo id however many
//!   titled markers refer to it (skipped when nothing is missing).
//! - **Persist** the cache, only if something was fetched.
//! - **Render** every resolvable marker into its document.
//!
//! ## Failure
//!
//! A fetch error aborts the pass before rendering, so documents are left
//! exactly as they were. With `cache.persist_partial` (the default) the
//! records fetched before the failure are saved first, so a retry only
//! fetches what is still missing. With it off, the cache file is left as it
//! was before the pass.

use crate::cache::{CacheError, CacheStats, PhotoCache};
use crate::config::{ConfigError, FlickrTagConfig};
use crate::document::Document;
use crate::flickr::{FetchError, FetchOptions, FlickrClient, PhotoService, fetch_photo};
use crate::render::{self, DirRegistry, RenderContext, TemplateRegistry};
use crate::tag::{self, PhotoKey};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PassError {
    #[error("Failed to fetch photo {key}: {source}")]
    Fetch {
        key: PhotoKey,
        #[source]
        source: FetchError,
    },
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result of the cache refresh half of a pass.
#[derive(Debug, Clone)]
pub struct Refresh {
    /// The cache after merging, covering every fetched key.
    pub cache: PhotoCache,
    /// Number of distinct keys requested by the documents.
    pub requested: usize,
    pub stats: CacheStats,
    /// Whether the cache file was written.
    pub saved: bool,
}

/// Summary of one full pass over a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub documents: usize,
    pub requested: usize,
    pub stats: CacheStats,
    pub cache_saved: bool,
    /// Distinct markers replaced, summed over documents.
    pub replaced: usize,
    /// `(document source path, key)` for markers left unreplaced.
    pub unresolved: Vec<(String, PhotoKey)>,
}

/// The plugin, bound to a photo service and a template registry.
pub struct FlickrTag<S, R> {
    config: FlickrTagConfig,
    service: S,
    registry: R,
}

impl FlickrTag<FlickrClient, DirRegistry> {
    /// Hook: configuration has been loaded.
    ///
    /// Override templates are looked up in `render.templates_dir`, resolved
    /// against `content_root` when relative.
    pub fn initialize(config: FlickrTagConfig, content_root: &Path) -> Result<Self, ConfigError> {
        config.validate()?;
        for name in config.api.missing_credentials() {
            warn!("{} is not defined in the configuration", name);
        }
        let client = FlickrClient::new(&config.api);
        let registry = DirRegistry::new(content_root.join(&config.render.templates_dir));
        Ok(Self::with_parts(config, client, registry))
    }
}

impl<S: PhotoService, R: TemplateRegistry> FlickrTag<S, R> {
    pub fn with_parts(config: FlickrTagConfig, service: S, registry: R) -> Self {
        Self {
            config,
            service,
            registry,
        }
    }

    pub fn config(&self) -> &FlickrTagConfig {
        &self.config
    }

    /// Scan, reconcile, fetch and persist for a set of documents.
    ///
    /// Documents are only read.
    pub fn refresh(&self, documents: &[Document]) -> Result<Refresh, PassError> {
        let cache_path = &self.config.cache.location;

        info!("Parsing {} documents for photo ids...", documents.len());
        let requested = tag::requested_keys(documents.iter().map(|d| d.content.as_str()));
        info!("Found {} photo ids in the documents", requested.len());

        let mut cache = PhotoCache::load(cache_path);
        let misses = cache.reconcile(&requested);
        let mut stats = CacheStats {
            hits: (requested.len() - misses.len()) as u32,
            fetched: 0,
        };

        if misses.is_empty() {
            debug!("All requested photos are cached");
            return Ok(Refresh {
                cache,
                requested: requested.len(),
                stats,
                saved: false,
            });
        }

        // Titled and bare markers for one photo share a single lookup.
        let mut by_id: BTreeMap<String, Vec<PhotoKey>> = BTreeMap::new();
        for key in misses {
            by_id.entry(key.id().to_string()).or_default().push(key);
        }

        info!("Fetching photo information from Flickr for {} photos...", by_id.len());
        let options = FetchOptions::from_render_config(&self.config.render);
        for (id, keys) in by_id {
            info!("Fetching photo information for {}", id);
            let fetched = match fetch_photo(&self.service, &id, &options) {
                Ok(fetched) => fetched,
                Err(source) => {
                    self.save_partial(&cache, stats.fetched);
                    return Err(PassError::Fetch {
                        key: PhotoKey::new(&id, None),
                        source,
                    });
                }
            };
            let records: Vec<_> = keys
                .into_iter()
                .map(|key| {
                    let record = fetched.record_for(&key, &options);
                    (key, record)
                })
                .collect();
            stats.fetched += records.len() as u32;
            cache.merge(records);
        }

        cache.save(cache_path)?;
        Ok(Refresh {
            cache,
            requested: requested.len(),
            stats,
            saved: true,
        })
    }

    /// Keep what was fetched before a failure, if configured to.
    fn save_partial(&self, cache: &PhotoCache, fetched: u32) {
        if !self.config.cache.persist_partial || fetched == 0 {
            return;
        }
        match cache.save(&self.config.cache.location) {
            Ok(()) => info!("Saved {} photos fetched before the failure", fetched),
            Err(e) => warn!("Could not save partially refreshed cache: {}", e),
        }
    }

    /// Hook: a document collection has been generated.
    ///
    /// Runs a full pass and rewrites the bodies of `documents` in place.
    /// On error no document is modified.
    pub fn collection_generated(&self, documents: &mut [Document]) -> Result<PassReport, PassError> {
        let refresh = self.refresh(documents)?;

        let mut report = PassReport {
            documents: documents.len(),
            requested: refresh.requested,
            stats: refresh.stats,
            cache_saved: refresh.saved,
            ..PassReport::default()
        };
        self.render_documents(documents, &refresh.cache, &mut report);
        Ok(report)
    }

    /// Replace every marker `cache` resolves, adding the counts to `report`.
    ///
    /// Markers missing from `cache` are logged and left in place.
    pub fn render_documents(
        &self,
        documents: &mut [Document],
        cache: &PhotoCache,
        report: &mut PassReport,
    ) {
        let template = render::resolve_template(
            &self.registry,
            self.config.render.template_name.as_deref(),
        );
        let ctx = RenderContext::from_render_config(&self.config.render);

        info!(
            "Inserting photo information into documents with the {} template...",
            template.name()
        );
        for doc in documents.iter_mut() {
            let result = render::replace_markers(&doc.content, cache, &template, &ctx);
            report.replaced += result.replaced;
            report
                .unresolved
                .extend(result.unresolved.into_iter().map(|k| (doc.source_path.clone(), k)));
            doc.content = result.body;
        }
    }
}
