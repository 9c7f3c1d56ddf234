//! End-to-end passes over a content directory through the public API.
//!
//! A stub photo service stands in for the Flickr client so these run
//! offline. It shares a lookup counter with the test so warm-cache passes
//! can be checked after the plugin has taken ownership of it.

use flickrtag::cache::PhotoCache;
use flickrtag::config::FlickrTagConfig;
use flickrtag::document::{self, Collection, Document};
use flickrtag::flickr::{FetchError, PhotoInfo, PhotoService, PhotoSize};
use flickrtag::render::DirRegistry;
use flickrtag::tag::PhotoKey;
use flickrtag::{FlickrTag, PassError};
use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

struct StubService {
    photos: HashMap<String, PhotoInfo>,
    lookups: Rc<Cell<usize>>,
}

impl StubService {
    fn new(photos: &[(&str, &str)], lookups: Rc<Cell<usize>>) -> Self {
        let photos = photos
            .iter()
            .map(|(id, title)| {
                let info = PhotoInfo {
                    id: id.to_string(),
                    title: title.to_string(),
                    page_url: format!("http://flickr.com/{id}"),
                    server: "1".to_string(),
                    secret: "s".to_string(),
                    rotation: 0,
                };
                (id.to_string(), info)
            })
            .collect();
        Self { photos, lookups }
    }
}

impl PhotoService for StubService {
    fn photo_info(&self, id: &str) -> Result<PhotoInfo, FetchError> {
        self.lookups.set(self.lookups.get() + 1);
        self.photos.get(id).cloned().ok_or(FetchError::Api {
            code: 1,
            message: format!("Photo \"{id}\" not found"),
        })
    }

    fn photo_sizes(&self, _id: &str) -> Result<Vec<PhotoSize>, FetchError> {
        Ok(Vec::new())
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup_content() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let content = tmp.path().join("content");
    write(
        &content,
        "harbour.md",
        "# Harbour\n\n[flickr:id=42]\n\nA quiet evening.\n",
    );
    write(
        &content,
        "travel/lisbon.md",
        "# Lisbon\n\n[flickr:id=42]\n\n[flickr:id=7,title=Tram 28]\n",
    );
    write(&content, "pages/about.md", "# About\n\nNo photos here.\n");
    write(
        &content,
        "templates/caption.html",
        "<figure><img src=\"{{ raw_url }}\"><figcaption>{{ title }} by {{ author }}</figcaption></figure>",
    );
    tmp
}

fn config_for(tmp: &TempDir) -> FlickrTagConfig {
    let mut config = FlickrTagConfig::default();
    config.cache.location = tmp.path().join("cache/photos.json");
    config
}

fn plugin(
    tmp: &TempDir,
    config: FlickrTagConfig,
    service: StubService,
) -> FlickrTag<StubService, DirRegistry> {
    let registry = DirRegistry::new(tmp.path().join("content/templates"));
    FlickrTag::with_parts(config, service, registry)
}

fn articles(tmp: &TempDir) -> Vec<Document> {
    let content = tmp.path().join("content");
    document::load_documents(&content, &[content.join("templates")])
        .unwrap()
        .into_iter()
        .filter(|d| d.collection == Collection::Articles)
        .collect()
}

#[test]
fn build_replaces_markers_across_documents() {
    let tmp = setup_content();
    let lookups = Rc::new(Cell::new(0));
    let service = StubService::new(&[("42", "Sunset"), ("7", "Tram")], lookups.clone());
    let plugin = plugin(&tmp, config_for(&tmp), service);

    let mut docs = articles(&tmp);
    assert_eq!(docs.len(), 2);
    let report = plugin.collection_generated(&mut docs).unwrap();

    assert_eq!(report.requested, 2);
    assert_eq!(report.stats.fetched, 2);
    assert_eq!(lookups.get(), 2);
    assert!(report.cache_saved);
    assert!(report.unresolved.is_empty());

    for doc in &docs {
        assert!(!doc.content.contains("[flickr:"), "{}", doc.source_path);
    }
    assert!(
        docs[0]
            .content
            .contains("<span class=\"caption-text muted\">Sunset</span>")
    );
    assert!(
        docs[1]
            .content
            .contains("<span class=\"caption-text muted\">Tram 28</span>")
    );
    assert!(docs[1].content.contains("href=\"http://flickr.com/7\""));

    let out = tmp.path().join("dist");
    document::write_documents(&docs, &out).unwrap();
    let written = fs::read_to_string(out.join("travel/lisbon.html")).unwrap();
    assert_eq!(written, docs[1].content);
}

#[test]
fn warm_cache_serves_second_build_without_lookups() {
    let tmp = setup_content();
    let lookups = Rc::new(Cell::new(0));

    let first = plugin(
        &tmp,
        config_for(&tmp),
        StubService::new(&[("42", "Sunset"), ("7", "Tram")], lookups.clone()),
    );
    let mut docs = articles(&tmp);
    first.collection_generated(&mut docs).unwrap();
    assert_eq!(lookups.get(), 2);

    // Fresh plugin, fresh documents: only the cache file carries over.
    let second = plugin(
        &tmp,
        config_for(&tmp),
        StubService::new(&[], lookups.clone()),
    );
    let mut again = articles(&tmp);
    let report = second.collection_generated(&mut again).unwrap();

    assert_eq!(lookups.get(), 2);
    assert_eq!(report.stats.hits, 2);
    assert_eq!(report.stats.fetched, 0);
    assert!(!report.cache_saved);
    assert_eq!(again, docs);
}

#[test]
fn replaced_output_has_nothing_left_to_do() {
    let tmp = setup_content();
    let lookups = Rc::new(Cell::new(0));
    let plugin = plugin(
        &tmp,
        config_for(&tmp),
        StubService::new(&[("42", "Sunset"), ("7", "Tram")], lookups.clone()),
    );

    let mut docs = articles(&tmp);
    plugin.collection_generated(&mut docs).unwrap();
    let rendered = docs.clone();

    let report = plugin.collection_generated(&mut docs).unwrap();
    assert_eq!(report.requested, 0);
    assert_eq!(report.replaced, 0);
    assert_eq!(docs, rendered);
    assert_eq!(lookups.get(), 2);
}

#[test]
fn unknown_photo_fails_pass_and_keeps_documents() {
    let tmp = setup_content();
    let content = tmp.path().join("content");
    write(&content, "missing.md", "[flickr:id=99]\n");
    let lookups = Rc::new(Cell::new(0));
    let plugin = plugin(
        &tmp,
        config_for(&tmp),
        StubService::new(&[("42", "Sunset"), ("7", "Tram")], lookups.clone()),
    );

    let mut docs = articles(&tmp);
    let before = docs.clone();
    let err = plugin.collection_generated(&mut docs).unwrap_err();

    match err {
        PassError::Fetch { key, source } => {
            assert_eq!(key, PhotoKey::from("99"));
            assert!(matches!(source, FetchError::Api { code: 1, .. }));
        }
        other => panic!("expected fetch error, got {other}"),
    }
    assert_eq!(docs, before);

    // Keys sort before "99", so both were fetched and kept.
    let cache = PhotoCache::load(&tmp.path().join("cache/photos.json"));
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&PhotoKey::from("42")));
}

#[test]
fn override_template_from_content_directory() {
    let tmp = setup_content();
    let mut config = config_for(&tmp);
    config.render.template_name = Some("caption.html".to_string());
    config
        .render
        .context
        .insert("author".to_string(), "Chris".to_string());
    let lookups = Rc::new(Cell::new(0));
    let plugin = plugin(
        &tmp,
        config,
        StubService::new(&[("42", "Sunset"), ("7", "Tram")], lookups),
    );

    let mut docs = articles(&tmp);
    plugin.collection_generated(&mut docs).unwrap();

    assert!(docs[0].content.contains(
        "<figure><img src=\"https://live.staticflickr.com/1/42_s_z.jpg\"><figcaption>Sunset by Chris</figcaption></figure>"
    ));
}

#[test]
fn pages_without_markers_pass_through() {
    let tmp = setup_content();
    let content = tmp.path().join("content");
    let mut pages: Vec<Document> = document::load_documents(&content, &[content.join("templates")])
        .unwrap()
        .into_iter()
        .filter(|d| d.collection == Collection::Pages)
        .collect();
    assert_eq!(pages.len(), 1);
    let before = pages.clone();

    let lookups = Rc::new(Cell::new(0));
    let plugin = plugin(&tmp, config_for(&tmp), StubService::new(&[], lookups.clone()));
    let report = plugin.collection_generated(&mut pages).unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.requested, 0);
    assert_eq!(pages, before);
    assert_eq!(lookups.get(), 0);
    assert!(!tmp.path().join("cache/photos.json").exists());
}
