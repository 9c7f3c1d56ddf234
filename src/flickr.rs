//! Flickr photo metadata fetching.
//!
//! The [`PhotoService`] trait defines the two lookups the build needs:
//! photo info (title, page URL, static URL parts, rotation) and the size
//! list (per-size dimensions). The production implementation is
//! [`FlickrClient`], a blocking client over the Flickr REST API. Tests
//! substitute a recording mock.
//!
//! [`fetch_photo`] performs the lookups for one photo id, once, however many
//! keys (bare and titled markers) refer to it. [`FetchedPhoto::record_for`]
//! then builds each key's [`PhotoRecord`] from that single response:
//!
//! | Field | Source |
//! |---|---|
//! | `title` | inline marker title, else Flickr title |
//! | `raw_url` | static URL built from server/secret for the size alias |
//! | `url` | `photopage` URL, else `flickr.com/photos/{owner}/{id}/` |
//! | `width`/`height` | `getSizes` entry for the alias (only with `include_dimensions`) |
//! | `rotation` | Flickr rotation in degrees |
//!
//! Errors are never swallowed here. A failed lookup propagates to the
//! caller, which aborts the fetch phase.

use crate::cache::PhotoRecord;
use crate::config::{ApiConfig, RenderConfig, SizeAlias};
use crate::tag::PhotoKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use ureq::Agent;

const STATIC_HOST: &str = "https://live.staticflickr.com";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Flickr API error {code}: {message}")]
    Api { code: u64, message: String },
    #[error("Malformed Flickr response: {0}")]
    MalformedResponse(String),
    #[error("Photo {id} has no \"{label}\" size")]
    SizeNotFound { id: String, label: &'static str },
    #[error("Flickr API key is not configured (set api.key in flickrtag.toml)")]
    MissingCredentials,
}

/// Photo info as needed by the build, from `flickr.photos.getInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoInfo {
    pub id: String,
    pub title: String,
    pub page_url: String,
    pub server: String,
    pub secret: String,
    pub rotation: u32,
}

impl PhotoInfo {
    /// Direct static image URL for a display size.
    pub fn image_url(&self, size: SizeAlias) -> String {
        format!(
            "{}/{}/{}_{}{}.jpg",
            STATIC_HOST,
            self.server,
            self.id,
            self.secret,
            size.url_suffix()
        )
    }
}

/// One entry of `flickr.photos.getSizes`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhotoSize {
    pub label: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub width: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub height: u32,
}

/// Remote photo metadata lookups.
pub trait PhotoService {
    /// Title, page URL, static URL parts and rotation for one photo.
    fn photo_info(&self, id: &str) -> Result<PhotoInfo, FetchError>;

    /// Available sizes with their pixel dimensions.
    fn photo_sizes(&self, id: &str) -> Result<Vec<PhotoSize>, FetchError>;
}

/// What to fetch for each photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub size: SizeAlias,
    pub include_dimensions: bool,
    pub swap_rotated_dimensions: bool,
}

impl FetchOptions {
    pub fn from_render_config(config: &RenderConfig) -> Self {
        Self {
            size: config.image_size,
            include_dimensions: config.include_dimensions,
            swap_rotated_dimensions: config.swap_rotated_dimensions,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_render_config(&RenderConfig::default())
    }
}

/// Everything fetched for one photo id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPhoto {
    pub info: PhotoInfo,
    /// `(width, height)` of the configured size, already swapped for
    /// rotation if requested. `None` unless dimensions were fetched.
    pub dimensions: Option<(u32, u32)>,
}

impl FetchedPhoto {
    /// Build the record for `key`, which must refer to this photo.
    ///
    /// The key's inline title, if any, replaces the Flickr title.
    pub fn record_for(&self, key: &PhotoKey, options: &FetchOptions) -> PhotoRecord {
        let title = key
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| self.info.title.clone());
        PhotoRecord {
            title,
            raw_url: self.info.image_url(options.size),
            url: self.info.page_url.clone(),
            width: self.dimensions.map(|(w, _)| w),
            height: self.dimensions.map(|(_, h)| h),
            rotation: Some(self.info.rotation),
        }
    }
}

/// Look up one photo id: `getInfo`, plus `getSizes` with `include_dimensions`.
pub fn fetch_photo(
    service: &impl PhotoService,
    id: &str,
    options: &FetchOptions,
) -> Result<FetchedPhoto, FetchError> {
    let info = service.photo_info(id)?;
    if !options.include_dimensions {
        return Ok(FetchedPhoto {
            info,
            dimensions: None,
        });
    }

    let sizes = service.photo_sizes(id)?;
    let size = size_for_alias(&sizes, options.size).ok_or_else(|| FetchError::SizeNotFound {
        id: id.to_string(),
        label: options.size.label(),
    })?;
    let dimensions = if options.swap_rotated_dimensions && is_quarter_turn(info.rotation) {
        (size.height, size.width)
    } else {
        (size.width, size.height)
    };
    Ok(FetchedPhoto {
        info,
        dimensions: Some(dimensions),
    })
}

/// Find the size entry whose label matches the alias.
pub fn size_for_alias(sizes: &[PhotoSize], alias: SizeAlias) -> Option<&PhotoSize> {
    sizes.iter().find(|s| s.label == alias.label())
}

fn is_quarter_turn(rotation: u32) -> bool {
    matches!(rotation % 360, 90 | 270)
}

// ============================================================================
// Flickr REST client
// ============================================================================

/// Blocking Flickr REST client.
///
/// Built once from [`ApiConfig`] and never mutated; the credentials travel
/// with the value rather than living in process-wide state.
pub struct FlickrClient {
    agent: Agent,
    endpoint: String,
    api_key: String,
}

impl FlickrClient {
    pub fn new(api: &ApiConfig) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(api.timeout_secs)))
            .build();
        Self {
            agent: Agent::new_with_config(config),
            endpoint: api.endpoint.clone(),
            api_key: api.key.trim().to_string(),
        }
    }

    /// Call a REST method for one photo and return the payload under `field`.
    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        id: &str,
        field: &str,
    ) -> Result<T, FetchError> {
        if self.api_key.is_empty() {
            return Err(FetchError::MissingCredentials);
        }
        debug!("Calling {} for photo {}", method, id);
        let mut response = self
            .agent
            .get(&self.endpoint)
            .query("method", method)
            .query("api_key", &self.api_key)
            .query("photo_id", id)
            .query("format", "json")
            .query("nojsoncallback", "1")
            .call()?;
        let body = response.body_mut().read_to_string()?;
        parse_response(&body, field)
    }
}

impl PhotoService for FlickrClient {
    fn photo_info(&self, id: &str) -> Result<PhotoInfo, FetchError> {
        let payload: InfoPayload = self.call("flickr.photos.getInfo", id, "photo")?;
        Ok(payload.into_info())
    }

    fn photo_sizes(&self, id: &str) -> Result<Vec<PhotoSize>, FetchError> {
        let payload: SizesPayload = self.call("flickr.photos.getSizes", id, "sizes")?;
        Ok(payload.size)
    }
}

/// Check the `stat` envelope and deserialize the payload under `field`.
///
/// Flickr reports failures in-band with HTTP 200:
/// `{"stat": "fail", "code": 1, "message": "Photo not found"}`.
fn parse_response<T: DeserializeOwned>(body: &str, field: &str) -> Result<T, FetchError> {
    let mut value: Value = serde_json::from_str(body)?;
    if value.get("stat").and_then(Value::as_str) != Some("ok") {
        let code = value.get("code").and_then(Value::as_u64).unwrap_or(0);
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(FetchError::Api { code, message });
    }
    let payload = value
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| FetchError::MalformedResponse(format!("missing \"{field}\"")))?;
    Ok(serde_json::from_value(payload)?)
}

// Wire shapes for the two REST methods.

#[derive(Debug, Deserialize)]
struct InfoPayload {
    id: String,
    secret: String,
    server: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    rotation: u32,
    owner: Owner,
    title: Content,
    #[serde(default)]
    urls: Urls,
}

impl InfoPayload {
    fn into_info(self) -> PhotoInfo {
        let page_url = self
            .urls
            .url
            .into_iter()
            .find(|u| u.kind == "photopage")
            .map(|u| u.content)
            .unwrap_or_else(|| {
                format!("https://www.flickr.com/photos/{}/{}/", self.owner.nsid, self.id)
            });
        PhotoInfo {
            id: self.id,
            title: self.title.content,
            page_url,
            server: self.server,
            secret: self.secret,
            rotation: self.rotation,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Owner {
    nsid: String,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(rename = "_content", default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct Urls {
    #[serde(default)]
    url: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "_content")]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SizesPayload {
    #[serde(default)]
    size: Vec<PhotoSize>,
}

/// Flickr sends some integers as JSON numbers and some as strings.
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u32),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
