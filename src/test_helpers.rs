//! Shared test utilities for the flickrtag test suite.
//!
//! Record builders used across the cache, render and plugin tests, and a
//! log capture for asserting on diagnostics. The recording photo service
//! lives next to the trait in [`crate::flickr::tests`].

use crate::cache::PhotoRecord;
use std::io;
use std::sync::{Arc, Mutex};

/// A record with the given title and placeholder URLs.
pub fn record(title: &str) -> PhotoRecord {
    PhotoRecord {
        title: title.to_string(),
        raw_url: "http://img/1.jpg".to_string(),
        url: "http://flickr.com/1".to_string(),
        width: None,
        height: None,
        rotation: None,
    }
}

/// The record the "Sunset" scenario expects for photo 42.
pub fn sunset() -> PhotoRecord {
    PhotoRecord {
        title: "Sunset".to_string(),
        raw_url: "http://img/42.jpg".to_string(),
        url: "http://flickr.com/42".to_string(),
        width: None,
        height: None,
        rotation: None,
    }
}

/// Run `f` with a subscriber that records formatted events.
///
/// Returns the closure's result and everything logged while it ran.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
