//! CLI output formatting.
//!
//! Each command has a `format_*` function returning lines (pure, no I/O,
//! easy to test) and a `print_*` wrapper that writes them to stdout.
//!
//! ## Check
//!
//! ```text
//! Articles
//! 001 2024-06-harbour.md (2 photos)
//!     52123456789 Harbour at dusk
//!     52123456790,title=Pier (not cached)
//!
//! Pages
//! 001 pages/about.md (no photos)
//!
//! 2 photos referenced: 1 cached, 1 to fetch
//! ```
//!
//! ## Build
//!
//! ```text
//! Articles: 3 documents, 2 photos (1 cached, 1 fetched (2 total))
//!     Replaced 2 markers
//!     Unresolved: 2024-06-harbour.md → 99
//! ```

use crate::cache::PhotoCache;
use crate::document::{Collection, Document};
use crate::plugin::PassReport;
use crate::tag;
use std::collections::BTreeSet;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the marker inventory of `documents` against `cache`.
pub fn format_check_output(documents: &[Document], cache: &PhotoCache) -> Vec<String> {
    let mut lines = Vec::new();
    let mut all_keys = BTreeSet::new();

    for collection in Collection::ALL {
        let docs: Vec<&Document> = documents
            .iter()
            .filter(|d| d.collection == collection)
            .collect();
        if docs.is_empty() {
            continue;
        }
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(capitalize(collection.name()));

        for (i, doc) in docs.iter().enumerate() {
            let keys = tag::requested_keys([doc.content.as_str()]);
            let count = if keys.is_empty() {
                "no photos".to_string()
            } else {
                plural(keys.len(), "photo", "photos")
            };
            lines.push(format!(
                "{} {} ({})",
                format_index(i + 1),
                doc.source_path,
                count
            ));
            for key in &keys {
                match cache.get(key) {
                    Some(record) => lines.push(format!("    {} {}", key, record.title)),
                    None => lines.push(format!("    {} (not cached)", key)),
                }
            }
            all_keys.extend(keys);
        }
    }

    let missing = cache.reconcile(&all_keys).len();
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "{} referenced: {} cached, {} to fetch",
        plural(all_keys.len(), "photo", "photos"),
        all_keys.len() - missing,
        missing
    ));
    lines
}

pub fn print_check_output(documents: &[Document], cache: &PhotoCache) {
    for line in format_check_output(documents, cache) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

/// Format the report of one pass over a collection.
pub fn format_pass_report(collection: Collection, report: &PassReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {}, {} ({})",
        capitalize(collection.name()),
        plural(report.documents, "document", "documents"),
        plural(report.requested, "photo", "photos"),
        report.stats
    )];
    if report.replaced > 0 {
        lines.push(format!(
            "    Replaced {}",
            plural(report.replaced, "marker", "markers")
        ));
    }
    for (path, key) in &report.unresolved {
        lines.push(format!("    Unresolved: {} → {}", path, key));
    }
    lines
}

pub fn print_pass_report(collection: Collection, report: &PassReport) {
    for line in format_pass_report(collection, report) {
        println!("{}", line);
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
