//! Catalog search: substring match, fuzzy fallback, revision de-duplication,
//! and soft region preference.
//!
//! Pure functions over a borrowed [`Catalog`]; deterministic for a fixed
//! catalog, query, and region. Callers reject empty queries before calling.

mod region;
mod revision;
mod similarity;

pub use region::prefer_region;
pub use revision::{latest_revisions, revision_key, revision_number};
pub use similarity::calculate_similarity;

use crate::catalog::{Catalog, CatalogEntry};

/// Minimum partial-similarity score for the fuzzy fallback.
pub const FUZZY_THRESHOLD: u32 = 70;

/// Finds catalog entries for `query`, optionally preferring `region`.
pub fn search(catalog: &Catalog, query: &str, region: Option<&str>) -> Vec<CatalogEntry> {
    if catalog.is_empty() {
        return Vec::new();
    }
    let query = query.to_lowercase();

    let mut candidates: Vec<&CatalogEntry> = catalog
        .entries()
        .iter()
        .filter(|e| e.folded_name().contains(&query))
        .collect();

    if candidates.is_empty() {
        candidates = catalog
            .entries()
            .iter()
            .filter(|e| calculate_similarity(&query, e.folded_name()) >= FUZZY_THRESHOLD)
            .collect();
        tracing::debug!(query = %query, hits = candidates.len(), "fuzzy fallback");
    }

    let deduped = latest_revisions(candidates);
    let results = match region {
        Some(region) => prefer_region(deduped, region),
        None => deduped,
    };
    results.into_iter().cloned().collect()
}
