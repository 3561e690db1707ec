//! Batch lookups: resolve many titles at once and decide which can be queued
//! without asking the user.

use serde::Serialize;

use crate::catalog::{Catalog, CatalogEntry};
use crate::search::search;

/// What a single batch title resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    NoMatch,
    /// Exactly one result; safe to queue directly.
    Single { entry: CatalogEntry },
    /// Several results; left for manual selection.
    Ambiguous { entries: Vec<CatalogEntry> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub title: String,
    pub outcome: BatchOutcome,
}

/// Results of a batch lookup, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    /// Entries that can be queued without a choice.
    pub fn singles(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.items.iter().filter_map(|item| match &item.outcome {
            BatchOutcome::Single { entry } => Some(entry),
            _ => None,
        })
    }

    pub fn ambiguous(&self) -> impl Iterator<Item = (&str, &[CatalogEntry])> {
        self.items.iter().filter_map(|item| match &item.outcome {
            BatchOutcome::Ambiguous { entries } => Some((item.title.as_str(), entries.as_slice())),
            _ => None,
        })
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| item.outcome == BatchOutcome::NoMatch)
            .map(|item| item.title.as_str())
    }
}

/// Splits comma-separated input into trimmed, non-empty titles.
pub fn parse_batch_input(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Searches every title sequentially against `catalog`.
pub fn plan<S: AsRef<str>>(catalog: &Catalog, titles: &[S], region: Option<&str>) -> BatchReport {
    let items = titles
        .iter()
        .map(|title| {
            let title = title.as_ref();
            let mut results = search(catalog, title, region);
            let outcome = match results.len() {
                0 => BatchOutcome::NoMatch,
                1 => BatchOutcome::Single {
                    entry: results.remove(0),
                },
                _ => BatchOutcome::Ambiguous { entries: results },
            };
            BatchItem {
                title: title.to_string(),
                outcome,
            }
        })
        .collect();
    BatchReport { items }
}
