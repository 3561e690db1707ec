//! `romget search` – print catalog matches for a query.

use anyhow::{bail, Result};
use romget_core::catalog::{Catalog, CatalogEntry};
use romget_core::search;

pub fn run_search(catalog: &Catalog, query: &str, region: Option<&str>) -> Result<()> {
    let query = query.trim();
    let results = find(catalog, query, region)?;
    if results.is_empty() {
        println!("No matches for {query:?}.");
        return Ok(());
    }
    for entry in &results {
        println!("{}\t{}", entry.display_name(), entry.source_url());
    }
    tracing::debug!(query, hits = results.len(), "search finished");
    Ok(())
}

/// Rejects blank queries; the engine would otherwise match every entry.
fn find(catalog: &Catalog, query: &str, region: Option<&str>) -> Result<Vec<CatalogEntry>> {
    if query.is_empty() {
        bail!("search query is empty");
    }
    Ok(search(catalog, query, region))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(
            ["Tetris (World).gb", "Zelda (USA).gb", "Kirby (USA).gb"]
                .iter()
                .map(|n| CatalogEntry::new(*n, format!("http://h/{n}"))),
        )
    }

    #[test]
    fn blank_query_is_rejected() {
        assert!(find(&catalog(), "", None).is_err());
        assert!(run_search(&catalog(), "   ", None).is_err());
    }

    #[test]
    fn query_finds_entry() {
        let hits = find(&catalog(), "zelda", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name(), "Zelda (USA).gb");
    }
}
