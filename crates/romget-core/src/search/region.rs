//! Soft region preference.

use crate::catalog::CatalogEntry;

/// Keeps entries tagged `(region)` or `(World)`; if none are, returns the input
/// unchanged so a region alone never empties a non-empty result.
pub fn prefer_region<'a>(entries: Vec<&'a CatalogEntry>, region: &str) -> Vec<&'a CatalogEntry> {
    let tag = format!("({region})");
    let preferred: Vec<&CatalogEntry> = entries
        .iter()
        .copied()
        .filter(|e| e.display_name().contains(&tag) || e.folded_name().contains("(world)"))
        .collect();
    if preferred.is_empty() {
        entries
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_counts_for_every_region() {
        let world = CatalogEntry::new("Tetris (WORLD)", "u");
        let jp = CatalogEntry::new("Tetris (Japan)", "u");
        assert_eq!(prefer_region(vec![&jp, &world], "USA"), vec![&world]);
    }

    #[test]
    fn region_tag_is_case_sensitive() {
        let usa = CatalogEntry::new("Tetris (usa)", "u");
        assert_eq!(prefer_region(vec![&usa], "USA"), vec![&usa]);
    }
}
