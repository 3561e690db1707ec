//! Revision de-duplication: keep only the newest `(Rev N)` of each title.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::CatalogEntry;

fn revision_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(Rev (\d+)\)").expect("static revision regex"))
}

/// Revision number from the first `(Rev N)` marker; 0 when absent.
pub fn revision_number(name: &str) -> u32 {
    revision_pattern()
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Grouping key: the name with every `(Rev N)` marker and all whitespace removed.
pub fn revision_key(name: &str) -> String {
    revision_pattern()
        .replace_all(name, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Collapses entries sharing a [`revision_key`] to the one with the highest
/// revision. Groups keep the position of their first member; on equal
/// revisions the earlier entry stays.
pub fn latest_revisions<'a>(entries: Vec<&'a CatalogEntry>) -> Vec<&'a CatalogEntry> {
    let mut slots: Vec<(&'a CatalogEntry, u32)> = Vec::with_capacity(entries.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let name = entry.display_name();
        let rev = revision_number(name);
        match by_key.get(&revision_key(name)) {
            Some(&slot) => {
                if slots[slot].1 < rev {
                    slots[slot] = (entry, rev);
                }
            }
            None => {
                by_key.insert(revision_key(name), slots.len());
                slots.push((entry, rev));
            }
        }
    }
    slots.into_iter().map(|(e, _)| e).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_strips_marker_and_whitespace() {
        assert_eq!(revision_key("Game Boy Thing (USA) (Rev 2).gb"), "GameBoyThing(USA).gb");
        assert_eq!(revision_key("Game Boy Thing (USA).gb"), "GameBoyThing(USA).gb");
    }

    #[test]
    fn number_defaults_to_zero() {
        assert_eq!(revision_number("A (Rev 12)"), 12);
        assert_eq!(revision_number("A (Rev A)"), 0);
        assert_eq!(revision_number("A"), 0);
    }

    #[test]
    fn unrevised_entry_loses_to_any_revision() {
        let base = CatalogEntry::new("Game (USA)", "u0");
        let rev1 = CatalogEntry::new("Game (USA) (Rev 1)", "u1");
        let other = CatalogEntry::new("Other (USA)", "u2");
        let kept = latest_revisions(vec![&base, &other, &rev1]);
        assert_eq!(kept, vec![&rev1, &other]);
    }
}
