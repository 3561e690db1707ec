//! Listing ingestion rules: decoding, URL resolution, unwanted-entry filter.

use std::collections::HashMap;

/// Lower-case substrings that mark entries nobody wants to download.
const UNWANTED_MARKERS: [&str; 5] = ["(demo", "(beta", "(pirate", "(sample", "virtual console"];

/// True if the lower-cased `name` carries any unwanted marker.
pub fn is_unwanted(folded_name: &str) -> bool {
    UNWANTED_MARKERS.iter().any(|m| folded_name.contains(m))
}

/// Ensures a non-empty extension starts with a dot (`"zip"` → `".zip"`).
pub fn normalize_extension(extension: &str) -> String {
    let extension = extension.trim();
    if extension.is_empty() || extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    }
}

/// Decodes an href into a display name: form-style `+` is a space, then
/// percent-decoding. Leading slashes are dropped so the name stays relative.
/// Invalid UTF-8 after decoding falls back to the raw href.
pub fn decode_href(href: &str) -> String {
    let spaced = href.replace('+', " ");
    let decoded = match urlencoding::decode(&spaced) {
        Ok(s) => s.into_owned(),
        Err(_) => spaced,
    };
    decoded.trim_start_matches('/').to_string()
}

/// Resolves `href` against the listing page URL.
///
/// Absolute `http`/`https` hrefs pass through; anything else is appended to
/// `base` with exactly one slash between them.
pub fn resolve_url(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    let base = base.trim_end_matches('/');
    let href = href.strip_prefix('/').unwrap_or(href);
    format!("{base}/{href}")
}

/// Returns the file extension (with dot, lower-cased) that appears most often
/// among `hrefs`, or an empty string when none has one.
///
/// Extensions are 1-4 ASCII alphanumerics after the last dot. Ties go to the
/// extension seen first.
pub fn most_common_extension<S: AsRef<str>>(hrefs: &[S]) -> String {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (order, href) in hrefs.iter().enumerate() {
        let Some(ext) = extension_of(href.as_ref()) else {
            continue;
        };
        counts.entry(ext).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, oa)), (_, (cb, ob))| ca.cmp(cb).then(ob.cmp(oa)))
        .map(|(ext, _)| ext)
        .unwrap_or_default()
}

fn extension_of(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 4 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwanted_markers_are_case_folded_substrings() {
        assert!(is_unwanted("game (demo).zip"));
        assert!(is_unwanted("game (beta 3) (usa).zip"));
        assert!(is_unwanted("game (virtual console).zip"));
        assert!(!is_unwanted("demolition man (usa).zip"));
        assert!(!is_unwanted("game (usa).zip"));
    }

    #[test]
    fn normalize_extension_adds_dot() {
        assert_eq!(normalize_extension("zip"), ".zip");
        assert_eq!(normalize_extension(".7z"), ".7z");
        assert_eq!(normalize_extension(""), "");
    }

    #[test]
    fn decode_href_handles_plus_and_percent() {
        assert_eq!(decode_href("Pok%C3%A9mon+Red+(USA).zip"), "Pokémon Red (USA).zip");
        assert_eq!(decode_href("/a%2Fb.zip"), "a/b.zip");
    }

    #[test]
    fn resolve_url_variants() {
        assert_eq!(resolve_url("http://h/dir", "a.zip"), "http://h/dir/a.zip");
        assert_eq!(resolve_url("http://h/dir/", "/a.zip"), "http://h/dir/a.zip");
        assert_eq!(resolve_url("http://h/dir/", "https://cdn/a.zip"), "https://cdn/a.zip");
    }

    #[test]
    fn most_common_extension_counts_and_breaks_ties() {
        let hrefs = ["a.zip", "b.7z", "c.ZIP", "d.7z", "../", "e.zip?x=1"];
        assert_eq!(most_common_extension(&hrefs), ".zip");
        let tie = ["a.7z", "b.zip"];
        assert_eq!(most_common_extension(&tie), ".7z");
        let none: [&str; 2] = ["../", "index.html5x"];
        assert_eq!(most_common_extension(&none), "");
    }
}
