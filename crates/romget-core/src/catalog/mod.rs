//! Catalog of files discovered in a remote directory listing.
//!
//! The listing fetch itself lives outside this crate; it hands over `(name, url)`
//! pairs or raw hrefs, and the catalog applies the ingestion rules once:
//! URL decoding, extension filter, and the unwanted-entry block-list.

mod ingest;
mod listing;

use serde::Serialize;
use thiserror::Error;

pub use ingest::{decode_href, is_unwanted, most_common_extension, normalize_extension, resolve_url};
pub use listing::load_listing_file;

/// Errors raised while turning listing input into a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("listing line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("listing file: {0}")]
    Io(#[from] std::io::Error),
}

/// One discoverable remote file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    display_name: String,
    source_url: String,
    #[serde(skip)]
    folded_name: String,
}

impl CatalogEntry {
    pub fn new(display_name: impl Into<String>, source_url: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let folded_name = display_name.to_lowercase();
        Self {
            display_name,
            source_url: source_url.into(),
            folded_name,
        }
    }

    /// Decoded href text, used as the local filename.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Lower-cased copy of the name used for matching.
    pub fn folded_name(&self) -> &str {
        &self.folded_name
    }
}

/// Ordered entries for the currently connected source.
///
/// Replaced wholesale on every (re)connect; search and the download queue only
/// borrow it per call.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from already-decoded entries, dropping unwanted ones.
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| !is_unwanted(e.folded_name()))
            .collect();
        Self { entries }
    }

    /// Builds a catalog from raw hrefs of a listing page at `base_url`.
    ///
    /// Only hrefs ending in `extension` are kept (all of them when the extension
    /// is empty). Names are URL-decoded and URLs resolved against `base_url`.
    pub fn from_links<S: AsRef<str>>(
        base_url: &str,
        hrefs: &[S],
        extension: &str,
    ) -> Result<Self, CatalogError> {
        url::Url::parse(base_url).map_err(|source| CatalogError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        let extension = normalize_extension(extension);
        let entries: Vec<CatalogEntry> = hrefs
            .iter()
            .map(AsRef::as_ref)
            .filter(|href| extension.is_empty() || href.ends_with(&extension))
            .map(|href| CatalogEntry::new(decode_href(href), resolve_url(base_url, href)))
            .collect();
        let catalog = Self::new(entries);
        tracing::debug!(
            base_url,
            extension = %extension,
            links = hrefs.len(),
            kept = catalog.len(),
            "catalog ingested"
        );
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_drops_unwanted_entries() {
        let catalog = Catalog::new([
            CatalogEntry::new("Tetris (World).zip", "u1"),
            CatalogEntry::new("Tetris (Demo).zip", "u2"),
            CatalogEntry::new("Zelda (USA) (Beta 2).zip", "u3"),
            CatalogEntry::new("Mario (Virtual Console).zip", "u4"),
        ]);
        let names: Vec<_> = catalog.entries().iter().map(|e| e.display_name()).collect();
        assert_eq!(names, vec!["Tetris (World).zip"]);
    }

    #[test]
    fn from_links_filters_decodes_and_resolves() {
        let hrefs = [
            "Super%20Mario%20Land%20(World).zip",
            "/Tetris+(Japan).zip",
            "readme.txt",
            "../",
            "Kirby%20(USA)%20(Sample).zip",
        ];
        let catalog = Catalog::from_links("https://example.org/gb", &hrefs, "zip").unwrap();
        assert_eq!(catalog.len(), 2);
        let first = &catalog.entries()[0];
        assert_eq!(first.display_name(), "Super Mario Land (World).zip");
        assert_eq!(
            first.source_url(),
            "https://example.org/gb/Super%20Mario%20Land%20(World).zip"
        );
        assert_eq!(first.folded_name(), "super mario land (world).zip");
        let second = &catalog.entries()[1];
        assert_eq!(second.display_name(), "Tetris (Japan).zip");
        assert_eq!(second.source_url(), "https://example.org/gb/Tetris+(Japan).zip");
    }

    #[test]
    fn from_links_rejects_bad_base_url() {
        let err = Catalog::from_links("not a url", &["a.zip"], "").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn empty_extension_keeps_everything_wanted() {
        let catalog = Catalog::from_links("http://h/", &["a.zip", "b.7z"], "").unwrap();
        assert_eq!(catalog.len(), 2);
    }
}
