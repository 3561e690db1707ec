//! Plain-text listing files handed over by the fetch collaborator.
//!
//! Each non-empty line is either `name<TAB>url` or a raw href that is resolved
//! against a base URL. Lines starting with `#` are comments.

use std::fs;
use std::path::Path;

use super::ingest::{decode_href, normalize_extension, resolve_url};
use super::{Catalog, CatalogEntry, CatalogError};

/// Loads a catalog from a listing file.
///
/// `base_url` is required only when the file contains bare hrefs.
pub fn load_listing_file(
    path: &Path,
    base_url: Option<&str>,
    extension: &str,
) -> Result<Catalog, CatalogError> {
    let data = fs::read_to_string(path)?;
    parse_listing(&data, base_url, extension)
}

pub(crate) fn parse_listing(
    data: &str,
    base_url: Option<&str>,
    extension: &str,
) -> Result<Catalog, CatalogError> {
    if let Some(base) = base_url {
        url::Url::parse(base).map_err(|source| CatalogError::InvalidBaseUrl {
            url: base.to_string(),
            source,
        })?;
    }
    let extension = normalize_extension(extension);
    let mut entries = Vec::new();
    for (idx, raw) in data.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = match line.split_once('\t') {
            Some((name, url)) => CatalogEntry::new(name.trim(), url.trim()),
            None => {
                let Some(base) = base_url else {
                    return Err(CatalogError::MalformedLine {
                        line: idx + 1,
                        reason: "bare href needs a base URL".to_string(),
                    });
                };
                CatalogEntry::new(decode_href(line), resolve_url(base, line))
            }
        };
        if !extension.is_empty() && !entry.display_name().ends_with(&extension) {
            continue;
        }
        entries.push(entry);
    }
    Ok(Catalog::new(entries))
}
