//! Slug derivation for region and business names

use super::HierarchyError;

/// Derive a URL slug from a display name
///
/// ASCII letters and digits are lowercased and kept; every run of other
/// characters becomes a single `-`; leading and trailing dashes are dropped.
/// Non-ASCII letters are treated as separators.
pub fn slugify(name: &str) -> Result<String, HierarchyError> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '\'' || ch == '\u{2019}' {
            // "St. Mary's" -> "st-marys"
            continue;
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return Err(HierarchyError::EmptySlug(name.to_string()));
    }

    Ok(slug)
}
