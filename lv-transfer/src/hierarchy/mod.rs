//! Region hierarchy model
//!
//! The state → county → city → neighborhood forest: slug identity, name
//! normalization, and resolve-or-create deduplication shared by CSV
//! ingestion.

pub mod resolver;
pub mod slug;
pub mod states;

pub use resolver::{resolve_or_create, NewRegion, Resolution, ResolutionCache, ResolvedRegion};
pub use slug::slugify;
pub use states::normalize_state_name;

use thiserror::Error;

/// Hierarchy errors
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// Name produces no slug characters
    #[error("Name '{0}' does not produce a usable slug")]
    EmptySlug(String),

    /// Every slug candidate is held by a region of another type
    #[error("Slug '{slug}' and its qualified form are taken by other region types (wanted {region_type})")]
    SlugTaken {
        slug: String,
        region_type: lv_common::RegionType,
    },

    #[error(transparent)]
    Common(#[from] lv_common::Error),
}

impl From<sqlx::Error> for HierarchyError {
    fn from(e: sqlx::Error) -> Self {
        HierarchyError::Common(lv_common::Error::Database(e))
    }
}

/// Suffixes that already name a county-level unit
const COUNTY_SUFFIXES: [&str; 3] = ["county", "parish", "borough"];

/// Display name of a county node: "Alachua" → "Alachua County"
pub fn county_display_name(county: &str) -> String {
    let trimmed = county.trim();
    let lower = trimmed.to_lowercase();

    if COUNTY_SUFFIXES
        .iter()
        .any(|suffix| lower == *suffix || lower.ends_with(&format!(" {}", suffix)))
    {
        trimmed.to_string()
    } else {
        format!("{} County", trimmed)
    }
}

/// Neighborhood name for a row, if the community is distinct from its city
///
/// Comparison is case-sensitive after trimming; an empty community maps to the city.
pub fn neighborhood_name<'a>(community: &'a str, city: &str) -> Option<&'a str> {
    let community = community.trim();
    if community.is_empty() || community == city.trim() {
        None
    } else {
        Some(community)
    }
}
