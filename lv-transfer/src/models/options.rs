//! Operation options
//!
//! Option structs double as request bodies for the admin API, so every
//! field carries a serde default.

use lv_common::BusinessStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Business selection for preview and export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilters {
    /// Only businesses associated with this region (direct association only)
    #[serde(default)]
    pub region_id: Option<Uuid>,

    /// Only businesses with exactly this status
    #[serde(default)]
    pub status: Option<BusinessStatus>,
}

/// CSV region ingestion options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Enqueue a geocoding task for every created region without coordinates
    #[serde(default)]
    pub enable_geocoding: bool,

    /// Newly created regions are active
    #[serde(default)]
    pub mark_active: bool,

    /// Store Population/Est_SMBs/Type/Notes on newly created cities
    #[serde(default)]
    pub store_metadata: bool,

    /// Existing region that becomes the parent of every created state
    #[serde(default)]
    pub parent_region_id: Option<Uuid>,
}

/// Archive import options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Reuse archive ids for created regions and businesses
    #[serde(default)]
    pub preserve_uuids: bool,

    /// Skip businesses whose google_place_id already exists
    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,

    /// Run the whole import in one transaction (default: true)
    #[serde(default = "default_transactional")]
    pub transactional: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            preserve_uuids: false,
            skip_duplicates: default_skip_duplicates(),
            transactional: default_transactional(),
        }
    }
}

fn default_skip_duplicates() -> bool {
    true
}

fn default_transactional() -> bool {
    true
}
