//! Operation results reported to the operator

use std::collections::BTreeMap;

use lv_common::RegionType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CSV row that was not ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub reason: String,
}

/// Result of one CSV region ingestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub rows_read: usize,
    pub skipped: Vec<SkippedRow>,
    /// Newly created regions per type
    pub created: BTreeMap<RegionType, usize>,
    /// Lookups answered by an existing region
    pub reused: usize,
    pub geocoding_enqueued: usize,
    /// Ids of the created regions, in creation order
    #[serde(skip)]
    pub created_ids: Vec<Uuid>,
}

impl IngestSummary {
    pub fn created_total(&self) -> usize {
        self.created.values().sum()
    }

    pub fn created_of(&self, region_type: RegionType) -> usize {
        self.created.get(&region_type).copied().unwrap_or(0)
    }
}

/// Result of one archive import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub regions_created: usize,
    pub regions_reused: usize,
    pub businesses_created: usize,
    pub businesses_replaced: usize,
    pub businesses_skipped: usize,
    pub duration_ms: u64,
}

/// Result of writing an export archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Archive file name inside the storage directory
    pub file_name: String,
    pub business_count: usize,
    pub region_count: usize,
    pub chunk_count: usize,
    pub size_bytes: u64,
}
