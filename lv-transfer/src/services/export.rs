//! Export preview, snapshot and archive writing
//!
//! A snapshot is the filtered business set plus every region those
//! businesses reference and all of their ancestors, read inside one
//! transaction. Regions are ordered by depth in the forest and then by slug,
//! so every parent precedes its children in `regions.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lv_common::{Business, Region};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{businesses, regions};
use crate::models::{ExportFilters, ExportReport};
use crate::services::archive::{
    write_archive, ArchiveBusiness, ArchiveError, ArchiveMetadata, ArchiveRegion, TransferArchive,
};

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Region {0} is referenced but does not exist")]
    MissingRegion(Uuid),

    #[error("Region {child} has parent {parent}, which does not exist")]
    DanglingParent { child: Uuid, parent: Uuid },

    #[error("Region hierarchy contains a cycle through {0}")]
    Cycle(Uuid),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Archive writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Common(#[from] lv_common::Error),
}

impl From<sqlx::Error> for ExportError {
    fn from(e: sqlx::Error) -> Self {
        ExportError::Common(lv_common::Error::Database(e))
    }
}

/// Consistent view of the data an export will contain
#[derive(Debug, Clone)]
pub struct ExportSnapshot {
    pub businesses: Vec<Business>,
    /// Parent-before-child
    pub regions: Vec<Region>,
}

/// Export service
pub struct ExportService {
    db: SqlitePool,
}

impl ExportService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Number of businesses an export with these filters would contain
    pub async fn preview(&self, filters: &ExportFilters) -> Result<i64, ExportError> {
        let count = businesses::count_filtered(&self.db, filters).await?;
        tracing::debug!(
            region_id = ?filters.region_id,
            status = ?filters.status,
            count,
            "Export preview"
        );
        Ok(count)
    }

    /// Read the filtered businesses and their ancestor-inclusive regions
    pub async fn snapshot(&self, filters: &ExportFilters) -> Result<ExportSnapshot, ExportError> {
        let mut tx = self.db.begin().await?;

        let businesses = businesses::load_filtered(&mut tx, filters).await?;
        let seeds = businesses.iter().flat_map(|b| b.region_ids.iter().copied());
        let closure = ancestor_closure(&mut tx, seeds).await?;

        tx.commit().await?;

        let regions = order_parent_first(closure)?;

        Ok(ExportSnapshot { businesses, regions })
    }

    /// Write an archive of the filtered data to `dest`
    pub async fn export_to_file(
        &self,
        filters: &ExportFilters,
        dest: &Path,
        chunk_size: usize,
    ) -> Result<ExportReport, ExportError> {
        let snapshot = self.snapshot(filters).await?;

        let mut metadata = ArchiveMetadata::new(lv_common::time::now());
        metadata.business_count = Some(snapshot.businesses.len());
        metadata.region_count = Some(snapshot.regions.len());
        metadata.filters = Some(filters.clone());

        let archive = TransferArchive {
            metadata,
            regions: snapshot.regions.iter().map(ArchiveRegion::from).collect(),
            businesses: snapshot.businesses.iter().map(ArchiveBusiness::from).collect(),
        };

        let business_count = archive.businesses.len();
        let region_count = archive.regions.len();
        let path: PathBuf = dest.to_path_buf();

        let written =
            tokio::task::spawn_blocking(move || write_archive(&path, &archive, chunk_size)).await??;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!(
            file_name = %file_name,
            businesses = business_count,
            regions = region_count,
            chunks = written.chunk_count,
            "Export complete"
        );

        Ok(ExportReport {
            file_name,
            business_count,
            region_count,
            chunk_count: written.chunk_count,
            size_bytes: written.size_bytes,
        })
    }
}

/// Load `seeds` and all of their ancestors
async fn ancestor_closure(
    conn: &mut SqliteConnection,
    seeds: impl Iterator<Item = Uuid>,
) -> Result<HashMap<Uuid, Region>, ExportError> {
    let mut found: HashMap<Uuid, Region> = HashMap::new();
    // (region to load, child that referenced it)
    let mut frontier: Vec<(Uuid, Option<Uuid>)> = seeds.map(|id| (id, None)).collect();

    while let Some((id, child)) = frontier.pop() {
        if found.contains_key(&id) {
            continue;
        }

        let region = match regions::find_by_id(&mut *conn, id).await? {
            Some(region) => region,
            None => {
                return Err(match child {
                    Some(child) => ExportError::DanglingParent { child, parent: id },
                    None => ExportError::MissingRegion(id),
                })
            }
        };

        if let Some(parent) = region.parent_id {
            frontier.push((parent, Some(id)));
        }
        found.insert(id, region);
    }

    Ok(found)
}

/// Order a closed region set so every parent precedes its children
///
/// Sort key is (depth in the forest, slug). Depth is structural, counted
/// along parent links, so it holds even for a neighborhood hanging directly
/// off a state.
pub fn order_parent_first(regions: HashMap<Uuid, Region>) -> Result<Vec<Region>, ExportError> {
    let mut keyed = Vec::with_capacity(regions.len());

    for region in regions.values() {
        let mut depth = 0usize;
        let mut current = region;

        while let Some(parent_id) = current.parent_id {
            depth += 1;
            if depth > regions.len() {
                return Err(ExportError::Cycle(region.id));
            }
            current = regions.get(&parent_id).ok_or(ExportError::DanglingParent {
                child: current.id,
                parent: parent_id,
            })?;
        }

        keyed.push((depth, region.slug.clone(), region.id));
    }

    keyed.sort();

    let mut regions = regions;
    Ok(keyed
        .into_iter()
        .filter_map(|(_, _, id)| regions.remove(&id))
        .collect())
}
