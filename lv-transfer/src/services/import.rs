//! Import reconciler
//!
//! Merges a parsed [`TransferArchive`] into the store. Regions are matched by
//! slug and businesses by `google_place_id` (or by id when ids are
//! preserved). Archive ids are translated through a map that lives for one
//! call only.
//!
//! The archive is validated before the first write: every region parent must
//! appear earlier in `regions.json`, and every business region reference must
//! name a region in the archive.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{businesses, regions};
use crate::models::{ImportOptions, ImportSummary};
use crate::services::archive::TransferArchive;

/// Reconciliation errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Region '{slug}' ({id}) references parent {parent_id}, which is not in the archive")]
    UnknownParent { id: Uuid, slug: String, parent_id: Uuid },

    #[error("Region '{slug}' ({id}) appears before its parent {parent_id}")]
    ParentAfterChild { id: Uuid, slug: String, parent_id: Uuid },

    #[error("Business '{slug}' ({id}) references region {region_id}, which is not in the archive")]
    UnknownRegionReference { id: Uuid, slug: String, region_id: Uuid },

    #[error("Archive lists region id {0} more than once")]
    DuplicateRegionId(Uuid),

    #[error("Region '{slug}' would reuse id {id}, which belongs to existing region '{existing_slug}'")]
    IdConflict { id: Uuid, slug: String, existing_slug: String },

    #[error(transparent)]
    Common(#[from] lv_common::Error),
}

impl From<sqlx::Error> for ReconcileError {
    fn from(e: sqlx::Error) -> Self {
        ReconcileError::Common(lv_common::Error::Database(e))
    }
}

/// Check archive-internal references
pub fn validate(archive: &TransferArchive) -> Result<(), ReconcileError> {
    let mut position: HashMap<Uuid, usize> = HashMap::with_capacity(archive.regions.len());
    for (index, region) in archive.regions.iter().enumerate() {
        if position.insert(region.id, index).is_some() {
            return Err(ReconcileError::DuplicateRegionId(region.id));
        }
    }

    for (index, region) in archive.regions.iter().enumerate() {
        let Some(parent_id) = region.parent_id else {
            continue;
        };
        match position.get(&parent_id) {
            None => {
                return Err(ReconcileError::UnknownParent {
                    id: region.id,
                    slug: region.slug.clone(),
                    parent_id,
                })
            }
            Some(&parent_index) if parent_index >= index => {
                return Err(ReconcileError::ParentAfterChild {
                    id: region.id,
                    slug: region.slug.clone(),
                    parent_id,
                })
            }
            Some(_) => {}
        }
    }

    for business in &archive.businesses {
        if let Some(region_id) = business
            .region_ids
            .iter()
            .find(|id| !position.contains_key(id))
        {
            return Err(ReconcileError::UnknownRegionReference {
                id: business.id,
                slug: business.slug.clone(),
                region_id: *region_id,
            });
        }
    }

    Ok(())
}

/// Import reconciler
pub struct ImportReconciler {
    db: SqlitePool,
}

impl ImportReconciler {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Merge `archive` into the store
    ///
    /// With `options.transactional` the whole import commits or rolls back
    /// as one unit; otherwise every write commits on its own.
    pub async fn import(
        &self,
        archive: &TransferArchive,
        options: &ImportOptions,
    ) -> Result<ImportSummary, ReconcileError> {
        validate(archive)?;

        let start = Instant::now();
        tracing::info!(
            regions = archive.regions.len(),
            businesses = archive.businesses.len(),
            preserve_uuids = options.preserve_uuids,
            skip_duplicates = options.skip_duplicates,
            transactional = options.transactional,
            "Starting archive import"
        );

        let mut summary = if options.transactional {
            let mut tx = self.db.begin().await?;
            let summary = reconcile(&mut tx, archive, options).await?;
            tx.commit().await?;
            summary
        } else {
            let mut conn = self.db.acquire().await?;
            reconcile(&mut conn, archive, options).await?
        };

        summary.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            regions_created = summary.regions_created,
            regions_reused = summary.regions_reused,
            businesses_created = summary.businesses_created,
            businesses_replaced = summary.businesses_replaced,
            businesses_skipped = summary.businesses_skipped,
            duration_ms = summary.duration_ms,
            "Archive import complete"
        );

        Ok(summary)
    }
}

async fn reconcile(
    conn: &mut SqliteConnection,
    archive: &TransferArchive,
    options: &ImportOptions,
) -> Result<ImportSummary, ReconcileError> {
    let mut summary = ImportSummary::default();
    let mut id_map: HashMap<Uuid, Uuid> = HashMap::with_capacity(archive.regions.len());

    for incoming in &archive.regions {
        if let Some(existing) = regions::find_by_slug(&mut *conn, &incoming.slug).await? {
            tracing::debug!(slug = %incoming.slug, id = %existing.id, "Reusing region");
            id_map.insert(incoming.id, existing.id);
            summary.regions_reused += 1;
            continue;
        }

        let parent_id = match incoming.parent_id {
            Some(archive_parent) => Some(*id_map.get(&archive_parent).ok_or_else(|| {
                ReconcileError::UnknownParent {
                    id: incoming.id,
                    slug: incoming.slug.clone(),
                    parent_id: archive_parent,
                }
            })?),
            None => None,
        };

        let id = if options.preserve_uuids {
            if let Some(holder) = regions::find_by_id(&mut *conn, incoming.id).await? {
                return Err(ReconcileError::IdConflict {
                    id: incoming.id,
                    slug: incoming.slug.clone(),
                    existing_slug: holder.slug,
                });
            }
            incoming.id
        } else {
            lv_common::uuid_utils::generate()
        };

        regions::insert_region(&mut *conn, &incoming.to_region(id, parent_id)).await?;
        tracing::debug!(slug = %incoming.slug, id = %id, "Created region");
        id_map.insert(incoming.id, id);
        summary.regions_created += 1;
    }

    for incoming in &archive.businesses {
        let existing_by_place = match &incoming.google_place_id {
            Some(place_id) => businesses::find_id_by_google_place_id(&mut *conn, place_id).await?,
            None => None,
        };

        if options.skip_duplicates && existing_by_place.is_some() {
            tracing::debug!(slug = %incoming.slug, "Skipping duplicate business");
            summary.businesses_skipped += 1;
            continue;
        }

        let mut seen = HashSet::new();
        let region_ids: Vec<Uuid> = incoming
            .region_ids
            .iter()
            .filter_map(|archive_id| id_map.get(archive_id).copied())
            .filter(|id| seen.insert(*id))
            .collect();

        let replace_target = if existing_by_place.is_some() {
            existing_by_place
        } else if options.preserve_uuids && businesses::business_exists(&mut *conn, incoming.id).await? {
            Some(incoming.id)
        } else {
            None
        };

        match replace_target {
            Some(target) => {
                let business = incoming.to_business(target, region_ids);
                businesses::replace_business(&mut *conn, target, &business).await?;
                businesses::set_business_regions(&mut *conn, target, &business.region_ids).await?;
                summary.businesses_replaced += 1;
            }
            None => {
                let id = if options.preserve_uuids {
                    incoming.id
                } else {
                    lv_common::uuid_utils::generate()
                };
                let business = incoming.to_business(id, region_ids);
                businesses::insert_business(&mut *conn, &business).await?;
                businesses::set_business_regions(&mut *conn, id, &business.region_ids).await?;
                summary.businesses_created += 1;
            }
        }
    }

    Ok(summary)
}
