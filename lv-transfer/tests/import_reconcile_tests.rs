//! Integration tests for archive import reconciliation
//!
//! Tests cover:
//! - Slug matching against existing regions
//! - google_place_id deduplication and replacement
//! - Id preservation and id conflicts
//! - All-or-nothing versus per-write import modes

mod helpers;

use chrono::Utc;
use helpers::{claim_business, create_test_db, seed_business, seed_gainesville, seed_region, workspace_of};
use lv_common::{BusinessStatus, RegionType};
use lv_transfer::db::{businesses, regions};
use lv_transfer::models::ImportOptions;
use lv_transfer::services::archive::{ArchiveBusiness, ArchiveMetadata, ArchiveRegion};
use lv_transfer::services::{ImportReconciler, ReconcileError, TransferArchive};
use uuid::Uuid;

fn archive_region(name: &str, slug: &str, region_type: RegionType, parent_id: Option<Uuid>) -> ArchiveRegion {
    ArchiveRegion {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: slug.to_string(),
        region_type,
        parent_id,
        description: Some(format!("{} from archive", name)),
        is_active: true,
        display_order: 3,
        metadata: None,
        latitude: None,
        longitude: None,
    }
}

fn archive_business(slug: &str, google_place_id: Option<&str>, region_ids: Vec<Uuid>) -> ArchiveBusiness {
    ArchiveBusiness {
        id: Uuid::new_v4(),
        google_place_id: google_place_id.map(str::to_string),
        name: format!("{} (archived)", slug),
        slug: slug.to_string(),
        status: BusinessStatus::Active,
        city: Some("Gainesville".into()),
        state: Some("FL".into()),
        region_ids,
    }
}

fn archive(regions: Vec<ArchiveRegion>, businesses: Vec<ArchiveBusiness>) -> TransferArchive {
    TransferArchive {
        metadata: ArchiveMetadata::new(Utc::now()),
        regions,
        businesses,
    }
}

/// florida → alachua-county → gainesville, as an archive would carry them
fn gainesville_chain() -> Vec<ArchiveRegion> {
    let state = archive_region("Florida", "florida", RegionType::State, None);
    let county = archive_region("Alachua County", "alachua-county", RegionType::County, Some(state.id));
    let city = archive_region("Gainesville", "gainesville", RegionType::City, Some(county.id));
    vec![state, county, city]
}

#[tokio::test]
async fn test_existing_slugs_are_reused() {
    let pool = create_test_db().await;
    let florida = seed_region(&pool, "Florida", "florida", RegionType::State, None).await;
    let chain = gainesville_chain();
    let city_archive_id = chain[2].id;
    let incoming = archive(chain, vec![archive_business("cafe", Some("p-1"), vec![city_archive_id])]);

    let summary = ImportReconciler::new(pool.clone())
        .import(&incoming, &ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.regions_reused, 1);
    assert_eq!(summary.regions_created, 2);
    assert_eq!(regions::count_by_type(&pool, RegionType::State).await.unwrap(), 1);

    let county = regions::find_by_slug(&pool, "alachua-county").await.unwrap().unwrap();
    assert_eq!(county.parent_id, Some(florida.id));
    assert_eq!(county.display_order, 3);

    // Reused regions keep their own fields
    let kept = regions::find_by_slug(&pool, "florida").await.unwrap().unwrap();
    assert_eq!(kept.description, None);

    let city = regions::find_by_slug(&pool, "gainesville").await.unwrap().unwrap();
    let cafe_id = businesses::find_id_by_google_place_id(&pool, "p-1").await.unwrap().unwrap();
    assert_eq!(businesses::region_ids_for(&pool, cafe_id).await.unwrap(), vec![city.id]);
}

#[tokio::test]
async fn test_duplicates_by_place_id_are_skipped() {
    let pool = create_test_db().await;
    let (_, _, city) = seed_gainesville(&pool).await;
    seed_business(&pool, "existing-0", Some("place-0"), BusinessStatus::Active, &[city.id]).await;
    seed_business(&pool, "existing-1", Some("place-1"), BusinessStatus::Active, &[city.id]).await;

    let chain = gainesville_chain();
    let city_archive_id = chain[2].id;
    let incoming_businesses = (0..5)
        .map(|i| archive_business(&format!("incoming-{}", i), Some(format!("place-{}", i).as_str()), vec![city_archive_id]))
        .collect();
    let incoming = archive(chain, incoming_businesses);

    let summary = ImportReconciler::new(pool.clone())
        .import(&incoming, &ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.businesses_created, 3);
    assert_eq!(summary.businesses_skipped, 2);
    assert_eq!(summary.regions_reused, 3);
    assert_eq!(businesses::count_businesses(&pool).await.unwrap(), 5);

    let kept_id = businesses::find_id_by_google_place_id(&pool, "place-0").await.unwrap().unwrap();
    let mut conn = pool.acquire().await.unwrap();
    let kept = businesses::find_business(&mut conn, kept_id).await.unwrap().unwrap();
    assert_eq!(kept.slug, "existing-0");
}

#[tokio::test]
async fn test_duplicates_are_replaced_when_not_skipped() {
    let pool = create_test_db().await;
    let (_, _, city) = seed_gainesville(&pool).await;
    let existing = seed_business(&pool, "old-cafe", Some("place-cafe"), BusinessStatus::Pending, &[city.id]).await;
    claim_business(&pool, existing.id).await;

    let chain = gainesville_chain();
    let city_archive_id = chain[2].id;
    let incoming = archive(
        chain,
        vec![archive_business("new-cafe", Some("place-cafe"), vec![city_archive_id, city_archive_id])],
    );
    let options = ImportOptions {
        skip_duplicates: false,
        ..Default::default()
    };

    let summary = ImportReconciler::new(pool.clone()).import(&incoming, &options).await.unwrap();

    assert_eq!(summary.businesses_replaced, 1);
    assert_eq!(summary.businesses_created, 0);
    assert_eq!(businesses::count_businesses(&pool).await.unwrap(), 1);

    let mut conn = pool.acquire().await.unwrap();
    let replaced = businesses::find_business(&mut conn, existing.id).await.unwrap().unwrap();
    drop(conn);
    assert_eq!(replaced.slug, "new-cafe");
    assert_eq!(replaced.status, BusinessStatus::Active);
    assert_eq!(replaced.region_ids, vec![city.id]);
    assert_eq!(workspace_of(&pool, existing.id).await, None);
}

#[tokio::test]
async fn test_preserved_id_replaces_business_without_place_id() {
    let pool = create_test_db().await;
    let (_, _, city) = seed_gainesville(&pool).await;
    let existing = seed_business(&pool, "pop-up", None, BusinessStatus::Inactive, &[city.id]).await;

    let chain = gainesville_chain();
    let city_archive_id = chain[2].id;
    let mut incoming_business = archive_business("pop-up-returns", None, vec![city_archive_id]);
    incoming_business.id = existing.id;
    let options = ImportOptions {
        preserve_uuids: true,
        skip_duplicates: true,
        transactional: true,
    };

    let summary = ImportReconciler::new(pool.clone())
        .import(&archive(chain, vec![incoming_business]), &options)
        .await
        .unwrap();

    assert_eq!(summary.businesses_replaced, 1);
    assert_eq!(businesses::count_businesses(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_parent_fails_before_any_write() {
    let pool = create_test_db().await;
    let state = archive_region("Florida", "florida", RegionType::State, None);
    let orphan = archive_region("Ocala", "ocala", RegionType::City, Some(Uuid::new_v4()));

    let result = ImportReconciler::new(pool.clone())
        .import(&archive(vec![state, orphan], vec![]), &ImportOptions::default())
        .await;

    assert!(matches!(result, Err(ReconcileError::UnknownParent { ref slug, .. }) if slug == "ocala"));
    assert_eq!(regions::count_regions(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_region_reference_fails() {
    let pool = create_test_db().await;
    let incoming = archive(
        gainesville_chain(),
        vec![archive_business("cafe", Some("p-1"), vec![Uuid::new_v4()])],
    );

    let result = ImportReconciler::new(pool.clone())
        .import(&incoming, &ImportOptions::default())
        .await;

    assert!(matches!(result, Err(ReconcileError::UnknownRegionReference { .. })));
    assert_eq!(regions::count_regions(&pool).await.unwrap(), 0);
}

/// Archive whose county reuses the id of an unrelated existing region
async fn conflicting_archive(pool: &sqlx::SqlitePool) -> TransferArchive {
    let unrelated = seed_region(pool, "Marion County", "marion-county", RegionType::County, None).await;
    let mut chain = gainesville_chain();
    chain[1].id = unrelated.id;
    chain[2].parent_id = Some(unrelated.id);
    archive(chain, vec![])
}

#[tokio::test]
async fn test_id_conflict_rolls_back_transactional_import() {
    let pool = create_test_db().await;
    let incoming = conflicting_archive(&pool).await;
    let options = ImportOptions {
        preserve_uuids: true,
        ..Default::default()
    };

    let result = ImportReconciler::new(pool.clone()).import(&incoming, &options).await;

    assert!(matches!(
        result,
        Err(ReconcileError::IdConflict { ref existing_slug, .. }) if existing_slug == "marion-county"
    ));
    // Only the pre-existing region remains; Florida was rolled back
    assert_eq!(regions::count_regions(&pool).await.unwrap(), 1);
    assert!(regions::find_by_slug(&pool, "florida").await.unwrap().is_none());
}

#[tokio::test]
async fn test_id_conflict_keeps_earlier_writes_without_transaction() {
    let pool = create_test_db().await;
    let incoming = conflicting_archive(&pool).await;
    let options = ImportOptions {
        preserve_uuids: true,
        skip_duplicates: true,
        transactional: false,
    };

    let result = ImportReconciler::new(pool.clone()).import(&incoming, &options).await;

    assert!(matches!(result, Err(ReconcileError::IdConflict { .. })));
    assert_eq!(regions::count_regions(&pool).await.unwrap(), 2);
    assert!(regions::find_by_slug(&pool, "florida").await.unwrap().is_some());
}

#[tokio::test]
async fn test_imported_businesses_are_unowned() {
    let pool = create_test_db().await;
    let chain = gainesville_chain();
    let city_archive_id = chain[2].id;
    let incoming = archive(chain, vec![archive_business("cafe", Some("p-1"), vec![city_archive_id])]);

    ImportReconciler::new(pool.clone())
        .import(&incoming, &ImportOptions::default())
        .await
        .unwrap();

    let id = businesses::find_id_by_google_place_id(&pool, "p-1").await.unwrap().unwrap();
    assert_eq!(workspace_of(&pool, id).await, None);
}
