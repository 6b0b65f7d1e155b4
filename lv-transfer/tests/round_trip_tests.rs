//! End-to-end export → archive → import tests
//!
//! Tests cover:
//! - Lossless transfer into an empty store with preserved ids
//! - Transfer into an empty store with fresh ids
//! - Parent-before-child ordering of exported regions
//! - Re-importing an archive into its own source store

mod helpers;

use std::collections::HashMap;

use helpers::{claim_business, create_test_db, seed_business, seed_gainesville, seed_region, workspace_of};
use lv_common::{BusinessStatus, RegionType};
use lv_transfer::db::{businesses, regions};
use lv_transfer::models::{ExportFilters, ImportOptions};
use lv_transfer::services::{parse_archive, ExportService, ImportReconciler};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Two cities in two states, three businesses
async fn seed_source(pool: &SqlitePool) -> HashMap<&'static str, Uuid> {
    let (florida, alachua, gainesville) = seed_gainesville(pool).await;
    let duckpond = seed_region(pool, "Duckpond", "duckpond", RegionType::Neighborhood, Some(gainesville.id)).await;
    let texas = seed_region(pool, "Texas", "texas", RegionType::State, None).await;
    let travis = seed_region(pool, "Travis County", "travis-county", RegionType::County, Some(texas.id)).await;
    let austin = seed_region(pool, "Austin", "austin", RegionType::City, Some(travis.id)).await;
    // Not referenced by any business
    seed_region(pool, "Ocala", "ocala", RegionType::City, Some(florida.id)).await;

    let cafe = seed_business(pool, "duckpond-cafe", Some("place-cafe"), BusinessStatus::Active, &[duckpond.id, gainesville.id]).await;
    let books = seed_business(pool, "gville-books", Some("place-books"), BusinessStatus::Pending, &[gainesville.id]).await;
    let tacos = seed_business(pool, "austin-tacos", None, BusinessStatus::Active, &[austin.id]).await;
    claim_business(pool, cafe.id).await;

    HashMap::from([
        ("florida", florida.id),
        ("alachua", alachua.id),
        ("gainesville", gainesville.id),
        ("duckpond", duckpond.id),
        ("texas", texas.id),
        ("austin", austin.id),
        ("cafe", cafe.id),
        ("books", books.id),
        ("tacos", tacos.id),
    ])
}

async fn export_to(pool: &SqlitePool, dir: &std::path::Path, filters: ExportFilters) -> std::path::PathBuf {
    let path = dir.join("transfer.tar.gz");
    ExportService::new(pool.clone())
        .export_to_file(&filters, &path, 2)
        .await
        .unwrap();
    path
}

#[tokio::test]
async fn test_round_trip_with_preserved_ids() {
    let source = create_test_db().await;
    let ids = seed_source(&source).await;
    let dir = tempfile::tempdir().unwrap();
    let path = export_to(&source, dir.path(), ExportFilters::default()).await;

    let target = create_test_db().await;
    let archive = parse_archive(&path).unwrap();
    let options = ImportOptions {
        preserve_uuids: true,
        ..Default::default()
    };
    let summary = ImportReconciler::new(target.clone()).import(&archive, &options).await.unwrap();

    // Ocala is unreferenced and stays behind
    assert_eq!(summary.regions_created, 7);
    assert_eq!(summary.regions_reused, 0);
    assert_eq!(summary.businesses_created, 3);
    assert!(regions::find_by_slug(&target, "ocala").await.unwrap().is_none());

    for slug in ["florida", "alachua-county", "gainesville", "duckpond", "texas", "travis-county", "austin"] {
        let before = regions::find_by_slug(&source, slug).await.unwrap().unwrap();
        let after = regions::find_by_slug(&target, slug).await.unwrap().unwrap();
        assert_eq!(before, after, "region {} changed in transfer", slug);
    }

    let mut conn = target.acquire().await.unwrap();
    let cafe = businesses::find_business(&mut conn, ids["cafe"]).await.unwrap().unwrap();
    drop(conn);
    let mut linked = cafe.region_ids.clone();
    linked.sort();
    let mut expected = vec![ids["duckpond"], ids["gainesville"]];
    expected.sort();
    assert_eq!(linked, expected);
    assert_eq!(cafe.google_place_id.as_deref(), Some("place-cafe"));
    assert_eq!(workspace_of(&target, ids["cafe"]).await, None, "workspace ownership must not transfer");
    assert!(workspace_of(&source, ids["cafe"]).await.is_some());
}

#[tokio::test]
async fn test_round_trip_with_fresh_ids() {
    let source = create_test_db().await;
    let ids = seed_source(&source).await;
    let dir = tempfile::tempdir().unwrap();
    let path = export_to(&source, dir.path(), ExportFilters::default()).await;

    let target = create_test_db().await;
    let archive = parse_archive(&path).unwrap();
    ImportReconciler::new(target.clone())
        .import(&archive, &ImportOptions::default())
        .await
        .unwrap();

    let florida = regions::find_by_slug(&target, "florida").await.unwrap().unwrap();
    let alachua = regions::find_by_slug(&target, "alachua-county").await.unwrap().unwrap();
    let gainesville = regions::find_by_slug(&target, "gainesville").await.unwrap().unwrap();
    assert_ne!(florida.id, ids["florida"]);
    assert_eq!(alachua.parent_id, Some(florida.id));
    assert_eq!(gainesville.parent_id, Some(alachua.id));

    let books_id = businesses::find_id_by_google_place_id(&target, "place-books")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(books_id, ids["books"]);
    assert_eq!(
        businesses::region_ids_for(&target, books_id).await.unwrap(),
        vec![gainesville.id]
    );
    assert_eq!(businesses::count_businesses(&target).await.unwrap(), 3);
}

#[tokio::test]
async fn test_exported_regions_are_parent_first() {
    let source = create_test_db().await;
    seed_source(&source).await;
    let dir = tempfile::tempdir().unwrap();
    let path = export_to(&source, dir.path(), ExportFilters::default()).await;

    let archive = parse_archive(&path).unwrap();

    let position: HashMap<Uuid, usize> = archive
        .regions
        .iter()
        .enumerate()
        .map(|(index, region)| (region.id, index))
        .collect();
    for (index, region) in archive.regions.iter().enumerate() {
        if let Some(parent_id) = region.parent_id {
            let parent_index = position.get(&parent_id).copied();
            assert!(
                matches!(parent_index, Some(p) if p < index),
                "{} appears before its parent",
                region.slug
            );
        }
    }

    let slugs: Vec<&str> = archive.regions.iter().map(|r| r.slug.as_str()).collect();
    assert_eq!(
        slugs,
        vec!["florida", "texas", "alachua-county", "travis-county", "austin", "gainesville", "duckpond"]
    );
}

#[tokio::test]
async fn test_region_filter_exports_ancestors() {
    let source = create_test_db().await;
    let ids = seed_source(&source).await;
    let filters = ExportFilters {
        region_id: Some(ids["duckpond"]),
        status: None,
    };

    let service = ExportService::new(source.clone());
    assert_eq!(service.preview(&filters).await.unwrap(), 1);

    let snapshot = service.snapshot(&filters).await.unwrap();
    assert_eq!(snapshot.businesses.len(), 1);
    let slugs: Vec<&str> = snapshot.regions.iter().map(|r| r.slug.as_str()).collect();
    assert_eq!(slugs, vec!["florida", "alachua-county", "gainesville", "duckpond"]);
}

#[tokio::test]
async fn test_preview_matches_export_count() {
    let source = create_test_db().await;
    seed_source(&source).await;
    let dir = tempfile::tempdir().unwrap();
    let service = ExportService::new(source.clone());

    for status in [None, Some(BusinessStatus::Active), Some(BusinessStatus::Pending), Some(BusinessStatus::Suspended)] {
        let filters = ExportFilters {
            region_id: None,
            status: status.clone(),
        };
        let preview = service.preview(&filters).await.unwrap();
        let report = service
            .export_to_file(&filters, &dir.path().join("count.tar.gz"), 500)
            .await
            .unwrap();
        assert_eq!(preview as usize, report.business_count, "status filter {:?}", status);
    }
}

#[tokio::test]
async fn test_reimport_into_source_changes_nothing() {
    let source = create_test_db().await;
    seed_source(&source).await;
    let dir = tempfile::tempdir().unwrap();
    let path = export_to(&source, dir.path(), ExportFilters::default()).await;
    let regions_before = regions::count_regions(&source).await.unwrap();

    let archive = parse_archive(&path).unwrap();
    let summary = ImportReconciler::new(source.clone())
        .import(&archive, &ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.regions_created, 0);
    assert_eq!(summary.regions_reused, 7);
    // Tacos has no place id, so it is not a duplicate by the dedup key
    assert_eq!(summary.businesses_skipped, 2);
    assert_eq!(summary.businesses_created, 1);
    assert_eq!(regions::count_regions(&source).await.unwrap(), regions_before);
}
