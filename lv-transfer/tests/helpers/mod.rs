//! Test Helper Utilities
//!
//! Shared fixtures for lv-transfer integration tests: in-memory stores,
//! seeded regions/businesses and files on disk.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lv_common::db::init::init_memory_database;
use lv_common::{Business, BusinessStatus, Region, RegionType};
use lv_transfer::db::{businesses, regions};
use sqlx::SqlitePool;
use uuid::Uuid;

/// CSV header used by the community research sheets
pub const CSV_HEADER: &str = "Day,Date,Community,City,County,State,Population,Est_SMBs,Type,Notes";

/// Fresh in-memory store with the full schema
pub async fn create_test_db() -> SqlitePool {
    init_memory_database()
        .await
        .expect("Failed to create in-memory database")
}

/// Insert a region and return it
pub async fn seed_region(
    pool: &SqlitePool,
    name: &str,
    slug: &str,
    region_type: RegionType,
    parent_id: Option<Uuid>,
) -> Region {
    let mut region = Region::new(name.to_string(), slug.to_string(), region_type, parent_id);
    region.is_active = true;
    regions::insert_region(pool, &region)
        .await
        .expect("Failed to seed region");
    region
}

/// Florida → Alachua County → Gainesville
pub async fn seed_gainesville(pool: &SqlitePool) -> (Region, Region, Region) {
    let state = seed_region(pool, "Florida", "florida", RegionType::State, None).await;
    let county = seed_region(pool, "Alachua County", "alachua-county", RegionType::County, Some(state.id)).await;
    let city = seed_region(pool, "Gainesville", "gainesville", RegionType::City, Some(county.id)).await;
    (state, county, city)
}

/// Insert a business linked to `region_ids` and return it
pub async fn seed_business(
    pool: &SqlitePool,
    slug: &str,
    google_place_id: Option<&str>,
    status: BusinessStatus,
    region_ids: &[Uuid],
) -> Business {
    let mut business = Business::new(slug.replace('-', " "), slug.to_string(), status);
    business.google_place_id = google_place_id.map(str::to_string);
    business.city = Some("Gainesville".to_string());
    business.state = Some("FL".to_string());
    business.region_ids = region_ids.to_vec();

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    businesses::insert_business(&mut *conn, &business)
        .await
        .expect("Failed to seed business");
    businesses::set_business_regions(&mut conn, business.id, region_ids)
        .await
        .expect("Failed to link business regions");

    business
}

/// Attach a workspace to a business, as the customer-facing app would
pub async fn claim_business(pool: &SqlitePool, business_id: Uuid) -> Uuid {
    let workspace_id = Uuid::new_v4();
    sqlx::query("UPDATE businesses SET workspace_id = ? WHERE id = ?")
        .bind(workspace_id.to_string())
        .bind(business_id.to_string())
        .execute(pool)
        .await
        .expect("Failed to claim business");
    workspace_id
}

pub async fn workspace_of(pool: &SqlitePool, business_id: Uuid) -> Option<String> {
    sqlx::query_scalar("SELECT workspace_id FROM businesses WHERE id = ?")
        .bind(business_id.to_string())
        .fetch_one(pool)
        .await
        .expect("Failed to read workspace_id")
}

/// Write `rows` below the research-sheet header
pub fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    let mut content = String::from(CSV_HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }

    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write CSV");
    path
}

/// One research-sheet row with only the place columns filled
pub fn place_row(community: &str, city: &str, county: &str, state: &str) -> String {
    format!("Mon,2024-03-04,{},{},{},{},,,,", community, city, county, state)
}

/// Build a `.tar.gz` from `(entry name, contents)` pairs
pub fn write_raw_archive(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).expect("Failed to create archive");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .expect("Failed to append entry");
    }

    builder
        .into_inner()
        .expect("Failed to finish tar")
        .finish()
        .expect("Failed to finish gzip");
}
