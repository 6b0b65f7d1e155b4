//! Unit tests for database initialization
//!
//! Tests cover:
//! - Automatic database creation with the region/business schema
//! - Idempotent re-initialization of an existing database
//! - Schema constraints (slug uniqueness, parent references, non-empty status)

use lv_common::db::init::{init_database, init_memory_database, SCHEMA_VERSION};
use sqlx::SqlitePool;

async fn table_names(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("local_voices.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("local_voices.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(versions, 1, "schema_version must not duplicate on reopen");
}

#[tokio::test]
async fn test_schema_tables_created() {
    let pool = init_memory_database().await.unwrap();

    let tables = table_names(&pool).await;
    for expected in ["business_regions", "businesses", "regions", "schema_version"] {
        assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
    }

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_region_slug_is_unique() {
    let pool = init_memory_database().await.unwrap();

    sqlx::query("INSERT INTO regions (id, name, slug, type) VALUES ('a', 'Florida', 'florida', 'state')")
        .execute(&pool)
        .await
        .unwrap();

    let duplicate = sqlx::query(
        "INSERT INTO regions (id, name, slug, type) VALUES ('b', 'Florida', 'florida', 'state')",
    )
    .execute(&pool)
    .await;

    assert!(duplicate.is_err(), "duplicate slug must be rejected");
}

#[tokio::test]
async fn test_region_parent_must_exist() {
    let pool = init_memory_database().await.unwrap();

    let orphan = sqlx::query(
        "INSERT INTO regions (id, name, slug, type, parent_id) VALUES ('c', 'Alachua County', 'alachua-county', 'county', 'missing')",
    )
    .execute(&pool)
    .await;

    assert!(orphan.is_err(), "foreign key on parent_id must be enforced");
}

#[tokio::test]
async fn test_business_status_constraint() {
    let pool = init_memory_database().await.unwrap();

    let blank = sqlx::query("INSERT INTO businesses (id, name, slug, status) VALUES ('x', 'Cafe', 'cafe', ' ')")
        .execute(&pool)
        .await;
    assert!(blank.is_err(), "blank status must be rejected");

    // Statuses outside the known set are stored as-is
    let other = sqlx::query(
        "INSERT INTO businesses (id, name, slug, status) VALUES ('y', 'Deli', 'deli', 'claimed')",
    )
    .execute(&pool)
    .await;
    assert!(other.is_ok());
}
