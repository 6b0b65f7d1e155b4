//! Region database operations

use lv_common::db::models::round_coordinate;
use lv_common::uuid_utils::parse_stored;
use lv_common::{Error, Region, RegionType, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

const REGION_COLUMNS: &str = "id, name, slug, type, parent_id, description, is_active, \
                              display_order, metadata, latitude, longitude";

/// Map a `regions` row to a [`Region`]
pub fn region_from_row(row: &SqliteRow) -> Result<Region> {
    let id: String = row.try_get("id")?;
    let region_type: String = row.try_get("type")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    let metadata = match metadata {
        Some(text) => Some(serde_json::from_str(&text).map_err(|e| Error::CorruptRow {
            column: "regions.metadata",
            detail: format!("region {}: {}", id, e),
        })?),
        None => None,
    };

    Ok(Region {
        id: parse_stored("regions.id", &id)?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        region_type: region_type
            .parse::<RegionType>()
            .map_err(|e| Error::CorruptRow {
                column: "regions.type",
                detail: format!("region {}: {}", id, e),
            })?,
        parent_id: parent_id
            .as_deref()
            .map(|p| parse_stored("regions.parent_id", p))
            .transpose()?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        display_order: row.try_get("display_order")?,
        metadata,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
    })
}

/// Insert a new region
///
/// The parent (if any) must already exist; the foreign key rejects the insert otherwise.
pub async fn insert_region<'e, E>(executor: E, region: &Region) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let metadata = region
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO regions (
            id, name, slug, type, parent_id, description, is_active,
            display_order, metadata, latitude, longitude, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(region.id.to_string())
    .bind(&region.name)
    .bind(&region.slug)
    .bind(region.region_type.as_str())
    .bind(region.parent_id.map(|p| p.to_string()))
    .bind(&region.description)
    .bind(region.is_active)
    .bind(region.display_order)
    .bind(metadata)
    .bind(region.latitude.map(round_coordinate))
    .bind(region.longitude.map(round_coordinate))
    .execute(executor)
    .await?;

    Ok(())
}

/// Load region by slug
pub async fn find_by_slug<'e, E>(executor: E, slug: &str) -> Result<Option<Region>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM regions WHERE slug = ?", REGION_COLUMNS))
        .bind(slug)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(region_from_row).transpose()
}

/// Load region by id
pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Region>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM regions WHERE id = ?", REGION_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(region_from_row).transpose()
}

/// Number of regions in the store
pub async fn count_regions<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM regions")
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// Number of regions of one type
pub async fn count_by_type<'e, E>(executor: E, region_type: RegionType) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM regions WHERE type = ?")
        .bind(region_type.as_str())
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// Set coordinates on a region that has none yet
///
/// Returns `false` when the region is gone or already geocoded.
pub async fn update_coordinates<'e, E>(
    executor: E,
    id: Uuid,
    latitude: f64,
    longitude: f64,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE regions
        SET latitude = ?, longitude = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND (latitude IS NULL OR longitude IS NULL)
        "#,
    )
    .bind(round_coordinate(latitude))
    .bind(round_coordinate(longitude))
    .bind(id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lv_common::db::init::init_memory_database;

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let pool = init_memory_database().await.unwrap();

        let state = Region::new("Florida".into(), "florida".into(), RegionType::State, None);
        let mut county = Region::new(
            "Alachua County".into(),
            "alachua-county".into(),
            RegionType::County,
            Some(state.id),
        );
        county.metadata = Some(serde_json::json!({"csv_data": {"population": 278468}}));
        county.latitude = Some(29.674_836_123_4);

        insert_region(&pool, &state).await.unwrap();
        insert_region(&pool, &county).await.unwrap();

        let loaded = find_by_slug(&pool, "alachua-county").await.unwrap().unwrap();
        assert_eq!(loaded.id, county.id);
        assert_eq!(loaded.parent_id, Some(state.id));
        assert_eq!(loaded.region_type, RegionType::County);
        assert_eq!(loaded.metadata, county.metadata);
        assert_eq!(loaded.latitude, Some(29.6748361));

        assert!(find_by_id(&pool, Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(count_regions(&pool).await.unwrap(), 2);
        assert_eq!(count_by_type(&pool, RegionType::State).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_metadata_is_reported_as_corrupt() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO regions (id, name, slug, type, metadata) VALUES (?, 'Ocala', 'ocala', 'city', '{broken')")
            .bind(Uuid::new_v4().to_string())
            .execute(&pool)
            .await
            .unwrap();

        let err = find_by_slug(&pool, "ocala").await.unwrap_err();
        assert!(matches!(err, Error::CorruptRow { column: "regions.metadata", .. }));
    }

    #[tokio::test]
    async fn test_update_coordinates_only_once() {
        let pool = init_memory_database().await.unwrap();
        let city = Region::new("Gainesville".into(), "gainesville".into(), RegionType::City, None);
        insert_region(&pool, &city).await.unwrap();

        assert!(update_coordinates(&pool, city.id, 29.65, -82.32).await.unwrap());
        assert!(!update_coordinates(&pool, city.id, 1.0, 1.0).await.unwrap());
        assert!(!update_coordinates(&pool, Uuid::new_v4(), 1.0, 1.0).await.unwrap());

        let loaded = find_by_id(&pool, city.id).await.unwrap().unwrap();
        assert_eq!(loaded.latitude, Some(29.65));
        assert_eq!(loaded.longitude, Some(-82.32));
    }
}
