//! Business database operations
//!
//! Businesses and their `business_regions` associations. Exported snapshots
//! and previews share one filter clause so the preview count always matches
//! the exported set.

use std::collections::HashMap;

use lv_common::uuid_utils::parse_stored;
use lv_common::{Business, BusinessStatus, Error, Result};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::models::ExportFilters;

const FILTER_CLAUSE: &str = r#"
    (? IS NULL OR b.status = ?)
    AND (? IS NULL OR EXISTS (
        SELECT 1 FROM business_regions br
        WHERE br.business_id = b.id AND br.region_id = ?
    ))
"#;

fn bind_filters<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    filters: &ExportFilters,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let status = filters.status.as_ref().map(|s| s.as_str().to_string());
    let region_id = filters.region_id.map(|id| id.to_string());

    query
        .bind(status.clone())
        .bind(status)
        .bind(region_id.clone())
        .bind(region_id)
}

fn business_from_row(row: &SqliteRow) -> Result<Business> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let workspace_id: Option<String> = row.try_get("workspace_id")?;

    Ok(Business {
        id: parse_stored("businesses.id", &id)?,
        google_place_id: row.try_get("google_place_id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        status: status
            .parse::<BusinessStatus>()
            .map_err(|e| Error::CorruptRow {
                column: "businesses.status",
                detail: format!("business {}: {}", id, e),
            })?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        workspace_id: workspace_id
            .as_deref()
            .map(|w| parse_stored("businesses.workspace_id", w))
            .transpose()?,
        region_ids: Vec::new(),
    })
}

/// Insert a business row (associations are written separately)
pub async fn insert_business<'e, E>(executor: E, business: &Business) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO businesses (
            id, google_place_id, name, slug, status, city, state, workspace_id,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(business.id.to_string())
    .bind(&business.google_place_id)
    .bind(&business.name)
    .bind(&business.slug)
    .bind(business.status.as_str())
    .bind(&business.city)
    .bind(&business.state)
    .bind(business.workspace_id.map(|w| w.to_string()))
    .execute(executor)
    .await?;

    Ok(())
}

/// Overwrite the fields of an existing business, keeping its id
pub async fn replace_business<'e, E>(executor: E, id: Uuid, business: &Business) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE businesses SET
            google_place_id = ?,
            name = ?,
            slug = ?,
            status = ?,
            city = ?,
            state = ?,
            workspace_id = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&business.google_place_id)
    .bind(&business.name)
    .bind(&business.slug)
    .bind(business.status.as_str())
    .bind(&business.city)
    .bind(&business.state)
    .bind(business.workspace_id.map(|w| w.to_string()))
    .bind(id.to_string())
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Business {}", id)));
    }

    Ok(())
}

/// Replace all region associations of a business
pub async fn set_business_regions(
    conn: &mut SqliteConnection,
    business_id: Uuid,
    region_ids: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM business_regions WHERE business_id = ?")
        .bind(business_id.to_string())
        .execute(&mut *conn)
        .await?;

    for region_id in region_ids {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO business_regions (business_id, region_id, created_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(business_id.to_string())
        .bind(region_id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Id of the first business carrying this Google place id
pub async fn find_id_by_google_place_id<'e, E>(executor: E, google_place_id: &str) -> Result<Option<Uuid>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM businesses WHERE google_place_id = ? ORDER BY created_at, id LIMIT 1",
    )
    .bind(google_place_id)
    .fetch_optional(executor)
    .await?;

    id.as_deref()
        .map(|id| parse_stored("businesses.id", id))
        .transpose()
}

/// Whether a business with this id exists
pub async fn business_exists<'e, E>(executor: E, id: Uuid) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM businesses WHERE id = ?)")
        .bind(id.to_string())
        .fetch_one(executor)
        .await?;

    Ok(exists)
}

/// Load one business with its region ids
pub async fn find_business(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Business>> {
    let row = sqlx::query(
        r#"
        SELECT id, google_place_id, name, slug, status, city, state, workspace_id
        FROM businesses
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut business = business_from_row(&row)?;
    business.region_ids = region_ids_for(conn, id).await?;

    Ok(Some(business))
}

/// Region ids associated with a business, ordered by id
pub async fn region_ids_for<'e, E>(executor: E, business_id: Uuid) -> Result<Vec<Uuid>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT region_id FROM business_regions WHERE business_id = ? ORDER BY region_id",
    )
    .bind(business_id.to_string())
    .fetch_all(executor)
    .await?;

    ids.iter()
        .map(|id| parse_stored("business_regions.region_id", id))
        .collect()
}

/// Total number of businesses
pub async fn count_businesses<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses")
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// Number of businesses matching the export filters
pub async fn count_filtered<'e, E>(executor: E, filters: &ExportFilters) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT COUNT(*) AS n FROM businesses b WHERE {}", FILTER_CLAUSE);
    let row = bind_filters(sqlx::query(&sql), filters)
        .fetch_one(executor)
        .await?;

    Ok(row.try_get("n")?)
}

/// Businesses matching the export filters, ordered by slug then id, with region ids
pub async fn load_filtered(conn: &mut SqliteConnection, filters: &ExportFilters) -> Result<Vec<Business>> {
    let sql = format!(
        r#"
        SELECT b.id, b.google_place_id, b.name, b.slug, b.status, b.city, b.state, b.workspace_id
        FROM businesses b
        WHERE {}
        ORDER BY b.slug, b.id
        "#,
        FILTER_CLAUSE
    );
    let rows = bind_filters(sqlx::query(&sql), filters)
        .fetch_all(&mut *conn)
        .await?;

    let mut businesses = rows
        .iter()
        .map(business_from_row)
        .collect::<Result<Vec<_>>>()?;

    let assoc_sql = format!(
        r#"
        SELECT br.business_id, br.region_id
        FROM business_regions br
        JOIN businesses b ON b.id = br.business_id
        WHERE {}
        ORDER BY br.business_id, br.region_id
        "#,
        FILTER_CLAUSE
    );
    let assoc_rows = bind_filters(sqlx::query(&assoc_sql), filters)
        .fetch_all(&mut *conn)
        .await?;

    let mut by_business: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in &assoc_rows {
        let business_id: String = row.try_get("business_id")?;
        let region_id: String = row.try_get("region_id")?;
        by_business
            .entry(parse_stored("business_regions.business_id", &business_id)?)
            .or_default()
            .push(parse_stored("business_regions.region_id", &region_id)?);
    }

    for business in &mut businesses {
        if let Some(ids) = by_business.remove(&business.id) {
            business.region_ids = ids;
        }
    }

    Ok(businesses)
}
