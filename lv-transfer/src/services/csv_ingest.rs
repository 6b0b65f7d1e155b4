//! CSV region ingestion
//!
//! Each row names a place as `Community, City, County, State`. The row is
//! turned into the chain state → county → city (→ neighborhood when the
//! community differs from the city), reusing any node that already exists.
//! The whole batch runs in one transaction; geocoding tasks for the created
//! regions are queued only after it commits.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use lv_common::RegionType;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::db::regions;
use crate::hierarchy::{
    county_display_name, neighborhood_name, normalize_state_name, resolve_or_create, slugify,
    HierarchyError, NewRegion, ResolutionCache, ResolvedRegion,
};
use crate::models::{IngestOptions, IngestSummary, SkippedRow};
use crate::services::geocoder::GeocodeQueue;

/// Columns that must be present in the header row
pub const REQUIRED_COLUMNS: [&str; 4] = ["Community", "City", "County", "State"];

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Parent region {0} does not exist")]
    UnknownParentRegion(Uuid),

    #[error("CSV is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("CSV read error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Common(#[from] lv_common::Error),
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Common(lv_common::Error::Database(e))
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Common(lv_common::Error::Io(e))
    }
}

/// One data row; unknown columns (`Day`, `Date`, ...) are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsvRow {
    #[serde(rename = "Community", default)]
    pub community: Option<String>,
    #[serde(rename = "City", default)]
    pub city: Option<String>,
    #[serde(rename = "County", default)]
    pub county: Option<String>,
    #[serde(rename = "State", default)]
    pub state: Option<String>,
    #[serde(rename = "Population", default)]
    pub population: Option<String>,
    #[serde(rename = "Est_SMBs", default)]
    pub est_smbs: Option<String>,
    #[serde(rename = "Type", default)]
    pub place_type: Option<String>,
    #[serde(rename = "Notes", default)]
    pub notes: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// "278,468" → 278468
fn parse_count(value: &Option<String>) -> Option<i64> {
    let digits: String = non_blank(value)?
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    digits.parse().ok()
}

impl CsvRow {
    /// `{"csv_data": {...}}` for the optional columns, if any carry a value
    pub fn metadata(&self) -> Option<Value> {
        let mut data = Map::new();
        if let Some(population) = parse_count(&self.population) {
            data.insert("population".into(), json!(population));
        }
        if let Some(est_smbs) = parse_count(&self.est_smbs) {
            data.insert("est_smbs".into(), json!(est_smbs));
        }
        if let Some(place_type) = non_blank(&self.place_type) {
            data.insert("type".into(), json!(place_type));
        }
        if let Some(notes) = non_blank(&self.notes) {
            data.insert("notes".into(), json!(notes));
        }

        if data.is_empty() {
            None
        } else {
            Some(json!({ "csv_data": data }))
        }
    }
}

/// Place names of a usable row, normalized
#[derive(Debug, Clone, PartialEq, Eq)]
struct RowPlace {
    state: String,
    county: String,
    city: String,
    neighborhood: Option<String>,
}

fn place_for_row(row: &CsvRow) -> Result<RowPlace, String> {
    let missing: Vec<&str> = [("City", &row.city), ("County", &row.county), ("State", &row.state)]
        .into_iter()
        .filter(|(_, value)| non_blank(value).is_none())
        .map(|(column, _)| column)
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing {}", missing.join(", ")));
    }

    let city = non_blank(&row.city).unwrap_or_default().to_string();
    let community = non_blank(&row.community).unwrap_or(city.as_str()).to_string();

    let place = RowPlace {
        state: normalize_state_name(non_blank(&row.state).unwrap_or_default()),
        county: county_display_name(non_blank(&row.county).unwrap_or_default()),
        neighborhood: neighborhood_name(&community, &city).map(str::to_string),
        city,
    };

    let names = [Some(&place.state), Some(&place.county), Some(&place.city), place.neighborhood.as_ref()];
    for name in names.into_iter().flatten() {
        if slugify(name).is_err() {
            return Err(format!("'{}' does not produce a usable slug", name));
        }
    }

    Ok(place)
}

/// Read all data rows, checking the header first
///
/// Values are trimmed; short rows are accepted.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<CsvRow>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(IngestError::MissingColumn(column));
        }
    }

    let mut rows = Vec::new();
    for record in csv_reader.deserialize() {
        rows.push(record?);
    }

    Ok(rows)
}

fn tally(summary: &mut IngestSummary, region_type: RegionType, resolved: ResolvedRegion) {
    if resolved.created {
        *summary.created.entry(region_type).or_insert(0) += 1;
        summary.created_ids.push(resolved.id);
    } else {
        summary.reused += 1;
    }
}

/// CSV region ingestion service
pub struct CsvIngester {
    db: SqlitePool,
    geocode_queue: Option<GeocodeQueue>,
}

impl CsvIngester {
    pub fn new(db: SqlitePool, geocode_queue: Option<GeocodeQueue>) -> Self {
        Self { db, geocode_queue }
    }

    /// Ingest a CSV file
    pub async fn ingest_file(&self, path: &Path, options: &IngestOptions) -> Result<IngestSummary, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        let rows = parse_rows(bytes.as_slice())?;
        tracing::info!(path = %path.display(), rows = rows.len(), "Ingesting region CSV");
        self.ingest_rows(&rows, options).await
    }

    /// Ingest already parsed rows
    pub async fn ingest_rows(&self, rows: &[CsvRow], options: &IngestOptions) -> Result<IngestSummary, IngestError> {
        let mut summary = IngestSummary {
            rows_read: rows.len(),
            ..Default::default()
        };

        let mut tx = self.db.begin().await?;

        if let Some(parent_id) = options.parent_region_id {
            if regions::find_by_id(&mut *tx, parent_id).await?.is_none() {
                return Err(IngestError::UnknownParentRegion(parent_id));
            }
        }

        let mut cache = ResolutionCache::new();

        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;
            let place = match place_for_row(row) {
                Ok(place) => place,
                Err(reason) => {
                    tracing::debug!(row = row_number, reason = %reason, "Skipping CSV row");
                    summary.skipped.push(SkippedRow {
                        row: row_number,
                        reason,
                    });
                    continue;
                }
            };

            let state = resolve_or_create(
                &mut tx,
                &mut cache,
                NewRegion {
                    name: &place.state,
                    region_type: RegionType::State,
                    parent_id: options.parent_region_id,
                    is_active: options.mark_active,
                    metadata: None,
                },
            )
            .await?;
            tally(&mut summary, RegionType::State, state);

            let county = resolve_or_create(
                &mut tx,
                &mut cache,
                NewRegion {
                    name: &place.county,
                    region_type: RegionType::County,
                    parent_id: Some(state.id),
                    is_active: options.mark_active,
                    metadata: None,
                },
            )
            .await?;
            tally(&mut summary, RegionType::County, county);

            let city = resolve_or_create(
                &mut tx,
                &mut cache,
                NewRegion {
                    name: &place.city,
                    region_type: RegionType::City,
                    parent_id: Some(county.id),
                    is_active: options.mark_active,
                    metadata: if options.store_metadata { row.metadata() } else { None },
                },
            )
            .await?;
            tally(&mut summary, RegionType::City, city);

            if let Some(neighborhood) = &place.neighborhood {
                let resolved = resolve_or_create(
                    &mut tx,
                    &mut cache,
                    NewRegion {
                        name: neighborhood,
                        region_type: RegionType::Neighborhood,
                        parent_id: Some(city.id),
                        is_active: options.mark_active,
                        metadata: None,
                    },
                )
                .await?;
                tally(&mut summary, RegionType::Neighborhood, resolved);
            }
        }

        tx.commit().await?;

        if options.enable_geocoding {
            summary.geocoding_enqueued = self.enqueue_geocoding(&summary.created_ids);
        }

        tracing::info!(
            rows_read = summary.rows_read,
            rows_skipped = summary.skipped.len(),
            regions_created = summary.created_total(),
            regions_reused = summary.reused,
            geocoding_enqueued = summary.geocoding_enqueued,
            "Region CSV ingested"
        );

        Ok(summary)
    }

    fn enqueue_geocoding(&self, region_ids: &[Uuid]) -> usize {
        let Some(queue) = &self.geocode_queue else {
            tracing::warn!(
                regions = region_ids.len(),
                "Geocoding requested but no geocoding worker is running"
            );
            return 0;
        };

        let mut seen = HashSet::new();
        region_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter(|id| queue.enqueue(**id))
            .count()
    }
}
