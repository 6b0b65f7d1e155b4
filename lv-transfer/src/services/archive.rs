//! Transfer archive codec
//!
//! A transfer archive is a gzip-compressed tar holding:
//!
//! ```text
//! metadata.json
//! regions.json                 parent-before-child
//! businesses/chunk-0001.json   one JSON array per chunk
//! businesses/chunk-0002.json
//! ```
//!
//! Archives are written to `<name>.partial` and renamed into place, and are
//! parsed inside a temporary directory owned by the parse call.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lv_common::{Business, BusinessStatus, Region, RegionType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::ExportFilters;

/// Layout version written to `metadata.json`
pub const FORMAT_VERSION: u32 = 1;

pub const METADATA_ENTRY: &str = "metadata.json";
pub const REGIONS_ENTRY: &str = "regions.json";
pub const BUSINESSES_DIR: &str = "businesses";

/// Default number of businesses per chunk file
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Archive codec errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive is missing {0}")]
    MissingEntry(&'static str),

    #[error("Malformed {entry}: {source}")]
    MalformedEntry {
        entry: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not a readable .tar.gz archive: {0}")]
    Unreadable(#[source] io::Error),

    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("Archive encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Archive I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Contents of `metadata.json`
///
/// Only `exported_at` is required when reading; the remaining fields are
/// informational and absent from older archives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub exported_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ExportFilters>,
}

impl ArchiveMetadata {
    pub fn new(exported_at: DateTime<Utc>) -> Self {
        Self {
            exported_at,
            format_version: Some(FORMAT_VERSION),
            business_count: None,
            region_count: None,
            filters: None,
        }
    }
}

/// Region record in `regions.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRegion {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    pub parent_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl From<&Region> for ArchiveRegion {
    fn from(region: &Region) -> Self {
        Self {
            id: region.id,
            name: region.name.clone(),
            slug: region.slug.clone(),
            region_type: region.region_type,
            parent_id: region.parent_id,
            description: region.description.clone(),
            is_active: region.is_active,
            display_order: region.display_order,
            metadata: region.metadata.clone(),
            latitude: region.latitude,
            longitude: region.longitude,
        }
    }
}

impl ArchiveRegion {
    /// Store record for this region under a resolved id and parent
    pub fn to_region(&self, id: Uuid, parent_id: Option<Uuid>) -> Region {
        Region {
            id,
            name: self.name.clone(),
            slug: self.slug.clone(),
            region_type: self.region_type,
            parent_id,
            description: self.description.clone(),
            is_active: self.is_active,
            display_order: self.display_order,
            metadata: self.metadata.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Business record in a chunk file
///
/// Never carries `workspace_id`; a value present in a foreign archive is
/// ignored on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveBusiness {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_place_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub status: BusinessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub region_ids: Vec<Uuid>,
}

impl From<&Business> for ArchiveBusiness {
    fn from(business: &Business) -> Self {
        Self {
            id: business.id,
            google_place_id: business.google_place_id.clone(),
            name: business.name.clone(),
            slug: business.slug.clone(),
            status: business.status.clone(),
            city: business.city.clone(),
            state: business.state.clone(),
            region_ids: business.region_ids.clone(),
        }
    }
}

impl ArchiveBusiness {
    /// Store record for this business: unowned, with resolved region ids
    pub fn to_business(&self, id: Uuid, region_ids: Vec<Uuid>) -> Business {
        Business {
            id,
            google_place_id: self.google_place_id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            status: self.status.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            workspace_id: None,
            region_ids,
        }
    }
}

/// Full archive contents
#[derive(Debug, Clone, PartialEq)]
pub struct TransferArchive {
    pub metadata: ArchiveMetadata,
    pub regions: Vec<ArchiveRegion>,
    pub businesses: Vec<ArchiveBusiness>,
}

/// Store-free overview of a parsed archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub exported_at: DateTime<Utc>,
    pub format_version: Option<u32>,
    pub region_count: usize,
    pub business_count: usize,
    pub regions_by_type: BTreeMap<RegionType, usize>,
    pub businesses_by_status: BTreeMap<String, usize>,
}

impl TransferArchive {
    pub fn summary(&self) -> ArchiveSummary {
        let mut regions_by_type = BTreeMap::new();
        for region in &self.regions {
            *regions_by_type.entry(region.region_type).or_insert(0) += 1;
        }

        let mut businesses_by_status = BTreeMap::new();
        for business in &self.businesses {
            *businesses_by_status
                .entry(business.status.as_str().to_string())
                .or_insert(0) += 1;
        }

        ArchiveSummary {
            exported_at: self.metadata.exported_at,
            format_version: self.metadata.format_version,
            region_count: self.regions.len(),
            business_count: self.businesses.len(),
            regions_by_type,
            businesses_by_status,
        }
    }
}

/// What [`write_archive`] produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenArchive {
    pub chunk_count: usize,
    pub size_bytes: u64,
}

/// Name of chunk `index` (0-based) out of `chunk_count`
///
/// Numbers are zero-padded to a common width (at least 4) so that file name
/// order is chunk order.
pub fn chunk_entry_name(index: usize, chunk_count: usize) -> String {
    let width = chunk_count.to_string().len().max(4);
    format!("{}/chunk-{:0width$}.json", BUSINESSES_DIR, index + 1, width = width)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ArchiveError> {
    serde_json::to_vec_pretty(value).map_err(ArchiveError::Encode)
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    bytes: &[u8],
    mtime: u64,
) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_cksum();
    builder.append_data(&mut header, name, bytes)
}

fn append_dir<W: Write>(builder: &mut tar::Builder<W>, name: &str, mtime: u64) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(mtime);
    header.set_cksum();
    builder.append_data(&mut header, name, io::empty())
}

fn write_entries(file: File, archive: &TransferArchive, chunk_size: usize) -> Result<usize, ArchiveError> {
    let mtime = archive.metadata.exported_at.timestamp().max(0) as u64;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    append_file(&mut builder, METADATA_ENTRY, &to_json(&archive.metadata)?, mtime)?;
    append_file(&mut builder, REGIONS_ENTRY, &to_json(&archive.regions)?, mtime)?;
    append_dir(&mut builder, BUSINESSES_DIR, mtime)?;

    let chunk_count = archive.businesses.len().div_ceil(chunk_size);
    for (index, chunk) in archive.businesses.chunks(chunk_size).enumerate() {
        let name = chunk_entry_name(index, chunk_count);
        append_file(&mut builder, &name, &to_json(chunk)?, mtime)?;
    }

    let encoder = builder.into_inner()?;
    let writer = encoder.finish()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(chunk_count)
}

/// Write an archive to `path`
///
/// The archive is built at `<path>.partial` and renamed into place once
/// complete; a failed write removes the partial file.
pub fn write_archive(
    path: &Path,
    archive: &TransferArchive,
    chunk_size: usize,
) -> Result<WrittenArchive, ArchiveError> {
    if chunk_size == 0 {
        return Err(ArchiveError::InvalidChunkSize);
    }

    let partial = partial_path(path);
    let file = File::create(&partial)?;

    let chunk_count = match write_entries(file, archive, chunk_size) {
        Ok(chunk_count) => chunk_count,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial) {
                warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial archive");
            }
            return Err(e);
        }
    };

    fs::rename(&partial, path)?;
    let size_bytes = fs::metadata(path)?.len();

    info!(
        path = %path.display(),
        regions = archive.regions.len(),
        businesses = archive.businesses.len(),
        chunks = chunk_count,
        size_bytes,
        "Archive written"
    );

    Ok(WrittenArchive {
        chunk_count,
        size_bytes,
    })
}

fn read_json_entry<T: DeserializeOwned>(root: &Path, entry: &'static str) -> Result<T, ArchiveError> {
    let path = root.join(entry);
    if !path.is_file() {
        return Err(ArchiveError::MissingEntry(entry));
    }

    let bytes = fs::read(&path)?;
    serde_json::from_slice(&bytes).map_err(|source| ArchiveError::MalformedEntry {
        entry: entry.to_string(),
        source,
    })
}

fn read_business_chunks(root: &Path) -> Result<Vec<ArchiveBusiness>, ArchiveError> {
    let dir = root.join(BUSINESSES_DIR);
    if !dir.is_dir() {
        debug!("Archive has no businesses directory");
        return Ok(Vec::new());
    }

    let mut chunk_files: Vec<(String, PathBuf)> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((name, path))
        })
        .collect();
    chunk_files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut businesses = Vec::new();
    for (name, path) in chunk_files {
        let bytes = fs::read(&path)?;
        let chunk: Vec<ArchiveBusiness> =
            serde_json::from_slice(&bytes).map_err(|source| ArchiveError::MalformedEntry {
                entry: format!("{}/{}", BUSINESSES_DIR, name),
                source,
            })?;
        debug!(chunk = %name, count = chunk.len(), "Read business chunk");
        businesses.extend(chunk);
    }

    Ok(businesses)
}

/// Parse an archive without touching the store
///
/// Extraction happens in a temporary directory that is removed when this
/// call returns, on success or failure.
pub fn parse_archive(path: &Path) -> Result<TransferArchive, ArchiveError> {
    parse_archive_in(path, &std::env::temp_dir())
}

/// [`parse_archive`] extracting under `work_root` instead of the system temp dir
pub fn parse_archive_in(path: &Path, work_root: &Path) -> Result<TransferArchive, ArchiveError> {
    let workdir = tempfile::Builder::new().prefix("lv-archive-").tempdir_in(work_root)?;

    let file = File::open(path)?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.unpack(workdir.path()).map_err(ArchiveError::Unreadable)?;

    let metadata: ArchiveMetadata = read_json_entry(workdir.path(), METADATA_ENTRY)?;
    let regions: Vec<ArchiveRegion> = read_json_entry(workdir.path(), REGIONS_ENTRY)?;
    let businesses = read_business_chunks(workdir.path())?;

    info!(
        path = %path.display(),
        regions = regions.len(),
        businesses = businesses.len(),
        "Archive parsed"
    );

    Ok(TransferArchive {
        metadata,
        regions,
        businesses,
    })
}
