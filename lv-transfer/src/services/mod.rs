//! Transfer pipeline services

pub mod archive;
pub mod csv_ingest;
pub mod export;
pub mod geocoder;
pub mod import;

pub use archive::{parse_archive, write_archive, ArchiveError, ArchiveSummary, TransferArchive};
pub use csv_ingest::{CsvIngester, IngestError};
pub use export::{ExportError, ExportService, ExportSnapshot};
pub use geocoder::{
    spawn_geocode_worker, GeocodeQueue, GeocodeTask, Geocoder, NominatimClient, TaskOutcome,
};
pub use import::{ImportReconciler, ReconcileError};
