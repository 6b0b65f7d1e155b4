//! Data models for lv-transfer

pub mod options;
pub mod summary;

pub use options::{ExportFilters, ImportOptions, IngestOptions};
pub use summary::{ExportReport, ImportSummary, IngestSummary, SkippedRow};
