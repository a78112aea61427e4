//! # nockpi - NOC KPI ingestion and dashboard derivation
//!
//! nockpi reads KPI exports from radio network management systems (one row per
//! site, sector or band and timestamp), repairs what can be repaired, and
//! derives everything a NOC dashboard shows: congestion flags, trends, per-site
//! means, headline metrics and map points.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ CSV File │──▶│  Loader  │──▶│ Validator │──▶│    Geo    │──▶│  Filter  │──▶│  Derivation  │
//! │ (any enc)│   │ (aliases)│   │ (coerce)  │   │ Sanitizer │   │          │   │ (report)     │
//! └──────────┘   └──────────┘   └───────────┘   └───────────┘   └──────────┘   └──────────────┘
//!                 └────────────── ingest, once per upload ─────┘ └─── per interaction ────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nockpi::{build_report, ingest_file, IngestOptions, ReportRequest};
//!
//! let ingested = ingest_file("kpi.csv", &IngestOptions::default())?;
//! let report = build_report(&ingested.table, &ReportRequest::default())?;
//! println!("{} sites, {} congested rows", report.summary.total_sites, report.congestion.count);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types and non-fatal warnings
//! - [`models`] - Typed records, filter criteria, thresholds, view settings
//! - [`parser`] - CSV loading with encoding/delimiter detection and column aliases
//! - [`validation`] - Required-column check, typed coercion, JSON Schema helpers
//! - [`transform`] - Geo sanitizer, filter, derivation stages and pipeline
//! - [`cache`] - In-memory session store
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server and log channel

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Transformation
pub mod transform;

// Sessions
pub mod cache;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    ConfigError, CsvError, PipelineError, PipelineWarning, RowIssue, SchemaError, ServerError, Stage,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    columns, ColumnPresence, DateRange, FilterCriteria, KpiRecord, KpiTable, LineStyle, NumericColumn, Selection,
    Theme, Thresholds, ViewSettings, ALL,
};

// =============================================================================
// Re-exports - Loader
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, load_bytes, load_file, load_str, normalize_header,
    normalize_headers, ColumnAliases, RawRow, RawTable,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{build_table, is_valid, parse_date, parse_number, validate, validate_required, TypedTable};

// =============================================================================
// Re-exports - Stages and pipeline
// =============================================================================

pub use transform::{
    apply_filters, build_report, classify, default_charts, ingest, ingest_file, ingest_raw, is_congested,
    map_points, sanitize, site_summary, summarize, trend_by_date, CongestionResult, CsvInfo, DashboardReport,
    FilterOptions, GeoHeuristic, GeoReport, IngestOptions, IngestedTable, KpiSummary, MapPoint, Mean,
    ReportRequest, Sanitized, SiteSummary, TrendPoint, TrendSeries, Warnings,
};

// =============================================================================
// Re-exports - Sessions and configuration
// =============================================================================

pub use cache::{Session, SessionInfo, SessionStore};
pub use config::AppConfig;

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, SessionReport, UploadResponse};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
