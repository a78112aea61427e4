//! High-level pipeline API: ingest once per upload, derive per interaction.
//!
//! Ingestion runs the loader, the schema validator and the geo sanitizer and
//! produces an [`IngestedTable`]. Reports are then built from that table as
//! often as the user changes filters, thresholds or charts; [`build_report`]
//! is a pure function of its inputs apart from log emission.
//!
//! # Example
//!
//! ```rust,ignore
//! use nockpi::transform::{build_report, ingest_file, IngestOptions, ReportRequest};
//!
//! let ingested = ingest_file("kpi_export.csv", &IngestOptions::default())?;
//! let report = build_report(&ingested.table, &ReportRequest::default())?;
//! println!("{} congested rows", report.congestion.count);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    apply_filters, classify, map_points, sanitize, site_summary, summarize, trend_by_date, CongestionResult,
    GeoHeuristic, GeoReport, KpiSummary, MapPoint, SiteSummary, TrendSeries, Warnings,
};
use crate::api::logs::{log_info, log_info_indent, log_success, log_warning, log_warning_indent};
use crate::error::{PipelineResult, PipelineWarning, RowIssue, Stage};
use crate::models::{columns, FilterCriteria, KpiTable, Thresholds, ViewSettings};
use crate::parser::{load_bytes, load_file, ColumnAliases, RawTable};
use crate::validation::build_table;

/// Row issues echoed individually before being summarized.
const ISSUES_SHOWN: usize = 5;

/// Options for ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub aliases: ColumnAliases,
    /// Force a delimiter instead of sniffing one
    pub delimiter: Option<char>,
    pub geo: GeoHeuristic,
}

/// CSV file information
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    /// Headers as they appeared in the file
    pub source_headers: Vec<String>,
    /// Normalized canonical headers
    pub headers: Vec<String>,
    pub row_count: usize,
}

impl CsvInfo {
    fn from_raw(raw: &RawTable) -> Self {
        Self {
            encoding: raw.encoding.clone(),
            delimiter: raw.delimiter,
            source_headers: raw.source_headers.clone(),
            headers: raw.headers.clone(),
            row_count: raw.row_count(),
        }
    }
}

/// Result of ingesting one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedTable {
    /// Sanitized table every report is derived from
    pub table: KpiTable,
    pub csv_info: CsvInfo,
    /// Rows dropped during coercion
    pub row_issues: Vec<RowIssue>,
    pub geo: GeoReport,
    pub warnings: Warnings,
}

/// Ingest raw upload bytes.
pub fn ingest(bytes: &[u8], options: &IngestOptions) -> PipelineResult<IngestedTable> {
    log_info("📖 Reading CSV upload...");
    let raw = load_bytes(bytes, &options.aliases, options.delimiter)?;
    ingest_raw(raw, options)
}

/// Ingest a CSV file from disk.
pub fn ingest_file<P: AsRef<Path>>(path: P, options: &IngestOptions) -> PipelineResult<IngestedTable> {
    log_info(format!("📖 Reading {}...", path.as_ref().display()));
    let raw = load_file(path, &options.aliases, options.delimiter)?;
    ingest_raw(raw, options)
}

/// Validate, coerce and sanitize an already loaded table.
pub fn ingest_raw(raw: RawTable, options: &IngestOptions) -> PipelineResult<IngestedTable> {
    options.geo.validate()?;

    log_success(format!("Detected encoding: {}", raw.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(raw.delimiter)));
    log_success(format!("Read {} rows", raw.row_count()));

    log_info(format!("📋 CSV has {} columns:", raw.headers.len()));
    for (i, (source, canonical)) in raw.source_headers.iter().zip(&raw.headers).enumerate() {
        if source == canonical {
            log_info_indent(format!("[{:2}] {}", i + 1, canonical), 1);
        } else {
            log_info_indent(format!("[{:2}] {} → {}", i + 1, source, canonical), 1);
        }
    }

    let csv_info = CsvInfo::from_raw(&raw);

    log_info("✔️  Validating schema...");
    let typed = build_table(&raw)?;
    log_success(format!("{} typed rows", typed.table.len()));
    print_row_issues(&typed.row_issues);

    let mut warnings = Warnings::new();
    let sanitized = sanitize(typed.table, &options.geo, &mut warnings);

    Ok(IngestedTable {
        table: sanitized.table,
        csv_info,
        row_issues: typed.row_issues,
        geo: sanitized.report,
        warnings,
    })
}

fn print_row_issues(issues: &[RowIssue]) {
    if issues.is_empty() {
        return;
    }
    log_warning(format!("{} rows skipped", issues.len()));
    for issue in issues.iter().take(ISSUES_SHOWN) {
        log_warning_indent(issue.to_string(), 1);
    }
    if issues.len() > ISSUES_SHOWN {
        log_warning_indent(format!("... +{}", issues.len() - ISSUES_SHOWN), 1);
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        other => other.to_string(),
    }
}

/// Chart columns drawn when the request names none.
pub fn default_charts() -> Vec<String> {
    vec![columns::TRAFFIC_GB.to_string(), columns::AVAILABILITY.to_string()]
}

/// Everything a report depends on besides the table itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportRequest {
    pub filters: FilterCriteria,
    pub thresholds: Thresholds,
    /// Numeric columns to chart over time
    pub charts: Vec<String>,
    /// Echoed into the report untouched
    pub view: ViewSettings,
}

impl Default for ReportRequest {
    fn default() -> Self {
        Self {
            filters: FilterCriteria::default(),
            thresholds: Thresholds::default(),
            charts: default_charts(),
            view: ViewSettings::default(),
        }
    }
}

/// Everything the dashboard shows for one interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub summary: KpiSummary,
    pub congestion: CongestionResult,
    pub trends: Vec<TrendSeries>,
    pub sites: Vec<SiteSummary>,
    pub map: Vec<MapPoint>,
    pub warnings: Warnings,
    pub filtered_rows: usize,
    pub view: ViewSettings,
}

/// Filter `table` and derive every view from the filtered rows.
///
/// Fails only on invalid criteria (reversed date range, out-of-range
/// thresholds). An empty input table or filter result is a warning, not an
/// error.
pub fn build_report(table: &KpiTable, request: &ReportRequest) -> PipelineResult<DashboardReport> {
    request.filters.validate()?;
    request.thresholds.validate()?;

    let mut warnings = Warnings::new();

    let filtered = apply_filters(table, &request.filters);
    log_info(format!("🔎 {} of {} rows match the filters", filtered.len(), table.len()));
    if table.is_empty() {
        // nothing survived the geo sanitizer at ingest
        warnings.push(PipelineWarning::EmptyResult { stage: Stage::GeoSanitizer });
    } else if filtered.is_empty() {
        warnings.push(PipelineWarning::EmptyResult { stage: Stage::Filter });
    }

    let congestion = classify(&filtered, &request.thresholds)?;
    if congestion.count > 0 {
        log_warning(format!("{} congested rows", congestion.count));
    }

    let trends = request
        .charts
        .iter()
        .map(|column| trend_by_date(&filtered, column, &mut warnings))
        .collect();

    Ok(DashboardReport {
        summary: summarize(&filtered),
        congestion,
        trends,
        sites: site_summary(&filtered),
        map: map_points(&filtered),
        warnings,
        filtered_rows: filtered.len(),
        view: request.view.clone(),
    })
}
