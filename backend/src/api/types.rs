//! REST API types for the dashboard frontend.
//!
//! Every response carries the session id so the client can keep deriving
//! reports from the table it uploaded without sending the file again.

use serde::Serialize;
use serde_json::{json, Value};

use crate::cache::Session;
use crate::error::RowIssue;
use crate::models::ViewSettings;
use crate::transform::{CsvInfo, DashboardReport, FilterOptions, GeoReport, Warnings};

/// Row issues included in a response; the rest are only counted.
const MAX_ROW_ISSUES: usize = 100;

/// Response sent after a CSV upload has been ingested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub session_id: String,

    /// Status: "ready" or "warning"
    pub status: String,

    pub file_name: Option<String>,

    pub csv_info: CsvInfo,

    pub geo: GeoReport,

    /// Choices for the filter controls
    pub filter_options: FilterOptions,

    /// First rows skipped during coercion
    pub row_issues: Vec<RowIssue>,

    pub skipped_rows: usize,

    /// Ingest warnings (e.g. nothing left after the geo sanitizer)
    pub warnings: Warnings,

    /// Report with default filters and thresholds
    pub report: DashboardReport,

    pub view: ViewSettings,
}

impl UploadResponse {
    pub fn new(session: &Session, report: DashboardReport) -> Self {
        let ingested = &session.ingested;
        let clean = ingested.row_issues.is_empty() && ingested.warnings.is_empty() && report.warnings.is_empty();

        Self {
            session_id: session.id.clone(),
            status: if clean { "ready" } else { "warning" }.to_string(),
            file_name: session.file_name.clone(),
            csv_info: ingested.csv_info.clone(),
            geo: ingested.geo.clone(),
            filter_options: FilterOptions::from_table(&ingested.table),
            row_issues: ingested.row_issues.iter().take(MAX_ROW_ISSUES).cloned().collect(),
            skipped_rows: ingested.row_issues.len(),
            warnings: ingested.warnings.clone(),
            report,
            view: session.view.clone(),
        }
    }
}

/// Response for a report derived from an existing session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub report: DashboardReport,
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SessionStore;
    use crate::transform::{build_report, ingest, IngestOptions, ReportRequest};

    #[test]
    fn test_upload_response_shape() {
        let csv = "date,site,traffic_gb,availability,lat,lon\n2024-01-01,SiteA,10,99,-6.2,106.8\n2024-01-02,SiteA,oops,99,-6.2,106.8\n";
        let ingested = ingest(csv.as_bytes(), &IngestOptions::default()).unwrap();
        let store = SessionStore::default();
        let session = store.create(ingested, Some("kpi.csv".into()));
        let report = build_report(&session.ingested.table, &ReportRequest::default()).unwrap();

        let json = serde_json::to_value(UploadResponse::new(&session, report)).unwrap();

        assert_eq!(json["sessionId"], session.id.as_str());
        assert_eq!(json["status"], "warning");
        assert_eq!(json["skippedRows"], 1);
        assert_eq!(json["csvInfo"]["rowCount"], 2);
        assert_eq!(json["filterOptions"]["sites"][1], "SiteA");
        assert_eq!(json["report"]["summary"]["totalSites"], 1);
        assert_eq!(json["view"]["theme"], "light");
    }

    #[test]
    fn test_error_response() {
        let body = error_response("Missing required column: lat");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "Missing required column: lat");
    }
}
