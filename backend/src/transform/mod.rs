//! Transformation stages.
//!
//! - `geo`: coordinate coercion, global axis-swap correction, map points
//! - `filter`: categorical and date-window filtering
//! - `congestion`: threshold classification
//! - `trend`: per-date means for charts
//! - `grouper`: per-site means and headline metrics
//! - `pipeline`: ingest once per upload, derive reports per interaction

pub mod congestion;
pub mod filter;
pub mod geo;
pub mod grouper;
pub mod pipeline;
pub mod trend;

pub use congestion::{classify, is_congested, CongestionResult};
pub use filter::{apply_filters, FilterOptions};
pub use geo::{map_points, sanitize, GeoHeuristic, GeoReport, MapPoint, Sanitized};
pub use grouper::{site_summary, summarize, KpiSummary, Mean, SiteSummary};
pub use pipeline::*;
pub use trend::{trend_by_date, TrendPoint, TrendSeries};

use serde::Serialize;

use crate::api::logs::log_warning;
use crate::error::PipelineWarning;

/// Non-fatal warnings collected during one run.
///
/// Pushing a warning also logs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Warnings(Vec<PipelineWarning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: PipelineWarning) {
        log_warning(warning.to_string());
        self.0.push(warning);
    }

    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn as_slice(&self) -> &[PipelineWarning] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_vec(self) -> Vec<PipelineWarning> {
        self.0
    }
}
