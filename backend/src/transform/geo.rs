//! Geo sanitizer - make coordinates numeric and plausibly oriented.
//!
//! Spreadsheet exports regularly put longitude in the latitude column. The
//! correction is a table-wide heuristic: when the mean absolute latitude of
//! all rows with a latitude exceeds `swap_threshold` (50 by default), every
//! row gets its `lat` and `lon` exchanged, including rows that looked fine on
//! their own. The whole upload is assumed to follow one convention.
//!
//! The heuristic is tuned for equatorial deployments and can misfire on
//! data that legitimately sits above 50° of latitude or mixes hemispheres.
//! It can be retuned or switched off through [`GeoHeuristic`].
//!
//! After the optional swap, rows whose coordinates are unknown or out of
//! range (`|lat| > 90`, `|lon| > 180`) are dropped.

use serde::{Deserialize, Serialize};

use super::Warnings;
use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{PipelineWarning, Stage};
use crate::error::PipelineResult;
use crate::models::{check_range, KpiTable};

pub const DEFAULT_SWAP_THRESHOLD: f64 = 50.0;

/// Tuning for the axis-swap detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoHeuristic {
    pub swap_enabled: bool,
    pub swap_threshold: f64,
}

impl GeoHeuristic {
    pub const SWAP_THRESHOLD_RANGE: (f64, f64) = (0.0, 90.0);

    /// Rejects a swap threshold outside [0, 90], NaN included.
    pub fn validate(&self) -> PipelineResult<()> {
        check_range("swap", self.swap_threshold, Self::SWAP_THRESHOLD_RANGE)
    }
}

impl Default for GeoHeuristic {
    fn default() -> Self {
        Self {
            swap_enabled: true,
            swap_threshold: DEFAULT_SWAP_THRESHOLD,
        }
    }
}

/// What the sanitizer did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoReport {
    /// Mean |lat| over rows with a latitude, before any swap.
    pub mean_abs_lat: Option<f64>,
    pub swapped: bool,
    pub rows_in: usize,
    pub rows_dropped: usize,
}

/// Sanitized table and its report.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub table: KpiTable,
    pub report: GeoReport,
}

/// A point for the site map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub site: String,
    pub lat: f64,
    pub lon: f64,
    pub availability: f64,
}

fn mean_abs_lat(table: &KpiTable) -> Option<f64> {
    let (sum, count) = table
        .records
        .iter()
        .filter_map(|r| r.lat)
        .filter(|lat| lat.is_finite())
        .fold((0.0, 0usize), |(sum, count), lat| (sum + lat.abs(), count + 1));

    (count > 0).then(|| sum / count as f64)
}

fn plausible(lat: Option<f64>, lon: Option<f64>) -> bool {
    match (lat, lon) {
        (Some(lat), Some(lon)) => lat.abs() <= 90.0 && lon.abs() <= 180.0,
        _ => false,
    }
}

/// Correct swapped axes and drop rows without usable coordinates.
pub fn sanitize(table: KpiTable, heuristic: &GeoHeuristic, warnings: &mut Warnings) -> Sanitized {
    log_info("🌍 Sanitizing coordinates...");

    let rows_in = table.len();
    let mean = mean_abs_lat(&table);
    let swapped = heuristic.swap_enabled && mean.is_some_and(|m| m > heuristic.swap_threshold);

    let KpiTable {
        presence,
        extra_columns,
        mut records,
    } = table;

    if swapped {
        log_warning(format!(
            "Mean |lat| is {:.2} (> {}), swapping lat/lon for all {} rows",
            mean.unwrap_or_default(),
            heuristic.swap_threshold,
            rows_in
        ));
        for record in &mut records {
            std::mem::swap(&mut record.lat, &mut record.lon);
        }
    }

    records.retain(|r| plausible(r.lat, r.lon));
    let rows_dropped = rows_in - records.len();

    if rows_dropped > 0 {
        log_warning(format!("{} rows dropped (missing or out-of-range coordinates)", rows_dropped));
    }
    log_success(format!("{} rows with valid coordinates", records.len()));

    if records.is_empty() {
        warnings.push(PipelineWarning::EmptyResult { stage: Stage::GeoSanitizer });
    }

    Sanitized {
        table: KpiTable::new(presence, extra_columns, records),
        report: GeoReport {
            mean_abs_lat: mean,
            swapped,
            rows_in,
            rows_dropped,
        },
    }
}

/// Map points for every row that has coordinates.
pub fn map_points(table: &KpiTable) -> Vec<MapPoint> {
    table
        .records
        .iter()
        .filter_map(|r| match (r.lat, r.lon) {
            (Some(lat), Some(lon)) => Some(MapPoint {
                site: r.site.clone(),
                lat,
                lon,
                availability: r.availability,
            }),
            _ => None,
        })
        .collect()
}
