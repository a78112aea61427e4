//! Congestion classification.
//!
//! A row is congested when its availability is strictly below the
//! availability threshold, or, when the table has a PRB column and the row a
//! PRB value, that value is strictly above the PRB threshold.

use serde::Serialize;

use crate::error::PipelineResult;
use crate::models::{KpiRecord, KpiTable, Thresholds};

/// Outcome of classifying a filtered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CongestionResult {
    pub thresholds: Thresholds,
    /// Whether the PRB criterion took part
    pub prb_applied: bool,
    /// One flag per input row, same order
    pub flags: Vec<bool>,
    pub count: usize,
    /// The congested rows, for the detail table
    pub congested: Vec<KpiRecord>,
}

/// Classify a single row.
pub fn is_congested(record: &KpiRecord, thresholds: &Thresholds, prb_present: bool) -> bool {
    let low_availability = record.availability < thresholds.availability;
    let high_prb = prb_present && record.prb.is_some_and(|prb| prb > thresholds.prb);
    low_availability || high_prb
}

/// Flag every row of `table`; fails only on out-of-range thresholds.
pub fn classify(table: &KpiTable, thresholds: &Thresholds) -> PipelineResult<CongestionResult> {
    thresholds.validate()?;

    let prb_applied = table.presence.prb;
    let flags: Vec<bool> = table
        .records
        .iter()
        .map(|r| is_congested(r, thresholds, prb_applied))
        .collect();

    let congested: Vec<KpiRecord> = table
        .records
        .iter()
        .zip(&flags)
        .filter(|(_, flagged)| **flagged)
        .map(|(r, _)| r.clone())
        .collect();

    Ok(CongestionResult {
        thresholds: *thresholds,
        prb_applied,
        count: congested.len(),
        flags,
        congested,
    })
}
