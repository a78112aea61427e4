//! Filter stage - categorical selections and the inclusive date window.
//!
//! Filtering never mutates its input and is idempotent. A selection on a
//! column the table does not carry (e.g. `band` on a file without bands) is
//! inactive rather than excluding every row.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{DateRange, FilterCriteria, KpiRecord, KpiTable, ALL};

/// Return the rows matching every active filter.
pub fn apply_filters(table: &KpiTable, criteria: &FilterCriteria) -> KpiTable {
    let records = table
        .records
        .iter()
        .filter(|r| matches(table, criteria, r))
        .cloned()
        .collect();

    table.with_records(records)
}

fn matches(table: &KpiTable, criteria: &FilterCriteria, record: &KpiRecord) -> bool {
    let presence = table.presence;

    criteria.site.matches(Some(&record.site))
        && (!presence.sector || criteria.sector.matches(record.sector.as_deref()))
        && (!presence.band || criteria.band.matches(record.band.as_deref()))
        && criteria
            .date_range
            .map_or(true, |range| range.contains(&record.date))
}

/// Choices for the filter controls, derived from a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// `"All"` followed by the distinct sites, sorted
    pub sites: Vec<String>,
    /// `None` when the table has no sector column
    pub sectors: Option<Vec<String>>,
    pub bands: Option<Vec<String>>,
    /// Full span of the table, the default date window
    pub date_range: Option<DateRange>,
}

impl FilterOptions {
    pub fn from_table(table: &KpiTable) -> Self {
        let choices = |values: BTreeSet<&str>| {
            std::iter::once(ALL.to_string())
                .chain(values.into_iter().map(String::from))
                .collect::<Vec<_>>()
        };

        let sites = choices(table.records.iter().map(|r| r.site.as_str()).collect());
        let sectors = table
            .presence
            .sector
            .then(|| choices(table.records.iter().filter_map(|r| r.sector.as_deref()).collect()));
        let bands = table
            .presence
            .band
            .then(|| choices(table.records.iter().filter_map(|r| r.band.as_deref()).collect()));

        Self {
            sites,
            sectors,
            bands,
            date_range: span(table),
        }
    }
}

fn span(table: &KpiTable) -> Option<DateRange> {
    let days = table.records.iter().map(|r| r.date.date());
    let (start, end) = days.fold(None::<(NaiveDate, NaiveDate)>, |acc, day| match acc {
        None => Some((day, day)),
        Some((lo, hi)) => Some((lo.min(day), hi.max(day))),
    })?;
    Some(DateRange { start, end })
}
