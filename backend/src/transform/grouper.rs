//! Group KPI rows by site and compute headline metrics.
//!
//! # Architecture
//!
//! ```text
//! Filtered rows (one per site/date)      →  Site summary (one per site)
//! ┌──────────────────────────────────┐     ┌──────────────────────────────┐
//! │ SiteA, 2024-01-01, traffic 5     │     │ SiteA  traffic 10, avail 97  │
//! │ SiteA, 2024-01-02, traffic 15    │  →  ├──────────────────────────────┤
//! │ SiteB, 2024-01-01, traffic 8     │     │ SiteB  traffic 8,  avail 99  │
//! └──────────────────────────────────┘     └──────────────────────────────┘
//! ```
//!
//! Every numeric column the table carries is averaged, extras included.
//! Missing values are skipped rather than counted as zero; a column with no
//! values for a site is omitted from that site's row.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{KpiTable, NumericColumn};

/// Running arithmetic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` until at least one value was added.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Means of every numeric column for one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub site: String,
    pub records: usize,
    #[serde(flatten)]
    pub means: BTreeMap<String, f64>,
}

/// Headline metrics of a filtered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total_sites: usize,
    /// `None` for an empty table
    pub avg_availability: Option<f64>,
    pub total_traffic_gb: f64,
    pub records: usize,
}

/// Accumulates one site's rows while grouping.
struct SiteBuilder {
    records: usize,
    means: Vec<Mean>,
}

impl SiteBuilder {
    fn new(columns: usize) -> Self {
        Self {
            records: 0,
            means: vec![Mean::default(); columns],
        }
    }

    fn build(self, site: String, columns: &[NumericColumn]) -> SiteSummary {
        let means = columns
            .iter()
            .zip(self.means)
            .filter_map(|(col, mean)| mean.value().map(|v| (col.name().to_string(), v)))
            .collect();

        SiteSummary {
            site,
            records: self.records,
            means,
        }
    }
}

/// One row per distinct site, sorted by site.
pub fn site_summary(table: &KpiTable) -> Vec<SiteSummary> {
    let columns = table.numeric_columns();
    let mut sites: BTreeMap<&str, SiteBuilder> = BTreeMap::new();

    for record in &table.records {
        let builder = sites
            .entry(record.site.as_str())
            .or_insert_with(|| SiteBuilder::new(columns.len()));
        builder.records += 1;

        for (col, mean) in columns.iter().zip(builder.means.iter_mut()) {
            if let Some(value) = col.value(record) {
                mean.add(value);
            }
        }
    }

    sites
        .into_iter()
        .map(|(site, builder)| builder.build(site.to_string(), &columns))
        .collect()
}

/// Distinct sites, mean availability and total traffic.
pub fn summarize(table: &KpiTable) -> KpiSummary {
    let sites: BTreeSet<&str> = table.records.iter().map(|r| r.site.as_str()).collect();

    let mut availability = Mean::default();
    let mut total_traffic_gb = 0.0;
    for record in &table.records {
        availability.add(record.availability);
        total_traffic_gb += record.traffic_gb;
    }

    KpiSummary {
        total_sites: sites.len(),
        avg_availability: availability.value(),
        total_traffic_gb,
        records: table.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnPresence, KpiRecord};
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(day: u32, site: &str, traffic_gb: f64, availability: f64) -> KpiRecord {
        KpiRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            site: site.into(),
            sector: None,
            band: None,
            traffic_gb,
            availability,
            prb: None,
            lat: Some(-6.0),
            lon: Some(106.0),
            extras: BTreeMap::new(),
        }
    }

    fn table(records: Vec<KpiRecord>) -> KpiTable {
        KpiTable::new(ColumnPresence::default(), vec![], records)
    }

    #[test]
    fn test_mean_accumulator() {
        let mut mean = Mean::default();
        assert_eq!(mean.value(), None);
        mean.add(5.0);
        mean.add(15.0);
        assert_eq!(mean.value(), Some(10.0));
        assert_eq!(mean.count(), 2);
    }

    #[test]
    fn test_site_summary_means() {
        let input = table(vec![
            record(1, "SiteB", 8.0, 99.0),
            record(1, "SiteA", 5.0, 96.0),
            record(2, "SiteA", 15.0, 98.0),
        ]);

        let summary = site_summary(&input);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].site, "SiteA");
        assert_eq!(summary[0].records, 2);
        assert_eq!(summary[0].means["traffic_gb"], 10.0);
        assert_eq!(summary[0].means["availability"], 97.0);
        assert_eq!(summary[1].site, "SiteB");
        assert_eq!(summary[1].means["traffic_gb"], 8.0);
        // prb is absent from the table, so it has no mean
        assert!(!summary[0].means.contains_key("prb"));
    }

    #[test]
    fn test_site_summary_extras_skip_missing() {
        let mut a = record(1, "SiteA", 1.0, 99.0);
        a.extras.insert("users".into(), 40.0);
        let b = record(2, "SiteA", 1.0, 99.0);
        let input = KpiTable::new(ColumnPresence::default(), vec!["users".into()], vec![a, b]);

        let summary = site_summary(&input);

        assert_eq!(summary[0].means["users"], 40.0);
    }

    #[test]
    fn test_site_summary_serializes_flat() {
        let summary = site_summary(&table(vec![record(1, "SiteA", 5.0, 99.0)]));
        let json = serde_json::to_value(&summary[0]).unwrap();
        assert_eq!(json["site"], "SiteA");
        assert_eq!(json["traffic_gb"], json!(5.0));
    }

    #[test]
    fn test_summarize() {
        let input = table(vec![
            record(1, "SiteA", 5.0, 96.0),
            record(2, "SiteA", 15.0, 98.0),
            record(1, "SiteB", 10.0, 100.0),
        ]);

        let summary = summarize(&input);

        assert_eq!(summary.total_sites, 2);
        assert_eq!(summary.avg_availability, Some(98.0));
        assert_eq!(summary.total_traffic_gb, 30.0);
        assert_eq!(summary.records, 3);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&KpiTable::default());
        assert_eq!(summary.total_sites, 0);
        assert_eq!(summary.avg_availability, None);
        assert_eq!(summary.total_traffic_gb, 0.0);
    }
}
