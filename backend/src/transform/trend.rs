//! Per-date trend series for charts.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{Mean, Warnings};
use crate::error::PipelineWarning;
use crate::models::KpiTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDateTime,
    pub value: f64,
}

/// Mean of one column per distinct timestamp, ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub column: String,
    pub points: Vec<TrendPoint>,
}

/// Group `table` by date and average `column`.
///
/// An unknown or non-numeric column yields an empty series and an
/// [`PipelineWarning::UnknownColumn`] warning. Dates where every value of the
/// column is missing are skipped.
pub fn trend_by_date(table: &KpiTable, column: &str, warnings: &mut Warnings) -> TrendSeries {
    let Some(col) = table.numeric_column(column) else {
        warnings.push(PipelineWarning::UnknownColumn {
            column: column.to_string(),
        });
        return TrendSeries {
            column: column.to_string(),
            points: Vec::new(),
        };
    };

    let mut by_date: BTreeMap<NaiveDateTime, Mean> = BTreeMap::new();
    for record in &table.records {
        let mean = by_date.entry(record.date).or_default();
        if let Some(value) = col.value(record) {
            mean.add(value);
        }
    }

    let points = by_date
        .into_iter()
        .filter_map(|(date, mean)| mean.value().map(|value| TrendPoint { date, value }))
        .collect();

    TrendSeries {
        column: column.to_string(),
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnPresence, KpiRecord};
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn record(day: u32, site: &str, traffic_gb: f64, prb: Option<f64>) -> KpiRecord {
        KpiRecord {
            date: at(day),
            site: site.into(),
            sector: None,
            band: None,
            traffic_gb,
            availability: 99.0,
            prb,
            lat: Some(-6.2),
            lon: Some(106.8),
            extras: BTreeMap::new(),
        }
    }

    fn table(records: Vec<KpiRecord>) -> KpiTable {
        let presence = ColumnPresence {
            prb: true,
            ..ColumnPresence::default()
        };
        KpiTable::new(presence, vec![], records)
    }

    #[test]
    fn test_mean_per_date_ascending() {
        let mut warnings = Warnings::new();
        let input = table(vec![
            record(2, "A", 7.0, None),
            record(1, "A", 10.0, None),
            record(1, "B", 20.0, None),
        ]);

        let series = trend_by_date(&input, "traffic_gb", &mut warnings);

        assert_eq!(
            series.points,
            vec![
                TrendPoint { date: at(1), value: 15.0 },
                TrendPoint { date: at(2), value: 7.0 },
            ]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_dates_without_values_skipped() {
        let mut warnings = Warnings::new();
        let input = table(vec![record(1, "A", 1.0, Some(80.0)), record(2, "A", 1.0, None)]);

        let series = trend_by_date(&input, "prb", &mut warnings);

        assert_eq!(series.points, vec![TrendPoint { date: at(1), value: 80.0 }]);
    }

    #[test]
    fn test_unknown_column_warns() {
        let mut warnings = Warnings::new();
        let series = trend_by_date(&table(vec![record(1, "A", 1.0, None)]), "rsrp", &mut warnings);

        assert!(series.points.is_empty());
        assert_eq!(
            warnings.as_slice(),
            &[PipelineWarning::UnknownColumn { column: "rsrp".into() }]
        );
    }

    #[test]
    fn test_text_column_is_unknown() {
        let mut warnings = Warnings::new();
        let series = trend_by_date(&table(vec![record(1, "A", 1.0, None)]), "site", &mut warnings);
        assert!(series.points.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
