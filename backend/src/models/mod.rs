//! Domain models for the KPI pipeline.
//!
//! - [`KpiRecord`] / [`KpiTable`] - typed rows with explicit optional-column presence
//! - [`FilterCriteria`] / [`Selection`] / [`DateRange`] - what the user selected
//! - [`Thresholds`] - congestion thresholds, bounded like the dashboard sliders
//! - [`ViewSettings`] - presentation settings owned by a session
//!
//! Canonical column names live in [`columns`].

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PipelineError, PipelineResult};

// =============================================================================
// Canonical columns
// =============================================================================

/// Canonical, pipeline-internal column names.
pub mod columns {
    pub const DATE: &str = "date";
    pub const SITE: &str = "site";
    pub const SECTOR: &str = "sector";
    pub const BAND: &str = "band";
    pub const TRAFFIC_GB: &str = "traffic_gb";
    pub const AVAILABILITY: &str = "availability";
    pub const PRB: &str = "prb";
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";

    /// Required columns, in the order the validator checks them.
    pub const REQUIRED: [&str; 6] = [DATE, SITE, TRAFFIC_GB, AVAILABILITY, LAT, LON];

    /// Columns that may be absent from a source.
    pub const OPTIONAL: [&str; 3] = [SECTOR, BAND, PRB];

    /// Every column the pipeline knows by name.
    pub const CANONICAL: [&str; 9] = [DATE, SITE, SECTOR, BAND, TRAFFIC_GB, AVAILABILITY, PRB, LAT, LON];

    pub fn is_canonical(name: &str) -> bool {
        CANONICAL.contains(&name)
    }
}

// =============================================================================
// KPI records
// =============================================================================

/// One row of the table after normalization and coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiRecord {
    pub date: NaiveDateTime,
    pub site: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    pub traffic_gb: f64,
    pub availability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prb: Option<f64>,
    /// `None` until the geo sanitizer has resolved it; never `None` afterwards.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Extra numeric source columns, only the values that parsed.
    #[serde(flatten)]
    pub extras: BTreeMap<String, f64>,
}

/// Which optional columns the source carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnPresence {
    pub sector: bool,
    pub band: bool,
    pub prb: bool,
}

impl ColumnPresence {
    /// Presence flags from a list of normalized headers.
    pub fn from_headers(headers: &[String]) -> Self {
        let has = |name: &str| headers.iter().any(|h| h == name);
        Self {
            sector: has(columns::SECTOR),
            band: has(columns::BAND),
            prb: has(columns::PRB),
        }
    }
}

/// A numeric column of a [`KpiTable`], resolved once and read per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericColumn {
    TrafficGb,
    Availability,
    Prb,
    Lat,
    Lon,
    Extra(String),
}

impl NumericColumn {
    pub fn name(&self) -> &str {
        match self {
            NumericColumn::TrafficGb => columns::TRAFFIC_GB,
            NumericColumn::Availability => columns::AVAILABILITY,
            NumericColumn::Prb => columns::PRB,
            NumericColumn::Lat => columns::LAT,
            NumericColumn::Lon => columns::LON,
            NumericColumn::Extra(name) => name,
        }
    }

    pub fn value(&self, record: &KpiRecord) -> Option<f64> {
        match self {
            NumericColumn::TrafficGb => Some(record.traffic_gb),
            NumericColumn::Availability => Some(record.availability),
            NumericColumn::Prb => record.prb,
            NumericColumn::Lat => record.lat,
            NumericColumn::Lon => record.lon,
            NumericColumn::Extra(name) => record.extras.get(name).copied(),
        }
    }
}

/// Records sharing a uniform schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiTable {
    pub presence: ColumnPresence,
    /// Non-canonical columns whose values are all numeric.
    pub extra_columns: Vec<String>,
    pub records: Vec<KpiRecord>,
}

impl KpiTable {
    pub fn new(presence: ColumnPresence, extra_columns: Vec<String>, records: Vec<KpiRecord>) -> Self {
        Self {
            presence,
            extra_columns,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Same schema, different rows.
    pub fn with_records(&self, records: Vec<KpiRecord>) -> Self {
        Self {
            presence: self.presence,
            extra_columns: self.extra_columns.clone(),
            records,
        }
    }

    /// Resolve a column name to a numeric column present in this table.
    pub fn numeric_column(&self, name: &str) -> Option<NumericColumn> {
        match name {
            columns::TRAFFIC_GB => Some(NumericColumn::TrafficGb),
            columns::AVAILABILITY => Some(NumericColumn::Availability),
            columns::PRB if self.presence.prb => Some(NumericColumn::Prb),
            columns::LAT => Some(NumericColumn::Lat),
            columns::LON => Some(NumericColumn::Lon),
            other if self.extra_columns.iter().any(|c| c == other) => {
                Some(NumericColumn::Extra(other.to_string()))
            }
            _ => None,
        }
    }

    /// Every numeric column present, canonical ones first.
    pub fn numeric_columns(&self) -> Vec<NumericColumn> {
        let mut cols = vec![NumericColumn::TrafficGb, NumericColumn::Availability];
        if self.presence.prb {
            cols.push(NumericColumn::Prb);
        }
        cols.push(NumericColumn::Lat);
        cols.push(NumericColumn::Lon);
        cols.extend(self.extra_columns.iter().cloned().map(NumericColumn::Extra));
        cols
    }
}

// =============================================================================
// Filter criteria
// =============================================================================

/// Label the controls use for "no restriction".
pub const ALL: &str = "All";

/// A single-select categorical filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => value == Some(wanted.as_str()),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

impl From<String> for Selection {
    fn from(value: String) -> Self {
        if value.is_empty() || value == ALL {
            Selection::All
        } else {
            Selection::Only(value)
        }
    }
}

impl From<&str> for Selection {
    fn from(value: &str) -> Self {
        Selection::from(value.to_string())
    }
}

impl From<Selection> for String {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::All => ALL.to_string(),
            Selection::Only(value) => value,
        }
    }
}

/// Inclusive calendar window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> PipelineResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.start > self.end {
            return Err(PipelineError::InvalidDateRange {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        Ok(())
    }

    /// Compares on the calendar day, so the whole `end` day is included.
    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        let day = timestamp.date();
        day >= self.start && day <= self.end
    }
}

/// Transient filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub site: Selection,
    pub sector: Selection,
    pub band: Selection,
    /// `None` means the full span of the table.
    pub date_range: Option<DateRange>,
}

impl FilterCriteria {
    pub fn validate(&self) -> PipelineResult<()> {
        match &self.date_range {
            Some(range) => range.validate(),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Thresholds
// =============================================================================

/// Congestion thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Availability below this is congested.
    pub availability: f64,
    /// PRB above this is congested, when the table has PRB.
    pub prb: f64,
}

impl Thresholds {
    pub const AVAILABILITY_RANGE: (f64, f64) = (90.0, 100.0);
    pub const PRB_RANGE: (f64, f64) = (70.0, 100.0);
    pub const DEFAULT_AVAILABILITY: f64 = 95.0;
    pub const DEFAULT_PRB: f64 = 85.0;

    pub fn new(availability: f64, prb: f64) -> PipelineResult<Self> {
        let thresholds = Self { availability, prb };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        check_range("availability", self.availability, Self::AVAILABILITY_RANGE)?;
        check_range("prb", self.prb, Self::PRB_RANGE)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            availability: Self::DEFAULT_AVAILABILITY,
            prb: Self::DEFAULT_PRB,
        }
    }
}

pub(crate) fn check_range(name: &'static str, value: f64, (min, max): (f64, f64)) -> PipelineResult<()> {
    // NaN fails both comparisons, so test for containment
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidThreshold { name, value, min, max })
    }
}

// =============================================================================
// View settings
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

/// Presentation settings for one session.
///
/// Handed to the rendering layer with every report; the pipeline never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewSettings {
    pub theme: Theme,
    pub markers: bool,
    pub line_style: LineStyle,
    /// Horizontal KPI target line on trend charts.
    pub target: Option<f64>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            markers: true,
            line_style: LineStyle::Solid,
            target: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(date: &str, site: &str) -> KpiRecord {
        KpiRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            site: site.to_string(),
            sector: None,
            band: None,
            traffic_gb: 1.0,
            availability: 99.0,
            prb: None,
            lat: Some(-6.2),
            lon: Some(106.8),
            extras: BTreeMap::new(),
        }
    }

    #[test]
    fn test_selection_from_all_label() {
        assert_eq!(Selection::from("All"), Selection::All);
        assert_eq!(Selection::from(""), Selection::All);
        assert_eq!(Selection::from("SiteA"), Selection::Only("SiteA".into()));
    }

    #[test]
    fn test_selection_serde() {
        let criteria: FilterCriteria = serde_json::from_value(json!({
            "site": "SiteA",
            "band": "All"
        }))
        .unwrap();
        assert_eq!(criteria.site, Selection::Only("SiteA".into()));
        assert!(criteria.band.is_all());
        assert!(criteria.sector.is_all());
        assert!(criteria.date_range.is_none());

        let back = serde_json::to_value(&criteria).unwrap();
        assert_eq!(back["site"], "SiteA");
        assert_eq!(back["sector"], "All");
    }

    #[test]
    fn test_date_range_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let range = DateRange::new(start, end).unwrap();

        assert!(range.contains(&start.and_hms_opt(0, 0, 0).unwrap()));
        assert!(range.contains(&end.and_hms_opt(23, 59, 59).unwrap()));
        assert!(!range.contains(&NaiveDate::from_ymd_opt(2024, 1, 3).unwrap().and_hms_opt(0, 0, 0).unwrap()));
    }

    #[test]
    fn test_date_range_reversed() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(matches!(
            DateRange::new(start, end),
            Err(PipelineError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(Thresholds::new(90.0, 70.0).is_ok());
        assert!(Thresholds::new(100.0, 100.0).is_ok());
        assert!(Thresholds::new(89.9, 85.0).is_err());
        assert!(Thresholds::new(95.0, 100.1).is_err());
        assert!(Thresholds::new(f64::NAN, 85.0).is_err());
        assert_eq!(Thresholds::default(), Thresholds { availability: 95.0, prb: 85.0 });
    }

    #[test]
    fn test_numeric_column_resolution() {
        let mut rec = record("2024-01-01", "SiteA");
        rec.extras.insert("rrc_users".into(), 42.0);
        let table = KpiTable::new(ColumnPresence::default(), vec!["rrc_users".into()], vec![rec.clone()]);

        assert_eq!(table.numeric_column("traffic_gb"), Some(NumericColumn::TrafficGb));
        // prb only resolves when the source had it
        assert_eq!(table.numeric_column("prb"), None);
        assert_eq!(table.numeric_column("site"), None);

        let extra = table.numeric_column("rrc_users").unwrap();
        assert_eq!(extra.value(&rec), Some(42.0));

        let names: Vec<String> = table.numeric_columns().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["traffic_gb", "availability", "lat", "lon", "rrc_users"]);
    }

    #[test]
    fn test_presence_from_headers() {
        let headers = vec!["date".to_string(), "prb".to_string(), "band".to_string()];
        let presence = ColumnPresence::from_headers(&headers);
        assert!(presence.prb);
        assert!(presence.band);
        assert!(!presence.sector);
    }

    #[test]
    fn test_view_settings_defaults() {
        let view: ViewSettings = serde_json::from_value(json!({ "theme": "dark", "target": 99.5 })).unwrap();
        assert_eq!(view.theme, Theme::Dark);
        assert!(view.markers);
        assert_eq!(view.line_style, LineStyle::Solid);
        assert_eq!(view.target, Some(99.5));
    }
}
