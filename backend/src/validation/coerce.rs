//! Typed coercion of a schema-valid [`RawTable`] into a [`KpiTable`].
//!
//! Cell-level failures never abort the run. Rows whose `date`, `site`,
//! `traffic_gb` or `availability` cannot be read are dropped and reported as
//! [`RowIssue`]s. Optional values (`sector`, `band`, `prb`) and coordinates
//! become `None`; coordinates are resolved later by the geo sanitizer.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

use super::validate_required;
use crate::error::{RowIssue, SchemaError};
use crate::models::{columns, ColumnPresence, KpiRecord, KpiTable};
use crate::parser::RawTable;

/// Date-time layouts tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Date-only layouts tried in order. Month-first wins for ambiguous slashes.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y%m%d",
];

/// A coerced table plus the rows that did not make it.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedTable {
    pub table: KpiTable,
    pub row_issues: Vec<RowIssue>,
}

/// Parse a timestamp cell; `None` when no known layout matches.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a numeric cell; empty, non-numeric and NaN cells are `None`.
pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
}

/// Validate the required columns, then coerce every row.
pub fn build_table(raw: &RawTable) -> Result<TypedTable, SchemaError> {
    validate_required(raw)?;

    let index = |name: &str| raw.column_index(name);
    let required = |name: &str| index(name).ok_or_else(|| SchemaError::MissingColumn(name.to_string()));

    let date_idx = required(columns::DATE)?;
    let site_idx = required(columns::SITE)?;
    let traffic_idx = required(columns::TRAFFIC_GB)?;
    let avail_idx = required(columns::AVAILABILITY)?;
    let lat_idx = required(columns::LAT)?;
    let lon_idx = required(columns::LON)?;
    let sector_idx = index(columns::SECTOR);
    let band_idx = index(columns::BAND);
    let prb_idx = index(columns::PRB);

    let presence = ColumnPresence::from_headers(&raw.headers);
    let extras = numeric_extra_columns(raw);

    let mut records = Vec::with_capacity(raw.rows.len());
    let mut row_issues = Vec::new();

    for row in &raw.rows {
        let cell = |idx: usize| row.cells[idx].as_str();
        let issue = |column: &str, message: &str| {
            RowIssue::new(row.line, message)
                .with_column(column)
                .with_value(cell(raw.column_index(column).unwrap_or(0)))
        };

        let Some(date) = parse_date(cell(date_idx)) else {
            row_issues.push(issue(columns::DATE, "unparseable date"));
            continue;
        };

        let site = cell(site_idx).trim();
        if site.is_empty() {
            row_issues.push(RowIssue::new(row.line, "empty site").with_column(columns::SITE));
            continue;
        }

        let Some(traffic_gb) = parse_number(cell(traffic_idx)) else {
            row_issues.push(issue(columns::TRAFFIC_GB, "not a number"));
            continue;
        };

        let Some(availability) = parse_number(cell(avail_idx)) else {
            row_issues.push(issue(columns::AVAILABILITY, "not a number"));
            continue;
        };

        let text = |idx: Option<usize>| {
            idx.map(|i| cell(i).trim())
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let extra_values: BTreeMap<String, f64> = extras
            .iter()
            .filter_map(|(name, idx)| parse_number(cell(*idx)).map(|v| (name.clone(), v)))
            .collect();

        records.push(KpiRecord {
            date,
            site: site.to_string(),
            sector: text(sector_idx),
            band: text(band_idx),
            traffic_gb,
            availability,
            prb: prb_idx.and_then(|i| parse_number(cell(i))),
            lat: parse_number(cell(lat_idx)),
            lon: parse_number(cell(lon_idx)),
            extras: extra_values,
        });
    }

    let extra_columns = extras.into_iter().map(|(name, _)| name).collect();

    Ok(TypedTable {
        table: KpiTable::new(presence, extra_columns, records),
        row_issues,
    })
}

/// Non-canonical columns whose non-empty cells all parse as numbers.
fn numeric_extra_columns(raw: &RawTable) -> Vec<(String, usize)> {
    let mut extras: Vec<(String, usize)> = Vec::new();

    for (idx, header) in raw.headers.iter().enumerate() {
        if header.is_empty() || columns::is_canonical(header) || extras.iter().any(|(name, _)| name == header) {
            continue;
        }

        let mut seen_value = false;
        let all_numeric = raw.rows.iter().all(|row| {
            let value = row.cells[idx].trim();
            if value.is_empty() {
                return true;
            }
            seen_value = true;
            parse_number(value).is_some()
        });

        if all_numeric && seen_value {
            extras.push((header.clone(), idx));
        }
    }

    extras
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{load_bytes, ColumnAliases};

    const HEADER: &str = "date,site,traffic_gb,availability,lat,lon";

    fn typed(csv: &str) -> TypedTable {
        let raw = load_bytes(csv.as_bytes(), &ColumnAliases::builtin(), None).unwrap();
        build_table(&raw).unwrap()
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        for input in ["2024-01-02", "2024/01/02", "01/02/2024", "2024-01-02 00:00:00", "2024-01-02T00:00:00"] {
            assert_eq!(parse_date(input).map(|d| d.date()), Some(expected), "input {input}");
        }
        // day > 12 cannot be month-first, falls back to day-first
        assert_eq!(
            parse_date("25/01/2024").map(|d| d.date()),
            NaiveDate::from_ymd_opt(2024, 1, 25)
        );
        assert_eq!(
            parse_date("2024-01-02T10:30:00+07:00").map(|d| d.to_string()),
            Some("2024-01-02 10:30:00".to_string())
        );
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 99.5 "), Some(99.5));
        assert_eq!(parse_number("-6.2"), Some(-6.2));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_build_table_basic() {
        let result = typed(&format!("{HEADER}\n2024-01-01,SiteA,100,99.5,-6.2,106.8"));
        assert!(result.row_issues.is_empty());
        let rec = &result.table.records[0];
        assert_eq!(rec.site, "SiteA");
        assert_eq!(rec.traffic_gb, 100.0);
        assert_eq!(rec.availability, 99.5);
        assert_eq!(rec.lat, Some(-6.2));
        assert_eq!(rec.lon, Some(106.8));
        assert!(rec.prb.is_none());
        assert!(!result.table.presence.prb);
    }

    #[test]
    fn test_unparseable_date_dropped() {
        let result = typed(&format!("{HEADER}\nnot-a-date,SiteA,1,99,-6,106\n2024-01-01,SiteA,1,99,-6,106"));
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.row_issues.len(), 1);
        assert_eq!(result.row_issues[0].line, 2);
        assert_eq!(result.row_issues[0].column.as_deref(), Some("date"));
        assert_eq!(result.row_issues[0].value.as_deref(), Some("not-a-date"));
    }

    #[test]
    fn test_non_numeric_availability_dropped() {
        let result = typed(&format!("{HEADER}\n2024-01-01,SiteA,1,down,-6,106"));
        assert!(result.table.is_empty());
        assert_eq!(result.row_issues[0].column.as_deref(), Some("availability"));
    }

    #[test]
    fn test_bad_coordinates_kept_for_sanitizer() {
        let result = typed(&format!("{HEADER}\n2024-01-01,SiteA,1,99,unknown,106"));
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.table.records[0].lat, None);
    }

    #[test]
    fn test_optional_columns() {
        let result = typed("date,site,sector,band,traffic_gb,availability,prb,lat,lon\n2024-01-01,A,1,,5,99,,-6,106\n2024-01-02,A,2,L900,5,99,88,-6,106");
        let table = &result.table;
        assert!(table.presence.sector && table.presence.band && table.presence.prb);
        assert_eq!(table.records[0].band, None);
        assert_eq!(table.records[0].prb, None);
        assert_eq!(table.records[1].band.as_deref(), Some("L900"));
        assert_eq!(table.records[1].prb, Some(88.0));
    }

    #[test]
    fn test_extra_numeric_columns() {
        let result = typed(&format!("{HEADER},users,vendor\n2024-01-01,A,1,99,-6,106,12,Nokia\n2024-01-02,A,1,99,-6,106,,Ericsson"));
        let table = &result.table;
        assert_eq!(table.extra_columns, vec!["users"]);
        assert_eq!(table.records[0].extras.get("users"), Some(&12.0));
        assert!(table.records[1].extras.is_empty());
    }

    #[test]
    fn test_missing_column_propagates() {
        let raw = load_bytes(b"date,site\n2024-01-01,A", &ColumnAliases::builtin(), None).unwrap();
        assert_eq!(
            build_table(&raw).unwrap_err(),
            SchemaError::MissingColumn("traffic_gb".into())
        );
    }
}
