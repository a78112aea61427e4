//! Schema validation.
//!
//! Two kinds of checks live here:
//!
//! - **Table schema**: the upload must carry every required canonical column
//!   (`date, site, traffic_gb, availability, lat, lon`). The check is
//!   fail-fast and reports only the first missing column, in that order.
//! - **JSON Schema** (draft 7) for configuration documents such as the
//!   column alias table.
//!
//! Typed coercion of a validated table is in [`coerce`].
//!
//! # Example
//!
//! ```rust,ignore
//! use nockpi::parser::{load_bytes, ColumnAliases};
//! use nockpi::validation::validate_required;
//!
//! let raw = load_bytes(b"date,site\n2024-01-01,A", &ColumnAliases::builtin(), None)?;
//! let err = validate_required(&raw).unwrap_err();
//! assert_eq!(err.to_string(), "Missing required column: traffic_gb");
//! ```

pub mod coerce;

pub use coerce::{build_table, parse_date, parse_number, TypedTable};

use serde_json::Value;

use crate::error::SchemaError;
use crate::models::columns;
use crate::parser::RawTable;

/// Check the required columns in order, stopping at the first missing one.
pub fn validate_required(raw: &RawTable) -> Result<(), SchemaError> {
    match columns::REQUIRED.iter().find(|col| !raw.has_column(col)) {
        Some(missing) => Err(SchemaError::MissingColumn(missing.to_string())),
        None => Ok(()),
    }
}

/// Validate a JSON document against a JSON Schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every error otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick true/false variant of [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{load_bytes, ColumnAliases};
    use serde_json::json;

    fn raw(csv: &str) -> RawTable {
        load_bytes(csv.as_bytes(), &ColumnAliases::builtin(), None).unwrap()
    }

    #[test]
    fn test_all_required_present() {
        let table = raw("date,site,traffic_gb,availability,lat,lon\n2024-01-01,A,1,99,-6,106");
        assert!(validate_required(&table).is_ok());
    }

    #[test]
    fn test_first_missing_column_reported() {
        // both availability and lon are missing; availability comes first
        let table = raw("date,site,traffic_gb,lat\n2024-01-01,A,1,-6");
        assert_eq!(
            validate_required(&table),
            Err(SchemaError::MissingColumn("availability".into()))
        );
    }

    #[test]
    fn test_missing_date_reported_before_everything() {
        let table = raw("foo\n1");
        assert_eq!(
            validate_required(&table),
            Err(SchemaError::MissingColumn("date".into()))
        );
    }

    #[test]
    fn test_aliases_satisfy_schema() {
        let table = raw("Date,eNodeBName,Payload,Availability,Lat,Lon\n2024-01-01,E1,5,99,-6.2,106.8");
        assert!(validate_required(&table).is_ok());
    }

    #[test]
    fn test_json_schema_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });

        assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
        assert!(is_valid(&schema, &json!({ "name": "test" })));

        let errors = validate(&schema, &json!({ "age": 42 })).unwrap_err();
        assert!(!errors.is_empty());
        assert!(!is_valid(&schema, &json!({ "age": 42 })));
    }
}
