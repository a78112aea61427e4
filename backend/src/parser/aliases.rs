//! Column alias table - which source header spellings map to which canonical column.
//!
//! The table is data, not code: the built-in default covers the canonical
//! export and the eNodeB-style export (`Date, eNodeBName, Sector, Band,
//! Payload, PRB, Availability, Lat, Lon`). Other sources ship their own JSON
//! file, validated against `schemas/column-aliases.json`.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "aliases": {
//!     "site": ["eNodeBName", "Cell Site"],
//!     "traffic_gb": ["Payload"]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use super::normalize_header;
use crate::error::{ConfigError, ConfigResult};
use crate::models::columns;
use crate::validation::validate;

/// Embedded JSON Schema for alias files.
const ALIASES_SCHEMA: &str = include_str!("../../schemas/column-aliases.json");

/// Version of the built-in table.
pub const BUILTIN_VERSION: &str = "1.0";

/// Canonical name -> accepted source spellings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAliases {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl ColumnAliases {
    /// A table that only accepts canonical names.
    pub fn empty() -> Self {
        Self {
            version: BUILTIN_VERSION.to_string(),
            description: None,
            aliases: BTreeMap::new(),
        }
    }

    /// The default table shipped with the crate.
    pub fn builtin() -> Self {
        let pairs: [(&str, &str); 9] = [
            (columns::DATE, "Date"),
            (columns::SITE, "eNodeBName"),
            (columns::SECTOR, "Sector"),
            (columns::BAND, "Band"),
            (columns::TRAFFIC_GB, "Payload"),
            (columns::PRB, "PRB"),
            (columns::AVAILABILITY, "Availability"),
            (columns::LAT, "Lat"),
            (columns::LON, "Lon"),
        ];

        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (canonical, spelling) in pairs {
            aliases.entry(canonical.to_string()).or_default().push(spelling.to_string());
        }

        Self {
            version: BUILTIN_VERSION.to_string(),
            description: Some("Canonical export and eNodeB-style export".to_string()),
            aliases,
        }
    }

    /// Add one accepted spelling for a canonical column.
    pub fn with_alias(mut self, canonical: &str, spelling: &str) -> ConfigResult<Self> {
        if !columns::is_canonical(canonical) {
            return Err(ConfigError::UnknownCanonical(canonical.to_string()));
        }
        let spellings = self.aliases.entry(canonical.to_string()).or_default();
        if !spellings.iter().any(|s| s == spelling) {
            spellings.push(spelling.to_string());
        }
        Ok(self)
    }

    /// Parse and schema-check an alias table.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let schema: Value = serde_json::from_str(ALIASES_SCHEMA)?;
        let data: Value = serde_json::from_str(content)?;

        validate(&schema, &data).map_err(ConfigError::InvalidAliases)?;

        let table: ColumnAliases = serde_json::from_value(data)?;
        if let Some(unknown) = table.aliases.keys().find(|k| !columns::is_canonical(k)) {
            return Err(ConfigError::UnknownCanonical(unknown.clone()));
        }
        Ok(table)
    }

    /// Load an alias table from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Canonical name for an already-normalized header, if it has one.
    pub fn resolve(&self, normalized: &str) -> Option<&str> {
        if let Some(canonical) = columns::CANONICAL.iter().find(|c| **c == normalized) {
            return Some(*canonical);
        }
        self.aliases
            .iter()
            .find(|(_, spellings)| spellings.iter().any(|s| normalize_header(s) == normalized))
            .map(|(canonical, _)| canonical.as_str())
    }
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self::builtin()
    }
}
