//! Schema catalog
//!
//! The catalog maps a report type to its `ReportSchema`. It is built once at
//! startup, validated, and then shared read-only (behind an `Arc`) by every
//! job. Nothing in the pipeline reaches for a global catalog; it is always
//! passed in explicitly.
//!
//! # Example
//!
//! ```rust,ignore
//! use report_pipeline::catalog::SchemaCatalog;
//!
//! let catalog = SchemaCatalog::load("reports.yaml")?;
//! let schema = catalog.require("campus_assets")?;
//! println!("{} columns", schema.columns.len());
//! ```

mod builtin;
mod error;
mod schema;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use builtin::BUILTIN_CATALOG_YAML;
pub use error::{CatalogError, CatalogResult};
pub use schema::{
    ChartKind, ChartSource, ChartSpec, ColumnSpec, ColumnType, Constraints, Derivation,
    DerivedColumn, InventoryColumns, ReportSchema, TextCase, humanize, normalize_header,
};

/// On-disk catalog layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    reports: Vec<ReportSchema>,
}

/// Read-only registry of report schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, ReportSchema>,
}

impl SchemaCatalog {
    /// Build a catalog, validating every schema
    pub fn new(schemas: Vec<ReportSchema>) -> CatalogResult<Self> {
        let mut map = BTreeMap::new();
        for schema in schemas {
            schema.validate()?;
            if map.contains_key(&schema.report_type) {
                return Err(CatalogError::DuplicateReportType(schema.report_type));
            }
            map.insert(schema.report_type.clone(), schema);
        }
        Ok(Self { schemas: map })
    }

    /// Catalog with the built-in report types
    pub fn builtin() -> CatalogResult<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG_YAML)
    }

    pub fn from_yaml_str(content: &str) -> CatalogResult<Self> {
        let file: CatalogFile =
            serde_yaml::from_str(content).map_err(|e| CatalogError::Parse {
                format: "YAML".to_string(),
                message: e.to_string(),
            })?;
        Self::new(file.reports)
    }

    pub fn from_json_str(content: &str) -> CatalogResult<Self> {
        let file: CatalogFile =
            serde_json::from_str(content).map_err(|e| CatalogError::Parse {
                format: "JSON".to_string(),
                message: e.to_string(),
            })?;
        Self::new(file.reports)
    }

    /// Load a catalog file, choosing the parser from the extension
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let catalog = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content)?,
            "json" => Self::from_json_str(&content)?,
            other => return Err(CatalogError::UnsupportedFormat(other.to_string())),
        };

        debug!(path = %path.display(), report_types = catalog.len(), "Loaded schema catalog");
        Ok(catalog)
    }

    pub fn get(&self, report_type: &str) -> Option<&ReportSchema> {
        self.schemas.get(report_type)
    }

    /// Like `get`, but an unknown report type is an error
    pub fn require(&self, report_type: &str) -> CatalogResult<&ReportSchema> {
        self.get(report_type)
            .ok_or_else(|| CatalogError::UnknownReportType(report_type.to_string()))
    }

    pub fn report_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &ReportSchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
