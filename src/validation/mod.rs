//! Schema validation
//!
//! Checks every row of a `RawTable` against its report schema: required
//! columns present and non-blank, values readable as the declared type, and
//! domain constraints satisfied. Rows with problems are reported, never
//! dropped silently, and never abort validation. Headers the schema does not
//! know are ignored.

pub mod coerce;
mod error;
mod report;
mod validator;

pub use error::{ValidationError, ValidationResult};
pub use report::{Rule, ValidationReport, Violation};
pub use validator::{ColumnMapping, SchemaValidator};
