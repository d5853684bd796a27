//! Error types for normalization

use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors raised while normalizing validated rows
///
/// None of these are caused by user data: rows reaching the normalizer have
/// already passed validation, so every variant points at configuration or an
/// internal inconsistency.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// The pinned rate table has no rate for a currency seen in the data
    #[error("No exchange rate from {currency} to {base} in rate table '{version}'")]
    MissingRate {
        currency: String,
        base: String,
        version: String,
    },

    /// A derived column could not be computed
    #[error("Cannot derive '{column}' for row {row_index}: {reason}")]
    Derivation {
        column: String,
        row_index: usize,
        reason: String,
    },

    /// A row marked valid held a value the column type rejects
    #[error("Row {row_index} column '{column}' is not a valid {expected}")]
    UnexpectedValue {
        row_index: usize,
        column: String,
        expected: String,
    },

    /// The header could not be mapped onto the schema
    #[error(transparent)]
    Header(#[from] ValidationError),

    /// Rate table content is unusable
    #[error("Invalid exchange-rate table: {0}")]
    InvalidRates(String),

    /// Rate table file could not be read
    #[error("Failed to read rate table {path}: {message}")]
    RatesIo { path: PathBuf, message: String },
}

/// Result type for normalization operations
pub type NormalizeResult<T> = Result<T, NormalizeError>;
