//! Pinned, versioned exchange-rate table
//!
//! Rates are loaded once at startup and never refreshed while a table is
//! being normalized, so a job's output only depends on the table version.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{NormalizeError, NormalizeResult};

/// Conversion rates into a single base currency
///
/// ```toml
/// version = "2024-06"
/// base = "INR"
///
/// [rates]
/// USD = 83.2
/// EUR = 89.9
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateTable {
    pub version: String,
    /// ISO 4217 code every rate converts into
    pub base: String,
    /// Units of `base` for one unit of each currency
    #[serde(default)]
    pub rates: BTreeMap<String, f64>,
}

impl ExchangeRateTable {
    pub fn new(version: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            base: base.into().to_uppercase(),
            rates: BTreeMap::new(),
        }
    }

    /// A table that only knows its own base currency
    pub fn identity(base: impl Into<String>) -> Self {
        Self::new("identity", base)
    }

    pub fn with_rate(mut self, currency: impl Into<String>, rate: f64) -> Self {
        self.rates.insert(currency.into().to_uppercase(), rate);
        self
    }

    pub fn from_json_str(content: &str) -> NormalizeResult<Self> {
        let table: Self = serde_json::from_str(content)
            .map_err(|e| NormalizeError::InvalidRates(e.to_string()))?;
        table.checked()
    }

    pub fn from_toml_str(content: &str) -> NormalizeResult<Self> {
        let table: Self =
            toml::from_str(content).map_err(|e| NormalizeError::InvalidRates(e.to_string()))?;
        table.checked()
    }

    /// Load from a `.json` or `.toml` file
    pub fn load(path: impl AsRef<Path>) -> NormalizeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| NormalizeError::RatesIo {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(NormalizeError::InvalidRates(format!(
                "unsupported rate table format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    /// Upper-case every code and reject non-positive rates
    fn checked(mut self) -> NormalizeResult<Self> {
        if self.version.trim().is_empty() {
            return Err(NormalizeError::InvalidRates("version must not be empty".to_string()));
        }
        self.base = self.base.trim().to_uppercase();
        let mut rates = BTreeMap::new();
        for (code, rate) in std::mem::take(&mut self.rates) {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(NormalizeError::InvalidRates(format!(
                    "rate for {code} must be a positive number, got {rate}"
                )));
            }
            rates.insert(code.trim().to_uppercase(), rate);
        }
        self.rates = rates;
        Ok(self)
    }

    /// Units of `base` for one unit of `currency`
    pub fn rate(&self, currency: &str) -> Option<f64> {
        let code = currency.to_uppercase();
        if code == self.base {
            Some(1.0)
        } else {
            self.rates.get(&code).copied()
        }
    }

    /// Convert `amount` from one currency to another through the base
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> NormalizeResult<f64> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }
        let missing = |currency: &str| NormalizeError::MissingRate {
            currency: currency.to_uppercase(),
            base: to.to_uppercase(),
            version: self.version.clone(),
        };
        let from_rate = self.rate(from).ok_or_else(|| missing(from))?;
        let to_rate = self.rate(to).ok_or_else(|| missing(to))?;
        Ok(amount * from_rate / to_rate)
    }
}
