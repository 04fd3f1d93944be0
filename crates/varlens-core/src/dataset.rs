//! In-memory tabular dataset and the delimited-text loader.
//!
//! A [`Dataset`] is loaded once per session and is immutable afterwards: the
//! pivot view and the reasoning agent both borrow it, never own or mutate it.
//! The loader validates just enough to make downstream failures impossible to
//! misread: the stream must parse as a rectangular table and the header must
//! contain the four schema columns. Everything else (duplicate keys, text in
//! a numeric column) is surfaced by the component that trips over it.

use crate::error::{CoreError, Result};
use crate::period::Month;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single cell. Cells that parse as a finite `f64` load as numbers;
/// everything else stays text. `NaN`, infinities, and overflowing exponents
/// are text, so aggregates never see a non-finite operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    fn parse(cell: &str) -> Value {
        let trimmed = cell.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Names of the four required column roles. Defaults match the expected
/// upload format; all four are overridable through configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default = "default_account")]
    pub account: String,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_plan")]
    pub plan: String,
    #[serde(default = "default_actual")]
    pub actual: String,
}

fn default_account() -> String {
    "Account".to_string()
}

fn default_period() -> String {
    "Month".to_string()
}

fn default_plan() -> String {
    "Plan".to_string()
}

fn default_actual() -> String {
    "Actuals".to_string()
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            account: default_account(),
            period: default_period(),
            plan: default_plan(),
            actual: default_actual(),
        }
    }
}

impl Schema {
    fn required(&self) -> [&str; 4] {
        [&self.account, &self.period, &self.plan, &self.actual]
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// The three headline figures shown above the pivot view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub accounts: usize,
    pub periods: usize,
}

impl Dataset {
    /// Parse delimited tabular text from any reader.
    ///
    /// Fails with [`CoreError::Malformed`] if the stream is not a rectangular
    /// table and [`CoreError::MissingColumns`] if the header lacks any of the
    /// four schema columns. Never drops rows.
    pub fn from_reader<R: Read>(reader: R, schema: &Schema) -> Result<Dataset> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(|e| CoreError::Malformed(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if columns.is_empty() {
            return Err(CoreError::Malformed("empty header row".to_string()));
        }

        let missing: Vec<String> = schema
            .required()
            .iter()
            .filter(|name| !columns.iter().any(|c| c == *name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::MissingColumns { missing });
        }

        let mut rows: Vec<Vec<Value>> = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| CoreError::Malformed(e.to_string()))?;
            rows.push(record.iter().map(Value::parse).collect());
        }

        let dataset = Dataset { columns, rows };
        let odd_periods = dataset.non_canonical_periods(schema);
        if !odd_periods.is_empty() {
            tracing::warn!(
                periods = odd_periods.join(", "),
                "period values outside the canonical Jan..Dec set; rows kept, \
                 ordered after the calendar months"
            );
        }
        Ok(dataset)
    }

    pub fn from_path(path: &Path, schema: &Schema) -> Result<Dataset> {
        let file = std::fs::File::open(path)?;
        Dataset::from_reader(file, schema)
    }

    /// Load the explicit source if given, otherwise fall back to the
    /// configured default dataset. Both absent (or the default missing on
    /// disk) is [`CoreError::NoDataAvailable`]; the caller must halt before
    /// offering question answering.
    pub fn load(explicit: Option<&Path>, default: Option<&Path>, schema: &Schema) -> Result<Dataset> {
        if let Some(path) = explicit {
            return Dataset::from_path(path, schema);
        }
        match default {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "using default dataset");
                Dataset::from_path(path, schema)
            }
            _ => Err(CoreError::NoDataAvailable),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Row count, distinct accounts, and distinct canonical periods present.
    pub fn summary(&self, schema: &Schema) -> Summary {
        let accounts = self.distinct(&schema.account);
        let periods = self
            .distinct(&schema.period)
            .into_iter()
            .filter(|p| Month::parse(p).is_some())
            .count();
        Summary {
            rows: self.rows.len(),
            accounts: accounts.len(),
            periods,
        }
    }

    fn distinct(&self, column: &str) -> BTreeSet<String> {
        let Some(idx) = self.column_index(column) else {
            return BTreeSet::new();
        };
        self.rows
            .iter()
            .filter_map(|r| r.get(idx))
            .map(|v| v.to_string())
            .collect()
    }

    fn non_canonical_periods(&self, schema: &Schema) -> Vec<String> {
        self.distinct(&schema.period)
            .into_iter()
            .filter(|p| Month::parse(p).is_none())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
