//! Cross-tabulation of the dataset for the report view.
//!
//! Pure reshaping: each cell of the result is the unique value at a
//! (row key, column key) pair. A second source row landing on an occupied
//! cell is an upstream data-integrity problem and fails the whole pivot:
//! nothing is silently overwritten and no partial table is returned.

use crate::dataset::{Dataset, Schema, Value};
use crate::error::{CoreError, Result};
use crate::period;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct PivotTable {
    /// Value column this table was built from (e.g. `Plan`).
    pub value_column: String,
    /// Row labels in first-appearance order.
    pub row_keys: Vec<String>,
    /// Column labels: canonical calendar order restricted to periods present,
    /// then any non-canonical labels in first-appearance order.
    pub col_keys: Vec<String>,
    /// `cells[r][c]` pairs with `row_keys[r]` / `col_keys[c]`. `None` where
    /// the dataset has no row for that pair (absent periods are omitted from
    /// `col_keys`; holes only appear for missing row/column combinations).
    pub cells: Vec<Vec<Option<Value>>>,
}

/// Build one cross-tabulation of `value_col` keyed by (`row_key`, `col_key`).
pub fn pivot(
    dataset: &Dataset,
    value_col: &str,
    row_key: &str,
    col_key: &str,
) -> Result<PivotTable> {
    let value_idx = dataset
        .column_index(value_col)
        .ok_or_else(|| CoreError::ColumnNotFound(value_col.to_string()))?;
    let row_idx = dataset
        .column_index(row_key)
        .ok_or_else(|| CoreError::ColumnNotFound(row_key.to_string()))?;
    let col_idx = dataset
        .column_index(col_key)
        .ok_or_else(|| CoreError::ColumnNotFound(col_key.to_string()))?;

    let mut row_keys: Vec<String> = Vec::new();
    let mut col_keys: Vec<String> = Vec::new();
    let mut filled: HashMap<(String, String), Value> = HashMap::new();

    for row in &dataset.rows {
        let r = row[row_idx].to_string();
        let c = row[col_idx].to_string();
        if !row_keys.contains(&r) {
            row_keys.push(r.clone());
        }
        if !col_keys.contains(&c) {
            col_keys.push(c.clone());
        }
        let key = (r, c);
        if filled.contains_key(&key) {
            return Err(CoreError::DuplicateKey {
                row: key.0,
                col: key.1,
            });
        }
        filled.insert(key, row[value_idx].clone());
    }

    // First-appearance order for columns becomes the tiebreak behind the
    // canonical calendar ordering.
    col_keys.sort_by_key(|label| period::sort_key(label));

    let cells = row_keys
        .iter()
        .map(|r| {
            col_keys
                .iter()
                .map(|c| filled.get(&(r.clone(), c.clone())).cloned())
                .collect()
        })
        .collect();

    Ok(PivotTable {
        value_column: value_col.to_string(),
        row_keys,
        col_keys,
        cells,
    })
}

/// The report view: one pivot for planned values, one for actuals, keyed by
/// account rows and period columns.
pub fn report(dataset: &Dataset, schema: &Schema) -> Result<(PivotTable, PivotTable)> {
    let plan = pivot(dataset, &schema.plan, &schema.account, &schema.period)?;
    let actual = pivot(dataset, &schema.actual, &schema.account, &schema.period)?;
    Ok((plan, actual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn dataset(input: &str) -> Dataset {
        Dataset::from_reader(Cursor::new(input), &Schema::default()).unwrap()
    }

    const SAMPLE: &str = "\
Account,Month,Plan,Actuals
Revenue,Feb,100,95
Revenue,Jan,100,102
COGS,Jan,40,41
";

    #[test]
    fn columns_follow_calendar_order_restricted_to_present() {
        let ds = dataset(SAMPLE);
        let table = pivot(&ds, "Plan", "Account", "Month").unwrap();
        // Feb appears first in the data but Jan sorts first.
        assert_eq!(table.col_keys, vec!["Jan", "Feb"]);
        assert_eq!(table.row_keys, vec!["Revenue", "COGS"]);
    }

    #[test]
    fn absent_pairs_are_holes_not_zeros() {
        let ds = dataset(SAMPLE);
        let table = pivot(&ds, "Actuals", "Account", "Month").unwrap();
        // COGS has no Feb row.
        assert_eq!(table.cells[1][1], None);
        assert_eq!(table.cells[0][0], Some(Value::Number(102.0)));
    }

    #[test]
    fn plan_and_actual_share_key_sets() {
        let ds = dataset(SAMPLE);
        let (plan, actual) = report(&ds, &Schema::default()).unwrap();
        assert_eq!(plan.row_keys, actual.row_keys);
        assert_eq!(plan.col_keys, actual.col_keys);
    }

    #[test]
    fn duplicate_pair_fails_without_partial_table() {
        let ds = dataset(
            "Account,Month,Plan,Actuals\nRevenue,Jan,100,102\nRevenue,Jan,90,91\n",
        );
        let err = pivot(&ds, "Plan", "Account", "Month").unwrap_err();
        match err {
            CoreError::DuplicateKey { row, col } => {
                assert_eq!(row, "Revenue");
                assert_eq!(col, "Jan");
            }
            other => panic!("expected DuplicateKey, got {other}"),
        }
    }

    #[test]
    fn non_canonical_periods_sort_after_months() {
        let ds = dataset(
            "Account,Month,Plan,Actuals\nRevenue,Adj,1,1\nRevenue,Dec,2,2\nRevenue,Jan,3,3\n",
        );
        let table = pivot(&ds, "Plan", "Account", "Month").unwrap();
        assert_eq!(table.col_keys, vec!["Jan", "Dec", "Adj"]);
    }

    #[test]
    fn unknown_value_column_is_column_not_found() {
        let ds = dataset(SAMPLE);
        let err = pivot(&ds, "Budget", "Account", "Month").unwrap_err();
        assert!(matches!(err, CoreError::ColumnNotFound(_)));
    }

    #[test]
    fn pivot_does_not_mutate_the_dataset() {
        let ds = dataset(SAMPLE);
        let before = ds.rows.clone();
        let _ = pivot(&ds, "Plan", "Account", "Month").unwrap();
        assert_eq!(ds.rows, before);
    }
}
