use crate::output::{print_json, print_table};
use serde::Serialize;
use std::path::Path;
use varlens_core::{pivot, Config, Dataset, PivotTable};

pub fn run(config: &Config, file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let dataset = super::load_dataset(config, file)?;
    let summary = dataset.summary(&config.schema);

    match pivot::report(&dataset, &config.schema) {
        Ok((plan, actual)) => {
            if json {
                #[derive(Serialize)]
                struct View<'a> {
                    summary: &'a varlens_core::Summary,
                    plan: &'a PivotTable,
                    actual: &'a PivotTable,
                }
                return print_json(&View {
                    summary: &summary,
                    plan: &plan,
                    actual: &actual,
                });
            }
            println!("Plan");
            print_pivot(&config.schema.account, &plan);
            println!("\nActual");
            print_pivot(&config.schema.account, &actual);
            println!(
                "\n{} rows  {} accounts  {} months",
                summary.rows, summary.accounts, summary.periods
            );
            Ok(())
        }
        // A broken pivot is a data-integrity signal, not a dead end: show
        // the error, fall back to a raw preview, and leave asking available.
        Err(e) => {
            eprintln!("could not build pivot view: {e}");
            println!("Raw data preview (first 20 rows):");
            print_preview(&dataset, 20);
            Ok(())
        }
    }
}

fn print_pivot(row_label: &str, table: &PivotTable) {
    let mut headers: Vec<&str> = vec![row_label];
    headers.extend(table.col_keys.iter().map(String::as_str));
    let rows = table
        .row_keys
        .iter()
        .zip(&table.cells)
        .map(|(key, cells)| {
            let mut row = vec![key.clone()];
            row.extend(
                cells
                    .iter()
                    .map(|c| c.as_ref().map(|v| v.to_string()).unwrap_or_default()),
            );
            row
        })
        .collect();
    print_table(&headers, rows);
}

fn print_preview(dataset: &Dataset, limit: usize) {
    let headers: Vec<&str> = dataset.columns.iter().map(String::as_str).collect();
    let rows = dataset
        .rows
        .iter()
        .take(limit)
        .map(|r| r.iter().map(|v| v.to_string()).collect())
        .collect();
    print_table(&headers, rows);
}
