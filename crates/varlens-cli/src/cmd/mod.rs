pub mod ask;
pub mod context;
pub mod query;
pub mod view;

use std::path::Path;
use varlens_core::{Config, Dataset};

/// Load the dataset for a command: explicit `--file`, else the configured
/// default. Load failures are shown to the user directly; they require
/// user action (supply a valid file).
pub fn load_dataset(config: &Config, file: Option<&Path>) -> anyhow::Result<Dataset> {
    Ok(Dataset::load(
        file,
        Some(config.default_dataset.as_path()),
        &config.schema,
    )?)
}
