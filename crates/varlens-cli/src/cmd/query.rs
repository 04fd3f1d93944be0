use crate::output::print_json;
use std::path::Path;
use varlens_core::{query, Config};

/// Run one expression through the same engine the agent's tool uses.
pub fn run(config: &Config, file: Option<&Path>, expression: &str, json: bool) -> anyhow::Result<()> {
    let dataset = super::load_dataset(config, file)?;
    match query::execute_capped(&dataset, expression, config.table_cap) {
        Ok(outcome) => {
            if json {
                print_json(&outcome)?;
            } else {
                println!("{}", outcome.render());
            }
            Ok(())
        }
        // The agent would see this as an observation; here the human is the
        // planner, so show it the same message directly.
        Err(e) => anyhow::bail!("{e}"),
    }
}
