use std::path::Path;
use varlens_core::context::DEFAULT_NARRATIVE;

pub fn run(context_file: Option<&Path>) -> anyhow::Result<()> {
    match context_file {
        Some(path) => {
            let narrative = std::fs::read_to_string(path)?;
            println!("{narrative}");
        }
        None => println!("{DEFAULT_NARRATIVE}"),
    }
    Ok(())
}
