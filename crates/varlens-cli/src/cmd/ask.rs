//! The orchestration boundary for question answering.
//!
//! Preconditions (a dataset and a credential) are enforced here, before any
//! planner exists: a question that cannot be answered fails as
//! `AgentError::Precondition` without a single network call. Questions run
//! one at a time to completion: this process is synchronous per invocation,
//! so concurrent questions serialize at the shell.

use crate::output::print_json;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;
use varlens_core::{config, ContextStore, Config};
use varlens_agent::{AgentError, AgentOptions, Answer, GeminiClient};

pub fn run(
    config: &Config,
    file: Option<&Path>,
    question: &str,
    context_file: Option<&Path>,
    trace: bool,
    json: bool,
) -> anyhow::Result<()> {
    let dataset = super::load_dataset(config, file).map_err(|e| {
        AgentError::Precondition(format!("cannot answer questions without a dataset: {e}"))
    })?;

    let context = match context_file {
        Some(path) => ContextStore::new(std::fs::read_to_string(path)?),
        None => ContextStore::default(),
    };

    let key = resolve_key(config)?;
    let client = GeminiClient::new(
        key,
        config.model.clone(),
        Duration::from_secs(config.planner_timeout_secs),
    )?;
    let opts = AgentOptions {
        max_steps: config.max_steps,
        table_cap: config.table_cap,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(varlens_agent::answer(
        &dataset,
        context.get(),
        question,
        &client,
        &opts,
    ));

    match result {
        Ok(answer) => {
            render(&answer, trace, json)?;
            Ok(())
        }
        Err(AgentError::StepLimit { limit, partial }) => {
            if let Some(partial) = partial {
                eprintln!("best partial answer: {partial}");
            }
            anyhow::bail!("step limit of {limit} reached without a final answer")
        }
        Err(e) => Err(e.into()),
    }
}

fn render(answer: &Answer, trace: bool, json: bool) -> anyhow::Result<()> {
    if json {
        #[derive(Serialize)]
        struct AskOutput<'a> {
            answer: &'a str,
            steps: u32,
            trace: &'a [varlens_agent::TraceStep],
        }
        return print_json(&AskOutput {
            answer: &answer.text,
            steps: answer.steps,
            trace: &answer.trace,
        });
    }
    println!("{}", answer.text);
    if trace {
        println!("\ntool calls ({} steps):", answer.steps);
        for step in &answer.trace {
            let marker = if step.is_error { "!" } else { " " };
            println!("{} [{}] {}", marker, step.step, step.expression);
            for line in step.observation.lines() {
                println!("      {line}");
            }
        }
    }
    Ok(())
}

/// Credential precedence: environment, config file, then an interactive
/// prompt when attached to a terminal. No key and no terminal is a
/// precondition failure; the agent is never constructed.
fn resolve_key(cfg: &Config) -> Result<String, AgentError> {
    if let Some(resolved) = config::resolve_api_key(cfg) {
        tracing::debug!(source = %resolved.source, "using API key");
        return Ok(resolved.key);
    }
    if std::io::stdin().is_terminal() {
        eprint!("Enter Gemini API key: ");
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_ok() {
            let key = line.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }
    }
    Err(AgentError::Precondition(format!(
        "no API key configured: set {} or add api_key to varlens.yaml",
        config::API_KEY_ENV
    )))
}
