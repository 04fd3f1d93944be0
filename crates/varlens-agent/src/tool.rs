//! The one capability the planner gets: `run_query`.
//!
//! This is the attack surface, so the contract is narrow and everything the
//! planner sends through it is validated here or in the query engine. The
//! engine evaluates over the borrowed dataset only; no filesystem, network,
//! or process access exists on the other side of this boundary. Execution
//! failures are folded into the observation stream, never surfaced as call
//! failures, so the planner can correct itself on the next step.

use crate::types::{FunctionDeclaration, ParameterSchema, PropertySchema};
use std::collections::BTreeMap;
use varlens_core::{query, Dataset};

pub const TOOL_NAME: &str = "run_query";

const QUERY_LANGUAGE_HELP: &str = "\
Queries are pipelines of stages joined by '|':
  filter <Column> <op> <value>   op: == != > >= < <=
  select <Column>[, <Column>...]
  head <N>
ending in an optional aggregate expression (must be last):
  sum(<Column>), avg(<Column>), min(<Column>), max(<Column>), count(),
  combined with + - * / and parentheses
or a grouped aggregate:
  group <Column> : <aggregate expression>
Examples:
  filter Account == \"Revenue\" | filter Month == Jan | sum(Actuals) - sum(Plan)
  group Month : sum(Actuals)
  count()";

/// Function declaration sent to the planner, including the dataset's actual
/// column names so proposed queries resolve on the first try.
pub fn declaration(dataset: &Dataset) -> FunctionDeclaration {
    let mut properties = BTreeMap::new();
    properties.insert(
        "expression".to_string(),
        PropertySchema {
            kind: "string".to_string(),
            description: format!(
                "A query over the table. Columns: {}.\n{}",
                dataset.columns.join(", "),
                QUERY_LANGUAGE_HELP
            ),
        },
    );
    FunctionDeclaration {
        name: TOOL_NAME.to_string(),
        description: "Execute a read-only query against the loaded dataset and \
                      return a scalar, series, or small table."
            .to_string(),
        parameters: ParameterSchema {
            kind: "object".to_string(),
            properties,
            required: vec!["expression".to_string()],
        },
    }
}

/// System instruction describing the planner's role and its single tool.
pub fn system_instruction(dataset: &Dataset) -> String {
    format!(
        "You are a financial analyst answering questions about a \
         plan-vs-actuals table with {} rows and columns: {}.\n\
         Use the run_query tool to compute anything you need from the table; \
         never estimate numbers you could query. When you have enough \
         observations, reply with the final answer as plain text.",
        dataset.len(),
        dataset.columns.join(", ")
    )
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// The literal result fed back to the planner after one tool execution.
#[derive(Debug, Clone)]
pub struct Observation {
    /// The query expression as received (empty if the call was malformed).
    pub expression: String,
    /// Rendered text for the trace and for human inspection.
    pub rendered: String,
    /// Payload for the wire: the tagged outcome, or `{kind: "error", message}`.
    pub payload: serde_json::Value,
    pub is_error: bool,
}

impl Observation {
    fn error(expression: String, message: String) -> Observation {
        Observation {
            expression,
            payload: serde_json::json!({"kind": "error", "message": message}),
            rendered: message,
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryTool<'a> {
    dataset: &'a Dataset,
    table_cap: usize,
}

impl<'a> QueryTool<'a> {
    pub fn new(dataset: &'a Dataset, table_cap: usize) -> Self {
        Self { dataset, table_cap }
    }

    /// Validate and execute one proposed tool call. Infallible by design:
    /// every failure becomes an error observation.
    pub fn execute(&self, name: &str, args: &serde_json::Value) -> Observation {
        if name != TOOL_NAME {
            return Observation::error(
                String::new(),
                format!("unknown tool '{name}': only {TOOL_NAME} is available"),
            );
        }
        let Some(expression) = args.get("expression").and_then(|v| v.as_str()) else {
            return Observation::error(
                String::new(),
                "missing string argument 'expression'".to_string(),
            );
        };
        match query::execute_capped(self.dataset, expression, self.table_cap) {
            Ok(outcome) => Observation {
                expression: expression.to_string(),
                rendered: outcome.render(),
                payload: serde_json::json!({"result": outcome}),
                is_error: false,
            },
            Err(e) => Observation::error(expression.to_string(), e.to_string()),
        }
    }
}
