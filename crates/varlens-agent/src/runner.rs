//! The bounded plan-act-observe loop.
//!
//! The planner (a language model behind [`Planner`]) decides the next move;
//! the query tool is ground truth. The loop is an explicit state machine:
//!
//! ```text
//! Idle → Planning → (Executing ⇄ Planning)* → Answered | Failed
//! ```
//!
//! `Executing` never transitions directly to `Answered`: every execution
//! result passes back through `Planning` so the model decides whether to
//! continue or conclude. The step bound caps cost for any planner behavior;
//! execution errors are observations, provider errors are terminal for the
//! one question.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AgentError, Result};
use crate::tool::{self, QueryTool};
use varlens_core::Dataset;

// ---------------------------------------------------------------------------
// Planner seam
// ---------------------------------------------------------------------------

/// One decision from the planner: propose a tool call, or conclude.
#[derive(Debug, Clone)]
pub enum PlannerTurn {
    /// A proposed tool call. `commentary` is any text the model emitted
    /// alongside the call; it is kept as the best partial answer in case the
    /// step bound is reached.
    Call {
        name: String,
        args: serde_json::Value,
        commentary: Option<String>,
    },
    /// The final natural-language answer.
    Final { text: String },
}

/// One completed exchange: a proposed call and the observation it produced.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub name: String,
    pub args: serde_json::Value,
    pub commentary: Option<String>,
    /// Wire payload of the observation (tagged outcome or error).
    pub response: serde_json::Value,
}

/// The full conversation state for one question. Built once per question and
/// discarded with the answer; there is no cross-question memory.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub system: String,
    pub instruction: String,
    /// Functions the planner may call (always just `run_query`, declared
    /// against this dataset's columns).
    pub tools: Vec<crate::types::FunctionDeclaration>,
    pub exchanges: Vec<Exchange>,
}

/// The component that decides the next query or final answer.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, transcript: &Transcript) -> Result<PlannerTurn>;
}

// ---------------------------------------------------------------------------
// Options / result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Maximum plan-act-observe iterations per question.
    pub max_steps: u32,
    /// Cap on rows in a table observation.
    pub table_cap: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_steps: 10,
            table_cap: varlens_core::query::DEFAULT_TABLE_CAP,
        }
    }
}

/// Loop phases. `Executing` exists only between a proposed call and its
/// observation; both terminal phases carry their payload in the return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    Planning,
    Executing,
    Answered,
    Failed,
}

/// One audited step of the tool-call trail.
#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub step: u32,
    pub expression: String,
    pub observation: String,
    pub is_error: bool,
    pub at: DateTime<Utc>,
}

/// Final answer plus the execution trail that grounds it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub trace: Vec<TraceStep>,
    /// Planner calls consumed, including the concluding one.
    pub steps: u32,
}

// ---------------------------------------------------------------------------
// The loop
// ---------------------------------------------------------------------------

/// Compose the single instruction string: context narrative verbatim, then
/// the literal question, then the grounding directive.
pub fn compose_instruction(context: &str, question: &str) -> String {
    format!(
        "Context provided by user: {context}\n\n\
         Question: {question}\n\n\
         Answer clearly and concisely, using only the data and the context \
         provided."
    )
}

/// Drive one question to completion against the dataset.
///
/// The dataset and context are borrowed immutably for the whole call; the
/// loop writes nothing anywhere except its own transcript and trace.
pub async fn answer(
    dataset: &Dataset,
    context: &str,
    question: &str,
    planner: &dyn Planner,
    opts: &AgentOptions,
) -> Result<Answer> {
    let tool = QueryTool::new(dataset, opts.table_cap);
    let mut transcript = Transcript {
        system: tool::system_instruction(dataset),
        instruction: compose_instruction(context, question),
        tools: vec![tool::declaration(dataset)],
        exchanges: Vec::new(),
    };
    let mut trace: Vec<TraceStep> = Vec::new();
    let mut partial: Option<String> = None;
    let mut phase = AgentPhase::Idle;
    tracing::trace!(?phase, question, "question accepted");

    for step in 1..=opts.max_steps {
        phase = AgentPhase::Planning;
        tracing::debug!(step, ?phase, "asking planner");
        let turn = match planner.plan(&transcript).await {
            Ok(turn) => turn,
            Err(e) => {
                phase = AgentPhase::Failed;
                tracing::warn!(step, ?phase, error = %e, "planner failed");
                return Err(e);
            }
        };

        match turn {
            PlannerTurn::Final { text } => {
                phase = AgentPhase::Answered;
                tracing::debug!(step, ?phase, "planner concluded");
                return Ok(Answer { text, trace, steps: step });
            }
            PlannerTurn::Call {
                name,
                args,
                commentary,
            } => {
                if let Some(c) = &commentary {
                    if !c.trim().is_empty() {
                        partial = Some(c.clone());
                    }
                }
                phase = AgentPhase::Executing;
                let obs = tool.execute(&name, &args);
                tracing::debug!(
                    step,
                    ?phase,
                    expression = %obs.expression,
                    is_error = obs.is_error,
                    "executed query"
                );
                trace.push(TraceStep {
                    step,
                    expression: obs.expression.clone(),
                    observation: obs.rendered.clone(),
                    is_error: obs.is_error,
                    at: Utc::now(),
                });
                transcript.exchanges.push(Exchange {
                    name,
                    args,
                    commentary,
                    response: obs.payload,
                });
                // Back through Planning: the model decides what the
                // observation means.
            }
        }
    }

    Err(AgentError::StepLimit {
        limit: opts.max_steps,
        partial,
    })
}

// ---------------------------------------------------------------------------
// Tests: scripted planner, no network
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;
    use varlens_core::Schema;

    /// Planner that plays back a fixed script and counts its calls.
    struct Scripted {
        turns: Mutex<Vec<Result<PlannerTurn>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(turns: Vec<Result<PlannerTurn>>) -> Self {
            let mut turns = turns;
            turns.reverse();
            Self {
                turns: Mutex::new(turns),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Planner for Scripted {
        async fn plan(&self, _transcript: &Transcript) -> Result<PlannerTurn> {
            *self.calls.lock().unwrap() += 1;
            self.turns
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(PlannerTurn::Call {
                    name: tool::TOOL_NAME.to_string(),
                    args: serde_json::json!({"expression": "count()"}),
                    commentary: None,
                }))
        }
    }

    fn call(expression: &str) -> Result<PlannerTurn> {
        Ok(PlannerTurn::Call {
            name: tool::TOOL_NAME.to_string(),
            args: serde_json::json!({ "expression": expression }),
            commentary: None,
        })
    }

    fn done(text: &str) -> Result<PlannerTurn> {
        Ok(PlannerTurn::Final {
            text: text.to_string(),
        })
    }

    fn dataset(input: &str) -> Dataset {
        Dataset::from_reader(Cursor::new(input), &Schema::default()).unwrap()
    }

    fn variance_dataset() -> Dataset {
        dataset(
            "Account,Month,Plan,Actuals\nRevenue,Jan,100,102\nRevenue,Feb,100,95\n",
        )
    }

    const CONTEXT: &str = "Jan favorable from an unexpected contract renewal.";

    #[test]
    fn instruction_embeds_context_verbatim_then_question() {
        let s = compose_instruction(CONTEXT, "What was the Jan variance?");
        let ctx_pos = s.find(CONTEXT).unwrap();
        let q_pos = s.find("What was the Jan variance?").unwrap();
        assert!(ctx_pos < q_pos);
        assert!(s.contains("only the data and the context"));
    }

    #[tokio::test]
    async fn variance_question_is_answered_from_an_executed_query() {
        let ds = variance_dataset();
        let planner = Scripted::new(vec![
            call(r#"filter Account == "Revenue" | filter Month == Jan | sum(Actuals) - sum(Plan)"#),
            done("The Jan variance for Revenue was favorable by 2."),
        ]);
        let a = answer(&ds, CONTEXT, "What was the Jan variance for Revenue?", &planner, &AgentOptions::default())
            .await
            .unwrap();
        assert_eq!(a.text, "The Jan variance for Revenue was favorable by 2.");
        assert_eq!(a.steps, 2);
        assert_eq!(a.trace.len(), 1);
        assert_eq!(a.trace[0].observation, "2");
        assert!(!a.trace[0].is_error);
    }

    #[tokio::test]
    async fn empty_dataset_row_count_comes_from_the_query_not_a_shortcut() {
        let ds = dataset("Account,Month,Plan,Actuals\n");
        let planner = Scripted::new(vec![call("count()"), done("There are 0 rows.")]);
        let a = answer(&ds, "", "How many rows are there?", &planner, &AgentOptions::default())
            .await
            .unwrap();
        assert_eq!(a.text, "There are 0 rows.");
        assert_eq!(a.trace[0].observation, "0");
    }

    #[tokio::test]
    async fn execution_error_becomes_an_observation_and_the_call_recovers() {
        let ds = variance_dataset();
        let planner = Scripted::new(vec![
            call("sum(Budget)"),
            call("sum(Plan)"),
            done("Total plan is 200."),
        ]);
        let a = answer(&ds, "", "What is the total plan?", &planner, &AgentOptions::default())
            .await
            .unwrap();
        assert_eq!(a.trace.len(), 2);
        assert!(a.trace[0].is_error);
        assert!(a.trace[0].observation.contains("unknown column 'Budget'"));
        assert!(!a.trace[1].is_error);
        assert_eq!(a.trace[1].observation, "200");
        assert_eq!(a.text, "Total plan is 200.");
    }

    #[tokio::test]
    async fn always_querying_planner_stops_at_the_step_bound() {
        let ds = variance_dataset();
        let planner = Scripted::new(vec![]); // script exhausted: queries forever
        let opts = AgentOptions {
            max_steps: 4,
            ..AgentOptions::default()
        };
        let err = answer(&ds, "", "loop forever", &planner, &opts).await.unwrap_err();
        match err {
            AgentError::StepLimit { limit, partial } => {
                assert_eq!(limit, 4);
                assert!(partial.is_none());
            }
            other => panic!("expected StepLimit, got {other}"),
        }
        assert_eq!(planner.calls(), 4);
    }

    #[tokio::test]
    async fn step_limit_carries_the_best_partial_commentary() {
        let ds = variance_dataset();
        let planner = Scripted::new(vec![Ok(PlannerTurn::Call {
            name: tool::TOOL_NAME.to_string(),
            args: serde_json::json!({"expression": "count()"}),
            commentary: Some("Looks favorable so far.".to_string()),
        })]);
        let opts = AgentOptions {
            max_steps: 2,
            ..AgentOptions::default()
        };
        let err = answer(&ds, "", "q", &planner, &opts).await.unwrap_err();
        let AgentError::StepLimit { partial, .. } = err else {
            panic!("expected StepLimit");
        };
        assert_eq!(partial.as_deref(), Some("Looks favorable so far."));
    }

    #[tokio::test]
    async fn provider_error_is_terminal_and_not_retried() {
        let ds = variance_dataset();
        let planner = Scripted::new(vec![Err(AgentError::Provider(
            "503 from upstream".to_string(),
        ))]);
        let err = answer(&ds, "", "q", &planner, &AgentOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(planner.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_call_is_observed_not_fatal() {
        let ds = variance_dataset();
        let planner = Scripted::new(vec![
            Ok(PlannerTurn::Call {
                name: "drop_table".to_string(),
                args: serde_json::json!({}),
                commentary: None,
            }),
            done("done"),
        ]);
        let a = answer(&ds, "", "q", &planner, &AgentOptions::default())
            .await
            .unwrap();
        assert!(a.trace[0].is_error);
        assert!(a.trace[0].observation.contains("only run_query"));
    }

    #[tokio::test]
    async fn transcript_accumulates_observations_for_the_planner() {
        // The planner sees each observation on the following turn.
        struct Inspecting;
        #[async_trait]
        impl Planner for Inspecting {
            async fn plan(&self, t: &Transcript) -> Result<PlannerTurn> {
                if t.exchanges.is_empty() {
                    Ok(PlannerTurn::Call {
                        name: tool::TOOL_NAME.to_string(),
                        args: serde_json::json!({"expression": "count()"}),
                        commentary: None,
                    })
                } else {
                    assert_eq!(t.exchanges[0].response["result"]["kind"], "scalar");
                    Ok(PlannerTurn::Final {
                        text: "counted".to_string(),
                    })
                }
            }
        }
        let ds = variance_dataset();
        let a = answer(&ds, "", "q", &Inspecting, &AgentOptions::default())
            .await
            .unwrap();
        assert_eq!(a.text, "counted");
    }
}
