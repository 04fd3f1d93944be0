//! Bounded tool-use reasoning over a varlens dataset.
//!
//! The agent answers one natural-language question per call by letting a
//! language model plan read-only queries against the dataset and observing
//! their executed results. Unlike a library "dataframe agent" call, the loop
//! here is an explicit state machine with a visible step bound, a narrow
//! tool contract, and error-as-observation handling.
//!
//! # Architecture
//!
//! ```text
//! runner::answer(dataset, context, question, planner, opts)
//!     │
//!     ▼
//! Planner trait  ← GeminiClient (reqwest, one HTTP call per step)
//!     │                │
//!     │ PlannerTurn    │ replayed Transcript
//!     ▼                │
//! QueryTool ──────────▶ observation (result or error, fed back verbatim)
//!     │
//!     ▼
//! Answer { text, trace, steps }
//! ```
//!
//! Provider failures end the question; execution failures end nothing,
//! they are observations the planner corrects itself from. Each question is
//! independent: no transcript survives the call.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use varlens_agent::{answer, AgentOptions, GeminiClient};
//! use std::time::Duration;
//!
//! let client = GeminiClient::new(key, "gemini-2.0-flash", Duration::from_secs(60))?;
//! let answer = answer(&dataset, context, "What was the Jan variance?", &client,
//!                     &AgentOptions::default()).await?;
//! println!("{}", answer.text);
//! ```

pub mod error;
pub mod provider;
pub mod runner;
pub mod tool;
pub mod types;

pub use error::AgentError;
pub use provider::GeminiClient;
pub use runner::{
    answer, AgentOptions, AgentPhase, Answer, Exchange, Planner, PlannerTurn, TraceStep,
    Transcript,
};
pub use tool::{QueryTool, TOOL_NAME};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, AgentError>;
