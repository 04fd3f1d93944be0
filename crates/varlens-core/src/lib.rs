//! Dataset model, pivot view, and the sandboxed query engine for
//! plan-vs-actuals analysis.
//!
//! The dataset is loaded once per session and borrowed by every consumer:
//!
//! ```text
//! Dataset::load ──▶ Dataset (immutable)
//!                      │
//!        ┌─────────────┴──────────────┐
//!        ▼                            ▼
//!  pivot::report               query::execute
//!  (display only)              (the agent's one capability)
//! ```
//!
//! The query engine is the security boundary for planner-generated input:
//! it parses a small pipeline language, resolves every column reference
//! against the dataset before executing, and has no access to anything but
//! the borrowed table.

pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod period;
pub mod pivot;
pub mod query;

pub use config::{resolve_api_key, Config, KeySource, ResolvedKey};
pub use context::ContextStore;
pub use dataset::{Dataset, Schema, Summary, Value};
pub use error::{CoreError, Result};
pub use period::Month;
pub use pivot::{pivot, report, PivotTable};
pub use query::{execute, QueryError, QueryOutcome};
