use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The planner was still proposing queries when the step bound ran out.
    /// `partial` carries the model's best interim commentary, if any.
    #[error("step limit of {limit} reached without a final answer")]
    StepLimit {
        limit: u32,
        partial: Option<String>,
    },

    /// The external planning service failed. Never retried automatically.
    #[error("provider error: {0}")]
    Provider(String),

    /// The question never reached the agent: dataset or credential missing
    /// at the orchestration boundary.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AgentError::Provider(format!("planner call timed out: {e}"))
        } else {
            AgentError::Provider(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
