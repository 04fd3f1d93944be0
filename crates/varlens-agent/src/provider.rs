//! Gemini-backed [`Planner`] implementation.
//!
//! One HTTP call per planning step: the whole transcript (system
//! instruction, user instruction, and every call/observation exchange) is
//! replayed into a `generateContent` request, and the first candidate's
//! parts become the next [`PlannerTurn`]. The client carries a per-call
//! timeout; a timeout or any transport/service failure is a
//! [`AgentError::Provider`] and is never retried here.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::runner::{Planner, PlannerTurn, Transcript};
use crate::types::{
    Content, FunctionCall, FunctionResponse, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, Tool,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentError::from)?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Point the client at a different endpoint (tests use a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, transcript: &Transcript) -> GenerateContentRequest {
        let mut contents = Vec::with_capacity(1 + transcript.exchanges.len() * 2);
        contents.push(Content::user(vec![Part::Text {
            text: transcript.instruction.clone(),
        }]));
        for exchange in &transcript.exchanges {
            let mut model_parts = Vec::with_capacity(2);
            if let Some(commentary) = &exchange.commentary {
                model_parts.push(Part::Text {
                    text: commentary.clone(),
                });
            }
            model_parts.push(Part::FunctionCall {
                function_call: FunctionCall {
                    name: exchange.name.clone(),
                    args: exchange.args.clone(),
                },
            });
            contents.push(Content::model(model_parts));
            contents.push(Content::user(vec![Part::FunctionResponse {
                function_response: FunctionResponse {
                    name: exchange.name.clone(),
                    response: exchange.response.clone(),
                },
            }]));
        }
        GenerateContentRequest {
            contents,
            system_instruction: Some(Content::system(transcript.system.clone())),
            tools: vec![Tool {
                function_declarations: transcript.tools.clone(),
            }],
            // Deterministic planning: the executor is ground truth, the
            // planner should not be creative about numbers.
            generation_config: Some(GenerationConfig { temperature: 0.0 }),
        }
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(AgentError::Provider(format!(
                "planner service returned {status}: {snippet}"
            )));
        }
        Ok(response.json().await?)
    }
}

/// Interpret one model turn. Text before a function call is commentary; a
/// turn with neither a call nor text is a provider fault.
fn turn_from_parts(parts: &[Part]) -> Result<PlannerTurn> {
    let mut commentary = String::new();
    for part in parts {
        match part {
            Part::Text { text } => {
                if !commentary.is_empty() {
                    commentary.push('\n');
                }
                commentary.push_str(text);
            }
            Part::FunctionCall { function_call } => {
                return Ok(PlannerTurn::Call {
                    name: function_call.name.clone(),
                    args: function_call.args.clone(),
                    commentary: if commentary.trim().is_empty() {
                        None
                    } else {
                        Some(commentary)
                    },
                });
            }
            Part::FunctionResponse { .. } => {
                // Model turns never contain function responses; skip.
            }
        }
    }
    if commentary.trim().is_empty() {
        Err(AgentError::Provider(
            "planner returned neither a query nor an answer".to_string(),
        ))
    } else {
        Ok(PlannerTurn::Final { text: commentary })
    }
}

#[async_trait]
impl Planner for GeminiClient {
    async fn plan(&self, transcript: &Transcript) -> Result<PlannerTurn> {
        let request = self.build_request(transcript);
        tracing::debug!(
            model = %self.model,
            contents = request.contents.len(),
            "planner request"
        );
        let response = self.generate(&request).await?;
        if let Some(usage) = &response.usage_metadata {
            tracing::debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "planner usage"
            );
        }
        turn_from_parts(response.parts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Exchange;
    use mockito::Matcher;

    fn client(base_url: &str) -> GeminiClient {
        GeminiClient::new("test-key", "gemini-2.0-flash", Duration::from_secs(5))
            .unwrap()
            .with_base_url(base_url)
    }

    fn transcript() -> Transcript {
        Transcript {
            system: "You are a financial analyst.".to_string(),
            instruction: "Context: none\n\nQuestion: how many rows?".to_string(),
            tools: vec![],
            exchanges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn plan_parses_a_function_call_turn() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "systemInstruction": {"parts": [{"text": "You are a financial analyst."}]},
                "generationConfig": {"temperature": 0.0}
            })))
            .with_status(200)
            .with_body(
                r#"{"candidates": [{"content": {"role": "model", "parts": [
                    {"text": "Checking."},
                    {"functionCall": {"name": "run_query", "args": {"expression": "count()"}}}
                ]}}]}"#,
            )
            .create_async()
            .await;

        let turn = client(&server.url()).plan(&transcript()).await.unwrap();
        mock.assert_async().await;
        let PlannerTurn::Call {
            name,
            args,
            commentary,
        } = turn
        else {
            panic!("expected a call turn");
        };
        assert_eq!(name, "run_query");
        assert_eq!(args["expression"], "count()");
        assert_eq!(commentary.as_deref(), Some("Checking."));
    }

    #[tokio::test]
    async fn plan_parses_a_final_text_turn() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_body(
                r#"{"candidates": [{"content": {"role": "model", "parts": [
                    {"text": "There are 2 rows."}
                ]}}]}"#,
            )
            .create_async()
            .await;

        let turn = client(&server.url()).plan(&transcript()).await.unwrap();
        let PlannerTurn::Final { text } = turn else {
            panic!("expected a final turn");
        };
        assert_eq!(text, "There are 2 rows.");
    }

    #[tokio::test]
    async fn exchanges_are_replayed_as_function_responses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_body(Matcher::Regex("functionResponse".to_string()))
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "Done."}]}}]}"#)
            .create_async()
            .await;

        let mut t = transcript();
        t.exchanges.push(Exchange {
            name: "run_query".to_string(),
            args: serde_json::json!({"expression": "count()"}),
            commentary: None,
            response: serde_json::json!({"result": {"kind": "scalar", "value": 2.0}}),
        });
        let turn = client(&server.url()).plan(&t).await.unwrap();
        mock.assert_async().await;
        assert!(matches!(turn, PlannerTurn::Final { .. }));
    }

    #[tokio::test]
    async fn service_failure_is_a_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(503)
            .with_body(r#"{"error": {"message": "overloaded"}}"#)
            .create_async()
            .await;

        let err = client(&server.url()).plan(&transcript()).await.unwrap_err();
        let AgentError::Provider(msg) = err else {
            panic!("expected Provider");
        };
        assert!(msg.contains("503"));
        assert!(msg.contains("overloaded"));
    }

    #[tokio::test]
    async fn empty_candidate_is_a_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let err = client(&server.url()).plan(&transcript()).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}
