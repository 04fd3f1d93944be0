//! Typed wire format for the Gemini `generateContent` endpoint.
//!
//! Everything the runner sends or receives is a named struct. The only
//! `serde_json::Value` fields are function-call arguments and responses,
//! which are schema-polymorphic by nature.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversation turn. `role` is `"user"` or `"model"`; the system
/// instruction carries no role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Content {
        Content {
            role: Some("user".to_string()),
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Content {
        Content {
            role: Some("model".to_string()),
            parts,
        }
    }

    pub fn system(text: impl Into<String>) -> Content {
        Content {
            role: None,
            parts: vec![Part::Text { text: text.into() }],
        }
    }
}

/// A single part of a turn. Untagged: the wire shape is an object with
/// exactly one of `text`, `functionCall`, or `functionResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Tool arguments are schema-polymorphic, so Value is correct here.
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

/// The subset of OpenAPI schema the declaration needs.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

impl GenerateContentResponse {
    /// Parts of the first candidate, or empty if the response had none.
    pub fn parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_text_response() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "The Jan variance was favorable by 2."}]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 14, "totalTokenCount": 134}
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        let [Part::Text { text }] = resp.parts() else {
            panic!("expected one text part");
        };
        assert_eq!(text, "The Jan variance was favorable by 2.");
        assert_eq!(resp.usage_metadata.unwrap().total_token_count, 134);
    }

    #[test]
    fn parse_function_call_response() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Let me check the data."},
                        {"functionCall": {"name": "run_query", "args": {"expression": "count()"}}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.parts().len(), 2);
        let Part::FunctionCall { function_call } = &resp.parts()[1] else {
            panic!("expected a function call part");
        };
        assert_eq!(function_call.name, "run_query");
        assert_eq!(function_call.args["expression"], "count()");
    }

    #[test]
    fn parse_empty_candidates() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.parts().is_empty());
    }

    #[test]
    fn request_serializes_camel_case_and_skips_empty() {
        let req = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::Text {
                text: "hello".to_string(),
            }])],
            system_instruction: Some(Content::system("be terse")),
            tools: vec![],
            generation_config: Some(GenerationConfig { temperature: 0.0 }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("systemInstruction").is_some());
        assert!(json.get("generationConfig").is_some());
        assert!(json.get("tools").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn function_response_part_round_trips() {
        let part = Part::FunctionResponse {
            function_response: FunctionResponse {
                name: "run_query".to_string(),
                response: serde_json::json!({"kind": "scalar", "value": 2.0}),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["functionResponse"]["name"], "run_query");
        let back: Part = serde_json::from_value(json).unwrap();
        assert!(matches!(back, Part::FunctionResponse { .. }));
    }
}
