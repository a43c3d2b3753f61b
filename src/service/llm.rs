//! Text-generation collaborator
//!
//! Stages talk to the model through the [`TextGenerator`] trait. The production
//! implementation is [`LlmClient`], which speaks the OpenAI-compatible
//! `/chat/completions` protocol shared by OpenAI and OpenRouter.
//!
//! The wire types below exist because the pipeline needs raw completion text
//! together with token usage. A rig-core release whose completion response
//! carries provider usage could replace them behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{ProviderConfig, TokenUsage};

/// Shared handle to the text-generation collaborator
pub type SharedGenerator = Arc<dyn TextGenerator>;

/// Errors from a single collaborator call
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode completion: {0}")]
    Decode(String),

    #[error("Completion contained no content")]
    EmptyResponse,
}

/// Requested shape of the completion content
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    Json,
    JsonSchema(ResponseSchema),
}

impl ResponseFormat {
    /// Schema-constrained JSON derived from `T`
    pub fn schema_for<T: JsonSchema>(name: &str) -> Self {
        ResponseFormat::JsonSchema(ResponseSchema {
            name: name.to_string(),
            schema: schemars::schema_for!(T).to_value(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// One collaborator call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub instruction: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub response_format: ResponseFormat,
}

impl GenerationRequest {
    /// Deterministic JSON-mode request
    pub fn json(instruction: &str, prompt: String) -> Self {
        Self {
            instruction: instruction.to_string(),
            prompt,
            temperature: 0.0,
            max_tokens: None,
            response_format: ResponseFormat::Json,
        }
    }

    pub fn with_schema<T: JsonSchema>(mut self, name: &str) -> Self {
        self.response_format = ResponseFormat::schema_for::<T>(name);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }
}

/// Raw completion content plus token accounting
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Display name of the provider
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;

    /// Price of `usage` in USD
    fn calculate_cost(&self, usage: &TokenUsage) -> f64;

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, LlmError>;
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    provider: ProviderConfig,
    api_key: String,
    structured_outputs: bool,
}

impl LlmClient {
    /// Create a client for `provider`
    ///
    /// Without `structured_outputs` schema-constrained requests are downgraded
    /// to plain JSON mode, which every supported provider accepts.
    pub fn new(provider: ProviderConfig, api_key: String, structured_outputs: bool) -> Self {
        tracing::info!(
            provider = %provider.name,
            model = %provider.model,
            base_url = %provider.base_url,
            structured_outputs,
            "Text generation client initialized"
        );
        Self {
            client: Client::new(),
            provider,
            api_key,
            structured_outputs,
        }
    }

    fn response_format(&self, format: &ResponseFormat) -> Option<serde_json::Value> {
        match format {
            ResponseFormat::Text => None,
            ResponseFormat::Json => Some(serde_json::json!({"type": "json_object"})),
            ResponseFormat::JsonSchema(schema) if self.structured_outputs => {
                let (strict, schema_value) = match strict_schema(&schema.schema) {
                    Some(strict) => (true, strict),
                    None => {
                        tracing::debug!(
                            schema = %schema.name,
                            "Schema has open-ended maps, sending it without strict mode"
                        );
                        (false, schema.schema.clone())
                    }
                };
                Some(serde_json::json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "strict": strict,
                        "schema": schema_value,
                    }
                }))
            }
            ResponseFormat::JsonSchema(_) => Some(serde_json::json!({"type": "json_object"})),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<ChatUsage> for TokenUsage {
    fn from(usage: ChatUsage) -> Self {
        // some providers omit the total
        let total_tokens = match usage.total_tokens {
            0 => usage.prompt_tokens + usage.completion_tokens,
            total => total,
        };
        TokenUsage {
            total_tokens,
            ..TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    fn provider_name(&self) -> &str {
        &self.provider.name
    }

    fn model(&self) -> &str {
        &self.provider.model
    }

    fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        self.provider
            .calculate_cost(usage.input_tokens, usage.output_tokens)
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, LlmError> {
        let url = format!("{}/chat/completions", self.provider.base_url);
        let body = ChatRequest {
            model: &self.provider.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: self.response_format(&request.response_format),
        };

        let mut builder = self.client.post(&url).bearer_auth(&self.api_key);
        for (name, value) in &self.provider.extra_headers {
            builder = builder.header(*name, *value);
        }

        let response = builder.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let usage = completion.usage.map(TokenUsage::from).unwrap_or_default();
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        Ok(Generation { content, usage })
    }
}

/// Keywords strict structured outputs reject
const UNSUPPORTED_KEYWORDS: &[&str] = &["$schema", "default", "format", "minimum", "maximum"];

/// Rewrite a derived schema for strict structured outputs
///
/// Every object property becomes required and extra properties are closed off.
/// Returns `None` when some object is a free-form map (`additionalProperties`
/// set to a schema), which strict mode cannot express.
fn strict_schema(schema: &serde_json::Value) -> Option<serde_json::Value> {
    let mut strict = schema.clone();
    make_strict(&mut strict).then_some(strict)
}

fn make_strict(schema: &mut serde_json::Value) -> bool {
    use serde_json::Value;

    match schema {
        Value::Array(items) => items.iter_mut().all(make_strict),
        Value::Object(map) => {
            for keyword in UNSUPPORTED_KEYWORDS {
                map.remove(*keyword);
            }
            if map
                .get("additionalProperties")
                .is_some_and(|extra| extra != &Value::Bool(false))
            {
                return false;
            }

            let mut compatible = true;
            let mut required = None;
            for (key, value) in map.iter_mut() {
                match key.as_str() {
                    // name -> schema maps
                    "properties" | "$defs" | "definitions" => {
                        if let Value::Object(children) = value {
                            if key == "properties" {
                                required = Some(
                                    children.keys().cloned().map(Value::String).collect::<Vec<_>>(),
                                );
                            }
                            for child in children.values_mut() {
                                compatible &= make_strict(child);
                            }
                        }
                    }
                    "required" | "enum" | "const" | "type" | "title" | "description" | "$ref" => {}
                    _ => compatible &= make_strict(value),
                }
            }

            if let Some(required) = required {
                map.insert("required".to_string(), Value::Array(required));
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            compatible
        }
        _ => true,
    }
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, `JSON`, ...) on the opening line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Parse untrusted completion content as `T`
pub fn parse_json_content<T: DeserializeOwned>(content: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(strip_code_fences(content))
}
