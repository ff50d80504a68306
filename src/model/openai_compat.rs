//! OpenAI-compatible chat-completions invoker.
//!
//! Speaks the `/chat/completions` wire format, which covers DeepSeek and the
//! other OpenAI-compatible inference endpoints. Tool-call arguments arrive as
//! JSON-encoded strings and are parsed back into structured values; a call
//! that arrives without an id gets a synthesized one so the Tool message can
//! still reference it.

use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{AssistantReply, ModelError, ModelInvoker, ToolSpec};
use crate::message::{Message, ToolCallRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Invoker for any OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatInvoker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiCompatInvoker {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_body(&self, history: &[Message], tool_specs: &[ToolSpec]) -> Value {
        let messages: Vec<Value> = history.iter().map(message_to_wire).collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if !tool_specs.is_empty() {
            let tools: Vec<Value> = tool_specs
                .iter()
                .map(|spec| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": spec.name,
                            "description": spec.description,
                            "parameters": spec.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait::async_trait]
impl ModelInvoker for OpenAiCompatInvoker {
    async fn invoke(
        &self,
        history: &[Message],
        tool_specs: &[ToolSpec],
    ) -> Result<AssistantReply, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, tool_specs);

        debug!(model = %self.model, messages = history.len(), "invoking chat completions");

        // The timeout covers the whole exchange, body reads included; an
        // endpoint that returns headers and then stalls must not hang the
        // turn (and with it the thread's lease).
        let exchange = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status().as_u16();
            if status != 200 {
                let body = response.text().await.unwrap_or_default();
                return Err(ModelError::Api { status, body });
            }

            Ok::<ChatResponse, ModelError>(response.json().await?)
        };

        let data = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ModelError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Decode {
                message: "no choices in response".to_string(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                // Arguments come in as a JSON string; malformed payloads are
                // kept verbatim so the tool can report the failure in-band.
                let arguments = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments));
                let call_id = tc
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));
                ToolCallRequest::new(call_id, tc.function.name, arguments)
            })
            .collect();

        Ok(AssistantReply {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

fn message_to_wire(message: &Message) -> Value {
    match message {
        Message::User { content } => json!({ "role": "user", "content": content }),
        Message::System { content } => json!({ "role": "system", "content": content }),
        Message::Assistant {
            content,
            tool_calls,
        } => {
            if tool_calls.is_empty() {
                return json!({ "role": "assistant", "content": content });
            }
            let calls: Vec<Value> = tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.call_id,
                        "type": "function",
                        "function": {
                            "name": tc.tool_name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({
                "role": "assistant",
                "content": if content.is_empty() { Value::Null } else { Value::String(content.clone()) },
                "tool_calls": calls,
            })
        }
        Message::Tool {
            call_id, content, ..
        } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

// Wire response types (internal).

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}
