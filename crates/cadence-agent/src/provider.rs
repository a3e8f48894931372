//! OpenAI-compatible chat provider.
//!
//! Works with any endpoint that speaks `POST {endpoint}/chat/completions`
//! (OpenAI, Groq, DeepSeek, Ollama, llama.cpp server, ...).
//! Providers differ only by endpoint URL and API key.

use async_trait::async_trait;
use cadence_core::config::Settings;
use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::ChatProvider;
use cadence_core::types::{ChatMessage, ChatResponse, ToolCall, ToolDefinition};
use serde_json::{Value, json};

pub struct OpenAiCompatibleProvider {
    /// Provider name (e.g., "openai", "ollama").
    name: String,
    api_key: String,
    /// Base URL (e.g., "https://api.openai.com/v1").
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Build from the `[llm]` section. API key: config > CADENCE_API_KEY > OPENAI_API_KEY.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.llm.provider,
            &settings.llm.endpoint,
            &settings.api_key(),
            settings.llm.temperature,
        )
    }

    pub fn new(name: &str, endpoint: &str, api_key: &str, temperature: f32) -> Self {
        Self {
            name: name.to_string(),
            api_key: api_key.to_string(),
            base_url: endpoint.trim_end_matches('/').to_string(),
            temperature,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, model: &str, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": model,
            "temperature": self.temperature,
            "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        });

        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }
}

/// Wire form of a message; tool calls use the nested `function` object.
fn message_json(msg: &ChatMessage) -> Value {
    let mut m = json!({ "role": msg.role, "content": msg.content });
    if !msg.tool_calls.is_empty() {
        m["tool_calls"] = msg
            .tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": { "name": tc.name, "arguments": tc.arguments },
                })
            })
            .collect();
    }
    if let Some(id) = &msg.tool_call_id {
        m["tool_call_id"] = json!(id);
    }
    m
}

/// Parse a standard chat completion body.
fn parse_completion(json: &Value) -> Result<ChatResponse> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| CadenceError::execution("No choices in response"))?;

    let content = choice["message"]["content"].as_str().map(String::from);
    let tool_calls = choice["message"]["tool_calls"]
        .as_array()
        .map(|tc| {
            tc.iter()
                .filter_map(|t| {
                    Some(ToolCall {
                        id: t["id"].as_str().unwrap_or("").to_string(),
                        name: t["function"]["name"].as_str()?.to_string(),
                        arguments: t["function"]["arguments"].as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatResponse { content, tool_calls })
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let body = self.request_body(model, messages, tools);
        let url = format!("{}/chat/completions", self.base_url);

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = req.send().await.map_err(|e| {
            CadenceError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CadenceError::execution(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| CadenceError::Http(e.to_string()))?;
        parse_completion(&json)
    }
}
