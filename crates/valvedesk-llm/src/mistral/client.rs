// Mistral-specific client implementation (HTTP direct, no SDK)

use crate::traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, TokenUsage};
use crate::types::{Content, Message, ToolCall};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

const MISTRAL_API_BASE: &str = "https://api.mistral.ai/v1";

pub struct MistralClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl MistralClient {
    /// Create new client with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: MISTRAL_API_BASE.to_string(),
        })
    }

    /// Override the API base URL (self-hosted gateways, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build chat completion request payload
    fn build_chat_request(
        &self,
        model: &str,
        messages: Vec<Message>,
        options: &ChatOptions,
    ) -> Result<Value> {
        let wire_messages: Vec<Value> = messages
            .into_iter()
            .map(|msg| self.convert_message(msg))
            .collect::<Result<Vec<_>>>()?;

        let mut request = serde_json::json!({
            "model": model,
            "messages": wire_messages,
        });

        let obj = request.as_object_mut().unwrap();

        if let Some(temp) = options.temperature {
            obj.insert("temperature".to_string(), serde_json::json!(temp));
        }
        if let Some(max_tokens) = options.max_tokens {
            obj.insert("max_tokens".to_string(), serde_json::json!(max_tokens));
        }
        if let Some(tools) = &options.tools {
            obj.insert("tools".to_string(), serde_json::to_value(tools)?);
        }
        if let Some(tool_choice) = &options.tool_choice {
            obj.insert("tool_choice".to_string(), serde_json::to_value(tool_choice)?);
        }

        Ok(request)
    }

    /// Convert our Message type to the wire format
    fn convert_message(&self, message: Message) -> Result<Value> {
        match message {
            Message::System { content } => Ok(serde_json::json!({
                "role": "system",
                "content": content.as_text(),
            })),
            Message::Human { content } => Ok(serde_json::json!({
                "role": "user",
                "content": content.as_text(),
            })),
            Message::AI {
                content,
                tool_calls,
            } => {
                let mut obj = serde_json::json!({
                    "role": "assistant",
                    "content": content.as_ref().map(Content::as_text).unwrap_or(""),
                });
                if let Some(tool_calls) = tool_calls {
                    obj.as_object_mut()
                        .unwrap()
                        .insert("tool_calls".to_string(), serde_json::to_value(tool_calls)?);
                }
                Ok(obj)
            }
        }
    }
}

#[async_trait]
impl ChatClient for MistralClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let payload =
            self.build_chat_request(&request.model, request.messages, &request.options)?;

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(model = %request.model, "sending chat completion request");

        let response = self
            .http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion failed with status {}: {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .context("Chat completion returned no choices")?;

        Ok(ChatResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls: choice.message.tool_calls.filter(|t| !t.is_empty()),
            usage: completion.usage,
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}
