use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use valvedesk_llm::{ChatClient, ChatOptions, ChatRequest, Message, ToolChoice};
use valvedesk_persist::{MessageRole, StoredMessage};
use valvedesk_retrieval::Retriever;

use crate::error::EngineError;
use crate::prompts::{self, TICKET_TOOL_NAME};

const GROUNDING_SNIPPETS: usize = 3;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: String,
    pub temperature: f32,
    /// Bounded wait on the model call; elapsing is a generation failure
    pub model_timeout: Duration,
    /// Bounded wait on retrieval; elapsing degrades to empty grounding
    pub retrieval_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "mistral-large-latest".to_string(),
            temperature: 0.2,
            model_timeout: Duration::from_secs(60),
            retrieval_timeout: Duration::from_secs(10),
        }
    }
}

/// Ticket-creation request parsed from model output. The requester's
/// identity is deliberately absent: it is injected downstream from the
/// verified caller, never trusted from the model.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketCall {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
}

/// Classified outcome of one model turn
#[derive(Debug, Clone)]
pub enum TurnResult {
    Text(String),
    ToolCall(TicketCall),
    Mixed(String, TicketCall),
}

impl TurnResult {
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text(content) | Self::Mixed(content, _) => Some(content),
            Self::ToolCall(_) => None,
        }
    }

    pub fn ticket_call(&self) -> Option<&TicketCall> {
        match self {
            Self::ToolCall(call) | Self::Mixed(_, call) => Some(call),
            Self::Text(_) => None,
        }
    }
}

/// Builds the grounded prompt, invokes the model and classifies its output.
pub struct ResponseEngine {
    chat_client: Arc<dyn ChatClient>,
    retriever: Arc<dyn Retriever>,
    config: EngineConfig,
}

impl ResponseEngine {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        retriever: Arc<dyn Retriever>,
        config: EngineConfig,
    ) -> Self {
        Self {
            chat_client,
            retriever,
            config,
        }
    }

    /// Drive one generation: grounding, prompt assembly, model call,
    /// classification. Model failures are fatal to the turn; retrieval
    /// failures are not.
    pub async fn generate_turn(
        &self,
        user_text: &str,
        prior_turns: &[StoredMessage],
    ) -> Result<TurnResult, EngineError> {
        let context = self.grounding_context(user_text).await;

        let mut messages = Vec::with_capacity(prior_turns.len() + 2);
        messages.push(Message::system(prompts::render_system_prompt(&context)));
        for turn in prior_turns {
            messages.push(match turn.role {
                MessageRole::User => Message::human(turn.text.clone()),
                MessageRole::Assistant => Message::ai(turn.text.clone()),
            });
        }
        messages.push(Message::human(user_text));

        let options = ChatOptions::new()
            .temperature(f64::from(self.config.temperature))
            .tools(vec![prompts::create_ticket_tool()])
            .tool_choice(ToolChoice::auto());
        let request = ChatRequest::new(self.config.model.clone(), messages).with_options(options);

        let response = tokio::time::timeout(self.config.model_timeout, self.chat_client.chat(request))
            .await
            .map_err(|_| EngineError::ModelTimeout)?
            .map_err(EngineError::Model)?;

        let content = response
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let ticket_call = response
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .find_map(|call| {
                if call.function.name != TICKET_TOOL_NAME {
                    tracing::warn!(tool = %call.function.name, "model requested unregistered tool, ignoring");
                    return None;
                }
                match call.parse_arguments::<TicketCall>() {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable ticket arguments, ignoring tool call");
                        None
                    }
                }
            });

        Ok(match (content, ticket_call) {
            (Some(content), Some(call)) => TurnResult::Mixed(content, call),
            (None, Some(call)) => TurnResult::ToolCall(call),
            (Some(content), None) => TurnResult::Text(content),
            (None, None) => {
                tracing::warn!("model returned neither content nor tool call, using fallback");
                TurnResult::Text(prompts::FALLBACK_RESPONSE.to_string())
            }
        })
    }

    /// Top-k grounding snippets joined into a context block. Degrades to an
    /// empty block on any retrieval failure or timeout.
    async fn grounding_context(&self, query: &str) -> String {
        let search = self.retriever.search(query, GROUNDING_SNIPPETS);
        match tokio::time::timeout(self.config.retrieval_timeout, search).await {
            Ok(Ok(snippets)) => snippets.join("\n\n"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "retrieval failed, continuing without grounding");
                String::new()
            }
            Err(_) => {
                tracing::warn!("retrieval timed out, continuing without grounding");
                String::new()
            }
        }
    }
}
