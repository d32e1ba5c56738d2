use std::sync::Arc;

use bson::oid::ObjectId;
use tokio::sync::mpsc;
use valvedesk_persist::{ConversationStore, StoredMessage};
use valvedesk_ticket::{TicketExecutor, TicketRequest};

use crate::engine::{ResponseEngine, TicketCall, TurnResult};
use crate::error::OrchestratorError;
use crate::events::ChatEvent;
use crate::prompts::FALLBACK_RESPONSE;
use crate::title::conversation_title;

/// Upper bound on one content delta. Chunking is an implementation freedom;
/// only the concatenation is contractual.
const CONTENT_CHUNK_CHARS: usize = 80;

/// Inbound turn as received from the API layer
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub history_id: ObjectId,
    pub conversation_id: Option<ObjectId>,
    pub title: Option<String>,
    pub user_text: String,
    pub requester_email: String,
}

/// Turn with its conversation resolved and prior context loaded
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub conversation_id: ObjectId,
    pub history_id: ObjectId,
    pub is_new_conversation: bool,
    pub prior_messages: Vec<StoredMessage>,
    pub user_text: String,
    pub requester_email: String,
}

/// Durable result of a completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: ObjectId,
    pub is_new_conversation: bool,
    pub user_message: StoredMessage,
    pub assistant_message: StoredMessage,
}

/// Drives one conversational turn end to end: resolve, generate, stream,
/// execute the ticket tool when requested, persist exactly once.
pub struct ChatOrchestrator {
    engine: Arc<ResponseEngine>,
    tickets: Arc<dyn TicketExecutor>,
    store: Arc<dyn ConversationStore>,
}

impl ChatOrchestrator {
    pub fn new(
        engine: Arc<ResponseEngine>,
        tickets: Arc<dyn TicketExecutor>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            engine,
            tickets,
            store,
        }
    }

    /// Resolve or create the conversation and reconstruct its context.
    ///
    /// Runs before any event is emitted, so resolution failures surface as
    /// plain errors rather than stream errors. Context is re-read from the
    /// store on every turn; there is no process-local session cache.
    pub async fn prepare_turn(&self, request: TurnRequest) -> Result<PreparedTurn, OrchestratorError> {
        match request.conversation_id {
            Some(conversation_id) => {
                let conversation = self
                    .store
                    .get_conversation(conversation_id, request.history_id)
                    .await?
                    .ok_or_else(|| {
                        OrchestratorError::ConversationNotFound(conversation_id.to_hex())
                    })?;

                Ok(PreparedTurn {
                    conversation_id,
                    history_id: request.history_id,
                    is_new_conversation: false,
                    prior_messages: conversation.messages,
                    user_text: request.user_text,
                    requester_email: request.requester_email,
                })
            }
            None => {
                let title = request
                    .title
                    .unwrap_or_else(|| conversation_title(&request.user_text));
                let conversation = self
                    .store
                    .create_conversation(request.history_id, title)
                    .await?;

                Ok(PreparedTurn {
                    conversation_id: conversation.id,
                    history_id: request.history_id,
                    is_new_conversation: true,
                    prior_messages: Vec::new(),
                    user_text: request.user_text,
                    requester_email: request.requester_email,
                })
            }
        }
    }

    /// Spawn the turn in the background and return its event stream.
    ///
    /// The task outlives the receiver: a disconnected caller stops seeing
    /// events but the turn still runs to durable persistence.
    pub fn spawn_turn(self: &Arc<Self>, turn: PreparedTurn) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(256);
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute(turn, Some(&tx)).await {
                let _ = tx
                    .send(ChatEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        rx
    }

    /// Non-streaming path: same pipeline, no event channel
    pub async fn run_turn(&self, turn: PreparedTurn) -> Result<TurnOutcome, OrchestratorError> {
        self.execute(turn, None).await
    }

    /// One turn: Meta, content deltas, optional tool execution, atomic
    /// persistence of the (user, assistant) pair, Done. Event sends are
    /// best-effort so persistence never depends on the caller staying
    /// connected.
    async fn execute(
        &self,
        turn: PreparedTurn,
        events: Option<&mpsc::Sender<ChatEvent>>,
    ) -> Result<TurnOutcome, OrchestratorError> {
        self.emit(
            events,
            ChatEvent::Meta {
                conversation_id: turn.conversation_id.to_hex(),
                is_new_conversation: turn.is_new_conversation,
            },
        )
        .await;

        let result = self
            .engine
            .generate_turn(&turn.user_text, &turn.prior_messages)
            .await?;

        let mut full_response = String::new();

        if let Some(content) = result.content() {
            for chunk in chunk_text(content, CONTENT_CHUNK_CHARS) {
                self.emit(
                    events,
                    ChatEvent::Content {
                        delta: chunk.clone(),
                    },
                )
                .await;
                full_response.push_str(&chunk);
            }
        }

        if let Some(call) = result.ticket_call() {
            let (announce, outcome) = self
                .execute_ticket(call, &turn.requester_email, !full_response.is_empty())
                .await;

            self.emit(events, ChatEvent::ToolNotice { text: announce.clone() }).await;
            full_response.push_str(&announce);

            self.emit(events, ChatEvent::ToolNotice { text: outcome.clone() }).await;
            full_response.push_str(&outcome);
        }

        if full_response.is_empty() {
            // Engine-side fallback should make this unreachable; keep the
            // downstream length invariant regardless.
            full_response = FALLBACK_RESPONSE.to_string();
            self.emit(
                events,
                ChatEvent::Content {
                    delta: full_response.clone(),
                },
            )
            .await;
        }

        let user_message = StoredMessage::user(turn.user_text.clone());
        let assistant_message = StoredMessage::assistant(full_response);
        self.store
            .append_messages(
                turn.conversation_id,
                turn.history_id,
                &[user_message.clone(), assistant_message.clone()],
            )
            .await?;

        self.emit(
            events,
            ChatEvent::Done {
                user_message_id: user_message.id.clone(),
                assistant_message_id: assistant_message.id.clone(),
            },
        )
        .await;

        Ok(TurnOutcome {
            conversation_id: turn.conversation_id,
            is_new_conversation: turn.is_new_conversation,
            user_message,
            assistant_message,
        })
    }

    /// Run the ticket tool with the caller's verified identity and shape
    /// the two notices that frame it in the response text.
    async fn execute_ticket(
        &self,
        call: &TicketCall,
        requester_email: &str,
        has_preceding_content: bool,
    ) -> (String, String) {
        let request = TicketRequest {
            category: call.category.clone(),
            summary: call.summary.clone(),
            description: call.description.clone(),
            priority: call.priority.clone(),
            requester_email: requester_email.to_string(),
        };

        tracing::info!(
            category = %request.category,
            assignee = %request.assignee_group(),
            "executing ticket creation"
        );

        let separator = if has_preceding_content { "\n\n" } else { "" };
        let announce = format!(
            "{}Création d'un ticket de support ({})...",
            separator,
            request.assignee_group()
        );

        let outcome = self.tickets.create_ticket(&request).await;
        (announce, format!("\nRésultat : {}", outcome))
    }

    async fn emit(&self, events: Option<&mpsc::Sender<ChatEvent>>, event: ChatEvent) {
        if let Some(tx) = events {
            let _ = tx.send(event).await;
        }
    }
}

/// Split text into char-bounded chunks of at most `max_chars`
fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_preserves_concatenation() {
        let text = "Vérifiez la tension de bobine, puis dépressurisez le circuit avant toute manipulation.";
        let chunks = chunk_text(text, 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunking_handles_empty_text() {
        assert!(chunk_text("", 10).is_empty());
    }
}
