use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bson::oid::ObjectId;
use valvedesk_engine::{
    ChatEvent, ChatOrchestrator, EngineConfig, OrchestratorError, ResponseEngine, TurnRequest,
};
use valvedesk_llm::{ChatClient, ChatRequest, ChatResponse, FunctionCall, ToolCall};
use valvedesk_persist::{
    Conversation, ConversationStore, MessageRole, PersistError, StoredMessage,
    CONVERSATION_SCHEMA_VERSION,
};
use valvedesk_retrieval::Retriever;
use valvedesk_ticket::{TicketExecutor, TicketRequest};

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InMemoryStore {
    conversations: Mutex<HashMap<ObjectId, Conversation>>,
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(
        &self,
        history_id: ObjectId,
        title: String,
    ) -> valvedesk_persist::Result<Conversation> {
        let now = chrono::Utc::now();
        let conversation = Conversation {
            id: ObjectId::new(),
            history_id,
            title,
            is_pinned: false,
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
            schema_version: CONVERSATION_SCHEMA_VERSION,
        };
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
    ) -> valvedesk_persist::Result<Option<Conversation>> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .get(&conversation_id)
            .filter(|c| c.history_id == history_id)
            .cloned())
    }

    async fn append_messages(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
        messages: &[StoredMessage],
    ) -> valvedesk_persist::Result<()> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(&conversation_id)
            .filter(|c| c.history_id == history_id)
            .ok_or_else(|| PersistError::ConversationNotFound(conversation_id.to_hex()))?;
        conversation.messages.extend_from_slice(messages);
        conversation.last_updated = chrono::Utc::now();
        Ok(())
    }
}

impl InMemoryStore {
    fn snapshot(&self, id: ObjectId) -> Conversation {
        self.conversations.lock().unwrap()[&id].clone()
    }

    fn total_conversations(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }
}

struct ScriptedChatClient {
    responses: Mutex<Vec<Result<ChatResponse>>>,
}

impl ScriptedChatClient {
    fn new(responses: Vec<Result<ChatResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    fn text(content: &str) -> Result<ChatResponse> {
        Ok(ChatResponse {
            content: Some(content.to_string()),
            tool_calls: None,
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }

    fn ticket(content: Option<&str>, arguments: &str) -> Result<ChatResponse> {
        Ok(ChatResponse {
            content: content.map(str::to_string),
            tool_calls: Some(vec![ToolCall {
                id: "call_1".to_string(),
                tool_type: "function".to_string(),
                function: FunctionCall {
                    name: "create_ticket".to_string(),
                    arguments: arguments.to_string(),
                },
            }]),
            usage: None,
            finish_reason: Some("tool_calls".to_string()),
        })
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .expect("scripted client ran out of responses")
    }
}

struct StaticRetriever;

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>> {
        Ok(vec!["Vérifier la membrane.".to_string()])
    }
}

struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>> {
        anyhow::bail!("vector store unreachable")
    }
}

#[derive(Default)]
struct RecordingTicketExecutor {
    requests: Mutex<Vec<TicketRequest>>,
}

#[async_trait]
impl TicketExecutor for RecordingTicketExecutor {
    async fn create_ticket(&self, request: &TicketRequest) -> String {
        self.requests.lock().unwrap().push(request.clone());
        "ID du ticket : KAN-42".to_string()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    orchestrator: Arc<ChatOrchestrator>,
    store: Arc<InMemoryStore>,
    tickets: Arc<RecordingTicketExecutor>,
}

fn harness(chat: ScriptedChatClient, retriever: Arc<dyn Retriever>) -> Harness {
    let config = EngineConfig {
        model_timeout: Duration::from_secs(5),
        retrieval_timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    };
    let engine = Arc::new(ResponseEngine::new(Arc::new(chat), retriever, config));
    let store = Arc::new(InMemoryStore::default());
    let tickets = Arc::new(RecordingTicketExecutor::default());
    let orchestrator = Arc::new(ChatOrchestrator::new(
        engine,
        tickets.clone(),
        store.clone(),
    ));
    Harness {
        orchestrator,
        store,
        tickets,
    }
}

fn new_turn(history_id: ObjectId, message: &str) -> TurnRequest {
    TurnRequest {
        history_id,
        conversation_id: None,
        title: None,
        user_text: message.to_string(),
        requester_email: "amine@example.com".to_string(),
    }
}

async fn collect_events(mut rx: tokio::sync::mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_conversation_turn_streams_and_persists_one_pair() {
    let h = harness(
        ScriptedChatClient::new(vec![ScriptedChatClient::text(
            "Vérifiez d'abord le joint de membrane.",
        )]),
        Arc::new(StaticRetriever),
    );
    let history_id = ObjectId::new();

    let prepared = h
        .orchestrator
        .prepare_turn(new_turn(history_id, "Ma vanne fuit et j'ai déjà changé le joint"))
        .await
        .unwrap();
    let conversation_id = prepared.conversation_id;

    let events = collect_events(h.orchestrator.spawn_turn(prepared)).await;

    // Meta first, Done last and unique.
    assert!(matches!(
        &events[0],
        ChatEvent::Meta { is_new_conversation: true, .. }
    ));
    assert!(matches!(events.last().unwrap(), ChatEvent::Done { .. }));
    let terminals = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::Done { .. } | ChatEvent::Error { .. }))
        .count();
    assert_eq!(terminals, 1);

    // Content concatenation equals the persisted assistant text.
    let streamed: String = events.iter().filter_map(ChatEvent::response_text).collect();
    let conversation = h.store.snapshot(conversation_id);
    assert_eq!(h.store.total_conversations(), 1);
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].role, MessageRole::User);
    assert_eq!(conversation.messages[1].role, MessageRole::Assistant);
    assert_eq!(conversation.messages[1].text, streamed);
}

#[tokio::test]
async fn followup_turn_appends_to_existing_conversation() {
    let h = harness(
        ScriptedChatClient::new(vec![ScriptedChatClient::text("Dans ce cas, vérifiez la bobine.")]),
        Arc::new(StaticRetriever),
    );
    let history_id = ObjectId::new();

    let conversation = h
        .store
        .create_conversation(history_id, "Fuite".to_string())
        .await
        .unwrap();
    h.store
        .append_messages(
            conversation.id,
            history_id,
            &[
                StoredMessage::user("Ma vanne fuit"),
                StoredMessage::assistant("Changez le joint."),
            ],
        )
        .await
        .unwrap();
    let before = h.store.snapshot(conversation.id);

    tokio::time::sleep(Duration::from_millis(5)).await;

    let prepared = h
        .orchestrator
        .prepare_turn(TurnRequest {
            history_id,
            conversation_id: Some(conversation.id),
            title: None,
            user_text: "Toujours pareil après remplacement".to_string(),
            requester_email: "amine@example.com".to_string(),
        })
        .await
        .unwrap();
    assert!(!prepared.is_new_conversation);
    assert_eq!(prepared.prior_messages.len(), 2);

    h.orchestrator.run_turn(prepared).await.unwrap();

    let after = h.store.snapshot(conversation.id);
    assert_eq!(after.messages.len(), 4);
    assert!(after.last_updated > before.last_updated);
    assert_eq!(after.created_at, before.created_at);
}

#[tokio::test]
async fn retrieval_failure_degrades_without_stream_error() {
    let h = harness(
        ScriptedChatClient::new(vec![ScriptedChatClient::text("Réponse sans contexte.")]),
        Arc::new(FailingRetriever),
    );

    let prepared = h
        .orchestrator
        .prepare_turn(new_turn(ObjectId::new(), "Bruit anormal sur la vanne"))
        .await
        .unwrap();
    let events = collect_events(h.orchestrator.spawn_turn(prepared)).await;

    assert!(events.iter().all(|e| !matches!(e, ChatEvent::Error { .. })));
    assert!(matches!(events.last().unwrap(), ChatEvent::Done { .. }));
}

#[tokio::test]
async fn generation_failure_emits_error_and_persists_nothing() {
    let h = harness(
        ScriptedChatClient::new(vec![Err(anyhow::anyhow!("model unavailable"))]),
        Arc::new(StaticRetriever),
    );

    let prepared = h
        .orchestrator
        .prepare_turn(new_turn(ObjectId::new(), "Ma vanne fuit"))
        .await
        .unwrap();
    let conversation_id = prepared.conversation_id;
    let events = collect_events(h.orchestrator.spawn_turn(prepared)).await;

    assert!(matches!(&events[0], ChatEvent::Meta { .. }));
    assert!(matches!(events.last().unwrap(), ChatEvent::Error { .. }));
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Done { .. })));

    // Failed turn leaves the conversation exactly as it was.
    assert!(h.store.snapshot(conversation_id).messages.is_empty());
}

#[tokio::test]
async fn ticket_call_is_executed_with_verified_identity() {
    let arguments = r#"{
        "category": "troubleshooting",
        "summary": "Fuite Vanne V-12",
        "description": "Joint remplacé, fuite persistante.",
        "priority": "High"
    }"#;
    let h = harness(
        ScriptedChatClient::new(vec![ScriptedChatClient::ticket(
            Some("Je crée un ticket pour vous."),
            arguments,
        )]),
        Arc::new(StaticRetriever),
    );

    let prepared = h
        .orchestrator
        .prepare_turn(new_turn(ObjectId::new(), "Rien ne fonctionne, créez un ticket"))
        .await
        .unwrap();
    let conversation_id = prepared.conversation_id;
    let events = collect_events(h.orchestrator.spawn_turn(prepared)).await;

    let notices: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::ToolNotice { .. }))
        .collect();
    assert_eq!(notices.len(), 2, "one notice before and one after the tool");

    // The requester identity comes from the authenticated caller.
    let requests = h.tickets.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].requester_email, "amine@example.com");
    assert_eq!(requests[0].assignee_group(), "Troubleshooting Group");
    drop(requests);

    // The ticket outcome is part of the durable assistant message.
    let conversation = h.store.snapshot(conversation_id);
    assert!(conversation.messages[1].text.contains("KAN-42"));
    let streamed: String = events.iter().filter_map(ChatEvent::response_text).collect();
    assert_eq!(conversation.messages[1].text, streamed);
}

#[tokio::test]
async fn empty_model_output_persists_fallback_apology() {
    let h = harness(
        ScriptedChatClient::new(vec![Ok(ChatResponse {
            content: Some("   ".to_string()),
            tool_calls: None,
            usage: None,
            finish_reason: Some("stop".to_string()),
        })]),
        Arc::new(StaticRetriever),
    );

    let prepared = h
        .orchestrator
        .prepare_turn(new_turn(ObjectId::new(), "Bonjour"))
        .await
        .unwrap();
    let outcome = h.orchestrator.run_turn(prepared).await.unwrap();

    assert!(!outcome.assistant_message.text.is_empty());
    assert!(outcome.assistant_message.text.contains("désolé"));
}

#[tokio::test]
async fn foreign_conversation_is_not_found() {
    let h = harness(
        ScriptedChatClient::new(vec![]),
        Arc::new(StaticRetriever),
    );
    let owner_history = ObjectId::new();
    let other_history = ObjectId::new();

    let conversation = h
        .store
        .create_conversation(owner_history, "Privée".to_string())
        .await
        .unwrap();

    let result = h
        .orchestrator
        .prepare_turn(TurnRequest {
            history_id: other_history,
            conversation_id: Some(conversation.id),
            title: None,
            user_text: "Bonjour".to_string(),
            requester_email: "intrus@example.com".to_string(),
        })
        .await;

    match result {
        Err(OrchestratorError::ConversationNotFound(id)) => {
            assert_eq!(id, conversation.id.to_hex());
        }
        other => panic!("expected not-found, got {:?}", other.map(|_| ())),
    }
}
