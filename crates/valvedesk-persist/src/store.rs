use async_trait::async_trait;
use bson::oid::ObjectId;

use crate::error::Result;
use crate::models::{Conversation, StoredMessage};
use crate::PersistClient;

/// Conversation persistence boundary consumed by the orchestration core.
///
/// Implementations must keep appends atomic (both messages or neither) and
/// owner-scoped: a `history_id` mismatch behaves exactly like a missing
/// conversation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        history_id: ObjectId,
        title: String,
    ) -> Result<Conversation>;

    async fn get_conversation(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
    ) -> Result<Option<Conversation>>;

    /// Atomic all-or-nothing append of an ordered message batch
    async fn append_messages(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
        messages: &[StoredMessage],
    ) -> Result<()>;
}

#[async_trait]
impl ConversationStore for PersistClient {
    async fn create_conversation(
        &self,
        history_id: ObjectId,
        title: String,
    ) -> Result<Conversation> {
        let conversation = self.conversations().create(history_id, title).await?;
        self.histories().touch(history_id).await?;
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
    ) -> Result<Option<Conversation>> {
        self.conversations().get(conversation_id, history_id).await
    }

    async fn append_messages(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
        messages: &[StoredMessage],
    ) -> Result<()> {
        self.conversations()
            .append_messages(conversation_id, history_id, messages)
            .await?;
        self.histories().touch(history_id).await?;
        Ok(())
    }
}
