use bson::oid::ObjectId;
use bson::Document;
use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection};

use crate::error::{PersistError, Result};
use crate::models::{Conversation, StoredMessage, CONVERSATION_SCHEMA_VERSION};

/// Repository over the `conversations` collection.
///
/// Every operation filters on both `_id` and `history_id`, so a caller that
/// does not own a conversation gets the same not-found outcome as for an id
/// that never existed.
#[derive(Clone)]
pub struct ConversationRepository {
    collection: Collection<Conversation>,
}

impl ConversationRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("conversations");
        Self { collection }
    }

    pub(crate) fn collection(&self) -> &Collection<Conversation> {
        &self.collection
    }

    /// Create an empty conversation under the given history
    pub async fn create(&self, history_id: ObjectId, title: String) -> Result<Conversation> {
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

        self.collection.insert_one(&conversation).await?;
        Ok(conversation)
    }

    /// Get a conversation, scoped to its owning history
    pub async fn get(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
    ) -> Result<Option<Conversation>> {
        let filter = owner_filter(conversation_id, history_id);
        Ok(self.collection.find_one(filter).await?)
    }

    /// List conversations for a history, pinned first, most recent first
    pub async fn list(
        &self,
        history_id: ObjectId,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Conversation>> {
        let filter = doc! { "history_id": history_id };
        let conversations = self
            .collection
            .find(filter)
            .sort(doc! { "is_pinned": -1, "last_updated": -1 })
            .skip(skip)
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        Ok(conversations)
    }

    pub async fn count(&self, history_id: ObjectId) -> Result<u64> {
        let filter = doc! { "history_id": history_id };
        Ok(self.collection.count_documents(filter).await?)
    }

    /// Append messages as one atomic update.
    ///
    /// A single `$push $each` is atomic at the document level, so two turns
    /// completing concurrently on the same conversation cannot drop each
    /// other's pair; `last_updated` is last-write-wins.
    pub async fn append_messages(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
        messages: &[StoredMessage],
    ) -> Result<()> {
        let filter = owner_filter(conversation_id, history_id);
        let update = doc! {
            "$push": { "messages": { "$each": bson::to_bson(messages)? } },
            "$set": { "last_updated": bson::DateTime::now() },
        };

        let result = self.collection.update_one(filter, update).await?;
        check_matched(
            result.matched_count,
            PersistError::ConversationNotFound(conversation_id.to_hex()),
        )
    }

    /// Hard delete, owner-scoped
    pub async fn delete(&self, conversation_id: ObjectId, history_id: ObjectId) -> Result<()> {
        let filter = owner_filter(conversation_id, history_id);
        let result = self.collection.delete_one(filter).await?;
        check_matched(
            result.deleted_count,
            PersistError::ConversationNotFound(conversation_id.to_hex()),
        )
    }

    /// Delete every conversation under a history, returning the count
    pub async fn delete_all(&self, history_id: ObjectId) -> Result<u64> {
        let filter = doc! { "history_id": history_id };
        let result = self.collection.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    /// Idempotent pin toggle; redundant sets succeed
    pub async fn set_pinned(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
        is_pinned: bool,
    ) -> Result<()> {
        let filter = owner_filter(conversation_id, history_id);
        let result = self
            .collection
            .update_one(filter, pin_update(is_pinned))
            .await?;
        check_matched(
            result.matched_count,
            PersistError::ConversationNotFound(conversation_id.to_hex()),
        )
    }

    /// Idempotent favorite toggle on an embedded message
    pub async fn set_message_favorite(
        &self,
        conversation_id: ObjectId,
        history_id: ObjectId,
        message_id: &str,
        is_favorite: bool,
    ) -> Result<()> {
        let filter = favorite_filter(conversation_id, history_id, message_id);
        let result = self
            .collection
            .update_one(filter, favorite_update(is_favorite))
            .await?;
        check_matched(
            result.matched_count,
            PersistError::MessageNotFound(message_id.to_string()),
        )
    }
}

/// Filter selecting a conversation only when the caller's history owns it
fn owner_filter(conversation_id: ObjectId, history_id: ObjectId) -> Document {
    doc! { "_id": conversation_id, "history_id": history_id }
}

fn pin_update(is_pinned: bool) -> Document {
    doc! {
        "$set": { "is_pinned": is_pinned, "last_updated": bson::DateTime::now() },
    }
}

fn favorite_filter(
    conversation_id: ObjectId,
    history_id: ObjectId,
    message_id: &str,
) -> Document {
    doc! {
        "_id": conversation_id,
        "history_id": history_id,
        "messages.id": message_id,
    }
}

fn favorite_update(is_favorite: bool) -> Document {
    doc! { "$set": { "messages.$.is_favorite": is_favorite } }
}

/// Success is keyed on the match, not the write: re-applying an identical
/// pin or favorite value matches without modifying and must not error.
fn check_matched(matched_count: u64, not_found: PersistError) -> Result<()> {
    if matched_count == 0 {
        Err(not_found)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_filter_scopes_every_lookup_to_the_owning_history() {
        let conversation_id = ObjectId::new();
        let history_id = ObjectId::new();

        let filter = owner_filter(conversation_id, history_id);
        assert_eq!(filter.get_object_id("_id"), Ok(conversation_id));
        assert_eq!(filter.get_object_id("history_id"), Ok(history_id));
    }

    #[test]
    fn delete_of_a_foreign_conversation_cannot_match() {
        let conversation_id = ObjectId::new();
        let owner = ObjectId::new();
        let intruder = ObjectId::new();

        // Same _id, different history: the filters select disjoint documents.
        let owner_side = owner_filter(conversation_id, owner);
        let intruder_side = owner_filter(conversation_id, intruder);
        assert_ne!(
            owner_side.get_object_id("history_id"),
            intruder_side.get_object_id("history_id")
        );
        assert_eq!(
            check_matched(
                0,
                PersistError::ConversationNotFound(conversation_id.to_hex())
            )
            .unwrap_err()
            .to_string(),
            format!("Conversation not found: {}", conversation_id.to_hex())
        );
    }

    #[test]
    fn pin_update_is_a_plain_set_and_therefore_idempotent() {
        let update = pin_update(true);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_bool("is_pinned"), Ok(true));
        assert!(set.contains_key("last_updated"));

        // Re-applying the same value builds the identical write.
        assert_eq!(
            pin_update(false).get_document("$set").unwrap().get_bool("is_pinned"),
            Ok(false)
        );
    }

    #[test]
    fn redundant_toggle_matches_without_modifying_and_succeeds() {
        // matched 1, modified 0 is the redundant-set shape.
        assert!(check_matched(1, PersistError::ConversationNotFound("x".into())).is_ok());
    }

    #[test]
    fn unmatched_pin_maps_to_conversation_not_found() {
        let err = check_matched(0, PersistError::ConversationNotFound("abc".into()))
            .unwrap_err();
        assert!(matches!(err, PersistError::ConversationNotFound(_)));
    }

    #[test]
    fn favorite_filter_requires_owner_and_message() {
        let conversation_id = ObjectId::new();
        let history_id = ObjectId::new();

        let filter = favorite_filter(conversation_id, history_id, "msg-1");
        assert_eq!(filter.get_object_id("history_id"), Ok(history_id));
        assert_eq!(filter.get_str("messages.id"), Ok("msg-1"));

        let update = favorite_update(true);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_bool("messages.$.is_favorite"), Ok(true));
    }

    #[test]
    fn unmatched_favorite_maps_to_message_not_found() {
        let err = check_matched(0, PersistError::MessageNotFound("msg-9".into()))
            .unwrap_err();
        assert!(matches!(err, PersistError::MessageNotFound(_)));
    }
}
