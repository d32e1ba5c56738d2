//! Versioned schema migrations, run once at startup before the server
//! accepts traffic. Reads stay pure: no document is ever rewritten as a
//! side effect of a fetch.

use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::Collection;

use crate::error::Result;
use crate::models::CONVERSATION_SCHEMA_VERSION;

/// Upgrade version-1 conversations: embedded messages gain `id` and
/// `is_favorite` fields. Returns the number of migrated documents.
pub async fn backfill_messages(collection: &Collection<Document>) -> Result<u64> {
    let filter = doc! {
        "$or": [
            { "schema_version": { "$exists": false } },
            { "schema_version": { "$lt": CONVERSATION_SCHEMA_VERSION } },
        ]
    };

    let mut cursor = collection.find(filter).await?;
    let mut migrated = 0u64;

    while let Some(conversation) = cursor.try_next().await? {
        let id = conversation.get_object_id("_id").ok();
        let Some(id) = id else { continue };

        let messages = conversation
            .get_array("messages")
            .cloned()
            .unwrap_or_default();
        let upgraded: Vec<Bson> = messages.into_iter().map(upgrade_message).collect();

        // Filter on the old version so a concurrent migrator cannot
        // double-apply.
        let filter = doc! {
            "_id": id,
            "$or": [
                { "schema_version": { "$exists": false } },
                { "schema_version": { "$lt": CONVERSATION_SCHEMA_VERSION } },
            ]
        };
        let update = doc! {
            "$set": {
                "messages": upgraded,
                "schema_version": CONVERSATION_SCHEMA_VERSION,
            }
        };

        let result = collection.update_one(filter, update).await?;
        migrated += result.modified_count;
    }

    if migrated > 0 {
        tracing::info!(migrated, "backfilled legacy conversation messages");
    }
    Ok(migrated)
}

fn upgrade_message(message: Bson) -> Bson {
    match message {
        Bson::Document(mut doc) => {
            if !doc.contains_key("id") {
                doc.insert("id", uuid::Uuid::new_v4().to_string());
            }
            if !doc.contains_key("is_favorite") {
                doc.insert("is_favorite", false);
            }
            Bson::Document(doc)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_adds_missing_fields() {
        let legacy = Bson::Document(doc! {
            "role": "user",
            "text": "Ma vanne fuit",
            "created_at": bson::DateTime::now(),
        });

        let Bson::Document(upgraded) = upgrade_message(legacy) else {
            panic!("expected document");
        };
        assert!(upgraded.get_str("id").is_ok());
        assert_eq!(upgraded.get_bool("is_favorite"), Ok(false));
    }

    #[test]
    fn upgrade_preserves_existing_fields() {
        let current = Bson::Document(doc! {
            "id": "msg-1",
            "role": "assistant",
            "text": "Vérifiez le joint.",
            "is_favorite": true,
        });

        let Bson::Document(upgraded) = upgrade_message(current) else {
            panic!("expected document");
        };
        assert_eq!(upgraded.get_str("id"), Ok("msg-1"));
        assert_eq!(upgraded.get_bool("is_favorite"), Ok(true));
    }
}
