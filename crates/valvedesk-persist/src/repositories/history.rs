use bson::oid::ObjectId;
use mongodb::{bson::doc, Client, Collection};

use crate::error::{PersistError, Result};
use crate::models::History;

#[derive(Clone)]
pub struct HistoryRepository {
    collection: Collection<History>,
}

impl HistoryRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("histories");
        Self { collection }
    }

    pub(crate) fn collection(&self) -> &Collection<History> {
        &self.collection
    }

    /// Get the user's history, creating it on first access.
    ///
    /// The unique index on `user_id` makes concurrent first accesses race;
    /// the loser of the insert re-reads the winner's row.
    pub async fn get_or_create(&self, user_id: ObjectId) -> Result<History> {
        if let Some(history) = self.find_by_user(user_id).await? {
            return Ok(history);
        }

        let now = chrono::Utc::now();
        let history = History {
            id: ObjectId::new(),
            user_id,
            created_at: now,
            updated_at: now,
        };

        match self.collection.insert_one(&history).await {
            Ok(_) => Ok(history),
            Err(e) => match self.find_by_user(user_id).await? {
                Some(existing) => Ok(existing),
                None => Err(PersistError::Database(e)),
            },
        }
    }

    pub async fn find_by_user(&self, user_id: ObjectId) -> Result<Option<History>> {
        let filter = doc! { "user_id": user_id };
        Ok(self.collection.find_one(filter).await?)
    }

    /// Bump `updated_at`
    pub async fn touch(&self, history_id: ObjectId) -> Result<()> {
        let filter = doc! { "_id": history_id };
        let update = doc! { "$set": { "updated_at": bson::DateTime::now() } };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }
}
