use bson::{doc, Document};
use mongodb::{options::IndexOptions, Client, IndexModel};

use crate::error::{PersistError, Result};
use crate::migrations;
use crate::repositories::{ConversationRepository, HistoryRepository, UserRepository};

pub struct PersistClient {
    client: Client,
    db_name: String,
    user_repo: UserRepository,
    history_repo: HistoryRepository,
    conversation_repo: ConversationRepository,
}

impl PersistClient {
    pub async fn new(mongodb_uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        let user_repo = UserRepository::new(&client, db_name);
        let history_repo = HistoryRepository::new(&client, db_name);
        let conversation_repo = ConversationRepository::new(&client, db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
            user_repo,
            history_repo,
            conversation_repo,
        })
    }

    pub fn users(&self) -> &UserRepository {
        &self.user_repo
    }

    pub fn histories(&self) -> &HistoryRepository {
        &self.history_repo
    }

    pub fn conversations(&self) -> &ConversationRepository {
        &self.conversation_repo
    }

    /// Create the indexes the query paths rely on. Safe to re-run.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.conversation_repo
            .collection()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "history_id": 1, "last_updated": -1 })
                    .build(),
            )
            .await?;
        self.conversation_repo
            .collection()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "_id": 1, "history_id": 1 })
                    .build(),
            )
            .await?;

        self.history_repo
            .collection()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        self.user_repo
            .collection()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        tracing::info!("database indexes ensured");
        Ok(())
    }

    /// Run pending schema migrations
    pub async fn run_migrations(&self) -> Result<()> {
        let raw: mongodb::Collection<Document> = self
            .client
            .database(&self.db_name)
            .collection("conversations");
        migrations::backfill_messages(&raw).await?;
        Ok(())
    }
}
