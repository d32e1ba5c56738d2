pub mod client;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repositories;
pub mod store;

pub use client::PersistClient;
pub use error::{PersistError, Result};
pub use models::{
    Conversation, History, MessageRole, StoredMessage, User, CONVERSATION_SCHEMA_VERSION,
};
pub use repositories::{ConversationRepository, HistoryRepository, UserRepository};
pub use store::ConversationStore;
