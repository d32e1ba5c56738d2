mod conversation;
mod history;
mod user;

pub use conversation::{Conversation, MessageRole, StoredMessage, CONVERSATION_SCHEMA_VERSION};
pub use history::History;
pub use user::User;
