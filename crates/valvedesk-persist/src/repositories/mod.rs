mod conversation;
mod history;
mod user;

pub use conversation::ConversationRepository;
pub use history::HistoryRepository;
pub use user::UserRepository;
