pub mod mistral;
pub mod traits;
pub mod types;

pub use mistral::MistralClient;
pub use traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, TokenUsage};
pub use types::{Content, FunctionCall, FunctionDefinition, Message, Tool, ToolCall, ToolChoice};
