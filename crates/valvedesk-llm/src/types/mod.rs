mod content;
mod message;
mod tool;

pub use content::Content;
pub use message::Message;
pub use tool::{FunctionCall, FunctionDefinition, Tool, ToolCall, ToolChoice};
