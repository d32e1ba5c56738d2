pub mod engine;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod title;

pub use engine::{EngineConfig, ResponseEngine, TicketCall, TurnResult};
pub use error::{EngineError, OrchestratorError};
pub use events::ChatEvent;
pub use orchestrator::{ChatOrchestrator, PreparedTurn, TurnOutcome, TurnRequest};
pub use title::conversation_title;
