use std::sync::Arc;

use valvedesk_engine::ChatOrchestrator;
use valvedesk_persist::PersistClient;

use crate::config::Config;

/// Shared application state passed to all handlers
///
/// All resources are wrapped in Arc for efficient sharing across async tasks.
/// The orchestrator is stateless and created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persist: Arc<PersistClient>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, persist: Arc<PersistClient>, orchestrator: Arc<ChatOrchestrator>) -> Self {
        Self {
            config: Arc::new(config),
            persist,
            orchestrator,
        }
    }
}
