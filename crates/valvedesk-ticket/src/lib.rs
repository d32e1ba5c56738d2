//! Ticketing bridge for escalating unresolved valve issues.
//!
//! Each invocation spawns the configured bridge command, writes one
//! JSON-RPC request line to its stdin and reads the reply from stdout.
//! Invocations are fully isolated: no process state is shared between
//! calls and no two calls share stdio.

pub mod bridge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use bridge::{BridgeConfig, TicketBridge};

/// Problem category chosen by the model when opening a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketCategory {
    Installation,
    Maintenance,
    Troubleshooting,
    Peripheral,
}

impl TicketCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "installation" => Some(Self::Installation),
            "maintenance" => Some(Self::Maintenance),
            "troubleshooting" => Some(Self::Troubleshooting),
            "peripheral" => Some(Self::Peripheral),
            _ => None,
        }
    }

    pub fn assignee_group(self) -> &'static str {
        match self {
            Self::Installation => "Installation Group",
            Self::Maintenance => "Maintenance Group",
            Self::Troubleshooting => "Troubleshooting Group",
            Self::Peripheral => "Peripherals Group",
        }
    }
}

/// Assignee group for a raw category string; unknown categories fall back
/// to general support rather than failing the ticket.
pub fn assignee_group_for(category: &str) -> &'static str {
    TicketCategory::parse(category)
        .map(TicketCategory::assignee_group)
        .unwrap_or("General Support")
}

/// Arguments for one ticket creation. `requester_email` always comes from
/// the verified identity of the caller, never from model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRequest {
    pub category: String,
    pub summary: String,
    pub description: String,
    pub priority: String,
    pub requester_email: String,
}

impl TicketRequest {
    pub fn assignee_group(&self) -> &'static str {
        assignee_group_for(&self.category)
    }
}

/// Trait for the ticket-creation side effect.
///
/// The outcome is always a human-readable string; failures are folded into
/// it so the conversation history records what happened.
#[async_trait]
pub trait TicketExecutor: Send + Sync {
    async fn create_ticket(&self, request: &TicketRequest) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!(
            TicketCategory::parse("Maintenance"),
            Some(TicketCategory::Maintenance)
        );
        assert_eq!(TicketCategory::parse("plumbing"), None);
    }

    #[test]
    fn assignee_mapping_covers_all_categories() {
        assert_eq!(assignee_group_for("installation"), "Installation Group");
        assert_eq!(assignee_group_for("maintenance"), "Maintenance Group");
        assert_eq!(assignee_group_for("troubleshooting"), "Troubleshooting Group");
        assert_eq!(assignee_group_for("peripheral"), "Peripherals Group");
        assert_eq!(assignee_group_for("cooking"), "General Support");
    }
}
