//! Retrieval adapter for grounding assistant answers in the valve
//! knowledge base. Best-effort by contract: callers must tolerate failures
//! and proceed with an empty context block.

pub mod qdrant;

use anyhow::Result;
use async_trait::async_trait;

pub use qdrant::{QdrantConfig, QdrantRetriever};

/// Trait for similarity search over the knowledge base
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` text snippets relevant to `query`, best first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>>;
}
