use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

use crate::Retriever;

const MISTRAL_API_BASE: &str = "https://api.mistral.ai/v1";
const EMBEDDING_MODEL: &str = "mistral-embed";

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub mistral_api_key: String,
}

/// Retriever backed by a Qdrant collection, with query embeddings from the
/// Mistral embeddings endpoint.
pub struct QdrantRetriever {
    http_client: reqwest::Client,
    config: QdrantConfig,
    embeddings_base: String,
}

impl QdrantRetriever {
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key).context("Invalid Qdrant API key format")?,
            );
        }

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            config,
            embeddings_base: MISTRAL_API_BASE.to_string(),
        })
    }

    /// Override the embeddings API base URL (tests, gateways)
    pub fn with_embeddings_base(mut self, base: impl Into<String>) -> Self {
        self.embeddings_base = base.into();
        self
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.embeddings_base);
        let payload = serde_json::json!({
            "model": EMBEDDING_MODEL,
            "input": [query],
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.mistral_api_key)
            .json(&payload)
            .send()
            .await
            .context("Embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding request failed with status {}: {}", status, body);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("Embedding response contained no vectors")
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let vector = self.embed_query(query).await?;

        let url = format!(
            "{}/collections/{}/points/search",
            self.config.url.trim_end_matches('/'),
            self.config.collection
        );
        let payload = serde_json::json!({
            "vector": vector,
            "limit": k,
            "with_payload": true,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Qdrant search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant search failed with status {}: {}", status, body);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse Qdrant search response")?;

        let snippets = parsed
            .result
            .into_iter()
            .filter_map(|hit| extract_snippet(&hit.payload))
            .collect::<Vec<_>>();

        tracing::debug!(count = snippets.len(), "retrieved grounding snippets");
        Ok(snippets)
    }
}

/// Pull the text snippet out of a Qdrant point payload. The ingestion
/// pipeline stores chunks under `page_content`; `text` is accepted as a
/// fallback for hand-loaded collections.
fn extract_snippet(payload: &Value) -> Option<String> {
    payload
        .get("page_content")
        .or_else(|| payload.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    payload: Value,
}
