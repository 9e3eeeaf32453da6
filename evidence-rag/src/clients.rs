//! Collaborator seams. The pipeline only talks to the outside world through
//! these traits, so every external call can be replaced by a test double.

use async_trait::async_trait;

/// Query text to an ordered list of repository record identifiers.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<String>>;
}

/// A batch of identifiers to the raw, abstract-bearing record markup.
#[async_trait]
pub trait LiteratureFetch: Send + Sync {
    async fn fetch(&self, identifiers: &[String]) -> anyhow::Result<String>;
}

/// Single-turn completion against a large language model.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, system: &str, message: &str) -> anyhow::Result<String>;
}
