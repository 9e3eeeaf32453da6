use crate::clients::{LiteratureFetch, LiteratureSearch};
use crate::config::PubMedConfig;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Restricts a search to records with free full text.
const OPEN_ACCESS_FILTER: &str = "free full text[sb]";

/// PubMed E-utilities client: `esearch` for identifiers, `efetch` for abstracts.
#[derive(Clone)]
pub struct PubMedClient {
    client: reqwest::Client,
    config: PubMedConfig,
}

impl PubMedClient {
    pub fn new(config: PubMedConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn with_client(client: reqwest::Client, config: PubMedConfig) -> Self {
        Self { client, config }
    }

    fn search_url(&self, query: &str, max_results: usize) -> String {
        let term = format!("({}) AND {}", query, OPEN_ACCESS_FILTER);
        format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&retmode=json&sort=relevance{}",
            self.config.base_url,
            urlencoding::encode(&term),
            max_results,
            self.etiquette_params()
        )
    }

    fn fetch_url(&self, identifiers: &[String]) -> String {
        format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml&rettype=abstract{}",
            self.config.base_url,
            urlencoding::encode(&identifiers.join(",")),
            self.etiquette_params()
        )
    }

    /// `tool`, `email` and `api_key` parameters NCBI asks clients to send.
    fn etiquette_params(&self) -> String {
        let mut params = format!("&tool={}", urlencoding::encode(&self.config.tool));
        if let Some(email) = &self.config.email {
            params.push_str(&format!("&email={}", urlencoding::encode(email)));
        }
        if let Some(api_key) = &self.config.api_key {
            params.push_str(&format!("&api_key={}", urlencoding::encode(api_key)));
        }
        params
    }
}

#[async_trait]
impl LiteratureSearch for PubMedClient {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<String>> {
        info!(query = %query, max_results, "Searching PubMed");

        let response = self
            .client
            .get(self.search_url(query, max_results))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("PubMed search request failed: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("PubMed search returned an error status: {}", e))?;

        let search_data: Value = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse search response: {}", e))?;

        identifiers_from_search(&search_data)
    }
}

#[async_trait]
impl LiteratureFetch for PubMedClient {
    async fn fetch(&self, identifiers: &[String]) -> anyhow::Result<String> {
        info!(count = identifiers.len(), "Fetching PubMed abstracts");

        let response = self
            .client
            .get(self.fetch_url(identifiers))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("PubMed fetch request failed: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("PubMed fetch returned an error status: {}", e))?;

        response
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get fetch response text: {}", e))
    }
}

fn identifiers_from_search(search_data: &Value) -> anyhow::Result<Vec<String>> {
    let ids = search_data["esearchresult"]["idlist"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("No idlist in search response"))?;

    Ok(ids
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect())
}
