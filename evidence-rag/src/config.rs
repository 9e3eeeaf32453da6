use anyhow::Context as _;
use std::time::Duration;

use crate::models::MAX_EVIDENCE_RECORDS;
use crate::planner::MAX_QUERIES;

pub const DEFAULT_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const DEFAULT_MODEL_ID: &str = "anthropic/claude-3.5-sonnet";
pub const DEFAULT_TOOL_NAME: &str = "cancer-risk-service";

/// Identifiers requested per search query.
pub const IDS_PER_QUERY: usize = 2;

#[derive(Debug, Clone)]
pub struct PubMedConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub tool: String,
    pub email: Option<String>,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EUTILS_URL.to_string(),
            api_key: None,
            tool: DEFAULT_TOOL_NAME.to_string(),
            email: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub api_key: String,
    pub model_id: String,
    pub max_tokens: u64,
    pub timeout: Duration,
}

/// Fan-out limits and per-call deadlines for literature retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub max_queries: usize,
    pub ids_per_query: usize,
    pub max_records: usize,
    pub search_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_queries: MAX_QUERIES,
            ids_per_query: IDS_PER_QUERY,
            max_records: MAX_EVIDENCE_RECORDS,
            search_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pubmed: PubMedConfig,
    pub inference: InferenceConfig,
    pub retrieval: RetrievalSettings,
}

impl PipelineConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup; unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("OPENROUTER_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;

        let retrieval_defaults = RetrievalSettings::default();
        let retrieval = RetrievalSettings {
            search_timeout: seconds(&get, "SEARCH_TIMEOUT_SECS")?
                .unwrap_or(retrieval_defaults.search_timeout),
            fetch_timeout: seconds(&get, "FETCH_TIMEOUT_SECS")?
                .unwrap_or(retrieval_defaults.fetch_timeout),
            ..retrieval_defaults
        };

        let inference = InferenceConfig {
            api_key,
            model_id: get("INFERENCE_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            max_tokens: match get("INFERENCE_MAX_TOKENS") {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("INFERENCE_MAX_TOKENS is not a number: {raw}"))?,
                None => 2048,
            },
            timeout: seconds(&get, "INFERENCE_TIMEOUT_SECS")?.unwrap_or(Duration::from_secs(60)),
        };

        let pubmed = PubMedConfig {
            base_url: get("NCBI_EUTILS_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_EUTILS_URL.to_string()),
            api_key: get("NCBI_API_KEY"),
            tool: get("NCBI_TOOL").unwrap_or_else(|| DEFAULT_TOOL_NAME.to_string()),
            email: get("NCBI_EMAIL"),
        };

        Ok(Self {
            pubmed,
            inference,
            retrieval,
        })
    }
}

fn seconds<F>(get: &F, key: &str) -> anyhow::Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{key} is not a whole number of seconds: {raw}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_requires_inference_key() {
        let err = PipelineConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[("OPENROUTER_API_KEY", "sk")])).unwrap();

        assert_eq!(config.inference.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.inference.max_tokens, 2048);
        assert_eq!(config.pubmed.base_url, DEFAULT_EUTILS_URL);
        assert_eq!(config.pubmed.api_key, None);
        assert_eq!(config.retrieval.max_queries, 3);
        assert_eq!(config.retrieval.ids_per_query, 2);
        assert_eq!(config.retrieval.max_records, 5);
        assert_eq!(config.retrieval.search_timeout, Duration::from_secs(10));
        assert_eq!(config.retrieval.fetch_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk"),
            ("NCBI_EUTILS_URL", "http://localhost:9000/eutils/"),
            ("NCBI_API_KEY", "ncbi"),
            ("SEARCH_TIMEOUT_SECS", "3"),
            ("INFERENCE_MODEL_ID", "openai/gpt-4.1-mini"),
        ]))
        .unwrap();

        assert_eq!(config.pubmed.base_url, "http://localhost:9000/eutils");
        assert_eq!(config.pubmed.api_key.as_deref(), Some("ncbi"));
        assert_eq!(config.retrieval.search_timeout, Duration::from_secs(3));
        assert_eq!(config.inference.model_id, "openai/gpt-4.1-mini");

        let err = PipelineConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk"),
            ("FETCH_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("FETCH_TIMEOUT_SECS"));
    }
}
