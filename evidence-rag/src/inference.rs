use crate::clients::InferenceClient;
use crate::config::InferenceConfig;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openrouter;
use tracing::info;

/// Inference over OpenRouter through a rig agent built per request, so the
/// system preamble always matches the caller's instructions.
#[derive(Clone)]
pub struct OpenRouterInference {
    client: openrouter::Client,
    model_id: String,
    max_tokens: u64,
}

impl OpenRouterInference {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            client: openrouter::Client::new(&config.api_key),
            model_id: config.model_id.clone(),
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl InferenceClient for OpenRouterInference {
    async fn complete(&self, system: &str, message: &str) -> anyhow::Result<String> {
        info!(model = %self.model_id, "Invoking inference model");

        let agent = self
            .client
            .agent(&self.model_id)
            .preamble(system)
            .max_tokens(self.max_tokens)
            .build();

        agent
            .prompt(message)
            .await
            .map_err(|e| anyhow::anyhow!("LLM prompt failed: {}", e))
    }
}
