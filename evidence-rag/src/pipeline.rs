use std::sync::Arc;

use tracing::{error, info};

use crate::clients::{InferenceClient, LiteratureFetch, LiteratureSearch};
use crate::config::{PipelineConfig, RetrievalSettings};
use crate::error::{PipelineError, Result};
use crate::inference::OpenRouterInference;
use crate::models::{AnalysisReport, RiskProfile};
use crate::planner::QueryPlanner;
use crate::pubmed::PubMedClient;
use crate::retriever::LiteratureRetriever;
use crate::synthesizer::EvidenceSynthesizer;

/// Profile in, report out: plan queries, retrieve evidence, synthesize.
///
/// Holds no per-request state, so one instance can serve concurrent
/// invocations.
pub struct RiskPipeline {
    planner: QueryPlanner,
    retriever: LiteratureRetriever,
    synthesizer: EvidenceSynthesizer,
}

impl RiskPipeline {
    pub fn new(
        planner: QueryPlanner,
        retriever: LiteratureRetriever,
        synthesizer: EvidenceSynthesizer,
    ) -> Self {
        Self {
            planner,
            retriever,
            synthesizer,
        }
    }

    /// Wires the pipeline from explicit collaborators.
    pub fn with_clients(
        search: Arc<dyn LiteratureSearch>,
        fetch: Arc<dyn LiteratureFetch>,
        inference: Arc<dyn InferenceClient>,
        retrieval: RetrievalSettings,
        inference_timeout: std::time::Duration,
    ) -> Self {
        let planner = QueryPlanner::new(retrieval.max_queries);
        Self::new(
            planner,
            LiteratureRetriever::new(search, fetch, retrieval),
            EvidenceSynthesizer::new(inference, inference_timeout),
        )
    }

    /// Production wiring: PubMed for literature, OpenRouter for inference.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let pubmed = Arc::new(PubMedClient::new(config.pubmed.clone()));
        let inference = Arc::new(OpenRouterInference::new(&config.inference));
        Self::with_clients(
            pubmed.clone(),
            pubmed,
            inference,
            config.retrieval.clone(),
            config.inference.timeout,
        )
    }

    pub async fn run(&self, profile: &RiskProfile, invocation_id: &str) -> Result<AnalysisReport> {
        info!(invocation_id = %invocation_id, "Starting cancer risk analysis");

        let queries = self.planner.plan(profile);
        info!(invocation_id = %invocation_id, queries = ?queries, "Planned literature queries");

        let evidence = self.retriever.retrieve(&queries).await;
        if evidence.is_empty() {
            error!(invocation_id = %invocation_id, "No abstracts could be retrieved");
            return Err(PipelineError::InsufficientEvidence);
        }
        info!(
            invocation_id = %invocation_id,
            abstracts = evidence.len(),
            "Evidence retrieved"
        );

        self.synthesizer
            .synthesize(profile, evidence, invocation_id)
            .await
    }
}
