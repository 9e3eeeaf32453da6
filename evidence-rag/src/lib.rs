//! Evidence-grounded cancer risk analysis.
//!
//! A [`RiskPipeline`] plans PubMed queries from a [`RiskProfile`], retrieves
//! and parses a small set of open-access abstracts, and asks a language model
//! for a citation-backed [`AnalysisReport`]. External services sit behind the
//! traits in [`clients`], so every call can be swapped for a test double.

pub mod clients;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod planner;
pub mod pubmed;
pub mod retriever;
pub mod synthesizer;

// Re-export commonly used types
pub use clients::{InferenceClient, LiteratureFetch, LiteratureSearch};
pub use config::{PipelineConfig, RetrievalSettings};
pub use error::{PipelineError, Result};
pub use models::{
    AlcoholConsumption, AnalysisReport, Citation, EvidenceSet, Insight, LiteratureRecord,
    RiskLevel, RiskProfile, SearchQuery, Sex, SmokingStatus,
};
pub use pipeline::RiskPipeline;
pub use planner::QueryPlanner;
pub use retriever::LiteratureRetriever;
pub use synthesizer::EvidenceSynthesizer;
