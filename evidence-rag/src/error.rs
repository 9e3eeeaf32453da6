use thiserror::Error;

/// Failures the pipeline surfaces to its caller.
///
/// Retrieval problems never appear here: a failed search or fetch degrades
/// into fewer (or zero) evidence records, and only the absence of evidence
/// is reported, as [`PipelineError::InsufficientEvidence`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no usable literature abstracts could be retrieved")]
    InsufficientEvidence,

    #[error("inference service failed: {0}")]
    SynthesisService(String),

    /// The inference service answered, but not with a usable report.
    /// `raw` keeps the model output for diagnostics and is not part of the message.
    #[error("inference output is not a valid report: {reason}")]
    SynthesisFormat { reason: String, raw: String },
}

impl PipelineError {
    pub(crate) fn format(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::SynthesisFormat {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
