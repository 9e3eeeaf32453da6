use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::clients::InferenceClient;
use crate::error::{PipelineError, Result};
use crate::models::{
    AnalysisReport, Citation, EvidenceSet, Insight, LiteratureRecord, RiskProfile,
};

pub const DEFAULT_DISCLAIMER: &str = "This analysis is informational only and is not a medical \
diagnosis. It summarizes research correlations and cannot determine any individual's risk. \
Please discuss any concerns with a licensed physician or oncologist.";

/// Fixed behavioural contract sent as the system preamble of every request.
pub const SYSTEM_PROMPT: &str = r#"You are a clinical informatics assistant. You analyze a person's health and lifestyle profile alongside peer-reviewed research abstracts and describe potential cancer risk correlations.

STRICT RULES:
1. Never provide a definitive medical diagnosis, under any circumstances.
2. Frame every insight as a probabilistic correlation ("research suggests a potential correlation", "evidence indicates an elevated association"), never as a certainty.
3. Every insight MUST cite at least one of the supplied sources, using its exact title and URL. Cite nothing else.
4. Always recommend follow-up with a licensed oncologist or primary care physician.
5. Stay clinically neutral: do not minimize or exaggerate any risk factor.
6. Respond with exactly one JSON object and nothing else: no prose before or after it and no markdown code fences.

OUTPUT FORMAT (strict JSON):
{
  "insights": [
    {
      "cancerType": "string",
      "riskLevel": "low|moderate|high",
      "explanation": "string, evidence-based and non-diagnostic",
      "citations": [{"title": "string", "url": "string"}],
      "recommendation": "string, actionable and physician-referral-oriented"
    }
  ],
  "disclaimer": "string, standard medical disclaimer"
}"#;

#[derive(Deserialize)]
struct ModelReport {
    insights: Vec<Insight>,
    #[serde(default)]
    disclaimer: Option<String>,
}

/// Turns a profile plus retrieved abstracts into a validated [`AnalysisReport`].
pub struct EvidenceSynthesizer {
    inference: Arc<dyn InferenceClient>,
    timeout: Duration,
}

impl EvidenceSynthesizer {
    pub fn new(inference: Arc<dyn InferenceClient>, timeout: Duration) -> Self {
        Self { inference, timeout }
    }

    /// Requires a non-empty evidence set; an empty one is rejected with
    /// [`PipelineError::InsufficientEvidence`] without calling the model.
    /// The inference call is made once and never retried.
    pub async fn synthesize(
        &self,
        profile: &RiskProfile,
        evidence: EvidenceSet,
        invocation_id: &str,
    ) -> Result<AnalysisReport> {
        if evidence.is_empty() {
            return Err(PipelineError::InsufficientEvidence);
        }

        let message = build_user_message(profile, &evidence);
        info!(
            invocation_id = %invocation_id,
            sources = evidence.len(),
            "Requesting evidence synthesis"
        );

        let raw = match tokio::time::timeout(
            self.timeout,
            self.inference.complete(SYSTEM_PROMPT, &message),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                error!(invocation_id = %invocation_id, "Inference call failed: {}", e);
                return Err(PipelineError::SynthesisService(e.to_string()));
            }
            Err(_) => {
                error!(invocation_id = %invocation_id, "Inference call timed out");
                return Err(PipelineError::SynthesisService(format!(
                    "inference timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let parsed: ModelReport = serde_json::from_str(extract_json_object(&raw)).map_err(|e| {
            error!(
                invocation_id = %invocation_id,
                raw = %raw.chars().take(500).collect::<String>(),
                "Failed to parse inference output: {}",
                e
            );
            PipelineError::format(format!("invalid JSON: {}", e), raw.clone())
        })?;

        let insights = ground_citations(parsed.insights, &evidence);
        if insights.is_empty() {
            error!(invocation_id = %invocation_id, "No insight cites a retrieved source");
            return Err(PipelineError::format(
                "no insight cites a retrieved source",
                raw,
            ));
        }

        let disclaimer = parsed
            .disclaimer
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISCLAIMER.to_string());

        info!(
            invocation_id = %invocation_id,
            insights = insights.len(),
            "Evidence synthesis completed"
        );

        Ok(AnalysisReport {
            insights,
            disclaimer,
            evidence,
            invocation_id: invocation_id.to_string(),
        })
    }
}

/// The only per-request content: the profile verbatim and one numbered block per source.
pub fn build_user_message(profile: &RiskProfile, evidence: &EvidenceSet) -> String {
    let family_history = profile.family_conditions();
    let family_history = if family_history.is_empty() {
        "None reported".to_string()
    } else {
        family_history.join(", ")
    };

    let sources = evidence
        .iter()
        .enumerate()
        .map(|(i, record)| {
            format!(
                "SOURCE [{}]: {}\nURL: {}\n\nABSTRACT: {}",
                i + 1,
                record.title,
                record.url,
                record.abstract_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "PATIENT PROFILE:\n\
         - Age: {}\n\
         - Sex: {}\n\
         - BMI: {}\n\
         - Smoking Status: {}\n\
         - Alcohol Consumption: {}\n\
         - Dietary Pattern: {}\n\
         - Family History of Conditions: {}\n\
         \n\
         RESEARCH ABSTRACTS:\n\
         {}\n\
         \n\
         Based on the patient profile and the provided research abstracts, generate a cancer \
         risk correlation analysis. Cite only the sources provided above.",
        profile.age,
        profile.sex,
        profile.body_mass_index,
        profile.smoking_status,
        profile.alcohol_consumption,
        profile.dietary_pattern,
        family_history,
        sources
    )
}

/// Removes a surrounding markdown fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string ("json") along with the opening fence line.
        text = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest.trim_start_matches("json"),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Fence-stripped text narrowed to its outermost `{ ... }` span, if any.
fn extract_json_object(raw: &str) -> &str {
    let text = strip_code_fences(raw);
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Keeps only citations that point at a supplied record, rewritten to the
/// record's canonical title and URL; insights left uncited are dropped.
fn ground_citations(insights: Vec<Insight>, evidence: &EvidenceSet) -> Vec<Insight> {
    insights
        .into_iter()
        .filter_map(|mut insight| {
            let mut grounded: Vec<Citation> = Vec::new();
            for citation in &insight.citations {
                match matching_record(citation, evidence) {
                    Some(record) => {
                        if !grounded.iter().any(|c| c.url == record.url) {
                            grounded.push(Citation {
                                title: record.title.clone(),
                                url: record.url.clone(),
                            });
                        }
                    }
                    None => warn!(
                        title = %citation.title,
                        url = %citation.url,
                        "Dropping citation not present in the evidence set"
                    ),
                }
            }

            if grounded.is_empty() {
                warn!(
                    cancer_type = %insight.cancer_type,
                    "Dropping insight without a grounded citation"
                );
                return None;
            }
            insight.citations = grounded;
            Some(insight)
        })
        .collect()
}

fn matching_record<'a>(
    citation: &Citation,
    evidence: &'a EvidenceSet,
) -> Option<&'a LiteratureRecord> {
    let url = normalize_url(&citation.url);
    let title = normalize_title(&citation.title);

    evidence.iter().find(|record| {
        (!url.is_empty() && (url == normalize_url(&record.url) || url == normalize_url(&record.doi)))
            || (!title.is_empty() && title == normalize_title(&record.title))
    })
}

fn normalize_url(url: &str) -> String {
    let url = url.trim().to_lowercase();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(&url);
    let url = url.strip_prefix("www.").unwrap_or(url);
    url.trim_end_matches('/').to_string()
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskLevel, SmokingStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedInference {
        reply: std::result::Result<String, String>,
        delay: Option<Duration>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedInference {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: None,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(reason.to_string()),
                delay: None,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedInference {
        async fn complete(&self, system: &str, message: &str) -> anyhow::Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), message.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn evidence(count: usize) -> EvidenceSet {
        EvidenceSet::from_records((1..=count).map(|i| {
            LiteratureRecord::new(
                format!("{i}00"),
                format!("Study {i} on cancer risk"),
                format!("Abstract body {i}"),
                Some(2020),
            )
        }))
    }

    fn profile() -> RiskProfile {
        RiskProfile {
            age: 58,
            smoking_status: SmokingStatus::Current,
            family_history: vec!["colon".to_string()],
            ..RiskProfile::default()
        }
    }

    fn synthesizer(inference: Arc<ScriptedInference>) -> EvidenceSynthesizer {
        EvidenceSynthesizer::new(inference, Duration::from_secs(5))
    }

    const FENCED_REPORT: &str = r#"```json
{
  "insights": [
    {
      "cancerType": "Lung",
      "riskLevel": "high",
      "explanation": "Research suggests an elevated association between smoking and lung cancer.",
      "citations": [{"title": "Study 1 on cancer risk", "url": "https://pubmed.ncbi.nlm.nih.gov/100/"}],
      "recommendation": "Discuss lung screening with your physician."
    },
    {
      "cancerType": "Colorectal",
      "riskLevel": "moderate",
      "explanation": "Evidence indicates a potential correlation with family history.",
      "citations": [{"title": "study 3 on cancer risk.", "url": ""}],
      "recommendation": "Ask your doctor about colonoscopy."
    }
  ],
  "disclaimer": "Not a diagnosis."
}
```"#;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_user_message_enumerates_profile_and_sources() {
        let message = build_user_message(&profile(), &evidence(2));

        assert!(message.contains("- Age: 58"));
        assert!(message.contains("- Sex: other"));
        assert!(message.contains("- BMI: 22"));
        assert!(message.contains("- Smoking Status: current"));
        assert!(message.contains("- Family History of Conditions: colon"));
        assert!(message.contains(
            "SOURCE [1]: Study 1 on cancer risk\nURL: https://pubmed.ncbi.nlm.nih.gov/100/\n\nABSTRACT: Abstract body 1"
        ));
        assert!(message.find("SOURCE [1]").unwrap() < message.find("SOURCE [2]").unwrap());

        let message = build_user_message(&RiskProfile::default(), &evidence(1));
        assert!(message.contains("- Family History of Conditions: None reported"));
    }

    #[tokio::test]
    async fn test_fenced_report_is_parsed_and_evidence_attached() {
        let inference = ScriptedInference::replying(FENCED_REPORT);
        let input = evidence(3);

        let report = synthesizer(inference.clone())
            .synthesize(&profile(), input.clone(), "req-42")
            .await
            .unwrap();

        assert_eq!(report.evidence, input);
        assert_eq!(report.invocation_id, "req-42");
        assert_eq!(report.disclaimer, "Not a diagnosis.");
        assert_eq!(report.insights.len(), 2);
        assert!(report.insights.iter().all(|i| !i.citations.is_empty()));
        assert_eq!(report.insights[0].risk_level, RiskLevel::High);
        // Title-only citation is resolved to the canonical record.
        assert_eq!(
            report.insights[1].citations[0].url,
            "https://pubmed.ncbi.nlm.nih.gov/300/"
        );

        let prompts = inference.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_format_error() {
        let inference = ScriptedInference::replying("```json\nI'm sorry, I can't help with that.\n```");

        let err = synthesizer(inference)
            .synthesize(&profile(), evidence(1), "req")
            .await
            .unwrap_err();

        match err {
            PipelineError::SynthesisFormat { raw, .. } => assert!(raw.contains("I'm sorry")),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_risk_level_is_a_format_error() {
        let reply = r#"{"insights":[{"cancerType":"Lung","riskLevel":"certain","explanation":"x",
            "citations":[{"title":"Study 1 on cancer risk","url":"https://pubmed.ncbi.nlm.nih.gov/100/"}],
            "recommendation":"See a doctor"}],"disclaimer":"d"}"#;

        let err = synthesizer(ScriptedInference::replying(reply))
            .synthesize(&profile(), evidence(1), "req")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SynthesisFormat { .. }));
    }

    #[tokio::test]
    async fn test_ungrounded_citations_are_removed() {
        let reply = r#"{"insights":[
            {"cancerType":"Lung","riskLevel":"low","explanation":"x",
             "citations":[{"title":"Invented paper","url":"https://example.org/fake"},
                          {"title":"","url":"http://pubmed.ncbi.nlm.nih.gov/200"}],
             "recommendation":"r"},
            {"cancerType":"Skin","riskLevel":"low","explanation":"y",
             "citations":[{"title":"Another invented paper","url":"https://example.org/x"}],
             "recommendation":"r"}]}"#;

        let report = synthesizer(ScriptedInference::replying(reply))
            .synthesize(&profile(), evidence(2), "req")
            .await
            .unwrap();

        assert_eq!(report.insights.len(), 1);
        assert_eq!(
            report.insights[0].citations,
            vec![Citation {
                title: "Study 2 on cancer risk".to_string(),
                url: "https://pubmed.ncbi.nlm.nih.gov/200/".to_string(),
            }]
        );
        assert_eq!(report.disclaimer, DEFAULT_DISCLAIMER);
    }

    #[tokio::test]
    async fn test_fully_ungrounded_report_is_rejected() {
        let reply = r#"{"insights":[{"cancerType":"Lung","riskLevel":"low","explanation":"x",
            "citations":[],"recommendation":"r"}],"disclaimer":"d"}"#;

        let err = synthesizer(ScriptedInference::replying(reply))
            .synthesize(&profile(), evidence(1), "req")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SynthesisFormat { .. }));
    }

    #[tokio::test]
    async fn test_inference_failure_is_a_service_error() {
        let err = synthesizer(ScriptedInference::failing("429 quota exceeded"))
            .synthesize(&profile(), evidence(1), "req")
            .await
            .unwrap_err();

        match err {
            PipelineError::SynthesisService(reason) => assert!(reason.contains("quota")),
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_evidence_never_reaches_the_model() {
        let inference = ScriptedInference::replying(FENCED_REPORT);

        let err = synthesizer(inference.clone())
            .synthesize(&profile(), EvidenceSet::new(), "req")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InsufficientEvidence));
        assert!(inference.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_url_citation_is_grounded_by_title() {
        let reply = r#"{"insights":[{"cancerType":"Lung","riskLevel":"High","explanation":"x",
            "citations":[{"title":"Study 1 on cancer risk","url":null}],
            "recommendation":"r"}],"disclaimer":"d"}"#;

        let report = synthesizer(ScriptedInference::replying(reply))
            .synthesize(&profile(), evidence(1), "req")
            .await
            .unwrap();

        assert_eq!(report.insights[0].risk_level, RiskLevel::High);
        assert_eq!(
            report.insights[0].citations,
            vec![Citation {
                title: "Study 1 on cancer risk".to_string(),
                url: "https://pubmed.ncbi.nlm.nih.gov/100/".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_slow_inference_is_a_service_error() {
        let inference = Arc::new(ScriptedInference {
            reply: Ok(FENCED_REPORT.to_string()),
            delay: Some(Duration::from_secs(5)),
            prompts: Mutex::new(Vec::new()),
        });

        let err = EvidenceSynthesizer::new(inference, Duration::from_millis(50))
            .synthesize(&profile(), evidence(1), "req")
            .await
            .unwrap_err();

        match err {
            PipelineError::SynthesisService(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected service error, got {other:?}"),
        }
    }
}
