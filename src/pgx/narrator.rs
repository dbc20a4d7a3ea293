//! Optional narrative explanations of verdicts.
//!
//! The narrator only adds text to an already assembled verdict; it never
//! changes it.  Any failure is recovered by the caller.

use serde::{Deserialize, Serialize};

use super::{Phenotype, RiskLabel};

/// Model used with Ollama by default.
pub const DEFAULT_MODEL: &str = "mixtral";

const SYSTEM_PROMPT: &str = "You are a pharmacogenomics clinical assistant.
Only use provided context.
Do not hallucinate.
Do not override deterministic risk.
You must return the output as valid JSON.";

/// Narrative explanation attached to a response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    pub summary: String,
    pub biological_mechanism: String,
    pub clinical_reasoning: String,
    pub citations: String,
}

/// The facts the narrator may use.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationRequest {
    pub gene: String,
    pub phenotype: Phenotype,
    pub drug: String,
    pub risk_label: RiskLabel,
    /// Dose adjustment and monitoring of the rule.
    pub rule_summary: String,
    pub citation: String,
}

impl NarrationRequest {
    /// Render the prompt for text generation models.
    pub fn prompt(&self) -> String {
        format!(
            "{system}\n\n\
             CONTEXT:\n\
             - Drug: {drug}\n\
             - Gene: {gene}\n\
             - Phenotype: {phenotype}\n\
             - DETERMINISTIC RISK LABEL: {risk_label}\n\
             - Clinical Rule: {rule_summary}\n\
             - Guideline: {citation}\n\n\
             INSTRUCTIONS:\n\
             1. Explain why this phenotype affects {drug} metabolism.\n\
             2. Align with the risk label: {risk_label}.\n\
             3. Only use the guideline given above.\n\
             4. Return VALID JSON with keys: \"summary\", \"biological_mechanism\", \
             \"clinical_reasoning\", \"citations\".\n",
            system = SYSTEM_PROMPT,
            drug = self.drug,
            gene = self.gene,
            phenotype = self.phenotype,
            risk_label = self.risk_label,
            rule_summary = self.rule_summary,
            citation = self.citation,
        )
    }
}

/// Error type for narrators.
#[derive(thiserror::Error, Debug)]
pub enum NarratorError {
    #[error("narrator not reachable: {0}")]
    Connection(#[from] reqwest::Error),
    #[error("narrator did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("invalid narrator response: {0}")]
    InvalidResponse(String),
}

/// Generator of narrative explanations.
#[async_trait::async_trait]
pub trait Narrator: Send + Sync {
    async fn explain(&self, request: &NarrationRequest) -> Result<Explanation, NarratorError>;
}

/// Explanation as returned by models, which may list the citations.
#[derive(Deserialize, Debug)]
struct RawExplanation {
    summary: String,
    biological_mechanism: String,
    clinical_reasoning: String,
    #[serde(default)]
    citations: RawCitations,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawCitations {
    One(String),
    Many(Vec<String>),
}

impl Default for RawCitations {
    fn default() -> Self {
        RawCitations::One(String::new())
    }
}

impl From<RawExplanation> for Explanation {
    fn from(raw: RawExplanation) -> Self {
        Self {
            summary: raw.summary,
            biological_mechanism: raw.biological_mechanism,
            clinical_reasoning: raw.clinical_reasoning,
            citations: match raw.citations {
                RawCitations::One(citations) => citations,
                RawCitations::Many(citations) => citations.join("; "),
            },
        }
    }
}

/// Body of Ollama's `/api/generate` response, other fields are ignored.
#[derive(Deserialize, Debug)]
struct GenerateResponse {
    response: String,
}

/// Parse the generated text into an explanation.
fn parse_generated(text: &str) -> Result<Explanation, NarratorError> {
    serde_json::from_str::<RawExplanation>(text.trim())
        .map(Explanation::from)
        .map_err(|e| NarratorError::InvalidResponse(e.to_string()))
}

/// Narrator using an Ollama-compatible text generation server.
#[derive(Debug, Clone)]
pub struct OllamaNarrator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaNarrator {
    /// Construct for the server at `base_url`, e.g., `http://localhost:11434`.
    pub fn new(base_url: &str, model: &str) -> Result<Self, NarratorError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Narrator for OllamaNarrator {
    async fn explain(&self, request: &NarrationRequest) -> Result<Explanation, NarratorError> {
        let body = serde_json::json!({
            "model": &self.model,
            "prompt": request.prompt(),
            "stream": false,
            "format": "json",
            "options": {
                "temperature": 0.2
            }
        });
        tracing::debug!("requesting explanation from {} ({})", &self.url, &self.model);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;
        parse_generated(&response.response)
    }
}
