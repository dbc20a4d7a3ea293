//! Orchestration of the analysis: diplotype to phenotype to verdict.
//!
//! The verdict is assembled deterministically from one knowledge base
//! snapshot.  The optional explanation is attached afterwards and can never
//! change the verdict.

use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    err::{AnalysisError, ErrorKind},
    kb::{GeneLocus, KnowledgeBase},
};

use super::{
    diplotype::Diplotype,
    extract::{extract_from_calls, ExtractOptions, ExtractionReport, VariantCallSet},
    narrator::{Explanation, NarrationRequest, Narrator, NarratorError},
    phenotype::{resolve, resolve_phenotype},
    rules::{classify_risk, RiskVerdict},
    Confidence, Phenotype, RiskLabel, Severity,
};

/// Default time to wait for an explanation.
pub const DEFAULT_NARRATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// A narrator together with the time budget for each call.
#[derive(Clone)]
pub struct NarratorHandle {
    pub narrator: Arc<dyn Narrator>,
    pub timeout: Duration,
}

impl std::fmt::Debug for NarratorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarratorHandle")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub risk_label: RiskLabel,
    pub confidence_score: Confidence,
    pub severity: Severity,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PharmacogenomicProfile {
    pub primary_gene: String,
    pub diplotype: String,
    pub phenotype: Phenotype,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClinicalRecommendation {
    pub dose_adjustment: String,
    pub monitoring: String,
}

/// Result of analysing one drug.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalyzeResponse {
    /// Passed through as given.
    pub patient_id: String,
    pub drug: String,
    pub risk_assessment: RiskAssessment,
    pub pharmacogenomic_profile: PharmacogenomicProfile,
    pub clinical_recommendation: ClinicalRecommendation,
    /// Knowledge base edition that produced the verdict.
    pub guideline_edition: String,
    #[serde(default)]
    pub llm_generated_explanation: Option<Explanation>,
}

impl AnalyzeResponse {
    fn new(
        patient_id: &str,
        drug: &str,
        profile: PharmacogenomicProfile,
        verdict: RiskVerdict,
    ) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            drug: drug.trim().to_string(),
            risk_assessment: RiskAssessment {
                risk_label: verdict.risk_label,
                confidence_score: verdict.confidence,
                severity: verdict.severity,
            },
            pharmacogenomic_profile: profile,
            clinical_recommendation: ClinicalRecommendation {
                dose_adjustment: verdict.dose_adjustment,
                monitoring: verdict.monitoring,
            },
            guideline_edition: verdict.edition,
            llm_generated_explanation: None,
        }
    }
}

/// One (gene, diplotype, drug) entry of a batch request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub gene: String,
    pub diplotype: String,
    pub drug: String,
}

/// Error entry of a batch response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DrugError {
    pub drug: String,
    pub error_kind: ErrorKind,
    pub detail: String,
}

/// Outcome for one drug of a batch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchResult {
    Ok(AnalyzeResponse),
    Error(DrugError),
}

impl BatchResult {
    fn from_result(drug: &str, result: Result<AnalyzeResponse, AnalysisError>) -> Self {
        match result {
            Ok(response) => BatchResult::Ok(response),
            Err(err) => BatchResult::Error(DrugError {
                drug: drug.trim().to_string(),
                error_kind: err.kind(),
                detail: err.to_string(),
            }),
        }
    }
}

/// Results of a batch, in the order of the request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub patient_id: String,
    pub results: Vec<BatchResult>,
}

/// Split a comma separated list of drug names.
pub fn parse_drug_list(drugs: &str) -> Vec<String> {
    drugs
        .split(',')
        .map(str::trim)
        .filter(|drug| !drug.is_empty())
        .map(str::to_string)
        .collect()
}

/// Analyse `drug` for a pre-resolved `diplotype` of `gene`.
pub async fn analyze(
    kb: &KnowledgeBase,
    narrator: Option<&NarratorHandle>,
    patient_id: &str,
    gene: &str,
    diplotype: &str,
    drug: &str,
    enrich: bool,
) -> Result<AnalyzeResponse, AnalysisError> {
    let locus = kb
        .gene(gene)
        .ok_or_else(|| AnalysisError::UnsupportedGene(gene.trim().to_string()))?;
    let phenotype = resolve_phenotype(kb, &locus.symbol, diplotype);
    let diplotype = diplotype
        .parse::<Diplotype>()
        .map(|diplotype| diplotype.to_string())
        .unwrap_or_else(|_| diplotype.to_string());

    let profile = PharmacogenomicProfile {
        primary_gene: locus.symbol.clone(),
        diplotype,
        phenotype,
    };
    finish(kb, narrator, patient_id, profile, drug, enrich).await
}

/// Analyse `drug` for a diplotype extracted from a VCF file.
///
/// Inconclusive extractions are reported with their diplotype but resolve to
/// `Phenotype::Unknown`.
pub async fn analyze_report(
    kb: &KnowledgeBase,
    narrator: Option<&NarratorHandle>,
    patient_id: &str,
    report: &ExtractionReport,
    drug: &str,
    enrich: bool,
) -> Result<AnalyzeResponse, AnalysisError> {
    let locus = kb
        .gene(&report.gene)
        .ok_or_else(|| AnalysisError::UnsupportedGene(report.gene.clone()))?;
    let phenotype = if report.is_conclusive() {
        resolve(locus, &report.diplotype)
    } else {
        tracing::warn!(
            "{}: inconclusive genotype (no-calls: {:?}, unexplained: {:?}), phenotype unknown",
            &locus.symbol,
            &report.missing_calls,
            &report.unexplained_variants
        );
        Phenotype::Unknown
    };

    let profile = PharmacogenomicProfile {
        primary_gene: locus.symbol.clone(),
        diplotype: report.diplotype.to_string(),
        phenotype,
    };
    finish(kb, narrator, patient_id, profile, drug, enrich).await
}

/// Classify the risk and optionally attach the explanation.
async fn finish(
    kb: &KnowledgeBase,
    narrator: Option<&NarratorHandle>,
    patient_id: &str,
    profile: PharmacogenomicProfile,
    drug: &str,
    enrich: bool,
) -> Result<AnalyzeResponse, AnalysisError> {
    let verdict = classify_risk(kb, &profile.primary_gene, profile.phenotype, drug)?;
    let request = NarrationRequest {
        gene: profile.primary_gene.clone(),
        phenotype: profile.phenotype,
        drug: drug.trim().to_string(),
        risk_label: verdict.risk_label,
        rule_summary: format!("{} {}", &verdict.dose_adjustment, &verdict.monitoring),
        citation: verdict.citation.clone(),
    };
    let mut response = AnalyzeResponse::new(patient_id, drug, profile, verdict);

    if enrich {
        match narrator {
            Some(handle) => response.llm_generated_explanation = narrate(handle, &request).await,
            None => tracing::debug!("explanation requested but no narrator configured"),
        }
    }
    Ok(response)
}

/// Ask the narrator, giving up after the handle's timeout.
async fn narrate(handle: &NarratorHandle, request: &NarrationRequest) -> Option<Explanation> {
    let result = tokio::time::timeout(handle.timeout, handle.narrator.explain(request))
        .await
        .unwrap_or(Err(NarratorError::Timeout(handle.timeout)));
    match result {
        Ok(explanation) => Some(explanation),
        Err(e) => {
            tracing::warn!(
                "narrator failed for {}/{}, omitting explanation: {}",
                &request.gene,
                &request.drug,
                e
            );
            None
        }
    }
}

/// Per-drug analysis tasks, aborted when dropped.
///
/// The tasks thus end with the request, e.g., when the client disconnects
/// while explanations are pending.
struct DrugTasks(Vec<tokio::task::JoinHandle<Result<AnalyzeResponse, AnalysisError>>>);

impl Drop for DrugTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Turn a failed join, i.e., a panicked or aborted task, into `AnalysisError::Internal`.
fn flatten_join<T>(
    joined: Result<Result<T, AnalysisError>, tokio::task::JoinError>,
) -> Result<T, AnalysisError> {
    joined.unwrap_or_else(|e| {
        tracing::error!("analysis task failed: {}", e);
        Err(AnalysisError::Internal(e.to_string()))
    })
}

/// Wait for the per-drug tasks, keeping the order of `drugs`.
async fn join_drugs(drugs: Vec<String>, mut tasks: DrugTasks) -> Vec<BatchResult> {
    futures::future::join_all(tasks.0.iter_mut())
        .await
        .into_iter()
        .zip(drugs)
        .map(|(joined, drug)| BatchResult::from_result(&drug, flatten_join(joined)))
        .collect()
}

/// Analyse all `items`, one task per item; errors are isolated per item.
pub async fn analyze_batch(
    kb: Arc<KnowledgeBase>,
    narrator: Option<NarratorHandle>,
    patient_id: &str,
    items: Vec<BatchItem>,
    enrich: bool,
) -> BatchResponse {
    tracing::debug!("analysing batch of {} items", items.len());
    let drugs = items.iter().map(|item| item.drug.clone()).collect::<Vec<_>>();
    let tasks = items
        .into_iter()
        .map(|item| {
            let kb = kb.clone();
            let narrator = narrator.clone();
            let patient_id = patient_id.to_string();
            tokio::spawn(async move {
                analyze(
                    &kb,
                    narrator.as_ref(),
                    &patient_id,
                    &item.gene,
                    &item.diplotype,
                    &item.drug,
                    enrich,
                )
                .await
            })
        })
        .collect::<Vec<_>>();

    BatchResponse {
        patient_id: patient_id.to_string(),
        results: join_drugs(drugs, DrugTasks(tasks)).await,
    }
}

/// Analyse all `drugs` from the VCF `content`.
///
/// The VCF is parsed once and each primary gene is extracted once.  A parse
/// error is reported for each drug.
pub async fn analyze_vcf(
    kb: Arc<KnowledgeBase>,
    narrator: Option<NarratorHandle>,
    patient_id: &str,
    content: Vec<u8>,
    drugs: Vec<String>,
    options: ExtractOptions,
    enrich: bool,
) -> BatchResponse {
    let calls = {
        let kb = kb.clone();
        flatten_join(
            tokio::task::spawn_blocking(move || {
                VariantCallSet::from_bytes(&kb, &content, &options)
            })
            .await,
        )
    };

    // Primary gene per drug, `None` for drugs without guideline.
    let primary_genes = drugs
        .iter()
        .map(|drug| kb.genes_for_drug(drug).first().cloned())
        .collect::<Vec<_>>();
    let reports = match &calls {
        Ok(calls) => primary_genes
            .iter()
            .flatten()
            .filter_map(|gene| kb.gene(gene))
            .map(|locus: &GeneLocus| (locus.symbol.clone(), extract_from_calls(locus, calls)))
            .collect::<IndexMap<_, _>>(),
        Err(_) => IndexMap::new(),
    };

    let tasks = drugs
        .iter()
        .zip(primary_genes)
        .map(|(drug, gene)| {
            let kb = kb.clone();
            let narrator = narrator.clone();
            let patient_id = patient_id.to_string();
            let drug = drug.clone();
            let input = match (&calls, gene) {
                (Err(e), _) => Err(e.clone()),
                (Ok(_), None) => Err(AnalysisError::UnknownDrug(drug.trim().to_string())),
                (Ok(_), Some(gene)) => reports
                    .get(&gene)
                    .cloned()
                    .ok_or(AnalysisError::UnsupportedGene(gene)),
            };
            tokio::spawn(async move {
                let report = input?;
                analyze_report(&kb, narrator.as_ref(), &patient_id, &report, &drug, enrich).await
            })
        })
        .collect::<Vec<_>>();

    BatchResponse {
        patient_id: patient_id.to_string(),
        results: join_drugs(drugs, DrugTasks(tasks)).await,
    }
}
