//! Error taxonomy of the analysis.

/// Terminal errors of a single drug analysis.
///
/// An unknown phenotype is not an error but a value, see
/// `crate::pgx::Phenotype::Unknown`.  Failures of the narrator are recovered
/// locally, see `crate::pgx::narrator::NarratorError`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The variant file is malformed.
    #[error("could not parse variant file: {0}")]
    Parse(String),
    /// The gene is not in the knowledge base.
    #[error("unsupported gene: {0}")]
    UnsupportedGene(String),
    /// There is no guideline entry for the gene, phenotype, and drug.
    #[error("insufficient evidence: no guideline for drug {drug} with {gene} {phenotype}")]
    GuidelineNotFound {
        gene: String,
        phenotype: String,
        drug: String,
    },
    /// The drug has no guideline for any gene.
    #[error("insufficient evidence: no guideline for drug {0}")]
    UnknownDrug(String),
    /// The analysis itself failed, e.g., a worker task panicked.
    #[error("analysis failed: {0}")]
    Internal(String),
}

/// Short, machine-readable classification of an `AnalysisError`.
#[derive(
    serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    UnsupportedGene,
    GuidelineNotFound,
    /// The analysis task itself failed, e.g., panicked.
    Internal,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Parse(_) => ErrorKind::ParseError,
            AnalysisError::UnsupportedGene(_) => ErrorKind::UnsupportedGene,
            AnalysisError::GuidelineNotFound { .. } | AnalysisError::UnknownDrug(_) => {
                ErrorKind::GuidelineNotFound
            }
            AnalysisError::Internal(_) => ErrorKind::Internal,
        }
    }
}
