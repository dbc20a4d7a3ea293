//! Pharmacogenomic risk inference.
//!
//! The closed vocabularies shared by the extraction, phenotype resolution, and
//! guideline lookup live here; the stages live in the sub modules.

pub mod analyze;
pub mod cli;
pub mod diplotype;
pub mod extract;
pub mod narrator;
pub mod phenotype;
pub mod rules;

/// Functional status of a named allele.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
)]
pub enum AlleleFunction {
    #[serde(rename = "no function")]
    #[strum(serialize = "no function")]
    No,
    #[serde(rename = "decreased function")]
    #[strum(serialize = "decreased function")]
    Decreased,
    #[serde(rename = "normal function")]
    #[strum(serialize = "normal function")]
    Normal,
    #[serde(rename = "increased function")]
    #[strum(serialize = "increased function")]
    Increased,
}

/// The phenotype vocabulary a gene reports in.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PhenotypeFamily {
    /// Drug metabolizing enzymes, e.g., CYP2C19.
    Metabolizer,
    /// Drug transporters, e.g., SLCO1B1.
    Transporter,
}

/// Functional phenotype derived from a diplotype.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Phenotype {
    #[serde(rename = "Ultrarapid Metabolizer")]
    #[strum(serialize = "Ultrarapid Metabolizer")]
    UltrarapidMetabolizer,
    #[serde(rename = "Rapid Metabolizer")]
    #[strum(serialize = "Rapid Metabolizer")]
    RapidMetabolizer,
    #[serde(rename = "Normal Metabolizer")]
    #[strum(serialize = "Normal Metabolizer")]
    NormalMetabolizer,
    #[serde(rename = "Intermediate Metabolizer")]
    #[strum(serialize = "Intermediate Metabolizer")]
    IntermediateMetabolizer,
    #[serde(rename = "Poor Metabolizer")]
    #[strum(serialize = "Poor Metabolizer")]
    PoorMetabolizer,
    #[serde(rename = "Increased Function")]
    #[strum(serialize = "Increased Function")]
    IncreasedFunction,
    #[serde(rename = "Normal Function")]
    #[strum(serialize = "Normal Function")]
    NormalFunction,
    #[serde(rename = "Decreased Function")]
    #[strum(serialize = "Decreased Function")]
    DecreasedFunction,
    #[serde(rename = "Poor Function")]
    #[strum(serialize = "Poor Function")]
    PoorFunction,
    /// Novel, rare, or otherwise unresolvable diplotype.
    Unknown,
}

impl Phenotype {
    /// The family the phenotype belongs to, `None` for `Unknown`.
    pub fn family(&self) -> Option<PhenotypeFamily> {
        match self {
            Phenotype::UltrarapidMetabolizer
            | Phenotype::RapidMetabolizer
            | Phenotype::NormalMetabolizer
            | Phenotype::IntermediateMetabolizer
            | Phenotype::PoorMetabolizer => Some(PhenotypeFamily::Metabolizer),
            Phenotype::IncreasedFunction
            | Phenotype::NormalFunction
            | Phenotype::DecreasedFunction
            | Phenotype::PoorFunction => Some(PhenotypeFamily::Transporter),
            Phenotype::Unknown => None,
        }
    }

    /// Whether this is the "normal" class phenotype of its family.
    pub fn is_normal(&self) -> bool {
        matches!(self, Phenotype::NormalMetabolizer | Phenotype::NormalFunction)
    }
}

/// Risk label of a verdict.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
)]
pub enum RiskLabel {
    Safe,
    #[serde(rename = "Adjust Dosage")]
    #[strum(serialize = "Adjust Dosage")]
    AdjustDosage,
    Toxic,
    Ineffective,
    Unknown,
}

/// Severity of a verdict, ordered from `Low` to `Critical`.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

/// Confidence score in the closed interval `[0, 1]`.
///
/// The value reflects the evidence strength of a guideline entry and is
/// never computed from the input data.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

/// Error type for `Confidence`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("confidence score {0} is outside of [0, 1]")]
pub struct ConfidenceOutOfRange(pub f64);

impl Confidence {
    /// The confidence of verdicts without evidence.
    pub const NONE: Confidence = Confidence(0.0);

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ConfidenceOutOfRange;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if (0.0..=1.0).contains(&value) {
            Ok(Confidence(value))
        } else {
            Err(ConfidenceOutOfRange(value))
        }
    }
}

impl From<Confidence> for f64 {
    fn from(val: Confidence) -> Self {
        val.0
    }
}

/// Normalize a gene symbol for lookups.
pub fn gene_key(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Normalize a drug name for lookups.
pub fn drug_key(name: &str) -> String {
    name.trim().to_lowercase()
}
