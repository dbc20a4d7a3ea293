//! Code for the knowledge base description file (TOML).
//!
//! These types mirror the file layout 1:1; validation and indexing happens when
//! converting into `super::KnowledgeBase`.

use serde::{Deserialize, Serialize};

use crate::pgx::{AlleleFunction, Confidence, Phenotype, PhenotypeFamily, RiskLabel, Severity};

/// Top-level knowledge base file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Top {
    /// Edition of the knowledge base, reported with every verdict.
    pub edition: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Gene locus definitions.
    #[serde(default)]
    pub genes: Vec<GeneDef>,
    /// Guidelines, one per drug and gene.
    #[serde(default)]
    pub guidelines: Vec<GuidelineDef>,
}

/// How allele functions are combined into a phenotype.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Lookup of the pair of allele functions.
    #[default]
    FunctionPair,
    /// Sum of allele activity values, mapped through thresholds.
    ActivityScore,
}

/// Definition of one gene locus.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneDef {
    /// HGNC gene symbol.
    pub symbol: String,
    /// Chromosome name, without `chr` prefix.
    pub chromosome: String,
    /// Name of the reference allele, e.g., `*1`.
    pub reference_allele: String,
    /// Phenotype vocabulary of the gene.
    pub family: PhenotypeFamily,
    /// Combination method.
    #[serde(default)]
    pub method: Method,
    /// Activity score thresholds, required for `Method::ActivityScore`.
    #[serde(default)]
    pub thresholds: Vec<ThresholdDef>,
    /// Variants used for defining the alleles.
    #[serde(default)]
    pub variants: Vec<VariantDef>,
    /// Named alleles.
    pub alleles: Vec<AlleleDef>,
}

/// Activity scores of at least `min_score` map to `phenotype`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ThresholdDef {
    pub min_score: f64,
    pub phenotype: Phenotype,
}

/// A defining variant in VCF-style coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VariantDef {
    /// dbSNP identifier, used as the key in `AlleleDef::variants`.
    pub rsid: String,
    /// 1-based position on GRCh37.
    pub pos_37: u32,
    /// 1-based position on GRCh38.
    pub pos_38: u32,
    /// Reference allele.
    pub reference: String,
    /// Alternate allele.
    pub alternative: String,
}

/// A named allele.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlleleDef {
    pub name: String,
    pub function: AlleleFunction,
    /// Activity value, required for `Method::ActivityScore`.
    #[serde(default)]
    pub activity: Option<f64>,
    /// rsIDs of the defining variants; all must be in cis.
    #[serde(default)]
    pub variants: Vec<String>,
}

/// Guideline for one drug and gene.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GuidelineDef {
    pub drug: String,
    pub gene: String,
    pub citation: String,
    pub recommendations: Vec<RecommendationDef>,
}

/// Recommendation for one phenotype.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecommendationDef {
    pub phenotype: Phenotype,
    pub risk_label: RiskLabel,
    pub severity: Severity,
    pub confidence_score: Confidence,
    pub dose_adjustment: String,
    pub monitoring: String,
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_minimal() -> Result<(), anyhow::Error> {
        let top: super::Top = toml::from_str(
            r#"
            edition = "test-1"

            [[genes]]
            symbol = "TPMT"
            chromosome = "6"
            reference_allele = "*1"
            family = "metabolizer"

            [[genes.alleles]]
            name = "*1"
            function = "normal function"
            "#,
        )?;

        assert_eq!(top.edition, "test-1");
        assert_eq!(top.genes.len(), 1);
        assert_eq!(top.genes[0].method, super::Method::FunctionPair);
        assert!(top.guidelines.is_empty());

        Ok(())
    }

    #[test]
    fn reject_out_of_range_confidence() {
        let res: Result<super::RecommendationDef, _> = toml::from_str(
            r#"
            phenotype = "Poor Metabolizer"
            risk_label = "Toxic"
            severity = "high"
            confidence_score = 1.5
            dose_adjustment = "x"
            monitoring = "y"
            "#,
        );

        assert!(res.is_err());
    }

    #[test]
    fn builtin_parses() -> Result<(), anyhow::Error> {
        let top: super::Top = toml::from_str(super::super::BUILTIN_TOML)?;

        assert_eq!(top.genes.len(), 6);
        assert_eq!(top.guidelines.len(), 6);

        Ok(())
    }
}
