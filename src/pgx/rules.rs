//! Guideline rule engine: (gene, phenotype, drug) to risk verdict.

use crate::{err::AnalysisError, kb::KnowledgeBase};

use super::{Confidence, Phenotype, RiskLabel, Severity};

/// Dose adjustment reported for unresolved phenotypes.
pub const UNKNOWN_DOSE_ADJUSTMENT: &str = "Use standard dosing pending further testing.";
/// Monitoring reported for unresolved phenotypes.
pub const UNKNOWN_MONITORING: &str =
    "Confirm genotype with a validated pharmacogenomic assay before adjusting therapy.";

/// The outcome of the rule lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskVerdict {
    pub risk_label: RiskLabel,
    pub severity: Severity,
    pub confidence: Confidence,
    pub dose_adjustment: String,
    pub monitoring: String,
    pub citation: String,
    /// Knowledge base edition that produced the verdict.
    pub edition: String,
}

/// Classify the risk of `drug` for a patient with `phenotype` in `gene`.
///
/// Only exact (gene, phenotype, drug) entries are used.  An `Unknown`
/// phenotype yields the conservative "unknown" verdict if the drug has a
/// guideline for the gene at all.
pub fn classify_risk(
    kb: &KnowledgeBase,
    gene: &str,
    phenotype: Phenotype,
    drug: &str,
) -> Result<RiskVerdict, AnalysisError> {
    let not_found = || AnalysisError::GuidelineNotFound {
        gene: gene.to_string(),
        phenotype: phenotype.to_string(),
        drug: drug.to_string(),
    };

    if phenotype == Phenotype::Unknown {
        if !kb.has_guideline(gene, drug) {
            return Err(not_found());
        }
        let citation = kb
            .rules_for(gene, drug)
            .map(|rule| rule.citation.clone())
            .next()
            .unwrap_or_default();
        return Ok(RiskVerdict {
            risk_label: RiskLabel::Unknown,
            severity: Severity::Low,
            confidence: Confidence::NONE,
            dose_adjustment: UNKNOWN_DOSE_ADJUSTMENT.to_string(),
            monitoring: UNKNOWN_MONITORING.to_string(),
            citation,
            edition: kb.edition().to_string(),
        });
    }

    let rule = kb.rule(gene, phenotype, drug).ok_or_else(not_found)?;
    Ok(RiskVerdict {
        risk_label: rule.risk_label,
        severity: rule.severity,
        confidence: rule.confidence,
        dose_adjustment: rule.dose_adjustment.clone(),
        monitoring: rule.monitoring.clone(),
        citation: rule.citation.clone(),
        edition: kb.edition().to_string(),
    })
}

#[cfg(test)]
mod test {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::err::ErrorKind;

    #[rstest::fixture]
    fn kb() -> KnowledgeBase {
        KnowledgeBase::builtin().expect("builtin knowledge base must load")
    }

    #[rstest::rstest]
    fn clopidogrel_poor_metabolizer(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let verdict = classify_risk(&kb, "CYP2C19", Phenotype::PoorMetabolizer, "Clopidogrel")?;

        assert_eq!(verdict.risk_label, RiskLabel::Ineffective);
        assert_eq!(verdict.severity, Severity::High);
        assert!(approx_eq!(f64, verdict.confidence.value(), 0.95));
        assert_eq!(verdict.edition, "cpic-2024.1");
        assert!(verdict.citation.contains("Clopidogrel"));

        Ok(())
    }

    #[rstest::rstest]
    fn simvastatin_normal_function(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let verdict = classify_risk(&kb, "SLCO1B1", Phenotype::NormalFunction, "simvastatin")?;

        assert_eq!(verdict.risk_label, RiskLabel::Safe);
        assert_eq!(verdict.severity, Severity::Low);
        assert!(approx_eq!(f64, verdict.confidence.value(), 1.0));

        Ok(())
    }

    #[rstest::rstest]
    fn unknown_phenotype_is_conservative(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let verdict = classify_risk(&kb, "CYP2D6", Phenotype::Unknown, "Codeine")?;

        assert_eq!(verdict.risk_label, RiskLabel::Unknown);
        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.confidence, Confidence::NONE);
        assert_eq!(verdict.dose_adjustment, UNKNOWN_DOSE_ADJUSTMENT);

        Ok(())
    }

    #[rstest::rstest]
    #[case::no_rule_for_phenotype("CYP2C9", Phenotype::UltrarapidMetabolizer, "Warfarin")]
    #[case::no_extrapolation_across_drugs("CYP2C19", Phenotype::PoorMetabolizer, "Warfarin")]
    #[case::unknown_drug("CYP2C19", Phenotype::PoorMetabolizer, "Aspirin")]
    #[case::unknown_without_guideline("CYP2C19", Phenotype::Unknown, "Codeine")]
    fn guideline_not_found(
        kb: KnowledgeBase,
        #[case] gene: &str,
        #[case] phenotype: Phenotype,
        #[case] drug: &str,
    ) {
        let err = classify_risk(&kb, gene, phenotype, drug).expect_err("must fail");

        assert_eq!(err.kind(), ErrorKind::GuidelineNotFound);
        assert!(err.to_string().starts_with("insufficient evidence"));
    }
}
