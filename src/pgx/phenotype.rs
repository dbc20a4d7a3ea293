//! Resolution of diplotypes to phenotypes.

use crate::kb::{CombinationMethod, GeneLocus, KnowledgeBase};

use super::{diplotype::Diplotype, AlleleFunction, Phenotype, PhenotypeFamily};

/// Resolve the phenotype for `diplotype` of `gene`.
///
/// Total: anything that cannot be interpreted yields `Phenotype::Unknown`.
pub fn resolve_phenotype(kb: &KnowledgeBase, gene: &str, diplotype: &str) -> Phenotype {
    let Some(locus) = kb.gene(gene) else {
        tracing::debug!("gene {} not in knowledge base", gene);
        return Phenotype::Unknown;
    };
    match diplotype.parse::<Diplotype>() {
        Ok(diplotype) => resolve(locus, &diplotype),
        Err(e) => {
            tracing::debug!("{}: {}", locus.symbol, e);
            Phenotype::Unknown
        }
    }
}

/// Resolve the phenotype of a parsed diplotype.
pub fn resolve(locus: &GeneLocus, diplotype: &Diplotype) -> Phenotype {
    let [lhs, rhs] = diplotype.alleles();
    let (Some(lhs_allele), Some(rhs_allele)) = (locus.allele(&lhs.name), locus.allele(&rhs.name))
    else {
        tracing::debug!("{}: unknown allele in {}", locus.symbol, diplotype);
        return Phenotype::Unknown;
    };

    match &locus.method {
        CombinationMethod::FunctionPair => {
            if diplotype.has_copy_number_variation() {
                tracing::debug!(
                    "{}: copy number call {} without activity values",
                    locus.symbol,
                    diplotype
                );
                return Phenotype::Unknown;
            }
            match locus.family {
                PhenotypeFamily::Metabolizer => {
                    metabolizer_pair(lhs_allele.function, rhs_allele.function)
                }
                PhenotypeFamily::Transporter => {
                    transporter_pair(lhs_allele.function, rhs_allele.function)
                }
            }
        }
        CombinationMethod::ActivityScore { thresholds } => {
            let (Some(lhs_activity), Some(rhs_activity)) =
                (lhs_allele.activity, rhs_allele.activity)
            else {
                return Phenotype::Unknown;
            };
            let score = lhs_activity * f64::from(lhs.copies.effective())
                + rhs_activity * f64::from(rhs.copies.effective());
            thresholds
                .iter()
                .find(|(min_score, _)| score >= *min_score)
                .map(|(_, phenotype)| *phenotype)
                .unwrap_or(Phenotype::Unknown)
        }
    }
}

/// Phenotype of a metabolizer gene from the two allele functions.
fn metabolizer_pair(lhs: AlleleFunction, rhs: AlleleFunction) -> Phenotype {
    use AlleleFunction::*;

    match (lhs.max(rhs), lhs.min(rhs)) {
        (Increased, Increased) => Phenotype::UltrarapidMetabolizer,
        (Increased, Normal) => Phenotype::RapidMetabolizer,
        (Normal, Normal) => Phenotype::NormalMetabolizer,
        (No, No) => Phenotype::PoorMetabolizer,
        _ => Phenotype::IntermediateMetabolizer,
    }
}

/// Phenotype of a transporter gene from the two allele functions.
fn transporter_pair(lhs: AlleleFunction, rhs: AlleleFunction) -> Phenotype {
    use AlleleFunction::*;

    match (lhs.max(rhs), lhs.min(rhs)) {
        (Increased, Increased | Normal) => Phenotype::IncreasedFunction,
        (Normal, Normal) => Phenotype::NormalFunction,
        (Increased | Normal, Decreased | No) => Phenotype::DecreasedFunction,
        _ => Phenotype::PoorFunction,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pgx::AlleleFunction::*;

    #[rstest::fixture]
    fn kb() -> KnowledgeBase {
        KnowledgeBase::builtin().expect("builtin knowledge base must load")
    }

    #[rstest::rstest]
    #[case("CYP2C19", "*2/*2", Phenotype::PoorMetabolizer)]
    #[case("CYP2C19", "*2/*3", Phenotype::PoorMetabolizer)]
    #[case("CYP2C19", "*1/*2", Phenotype::IntermediateMetabolizer)]
    #[case("CYP2C19", "*2/*17", Phenotype::IntermediateMetabolizer)]
    #[case("CYP2C19", "*1/*1", Phenotype::NormalMetabolizer)]
    #[case("CYP2C19", "*17/*1", Phenotype::RapidMetabolizer)]
    #[case("CYP2C19", "*17/*17", Phenotype::UltrarapidMetabolizer)]
    #[case("TPMT", "*3A/*3A", Phenotype::PoorMetabolizer)]
    #[case("TPMT", "*1/*3C", Phenotype::IntermediateMetabolizer)]
    #[case("SLCO1B1", "*1/*1", Phenotype::NormalFunction)]
    #[case("SLCO1B1", "*37/*1", Phenotype::NormalFunction)]
    #[case("SLCO1B1", "*1/*5", Phenotype::DecreasedFunction)]
    #[case("SLCO1B1", "*5/*15", Phenotype::PoorFunction)]
    #[case("CYP2C9", "*1/*1", Phenotype::NormalMetabolizer)]
    #[case("CYP2C9", "*1/*2", Phenotype::IntermediateMetabolizer)]
    #[case("CYP2C9", "*2/*2", Phenotype::IntermediateMetabolizer)]
    #[case("CYP2C9", "*2/*3", Phenotype::PoorMetabolizer)]
    #[case("CYP2C9", "*3/*3", Phenotype::PoorMetabolizer)]
    #[case("CYP2D6", "*1/*1", Phenotype::NormalMetabolizer)]
    #[case("CYP2D6", "*1/*1xN", Phenotype::UltrarapidMetabolizer)]
    #[case("CYP2D6", "*1/*10", Phenotype::NormalMetabolizer)]
    #[case("CYP2D6", "*1/*4", Phenotype::IntermediateMetabolizer)]
    #[case("CYP2D6", "*10/*10", Phenotype::IntermediateMetabolizer)]
    #[case("CYP2D6", "*4/*5", Phenotype::PoorMetabolizer)]
    #[case("CYP2D6", "*4/*10", Phenotype::IntermediateMetabolizer)]
    #[case("DPYD", "*1/c.2846A>T", Phenotype::IntermediateMetabolizer)]
    #[case("DPYD", "*2A/*13", Phenotype::PoorMetabolizer)]
    #[case("dpyd", "*1/*1", Phenotype::NormalMetabolizer)]
    fn resolve_known(
        kb: KnowledgeBase,
        #[case] gene: &str,
        #[case] diplotype: &str,
        #[case] expected: Phenotype,
    ) {
        assert_eq!(resolve_phenotype(&kb, gene, diplotype), expected);
    }

    #[rstest::rstest]
    #[case::unknown_gene("VKORC1", "*1/*1")]
    #[case::unknown_allele("CYP2C19", "*1/*99")]
    #[case::garbage("CYP2C19", "not a diplotype")]
    #[case::three_alleles("CYP2C19", "*1/*2/*3")]
    #[case::copy_number_on_function_pair("CYP2C19", "*1/*17xN")]
    fn resolve_unknown(kb: KnowledgeBase, #[case] gene: &str, #[case] diplotype: &str) {
        assert_eq!(resolve_phenotype(&kb, gene, diplotype), Phenotype::Unknown);
    }

    #[test]
    fn metabolizer_pairs_are_symmetric() {
        let functions = [No, Decreased, Normal, Increased];
        for lhs in functions {
            for rhs in functions {
                assert_eq!(metabolizer_pair(lhs, rhs), metabolizer_pair(rhs, lhs));
                assert_eq!(transporter_pair(lhs, rhs), transporter_pair(rhs, lhs));
            }
        }
    }

    #[rstest::rstest]
    #[case(Decreased, Decreased, Phenotype::IntermediateMetabolizer, Phenotype::PoorFunction)]
    #[case(Decreased, No, Phenotype::IntermediateMetabolizer, Phenotype::PoorFunction)]
    #[case(Increased, No, Phenotype::IntermediateMetabolizer, Phenotype::DecreasedFunction)]
    #[case(Increased, Increased, Phenotype::UltrarapidMetabolizer, Phenotype::IncreasedFunction)]
    fn function_pairs(
        #[case] lhs: AlleleFunction,
        #[case] rhs: AlleleFunction,
        #[case] metabolizer: Phenotype,
        #[case] transporter: Phenotype,
    ) {
        assert_eq!(metabolizer_pair(lhs, rhs), metabolizer);
        assert_eq!(transporter_pair(lhs, rhs), transporter);
    }
}
