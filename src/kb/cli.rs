//! Implementation of the `kb check` sub command.

use std::path::PathBuf;

use clap::Parser;
use itertools::Itertools;

use super::{CombinationMethod, KnowledgeBase};

/// Command line arguments for `kb check` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Validate a knowledge base file", long_about = None)]
pub struct Args {
    /// Path to knowledge base TOML file, built-in edition if not given.
    #[arg(long)]
    pub path_kb: Option<PathBuf>,
}

/// Summary lines of `kb`, one per gene.
fn gene_summaries(kb: &KnowledgeBase) -> Vec<String> {
    kb.genes()
        .map(|locus| {
            let method = match &locus.method {
                CombinationMethod::FunctionPair => "function pair".to_string(),
                CombinationMethod::ActivityScore { thresholds } => format!(
                    "activity score [{}]",
                    thresholds
                        .iter()
                        .map(|(min_score, phenotype)| format!(">={} {}", min_score, phenotype))
                        .join(", ")
                ),
            };
            format!(
                "{} (chr{}, {}): {} alleles, {} variants, {}",
                &locus.symbol,
                &locus.chromosome,
                locus.family,
                locus.alleles.len(),
                locus.signatures.len(),
                method
            )
        })
        .collect()
}

/// Main entry point for `kb check` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let kb = match &args.path_kb {
        Some(path) => KnowledgeBase::from_path(path)?,
        None => KnowledgeBase::builtin()?,
    };
    let info = kb.info();

    tracing::info!("edition: {}", &info.edition);
    if let Some(description) = &info.description {
        tracing::info!("description: {}", description);
    }
    for line in gene_summaries(&kb) {
        tracing::info!("  {}", line);
    }
    tracing::info!(
        "{} guideline rules for drugs {}",
        info.rule_count,
        info.drugs.join(", ")
    );

    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn summaries() -> Result<(), anyhow::Error> {
        let kb = KnowledgeBase::builtin()?;

        let lines = gene_summaries(&kb);

        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines[0],
            "CYP2C19 (chr10, metabolizer): 4 alleles, 3 variants, function pair"
        );
        assert_eq!(
            lines[1],
            "CYP2C9 (chr10, metabolizer): 3 alleles, 2 variants, activity score \
             [>=2 Normal Metabolizer, >=1 Intermediate Metabolizer, >=0 Poor Metabolizer]"
        );

        Ok(())
    }

    #[test]
    fn run_builtin() -> Result<(), anyhow::Error> {
        run(&Default::default(), &Args { path_kb: None })
    }

    #[test]
    fn run_invalid_file() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("kb.toml");
        std::fs::write(&path, "edition = \"broken\"\n[[genes]]\nsymbol = \"TPMT\"\n")?;

        assert!(run(&Default::default(), &Args { path_kb: Some(path) }).is_err());

        Ok(())
    }
}
