//! Implementation of the `pgx analyze` sub command.

use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;

use crate::{
    common::{io::open_write_maybe_gz, trace_rss_now, GenomeRelease},
    kb::KnowledgeBase,
};

use super::{
    analyze::{
        analyze_batch, analyze_vcf, parse_drug_list, BatchItem, BatchResponse, NarratorHandle,
    },
    extract::ExtractOptions,
    narrator::{OllamaNarrator, DEFAULT_MODEL},
};

/// Command line arguments for configuring the narrator.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct NarratorArgs {
    /// Base URL of an Ollama-compatible server; no explanations if not given.
    #[arg(long)]
    pub narrator_url: Option<String>,
    /// Model to request explanations from.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub narrator_model: String,
    /// Seconds to wait for an explanation.
    #[arg(long, default_value_t = 30)]
    pub narrator_timeout_secs: u64,
}

impl Default for NarratorArgs {
    fn default() -> Self {
        Self {
            narrator_url: None,
            narrator_model: DEFAULT_MODEL.to_string(),
            narrator_timeout_secs: 30,
        }
    }
}

impl NarratorArgs {
    /// Construct the configured narrator, if any.
    pub fn handle(&self) -> Result<Option<NarratorHandle>, anyhow::Error> {
        let Some(url) = &self.narrator_url else {
            return Ok(None);
        };
        tracing::info!("using narrator {} at {}", &self.narrator_model, url);
        Ok(Some(NarratorHandle {
            narrator: Arc::new(OllamaNarrator::new(url, &self.narrator_model)?),
            timeout: Duration::from_secs(self.narrator_timeout_secs),
        }))
    }
}

/// Command line arguments for `pgx analyze` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Analyse drug risks for a patient", long_about = None)]
pub struct Args {
    /// Path to knowledge base TOML file, built-in edition if not given.
    #[arg(long)]
    pub path_kb: Option<PathBuf>,
    /// Path to the patient's VCF file, optionally gzip compressed.
    #[arg(long, required_unless_present = "gene", conflicts_with_all = ["gene", "diplotype"])]
    pub path_vcf: Option<PathBuf>,
    /// Gene of a pre-resolved diplotype.
    #[arg(long, requires = "diplotype")]
    pub gene: Option<String>,
    /// Pre-resolved diplotype, e.g., `*1/*2`.
    #[arg(long, requires = "gene")]
    pub diplotype: Option<String>,
    /// Comma separated list of drugs.
    #[arg(long)]
    pub drugs: String,
    /// Patient identifier to write into the result.
    #[arg(long, default_value = "anonymous")]
    pub patient_id: String,
    /// Genome release of the VCF coordinates.
    #[arg(long, value_enum, default_value_t = GenomeRelease::Grch38)]
    pub genome_release: GenomeRelease,
    /// Sample in the VCF file, first sample if not given.
    #[arg(long)]
    pub sample: Option<String>,
    /// Path to output JSON file, stdout if not given.
    #[arg(long)]
    pub path_output: Option<PathBuf>,
    /// Attach explanations from the narrator.
    #[arg(long, default_value_t = false)]
    pub enrich: bool,
    #[command(flatten)]
    pub narrator: NarratorArgs,
}

/// Run the analysis for `args` on the `kb`.
async fn run_analysis(
    kb: Arc<KnowledgeBase>,
    args: &Args,
    drugs: Vec<String>,
) -> Result<BatchResponse, anyhow::Error> {
    let narrator = args.narrator.handle()?;
    let response = match (&args.path_vcf, &args.gene, &args.diplotype) {
        (Some(path_vcf), _, _) => {
            let content = std::fs::read(path_vcf)?;
            let options = ExtractOptions {
                genome_release: args.genome_release,
                sample: args.sample.clone(),
            };
            analyze_vcf(
                kb,
                narrator,
                &args.patient_id,
                content,
                drugs,
                options,
                args.enrich,
            )
            .await
        }
        (None, Some(gene), Some(diplotype)) => {
            let items = drugs
                .into_iter()
                .map(|drug| BatchItem {
                    gene: gene.clone(),
                    diplotype: diplotype.clone(),
                    drug,
                })
                .collect();
            analyze_batch(kb, narrator, &args.patient_id, items, args.enrich).await
        }
        _ => anyhow::bail!("either --path-vcf or --gene and --diplotype must be given"),
    };
    Ok(response)
}

/// Main entry point for `pgx analyze` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let drugs = parse_drug_list(&args.drugs);
    if drugs.is_empty() {
        anyhow::bail!("no drug given in --drugs");
    }

    let kb = Arc::new(match &args.path_kb {
        Some(path) => KnowledgeBase::from_path(path)?,
        None => KnowledgeBase::builtin()?,
    });
    tracing::info!("knowledge base edition {}", kb.edition());
    trace_rss_now();

    let before_analysis = std::time::Instant::now();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let response = runtime.block_on(run_analysis(kb, args, drugs))?;
    tracing::info!(
        "analysed {} drugs in {:?}",
        response.results.len(),
        before_analysis.elapsed()
    );

    let mut writer = open_write_maybe_gz(args.path_output.as_ref())?;
    serde_json::to_writer_pretty(&mut writer, &response)?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pgx::analyze::BatchResult;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        args: Args,
    }

    #[rstest::rstest]
    #[case::vcf(&["--path-vcf", "x.vcf", "--drugs", "Codeine"], true)]
    #[case::diplotype(&["--gene", "CYP2D6", "--diplotype", "*1/*4", "--drugs", "Codeine"], true)]
    #[case::neither(&["--drugs", "Codeine"], false)]
    #[case::gene_without_diplotype(&["--gene", "CYP2D6", "--drugs", "Codeine"], false)]
    #[case::both(&["--path-vcf", "x.vcf", "--gene", "CYP2D6", "--diplotype", "*1/*4", "--drugs", "Codeine"], false)]
    fn parse_args(#[case] argv: &[&str], #[case] ok: bool) {
        let res = Cli::try_parse_from(std::iter::once("pgx-analyze").chain(argv.iter().copied()));

        assert_eq!(res.is_ok(), ok, "{:?}", res);
    }

    #[test]
    fn narrator_disabled_by_default() -> Result<(), anyhow::Error> {
        assert!(NarratorArgs::default().handle()?.is_none());

        Ok(())
    }

    fn read_results(path: &std::path::Path) -> Result<BatchResponse, anyhow::Error> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    #[test]
    fn run_vcf() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path_output = tmpdir.join("out.json");
        let args = Args {
            path_kb: None,
            path_vcf: Some("tests/pgx/patient.vcf".into()),
            gene: None,
            diplotype: None,
            drugs: "Clopidogrel,Simvastatin".into(),
            patient_id: "PATIENT_001".into(),
            genome_release: GenomeRelease::Grch38,
            sample: None,
            path_output: Some(path_output.clone()),
            enrich: false,
            narrator: Default::default(),
        };

        run(&Default::default(), &args)?;

        let response = read_results(&path_output)?;
        assert_eq!(response.patient_id, "PATIENT_001");
        let phenotypes = response
            .results
            .iter()
            .map(|result| match result {
                BatchResult::Ok(r) => r.pharmacogenomic_profile.phenotype.to_string(),
                BatchResult::Error(e) => e.detail.clone(),
            })
            .collect::<Vec<_>>();
        assert_eq!(phenotypes, vec!["Poor Metabolizer", "Poor Function"]);

        Ok(())
    }

    #[test]
    fn run_diplotype() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path_output = tmpdir.join("out.json.gz");
        let args = Args {
            path_kb: None,
            path_vcf: None,
            gene: Some("CYP2C19".into()),
            diplotype: Some("*2/*2".into()),
            drugs: "Clopidogrel, Codeine".into(),
            patient_id: "PATIENT_002".into(),
            genome_release: GenomeRelease::Grch38,
            sample: None,
            path_output: Some(path_output.clone()),
            enrich: true,
            narrator: Default::default(),
        };

        run(&Default::default(), &args)?;

        assert!(crate::common::io::is_gzip(&std::fs::read(&path_output)?));

        Ok(())
    }

    #[test]
    fn run_without_drugs() {
        let args = Args {
            path_kb: None,
            path_vcf: Some("tests/pgx/patient.vcf".into()),
            gene: None,
            diplotype: None,
            drugs: " , ".into(),
            patient_id: "PATIENT_001".into(),
            genome_release: GenomeRelease::Grch38,
            sample: None,
            path_output: None,
            enrich: false,
            narrator: Default::default(),
        };

        assert!(run(&Default::default(), &args).is_err());
    }
}
