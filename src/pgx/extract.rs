//! Extraction of diplotypes from VCF files.
//!
//! The VCF is parsed once into a `VariantCallSet` that only keeps the calls of
//! one sample at positions used by any allele definition.  Diplotypes are then
//! assembled per gene from these calls.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use noodles_vcf as vcf;
use thousands::Separable;
use vcf::variant::{
    record::samples::{
        keys::key::{GENOTYPE, PHASE_SET},
        series::value::genotype::Phasing,
    },
    record_buf::samples::sample::Value,
};

use crate::{
    common::{self, io::read_maybe_gz, GenomeRelease},
    err::AnalysisError,
    kb::{GeneLocus, KnowledgeBase},
};

use super::diplotype::{cmp_allele_names, AlleleCall, Diplotype};

/// Number of phase units whose orientations are enumerated.
const MAX_PHASE_UNITS: usize = 16;

/// Options for the extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Genome release of the VCF coordinates.
    pub genome_release: GenomeRelease,
    /// Sample to use, first sample if `None`.
    pub sample: Option<String>,
}

/// Genotype of one sample at one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCall {
    /// Chromosome number, see `common::chrom_no`.
    pub chrom_no: usize,
    /// 1-based position.
    pub pos: usize,
    pub reference: String,
    pub alternatives: Vec<String>,
    /// Allele indices, `None` for no-calls.
    pub alleles: Vec<Option<usize>>,
    /// Whether the genotype is phased.
    pub phased: bool,
    /// Value of the `PS` field, if any.
    pub phase_set: Option<i32>,
}

impl SampleCall {
    /// Index into `alleles` values of `alternative`, if it is one of the ALT alleles.
    fn allele_index(&self, reference: &str, alternative: &str) -> Option<usize> {
        if !self.reference.eq_ignore_ascii_case(reference) {
            return None;
        }
        self.alternatives
            .iter()
            .position(|alt| alt.eq_ignore_ascii_case(alternative))
            .map(|idx| idx + 1)
    }

    fn is_no_call(&self) -> bool {
        self.alleles.is_empty() || self.alleles.iter().any(Option::is_none)
    }
}

/// Calls of one sample at the positions relevant for a knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantCallSet {
    /// Name of the sample.
    pub sample: String,
    /// Genome release of the coordinates.
    pub genome_release: GenomeRelease,
    /// Calls by (chromosome number, position).
    calls: HashMap<(usize, usize), Vec<SampleCall>>,
}

impl VariantCallSet {
    /// Parse the VCF `content`, plain or gzip/BGZF compressed.
    ///
    /// Only records at positions used by alleles of `kb` are retained.
    pub fn from_bytes(
        kb: &KnowledgeBase,
        content: &[u8],
        options: &ExtractOptions,
    ) -> Result<Self, AnalysisError> {
        let wanted = kb
            .genes()
            .flat_map(|locus| {
                let chrom_no = common::chrom_no(&locus.chromosome);
                locus.signatures.iter().filter_map(move |signature| {
                    chrom_no.map(|chrom_no| {
                        (
                            chrom_no,
                            signature.position[options.genome_release] as usize,
                        )
                    })
                })
            })
            .collect::<HashSet<_>>();

        let mut reader = vcf::io::Reader::new(read_maybe_gz(content));
        let header = reader
            .read_header()
            .map_err(|e| AnalysisError::Parse(format!("invalid VCF header: {}", e)))?;

        let sample_names = header.sample_names();
        let sample_idx = match &options.sample {
            _ if sample_names.is_empty() => {
                return Err(AnalysisError::Parse(
                    "VCF file does not contain any sample".into(),
                ))
            }
            None => 0,
            Some(name) => sample_names.get_index_of(name).ok_or_else(|| {
                AnalysisError::Parse(format!("sample {} not found in VCF header", name))
            })?,
        };
        let sample = sample_names
            .get_index(sample_idx)
            .cloned()
            .unwrap_or_default();
        tracing::debug!(
            "using sample {} (index {}) with {} coordinates",
            &sample,
            sample_idx,
            options.genome_release.name()
        );

        let mut calls: HashMap<(usize, usize), Vec<SampleCall>> = HashMap::new();
        let mut total_records = 0usize;
        for (i, result) in reader.records().enumerate() {
            let line_no = i + 1;
            let record = result.map_err(|e| {
                AnalysisError::Parse(format!("invalid VCF record #{}: {}", line_no, e))
            })?;
            let record = vcf::variant::RecordBuf::try_from_variant_record(&header, &record)
                .map_err(|e| {
                    AnalysisError::Parse(format!("invalid VCF record #{}: {}", line_no, e))
                })?;
            total_records += 1;

            let Some(chrom_no) = common::chrom_no(record.reference_sequence_name()) else {
                continue;
            };
            let Some(pos) = record.variant_start().map(usize::from) else {
                continue;
            };
            if !wanted.contains(&(chrom_no, pos)) {
                continue;
            }

            let call = sample_call(&record, sample_idx, chrom_no, pos).map_err(|msg| {
                AnalysisError::Parse(format!("invalid VCF record #{}: {}", line_no, msg))
            })?;
            calls.entry((chrom_no, pos)).or_default().push(call);
        }
        tracing::debug!(
            "read {} VCF records, kept {} positions",
            total_records.separate_with_commas(),
            calls.len()
        );

        Ok(Self {
            sample,
            genome_release: options.genome_release,
            calls,
        })
    }

    /// Calls at the given position.
    pub fn calls_at(&self, chrom_no: usize, pos: usize) -> &[SampleCall] {
        self.calls
            .get(&(chrom_no, pos))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Extract genotype information of the sample at `sample_idx`.
fn sample_call(
    record: &vcf::variant::RecordBuf,
    sample_idx: usize,
    chrom_no: usize,
    pos: usize,
) -> Result<SampleCall, String> {
    let samples = record.samples();
    let sample = samples
        .get_index(sample_idx)
        .ok_or_else(|| "record lacks sample column".to_string())?;
    let (alleles, phased) = match sample.get(GENOTYPE) {
        Some(Some(Value::Genotype(gt))) => {
            let alleles = gt.as_ref();
            (
                alleles.iter().map(|a| a.position()).collect::<Vec<_>>(),
                alleles.len() > 1
                    && alleles
                        .iter()
                        .skip(1)
                        .all(|a| a.phasing() == Phasing::Phased),
            )
        }
        Some(Some(value)) => return Err(format!("invalid genotype value {:?}", value)),
        // Missing GT counts as no-call.
        Some(None) | None => (vec![None], false),
    };
    let phase_set = match sample.get(PHASE_SET) {
        Some(Some(Value::Integer(ps))) => Some(*ps),
        _ => None,
    };

    Ok(SampleCall {
        chrom_no,
        pos,
        reference: record.reference_bases().to_string(),
        alternatives: record.alternate_bases().as_ref().to_vec(),
        alleles,
        phased,
        phase_set,
    })
}

/// Result of the diplotype extraction for one gene.
#[serde_with::serde_as]
#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub gene: String,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub diplotype: Diplotype,
    /// rsIDs of defining variants found in the sample.
    pub observed_variants: Vec<String>,
    /// rsIDs of defining positions with no-call genotypes.
    pub missing_calls: Vec<String>,
    /// rsIDs of observed variants that no called allele explains.
    pub unexplained_variants: Vec<String>,
}

impl ExtractionReport {
    /// Whether the diplotype can be used for phenotype resolution.
    pub fn is_conclusive(&self) -> bool {
        self.missing_calls.is_empty() && self.unexplained_variants.is_empty()
    }
}

/// Extract the diplotype of `gene` from the VCF `content`.
pub fn extract(
    kb: &KnowledgeBase,
    content: &[u8],
    gene: &str,
    options: &ExtractOptions,
) -> Result<ExtractionReport, AnalysisError> {
    let locus = kb
        .gene(gene)
        .ok_or_else(|| AnalysisError::UnsupportedGene(gene.to_string()))?;
    let calls = VariantCallSet::from_bytes(kb, content, options)?;
    Ok(extract_from_calls(locus, &calls))
}

/// Position of a heterozygous variant in a phase unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PhaseUnitKey {
    /// Phased calls with the given phase set.
    PhaseSet(Option<i32>),
    /// Single unphased call, by signature index.
    Unphased(usize),
}

/// Allele assigned to one haplotype.
#[derive(Debug, Clone)]
struct HaplotypeName<'a> {
    allele: &'a str,
    exact: bool,
    unexplained: BTreeSet<usize>,
}

/// Assemble the diplotype of `locus` from the calls.
pub fn extract_from_calls(locus: &GeneLocus, calls: &VariantCallSet) -> ExtractionReport {
    let chrom_no = common::chrom_no(&locus.chromosome);

    let mut observed = BTreeSet::new();
    let mut missing_calls = Vec::new();
    let mut homozygous = BTreeSet::new();
    // Heterozygous signatures with the haplotype index they are on.
    let mut units: IndexMap<PhaseUnitKey, Vec<(usize, usize)>> = IndexMap::new();

    for (sig_idx, signature) in locus.signatures.iter().enumerate() {
        let pos = signature.position[calls.genome_release] as usize;
        let candidates = chrom_no
            .map(|chrom_no| calls.calls_at(chrom_no, pos))
            .unwrap_or_default();
        // A no-call record without matching ALT still masks the position.
        let Some(call) = candidates
            .iter()
            .find(|call| {
                call.allele_index(&signature.reference, &signature.alternative)
                    .is_some()
            })
            .or_else(|| candidates.iter().find(|call| call.is_no_call()))
        else {
            continue;
        };
        if call.is_no_call() {
            missing_calls.push(signature.rsid.clone());
            continue;
        }
        let Some(allele_idx) = call.allele_index(&signature.reference, &signature.alternative)
        else {
            continue;
        };
        let carriers = call
            .alleles
            .iter()
            .map(|allele| *allele == Some(allele_idx))
            .collect::<Vec<_>>();
        match (carriers.first().copied(), carriers.get(1).copied()) {
            // Haploid calls count as homozygous.
            (Some(true), Some(true) | None) => {
                homozygous.insert(sig_idx);
            }
            (Some(true), Some(false)) | (Some(false), Some(true)) => {
                let hap_idx = if carriers[0] { 0 } else { 1 };
                let key = if call.phased {
                    PhaseUnitKey::PhaseSet(call.phase_set)
                } else {
                    PhaseUnitKey::Unphased(sig_idx)
                };
                units.entry(key).or_default().push((sig_idx, hap_idx));
            }
            _ => continue,
        }
        observed.insert(sig_idx);
    }

    if units.len() > MAX_PHASE_UNITS {
        tracing::warn!(
            "{}: {} phase units, only the first {} are phased by enumeration",
            &locus.symbol,
            units.len(),
            MAX_PHASE_UNITS
        );
    }
    let flippable = units.len().clamp(1, MAX_PHASE_UNITS) - 1;

    let mut best: Option<(bool, usize, String, Diplotype, BTreeSet<usize>)> = None;
    for mask in 0u32..(1u32 << flippable) {
        let mut haplotypes = [homozygous.clone(), homozygous.clone()];
        for (unit_idx, members) in units.values().enumerate() {
            let flipped = unit_idx > 0 && unit_idx <= flippable && (mask >> (unit_idx - 1)) & 1 == 1;
            for &(sig_idx, hap_idx) in members {
                let hap_idx = if flipped { 1 - hap_idx } else { hap_idx };
                haplotypes[hap_idx].insert(sig_idx);
            }
        }

        let [lhs, rhs] = haplotypes.map(|haplotype| name_haplotype(locus, &haplotype));
        let all_exact = lhs.exact && rhs.exact;
        let non_reference = [lhs.allele, rhs.allele]
            .iter()
            .filter(|name| **name != locus.reference_allele)
            .count();
        let diplotype = Diplotype::new(AlleleCall::single(lhs.allele), AlleleCall::single(rhs.allele));
        let display = diplotype.to_string();
        let unexplained = lhs
            .unexplained
            .union(&rhs.unexplained)
            .copied()
            .collect::<BTreeSet<_>>();

        let better = match &best {
            None => true,
            Some((best_exact, best_non_ref, best_display, _, _)) => {
                (!all_exact, non_reference, &display) < (!*best_exact, *best_non_ref, best_display)
            }
        };
        if better {
            best = Some((all_exact, non_reference, display, diplotype, unexplained));
        }
    }

    let (diplotype, unexplained) = match best {
        Some((_, _, _, diplotype, unexplained)) => (diplotype, unexplained),
        None => (Diplotype::homozygous(&locus.reference_allele), BTreeSet::new()),
    };
    let rsids = |indices: &BTreeSet<usize>| {
        indices
            .iter()
            .map(|&idx| locus.signatures[idx].rsid.clone())
            .collect::<Vec<_>>()
    };

    let report = ExtractionReport {
        gene: locus.symbol.clone(),
        diplotype,
        observed_variants: rsids(&observed),
        missing_calls,
        unexplained_variants: rsids(&unexplained),
    };
    tracing::debug!(
        "{}: diplotype {} from {} defining variants (conclusive: {})",
        &report.gene,
        &report.diplotype,
        report.observed_variants.len(),
        report.is_conclusive()
    );
    report
}

/// Name the haplotype carrying the signatures `haplotype`.
fn name_haplotype<'a>(locus: &'a GeneLocus, haplotype: &BTreeSet<usize>) -> HaplotypeName<'a> {
    if haplotype.is_empty() {
        return HaplotypeName {
            allele: &locus.reference_allele,
            exact: true,
            unexplained: BTreeSet::new(),
        };
    }
    if let Some(allele) = locus
        .callable_alleles()
        .find(|allele| allele.signatures == *haplotype)
    {
        return HaplotypeName {
            allele: &allele.name,
            exact: true,
            unexplained: BTreeSet::new(),
        };
    }

    // Fall back to the most specific allele whose signatures are all present.
    let contained = locus
        .callable_alleles()
        .filter(|allele| allele.signatures.is_subset(haplotype))
        .min_by(|a, b| {
            b.signatures
                .len()
                .cmp(&a.signatures.len())
                .then_with(|| cmp_allele_names(&a.name, &b.name))
        });
    match contained {
        Some(allele) => HaplotypeName {
            allele: &allele.name,
            exact: false,
            unexplained: haplotype.difference(&allele.signatures).copied().collect(),
        },
        None => HaplotypeName {
            allele: &locus.reference_allele,
            exact: false,
            unexplained: haplotype.clone(),
        },
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};
    use itertools::Itertools;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Build a single-sample VCF from whitespace separated records.
    pub fn vcf_with_samples(samples: &[&str], records: &[&str]) -> String {
        let mut lines = vec![
            "##fileformat=VCFv4.2".to_string(),
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">".to_string(),
            "##FORMAT=<ID=PS,Number=1,Type=Integer,Description=\"Phase set\">".to_string(),
        ];
        let mut header = vec![
            "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT",
        ];
        header.extend_from_slice(samples);
        lines.push(header.join("\t"));
        lines.extend(records.iter().map(|record| record.split_whitespace().join("\t")));
        lines.join("\n") + "\n"
    }

    pub fn vcf(records: &[&str]) -> String {
        vcf_with_samples(&["PATIENT"], records)
    }

    #[rstest::fixture]
    fn kb() -> KnowledgeBase {
        KnowledgeBase::builtin().expect("builtin knowledge base must load")
    }

    fn diplotype(
        kb: &KnowledgeBase,
        content: &str,
        gene: &str,
    ) -> Result<ExtractionReport, AnalysisError> {
        extract(kb, content.as_bytes(), gene, &ExtractOptions::default())
    }

    #[rstest::rstest]
    #[case("CYP2C19", "*1/*1")]
    #[case("CYP2C9", "*1/*1")]
    #[case("CYP2D6", "*1/*1")]
    #[case("SLCO1B1", "*1/*1")]
    #[case("TPMT", "*1/*1")]
    #[case("DPYD", "*1/*1")]
    fn no_variants_gives_reference(
        kb: KnowledgeBase,
        #[case] gene: &str,
        #[case] expected: &str,
    ) -> Result<(), anyhow::Error> {
        let report = diplotype(&kb, &vcf(&[]), gene)?;

        assert_eq!(report.diplotype.to_string(), expected);
        assert!(report.is_conclusive());
        assert!(report.observed_variants.is_empty());

        Ok(())
    }

    #[rstest::rstest]
    #[case::hom_alt(&["chr10 94781859 rs4244285 G A . PASS . GT 1/1"], "*2/*2")]
    #[case::het(&["chr10 94781859 rs4244285 G A . PASS . GT 0/1"], "*1/*2")]
    #[case::no_chr_prefix(&["10 94781859 rs4244285 G A . PASS . GT 0|1"], "*1/*2")]
    #[case::compound_het(
        &[
            "chr10 94761900 rs12248560 C T . PASS . GT 1/0",
            "chr10 94781859 rs4244285 G A . PASS . GT 0/1",
        ],
        "*2/*17"
    )]
    #[case::hom_ref(&["chr10 94781859 rs4244285 G A . PASS . GT 0/0"], "*1/*1")]
    #[case::other_alt(&["chr10 94781859 . G C . PASS . GT 1/1"], "*1/*1")]
    #[case::multi_allelic(&["chr10 94781859 . G C,A . PASS . GT 1/2"], "*1/*2")]
    fn cyp2c19(
        kb: KnowledgeBase,
        #[case] records: &[&str],
        #[case] expected: &str,
    ) -> Result<(), anyhow::Error> {
        let report = diplotype(&kb, &vcf(records), "CYP2C19")?;

        assert_eq!(report.diplotype.to_string(), expected);
        assert!(report.is_conclusive());

        Ok(())
    }

    #[rstest::rstest]
    #[case::unphased_prefers_cis(
        &[
            "chr6 18138997 rs1800460 C T . PASS . GT 0/1",
            "chr6 18130687 rs1142345 T C . PASS . GT 0/1",
        ],
        "*1/*3A"
    )]
    #[case::phased_cis(
        &[
            "chr6 18138997 rs1800460 C T . PASS . GT:PS 0|1:100",
            "chr6 18130687 rs1142345 T C . PASS . GT:PS 0|1:100",
        ],
        "*1/*3A"
    )]
    #[case::phased_trans(
        &[
            "chr6 18138997 rs1800460 C T . PASS . GT:PS 1|0:100",
            "chr6 18130687 rs1142345 T C . PASS . GT:PS 0|1:100",
        ],
        "*3B/*3C"
    )]
    #[case::separate_phase_sets(
        &[
            "chr6 18138997 rs1800460 C T . PASS . GT:PS 1|0:100",
            "chr6 18130687 rs1142345 T C . PASS . GT:PS 0|1:200",
        ],
        "*1/*3A"
    )]
    #[case::hom_and_het(
        &[
            "chr6 18138997 rs1800460 C T . PASS . GT 1/1",
            "chr6 18130687 rs1142345 T C . PASS . GT 0/1",
        ],
        "*3A/*3B"
    )]
    fn tpmt_phasing(
        kb: KnowledgeBase,
        #[case] records: &[&str],
        #[case] expected: &str,
    ) -> Result<(), anyhow::Error> {
        let report = diplotype(&kb, &vcf(records), "TPMT")?;

        assert_eq!(report.diplotype.to_string(), expected);
        assert!(report.is_conclusive());

        Ok(())
    }

    #[rstest::rstest]
    fn slco1b1_star15(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let report = diplotype(
            &kb,
            &vcf(&[
                "chr12 21176804 rs2306283 A G . PASS . GT 1/1",
                "chr12 21178615 rs4149056 T C . PASS . GT 0/1",
            ]),
            "SLCO1B1",
        )?;

        assert_eq!(report.diplotype.to_string(), "*15/*37");
        assert_eq!(report.observed_variants, vec!["rs4149056", "rs2306283"]);

        Ok(())
    }

    #[rstest::rstest]
    fn grch37_coordinates(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let content = vcf(&["chr10 96541616 rs4244285 G A . PASS . GT 1/1"]);
        let options = ExtractOptions {
            genome_release: GenomeRelease::Grch37,
            sample: None,
        };

        let report = extract(&kb, content.as_bytes(), "CYP2C19", &options)?;
        assert_eq!(report.diplotype.to_string(), "*2/*2");

        // The same file is reference-only on GRCh38.
        let report = diplotype(&kb, &content, "CYP2C19")?;
        assert_eq!(report.diplotype.to_string(), "*1/*1");

        Ok(())
    }

    #[rstest::rstest]
    fn no_call_is_inconclusive(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let report = diplotype(
            &kb,
            &vcf(&["chr10 94781859 rs4244285 G A . PASS . GT ./."]),
            "CYP2C19",
        )?;

        assert_eq!(report.diplotype.to_string(), "*1/*1");
        assert_eq!(report.missing_calls, vec!["rs4244285"]);
        assert!(!report.is_conclusive());

        Ok(())
    }

    #[rstest::rstest]
    fn unexplained_variant_is_inconclusive(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        // rs3892097 alone does not define a CYP2D6 allele.
        let report = diplotype(
            &kb,
            &vcf(&["chr22 42128945 rs3892097 C T . PASS . GT 0/1"]),
            "CYP2D6",
        )?;

        assert_eq!(report.diplotype.to_string(), "*1/*1");
        assert_eq!(report.unexplained_variants, vec!["rs3892097"]);
        assert!(!report.is_conclusive());

        Ok(())
    }

    #[rstest::rstest]
    fn cyp2d6_star4(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let report = diplotype(
            &kb,
            &vcf(&[
                "chr22 42128945 rs3892097 C T . PASS . GT 0/1",
                "chr22 42130692 rs1065852 G A . PASS . GT 1/1",
            ]),
            "CYP2D6",
        )?;

        assert_eq!(report.diplotype.to_string(), "*4/*10");
        assert!(report.is_conclusive());

        Ok(())
    }

    #[rstest::rstest]
    fn select_sample(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let content = vcf_with_samples(
            &["MOTHER", "INDEX"],
            &["chr10 94781859 rs4244285 G A . PASS . GT 0/0 1/1"],
        );

        let first = diplotype(&kb, &content, "CYP2C19")?;
        assert_eq!(first.diplotype.to_string(), "*1/*1");

        let options = ExtractOptions {
            sample: Some("INDEX".into()),
            ..Default::default()
        };
        let index = extract(&kb, content.as_bytes(), "CYP2C19", &options)?;
        assert_eq!(index.diplotype.to_string(), "*2/*2");

        let options = ExtractOptions {
            sample: Some("FATHER".into()),
            ..Default::default()
        };
        assert!(matches!(
            extract(&kb, content.as_bytes(), "CYP2C19", &options),
            Err(AnalysisError::Parse(_))
        ));

        Ok(())
    }

    #[rstest::rstest]
    fn gzip_input(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let content = vcf(&["chr10 94781859 rs4244285 G A . PASS . GT 1/1"]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes())?;
        let compressed = encoder.finish()?;

        let report = extract(&kb, &compressed, "CYP2C19", &ExtractOptions::default())?;

        assert_eq!(report.diplotype.to_string(), "*2/*2");

        Ok(())
    }

    #[rstest::rstest]
    #[case::garbage("this is not a VCF file\n")]
    #[case::no_samples(
        "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n"
    )]
    #[case::bad_position(
        "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS\n\
         chr10\tnot-a-number\t.\tG\tA\t.\tPASS\t.\tGT\t0/1\n"
    )]
    #[case::truncated_record(
        "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS\n\
         chr10\t94781859\trs4244285\tG\tA\t.\tPASS\t.\n"
    )]
    fn parse_errors(kb: KnowledgeBase, #[case] content: &str) {
        let res = diplotype(&kb, content, "CYP2C19");

        assert!(matches!(res, Err(AnalysisError::Parse(_))), "{:?}", res);
    }

    #[rstest::rstest]
    fn unsupported_gene_before_parsing(kb: KnowledgeBase) {
        let res = diplotype(&kb, "garbage", "VKORC1");

        assert_eq!(res, Err(AnalysisError::UnsupportedGene("VKORC1".into())));
    }

    #[rstest::rstest]
    fn call_set_is_reusable(kb: KnowledgeBase) -> Result<(), anyhow::Error> {
        let content = std::fs::read("tests/pgx/patient.vcf")?;
        let calls = VariantCallSet::from_bytes(&kb, &content, &ExtractOptions::default())?;

        let genes = kb
            .genes()
            .map(|locus| {
                let report = extract_from_calls(locus, &calls);
                format!("{} {}", report.gene, report.diplotype)
            })
            .collect::<Vec<_>>();

        assert_eq!(calls.sample, "PATIENT_001");
        assert_eq!(
            genes,
            vec![
                "CYP2C19 *2/*2",
                "CYP2C9 *1/*2",
                "CYP2D6 *1/*4",
                "SLCO1B1 *5/*5",
                "TPMT *1/*1",
                "DPYD *1/*1",
            ]
        );

        Ok(())
    }
}
