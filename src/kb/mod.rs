//! Pharmacogenomic knowledge base: gene locus definitions and guideline rules.
//!
//! The knowledge base is loaded once, validated, and then shared read-only via
//! `Arc`.  `KnowledgeBaseStore` allows swapping in a new edition atomically:
//! a request takes one snapshot and thus sees exactly one edition.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use enum_map::{enum_map, EnumMap};
use indexmap::IndexMap;
use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::{
    common::GenomeRelease,
    pgx::{
        drug_key, gene_key, AlleleFunction, Confidence, Phenotype, PhenotypeFamily, RiskLabel,
        Severity,
    },
};

pub mod cli;
pub mod conf;

/// The edition compiled into the binary.
pub const BUILTIN_TOML: &str = include_str!("../../data/kb/cpic.toml");

/// Error type for loading knowledge bases.
#[derive(thiserror::Error, Debug)]
pub enum KbError {
    #[error("could not read knowledge base file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse knowledge base: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid knowledge base: {0}")]
    Invalid(String),
    #[error("no knowledge base file configured, running on the built-in edition")]
    NoPath,
}

/// A defining variant signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// dbSNP identifier.
    pub rsid: String,
    /// 1-based position per genome release.
    pub position: EnumMap<GenomeRelease, u32>,
    /// Reference allele.
    pub reference: String,
    /// Alternate allele.
    pub alternative: String,
}

/// A named allele of a gene.
#[derive(Debug, Clone, PartialEq)]
pub struct Allele {
    pub name: String,
    pub function: AlleleFunction,
    pub activity: Option<f64>,
    /// Indices into `GeneLocus::signatures`; all must be observed in cis.
    pub signatures: BTreeSet<usize>,
}

/// How allele functions are combined into a phenotype.
#[derive(Debug, Clone, PartialEq)]
pub enum CombinationMethod {
    /// Lookup of the pair of allele functions.
    FunctionPair,
    /// Activity score thresholds, sorted by descending `min_score`.
    ActivityScore { thresholds: Vec<(f64, Phenotype)> },
}

/// Definition of a pharmacogene.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneLocus {
    pub symbol: String,
    pub chromosome: String,
    pub reference_allele: String,
    pub family: PhenotypeFamily,
    pub method: CombinationMethod,
    pub signatures: Vec<Signature>,
    pub alleles: IndexMap<String, Allele>,
}

impl GeneLocus {
    /// Lookup allele by its name.
    pub fn allele(&self, name: &str) -> Option<&Allele> {
        self.alleles.get(name)
    }

    /// Alleles that can be called from variants, i.e., that have signatures.
    pub fn callable_alleles(&self) -> impl Iterator<Item = &Allele> {
        self.alleles
            .values()
            .filter(|allele| !allele.signatures.is_empty())
    }
}

/// Guideline entry for (gene, phenotype, drug).
#[derive(Debug, Clone, PartialEq)]
pub struct GuidelineRule {
    pub gene: String,
    /// Drug name as spelled in the knowledge base.
    pub drug: String,
    pub phenotype: Phenotype,
    pub risk_label: RiskLabel,
    pub severity: Severity,
    pub confidence: Confidence,
    pub dose_adjustment: String,
    pub monitoring: String,
    pub citation: String,
}

/// Summary of a knowledge base, e.g., for the REST API.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct KnowledgeBaseInfo {
    pub edition: String,
    pub description: Option<String>,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
    pub genes: Vec<String>,
    pub drugs: Vec<String>,
    pub rule_count: usize,
}

/// Validated, indexed knowledge base of one edition.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    edition: String,
    description: Option<String>,
    loaded_at: chrono::DateTime<chrono::Utc>,
    /// Gene loci by normalized symbol.
    genes: IndexMap<String, GeneLocus>,
    /// Rules by (gene symbol, phenotype, normalized drug name).
    rules: HashMap<(String, Phenotype, String), GuidelineRule>,
    /// Gene symbols with a guideline by normalized drug name.
    drug_genes: IndexMap<String, Vec<String>>,
    /// Drug names as spelled in the knowledge base, by normalized drug name.
    drug_names: IndexMap<String, String>,
}

impl KnowledgeBase {
    /// Load the edition compiled into the binary.
    pub fn builtin() -> Result<Self, KbError> {
        Self::from_toml_str(BUILTIN_TOML)
    }

    /// Load from the TOML file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, KbError> {
        let toml_str = std::fs::read_to_string(path.as_ref()).map_err(|source| KbError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&toml_str)
    }

    /// Parse and validate TOML.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, KbError> {
        let top: conf::Top = toml::from_str(toml_str)?;
        Self::try_from(top)
    }

    pub fn edition(&self) -> &str {
        &self.edition
    }

    pub fn gene(&self, symbol: &str) -> Option<&GeneLocus> {
        self.genes.get(&gene_key(symbol))
    }

    pub fn genes(&self) -> impl Iterator<Item = &GeneLocus> {
        self.genes.values()
    }

    /// Lookup of the rule for (gene, phenotype, drug), exact match only.
    pub fn rule(&self, gene: &str, phenotype: Phenotype, drug: &str) -> Option<&GuidelineRule> {
        self.rules
            .get(&(gene_key(gene), phenotype, drug_key(drug)))
    }

    /// All rules for the gene and drug, in phenotype order.
    pub fn rules_for<'a>(
        &'a self,
        gene: &str,
        drug: &str,
    ) -> impl Iterator<Item = &'a GuidelineRule> + 'a {
        let (gene, drug) = (gene_key(gene), drug_key(drug));
        Phenotype::iter().filter_map(move |phenotype| {
            self.rules.get(&(gene.clone(), phenotype, drug.clone()))
        })
    }

    /// Whether there is any guideline for the gene and drug.
    pub fn has_guideline(&self, gene: &str, drug: &str) -> bool {
        let gene = gene_key(gene);
        self.genes_for_drug(drug).iter().any(|symbol| *symbol == gene)
    }

    /// Genes with a guideline for `drug`, in knowledge base order.
    pub fn genes_for_drug(&self, drug: &str) -> &[String] {
        self.drug_genes
            .get(&drug_key(drug))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn info(&self) -> KnowledgeBaseInfo {
        KnowledgeBaseInfo {
            edition: self.edition.clone(),
            description: self.description.clone(),
            loaded_at: self.loaded_at,
            genes: self.genes.keys().cloned().collect(),
            drugs: self.drug_names.values().cloned().collect(),
            rule_count: self.rules.len(),
        }
    }
}

/// Convert a gene definition, checking its internal consistency.
fn convert_gene(gene: conf::GeneDef) -> Result<GeneLocus, KbError> {
    let symbol = gene_key(&gene.symbol);
    let invalid = |msg: String| KbError::Invalid(format!("gene {}: {}", &symbol, msg));

    if let Some(rsid) = gene.variants.iter().map(|v| &v.rsid).duplicates().next() {
        return Err(invalid(format!("duplicate variant {}", rsid)));
    }
    let signatures = gene
        .variants
        .iter()
        .map(|v| Signature {
            rsid: v.rsid.clone(),
            position: enum_map! {
                GenomeRelease::Grch37 => v.pos_37,
                GenomeRelease::Grch38 => v.pos_38,
            },
            reference: v.reference.clone(),
            alternative: v.alternative.clone(),
        })
        .collect::<Vec<_>>();
    let signature_idx = signatures
        .iter()
        .enumerate()
        .map(|(i, s)| (s.rsid.as_str(), i))
        .collect::<HashMap<_, _>>();

    let method = match gene.method {
        conf::Method::FunctionPair => CombinationMethod::FunctionPair,
        conf::Method::ActivityScore => {
            if gene.thresholds.is_empty() {
                return Err(invalid("activity score method without thresholds".into()));
            }
            let thresholds = gene
                .thresholds
                .iter()
                .map(|t| (t.min_score, t.phenotype))
                .sorted_by(|a, b| b.0.total_cmp(&a.0))
                .collect::<Vec<_>>();
            if let Some((_, phenotype)) = thresholds
                .iter()
                .find(|(_, p)| p.family() != Some(gene.family))
            {
                return Err(invalid(format!(
                    "threshold phenotype {} not in family {}",
                    phenotype, gene.family
                )));
            }
            CombinationMethod::ActivityScore { thresholds }
        }
    };

    let mut alleles: IndexMap<String, Allele> = IndexMap::new();
    for allele in gene.alleles {
        if alleles.contains_key(&allele.name) {
            return Err(invalid(format!("duplicate allele {}", allele.name)));
        }
        if matches!(method, CombinationMethod::ActivityScore { .. }) && allele.activity.is_none()
        {
            return Err(invalid(format!("allele {} lacks activity value", allele.name)));
        }
        let signatures = allele
            .variants
            .iter()
            .map(|rsid| {
                signature_idx
                    .get(rsid.as_str())
                    .copied()
                    .ok_or_else(|| invalid(format!("allele {} uses unknown variant {}", allele.name, rsid)))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        alleles.insert(
            allele.name.clone(),
            Allele {
                name: allele.name,
                function: allele.function,
                activity: allele.activity,
                signatures,
            },
        );
    }

    match alleles.get(&gene.reference_allele) {
        None => {
            return Err(invalid(format!(
                "reference allele {} is not defined",
                gene.reference_allele
            )))
        }
        Some(reference) if !reference.signatures.is_empty() => {
            return Err(invalid(format!(
                "reference allele {} must not have defining variants",
                gene.reference_allele
            )))
        }
        Some(_) => (),
    }
    if let Some(signature_sets) = alleles
        .values()
        .filter(|a| !a.signatures.is_empty())
        .map(|a| &a.signatures)
        .duplicates()
        .next()
    {
        return Err(invalid(format!(
            "two alleles share the defining variants {:?}",
            signature_sets
        )));
    }

    Ok(GeneLocus {
        symbol,
        chromosome: gene.chromosome,
        reference_allele: gene.reference_allele,
        family: gene.family,
        method,
        signatures,
        alleles,
    })
}

impl TryFrom<conf::Top> for KnowledgeBase {
    type Error = KbError;

    fn try_from(top: conf::Top) -> Result<Self, Self::Error> {
        let mut genes = IndexMap::new();
        for gene in top.genes {
            let locus = convert_gene(gene)?;
            if genes.contains_key(&locus.symbol) {
                return Err(KbError::Invalid(format!("duplicate gene {}", &locus.symbol)));
            }
            genes.insert(locus.symbol.clone(), locus);
        }

        let mut rules = HashMap::new();
        let mut drug_genes: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut drug_names = IndexMap::new();
        for guideline in top.guidelines {
            let gene = gene_key(&guideline.gene);
            let locus = genes.get(&gene).ok_or_else(|| {
                KbError::Invalid(format!(
                    "guideline for {} refers to unknown gene {}",
                    &guideline.drug, &gene
                ))
            })?;
            let drug = drug_key(&guideline.drug);
            for rec in guideline.recommendations {
                if rec.phenotype.family() != Some(locus.family) {
                    return Err(KbError::Invalid(format!(
                        "guideline {}/{}: phenotype {} not in family {}",
                        &guideline.drug, &gene, rec.phenotype, locus.family
                    )));
                }
                let key = (gene.clone(), rec.phenotype, drug.clone());
                if rules.contains_key(&key) {
                    return Err(KbError::Invalid(format!(
                        "guideline {}/{}: duplicate recommendation for {}",
                        &guideline.drug, &gene, rec.phenotype
                    )));
                }
                rules.insert(
                    key,
                    GuidelineRule {
                        gene: gene.clone(),
                        drug: guideline.drug.clone(),
                        phenotype: rec.phenotype,
                        risk_label: rec.risk_label,
                        severity: rec.severity,
                        confidence: rec.confidence_score,
                        dose_adjustment: rec.dose_adjustment,
                        monitoring: rec.monitoring,
                        citation: guideline.citation.clone(),
                    },
                );
            }
            let entry = drug_genes.entry(drug.clone()).or_default();
            if !entry.contains(&gene) {
                entry.push(gene);
            }
            drug_names.entry(drug).or_insert(guideline.drug);
        }

        Ok(KnowledgeBase {
            edition: top.edition,
            description: top.description,
            loaded_at: chrono::Utc::now(),
            genes,
            rules,
            drug_genes,
            drug_names,
        })
    }
}

/// Process-wide holder of the current knowledge base edition.
#[derive(Debug)]
pub struct KnowledgeBaseStore {
    current: RwLock<Arc<KnowledgeBase>>,
    /// File to re-read on `reload`, if any.
    path: Option<PathBuf>,
}

impl KnowledgeBaseStore {
    pub fn new(kb: KnowledgeBase, path: Option<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(kb)),
            path,
        }
    }

    /// Open from `path` or fall back to the built-in edition.
    pub fn open(path: Option<PathBuf>) -> Result<Self, KbError> {
        let kb = match &path {
            Some(path) => KnowledgeBase::from_path(path)?,
            None => KnowledgeBase::builtin()?,
        };
        tracing::info!(
            "knowledge base edition {} with {} genes",
            kb.edition(),
            kb.genes.len()
        );
        Ok(Self::new(kb, path))
    }

    /// The current edition; hold on to it for the duration of a request.
    pub fn snapshot(&self) -> Arc<KnowledgeBase> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in `kb`, returning the previous edition.
    pub fn replace(&self, kb: KnowledgeBase) -> Arc<KnowledgeBase> {
        self.swap(Arc::new(kb))
    }

    fn swap(&self, kb: Arc<KnowledgeBase>) -> Arc<KnowledgeBase> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, kb)
    }

    /// Re-read the configured file and swap it in; keeps the old edition on error.
    ///
    /// Returns the edition read by this call, even if another reload has
    /// replaced it in the meantime.
    pub fn reload(&self) -> Result<Arc<KnowledgeBase>, KbError> {
        let path = self.path.as_ref().ok_or(KbError::NoPath)?;
        let kb = Arc::new(KnowledgeBase::from_path(path)?);
        let previous = self.swap(kb.clone());
        tracing::info!(
            "replaced knowledge base edition {} by {}",
            previous.edition(),
            kb.edition()
        );
        Ok(kb)
    }
}
