//! Diplotypes in star-allele notation, e.g., `*1/*2` or `*1/*1xN`.

use std::{cmp::Ordering, fmt, str::FromStr};

/// Number of copies of an allele on a haplotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyNumber {
    /// Explicit number of copies, `1` when not given.
    Exact(u32),
    /// The `xN` notation: duplicated, number of copies not resolved.
    Multiple,
}

impl CopyNumber {
    /// Number of copies to use in computations; `xN` counts as two.
    pub fn effective(&self) -> u32 {
        match self {
            CopyNumber::Exact(n) => *n,
            CopyNumber::Multiple => 2,
        }
    }
}

impl Default for CopyNumber {
    fn default() -> Self {
        CopyNumber::Exact(1)
    }
}

/// One named allele with its copy number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlleleCall {
    /// Allele name, e.g., `*2`.
    pub name: String,
    /// Copy number.
    pub copies: CopyNumber,
}

impl AlleleCall {
    /// Single-copy call of the allele `name`.
    pub fn single(name: &str) -> Self {
        Self {
            name: name.to_string(),
            copies: CopyNumber::default(),
        }
    }
}

impl fmt::Display for AlleleCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.copies {
            CopyNumber::Exact(1) => write!(f, "{}", self.name),
            CopyNumber::Exact(n) => write!(f, "{}x{}", self.name, n),
            CopyNumber::Multiple => write!(f, "{}xN", self.name),
        }
    }
}

/// Error type for parsing diplotypes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiplotypeError {
    #[error("diplotype {0:?} does not consist of two alleles separated by '/'")]
    NotAPair(String),
    #[error("empty allele name in {0:?}")]
    EmptyAllele(String),
    #[error("invalid copy number in {0:?}")]
    InvalidCopyNumber(String),
}

impl FromStr for AlleleCall {
    type Err = DiplotypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(DiplotypeError::EmptyAllele(s.to_string()));
        }
        let (name, copies) = match s.rsplit_once('x') {
            Some((name, "N")) => (name, CopyNumber::Multiple),
            Some((name, count)) if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) => {
                let count = count
                    .parse::<u32>()
                    .map_err(|_| DiplotypeError::InvalidCopyNumber(s.to_string()))?;
                if count == 0 {
                    return Err(DiplotypeError::InvalidCopyNumber(s.to_string()));
                }
                (name, CopyNumber::Exact(count))
            }
            _ => (s, CopyNumber::default()),
        };
        if name.is_empty() {
            return Err(DiplotypeError::EmptyAllele(s.to_string()));
        }
        Ok(AlleleCall {
            name: name.to_string(),
            copies,
        })
    }
}

/// Natural ordering of allele names: `*2 < *3A < *17`, names without number last.
pub fn cmp_allele_names(lhs: &str, rhs: &str) -> Ordering {
    fn sort_key(name: &str) -> (u32, &str) {
        let stripped = name.trim_start_matches('*');
        let digits = stripped
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(stripped.len());
        match stripped[..digits].parse::<u32>() {
            Ok(number) => (number, &stripped[digits..]),
            Err(_) => (u32::MAX, stripped),
        }
    }
    sort_key(lhs).cmp(&sort_key(rhs)).then_with(|| lhs.cmp(rhs))
}

/// Unordered pair of allele calls for one gene.
///
/// The pair is stored in natural order so that `*17/*2` and `*2/*17` are the
/// same diplotype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diplotype {
    first: AlleleCall,
    second: AlleleCall,
}

impl Diplotype {
    pub fn new(lhs: AlleleCall, rhs: AlleleCall) -> Self {
        let ordering = cmp_allele_names(&lhs.name, &rhs.name)
            .then_with(|| lhs.copies.effective().cmp(&rhs.copies.effective()));
        if ordering == Ordering::Greater {
            Self {
                first: rhs,
                second: lhs,
            }
        } else {
            Self {
                first: lhs,
                second: rhs,
            }
        }
    }

    /// Homozygous single-copy diplotype, e.g., `*1/*1`.
    pub fn homozygous(name: &str) -> Self {
        Self::new(AlleleCall::single(name), AlleleCall::single(name))
    }

    pub fn alleles(&self) -> [&AlleleCall; 2] {
        [&self.first, &self.second]
    }

    /// Whether any allele carries a copy number other than one.
    pub fn has_copy_number_variation(&self) -> bool {
        self.alleles()
            .iter()
            .any(|allele| allele.copies != CopyNumber::Exact(1))
    }
}

impl fmt::Display for Diplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

impl FromStr for Diplotype {
    type Err = DiplotypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split('/');
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(lhs), Some(rhs), None) => Ok(Diplotype::new(lhs.parse()?, rhs.parse()?)),
            _ => Err(DiplotypeError::NotAPair(s.to_string())),
        }
    }
}
