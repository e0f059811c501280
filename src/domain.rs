use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaxCheckError;

pub type TaxId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Four path components of the archive directory holding this assembly,
    /// e.g. `GCF_000005845.2` -> `["GCF", "000", "005", "845"]`.
    pub fn shard_components(&self) -> [&str; 4] {
        let acc = self.0.as_str();
        [&acc[0..3], &acc[4..7], &acc[7..10], &acc[10..13]]
    }

    /// Local genome file name, `<accession>.fna.gz`.
    pub fn genome_file_name(&self) -> String {
        format!("{}.fna.gz", self.0)
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = TaxCheckError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let (stem, version) = normalized
            .split_once('.')
            .ok_or_else(|| TaxCheckError::InvalidAccession(value.to_string()))?;
        let (source, digits) = stem
            .split_once('_')
            .ok_or_else(|| TaxCheckError::InvalidAccession(value.to_string()))?;
        let is_valid = source.len() == 3
            && source.chars().all(|ch| ch.is_ascii_uppercase())
            && digits.len() == 9
            && digits.chars().all(|ch| ch.is_ascii_digit())
            && !version.is_empty()
            && version.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(TaxCheckError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for Accession {
    type Error = TaxCheckError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(accession: Accession) -> Self {
        accession.0
    }
}

/// Outcome of classifying a set of ANI hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "no_hit")]
    NoHit,
    #[serde(rename = "below_threshold")]
    BelowThreshold,
    #[serde(rename = "conclusive")]
    Conclusive,
    #[serde(rename = "indistinguishable")]
    Indistinguishable,
    #[serde(rename = "inconclusive")]
    Inconclusive,
    #[serde(rename = "inconclusive,indistinguishable")]
    InconclusiveIndistinguishable,
}

impl Verdict {
    pub const ALL: [Verdict; 6] = [
        Verdict::NoHit,
        Verdict::BelowThreshold,
        Verdict::Conclusive,
        Verdict::Indistinguishable,
        Verdict::Inconclusive,
        Verdict::InconclusiveIndistinguishable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::NoHit => "no_hit",
            Verdict::BelowThreshold => "below_threshold",
            Verdict::Conclusive => "conclusive",
            Verdict::Indistinguishable => "indistinguishable",
            Verdict::Inconclusive => "inconclusive",
            Verdict::InconclusiveIndistinguishable => "inconclusive,indistinguishable",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = TaxCheckError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Verdict::ALL
            .into_iter()
            .find(|verdict| verdict.as_str() == value.trim())
            .ok_or_else(|| TaxCheckError::InvariantViolation(format!("unknown verdict {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcquisitionStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStatus::Success => write!(f, "SUCCESS"),
            AcquisitionStatus::Fail => write!(f, "FAIL"),
            AcquisitionStatus::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}
