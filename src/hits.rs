use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{Accession, TaxId, Verdict};
use crate::error::TaxCheckError;
use crate::fs_util;
use crate::groups::reference_parse;
use crate::reference::ReferenceStore;
use crate::threshold::ThresholdResolver;

/// One row of a whole-genome comparison (skani `search`/`dist` layout).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimilarityRecord {
    #[serde(rename = "Ref_file")]
    pub ref_file: PathBuf,
    #[serde(rename = "ANI")]
    pub ani: f64,
    #[serde(rename = "Align_fraction_ref")]
    pub align_fraction_ref: f64,
    #[serde(rename = "Align_fraction_query")]
    pub align_fraction_query: f64,
}

pub fn read_similarity_table(path: &Path) -> Result<Vec<SimilarityRecord>, TaxCheckError> {
    let file = File::open(path)
        .map_err(|err| TaxCheckError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    reader
        .deserialize::<SimilarityRecord>()
        .map(|record| record.map_err(|err| reference_parse(path, &err)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredHit {
    pub organism_name: String,
    pub strain: String,
    pub accession: Accession,
    pub taxid: TaxId,
    pub species_taxid: TaxId,
    pub relation_to_type: String,
    pub validated: bool,
    pub ani: f64,
    pub align_fraction_ref: f64,
    pub align_fraction_query: f64,
    pub ani_threshold: f64,
    pub status: Option<Verdict>,
}

impl ScoredHit {
    pub fn is_accepted(&self) -> bool {
        self.ani >= self.ani_threshold
    }
}

/// Joins raw similarity rows with reference metadata and species thresholds.
/// Rows are returned by descending ANI. A row whose reference has no
/// metadata record is an error: its species cannot be classified.
pub fn resolve_hits<R: ReferenceStore + ?Sized>(
    records: &[SimilarityRecord],
    references: &R,
    thresholds: &ThresholdResolver,
) -> Result<Vec<ScoredHit>, TaxCheckError> {
    let mut hits = records
        .iter()
        .map(|record| {
            let accession = fs_util::accession_from_path(&record.ref_file)?;
            let reference = references
                .get(&accession)
                .ok_or_else(|| TaxCheckError::UnknownReference(accession.to_string()))?;
            let ani_threshold = thresholds.get(reference.species_taxid);
            debug!(
                "{accession} {} ANI={} threshold={ani_threshold}",
                reference.organism_name, record.ani
            );
            Ok(ScoredHit {
                organism_name: reference.organism_name,
                strain: dash_if_empty(reference.infraspecific_name),
                accession,
                taxid: reference.taxid,
                species_taxid: reference.species_taxid,
                relation_to_type: dash_if_empty(reference.relation_to_type_material),
                validated: reference.is_valid,
                ani: record.ani,
                align_fraction_ref: record.align_fraction_ref,
                align_fraction_query: record.align_fraction_query,
                ani_threshold,
                status: None,
            })
        })
        .collect::<Result<Vec<_>, TaxCheckError>>()?;

    hits.sort_by(|a, b| b.ani.total_cmp(&a.ani));
    let accepted = hits.iter().filter(|hit| hit.is_accepted()).count();
    info!(
        "found {} ANI hits ({} at or above the species threshold)",
        hits.len(),
        accepted
    );
    Ok(hits)
}

fn dash_if_empty(value: String) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        value
    }
}
