use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::classify::Classification;
use crate::domain::Verdict;
use crate::error::TaxCheckError;
use crate::hits::ScoredHit;

pub const TC_RESULT_HEADER: [&str; 12] = [
    "organism_name",
    "strain",
    "accession",
    "taxid",
    "species_taxid",
    "relation_to_type",
    "validated",
    "ani",
    "align_fraction_ref",
    "align_fraction_query",
    "ani_threshold",
    "status",
];

fn row(hit: &ScoredHit) -> Result<[String; 12], TaxCheckError> {
    let status = hit.status.ok_or_else(|| {
        TaxCheckError::InvariantViolation(format!("hit {} has no status", hit.accession))
    })?;
    Ok([
        hit.organism_name.clone(),
        hit.strain.clone(),
        hit.accession.to_string(),
        hit.taxid.to_string(),
        hit.species_taxid.to_string(),
        hit.relation_to_type.clone(),
        if hit.validated { "TRUE" } else { "FALSE" }.to_string(),
        hit.ani.to_string(),
        hit.align_fraction_ref.to_string(),
        hit.align_fraction_query.to_string(),
        hit.ani_threshold.to_string(),
        status.to_string(),
    ])
}

/// Writes the tab-separated result table. Every hit must carry a status.
pub fn write_tsv<W: Write>(hits: &[ScoredHit], writer: W) -> Result<(), TaxCheckError> {
    let mut tsv = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);
    tsv.write_record(TC_RESULT_HEADER)
        .map_err(|err| TaxCheckError::Filesystem(err.to_string()))?;
    for hit in hits {
        tsv.write_record(row(hit)?)
            .map_err(|err| TaxCheckError::Filesystem(err.to_string()))?;
    }
    tsv.flush()
        .map_err(|err| TaxCheckError::Filesystem(err.to_string()))
}

pub fn write_tsv_file(hits: &[ScoredHit], path: &Path) -> Result<(), TaxCheckError> {
    let file = File::create(path)
        .map_err(|err| TaxCheckError::Filesystem(format!("create {}: {err}", path.display())))?;
    write_tsv(hits, file)
}

pub fn render_tsv(hits: &[ScoredHit]) -> Result<String, TaxCheckError> {
    let mut buffer = Vec::new();
    write_tsv(hits, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| TaxCheckError::Filesystem(err.to_string()))
}

#[derive(Debug, Serialize)]
pub struct TaxonomyCheckReport<'a> {
    pub status: Verdict,
    pub generated_at: String,
    pub tc_result: &'a [ScoredHit],
}

impl<'a> TaxonomyCheckReport<'a> {
    pub fn new(classification: &'a Classification) -> Self {
        Self {
            status: classification.verdict,
            generated_at: chrono::Utc::now().to_rfc3339(),
            tc_result: &classification.hits,
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn write_report(report: &TaxonomyCheckReport<'_>, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
