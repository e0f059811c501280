use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::domain::{Accession, TaxId};
use crate::error::TaxCheckError;
use crate::groups::reference_parse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub accession: Accession,
    pub taxid: TaxId,
    pub species_taxid: TaxId,
    pub organism_name: String,
    #[serde(default)]
    pub species_name: String,
    #[serde(default)]
    pub infraspecific_name: String,
    #[serde(default)]
    pub relation_to_type_material: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub is_valid: bool,
}

/// Read-only metadata of the accepted reference genomes.
pub trait ReferenceStore: Send + Sync {
    fn get(&self, accession: &Accession) -> Option<ReferenceRecord>;
}

/// Reference metadata loaded from a `reference_summary.tsv` export.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    records: HashMap<Accession, ReferenceRecord>,
}

impl ReferenceTable {
    pub fn load(path: &Path) -> Result<Self, TaxCheckError> {
        let file = File::open(path).map_err(|err| {
            TaxCheckError::Configuration(format!(
                "reference table {} is not readable: {err}",
                path.display()
            ))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut table = Self::default();
        for record in reader.deserialize::<ReferenceRecord>() {
            let record = record.map_err(|err| reference_parse(path, &err))?;
            table.insert(record);
        }
        info!(
            "loaded {} reference records from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn insert(&mut self, record: ReferenceRecord) {
        self.records.insert(record.accession.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<ReferenceRecord> for ReferenceTable {
    fn from_iter<I: IntoIterator<Item = ReferenceRecord>>(iter: I) -> Self {
        let mut table = Self::default();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

impl ReferenceStore for ReferenceTable {
    fn get(&self, accession: &Accession) -> Option<ReferenceRecord> {
        self.records.get(accession).cloned()
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean flag: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn load_reference_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference_summary.tsv");
        fs::write(
            &path,
            "accession\ttaxid\tspecies_taxid\torganism_name\tspecies_name\tinfraspecific_name\trelation_to_type_material\tis_valid\n\
             GCF_000005845.2\t511145\t562\tEscherichia coli str. K-12 substr. MG1655\tEscherichia coli\tstrain=K-12\t\tTRUE\n\
             GCA_000008865.2\t386585\t562\tEscherichia coli O157:H7 str. Sakai\tEscherichia coli\tstrain=Sakai\ttype strain\tFALSE\n",
        )
        .unwrap();

        let table = ReferenceTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);

        let acc: Accession = "GCF_000005845.2".parse().unwrap();
        let record = table.get(&acc).unwrap();
        assert_eq!(record.species_taxid, 562);
        assert!(record.is_valid);
        assert_eq!(record.relation_to_type_material, "");

        let acc: Accession = "GCA_000008865.2".parse().unwrap();
        assert!(!table.get(&acc).unwrap().is_valid);
    }
}
