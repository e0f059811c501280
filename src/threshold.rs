use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::TaxId;
use crate::error::TaxCheckError;
use crate::groups::reference_parse;

#[derive(Debug, Deserialize)]
struct ThresholdRow {
    species_taxid: TaxId,
    _species_name: String,
    ani_threshold: f64,
}

/// Species-specific ANI acceptance thresholds with a global fallback.
#[derive(Debug, Clone)]
pub struct ThresholdResolver {
    default: f64,
    by_species: HashMap<TaxId, f64>,
}

impl ThresholdResolver {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            by_species: HashMap::new(),
        }
    }

    /// Loads `species_taxid, species_name, threshold` rows. An absent file is
    /// tolerated: every species then uses `default`.
    pub fn load(path: &Path, default: f64) -> Result<Self, TaxCheckError> {
        if !path.exists() {
            warn!(
                "species-specific threshold file {} not found; using {default} for every species",
                path.display()
            );
            return Ok(Self::new(default));
        }
        let file = File::open(path).map_err(|err| {
            TaxCheckError::Configuration(format!("open {}: {err}", path.display()))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut resolver = Self::new(default);
        for record in reader.deserialize::<ThresholdRow>() {
            let row = record.map_err(|err| reference_parse(path, &err))?;
            resolver.insert(row.species_taxid, row.ani_threshold);
        }
        info!(
            "loaded {} species-specific ANI thresholds from {}",
            resolver.by_species.len(),
            path.display()
        );
        Ok(resolver)
    }

    pub fn insert(&mut self, species_taxid: TaxId, threshold: f64) {
        self.by_species.insert(species_taxid, threshold);
    }

    pub fn get(&self, species_taxid: TaxId) -> f64 {
        self.by_species
            .get(&species_taxid)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_threshold(&self) -> f64 {
        self.default
    }
}
