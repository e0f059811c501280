use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::TaxId;
use crate::error::TaxCheckError;

pub type GroupId = u32;

/// Species that whole-genome ANI cannot tell apart, following NCBI's
/// `prokaryote_ANI_indistinguishable_groups.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndistinguishableSpecies {
    pub group_id: GroupId,
    pub taxid: TaxId,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndistinguishableGroupIndex {
    by_taxid: HashMap<TaxId, GroupId>,
    groups: HashMap<GroupId, BTreeMap<TaxId, String>>,
}

impl IndistinguishableGroupIndex {
    /// Loads the tab-separated `group_id, taxid, name` table. A missing file
    /// is a configuration error: classification cannot run without it.
    pub fn load(path: &Path) -> Result<Self, TaxCheckError> {
        let file = File::open(path).map_err(|err| {
            TaxCheckError::Configuration(format!(
                "indistinguishable groups file {} is not readable: {err}",
                path.display()
            ))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut entries = Vec::new();
        for record in reader.deserialize::<IndistinguishableSpecies>() {
            let species = record.map_err(|err| reference_parse(path, &err))?;
            entries.push(species);
        }
        let index = Self::from_entries(entries);
        info!(
            "loaded {} indistinguishable groups ({} species) from {}",
            index.groups.len(),
            index.by_taxid.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = IndistinguishableSpecies>,
    {
        let mut index = Self::default();
        for species in entries {
            if let Some(previous) = index.by_taxid.insert(species.taxid, species.group_id) {
                if previous != species.group_id {
                    warn!(
                        "taxid {} is listed in indistinguishable groups {previous} and {}; keeping {}",
                        species.taxid, species.group_id, species.group_id
                    );
                    if let Some(members) = index.groups.get_mut(&previous) {
                        members.remove(&species.taxid);
                        if members.is_empty() {
                            index.groups.remove(&previous);
                        }
                    }
                }
            }
            index
                .groups
                .entry(species.group_id)
                .or_default()
                .insert(species.taxid, species.name);
        }
        index
    }

    pub fn group_of(&self, taxid: TaxId) -> Option<GroupId> {
        self.by_taxid.get(&taxid).copied()
    }

    pub fn members(&self, group_id: GroupId) -> Option<&BTreeMap<TaxId, String>> {
        self.groups.get(&group_id)
    }

    /// Every species sharing a group with `taxid` (itself included), or an
    /// empty map when `taxid` belongs to no group.
    pub fn get(&self, taxid: TaxId) -> BTreeMap<TaxId, String> {
        self.group_of(taxid)
            .and_then(|group_id| self.members(group_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub(crate) fn reference_parse(path: &Path, err: &csv::Error) -> TaxCheckError {
    let line = err.position().map(|pos| pos.line()).unwrap_or(0);
    TaxCheckError::ReferenceParse {
        path: path.display().to_string(),
        line,
        message: err.to_string(),
    }
}
