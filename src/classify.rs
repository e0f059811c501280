use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{TaxId, Verdict};
use crate::groups::{GroupId, IndistinguishableGroupIndex};
use crate::hits::ScoredHit;

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub verdict: Verdict,
    pub hits: Vec<ScoredHit>,
}

/// Turns a set of scored ANI hits into a single verdict.
///
/// Hits at or above their species threshold are *accepted*. One accepted
/// species is conclusive. Several accepted species are indistinguishable
/// only when they all sit in the same indistinguishable group; if their
/// group memberships disagree (including a species with no group next to one
/// with a group) the result is `inconclusive,indistinguishable`.
pub struct ClassificationEngine<'a> {
    groups: &'a IndistinguishableGroupIndex,
}

impl<'a> ClassificationEngine<'a> {
    pub fn new(groups: &'a IndistinguishableGroupIndex) -> Self {
        Self { groups }
    }

    pub fn classify(&self, mut hits: Vec<ScoredHit>) -> Classification {
        let verdict = self.verdict(&hits);
        for hit in &mut hits {
            hit.status = Some(if hit.is_accepted() {
                verdict
            } else {
                Verdict::BelowThreshold
            });
        }
        Classification { verdict, hits }
    }

    fn verdict(&self, hits: &[ScoredHit]) -> Verdict {
        let accepted: BTreeSet<TaxId> = hits
            .iter()
            .filter(|hit| hit.is_accepted())
            .map(|hit| hit.species_taxid)
            .collect();
        debug!("species taxids of accepted ANI hits: {accepted:?}");

        if accepted.is_empty() {
            return if hits.is_empty() {
                Verdict::NoHit
            } else {
                Verdict::BelowThreshold
            };
        }

        let memberships: Vec<(TaxId, Option<GroupId>)> = accepted
            .iter()
            .map(|&taxid| (taxid, self.groups.group_of(taxid)))
            .collect();
        let shared = memberships[0].1;
        if let Some(&(taxid, other)) = memberships.iter().find(|(_, group)| *group != shared) {
            warn!(
                "accepted ANI hits span more than one indistinguishable group; classified as '{}'. [{}] vs [{}]",
                Verdict::InconclusiveIndistinguishable,
                self.describe(memberships[0].0, shared),
                self.describe(taxid, other)
            );
            return Verdict::InconclusiveIndistinguishable;
        }

        let group_taxids: BTreeSet<TaxId> = match shared {
            Some(group_id) => {
                let members = self.groups.members(group_id);
                if let Some(members) = members {
                    let names = members
                        .iter()
                        .map(|(taxid, name)| format!("{name}({taxid})"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    warn!("following organisms are indistinguishable with ANI. [{names}]");
                }
                members
                    .map(|members| members.keys().copied().collect())
                    .unwrap_or_default()
            }
            None => BTreeSet::new(),
        };

        if accepted.len() == 1 {
            Verdict::Conclusive
        } else if accepted.is_subset(&group_taxids) {
            Verdict::Indistinguishable
        } else {
            Verdict::Inconclusive
        }
    }

    fn describe(&self, taxid: TaxId, group: Option<GroupId>) -> String {
        match group.and_then(|group_id| self.groups.members(group_id).map(|m| (group_id, m))) {
            Some((group_id, members)) => {
                let taxids = members
                    .keys()
                    .map(|taxid| taxid.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("group {group_id}: {taxids}")
            }
            None => format!("taxid {taxid}: no group"),
        }
    }
}
