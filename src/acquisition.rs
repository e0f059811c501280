use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::thread;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::archive::ArchiveClient;
use crate::domain::{Accession, AcquisitionStatus};
use crate::error::TaxCheckError;
use crate::fetcher::{AcquisitionOutcome, ChecksumFetcher};
use crate::fs_util;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionSummary {
    pub requested: usize,
    pub already_present: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_found: usize,
    pub outcomes: Vec<AcquisitionOutcome>,
}

impl AcquisitionSummary {
    fn record(&mut self, outcome: AcquisitionOutcome) {
        match outcome.status {
            AcquisitionStatus::Success => self.succeeded += 1,
            AcquisitionStatus::Fail => self.failed += 1,
            AcquisitionStatus::NotFound => self.not_found += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.not_found == 0
    }
}

/// Fans a batch of accessions out over a fixed number of worker threads,
/// one contiguous shard per worker, processed in order within the shard.
pub struct AcquisitionCoordinator<'a, A: ArchiveClient + ?Sized> {
    client: &'a A,
    base_url: &'a str,
    policy: RetryPolicy,
    workers: usize,
}

impl<'a, A: ArchiveClient + ?Sized> AcquisitionCoordinator<'a, A> {
    pub fn new(client: &'a A, base_url: &'a str, policy: RetryPolicy, workers: usize) -> Self {
        Self {
            client,
            base_url,
            policy,
            workers: workers.max(1),
        }
    }

    pub fn run(
        &self,
        accessions: &[Accession],
        dest_dir: &Path,
    ) -> Result<AcquisitionSummary, TaxCheckError> {
        fs::create_dir_all(dest_dir).map_err(|err| {
            TaxCheckError::Filesystem(format!("create {}: {err}", dest_dir.display()))
        })?;

        let unique = dedup(accessions);
        let mut summary = AcquisitionSummary {
            requested: unique.len(),
            ..AcquisitionSummary::default()
        };

        let pending: Vec<Accession> = unique
            .into_iter()
            .filter(|acc| {
                let present = fs_util::is_complete_gzip(&dest_dir.join(acc.genome_file_name()));
                if present {
                    debug!("{acc} already present in {}", dest_dir.display());
                }
                !present
            })
            .collect();
        summary.already_present = summary.requested - pending.len();

        let shards = partition(&pending, self.workers);
        info!(
            "downloading {} genomes to {} with {} workers",
            pending.len(),
            dest_dir.display(),
            shards.len()
        );

        let shard_results: Vec<Vec<AcquisitionOutcome>> = thread::scope(|scope| {
            let handles: Vec<_> = shards
                .iter()
                .map(|shard| (shard, scope.spawn(move || self.run_shard(shard, dest_dir))))
                .collect();

            handles
                .into_iter()
                .map(|(shard, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        error!("download worker panicked; marking {} accessions failed", shard.len());
                        shard
                            .iter()
                            .map(|acc| AcquisitionOutcome {
                                accession: acc.clone(),
                                status: AcquisitionStatus::Fail,
                                local_path: None,
                                remote_path: None,
                                attempts: 0,
                            })
                            .collect()
                    })
                })
                .collect()
        });

        for outcome in shard_results.into_iter().flatten() {
            summary.record(outcome);
        }
        info!(
            "retrieved {} of {} genomes ({} failed, {} not found, {} already present)",
            summary.succeeded,
            pending.len(),
            summary.failed,
            summary.not_found,
            summary.already_present
        );
        Ok(summary)
    }

    fn run_shard(&self, shard: &[Accession], dest_dir: &Path) -> Vec<AcquisitionOutcome> {
        let fetcher = ChecksumFetcher::new(self.client, self.base_url, self.policy);
        shard
            .iter()
            .map(|acc| {
                let outcome = fetcher.fetch(acc, dest_dir);
                info!("{}", outcome.log_line());
                outcome
            })
            .collect()
    }
}

fn dedup(accessions: &[Accession]) -> Vec<Accession> {
    let mut seen = HashSet::new();
    accessions
        .iter()
        .filter(|acc| seen.insert(acc.as_str()))
        .cloned()
        .collect()
}

/// Splits `items` into at most `n` contiguous, non-empty shards whose sizes
/// differ by at most one.
pub fn partition<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    let n = n.max(1).min(items.len());
    if n == 0 {
        return Vec::new();
    }
    let base = items.len() / n;
    let extra = items.len() % n;
    let mut shards = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        shards.push(items[start..start + len].to_vec());
        start += len;
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_keeps_order_and_balances() {
        let items: Vec<u32> = (0..10).collect();
        let shards = partition(&items, 3);
        assert_eq!(shards, vec![vec![0, 1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
    }

    #[test]
    fn partition_never_creates_empty_shards() {
        let items = vec!["a", "b"];
        assert_eq!(partition(&items, 8), vec![vec!["a"], vec!["b"]]);
        assert!(partition::<u8>(&[], 4).is_empty());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let accs: Vec<Accession> = ["GCF_000000001.1", "GCF_000000002.1", "GCF_000000001.1"]
            .iter()
            .map(|value| value.parse().unwrap())
            .collect();
        let unique = dedup(&accs);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].as_str(), "GCF_000000001.1");
    }
}
