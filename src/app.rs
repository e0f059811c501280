use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::acquisition::{AcquisitionCoordinator, AcquisitionSummary};
use crate::archive::ArchiveClient;
use crate::classify::{Classification, ClassificationEngine};
use crate::config::{ResolvedConfig, TC_RESULT_FILE, TC_RESULT_JSON_FILE};
use crate::domain::Accession;
use crate::error::TaxCheckError;
use crate::fs_util;
use crate::groups::IndistinguishableGroupIndex;
use crate::hits::{self, SimilarityRecord};
use crate::output::{self, JsonOutput, TaxonomyCheckReport};
use crate::reference::{ReferenceStore, ReferenceTable};
use crate::retry::RetryPolicy;
use crate::threshold::ThresholdResolver;

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceCheck {
    pub total: usize,
    pub missing: Vec<Accession>,
    pub acquisitions: Vec<AcquisitionSummary>,
    /// Listed paths that are still absent or truncated after acquisition.
    pub unresolved: Vec<PathBuf>,
}

impl ReferenceCheck {
    pub fn still_missing(&self) -> usize {
        self.unresolved.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub classification: Classification,
    pub tsv_path: PathBuf,
    pub json_path: Option<PathBuf>,
}

/// Reference data and collaborators for one process, built once at start-up
/// and shared by every operation.
pub struct App<A: ArchiveClient, R: ReferenceStore> {
    config: ResolvedConfig,
    archive: A,
    references: R,
    groups: IndistinguishableGroupIndex,
    thresholds: ThresholdResolver,
}

impl<A: ArchiveClient> App<A, ReferenceTable> {
    /// Loads every reference file named by `config`. Missing group or
    /// reference tables fail here rather than mid-classification.
    pub fn load(config: ResolvedConfig, archive: A) -> Result<Self, TaxCheckError> {
        let groups =
            IndistinguishableGroupIndex::load(config.indistinguishable_groups_file.as_std_path())?;
        let thresholds = ThresholdResolver::load(
            config.species_threshold_file.as_std_path(),
            config.ani_threshold,
        )?;
        let references = ReferenceTable::load(config.reference_table_file.as_std_path())?;
        Ok(Self::new(config, archive, references, groups, thresholds))
    }
}

impl<A: ArchiveClient, R: ReferenceStore> App<A, R> {
    pub fn new(
        config: ResolvedConfig,
        archive: A,
        references: R,
        groups: IndistinguishableGroupIndex,
        thresholds: ThresholdResolver,
    ) -> Self {
        Self {
            config,
            archive,
            references,
            groups,
            thresholds,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retry, self.config.retry_delay)
    }

    pub fn download(
        &self,
        accessions: &[Accession],
        dest_dir: &Path,
        workers: Option<usize>,
    ) -> Result<AcquisitionSummary, TaxCheckError> {
        let coordinator = AcquisitionCoordinator::new(
            &self.archive,
            &self.config.archive_url,
            self.retry_policy(),
            workers.unwrap_or(self.config.download_workers),
        );
        coordinator.run(accessions, dest_dir)
    }

    /// Checks that every genome in `reference_paths` is on disk and, when
    /// `auto_download` is enabled, fetches the missing ones into the
    /// directory the path points at. A path listed more than once counts once.
    pub fn ensure_references(
        &self,
        reference_paths: &[PathBuf],
    ) -> Result<ReferenceCheck, TaxCheckError> {
        let mut seen = HashSet::new();
        let mut missing_by_dir: BTreeMap<PathBuf, Vec<Accession>> = BTreeMap::new();
        let mut missing_paths = Vec::new();
        let mut missing = Vec::new();
        for path in reference_paths {
            if !seen.insert(path.as_path()) || fs_util::is_complete_gzip(path) {
                continue;
            }
            let accession = fs_util::accession_from_path(path)?;
            warn!(
                "{} does not exist. Will try to download.",
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            );
            let dir = self.download_dir(path);
            let accessions = missing_by_dir.entry(dir.clone()).or_default();
            if !accessions.contains(&accession) {
                accessions.push(accession.clone());
            }
            missing_paths.push((path.clone(), dir.join(accession.genome_file_name())));
            missing.push(accession);
        }

        let mut acquisitions = Vec::new();
        if !missing.is_empty() {
            if self.config.auto_download {
                let preexisting: HashSet<PathBuf> = missing_paths
                    .iter()
                    .map(|(_, downloaded)| downloaded.clone())
                    .filter(|downloaded| downloaded.exists())
                    .collect();
                for (dir, accessions) in &missing_by_dir {
                    acquisitions.push(self.download(accessions, dir, None)?);
                }
                place_downloads(&missing_paths, &seen, &preexisting)?;
            } else {
                warn!(
                    "{} reference genomes are missing and auto_download is disabled",
                    missing.len()
                );
            }
        }

        let unresolved: Vec<PathBuf> = missing_paths
            .into_iter()
            .map(|(listed, _)| listed)
            .filter(|listed| !fs_util::is_complete_gzip(listed))
            .collect();
        for path in &unresolved {
            warn!("{} is still unavailable", path.display());
        }

        Ok(ReferenceCheck {
            total: seen.len(),
            missing,
            acquisitions,
            unresolved,
        })
    }

    fn download_dir(&self, path: &Path) -> PathBuf {
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.genome_dir.clone().into_std_path_buf())
    }

    pub fn classify(&self, records: &[SimilarityRecord]) -> Result<Classification, TaxCheckError> {
        let hits = hits::resolve_hits(records, &self.references, &self.thresholds)?;
        let engine = ClassificationEngine::new(&self.groups);
        Ok(engine.classify(hits))
    }

    /// Classifies a similarity table and writes `tc_result.tsv` (and
    /// optionally `tc_result.json`) into `out_dir`.
    pub fn check(
        &self,
        similarity_table: &Path,
        out_dir: &Path,
        write_json: bool,
    ) -> Result<CheckResult, TaxCheckError> {
        info!("===== Start taxonomy check using ANI =====");
        let records = hits::read_similarity_table(similarity_table)?;
        let classification = self.classify(&records)?;

        fs::create_dir_all(out_dir).map_err(|err| {
            TaxCheckError::Filesystem(format!("create {}: {err}", out_dir.display()))
        })?;
        let tsv_path = out_dir.join(TC_RESULT_FILE);
        output::write_tsv_file(&classification.hits, &tsv_path)?;
        debug!(
            "taxonomy check result\n{}",
            output::render_tsv(&classification.hits)?
        );
        info!("taxonomy check result was written to {}", tsv_path.display());

        let json_path = if write_json {
            let path = out_dir.join(TC_RESULT_JSON_FILE);
            JsonOutput::write_report(&TaxonomyCheckReport::new(&classification), &path)
                .map_err(|err| TaxCheckError::Filesystem(err.to_string()))?;
            info!("taxonomy check result json was written to {}", path.display());
            Some(path)
        } else {
            None
        };

        info!(
            "===== Taxonomy check completed: {} =====",
            classification.verdict
        );
        Ok(CheckResult {
            classification,
            tsv_path,
            json_path,
        })
    }
}

/// Genomes land under `<accession>.fna.gz`. Copies them to listed paths that
/// use another name, such as the archive's `_genomic.fna.gz` form, and drops
/// the fresh download unless it is listed itself.
fn place_downloads(
    missing_paths: &[(PathBuf, PathBuf)],
    listed: &HashSet<&Path>,
    preexisting: &HashSet<PathBuf>,
) -> Result<(), TaxCheckError> {
    for (path, downloaded) in missing_paths {
        if path == downloaded || !fs_util::is_complete_gzip(downloaded) {
            continue;
        }
        fs::copy(downloaded, path).map_err(|err| {
            TaxCheckError::Filesystem(format!("copy to {}: {err}", path.display()))
        })?;
        debug!("placed {} at {}", downloaded.display(), path.display());
    }
    for (_, downloaded) in missing_paths {
        if !listed.contains(downloaded.as_path())
            && !preexisting.contains(downloaded)
            && downloaded.exists()
        {
            fs::remove_file(downloaded).map_err(|err| {
                TaxCheckError::Filesystem(format!("remove {}: {err}", downloaded.display()))
            })?;
        }
    }
    Ok(())
}
