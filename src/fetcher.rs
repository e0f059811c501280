use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error};

use crate::archive::{self, ArchiveClient, CHECKSUM_MANIFEST};
use crate::domain::{Accession, AcquisitionStatus};
use crate::error::TaxCheckError;
use crate::fs_util;
use crate::retry::{RetryOutcome, RetryPolicy};

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionOutcome {
    pub accession: Accession,
    pub status: AcquisitionStatus,
    pub local_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    pub attempts: usize,
}

impl AcquisitionOutcome {
    /// `accession<TAB>status<TAB>local_path<TAB>remote_path`, `-` for absent paths.
    pub fn log_line(&self) -> String {
        let local = self
            .local_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let remote = self.remote_path.as_deref().unwrap_or("-");
        format!("{}\t{}\t{}\t{}", self.accession, self.status, local, remote)
    }

    pub fn is_success(&self) -> bool {
        self.status == AcquisitionStatus::Success
    }
}

/// Downloads `<accession>_genomic.fna.gz` from the archive and checks it
/// against the published MD5 manifest.
pub struct ChecksumFetcher<'a, A: ArchiveClient + ?Sized> {
    client: &'a A,
    base_url: &'a str,
    policy: RetryPolicy,
}

impl<'a, A: ArchiveClient + ?Sized> ChecksumFetcher<'a, A> {
    pub fn new(client: &'a A, base_url: &'a str, policy: RetryPolicy) -> Self {
        Self {
            client,
            base_url,
            policy,
        }
    }

    pub fn fetch(&self, accession: &Accession, dest_dir: &Path) -> AcquisitionOutcome {
        let mut remote_path = None;
        let outcome = self.policy.run(accession.as_str(), |_| {
            self.attempt(accession, dest_dir, &mut remote_path)
        });

        let attempts = outcome.attempts();
        let (status, local_path) = match outcome {
            RetryOutcome::Success { value, .. } => (AcquisitionStatus::Success, Some(value)),
            RetryOutcome::Fatal {
                error: TaxCheckError::NotFound(what),
                ..
            } => {
                debug!("{accession}: not found in archive ({what})");
                (AcquisitionStatus::NotFound, None)
            }
            RetryOutcome::Fatal { error, .. } => {
                error!("{accession}: download aborted: {error}");
                (AcquisitionStatus::Fail, None)
            }
            RetryOutcome::Exhausted { error, attempts } => {
                error!("{accession}: failed after {attempts} attempts: {error}");
                (AcquisitionStatus::Fail, None)
            }
        };

        AcquisitionOutcome {
            accession: accession.clone(),
            status,
            local_path,
            remote_path,
            attempts,
        }
    }

    /// One full cycle: listing, manifest, download, verify. Re-resolves the
    /// remote names every time since the archive may have changed.
    fn attempt(
        &self,
        accession: &Accession,
        dest_dir: &Path,
        remote_path: &mut Option<String>,
    ) -> Result<PathBuf, TaxCheckError> {
        *remote_path = None;
        let directory = archive::listing_url(self.base_url, accession);
        debug!("listing {directory}");
        let listing = self.client.fetch_text(&directory)?;
        let entries = archive::parse_listing(&listing);
        let entry = archive::select_entry(&entries, accession)
            .ok_or_else(|| TaxCheckError::NotFound(format!("{accession} under {directory}")))?;

        let file_name = format!("{entry}_genomic.fna.gz");
        let manifest_url = format!("{directory}{entry}/{CHECKSUM_MANIFEST}");
        let manifest = self
            .client
            .fetch_text(&manifest_url)
            .map_err(missing_is_transient)?;
        let expected = archive::parse_checksum(&manifest, &file_name)
            .ok_or_else(|| TaxCheckError::NotFound(format!("{file_name} in {manifest_url}")))?;

        let file_url = format!("{directory}{entry}/{file_name}");
        *remote_path = Some(file_url.clone());
        debug!("downloading {file_url}");

        // The temporary file is removed on drop, so every early return below
        // leaves nothing behind in the destination directory.
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{accession}."))
            .suffix(".part")
            .tempfile_in(dest_dir)
            .map_err(|err| TaxCheckError::Filesystem(err.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            self.client
                .download(&file_url, &mut writer)
                .map_err(missing_is_transient)?;
            writer
                .flush()
                .map_err(|err| TaxCheckError::Network(format!("{file_url}: {err}")))?;
        }

        let actual = fs_util::md5_file(temp.path())?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(TaxCheckError::Integrity {
                file: file_name,
                expected,
                actual,
            });
        }

        let output = dest_dir.join(accession.genome_file_name());
        temp.persist(&output)
            .map_err(|err| TaxCheckError::Filesystem(err.to_string()))?;
        Ok(output)
    }
}

/// Past the listing, a 404 means the assembly directory changed under us;
/// the next attempt re-resolves it.
fn missing_is_transient(err: TaxCheckError) -> TaxCheckError {
    match err {
        TaxCheckError::NotFound(url) => TaxCheckError::Network(format!("{url}: not found")),
        other => other,
    }
}
