use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use md5::{Digest, Md5};

use ani_taxcheck::acquisition::AcquisitionCoordinator;
use ani_taxcheck::archive::{self, ArchiveClient};
use ani_taxcheck::domain::{Accession, AcquisitionStatus};
use ani_taxcheck::error::TaxCheckError;
use ani_taxcheck::fetcher::ChecksumFetcher;
use ani_taxcheck::retry::RetryPolicy;

const BASE: &str = "https://archive.test/genomes/all";

#[derive(Default)]
struct MockArchive {
    texts: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    corrupt_downloads: Mutex<usize>,
    interrupted_downloads: Mutex<usize>,
    missing_downloads: Mutex<usize>,
    failing_listings: Mutex<usize>,
    listings_before_removal: Mutex<Option<usize>>,
    text_calls: Mutex<Vec<String>>,
    download_calls: Mutex<Vec<String>>,
}

impl MockArchive {
    fn publish(&mut self, accession: &str, assembly: &str, body: &[u8]) {
        let acc: Accession = accession.parse().unwrap();
        let directory = archive::listing_url(BASE, &acc);
        let file_name = format!("{assembly}_genomic.fna.gz");
        let digest = format!("{:x}", Md5::digest(body));

        self.texts.insert(
            directory.clone(),
            format!(
                "<html><body><a href=\"../\">../</a>\n<a href=\"{assembly}/\">{assembly}/</a>\n</body></html>"
            ),
        );
        self.texts.insert(
            format!("{directory}{assembly}/md5checksums.txt"),
            format!(
                "0123456789abcdef0123456789abcdef  ./{assembly}_assembly_report.txt\n{digest}  ./{file_name}\n"
            ),
        );
        self.files
            .insert(format!("{directory}{assembly}/{file_name}"), body.to_vec());
    }

    fn text_calls(&self) -> usize {
        self.text_calls.lock().unwrap().len()
    }

    fn download_calls(&self) -> usize {
        self.download_calls.lock().unwrap().len()
    }
}

impl ArchiveClient for MockArchive {
    fn fetch_text(&self, url: &str) -> Result<String, TaxCheckError> {
        self.text_calls.lock().unwrap().push(url.to_string());
        if url.ends_with('/') {
            let mut failing = self.failing_listings.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(TaxCheckError::Network(format!("{url}: connection reset")));
            }
            let mut remaining = self.listings_before_removal.lock().unwrap();
            if let Some(remaining) = remaining.as_mut() {
                if *remaining == 0 {
                    return Err(TaxCheckError::NotFound(url.to_string()));
                }
                *remaining -= 1;
            }
        }
        self.texts
            .get(url)
            .cloned()
            .ok_or_else(|| TaxCheckError::NotFound(url.to_string()))
    }

    fn download(&self, url: &str, destination: &mut dyn Write) -> Result<u64, TaxCheckError> {
        self.download_calls.lock().unwrap().push(url.to_string());
        let body = self
            .files
            .get(url)
            .ok_or_else(|| TaxCheckError::NotFound(url.to_string()))?;
        let mut missing = self.missing_downloads.lock().unwrap();
        if *missing > 0 {
            *missing -= 1;
            return Err(TaxCheckError::NotFound(url.to_string()));
        }
        let mut interrupted = self.interrupted_downloads.lock().unwrap();
        if *interrupted > 0 {
            *interrupted -= 1;
            destination.write_all(&body[..body.len() / 2]).unwrap();
            return Err(TaxCheckError::Network(format!("{url}: connection reset")));
        }
        let mut corrupt = self.corrupt_downloads.lock().unwrap();
        let bytes: &[u8] = if *corrupt > 0 {
            *corrupt -= 1;
            &body[..body.len() / 2]
        } else {
            body
        };
        destination.write_all(bytes).unwrap();
        Ok(bytes.len() as u64)
    }
}

fn genome(sequence: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(format!(">contig_1\n{sequence}\n").as_bytes())
        .unwrap();
    encoder.finish().unwrap()
}

fn accession(value: &str) -> Accession {
    value.parse().unwrap()
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::ZERO)
}

fn dir_entries(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn downloads_and_verifies_genome() {
    let body = genome("ACGTACGTTTGACCA");
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &body);
    let dest = tempfile::tempdir().unwrap();

    let fetcher = ChecksumFetcher::new(&mock, BASE, policy());
    let outcome = fetcher.fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::Success);
    assert_eq!(outcome.attempts, 1);
    let local = outcome.local_path.clone().unwrap();
    assert_eq!(local, dest.path().join("GCF_000005845.2.fna.gz"));
    assert_eq!(fs::read(&local).unwrap(), body);
    assert_eq!(
        outcome.remote_path.as_deref(),
        Some(
            "https://archive.test/genomes/all/GCF/000/005/845/GCF_000005845.2_ASM584v2/GCF_000005845.2_ASM584v2_genomic.fna.gz"
        )
    );
    assert_eq!(dir_entries(dest.path()), vec!["GCF_000005845.2.fna.gz"]);
    assert!(outcome.log_line().starts_with("GCF_000005845.2\tSUCCESS\t"));
}

#[test]
fn checksum_mismatch_is_retried_from_scratch() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &genome("ACGT"));
    *mock.corrupt_downloads.lock().unwrap() = 1;
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::Success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(mock.download_calls(), 2);
    // Each attempt re-reads the listing and the manifest.
    assert_eq!(mock.text_calls(), 4);
}

#[test]
fn persistent_mismatch_fails_without_leaving_a_file() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &genome("ACGT"));
    *mock.corrupt_downloads.lock().unwrap() = usize::MAX;
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::Fail);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.local_path.is_none());
    assert_eq!(mock.download_calls(), 3);
    assert!(dir_entries(dest.path()).is_empty());
    assert!(outcome.log_line().starts_with("GCF_000005845.2\tFAIL\t-\t"));
}

#[test]
fn unknown_accession_is_not_found_without_retry() {
    let mock = MockArchive::default();
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCA_999999999.1"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::NotFound);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(mock.text_calls(), 1);
    assert_eq!(mock.download_calls(), 0);
    assert_eq!(outcome.log_line(), "GCA_999999999.1\tNOT_FOUND\t-\t-");
}

#[test]
fn listing_without_matching_version_is_not_found() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.1", "GCF_000005845.1_ASM584v1", &genome("ACGT"));
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::NotFound);
    assert_eq!(mock.download_calls(), 0);
}

#[test]
fn transient_listing_errors_are_retried() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &genome("ACGT"));
    *mock.failing_listings.lock().unwrap() = 2;
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::Success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(mock.download_calls(), 1);
}

#[test]
fn missing_genome_file_after_manifest_is_retried() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &genome("ACGT"));
    *mock.missing_downloads.lock().unwrap() = 1;
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::Success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(mock.download_calls(), 2);
}

#[test]
fn interrupted_downloads_leave_nothing_behind() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &genome("ACGTACGT"));
    *mock.interrupted_downloads.lock().unwrap() = usize::MAX;
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::Fail);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.local_path.is_none());
    // Listing and manifest per cycle, one download per cycle.
    assert_eq!(mock.text_calls(), 6);
    assert_eq!(mock.download_calls(), 3);
    assert!(dir_entries(dest.path()).is_empty());
}

#[test]
fn persistent_network_failure_is_bounded_by_max_retry() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &genome("ACGT"));
    *mock.failing_listings.lock().unwrap() = usize::MAX;
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::Fail);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(mock.text_calls(), 3);
    assert_eq!(mock.download_calls(), 0);
    assert!(dir_entries(dest.path()).is_empty());
}

#[test]
fn remote_path_reflects_the_last_attempt_only() {
    let mut mock = MockArchive::default();
    mock.publish("GCF_000005845.2", "GCF_000005845.2_ASM584v2", &genome("ACGT"));
    *mock.corrupt_downloads.lock().unwrap() = 1;
    *mock.listings_before_removal.lock().unwrap() = Some(1);
    let dest = tempfile::tempdir().unwrap();

    let outcome =
        ChecksumFetcher::new(&mock, BASE, policy()).fetch(&accession("GCF_000005845.2"), dest.path());

    assert_eq!(outcome.status, AcquisitionStatus::NotFound);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.remote_path.is_none());
    assert_eq!(outcome.log_line(), "GCF_000005845.2\tNOT_FOUND\t-\t-");
}

#[test]
fn coordinator_skips_complete_genomes_and_refetches_truncated_ones() {
    let complete = genome("ACGTACGT");
    let other = genome("TTTTGGGG");
    let mut mock = MockArchive::default();
    mock.publish("GCF_000000001.1", "GCF_000000001.1_ASM1v1", &complete);
    mock.publish("GCF_000000002.1", "GCF_000000002.1_ASM2v1", &other);
    let dest = tempfile::tempdir().unwrap();
    fs::write(dest.path().join("GCF_000000001.1.fna.gz"), &complete).unwrap();
    fs::write(
        dest.path().join("GCF_000000002.1.fna.gz"),
        &other[..other.len() - 6],
    )
    .unwrap();

    let coordinator = AcquisitionCoordinator::new(&mock, BASE, policy(), 2);
    let summary = coordinator
        .run(
            &[accession("GCF_000000001.1"), accession("GCF_000000002.1")],
            dest.path(),
        )
        .unwrap();

    assert_eq!(summary.requested, 2);
    assert_eq!(summary.already_present, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].accession.as_str(), "GCF_000000002.1");
    assert_eq!(mock.download_calls(), 1);
    assert_eq!(
        fs::read(dest.path().join("GCF_000000002.1.fna.gz")).unwrap(),
        other
    );
}

#[test]
fn coordinator_reports_every_accession_across_workers() {
    let mut mock = MockArchive::default();
    for n in 1..=4 {
        let acc = format!("GCF_00000000{n}.1");
        mock.publish(&acc, &format!("{acc}_ASM{n}v1"), &genome(&"ACGT".repeat(n)));
    }
    let dest = tempfile::tempdir().unwrap();
    let accessions: Vec<Accession> = [
        "GCF_000000001.1",
        "GCF_000000002.1",
        "GCF_000000003.1",
        "GCF_000000002.1",
        "GCF_000000004.1",
        "GCF_000000005.1",
    ]
    .iter()
    .map(|value| accession(value))
    .collect();

    let coordinator = AcquisitionCoordinator::new(&mock, BASE, policy(), 3);
    let summary = coordinator.run(&accessions, &dest.path().join("genomes")).unwrap();

    assert_eq!(summary.requested, 5);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.failed, 0);
    assert!(!summary.is_complete());
    assert_eq!(summary.outcomes.len(), 5);
    assert_eq!(dir_entries(&dest.path().join("genomes")).len(), 4);

    // A second run finds everything on disk and touches nothing but the
    // accession that was never published.
    let downloads_before = mock.download_calls();
    let again = coordinator.run(&accessions, &dest.path().join("genomes")).unwrap();
    assert_eq!(again.already_present, 4);
    assert_eq!(again.not_found, 1);
    assert_eq!(mock.download_calls(), downloads_before);
}
