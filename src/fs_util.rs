use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use md5::{Digest, Md5};

use crate::domain::Accession;
use crate::error::TaxCheckError;

/// Hex-encoded MD5 digest of a file's contents.
pub fn md5_file(path: &Path) -> Result<String, TaxCheckError> {
    let mut file = fs::File::open(path)
        .map_err(|err| TaxCheckError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|err| TaxCheckError::Filesystem(format!("read {}: {err}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// True when `path` is a non-empty gzip file that decodes to the end.
/// Truncated downloads fail here and are fetched again.
pub fn is_complete_gzip(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    match file.metadata() {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        _ => return false,
    }
    let mut decoder = MultiGzDecoder::new(io::BufReader::new(file));
    io::copy(&mut decoder, &mut io::sink()).is_ok()
}

/// Accession encoded in a reference genome path, e.g.
/// `genomes/GCF_000005845.2.fna.gz` or `.../GCF_000005845.2_genomic.fna.gz`.
pub fn accession_from_path(path: &Path) -> Result<Accession, TaxCheckError> {
    let base_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| TaxCheckError::InvalidAccession(path.display().to_string()))?;
    let stem = base_name
        .strip_suffix(".fna.gz")
        .ok_or_else(|| TaxCheckError::InvalidAccession(base_name.to_string()))?;
    let stem = stem.strip_suffix("_genomic").unwrap_or(stem);
    stem.parse()
}

/// Non-empty, non-comment lines of a list file (accessions or genome paths).
pub fn read_list_file(path: &Path) -> Result<Vec<String>, TaxCheckError> {
    let content = fs::read_to_string(path)
        .map_err(|err| TaxCheckError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
