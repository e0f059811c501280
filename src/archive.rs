use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::Accession;
use crate::error::TaxCheckError;

pub const CHECKSUM_MANIFEST: &str = "md5checksums.txt";

/// Read access to a remote genome archive laid out like the NCBI
/// `genomes/all` tree.
pub trait ArchiveClient: Send + Sync {
    fn fetch_text(&self, url: &str) -> Result<String, TaxCheckError>;
    /// Streams the body of `url` into `destination`, returning the byte count.
    fn download(&self, url: &str, destination: &mut dyn Write) -> Result<u64, TaxCheckError>;
}

#[derive(Clone)]
pub struct ArchiveHttpClient {
    client: Client,
}

impl ArchiveHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, TaxCheckError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ani-taxcheck/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TaxCheckError::Configuration(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(20).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|err| TaxCheckError::Network(err.to_string()))?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, TaxCheckError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| TaxCheckError::Network(format!("{url}: {err}")))?;
        Self::handle_status(url, response)
    }

    fn handle_status(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, TaxCheckError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TaxCheckError::NotFound(url.to_string()));
        }
        Err(TaxCheckError::NetworkStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

impl ArchiveClient for ArchiveHttpClient {
    fn fetch_text(&self, url: &str) -> Result<String, TaxCheckError> {
        self.get(url)?
            .text()
            .map_err(|err| TaxCheckError::Network(format!("{url}: {err}")))
    }

    fn download(&self, url: &str, destination: &mut dyn Write) -> Result<u64, TaxCheckError> {
        let mut response = self.get(url)?;
        // Body and timeout errors surface as io errors from the reader side.
        std::io::copy(&mut response, destination)
            .map_err(|err| TaxCheckError::Network(format!("{url}: {err}")))
    }
}

/// Directory of the archive that lists every assembly version of `accession`.
pub fn listing_url(base_url: &str, accession: &Accession) -> String {
    let [source, first, second, third] = accession.shard_components();
    format!(
        "{}/{source}/{first}/{second}/{third}/",
        base_url.trim_end_matches('/')
    )
}

/// Names of the entries in an HTML index page, without trailing slashes.
pub fn parse_listing(html: &str) -> Vec<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    let re = HREF.get_or_init(|| Regex::new(r#"<a href="([^"?/][^"]*)">"#).expect("valid regex"));
    re.captures_iter(html)
        .map(|cap| cap[1].trim_end_matches('/').to_string())
        .filter(|name| !name.is_empty() && !name.contains('/'))
        .collect()
}

/// Picks the assembly directory for `accession` from a listing. When the
/// archive holds several matching entries the lexicographically last wins.
pub fn select_entry<'a>(entries: &'a [String], accession: &Accession) -> Option<&'a str> {
    let acc = accession.as_str();
    entries
        .iter()
        .filter(|name| {
            name.as_str() == acc
                || name
                    .strip_prefix(acc)
                    .is_some_and(|rest| rest.starts_with('_'))
        })
        .map(String::as_str)
        .max()
}

/// Looks up the published digest of `file_name` in an `md5checksums.txt`
/// manifest (`<md5>  ./<file>` per line).
pub fn parse_checksum(manifest: &str, file_name: &str) -> Option<String> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let mut parts = line.split_whitespace();
            let digest = parts.next()?;
            let path = parts.last()?;
            let name = path.trim_start_matches("./");
            (name == file_name).then(|| digest.to_ascii_lowercase())
        })
}
