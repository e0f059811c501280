use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::TaxCheckError;

pub const DEFAULT_CONFIG_FILE: &str = "ani-taxcheck.json";
pub const DEFAULT_ARCHIVE_URL: &str = "https://ftp.ncbi.nlm.nih.gov/genomes/all";
pub const DEFAULT_ANI_THRESHOLD: f64 = 95.0;
pub const DEFAULT_MAX_RETRY: usize = 3;
pub const INDISTINGUISHABLE_GROUPS_FILE: &str = "prokaryote_ANI_indistinguishable_groups.txt";
pub const SPECIES_THRESHOLD_FILE: &str = "prokaryote_ANI_species_specific_threshold.txt";
pub const REFERENCE_TABLE_FILE: &str = "reference_summary.tsv";
pub const TC_RESULT_FILE: &str = "tc_result.tsv";
pub const TC_RESULT_JSON_FILE: &str = "tc_result.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub reference_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub genome_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub archive_url: Option<String>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub download_workers: Option<usize>,
    #[serde(default)]
    pub max_retry: Option<usize>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub ani_threshold: Option<f64>,
    #[serde(default)]
    pub indistinguishable_groups_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub species_threshold_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub reference_table_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub auto_download: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub reference_dir: Utf8PathBuf,
    pub genome_dir: Utf8PathBuf,
    pub archive_url: String,
    pub threads: usize,
    pub download_workers: usize,
    pub max_retry: usize,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub ani_threshold: f64,
    pub indistinguishable_groups_file: Utf8PathBuf,
    pub species_threshold_file: Utf8PathBuf,
    pub reference_table_file: Utf8PathBuf,
    pub auto_download: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TaxCheckError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| TaxCheckError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TaxCheckError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TaxCheckError> {
        let reference_dir = match config.reference_dir {
            Some(dir) => dir,
            None => default_reference_dir()?,
        };
        let genome_dir = config
            .genome_dir
            .map(|dir| resolve_against(&reference_dir, dir))
            .unwrap_or_else(|| reference_dir.join("genomes"));

        let threads = config.threads.unwrap_or(1);
        if threads == 0 {
            return Err(TaxCheckError::Configuration(
                "threads must be at least 1".to_string(),
            ));
        }
        let download_workers = config.download_workers.unwrap_or(threads);
        if download_workers == 0 {
            return Err(TaxCheckError::Configuration(
                "download_workers must be at least 1".to_string(),
            ));
        }
        let max_retry = config.max_retry.unwrap_or(DEFAULT_MAX_RETRY);
        if max_retry == 0 {
            return Err(TaxCheckError::Configuration(
                "max_retry must be at least 1".to_string(),
            ));
        }
        let ani_threshold = config.ani_threshold.unwrap_or(DEFAULT_ANI_THRESHOLD);
        if !(0.0..=100.0).contains(&ani_threshold) {
            return Err(TaxCheckError::Configuration(format!(
                "ani_threshold must be within 0-100, got {ani_threshold}"
            )));
        }

        let indistinguishable_groups_file = resolve_against(
            &reference_dir,
            config
                .indistinguishable_groups_file
                .unwrap_or_else(|| Utf8PathBuf::from(INDISTINGUISHABLE_GROUPS_FILE)),
        );
        let species_threshold_file = resolve_against(
            &reference_dir,
            config
                .species_threshold_file
                .unwrap_or_else(|| Utf8PathBuf::from(SPECIES_THRESHOLD_FILE)),
        );
        let reference_table_file = resolve_against(
            &reference_dir,
            config
                .reference_table_file
                .unwrap_or_else(|| Utf8PathBuf::from(REFERENCE_TABLE_FILE)),
        );

        Ok(ResolvedConfig {
            reference_dir,
            genome_dir,
            archive_url: config
                .archive_url
                .unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            threads,
            download_workers,
            max_retry,
            retry_delay: Duration::from_millis(config.retry_delay_ms.unwrap_or(200)),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(60)),
            ani_threshold,
            indistinguishable_groups_file,
            species_threshold_file,
            reference_table_file,
            auto_download: config.auto_download.unwrap_or(true),
        })
    }
}

fn default_reference_dir() -> Result<Utf8PathBuf, TaxCheckError> {
    ProjectDirs::from("", "", "ani-taxcheck")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
        .ok_or_else(|| {
            TaxCheckError::Configuration("unable to resolve reference directory".to_string())
        })
}

fn resolve_against(base: &Utf8Path, path: Utf8PathBuf) -> Utf8PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
