use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::InputError;
use crate::http::ApiClient;
use crate::loader::{LoadFailurePolicy, LoadOptions};
use crate::locator::{Locator, OriginLayout};
use crate::retrieval::{CurlOptions, RetrievalOptions};
use crate::retry::RetryPolicy;
use crate::staging::StagingOptions;
use crate::store::{PutOptions, DEFAULT_CHUNK_SIZE};
use crate::warehouse::WriteDisposition;

/// Origin transfer settings (`[retrieval]` in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub workers: usize,
    /// Pause after each completed download, in milliseconds.
    pub pacing_ms: u64,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            pacing_ms: 500,
            connect_timeout_secs: 30,
            timeout_secs: 3600,
        }
    }
}

/// Upload settings (`[staging]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub workers: usize,
    /// Check+upload cycles per file, including the first.
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub pacing_ms: u64,
    /// Resumable upload chunk size. GCS requires a multiple of 256 KiB.
    pub chunk_size_bytes: usize,
    pub upload_timeout_secs: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            backoff_secs: 5,
            pacing_ms: 750,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            upload_timeout_secs: 600,
        }
    }
}

/// Load job settings (`[load]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub max_bad_records: u32,
    pub job_deadline_secs: u64,
    pub poll_interval_ms: u64,
    pub on_failure: LoadFailurePolicy,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            max_bad_records: 1000,
            job_deadline_secs: 3600,
            poll_interval_ms: 2000,
            on_failure: LoadFailurePolicy::Abort,
        }
    }
}

/// Where files and tables end up (`[destination]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub bucket: Option<String>,
    /// Object key prefix, e.g. `raw/yellow/2021`. Empty means bucket root.
    pub prefix: String,
    pub project: Option<String>,
    pub dataset: String,
    pub location: String,
    pub write_disposition: WriteDisposition,
    /// Timeouts for GCS and BigQuery API calls that do not set their own.
    pub api_connect_timeout_secs: u64,
    pub api_timeout_secs: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: String::new(),
            project: None,
            dataset: "datawarehouse-nyc-de-zoomcamp".to_string(),
            location: "US".to_string(),
            write_disposition: WriteDisposition::Append,
            api_connect_timeout_secs: 30,
            api_timeout_secs: 120,
        }
    }
}

/// Global configuration loaded from `~/.config/tripload/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriploadConfig {
    /// Dataset mirror: "datatalksclub" (CSV, default) or "tlc" (Parquet).
    pub origin: OriginLayout,
    /// Replaces the layout's default URL root (mirrors, tests).
    pub origin_base_url: Option<String>,
    /// Where downloads land before staging. Defaults to the working directory.
    pub download_dir: Option<PathBuf>,
    /// Items retrieved and staged together before the next batch starts.
    pub batch_size: usize,
    /// Environment variable holding the OAuth access token for GCS and BigQuery.
    pub token_env: String,
    pub retrieval: RetrievalConfig,
    pub staging: StagingConfig,
    pub load: LoadConfig,
    pub destination: DestinationConfig,
}

impl Default for TriploadConfig {
    fn default() -> Self {
        Self {
            origin: OriginLayout::DataTalksClub,
            origin_base_url: None,
            download_dir: None,
            batch_size: 3,
            token_env: "GOOGLE_OAUTH_ACCESS_TOKEN".to_string(),
            retrieval: RetrievalConfig::default(),
            staging: StagingConfig::default(),
            load: LoadConfig::default(),
            destination: DestinationConfig::default(),
        }
    }
}

impl TriploadConfig {
    pub fn locator(&self) -> Result<Locator, InputError> {
        match &self.origin_base_url {
            Some(root) => Locator::with_root(self.origin, root),
            None => Ok(Locator::new(self.origin)),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn curl_options(&self) -> CurlOptions {
        CurlOptions {
            connect_timeout: Duration::from_secs(self.retrieval.connect_timeout_secs),
            timeout: Duration::from_secs(self.retrieval.timeout_secs),
            ..CurlOptions::default()
        }
    }

    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            workers: self.retrieval.workers,
            pacing: Duration::from_millis(self.retrieval.pacing_ms),
        }
    }

    pub fn staging_options(&self) -> StagingOptions {
        let s = &self.staging;
        StagingOptions {
            workers: s.workers,
            retry: RetryPolicy::new(s.max_attempts, Duration::from_secs(s.backoff_secs)),
            put: PutOptions {
                chunk_size: s.chunk_size_bytes,
                timeout: Duration::from_secs(s.upload_timeout_secs),
            },
            pacing: Duration::from_millis(s.pacing_ms),
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            max_bad_records: self.load.max_bad_records,
            deadline: Duration::from_secs(self.load.job_deadline_secs),
            policy: self.load.on_failure,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.load.poll_interval_ms)
    }

    /// Authenticated client for the cloud backends, with the configured timeouts.
    pub fn api_client(&self, token: &str) -> ApiClient {
        let d = &self.destination;
        ApiClient::new(token).with_timeouts(
            Duration::from_secs(d.api_connect_timeout_secs),
            Duration::from_secs(d.api_timeout_secs),
        )
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tripload")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TriploadConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<TriploadConfig> {
    if !path.exists() {
        let default_cfg = TriploadConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: TriploadConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}
