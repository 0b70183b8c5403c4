use crate::error::{Result, TraceError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

const DATA_DIR_KEY: &str = "PHARMA_TRACE_DATA_DIR";
const NETWORK_ID_KEY: &str = "PHARMA_TRACE_NETWORK_ID";
const CONTRACT_KEY: &str = "PHARMA_TRACE_CONTRACT";
const REPLICATION_KEY: &str = "PHARMA_TRACE_REPLICATION";
const CONFIG_FILE_KEY: &str = "PHARMA_TRACE_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "pharma-trace.toml";
const DEFAULT_CONTRACT: &str = "0x0000000000000000000000000000000000001155";

/// Tunables read from `pharma-trace.toml` and the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    /// Network id the wallet must report before signing; `None` disables the check
    pub network_id: Option<u64>,
    pub contract_address: String,
    /// How many replicas the content store should keep of each metadata document
    pub replication: u32,
    pub max_metadata_bytes: usize,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("data"),
            network_id: None,
            contract_address: DEFAULT_CONTRACT.to_string(),
            replication: 3,
            max_metadata_bytes: 256 * 1024,
            receipt_timeout_secs: 120,
            receipt_poll_interval_ms: 500,
        }
    }
}

impl Settings {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Settings> {
        let settings: Settings = toml::from_str(raw)?;
        settings.check()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Load the config file if present, then apply environment overrides
    pub fn load() -> Result<Settings> {
        let path = env::var(CONFIG_FILE_KEY).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let path = PathBuf::from(path);
        let mut settings = if path.exists() {
            Self::from_file(&path)?
        } else {
            Settings::default()
        };
        settings.apply_env()?;
        settings.check()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var(NETWORK_ID_KEY) {
            let id = raw
                .parse::<u64>()
                .map_err(|e| TraceError::Config(format!("{NETWORK_ID_KEY}={raw}: {e}")))?;
            self.network_id = Some(id);
        }
        if let Ok(contract) = env::var(CONTRACT_KEY) {
            self.contract_address = contract;
        }
        if let Ok(raw) = env::var(REPLICATION_KEY) {
            self.replication = raw
                .parse::<u32>()
                .map_err(|e| TraceError::Config(format!("{REPLICATION_KEY}={raw}: {e}")))?;
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.replication == 0 {
            return Err(TraceError::Config(
                "replication must be at least 1".to_string(),
            ));
        }
        if self.receipt_poll_interval_ms == 0 {
            return Err(TraceError::Config(
                "receipt_poll_interval_ms must be positive".to_string(),
            ));
        }
        crate::wallet::Address::parse(&self.contract_address)
            .map_err(|e| TraceError::Config(format!("contract_address: {e}")))?;
        Ok(())
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

/// Process-wide settings holder
pub struct Config {
    inner: RwLock<Settings>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let settings = Settings::load().unwrap_or_else(|e| {
            log::warn!("Falling back to default settings: {e}");
            Settings::default()
        });
        Config {
            inner: RwLock::new(settings),
        }
    }

    pub fn settings(&self) -> Settings {
        match self.inner.read() {
            Ok(settings) => settings.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on config");
                Settings::default()
            }
        }
    }

    pub fn set_data_dir(&self, dir: PathBuf) {
        match self.inner.write() {
            Ok(mut inner) => inner.data_dir = dir,
            Err(_) => log::error!("Failed to acquire write lock on config"),
        }
    }
}
