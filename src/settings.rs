use config::{Config, ConfigError, File, FileFormat};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::types::StepSchedule;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    pub url: String,
    #[serde(default = "default_qps_limit")]
    pub qps_limit: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_qps_limit() -> u32 {
    25
}
fn default_max_concurrency() -> usize {
    8
}
fn default_request_timeout_ms() -> u64 {
    15_000 // eth_getLogs sobre un mes de bloques puede ser lento
}

/// Addresses of the read-only contract surfaces.
#[derive(Debug, Deserialize, Clone)]
pub struct Contracts {
    /// Emits the cluster and operator events
    pub network: Address,
    /// Fee and liquidation parameters
    pub network_views: Address,
    pub registry: Address,
    pub manager: Address,
    /// Pool details
    pub views: Address,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Scanner {
    #[serde(default = "default_block_time_seconds")]
    pub block_time_seconds: u64,
    #[serde(default = "default_transient_retries")]
    pub transient_retries: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_max_failures_at_min_step")]
    pub max_failures_at_min_step: u32,
    /// Maximum windows per scan. None = walk to genesis.
    #[serde(default)]
    pub max_windows: Option<u64>,
    /// Wall-clock budget per scan. None = no deadline.
    #[serde(default)]
    pub deadline_seconds: Option<u64>,
}

fn default_block_time_seconds() -> u64 {
    12
}
fn default_transient_retries() -> usize {
    2
}
fn default_retry_base_delay_ms() -> u64 {
    250
}
fn default_max_failures_at_min_step() -> u32 {
    5
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            block_time_seconds: default_block_time_seconds(),
            transient_retries: default_transient_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_failures_at_min_step: default_max_failures_at_min_step(),
            max_windows: None,
            deadline_seconds: None,
        }
    }
}

impl Scanner {
    pub fn steps(&self) -> StepSchedule {
        StepSchedule::from_block_time(self.block_time_seconds)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(Duration::from_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Aggregator {
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
    /// `{id}` is replaced with the operator id. Empty = no url.
    #[serde(default)]
    pub operator_url_template: String,
}

fn default_max_concurrent_reads() -> usize {
    8
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            max_concurrent_reads: default_max_concurrent_reads(),
            operator_url_template: String::new(),
        }
    }
}

impl Aggregator {
    pub fn operator_url(&self, id: u64) -> String {
        if self.operator_url_template.is_empty() {
            return String::new();
        }
        self.operator_url_template.replace("{id}", &id.to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorSource {
    /// Network contract deployment block
    #[serde(default)]
    pub from_block: u64,
    #[serde(default = "default_operator_chunk_size")]
    pub chunk_size: u64,
}

fn default_operator_chunk_size() -> u64 {
    50_000
}

impl Default for OperatorSource {
    fn default() -> Self {
        Self {
            from_block: 0,
            chunk_size: default_operator_chunk_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: Rpc,
    pub contracts: Contracts,
    #[serde(default)]
    pub scanner: Scanner,
    #[serde(default)]
    pub aggregator: Aggregator,
    #[serde(default)]
    pub operator_source: OperatorSource,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` from the working directory.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path("Config.toml")
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_string_lossy().to_string();
        let builder = Config::builder().add_source(File::with_name(&path));
        Self::finish(builder.build()?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder().add_source(File::from_str(raw, FileFormat::Toml));
        Self::finish(builder.build()?)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let mut settings: Self = config.try_deserialize()?;
        apply_env_overrides(&mut settings)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.url.trim().is_empty() {
            return Err(ConfigError::Message("rpc.url must not be empty".into()));
        }
        if self.aggregator.max_concurrent_reads == 0 {
            return Err(ConfigError::Message(
                "aggregator.max_concurrent_reads must be > 0".into(),
            ));
        }
        if self.operator_source.chunk_size == 0 {
            return Err(ConfigError::Message(
                "operator_source.chunk_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

// Overrides puntuales por variable de entorno (despliegues sin tocar Config.toml)
fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Some(url) = non_empty_env("SDK_RPC_URL") {
        settings.rpc.url = url;
    }

    let address_overrides: [(&str, &mut Address); 5] = [
        ("SDK_CONTRACTS_NETWORK", &mut settings.contracts.network),
        ("SDK_CONTRACTS_NETWORK_VIEWS", &mut settings.contracts.network_views),
        ("SDK_CONTRACTS_REGISTRY", &mut settings.contracts.registry),
        ("SDK_CONTRACTS_MANAGER", &mut settings.contracts.manager),
        ("SDK_CONTRACTS_VIEWS", &mut settings.contracts.views),
    ];
    for (key, slot) in address_overrides {
        if let Some(raw) = non_empty_env(key) {
            *slot = raw
                .parse()
                .map_err(|e| ConfigError::Message(format!("{} is not an address: {}", key, e)))?;
        }
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
