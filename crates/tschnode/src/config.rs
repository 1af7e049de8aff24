use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tschmesh_protocol::Eui64;
use tschmesh_routing::{ReplicationMode, TrackerConfig, DEFAULT_MAX_ALTERNATE_PATHS};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub controller: ControllerConfig,
    pub aggregator: AggregatorConfig,
    pub logging: LoggingConfig,
    /// DAG roots registered at startup
    #[serde(default, with = "eui64_list")]
    pub roots: Vec<Eui64>,

    #[serde(skip)]
    config_file_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub replication: ReplicationMode,
    #[serde(default = "default_feedback_timeout_ms")]
    pub feedback_timeout_ms: u64,
    #[serde(default = "default_self_heal")]
    pub self_heal: bool,
    #[serde(default = "default_max_alternate_paths")]
    pub max_alternate_paths: usize,
}

fn default_feedback_timeout_ms() -> u64 {
    5000
}

fn default_self_heal() -> bool {
    true
}

fn default_max_alternate_paths() -> usize {
    DEFAULT_MAX_ALTERNATE_PATHS
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            replication: ReplicationMode::SinglePath,
            feedback_timeout_ms: default_feedback_timeout_ms(),
            self_heal: default_self_heal(),
            max_alternate_paths: default_max_alternate_paths(),
        }
    }
}

impl ControllerConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            replication: self.replication,
            feedback_timeout: Duration::from_millis(self.feedback_timeout_ms),
            self_heal: self.self_heal,
            max_alternate_paths: self.max_alternate_paths,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Reliability window length
    pub window_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { window_secs: 600 }
    }
}

impl AggregatorConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            aggregator: AggregatorConfig::default(),
            logging: LoggingConfig::default(),
            roots: Vec::new(),
            config_file_path: Self::default_config_path(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\nRun with --init to create a new configuration",
                config_path.display()
            );
        }

        let contents =
            fs::read_to_string(&config_path).context("Failed to read configuration file")?;

        let mut config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse configuration file")?;

        if config.aggregator.window_secs == 0 {
            anyhow::bail!("aggregator.window_secs must be greater than zero");
        }

        config.config_file_path = config_path;
        Ok(config)
    }

    /// Write a default configuration and return it
    pub fn create_default(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }

        let config = Config {
            config_file_path: config_path.clone(),
            ..Default::default()
        };

        let yaml = serde_yaml::to_string(&config)?;
        fs::write(&config_path, yaml).context("Failed to write configuration file")?;

        Ok(config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file_path
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tschnode")
            .join("config.yaml")
    }
}

/// Roots as hex strings, with or without separators
mod eui64_list {
    use serde::{Deserialize, Deserializer, Serializer};
    use tschmesh_protocol::Eui64;

    pub fn serialize<S>(roots: &[Eui64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(roots.iter().map(|root| root.to_string()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Eui64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| s.parse::<Eui64>().map_err(serde::de::Error::custom))
            .collect()
    }
}
