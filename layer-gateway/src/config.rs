use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Largest page Telegram returns from `messages.getHistory`.
pub const MAX_BATCH_SIZE: i32 = 100;

/// Gateway configuration, loaded from an optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one session file per phone number
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Fallback API credentials for requests that omit them
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_id:   Option<i32>,
    pub api_hash: Option<String>,
}

/// History pagination knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Messages requested per `getHistory` call (1..=100)
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,

    /// Upper bound on messages retrieved by a single request
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Pause between two batches, in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_batch_size() -> i32 {
    MAX_BATCH_SIZE
}

fn default_max_messages() -> usize {
    1000
}

fn default_batch_delay_ms() -> u64 {
    500
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            batch_size:     default_batch_size(),
            max_messages:   default_max_messages(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl HistoryConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir:  default_data_dir(),
            telegram:  TelegramConfig::default(),
            history:   HistoryConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.history.batch_size) {
            return Err(format!(
                "history.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.history.batch_size
            ));
        }
        if self.history.max_messages == 0 {
            return Err("history.max_messages must be at least 1".into());
        }
        Ok(())
    }
}
