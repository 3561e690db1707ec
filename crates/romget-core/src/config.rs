use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Download queue parameters, passed explicitly to `QueueManager::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum concurrent transfers (worker pool size).
    pub max_parallel: usize,
    /// Read/write buffer size in bytes.
    pub buffer_size: usize,
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read stall guard: abort when below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
    /// Minimum gap between progress updates in milliseconds.
    pub progress_interval_ms: u64,
    /// Speed sampling window in milliseconds.
    pub speed_window_ms: u64,
    /// How long a cancelled task stays visible before removal, in milliseconds.
    pub cancel_linger_ms: u64,
    /// How long an "already exists" task stays visible before removal, in milliseconds.
    pub already_exists_linger_ms: u64,
    /// Upper bound on how long a cancel waits for the worker to stop, in milliseconds.
    pub cancel_wait_ms: u64,
    /// Capacity of the task event channel.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            buffer_size: 8192,
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            progress_interval_ms: 150,
            speed_window_ms: 1000,
            cancel_linger_ms: 1500,
            already_exists_linger_ms: 3000,
            cancel_wait_ms: 2000,
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn low_speed_time(&self) -> Duration {
        Duration::from_secs(self.low_speed_time_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn speed_window(&self) -> Duration {
        Duration::from_millis(self.speed_window_ms)
    }

    pub fn cancel_linger(&self) -> Duration {
        Duration::from_millis(self.cancel_linger_ms)
    }

    pub fn already_exists_linger(&self) -> Duration {
        Duration::from_millis(self.already_exists_linger_ms)
    }

    pub fn cancel_wait(&self) -> Duration {
        Duration::from_millis(self.cancel_wait_ms)
    }
}

/// User configuration loaded from `~/.config/romget/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Folder downloads are written into.
    pub download_dir: PathBuf,
    /// Preferred region tag, e.g. "USA". `None` means any.
    #[serde(default)]
    pub region: Option<String>,
    /// File extension filter for listings (e.g. "zip").
    #[serde(default)]
    pub extension: Option<String>,
    /// Named listing URLs, e.g. `gb = "https://mirror.example/gb/"`.
    #[serde(default)]
    pub platforms: BTreeMap<String, String>,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            region: None,
            extension: None,
            platforms: BTreeMap::new(),
            queue: QueueConfig::default(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|h| PathBuf::from(h).join("Downloads").join("romget"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("romget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AppConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = AppConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: AppConfig = toml::from_str(&data)?;
    Ok(cfg)
}
