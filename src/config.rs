use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use url::Url;

/// Default location of the data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "taobao_monitor_data";

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "taobao_monitor_data/config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub price_calculation: PriceCalculationConfig,
    pub directories: DirectoriesConfig,
    pub wx_push: WxPushConfig,
    pub monitor: MonitorConfig,
    pub harvest: HarvestConfig,
    pub claim: ClaimConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub page_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceCalculationConfig {
    pub low_price_multiplier: f64,
    pub high_price_multiplier: f64,
    pub low_price_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoriesConfig {
    pub data_dir: PathBuf,
    pub browser_data_dir: PathBuf,
    pub records_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WxPushConfig {
    pub default_spt: String,
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub settle_min_ms: u64,
    pub settle_jitter_ms: u64,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub error_pause_min_ms: u64,
    pub error_pause_max_ms: u64,
    pub save_debug_info: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub max_wait_secs: u64,
    pub poll_interval_secs: u64,
    pub grace_secs: u64,
    pub key_cookies: Vec<String>,
    pub required_cookie: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    pub initial_settle_ms: u64,
    pub post_run_wait_ms: u64,
    pub success_marker: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            chrome_path: None,
            page_timeout_secs: 30,
        }
    }
}

impl Default for PriceCalculationConfig {
    fn default() -> Self {
        Self {
            low_price_multiplier: 1.5,
            high_price_multiplier: 1.2,
            low_price_threshold: 2.0,
        }
    }
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            browser_data_dir: home.join(".taobao_browser_data"),
            records_dir: PathBuf::from("."),
        }
    }
}

impl Default for WxPushConfig {
    fn default() -> Self {
        Self {
            default_spt: String::new(),
            api_url: "https://wxpusher.zjiecode.com/api/send/message/simple-push".to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 5000,
            settle_min_ms: 3000,
            settle_jitter_ms: 2000,
            pacing_min_ms: 2000,
            pacing_max_ms: 4000,
            error_pause_min_ms: 3000,
            error_pause_max_ms: 6000,
            save_debug_info: true,
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 600,
            poll_interval_secs: 1,
            grace_secs: 5,
            key_cookies: ["openid", "access_token", "appid", "acctype"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            required_cookie: "access_token".to_string(),
        }
    }
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            initial_settle_ms: 3000,
            post_run_wait_ms: 1000,
            success_marker: "恭喜".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the JSON config at `path`, writing the defaults there first if the file
    /// does not exist yet. A file that cannot be parsed is replaced by defaults in
    /// memory (the file itself is left untouched for the user to fix).
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found, writing defaults to {}", path.display());
            AppConfig::default().write_to(path)?;
        }

        let mut config = match Self::from_sources(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Config file {} is unreadable ({}), using defaults", path.display(), e);
                AppConfig::default()
            }
        };

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    fn from_sources(path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path).format(FileFormat::Json).required(false))
            // Environment overrides, e.g. TAO__WX_PUSH__DEFAULT_SPT
            .add_source(
                Environment::with_prefix("TAO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Message(format!("Failed to create config directory: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| ConfigError::Message(format!("Failed to write config: {}", e)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pricing = &self.price_calculation;
        if pricing.low_price_multiplier <= 0.0 || pricing.high_price_multiplier <= 0.0 {
            return Err(ConfigError::Message("Price multipliers must be greater than 0".into()));
        }

        if pricing.low_price_threshold <= 0.0 {
            return Err(ConfigError::Message("low_price_threshold must be greater than 0".into()));
        }

        if self.monitor.max_retries == 0 {
            return Err(ConfigError::Message("monitor.max_retries must be greater than 0".into()));
        }

        if self.monitor.pacing_min_ms > self.monitor.pacing_max_ms {
            return Err(ConfigError::Message("monitor.pacing_min_ms cannot exceed pacing_max_ms".into()));
        }

        if self.monitor.error_pause_min_ms > self.monitor.error_pause_max_ms {
            return Err(ConfigError::Message(
                "monitor.error_pause_min_ms cannot exceed error_pause_max_ms".into(),
            ));
        }

        if self.harvest.key_cookies.is_empty() {
            return Err(ConfigError::Message("harvest.key_cookies cannot be empty".into()));
        }

        if !self.harvest.key_cookies.contains(&self.harvest.required_cookie) {
            return Err(ConfigError::Message(
                "harvest.required_cookie must be one of harvest.key_cookies".into(),
            ));
        }

        if self.harvest.poll_interval_secs == 0 {
            return Err(ConfigError::Message("harvest.poll_interval_secs must be greater than 0".into()));
        }

        if Url::parse(&self.wx_push.api_url).is_err() {
            return Err(ConfigError::Message("Invalid wx_push.api_url format".into()));
        }

        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.directories.data_dir
    }
}
