use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL of the raw observation table, or a local path for offline use.
    #[serde(default = "default_source_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub strategy: RefreshStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Stock at or below this count gets the alert color.
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
    /// Template for the per-POI summary text. Placeholders: {name},
    /// {poi_type}, {address}, {quantity}, {observed_at}.
    #[serde(default = "default_summary_template")]
    pub summary_template: String,
    /// chrono format string for {observed_at} in the summary.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// How the service keeps its derived tables current.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStrategy {
    /// Recompute on demand, reuse the result for one refresh interval.
    Memoize,
    /// Recompute on a fixed schedule in a background task.
    #[default]
    Background,
}

impl RefreshStrategy {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Memoize => "memoize",
            Self::Background => "background",
        }
    }
}

impl Display for RefreshStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown refresh strategy: {0}")]
pub struct RefreshStrategyParseError(pub String);

impl FromStr for RefreshStrategy {
    type Err = RefreshStrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memoize" | "memoized" | "on_demand" => Ok(Self::Memoize),
            "background" | "scheduled" => Ok(Self::Background),
            _ => Err(RefreshStrategyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_url: Option<String>,
    pub low_stock_threshold: Option<i64>,
    pub refresh_interval_secs: Option<u64>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/maskstock/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(source_url) = overrides.source_url {
            self.source.url = source_url;
        }
        if let Some(threshold) = overrides.low_stock_threshold {
            self.display.low_stock_threshold = threshold;
        }
        if let Some(interval_secs) = overrides.refresh_interval_secs {
            self.refresh.interval_secs = interval_secs;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"[source]
url = "https://storage.googleapis.com/momask/df_full.gz"
request_timeout_secs = 12

[refresh]
interval_secs = 300
strategy = "background"

[display]
low_stock_threshold = 500
summary_template = "名稱: {name}({poi_type})\n地址: {address}\n現時口罩數量: {quantity}\n最後更新時間: {observed_at}"
timestamp_format = "%Y年%m月%d日 %H時%M分"

[server]
host = "127.0.0.1"
port = 3080
"#;
        template.to_string()
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
            strategy: RefreshStrategy::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: default_low_stock_threshold(),
            summary_template: default_summary_template(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_source_url() -> String {
    "https://storage.googleapis.com/momask/df_full.gz".to_string()
}

fn default_request_timeout_secs() -> u64 {
    12
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_low_stock_threshold() -> i64 {
    500
}

fn default_summary_template() -> String {
    "名稱: {name}({poi_type})\n地址: {address}\n現時口罩數量: {quantity}\n最後更新時間: {observed_at}"
        .to_string()
}

fn default_timestamp_format() -> String {
    "%Y年%m月%d日 %H時%M分".to_string()
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3080
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigOverrides, RefreshStrategy};

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.display.low_stock_threshold, 500);
        assert_eq!(config.refresh.interval_secs, 300);
        assert_eq!(config.refresh.strategy, RefreshStrategy::Background);
        assert!(config.source.url.starts_with("https://"));
    }

    #[test]
    fn template_round_trips() {
        let parsed: Config =
            toml::from_str(&Config::default_template()).expect("template must parse");
        assert_eq!(parsed.display.low_stock_threshold, 500);
        assert_eq!(parsed.server.port, 3080);
        assert!(parsed.display.summary_template.contains("{quantity}"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[display]
low_stock_threshold = 200
"#,
        )
        .expect("partial config must parse");
        assert_eq!(parsed.display.low_stock_threshold, 200);
        assert_eq!(parsed.refresh.interval_secs, 300);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            source_url: Some("./fixtures/stock.csv".to_string()),
            low_stock_threshold: Some(100),
            refresh_interval_secs: Some(900),
        });
        assert_eq!(config.source.url, "./fixtures/stock.csv");
        assert_eq!(config.display.low_stock_threshold, 100);
        assert_eq!(config.refresh.interval_secs, 900);
    }

    #[test]
    fn parses_strategy_spellings() {
        assert_eq!(
            "memoize".parse::<RefreshStrategy>().unwrap(),
            RefreshStrategy::Memoize
        );
        assert_eq!(
            "Scheduled".parse::<RefreshStrategy>().unwrap(),
            RefreshStrategy::Background
        );
        assert!("eager".parse::<RefreshStrategy>().is_err());
    }
}
