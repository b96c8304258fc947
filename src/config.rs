use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use url::Url;

use crate::scanner::ScanKind;
use crate::url_match::UrlPattern;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scraper: ScraperConfig,
    pub monitor: MonitorConfig,
    pub notifications: NotificationsConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub chrome_path: Option<String>,
    /// Chrome profile directory holding the logged-in session.
    pub user_data_dir: Option<PathBuf>,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Only pages under this pattern are considered for reload.
    pub host_scope: String,
    pub pages: Vec<PageConfig>,
    /// Group URLs whose posts are reported by the feed scanner.
    pub target_groups: Vec<String>,
    pub resume_on_startup: bool,
    pub feed: FeedTimingConfig,
    pub marketplace_intro: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    pub kind: ScanKind,
    /// Address opened when the service starts.
    pub url: String,
    /// Pattern used to recognise the page among open tabs; defaults to `url`.
    #[serde(default, rename = "match")]
    pub match_pattern: Option<String>,
}

impl PageConfig {
    pub fn pattern(&self) -> &str {
        self.match_pattern.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedTimingConfig {
    pub poll_interval_ms: u64,
    pub wait_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub scroll_iterations: u32,
    pub scroll_step_px: i64,
    pub scroll_delay_ms: u64,
    pub see_more_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub recipients: Vec<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub bucket: String,
    pub public_base_url: String,
    pub key_prefix: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("NOTIFIER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("notifications.smtp.recipients")
                    .with_list_parse_key("monitor.target_groups")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if UrlPattern::new(&self.monitor.host_scope).is_err() {
            return Err(ConfigError::Message("Invalid monitor.host_scope pattern".into()));
        }

        if self.monitor.pages.is_empty() {
            return Err(ConfigError::Message("At least one monitored page is required".into()));
        }

        for page in &self.monitor.pages {
            if Url::parse(&page.url).is_err() {
                return Err(ConfigError::Message(format!("Invalid page URL: {}", page.url)));
            }
            if UrlPattern::new(page.pattern()).is_err() {
                return Err(ConfigError::Message(format!("Invalid page pattern: {}", page.pattern())));
            }
        }

        let has_feed = self.monitor.pages.iter().any(|p| p.kind == ScanKind::Feed);
        if has_feed && self.monitor.target_groups.is_empty() {
            return Err(ConfigError::Message("Feed pages require at least one target group".into()));
        }

        for group in &self.monitor.target_groups {
            if Url::parse(group).is_err() {
                return Err(ConfigError::Message(format!("Invalid target group URL: {}", group)));
            }
        }

        if self.monitor.feed.poll_interval_ms == 0 {
            return Err(ConfigError::Message("Feed poll interval must be greater than 0".into()));
        }

        if self.monitor.feed.scroll_iterations == 0 {
            return Err(ConfigError::Message("Feed scroll_iterations must be greater than 0".into()));
        }

        if self.notifications.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if self.notifications.smtp.recipients.is_empty() {
            return Err(ConfigError::Message("At least one email recipient is required".into()));
        }

        if self.upload.enabled {
            if Url::parse(&self.upload.endpoint).is_err() {
                return Err(ConfigError::Message("Invalid upload endpoint URL".into()));
            }
            if Url::parse(&self.upload.public_base_url).is_err() {
                return Err(ConfigError::Message("Invalid upload public_base_url".into()));
            }
            if self.upload.bucket.trim().is_empty() {
                return Err(ConfigError::Message("Upload bucket must not be empty".into()));
            }
        }

        if !self.metrics.endpoint.starts_with('/') {
            return Err(ConfigError::Message("Metrics endpoint must start with '/'".into()));
        }

        Ok(())
    }
}
