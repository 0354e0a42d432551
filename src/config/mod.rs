//! Configuration loading.
//!
//! Every section and field has a default, so a missing or empty
//! `config.toml` yields a runnable (mock-free, local) configuration.

pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use schema::parse_duration;

const CONFIG_ENV: &str = "VOXORDER_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub speech: SpeechConfig,
    pub oracle: OracleConfig,
    pub browser: BrowserConfig,
    pub scraper: ScraperConfig,
    pub actuator: ActuatorConfig,
    pub session: SessionConfig,
}

// ── Server / logging ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ── Speech ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// `"google"` or `"mock"`.
    pub provider: String,
    pub google: GoogleSpeechConfig,
    pub timeout: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            google: GoogleSpeechConfig::default(),
            timeout: "20s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSpeechConfig {
    pub endpoint: String,
    pub api_key: String,
    pub encoding: String,
    pub sample_rate_hz: u32,
    pub language_code: String,
}

impl Default for GoogleSpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://speech.googleapis.com".to_string(),
            api_key: String::new(),
            encoding: "WEBM_OPUS".to_string(),
            sample_rate_hz: 48000,
            language_code: "en-US".to_string(),
        }
    }
}

// ── Oracle ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// `"openai"` (any OpenAI-compatible chat endpoint) or `"rules"`.
    pub provider: String,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout: "30s".to_string(),
        }
    }
}

// ── Browser ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// `"webdriver"` or `"demo"` (in-memory site with a sample menu).
    pub driver: String,
    /// W3C WebDriver endpoint (chromedriver, geckodriver, selenium).
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Upper bound for any single WebDriver command.
    pub command_timeout: String,
    /// Upper bound for waiting on the ordering gate.
    pub gate_timeout: String,
    pub site: SiteConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            driver: "webdriver".to_string(),
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36".to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            command_timeout: "15s".to_string(),
            gate_timeout: "2m".to_string(),
            site: SiteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub login_url: String,
    pub email: String,
    pub password: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.doordash.com/".to_string(),
            login_url: "https://identity.doordash.com/auth?client_id=1666519390426295040&layout=consumer_web&prompt=none&redirect_uri=https%3A%2F%2Fwww.doordash.com%2F&response_type=code&scope=%2A&state=none".to_string(),
            email: String::new(),
            password: String::new(),
        }
    }
}

impl SiteConfig {
    pub fn has_credentials(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

// ── Scraper / actuator ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Pixels scrolled per step.
    pub scroll_step_px: i64,
    /// Consecutive scrolls with no new items before stopping.
    pub idle_scroll_limit: u32,
    /// Consecutive scrolls with no position change before stopping.
    pub stalled_scroll_limit: u32,
    /// Hard ceiling on scroll attempts.
    pub max_scroll_attempts: u32,
    /// Pause after each scroll for the list to render.
    pub settle: String,
    /// Wait for the search box / store page / first items.
    pub initial_wait: String,
    /// Where best-effort failure screenshots go. Empty disables them.
    pub diagnostics_dir: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            scroll_step_px: 800,
            idle_scroll_limit: 3,
            stalled_scroll_limit: 3,
            max_scroll_attempts: 60,
            settle: "400ms".to_string(),
            initial_wait: "10s".to_string(),
            diagnostics_dir: String::new(),
        }
    }
}

impl ScraperConfig {
    pub fn diagnostics_path(&self) -> Option<PathBuf> {
        if self.diagnostics_dir.is_empty() {
            return None;
        }
        Some(PathBuf::from(
            shellexpand::tilde(&self.diagnostics_dir).into_owned(),
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Scroll-and-search attempts before an item is declared not found.
    pub locate_max_attempts: u32,
    pub locate_scroll_step_px: i64,
    /// How long to poll for the detail view / its closing.
    pub modal_timeout: String,
    pub poll_interval: String,
    pub settle: String,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            locate_max_attempts: 25,
            locate_scroll_step_px: 600,
            modal_timeout: "5s".to_string(),
            poll_interval: "250ms".to_string(),
            settle: "300ms".to_string(),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle lifetime of a clarification session.
    pub ttl: String,
    pub sweep_interval: String,
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: "15m".to_string(),
            sweep_interval: "1m".to_string(),
            max_sessions: 1000,
        }
    }
}

/// Parse a configured duration, falling back to `default` with a warning.
pub fn duration_or(value: &str, default: Duration) -> Duration {
    match parse_duration(value) {
        Ok(d) => d,
        Err(e) => {
            warn!("{}; using {:?}", e, default);
            default
        }
    }
}

impl Config {
    /// Load from `$VOXORDER_CONFIG` or the platform config dir.
    pub fn load() -> Result<Self> {
        let path = match std::env::var(CONFIG_ENV) {
            Ok(p) if !p.is_empty() => PathBuf::from(shellexpand::tilde(&p).into_owned()),
            _ => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default().with_env_secrets()),
            },
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default().with_env_secrets());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        schema::validate_bind(&config.server.bind).map_err(anyhow::Error::msg)?;
        Ok(config.with_env_secrets())
    }

    /// Overlay secrets from the environment when the file leaves them blank.
    fn with_env_secrets(mut self) -> Self {
        fill_from_env(&mut self.speech.google.api_key, "VOXORDER_SPEECH_API_KEY");
        fill_from_env(&mut self.oracle.api_key, "VOXORDER_ORACLE_API_KEY");
        fill_from_env(&mut self.browser.site.email, "VOXORDER_SITE_EMAIL");
        fill_from_env(&mut self.browser.site.password, "VOXORDER_SITE_PASSWORD");
        self
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.is_empty() {
        if let Ok(v) = std::env::var(var) {
            *slot = v;
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "voxorder").map(|d| d.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.speech.google.encoding, "WEBM_OPUS");
        assert_eq!(config.speech.google.sample_rate_hz, 48000);
        assert_eq!(config.speech.google.language_code, "en-US");
        assert_eq!(config.session.max_sessions, 1000);
        assert_eq!(config.browser.viewport_width, 1920);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [oracle]
            provider = "rules"

            [scraper]
            idle_scroll_limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.oracle.provider, "rules");
        assert_eq!(config.oracle.timeout, "30s");
        assert_eq!(config.scraper.idle_scroll_limit, 5);
        assert_eq!(config.scraper.max_scroll_attempts, 60);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind = \"0.0.0.0:8080\"\n[session]\nttl = \"30m\""
        )
        .unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(
            duration_or(&config.session.ttl, Duration::from_secs(1)),
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn load_from_rejects_bad_bind() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"nowhere\"").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn duration_or_falls_back() {
        assert_eq!(
            duration_or("soon", Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn diagnostics_disabled_by_default() {
        assert!(ScraperConfig::default().diagnostics_path().is_none());
    }

    #[test]
    fn site_credentials_required_for_login() {
        let mut site = SiteConfig::default();
        assert!(!site.has_credentials());
        site.email = "a@b.c".into();
        site.password = "pw".into();
        assert!(site.has_credentials());
    }
}
