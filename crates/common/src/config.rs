use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Granularity, Result, SignalLabel};

const OANDA_PRACTICE_URL: &str = "https://api-fxpractice.oanda.com";
const OANDA_LIVE_URL: &str = "https://api-fxtrade.oanda.com";

/// All configuration loaded at startup: credentials from environment
/// variables, signal settings from a TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    // Market data
    pub oanda_access_token: String,
    pub oanda_base_url: String,

    // Notification channels. `None` disables the channel.
    pub twilio: Option<TwilioConfig>,
    pub telegram_token: Option<String>,

    // Subscriber registry
    pub database_url: String,

    // Status endpoint
    pub status_port: u16,

    pub signal: SignalSettings,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender, e.g. `whatsapp:+14155238886`.
    pub from_number: String,
    /// Single destination of the direct WhatsApp channel.
    pub to_number: String,
}

impl Config {
    /// Load configuration from the process environment.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let oanda_access_token = var("OANDA_ACCESS_TOKEN").ok_or_else(|| {
            Error::Config("required variable 'OANDA_ACCESS_TOKEN' is not set".into())
        })?;

        let oanda_base_url = match var("OANDA_ENVIRONMENT").as_deref().unwrap_or("practice") {
            "practice" => OANDA_PRACTICE_URL.to_string(),
            "live" => OANDA_LIVE_URL.to_string(),
            other => {
                return Err(Error::Config(format!(
                    "OANDA_ENVIRONMENT must be 'practice' or 'live', got '{other}'"
                )))
            }
        };

        let twilio_vars = [
            var("TWILIO_ACCOUNT_SID"),
            var("TWILIO_AUTH_TOKEN"),
            var("TWILIO_WHATSAPP_NUMBER"),
            var("TO_WHATSAPP_NUMBER"),
        ];
        let twilio = match twilio_vars {
            [Some(account_sid), Some(auth_token), Some(from_number), Some(to_number)] => {
                Some(TwilioConfig { account_sid, auth_token, from_number, to_number })
            }
            [None, None, None, None] => None,
            _ => {
                warn!("Twilio credentials are incomplete; WhatsApp channel disabled");
                None
            }
        };

        let status_port = match var("STATUS_PORT") {
            Some(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("STATUS_PORT is not a port number: '{v}'")))?,
            None => 8000,
        };

        let settings_path =
            var("CRTBOT_CONFIG_PATH").unwrap_or_else(|| "config/crtbot.toml".to_string());

        Ok(Config {
            oanda_access_token,
            oanda_base_url,
            twilio,
            telegram_token: var("TELEGRAM_TOKEN"),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://crtbot.db?mode=rwc".to_string()),
            status_port,
            signal: SignalSettings::load(&settings_path)?,
        })
    }
}

/// Candle-pair rule used by the CRT classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrtRule {
    /// The sweep candle must also stay inside the prior range on the other side.
    #[default]
    Strict,
    /// Sweep plus reversal close only.
    Lenient,
}

/// Signal evaluation settings (TOML).
///
/// Example `config/crtbot.toml`:
/// ```toml
/// instrument = "XAU_USD"
/// granularities = ["H1", "H4"]
/// alignment_minute = 30
/// time_zone = "Asia/Kolkata"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalSettings {
    pub instrument: String,
    pub granularities: Vec<Granularity>,
    /// Minute of the hour at which evaluation happens.
    pub alignment_minute: u32,
    /// Seconds after the aligned minute starts during which a tick still counts.
    pub tick_tolerance_secs: u32,
    pub time_zone: Tz,
    /// Force the trading window open (development only).
    pub test_override_window: bool,
    /// Replace the classifier with a constant result (development only).
    pub forced_signal: Option<SignalLabel>,
    pub crt_rule: CrtRule,
    pub dedup_capacity: usize,
    pub candle_count: usize,
    pub tick_interval_ms: u64,
    pub fetch_timeout_secs: u64,
    pub send_timeout_secs: u64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            instrument: "XAU_USD".to_string(),
            granularities: vec![Granularity::H1, Granularity::H4],
            alignment_minute: 30,
            tick_tolerance_secs: 5,
            time_zone: chrono_tz::Asia::Kolkata,
            test_override_window: false,
            forced_signal: None,
            crt_rule: CrtRule::Strict,
            dedup_capacity: 10,
            candle_count: 3,
            tick_interval_ms: 1000,
            fetch_timeout_secs: 15,
            send_timeout_secs: 15,
        }
    }
}

impl SignalSettings {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No signal settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid signal settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instrument.trim().is_empty() {
            return Err(Error::Config("instrument must not be empty".into()));
        }
        if self.granularities.is_empty() {
            return Err(Error::Config("at least one granularity is required".into()));
        }
        if self.alignment_minute >= 60 {
            return Err(Error::Config(format!(
                "alignment_minute must be below 60, got {}",
                self.alignment_minute
            )));
        }
        if self.tick_tolerance_secs >= 60 {
            return Err(Error::Config(format!(
                "tick_tolerance_secs must be below 60, got {}",
                self.tick_tolerance_secs
            )));
        }
        if self.dedup_capacity == 0 {
            return Err(Error::Config("dedup_capacity must be at least 1".into()));
        }
        if self.candle_count < 3 {
            return Err(Error::Config(format!(
                "candle_count must be at least 3, got {}",
                self.candle_count
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be positive".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(Error::Config("fetch_timeout_secs must be positive".into()));
        }
        if self.send_timeout_secs == 0 {
            return Err(Error::Config("send_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}
