use std::time::Duration;

use chrono_tz::Tz;
use receipt_printer::NetworkTimeouts;

/// Agent configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | STORE_URL | http://localhost:54321 | Job store base URL |
/// | STORE_API_KEY | (empty) | Key sent as `apikey` and bearer token |
/// | RESTAURANT_ID | (empty) | Restaurant whose jobs are printed; idle when empty |
/// | POLL_INTERVAL_SECS | 5 | Seconds between poll cycles |
/// | CONFIG_REFRESH_SECS | 60 | Seconds between printer config refreshes |
/// | CLIENT_ID | print-agent | Agent name reported in heartbeats |
/// | HEARTBEAT_INTERVAL_SECS | 10 | Seconds between heartbeats; 0 disables them |
/// | PAPER_WIDTH | 48 | Default receipt width in columns |
/// | PRINT_TIMEZONE | UTC | Zone for receipt dates when the layout names none |
/// | NETWORK_CONNECT_TIMEOUT_MS | 5000 | TCP connect timeout |
/// | NETWORK_WRITE_TIMEOUT_MS | 10000 | TCP write + close timeout |
/// | USB_WRITE_TIMEOUT_MS | 10000 | USB bulk transfer timeout |
/// | DISCOVER_ON_START | false | Log LAN and USB printers at startup |
/// | LOG_LEVEL | info | Log filter when RUST_LOG is unset |
/// | LOG_JSON | false | JSON log lines |
/// | LOG_DIR | (unset) | Write daily rolling log files here |
///
/// # Example
///
/// ```ignore
/// RESTAURANT_ID=3f2a STORE_API_KEY=secret cargo run -p print-agent
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub store_url: String,
    pub store_api_key: String,
    pub restaurant_id: String,
    pub poll_interval: Duration,
    pub config_refresh: Duration,
    pub client_id: String,
    pub heartbeat_interval: Duration,
    pub paper_width: usize,
    pub timezone: Tz,
    pub network_connect_timeout: Duration,
    pub network_write_timeout: Duration,
    pub usb_write_timeout: Duration,
    pub discover_on_start: bool,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

impl AgentConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self {
            store_url: std::env::var("STORE_URL")
                .unwrap_or_else(|_| "http://localhost:54321".into()),
            store_api_key: std::env::var("STORE_API_KEY").unwrap_or_default(),
            restaurant_id: std::env::var("RESTAURANT_ID").unwrap_or_default(),
            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL_SECS", 5).max(1)),
            config_refresh: Duration::from_secs(env_parse("CONFIG_REFRESH_SECS", 60)),
            client_id: std::env::var("CLIENT_ID")
                .ok()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| "print-agent".into()),
            heartbeat_interval: Duration::from_secs(env_parse("HEARTBEAT_INTERVAL_SECS", 10)),
            paper_width: env_parse("PAPER_WIDTH", 48),
            timezone: std::env::var("PRINT_TIMEZONE")
                .ok()
                .and_then(|tz| tz.parse().ok())
                .unwrap_or(chrono_tz::UTC),
            network_connect_timeout: Duration::from_millis(env_parse(
                "NETWORK_CONNECT_TIMEOUT_MS",
                5000,
            )),
            network_write_timeout: Duration::from_millis(env_parse(
                "NETWORK_WRITE_TIMEOUT_MS",
                10000,
            )),
            usb_write_timeout: Duration::from_millis(env_parse("USB_WRITE_TIMEOUT_MS", 10000)),
            discover_on_start: env_parse("DISCOVER_ON_START", false),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
        }
    }

    pub fn network_timeouts(&self) -> NetworkTimeouts {
        NetworkTimeouts {
            connect: self.network_connect_timeout,
            write: self.network_write_timeout,
            ..NetworkTimeouts::default()
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
