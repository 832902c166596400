//! Server configuration
//!
//! Configuration is loaded from environment variables; every knob has a
//! sensible default so a bare `slidecast` starts in dev mode.

use std::env;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Public base URL for join-link generation (optional)
    pub public_base_url: Option<String>,

    /// Credential verification
    pub auth: AuthConfig,

    /// Session sweep configuration
    pub session: SessionConfig,

    /// WebSocket keepalive configuration
    pub ws: WsConfig,

    /// Demo configuration
    pub demo: DemoConfig,
}

/// Auth-related configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared secret for verifying presenter/participant tokens
    pub token_secret: String,
    /// Clock skew tolerance for token expiry checks
    pub clock_skew_secs: u64,
}

/// Session-related configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cadence of the inactivity sweeper
    pub sweep_interval: Duration,
    /// Idle time after which a session is evicted
    pub max_idle: Duration,
}

/// WebSocket-related configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// Outbound channel depth per connection
    pub channel_capacity: usize,
}

/// Demo mode configuration
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Whether a demo presentation is seeded at startup
    pub enabled: bool,
    /// Access code of the seeded presentation
    pub access_code: String,
    /// Presenter principal allowed to control it
    pub presenter_id: String,
    /// Number of slides in the seeded deck
    pub slide_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: None,
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
            ws: WsConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "dev-secret-change-me".to_string(),
            clock_skew_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10 * 60),
            max_idle: Duration::from_secs(30 * 60),
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            channel_capacity: 32,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            access_code: "ABC123".to_string(),
            presenter_id: "demo-presenter".to_string(),
            slide_count: 3,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Ok(url) = env::var("PUBLIC_BASE_URL")
            && !url.is_empty()
        {
            config.public_base_url = Some(url);
        }

        // Auth config
        if let Ok(secret) = env::var("TOKEN_SECRET")
            && !secret.is_empty()
        {
            config.auth.token_secret = secret;
        }
        if let Ok(val) = env::var("TOKEN_CLOCK_SKEW_SECS")
            && let Ok(secs) = val.parse()
        {
            config.auth.clock_skew_secs = secs;
        }

        // Session config
        if let Ok(val) = env::var("SWEEP_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.sweep_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("SESSION_MAX_IDLE_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.max_idle = Duration::from_secs(secs);
        }

        // WebSocket config
        if let Ok(val) = env::var("PING_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.ws.ping_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("PING_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.ws.ping_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("WS_CHANNEL_CAPACITY")
            && let Ok(capacity) = val.parse()
        {
            config.ws.channel_capacity = capacity;
        }

        // Demo config
        if let Ok(val) = env::var("DEMO_ENABLED") {
            config.demo.enabled = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(code) = env::var("DEMO_ACCESS_CODE")
            && !code.is_empty()
        {
            config.demo.access_code = code;
        }
        if let Ok(id) = env::var("DEMO_PRESENTER_ID")
            && !id.is_empty()
        {
            config.demo.presenter_id = id;
        }
        if let Ok(val) = env::var("DEMO_SLIDE_COUNT")
            && let Ok(count) = val.parse()
        {
            config.demo.slide_count = count;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.session.sweep_interval, Duration::from_secs(600));
        assert_eq!(config.session.max_idle, Duration::from_secs(1800));
        assert!(!config.demo.enabled);
    }

    #[test]
    fn test_config_from_env() {
        // This test doesn't set env vars, so it should return defaults
        let config = Config::from_env();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.ws.channel_capacity, 32);
    }
}
