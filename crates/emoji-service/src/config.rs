//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use emoji_core::DEFAULT_STARTING_CREDITS;

/// Default Replicate API base URL.
pub const DEFAULT_REPLICATE_API_URL: &str = "https://api.replicate.com/v1";

/// Default model version used for emoji generation.
pub const DEFAULT_MODEL_VERSION: &str =
    "dee76b5afde21b0f01ed7925f0665b7e879c50ee718c5f78a9d38e04d523cc5e";

/// Time left inside the request timeout for recording a finished generation.
const RECORD_HEADROOM: Duration = Duration::from_secs(5);

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory when built with `rocksdb-backend`
    /// (default: "/data/emoji").
    pub data_dir: String,

    /// JWT issuer base URL; JWKS is fetched from `{auth_base_url}/.well-known/jwks.json`.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "emoji").
    pub auth_audience: String,

    /// Verified emails that carry the admin capability.
    pub admin_emails: Vec<String>,

    /// Credits granted when an account is created lazily.
    pub starting_credits: i64,

    /// Replicate API base URL.
    pub replicate_api_url: String,

    /// Replicate API token. Generation is unavailable without one.
    pub replicate_api_token: Option<String>,

    /// Model version submitted with each prediction.
    pub model_version: String,

    /// Interval between status polls.
    pub poll_interval: Duration,

    /// Deadline for a single generation, measured from submission.
    pub poll_timeout: Duration,

    /// Directory blobs are written to.
    pub blob_dir: String,

    /// Public base URL under which blobs are served.
    pub public_base_url: String,

    /// Copy provider outputs into the blob store (otherwise record the provider URL).
    pub mirror_outputs: bool,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds. `from_env` keeps `poll_timeout` below it.
    pub request_timeout_seconds: u64,

    /// Buffered change events per feed subscriber.
    pub event_buffer: usize,
}

/// Replicate secrets file structure.
#[derive(Debug, Deserialize)]
struct ReplicateSecrets {
    api_token: String,
    #[serde(default)]
    api_url: Option<String>,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_list(name: &str, default: &str) -> Vec<String> {
    env_or(name, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (replicate_api_token, replicate_api_url) = load_replicate_secrets();

        let config = Self {
            listen_addr: env_or("LISTEN_ADDR", &defaults.listen_addr),
            data_dir: env_or("DATA_DIR", &defaults.data_dir),
            auth_base_url: env_or("AUTH_BASE_URL", &defaults.auth_base_url),
            auth_audience: env_or("AUTH_AUDIENCE", &defaults.auth_audience),
            admin_emails: env_list("ADMIN_EMAILS", "")
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            starting_credits: env_parse("STARTING_CREDITS").unwrap_or(defaults.starting_credits),
            replicate_api_url: replicate_api_url.unwrap_or(defaults.replicate_api_url),
            replicate_api_token,
            model_version: env_or("REPLICATE_MODEL_VERSION", &defaults.model_version),
            poll_interval: env_parse("POLL_INTERVAL_MS")
                .map_or(defaults.poll_interval, Duration::from_millis),
            poll_timeout: env_parse("POLL_TIMEOUT_SECONDS")
                .map_or(defaults.poll_timeout, Duration::from_secs),
            blob_dir: env_or("BLOB_DIR", &defaults.blob_dir),
            public_base_url: env_or("PUBLIC_BASE_URL", &defaults.public_base_url),
            mirror_outputs: env_parse("MIRROR_OUTPUTS").unwrap_or(defaults.mirror_outputs),
            cors_origins: env_list("CORS_ORIGINS", "*"),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            event_buffer: env_parse("EVENT_BUFFER").unwrap_or(defaults.event_buffer),
        };
        config.with_bounded_poll_timeout()
    }

    /// Shorten `poll_timeout` so a generation, including recording its output,
    /// finishes inside `request_timeout_seconds`.
    #[must_use]
    pub fn with_bounded_poll_timeout(mut self) -> Self {
        let ceiling =
            Duration::from_secs(self.request_timeout_seconds).saturating_sub(RECORD_HEADROOM);
        if self.poll_timeout > ceiling {
            tracing::warn!(
                poll_timeout_secs = self.poll_timeout.as_secs(),
                request_timeout_secs = self.request_timeout_seconds,
                clamped_to_secs = ceiling.as_secs(),
                "POLL_TIMEOUT_SECONDS exceeds the request timeout, clamping"
            );
            self.poll_timeout = ceiling;
        }
        self
    }

    /// Whether `email` belongs to a configured admin.
    #[must_use]
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}

/// Load the Replicate token from file or environment.
fn load_replicate_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/replicate.json", "../.secrets/replicate.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<ReplicateSecrets>(path) {
            tracing::info!(path = %path, "Loaded Replicate secrets from file");
            return (Some(secrets.api_token), secrets.api_url);
        }
    }

    tracing::debug!("Replicate secrets file not found, using environment variables");
    (
        std::env::var("REPLICATE_API_TOKEN").ok(),
        std::env::var("REPLICATE_API_URL").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/emoji".into(),
            auth_base_url: "https://auth.example.com".into(),
            auth_audience: "emoji".into(),
            admin_emails: Vec::new(),
            starting_credits: DEFAULT_STARTING_CREDITS,
            replicate_api_url: DEFAULT_REPLICATE_API_URL.into(),
            replicate_api_token: None,
            model_version: DEFAULT_MODEL_VERSION.into(),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(30),
            blob_dir: "/data/emoji/blobs".into(),
            public_base_url: "http://localhost:8080/blobs".into(),
            mirror_outputs: true,
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 60,
            event_buffer: emoji_store::events::DEFAULT_FEED_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_generation_cadence() {
        let config = ServiceConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.poll_timeout, Duration::from_secs(30));
        assert!(config.request_timeout_seconds > config.poll_timeout.as_secs());
        assert_eq!(config.starting_credits, 3);
    }

    #[test]
    fn poll_timeout_is_clamped_below_request_timeout() {
        let config = ServiceConfig {
            poll_timeout: Duration::from_secs(120),
            request_timeout_seconds: 60,
            ..ServiceConfig::default()
        }
        .with_bounded_poll_timeout();
        assert_eq!(config.poll_timeout, Duration::from_secs(55));

        let config = ServiceConfig {
            poll_timeout: Duration::from_secs(60),
            request_timeout_seconds: 60,
            ..ServiceConfig::default()
        }
        .with_bounded_poll_timeout();
        assert_eq!(config.poll_timeout, Duration::from_secs(55));
    }

    #[test]
    fn poll_timeout_within_bound_is_kept() {
        let config = ServiceConfig::default().with_bounded_poll_timeout();
        assert_eq!(config.poll_timeout, Duration::from_secs(30));
    }

    #[test]
    fn admin_email_match_is_case_insensitive() {
        let config = ServiceConfig {
            admin_emails: vec!["ops@example.com".into()],
            ..ServiceConfig::default()
        };
        assert!(config.is_admin_email("Ops@Example.com"));
        assert!(!config.is_admin_email("someone@example.com"));
    }
}
