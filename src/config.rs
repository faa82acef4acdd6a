//! Server configuration.
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `HTTP_PORT` | `port` | `8080` |
//! | `HTTP_READ_TIMEOUT` | `read_timeout` (s) | `0` (off) |
//! | `HTTP_WRITE_TIMEOUT` | `write_timeout` (s) | `0` (off) |
//! | `HTTP_IDLE_TIMEOUT` | `idle_timeout` (s) | `0` (off) |
//! | `HTTP_MAX_HEADER_BYTES` | `max_header_bytes` | `1048576` |
//! | `GRACEFUL_SHUTDOWN_TIMEOUT` | `graceful_shutdown` (s) | `10` |
//! | `ALLOWED_ORIGINS` | `allowed_origins` (comma separated) | `*` |
//!
//! Out-of-range values are clamped back to a default with a warning, see
//! [`Config::validate`]. Values that do not parse at all are errors.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ConfigError;

const DEFAULT_PORT: &str = "8080";
const DEFAULT_MAX_HEADER_BYTES: i64 = 1_048_576;
const DEFAULT_GRACEFUL_SHUTDOWN: i64 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Listening port. A leading `:` is accepted.
    pub port: String,
    pub read_timeout: i64,
    pub write_timeout: i64,
    pub idle_timeout: i64,
    pub max_header_bytes: i64,
    pub graceful_shutdown: i64,
    /// `*` allows every origin. An entry may contain one `*` wildcard.
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_owned(),
            read_timeout: 0,
            write_timeout: 0,
            idle_timeout: 0,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            graceful_shutdown: DEFAULT_GRACEFUL_SHUTDOWN,
            allowed_origins: vec!["*".to_owned()],
        }
    }
}

impl Config {
    /// Reads the process environment, then validates.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every key through `lookup`, then validates. Unset keys keep
    /// their default; every key that fails to parse is reported at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut invalid = Vec::new();

        if let Some(port) = lookup("HTTP_PORT") {
            config.port = port.trim().to_owned();
        }

        let numbers: [(&str, &mut i64); 5] = [
            ("HTTP_READ_TIMEOUT", &mut config.read_timeout),
            ("HTTP_WRITE_TIMEOUT", &mut config.write_timeout),
            ("HTTP_IDLE_TIMEOUT", &mut config.idle_timeout),
            ("HTTP_MAX_HEADER_BYTES", &mut config.max_header_bytes),
            ("GRACEFUL_SHUTDOWN_TIMEOUT", &mut config.graceful_shutdown),
        ];
        for (key, slot) in numbers {
            let Some(raw) = lookup(key) else { continue };
            match raw.trim().parse::<i64>() {
                Ok(n) => *slot = n,
                Err(e) => invalid.push(format!("{key}: {e} (got {raw:?})")),
            }
        }

        if let Some(raw) = lookup("ALLOWED_ORIGINS") {
            let origins: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_owned)
                .collect();
            if !origins.is_empty() {
                config.allowed_origins = origins;
            }
        }

        if !invalid.is_empty() {
            return Err(ConfigError::Invalid(invalid));
        }
        config.validate();
        Ok(config)
    }

    /// Clamps out-of-range values back to safe defaults, logging a warning
    /// for each.
    pub fn validate(&mut self) {
        if self.port.is_empty() {
            warn!("port is empty, defaulting to {DEFAULT_PORT}");
            self.port = DEFAULT_PORT.to_owned();
        }
        if parse_port(&self.port).is_none() {
            warn!(port = %self.port, "invalid port, defaulting to {DEFAULT_PORT}");
            self.port = DEFAULT_PORT.to_owned();
        }

        for (name, value) in [
            ("read_timeout", &mut self.read_timeout),
            ("write_timeout", &mut self.write_timeout),
            ("idle_timeout", &mut self.idle_timeout),
        ] {
            if *value < 0 {
                warn!(value = *value, "{name} is negative, defaulting to 0");
                *value = 0;
            }
        }

        if self.graceful_shutdown < 0 {
            warn!(
                value = self.graceful_shutdown,
                "graceful_shutdown is negative, defaulting to {DEFAULT_GRACEFUL_SHUTDOWN}"
            );
            self.graceful_shutdown = DEFAULT_GRACEFUL_SHUTDOWN;
        }
        if self.max_header_bytes <= 0 {
            warn!(
                value = self.max_header_bytes,
                "max_header_bytes is too low, defaulting to {DEFAULT_MAX_HEADER_BYTES}"
            );
            self.max_header_bytes = DEFAULT_MAX_HEADER_BYTES;
        }
        if self.allowed_origins.is_empty() {
            self.allowed_origins = vec!["*".to_owned()];
        }
    }

    /// The validated port. Falls back to 8080 for a config that skipped
    /// [`validate`](Self::validate).
    pub fn port_number(&self) -> u16 {
        parse_port(&self.port).unwrap_or(8080)
    }

    /// `0.0.0.0:<port>`.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port_number()))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        seconds(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        seconds(self.write_timeout)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        seconds(self.idle_timeout)
    }

    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown.max(0).unsigned_abs())
    }

    pub fn max_header_bytes(&self) -> usize {
        usize::try_from(self.max_header_bytes)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_HEADER_BYTES as usize)
    }
}

fn parse_port(port: &str) -> Option<u16> {
    let port = port.strip_prefix(':').unwrap_or(port);
    port.parse::<u16>().ok().filter(|p| *p > 0)
}

/// `None` for zero, meaning "no timeout".
fn seconds(n: i64) -> Option<Duration> {
    (n > 0).then(|| Duration::from_secs(n.unsigned_abs()))
}

// ── .env files ────────────────────────────────────────────────────────────────

/// Files read by [`load_env_files`] for a given `APP_ENV`, in priority order.
pub fn env_files(app_env: Option<&str>) -> [PathBuf; 2] {
    let specific = match app_env {
        Some("dev") => "config/.env.dev",
        Some("prod") => "config/.env.prod",
        Some("local") => "config/.env.local",
        other => {
            warn!(app_env = ?other, "APP_ENV not set or unknown, using 'local'. Options: dev, prod, local");
            "config/.env.local"
        }
    };
    [PathBuf::from(specific), PathBuf::from("config/.env")]
}

/// Loads `.env` files selected by `APP_ENV` into the process environment.
///
/// Variables already set are never overwritten, so the process environment
/// wins over files and the environment-specific file wins over
/// `config/.env`. Missing files are skipped. Returns the files that were read.
pub fn load_env_files() -> Result<Vec<PathBuf>, ConfigError> {
    let app_env = std::env::var("APP_ENV").ok();
    let mut loaded = Vec::new();

    for path in env_files(app_env.as_deref()) {
        match dotenvy::from_path(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "loaded env file");
                loaded.push(path);
            }
            Err(e) if e.not_found() => debug!(path = %path.display(), "env file not found, skipping"),
            Err(source) => return Err(ConfigError::EnvFile { path, source }),
        }
    }

    if loaded.is_empty() {
        info!("no env files found, using the process environment");
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let c = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.addr().port(), 8080);
        assert_eq!(c.graceful_shutdown(), Duration::from_secs(10));
        assert_eq!(c.read_timeout(), None);
        assert_eq!(c.allowed_origins, vec!["*"]);
    }

    #[test]
    fn reads_every_key() {
        let c = Config::from_lookup(lookup(&[
            ("HTTP_PORT", ":9090"),
            ("HTTP_READ_TIMEOUT", "5"),
            ("HTTP_WRITE_TIMEOUT", "7"),
            ("HTTP_IDLE_TIMEOUT", "60"),
            ("HTTP_MAX_HEADER_BYTES", "16384"),
            ("GRACEFUL_SHUTDOWN_TIMEOUT", "2"),
            ("ALLOWED_ORIGINS", "https://a.io, https://*.b.io"),
        ]))
        .unwrap();

        assert_eq!(c.port_number(), 9090);
        assert_eq!(c.read_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(c.write_timeout(), Some(Duration::from_secs(7)));
        assert_eq!(c.idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(c.max_header_bytes(), 16384);
        assert_eq!(c.graceful_shutdown(), Duration::from_secs(2));
        assert_eq!(c.allowed_origins, vec!["https://a.io", "https://*.b.io"]);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let c = Config::from_lookup(lookup(&[
            ("HTTP_PORT", "70000"),
            ("HTTP_READ_TIMEOUT", "-1"),
            ("HTTP_MAX_HEADER_BYTES", "0"),
            ("GRACEFUL_SHUTDOWN_TIMEOUT", "-5"),
        ]))
        .unwrap();

        assert_eq!(c.port, "8080");
        assert_eq!(c.read_timeout, 0);
        assert_eq!(c.max_header_bytes, 1_048_576);
        assert_eq!(c.graceful_shutdown, 10);
    }

    #[test]
    fn non_numeric_port_is_clamped() {
        let mut c = Config { port: "http".to_owned(), ..Config::default() };
        c.validate();
        assert_eq!(c.port, "8080");
    }

    #[test]
    fn unparsable_values_are_collected() {
        let err = Config::from_lookup(lookup(&[
            ("HTTP_READ_TIMEOUT", "soon"),
            ("GRACEFUL_SHUTDOWN_TIMEOUT", "1.5"),
        ]))
        .unwrap_err();

        match err {
            ConfigError::Invalid(keys) => {
                assert_eq!(keys.len(), 2);
                assert!(keys[0].starts_with("HTTP_READ_TIMEOUT"));
                assert!(keys[1].starts_with("GRACEFUL_SHUTDOWN_TIMEOUT"));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn env_files_follow_app_env() {
        assert_eq!(env_files(Some("dev"))[0], PathBuf::from("config/.env.dev"));
        assert_eq!(env_files(Some("prod"))[0], PathBuf::from("config/.env.prod"));
        assert_eq!(env_files(None)[0], PathBuf::from("config/.env.local"));
        assert_eq!(env_files(Some("staging"))[1], PathBuf::from("config/.env"));
    }
}
