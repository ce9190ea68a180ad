//! Runtime configuration, read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::error::{Error, Result};

/// Bearer credential settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify HS256 tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim.
    pub jwt_issuer: String,
    /// Lifetime of tokens issued by [`issue_token`](crate::api::auth::issue_token).
    pub token_lifetime_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "fleetapi".into(),
            token_lifetime_secs: 3600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Per-tenant live channel buffer.
    pub broadcast_buffer_size: usize,
    pub synthetic_enabled: bool,
    pub synthetic_interval: Duration,
    pub heartbeat_interval: Duration,
    pub auth: AuthConfig,
    /// JSON fixture loaded into the in-memory store at startup.
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9999)),
            broadcast_buffer_size: 100,
            synthetic_enabled: true,
            synthetic_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(10),
            auth: AuthConfig::default(),
            seed_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to
    /// defaults for absent keys. `JWT_SECRET` is required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = parse("JWT_SECRET")
            .ok_or_else(|| Error::Config("JWT_SECRET must be set".to_string()))?;

        Ok(Self {
            bind_addr: parsed(&parse, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            broadcast_buffer_size: parsed(&parse, "BROADCAST_BUFFER_SIZE")?
                .unwrap_or(defaults.broadcast_buffer_size),
            synthetic_enabled: parsed(&parse, "SYNTHETIC_ENABLED")?
                .unwrap_or(defaults.synthetic_enabled),
            synthetic_interval: parsed(&parse, "SYNTHETIC_INTERVAL_SECS")?
                .map_or(defaults.synthetic_interval, Duration::from_secs),
            heartbeat_interval: parsed(&parse, "HEARTBEAT_INTERVAL_SECS")?
                .map_or(defaults.heartbeat_interval, Duration::from_secs),
            auth: AuthConfig {
                jwt_secret,
                jwt_issuer: parse("JWT_ISSUER").unwrap_or(defaults.auth.jwt_issuer),
                token_lifetime_secs: parsed(&parse, "TOKEN_LIFETIME_SECS")?
                    .unwrap_or(defaults.auth.token_lifetime_secs),
            },
            seed_file: parse("SEED_FILE").map(PathBuf::from),
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.bind_addr.port(), 9999);
        assert_eq!(config.broadcast_buffer_size, 100);
        assert_eq!(config.synthetic_interval, Duration::from_secs(60));
        assert!(config.synthetic_enabled);
        assert_eq!(config.auth.jwt_issuer, "fleetapi");
        assert_eq!(config.seed_file, None);
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("BROADCAST_BUFFER_SIZE", "8"),
            ("SYNTHETIC_ENABLED", "false"),
            ("SYNTHETIC_INTERVAL_SECS", "5"),
            ("SEED_FILE", "fixtures/seed.json"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.broadcast_buffer_size, 8);
        assert!(!config.synthetic_enabled);
        assert_eq!(config.synthetic_interval, Duration::from_secs(5));
        assert_eq!(config.seed_file, Some(PathBuf::from("fixtures/seed.json")));
    }

    #[test]
    fn secret_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("BROADCAST_BUFFER_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BROADCAST_BUFFER_SIZE"));
    }
}
