//! Runtime configuration (spec.md §6.4).
//!
//! Layered the way the teacher's `Settings::new` loads `NetworkConfig`: a
//! base file plus environment overrides via the `config` crate, with
//! `dotenvy` loading a local `.env` first so a developer's shell doesn't need
//! every variable exported by hand.
//!
//! spec.md §6.4 names its environment variables literally —
//! `GRID_SCHEDULER_INTERVAL_SEC` is the one `GRID_`-prefixed name, but
//! `PAPER_TRADING`, `API_ENCRYPTION_KEY`, and the per-exchange fallback
//! credential variables are not prefixed. `Environment::with_prefix` can only
//! express one scheme, so the unprefixed variables are read directly and layered
//! over whatever the prefixed/file sources produced.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::exchange::FallbackCredentials;

fn default_scheduler_interval_sec() -> u64 {
    1
}

fn default_paper_trading() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_scheduler_interval_sec")]
    scheduler_interval_sec: u64,
    #[serde(default)]
    store_path: Option<String>,
}

/// Resolved, validated runtime configuration. Constructed once at startup
/// and handed to `runner::build` as a plain value — no process-wide
/// singleton (spec.md §9's "wrap globals in a `RuntimeContext`").
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Scheduler tick period, clamped to `[1, 59]` (`GRID_SCHEDULER_INTERVAL_SEC`).
    pub scheduler_interval_sec: u64,
    /// When true, `ExchangeAdapter` is replaced by `PaperBroker` (`PAPER_TRADING`).
    pub paper_trading: bool,
    /// AES-256 key for at-rest credential encryption, parsed from 64 hex
    /// chars (`API_ENCRYPTION_KEY`). `None` means plaintext storage — dev-only.
    pub api_encryption_key: Option<[u8; 32]>,
    /// Directory backing `JsonFileStore` when no other `Store` is wired in.
    pub store_path: String,
    /// Per-exchange fallback credentials (`API_KEY_ASTER` / `API_KEY_SECRET_ASTER`
    /// and BingX equivalents), used when a wallet has no `apiConfig` entry.
    pub fallback_credentials: FallbackCredentials,
}

impl RuntimeConfig {
    /// Load from `config_path` (if it exists) layered under `GRID_`-prefixed
    /// environment variables, after loading a local `.env` file (if any).
    pub fn load(config_path: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder().set_default("scheduler_interval_sec", default_scheduler_interval_sec() as i64)?;
        if std::path::Path::new(config_path).exists() {
            builder = builder.add_source(File::new(config_path, FileFormat::Toml));
        }
        let raw: RawConfig = builder
            .add_source(Environment::with_prefix("GRID").try_parsing(true))
            .build()?
            .try_deserialize()?;

        let paper_trading = match std::env::var("PAPER_TRADING") {
            Ok(v) => parse_bool(&v).unwrap_or_else(|| {
                log::warn!("PAPER_TRADING={v:?} is not a recognized boolean; defaulting to true");
                default_paper_trading()
            }),
            Err(_) => default_paper_trading(),
        };

        let api_encryption_key = match std::env::var("API_ENCRYPTION_KEY") {
            Ok(hex_key) => Some(parse_encryption_key(&hex_key).map_err(ConfigError::Message)?),
            Err(_) => {
                log::warn!("API_ENCRYPTION_KEY not set; API credentials will be stored in plaintext (dev-only)");
                None
            }
        };

        Ok(Self {
            scheduler_interval_sec: raw.scheduler_interval_sec.clamp(1, 59),
            paper_trading,
            api_encryption_key,
            store_path: raw.store_path.unwrap_or_else(|| "./data".to_string()),
            fallback_credentials: FallbackCredentials::from_env(),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_encryption_key(hex_key: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(hex_key).map_err(|e| format!("API_ENCRYPTION_KEY is not valid hex: {e}"))?;
    bytes.try_into().map_err(|v: Vec<u8>| format!("API_ENCRYPTION_KEY must be 64 hex chars (32 bytes), got {}", v.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_interval_is_clamped() {
        let raw = RawConfig { scheduler_interval_sec: 500, store_path: None };
        assert_eq!(raw.scheduler_interval_sec.clamp(1, 59), 59);
    }

    #[test]
    fn parses_recognized_boolean_spellings() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn rejects_short_encryption_key() {
        assert!(parse_encryption_key("abcd").is_err());
    }

    #[test]
    fn accepts_64_hex_chars() {
        let key = "00".repeat(32);
        assert_eq!(parse_encryption_key(&key).unwrap().len(), 32);
    }
}
