//! Runtime configuration, resolved once at startup.
//!
//! The API key comes from the environment (after `.env` is loaded) or, failing
//! that, from a TOML secrets file. Everything else has a default.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::NutriError;

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SECRETS_PATH: &str = "secrets.toml";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(rename = "GROQ_API_KEY")]
    groq_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub request_timeout: Duration,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, NutriError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, NutriError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secrets_path =
            non_empty("NUTRIVISION_SECRETS").unwrap_or_else(|| DEFAULT_SECRETS_PATH.to_string());

        let api_key = non_empty("GROQ_API_KEY")
            .or_else(|| read_secrets_key(Path::new(&secrets_path)))
            .ok_or_else(|| {
                NutriError::Configuration(format!(
                    "Missing GROQ_API_KEY. Add it to .env (local) or {} (hosted).",
                    secrets_path
                ))
            })?;

        let request_timeout = match non_empty("GROQ_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    NutriError::Configuration(format!(
                        "GROQ_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                        raw
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            api_url: non_empty("GROQ_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: non_empty("GROQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout,
            bind_addr: non_empty("NUTRIVISION_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

#[cfg(test)]
impl Config {
    /// Config with the given key and every other field at its default.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

/// A missing, unreadable or malformed secrets file counts as "no key".
fn read_secrets_key(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    match toml::from_str::<SecretsFile>(&raw) {
        Ok(secrets) => secrets.groq_api_key.filter(|k| !k.trim().is_empty()),
        Err(e) => {
            log::warn!("⚠️ Ignoring malformed secrets file {}: {}", path.display(), e);
            None
        }
    }
}
