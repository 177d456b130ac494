use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::wine::similarity::Similarity;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub credentials: Credentials,
    pub fuzzy_match_threshold: Similarity,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let credentials = require(&lookup, "CELLAR_CREDENTIALS")?
            .parse::<Credentials>()
            .context("CELLAR_CREDENTIALS must look like 'user:secret,user2:secret2'")?;

        let threshold: f64 = parse_or(&lookup, "FUZZY_MATCH_THRESHOLD", 0.80)?;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("FUZZY_MATCH_THRESHOLD must be between 0.0 and 1.0, got {threshold}");
        }

        let ttl_minutes: u64 = parse_or(&lookup, "SESSION_TTL_MINUTES", 480)?;
        if ttl_minutes == 0 {
            bail!("SESSION_TTL_MINUTES must be at least 1");
        }
        let Some(ttl_secs) = ttl_minutes.checked_mul(60) else {
            bail!("SESSION_TTL_MINUTES is too large, got {ttl_minutes}");
        };

        let max_upload_mb: usize = parse_or(&lookup, "MAX_UPLOAD_MB", 20)?;
        let Some(max_upload_bytes) = max_upload_mb.checked_mul(1024 * 1024) else {
            bail!("MAX_UPLOAD_MB is too large, got {max_upload_mb}");
        };

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            credentials,
            fuzzy_match_threshold: Similarity::from_ratio(threshold),
            session_ttl: Duration::from_secs(ttl_secs),
            max_upload_bytes,
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

/// Username to shared-secret map for session login.
#[derive(Clone, Default)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.0
            .get(username)
            .is_some_and(|secret| secret.as_str() == password)
    }
}

impl FromStr for Credentials {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let mut map = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (user, secret) = entry
                .split_once(':')
                .with_context(|| format!("entry '{entry}' has no ':'"))?;
            let (user, secret) = (user.trim(), secret.trim());
            if user.is_empty() || secret.is_empty() {
                bail!("entry '{entry}' has an empty username or secret");
            }
            map.insert(user.to_string(), secret.to_string());
        }
        if map.is_empty() {
            bail!("no credentials configured");
        }
        Ok(Credentials(map))
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users: Vec<&str> = self.0.keys().map(String::as_str).collect();
        users.sort_unstable();
        f.debug_struct("Credentials").field("users", &users).finish()
    }
}
