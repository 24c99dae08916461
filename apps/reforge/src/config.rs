use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Connection details for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Only the S3 group has required members, and only once any of it is set.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_dir: PathBuf,
    /// Templates go to S3 instead of `storage_dir` when present.
    pub s3: Option<S3Settings>,
    /// Without a key, classification runs on rules alone.
    pub anthropic_api_key: Option<String>,
    /// Gateway or proxy in front of the Messages API.
    pub anthropic_base_url: Option<String>,
    pub llm_model: String,
    pub classify_timeout: Duration,
    pub classify_max_spans: usize,
    pub layout_config_path: Option<PathBuf>,
    pub pdftoppm_path: PathBuf,
    pub thumbnails_enabled: bool,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            storage_dir: optional_env("STORAGE_DIR")
                .unwrap_or_else(|| "./storage".to_string())
                .into(),
            s3: s3_from_env()?,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            anthropic_base_url: optional_env("ANTHROPIC_BASE_URL"),
            llm_model: optional_env("LLM_MODEL")
                .unwrap_or_else(|| crate::llm_client::DEFAULT_MODEL.to_string()),
            classify_timeout: Duration::from_secs(parse_env("CLASSIFY_TIMEOUT_SECS", 20)?),
            classify_max_spans: parse_env("CLASSIFY_MAX_SPANS", 150)?,
            layout_config_path: optional_env("LAYOUT_CONFIG_PATH").map(PathBuf::from),
            pdftoppm_path: optional_env("PDFTOPPM_PATH")
                .unwrap_or_else(|| "pdftoppm".to_string())
                .into(),
            thumbnails_enabled: parse_env("THUMBNAILS_ENABLED", true)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// The S3 group is all-or-nothing: setting the bucket turns it on and makes
/// the rest required.
fn s3_from_env() -> Result<Option<S3Settings>> {
    let Some(bucket) = optional_env("S3_BUCKET") else {
        if optional_env("S3_ENDPOINT").is_some() {
            bail!("S3_ENDPOINT is set but S3_BUCKET is not");
        }
        return Ok(None);
    };
    Ok(Some(S3Settings {
        bucket,
        endpoint: require_env("S3_ENDPOINT")?,
        access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
        secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
    }))
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank are the same thing.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
