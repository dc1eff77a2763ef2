//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// TOML-backed file configuration for sarfetch defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Default concurrency (1..=64).
    pub concurrency: Option<u8>,
    /// Verify declared checksums.
    pub verify_checksums: Option<bool>,
    /// Attempts per request, including the first (1..=10).
    pub max_attempts: Option<u32>,
    /// Base delay of the exponential backoff in milliseconds.
    pub retry_base_delay_ms: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Temporary storage credentials endpoint.
    pub credentials_url: Option<String>,
    /// Storage region.
    pub region: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=64).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=64");
        }

        if let Some(max_attempts) = self.max_attempts
            && !(1..=10).contains(&max_attempts)
        {
            bail!("Invalid config value for `max_attempts`: {max_attempts}. Expected range: 1..=10");
        }

        if let Some(delay) = self.retry_base_delay_ms
            && delay > 60_000
        {
            bail!(
                "Invalid config value for `retry_base_delay_ms`: {delay}. Expected range: 0..=60000"
            );
        }

        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        if let Some(url) = self.credentials_url.as_deref()
            && url::Url::parse(url).is_err()
        {
            bail!("Invalid config value for `credentials_url`: {url:?} is not a URL");
        }

        if self.region.as_deref().is_some_and(|region| region.trim().is_empty()) {
            bail!("Invalid config value for `region`: must not be empty");
        }

        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config (defaults when no file exists).
    pub config: FileConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/sarfetch/config.toml`
/// 2. `$HOME/.config/sarfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("sarfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("sarfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` or the default path, if present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(resolve_default_config_path);
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        });
    };

    if explicit.is_none() && !path_ref.exists() {
        return Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        });
    }

    let raw = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file '{}'", path_ref.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path_ref.display()))?;
    Ok(LoadedConfig {
        path,
        config,
        loaded_from_file: true,
    })
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}
