#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::uploader::{Credentials, DEFAULT_CATEGORY};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_DOWNLOAD_DIR: &str = ".";

/// Everything a batch run needs from the environment.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Destination account; only needed when the browser lands on a login page.
    pub credentials: Option<Credentials>,
    /// Authorized YouTube token JSON (`YT_SECRET`).
    pub token_path: PathBuf,
    pub webdriver_url: String,
    pub download_dir: PathBuf,
    pub category: String,
    pub cookies: Option<PathBuf>,
    pub headless: bool,
}

impl MigrationSettings {
    pub fn log_redacted(&self) {
        info!(
            email = self.credentials.as_ref().map(|c| c.email.as_str()).unwrap_or("<unset>"),
            password = if self.credentials.is_some() { "<redacted>" } else { "<unset>" },
            token_path = %self.token_path.display(),
            webdriver_url = %self.webdriver_url,
            download_dir = %self.download_dir.display(),
            category = %self.category,
            cookies = ?self.cookies,
            headless = self.headless,
            "resolved settings"
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub env_path: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub webdriver_url: Option<String>,
    pub category: Option<String>,
    pub headless: Option<bool>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<MigrationSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<MigrationSettings> {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<MigrationSettings> {
    let token_path = lookup_value("YT_SECRET", file_vars, &env_lookup)
        .ok_or_else(|| anyhow!("YT_SECRET not set"))?;

    let email = lookup_value("RUMBLE_EMAIL", file_vars, &env_lookup);
    let password = lookup_value("RUMBLE_PASSWORD", file_vars, &env_lookup);
    let credentials = match (email, password) {
        (Some(email), Some(password)) => Some(Credentials { email, password }),
        (None, None) => None,
        (Some(_), None) => bail!("RUMBLE_EMAIL is set but RUMBLE_PASSWORD is not"),
        (None, Some(_)) => bail!("RUMBLE_PASSWORD is set but RUMBLE_EMAIL is not"),
    };

    let webdriver_url = non_blank(overrides.webdriver_url)
        .or_else(|| lookup_value("WEBDRIVER_URL", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());
    let download_dir = overrides
        .download_dir
        .map(|path| path.to_string_lossy().into_owned())
        .and_then(|value| non_blank(Some(value)))
        .or_else(|| lookup_value("DOWNLOAD_DIR", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_DIR.to_string());
    let category = non_blank(overrides.category)
        .or_else(|| lookup_value("RUMBLE_CATEGORY", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let cookies = lookup_value("YTDLP_COOKIES", file_vars, &env_lookup).map(PathBuf::from);
    let headless = overrides
        .headless
        .or_else(|| {
            lookup_value("BROWSER_HEADLESS", file_vars, &env_lookup)
                .and_then(|value| parse_flag(&value))
        })
        .unwrap_or(false);

    Ok(MigrationSettings {
        credentials,
        token_path: PathBuf::from(token_path),
        webdriver_url,
        download_dir: PathBuf::from(download_dir),
        category,
        cookies,
        headless,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
