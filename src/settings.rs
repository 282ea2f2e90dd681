//! Server settings, resolved in layers:
//!
//! 1. compiled [`Settings::default()`]
//! 2. `~/.crudkit/settings.json`, overlaid key by key
//! 3. `CRUDKIT_*` environment variables
//! 4. CLI flags, applied by the binary

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crudkit_server::ServerConfig;
use crudkit_store::{BackendType, StorageConfig};
use crudkit_telemetry::TelemetryConfig;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, Level};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid setting {key}: {detail}")]
    Invalid { key: &'static str, detail: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    /// Shared token required on resource routes. Never written back out.
    #[serde(skip_serializing, deserialize_with = "secret_opt")]
    pub auth_token: Option<SecretString>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            auth_token: None,
            log_level: "info".into(),
            log_json: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_take: u64,
    pub cache_max_age_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_take: crudkit_server::DEFAULT_MAX_TAKE,
            cache_max_age_secs: crudkit_server::DEFAULT_CACHE_MAX_AGE,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub backend: String,
    /// Database path (relational) or account label (tables).
    #[serde(skip_serializing, deserialize_with = "secret_opt")]
    pub connection_string: Option<SecretString>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: BackendType::Memory.as_str().into(),
            connection_string: None,
        }
    }
}

fn secret_opt<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

impl Settings {
    pub fn storage_config(&self) -> Result<StorageConfig> {
        let backend = BackendType::from_str(&self.storage.backend).map_err(|e| {
            SettingsError::Invalid {
                key: "storage.backend",
                detail: e.to_string(),
            }
        })?;
        Ok(StorageConfig {
            backend,
            connection_string: self.storage.connection_string.clone(),
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            request_timeout_secs: self.server.request_timeout_secs,
            auth_token: self.auth_token.clone(),
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: parse_level(&self.log_level).unwrap_or(Level::INFO),
            json: self.log_json,
            ..TelemetryConfig::default()
        }
    }
}

/// Resolve the path to the settings file (`~/.crudkit/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".crudkit").join("settings.json")
}

/// Load settings from `path`, then apply process environment overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn load_file(path: &Path) -> Result<Settings> {
    let mut settings = serde_json::to_value(Settings::default())?;

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(?path, "overlaying settings file");
            overlay(&mut settings, serde_json::from_str(&content)?);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?path, "no settings file, using defaults");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(serde_json::from_value(settings)?)
}

/// Overlay `patch` onto `base` in place.
///
/// Objects are walked key by key, null leaves in `patch` keep the base value
/// and every other value (arrays included) replaces it wholesale.
pub fn overlay(base: &mut Value, patch: Value) {
    let Value::Object(entries) = patch else {
        *base = patch;
        return;
    };
    let fields = match base {
        Value::Object(fields) => fields,
        other => {
            *other = Value::Object(entries);
            return;
        }
    };
    for (key, value) in entries.into_iter().filter(|(_, v)| !v.is_null()) {
        match fields.get_mut(&key) {
            Some(slot) => overlay(slot, value),
            None => {
                fields.insert(key, value);
            }
        }
    }
}

/// Apply `CRUDKIT_*` overrides read through `env`. Invalid values are logged
/// and ignored.
pub fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(v) = read("CRUDKIT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("CRUDKIT_PORT").and_then(|v| checked("CRUDKIT_PORT", &v, |s| parse_in(s, 1..=u16::MAX))) {
        settings.server.port = v;
    }
    if let Some(v) = read("CRUDKIT_MAX_TAKE").and_then(|v| checked("CRUDKIT_MAX_TAKE", &v, |s| parse_in(s, 1..=10_000))) {
        settings.server.max_take = v;
    }
    if let Some(v) = read("CRUDKIT_CACHE_MAX_AGE")
        .and_then(|v| checked("CRUDKIT_CACHE_MAX_AGE", &v, |s| parse_in(s, 0..=31_536_000)))
    {
        settings.server.cache_max_age_secs = v;
    }
    if let Some(v) = read("CRUDKIT_BACKEND")
        .and_then(|v| checked("CRUDKIT_BACKEND", &v, |s| BackendType::from_str(s).ok()))
    {
        settings.storage.backend = v.as_str().into();
    }
    if let Some(v) = read("CRUDKIT_CONNECTION_STRING") {
        settings.storage.connection_string = Some(SecretString::from(v));
    }
    if let Some(v) = read("CRUDKIT_AUTH_TOKEN") {
        settings.auth_token = Some(SecretString::from(v));
    }
    if let Some(v) = read("CRUDKIT_LOG_LEVEL").and_then(|v| checked("CRUDKIT_LOG_LEVEL", &v, parse_level)) {
        settings.log_level = v.to_string().to_lowercase();
    }
    if let Some(v) = read("CRUDKIT_LOG_JSON").and_then(|v| checked("CRUDKIT_LOG_JSON", &v, parse_bool)) {
        settings.log_json = v;
    }
}

fn checked<T>(name: &str, val: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let result = parse(val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and keep it only when it falls within `bounds`.
pub fn parse_in<T>(val: &str, bounds: std::ops::RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| bounds.contains(n))
}

pub fn parse_level(val: &str) -> Option<Level> {
    Level::from_str(val.trim()).ok()
}
