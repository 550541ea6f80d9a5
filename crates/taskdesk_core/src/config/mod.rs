use crate::cache::CacheOptions;
use crate::error::{AppError, AppResult};
use crate::reminder::ReminderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "taskdesk";
const CONFIG_FILE_NAME: &str = "config.json";
const STORE_FILE_NAME: &str = "tasks.json";
const SNAPSHOT_FILE_NAME: &str = "cache.json";
const CONFIG_ENV_VAR: &str = "TASKDESK_CONFIG_PATH";
const STORE_ENV_VAR: &str = "TASKDESK_STORE_PATH";
const SNAPSHOT_ENV_VAR: &str = "TASKDESK_SNAPSHOT_PATH";

#[derive(Debug, Clone)]
pub struct Palette {
    pub accent: &'static str,
    pub muted: &'static str,
    pub reset: &'static str,
}

impl Palette {
    pub fn accentize(&self, text: &str) -> String {
        if self.accent.is_empty() {
            text.to_string()
        } else {
            format!("{}{}{}", self.accent, text, self.reset)
        }
    }

    pub fn mutedize(&self, text: &str) -> String {
        if self.muted.is_empty() {
            text.to_string()
        } else {
            format!("{}{}{}", self.muted, text, self.reset)
        }
    }
}

pub fn palette_for_theme(theme: Option<&str>) -> Palette {
    match theme.and_then(canonical_theme_name).as_deref() {
        Some("noir") => Palette {
            accent: "\x1b[38;5;208m",
            muted: "\x1b[38;5;250m",
            reset: "\x1b[0m",
        },
        _ => Palette {
            accent: "",
            muted: "",
            reset: "",
        },
    }
}

pub fn canonical_theme_name(raw: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        return Some("default".into());
    }

    match trimmed {
        "default" | "vanilla" | "light" => Some("default".to_string()),
        "noir" | "dark" | "dark_mode" | "darkmode" => Some("noir".to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub tick_millis: u64,
    pub lookahead_secs: u64,
    pub dwell_secs: u64,
    pub retire_settled: bool,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            lookahead_secs: 300,
            dwell_secs: 30,
            retire_settled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessSettings {
    pub tasks_secs: u64,
    pub profile_secs: u64,
    pub categories_secs: u64,
    /// Zero means the profile image is refetched on every read.
    pub profile_image_secs: u64,
}

impl Default for StalenessSettings {
    fn default() -> Self {
        Self {
            tasks_secs: 30,
            profile_secs: 300,
            categories_secs: 300,
            profile_image_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: Option<String>,
    pub reminders: ReminderSettings,
    pub staleness: StalenessSettings,
    /// Keep a local snapshot of the cache between runs.
    pub snapshot: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: None,
            reminders: ReminderSettings::default(),
            staleness: StalenessSettings::default(),
            snapshot: true,
        }
    }
}

impl Config {
    pub fn reminder_config(&self) -> ReminderConfig {
        ReminderConfig {
            tick: Duration::from_millis(self.reminders.tick_millis.max(1)),
            lookahead: Duration::from_secs(self.reminders.lookahead_secs),
            dwell: Duration::from_secs(self.reminders.dwell_secs),
            retire_settled: self.reminders.retire_settled,
        }
    }

    /// Cache options for this config. The snapshot path is dropped when
    /// snapshots are switched off.
    pub fn cache_options(&self, snapshot_path: Option<PathBuf>) -> CacheOptions {
        CacheOptions {
            tasks_stale_after: Duration::from_secs(self.staleness.tasks_secs),
            profile_stale_after: Duration::from_secs(self.staleness.profile_secs),
            categories_stale_after: Duration::from_secs(self.staleness.categories_secs),
            profile_image_stale_after: Duration::from_secs(self.staleness.profile_image_secs),
            snapshot_path: snapshot_path.filter(|_| self.snapshot),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

/// `KEY=VALUE` pairs given on the command line, applied in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub entries: Vec<(String, String)>,
}

impl ConfigOverrides {
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> AppResult<Self> {
        let entries = raw
            .iter()
            .map(|item| {
                let item = item.as_ref();
                let (key, value) = item.split_once('=').ok_or_else(|| {
                    AppError::validation(format!("override must be KEY=VALUE: {item}"))
                })?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(AppError::validation(format!(
                        "override key is empty: {item}"
                    )));
                }
                Ok((key.to_string(), value.trim().to_string()))
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn app_dir() -> AppResult<PathBuf> {
    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join(APP_DIR))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config").join(APP_DIR))
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
}

fn resolve_path(var: &str, file_name: &str) -> AppResult<PathBuf> {
    match env_path(var) {
        Some(path) => Ok(path),
        None => Ok(app_dir()?.join(file_name)),
    }
}

pub fn config_path() -> AppResult<PathBuf> {
    resolve_path(CONFIG_ENV_VAR, CONFIG_FILE_NAME)
}

/// The JSON file the local gateway reads and writes.
pub fn store_path() -> AppResult<PathBuf> {
    resolve_path(STORE_ENV_VAR, STORE_FILE_NAME)
}

pub fn snapshot_path() -> AppResult<PathBuf> {
    resolve_path(SNAPSHOT_ENV_VAR, SNAPSHOT_FILE_NAME)
}

pub fn load_config() -> AppResult<Config> {
    let path = config_path()?;
    load_config_from_path(&path)
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> AppResult<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let mut config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    config.theme = config.theme.and_then(|name| canonical_theme_name(&name));
    Ok(config)
}

fn parse_number(key: &str, value: &str) -> AppResult<u64> {
    value
        .parse()
        .map_err(|_| AppError::validation(format!("{key} expects a whole number, got {value:?}")))
}

fn parse_flag(key: &str, value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(AppError::validation(format!(
            "{key} expects true or false, got {value:?}"
        ))),
    }
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> AppResult<Config> {
    let mut merged = base.clone();

    for (key, value) in &overrides.entries {
        match key.as_str() {
            "theme" => merged.theme = canonical_theme_name(value),
            "snapshot" => merged.snapshot = parse_flag(key, value)?,
            "reminders.tick_millis" => merged.reminders.tick_millis = parse_number(key, value)?,
            "reminders.lookahead_secs" => {
                merged.reminders.lookahead_secs = parse_number(key, value)?
            }
            "reminders.dwell_secs" => merged.reminders.dwell_secs = parse_number(key, value)?,
            "reminders.retire_settled" => {
                merged.reminders.retire_settled = parse_flag(key, value)?
            }
            "staleness.tasks_secs" => merged.staleness.tasks_secs = parse_number(key, value)?,
            "staleness.profile_secs" => merged.staleness.profile_secs = parse_number(key, value)?,
            "staleness.categories_secs" => {
                merged.staleness.categories_secs = parse_number(key, value)?
            }
            "staleness.profile_image_secs" => {
                merged.staleness.profile_image_secs = parse_number(key, value)?
            }
            other => {
                return Err(AppError::validation(format!(
                    "unknown config key: {other}"
                )));
            }
        }
    }

    Ok(merged)
}
