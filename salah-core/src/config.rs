use anyhow::{Context, Result, anyhow};
use chrono::Timelike;
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{clock::parse_hhmm, location::default_location, model::Location, provider::PrayerSource};

/// How times are shown to the user. Stored times are always 24-hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl TimeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFormat::TwelveHour => "12h",
            TimeFormat::TwentyFourHour => "24h",
        }
    }

    /// Render a canonical `HH:MM` value, e.g. `"13:05"` as `"1:05 PM"` in 12h.
    pub fn render(&self, hhmm: &str) -> String {
        match (self, parse_hhmm(hhmm)) {
            (TimeFormat::TwelveHour, Some(time)) => {
                let (is_pm, hour) = time.hour12();
                let suffix = if is_pm { "PM" } else { "AM" };
                format!("{hour}:{:02} {suffix}", time.minute())
            }
            _ => hhmm.to_string(),
        }
    }
}

impl std::fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "12h" => Ok(TimeFormat::TwelveHour),
            "24h" => Ok(TimeFormat::TwentyFourHour),
            _ => Err(anyhow!("Unknown time format '{s}'. Supported formats: 12h, 24h.")),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// prayer_source = "diyanet"
/// time_format = "24h"
///
/// [location]
/// city = "İstanbul"
/// ...
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub prayer_source: PrayerSource,
    pub time_format: TimeFormat,
    pub location: Location,
}

/// Loosely typed view of the file so one bad field does not discard the rest.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    prayer_source: Option<String>,
    time_format: Option<String>,
    location: Option<toml::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prayer_source: PrayerSource::default(),
            time_format: TimeFormat::default(),
            location: default_location(),
        }
    }
}

impl Config {
    /// Load config from disk. A missing or unreadable file is replaced by
    /// the default config, which is written back.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file yet.
            let cfg = Self::default();
            cfg.save_to(path)?;
            return Ok(cfg);
        }

        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))
            .and_then(|contents| {
                toml::from_str::<RawConfig>(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            });

        match parsed {
            Ok(raw) => Ok(Self::from_raw(raw)),
            Err(err) => {
                warn!("{err:#}; resetting to defaults");
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    fn from_raw(raw: RawConfig) -> Self {
        let location = raw
            .location
            .and_then(|value| value.try_into::<Location>().ok())
            .unwrap_or_else(default_location);

        Self {
            prayer_source: raw
                .prayer_source
                .and_then(|s| PrayerSource::try_from(s.as_str()).ok())
                .unwrap_or_default(),
            time_format: raw.time_format.and_then(|s| s.parse().ok()).unwrap_or_default(),
            location,
        }
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml).with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "salahnow", "salahnow")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
