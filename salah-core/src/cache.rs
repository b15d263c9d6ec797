//! On-disk cache of the last fetched bundle per (location, source).
//!
//! The whole file is read and rewritten on every `put`. There is no locking,
//! so two processes writing at the same moment can drop each other's entry.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    model::{Location, PrayerTimes},
    provider::{PrayerSource, diyanet::DIYANET_TZ, format_time_to_hhmm},
};

const CACHE_FILE_NAME: &str = "prayer_cache.json";

/// One cache entry, exactly as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPrayerBundle {
    pub times: PrayerTimes,
    pub tomorrow_fajr: String,
    pub time_zone: Option<String>,
    /// Calendar date of the fetch in the bundle's own timezone.
    pub date: NaiveDate,
    pub fetched_at: DateTime<FixedOffset>,
}

impl CachedPrayerBundle {
    fn is_well_formed(&self) -> bool {
        let is_hhmm = |value: &str| format_time_to_hhmm(value).as_deref() == Some(value);
        self.times.iter().all(|(_, value)| is_hhmm(value)) && is_hhmm(&self.tomorrow_fajr)
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform cache directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "salahnow", "salahnow")
            .ok_or_else(|| anyhow!("Could not determine platform cache directory"))?;

        Ok(dirs.cache_dir().join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry for `location`/`source` if it was fetched "today".
    pub fn get_fresh(&self, location: &Location, source: PrayerSource) -> Option<CachedPrayerBundle> {
        let entry = self.get_stale(location, source)?;

        let expected = today_for(entry.time_zone.as_deref(), source);
        if entry.date == expected {
            debug!("Fresh cache hit for {}", cache_key(location, source));
            Some(entry)
        } else {
            debug!("Cache entry for {} is from {}, today is {expected}", cache_key(location, source), entry.date);
            None
        }
    }

    /// Entry for `location`/`source` regardless of its age.
    pub fn get_stale(&self, location: &Location, source: PrayerSource) -> Option<CachedPrayerBundle> {
        let mut data = self.read_all();
        let raw = data.remove(&cache_key(location, source))?;
        parse_entry(raw)
    }

    pub fn put(
        &self,
        location: &Location,
        source: PrayerSource,
        times: &PrayerTimes,
        tomorrow_fajr: &str,
        time_zone: Option<&str>,
    ) -> Result<()> {
        let mut data = self.read_all();

        let bundle = CachedPrayerBundle {
            times: times.clone(),
            tomorrow_fajr: tomorrow_fajr.to_string(),
            time_zone: time_zone.map(str::to_string),
            date: today_for(time_zone, source),
            fetched_at: Local::now().into(),
        };
        let value = serde_json::to_value(&bundle).context("Failed to serialize cache entry")?;
        data.insert(cache_key(location, source), value);

        self.write_all(&data)
    }

    /// Missing or unreadable files count as an empty cache.
    fn read_all(&self) -> Map<String, Value> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Map::new();
        };

        match serde_json::from_str(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(err) => {
                warn!("Ignoring corrupt cache file {}: {err}", self.path.display());
                Map::new()
            }
        }
    }

    fn write_all(&self, data: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let mut json = serde_json::to_string_pretty(data).context("Failed to serialize cache")?;
        json.push('\n');

        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache file: {}", self.path.display()))?;

        Ok(())
    }
}

/// Coordinates are rounded so repeated geocoding of one place maps to one key.
pub fn cache_key(location: &Location, source: PrayerSource) -> String {
    format!(
        "{}-{}-{:.5}-{:.5}-{}",
        location.city, location.country_code, location.lat, location.lon, source
    )
}

fn parse_entry(raw: Value) -> Option<CachedPrayerBundle> {
    let entry: CachedPrayerBundle = serde_json::from_value(raw).ok()?;
    entry.is_well_formed().then_some(entry)
}

/// "Today" for a bundle: its own zone if known, Turkey for Diyanet, else the
/// local system date.
fn today_for(time_zone: Option<&str>, source: PrayerSource) -> NaiveDate {
    if let Some(tz) = time_zone.and_then(|name| name.parse::<Tz>().ok()) {
        return Utc::now().with_timezone(&tz).date_naive();
    }

    match source {
        PrayerSource::Diyanet => Utc::now().with_timezone(&DIYANET_TZ).date_naive(),
        PrayerSource::Mwl => Local::now().date_naive(),
    }
}
