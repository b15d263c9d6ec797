use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::PrayerSource;

/// A place prayer times can be resolved for.
///
/// Serialized with camelCase keys, which is the shape used both by the
/// built-in location table and by the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_label: Option<String>,
    /// Diyanet district ("ilçe") id; only meaningful for Turkish locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diyanet_ilce_id: Option<String>,
}

impl Location {
    pub fn new(
        city: impl Into<String>,
        country: impl Into<String>,
        country_code: impl Into<String>,
        lat: f64,
        lon: f64,
    ) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
            country_code: country_code.into(),
            lat,
            lon,
            address_label: None,
            diyanet_ilce_id: None,
        }
    }

    pub fn with_address_label(mut self, label: impl Into<String>) -> Self {
        self.address_label = Some(label.into());
        self
    }

    pub fn with_diyanet_ilce_id(mut self, id: impl Into<String>) -> Self {
        self.diyanet_ilce_id = Some(id.into());
        self
    }

    /// Human readable label, preferring the free-text address when present.
    pub fn label(&self) -> String {
        match &self.address_label {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ => format!("{}, {}", self.city, self.country),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrayerName {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    /// Fixed daily order.
    pub const ALL: [PrayerName; 6] = [
        PrayerName::Fajr,
        PrayerName::Sunrise,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Sunrise => "Sunrise",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One day of prayer times, each a canonical 24-hour `HH:MM` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrayerTimes {
    pub fajr: String,
    pub sunrise: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
}

impl PrayerTimes {
    pub fn get(&self, prayer: PrayerName) -> &str {
        match prayer {
            PrayerName::Fajr => &self.fajr,
            PrayerName::Sunrise => &self.sunrise,
            PrayerName::Dhuhr => &self.dhuhr,
            PrayerName::Asr => &self.asr,
            PrayerName::Maghrib => &self.maghrib,
            PrayerName::Isha => &self.isha,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PrayerName, &str)> {
        PrayerName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }
}

/// What the fetch pipeline hands to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PrayerFetchResult {
    pub times: PrayerTimes,
    pub tomorrow_fajr: String,
    pub time_zone: Option<String>,
    pub requested_source: PrayerSource,
    pub resolved_source: PrayerSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPrayerInfo {
    pub current_prayer: Option<PrayerName>,
    pub next_prayer: PrayerName,
    pub next_prayer_time: String,
    /// Never negative.
    pub time_until_next_ms: i64,
    /// The next event is tomorrow's Fajr.
    pub is_after_isha: bool,
}
