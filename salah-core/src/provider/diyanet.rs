use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use log::debug;
use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value};
use std::{sync::LazyLock, time::Duration};

use crate::{
    location::resolve_regional_district_id,
    model::{Location, PrayerTimes},
    provider::{
        DaySchedule, FetchError, PrayerSource, REQUEST_TIMEOUT, RetryPolicy, get_with_retries,
        parse_json_body, require_time_field,
    },
};

use super::PrayerProvider;

pub const DIYANET_BASE_URL: &str = "https://ezanvakti.emushaf.net/vakitler";

/// Diyanet publishes its schedule in Turkish local time, whatever the
/// caller's own zone is.
pub const DIYANET_TIME_ZONE: &str = "Europe/Istanbul";
pub const DIYANET_TZ: Tz = chrono_tz::Europe::Istanbul;

const DATE_FIELD: &str = "MiladiTarihKisa";

/// Diyanet field names in daily order, Fajr first.
const TIME_FIELDS: [&str; 6] = ["Imsak", "Gunes", "Ogle", "Ikindi", "Aksam", "Yatsi"];

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct DiyanetProvider {
    base_url: String,
    retry: RetryPolicy,
    timeout: Duration,
    http: Client,
}

impl DiyanetProvider {
    pub fn new() -> Self {
        Self::with_base_url(DIYANET_BASE_URL, RetryPolicy::default())
    }

    pub fn with_base_url(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
            timeout: REQUEST_TIMEOUT,
            http: Client::new(),
        }
    }

    /// Per-request timeout, applied to every attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The full published schedule for a district, one object per day.
    async fn fetch_schedule(&self, district_id: &str) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}/{}", self.base_url, district_id);
        debug!("Fetching Diyanet schedule from {url}");

        let body = get_with_retries(
            || {
                self.http
                    .get(&url)
                    .timeout(self.timeout)
                    .header("Accept", "application/json")
                    .header("User-Agent", "SalahNow")
            },
            &self.retry,
            "Failed to fetch prayer times from Diyanet",
        )
        .await?;

        match parse_json_body(&body, "Diyanet")? {
            Value::Array(entries) => Ok(entries),
            _ => Err(FetchError::PermanentUpstream("Unexpected Diyanet response".to_string())),
        }
    }

    async fn fetch_times_on(&self, district_id: &str, date: NaiveDate) -> Result<PrayerTimes, FetchError> {
        let schedule = self.fetch_schedule(district_id).await?;
        let entry = find_entry_for_date(&schedule, date).ok_or_else(|| {
            FetchError::PermanentUpstream("Could not find today's prayer times".to_string())
        })?;

        let [fajr, sunrise, dhuhr, asr, maghrib, isha] = TIME_FIELDS;
        Ok(PrayerTimes {
            fajr: require_time_field(entry, fajr)?,
            sunrise: require_time_field(entry, sunrise)?,
            dhuhr: require_time_field(entry, dhuhr)?,
            asr: require_time_field(entry, asr)?,
            maghrib: require_time_field(entry, maghrib)?,
            isha: require_time_field(entry, isha)?,
        })
    }

    async fn fetch_fajr_on(&self, district_id: &str, date: NaiveDate) -> Result<String, FetchError> {
        let schedule = self.fetch_schedule(district_id).await?;
        let entry = find_entry_for_date(&schedule, date).ok_or_else(|| {
            FetchError::PermanentUpstream("Could not find tomorrow's prayer times".to_string())
        })?;

        require_time_field(entry, TIME_FIELDS[0])
    }
}

impl Default for DiyanetProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrayerProvider for DiyanetProvider {
    fn source(&self) -> PrayerSource {
        PrayerSource::Diyanet
    }

    async fn fetch_day(&self, location: &Location) -> Result<DaySchedule, FetchError> {
        let district_id = resolve_regional_district_id(location).ok_or_else(|| {
            FetchError::UnresolvableLocation("Failed to resolve Diyanet location".to_string())
        })?;

        let today = regional_today();
        let tomorrow = today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| FetchError::PermanentUpstream("Date out of range".to_string()))?;

        let times = self.fetch_times_on(&district_id, today).await?;
        let tomorrow_fajr = self.fetch_fajr_on(&district_id, tomorrow).await?;

        Ok(DaySchedule {
            times,
            tomorrow_fajr,
            time_zone: Some(DIYANET_TIME_ZONE.to_string()),
        })
    }
}

/// Today's calendar date in Turkey.
pub fn regional_today() -> NaiveDate {
    regional_date_at(Utc::now())
}

/// The Turkish calendar date at the instant `now`.
pub fn regional_date_at(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&DIYANET_TZ).date_naive()
}

/// Read a free-text date as day, month and year, in that order, from its
/// first three integers.
fn parse_date_parts(value: &str) -> Option<NaiveDate> {
    let mut numbers = DIGITS_RE.find_iter(value).map(|m| m.as_str().parse::<u32>().ok());
    let day = numbers.next()??;
    let month = numbers.next()??;
    let year = numbers.next()??;

    if day == 0 || month == 0 || year == 0 {
        return None;
    }

    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

fn find_entry_for_date(schedule: &[Value], date: NaiveDate) -> Option<&Map<String, Value>> {
    schedule.iter().filter_map(Value::as_object).find(|entry| {
        entry
            .get(DATE_FIELD)
            .and_then(Value::as_str)
            .and_then(parse_date_parts)
            == Some(date)
    })
}
