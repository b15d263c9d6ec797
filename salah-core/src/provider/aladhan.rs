use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration as StdDuration;

use crate::{
    model::{Location, PrayerTimes},
    provider::{
        DaySchedule, FetchError, PrayerSource, REQUEST_TIMEOUT, RetryPolicy, get_with_retries,
        parse_json_body, require_time_field,
    },
};

use super::PrayerProvider;

pub const ALADHAN_BASE_URL: &str = "https://api.aladhan.com/v1";

/// Muslim World League.
const CALCULATION_METHOD: &str = "3";
/// Hanafi Asr.
const SCHOOL: &str = "1";

#[derive(Debug, Clone)]
pub struct AladhanProvider {
    base_url: String,
    retry: RetryPolicy,
    timeout: StdDuration,
    http: Client,
}

/// The parts of a `/timings` response we rely on. Timings stay untyped so a
/// missing field and a non-string one can be reported apart.
#[derive(Debug, Deserialize)]
struct AladhanEnvelope {
    data: AladhanData,
}

#[derive(Debug, Deserialize)]
struct AladhanData {
    timings: Map<String, Value>,
    meta: Option<AladhanMeta>,
}

#[derive(Debug, Deserialize)]
struct AladhanMeta {
    timezone: Option<String>,
}

struct Timings {
    timings: Map<String, Value>,
    time_zone: Option<String>,
}

impl From<AladhanEnvelope> for Timings {
    fn from(envelope: AladhanEnvelope) -> Self {
        Self {
            timings: envelope.data.timings,
            time_zone: envelope.data.meta.and_then(|meta| meta.timezone),
        }
    }
}

fn parse_envelope(payload: Value) -> Result<Timings, FetchError> {
    serde_json::from_value::<AladhanEnvelope>(payload)
        .map(Timings::from)
        .map_err(|err| {
            debug!("AlAdhan payload did not match: {err}");
            FetchError::PermanentUpstream("Unexpected response format from AlAdhan".to_string())
        })
}

impl AladhanProvider {
    pub fn new() -> Self {
        Self::with_base_url(ALADHAN_BASE_URL, RetryPolicy::default())
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
    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_timings(
        &self,
        location: &Location,
        when: DateTime<Utc>,
        what: &str,
    ) -> Result<Timings, FetchError> {
        let url = format!("{}/timings/{}", self.base_url, when.timestamp());
        let latitude = location.lat.to_string();
        let longitude = location.lon.to_string();
        debug!("Fetching AlAdhan timings from {url}");

        let body = get_with_retries(
            || {
                self.http
                    .get(&url)
                    .timeout(self.timeout)
                    .header("User-Agent", "SalahNow CLI")
                    .query(&[
                        ("latitude", latitude.as_str()),
                        ("longitude", longitude.as_str()),
                        ("method", CALCULATION_METHOD),
                        ("school", SCHOOL),
                    ])
            },
            &self.retry,
            what,
        )
        .await?;

        parse_envelope(parse_json_body(&body, "AlAdhan")?)
    }
}

impl Default for AladhanProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrayerProvider for AladhanProvider {
    fn source(&self) -> PrayerSource {
        PrayerSource::Mwl
    }

    async fn fetch_day(&self, location: &Location) -> Result<DaySchedule, FetchError> {
        let now = Utc::now();

        let today = self.fetch_timings(location, now, "Failed to fetch prayer times").await?;
        let times = PrayerTimes {
            fajr: require_time_field(&today.timings, "Fajr")?,
            sunrise: require_time_field(&today.timings, "Sunrise")?,
            dhuhr: require_time_field(&today.timings, "Dhuhr")?,
            asr: require_time_field(&today.timings, "Asr")?,
            maghrib: require_time_field(&today.timings, "Maghrib")?,
            isha: require_time_field(&today.timings, "Isha")?,
        };

        let tomorrow = self
            .fetch_timings(location, now + Duration::days(1), "Failed to fetch tomorrow's prayer times")
            .await?;
        let tomorrow_fajr = require_time_field(&tomorrow.timings, "Fajr")?;

        Ok(DaySchedule { times, tomorrow_fajr, time_zone: today.time_zone })
    }
}
