use crate::{
    model::{Location, PrayerTimes},
    provider::{aladhan::AladhanProvider, diyanet::DiyanetProvider},
};
use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt::Debug, str::FromStr, sync::LazyLock, time::Duration};
use thiserror::Error;

pub mod aladhan;
pub mod diyanet;

/// Where prayer times come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerSource {
    /// Turkey's Presidency of Religious Affairs, keyed by district id.
    #[default]
    Diyanet,
    /// Muslim World League method computed by AlAdhan, keyed by coordinates.
    Mwl,
}

impl PrayerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrayerSource::Diyanet => "diyanet",
            PrayerSource::Mwl => "mwl",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PrayerSource::Diyanet => "Diyanet",
            PrayerSource::Mwl => "Muslim World League (AlAdhan)",
        }
    }

    pub const fn all() -> &'static [PrayerSource] {
        &[PrayerSource::Diyanet, PrayerSource::Mwl]
    }
}

impl std::fmt::Display for PrayerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PrayerSource {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "diyanet" => Ok(PrayerSource::Diyanet),
            "mwl" => Ok(PrayerSource::Mwl),
            _ => Err(anyhow::anyhow!(
                "Unknown prayer source '{value}'. Supported sources: diyanet, mwl."
            )),
        }
    }
}

impl FromStr for PrayerSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrayerSource::try_from(s)
    }
}

/// Everything that can go wrong while fetching from an upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// 5xx responses or transport failures that survived all retries.
    #[error("{0}")]
    TransientUpstream(String),
    /// 4xx responses, malformed JSON or a payload of the wrong shape.
    #[error("{0}")]
    PermanentUpstream(String),
    /// A time field is missing or cannot be read as a time of day.
    #[error("{0}")]
    DataIntegrity(String),
    /// No district id could be found for a location served by Diyanet.
    #[error("{0}")]
    UnresolvableLocation(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::TransientUpstream(_))
    }
}

/// A day's six times plus the next day's Fajr, as returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySchedule {
    pub times: PrayerTimes,
    pub tomorrow_fajr: String,
    pub time_zone: Option<String>,
}

#[async_trait]
pub trait PrayerProvider: Send + Sync + Debug {
    fn source(&self) -> PrayerSource;

    /// Today's times and tomorrow's Fajr for `location`.
    async fn fetch_day(&self, location: &Location) -> Result<DaySchedule, FetchError>;
}

/// Construct the adapter serving `source` against its public endpoint.
pub fn provider_for_source(source: PrayerSource) -> Box<dyn PrayerProvider> {
    match source {
        PrayerSource::Diyanet => Box::new(DiyanetProvider::new()),
        PrayerSource::Mwl => Box::new(AladhanProvider::new()),
    }
}

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Retry contract shared by both adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay: Duration::from_millis(800) }
    }
}

impl RetryPolicy {
    /// Same attempt count without sleeping between attempts.
    pub fn immediate() -> Self {
        Self { base_delay: Duration::ZERO, ..Self::default() }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }
}

/// Send a GET built by `build`, retrying 5xx and transport failures.
///
/// Returns the body of a 2xx response. A 4xx response is never retried.
pub(crate) async fn get_with_retries<F>(
    build: F,
    policy: &RetryPolicy,
    what: &str,
) -> Result<String, FetchError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;

    loop {
        let outcome = match build().send().await {
            Ok(res) => {
                let status = res.status();
                res.text().await.map(|body| (status, body))
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok((status, body)) if status.is_success() => {
                debug!("{what}: HTTP {status} after {} attempt(s)", attempt + 1);
                return Ok(body);
            }
            Ok((status, body)) if status.is_server_error() => {
                if attempt >= policy.max_retries {
                    return Err(FetchError::TransientUpstream(format!(
                        "{what}: upstream returned {status}: {}",
                        truncate_body(&body)
                    )));
                }
                warn!("{what}: upstream returned {status}, retrying");
            }
            Ok((status, body)) => {
                return Err(FetchError::PermanentUpstream(format!(
                    "{what}: upstream returned {status}: {}",
                    truncate_body(&body)
                )));
            }
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(FetchError::TransientUpstream(format!("{what}: {err}")));
                }
                warn!("{what}: request failed ({err}), retrying");
            }
        }

        tokio::time::sleep(policy.delay_for(attempt)).await;
        attempt += 1;
    }
}

static HHMM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("valid regex"));

/// Extract the first `H:MM` / `HH:MM` substring and zero-pad it.
///
/// `"5:07 (+03)"` becomes `"05:07"`.
pub fn format_time_to_hhmm(value: &str) -> Option<String> {
    let caps = HHMM_RE.captures(value)?;
    let hours: u32 = caps[1].parse().ok()?;
    let minutes: u32 = caps[2].parse().ok()?;
    Some(format!("{hours:02}:{minutes:02}"))
}

pub(crate) fn require_time_field(payload: &Map<String, Value>, key: &str) -> Result<String, FetchError> {
    let raw = payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::DataIntegrity(format!("Missing time field: {key}")))?;

    format_time_to_hhmm(raw)
        .ok_or_else(|| FetchError::DataIntegrity(format!("Invalid time format for {key}")))
}

/// Parse a body as JSON, tolerating a leading byte-order mark.
pub(crate) fn parse_json_body(body: &str, what: &str) -> Result<Value, FetchError> {
    serde_json::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|err| FetchError::PermanentUpstream(format!("Invalid response from {what}: {err}")))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
