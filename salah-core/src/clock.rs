//! Current/next prayer and countdown for a day of prayer times.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::warn;

use crate::model::{CurrentPrayerInfo, PrayerName, PrayerTimes};

/// Current/next prayer right now, in `time_zone` or local time.
///
/// Unknown zone names fall back to local time.
pub fn current_prayer_info(
    times: &PrayerTimes,
    tomorrow_fajr: Option<&str>,
    time_zone: Option<&str>,
) -> CurrentPrayerInfo {
    match parse_zone(time_zone) {
        Some(tz) => current_prayer_info_at(times, tomorrow_fajr, &Utc::now().with_timezone(&tz)),
        None => current_prayer_info_at(times, tomorrow_fajr, &Local::now()),
    }
}

/// Same as [`current_prayer_info`] with an explicit "now".
pub fn current_prayer_info_at<Z: TimeZone>(
    times: &PrayerTimes,
    tomorrow_fajr: Option<&str>,
    now: &DateTime<Z>,
) -> CurrentPrayerInfo {
    let today = now.date_naive();
    let schedule: Vec<(PrayerName, DateTime<Z>)> = times
        .iter()
        .map(|(name, value)| (name, at_time_of_day(&now.timezone(), today, value)))
        .collect();

    let current = schedule.iter().rposition(|(_, ts)| now >= ts);

    let (current_prayer, next_prayer, next_prayer_time, until, is_after_isha) = match current {
        Some(i) if i + 1 < schedule.len() => {
            let (next, next_ts) = &schedule[i + 1];
            (schedule[i].0, *next, times.get(*next).to_string(), next_ts.clone() - now.clone(), false)
        }
        Some(i) => {
            let next_time = tomorrow_fajr
                .filter(|value| !value.is_empty())
                .unwrap_or(&times.fajr)
                .to_string();
            let tomorrow = today.succ_opt().unwrap_or(today);
            let next_ts = at_time_of_day(&now.timezone(), tomorrow, &next_time);
            (schedule[i].0, PrayerName::Fajr, next_time, next_ts - now.clone(), true)
        }
        // Before today's Fajr: still in last night's Isha.
        None => (
            PrayerName::Isha,
            PrayerName::Fajr,
            times.fajr.clone(),
            schedule[0].1.clone() - now.clone(),
            false,
        ),
    };

    CurrentPrayerInfo {
        current_prayer: Some(current_prayer),
        next_prayer,
        next_prayer_time,
        time_until_next_ms: until.num_milliseconds().max(0),
        is_after_isha,
    }
}

/// Render a countdown as `HH:MM:SS`. Zero and negative values are `00:00:00`.
pub fn format_countdown(ms: i64) -> String {
    if ms <= 0 {
        return "00:00:00".to_string();
    }

    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// The current wall-clock time in `time_zone`, or local time.
pub fn now_in_zone(time_zone: Option<&str>) -> NaiveDateTime {
    match parse_zone(time_zone) {
        Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
        None => Local::now().naive_local(),
    }
}

fn parse_zone(time_zone: Option<&str>) -> Option<Tz> {
    let name = time_zone?;
    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            warn!("Unknown timezone '{name}', using local time");
            None
        }
    }
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let (hours, minutes) = value.split_once(':')?;
    NaiveTime::from_hms_opt(hours.trim().parse().ok()?, minutes.get(..2)?.parse().ok()?, 0)
}

/// Attach an `HH:MM` string to `date` in `tz`.
///
/// Times inside a DST gap move forward an hour; ambiguous times take the
/// earlier instant.
fn at_time_of_day<Z: TimeZone>(tz: &Z, date: NaiveDate, hhmm: &str) -> DateTime<Z> {
    let time = parse_hhmm(hhmm).unwrap_or_else(|| {
        warn!("Unreadable prayer time '{hhmm}', treating it as midnight");
        NaiveTime::MIN
    });
    let naive = date.and_time(time);

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}
