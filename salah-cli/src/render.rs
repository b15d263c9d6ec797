use chrono::{NaiveDateTime, NaiveTime};
use salah_core::{
    CurrentPrayerInfo, Location, PrayerFetchResult, PrayerName, TimeFormat, clock::now_in_zone,
    format_countdown,
};

/// Today's table for `location`.
pub fn today(
    location: &Location,
    bundle: &PrayerFetchResult,
    info: &CurrentPrayerInfo,
    time_format: TimeFormat,
) -> String {
    let now = now_in_zone(bundle.time_zone.as_deref());
    let mut out = format!("SalahNow - {}, {}\n", location.city, location.country);

    out.push_str(&format!("Source: {}", bundle.resolved_source.label()));
    if let Some(tz) = &bundle.time_zone {
        out.push_str(&format!(" | Timezone: {tz} | Local there: {}", now.format("%H:%M:%S")));
    }
    out.push_str("\n\n");

    for (name, value) in bundle.times.iter() {
        let label = if info.is_after_isha && name == PrayerName::Fajr && info.next_prayer == PrayerName::Fajr {
            "Fajr (tomorrow)".to_string()
        } else {
            name.to_string()
        };
        let marker = row_marker(name, value, now, info);
        out.push_str(&format!("{marker} {label:<16}{:>8}\n", time_format.render(value)));
    }

    out
}

/// `>` for the upcoming prayer, `.` for the ones already passed today.
fn row_marker(name: PrayerName, value: &str, now: NaiveDateTime, info: &CurrentPrayerInfo) -> char {
    let Ok(time) = NaiveTime::parse_from_str(value, "%H:%M") else {
        return ' ';
    };
    let tomorrow_fajr = info.is_after_isha && name == PrayerName::Fajr;

    if name == info.next_prayer && (time >= now.time() || tomorrow_fajr) {
        '>'
    } else if time < now.time() && !tomorrow_fajr {
        '.'
    } else {
        ' '
    }
}

/// The `next --once` block.
pub fn next(
    location: &Location,
    bundle: &PrayerFetchResult,
    info: &CurrentPrayerInfo,
    time_format: TimeFormat,
) -> String {
    [
        format!("Location: {}, {}", location.city, location.country),
        format!("Source: {}", bundle.resolved_source.label()),
        format!("Next Prayer: {}", info.next_prayer),
        format!("At: {}", time_format.render(&info.next_prayer_time)),
        format!("Countdown: {}", format_countdown(info.time_until_next_ms)),
    ]
    .join("\n")
}

/// Single line redrawn in place by the live countdown.
pub fn countdown_line(info: &CurrentPrayerInfo, time_format: TimeFormat) -> String {
    format!(
        "Next: {} at {} ({})   ",
        info.next_prayer,
        time_format.render(&info.next_prayer_time),
        format_countdown(info.time_until_next_ms)
    )
}
