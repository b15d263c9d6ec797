use std::{
    process::{Command, Stdio},
    time::Duration,
};

use anyhow::Result;
use log::{debug, warn};
use salah_core::{Config, PrayerService, current_prayer_info};

const RETRY_AFTER_ERROR: Duration = Duration::from_secs(60);
/// Pause after each notification so clock drift cannot fire the same prayer twice.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Send a desktop notification. Returns false when no notifier is available.
pub fn send_system_notification(title: &str, message: &str) -> bool {
    let mut cmd = if cfg!(target_os = "macos") {
        let script = format!("display notification {message:?} with title {title:?}");
        let mut cmd = Command::new("osascript");
        cmd.arg("-e").arg(script);
        cmd
    } else if cfg!(target_os = "linux") {
        let mut cmd = Command::new("notify-send");
        cmd.arg(title).arg(message);
        cmd
    } else {
        return false;
    };

    match cmd.stdout(Stdio::null()).stderr(Stdio::null()).status() {
        Ok(status) => status.success(),
        Err(err) => {
            debug!("Notifier unavailable: {err}");
            false
        }
    }
}

/// Wait for each prayer and notify when it starts. Runs until the process is
/// stopped.
pub async fn run_daemon(service: &PrayerService, config: &Config) -> Result<()> {
    println!("Notification daemon started. Press Ctrl+C to stop.");

    loop {
        let bundle = match service.fetch_bundle(&config.location, config.prayer_source).await {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!("Prayer API error: {err}");
                eprintln!("Prayer API error: {err}. Retrying in 60 seconds.");
                tokio::time::sleep(RETRY_AFTER_ERROR).await;
                continue;
            }
        };

        let info = current_prayer_info(&bundle.times, Some(&bundle.tomorrow_fajr), bundle.time_zone.as_deref());
        let wait_seconds = (info.time_until_next_ms / 1000).max(1);
        let next_time = config.time_format.render(&info.next_prayer_time);

        println!("Waiting for {} at {next_time} ({wait_seconds}s).", info.next_prayer);
        tokio::time::sleep(Duration::from_secs(wait_seconds.unsigned_abs())).await;

        let message = format!("It's time for {} ({next_time})", info.next_prayer);
        if !send_system_notification("SalahNow", &message) {
            println!("{message}");
        }

        tokio::time::sleep(SETTLE_DELAY).await;
    }
}
