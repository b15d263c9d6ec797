//! Core library for the `salahnow` CLI.
//!
//! This crate defines:
//! - Location resolution against a built-in table
//! - Two prayer time providers (Diyanet, AlAdhan) behind one trait
//! - A per-location daily cache with stale fallback
//! - Current/next prayer computation
//! - Configuration handling
//!
//! It is used by `salah-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod clock;
pub mod config;
pub mod geocode;
pub mod location;
pub mod model;
pub mod provider;
pub mod service;

pub use cache::{CacheStore, CachedPrayerBundle};
pub use clock::{current_prayer_info, format_countdown};
pub use config::{Config, TimeFormat};
pub use model::{CurrentPrayerInfo, Location, PrayerFetchResult, PrayerName, PrayerTimes};
pub use provider::{FetchError, PrayerProvider, PrayerSource};
pub use service::PrayerService;
