//! Ties the resolver, cache and providers together.

use anyhow::Result;
use log::{debug, warn};

use crate::{
    cache::{CacheStore, CachedPrayerBundle},
    location::resolve_effective_source,
    model::{Location, PrayerFetchResult},
    provider::{FetchError, PrayerProvider, PrayerSource, provider_for_source},
};

#[derive(Debug)]
pub struct PrayerService {
    cache: CacheStore,
    diyanet: Box<dyn PrayerProvider>,
    mwl: Box<dyn PrayerProvider>,
}

impl PrayerService {
    pub fn new(cache: CacheStore, diyanet: Box<dyn PrayerProvider>, mwl: Box<dyn PrayerProvider>) -> Self {
        Self { cache, diyanet, mwl }
    }

    /// Public endpoints with the platform cache file.
    pub fn from_defaults() -> Result<Self> {
        Ok(Self::new(
            CacheStore::open_default()?,
            provider_for_source(PrayerSource::Diyanet),
            provider_for_source(PrayerSource::Mwl),
        ))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn provider(&self, source: PrayerSource) -> &dyn PrayerProvider {
        match source {
            PrayerSource::Diyanet => self.diyanet.as_ref(),
            PrayerSource::Mwl => self.mwl.as_ref(),
        }
    }

    /// Prayer times for `location`, from cache when fresh, else upstream.
    ///
    /// When upstream fails and any earlier bundle exists for the same key it
    /// is returned instead; otherwise the upstream error is returned as is.
    pub async fn fetch_bundle(
        &self,
        location: &Location,
        requested: PrayerSource,
    ) -> Result<PrayerFetchResult, FetchError> {
        let resolved = resolve_effective_source(location, requested);
        if resolved != requested {
            debug!("{} is outside the {requested} region, using {resolved}", location.label());
        }

        if let Some(fresh) = self.cache.get_fresh(location, resolved) {
            return Ok(from_cached(fresh, requested, resolved));
        }

        match self.provider(resolved).fetch_day(location).await {
            Ok(day) => {
                if let Err(err) = self.cache.put(
                    location,
                    resolved,
                    &day.times,
                    &day.tomorrow_fajr,
                    day.time_zone.as_deref(),
                ) {
                    warn!("Could not update prayer cache: {err:#}");
                }

                Ok(PrayerFetchResult {
                    times: day.times,
                    tomorrow_fajr: day.tomorrow_fajr,
                    time_zone: day.time_zone,
                    requested_source: requested,
                    resolved_source: resolved,
                })
            }
            Err(err) => match self.cache.get_stale(location, resolved) {
                Some(stale) => {
                    warn!("{err}; using cached prayer times from {}", stale.date);
                    Ok(from_cached(stale, requested, resolved))
                }
                None => Err(err),
            },
        }
    }
}

fn from_cached(bundle: CachedPrayerBundle, requested: PrayerSource, resolved: PrayerSource) -> PrayerFetchResult {
    PrayerFetchResult {
        times: bundle.times,
        tomorrow_fajr: bundle.tomorrow_fajr,
        time_zone: bundle.time_zone,
        requested_source: requested,
        resolved_source: resolved,
    }
}
