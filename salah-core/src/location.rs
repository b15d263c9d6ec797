//! Built-in location table and the rules deciding which provider may serve
//! a location.

use std::sync::LazyLock;

use crate::{model::Location, provider::PrayerSource};

/// ISO2 code of the only country the Diyanet provider covers.
pub const REGIONAL_COUNTRY_CODE: &str = "TR";

const REGIONAL_COUNTRY_NAMES: &[&str] = &["türkiye", "turkiye"];

const EARTH_RADIUS_KM: f64 = 6371.0;

const DEFAULT_CITY: &str = "İstanbul";

static LOCATIONS: LazyLock<Vec<Location>> = LazyLock::new(|| {
    serde_json::from_str(include_str!("../data/locations.json"))
        .expect("built-in location table is valid JSON")
});

/// The built-in table, loaded once and never mutated.
pub fn locations() -> &'static [Location] {
    &LOCATIONS
}

pub fn default_location() -> Location {
    let table = locations();
    table
        .iter()
        .find(|loc| loc.city == DEFAULT_CITY)
        .or_else(|| table.first())
        .cloned()
        .unwrap_or_else(|| Location::new(DEFAULT_CITY, "Türkiye", REGIONAL_COUNTRY_CODE, 41.0082, 28.9784))
}

/// Great-circle distance in kilometres.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Closest candidate; the first one wins on equal distance.
pub fn nearest_in<'a, I>(candidates: I, lat: f64, lon: f64) -> Option<&'a Location>
where
    I: IntoIterator<Item = &'a Location>,
{
    let mut nearest = None;
    let mut min_distance = f64::INFINITY;

    for loc in candidates {
        let distance = haversine_distance(lat, lon, loc.lat, loc.lon);
        if distance < min_distance {
            min_distance = distance;
            nearest = Some(loc);
        }
    }

    nearest
}

/// Nearest built-in location, falling back to the default one.
pub fn nearest_location(lat: f64, lon: f64) -> Location {
    nearest_in(locations(), lat, lon).cloned().unwrap_or_else(default_location)
}

pub fn nearest_location_in_country(lat: f64, lon: f64, country_code: &str) -> Option<Location> {
    nearest_in(
        locations().iter().filter(|loc| loc.country_code == country_code),
        lat,
        lon,
    )
    .cloned()
}

/// Up to `limit` built-in locations ordered by distance.
pub fn nearest_locations_ranked(lat: f64, lon: f64, limit: usize) -> Vec<Location> {
    rank_by_distance(locations(), lat, lon, limit)
}

fn rank_by_distance(table: &[Location], lat: f64, lon: f64, limit: usize) -> Vec<Location> {
    let mut ranked: Vec<(f64, &Location)> = table
        .iter()
        .map(|loc| (haversine_distance(lat, lon, loc.lat, loc.lon), loc))
        .collect();

    // sort_by is stable, so ties keep table order.
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    ranked.into_iter().take(limit).map(|(_, loc)| loc.clone()).collect()
}

/// Whether the Diyanet provider may serve this location.
///
/// Either field can be the reliable one depending on where the location came
/// from (search results, manual entry), so both are checked.
pub fn is_regional_provider(location: &Location) -> bool {
    if location.country_code.eq_ignore_ascii_case(REGIONAL_COUNTRY_CODE) {
        return true;
    }

    let country = location.country.trim().to_lowercase();
    REGIONAL_COUNTRY_NAMES.contains(&country.as_str())
}

pub fn resolve_regional_district_id(location: &Location) -> Option<String> {
    resolve_district_id_from(locations(), location)
}

fn resolve_district_id_from(table: &[Location], location: &Location) -> Option<String> {
    if let Some(id) = &location.diyanet_ilce_id {
        return Some(id.clone());
    }

    if !is_regional_provider(location) {
        return None;
    }

    let regional = table.iter().filter(|loc| loc.country_code == REGIONAL_COUNTRY_CODE);
    nearest_in(regional, location.lat, location.lon).and_then(|loc| loc.diyanet_ilce_id.clone())
}

/// Source that will actually be used. Locations outside the region always
/// get the fallback provider, whatever was requested.
pub fn resolve_effective_source(location: &Location, requested: PrayerSource) -> PrayerSource {
    if is_regional_provider(location) { requested } else { PrayerSource::Mwl }
}
