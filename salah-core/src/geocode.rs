use anyhow::{Context, Result, anyhow};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{location::nearest_location, model::Location};

pub const IP_GEOLOCATION_URL: &str = "https://ipapi.co/json/";
pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

const IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Location lookups that are not part of fetching prayer times.
#[derive(Debug, Clone)]
pub struct Geocoder {
    ip_url: String,
    search_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

impl Geocoder {
    pub fn new() -> Self {
        Self::with_urls(IP_GEOLOCATION_URL, NOMINATIM_SEARCH_URL)
    }

    pub fn with_urls(ip_url: impl Into<String>, search_url: impl Into<String>) -> Self {
        Self {
            ip_url: ip_url.into(),
            search_url: search_url.into(),
            http: Client::new(),
        }
    }

    /// Guess the user's position from their IP and snap it to the nearest
    /// built-in location.
    pub async fn detect_location_from_ip(&self) -> Result<Location> {
        let res = self
            .http
            .get(&self.ip_url)
            .timeout(IP_LOOKUP_TIMEOUT)
            .header("User-Agent", "SalahNow CLI")
            .send()
            .await
            .context("Failed to send IP geolocation request")?;

        let status = res.status();
        if !status.is_success() {
            return Err(anyhow!("IP geolocation request failed with status {status}"));
        }

        let parsed: IpApiResponse = res.json().await.context("Failed to parse IP geolocation JSON")?;
        debug!("IP geolocation: {}, {}", parsed.latitude, parsed.longitude);

        Ok(nearest_location(parsed.latitude, parsed.longitude))
    }

    /// Free-text place search via OpenStreetMap Nominatim.
    pub async fn search_locations(&self, query: &str, limit: usize) -> Result<Vec<Location>> {
        let limit = limit.to_string();
        let res = self
            .http
            .get(&self.search_url)
            .timeout(SEARCH_TIMEOUT)
            .header("User-Agent", "SalahNow CLI")
            .query(&[
                ("format", "json"),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
                ("q", query),
            ])
            .send()
            .await
            .context("Failed to send location search request")?;

        let status = res.status();
        if !status.is_success() {
            return Err(anyhow!("Location search failed with status {status}"));
        }

        let places: Vec<NominatimPlace> = res.json().await.context("Failed to parse location search JSON")?;

        places.into_iter().map(place_to_location).collect()
    }
}

impl Default for Geocoder {
    fn default() -> Self {
        Self::new()
    }
}

fn place_to_location(place: NominatimPlace) -> Result<Location> {
    let address = place.address;
    let city = address
        .city
        .or(address.town)
        .or(address.village)
        .or(address.municipality)
        .or(address.state)
        .unwrap_or_else(|| "Unknown".to_string());
    let country = address.country.unwrap_or_else(|| "Unknown".to_string());
    let country_code = address.country_code.map(|code| code.to_uppercase()).unwrap_or_else(|| "XX".to_string());

    let lat = place.lat.parse::<f64>().with_context(|| format!("Invalid latitude in search result: {}", place.lat))?;
    let lon = place.lon.parse::<f64>().with_context(|| format!("Invalid longitude in search result: {}", place.lon))?;

    let mut location = Location::new(city, country, country_code, lat, lon);
    location.address_label = place.display_name;
    Ok(location)
}
