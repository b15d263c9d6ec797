use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use inquire::{CustomType, Select, Text};
use salah_core::{
    Config, Location, PrayerService, PrayerSource, TimeFormat, current_prayer_info, geocode::Geocoder,
};

use crate::{notify, render};

const SEARCH_LIMIT: usize = 5;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "salahnow", version, about = "Prayer times in your terminal")]
pub struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Without a subcommand, today's prayer times are shown.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the next prayer with a live countdown.
    Next {
        /// Print once and exit.
        #[arg(long)]
        once: bool,
    },

    /// Set location, calculation source and time format.
    Config(ConfigArgs),

    /// Stay running and send a desktop notification at each prayer time.
    Notify,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Print the current configuration.
    #[arg(long)]
    show: bool,

    /// Detect location from IP and map it to the nearest built-in city.
    #[arg(long)]
    auto_location: bool,

    /// Search a location using OpenStreetMap Nominatim.
    #[arg(long)]
    search: Option<String>,

    /// Result used with --search (1-based).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    search_index: u32,

    #[arg(long)]
    city: Option<String>,

    #[arg(long)]
    country: Option<String>,

    #[arg(long)]
    country_code: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    #[arg(long)]
    address_label: Option<String>,

    /// Diyanet district id, for Turkish locations.
    #[arg(long)]
    diyanet_ilce_id: Option<String>,

    /// Calculation source preference: diyanet or mwl.
    #[arg(long)]
    method: Option<PrayerSource>,

    /// Display format: 12h or 24h.
    #[arg(long)]
    time_format: Option<TimeFormat>,
}

impl ConfigArgs {
    fn has_manual_location(&self) -> bool {
        self.city.is_some()
            || self.country.is_some()
            || self.country_code.is_some()
            || self.lat.is_some()
            || self.lon.is_some()
    }

    fn has_updates(&self) -> bool {
        self.auto_location
            || self.search.is_some()
            || self.has_manual_location()
            || self.address_label.is_some()
            || self.diyanet_ilce_id.is_some()
            || self.method.is_some()
            || self.time_format.is_some()
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            None => show_today().await,
            Some(Command::Next { once }) => show_next(once).await,
            Some(Command::Config(args)) => configure(args).await,
            Some(Command::Notify) => {
                let config = Config::load()?;
                let service = PrayerService::from_defaults()?;
                notify::run_daemon(&service, &config).await
            }
        }
    }
}

async fn show_today() -> Result<()> {
    let config = Config::load()?;
    let service = PrayerService::from_defaults()?;

    let bundle = service
        .fetch_bundle(&config.location, config.prayer_source)
        .await
        .context("Could not load prayer times")?;
    let info = current_prayer_info(&bundle.times, Some(&bundle.tomorrow_fajr), bundle.time_zone.as_deref());

    print!("{}", render::today(&config.location, &bundle, &info, config.time_format));
    Ok(())
}

async fn show_next(once: bool) -> Result<()> {
    let config = Config::load()?;
    let service = PrayerService::from_defaults()?;

    let mut bundle = service
        .fetch_bundle(&config.location, config.prayer_source)
        .await
        .context("Could not load prayer times")?;

    if once {
        let info = current_prayer_info(&bundle.times, Some(&bundle.tomorrow_fajr), bundle.time_zone.as_deref());
        println!("{}", render::next(&config.location, &bundle, &info, config.time_format));
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    loop {
        let info = current_prayer_info(&bundle.times, Some(&bundle.tomorrow_fajr), bundle.time_zone.as_deref());
        write!(stdout, "\r{}", render::countdown_line(&info, config.time_format))?;
        stdout.flush()?;

        if info.time_until_next_ms <= 1000 {
            // Keep showing the old bundle if the refresh fails.
            if let Ok(fresh) = service.fetch_bundle(&config.location, config.prayer_source).await {
                bundle = fresh;
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

async fn configure(args: ConfigArgs) -> Result<()> {
    let mut config = Config::load()?;

    if args.show && !args.has_updates() {
        print_config(&config)?;
        return Ok(());
    }

    if !args.has_updates() {
        println!("Interactive configuration");
        config.location = select_location_interactive(&config.location).await?;

        config.prayer_source = Select::new("Calculation method", PrayerSource::all().to_vec())
            .with_starting_cursor(PrayerSource::all().iter().position(|s| *s == config.prayer_source).unwrap_or(0))
            .prompt()?;

        let formats = vec![TimeFormat::TwentyFourHour, TimeFormat::TwelveHour];
        let cursor = formats.iter().position(|f| *f == config.time_format).unwrap_or(0);
        config.time_format = Select::new("Time format", formats).with_starting_cursor(cursor).prompt()?;

        config.save()?;
        println!("Configuration saved.");
        return print_config(&config);
    }

    let geocoder = Geocoder::new();

    if args.auto_location {
        config.location = geocoder
            .detect_location_from_ip()
            .await
            .context("Failed to detect location")?;
    }

    if let Some(query) = &args.search {
        let results = geocoder.search_locations(query, SEARCH_LIMIT).await?;
        if results.is_empty() {
            bail!("No search results.");
        }

        let index = args.search_index as usize;
        if index > results.len() {
            bail!("search-index out of range. Pick 1..{}", results.len());
        }
        config.location = results[index - 1].clone();
    }

    if args.has_manual_location() {
        let (Some(city), Some(country), Some(country_code), Some(lat), Some(lon)) =
            (&args.city, &args.country, &args.country_code, args.lat, args.lon)
        else {
            bail!("Manual location requires --city --country --country-code --lat --lon.");
        };
        validate_coordinates(lat, lon)?;

        config.location = Location {
            city: city.clone(),
            country: country.clone(),
            country_code: country_code.to_uppercase(),
            lat,
            lon,
            address_label: args.address_label.clone(),
            diyanet_ilce_id: args.diyanet_ilce_id.clone(),
        };
    } else {
        if let Some(label) = &args.address_label {
            config.location.address_label = Some(label.clone());
        }
        if let Some(id) = &args.diyanet_ilce_id {
            config.location.diyanet_ilce_id = Some(id.clone());
        }
    }

    if let Some(source) = args.method {
        config.prayer_source = source;
    }

    if let Some(format) = args.time_format {
        config.time_format = format;
    }

    config.save()?;
    println!("Configuration saved.");
    print_config(&config)
}

fn print_config(config: &Config) -> Result<()> {
    let toml = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{toml}");
    println!("Config path: {}", Config::config_file_path()?.display());
    Ok(())
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) {
        bail!("latitude must be between -90 and 90");
    }
    if !(-180.0..=180.0).contains(&lon) {
        bail!("longitude must be between -180 and 180");
    }
    Ok(())
}

async fn select_location_interactive(current: &Location) -> Result<Location> {
    let mode = Select::new("Location mode", vec!["keep", "auto", "search", "manual"]).prompt()?;

    match mode {
        "keep" => Ok(current.clone()),
        "auto" => {
            let location = Geocoder::new()
                .detect_location_from_ip()
                .await
                .context("Failed to auto-detect location")?;
            println!("Detected location: {}, {}", location.city, location.country);
            Ok(location)
        }
        "search" => {
            let query = Text::new("Search query").prompt()?;
            let results = Geocoder::new().search_locations(&query, SEARCH_LIMIT).await?;
            if results.is_empty() {
                bail!("No results from geocoding API");
            }

            let labels: Vec<String> = results.iter().map(Location::label).collect();
            let choice = Select::new("Select location", labels).raw_prompt()?;
            Ok(results[choice.index].clone())
        }
        _ => {
            let city = Text::new("City").with_default(&current.city).prompt()?;
            let country = Text::new("Country").with_default(&current.country).prompt()?;
            let country_code = Text::new("Country code").with_default(&current.country_code).prompt()?;
            let lat = CustomType::<f64>::new("Latitude").with_default(current.lat).prompt()?;
            let lon = CustomType::<f64>::new("Longitude").with_default(current.lon).prompt()?;
            validate_coordinates(lat, lon)?;

            let address_label = Text::new("Address label (optional)")
                .with_default(current.address_label.as_deref().unwrap_or(""))
                .prompt()?;
            let diyanet_ilce_id = Text::new("Diyanet ilce id (optional)")
                .with_default(current.diyanet_ilce_id.as_deref().unwrap_or(""))
                .prompt()?;

            Ok(Location {
                city,
                country,
                country_code: country_code.to_uppercase(),
                lat,
                lon,
                address_label: Some(address_label).filter(|s| !s.is_empty()),
                diyanet_ilce_id: Some(diyanet_ilce_id).filter(|s| !s.is_empty()),
            })
        }
    }
}
