use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::location::NamedLocation;
use crate::models::wire::UserType;

/// Which map backend the daemon renders with. `Hosted` silently degrades to
/// `Fallback` when no provider key is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapBackend {
    Tile,
    Hosted,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint for live ride events. Empty string means the
    /// channel never dials (a supported state, not an error).
    pub ws_url: String,
    /// Base URL of the ride-offer REST API.
    pub api_base_url: String,
    pub user_id: Option<u64>,
    pub user_type: UserType,
    pub log_level: String,

    /// Route endpoints for the daemon's render loop. Both optional; the
    /// demo path falls back to a built-in route when unset.
    pub pickup: Option<NamedLocation>,
    pub destination: Option<NamedLocation>,

    pub backoff_base: Duration,
    pub backoff_max: Duration,

    pub route_staleness: Duration,
    pub offers_staleness: Duration,

    pub map_backend: MapBackend,
    pub map_provider_key: Option<String>,

    /// Enables the simulated driver feed. Off by default; the live feed is
    /// the only production path.
    pub demo_driver: bool,

    pub event_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let map_provider_key = env::var("MAP_PROVIDER_KEY").ok().filter(|k| !k.is_empty());
        let map_backend = match env::var("MAP_BACKEND").as_deref() {
            Ok("tile") => MapBackend::Tile,
            Ok("fallback") => MapBackend::Fallback,
            _ => MapBackend::Hosted,
        };

        Ok(Self {
            ws_url: env::var("WS_URL").unwrap_or_default(),
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
            user_id: match env::var("USER_ID") {
                Ok(raw) => Some(raw.parse::<u64>().map_err(|err| {
                    AppError::Internal(format!("invalid USER_ID: {err}"))
                })?),
                Err(_) => None,
            },
            user_type: env::var("USER_TYPE")
                .unwrap_or_else(|_| "passenger".to_string())
                .parse::<UserType>()
                .map_err(|err| AppError::Internal(format!("invalid USER_TYPE: {err}")))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            pickup: location_from_env("PICKUP")?,
            destination: location_from_env("DEST")?,
            backoff_base: Duration::from_millis(parse_or_default("BACKOFF_BASE_MS", 500)?),
            backoff_max: Duration::from_millis(parse_or_default("BACKOFF_MAX_MS", 30_000)?),
            route_staleness: Duration::from_secs(parse_or_default("ROUTE_STALENESS_SECS", 300)?),
            offers_staleness: Duration::from_secs(parse_or_default("OFFERS_STALENESS_SECS", 60)?),
            map_backend,
            map_provider_key,
            demo_driver: parse_or_default("DEMO_DRIVER", false)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            api_base_url: "http://localhost:5000".to_string(),
            user_id: None,
            user_type: UserType::Passenger,
            log_level: "info".to_string(),
            pickup: None,
            destination: None,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            route_staleness: Duration::from_secs(300),
            offers_staleness: Duration::from_secs(60),
            map_backend: MapBackend::Hosted,
            map_provider_key: None,
            demo_driver: false,
            event_buffer_size: 1024,
        }
    }
}

/// Reads an optional `<PREFIX>_LAT`/`<PREFIX>_LNG` pair plus an optional
/// `<PREFIX>_ADDRESS`. Setting only one half of the pair is an error.
fn location_from_env(prefix: &str) -> Result<Option<NamedLocation>, AppError> {
    let lat = env::var(format!("{prefix}_LAT")).ok();
    let lng = env::var(format!("{prefix}_LNG")).ok();

    match (lat, lng) {
        (None, None) => Ok(None),
        (Some(lat), Some(lng)) => {
            let lat = lat.parse::<f64>().map_err(|err| {
                AppError::Internal(format!("invalid {prefix}_LAT: {err}"))
            })?;
            let lng = lng.parse::<f64>().map_err(|err| {
                AppError::Internal(format!("invalid {prefix}_LNG: {err}"))
            })?;
            Ok(Some(match env::var(format!("{prefix}_ADDRESS")) {
                Ok(address) => NamedLocation::with_address(lat, lng, address),
                Err(_) => NamedLocation::new(lat, lng),
            }))
        }
        _ => Err(AppError::Internal(format!(
            "{prefix}_LAT and {prefix}_LNG must be set together"
        ))),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
