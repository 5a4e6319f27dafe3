use common::http_client::{MAX_RETRIES, REQUEST_TIMEOUT_SECS};
use std::env;
use std::path::PathBuf;

pub struct Config {
    pub port: u16,
    pub log_json: bool,
    pub openweather_api_key: Option<String>,
    pub forecast_api_key: Option<String>,
    pub news_api_key: Option<String>,
    pub openweather_url: String,
    pub forecast_url: String,
    pub news_url: String,
    pub tile_url: String,
    pub ip_echo_url: String,
    pub geolocation_url: String,
    pub timezone_url: String,
    pub city_list_url: String,
    pub city_list_path: PathBuf,
    pub city_list_max_age_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            log_json: env::var("LOG_JSON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            openweather_api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            forecast_api_key: env::var("WEATHER_API_KEY").ok().filter(|k| !k.is_empty()),
            news_api_key: env::var("NEWS_API_KEY").ok().filter(|k| !k.is_empty()),
            openweather_url: env::var("OPENWEATHER_URL")
                .unwrap_or_else(|_| "http://api.openweathermap.org/data/2.5/weather".to_string()),
            forecast_url: env::var("FORECAST_URL")
                .unwrap_or_else(|_| "https://api.weatherapi.com/v1/forecast.json".to_string()),
            news_url: env::var("NEWS_URL")
                .unwrap_or_else(|_| "https://newsapi.org/v2/everything".to_string()),
            tile_url: env::var("TILE_URL")
                .unwrap_or_else(|_| "https://tile.openweathermap.org/map".to_string()),
            ip_echo_url: env::var("IP_ECHO_URL")
                .unwrap_or_else(|_| "https://httpbin.org/ip".to_string()),
            geolocation_url: env::var("GEOLOCATION_URL")
                .unwrap_or_else(|_| "https://ipapi.co".to_string()),
            timezone_url: env::var("TIMEZONE_URL")
                .unwrap_or_else(|_| "https://geocode.xyz".to_string()),
            city_list_url: env::var("CITY_LIST_URL").unwrap_or_else(|_| {
                "https://bulk.openweathermap.org/sample/city.list.json.gz".to_string()
            }),
            city_list_path: env::var("CITY_LIST_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("city_list.json")),
            city_list_max_age_secs: env::var("CITY_LIST_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(604_800), // 7 days default
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(REQUEST_TIMEOUT_SECS),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|r| r.parse().ok())
                .unwrap_or(MAX_RETRIES),
        }
    }
}
