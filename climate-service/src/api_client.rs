use crate::memo::{Fingerprint, ResultCache, cached_call};
use common::errors::AppError;
use common::http_client::UpstreamClient;
use common::models::{NewsArticle, WeatherSummary};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const WEATHER_SUMMARY_TTL: Duration = Duration::from_secs(600);
const TILE_TTL: Duration = Duration::from_secs(3_600);
const NEWS_TTL: Duration = Duration::from_secs(14_400);
const GEO_TTL: Duration = Duration::from_secs(86_400);
const TIMEZONE_TTL: Duration = Duration::from_secs(604_800);

/// Fixed location served when the IP geolocation provider rate-limits us.
pub const DEFAULT_LOCATION: &str = "Toronto, Ontario, Canada";

pub(crate) fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

/// Current conditions, map tiles, and the per-city summary from the
/// OpenWeather API.
pub struct OpenWeatherClient {
    http: Arc<UpstreamClient>,
    cache: Arc<ResultCache>,
    base_url: String,
    tile_url: String,
    api_key: Option<String>,
}

impl OpenWeatherClient {
    pub fn new(
        http: Arc<UpstreamClient>,
        cache: Arc<ResultCache>,
        base_url: String,
        tile_url: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            cache,
            base_url,
            tile_url,
            api_key,
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::service_unavailable("API key not configured"))
    }

    /// Raw current-conditions payload, fetched with retry.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn current_by_city(&self, city: &str) -> Result<Value, AppError> {
        let url = format!(
            "{}?q={}&appid={}",
            self.base_url,
            urlencoding::encode(city),
            self.key()?
        );
        self.http.get_json(&url).await
    }

    /// Compact summary for one city, memoized for ten minutes.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn summary_for_city(&self, city: &str) -> Result<WeatherSummary, AppError> {
        let key = Fingerprint::new("summary_for_city").arg(city).finish();
        cached_call(&self.cache, &key, WEATHER_SUMMARY_TTL, || async {
            let api_key = match &self.api_key {
                Some(key) => key,
                None => {
                    error!("API_KEY for OpenWeather is not set.");
                    return Err(AppError::service_unavailable("API key not configured"));
                }
            };

            let url = format!(
                "{}?q={}&appid={}",
                self.base_url,
                urlencoding::encode(city),
                api_key
            );
            let response = self.http.get(&url).await?;
            if response.status() != StatusCode::OK {
                error!(
                    city = %city,
                    status = response.status().as_u16(),
                    "Error fetching weather data"
                );
                return Err(AppError::service_unavailable(format!(
                    "Error fetching weather data for {city}"
                )));
            }

            let payload: Value = response.json().await.map_err(AppError::Network)?;
            summarize_conditions(&payload)
                .ok_or_else(|| AppError::internal("Incomplete weather data."))
        })
        .await
    }

    /// Raw conditions payload looked up by coordinates, memoized for ten
    /// minutes. Provider rejections yield `Ok(None)` rather than an error.
    #[instrument(skip(self))]
    pub async fn summary_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<Value>, AppError> {
        let key = Fingerprint::new("summary_by_coordinates")
            .kwarg("lat", lat)
            .kwarg("lon", lon)
            .finish();
        cached_call(&self.cache, &key, WEATHER_SUMMARY_TTL, || async {
            let api_key = match &self.api_key {
                Some(key) => key,
                None => {
                    error!("API_KEY for OpenWeather is not set.");
                    return Ok(None);
                }
            };

            let url = format!("{}?lat={lat}&lon={lon}&appid={api_key}", self.base_url);
            let response = self.http.get(&url).await?;
            match response.status() {
                StatusCode::OK => {
                    let payload: Value = response.json().await.map_err(AppError::Network)?;
                    Ok(Some(payload))
                }
                StatusCode::UNAUTHORIZED => {
                    warn!("Invalid API Key for OpenWeather API.");
                    Ok(None)
                }
                status => {
                    error!(
                        status = status.as_u16(),
                        "Error fetching weather by coordinates"
                    );
                    Ok(None)
                }
            }
        })
        .await
    }

    /// Map tile proxy with hour-long caching of the raw PNG bytes.
    #[instrument(skip(self))]
    pub async fn tile(&self, layer: &str, z: u32, x: u32, y: u32) -> Result<Vec<u8>, AppError> {
        let api_key = self.key()?;

        let key = Fingerprint::new("map_tile")
            .arg(layer)
            .arg(z)
            .arg(x)
            .arg(y)
            .finish();
        if let Some(bytes) = self.cache.get(&key).await {
            info!(layer = %layer, "Tile cache hit");
            return Ok(bytes);
        }

        let url = format!("{}/{layer}/{z}/{x}/{y}.png?appid={api_key}", self.tile_url);
        let response = match self.http.get(&url).await {
            Ok(response) => response,
            Err(e @ AppError::Timeout(_)) => return Err(e),
            Err(e) => {
                error!(error = %e, "Error fetching tile");
                return Err(AppError::service_unavailable("Error fetching tile"));
            }
        };
        if !response.status().is_success() {
            error!(status = response.status().as_u16(), "Error fetching tile");
            return Err(AppError::service_unavailable("Error fetching tile"));
        }

        let bytes = response.bytes().await.map_err(AppError::Network)?.to_vec();
        self.cache.set(key, bytes.clone(), TILE_TTL).await;
        Ok(bytes)
    }
}

/// Multi-day forecasts from the WeatherAPI provider.
pub struct ForecastClient {
    http: Arc<UpstreamClient>,
    base_url: String,
    api_key: Option<String>,
}

impl ForecastClient {
    pub fn new(http: Arc<UpstreamClient>, base_url: String, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::service_unavailable("API key not configured"))
    }

    /// Raw three-day forecast payload, fetched with retry.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn three_day(&self, city: &str) -> Result<Value, AppError> {
        let url = format!(
            "{}?key={}&q={}&days=3",
            self.base_url,
            self.key()?,
            urlencoding::encode(city)
        );
        self.http.get_json(&url).await
    }
}

/// Headlines from the news provider.
pub struct NewsClient {
    http: Arc<UpstreamClient>,
    cache: Arc<ResultCache>,
    base_url: String,
    api_key: Option<String>,
}

impl NewsClient {
    pub fn new(
        http: Arc<UpstreamClient>,
        cache: Arc<ResultCache>,
        base_url: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            cache,
            base_url,
            api_key,
        }
    }

    /// Up to `count` articles for `query`, memoized for four hours.
    ///
    /// A rejected or failing provider yields an empty list; only transport
    /// errors and a missing API key surface as errors.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn headlines(&self, query: &str, count: u32) -> Result<Vec<NewsArticle>, AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::service_unavailable("API key for news data not configured.")
        })?;

        let key = Fingerprint::new("headlines")
            .arg(query)
            .kwarg("count", count)
            .finish();
        cached_call(&self.cache, &key, NEWS_TTL, || async {
            let url = format!(
                "{}?q={}&apiKey={}&pageSize={}",
                self.base_url,
                urlencoding::encode(query),
                api_key,
                count
            );
            let response = self.http.get(&url).await?;
            match response.status() {
                StatusCode::OK => {
                    let payload: Value = response.json().await.map_err(AppError::Network)?;
                    Ok(extract_articles(&payload))
                }
                StatusCode::UNAUTHORIZED => {
                    warn!("Invalid API Key for News API.");
                    Ok(Vec::new())
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    error!(status = status.as_u16(), body = %body, "Error fetching news");
                    Ok(Vec::new())
                }
            }
        })
        .await
    }
}

/// Caller geolocation and city timezone lookups.
pub struct GeoClient {
    http: Arc<UpstreamClient>,
    cache: Arc<ResultCache>,
    ip_echo_url: String,
    geolocation_url: String,
    timezone_url: String,
}

impl GeoClient {
    pub fn new(
        http: Arc<UpstreamClient>,
        cache: Arc<ResultCache>,
        ip_echo_url: String,
        geolocation_url: String,
        timezone_url: String,
    ) -> Self {
        Self {
            http,
            cache,
            ip_echo_url,
            geolocation_url,
            timezone_url,
        }
    }

    /// The caller's public IP as reported by the echo service, memoized for
    /// a day.
    #[instrument(skip(self))]
    pub async fn user_ip(&self) -> Result<String, AppError> {
        let key = Fingerprint::new("user_ip").finish();
        cached_call(&self.cache, &key, GEO_TTL, || async {
            let response = self.http.get(&self.ip_echo_url).await?;
            if response.status() != StatusCode::OK {
                return Err(AppError::service_unavailable("Failed to fetch caller IP"));
            }

            let payload: Value = response.json().await.map_err(AppError::Network)?;
            let origin = payload
                .get("origin")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if origin.is_empty() {
                return Err(AppError::service_unavailable(
                    "Caller IP missing from response",
                ));
            }
            Ok(origin)
        })
        .await
    }

    /// `"City, Region, Country"` for an IP, memoized for a day. A
    /// rate-limited provider yields [`DEFAULT_LOCATION`] instead of failing.
    #[instrument(skip(self), fields(ip = %ip))]
    pub async fn location_from_ip(&self, ip: &str) -> Result<String, AppError> {
        let key = Fingerprint::new("location_from_ip").arg(ip).finish();
        cached_call(&self.cache, &key, GEO_TTL, || async {
            let url = format!("{}/{}/json/", self.geolocation_url, ip);
            let response = self.http.get(&url).await?;
            match response.status() {
                StatusCode::OK => {
                    let payload: Value = response.json().await.map_err(AppError::Network)?;
                    Ok(format!(
                        "{}, {}, {}",
                        payload
                            .get("city")
                            .and_then(Value::as_str)
                            .unwrap_or("Unknown City"),
                        payload
                            .get("region")
                            .and_then(Value::as_str)
                            .unwrap_or("Unknown Region"),
                        payload
                            .get("country_name")
                            .and_then(Value::as_str)
                            .unwrap_or("Unknown Country"),
                    ))
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!("Rate limit exceeded. Falling back to default location.");
                    Ok(DEFAULT_LOCATION.to_string())
                }
                status => {
                    error!(status = status.as_u16(), "Failed IP location fetch");
                    Err(AppError::service_unavailable(
                        "Failed to resolve caller location",
                    ))
                }
            }
        })
        .await
    }

    /// IANA timezone name for a city, memoized for a week. `Ok(None)` means
    /// the provider had no answer; both outcomes are cached.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn timezone_for_city(&self, city: &str) -> Result<Option<String>, AppError> {
        let key = Fingerprint::new("timezone_for_city").arg(city).finish();
        cached_call(&self.cache, &key, TIMEZONE_TTL, || async {
            let url = format!(
                "{}/{}?json=1&timezone=1",
                self.timezone_url,
                urlencoding::encode(city)
            );
            let response = self.http.get(&url).await?;
            let payload: Value = response.json().await.map_err(AppError::Network)?;
            Ok(payload
                .get("timezone")
                .and_then(Value::as_str)
                .map(str::to_string))
        })
        .await
    }
}

/// Builds the compact summary from a raw conditions payload; `None` when a
/// required field is missing.
pub(crate) fn summarize_conditions(payload: &Value) -> Option<WeatherSummary> {
    Some(WeatherSummary {
        city_name: payload.get("name")?.as_str()?.to_string(),
        description: payload
            .pointer("/weather/0/description")?
            .as_str()?
            .to_string(),
        temperature: kelvin_to_celsius(payload.pointer("/main/temp")?.as_f64()?),
        feels_like: kelvin_to_celsius(payload.pointer("/main/feels_like")?.as_f64()?),
        humidity: payload.pointer("/main/humidity")?.as_f64()?,
        wind_speed: payload.pointer("/wind/speed")?.as_f64()?,
    })
}

fn extract_articles(payload: &Value) -> Vec<NewsArticle> {
    payload
        .get("articles")
        .and_then(Value::as_array)
        .map(|articles| {
            articles
                .iter()
                .map(|article| NewsArticle {
                    title: string_or(article.get("title"), "N/A"),
                    description: string_or(article.get("description"), "N/A"),
                    url: string_or(article.get("url"), "#"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn string_or(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}
