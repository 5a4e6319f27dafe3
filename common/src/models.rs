use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Full weather report for one city: current conditions plus forecasts
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct WeatherReport {
    pub city_name: String,
    /// Celsius
    pub temperature: f64,
    pub description: String,
    pub icon: String,
    /// Local wall-clock time in the city, `YYYY-MM-DD HH:MM:SS`
    pub city_time: String,
    pub wind_speed: f64,
    pub humidity: f64,
    /// UTC offset of the city in seconds
    pub timezone: i64,
    pub hourly_forecast: Vec<HourlyForecast>,
    pub daily_forecast: Vec<DailyForecast>,
    pub pressure: f64,
    /// `HH:MM` local time, or `N/A` when the provider omits it
    pub sunrise: String,
    pub sunset: String,
}

/// One hour of today's forecast
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct HourlyForecast {
    pub time: String,
    pub temperature: f64,
    pub description: String,
    pub icon: String,
}

/// One day of the multi-day forecast
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct DailyForecast {
    pub date: String,
    pub maxtemp: f64,
    pub mintemp: f64,
    pub condition: String,
    pub icon: String,
}

/// Compact current-conditions summary used by the local-weather flow
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct WeatherSummary {
    pub city_name: String,
    pub description: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub wind_speed: f64,
}

/// Headline returned by the news provider
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct NewsArticle {
    pub title: String,
    pub description: String,
    pub url: String,
}

/// Response body for the news endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewsResponse {
    pub news: Vec<NewsArticle>,
}

/// Response body for the timezone endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TimezoneResponse {
    pub city_name: String,
    pub timezone: String,
}

/// Response body for city-name autocompletion
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuggestionsResponse {
    pub success: bool,
    pub suggestions: Vec<String>,
}

/// Response body for the explicit city-list refresh operation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub success: bool,
    pub cities: usize,
}
