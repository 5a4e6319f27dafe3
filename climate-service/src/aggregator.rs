use crate::api_client::{ForecastClient, GeoClient, OpenWeatherClient, kelvin_to_celsius};
use crate::memo::{Fingerprint, ResultCache, cached_call};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use common::errors::AppError;
use common::models::{DailyForecast, HourlyForecast, WeatherReport, WeatherSummary};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, instrument, warn};

const REPORT_TTL: Duration = Duration::from_secs(900);

/// City used when the caller's location cannot be determined.
const DEFAULT_CITY: &str = "Toronto";

/// Composes current conditions, forecasts, and geolocation into the
/// responses the HTTP surface serves.
pub struct WeatherAggregator {
    weather: Arc<OpenWeatherClient>,
    forecast: Arc<ForecastClient>,
    geo: Arc<GeoClient>,
    cache: Arc<ResultCache>,
}

impl WeatherAggregator {
    pub fn new(
        weather: Arc<OpenWeatherClient>,
        forecast: Arc<ForecastClient>,
        geo: Arc<GeoClient>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            weather,
            forecast,
            geo,
            cache,
        }
    }

    /// Full report for one city, memoized for fifteen minutes.
    ///
    /// An unknown city is rejected from the conditions payload alone; the
    /// forecast provider is never contacted for it.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn city_report(&self, city: &str) -> Result<WeatherReport, AppError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(AppError::bad_request("City name is required"));
        }
        if !self.weather.has_key() || !self.forecast.has_key() {
            return Err(AppError::service_unavailable(
                "API keys for weather data not configured.",
            ));
        }

        let key = Fingerprint::new("city_report").arg(city).finish();
        cached_call(&self.cache, &key, REPORT_TTL, || async {
            let conditions = self.weather.current_by_city(city).await?;
            if conditions.get("cod").and_then(Value::as_i64) != Some(200) {
                return Err(AppError::not_found("City Not Found"));
            }

            let forecast = self.forecast.three_day(city).await?;
            Ok(build_report(city, &conditions, &forecast, Utc::now()))
        })
        .await
    }

    /// Weather summary for the caller's IP-derived city, falling back to
    /// [`DEFAULT_CITY`] when the location cannot be resolved.
    #[instrument(skip(self))]
    pub async fn local_weather(&self) -> Result<WeatherSummary, AppError> {
        if let Some(city) = self.locate_caller().await {
            match self.weather.summary_for_city(&city).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    warn!(city = %city, error = %e, "Weather lookup for located city failed")
                }
            }
        }

        match self.weather.summary_for_city(DEFAULT_CITY).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(error = %e, "Fallback city weather lookup failed");
                Err(AppError::service_unavailable(
                    "Failed to determine your location and fallback location.",
                ))
            }
        }
    }

    async fn locate_caller(&self) -> Option<String> {
        let ip = match self.geo.user_ip().await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(error = %e, "Caller IP lookup failed");
                return None;
            }
        };

        let location = match self.geo.location_from_ip(&ip).await {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "IP geolocation failed");
                return None;
            }
        };
        if location.contains("Unknown") {
            return None;
        }

        location
            .split(',')
            .next()
            .map(|city| city.trim().to_string())
    }
}

/// Normalizes the two provider payloads into one report. Missing fields
/// degrade to zeros, empty strings, or `"N/A"` instead of failing.
pub(crate) fn build_report(
    city: &str,
    conditions: &Value,
    forecast: &Value,
    now: DateTime<Utc>,
) -> WeatherReport {
    let offset_secs = conditions
        .get("timezone")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let tz = FixedOffset::east_opt(offset_secs as i32).unwrap_or_else(|| Utc.fix());

    let sunrise = conditions
        .pointer("/sys/sunrise")
        .and_then(Value::as_i64)
        .filter(|&ts| ts > 0)
        .and_then(|ts| local_clock(ts, &tz))
        .unwrap_or_else(|| "N/A".to_string());
    let sunset = conditions
        .pointer("/sys/sunset")
        .and_then(Value::as_i64)
        .filter(|&ts| ts > 0)
        .and_then(|ts| local_clock(ts, &tz))
        .unwrap_or_else(|| "N/A".to_string());

    let hourly_forecast = forecast
        .pointer("/forecast/forecastday/0/hour")
        .and_then(Value::as_array)
        .map(|hours| hours.iter().map(hourly_entry).collect())
        .unwrap_or_default();
    let daily_forecast = forecast
        .pointer("/forecast/forecastday")
        .and_then(Value::as_array)
        .map(|days| days.iter().map(daily_entry).collect())
        .unwrap_or_default();

    WeatherReport {
        city_name: city.to_string(),
        temperature: kelvin_to_celsius(number_at(conditions, "/main/temp")),
        description: string_at(conditions, "/weather/0/description"),
        icon: string_at(conditions, "/weather/0/icon"),
        city_time: now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
        wind_speed: number_at(conditions, "/wind/speed"),
        humidity: number_at(conditions, "/main/humidity"),
        timezone: offset_secs,
        hourly_forecast,
        daily_forecast,
        pressure: number_at(conditions, "/main/pressure"),
        sunrise,
        sunset,
    }
}

fn hourly_entry(hour: &Value) -> HourlyForecast {
    HourlyForecast {
        // provider format is "YYYY-MM-DD HH:MM"; keep the clock part
        time: hour
            .get("time")
            .and_then(Value::as_str)
            .and_then(|time| time.split(' ').nth(1))
            .unwrap_or_default()
            .to_string(),
        temperature: number_at(hour, "/temp_c"),
        description: string_at(hour, "/condition/text"),
        icon: string_at(hour, "/condition/icon"),
    }
}

fn daily_entry(day: &Value) -> DailyForecast {
    DailyForecast {
        date: string_at(day, "/date"),
        maxtemp: number_at(day, "/day/maxtemp_c"),
        mintemp: number_at(day, "/day/mintemp_c"),
        condition: string_at(day, "/day/condition/text"),
        icon: string_at(day, "/day/condition/icon"),
    }
}

fn local_clock(unix_secs: i64, tz: &FixedOffset) -> Option<String> {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|utc| utc.with_timezone(tz).format("%H:%M").to_string())
}

fn string_at(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn number_at(value: &Value, pointer: &str) -> f64 {
    value.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn conditions_fixture() -> Value {
        json!({
            "cod": 200,
            "name": "Toronto",
            "main": {"temp": 280.0, "humidity": 55, "pressure": 1021},
            "weather": [{"description": "light rain", "icon": "10d"}],
            "wind": {"speed": 4.1},
            "timezone": 3600,
            "sys": {"sunrise": 1704096000i64, "sunset": 1704130000i64}
        })
    }

    fn forecast_fixture() -> Value {
        json!({
            "forecast": {
                "forecastday": [
                    {
                        "date": "2024-01-01",
                        "day": {
                            "maxtemp_c": 8.0,
                            "mintemp_c": 2.0,
                            "condition": {"text": "Rainy", "icon": "//cdn/rain.png"}
                        },
                        "hour": [
                            {
                                "time": "2024-01-01 00:00",
                                "temp_c": 3.0,
                                "condition": {"text": "Clear", "icon": "//cdn/clear.png"}
                            },
                            {
                                "time": "2024-01-01 01:00",
                                "temp_c": 2.5,
                                "condition": {"text": "Clear", "icon": "//cdn/clear.png"}
                            }
                        ]
                    },
                    {
                        "date": "2024-01-02",
                        "day": {
                            "maxtemp_c": 9.0,
                            "mintemp_c": 3.0,
                            "condition": {"text": "Sunny", "icon": "//cdn/sun.png"}
                        },
                        "hour": []
                    }
                ]
            }
        })
    }

    #[test]
    fn report_converts_kelvin_and_formats_local_times() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let report = build_report("Toronto", &conditions_fixture(), &forecast_fixture(), now);

        assert_eq!(report.city_name, "Toronto");
        assert!((report.temperature - 6.85).abs() < 1e-9);
        assert_eq!(report.description, "light rain");
        // UTC noon in a UTC+1 city
        assert_eq!(report.city_time, "2024-01-01 13:00:00");
        assert_eq!(report.timezone, 3600);
        // 2024-01-01 08:00:00 UTC sunrise, shifted by the city offset
        assert_eq!(report.sunrise, "09:00");
    }

    #[test]
    fn report_extracts_hourly_and_daily_forecasts() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let report = build_report("Toronto", &conditions_fixture(), &forecast_fixture(), now);

        assert_eq!(report.hourly_forecast.len(), 2);
        assert_eq!(report.hourly_forecast[0].time, "00:00");
        assert_eq!(report.hourly_forecast[0].temperature, 3.0);
        assert_eq!(report.hourly_forecast[0].description, "Clear");

        assert_eq!(report.daily_forecast.len(), 2);
        assert_eq!(report.daily_forecast[0].date, "2024-01-01");
        assert_eq!(report.daily_forecast[0].maxtemp, 8.0);
        assert_eq!(report.daily_forecast[1].condition, "Sunny");
    }

    #[test]
    fn report_degrades_missing_fields_to_placeholders() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let conditions = json!({"cod": 200, "timezone": 0});
        let report = build_report("Nowhere", &conditions, &json!({}), now);

        assert_eq!(report.temperature, kelvin_to_celsius(0.0));
        assert_eq!(report.description, "");
        assert_eq!(report.sunrise, "N/A");
        assert_eq!(report.sunset, "N/A");
        assert!(report.hourly_forecast.is_empty());
        assert!(report.daily_forecast.is_empty());
        assert_eq!(report.city_time, "2024-01-01 12:00:00");
    }

    #[test]
    fn report_tolerates_out_of_range_utc_offsets() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut conditions = conditions_fixture();
        conditions["timezone"] = json!(999_999_999);

        let report = build_report("Toronto", &conditions, &forecast_fixture(), now);
        // falls back to UTC rather than panicking
        assert_eq!(report.city_time, "2024-01-01 12:00:00");
    }
}
