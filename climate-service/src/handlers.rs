use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use common::errors::AppError;
use common::models::{
    NewsResponse, RefreshResponse, SuggestionsResponse, TimezoneResponse, WeatherReport,
    WeatherSummary,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::aggregator::WeatherAggregator;
use crate::api_client::{GeoClient, NewsClient, OpenWeatherClient};
use crate::catalog::CityCatalogStore;
use crate::openapi;

const NEWS_PAGE_SIZE: u32 = 6;
const SEVERE_QUERIES: [&str; 3] = ["tornado", "storm", "flood"];

#[derive(Clone)]
pub struct AppState {
    pub weather: Arc<OpenWeatherClient>,
    pub news: Arc<NewsClient>,
    pub geo: Arc<GeoClient>,
    pub aggregator: Arc<WeatherAggregator>,
    pub catalog: Arc<CityCatalogStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/weather", get(get_weather))
        .route("/api/timezone", get(get_timezone))
        .route("/api/news", get(get_news))
        .route("/api/location/weather", get(local_weather))
        .route("/api/search_suggestions", get(search_suggestions))
        .route("/api/map_tiles/{layer}/{z}/{x}/{y}", get(map_tile))
        .route("/api/cities/refresh", post(refresh_cities))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize)]
pub struct CityQuery {
    #[serde(default)]
    pub city_name: String,
}

#[derive(Deserialize)]
pub struct NewsQuery {
    #[serde(default)]
    pub query: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check")
    )
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "climate-service" }))
}

#[utoipa::path(
    get,
    path = "/api/weather",
    params(
        ("city_name" = String, Query, description = "City name")
    ),
    responses(
        (status = 200, description = "Weather report for the city", body = WeatherReport),
        (status = 400, description = "Missing city name"),
        (status = 404, description = "Unknown city"),
        (status = 503, description = "Weather providers unavailable")
    ),
    tag = "weather"
)]
pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<CityQuery>,
) -> Result<Json<WeatherReport>, AppError> {
    info!(city = %params.city_name, "Weather request received");

    let report = state.aggregator.city_report(&params.city_name).await?;

    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/timezone",
    params(
        ("city_name" = String, Query, description = "City name")
    ),
    responses(
        (status = 200, description = "Timezone for the city", body = TimezoneResponse),
        (status = 400, description = "Missing city name"),
        (status = 404, description = "Provider has no timezone for the city")
    ),
    tag = "weather"
)]
pub async fn get_timezone(
    State(state): State<AppState>,
    Query(params): Query<CityQuery>,
) -> Result<Json<TimezoneResponse>, AppError> {
    let city_name = params.city_name.trim().to_string();
    if city_name.is_empty() {
        return Err(AppError::bad_request("City name is required"));
    }

    match state.geo.timezone_for_city(&city_name).await? {
        Some(timezone) => Ok(Json(TimezoneResponse {
            city_name,
            timezone,
        })),
        None => Err(AppError::not_found("Could not fetch timezone data")),
    }
}

#[utoipa::path(
    get,
    path = "/api/news",
    params(
        ("query" = String, Query, description = "Search terms")
    ),
    responses(
        (status = 200, description = "Matching headlines", body = NewsResponse),
        (status = 400, description = "Missing query"),
        (status = 503, description = "News API key not configured")
    ),
    tag = "news"
)]
pub async fn get_news(
    State(state): State<AppState>,
    Query(params): Query<NewsQuery>,
) -> Result<Json<NewsResponse>, AppError> {
    let query = params.query;
    if query.is_empty() {
        return Err(AppError::bad_request("Query is required"));
    }

    // widen severe-weather searches so generic storm coverage ranks first
    let query = if SEVERE_QUERIES.contains(&query.to_lowercase().as_str()) {
        format!("{query} AND (weather OR disaster OR warning OR damage OR alert)")
    } else {
        query
    };

    let news = match state.news.headlines(&query, NEWS_PAGE_SIZE).await {
        Ok(news) => news,
        Err(e @ AppError::ServiceUnavailable(_)) => return Err(e),
        Err(e) => {
            error!(error = %e, "Error fetching news");
            Vec::new()
        }
    };

    Ok(Json(NewsResponse { news }))
}

#[utoipa::path(
    get,
    path = "/api/location/weather",
    responses(
        (status = 200, description = "Weather summary for the caller's location", body = WeatherSummary),
        (status = 503, description = "Neither the caller's city nor the fallback city resolved")
    ),
    tag = "weather"
)]
pub async fn local_weather(
    State(state): State<AppState>,
) -> Result<Json<WeatherSummary>, AppError> {
    let summary = state.aggregator.local_weather().await?;

    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/api/search_suggestions",
    params(
        ("city_name" = String, Query, description = "Partial city name")
    ),
    responses(
        (status = 200, description = "City name suggestions", body = SuggestionsResponse)
    ),
    tag = "cities"
)]
pub async fn search_suggestions(
    State(state): State<AppState>,
    Query(params): Query<CityQuery>,
) -> Json<SuggestionsResponse> {
    let suggestions = state.catalog.search(&params.city_name).await;

    Json(SuggestionsResponse {
        success: true,
        suggestions,
    })
}

#[utoipa::path(
    get,
    path = "/api/map_tiles/{layer}/{z}/{x}/{y}",
    params(
        ("layer" = String, Path, description = "Weather layer, e.g. temp_new or precipitation_new"),
        ("z" = u32, Path, description = "Zoom level"),
        ("x" = u32, Path, description = "Tile X coordinate"),
        ("y" = u32, Path, description = "Tile Y coordinate")
    ),
    responses(
        (status = 200, description = "PNG map tile", content_type = "image/png"),
        (status = 503, description = "Tile provider unavailable")
    ),
    tag = "weather"
)]
pub async fn map_tile(
    State(state): State<AppState>,
    Path((layer, z, x, y)): Path<(String, u32, u32, u32)>,
) -> Result<Response, AppError> {
    let bytes = state.weather.tile(&layer, z, x, y).await?;

    let headers = [
        (header::CONTENT_TYPE, "image/png".to_string()),
        (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        (header::ETAG, format!("\"{layer}-{z}-{x}-{y}\"")),
    ];

    Ok((headers, bytes).into_response())
}

#[utoipa::path(
    post,
    path = "/api/cities/refresh",
    responses(
        (status = 200, description = "City list refreshed", body = RefreshResponse),
        (status = 503, description = "Bulk list origin unavailable")
    ),
    tag = "cities"
)]
pub async fn refresh_cities(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, AppError> {
    let cities = state.catalog.refresh().await?;

    Ok(Json(RefreshResponse {
        success: true,
        cities,
    }))
}
