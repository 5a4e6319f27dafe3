use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use common::models::{
    DailyForecast, HourlyForecast, NewsArticle, NewsResponse, RefreshResponse,
    SuggestionsResponse, TimezoneResponse, WeatherReport, WeatherSummary,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_weather,
        handlers::get_timezone,
        handlers::get_news,
        handlers::local_weather,
        handlers::search_suggestions,
        handlers::map_tile,
        handlers::refresh_cities,
    ),
    components(schemas(
        WeatherReport,
        HourlyForecast,
        DailyForecast,
        WeatherSummary,
        NewsArticle,
        NewsResponse,
        TimezoneResponse,
        SuggestionsResponse,
        RefreshResponse,
    )),
    tags(
        (name = "weather", description = "Weather, forecast, and map tile endpoints"),
        (name = "news", description = "Weather-related news search"),
        (name = "cities", description = "City list autocompletion and refresh"),
    ),
)]
struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
