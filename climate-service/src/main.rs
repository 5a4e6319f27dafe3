use climate_service::aggregator::WeatherAggregator;
use climate_service::api_client::{ForecastClient, GeoClient, NewsClient, OpenWeatherClient};
use climate_service::catalog::CityCatalogStore;
use climate_service::config::Config;
use climate_service::handlers::{self, AppState};
use climate_service::memo::ResultCache;
use common::http_client::UpstreamClient;
use common::tracing::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    init_tracing(config.log_json);

    let http = Arc::new(UpstreamClient::new(
        config.request_timeout_secs,
        config.max_retries,
    ));
    let cache = Arc::new(ResultCache::new());

    let catalog = Arc::new(CityCatalogStore::new(
        http.clone(),
        config.city_list_url.clone(),
        config.city_list_path.clone(),
        Duration::from_secs(config.city_list_max_age_secs),
    ));
    let weather = Arc::new(OpenWeatherClient::new(
        http.clone(),
        cache.clone(),
        config.openweather_url.clone(),
        config.tile_url.clone(),
        config.openweather_api_key.clone(),
    ));
    let forecast = Arc::new(ForecastClient::new(
        http.clone(),
        config.forecast_url.clone(),
        config.forecast_api_key.clone(),
    ));
    let news = Arc::new(NewsClient::new(
        http.clone(),
        cache.clone(),
        config.news_url.clone(),
        config.news_api_key.clone(),
    ));
    let geo = Arc::new(GeoClient::new(
        http.clone(),
        cache.clone(),
        config.ip_echo_url.clone(),
        config.geolocation_url.clone(),
        config.timezone_url.clone(),
    ));
    let aggregator = Arc::new(WeatherAggregator::new(
        weather.clone(),
        forecast,
        geo.clone(),
        cache.clone(),
    ));

    let state = AppState {
        weather,
        news,
        geo,
        aggregator,
        catalog,
    };
    let app = handlers::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Climate service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Climate service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
