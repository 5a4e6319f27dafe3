use climate_service::api_client::OpenWeatherClient;
use climate_service::memo::ResultCache;
use common::http_client::UpstreamClient;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_against(server: &MockServer, api_key: Option<&str>) -> OpenWeatherClient {
    OpenWeatherClient::new(
        Arc::new(UpstreamClient::new(5, 1).with_backoff_base(Duration::from_millis(5))),
        Arc::new(ResultCache::new()),
        format!("{}/weather", server.uri()),
        format!("{}/tiles", server.uri()),
        api_key.map(str::to_string),
    )
}

#[tokio::test]
async fn coordinate_lookup_returns_the_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("lat", "43.7"))
        .and(query_param("lon", "-79.4"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "Toronto", "cod": 200})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(&server, Some("test-key"));
    let payload = client.summary_by_coordinates(43.7, -79.4).await.unwrap();
    assert_eq!(payload.unwrap()["name"], "Toronto");
}

#[tokio::test]
async fn coordinate_lookup_is_memoized_per_coordinate_pair() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cod": 200})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_against(&server, Some("test-key"));
    for _ in 0..2 {
        client.summary_by_coordinates(43.7, -79.4).await.unwrap();
    }
    // a different pair is a different key
    client.summary_by_coordinates(48.8, 2.3).await.unwrap();
}

#[tokio::test]
async fn rejected_coordinate_lookup_yields_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(&server, Some("bad-key"));
    let payload = client.summary_by_coordinates(43.7, -79.4).await.unwrap();
    assert!(payload.is_none());

    // the rejection is cached like any other value
    let payload = client.summary_by_coordinates(43.7, -79.4).await.unwrap();
    assert!(payload.is_none());
}

#[tokio::test]
async fn failing_coordinate_lookup_yields_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(&server, Some("test-key"));
    let payload = client.summary_by_coordinates(43.7, -79.4).await.unwrap();
    assert!(payload.is_none());
}

#[tokio::test]
async fn coordinate_lookup_without_a_key_skips_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cod": 200})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_against(&server, None);
    let payload = client.summary_by_coordinates(43.7, -79.4).await.unwrap();
    assert!(payload.is_none());
}
