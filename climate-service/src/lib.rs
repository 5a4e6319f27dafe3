pub mod aggregator;
pub mod api_client;
pub mod catalog;
pub mod config;
pub mod handlers;
pub mod memo;
pub mod openapi;
