//! HTTP client utilities

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(5);

pub const USER_AGENT: &str = concat!("tartwatch/", env!("CARGO_PKG_VERSION"));

/// Create a client for the backend REST API with standard timeouts
pub fn create_api_client() -> Client {
    create_client_with_timeouts(SHORT_TIMEOUT, DEFAULT_TIMEOUT)
}

/// Create an HTTP client with custom connect and request timeouts
pub fn create_client_with_timeouts(connect_timeout: Duration, request_timeout: Duration) -> Client {
    ClientBuilder::new()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Get an existing client or create the default API client
pub fn get_or_create_api_client(existing: Option<Client>) -> Client {
    existing.unwrap_or_else(create_api_client)
}
