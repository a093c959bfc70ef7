//! Backend endpoint derivation.

use thiserror::Error;
use url::Url;

use crate::constants::api;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid API URL `{url}`: {source}")]
    Invalid {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme `{scheme}` in API URL `{url}`, expected http or https")]
    UnsupportedScheme { url: String, scheme: String },
}

/// Parses and checks an HTTP(S) API base URL.
pub fn parse_api_url(api_url: &str) -> Result<Url, EndpointError> {
    let trimmed = api_url.trim();
    let url = Url::parse(trimmed).map_err(|source| EndpointError::Invalid {
        url: trimmed.to_owned(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EndpointError::UnsupportedScheme {
            url: trimmed.to_owned(),
            scheme: other.to_owned(),
        }),
    }
}

/// Push-channel URL for an API base: `http` becomes `ws`, `https` becomes
/// `wss` and `/api/ws` is appended to the base path.
pub fn push_url(api_url: &str) -> Result<Url, EndpointError> {
    let mut url = parse_api_url(api_url)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    let original_scheme = url.scheme().to_owned();
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme {
            url: api_url.trim().to_owned(),
            scheme: original_scheme,
        })?;

    let base_path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{base_path}{}", api::PUSH_PATH));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
