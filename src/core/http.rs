use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, RequestBuilder, Url};

use crate::core::error::{LauncherError, LauncherResult};

const APP_USER_AGENT: &str = concat!("ALauncher/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .build()
}

/// Attach the bearer token, if any, to a backend request.
pub fn with_bearer(request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
    match access_token {
        Some(token) if !token.trim().is_empty() => request.bearer_auth(token),
        _ => request,
    }
}

/// Join the configured API base with an endpoint path, tolerating stray slashes.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// [`endpoint`] plus percent-encoded query parameters.
pub fn endpoint_with_query(
    base_url: &str,
    path: &str,
    params: &[(&str, &str)],
) -> LauncherResult<String> {
    let url = Url::parse_with_params(&endpoint(base_url, path), params)
        .map_err(|e| LauncherError::Other(format!("Invalid backend URL {base_url}: {e}")))?;
    Ok(url.into())
}
