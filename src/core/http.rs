use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::redirect::Policy;
use reqwest::Client;

pub const APP_USER_AGENT: &str = "MinecraftServerManager/1.0";

/// Default per-call timeout for registry API requests.
pub const API_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for whole archive downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers
}

pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers())
        .timeout(timeout)
        .build()
}

/// Client that reports redirects instead of following them. Used to read
/// `Location` headers off download endpoints.
pub fn build_probe_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers())
        .redirect(Policy::none())
        .timeout(timeout)
        .build()
}
