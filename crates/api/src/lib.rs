//! REST registry client utilities.
//!
//! This module provides a lightweight client for talking to an HTTP service
//! registry such as Nacos. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults (JSON accept header,
//!   bounded timeout)
//! - Deriving and validating the base URL from a [`RegistryAddress`]
//! - Attaching registry credentials to every request as query parameters
//! - Keeping secrets out of debug logs
//!
//! The primary entry point is [`RegistryHttpClient`]. Requests are built with
//! [`RegistryHttpClient::request`] or executed in one step with
//! [`RegistryHttpClient::get_text`].
//!
//! # Example
//!
//! ```ignore
//! use dubbo_invoke_api::RegistryHttpClient;
//! use dubbo_invoke_types::RegistryAddress;
//!
//! async fn namespaces() -> Result<(), Box<dyn std::error::Error>> {
//!     let address: RegistryAddress = "nacos://127.0.0.1:8848".parse()?;
//!     let client = RegistryHttpClient::new(&address, std::time::Duration::from_secs(10))?;
//!     let reply = client.get_text("/nacos/v1/console/namespaces", &[]).await?;
//!     println!("status: {}", reply.status);
//!     Ok(())
//! }
//! ```

use std::env;
use std::time::Duration;

use dubbo_invoke_types::{Credentials, RegistryAddress};
use dubbo_invoke_util::redact_sensitive;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Default HTTP timeout for registry requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid registry base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Status and body text of one registry response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for registry access.
///
/// The client pre-configures default headers and builds requests against a
/// validated `http://host:port` base URL.
pub struct RegistryHttpClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
    credentials: Option<Credentials>,
}

impl RegistryHttpClient {
    /// Construct a client for the registry behind `address`.
    pub fn new(address: &RegistryAddress, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = format!("http://{}", address.authority());
        validate_base_url(&base_url)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("dubbo-invoke/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
            credentials: address.credentials().cloned(),
        })
    }

    /// Build a `reqwest::RequestBuilder` for a method and registry-relative path.
    ///
    /// The resulting request includes the configured User-Agent and, when the
    /// address carried credentials, `username`/`password` query parameters.
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "building request");

        let builder = self.http.request(method, url).header(header::USER_AGENT, &self.user_agent);
        match &self.credentials {
            Some(credentials) => builder.query(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ]),
            None => builder,
        }
    }

    /// GET `path` with `query` and return the status plus body text.
    ///
    /// Non-success statuses are returned as replies, not errors, so callers can
    /// move on to the next endpoint variant.
    pub async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<HttpReply, ApiError> {
        let request = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .build()
            .map_err(|source| ApiError::Transport {
                url: format!("{}{}", self.base_url, path),
                source,
            })?;
        let url = redact_sensitive(request.url().as_str());
        debug!(%url, "sending registry request");

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|source| ApiError::Transport { url: url.clone(), source })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ApiError::Transport { url: url.clone(), source })?;
        debug!(%url, status = status.as_u16(), bytes = body.len(), "registry response received");
        Ok(HttpReply { status, body })
    }
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - scheme must be `http` or `https`
/// - a host is required
fn validate_base_url(base: &str) -> Result<(), ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };
    let parsed_base_url = Url::parse(base).map_err(|error| invalid(error.to_string()))?;
    if !matches!(parsed_base_url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed_base_url.scheme())));
    }
    if parsed_base_url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}
