//! Ferry Registry Client
//!
//! HTTP client for the build registry (GitLab-style v3 API). It resolves
//! projects, lists their builds, and streams build artifacts to disk.
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::{RegistryClient, Timeouts};
//! use ferry_core::domain::project::ProjectIdentity;
//!
//! # async fn example() -> ferry_client::Result<()> {
//! let client = RegistryClient::from_host("gitlab.example.com", "secret", Timeouts::default())?;
//!
//! let project_id = client
//!     .get_project_id(&ProjectIdentity::Name("website".to_string()))
//!     .await?;
//! let builds = client.list_builds(project_id, None).await?;
//! println!("{} successful builds", builds.len());
//! # Ok(())
//! # }
//! ```

mod artifacts;
mod builds;
pub mod error;
mod projects;

#[cfg(test)]
mod test_support;

pub use error::{ClientError, Result};

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Header carrying the registry access token
pub const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Path prefix of the registry API when only a host name is configured
pub const API_PREFIX: &str = "/api/v3";

/// Deadlines applied to registry traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Whole-request deadline for JSON endpoints
    pub request: Duration,
    /// TCP/TLS connect deadline for every request
    pub connect: Duration,
    /// Longest gap allowed between two chunks of an artifact download
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(60),
            connect: Duration::from_secs(10),
            read: Duration::from_secs(60),
        }
    }
}

/// HTTP client for the build registry API
///
/// Every request carries the private token header. Endpoints are grouped into:
/// - Project resolution (search by name)
/// - Build listing (per project or per commit)
/// - Artifact download
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// API base URL including the version prefix (e.g., "https://host/api/v3")
    base_url: String,
    /// Private access token
    token: String,
    /// HTTP client instance
    client: Client,
    timeouts: Timeouts,
}

impl RegistryClient {
    /// Create a new registry client with default timeouts
    ///
    /// # Arguments
    /// * `base_url` - The API base URL, including any version prefix
    /// * `token` - Private token sent with every request
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let timeouts = Timeouts::default();
        let client = build_http_client(&timeouts)?;
        Ok(Self::with_client(base_url, token, client).with_timeouts(timeouts))
    }

    /// Create a registry client from a configured host
    ///
    /// A bare host name becomes `https://<host>/api/v3`; a value that already
    /// carries a scheme is used as the API base URL as-is.
    pub fn from_host(host: &str, token: impl Into<String>, timeouts: Timeouts) -> Result<Self> {
        let client = build_http_client(&timeouts)?;
        Ok(Self::with_client(api_base_url(host), token, client).with_timeouts(timeouts))
    }

    /// Create a registry client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, token: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client,
            timeouts: Timeouts::default(),
        }
    }

    /// Replace the deadlines used for subsequent requests
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Start an authenticated GET request
    fn get(&self, url: &str) -> RequestBuilder {
        debug!("GET {}", url);
        self.client
            .get(url)
            .header(PRIVATE_TOKEN_HEADER, &self.token)
    }

    /// API URL for the given path segments, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ClientError::InvalidRequest(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::InvalidRequest(format!("Base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send an authenticated GET to a JSON endpoint and deserialize the body
    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.timeout(self.timeouts.request).send().await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Checks the status code first and returns an API error if the request
    /// failed. A body that cannot be read is a transport error; a body that
    /// is not the expected JSON is a parse error.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        let body = response.text().await?;

        serde_json::from_str(&body)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Turn a non-success response into an API error
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

fn build_http_client(timeouts: &Timeouts) -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeouts.connect)
        .build()?;
    Ok(client)
}

/// Derive the API base URL from a configured host
pub fn api_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}{}", host, API_PREFIX)
    }
}
