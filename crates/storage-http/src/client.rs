//! `reqwest`-based blob source.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_LENGTH, RANGE};
use reqwest::{Client, Response, StatusCode};

use assetpack_common::validate_logical_path;
use assetpack_model::byte_range;
use assetpack_storage::{join_location, BlobLayout, BlobSource, SourceError};

use crate::error::HttpSourceError;

/// Default per-request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("assetpack/", env!("CARGO_PKG_VERSION"));

/// Options for the HTTP blob source.
#[derive(Debug, Clone)]
pub struct HttpSourceOptions {
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Artifact names under each base URL.
    pub layout: BlobLayout,
}

impl Default for HttpSourceOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            layout: BlobLayout::default(),
        }
    }
}

impl HttpSourceOptions {
    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the artifact layout.
    pub fn with_layout(mut self, layout: BlobLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// BlobSource implementation over HTTP byte-range requests.
///
/// `base` is the URL prefix of a published asset space, e.g.
/// `https://cdn.example.com/Games/H000001`.
pub struct HttpBlobSource {
    /// The underlying HTTP client (connection pooled).
    client: Client,
    layout: BlobLayout,
}

impl HttpBlobSource {
    /// Create a source with its own HTTP client.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the client cannot be built.
    pub fn new(options: HttpSourceOptions) -> Result<Self, SourceError> {
        let client: Client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| HttpSourceError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            layout: options.layout,
        })
    }

    /// Create a source from an existing client (for testing).
    pub fn from_client(client: Client, layout: BlobLayout) -> Self {
        Self { client, layout }
    }

    pub fn layout(&self) -> &BlobLayout {
        &self.layout
    }

    async fn get(&self, url: &str) -> Result<Response, HttpSourceError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpSourceError::transport(url, e))
    }

    async fn body(url: &str, response: Response) -> Result<Vec<u8>, HttpSourceError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpSourceError::transport(url, e))?;
        Ok(bytes.to_vec())
    }
}

fn check_status(url: &str, response: &Response) -> Result<(), HttpSourceError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(HttpSourceError::Status {
        location: url.to_string(),
        status: response.status().as_u16(),
    })
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[async_trait]
impl BlobSource for HttpBlobSource {
    async fn fetch_manifest(&self, base: &str) -> Result<Vec<u8>, SourceError> {
        let url: String = format!("{}?v={}", self.layout.manifest_location(base), now_millis());

        let response: Response = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| HttpSourceError::transport(&url, e))?;
        check_status(&url, &response)?;

        Ok(Self::body(&url, response).await?)
    }

    async fn blob_len(&self, base: &str) -> Result<Option<u64>, SourceError> {
        let url: String = self.layout.blob_location(base);
        let response: Response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| HttpSourceError::transport(&url, e))?;

        if !response.status().is_success() {
            log::debug!("HEAD {} returned {}", url, response.status());
            return Ok(None);
        }

        // Read the header directly: the body of a HEAD response is empty.
        let len: Option<u64> = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        Ok(len)
    }

    async fn read_range(
        &self,
        base: &str,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, SourceError> {
        let url: String = self.layout.blob_location(base);
        let range: String = match byte_range(offset, size) {
            Some(range) => range,
            None if size == 0 => return Ok(Vec::new()),
            None => {
                return Err(SourceError::InvalidConfig {
                    message: format!("range {}+{} overflows", offset, size),
                })
            }
        };

        let response: Response = self
            .client
            .get(&url)
            .header(RANGE, &range)
            .send()
            .await
            .map_err(|e| HttpSourceError::transport(&url, e))?;

        let status: StatusCode = response.status();
        let whole_body: bool = match status {
            StatusCode::PARTIAL_CONTENT => false,
            // Servers may ignore Range; the full body is only usable when it
            // is exactly the requested range.
            StatusCode::OK if offset == 0 => true,
            s if s.is_success() || s == StatusCode::RANGE_NOT_SATISFIABLE => {
                return Err(SourceError::RangeNotSupported {
                    location: url,
                    status: s.as_u16(),
                })
            }
            _ => {
                check_status(&url, &response)?;
                false
            }
        };

        let bytes: Vec<u8> = Self::body(&url, response).await?;
        if bytes.len() as u64 != size {
            if whole_body {
                return Err(SourceError::RangeNotSupported {
                    location: url,
                    status: status.as_u16(),
                });
            }
            return Err(SourceError::SizeMismatch {
                location: url,
                expected: size,
                actual: bytes.len() as u64,
            });
        }

        log::trace!("GET {} {} -> {} bytes", url, range, bytes.len());
        Ok(bytes)
    }

    async fn read_direct(&self, base: &str, path: &str) -> Result<Vec<u8>, SourceError> {
        validate_logical_path(path).map_err(|_| SourceError::InvalidPath {
            path: path.to_string(),
        })?;

        let url: String = join_location(base, path);
        let response: Response = self.get(&url).await?;
        check_status(&url, &response)?;

        Ok(Self::body(&url, response).await?)
    }
}
