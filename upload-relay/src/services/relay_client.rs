use crate::config::UpstreamConfig;
use crate::error::RelayError;
use crate::models::{FileContent, UploadedFile};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::observability::outgoing_headers;
use std::time::{Duration, Instant};
use tokio_util::io::ReaderStream;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Multipart field name the analysis API reads the document from.
const UPSTREAM_FILE_FIELD: &str = "file";

/// Forwards uploads to the analysis API. Cheap to clone; the connection pool
/// is shared.
#[derive(Clone)]
pub struct RelayClient {
    http: Client,
    url: Url,
    api_key: Secret<String>,
    timeout: Duration,
}

impl RelayClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, AppError> {
        let url = Url::parse(&config.url).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid upstream URL '{}': {}",
                config.url,
                e
            ))
        })?;

        if config.accept_invalid_certs {
            tracing::warn!(
                upstream = %url,
                "TLS certificate verification is disabled for the upstream API"
            );
        }

        let http = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            url,
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST the file to the analysis API and return its JSON verdict.
    ///
    /// The timeout covers connecting, sending the body and reading the whole
    /// response. When it fires the in-flight request is dropped, which closes
    /// the upstream connection. A timeout error carries the time actually
    /// waited, which is shorter than the overall timeout when connecting is
    /// what timed out.
    pub async fn analyze(
        &self,
        file: &UploadedFile,
        request_id: Option<&str>,
    ) -> Result<serde_json::Value, RelayError> {
        let form = Form::new().part(UPSTREAM_FILE_FIELD, self.file_part(file).await?);

        let request = self
            .http
            .post(self.url.clone())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .headers(outgoing_headers(request_id))
            .multipart(form);

        let started = Instant::now();
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(RelayError::UpstreamTimeout(started.elapsed()))
            }
            Ok(Err(e)) => return Err(RelayError::UpstreamUnavailable(e)),
            Err(_) => return Err(RelayError::UpstreamTimeout(started.elapsed())),
        };

        if !status.is_success() {
            return Err(RelayError::UpstreamStatus { status, body });
        }

        serde_json::from_str(&body).map_err(|e| RelayError::InvalidUpstreamResponse(e.to_string()))
    }

    async fn file_part(&self, file: &UploadedFile) -> Result<Part, RelayError> {
        let part = match file.content() {
            FileContent::Memory(data) => Part::stream_with_length(data.clone(), file.size),
            FileContent::Spooled(spool) => {
                let handle = tokio::fs::File::open(spool.path()).await.map_err(|e| {
                    RelayError::Internal(anyhow::anyhow!("Failed to open spool file: {}", e))
                })?;
                Part::stream_with_length(Body::wrap_stream(ReaderStream::new(handle)), file.size)
            }
        };

        part.file_name(file.filename.clone())
            .mime_str(file.mime_type.as_str())
            .map_err(|e| RelayError::Internal(anyhow::anyhow!("Invalid MIME type: {}", e)))
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("url", &self.url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
