use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::api::models::{ClassificationResponse, HealthResponse, SupportedClassesResponse};
use crate::logger::{debug, warn, Component};
use crate::settings::ServerSettings;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("could not reach classification service: {0}")]
    Unreachable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::MalformedResponse(err.to_string())
        } else {
            TransportError::Unreachable(err.to_string())
        }
    }
}

/// Connection parameters for the classification service, constructed once at
/// startup and injected wherever a client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Remote classification seam. The controller only sees this trait so tests
/// can drive the cycle with a scripted classifier.
#[async_trait]
pub trait SoundClassifier: Send + Sync {
    /// Upload a recorded clip and return the classification outcome.
    ///
    /// HTTP-level errors (4xx/5xx) are folded into a `success: false`
    /// response; only transport-layer failures surface as `TransportError`.
    async fn classify(&self, clip: &Path) -> Result<ClassificationResponse, TransportError>;

    async fn check_health(&self) -> Result<HealthResponse, TransportError>;

    async fn supported_classes(&self) -> Result<SupportedClassesResponse, TransportError>;
}

pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, String> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(format!("Soundwatch/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl SoundClassifier for ApiClient {
    async fn classify(&self, clip: &Path) -> Result<ClassificationResponse, TransportError> {
        let bytes = tokio::fs::read(clip)
            .await
            .map_err(|e| TransportError::Unreachable(format!("failed to read clip: {}", e)))?;

        let file_name = clip
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip.wav".to_string());

        debug(
            Component::Classification,
            &format!("Uploading {} ({} bytes)", file_name, bytes.len()),
        );

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/*")
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response = self
            .client
            .post(self.config.endpoint("classify"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .json::<ClassificationResponse>()
                .await
                .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
            return Ok(body);
        }

        // HTTP errors are results, not failures: the server reports
        // unprocessable audio and similar conditions as structured bodies
        // with non-2xx statuses.
        warn(
            Component::Classification,
            &format!("Server returned HTTP {}", status.as_u16()),
        );
        match response.json::<ClassificationResponse>().await {
            Ok(mut body) => {
                body.success = false;
                Ok(body)
            }
            Err(_) => Ok(ClassificationResponse::server_error(status.as_u16())),
        }
    }

    async fn check_health(&self) -> Result<HealthResponse, TransportError> {
        let response = self
            .client
            .get(self.config.endpoint("health"))
            .send()
            .await?;

        response
            .json::<HealthResponse>()
            .await
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))
    }

    async fn supported_classes(&self) -> Result<SupportedClassesResponse, TransportError> {
        let response = self
            .client
            .get(self.config.endpoint("supported-classes"))
            .send()
            .await?;

        response
            .json::<SupportedClassesResponse>()
            .await
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joining() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:5000/".to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        };
        assert_eq!(config.endpoint("classify"), "http://127.0.0.1:5000/classify");

        let config = ClientConfig {
            base_url: "http://127.0.0.1:5000".to_string(),
            ..config
        };
        assert_eq!(config.endpoint("health"), "http://127.0.0.1:5000/health");
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ServerSettings::default();
        let config = ClientConfig::from_settings(&settings);
        assert_eq!(config.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
