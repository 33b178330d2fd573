//! reqwest-backed transport for the Trojan Parse service

use super::{Backend, ClientError, HealthStatus, HttpReply, StatusSource};
use crate::request::{AnalyzeRequest, AnalyzeSource};
use crate::ClientConfig;
use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// HTTP transport for a Trojan Parse API server
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend for `base_url` with no request deadline
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::build(base_url.into(), None)
    }

    /// Create from configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::build(
            config.api_base.clone(),
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    fn build(base_url: String, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|e| {
            ClientError::Transport(format!("Invalid API base URL {}: {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Transport(format!(
                "Invalid API base URL {}: expected http or https",
                base_url
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// `POST /analyze` body
#[derive(Serialize)]
struct AnalyzeBody<'a> {
    text: &'a str,
    engine: &'a str,
    model_id: &'a str,
}

/// `GET /health` response
#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    service: Option<String>,
}

async fn read_reply(response: reqwest::Response) -> Result<HttpReply, ClientError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(HttpReply { status, body })
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<HttpReply, ClientError> {
        let response = match &request.source {
            AnalyzeSource::Text(text) => {
                let body = AnalyzeBody {
                    text,
                    engine: &request.engine,
                    model_id: &request.model_id,
                };
                self.client
                    .post(self.url("analyze"))
                    .json(&body)
                    .send()
                    .await?
            }
            AnalyzeSource::File(file) => {
                let part = Part::bytes(file.bytes().to_vec()).file_name(file.file_name().to_string());
                let form = Form::new()
                    .part("file", part)
                    .text("engine", request.engine.clone())
                    .text("model_id", request.model_id.clone());
                self.client
                    .post(self.url("analyze/upload"))
                    .multipart(form)
                    .send()
                    .await?
            }
        };

        let reply = read_reply(response).await?;
        debug!(status = reply.status, body_len = reply.body.len(), "Analyze reply");
        Ok(reply)
    }

    async fn get_status(&self, source: StatusSource) -> Result<HttpReply, ClientError> {
        let response = self
            .client
            .get(self.url(source.path()))
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;

        read_reply(response).await
    }

    async fn health(&self) -> HealthStatus {
        let start = Instant::now();

        match self.client.get(self.url("health")).send().await {
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                if !response.status().is_success() {
                    return HealthStatus {
                        healthy: false,
                        service: None,
                        latency_ms: Some(latency),
                        error: Some(format!("HTTP {}", response.status())),
                    };
                }

                match response.json::<HealthResponse>().await {
                    Ok(body) => HealthStatus {
                        healthy: body.ok,
                        service: body.service,
                        latency_ms: Some(latency),
                        error: None,
                    },
                    Err(e) => HealthStatus {
                        healthy: false,
                        service: None,
                        latency_ms: Some(latency),
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => HealthStatus {
                healthy: false,
                service: None,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = HttpBackend::new("http://localhost:5050/api/").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:5050/api");
        assert_eq!(backend.url("models/status"), "http://localhost:5050/api/models/status");
        assert_eq!(backend.name(), "http://localhost:5050/api");
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let err = HttpBackend::new("localhost:5050 api").err().unwrap();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.to_string().starts_with("Invalid API base URL localhost:5050 api"));

        let err = HttpBackend::new("ftp://classics.example.org/api").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Invalid API base URL ftp://classics.example.org/api: expected http or https"
        );
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig {
            api_base: "https://classics.example.org/api".to_string(),
            timeout_secs: Some(30),
            ..ClientConfig::default()
        };
        let backend = HttpBackend::from_config(&config).unwrap();
        assert_eq!(backend.url("analyze"), "https://classics.example.org/api/analyze");
    }
}
