//! HTTP implementation of the analysis gateway.

use crate::error::{GatewayError, GatewayResult, GENERIC_REMOTE_MESSAGE};
use crate::gateway::AnalysisGateway;
use crate::models::{AnalysisRequest, AnalysisResult, HealthStatus, RemoteErrorBody, SampleIds};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the analysis service.
    pub api_url: String,
    /// Request timeout. `None` waits for as long as the service takes.
    pub timeout_seconds: Option<u64>,
    /// Number of sample IDs to request.
    pub sample_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            timeout_seconds: None,
            sample_limit: 10,
        }
    }
}

/// Gateway that forwards calls to the analysis service over HTTP.
pub struct HttpGateway {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway for the configured service.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        info!("Analysis service at {}", config.api_url);

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        // A local backend is never reached through a proxy.
        if is_loopback(&config.api_url) {
            builder = builder.no_proxy();
        }

        let http_client = builder
            .build()
            .map_err(|e| GatewayError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// The configured service base URL.
    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    /// Check `GET /health`. Returns whether the service reports itself healthy.
    pub async fn health(&self) -> GatewayResult<bool> {
        let url = self.endpoint("/health");
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(GatewayError::remote(
                response.status().as_u16(),
                format!("Health check failed with status {}", response.status()),
            ));
        }

        let health: HealthStatus = response.json().await.map_err(|e| self.classify(e))?;
        Ok(health.status == "healthy")
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Map a reqwest failure onto the gateway error taxonomy.
    fn classify(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::timeout(format!(
                "Request timed out after {}s",
                self.config.timeout_seconds.unwrap_or_default()
            ))
        } else if e.is_connect() {
            GatewayError::transport(format!(
                "Cannot connect to analysis service at {}",
                self.config.api_url
            ))
        } else if e.is_decode() {
            GatewayError::transport(format!("Failed to parse analysis response: {}", e))
        } else {
            GatewayError::transport(e.to_string())
        }
    }

    async fn fetch_sample_ids(&self) -> GatewayResult<Vec<String>> {
        let url = self.endpoint("/api/sample-ids");
        let response = self
            .http_client
            .get(&url)
            .query(&[("limit", self.config.sample_limit)])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::remote(status.as_u16(), GENERIC_REMOTE_MESSAGE));
        }

        let sample_ids: SampleIds = response.json().await.map_err(|e| self.classify(e))?;
        Ok(sample_ids.ids)
    }
}

#[async_trait]
impl AnalysisGateway for HttpGateway {
    async fn submit_analysis(&self, patient_id: &str) -> GatewayResult<AnalysisResult> {
        let request = AnalysisRequest::new(patient_id)?;
        let url = self.endpoint("/api/analyze");

        debug!("Submitting patient {} to {}", request.patient_id, url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RemoteErrorBody>(&body)
                .ok()
                .and_then(|b| b.message())
                .unwrap_or_else(|| GENERIC_REMOTE_MESSAGE.to_string());

            warn!("Analysis service returned {}: {}", status, message);
            return Err(GatewayError::remote(status.as_u16(), message));
        }

        let result: AnalysisResult = response.json().await.map_err(|e| self.classify(e))?;
        debug!("Received sections: {:?}", result.present_sections());

        Ok(result)
    }

    async fn list_sample_ids(&self) -> Vec<String> {
        match self.fetch_sample_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Sample IDs unavailable ({}): {}", e.status(), e);
                Vec::new()
            }
        }
    }
}

fn is_loopback(api_url: &str) -> bool {
    reqwest::Url::parse(api_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .map(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]" | "::1"))
        .unwrap_or(false)
}
