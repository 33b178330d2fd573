//! Trojan Parse client - request orchestration and model status polling
//!
//! This crate provides:
//! - A transport seam for the analysis service with a reqwest implementation
//! - Single-flight analyze requests (text or file) with simulated progress
//! - Model status polling with primary/registry fallback and payload normalization
//! - JSON export of the current result or input

pub mod backend;
pub mod export;
pub mod lifecycle;
pub mod normalize;
pub mod periodic;
pub mod request;
pub mod status;

pub use backend::{Backend, ClientError, HealthStatus, HttpBackend, HttpReply, StatusSource};
pub use export::{ExportArtifact, ResultExporter};
pub use lifecycle::{AnalyzeResult, LifecycleSnapshot, RequestLifecycle, RequestState};
pub use normalize::{normalize, ModelStatusRecord};
pub use request::{AnalyzeRequest, AnalyzeSource, UploadFile, ValidationError};
pub use status::{StatusBoard, StatusPoller};

use serde::Deserialize;
use std::time::Duration;

/// Environment variable that overrides `api_base`
pub const API_BASE_ENV: &str = "TROJAN_API_BASE";

/// Configuration for the analysis client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the analysis service (all endpoints are relative to it)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Engine field sent with every analyze request
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Status view polling period (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Progress simulation tick (ms)
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,

    /// Simulated progress never passes this value before the response arrives
    #[serde(default = "default_progress_ceiling")]
    pub progress_ceiling: f64,

    /// File name used for exported results
    #[serde(default = "default_export_file_name")]
    pub export_file_name: String,

    /// Selectable model ids
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Optional request deadline; none by default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_api_base() -> String { "http://localhost:5050/api".to_string() }
fn default_engine() -> String { "model".to_string() }
fn default_poll_interval_ms() -> u64 { 10_000 }
fn default_progress_tick_ms() -> u64 { 200 }
pub(crate) fn default_progress_ceiling() -> f64 { 90.0 }
fn default_export_file_name() -> String { "trojan-parse-result.json".to_string() }
fn default_models() -> Vec<String> {
    vec![
        "latin_model:1.0.0".to_string(),
        "greek_model:1.0.0".to_string(),
        "auto".to_string(),
    ]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            engine: default_engine(),
            poll_interval_ms: default_poll_interval_ms(),
            progress_tick_ms: default_progress_tick_ms(),
            progress_ceiling: default_progress_ceiling(),
            export_file_name: default_export_file_name(),
            models: default_models(),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply `TROJAN_API_BASE` if it is set and non-empty
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                self.api_base = base;
            }
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms.max(1))
    }

    /// Whether `model_id` is one of the configured models
    pub fn knows_model(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m == model_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config.api_base, "http://localhost:5050/api");
        assert_eq!(config.engine, "model");
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.progress_tick(), Duration::from_millis(200));
        assert_eq!(config.progress_ceiling, 90.0);
        assert_eq!(config.export_file_name, "trojan-parse-result.json");
        assert_eq!(config.models.len(), 3);
        assert!(config.timeout_secs.is_none());
    }

    #[test]
    fn test_partial_config() {
        let config = ClientConfig::from_toml_str(
            r#"
            api_base = "https://classics.example.org/api"
            poll_interval_ms = 2500
            models = ["latin_model:2.0.0"]
            "#,
        )
        .unwrap();
        assert_eq!(config.api_base, "https://classics.example.org/api");
        assert_eq!(config.poll_interval_ms, 2500);
        assert!(config.knows_model("latin_model:2.0.0"));
        assert!(!config.knows_model("auto"));
        assert_eq!(config.engine, "model");
    }

    #[test]
    fn test_zero_tick_is_clamped() {
        let config = ClientConfig {
            progress_tick_ms: 0,
            ..ClientConfig::default()
        };
        assert_eq!(config.progress_tick(), Duration::from_millis(1));
    }
}
