// Service configuration for crownscope

use crate::gsd::{Gsd, DEFAULT_GSD};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Segmentation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX export of the crown segmentation weights
    pub path: PathBuf,
    /// Square letterbox side fed to the network
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Probability above which a pixel belongs to a crown
    pub mask_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("runs/segment/tree_crowns/weights/best.onnx"),
            input_size: 1024,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            mask_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub default_gsd: f64,
    pub log_level: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            default_gsd: DEFAULT_GSD,
            log_level: "info".to_string(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<AnalyzerConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<AnalyzerConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        if let Ok(config) = serde_yaml::from_str::<AnalyzerConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Override fields from environment variables. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("CROWNSCOPE_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("CROWNSCOPE_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.server.port = p;
            }
        }

        if let Some(path) = var("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }

        if let Some(level) = var("CROWNSCOPE_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(gsd) = var("CROWNSCOPE_DEFAULT_GSD") {
            if let Ok(g) = gsd.parse::<f64>() {
                self.default_gsd = g;
            }
        }
    }

    /// Scale applied to requests that omit one
    pub fn default_gsd(&self) -> Result<Gsd, ConfigError> {
        Gsd::new(self.default_gsd).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port cannot be 0".to_string()
            ));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_upload_bytes must be > 0".to_string()
            ));
        }

        // YOLO strides require multiples of 32
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(ConfigError::ValidationError(format!(
                "model.input_size must be a positive multiple of 32, got {}",
                self.model.input_size
            )));
        }

        for (name, value) in [
            ("model.confidence_threshold", self.model.confidence_threshold),
            ("model.iou_threshold", self.model.iou_threshold),
            ("model.mask_threshold", self.model.mask_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.model.max_detections == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_detections must be > 0".to_string()
            ));
        }

        self.default_gsd()?;

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::Error {
    fn from(err: ConfigError) -> Self {
        crate::error::Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.model.input_size, 1024);
        assert_eq!(config.model.confidence_threshold, 0.25);
        assert_eq!(config.default_gsd, 0.45);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_toml_partial() {
        let config = AnalyzerConfig::from_str(
            r#"
            default_gsd = 0.1

            [server]
            port = 8080

            [model]
            path = "/models/crowns.onnx"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.model.path, PathBuf::from("/models/crowns.onnx"));
        assert_eq!(config.model.input_size, 1024);
        assert_eq!(config.default_gsd, 0.1);
    }

    #[test]
    fn test_from_str_json() {
        let config = AnalyzerConfig::from_str(r#"{"log_level": "debug", "model": {"input_size": 640}}"#)
            .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.model.input_size, 640);
    }

    #[test]
    fn test_from_str_yaml() {
        let config = AnalyzerConfig::from_str("server:\n  port: 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_from_str_garbage() {
        assert!(matches!(
            AnalyzerConfig::from_str("[[[ not config"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 7000").unwrap();
        let config = AnalyzerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            AnalyzerConfig::from_file("/nonexistent/crownscope.toml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_apply_vars() {
        let vars: HashMap<&str, &str> = [
            ("CROWNSCOPE_HOST", "127.0.0.1"),
            ("CROWNSCOPE_PORT", "not-a-port"),
            ("MODEL_PATH", "/tmp/best.onnx"),
            ("CROWNSCOPE_DEFAULT_GSD", "0.2"),
        ]
        .into_iter()
        .collect();
        let mut config = AnalyzerConfig::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.model.path, PathBuf::from("/tmp/best.onnx"));
        assert_eq!(config.default_gsd, 0.2);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AnalyzerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.model.input_size = 1000;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.model.confidence_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.model.iou_threshold = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.model.max_detections = 0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.default_gsd = -0.45;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }
}
