use crate::classifier::InputContract;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub models: ModelsConfig,
    #[serde(default)]
    pub detector: Option<DetectorConfig>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

fn default_max_request_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("server.host must not be empty".to_string());
        }
        if self.max_request_bytes == 0 {
            return Err("server.max_request_bytes must be positive".to_string());
        }
        Ok(())
    }
}

/// Classifier artifacts. A backend whose files are missing is not a
/// configuration error: it is recorded as a load failure by the registry.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    pub model_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

fn default_intra_threads() -> usize {
    1
}

impl ModelsConfig {
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.model_dir.join(file)
    }
}

impl Validatable for ModelsConfig {
    fn validate(&self) -> Result<(), String> {
        if self.num_instances == 0 {
            return Err("models.num_instances must be positive".to_string());
        }
        if self.intra_threads == 0 {
            return Err("models.intra_threads must be positive".to_string());
        }
        for backend in &self.backends {
            backend.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub id: String,
    pub model_file: String,
    pub labels_file: String,
    pub input: InputContract,
}

impl Validatable for BackendConfig {
    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("backend id must not be empty".to_string());
        }
        match self.input {
            InputContract::Landmarks { len } if len == 0 => Err(format!(
                "backend `{}` declares an empty landmark vector",
                self.id
            )),
            InputContract::Image {
                height,
                width,
                channels,
            } if height == 0 || width == 0 || channels != 3 => Err(format!(
                "backend `{}` declares an invalid image input {}x{}x{}",
                self.id, height, width, channels
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    pub model_file: String,
    #[serde(default = "default_detector_input_size")]
    pub input_size: u32,
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_landmark_len")]
    pub landmark_len: usize,
    #[serde(default = "default_max_hands")]
    pub max_hands: usize,
    #[serde(default)]
    pub landmarks_output: Option<String>,
    #[serde(default)]
    pub presence_output: Option<String>,
}

fn default_detector_input_size() -> u32 {
    224
}

fn default_min_detection_confidence() -> f32 {
    0.5
}

fn default_landmark_len() -> usize {
    crate::extractor::LANDMARK_VECTOR_LEN
}

fn default_max_hands() -> usize {
    2
}

impl Validatable for DetectorConfig {
    fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 {
            return Err("detector.input_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err("detector.min_detection_confidence must be within [0, 1]".to_string());
        }
        if self.landmark_len == 0 || self.landmark_len % 3 != 0 {
            return Err("detector.landmark_len must be a positive multiple of 3".to_string());
        }
        if self.max_hands == 0 {
            return Err("detector.max_hands must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    #[serde(default)]
    pub min_confidence: f32,
}

fn default_backend_timeout_ms() -> u64 {
    2000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: default_backend_timeout_ms(),
            min_confidence: 0.0,
        }
    }
}

impl DispatchConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl Validatable for DispatchConfig {
    fn validate(&self) -> Result<(), String> {
        if self.backend_timeout_ms == 0 {
            return Err("dispatch.backend_timeout_ms must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err("dispatch.min_confidence must be within [0, 1]".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LabelsConfig {
    #[serde(default)]
    pub semantic_words: bool,
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.models.validate()?;
        self.dispatch.validate()?;
        if let Some(detector) = &self.detector {
            detector.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "{} is not a supported minimum log level. Use `debug`, `info` or `warn`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&base_path.join("configuration"), &environment)
}

pub fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = config.try_deserialize::<Config>()?;
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configuration")
    }

    #[test]
    fn test_load_shipped_configuration() {
        let config = load_configuration(&configuration_dir(), &Environment::Local).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        let ids: Vec<_> = config.models.backends.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["landmark", "enhanced-image"]);
        assert_eq!(
            config.models.backends[0].input,
            InputContract::Landmarks { len: 63 }
        );
        assert_eq!(
            config.models.backends[1].input,
            InputContract::Image {
                height: 64,
                width: 64,
                channels: 3
            }
        );
        let detector = config.detector.unwrap();
        assert_eq!(detector.max_hands, 2);
        assert!(detector.validate().is_ok());
    }

    #[test]
    fn test_environment_parsing() {
        assert!(matches!(
            Environment::try_from("PRODUCTION".to_string()),
            Ok(Environment::Production)
        ));
        assert!(Environment::try_from("staging".to_string()).is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::try_from("Info".to_string()), Ok(LogLevel::Info));
        assert!(LogLevel::try_from("trace".to_string()).is_err());
    }

    #[test]
    fn test_dispatch_validation() {
        let mut dispatch = DispatchConfig::default();
        assert!(dispatch.validate().is_ok());

        dispatch.min_confidence = 1.5;
        assert!(dispatch.validate().is_err());
    }

    #[test]
    fn test_backend_validation_rejects_non_rgb_image() {
        let backend = BackendConfig {
            id: "enhanced-image".to_string(),
            model_file: "model.onnx".to_string(),
            labels_file: "labels.json".to_string(),
            input: InputContract::Image {
                height: 64,
                width: 64,
                channels: 1,
            },
        };

        assert!(backend.validate().is_err());
    }
}
