use crate::core::errors::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Request body limit, also applied to every uploaded file
    pub max_upload_bytes: usize,
}

/// Recognition backend configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub neural_model_path: String,
    pub neural_vocab_path: String,
    pub tesseract_command: String,
    /// A tesseract run still going after this long is killed
    pub tesseract_timeout_seconds: u64,
    /// Fragments below this confidence are discarded
    pub min_confidence: f32,
    /// Longest image side after preprocessing
    pub max_image_dimension: u32,
}

/// Task lifecycle configuration
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub retention_seconds: u64,
    /// Ceiling on non-terminal tasks; submissions above it are rejected
    pub max_active_tasks: usize,
    /// Lowercase extensions without the leading dot
    pub allowed_extensions: Vec<String>,
    pub max_languages: usize,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub engines: EngineConfig,
    pub tasks: TaskConfig,
}

const DEFAULT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "gif", "webp"];

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build and validate a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::load(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn load<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Parse log level
        let log_level = lookup("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let allowed_extensions = lookup("ALLOWED_EXTENSIONS")
            .map(|exts| {
                exts.split(',')
                    .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            server: ServerConfig {
                port: parse_or(lookup, "SERVER_PORT", 5000)?,
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                log_level,
                max_upload_bytes: parse_or(lookup, "MAX_UPLOAD_BYTES", 16 * 1024 * 1024)?,
            },
            engines: EngineConfig {
                neural_model_path: lookup("NEURAL_MODEL_PATH")
                    .unwrap_or_else(|| "models/ocr/ocr.onnx".to_string()),
                neural_vocab_path: lookup("NEURAL_VOCAB_PATH")
                    .unwrap_or_else(|| "models/ocr/vocab.txt".to_string()),
                tesseract_command: lookup("TESSERACT_COMMAND")
                    .unwrap_or_else(|| "tesseract".to_string()),
                tesseract_timeout_seconds: parse_or(lookup, "TESSERACT_TIMEOUT_SECONDS", 120)?,
                min_confidence: parse_or(lookup, "MIN_CONFIDENCE", 0.1)?,
                max_image_dimension: parse_or(lookup, "MAX_IMAGE_DIMENSION", 2048)?,
            },
            tasks: TaskConfig {
                retention_seconds: parse_or(lookup, "TASK_RETENTION_SECONDS", 3600)?,
                max_active_tasks: match lookup("MAX_ACTIVE_TASKS") {
                    Some(raw) => parse_value("MAX_ACTIVE_TASKS", &raw)?,
                    // One runner per core, with a floor for small machines
                    None => std::cmp::max(num_cpus::get(), 4),
                },
                allowed_extensions,
                max_languages: parse_or(lookup, "MAX_LANGUAGES", 8)?,
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "max_upload_bytes must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.engines.min_confidence) {
            return Err(ConfigError::InvalidConfidence(self.engines.min_confidence));
        }

        if !(64..=8192).contains(&self.engines.max_image_dimension) {
            return Err(ConfigError::InvalidEngineConfig(format!(
                "max_image_dimension must be between 64 and 8192, got {}",
                self.engines.max_image_dimension
            )));
        }

        if self.engines.tesseract_command.trim().is_empty() {
            return Err(ConfigError::InvalidEngineConfig(
                "tesseract_command must not be empty".to_string(),
            ));
        }

        if self.engines.tesseract_timeout_seconds == 0 {
            return Err(ConfigError::InvalidEngineConfig(
                "tesseract_timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.tasks.retention_seconds == 0 {
            return Err(ConfigError::InvalidTaskConfig(
                "retention_seconds must be > 0".to_string(),
            ));
        }

        if self.tasks.max_active_tasks == 0 {
            return Err(ConfigError::InvalidTaskConfig(
                "max_active_tasks must be > 0".to_string(),
            ));
        }

        if self.tasks.allowed_extensions.is_empty() {
            return Err(ConfigError::InvalidTaskConfig(
                "allowed_extensions must list at least one extension".to_string(),
            ));
        }

        if self.tasks.max_languages == 0 {
            return Err(ConfigError::InvalidTaskConfig(
                "max_languages must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_bytes
    }

    pub fn min_confidence(&self) -> f32 {
        self.engines.min_confidence
    }

    pub fn max_image_dimension(&self) -> u32 {
        self.engines.max_image_dimension
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.tasks.retention_seconds)
    }

    pub fn max_active_tasks(&self) -> usize {
        self.tasks.max_active_tasks
    }

    pub fn max_languages(&self) -> usize {
        self.tasks.max_languages
    }

    /// Case-insensitive extension check against the allow-list
    pub fn is_allowed_filename(&self, filename: &str) -> bool {
        std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.tasks.allowed_extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::EnvVarError {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

// Note: No Default implementation because Config::new() can fail.
// Tests build one through Config::from_lookup.
