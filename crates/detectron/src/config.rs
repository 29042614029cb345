use std::env;
use std::str::FromStr;

pub use common::Environment;

use crate::error::DetectronError;

/// Channel order the model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    #[default]
    Bgr,
    Rgb,
}

impl FromStr for InputFormat {
    type Err = DetectronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BGR" => Ok(InputFormat::Bgr),
            "RGB" => Ok(InputFormat::Rgb),
            other => Err(DetectronError::Config(format!(
                "unsupported INPUT_FORMAT '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = DetectronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" | "gpu" => Ok(ExecutionProvider::Cuda),
            other => Err(DetectronError::Config(format!(
                "unsupported EXECUTION_PROVIDER '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub environment: Environment,
    pub weights_path: String,
    pub min_size_test: u32,
    pub max_size_test: u32,
    pub input_format: InputFormat,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl ProcessorConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self, DetectronError> {
        let environment = Environment::from_env();

        let weights_path =
            env::var("MODEL_WEIGHTS").unwrap_or_else(|_| "models/model_final.onnx".to_string());

        let min_size_test = env::var("INPUT_MIN_SIZE_TEST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(800);

        let max_size_test = env::var("INPUT_MAX_SIZE_TEST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1333);

        let input_format = match env::var("INPUT_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => InputFormat::default(),
        };

        let execution_provider = match env::var("EXECUTION_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) => ExecutionProvider::default(),
        };

        let intra_threads = env::var("INTRA_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);

        Ok(Self {
            environment,
            weights_path,
            min_size_test,
            max_size_test,
            input_format,
            execution_provider,
            intra_threads,
        })
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            weights_path: "/models/model_final.onnx".to_string(),
            min_size_test: 800,
            max_size_test: 1333,
            input_format: InputFormat::Bgr,
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 4,
        }
    }
}
