// Library exports for the OCR task workflow
//
// core -> services (backends, preprocessing, export) -> orchestration -> api

// Core modules
pub mod api;
pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{ConfigError, EngineError, PipelineError, PreprocessError, RequestError, TaskError},
    types::{
        ExtractionMode, FileResult, LanguageCode, NormalizedImage, ProcessingOptions,
        RecognizedFragment, Task, TaskStatus, UploadedFile,
    },
};

pub use api::{router, AppState};

pub use orchestration::{ExtractionOrchestrator, TaskRunner, TaskStore};

pub use services::{EngineRegistry, Preprocessor, RecognitionBackend, ResultExporter};

pub use utils::Metrics;

/// Backend features compiled into this build ("onnx" or "none")
pub const BACKEND_FEATURES: &str = env!("OCR_WORKFLOW_BACKEND_FEATURES");
