pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{ConfigError, EngineError, PipelineError, PreprocessError, RequestError, TaskError};
pub use types::{
    EngineHandle, ExtractionMode, ExtractionOutcome, FileResult, LanguageCode, NormalizedImage,
    ProcessingOptions, RecognizedFragment, Task, TaskStatus, TaskSummary, TaskView, UploadedFile,
};
