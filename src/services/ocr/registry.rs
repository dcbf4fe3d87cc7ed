use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::config::EngineConfig;
use crate::core::errors::EngineResult;
use crate::core::types::EngineHandle;
use crate::services::ocr::contour::CONTOUR_BACKEND;
use crate::services::ocr::{ContourDetector, RecognitionBackend, TesseractBackend};

/// Constructor for one candidate backend, run once during initialization
pub type BackendFactory = Box<dyn FnOnce() -> EngineResult<Arc<dyn RecognitionBackend>>>;

/// Process-wide set of recognition backends.
///
/// Built once at startup and read-only afterwards. Backends are kept in
/// priority order (best quality first, contour fallback last).
pub struct EngineRegistry {
    backends: Vec<Arc<dyn RecognitionBackend>>,
    handles: Vec<EngineHandle>,
}

impl EngineRegistry {
    /// Probe the fixed candidate list, then register the contour fallback.
    pub fn initialize(config: &EngineConfig) -> Self {
        let mut candidates: Vec<(&'static str, BackendFactory)> = Vec::new();

        candidates.push(("neural", neural_factory(config)));

        let command = config.tesseract_command.clone();
        let timeout = Duration::from_secs(config.tesseract_timeout_seconds);
        let tesseract: BackendFactory = Box::new(move || {
            TesseractBackend::probe(&command, timeout)
                .map(|b| Arc::new(b) as Arc<dyn RecognitionBackend>)
        });
        candidates.push(("tesseract", tesseract));

        Self::from_candidates(candidates, Some(Arc::new(ContourDetector::new())))
    }

    /// Run each candidate factory in order. A failing candidate is logged
    /// and skipped; it never prevents the others from registering.
    pub fn from_candidates(
        candidates: Vec<(&'static str, BackendFactory)>,
        fallback: Option<Arc<dyn RecognitionBackend>>,
    ) -> Self {
        let mut backends = Vec::new();
        let mut handles = Vec::new();

        for (name, factory) in candidates {
            match factory() {
                Ok(backend) => {
                    info!(engine = name, "OCR backend initialized");
                    handles.push(EngineHandle {
                        name: backend.name().to_string(),
                        available: true,
                        detail: None,
                    });
                    backends.push(backend);
                }
                Err(e) => {
                    warn!(engine = name, error = %e, "OCR backend not available");
                    handles.push(EngineHandle {
                        name: name.to_string(),
                        available: false,
                        detail: Some(e.to_string()),
                    });
                }
            }
        }

        if let Some(fallback) = fallback {
            info!(engine = fallback.name(), "Fallback detector registered");
            handles.push(EngineHandle {
                name: fallback.name().to_string(),
                available: true,
                detail: Some("fallback".to_string()),
            });
            backends.push(fallback);
        }

        let registry = Self { backends, handles };
        registry.log_summary();
        registry
    }

    /// Registry over already-constructed backends, in the given order
    pub fn with_backends(backends: Vec<Arc<dyn RecognitionBackend>>) -> Self {
        let handles = backends
            .iter()
            .map(|b| EngineHandle {
                name: b.name().to_string(),
                available: true,
                detail: None,
            })
            .collect();
        Self { backends, handles }
    }

    /// True iff at least one backend (fallback included) registered
    pub fn is_ready(&self) -> bool {
        !self.backends.is_empty()
    }

    /// True when something better than the contour fallback can read text
    pub fn has_text_backend(&self) -> bool {
        self.backends.iter().any(|b| b.name() != CONTOUR_BACKEND)
    }

    /// Handles of registered backends, in priority order
    pub fn list_available(&self) -> Vec<EngineHandle> {
        self.handles.iter().filter(|h| h.available).cloned().collect()
    }

    /// Every candidate, including ones that failed to initialize
    pub fn handles(&self) -> &[EngineHandle] {
        &self.handles
    }

    pub fn backends(&self) -> &[Arc<dyn RecognitionBackend>] {
        &self.backends
    }

    fn log_summary(&self) {
        let summary: Vec<String> = self
            .handles
            .iter()
            .map(|h| match (&h.available, &h.detail) {
                (true, Some(detail)) => format!("{} - Available ({})", h.name, detail),
                (true, None) => format!("{} - Success", h.name),
                (false, detail) => format!(
                    "{} - Failed: {}",
                    h.name,
                    detail.as_deref().unwrap_or("unknown error")
                ),
            })
            .collect();
        info!("OCR engine initialization summary: [{}]", summary.join(", "));

        if self.backends.is_empty() {
            warn!("No OCR engines available! Extraction will return diagnostics only.");
        }
    }
}

#[cfg(feature = "onnx")]
fn neural_factory(config: &EngineConfig) -> BackendFactory {
    let model_path = std::path::PathBuf::from(&config.neural_model_path);
    let vocab_path = std::path::PathBuf::from(&config.neural_vocab_path);
    Box::new(move || {
        crate::services::ocr::neural::NeuralBackend::new(&model_path, &vocab_path)
            .map(|b| Arc::new(b) as Arc<dyn RecognitionBackend>)
    })
}

#[cfg(not(feature = "onnx"))]
fn neural_factory(_config: &EngineConfig) -> BackendFactory {
    Box::new(|| {
        Err(crate::core::errors::EngineError::Unavailable(
            "compiled without onnx support".to_string(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::EngineError;
    use crate::core::types::{LanguageCode, NormalizedImage, RecognizedFragment};

    struct Named(&'static str);

    impl RecognitionBackend for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn recognize(
            &self,
            _image: &NormalizedImage,
            _languages: &[LanguageCode],
        ) -> EngineResult<Vec<RecognizedFragment>> {
            Ok(Vec::new())
        }
    }

    fn ok(name: &'static str) -> BackendFactory {
        Box::new(move || Ok(Arc::new(Named(name)) as Arc<dyn RecognitionBackend>))
    }

    fn failing(reason: &'static str) -> BackendFactory {
        Box::new(move || Err(EngineError::Unavailable(reason.to_string())))
    }

    #[test]
    fn test_failed_candidate_does_not_block_others() {
        let registry = EngineRegistry::from_candidates(
            vec![("first", failing("no model")), ("second", ok("second"))],
            Some(Arc::new(ContourDetector::new())),
        );

        let names: Vec<String> = registry.list_available().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["second", "contour"]);
        assert_eq!(registry.handles().len(), 3);
        assert!(!registry.handles()[0].available);
        assert_eq!(registry.handles()[0].detail.as_deref(), Some("backend unavailable: no model"));
        assert!(registry.is_ready());
    }

    #[test]
    fn test_fallback_alone_is_ready() {
        let registry = EngineRegistry::from_candidates(
            vec![("a", failing("x")), ("b", failing("y"))],
            Some(Arc::new(ContourDetector::new())),
        );
        assert!(registry.is_ready());
        assert!(!registry.has_text_backend());
        assert_eq!(registry.backends().len(), 1);
        assert_eq!(registry.backends()[0].name(), "contour");
    }

    #[test]
    fn test_nothing_registered_is_not_ready() {
        let registry = EngineRegistry::from_candidates(vec![("a", failing("x"))], None);
        assert!(!registry.is_ready());
        assert!(registry.list_available().is_empty());
    }

    #[test]
    fn test_initialize_always_has_fallback_last() {
        let config = crate::core::Config::from_lookup(|key| match key {
            "TESSERACT_COMMAND" => Some("definitely-not-a-tesseract-binary".to_string()),
            "NEURAL_MODEL_PATH" => Some("missing/model.onnx".to_string()),
            _ => None,
        })
        .unwrap();
        let registry = EngineRegistry::initialize(&config.engines);
        assert!(registry.is_ready());
        assert_eq!(registry.backends().last().unwrap().name(), "contour");
        assert_eq!(registry.handles().len(), 3);
    }
}
