// Extraction orchestrator: backend selection and failure isolation
//
// normal        -> first backend with non-empty text wins
// high_accuracy -> every backend runs, non-empty outputs become labeled sections
//
// Never fails. When nothing produced text the caller gets a diagnostic
// string naming what was attempted and why it failed.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::core::errors::EngineError;
use crate::core::types::{
    ExtractionMode, ExtractionOutcome, LanguageCode, NormalizedImage, ProcessingOptions,
};
use crate::services::ocr::{EngineRegistry, RecognitionBackend};
use crate::utils::Metrics;

pub const UNAVAILABLE_MESSAGE: &str =
    "No OCR engines available. Install tesseract or build with the onnx feature.";

/// Runs recognition backends according to the requested mode
pub struct ExtractionOrchestrator {
    registry: Arc<EngineRegistry>,
    min_confidence: f32,
    metrics: Metrics,
}

impl ExtractionOrchestrator {
    pub fn new(registry: Arc<EngineRegistry>, min_confidence: f32, metrics: Metrics) -> Self {
        Self {
            registry,
            min_confidence,
            metrics,
        }
    }

    /// Extract text from one normalized page.
    pub fn extract(&self, image: &NormalizedImage, options: &ProcessingOptions) -> String {
        if !self.registry.is_ready() {
            warn!("Extraction requested with no registered backends");
            return UNAVAILABLE_MESSAGE.to_string();
        }

        let mut outcomes = Vec::new();
        let mut sections = Vec::new();

        for backend in self.registry.backends() {
            let outcome = self.attempt(backend.as_ref(), image, &options.languages);
            let has_text = outcome.has_text();

            match options.mode {
                ExtractionMode::Normal if has_text => {
                    debug!(engine = %outcome.engine_name, "Normal mode stopped at first text");
                    return outcome.text.trim().to_string();
                }
                ExtractionMode::HighAccuracy if has_text => {
                    sections.push(format!(
                        "[{}]\n{}",
                        outcome.engine_name.to_uppercase(),
                        outcome.text.trim()
                    ));
                }
                _ => {}
            }
            outcomes.push(outcome);
        }

        if !sections.is_empty() {
            return sections.join("\n\n");
        }

        diagnostic(&outcomes)
    }

    /// Invoke one backend. Errors and panics both become failed outcomes.
    fn attempt(
        &self,
        backend: &dyn RecognitionBackend,
        image: &NormalizedImage,
        languages: &[LanguageCode],
    ) -> ExtractionOutcome {
        let name = backend.name();
        let start = Instant::now();

        let result = catch_unwind(AssertUnwindSafe(|| backend.recognize(image, languages)))
            .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(fragments) => {
                let total = fragments.len();
                let kept: Vec<String> = fragments
                    .into_iter()
                    .filter(|f| f.confidence >= self.min_confidence)
                    .map(|f| f.text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .collect();

                debug!(
                    engine = name,
                    fragments = total,
                    kept = kept.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Backend finished"
                );
                self.metrics.record_backend_call(name, true);
                ExtractionOutcome::success(name, kept.join("\n"))
            }
            Err(e) => {
                warn!(engine = name, error = %e, "Backend failed");
                self.metrics.record_backend_call(name, false);
                ExtractionOutcome::failure(name, e.to_string())
            }
        }
    }
}

/// Summary used when no backend produced text
fn diagnostic(outcomes: &[ExtractionOutcome]) -> String {
    let attempted: Vec<&str> = outcomes.iter().map(|o| o.engine_name.as_str()).collect();
    let errors: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.succeeded)
        .map(|o| {
            format!(
                "{} failed: {}",
                o.engine_name,
                o.error_detail.as_deref().unwrap_or("unknown error")
            )
        })
        .collect();

    let prefix = format!("Text extraction failed (attempted: {}).", attempted.join(", "));
    if errors.is_empty() {
        format!("{} No text detected", prefix)
    } else {
        format!("{} Errors: {}", prefix, errors.join("; "))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::EngineResult;
    use crate::core::types::RecognizedFragment;
    use image::GrayImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Empty,
        Text(&'static str, f32),
        Fail(&'static str),
        Panic,
    }

    struct Scripted {
        name: &'static str,
        script: Script,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn arc(name: &'static str, script: Script) -> Arc<Self> {
            Arc::new(Self {
                name,
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RecognitionBackend for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn recognize(
            &self,
            _image: &NormalizedImage,
            _languages: &[LanguageCode],
        ) -> EngineResult<Vec<RecognizedFragment>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Empty => Ok(Vec::new()),
                Script::Text(text, confidence) => Ok(vec![RecognizedFragment::new(text, confidence)]),
                Script::Fail(reason) => Err(EngineError::Inference(reason.to_string())),
                Script::Panic => panic!("backend exploded"),
            }
        }
    }

    fn orchestrator(backends: Vec<Arc<Scripted>>) -> ExtractionOrchestrator {
        let backends = backends
            .into_iter()
            .map(|b| b as Arc<dyn RecognitionBackend>)
            .collect();
        ExtractionOrchestrator::new(
            Arc::new(EngineRegistry::with_backends(backends)),
            0.1,
            Metrics::new(),
        )
    }

    fn page() -> NormalizedImage {
        NormalizedImage::new(GrayImage::new(8, 8))
    }

    fn options(mode: ExtractionMode) -> ProcessingOptions {
        ProcessingOptions {
            mode,
            ..ProcessingOptions::default()
        }
    }

    #[test]
    fn test_normal_mode_stops_at_first_text() {
        let first = Scripted::arc("first", Script::Empty);
        let second = Scripted::arc("second", Script::Text("  HELLO \n", 0.9));
        let third = Scripted::arc("third", Script::Text("unused", 0.9));
        let orch = orchestrator(vec![first.clone(), second.clone(), third.clone()]);

        assert_eq!(orch.extract(&page(), &options(ExtractionMode::Normal)), "HELLO");
        assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 0));
    }

    #[test]
    fn test_high_accuracy_labels_non_empty_outputs() {
        let first = Scripted::arc("first", Script::Empty);
        let second = Scripted::arc("second", Script::Text("HELLO", 0.9));
        let third = Scripted::arc("third", Script::Text("WORLD", 0.8));
        let orch = orchestrator(vec![first.clone(), second, third.clone()]);

        let text = orch.extract(&page(), &options(ExtractionMode::HighAccuracy));
        assert_eq!(text, "[SECOND]\nHELLO\n\n[THIRD]\nWORLD");
        assert!(!text.contains("[FIRST]"));
        assert_eq!((first.calls(), third.calls()), (1, 1));
    }

    #[test]
    fn test_low_confidence_fragments_are_dropped() {
        let noisy = Scripted::arc("noisy", Script::Text("garbage", 0.05));
        let orch = orchestrator(vec![noisy]);
        assert_eq!(
            orch.extract(&page(), &options(ExtractionMode::Normal)),
            "Text extraction failed (attempted: noisy). No text detected"
        );
    }

    #[test]
    fn test_all_failures_produce_diagnostic() {
        let orch = orchestrator(vec![
            Scripted::arc("a", Script::Fail("model missing")),
            Scripted::arc("b", Script::Empty),
            Scripted::arc("c", Script::Fail("timeout")),
        ]);
        let text = orch.extract(&page(), &options(ExtractionMode::Normal));
        assert_eq!(
            text,
            "Text extraction failed (attempted: a, b, c). Errors: a failed: inference failed: model missing; c failed: inference failed: timeout"
        );
    }

    #[test]
    fn test_panicking_backend_is_isolated() {
        let boom = Scripted::arc("boom", Script::Panic);
        let after = Scripted::arc("after", Script::Text("still here", 1.0));
        let orch = orchestrator(vec![boom, after.clone()]);

        assert_eq!(orch.extract(&page(), &options(ExtractionMode::Normal)), "still here");
        assert_eq!(after.calls(), 1);

        let snapshot = orch.metrics.snapshot();
        assert_eq!(snapshot.backends["boom"].failure, 1);
        assert_eq!(snapshot.backends["after"].success, 1);
    }

    #[test]
    fn test_empty_registry_returns_sentinel() {
        let orch = orchestrator(Vec::new());
        assert_eq!(
            orch.extract(&page(), &options(ExtractionMode::HighAccuracy)),
            UNAVAILABLE_MESSAGE
        );
    }
}
