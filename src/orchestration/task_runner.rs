// Background execution of one task
//
// Files are processed strictly in order, one at a time. Each file runs on
// the blocking pool (decode + recognition are CPU and subprocess bound).
// A failing file yields an error placeholder and the loop moves on.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::core::errors::{PipelineError, TaskError};
use crate::core::types::{FileResult, ProcessingOptions, Task, UploadedFile};
use crate::orchestration::extraction::ExtractionOrchestrator;
use crate::orchestration::task_store::TaskStore;
use crate::services::Preprocessor;
use crate::utils::{display_name, Metrics};

pub const FILE_ERROR_PREFIX: &str = "Error processing file: ";

/// Drives tasks from `starting` to a terminal state
pub struct TaskRunner {
    store: TaskStore,
    preprocessor: Preprocessor,
    orchestrator: Arc<ExtractionOrchestrator>,
    metrics: Metrics,
}

impl TaskRunner {
    pub fn new(
        store: TaskStore,
        preprocessor: Preprocessor,
        orchestrator: Arc<ExtractionOrchestrator>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            preprocessor,
            orchestrator,
            metrics,
        }
    }

    /// Start the task in the background and return immediately.
    ///
    /// The handle is only useful for tests and logging; there is no
    /// cancellation.
    pub fn spawn(
        self: &Arc<Self>,
        task_id: String,
        files: Vec<UploadedFile>,
        options: ProcessingOptions,
    ) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        let id = task_id.clone();
        self.supervise(task_id, async move { runner.run(&id, files, options).await })
    }

    /// Run `work` on its own task and settle the record however it ends.
    ///
    /// A panic inside `work` surfaces as a `JoinError` here, so the record
    /// still reaches `error` and frees its admission slot.
    fn supervise<F>(self: &Arc<Self>, task_id: String, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match tokio::spawn(work).await {
                Ok(outcome) => outcome,
                Err(e) => Err(PipelineError::WorkerFailed(e.to_string())),
            };

            match outcome {
                Ok(()) => {}
                Err(PipelineError::TaskVanished(id)) => {
                    warn!(task_id = %id, "Task record removed while running, stopping");
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Task aborted");
                    runner.metrics.record_task_failed();
                    let message = e.to_string();
                    if runner
                        .store
                        .mutate(&task_id, |task| task.mark_failed(message))
                        .is_err()
                    {
                        warn!(task_id = %task_id, "Could not record failure, task record is gone");
                    }
                }
            }
        })
    }

    /// Process every file of the task and mark it completed.
    #[instrument(skip(self, files, options), fields(files = files.len(), mode = %options.mode))]
    pub async fn run(
        &self,
        task_id: &str,
        files: Vec<UploadedFile>,
        options: ProcessingOptions,
    ) -> Result<(), PipelineError> {
        let start = Instant::now();
        self.update(task_id, |task| task.mark_processing())?;

        let options = Arc::new(options);
        let total = files.len();

        for (index, file) in files.into_iter().enumerate() {
            let filename = display_name(&file.filename, index);
            let file_start = Instant::now();

            let outcome = self.process_file(file.bytes, Arc::clone(&options)).await;
            let success = outcome.is_ok();
            let text = outcome.unwrap_or_else(|reason| {
                warn!(file = %filename, "{}", reason);
                format!("{}{}", FILE_ERROR_PREFIX, reason)
            });

            self.metrics.record_file(success, file_start.elapsed());
            info!(
                "File {}/{} '{}' done in {:.2}s",
                index + 1,
                total,
                filename,
                file_start.elapsed().as_secs_f64()
            );

            let result = FileResult {
                filename,
                text,
                processed_at: Utc::now(),
            };
            self.update(task_id, |task| task.record_result(result))?;
        }

        self.update(task_id, |task| task.mark_completed())?;
        self.metrics.record_task_completed();
        info!(
            "Task completed: {} file(s) in {:.2}s",
            total,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Preprocess and extract one file on the blocking pool.
    ///
    /// Every failure, including a panicked worker, comes back as a message.
    async fn process_file(
        &self,
        bytes: Vec<u8>,
        options: Arc<ProcessingOptions>,
    ) -> Result<String, String> {
        let preprocessor = self.preprocessor.clone();
        let orchestrator = Arc::clone(&self.orchestrator);

        tokio::task::spawn_blocking(move || -> Result<String, String> {
            let image = preprocessor.preprocess(&bytes).map_err(|e| e.to_string())?;
            Ok(orchestrator.extract(&image, &options))
        })
        .await
        .unwrap_or_else(|e| Err(PipelineError::WorkerFailed(e.to_string()).to_string()))
    }

    fn update<R>(
        &self,
        task_id: &str,
        f: impl FnOnce(&mut Task) -> R,
    ) -> Result<R, PipelineError> {
        self.store.mutate(task_id, f).map_err(|e| match e {
            TaskError::NotFound(id) => PipelineError::TaskVanished(id),
            other => PipelineError::Store(other),
        })
    }
}
