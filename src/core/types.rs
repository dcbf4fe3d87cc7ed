// Domain types for the OCR task workflow

use chrono::{DateTime, Utc};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::RequestError;

/// Extraction policy selected per submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Stop at the first backend that returns text
    #[default]
    Normal,
    /// Run every backend and aggregate labeled output
    HighAccuracy,
}

impl FromStr for ExtractionMode {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "normal" => Ok(Self::Normal),
            "high_accuracy" | "high-accuracy" => Ok(Self::HighAccuracy),
            other => Err(RequestError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::HighAccuracy => f.write_str("high_accuracy"),
        }
    }
}

/// Lowercase 2-letter language code, validated on construction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn english() -> Self {
        Self("en".to_string())
    }
}

impl FromStr for LanguageCode {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) {
            Ok(Self(code))
        } else {
            Err(RequestError::InvalidLanguage(s.to_string()))
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-submission options, validated once at the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingOptions {
    pub mode: ExtractionMode,
    pub languages: Vec<LanguageCode>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Normal,
            languages: vec![LanguageCode::english()],
        }
    }
}

impl ProcessingOptions {
    /// Validate raw form values.
    ///
    /// Language entries may be repeated fields or comma separated. An empty
    /// list means English; duplicates are dropped keeping first occurrence.
    pub fn parse<S: AsRef<str>>(
        mode: Option<&str>,
        languages: &[S],
        max_languages: usize,
    ) -> Result<Self, RequestError> {
        let mode = match mode {
            Some(raw) => raw.parse()?,
            None => ExtractionMode::Normal,
        };

        let mut parsed: Vec<LanguageCode> = Vec::new();
        for entry in languages {
            for raw in entry.as_ref().split(',') {
                if raw.trim().is_empty() {
                    continue;
                }
                let code: LanguageCode = raw.parse()?;
                if !parsed.contains(&code) {
                    parsed.push(code);
                }
            }
        }

        if parsed.is_empty() {
            parsed.push(LanguageCode::english());
        }
        if parsed.len() > max_languages {
            return Err(RequestError::TooManyLanguages {
                count: parsed.len(),
                max: max_languages,
            });
        }

        Ok(Self {
            mode,
            languages: parsed,
        })
    }
}

/// Normalized page handed to every recognition backend
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub pixels: GrayImage,
}

impl NormalizedImage {
    pub fn new(pixels: GrayImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// One recognized piece of text with the backend's confidence in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedFragment {
    pub text: String,
    pub confidence: f32,
}

impl RecognizedFragment {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Identifies one recognition backend known to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineHandle {
    pub name: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of one backend attempt within a single extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub engine_name: String,
    pub text: String,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl ExtractionOutcome {
    pub fn success(engine_name: &str, text: String) -> Self {
        Self {
            engine_name: engine_name.to_string(),
            text,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(engine_name: &str, detail: String) -> Self {
        Self {
            engine_name: engine_name.to_string(),
            text: String::new(),
            succeeded: false,
            error_detail: Some(detail),
        }
    }

    pub fn has_text(&self) -> bool {
        self.succeeded && !self.text.trim().is_empty()
    }
}

/// Uploaded file accepted into a task
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Starting,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Extracted text for one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub filename: String,
    pub text: String,
    pub processed_at: DateTime<Utc>,
}

/// One asynchronous multi-file recognition job
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub files_processed: usize,
    pub total_files: usize,
    pub results: Vec<FileResult>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: String, total_files: usize) -> Self {
        Self {
            id,
            status: TaskStatus::Starting,
            progress: 0,
            files_processed: 0,
            total_files,
            results: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = TaskStatus::Processing;
    }

    /// Append the result for the next file and advance the counters.
    ///
    /// Counters only move forward; `files_processed` never exceeds
    /// `total_files`.
    pub fn record_result(&mut self, result: FileResult) {
        self.results.push(result);
        let finished = self.results.len().min(self.total_files);
        self.files_processed = self.files_processed.max(finished);
        let percent = if self.total_files == 0 {
            100
        } else {
            (100 * self.files_processed / self.total_files) as u8
        };
        self.progress = self.progress.max(percent);
    }

    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.files_processed = self.total_files;
        self.completed_at = Some(Utc::now());
    }

    /// Abort the whole task; collected results are kept.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Seconds left, extrapolated from the average time per finished file
    pub fn estimated_remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        if self.status != TaskStatus::Processing || self.files_processed == 0 {
            return None;
        }
        let elapsed = self.age(now).as_secs_f64();
        let per_file = elapsed / self.files_processed as f64;
        let remaining = self.total_files.saturating_sub(self.files_processed) as f64;
        Some((per_file * remaining * 10.0).round() / 10.0)
    }
}

/// Status query payload: the task record plus the time estimate
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining: Option<f64>,
}

impl TaskView {
    pub fn at(task: Task, now: DateTime<Utc>) -> Self {
        let estimated_remaining = task.estimated_remaining(now);
        Self {
            task,
            estimated_remaining,
        }
    }
}

/// Compact listing entry
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub files_processed: usize,
    pub total_files: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            status: task.status,
            progress: task.progress,
            files_processed: task.files_processed,
            total_files: task.total_files,
            created_at: task.created_at,
        }
    }
}
