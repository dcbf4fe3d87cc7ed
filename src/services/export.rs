// Plain-text report for a finished task

use chrono::{DateTime, Utc};

use crate::core::errors::{TaskError, TaskResult};
use crate::core::types::{Task, TaskStatus};

const HEADER_RULE_WIDTH: usize = 50;
const FILE_RULE_WIDTH: usize = 30;

/// Renders completed tasks into downloadable reports
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultExporter;

impl ResultExporter {
    pub fn new() -> Self {
        Self
    }

    /// Render the report using the current time for the header
    pub fn render(&self, task: &Task) -> TaskResult<Vec<u8>> {
        self.render_at(task, Utc::now())
    }

    /// Render the report with an explicit generation timestamp.
    ///
    /// Only completed tasks with at least one result can be exported.
    pub fn render_at(&self, task: &Task, generated_at: DateTime<Utc>) -> TaskResult<Vec<u8>> {
        if task.status != TaskStatus::Completed {
            return Err(TaskError::NotCompleted {
                status: task.status,
            });
        }
        if task.results.is_empty() {
            return Err(TaskError::NoResults);
        }

        let mut lines: Vec<String> = vec![
            format!(
                "OCR Results - Generated on {}",
                generated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            "=".repeat(HEADER_RULE_WIDTH),
            String::new(),
        ];

        for (i, result) in task.results.iter().enumerate() {
            lines.push(format!("File {}: {}", i + 1, result.filename));
            lines.push("-".repeat(FILE_RULE_WIDTH));
            lines.push(result.text.clone());
            lines.push(String::new());
        }

        Ok(lines.join("\n").into_bytes())
    }

    /// Attachment name: `ocr_results_<id>_<YYYYmmdd_HHMMSS>.txt`
    pub fn attachment_filename(&self, task_id: &str, now: DateTime<Utc>) -> String {
        format!("ocr_results_{}_{}.txt", task_id, now.format("%Y%m%d_%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileResult;
    use chrono::TimeZone;

    fn completed_task() -> Task {
        let mut task = Task::new("abc".to_string(), 2);
        task.mark_processing();
        for (name, text) in [("a.png", "HELLO"), ("b.png", "Error processing file: bad")] {
            task.record_result(FileResult {
                filename: name.to_string(),
                text: text.to_string(),
                processed_at: Utc::now(),
            });
        }
        task.mark_completed();
        task
    }

    #[test]
    fn test_report_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let bytes = ResultExporter::new().render_at(&completed_task(), at).unwrap();
        let report = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "OCR Results - Generated on 2024-03-01 12:30:05");
        assert_eq!(lines[1], "=".repeat(50));
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "File 1: a.png");
        assert_eq!(lines[4], "-".repeat(30));
        assert_eq!(lines[5], "HELLO");
        assert_eq!(lines[6], "");
        assert_eq!(lines[7], "File 2: b.png");
        assert_eq!(lines[9], "Error processing file: bad");
    }

    #[test]
    fn test_same_task_renders_identically() {
        let task = completed_task();
        let at = Utc::now();
        let exporter = ResultExporter::new();
        assert_eq!(
            exporter.render_at(&task, at).unwrap(),
            exporter.render_at(&task, at).unwrap()
        );
    }

    #[test]
    fn test_preconditions() {
        let exporter = ResultExporter::new();

        let mut running = Task::new("r".to_string(), 1);
        running.mark_processing();
        assert!(matches!(
            exporter.render(&running),
            Err(TaskError::NotCompleted {
                status: TaskStatus::Processing
            })
        ));

        let mut empty = Task::new("e".to_string(), 0);
        empty.mark_completed();
        assert!(matches!(exporter.render(&empty), Err(TaskError::NoResults)));
    }

    #[test]
    fn test_attachment_filename() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 4, 9).unwrap();
        assert_eq!(
            ResultExporter::new().attachment_filename("abc", at),
            "ocr_results_abc_20240301_080409.txt"
        );
    }
}
