// Tesseract backend driven through the command-line binary
//
// The binary is probed once at startup. Each recognition call writes the
// page to a temporary PNG and parses tesseract's TSV output, which carries
// a per-word confidence.

use std::io::Write;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{LanguageCode, NormalizedImage, RecognizedFragment};
use crate::services::ocr::RecognitionBackend;
use crate::utils::encode_png;

pub const TESSERACT_BACKEND: &str = "tesseract";

const DEFAULT_LANGUAGE: &str = "eng";

/// Classical OCR engine binding
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    command: String,
    timeout: Duration,
}

impl TesseractBackend {
    /// Probe the binary with `--version`; a missing, broken or hanging
    /// install is reported as unavailable.
    pub fn probe(command: &str, timeout: Duration) -> EngineResult<Self> {
        let mut version_cmd = Command::new(command);
        version_cmd.arg("--version");
        let output = output_within(version_cmd, timeout).map_err(|e| {
            EngineError::Unavailable(format!("cannot run '{}': {}", command, e))
        })?;

        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "'{} --version' exited with {}",
                command, output.status
            )));
        }

        // Older releases print the banner on stderr
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        info!(
            "Tesseract found: {}",
            banner.lines().next().unwrap_or("unknown").trim()
        );

        Ok(Self {
            command: command.to_string(),
            timeout,
        })
    }

    fn run(&self, png_path: &std::path::Path, languages: &str) -> EngineResult<String> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(png_path)
            .arg("stdout")
            .arg("-l")
            .arg(languages)
            .arg("tsv");
        let output = output_within(cmd, self.timeout)?;

        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                command: self.command.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Run a command to completion, killing it once `limit` has elapsed.
///
/// Callable from the blocking pool of a running runtime or from plain
/// synchronous code such as the CLI, where a throwaway runtime drives it.
fn output_within(mut command: Command, limit: Duration) -> EngineResult<Output> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    command.kill_on_drop(true);

    let wait = async move {
        match tokio::time::timeout(limit, command.output()).await {
            Ok(output) => output.map_err(EngineError::from),
            Err(_) => Err(EngineError::Timeout {
                command: program,
                limit,
            }),
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(wait),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(wait),
    }
}

impl RecognitionBackend for TesseractBackend {
    fn name(&self) -> &str {
        TESSERACT_BACKEND
    }

    fn recognize(
        &self,
        image: &NormalizedImage,
        languages: &[LanguageCode],
    ) -> EngineResult<Vec<RecognizedFragment>> {
        let png = encode_png(&image.pixels)?;

        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
        tmp.write_all(&png)?;
        tmp.flush()?;

        let lang_string = language_string(languages);
        debug!(languages = %lang_string, "Running tesseract");

        let tsv = self.run(tmp.path(), &lang_string)?;
        parse_tsv(&tsv)
    }
}

/// Map a 2-letter code to tesseract's traineddata name; unknown codes
/// fall back to English.
pub fn map_language(code: &LanguageCode) -> &'static str {
    match code.as_str() {
        "en" => "eng",
        "ja" => "jpn",
        "ko" => "kor",
        "zh" => "chi_sim",
        "de" => "deu",
        "fr" => "fra",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        "ru" => "rus",
        _ => DEFAULT_LANGUAGE,
    }
}

/// `-l` argument: mapped codes, deduplicated in request order, joined by `+`
pub fn language_string(languages: &[LanguageCode]) -> String {
    let mut mapped: Vec<&'static str> = Vec::new();
    for code in languages {
        let lang = map_language(code);
        if !mapped.contains(&lang) {
            mapped.push(lang);
        }
    }
    if mapped.is_empty() {
        mapped.push(DEFAULT_LANGUAGE);
    }
    mapped.join("+")
}

/// Parse tesseract TSV output into one fragment per text line.
///
/// Word rows (level 5) sharing page/block/paragraph/line numbers are joined
/// with spaces; the line confidence is the mean word confidence scaled to
/// [0, 1]. Rows with negative confidence carry no text and are skipped.
pub fn parse_tsv(tsv: &str) -> EngineResult<Vec<RecognizedFragment>> {
    let mut lines = tsv.lines();
    let header = lines
        .next()
        .ok_or_else(|| EngineError::InvalidOutput("empty TSV output".to_string()))?;
    if !header.starts_with("level") {
        return Err(EngineError::InvalidOutput(format!(
            "unexpected TSV header: {}",
            header
        )));
    }

    let mut fragments = Vec::new();
    let mut current_key: Option<(u32, u32, u32, u32)> = None;
    let mut words: Vec<String> = Vec::new();
    let mut confidences: Vec<f32> = Vec::new();

    let mut flush = |words: &mut Vec<String>, confidences: &mut Vec<f32>| {
        if !words.is_empty() {
            let mean = confidences.iter().sum::<f32>() / confidences.len() as f32;
            fragments.push(RecognizedFragment::new(words.join(" "), mean / 100.0));
        }
        words.clear();
        confidences.clear();
    };

    for row in lines {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }

        let text = cols[11..].join("\t");
        let text = text.trim();
        let confidence: f32 = match cols[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        if text.is_empty() || confidence < 0.0 {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        if current_key != Some(key) {
            flush(&mut words, &mut confidences);
            current_key = Some(key);
        }
        words.push(text.to_string());
        confidences.push(confidence);
    }
    flush(&mut words, &mut confidences);

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t36\t92\t582\t36\t-1\t
5\t1\t1\t1\t1\t1\t36\t92\t94\t36\t96.5\tHello
5\t1\t1\t1\t1\t2\t140\t92\t120\t36\t91.5\tworld
5\t1\t1\t1\t2\t1\t36\t140\t60\t30\t40.0\tsecond
5\t1\t1\t1\t2\t2\t100\t140\t60\t30\t-1\t
";

    fn codes(raw: &[&str]) -> Vec<LanguageCode> {
        raw.iter().map(|c| c.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let fragments = parse_tsv(SAMPLE_TSV).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "Hello world");
        assert!((fragments[0].confidence - 0.94).abs() < 1e-4);
        assert_eq!(fragments[1].text, "second");
        assert!((fragments[1].confidence - 0.40).abs() < 1e-4);
    }

    #[test]
    fn test_parse_tsv_header_only_is_empty() {
        let header = SAMPLE_TSV.lines().next().unwrap();
        assert!(parse_tsv(header).unwrap().is_empty());
    }

    #[test]
    fn test_parse_tsv_rejects_garbage() {
        assert!(parse_tsv("").is_err());
        assert!(parse_tsv("Error opening data file").is_err());
    }

    #[test]
    fn test_language_mapping_with_fallback() {
        assert_eq!(language_string(&codes(&["en", "ja", "ko"])), "eng+jpn+kor");
        // unmapped codes fall back to English and collapse
        assert_eq!(language_string(&codes(&["xx", "en", "ja"])), "eng+jpn");
        assert_eq!(language_string(&[]), "eng");
    }

    #[test]
    fn test_probe_missing_binary_is_unavailable() {
        let err = TesseractBackend::probe("definitely-not-a-tesseract-binary", Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_command_is_killed_after_limit() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = std::time::Instant::now();
        let err = output_within(cmd, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_command_output_from_blocking_pool() {
        let output = tokio::task::spawn_blocking(|| {
            let mut cmd = Command::new("echo");
            cmd.arg("ready");
            output_within(cmd, Duration::from_secs(5))
        })
        .await
        .unwrap()
        .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ready");
    }
}
