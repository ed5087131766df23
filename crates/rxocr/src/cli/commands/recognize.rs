//! Recognize command implementation.

use std::path::Path;

use anyhow::Context;
use rxocr_engine::{ImageInput, OcrConfig, Recognizer};
use rxocr_protocol::{RecognizeRequest, Request, Response, ResponseData, SessionInfo};
use tracing::{debug, warn};

use crate::cli::Cli;
use crate::output::Output;
use crate::session_manager::SessionManager;

pub async fn run(cli: &Cli, output: &Output) -> anyhow::Result<()> {
    let config = cli.ocr_config()?;

    let response = if cli.daemon {
        recognize_via_daemon(&cli.session, &config, &cli.image, cli.timeout).await?
    } else {
        recognize_in_process(config, &cli.image).await?
    };

    finish(response, output)
}

/// Print a successful response, or turn a failed one into an error.
fn finish(response: Response, output: &Output) -> anyhow::Result<()> {
    if response.success {
        output.print_response(&response);
        return Ok(());
    }

    let Some(error) = response.error.clone() else {
        anyhow::bail!("Recognition failed without an error message");
    };
    if output.is_json() {
        output.print_response(&response);
    }
    anyhow::bail!("{} ({})", error.message, error.code)
}

async fn recognize_in_process(config: OcrConfig, image: &Path) -> anyhow::Result<Response> {
    let input = ImageInput::Path(image.to_path_buf());

    let result = tokio::task::spawn_blocking(move || Recognizer::new(config).recognize(&input))
        .await
        .context("Recognition task failed")?;

    Ok(match result {
        Ok(recognition) => Response::success(ResponseData::Recognition(recognition)),
        Err(e) => Response::error(e.code(), e.to_string()),
    })
}

async fn recognize_via_daemon(
    session: &str,
    config: &OcrConfig,
    image: &Path,
    timeout_ms: u64,
) -> anyhow::Result<Response> {
    // The daemon resolves paths against its own working directory
    let image = std::fs::canonicalize(image)
        .with_context(|| format!("Failed to read image {:?}", image))?;

    let manager = SessionManager::new(session.to_string());
    let mut client = manager.ensure_daemon(config).await?;

    let info = client.send(&Request::SessionInfo, timeout_ms).await?;
    if let Some(ResponseData::SessionInfo(info)) = info.data {
        for difference in settings_mismatch(&info, config) {
            warn!(
                "Session '{}' runs with {}; stop it to apply new settings",
                session, difference
            );
        }
    }

    debug!("Sending {:?} to session '{}'", image, session);
    let request = Request::Recognize(RecognizeRequest::from_path(image.display().to_string()));
    Ok(match client.send(&request, timeout_ms).await {
        Ok(response) => response,
        Err(e) => Response::error(e.code(), e.to_string()),
    })
}

/// Settings of a running daemon that differ from the requested ones.
fn settings_mismatch(info: &SessionInfo, config: &OcrConfig) -> Vec<String> {
    let mut differences = Vec::new();
    if info.language != config.language.code() {
        differences.push(format!("language '{}', not '{}'", info.language, config.language));
    }
    if info.detect_page != config.detect_page {
        differences.push(format!(
            "page detection {}, not {}",
            on_off(info.detect_page),
            on_off(config.detect_page)
        ));
    }
    if info.word_detector != config.word_detector.name() {
        differences.push(format!(
            "word detector '{}', not '{}'",
            info.word_detector, config.word_detector
        ));
    }
    differences
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxocr_engine::{Language, WordDetectorKind};
    use rxocr_protocol::ErrorCode;

    fn running(language: &str, detect_page: bool, word_detector: &str) -> SessionInfo {
        SessionInfo {
            name: "default".to_string(),
            language: language.to_string(),
            models_dir: "/opt/models".to_string(),
            detect_page,
            word_detector: word_detector.to_string(),
            engine_loaded: true,
            requests_served: 3,
            pid: 1,
            uptime_secs: 10,
        }
    }

    #[test]
    fn test_matching_daemon_has_no_mismatch() {
        let config = OcrConfig::new("/opt/models");
        assert!(settings_mismatch(&running("cz", true, "contour"), &config).is_empty());
    }

    #[test]
    fn test_every_differing_setting_is_reported() {
        let mut config = OcrConfig::new("/opt/models").with_language(Language::En);
        config.detect_page = false;
        config.word_detector = WordDetectorKind::Model;

        let differences = settings_mismatch(&running("cz", true, "contour"), &config);
        assert_eq!(differences.len(), 3);
        assert!(differences[0].contains("language 'cz'"));
        assert!(differences[1].contains("page detection on, not off"));
        assert!(differences[2].contains("word detector 'contour', not 'model'"));
    }

    #[tokio::test]
    async fn test_in_process_missing_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("scan.png");
        image::RgbImage::from_pixel(8, 8, image::Rgb([255, 255, 255]))
            .save(&image)
            .unwrap();

        let response = recognize_in_process(OcrConfig::new(dir.path()), &image)
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(
            response.error.map(|e| e.code),
            Some(ErrorCode::ModelUnavailable)
        );
    }

    #[test]
    fn test_finish_turns_failure_into_error() {
        let output = Output::new(false);
        let err = finish(Response::error(ErrorCode::ImageError, "bad jpeg"), &output).unwrap_err();
        assert!(err.to_string().contains("bad jpeg"));

        assert!(finish(Response::success(ResponseData::Pong), &output).is_ok());
    }
}
