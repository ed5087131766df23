//! Output formatting for CLI responses.

use rxocr_protocol::{ErrorCode, ErrorInfo, Response, ResponseData};

/// Output formatter.
pub struct Output {
    json: bool,
}

impl Output {
    /// Create a new output formatter.
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Whether JSON output is enabled.
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print a response.
    pub fn print_response(&self, response: &Response) {
        if self.json {
            match serde_json::to_string(response) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error [internal_error]: {}", e),
            }
        } else if response.success {
            match response.data {
                Some(ref data) => println!("{}", render_data(data)),
                None => println!("OK"),
            }
        } else if let Some(ref error) = response.error {
            eprintln!("Error [{}]: {}", error.code, error.message);
        }
    }

    /// Print an error message.
    pub fn print_error(&self, code: ErrorCode, message: &str) {
        self.print_response(&Response {
            success: false,
            data: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
            }),
        });
    }
}

/// Render response data in human-readable format.
fn render_data(data: &ResponseData) -> String {
    match data {
        ResponseData::Ok => "OK".to_string(),
        // Plain mode prints only the text line
        ResponseData::Recognition(result) => result.text.clone(),
        ResponseData::SessionInfo(info) => [
            format!("Session: {}", info.name),
            format!("Language: {}", info.language),
            format!("Models: {}", info.models_dir),
            format!("Page detection: {}", info.detect_page),
            format!("Word detector: {}", info.word_detector),
            format!("Engine loaded: {}", info.engine_loaded),
            format!("Requests served: {}", info.requests_served),
            format!("PID: {}", info.pid),
            format!("Uptime: {}s", info.uptime_secs),
        ]
        .join("\n"),
        ResponseData::SessionList { sessions } => {
            if sessions.is_empty() {
                return "No active sessions".to_string();
            }
            sessions
                .iter()
                .map(|session| {
                    let state = if session.alive { "running" } else { "stale" };
                    let language = session.language.as_deref().unwrap_or("-");
                    format!("{}: {} ({})", session.name, state, language)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        ResponseData::Pong => "Pong".to_string(),
    }
}
