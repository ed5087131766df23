//! Recognition engine for rxocr.
//!
//! This crate implements the handwritten prescription OCR pipeline and the
//! background daemon that keeps the models loaded between CLI invocations.

pub mod config;
pub mod daemon;
pub mod handlers;
pub mod ipc_server;
pub mod ocr;
pub mod recognizer;

pub use config::{find_models_dir, Language, OcrConfig, WordDetectorKind};
pub use daemon::Daemon;
pub use ipc_server::IpcServer;
pub use ocr::OcrService;
pub use recognizer::{ImageInput, RecognizeError, Recognizer};

/// Get the base directory holding all session directories.
pub fn get_base_dir() -> std::path::PathBuf {
    std::env::temp_dir().join("rxocr")
}

/// Get the session directory path.
pub fn get_session_dir(session: &str) -> std::path::PathBuf {
    get_base_dir().join(session)
}

/// Get the socket path for a session.
pub fn get_socket_path(session: &str) -> std::path::PathBuf {
    #[cfg(unix)]
    {
        get_session_dir(session).join("socket")
    }
    #[cfg(windows)]
    {
        // On Windows the daemon listens on TCP; the path only carries the session name
        std::path::PathBuf::from(session)
    }
}

/// Get the PID file path for a session.
pub fn get_pid_path(session: &str) -> std::path::PathBuf {
    get_session_dir(session).join("pid")
}

/// Get the TCP port for a session (Windows fallback).
/// Uses a deterministic hash of the session name to derive a port in the range 49152-65535.
pub fn get_session_port(session: &str) -> u16 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    session.hash(&mut hasher);
    let hash = hasher.finish();
    // Map to ephemeral port range: 49152-65535 (16384 ports)
    49152 + (hash % 16384) as u16
}

/// Clean up a session directory.
pub fn cleanup_session(session: &str) {
    let dir = get_session_dir(session);
    let _ = std::fs::remove_dir_all(&dir);
}

/// Run the daemon server for the given session.
/// This is the main entry point called by `rxocr session daemon`.
pub async fn run_server(session: &str, config: OcrConfig) -> anyhow::Result<()> {
    use std::io::Write;

    // Claim the endpoint first so a live daemon's files are left alone
    let daemon = Daemon::new(session.to_string(), config).await?;

    let pid_path = get_pid_path(session);
    let mut pid_file = std::fs::File::create(&pid_path)?;
    writeln!(pid_file, "{}", std::process::id())?;
    drop(pid_file);

    let result = daemon.run().await;

    // Cleanup on exit
    cleanup_session(session);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_paths() {
        let dir = get_session_dir("scan-desk");
        assert!(dir.starts_with(get_base_dir()));
        assert!(dir.ends_with("scan-desk"));
        assert_eq!(get_pid_path("scan-desk"), dir.join("pid"));
    }

    #[test]
    fn test_session_port_is_stable_and_ephemeral() {
        let port = get_session_port("default");
        assert_eq!(port, get_session_port("default"));
        assert!(port >= 49152);
    }
}
