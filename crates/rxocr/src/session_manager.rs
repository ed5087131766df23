//! Session manager for daemon discovery and creation.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Context;
use rxocr_engine::{cleanup_session, get_pid_path, get_socket_path, OcrConfig, WordDetectorKind};
use rxocr_protocol::Request;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::ipc_client::IpcClient;

/// Session manager handles daemon lifecycle.
pub struct SessionManager {
    session: String,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(session: String) -> Self {
        Self { session }
    }

    /// Get the socket path for this session.
    pub fn socket_path(&self) -> PathBuf {
        get_socket_path(&self.session)
    }

    /// Get the PID file path for this session.
    pub fn pid_path(&self) -> PathBuf {
        get_pid_path(&self.session)
    }

    /// Check if the daemon is running.
    ///
    /// A pid file naming a dead or unparsable process is removed along with
    /// the rest of the session directory.
    pub fn is_daemon_alive(&self) -> bool {
        let pid_path = self.pid_path();

        if !pid_path.exists() {
            return false;
        }

        let pid: u32 = match std::fs::read_to_string(&pid_path)
            .ok()
            .and_then(|content| content.trim().parse().ok())
        {
            Some(pid) => pid,
            None => {
                self.cleanup_stale_session();
                return false;
            }
        };

        let alive = Self::process_exists(pid);

        if !alive {
            self.cleanup_stale_session();
        }

        alive
    }

    /// Check if a process exists.
    #[cfg(unix)]
    fn process_exists(pid: u32) -> bool {
        // kill(pid, 0) checks if process exists without sending a signal
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(windows)]
    fn process_exists(pid: u32) -> bool {
        use std::ptr;
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle != ptr::null_mut() {
                CloseHandle(handle);
                true
            } else {
                false
            }
        }
    }

    fn cleanup_stale_session(&self) {
        cleanup_session(&self.session);
    }

    /// Connect to the running daemon, starting one with `config` if needed.
    pub async fn ensure_daemon(&self, config: &OcrConfig) -> anyhow::Result<IpcClient> {
        if self.is_daemon_alive() {
            debug!("Daemon already running, connecting...");
            match self.connect().await {
                Ok(mut client) => {
                    if Self::is_responsive(&mut client).await {
                        return Ok(client);
                    }
                    warn!("Daemon not responsive, cleaning up and restarting...");
                }
                Err(e) => {
                    warn!("Failed to connect to daemon: {}", e);
                }
            }
            self.cleanup_stale_session();
        }

        info!("Starting daemon for session '{}'", self.session);
        self.start_daemon(config)?;

        self.wait_for_daemon().await
    }

    /// Ping over an existing connection.
    async fn is_responsive(client: &mut IpcClient) -> bool {
        match client.send(&Request::Ping, 5000).await {
            Ok(response) => response.success,
            Err(_) => false,
        }
    }

    /// Arguments for the detached `session daemon` process.
    fn daemon_args(&self, config: &OcrConfig) -> anyhow::Result<Vec<String>> {
        // The daemon outlives this working directory's meaning; pass absolute paths
        let models_dir = std::fs::canonicalize(&config.models_dir)
            .with_context(|| format!("Failed to resolve models directory {:?}", config.models_dir))?;

        let mut args = vec![
            "--session".to_string(),
            self.session.clone(),
            "--lang".to_string(),
            config.language.code().to_string(),
            "--models-dir".to_string(),
            models_dir.display().to_string(),
            "session".to_string(),
            "daemon".to_string(),
        ];
        if !config.detect_page {
            args.push("--no-page".to_string());
        }
        if config.word_detector == WordDetectorKind::Model {
            args.push("--word-detector".to_string());
            args.push("model".to_string());
        }
        Ok(args)
    }

    /// Start the daemon process.
    fn start_daemon(&self, config: &OcrConfig) -> anyhow::Result<()> {
        // The daemon is the same binary with a hidden subcommand
        let exe = std::env::current_exe()?;
        let args = self.daemon_args(config)?;

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            let mut cmd = Command::new(&exe);
            cmd.args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());

            // Detach from parent process group
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }

            cmd.spawn()?;
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;

            const DETACHED_PROCESS: u32 = 0x00000008;
            const CREATE_NO_WINDOW: u32 = 0x08000000;

            Command::new(&exe)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .creation_flags(DETACHED_PROCESS | CREATE_NO_WINDOW)
                .spawn()?;
        }

        Ok(())
    }

    /// Wait for the daemon to become ready.
    async fn wait_for_daemon(&self) -> anyhow::Result<IpcClient> {
        let socket_path = self.socket_path();
        let max_retries = 100; // 10 seconds total
        let retry_delay = Duration::from_millis(100);

        for _ in 0..max_retries {
            // On Windows the socket path is not a file
            #[cfg(unix)]
            let should_try = socket_path.exists();
            #[cfg(windows)]
            let should_try = true;

            if should_try {
                if let Ok(client) = IpcClient::connect(&socket_path).await {
                    debug!("Connected to daemon");
                    return Ok(client);
                }
            }
            sleep(retry_delay).await;
        }

        anyhow::bail!("Daemon failed to start within timeout")
    }

    /// Connect to an existing daemon.
    pub async fn connect(&self) -> anyhow::Result<IpcClient> {
        let socket_path = self.socket_path();
        IpcClient::connect(&socket_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to daemon: {}", e))
    }

    /// List all sessions that have a pid file.
    pub fn list_sessions() -> Vec<String> {
        let base_dir = rxocr_engine::get_base_dir();
        let mut sessions = Vec::new();

        if let Ok(entries) = std::fs::read_dir(&base_dir) {
            for entry in entries.flatten() {
                if entry.path().join("pid").exists() {
                    if let Some(name) = entry.file_name().to_str() {
                        sessions.push(name.to_string());
                    }
                }
            }
        }

        sessions.sort();
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_session(tag: &str) -> String {
        format!("test-{}-{}", tag, std::process::id())
    }

    fn write_pid(session: &str, content: &str) {
        let dir = rxocr_engine::get_session_dir(session);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(get_pid_path(session), content).unwrap();
    }

    #[test]
    fn test_live_pid_is_alive_and_listed() {
        let session = unique_session("alive");
        write_pid(&session, &format!("{}\n", std::process::id()));

        let manager = SessionManager::new(session.clone());
        assert!(manager.is_daemon_alive());
        assert!(SessionManager::list_sessions().contains(&session));

        cleanup_session(&session);
    }

    #[test]
    fn test_garbage_pid_is_cleaned_up() {
        let session = unique_session("garbage");
        write_pid(&session, "not-a-pid");

        let manager = SessionManager::new(session.clone());
        assert!(!manager.is_daemon_alive());
        assert!(!rxocr_engine::get_session_dir(&session).exists());
    }

    #[test]
    fn test_missing_pid_is_not_alive() {
        let manager = SessionManager::new(unique_session("missing"));
        assert!(!manager.is_daemon_alive());
    }

    #[test]
    fn test_daemon_args_carry_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OcrConfig::new(dir.path()).with_language(rxocr_engine::Language::En);
        config.detect_page = false;
        config.word_detector = WordDetectorKind::Model;

        let manager = SessionManager::new("desk".to_string());
        let args = manager.daemon_args(&config).unwrap();
        let models_dir = std::fs::canonicalize(dir.path()).unwrap();

        assert_eq!(&args[..2], &["--session", "desk"]);
        assert!(args.windows(2).any(|w| w == ["--lang", "en"]));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "--models-dir" && w[1] == models_dir.display().to_string()));
        assert!(args.windows(2).any(|w| w == ["session", "daemon"]));
        assert!(args.contains(&"--no-page".to_string()));
        assert!(args.windows(2).any(|w| w == ["--word-detector", "model"]));
    }
}
