//! Main daemon event loop.

use std::sync::Arc;
use std::time::Instant;

use rxocr_protocol::{ErrorCode, Request, Response, ResponseData, SessionInfo};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::OcrConfig;
use crate::handlers;
use crate::ipc_server::IpcServer;
use crate::recognizer::Recognizer;

/// The daemon that keeps a recognizer resident for a session.
pub struct Daemon {
    /// Session name.
    session_name: String,

    /// Shared recognizer; models load on the first request.
    recognizer: Arc<Recognizer>,

    /// IPC server for CLI communication.
    ipc_server: IpcServer,

    /// Time when daemon started.
    start_time: Instant,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
    /// Create a new daemon for the given session.
    pub async fn new(session_name: String, config: OcrConfig) -> anyhow::Result<Self> {
        let ipc_server = IpcServer::bind(&session_name).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            "Daemon started for session '{}' at {} (language {}, models {:?})",
            session_name,
            ipc_server.address(),
            config.language,
            config.models_dir
        );

        Ok(Self {
            session_name,
            recognizer: Arc::new(Recognizer::new(config)),
            ipc_server,
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the daemon event loop.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                // Accept new CLI connections
                result = self.ipc_server.accept() => {
                    match result {
                        Ok(stream) => {
                            let state = ClientState {
                                recognizer: Arc::clone(&self.recognizer),
                                session_name: self.session_name.clone(),
                                start_time: self.start_time,
                                shutdown_tx: self.shutdown_tx.clone(),
                            };

                            tokio::spawn(async move {
                                let (reader, writer) = tokio::io::split(stream);
                                let reader = tokio::io::BufReader::new(reader);
                                if let Err(e) = handle_client(reader, writer, state).await {
                                    error!("Client handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                // Handle shutdown signal from client
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown request from client");
                    break;
                }

                // Handle Ctrl+C
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, cleaning up...");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(self) {
        info!(
            "Shutting down daemon after {} recognitions",
            self.recognizer.requests_served()
        );

        self.ipc_server.close();
        let _ = std::fs::remove_file(crate::get_pid_path(&self.session_name));

        info!("Daemon shutdown complete");
    }
}

/// Per-connection view of the daemon state.
#[derive(Clone)]
struct ClientState {
    recognizer: Arc<Recognizer>,
    session_name: String,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

/// Serve newline-delimited JSON requests until the client hangs up.
async fn handle_client<R, W>(mut reader: R, mut writer: W, state: ClientState) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;

        if n == 0 {
            // Client disconnected
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line.trim()) {
            Ok(req) => req,
            Err(e) => {
                let resp = Response::error(ErrorCode::InvalidRequest, format!("Invalid request: {}", e));
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        let is_shutdown = matches!(request, Request::Shutdown);

        let response = process_request(request, &state).await;
        write_response(&mut writer, &response).await?;

        if is_shutdown {
            info!("Shutdown request received, signaling daemon to exit");
            let _ = state.shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> anyhow::Result<()> {
    let json = serde_json::to_string(response)? + "\n";
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Process a single request and return a response.
async fn process_request(request: Request, state: &ClientState) -> Response {
    match request {
        Request::Ping => Response::success(ResponseData::Pong),

        Request::SessionInfo => {
            let config = state.recognizer.config();
            Response::success(ResponseData::SessionInfo(SessionInfo {
                name: state.session_name.clone(),
                language: config.language.code().to_string(),
                models_dir: config.models_dir.display().to_string(),
                detect_page: config.detect_page,
                word_detector: config.word_detector.to_string(),
                engine_loaded: state.recognizer.is_loaded(),
                requests_served: state.recognizer.requests_served(),
                pid: std::process::id(),
                uptime_secs: state.start_time.elapsed().as_secs(),
            }))
        }

        // Shutdown is triggered after the response is sent
        Request::Shutdown => Response::ok(),

        Request::Recognize(params) => handlers::recognize::handle(&state.recognizer, params).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (ClientState, broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let state = ClientState {
            recognizer: Arc::new(Recognizer::new(OcrConfig::new("/nonexistent/models"))),
            session_name: "test".to_string(),
            start_time: Instant::now(),
            shutdown_tx,
        };
        (state, shutdown_rx)
    }

    /// Feed `input` to a client handler and collect the responses.
    async fn exchange(input: &str, state: ClientState) -> Vec<Response> {
        let mut output = Vec::new();
        handle_client(input.as_bytes(), &mut output, state).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_ping_and_session_info() {
        let (state, _rx) = state();
        let responses = exchange(
            "{\"type\":\"ping\"}\n\n{\"type\":\"session_info\"}\n",
            state,
        )
        .await;

        assert_eq!(responses.len(), 2);
        assert!(matches!(responses[0].data, Some(ResponseData::Pong)));
        match &responses[1].data {
            Some(ResponseData::SessionInfo(info)) => {
                assert_eq!(info.name, "test");
                assert_eq!(info.language, "cz");
                assert!(info.detect_page);
                assert_eq!(info.word_detector, "contour");
                assert!(!info.engine_loaded);
                assert_eq!(info.requests_served, 0);
                assert_eq!(info.pid, std::process::id());
            }
            other => panic!("Expected session info, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection() {
        let (state, _rx) = state();
        let responses = exchange("{not json}\n{\"type\":\"ping\"}\n", state).await;

        assert_eq!(responses.len(), 2);
        assert!(!responses[0].success);
        assert_eq!(
            responses[0].error.as_ref().map(|e| e.code),
            Some(ErrorCode::InvalidRequest)
        );
        assert!(responses[1].success);
    }

    #[tokio::test]
    async fn test_shutdown_signals_and_closes() {
        let (state, mut rx) = state();
        let responses = exchange(
            "{\"type\":\"shutdown\"}\n{\"type\":\"ping\"}\n",
            state,
        )
        .await;

        // The ping after shutdown is never answered
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0].data, Some(ResponseData::Ok)));
        assert!(rx.try_recv().is_ok());
    }
}
