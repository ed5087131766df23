//! IPC client for communicating with the daemon.

use std::io;
use std::path::Path;
use std::time::Duration;

use rxocr_protocol::{ErrorCode, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Daemon closed the connection")]
    Closed,

    #[error("IPC error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed daemon message: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Wire error code reported for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Timeout(_) => ErrorCode::Timeout,
            _ => ErrorCode::IpcError,
        }
    }
}

/// IPC client for daemon communication.
pub struct IpcClient {
    #[cfg(unix)]
    stream: tokio::net::UnixStream,
    #[cfg(windows)]
    stream: tokio::net::TcpStream,
}

impl IpcClient {
    /// Connect to the daemon for the given session.
    #[cfg(unix)]
    pub async fn connect(socket_path: &Path) -> io::Result<Self> {
        let stream = tokio::net::UnixStream::connect(socket_path).await?;
        Ok(Self { stream })
    }

    #[cfg(windows)]
    pub async fn connect(socket_path: &Path) -> io::Result<Self> {
        // On Windows, derive port from session name
        let session = socket_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default");

        let port = rxocr_engine::get_session_port(session);
        let addr = format!("127.0.0.1:{}", port);
        let stream = tokio::net::TcpStream::connect(&addr).await?;
        Ok(Self { stream })
    }

    /// Send a request and receive a response.
    pub async fn send(&mut self, request: &Request, timeout_ms: u64) -> Result<Response, ClientError> {
        let json = serde_json::to_string(request)? + "\n";

        // Write request and flush to ensure it's sent immediately
        self.stream.write_all(json.as_bytes()).await?;
        self.stream.flush().await?;

        // Read response with timeout
        let response = timeout(Duration::from_millis(timeout_ms), self.read_response())
            .await
            .map_err(|_| ClientError::Timeout(timeout_ms))??;

        Ok(response)
    }

    /// Read a response from the stream.
    async fn read_response(&mut self) -> Result<Response, ClientError> {
        let mut reader = BufReader::new(&mut self.stream);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ClientError::Closed);
        }

        let response: Response = serde_json::from_str(line.trim())?;
        Ok(response)
    }
}

/// Try to connect to an existing daemon, with optional retries.
pub async fn try_connect(socket_path: &Path, retries: u32, delay_ms: u64) -> io::Result<IpcClient> {
    let mut last_error = io::Error::new(io::ErrorKind::Other, "No connection attempts made");

    for _ in 0..retries {
        match IpcClient::connect(socket_path).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                last_error = e;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }

    Err(last_error)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rxocr_protocol::ResponseData;

    #[tokio::test]
    async fn test_send_receives_one_line_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socket");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = tokio::io::split(stream);
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            assert_eq!(line, "{\"type\":\"ping\"}\n");
            writer.write_all(b"{\"success\":true,\"data\":{\"type\":\"pong\"}}\n").await.unwrap();
        });

        let mut client = try_connect(&path, 3, 10).await.unwrap();
        let response = client.send(&Request::Ping, 1000).await.unwrap();
        assert!(response.success);
        assert!(matches!(response.data, Some(ResponseData::Pong)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socket");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(stream);
        });

        let mut client = IpcClient::connect(&path).await.unwrap();
        let err = client.send(&Request::Ping, 50).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(50)));
        assert_eq!(err.code(), ErrorCode::Timeout);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(try_connect(&dir.path().join("socket"), 2, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_connection_is_ipc_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socket");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, _writer) = tokio::io::split(stream);
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
        });

        let mut client = IpcClient::connect(&path).await.unwrap();
        let err = client.send(&Request::Ping, 1000).await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));
        assert_eq!(err.code(), ErrorCode::IpcError);
        server.await.unwrap();
    }
}
