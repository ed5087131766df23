//! Session listener for CLI connections.
//!
//! Each session owns one endpoint: `<tmp>/rxocr/<session>/socket` on Unix, a
//! loopback port derived from the session name on Windows.

use std::io;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Session '{0}' already has a running daemon")]
    SessionInUse(String),
}

/// Platform-specific IPC stream type alias.
#[cfg(unix)]
pub type IpcStream = tokio::net::UnixStream;

#[cfg(windows)]
pub type IpcStream = tokio::net::TcpStream;

/// Listener owned by one daemon session.
pub struct IpcServer {
    session: String,

    #[cfg(unix)]
    listener: tokio::net::UnixListener,

    #[cfg(windows)]
    listener: tokio::net::TcpListener,

    address: String,
}

impl IpcServer {
    /// Claim the session endpoint.
    ///
    /// A socket left behind by a dead daemon is replaced; one that still
    /// accepts connections belongs to a live daemon and is refused.
    #[cfg(unix)]
    pub async fn bind(session: &str) -> Result<Self, IpcError> {
        let path = crate::get_socket_path(session);
        std::fs::create_dir_all(crate::get_session_dir(session))?;

        if path.exists() {
            if tokio::net::UnixStream::connect(&path).await.is_ok() {
                return Err(IpcError::SessionInUse(session.to_string()));
            }
            debug!("Removing stale socket {:?}", path);
            std::fs::remove_file(&path)?;
        }

        let listener = tokio::net::UnixListener::bind(&path)?;
        let address = path.display().to_string();
        info!("Session '{}' listening on {}", session, address);

        Ok(Self {
            session: session.to_string(),
            listener,
            address,
        })
    }

    #[cfg(windows)]
    pub async fn bind(session: &str) -> Result<Self, IpcError> {
        let address = format!("127.0.0.1:{}", crate::get_session_port(session));
        let listener = match tokio::net::TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                return Err(IpcError::SessionInUse(session.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        info!("Session '{}' listening on {}", session, address);

        Ok(Self {
            session: session.to_string(),
            listener,
            address,
        })
    }

    /// Accept a new client connection.
    pub async fn accept(&self) -> Result<IpcStream, IpcError> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Socket path or loopback address, for logging.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stop listening and release the session endpoint.
    pub fn close(self) {
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(crate::get_socket_path(&self.session));
        }
        debug!("Session '{}' endpoint closed", self.session);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn unique_session(tag: &str) -> String {
        format!("ipc-{}-{}", tag, std::process::id())
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_and_accepts() {
        let session = unique_session("stale");
        let path = crate::get_socket_path(&session);
        std::fs::create_dir_all(crate::get_session_dir(&session)).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let server = IpcServer::bind(&session).await.unwrap();
        assert_eq!(server.address(), path.display().to_string());

        let client = tokio::spawn({
            let path = path.clone();
            async move {
                let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
                stream.write_all(b"hi").await.unwrap();
            }
        });

        let mut stream = server.accept().await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        client.await.unwrap();

        server.close();
        assert!(!path.exists());
        crate::cleanup_session(&session);
    }

    #[tokio::test]
    async fn test_live_session_is_not_taken_over() {
        let session = unique_session("live");
        let server = IpcServer::bind(&session).await.unwrap();

        match IpcServer::bind(&session).await {
            Err(IpcError::SessionInUse(name)) => assert_eq!(name, session),
            Err(e) => panic!("Expected SessionInUse, got {}", e),
            Ok(_) => panic!("Second daemon bound a live session"),
        }

        server.close();
        crate::cleanup_session(&session);
    }
}
