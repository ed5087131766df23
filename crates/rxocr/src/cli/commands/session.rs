//! Session management command implementation.

use rxocr_protocol::{ErrorCode, Request, Response, ResponseData, SessionSummary};
use tracing::info;

use crate::cli::{Cli, SessionAction, SessionArgs};
use crate::output::Output;
use crate::session_manager::SessionManager;

pub async fn run(cli: &Cli, args: &SessionArgs, output: &Output) -> anyhow::Result<()> {
    match args.action {
        SessionAction::List => list_sessions(output).await,
        SessionAction::Info => session_info(&cli.session, output, cli.timeout).await,
        SessionAction::Stop => stop_session(&cli.session, output, cli.timeout).await,
        SessionAction::Daemon {
            no_page,
            word_detector,
        } => {
            let mut config = cli.ocr_config()?;
            config.detect_page = !no_page;
            config.word_detector = word_detector;
            rxocr_engine::run_server(&cli.session, config).await
        }
    }
}

async fn list_sessions(output: &Output) -> anyhow::Result<()> {
    let mut summaries = Vec::new();

    for name in SessionManager::list_sessions() {
        let manager = SessionManager::new(name.clone());
        let alive = manager.is_daemon_alive();

        let mut language = None;
        if alive {
            if let Ok(mut client) = crate::ipc_client::try_connect(&manager.socket_path(), 1, 100).await {
                if let Ok(response) = client.send(&Request::SessionInfo, 5000).await {
                    if let Some(ResponseData::SessionInfo(info)) = response.data {
                        language = Some(info.language);
                    }
                }
            }
        }

        summaries.push(SessionSummary {
            name,
            alive,
            language,
        });
    }

    output.print_response(&Response::success(ResponseData::SessionList {
        sessions: summaries,
    }));
    Ok(())
}

/// Connect to a running daemon without starting one.
async fn connect_running(
    session: &str,
    output: &Output,
) -> anyhow::Result<Option<crate::ipc_client::IpcClient>> {
    let manager = SessionManager::new(session.to_string());

    if !manager.is_daemon_alive() {
        output.print_error(ErrorCode::DaemonNotRunning, "No daemon running for this session");
        return Ok(None);
    }

    manager.connect().await.map(Some)
}

async fn session_info(session: &str, output: &Output, timeout_ms: u64) -> anyhow::Result<()> {
    let Some(mut client) = connect_running(session, output).await? else {
        std::process::exit(1);
    };

    let response = client.send(&Request::SessionInfo, timeout_ms).await?;
    output.print_response(&response);

    Ok(())
}

async fn stop_session(session: &str, output: &Output, timeout_ms: u64) -> anyhow::Result<()> {
    let Some(mut client) = connect_running(session, output).await? else {
        std::process::exit(1);
    };

    let response = client.send(&Request::Shutdown, timeout_ms).await?;
    info!("Stopped session '{}'", session);
    output.print_response(&response);

    Ok(())
}
