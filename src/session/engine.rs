use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;

use crate::pty::PtyProcess;
use crate::session::protocol::{self, ClientFrame, CLOSE_PROTOCOL_ERROR};
use crate::session::title::{TitleTemplate, TitleVars};

/// PTY reads are chunked; frame boundaries are advisory.
const READ_CHUNK: usize = 1024;

/// Everything one session needs from server state, captured at upgrade.
#[derive(Clone)]
pub struct SessionParams {
    pub command: Vec<String>,
    pub permit_write: bool,
    pub title_template: TitleTemplate,
    pub preferences: Value,
}

/// Drive one upgraded socket to completion.
///
/// Per-session failures are logged here and never propagate further.
pub async fn run(socket: WebSocket, params: SessionParams, remote: SocketAddr) {
    if let Err(err) = run_inner(socket, &params, remote).await {
        tracing::error!(remote = %remote, error = %err, "Session error");
    }
    tracing::info!(remote = %remote, "Session closed");
}

async fn run_inner(socket: WebSocket, params: &SessionParams, remote: SocketAddr) -> Result<()> {
    let (mut sink, mut stream) = socket.split();

    // The init frame precedes any output on every session.
    let init = match build_init_frame(params) {
        Ok(frame) => frame,
        Err(err) => {
            close_with_error(&mut sink, &err.to_string()).await;
            return Err(err);
        }
    };
    if sink.send(Message::Text(init.into())).await.is_err() {
        return Ok(());
    }

    let pty = match PtyProcess::spawn(&params.command) {
        Ok(pty) => pty,
        Err(err) => {
            close_with_error(&mut sink, "failed to start command").await;
            return Err(err);
        }
    };
    tracing::info!(
        remote = %remote,
        pid = pty.pid(),
        command = %params.command.join(" "),
        "Command started"
    );

    // One task owns the sink, so socket writes are serialized by
    // construction. Either arm breaking the loop is the teardown latch.
    let mut buf = [0u8; READ_CHUNK];
    loop {
        tokio::select! {
            // Socket -> PTY (input and control frames)
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match protocol::decode_client(text.as_bytes()) {
                            Ok(ClientFrame::Input(data)) => {
                                // Dropped silently without write permit
                                if params.permit_write && pty.write_all(&data).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientFrame::Ping) => {
                                let pong = Message::Text(protocol::encode_pong().into());
                                if sink.send(pong).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientFrame::Resize { columns, rows }) => {
                                if columns == 0 || rows == 0 {
                                    continue;
                                }
                                if let Err(err) = pty.resize(columns, rows) {
                                    tracing::warn!(remote = %remote, error = %err, "Resize failed");
                                }
                            }
                            Err(err) => {
                                tracing::warn!(remote = %remote, error = %err, "Protocol violation");
                                close_with_error(&mut sink, &err.to_string()).await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!(remote = %remote, "Protocol violation: binary frame");
                        close_with_error(&mut sink, "binary frames are not supported").await;
                        break;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // transport-level ping and pong
                    Some(Err(err)) => {
                        tracing::debug!(remote = %remote, error = %err, "WebSocket receive error");
                        break;
                    }
                }
            }

            // PTY -> socket (output pump)
            read = pty.read(&mut buf) => {
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        let frame = Message::Text(protocol::encode_output(&buf[..n]).into());
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(remote = %remote, error = %err, "PTY read error");
                        break;
                    }
                }
            }
        }
    }

    // Teardown: stop the child, reap it, finish the close handshake.
    pty.terminate();
    match pty.wait().await {
        Ok(code) => {
            tracing::info!(remote = %remote, pid = pty.pid(), code, "Command exited");
        }
        Err(err) => {
            tracing::warn!(remote = %remote, error = %err, "Failed to reap command");
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}

fn build_init_frame(params: &SessionParams) -> Result<String> {
    let hostname = nix::unistd::gethostname()
        .context("Failed to read hostname")?
        .to_string_lossy()
        .into_owned();
    let title = params.title_template.render(&TitleVars {
        command: &params.command.join(" "),
        hostname: &hostname,
        preferences: &params.preferences,
    })?;
    protocol::encode_init(&title, &params.preferences).context("Failed to encode init frame")
}

async fn close_with_error(sink: &mut SplitSink<WebSocket, Message>, reason: &str) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_PROTOCOL_ERROR,
            reason: reason.to_string().into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::protocol::MSG_INIT;

    #[test]
    fn test_init_frame_carries_title_and_preferences() {
        let params = SessionParams {
            command: vec!["cat".to_string()],
            permit_write: true,
            title_template: TitleTemplate::parse("GoTTY - {{ .Command }}").unwrap(),
            preferences: serde_json::json!({ "font_size": 14 }),
        };
        let frame = build_init_frame(&params).unwrap();
        assert_eq!(frame.as_bytes()[0], MSG_INIT);
        let payload: Value = serde_json::from_str(&frame[1..]).unwrap();
        assert_eq!(payload["Title"], "GoTTY - cat");
        assert_eq!(payload["Preferences"]["font_size"], 14);
    }

    #[test]
    fn test_init_frame_unknown_field_fails() {
        let params = SessionParams {
            command: vec!["cat".to_string()],
            permit_write: false,
            title_template: TitleTemplate::parse("{{ .Missing }}").unwrap(),
            preferences: serde_json::json!({}),
        };
        assert!(build_init_frame(&params).is_err());
    }
}
