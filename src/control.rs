// Command surface: newline-delimited JSON over TCP
//
// Each request line gets exactly one response line. The only state it
// writes is the operating mode.

use crate::state::SharedState;
use crate::types::OperatingMode;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Longest request line accepted, newline included
pub const MAX_LINE_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlRequest {
    SetMode { mode: String },
    GetMode,
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OperatingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResponse {
    fn success() -> Self {
        Self {
            status: ResponseStatus::Success,
            mode: None,
            anomaly: None,
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            ..Self::success()
        }
    }
}

pub fn handle_request(state: &SharedState, request: ControlRequest) -> ControlResponse {
    match request {
        ControlRequest::SetMode { mode } => match mode.parse::<OperatingMode>() {
            Ok(mode) => {
                state.set_mode(mode);
                ControlResponse {
                    mode: Some(mode),
                    ..ControlResponse::success()
                }
            }
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::GetMode => ControlResponse {
            mode: Some(state.mode()),
            ..ControlResponse::success()
        },
        ControlRequest::Status => ControlResponse {
            mode: Some(state.mode()),
            anomaly: Some(state.anomaly_active()),
            ..ControlResponse::success()
        },
    }
}

pub fn handle_line(state: &SharedState, line: &str) -> ControlResponse {
    match serde_json::from_str::<ControlRequest>(line) {
        Ok(request) => handle_request(state, request),
        Err(e) => ControlResponse::error(format!("Invalid request: {}", e)),
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &ControlResponse,
) -> io::Result<()> {
    let mut out = serde_json::to_string(response)?;
    out.push('\n');
    writer.write_all(out.as_bytes()).await
}

/// Serve one client. A line longer than [`MAX_LINE_BYTES`] gets an error
/// response and the connection is closed.
async fn handle_connection(stream: TcpStream, state: Arc<SharedState>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let limit = MAX_LINE_BYTES as u64 + 1;
        if (&mut reader).take(limit).read_line(&mut line).await? == 0 {
            return Ok(());
        }
        if line.len() > MAX_LINE_BYTES {
            log::warn!("Control request exceeds {} bytes, closing", MAX_LINE_BYTES);
            let message = format!("Request line exceeds {} bytes", MAX_LINE_BYTES);
            write_response(&mut writer, &ControlResponse::error(message)).await?;
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        write_response(&mut writer, &handle_line(&state, trimmed)).await?;
    }
}

/// Accept connections until the listener fails or the task is aborted
pub async fn serve(listener: TcpListener, state: Arc<SharedState>) -> io::Result<()> {
    log::info!("Control surface listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        log::debug!("Control client connected: {}", peer);

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                log::warn!("Control client {} error: {}", peer, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_mode() {
        let state = SharedState::new(OperatingMode::Blur);
        let response = handle_line(&state, r#"{"command":"set_mode","mode":"detect"}"#);

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(state.mode(), OperatingMode::Detect);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let state = SharedState::new(OperatingMode::Blur);
        let response = handle_line(&state, r#"{"command":"set_mode","mode":"disco"}"#);

        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.message.unwrap().contains("disco"));
        assert_eq!(state.mode(), OperatingMode::Blur);
    }

    #[test]
    fn test_status_reports_anomaly_mirror() {
        let state = SharedState::new(OperatingMode::Fall);
        state.set_anomaly_active(true);

        let response = handle_line(&state, r#"{"command":"status"}"#);
        assert_eq!(response.mode, Some(OperatingMode::Fall));
        assert_eq!(response.anomaly, Some(true));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let state = SharedState::default();
        assert_eq!(handle_line(&state, "hello").status, ResponseStatus::Error);
        assert_eq!(
            handle_line(&state, r#"{"command":"reboot"}"#).status,
            ResponseStatus::Error
        );
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(SharedState::new(OperatingMode::Blur));
        let server = tokio::spawn(serve(listener, Arc::clone(&state)));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        writer
            .write_all(
                b"{\"command\":\"set_mode\",\"mode\":\"trespass\"}\n{\"command\":\"get_mode\"}\n",
            )
            .await
            .unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let first: ControlResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(first.status, ResponseStatus::Success);

        line.clear();
        reader.read_line(&mut line).await.unwrap();
        let second: ControlResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(second.mode, Some(OperatingMode::Trespass));
        assert_eq!(state.mode(), OperatingMode::Trespass);

        server.abort();
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_and_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(SharedState::new(OperatingMode::Blur));
        let server = tokio::spawn(serve(listener, Arc::clone(&state)));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        // One byte past the limit, no newline
        let flood = vec![b'a'; MAX_LINE_BYTES + 1];
        writer.write_all(&flood).await.unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let response: ControlResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.message.unwrap().contains("exceeds"));

        line.clear();
        assert_eq!(reader.read_line(&mut line).await.unwrap(), 0);
        assert_eq!(state.mode(), OperatingMode::Blur);

        server.abort();
    }

    #[tokio::test]
    async fn test_line_at_limit_is_served() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(SharedState::new(OperatingMode::Blur));
        let server = tokio::spawn(serve(listener, Arc::clone(&state)));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut request = br#"{"command":"get_mode"}"#.to_vec();
        request.resize(MAX_LINE_BYTES - 1, b' ');
        request.push(b'\n');
        writer.write_all(&request).await.unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let response: ControlResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.mode, Some(OperatingMode::Blur));

        server.abort();
    }
}
