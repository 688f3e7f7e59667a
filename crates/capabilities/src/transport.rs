//! Transports carrying JSON-RPC between a session and a capability provider.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

use switchboard_core::error::CapabilityError;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";

/// One open connection to a provider.
#[async_trait]
pub trait Transport: Send {
    /// Send a request and wait for its response.
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, CapabilityError>;

    /// Send a notification. No response is expected.
    async fn notify(&mut self, notification: &JsonRpcRequest) -> Result<(), CapabilityError>;

    /// Tear the connection down.
    async fn close(&mut self);
}

fn request_id(request: &JsonRpcRequest) -> Result<i64, CapabilityError> {
    request
        .id
        .ok_or_else(|| CapabilityError::Protocol(format!("'{}' sent as a request without an id", request.method)))
}

/// Line-delimited JSON-RPC over a subprocess's stdin/stdout.
pub struct PipeTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
}

impl PipeTransport {
    pub fn spawn(command: &str, args: &[String], env: &BTreeMap<String, String>) -> Result<Self, CapabilityError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapabilityError::Spawn(format!("{command}: {e}")))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CapabilityError::Spawn("failed to capture stdout".into()))?;

        debug!(command, pid = ?child.id(), "Spawned capability provider");
        Ok(Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
        })
    }

    async fn write_line(&mut self, message: &JsonRpcRequest) -> Result<(), CapabilityError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CapabilityError::Transport("stdin is closed".into()))?;
        let mut line = serde_json::to_string(message).map_err(|e| CapabilityError::Protocol(e.to_string()))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Transport for PipeTransport {
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, CapabilityError> {
        let id = request_id(request)?;
        self.write_line(request).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| CapabilityError::Transport(e.to_string()))?;
            if n == 0 {
                return Err(CapabilityError::Transport("provider closed the pipe".into()));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Server notifications and log lines are skipped until our answer arrives.
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.answers(id) => return Ok(response),
                Ok(_) => trace!(line = trimmed, "Skipping unrelated message"),
                Err(_) => trace!(line = trimmed, "Skipping non-JSON-RPC output"),
            }
        }
    }

    async fn notify(&mut self, notification: &JsonRpcRequest) -> Result<(), CapabilityError> {
        self.write_line(notification).await
    }

    async fn close(&mut self) {
        // Closing stdin is the polite shutdown signal; kill whatever is left.
        self.stdin.take();
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

/// JSON-RPC over HTTP POST. Responses may be plain JSON or an SSE stream.
pub struct NetworkTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    session_id: Option<String>,
}

impl NetworkTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>, headers: &BTreeMap<String, String>) -> Result<Self, CapabilityError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CapabilityError::Transport(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CapabilityError::Transport(format!("invalid value for header '{name}': {e}")))?;
            map.insert(name, value);
        }
        Ok(Self {
            client,
            url: url.into(),
            headers: map,
            session_id: None,
        })
    }

    async fn post(&mut self, message: &JsonRpcRequest) -> Result<reqwest::Response, CapabilityError> {
        let mut builder = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_HEADER, session_id);
        }
        let response = builder.send().await.map_err(|e| CapabilityError::Transport(e.to_string()))?;

        if let Some(session_id) = response.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            self.session_id = Some(session_id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Transport(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }
}

/// Pull the response for `id` out of an SSE body.
fn response_from_sse(body: &str, id: i64) -> Option<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .find(|response| response.answers(id))
}

#[async_trait]
impl Transport for NetworkTransport {
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, CapabilityError> {
        let id = request_id(request)?;
        let response = self.post(request).await?;

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        if is_sse {
            return response_from_sse(&body, id)
                .ok_or_else(|| CapabilityError::Protocol(format!("no response for request {id} in event stream")));
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| CapabilityError::Protocol(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| CapabilityError::Protocol(e.to_string()))
    }

    async fn notify(&mut self, notification: &JsonRpcRequest) -> Result<(), CapabilityError> {
        self.post(notification).await.map(|_| ())
    }

    async fn close(&mut self) {
        if let Some(session_id) = self.session_id.take() {
            let _ = self
                .client
                .delete(&self.url)
                .headers(self.headers.clone())
                .header(SESSION_HEADER, session_id)
                .send()
                .await;
        }
    }
}
