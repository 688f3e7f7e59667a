//! MCP capability sessions.
//!
//! Every `discover` / `invoke` opens a fresh connection, runs the MCP
//! handshake, performs the single operation and closes. A hung or crashed
//! provider therefore only ever costs the call that hit it.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use switchboard_config::{CapabilityServerConfig, TransportKind};
use switchboard_core::capability::{CapabilityDescriptor, CapabilitySession};
use switchboard_core::error::CapabilityError;
use switchboard_core::tool::ToolOutput;

use crate::protocol::{JsonRpcRequest, PROTOCOL_VERSION, ToolCallResult, ToolsListResult, methods};
use crate::transport::{NetworkTransport, PipeTransport, Transport};

/// Where a session connects to.
#[derive(Debug, Clone)]
pub enum SessionTarget {
    Pipe {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
    Network {
        url: String,
        headers: BTreeMap<String, String>,
    },
}

/// A capability session speaking MCP over a pipe or HTTP.
pub struct McpSession {
    label: String,
    target: SessionTarget,
    timeout: Duration,
    http: reqwest::Client,
}

impl McpSession {
    pub fn new(label: impl Into<String>, target: SessionTarget) -> Self {
        Self {
            label: label.into(),
            target,
            timeout: Duration::from_secs(60),
            http: http_client(Duration::from_secs(60)),
        }
    }

    /// Session for a subprocess provider.
    pub fn pipe(label: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(
            label,
            SessionTarget::Pipe {
                command: command.into(),
                args,
                env: BTreeMap::new(),
            },
        )
    }

    /// Session for an HTTP provider.
    pub fn network(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(
            label,
            SessionTarget::Network {
                url: url.into(),
                headers: BTreeMap::new(),
            },
        )
    }

    /// Build a session from a `[[capability_servers]]` entry.
    pub fn from_config(config: &CapabilityServerConfig) -> Result<Self, CapabilityError> {
        let target = match config.transport {
            TransportKind::Pipe => SessionTarget::Pipe {
                command: config.command.clone().ok_or_else(|| {
                    CapabilityError::Unsupported(format!("'{}' has no command", config.name))
                })?,
                args: config.args.clone(),
                env: config.env.clone(),
            },
            TransportKind::Network => SessionTarget::Network {
                url: config
                    .url
                    .clone()
                    .ok_or_else(|| CapabilityError::Unsupported(format!("'{}' has no url", config.name)))?,
                headers: config.headers.clone(),
            },
        };
        Ok(Self::new(&config.name, target).with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.http = http_client(timeout);
        self
    }

    fn open(&self) -> Result<Box<dyn Transport>, CapabilityError> {
        Ok(match &self.target {
            SessionTarget::Pipe { command, args, env } => Box::new(PipeTransport::spawn(command, args, env)?),
            SessionTarget::Network { url, headers } => {
                Box::new(NetworkTransport::new(self.http.clone(), url, headers)?)
            }
        })
    }

    /// Open, handshake, run one request, close. Closing shares the same
    /// deadline as the request.
    async fn round_trip(&self, method: &str, params: Option<Value>) -> Result<Value, CapabilityError> {
        let timeout_secs = self.timeout.as_secs();
        let deadline = Instant::now() + self.timeout;
        let mut connection = Connection {
            transport: self.open()?,
            next_id: 1,
        };
        let outcome = tokio::time::timeout_at(deadline, async {
            connection.initialize().await?;
            connection.call(method, params).await
        })
        .await;
        if tokio::time::timeout_at(deadline, connection.transport.close()).await.is_err() {
            debug!(session = %self.label, "close did not finish before the deadline");
        }

        outcome.map_err(|_| CapabilityError::Timeout(timeout_secs))?
    }

    async fn list_tools(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.round_trip(methods::TOOLS_LIST, params).await?;
            let page: ToolsListResult =
                serde_json::from_value(result).map_err(|e| CapabilityError::Protocol(e.to_string()))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn try_invoke(&self, name: &str, arguments: Value) -> Result<ToolOutput, CapabilityError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.round_trip(methods::TOOLS_CALL, Some(params)).await?;
        let result: ToolCallResult =
            serde_json::from_value(result).map_err(|e| CapabilityError::Protocol(e.to_string()))?;
        Ok(result.into_output())
    }
}

#[async_trait]
impl CapabilitySession for McpSession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn discover(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError> {
        let tools = self.list_tools().await?;
        debug!(session = %self.label, count = tools.len(), "Discovered capabilities");
        Ok(tools)
    }

    async fn invoke(&self, name: &str, arguments: Value) -> ToolOutput {
        match self.try_invoke(name, arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!(session = %self.label, tool = name, error = %e, "Capability invocation failed");
                ToolOutput::error(e.to_string())
            }
        }
    }
}

/// HTTP client whose requests, including the closing DELETE, give up after `timeout`.
fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        warn!("failed to build HTTP client with timeout: {e}");
        reqwest::Client::new()
    })
}

struct Connection {
    transport: Box<dyn Transport>,
    next_id: i64,
}

impl Connection {
    async fn initialize(&mut self) -> Result<(), CapabilityError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "switchboard",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        self.call(methods::INITIALIZE, Some(params)).await?;
        self.transport
            .notify(&JsonRpcRequest::notification(methods::INITIALIZED))
            .await
    }

    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<Value, CapabilityError> {
        let mut request = JsonRpcRequest::new(self.next_id, method);
        request.params = params;
        self.next_id += 1;
        self.transport.request(&request).await?.into_result()
    }
}
