//! Tool trait — the abstraction over invocable capabilities.
//!
//! Tools are either local handlers or proxies to a remote capability
//! session. The [`ToolRegistry`] builds each tool's descriptor once, at
//! registration, and validates arguments before any tool body runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capability::{CapabilitySession, CapabilityTool};
use crate::error::{Result, SchemaError, ToolError};
use crate::message::{Message, ToolCallRequest};
use crate::schema::{self, ParameterSpec, ToolDescriptor};

/// What a tool body produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// The resolution of one tool call. Exactly one exists per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result answers
    pub tool_call_id: String,

    /// Text fed back to the model
    pub content: String,

    /// Whether resolution failed
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(tool_call_id: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: output.content,
            is_error: output.is_error,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::new(tool_call_id, ToolOutput::error(format!("Error: {error}")))
    }

    /// Convert into a `tool` role history entry. Failed results always
    /// reach the model with an `Error:` prefix.
    pub fn into_message(self, tool_name: &str) -> Message {
        let content = if self.is_error && !self.content.starts_with("Error:") {
            format!("Error: {}", self.content)
        } else {
            self.content
        };
        Message::tool_result(self.tool_call_id, content).with_name(tool_name)
    }
}

/// The core Tool trait.
///
/// Each tool describes its parameters declaratively; the registry turns
/// that into a [`ToolDescriptor`] and handles parsing and validation, so
/// `execute` only ever sees arguments that match the declared structure.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// The tool's parameters.
    fn parameters(&self) -> ParameterSpec;

    /// Whether the descriptor uses a strict schema.
    fn strict(&self) -> bool {
        true
    }

    /// Parameters hidden from the model.
    fn excluded(&self) -> &[&str] {
        &[]
    }

    /// Parameters hidden from the model and filled in after it responds.
    fn defaults(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Execute the tool with validated arguments.
    async fn execute(&self, arguments: Value) -> std::result::Result<ToolOutput, ToolError>;

    /// Build this tool's descriptor.
    fn descriptor(&self) -> std::result::Result<ToolDescriptor, SchemaError> {
        schema::build(
            self.name(),
            self.description(),
            self.parameters(),
            self.strict(),
            self.excluded(),
            self.defaults(),
        )
    }
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

/// A registry of available tools.
///
/// The turn loop uses this to:
/// 1. Get tool descriptors to send to the LLM
/// 2. Resolve tool calls the LLM requests
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) -> std::result::Result<(), SchemaError> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool. Replaces any existing tool with the same name.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), SchemaError> {
        let descriptor = tool.descriptor()?;
        if self.tools.contains_key(&descriptor.name) {
            debug!(tool = %descriptor.name, "Replacing registered tool");
        }
        self.tools
            .insert(descriptor.name.clone(), RegisteredTool { descriptor, tool });
        Ok(())
    }

    /// Get a tool by name.
    pub fn lookup(&self, name: &str) -> std::result::Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .map(|t| Arc::clone(&t.tool))
            .ok_or_else(|| ToolError::NotRegistered(name.to_string()))
    }

    /// Get a tool's descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| &t.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool descriptors, ordered by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor.clone()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve one tool call. Never fails: unknown names, malformed or
    /// invalid arguments and execution failures all become an error result.
    pub async fn execute(&self, call: &ToolCallRequest) -> ToolResult {
        match self.try_execute(call).await {
            Ok(output) => {
                if output.is_error {
                    warn!(tool = %call.name, call_id = %call.id, "Tool reported an error");
                }
                ToolResult::new(&call.id, output)
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolResult::error(&call.id, e)
            }
        }
    }

    async fn try_execute(&self, call: &ToolCallRequest) -> std::result::Result<ToolOutput, ToolError> {
        let entry = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotRegistered(call.name.clone()))?;

        let arguments = parse_arguments(&call.arguments)?;
        entry
            .descriptor
            .validate(&arguments)
            .map_err(ToolError::InvalidArguments)?;
        let arguments = entry.descriptor.apply_defaults(arguments);

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        entry.tool.execute(arguments).await
    }

    /// Discover the session's capabilities and register one proxy tool per
    /// capability named in `allowed` (or every capability when `None`).
    ///
    /// Returns how many tools were registered.
    pub async fn register_from_capability_session(
        &mut self,
        session: Arc<dyn CapabilitySession>,
        allowed: Option<&HashSet<String>>,
    ) -> Result<usize> {
        let capabilities = session.discover().await?;
        let mut registered = 0;
        for capability in capabilities {
            if allowed.is_some_and(|names| !names.contains(&capability.name)) {
                continue;
            }
            let tool = CapabilityTool::new(capability, Arc::clone(&session))?;
            self.register(tool)?;
            registered += 1;
        }
        info!(
            session = session.label(),
            registered,
            "Registered tools from capability session"
        );
        Ok(registered)
    }
}

/// Parse the model's raw argument payload. An empty payload means no arguments.
pub fn parse_arguments(raw: &str) -> std::result::Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec, ObjectSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> ParameterSpec {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
            .into()
        }
        async fn execute(&self, arguments: Value) -> std::result::Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(arguments["text"].as_str().unwrap_or("")))
        }
    }

    /// Counts executions so tests can assert the body never ran.
    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "forecast"
        }
        fn description(&self) -> &str {
            "Weather forecast"
        }
        fn parameters(&self) -> ParameterSpec {
            ObjectSpec::new()
                .field(FieldSpec::string("city"))
                .field(FieldSpec::new("days", FieldKind::Integer).optional())
                .field(FieldSpec::string("units"))
                .into()
        }
        fn defaults(&self) -> Map<String, Value> {
            let mut defaults = Map::new();
            defaults.insert("units".into(), json!("metric"));
            defaults
        }
        async fn execute(&self, arguments: Value) -> std::result::Result<ToolOutput, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text(format!(
                "{} in {}",
                arguments["city"].as_str().unwrap_or("?"),
                arguments["units"].as_str().unwrap_or("?")
            )))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> ParameterSpec {
            ObjectSpec::new().into()
        }
        async fn execute(&self, _arguments: Value) -> std::result::Result<ToolOutput, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        assert!(registry.lookup("echo").is_ok());
        assert!(registry.contains("echo"));
        assert!(matches!(
            registry.lookup("nonexistent"),
            Err(ToolError::NotRegistered(_))
        ));
    }

    #[test]
    fn registry_list_returns_strict_descriptors() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let defs = registry.list();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert!(defs[0].strict);
        assert_eq!(defs[0].parameters["additionalProperties"], json!(false));
    }

    #[test]
    fn registration_is_last_write_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        registry.register(EchoTool).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let call = ToolCallRequest::new("call_1", "echo", r#"{"text": "hello world"}"#);
        let result = registry.execute(&call).await;
        assert!(!result.is_error);
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.content, "hello world");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let registry = ToolRegistry::new();
        let call = ToolCallRequest::new("call_1", "nonexistent", "{}");
        let result = registry.execute(&call).await;
        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "call_1");
        assert!(result.content.contains("not registered"));
    }

    #[tokio::test]
    async fn invalid_arguments_short_circuit_the_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(CountingTool { calls: Arc::clone(&calls) })
            .unwrap();

        let call = ToolCallRequest::new("c1", "forecast", r#"{"days": 2}"#);
        let result = registry.execute(&call).await;
        assert!(result.is_error);
        assert!(result.content.contains("city"));

        let call = ToolCallRequest::new("c2", "forecast", "not json");
        let result = registry.execute(&call).await;
        assert!(result.is_error);
        assert!(result.content.contains("not valid JSON"));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn defaults_are_hidden_and_filled_in() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(CountingTool { calls: Arc::clone(&calls) })
            .unwrap();

        let descriptor = registry.descriptor("forecast").unwrap();
        assert!(descriptor.parameters["properties"].get("units").is_none());

        let call = ToolCallRequest::new("c1", "forecast", r#"{"city": "Oslo", "days": null}"#);
        let result = registry.execute(&call).await;
        assert!(!result.is_error, "{}", result.content);
        assert_eq!(result.content, "Oslo in metric");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execution_failure_is_folded() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool).unwrap();
        let call = ToolCallRequest::new("c9", "broken", "");
        let result = registry.execute(&call).await;
        assert!(result.is_error);
        assert!(result.content.contains("disk on fire"));
    }

    #[test]
    fn tool_result_becomes_tool_message() {
        let msg = ToolResult::new("c1", ToolOutput::text("ok")).into_message("echo");
        assert_eq!(msg.role, crate::message::Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msg.name.as_deref(), Some("echo"));
    }

    #[test]
    fn failed_result_message_carries_error_prefix() {
        let msg = ToolResult::new("c1", ToolOutput::error("kaboom")).into_message("x");
        assert_eq!(msg.content, "Error: kaboom");

        let msg = ToolResult::error("c2", "kaboom").into_message("x");
        assert_eq!(msg.content, "Error: kaboom");

        let msg = ToolResult::new("c3", ToolOutput::text("Errors: none")).into_message("x");
        assert_eq!(msg.content, "Errors: none");
    }
}
