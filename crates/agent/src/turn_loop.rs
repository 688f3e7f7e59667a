//! The turn loop.
//!
//! ```text
//! AWAITING_COMPLETION ──text only──▶ DONE
//!        ▲      │
//!        │      └─tool calls─▶ RESOLVING_TOOLS (all calls, concurrently)
//!        └────────────────────────────┘
//! ```
//!
//! Each round either ends the loop with a plain answer or resolves every
//! requested call before the next completion. A single call's failure
//! becomes an error result in history; only the completion call itself
//! can fail the run.

use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchboard_core::agent::A2AOptions;
use switchboard_core::error::{Result, SchemaError, ToolError};
use switchboard_core::message::{Message, ToolCallRequest};
use switchboard_core::provider::ProviderRequest;
use switchboard_core::schema::{self, ToolDescriptor};
use switchboard_core::tool::{ToolOutput, ToolRegistry, ToolResult, parse_arguments};

use crate::registry::AgentRegistry;
use crate::stream_event::{EventSink, ProtocolEvent};

/// Returned when the model is still asking for tools after the last allowed round.
pub const ROUND_LIMIT_MESSAGE: &str =
    "I've reached the maximum number of tool call rounds. Please provide further guidance.";

/// Build the descriptor for a tool declared by the client. Client tools are
/// never strict and have no server-side body.
pub fn client_tool(
    name: impl Into<String>,
    description: impl Into<String>,
    parameters: Value,
) -> std::result::Result<ToolDescriptor, SchemaError> {
    schema::build(name, description, parameters, false, &[], Map::new())
}

/// One turn loop invocation: an agent registry to delegate to, an optional
/// tool registry, and where to send events.
pub struct TurnLoop<'a> {
    agents: &'a AgentRegistry,
    tools: Option<&'a ToolRegistry>,
    client_tools: Vec<ToolDescriptor>,
    thread_id: String,
    depth: u32,
    events: EventSink,
}

impl<'a> TurnLoop<'a> {
    pub fn new(agents: &'a AgentRegistry) -> Self {
        Self {
            agents,
            tools: None,
            client_tools: Vec::new(),
            thread_id: Uuid::new_v4().simple().to_string(),
            depth: 0,
            events: EventSink::discard(),
        }
    }

    pub fn with_tools(mut self, tools: Option<&'a ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_client_tools(mut self, client_tools: Vec<ToolDescriptor>) -> Self {
        self.client_tools = client_tools;
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    /// Delegation depth of this loop; the top level is 0.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Drive the conversation until the model answers without tool calls.
    ///
    /// `history` is appended to in place: each round adds the assistant's
    /// tool-call message followed by one `tool` message per call, in request
    /// order. The final assistant message is appended and returned.
    pub async fn run(&self, history: &mut Vec<Message>, model: &str) -> Result<Message> {
        let settings = self.agents.settings();
        let tool_set = self.tool_set().await;

        info!(
            thread_id = %self.thread_id,
            model,
            depth = self.depth,
            tools = tool_set.descriptors.len(),
            "Starting turn loop"
        );

        for round in 1..=settings.max_rounds {
            debug!(thread_id = %self.thread_id, round, messages = history.len(), "Requesting completion");

            let request = ProviderRequest {
                model: model.to_string(),
                messages: history.clone(),
                temperature: settings.temperature,
                tools: tool_set.descriptors.clone(),
            };
            let message = self.agents.provider().complete(request).await?.message;

            self.events.text_message(&message.id, &message.content);

            if !message.has_tool_calls() {
                info!(thread_id = %self.thread_id, rounds = round, "Turn loop finished");
                history.push(message.clone());
                return Ok(message);
            }

            let calls = message.tool_calls.clone();
            debug!(thread_id = %self.thread_id, round, calls = calls.len(), "Resolving tool calls");
            for call in &calls {
                if !tool_set.is_agent(&call.name) {
                    self.events.emit_all(ProtocolEvent::tool_call(call, Some(&message.id)));
                }
            }
            history.push(message);

            // join_all keeps request order regardless of completion order.
            let results = join_all(calls.iter().map(|call| self.resolve(&tool_set, call))).await;
            for (call, result) in calls.iter().zip(results) {
                history.push(result.into_message(&call.name));
            }
        }

        warn!(
            thread_id = %self.thread_id,
            max_rounds = settings.max_rounds,
            "Round limit reached, returning without a final answer"
        );
        let message = Message::assistant(ROUND_LIMIT_MESSAGE);
        self.events.text_message(&message.id, &message.content);
        history.push(message.clone());
        Ok(message)
    }

    /// The effective tool set for one run. Agent ids win every name collision,
    /// then registered tools, then client tools.
    async fn tool_set(&self) -> ToolSet<'a> {
        let agents: HashMap<String, ToolDescriptor> = self
            .agents
            .as_tools()
            .await
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        let mut descriptors = Vec::new();
        for descriptor in self.tools.map(ToolRegistry::list).unwrap_or_default() {
            if agents.contains_key(&descriptor.name) {
                debug!(tool = %descriptor.name, "Tool shadowed by agent of the same id");
                continue;
            }
            descriptors.push(descriptor);
        }

        let mut clients = HashMap::new();
        for descriptor in &self.client_tools {
            let taken = agents.contains_key(&descriptor.name)
                || self.tools.is_some_and(|t| t.contains(&descriptor.name))
                || clients.contains_key(&descriptor.name);
            if taken {
                debug!(tool = %descriptor.name, "Ignoring client tool with a taken name");
                continue;
            }
            descriptors.push(descriptor.clone());
            clients.insert(descriptor.name.clone(), descriptor.clone());
        }

        let mut agent_tools: Vec<ToolDescriptor> = agents.values().cloned().collect();
        agent_tools.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors.extend(agent_tools);

        ToolSet {
            descriptors,
            agents,
            clients,
            tools: self.tools,
        }
    }

    async fn resolve(&self, tool_set: &ToolSet<'_>, call: &ToolCallRequest) -> ToolResult {
        match tool_set.target(&call.name) {
            Target::Agent(descriptor) => self.delegate(descriptor, call).await,
            Target::Tool(registry) => registry.execute(call).await,
            Target::Client(descriptor) => forward_to_client(descriptor, call),
            Target::Unknown => {
                warn!(tool = %call.name, call_id = %call.id, "Model called an unknown tool");
                ToolResult::error(&call.id, ToolError::NotRegistered(call.name.clone()))
            }
        }
    }

    async fn delegate(&self, descriptor: &ToolDescriptor, call: &ToolCallRequest) -> ToolResult {
        let max_depth = self.agents.settings().max_depth;
        if self.depth >= max_depth {
            warn!(agent_id = %call.name, depth = self.depth, "Delegation refused at depth limit");
            return ToolResult::error(
                &call.id,
                ToolError::DepthLimit {
                    agent_id: call.name.clone(),
                    max_depth,
                },
            );
        }

        let text = match delegation_text(descriptor, call) {
            Ok(text) => text,
            Err(e) => return ToolResult::error(&call.id, e),
        };

        debug!(agent_id = %call.name, thread_id = %self.thread_id, depth = self.depth + 1, "Delegating to agent");
        let options = A2AOptions::delegation(&self.thread_id, text);
        match self.agents.execute_at_depth(&call.name, options, self.depth + 1).await {
            Ok(message) => ToolResult::new(&call.id, ToolOutput::text(message.content)),
            Err(e) => {
                warn!(agent_id = %call.name, error = %e, "Agent delegation failed");
                ToolResult::error(&call.id, e)
            }
        }
    }
}

fn delegation_text(descriptor: &ToolDescriptor, call: &ToolCallRequest) -> std::result::Result<String, ToolError> {
    let arguments = parse_arguments(&call.arguments)?;
    descriptor.validate(&arguments).map_err(ToolError::InvalidArguments)?;
    Ok(arguments["text"].as_str().unwrap_or_default().to_string())
}

fn forward_to_client(descriptor: &ToolDescriptor, call: &ToolCallRequest) -> ToolResult {
    let checked = parse_arguments(&call.arguments)
        .and_then(|arguments| descriptor.validate(&arguments).map_err(ToolError::InvalidArguments));
    match checked {
        Ok(()) => ToolResult::new(
            &call.id,
            ToolOutput::text(format!("Tool call '{}' forwarded to the client", call.name)),
        ),
        Err(e) => ToolResult::error(&call.id, e),
    }
}

struct ToolSet<'t> {
    descriptors: Vec<ToolDescriptor>,
    agents: HashMap<String, ToolDescriptor>,
    clients: HashMap<String, ToolDescriptor>,
    tools: Option<&'t ToolRegistry>,
}

enum Target<'s> {
    Agent(&'s ToolDescriptor),
    Tool(&'s ToolRegistry),
    Client(&'s ToolDescriptor),
    Unknown,
}

impl ToolSet<'_> {
    fn is_agent(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    fn target(&self, name: &str) -> Target<'_> {
        if let Some(descriptor) = self.agents.get(name) {
            return Target::Agent(descriptor);
        }
        if let Some(tools) = self.tools
            && tools.contains(name)
        {
            return Target::Tool(tools);
        }
        match self.clients.get(name) {
            Some(descriptor) => Target::Client(descriptor),
            None => Target::Unknown,
        }
    }
}
