//! The agent registry.
//!
//! Every registered agent doubles as a tool named after its id, taking a
//! single `text` argument. That is what lets one agent's completion call
//! delegate to another without knowing it is talking to an agent.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use switchboard_config::AppConfig;
use switchboard_core::agent::{A2AOptions, AgentCard, AgentDefinition};
use switchboard_core::error::{Result, ToolError};
use switchboard_core::message::Message;
use switchboard_core::provider::Provider;
use switchboard_core::schema::{self, FieldSpec, ObjectSpec, ToolDescriptor};

use crate::turn_loop::TurnLoop;

/// Limits shared by every turn loop the registry starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    /// Completion calls per turn loop before giving up
    pub max_rounds: u32,
    /// How deep agent-to-agent delegation may nest
    pub max_depth: u32,
    pub temperature: f32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_rounds: 25,
            max_depth: 4,
            temperature: 0.0,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_rounds: config.orchestration.max_rounds,
            max_depth: config.orchestration.max_agent_depth,
            temperature: config.default_temperature,
        }
    }
}

/// Name → agent lookup, plus the completion collaborator agents run on.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentDefinition>>,
    provider: Arc<dyn Provider>,
    settings: LoopSettings,
}

impl AgentRegistry {
    pub fn new(provider: Arc<dyn Provider>, settings: LoopSettings) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            provider,
            settings,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn settings(&self) -> LoopSettings {
        self.settings
    }

    /// Register an agent. Last write wins.
    pub async fn register(&self, agent: AgentDefinition) {
        info!(agent_id = %agent.id, model = %agent.model, "Registered agent");
        if let Some(previous) = self.agents.write().await.insert(agent.id.clone(), agent) {
            debug!(agent_id = %previous.id, "Replaced existing agent");
        }
    }

    pub async fn lookup(&self, id: &str) -> Option<AgentDefinition> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.agents.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Public cards for every agent, ordered by id.
    pub async fn cards(&self) -> Vec<AgentCard> {
        let mut cards: Vec<AgentCard> = self.agents.read().await.values().map(AgentDefinition::card).collect();
        cards.sort_by(|a, b| a.id.cmp(&b.id));
        cards
    }

    /// One tool descriptor per agent, ordered by id.
    pub async fn as_tools(&self) -> Vec<ToolDescriptor> {
        let agents = self.agents.read().await;
        let mut tools: Vec<ToolDescriptor> = agents
            .values()
            .filter_map(|agent| match agent_tool(agent) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!(agent_id = %agent.id, error = %e, "Agent cannot be exposed as a tool");
                    None
                }
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Run one agent on `options.text` and return its final message.
    pub async fn execute(&self, id: &str, options: A2AOptions) -> Result<Message> {
        self.execute_at_depth(id, options, 0).await
    }

    /// Boxed so the turn loop can recurse back into the registry.
    pub(crate) fn execute_at_depth<'a>(
        &'a self,
        id: &'a str,
        options: A2AOptions,
        depth: u32,
    ) -> BoxFuture<'a, Result<Message>> {
        async move {
            let agent = self
                .lookup(id)
                .await
                .ok_or_else(|| ToolError::NotRegistered(id.to_string()))?;

            debug!(
                agent_id = %agent.id,
                thread_id = %options.thread_id,
                role = ?options.role,
                depth,
                "Executing agent"
            );

            let mut history = vec![Message::system(&agent.instructions), Message::user(options.text)];
            TurnLoop::new(self)
                .with_tools(agent.tools.as_deref())
                .with_thread_id(options.thread_id)
                .with_depth(depth)
                .run(&mut history, &agent.model)
                .await
        }
        .boxed()
    }
}

/// The descriptor an agent is exposed under: `{text: string}`, strict.
pub fn agent_tool(agent: &AgentDefinition) -> std::result::Result<ToolDescriptor, switchboard_core::SchemaError> {
    let description = if agent.description.is_empty() {
        format!("Delegate a task to the {} agent", agent.name)
    } else {
        agent.description.clone()
    };
    let spec = ObjectSpec::new().field(FieldSpec::string("text").describe("The request to send to the agent"));
    schema::build(&agent.id, description, spec, true, &[], Map::new())
}
