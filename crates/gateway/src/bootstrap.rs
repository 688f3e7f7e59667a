//! Build the gateway's shared state from configuration.
//!
//! The completion provider, the agent registry and the chat tool registry
//! are built once here and handed to [`crate::serve`].

use std::sync::Arc;
use tracing::info;

use switchboard_agent::{AgentRegistry, LoopSettings};
use switchboard_capabilities::McpSession;
use switchboard_config::{AgentConfig, AppConfig};
use switchboard_core::agent::AgentDefinition;
use switchboard_core::capability::CapabilitySession;
use switchboard_core::error::{Error, Result};
use switchboard_core::tool::ToolRegistry;

use crate::{GatewayState, SharedState};

pub async fn build_state(config: &AppConfig) -> Result<SharedState> {
    let provider = switchboard_providers::build_from_config(config)?;
    let agents = Arc::new(AgentRegistry::new(provider, LoopSettings::from_config(config)));
    for agent in &config.agents {
        agents.register(build_agent(config, agent).await?).await;
    }

    let mut tools = ToolRegistry::new();
    for server in &config.gateway.chat_capability_servers {
        tools
            .register_from_capability_session(session(config, server)?, None)
            .await?;
    }

    info!(
        agents = agents.len().await,
        chat_tools = tools.len(),
        model = %config.default_model,
        "Gateway state ready"
    );
    Ok(Arc::new(GatewayState::new(agents, Arc::new(tools), config)))
}

/// One `[[agents]]` entry as a definition, without tools.
pub fn agent_definition(config: &AppConfig, agent: &AgentConfig) -> AgentDefinition {
    let model = agent.model.clone().unwrap_or_else(|| config.default_model.clone());
    let mut definition = AgentDefinition::new(&agent.name, &agent.instructions, model)
        .with_id(agent.agent_id())
        .with_description(&agent.description);
    definition.version = agent.version.clone();
    definition.input_modes = agent.input_modes.clone();
    definition.output_modes = agent.output_modes.clone();
    definition.skills = agent.skills.clone();
    definition
}

/// Turn one `[[agents]]` entry into a definition. An agent naming a
/// capability server gets its own registry of that server's tools.
pub async fn build_agent(config: &AppConfig, agent: &AgentConfig) -> Result<AgentDefinition> {
    let mut definition = agent_definition(config, agent);
    if let Some(server) = &agent.capability_server {
        let mut tools = ToolRegistry::new();
        tools
            .register_from_capability_session(session(config, server)?, agent.allowed_tools.as_ref())
            .await?;
        definition = definition.with_tools(Arc::new(tools));
    }
    Ok(definition)
}

fn session(config: &AppConfig, name: &str) -> Result<Arc<dyn CapabilitySession>> {
    let server = config.capability_server(name).ok_or_else(|| Error::Config {
        message: format!("unknown capability server '{name}'"),
    })?;
    Ok(Arc::new(McpSession::from_config(server)?))
}
