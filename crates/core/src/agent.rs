//! Agent definitions and their public cards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::tool::ToolRegistry;

/// A skill advertised on an agent card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, alias = "input_modes", skip_serializing_if = "Vec::is_empty")]
    pub input_modes: Vec<String>,
    #[serde(default, alias = "output_modes", skip_serializing_if = "Vec::is_empty")]
    pub output_modes: Vec<String>,
}

/// Optional features an agent supports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
}

/// A registered agent: instructions, a model and an optional tool set.
///
/// Created once at startup and never mutated; re-registering under the
/// same id replaces it.
#[derive(Clone)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub instructions: String,
    pub model: String,
    pub tools: Option<Arc<ToolRegistry>>,
    pub input_modes: Vec<String>,
    pub output_modes: Vec<String>,
    pub skills: Vec<AgentSkill>,
}

impl AgentDefinition {
    /// A definition whose id is derived from `name`.
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, model: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: agent_id_from_name(&name),
            name,
            description: String::new(),
            version: "1.0.0".into(),
            instructions: instructions.into(),
            model: model.into(),
            tools: None,
            input_modes: vec!["text".into()],
            output_modes: vec!["text".into()],
            skills: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_skill(mut self, skill: AgentSkill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Public metadata. Instructions, model and tools stay private.
    pub fn card(&self) -> AgentCard {
        AgentCard {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            default_input_modes: self.input_modes.clone(),
            default_output_modes: self.output_modes.clone(),
            capabilities: AgentCapabilities::default(),
            skills: self.skills.clone(),
        }
    }
}

impl fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.as_ref().map(|t| t.len()))
            .finish_non_exhaustive()
    }
}

/// What list/get agent operations return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
}

/// Derive an agent id from its display name: lower-cased, spaces → `-`.
pub fn agent_id_from_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// Who sent an agent-to-agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum A2ARole {
    User,
    Agent,
}

/// Options for one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2AOptions {
    pub message_id: String,
    pub role: A2ARole,
    pub thread_id: String,
    pub text: String,
}

impl A2AOptions {
    /// Options for a delegation from another agent within `thread_id`.
    pub fn delegation(thread_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().simple().to_string(),
            role: A2ARole::Agent,
            thread_id: thread_id.into(),
            text: text.into(),
        }
    }

    /// Options for a direct request from a user, in a fresh thread.
    pub fn from_user(text: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().simple().to_string(),
            role: A2ARole::User,
            thread_id: Uuid::new_v4().simple().to_string(),
            text: text.into(),
        }
    }
}
