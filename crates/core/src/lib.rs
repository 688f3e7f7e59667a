//! # Switchboard Core
//!
//! Domain types, traits, and error definitions for the Switchboard tool-call
//! orchestrator. This crate has **no framework dependencies**: it defines the
//! model the other crates implement against.
//!
//! - [`schema`] builds normalized tool descriptors
//! - [`tool`] holds the tool trait and registry
//! - [`capability`] is the seam to out-of-process tool providers
//! - [`provider`] is the seam to the completion call

pub mod agent;
pub mod capability;
pub mod error;
pub mod message;
pub mod provider;
pub mod schema;
pub mod tool;
pub mod validation;

// Re-export key types at crate root for ergonomics
pub use agent::{A2AOptions, A2ARole, AgentCard, AgentDefinition, AgentSkill, agent_id_from_name};
pub use capability::{CapabilityDescriptor, CapabilitySession, CapabilityTool};
pub use error::{CapabilityError, Error, ProviderError, Result, RunError, SchemaError, ToolError};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use schema::{FieldKind, FieldSpec, ObjectSpec, ParameterSpec, ToolDescriptor};
pub use tool::{Tool, ToolOutput, ToolRegistry, ToolResult};
