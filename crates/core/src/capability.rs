//! Capability sessions — the seam to out-of-process tool providers.
//!
//! A session knows how to reach one provider (a subprocess pipe or an
//! HTTP endpoint). Each `discover` / `invoke` is independent: the
//! transport opens, performs one operation and closes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{CapabilityError, SchemaError, ToolError};
use crate::schema::{self, ObjectSpec, ParameterSpec};
use crate::tool::{Tool, ToolOutput};

/// One capability advertised by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Uniform interface to an out-of-process tool provider.
#[async_trait]
pub trait CapabilitySession: Send + Sync {
    /// Short label for logs (server name or endpoint).
    fn label(&self) -> &str;

    /// List the provider's capabilities.
    async fn discover(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError>;

    /// Invoke one capability. Transport and provider failures are folded
    /// into an error output instead of being returned.
    async fn invoke(&self, name: &str, arguments: Value) -> ToolOutput;
}

/// A tool that forwards to a capability session.
pub struct CapabilityTool {
    name: String,
    description: String,
    parameters: ObjectSpec,
    session: Arc<dyn CapabilitySession>,
}

impl CapabilityTool {
    /// Build a proxy from a discovered capability. The declared input schema
    /// is converted eagerly so a malformed schema fails at registration.
    pub fn new(capability: CapabilityDescriptor, session: Arc<dyn CapabilitySession>) -> Result<Self, SchemaError> {
        let parameters = if capability.input_schema.is_null() {
            ObjectSpec::new()
        } else {
            schema::object_spec_from_input_schema(&capability.name, &capability.input_schema)?
        };
        Ok(Self {
            description: capability.description.unwrap_or_default(),
            name: capability.name,
            parameters,
            session,
        })
    }
}

#[async_trait]
impl Tool for CapabilityTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> ParameterSpec {
        ParameterSpec::Typed(self.parameters.clone())
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        Ok(self.session.invoke(&self.name, arguments).await)
    }
}
