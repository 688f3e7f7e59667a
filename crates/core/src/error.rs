//! Error types for the Switchboard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them for callers that only care about "did the run fail".

use thiserror::Error;

/// The top-level error type for all Switchboard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion collaborator errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Schema errors ---
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    // --- Capability session errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Run table errors ---
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the completion call. These are the only errors fatal to a run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// A malformed tool parameter spec, raised at registration time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Parameter spec for '{0}' resolves to an empty structure")]
    Empty(String),

    #[error("Parameter spec for '{0}' is not a JSON object schema")]
    NotAnObject(String),

    #[error("Unresolvable reference '{reference}' in schema for '{tool}'")]
    UnresolvedRef { tool: String, reference: String },

    #[error("Reference cycle through '{reference}' in schema for '{tool}'")]
    RefCycle { tool: String, reference: String },
}

/// Errors raised while resolving a single tool call.
///
/// None of these abort a round: the turn loop folds them into an
/// error `ToolResult` so the model can recover.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool '{0}' is not registered")]
    NotRegistered(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Capability provider error: {0}")]
    Provider(String),

    #[error("Agent delegation to '{agent_id}' refused: depth limit {max_depth} reached")]
    DepthLimit { agent_id: String, max_depth: u32 },
}

/// Errors talking to an out-of-process capability provider.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Failed to start capability provider: {0}")]
    Spawn(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Provider returned error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Capability provider timed out after {0}s")]
    Timeout(u64),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}

/// Errors from the run table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("Run '{0}' not found")]
    NotFound(String),

    #[error("Run '{0}' already exists")]
    Duplicate(String),
}
