//! Capability sessions for Switchboard.
//!
//! Talks to out-of-process tool providers using MCP (JSON-RPC 2.0) over
//! either a subprocess pipe or HTTP. Each operation opens its own
//! connection; nothing is pooled.

pub mod protocol;
pub mod session;
pub mod transport;

pub use session::{McpSession, SessionTarget};
pub use transport::{NetworkTransport, PipeTransport, Transport};
