//! The orchestration core of Switchboard.
//!
//! A [`TurnLoop`] keeps calling the completion provider until it answers
//! without tool calls:
//!
//! 1. **Send** the history and the effective tool set to the provider
//! 2. **If tool calls**: resolve every call concurrently (agents by
//!    delegation, tools through the registry), append the results in
//!    request order, loop back to step 1
//! 3. **If text**: that is the final answer
//!
//! Runs started over HTTP go through the [`RunTable`], which produces the
//! [`ProtocolEvent`] stream a client reads exactly once.

pub mod registry;
pub mod run_table;
pub mod stream_event;
pub mod turn_loop;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use registry::{AgentRegistry, LoopSettings, agent_tool};
pub use run_table::{RunContext, RunJob, RunStream, RunTable, StartedRun};
pub use stream_event::{EventSink, ProtocolEvent};
pub use turn_loop::{ROUND_LIMIT_MESSAGE, TurnLoop, client_tool};
