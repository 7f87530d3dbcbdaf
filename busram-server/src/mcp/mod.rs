//! MCP (Model Context Protocol) session protocol
//!
//! Turns the inbound message queue of one session into typed replies on its
//! outbound stream.
//!
//! MCP Protocol: <https://modelcontextprotocol.io/>
//!
//! ## States
//!
//! - **Connected**: stream open, only `initialize` is legal
//! - **Initialized**: tool discovery and invocation permitted
//! - **Closed**: terminal; the registry entry is gone

mod error;
mod machine;
mod runner;

pub use error::McpError;
pub use machine::{ProtocolMachine, ProtocolState};
pub use runner::run_session;
