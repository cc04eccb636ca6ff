//! MCP server exposing Rember tools to language-model clients.
//!
//! Requests arrive as newline-delimited JSON-RPC 2.0 frames on stdin. The
//! [`McpServer`] answers `tools/list` from its [`ToolRegistry`] and runs
//! each `tools/call` under an [`ExecutionPolicy`], so a failing tool always
//! becomes an `isError` result and never a broken connection.

pub mod config;
pub mod error;
pub mod policy;
pub mod protocol;
pub mod runtime;
pub mod schema;
pub mod server;
pub mod tools;
pub mod transport;

pub use config::McpConfig;
pub use error::{RegistryError, ServerError, ToolError};
pub use policy::{ExecutionOutcome, ExecutionPolicy, RecoveryChain};
pub use server::McpServer;
pub use tools::{Tool, ToolId, ToolRegistry};
