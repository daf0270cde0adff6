//! MCP client and stdio test harness built on linewire.

pub mod client;
pub mod config;
pub mod process;
pub mod repl;
pub mod smoke;
pub mod types;

pub use client::McpClient;
pub use config::{resolve_server_command, ServerCommand};
pub use process::ServerProcess;
pub use smoke::{run_smoke, SmokeReport, SmokeStep};
pub use types::{McpError, McpResult};
