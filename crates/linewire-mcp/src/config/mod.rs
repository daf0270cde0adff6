//! Configuration loading and resolution.

use std::time::Duration;

use crate::types::{InitializeParams, McpError, McpResult};

/// Environment variable holding the server command when none is given.
pub const SERVER_ENV: &str = "LINEWIRE_SERVER";

/// How long a server gets to exit on its own after its stdin is closed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn from_parts<I, S>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = parts.into_iter().map(Into::into);
        let program = parts.next()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl std::fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Resolve the server command: explicit CLI args, then `LINEWIRE_SERVER`
/// split on whitespace.
pub fn resolve_server_command(explicit: &[String]) -> McpResult<ServerCommand> {
    if let Some(cmd) = ServerCommand::from_parts(explicit.iter().cloned()) {
        return Ok(cmd);
    }

    if let Ok(raw) = std::env::var(SERVER_ENV) {
        if let Some(cmd) = ServerCommand::from_parts(raw.split_whitespace()) {
            return Ok(cmd);
        }
        tracing::warn!("Ignoring empty {SERVER_ENV}");
    }

    Err(McpError::Process(format!(
        "no server command given; pass one after `--` or set {SERVER_ENV}"
    )))
}

/// Identity and capabilities sent in `initialize`.
pub fn default_initialize_params(client_name: Option<&str>) -> InitializeParams {
    let mut params = InitializeParams::default();
    if let Some(name) = client_name {
        params.client_info.name = name.to_string();
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_command_wins() {
        let args = vec!["python".to_string(), "server.py".to_string()];
        let cmd = resolve_server_command(&args).unwrap();
        assert_eq!(cmd.program, "python");
        assert_eq!(cmd.args, vec!["server.py"]);
        assert_eq!(cmd.to_string(), "python server.py");
    }

    #[test]
    fn blank_program_is_rejected() {
        assert!(ServerCommand::from_parts(["  "]).is_none());
        assert!(ServerCommand::from_parts(Vec::<String>::new()).is_none());
    }

    #[test]
    fn client_name_override() {
        let params = default_initialize_params(Some("test-client"));
        assert_eq!(params.client_info.name, "test-client");
        assert_eq!(params.protocol_version, crate::types::MCP_VERSION);
    }
}
