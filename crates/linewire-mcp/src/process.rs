//! Launching an MCP server as a child process and talking to it over stdio.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use linewire::{Connection, ConnectionBuilder};

use crate::config::ServerCommand;
use crate::types::{McpError, McpResult};

/// A running server with a connection over its stdin/stdout. The server's
/// stderr goes straight to ours.
pub struct ServerProcess {
    command: ServerCommand,
    child: Child,
    connection: Connection,
}

impl ServerProcess {
    /// Spawn `command` and open a connection on its pipes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(command: &ServerCommand, builder: ConnectionBuilder) -> McpResult<Self> {
        tracing::info!("Starting server: {command}");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Process(format!("failed to start `{command}`: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Process("child stdin was not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Process("child stdout was not piped".into()))?;

        let connection = builder.open(stdout, stdin);
        tracing::debug!(connection = %connection.id(), pid = ?child.id(), "Server started");

        Ok(Self {
            command: command.clone(),
            child,
            connection,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn command(&self) -> &ServerCommand {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Close the connection so the server sees EOF on stdin, wait up to
    /// `grace` for it to exit, then kill it. Closing the connection is held
    /// to `grace` too, so a server that stopped reading still gets killed.
    pub async fn shutdown(mut self, grace: Duration) -> McpResult<ExitStatus> {
        if tokio::time::timeout(grace, self.connection.close()).await.is_err() {
            tracing::warn!("Connection did not close within {grace:?}");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::info!("Server exited with {status}");
                Ok(status)
            }
            Err(_) => {
                tracing::warn!("Server did not exit within {grace:?}, killing it");
                self.child
                    .kill()
                    .await
                    .map_err(|e| McpError::Process(format!("failed to kill server: {e}")))?;
                Ok(self.child.wait().await?)
            }
        }
    }
}

impl std::fmt::Debug for ServerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProcess")
            .field("command", &self.command.to_string())
            .field("pid", &self.pid())
            .field("connection", &self.connection)
            .finish()
    }
}
