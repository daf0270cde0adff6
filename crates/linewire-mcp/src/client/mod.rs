//! Typed MCP client over a [`linewire::Connection`].

pub mod negotiation;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use linewire::Connection;

use crate::types::{
    empty_params, GetPromptParams, InitializeParams, InitializeResult, ListParams, McpError,
    McpResult, PromptGetResult, PromptListResult, ReadResourceParams, ResourceListResult,
    ResourceReadResult, ResourceTemplateListResult, ShutdownParams, ToolCallParams,
    ToolCallResult, ToolListResult, MCP_VERSION,
};

pub use negotiation::{validate_protocol_version, NegotiatedSession};

pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// MCP client. Holds the connection handle and what was negotiated, so it
/// can be shared behind an `Arc`.
pub struct McpClient {
    connection: Connection,
    session: Mutex<Option<NegotiatedSession>>,
}

impl McpClient {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            session: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn session(&self) -> Option<NegotiatedSession> {
        self.session.lock().await.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Perform the handshake and return the server's result unmodified.
    ///
    /// On success the negotiated session is stored and
    /// `notifications/initialized` is sent.
    pub async fn initialize_raw(&self, params: InitializeParams) -> McpResult<Value> {
        validate_protocol_version(&params.protocol_version)?;
        if params.protocol_version != MCP_VERSION {
            tracing::debug!("Requesting non-default protocol version {}", params.protocol_version);
        }

        let raw = self
            .call_raw("initialize", Some(linewire::encode_value(&params)?))
            .await?;

        let result: InitializeResult = serde_json::from_value(raw.clone())?;
        let session = NegotiatedSession::negotiate(&params.protocol_version, result)?;
        *self.session.lock().await = Some(session);

        self.connection
            .send_notification(INITIALIZED_NOTIFICATION, None)
            .await?;
        tracing::info!(client = %params.client_info.name, "MCP handshake complete");

        Ok(raw)
    }

    pub async fn initialize(&self, params: InitializeParams) -> McpResult<InitializeResult> {
        let raw = self.initialize_raw(params).await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn list_tools(&self) -> McpResult<ToolListResult> {
        self.require_initialized().await?;
        self.call_typed("tools/list", &ListParams::default()).await
    }

    pub async fn list_resources(&self) -> McpResult<ResourceListResult> {
        self.require_initialized().await?;
        self.call_typed("resources/list", &ListParams::default()).await
    }

    pub async fn list_resource_templates(&self) -> McpResult<ResourceTemplateListResult> {
        self.require_initialized().await?;
        self.call_typed("resources/templates/list", &ListParams::default())
            .await
    }

    pub async fn list_prompts(&self) -> McpResult<PromptListResult> {
        self.require_initialized().await?;
        self.call_typed("prompts/list", &ListParams::default()).await
    }

    pub async fn read_resource(&self, uri: &str) -> McpResult<ResourceReadResult> {
        self.require_initialized().await?;
        if uri.is_empty() {
            return Err(McpError::InvalidParams("resource uri is empty".into()));
        }
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.call_typed("resources/read", &params).await
    }

    /// Render a prompt. `arguments` must be a JSON object when present.
    pub async fn get_prompt(&self, name: &str, arguments: Option<Value>) -> McpResult<PromptGetResult> {
        self.require_initialized().await?;
        check_name_and_arguments("prompt", name, arguments.as_ref())?;
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.call_typed("prompts/get", &params).await
    }

    /// Call a tool. `arguments` must be a JSON object when present.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> McpResult<ToolCallResult> {
        self.require_initialized().await?;
        check_name_and_arguments("tool", name, arguments.as_ref())?;
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        self.call_typed("tools/call", &params).await
    }

    pub async fn ping(&self) -> McpResult<()> {
        self.call_raw("ping", Some(empty_params())).await?;
        Ok(())
    }

    /// Ask the server to shut down. The connection stops accepting new
    /// requests as soon as this is sent.
    pub async fn shutdown(&self) -> McpResult<Value> {
        self.call_typed("shutdown", &ShutdownParams::default()).await
    }

    /// Send any method and return its result untouched.
    pub async fn call_raw(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        Ok(self.connection.request(method, params).await?)
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }

    async fn call_typed<P, T>(&self, method: &str, params: &P) -> McpResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let params = linewire::encode_value(params)?;
        let raw = self.call_raw(method, Some(params)).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn require_initialized(&self) -> McpResult<()> {
        if self.session.lock().await.is_some() {
            Ok(())
        } else {
            Err(McpError::NotInitialized)
        }
    }
}

fn check_name_and_arguments(kind: &str, name: &str, arguments: Option<&Value>) -> McpResult<()> {
    if name.is_empty() {
        return Err(McpError::InvalidParams(format!("{kind} name is empty")));
    }
    match arguments {
        Some(args) if !args.is_object() => Err(McpError::InvalidParams(format!(
            "{kind} arguments must be an object, got {args}"
        ))),
        _ => Ok(()),
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("connection", &self.connection)
            .finish()
    }
}
