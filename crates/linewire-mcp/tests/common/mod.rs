//! An in-process MCP server speaking lines over `tokio::io::duplex`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use linewire::Connection;
use linewire_mcp::McpClient;

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct FakeOptions {
    pub protocol_version: String,
    /// Answer this method with an internal error instead of a result.
    pub fail_method: Option<String>,
    /// Answer this method with the given result verbatim.
    pub override_result: Option<(String, Value)>,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            protocol_version: "2025-06-18".into(),
            fail_method: None,
            override_result: None,
        }
    }
}

pub struct FakeServer {
    received: Arc<Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Wait for the server to see EOF, then return everything it received.
    pub async fn finish(self) -> Vec<Value> {
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("fake server did not see EOF")
            .unwrap();
        self.received.lock().unwrap().clone()
    }
}

pub fn methods(received: &[Value]) -> Vec<String> {
    received
        .iter()
        .filter_map(|m| m["method"].as_str().map(String::from))
        .collect()
}

pub fn connect(options: FakeOptions) -> (McpClient, FakeServer) {
    let (client_read, server_write) = tokio::io::duplex(64 * 1024);
    let (server_read, client_write) = tokio::io::duplex(64 * 1024);

    let connection = Connection::builder()
        .request_timeout(Duration::from_secs(2))
        .open(client_read, client_write);

    let received = Arc::new(Mutex::new(Vec::new()));
    let task = tokio::spawn(serve(
        BufReader::new(server_read),
        server_write,
        options,
        received.clone(),
    ));

    (McpClient::new(connection), FakeServer { received, task })
}

async fn serve(
    reader: BufReader<tokio::io::DuplexStream>,
    mut writer: tokio::io::DuplexStream,
    options: FakeOptions,
    received: Arc<Mutex<Vec<Value>>>,
) {
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let message: Value = serde_json::from_str(&line).unwrap();
        received.lock().unwrap().push(message.clone());

        let (Some(id), Some(method)) = (message.get("id"), message["method"].as_str()) else {
            continue;
        };

        let overridden = options
            .override_result
            .as_ref()
            .filter(|(m, _)| m == method)
            .map(|(_, result)| result.clone());
        let outcome = if options.fail_method.as_deref() == Some(method) {
            Err((-32603, format!("{method} failed")))
        } else if let Some(result) = overridden {
            Ok(result)
        } else {
            answer(method, &message["params"], &options)
        };
        let reply = match outcome {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, text)) => {
                json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": text } })
            }
        };

        let mut out = serde_json::to_string(&reply).unwrap();
        out.push('\n');
        if writer.write_all(out.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn answer(method: &str, params: &Value, options: &FakeOptions) -> Result<Value, (i32, String)> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": options.protocol_version,
            "capabilities": { "tools": { "listChanged": true }, "resources": {}, "prompts": {} },
            "serverInfo": { "name": "fake-everything", "version": "0.1.0" }
        })),
        "tools/list" => Ok(json!({
            "tools": [{
                "name": "echo",
                "description": "Echoes back the input",
                "inputSchema": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }
            }]
        })),
        "resources/list" => Ok(json!({
            "resources": [{ "uri": "test://static/resource/1", "name": "Resource 1", "mimeType": "text/plain" }]
        })),
        "resources/templates/list" => Ok(json!({
            "resourceTemplates": [{ "uriTemplate": "test://static/resource/{id}", "name": "Static Resource" }]
        })),
        "prompts/list" => Ok(json!({
            "prompts": [{ "name": "simple_prompt", "description": "A prompt without arguments" }]
        })),
        "resources/read" => match params["uri"].as_str() {
            Some(uri) if uri.starts_with("test://static/resource/") => Ok(json!({
                "contents": [{ "uri": uri, "mimeType": "text/plain", "text": format!("Contents of {uri}") }]
            })),
            other => Err((-32002, format!("Resource not found: {other:?}"))),
        },
        "prompts/get" => match params["name"].as_str() {
            Some("simple_prompt") => Ok(json!({
                "description": "A prompt without arguments",
                "messages": [{ "role": "user", "content": { "type": "text", "text": "This is a simple prompt." } }]
            })),
            Some("complex_prompt") => {
                let temperature = params["arguments"]["temperature"].as_str().unwrap_or("unset");
                Ok(json!({
                    "messages": [{
                        "role": "user",
                        "content": { "type": "text", "text": format!("temperature={temperature}") }
                    }]
                }))
            }
            other => Err((-32602, format!("Unknown prompt: {other:?}"))),
        },
        "tools/call" => match params["name"].as_str() {
            Some("echo") => {
                let message = params["arguments"]["message"].as_str().unwrap_or_default();
                Ok(json!({ "content": [{ "type": "text", "text": format!("Echo: {message}") }] }))
            }
            other => Err((-32602, format!("Unknown tool: {other:?}"))),
        },
        "ping" => Ok(json!({})),
        "shutdown" => Ok(Value::Null),
        _ => Err((-32601, format!("Method not found: {method}"))),
    }
}
