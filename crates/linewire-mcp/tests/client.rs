//! McpClient against the in-process fake server.

mod common;

use serde_json::json;

use common::{connect, methods, FakeOptions};
use linewire::{ConnectionState, WireError};
use linewire_mcp::config::default_initialize_params;
use linewire_mcp::McpError;

#[tokio::test]
async fn initialize_then_sends_initialized_notification() {
    let (client, server) = connect(FakeOptions::default());

    let result = client
        .initialize(default_initialize_params(Some("test-client")))
        .await
        .unwrap();
    assert_eq!(result.protocol_version, "2025-06-18");
    assert_eq!(result.server_info.unwrap().name, "fake-everything");
    assert!(client.is_initialized().await);
    assert!(client.session().await.unwrap().is_latest());

    client.close().await;
    let received = server.finish().await;
    assert_eq!(methods(&received), ["initialize", "notifications/initialized"]);
    assert_eq!(received[0]["id"], 1);
    assert_eq!(received[0]["params"]["clientInfo"]["name"], "test-client");
    assert_eq!(
        received[0]["params"]["capabilities"],
        json!({ "tools": {}, "resources": {}, "prompts": {} })
    );
    assert!(received[1].get("id").is_none());
}

#[tokio::test]
async fn lists_require_initialize() {
    let (client, server) = connect(FakeOptions::default());

    assert!(matches!(client.list_tools().await, Err(McpError::NotInitialized)));
    assert!(matches!(
        client.call_tool("echo", None).await,
        Err(McpError::NotInitialized)
    ));

    client.close().await;
    assert!(server.finish().await.is_empty());
}

#[tokio::test]
async fn typed_lists_after_handshake() {
    let (client, server) = connect(FakeOptions::default());
    client.initialize(default_initialize_params(None)).await.unwrap();

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.tools.len(), 1);
    assert_eq!(tools.tools[0].name, "echo");
    assert_eq!(tools.tools[0].input_schema["required"], json!(["message"]));

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources.resources[0].uri, "test://static/resource/1");

    let templates = client.list_resource_templates().await.unwrap();
    assert_eq!(
        templates.resource_templates[0].uri_template,
        "test://static/resource/{id}"
    );

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts.prompts[0].name, "simple_prompt");

    client.close().await;
    let received = server.finish().await;
    for list in &received[2..] {
        assert_eq!(list["params"], json!({}));
    }
}

#[tokio::test]
async fn call_tool_echo() {
    let (client, server) = connect(FakeOptions::default());
    client.initialize(default_initialize_params(None)).await.unwrap();

    let result = client
        .call_tool("echo", Some(json!({ "message": "Hello from test client!" })))
        .await
        .unwrap();
    assert_eq!(result.text(), "Echo: Hello from test client!");
    assert!(!result.failed());

    client.close().await;
    let received = server.finish().await;
    let call = received.last().unwrap();
    assert_eq!(
        call["params"],
        json!({ "name": "echo", "arguments": { "message": "Hello from test client!" } })
    );
}

#[tokio::test]
async fn read_resource_and_get_prompt() {
    let (client, server) = connect(FakeOptions::default());
    assert!(matches!(
        client.read_resource("test://static/resource/1").await,
        Err(McpError::NotInitialized)
    ));
    client.initialize(default_initialize_params(None)).await.unwrap();

    let read = client.read_resource("test://static/resource/1").await.unwrap();
    assert_eq!(read.contents.len(), 1);
    assert_eq!(read.contents[0]["mimeType"], "text/plain");
    assert_eq!(read.text(), "Contents of test://static/resource/1");

    let simple = client.get_prompt("simple_prompt", None).await.unwrap();
    assert_eq!(simple.description.as_deref(), Some("A prompt without arguments"));
    assert_eq!(simple.messages[0]["content"]["text"], "This is a simple prompt.");

    let complex = client
        .get_prompt("complex_prompt", Some(json!({ "temperature": "0.7" })))
        .await
        .unwrap();
    assert!(complex.description.is_none());
    assert_eq!(complex.messages[0]["content"]["text"], "temperature=0.7");

    let err = client.read_resource("file:///etc/passwd").await.unwrap_err();
    assert_eq!(err.code(), -32002);
    assert!(matches!(client.read_resource("").await, Err(McpError::InvalidParams(_))));
    assert!(matches!(
        client.get_prompt("simple_prompt", Some(json!("text"))).await,
        Err(McpError::InvalidParams(_))
    ));

    client.close().await;
    let received = server.finish().await;
    assert_eq!(
        methods(&received)[2..],
        ["resources/read", "prompts/get", "prompts/get", "resources/read"]
    );
    assert_eq!(received[2]["params"], json!({ "uri": "test://static/resource/1" }));
    assert_eq!(received[3]["params"], json!({ "name": "simple_prompt" }));
    assert_eq!(
        received[4]["params"],
        json!({ "name": "complex_prompt", "arguments": { "temperature": "0.7" } })
    );
}

#[tokio::test]
async fn call_tool_validates_arguments_locally() {
    let (client, server) = connect(FakeOptions::default());
    client.initialize(default_initialize_params(None)).await.unwrap();

    let err = client.call_tool("echo", Some(json!(["not", "an", "object"]))).await;
    assert!(matches!(err, Err(McpError::InvalidParams(_))));
    let err = client.call_tool("", None).await;
    assert!(matches!(err, Err(McpError::InvalidParams(_))));

    client.close().await;
    assert_eq!(methods(&server.finish().await).len(), 2);
}

#[tokio::test]
async fn remote_errors_surface_with_their_code() {
    let (client, server) = connect(FakeOptions::default());

    let err = client.call_raw("no/such/method", None).await.unwrap_err();
    assert!(err.is_remote());
    assert_eq!(err.code(), -32601);

    client.initialize(default_initialize_params(None)).await.unwrap();
    let err = client.call_tool("missing", None).await.unwrap_err();
    assert!(matches!(
        err,
        McpError::Wire(WireError::Remote { code: -32602, .. })
    ));

    client.close().await;
    server.finish().await;
}

#[tokio::test]
async fn older_server_version_is_accepted() {
    let (client, server) = connect(FakeOptions {
        protocol_version: "2024-11-05".into(),
        ..FakeOptions::default()
    });

    let result = client.initialize(default_initialize_params(None)).await.unwrap();
    assert_eq!(result.protocol_version, "2024-11-05");
    let session = client.session().await.unwrap();
    assert_eq!(session.protocol_version, "2024-11-05");
    assert!(!session.is_latest());

    client.close().await;
    server.finish().await;
}

#[tokio::test]
async fn invalid_server_version_fails_initialize() {
    let (client, server) = connect(FakeOptions {
        protocol_version: "next".into(),
        ..FakeOptions::default()
    });

    let err = client.initialize(default_initialize_params(None)).await.unwrap_err();
    assert!(matches!(err, McpError::InvalidParams(_)));
    assert!(!client.is_initialized().await);

    client.close().await;
    assert_eq!(methods(&server.finish().await), ["initialize"]);
}

#[tokio::test]
async fn ping_and_shutdown() {
    let (client, server) = connect(FakeOptions::default());

    client.ping().await.unwrap();
    let result = client.shutdown().await.unwrap();
    assert!(result.is_null());
    assert_eq!(client.connection().state(), ConnectionState::Closing);

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, McpError::Wire(WireError::ConnectionClosed)));

    client.close().await;
    assert_eq!(client.connection().state(), ConnectionState::Closed);
    assert_eq!(methods(&server.finish().await), ["ping", "shutdown"]);
}
