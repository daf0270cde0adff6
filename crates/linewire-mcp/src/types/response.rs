//! MCP result types for tools, resources, and prompts.
//!
//! Servers vary in how much they send, so every optional field defaults and
//! unknown fields are kept in `extra` where losing them would matter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolListResult {
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of `tools/call`. Content items stay raw JSON so text, image and
/// embedded resource blocks all pass through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default, rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCallResult {
    /// Concatenated `text` of every text content block.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn failed(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplateDefinition {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceListResult {
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceTemplateListResult {
    #[serde(default, rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplateDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptListResult {
    #[serde(default)]
    pub prompts: Vec<PromptDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of `resources/read`. Each entry is a text or blob block, kept raw.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceReadResult {
    #[serde(default)]
    pub contents: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceReadResult {
    /// Concatenated `text` of every text block; blobs are skipped.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptGetResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_result_keeps_unknown_fields() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "Echo: hi" },
                { "type": "image", "data": "AAAA", "mimeType": "image/png" }
            ],
            "structuredContent": { "echo": "hi" }
        });
        let result: ToolCallResult = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(result.text(), "Echo: hi");
        assert!(!result.failed());
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
    }

    #[test]
    fn list_results_tolerate_sparse_entries() {
        let tools: ToolListResult =
            serde_json::from_value(json!({ "tools": [{ "name": "echo" }] })).unwrap();
        assert_eq!(tools.tools[0].name, "echo");
        assert!(tools.tools[0].input_schema.is_null());

        let templates: ResourceTemplateListResult = serde_json::from_value(json!({
            "resourceTemplates": [{ "uriTemplate": "test://static/resource/{id}", "name": "Static" }],
            "nextCursor": "abc"
        }))
        .unwrap();
        assert_eq!(templates.resource_templates.len(), 1);
        assert_eq!(templates.next_cursor.as_deref(), Some("abc"));

        let prompts: PromptListResult = serde_json::from_value(json!({})).unwrap();
        assert!(prompts.prompts.is_empty());
    }

    #[test]
    fn read_and_prompt_results_are_lenient() {
        let read: ResourceReadResult = serde_json::from_value(json!({
            "contents": [
                { "uri": "test://static/resource/1", "mimeType": "text/plain", "text": "one" },
                { "uri": "test://static/resource/2", "blob": "AAAA" },
                { "uri": "test://static/resource/3", "text": "three" }
            ]
        }))
        .unwrap();
        assert_eq!(read.contents.len(), 3);
        assert_eq!(read.text(), "one\nthree");

        let prompt: PromptGetResult = serde_json::from_value(json!({
            "messages": [{ "role": "user", "content": { "type": "text", "text": "hi" } }],
            "_meta": { "k": 1 }
        }))
        .unwrap();
        assert!(prompt.description.is_none());
        assert_eq!(prompt.messages[0]["role"], "user");
        assert_eq!(prompt.extra["_meta"], json!({ "k": 1 }));

        let empty: PromptGetResult = serde_json::from_value(json!({})).unwrap();
        assert!(empty.messages.is_empty());
    }
}
