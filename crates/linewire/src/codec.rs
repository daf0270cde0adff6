//! Message framing for newline-delimited JSON.
//!
//! One JSON-RPC message per line. [`encode`] and [`decode`] are the pure
//! single-message transforms; [`LineCodec`] plugs them into
//! `tokio_util::codec` and owns the line splitting, so callers can hand it
//! a raw byte stream that arrives in arbitrary chunks.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::DEFAULT_MAX_LINE_BYTES;
use crate::error::{WireError, WireResult};
use crate::message::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JSONRPC_VERSION,
};

/// Serialize a message to one compact JSON line with a trailing newline.
///
/// Compact serde_json output escapes control characters inside strings, so
/// the only `\n` in the result is the terminator.
pub fn encode(message: &JsonRpcMessage) -> WireResult<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| WireError::Encoding(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Convert typed params into a JSON value for a request or notification.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> WireResult<Value> {
    serde_json::to_value(value).map_err(|e| WireError::Encoding(e.to_string()))
}

/// Parse one newline-stripped line into a validated JSON-RPC message.
pub fn decode(line: &[u8]) -> WireResult<JsonRpcMessage> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = std::str::from_utf8(line)
        .map_err(|e| WireError::MalformedMessage(format!("invalid UTF-8: {e}")))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WireError::MalformedMessage("Empty message".to_string()));
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| WireError::MalformedMessage(e.to_string()))?;
    let Value::Object(envelope) = value else {
        return Err(WireError::MalformedMessage(
            "message is not a JSON object".to_string(),
        ));
    };

    match envelope.get("jsonrpc") {
        None => {
            return Err(WireError::MalformedMessage(
                "missing \"jsonrpc\" field".to_string(),
            ))
        }
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(other) => return Err(WireError::ProtocolVersion(other.to_string())),
    }

    classify(envelope)
}

fn classify(envelope: Map<String, Value>) -> WireResult<JsonRpcMessage> {
    let has_id = envelope.contains_key("id");

    if let Some(method) = envelope.get("method") {
        if !method.is_string() {
            return Err(WireError::MalformedMessage(
                "\"method\" must be a string".to_string(),
            ));
        }
        if envelope.contains_key("result") || envelope.contains_key("error") {
            return Err(WireError::MalformedMessage(
                "request carries a result or error".to_string(),
            ));
        }
        return if has_id {
            check_id(&envelope, false)?;
            from_envelope::<JsonRpcRequest>(envelope).map(JsonRpcMessage::Request)
        } else {
            from_envelope::<JsonRpcNotification>(envelope).map(JsonRpcMessage::Notification)
        };
    }

    if !has_id {
        return Err(WireError::MalformedMessage(
            "message has neither \"method\" nor \"id\"".to_string(),
        ));
    }

    match (envelope.get("result"), envelope.get("error")) {
        (Some(_), Some(_)) => Err(WireError::MalformedMessage(
            "response carries both result and error".to_string(),
        )),
        (Some(_), None) => {
            check_id(&envelope, false)?;
            from_envelope::<JsonRpcResponse>(envelope).map(JsonRpcMessage::Response)
        }
        (None, Some(error)) => {
            let well_formed = error.get("code").is_some_and(Value::is_i64)
                && error.get("message").is_some_and(Value::is_string);
            if !well_formed {
                return Err(WireError::MalformedMessage(
                    "error object needs an integer code and a string message".to_string(),
                ));
            }
            check_id(&envelope, true)?;
            from_envelope::<JsonRpcError>(envelope).map(JsonRpcMessage::Error)
        }
        (None, None) => Err(WireError::MalformedMessage(
            "response carries neither result nor error".to_string(),
        )),
    }
}

fn check_id(envelope: &Map<String, Value>, allow_null: bool) -> WireResult<()> {
    match envelope.get("id") {
        Some(Value::String(_)) => Ok(()),
        Some(Value::Number(n)) if n.is_i64() => Ok(()),
        Some(Value::Null) if allow_null => Ok(()),
        Some(other) => Err(WireError::MalformedMessage(format!(
            "invalid id {other}: expected a string or an integer"
        ))),
        None => Err(WireError::MalformedMessage("missing \"id\"".to_string())),
    }
}

fn from_envelope<T: serde::de::DeserializeOwned>(envelope: Map<String, Value>) -> WireResult<T> {
    serde_json::from_value(Value::Object(envelope))
        .map_err(|e| WireError::MalformedMessage(e.to_string()))
}

/// Newline-delimited JSON-RPC codec for `FramedRead` / `FramedWrite`.
///
/// Decoded items are themselves results: a line that fails to parse yields
/// `Ok(Some(Err(..)))` so the stream keeps going. Only I/O errors end it.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_bytes: usize,
    /// Bytes already scanned for a newline.
    next_index: usize,
    /// Dropping the tail of an oversized line until the next newline.
    discarding: bool,
}

impl LineCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = WireResult<JsonRpcMessage>;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, WireError> {
        loop {
            if self.discarding {
                match src.iter().position(|b| *b == b'\n') {
                    Some(offset) => {
                        src.advance(offset + 1);
                        self.discarding = false;
                        self.next_index = 0;
                        continue;
                    }
                    None => {
                        src.clear();
                        return Ok(None);
                    }
                }
            }

            let read_to = src.len().min(self.max_line_bytes.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match newline {
                Some(offset) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(end + 1);
                    let line = &line[..end];
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    trace!("Decoding line of {} bytes", line.len());
                    return Ok(Some(decode(line)));
                }
                None if src.len() > self.max_line_bytes => {
                    let len = src.len();
                    self.discarding = true;
                    self.next_index = 0;
                    return Ok(Some(Err(WireError::LineTooLong {
                        len,
                        max: self.max_line_bytes,
                    })));
                }
                None => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, WireError> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        self.next_index = 0;
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        let len = src.len();
        src.clear();
        Ok(Some(Err(WireError::MalformedMessage(format!(
            "truncated line: {len} bytes without a newline at end of stream"
        )))))
    }
}

impl Encoder<JsonRpcMessage> for LineCodec {
    type Error = WireError;

    fn encode(&mut self, item: JsonRpcMessage, dst: &mut BytesMut) -> Result<(), WireError> {
        let line = encode(&item)?;
        dst.reserve(line.len());
        dst.put_slice(&line);
        Ok(())
    }
}
