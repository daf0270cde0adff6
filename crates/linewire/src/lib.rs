//! Newline-delimited JSON-RPC 2.0 codec and request/response correlator.

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;

pub use codec::{decode, encode, encode_value, LineCodec};
pub use config::{resolve_request_timeout, WireConfig};
pub use connection::{Connection, ConnectionBuilder, ConnectionState, PendingHandle};
pub use error::{error_codes, WireError, WireResult};
pub use message::*;
