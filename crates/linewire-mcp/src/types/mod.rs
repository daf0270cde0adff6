//! MCP data types used by the client.

pub mod capabilities;
pub mod error;
pub mod request;
pub mod response;

pub use capabilities::*;
pub use error::*;
pub use request::*;
pub use response::*;
