//! Connection lifecycle states.

use serde::Serialize;

/// `Unopened -> Open -> Closing -> Closed`. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Unopened,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether new requests and notifications may be sent.
    pub fn accepts_requests(self) -> bool {
        self == ConnectionState::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Unopened => "unopened",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
