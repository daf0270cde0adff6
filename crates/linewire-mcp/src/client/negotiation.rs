//! MCP protocol version negotiation during initialization.

use crate::types::{InitializeResult, McpError, McpResult, MCP_VERSION, SUPPORTED_VERSIONS};

/// What the server told us during `initialize`.
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    pub protocol_version: String,
    pub server: InitializeResult,
}

impl NegotiatedSession {
    /// Accept the server's answer. A version other than the one requested is
    /// only logged; an unparseable one is rejected.
    pub fn negotiate(requested: &str, result: InitializeResult) -> McpResult<Self> {
        validate_protocol_version(&result.protocol_version)?;

        if result.protocol_version != requested {
            tracing::warn!(
                "Requested protocol version {requested}, server answered {}. Proceeding with server version.",
                result.protocol_version
            );
        }
        if !SUPPORTED_VERSIONS.contains(&result.protocol_version.as_str()) {
            tracing::warn!(
                "Server protocol version {} is not one this client knows ({})",
                result.protocol_version,
                SUPPORTED_VERSIONS.join(", ")
            );
        }

        match &result.server_info {
            Some(info) => tracing::info!("Initialized with server: {} v{}", info.name, info.version),
            None => tracing::info!("Initialized with unnamed server"),
        }

        Ok(Self {
            protocol_version: result.protocol_version.clone(),
            server: result,
        })
    }

    pub fn is_latest(&self) -> bool {
        self.protocol_version == MCP_VERSION
    }
}

/// Protocol versions are dates: `YYYY-MM-DD`, year 2020 through 2030.
pub fn validate_protocol_version(version: &str) -> McpResult<()> {
    let invalid = || McpError::InvalidParams(format!("Invalid protocol version: {version:?}"));

    let parts: Vec<&str> = version.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return Err(invalid());
    };
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return Err(invalid());
    }

    let year: u32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;

    if !(2020..=2030).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(version: &str) -> InitializeResult {
        serde_json::from_value(json!({
            "protocolVersion": version,
            "capabilities": {},
            "serverInfo": { "name": "srv", "version": "1.0.0" }
        }))
        .unwrap()
    }

    #[test]
    fn accepts_known_and_dated_versions() {
        for v in SUPPORTED_VERSIONS {
            assert!(validate_protocol_version(v).is_ok());
        }
        assert!(validate_protocol_version("2029-01-31").is_ok());
    }

    #[test]
    fn rejects_malformed_versions() {
        for v in ["", "1.0", "2025-6-18", "2019-01-01", "2031-01-01", "2025-13-01", "2025-01-00", "abcd-ef-gh"] {
            assert!(validate_protocol_version(v).is_err(), "{v} should be rejected");
        }
    }

    #[test]
    fn mismatched_version_is_accepted() {
        let session = NegotiatedSession::negotiate(MCP_VERSION, result("2024-11-05")).unwrap();
        assert_eq!(session.protocol_version, "2024-11-05");
        assert!(!session.is_latest());
    }

    #[test]
    fn garbage_version_is_rejected() {
        let err = NegotiatedSession::negotiate(MCP_VERSION, result("latest")).unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
    }
}
