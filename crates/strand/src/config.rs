//! Server configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strand_session::SessionConfig;
use strand_transport::{DEFAULT_ACCEPT_TIMEOUT, DEFAULT_BACKLOG};

use crate::StrandError;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Where a server listens and how it sets up sessions.
///
/// Loadable from JSON; every field is optional there:
///
/// ```rust
/// use strand::ServerConfig;
///
/// let config = ServerConfig::from_json(r#"{
///     "port": 7070,
///     "session": { "max_queue_size": 1000 }
/// }"#).unwrap();
/// assert_eq!(config.port, 7070);
/// assert_eq!(config.session.max_queue_size, 1000);
/// assert_eq!(config.backlog, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind. `0.0.0.0` listens on every interface.
    pub bind_address: String,

    /// Port to bind. 0 picks a free port.
    pub port: u16,

    /// Pending-connection queue length passed to `listen`.
    pub backlog: i32,

    /// Longest the listener thread waits in one accept before re-checking
    /// whether it should stop.
    pub accept_timeout: Duration,

    /// First part of every session name.
    pub session_base_name: String,

    /// Tag recorded on every session this server creates.
    pub client_type: String,

    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7070,
            backlog: DEFAULT_BACKLOG,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            session_base_name: "session".to_string(),
            client_type: "client".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self, StrandError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StrandError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StrandError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(ServerConfig::from_json("{}").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_nested_session_durations() {
        let config = ServerConfig::from_json(
            r#"{ "session": { "max_queue_grace_period": { "secs": 5, "nanos": 0 } } }"#,
        )
        .unwrap();
        assert_eq!(config.session.max_queue_grace_period, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = ServerConfig::from_json("{ port: }").unwrap_err();
        assert!(matches!(err, StrandError::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::load("/nonexistent/strand.json").unwrap_err();
        assert!(matches!(err, StrandError::ConfigFile { .. }));
    }
}
