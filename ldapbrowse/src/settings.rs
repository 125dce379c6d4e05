//! Connection profiles.

use serde::{Deserialize, Serialize};

/// How to reach one LDAP server.
///
/// Immutable once a session has been created from it; reconnecting
/// builds a fresh session from the saved value. The embedding
/// application persists profiles as JSON (camelCase keys); this crate
/// only produces and consumes the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Display label; falls back to the server host when empty.
    #[serde(default)]
    pub name: Option<String>,
    /// Server hostname or IP address.
    pub server: String,
    /// Server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Search root, e.g. `dc=example,dc=com`.
    #[serde(default)]
    pub base_dn: String,
    /// Bind DN; anonymous bind when absent.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Connect over LDAPS.
    #[serde(default)]
    pub use_ssl: bool,
    /// Upgrade a plain connection with StartTLS.
    #[serde(default)]
    pub use_start_tls: bool,
}

fn default_port() -> u16 {
    389
}

impl ConnectionSettings {
    /// A minimal profile for the given host, everything else defaulted.
    pub fn new(server: impl Into<String>) -> ConnectionSettings {
        ConnectionSettings {
            name: None,
            server: server.into(),
            port: default_port(),
            base_dn: String::new(),
            username: None,
            password: None,
            use_ssl: false,
            use_start_tls: false,
        }
    }

    /// Connection URL, `ldaps://` when SSL is requested.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.server, self.port)
    }

    /// Label shown for this profile: the name when set and non-empty,
    /// the server host otherwise.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.server.clone(),
        }
    }
}
