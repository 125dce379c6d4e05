/// Errors surfaced by directory sessions and the session registry.
///
/// Parse degradation (malformed schema definitions, bad LDIF lines,
/// undecodable binary values) is deliberately not represented here:
/// those paths fall back to partial results or placeholders instead of
/// failing the whole operation.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// A session operation was invoked with no live connection.
    #[error("not connected to a directory server")]
    NotConnected,

    /// Transport or bind failure while establishing a connection.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A request reached the server but returned an LDAP error result,
    /// or the transport broke mid-operation.
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
