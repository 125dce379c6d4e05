//! ldapbrowse: the session/query engine behind a web-based LDAP
//! directory browser.
//!
//! Connects to one or more LDAP servers, walks the directory tree, runs
//! transparently paged searches, inspects and edits entries, reads and
//! resolves schema, computes statistics, and imports/exports LDIF.
//! Rendering, navigation state and profile persistence belong to the
//! embedding application; this crate only moves directory data.
//!
//! Each [`DirectorySession`] serializes access to its one underlying
//! connection; a [`SessionRegistry`] tracks the sessions of one user
//! context and which of them is active.

pub mod data;
pub mod error;
pub mod ldif;
pub mod password;
pub mod registry;
pub mod schema;
pub mod session;
pub mod settings;

pub use data::{
    Attribute, ChangeType, DirectoryEntry, LdapModification, LdifOperation, LdifOutcome, ModOp,
};
pub use error::{DirectoryError, Result};
pub use ldif::{apply_ldif, entries_to_ldif, entry_to_ldif, parse_ldif};
pub use password::{hash_password, HashAlgorithm};
pub use registry::{RegisteredSession, SessionRegistry};
pub use schema::{parse_schema_item, typical_rdn_attribute, Schema, SchemaItem};
pub use session::DirectorySession;
pub use settings::ConnectionSettings;
