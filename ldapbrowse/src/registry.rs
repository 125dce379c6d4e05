//! Session registry: the named directory sessions of one user context.
//!
//! The registry is driven by a single logical UI session and mutated
//! only through its own methods; it is not a concurrent map. The
//! sessions it hands out are `Arc`-shared and serialize their own
//! operations internally, so distinct sessions may run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::error::{DirectoryError, Result};
use crate::session::DirectorySession;
use crate::settings::ConnectionSettings;

/// One registered session: display name, the settings it was created
/// from, and the session itself.
pub struct RegisteredSession {
    pub name: String,
    pub settings: ConnectionSettings,
    pub session: Arc<DirectorySession>,
}

/// Named directory sessions keyed by short random ids, with one
/// tracked "active" session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, RegisteredSession>,
    active: Option<String>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry::default()
    }

    /// Create a session, connect it, and register it. The new session
    /// becomes active. Nothing is registered when the connect fails.
    pub fn connect(&mut self, settings: ConnectionSettings) -> Result<String> {
        let session = Arc::new(DirectorySession::new());
        session.connect(settings.clone())?;
        Ok(self.add(settings, session))
    }

    /// Register an existing session under a fresh id and make it
    /// active. Returns the id.
    pub fn add(&mut self, settings: ConnectionSettings, session: Arc<DirectorySession>) -> String {
        let id = self.fresh_id();
        let name = settings.display_name();
        info!("registered session {} ({})", id, name);
        self.sessions.insert(
            id.clone(),
            RegisteredSession {
                name,
                settings,
                session,
            },
        );
        self.active = Some(id.clone());
        id
    }

    /// Replace a session with a fresh one connected from its saved
    /// settings.
    pub fn reconnect(&mut self, id: &str) -> Result<()> {
        let entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| DirectoryError::OperationFailed(format!("no such session: {}", id)))?;
        let session = Arc::new(DirectorySession::new());
        session.connect(entry.settings.clone())?;
        entry.session = session;
        Ok(())
    }

    /// Disconnect and drop a session. When the active session is
    /// removed, an arbitrary remaining session becomes active, or none
    /// when the registry is left empty.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(entry) = self.sessions.remove(id) else {
            return false;
        };
        entry.session.disconnect();
        if self.active.as_deref() == Some(id) {
            self.active = self.sessions.keys().next().cloned();
        }
        true
    }

    /// Mark a session active. Returns false for an unknown id.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.sessions.contains_key(id) {
            self.active = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&RegisteredSession> {
        self.sessions.get(self.active.as_deref()?)
    }

    /// Shared handle to the active session, for callers that outlive a
    /// registry borrow.
    pub fn active_session(&self) -> Option<Arc<DirectorySession>> {
        self.active().map(|entry| Arc::clone(&entry.session))
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredSession> {
        self.sessions.get(id)
    }

    /// All registered sessions as `(id, entry)` pairs, in no particular
    /// order.
    pub fn sessions(&self) -> impl Iterator<Item = (&str, &RegisteredSession)> {
        self.sessions.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn fresh_id(&self) -> String {
        let mut id = random_token();
        let mut n = self.sessions.len();
        while self.sessions.contains_key(&id) {
            id = format!("{}{:x}", random_token(), n);
            n += 1;
        }
        id
    }
}

/// Short random hex token used as a session id.
fn random_token() -> String {
    let mut bytes = [0u8; 4];
    #[cfg(target_family = "unix")]
    {
        use std::io::Read;
        if let Ok(mut f) = std::fs::File::open("/dev/urandom") {
            let _ = f.read_exact(&mut bytes);
        }
    }
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(registry: &mut SessionRegistry, server: &str) -> String {
        registry.add(
            ConnectionSettings::new(server),
            Arc::new(DirectorySession::new()),
        )
    }

    #[test]
    fn add_makes_session_active() {
        let mut registry = SessionRegistry::new();
        assert!(registry.active_id().is_none());

        let a = register(&mut registry, "one.example.com");
        assert_eq!(registry.active_id(), Some(a.as_str()));

        let b = register(&mut registry, "two.example.com");
        assert_eq!(registry.active_id(), Some(b.as_str()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn name_comes_from_settings() {
        let mut registry = SessionRegistry::new();
        let mut settings = ConnectionSettings::new("ldap.example.com");
        settings.name = Some("Lab".to_string());
        let id = registry.add(settings, Arc::new(DirectorySession::new()));
        assert_eq!(registry.get(&id).unwrap().name, "Lab");
    }

    #[test]
    fn removing_active_promotes_remaining() {
        let mut registry = SessionRegistry::new();
        let a = register(&mut registry, "one.example.com");
        let b = register(&mut registry, "two.example.com");

        assert!(registry.remove(&b));
        assert_eq!(registry.active_id(), Some(a.as_str()));
    }

    #[test]
    fn removing_last_clears_active() {
        let mut registry = SessionRegistry::new();
        let a = register(&mut registry, "one.example.com");
        assert!(registry.remove(&a));
        assert!(registry.active_id().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_inactive_keeps_active() {
        let mut registry = SessionRegistry::new();
        let a = register(&mut registry, "one.example.com");
        let b = register(&mut registry, "two.example.com");
        assert_eq!(registry.active_id(), Some(b.as_str()));

        assert!(registry.remove(&a));
        assert_eq!(registry.active_id(), Some(b.as_str()));
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let mut registry = SessionRegistry::new();
        let a = register(&mut registry, "one.example.com");
        assert!(!registry.remove("nope"));
        assert_eq!(registry.active_id(), Some(a.as_str()));
    }

    #[test]
    fn set_active_validates_id() {
        let mut registry = SessionRegistry::new();
        let a = register(&mut registry, "one.example.com");
        let b = register(&mut registry, "two.example.com");

        assert!(registry.set_active(&a));
        assert_eq!(registry.active_id(), Some(a.as_str()));
        assert!(!registry.set_active("nope"));
        assert_eq!(registry.active_id(), Some(a.as_str()));
        let _ = b;
    }

    #[test]
    fn ids_are_unique() {
        let mut registry = SessionRegistry::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..32 {
            let id = register(&mut registry, &format!("server{}.example.com", i));
            assert!(seen.insert(id));
        }
        assert_eq!(registry.len(), 32);
    }

    #[test]
    fn sessions_are_independent() {
        let mut registry = SessionRegistry::new();
        let a = register(&mut registry, "one.example.com");
        let b = register(&mut registry, "two.example.com");
        let sa = Arc::clone(&registry.get(&a).unwrap().session);
        let sb = Arc::clone(&registry.get(&b).unwrap().session);
        assert!(!Arc::ptr_eq(&sa, &sb));
    }
}
