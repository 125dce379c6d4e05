//! Directory sessions: all network interaction with one LDAP server.
//!
//! A session owns at most one live connection, guarded by a binary
//! lock: every operation holds the lock for exactly one blocking
//! request/response exchange, so no two requests ever race on the same
//! underlying connection. `test_bind` is the one exception: it opens
//! its own short-lived connection so password verification never
//! contends with, or rebinds, the primary session.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{
    LdapConn, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry, SearchOptions, SearchResult,
};
use tracing::{debug, info};

use crate::data::{binary_placeholder, Attribute, DirectoryEntry, LdapModification, ModOp};
use crate::error::{DirectoryError, Result};
use crate::password::{hash_password, HashAlgorithm};
use crate::schema::{parse_schema_item, Schema};
use crate::settings::ConnectionSettings;

/// Entries fetched per paged-search round trip.
const PAGE_SIZE: i32 = 1000;

/// RFC 4511 "no attributes" selector, used by existence/DN-only reads.
const NO_ATTRS: &str = "1.1";

const ANY_OBJECT: &str = "(objectClass=*)";

// LDAP result codes handled specially.
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_OBJECT: u32 = 32;

/// One directory session: a live connection plus the settings that
/// established it, behind a single lock.
#[derive(Default)]
pub struct DirectorySession {
    inner: Mutex<Option<Connection>>,
}

struct Connection {
    ldap: LdapConn,
    settings: ConnectionSettings,
}

impl DirectorySession {
    pub fn new() -> DirectorySession {
        DirectorySession::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one operation against the live connection, holding the
    /// session lock for the duration of the exchange.
    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let connection = guard.as_mut().ok_or(DirectoryError::NotConnected)?;
        f(connection)
    }

    /// Establish a connection from `settings`, closing any existing one
    /// first. Binds with the configured credentials when a username is
    /// present, anonymously otherwise.
    pub fn connect(&self, settings: ConnectionSettings) -> Result<()> {
        self.disconnect();

        let url = settings.url();
        let mut conn_settings = LdapConnSettings::new();
        if settings.use_start_tls {
            conn_settings = conn_settings.set_starttls(true);
        }

        let mut ldap = LdapConn::with_settings(conn_settings, &url)
            .map_err(|e| DirectoryError::ConnectFailed(format!("connect to {}: {}", url, e)))?;

        if let Some(username) = settings.username.as_deref() {
            let password = settings.password.as_deref().unwrap_or("");
            ldap.simple_bind(username, password)
                .map_err(|e| DirectoryError::ConnectFailed(format!("bind: {}", e)))?
                .success()
                .map_err(|e| DirectoryError::ConnectFailed(format!("bind: {}", e)))?;
        }

        info!("connected to {}", url);
        *self.lock() = Some(Connection { ldap, settings });
        Ok(())
    }

    /// Close the connection and clear the saved settings. Safe to call
    /// on an already-disconnected session.
    pub fn disconnect(&self) {
        if let Some(mut connection) = self.lock().take() {
            let _ = connection.ldap.unbind();
            info!("disconnected from {}", connection.settings.url());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// The settings the live connection was established from.
    pub fn settings(&self) -> Option<ConnectionSettings> {
        self.lock().as_ref().map(|c| c.settings.clone())
    }

    /// Direct children of `parent_dn`, DNs only, sorted by display name.
    pub fn get_children(&self, parent_dn: &str) -> Result<Vec<DirectoryEntry>> {
        self.with_connection(|connection| {
            debug!("one-level search under {}", parent_dn);
            let found = paged_search(
                &mut connection.ldap,
                parent_dn,
                Scope::OneLevel,
                ANY_OBJECT,
                &[NO_ATTRS],
            )?;
            let mut entries: Vec<DirectoryEntry> =
                found.into_iter().map(entry_from_search).collect();
            entries.sort_by(|a, b| a.display_name().cmp(&b.display_name()));
            Ok(entries)
        })
    }

    /// Number of direct children of `parent_dn`.
    pub fn get_child_count(&self, parent_dn: &str) -> Result<usize> {
        self.with_connection(|connection| {
            let found = paged_search(
                &mut connection.ldap,
                parent_dn,
                Scope::OneLevel,
                ANY_OBJECT,
                &[NO_ATTRS],
            )?;
            Ok(found.len())
        })
    }

    /// Whether `parent_dn` has at least one child. Short-circuits with a
    /// server-side size limit of one row; the size-limit-exceeded result
    /// the server then returns counts as success.
    pub fn has_children(&self, parent_dn: &str) -> Result<bool> {
        self.with_connection(|connection| {
            let SearchResult(entries, result) = connection
                .ldap
                .with_search_options(SearchOptions::new().sizelimit(1))
                .search(parent_dn, Scope::OneLevel, ANY_OBJECT, &[NO_ATTRS])
                .map_err(|e| {
                    DirectoryError::OperationFailed(format!("search {}: {}", parent_dn, e))
                })?;
            if result.rc != 0 && result.rc != RC_SIZE_LIMIT_EXCEEDED {
                return Err(result_error("search", parent_dn, &result));
            }
            Ok(!entries.is_empty())
        })
    }

    /// Read exactly one entry. `Ok(None)` when the server reports that
    /// the entry does not exist.
    pub fn get_entry(&self, dn: &str) -> Result<Option<DirectoryEntry>> {
        self.with_connection(|connection| {
            debug!("base read of {}", dn);
            let SearchResult(entries, result) = connection
                .ldap
                .search(dn, Scope::Base, ANY_OBJECT, &["*"])
                .map_err(|e| DirectoryError::OperationFailed(format!("read {}: {}", dn, e)))?;
            if result.rc == RC_NO_SUCH_OBJECT {
                return Ok(None);
            }
            if result.rc != 0 {
                return Err(result_error("read", dn, &result));
            }
            Ok(entries
                .into_iter()
                .next()
                .map(|raw| entry_from_search(SearchEntry::construct(raw))))
        })
    }

    /// Subtree search with a caller-supplied filter, sorted by DN.
    pub fn search(&self, base_dn: &str, filter: &str) -> Result<Vec<DirectoryEntry>> {
        self.with_connection(|connection| {
            debug!("subtree search under {} with filter {}", base_dn, filter);
            let found =
                paged_search(&mut connection.ldap, base_dn, Scope::Subtree, filter, &["*"])?;
            let mut entries: Vec<DirectoryEntry> =
                found.into_iter().map(entry_from_search).collect();
            entries.sort_by(|a, b| a.dn.cmp(&b.dn));
            Ok(entries)
        })
    }

    /// The whole subtree under `base_dn`, sorted by DN.
    pub fn get_subtree(&self, base_dn: &str) -> Result<Vec<DirectoryEntry>> {
        self.search(base_dn, ANY_OBJECT)
    }

    /// Naming contexts advertised by the root DSE, with the server's
    /// declared default context moved to the front when present.
    pub fn get_naming_contexts(&self) -> Result<Vec<String>> {
        self.with_connection(|connection| {
            let (entries, _) = connection
                .ldap
                .search(
                    "",
                    Scope::Base,
                    ANY_OBJECT,
                    &["namingContexts", "defaultNamingContext"],
                )
                .map_err(|e| DirectoryError::OperationFailed(format!("root DSE: {}", e)))?
                .success()
                .map_err(|e| DirectoryError::OperationFailed(format!("root DSE: {}", e)))?;

            let mut contexts = Vec::new();
            let mut default = None;
            for raw in entries {
                let entry = SearchEntry::construct(raw);
                for (key, values) in &entry.attrs {
                    if key.eq_ignore_ascii_case("namingContexts") {
                        contexts.extend(values.iter().cloned());
                    } else if key.eq_ignore_ascii_case("defaultNamingContext") {
                        default = values.first().cloned();
                    }
                }
            }
            if let Some(default) = default {
                if let Some(pos) = contexts.iter().position(|c| c == &default) {
                    let context = contexts.remove(pos);
                    contexts.insert(0, context);
                }
            }
            Ok(contexts)
        })
    }

    /// Read the server schema.
    ///
    /// Resolves the subschema entry DN from the root DSE (falling back
    /// to `cn=Subschema`), then reads and scans `objectClasses` and
    /// `attributeTypes` from it.
    pub fn get_schema(&self) -> Result<Schema> {
        self.with_connection(|connection| {
            let (entries, _) = connection
                .ldap
                .search("", Scope::Base, ANY_OBJECT, &["subschemaSubentry"])
                .map_err(|e| DirectoryError::OperationFailed(format!("root DSE: {}", e)))?
                .success()
                .map_err(|e| DirectoryError::OperationFailed(format!("root DSE: {}", e)))?;

            let mut subschema_dn = String::new();
            for raw in entries {
                let entry = SearchEntry::construct(raw);
                for (key, values) in &entry.attrs {
                    if key.eq_ignore_ascii_case("subschemaSubentry") {
                        if let Some(value) = values.first() {
                            subschema_dn = value.clone();
                        }
                    }
                }
            }
            if subschema_dn.is_empty() {
                // Common default when the root DSE does not advertise it.
                subschema_dn = "cn=Subschema".to_string();
            }

            debug!("reading schema from {}", subschema_dn);
            let (entries, _) = connection
                .ldap
                .search(
                    &subschema_dn,
                    Scope::Base,
                    ANY_OBJECT,
                    &["objectClasses", "attributeTypes"],
                )
                .map_err(|e| {
                    DirectoryError::OperationFailed(format!("schema {}: {}", subschema_dn, e))
                })?
                .success()
                .map_err(|e| {
                    DirectoryError::OperationFailed(format!("schema {}: {}", subschema_dn, e))
                })?;

            let mut schema = Schema::new();
            for raw in entries {
                let entry = SearchEntry::construct(raw);
                for (key, values) in &entry.attrs {
                    if key.eq_ignore_ascii_case("objectClasses") {
                        schema
                            .object_classes
                            .extend(values.iter().map(|v| parse_schema_item(v)));
                    } else if key.eq_ignore_ascii_case("attributeTypes") {
                        schema
                            .attribute_types
                            .extend(values.iter().map(|v| parse_schema_item(v)));
                    }
                }
            }
            schema.sort();
            Ok(schema)
        })
    }

    /// Verify credentials by binding on a separate, short-lived
    /// connection built from the saved server settings. The main
    /// session's connection and bind identity are untouched, and the
    /// session lock is not held during network I/O.
    pub fn test_bind(&self, user_dn: &str, password: &str) -> Result<()> {
        let settings = {
            let guard = self.lock();
            let connection = guard.as_ref().ok_or(DirectoryError::NotConnected)?;
            connection.settings.clone()
        };

        let url = settings.url();
        let mut conn_settings = LdapConnSettings::new();
        if settings.use_start_tls {
            conn_settings = conn_settings.set_starttls(true);
        }
        let mut ldap = LdapConn::with_settings(conn_settings, &url)
            .map_err(|e| DirectoryError::ConnectFailed(format!("connect to {}: {}", url, e)))?;

        let outcome = ldap
            .simple_bind(user_dn, password)
            .map_err(|e| DirectoryError::ConnectFailed(format!("bind: {}", e)))
            .and_then(|result| {
                result
                    .success()
                    .map(|_| ())
                    .map_err(|e| DirectoryError::ConnectFailed(format!("bind: {}", e)))
            });
        let _ = ldap.unbind();
        debug!("test bind for {}: {}", user_dn, outcome.is_ok());
        outcome
    }

    /// Occurrence counts per objectClass value across the subtree,
    /// counting every value of every entry.
    pub fn get_statistics(&self, base_dn: &str) -> Result<BTreeMap<String, u64>> {
        self.with_connection(|connection| {
            let found = paged_search(
                &mut connection.ldap,
                base_dn,
                Scope::Subtree,
                ANY_OBJECT,
                &["objectClass"],
            )?;
            Ok(tally_object_classes(&found))
        })
    }

    /// Occurrence counts per `ou=` RDN across the subtree. Entries whose
    /// DN carries no `ou=` component are not counted.
    pub fn get_ou_statistics(&self, base_dn: &str) -> Result<BTreeMap<String, u64>> {
        self.with_connection(|connection| {
            let found = paged_search(
                &mut connection.ldap,
                base_dn,
                Scope::Subtree,
                ANY_OBJECT,
                &[NO_ATTRS],
            )?;
            Ok(tally_ou_rdns(found.iter().map(|e| e.dn.as_str())))
        })
    }

    /// Apply an ordered list of attribute modifications as one request.
    pub fn modify_entry(&self, dn: &str, modifications: &[LdapModification]) -> Result<()> {
        let mods: Vec<Mod<String>> = modifications.iter().map(to_ldap3_mod).collect();
        self.with_connection(|connection| {
            debug!("modify {} ({} changes)", dn, mods.len());
            connection
                .ldap
                .modify(dn, mods)
                .map_err(|e| DirectoryError::OperationFailed(format!("modify {}: {}", dn, e)))?
                .success()
                .map_err(|e| DirectoryError::OperationFailed(format!("modify {}: {}", dn, e)))?;
            Ok(())
        })
    }

    /// Add a new entry with the given attributes.
    pub fn create_entry(&self, dn: &str, attributes: &[Attribute]) -> Result<()> {
        let attrs: Vec<(String, HashSet<String>)> = attributes
            .iter()
            .map(|a| (a.name.clone(), a.values.iter().cloned().collect()))
            .collect();
        self.with_connection(|connection| {
            debug!("add {}", dn);
            connection
                .ldap
                .add(dn, attrs)
                .map_err(|e| DirectoryError::OperationFailed(format!("add {}: {}", dn, e)))?
                .success()
                .map_err(|e| DirectoryError::OperationFailed(format!("add {}: {}", dn, e)))?;
            Ok(())
        })
    }

    /// Delete one entry. Not recursive: the server rejects deleting an
    /// entry that still has children.
    pub fn delete_entry(&self, dn: &str) -> Result<()> {
        self.with_connection(|connection| {
            debug!("delete {}", dn);
            connection
                .ldap
                .delete(dn)
                .map_err(|e| DirectoryError::OperationFailed(format!("delete {}: {}", dn, e)))?
                .success()
                .map_err(|e| DirectoryError::OperationFailed(format!("delete {}: {}", dn, e)))?;
            Ok(())
        })
    }

    /// Rename an entry and optionally move it under a new parent. The
    /// old RDN is removed from the entry.
    pub fn move_entry(
        &self,
        dn: &str,
        new_rdn: &str,
        new_parent_dn: Option<&str>,
    ) -> Result<()> {
        self.with_connection(|connection| {
            debug!("rename {} to {}", dn, new_rdn);
            connection
                .ldap
                .modifydn(dn, new_rdn, true, new_parent_dn)
                .map_err(|e| DirectoryError::OperationFailed(format!("rename {}: {}", dn, e)))?
                .success()
                .map_err(|e| DirectoryError::OperationFailed(format!("rename {}: {}", dn, e)))?;
            Ok(())
        })
    }

    /// Replace the entry's userPassword with a hash of `password`.
    pub fn set_password(
        &self,
        dn: &str,
        password: &str,
        algorithm: HashAlgorithm,
    ) -> Result<()> {
        let hashed = hash_password(password, algorithm);
        self.modify_entry(
            dn,
            &[LdapModification {
                op: ModOp::Replace,
                attribute: "userPassword".to_string(),
                values: vec![hashed],
            }],
        )
    }

    /// Fetch the raw first value of one attribute as bytes, bypassing
    /// the lossy text model. `Ok(None)` when the entry or the attribute
    /// is absent.
    pub fn get_binary_attribute(&self, dn: &str, attribute: &str) -> Result<Option<Vec<u8>>> {
        self.with_connection(|connection| {
            let SearchResult(entries, result) = connection
                .ldap
                .search(dn, Scope::Base, ANY_OBJECT, &[attribute])
                .map_err(|e| DirectoryError::OperationFailed(format!("read {}: {}", dn, e)))?;
            if result.rc == RC_NO_SUCH_OBJECT {
                return Ok(None);
            }
            if result.rc != 0 {
                return Err(result_error("read", dn, &result));
            }
            let Some(raw) = entries.into_iter().next() else {
                return Ok(None);
            };
            let entry = SearchEntry::construct(raw);
            for (key, values) in entry.bin_attrs {
                if key.eq_ignore_ascii_case(attribute) {
                    return Ok(values.into_iter().next());
                }
            }
            for (key, values) in entry.attrs {
                if key.eq_ignore_ascii_case(attribute) {
                    return Ok(values.into_iter().next().map(String::into_bytes));
                }
            }
            Ok(None)
        })
    }
}

impl Drop for DirectorySession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Run one search to completion through the simple paged results
/// control: request a page, append its entries, and repeat with the
/// returned cookie until the server hands back an empty (or no) cookie.
/// Keeps per-round-trip memory bounded to one page while lifting the
/// server's per-request size cap.
fn paged_search(
    ldap: &mut LdapConn,
    base: &str,
    scope: Scope,
    filter: &str,
    attrs: &[&str],
) -> Result<Vec<SearchEntry>> {
    let mut entries = Vec::new();
    let mut cookie = Vec::new();

    loop {
        let control: RawControl = PagedResults {
            size: PAGE_SIZE,
            cookie: std::mem::take(&mut cookie),
        }
        .into();
        let (page, result) = ldap
            .with_controls(control)
            .search(base, scope, filter, attrs)
            .map_err(|e| DirectoryError::OperationFailed(format!("search {}: {}", base, e)))?
            .success()
            .map_err(|e| DirectoryError::OperationFailed(format!("search {}: {}", base, e)))?;

        entries.extend(page.into_iter().map(SearchEntry::construct));

        cookie = page_cookie(&result);
        if cookie.is_empty() {
            break;
        }
    }

    Ok(entries)
}

/// The paging cookie from a search response, empty when the response
/// carries no paged results control (servers without paging support).
fn page_cookie(result: &LdapResult) -> Vec<u8> {
    for control in &result.ctrls {
        if let Control(Some(ControlType::PagedResults), raw) = control {
            return raw.parse::<PagedResults>().cookie;
        }
    }
    Vec::new()
}

/// Convert an `ldap3` search result into the text entry model. Values
/// that did not decode as UTF-8 arrive in `bin_attrs` and are replaced
/// by length-carrying placeholders.
fn entry_from_search(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes: Vec<Attribute> = Vec::new();
    for (name, values) in entry.attrs {
        attributes.push(Attribute { name, values });
    }
    for (name, values) in entry.bin_attrs {
        let values = values
            .into_iter()
            .map(|value| binary_placeholder(value.len()))
            .collect();
        attributes.push(Attribute { name, values });
    }
    // ldap3 hands attributes back in hash-map order, which varies from
    // call to call; sort for stable display and export.
    attributes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    DirectoryEntry {
        dn: entry.dn,
        attributes,
    }
}

fn to_ldap3_mod(modification: &LdapModification) -> Mod<String> {
    let values: HashSet<String> = modification.values.iter().cloned().collect();
    match modification.op {
        ModOp::Add => Mod::Add(modification.attribute.clone(), values),
        ModOp::Replace => Mod::Replace(modification.attribute.clone(), values),
        ModOp::Delete => Mod::Delete(modification.attribute.clone(), values),
    }
}

fn result_error(action: &str, target: &str, result: &LdapResult) -> DirectoryError {
    DirectoryError::OperationFailed(format!(
        "{} {}: {} {}",
        action, target, result.rc, result.text
    ))
}

fn tally_object_classes(entries: &[SearchEntry]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        for (key, values) in &entry.attrs {
            if key.eq_ignore_ascii_case("objectClass") {
                for value in values {
                    *counts.entry(value.clone()).or_insert(0) += 1;
                }
            }
        }
    }
    counts
}

fn tally_ou_rdns<'a>(dns: impl Iterator<Item = &'a str>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for dn in dns {
        let component = dn
            .split(',')
            .map(str::trim)
            .find(|c| c.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("ou=")));
        if let Some(component) = component {
            *counts.entry(component.to_string()).or_insert(0) += 1;
        }
    }
    counts
}
