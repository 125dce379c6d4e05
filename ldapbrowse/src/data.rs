//! Core directory data types shared by the session, schema and LDIF layers.

/// Build the placeholder stored in place of an attribute value that does
/// not decode as printable text. The raw bytes are not retained in this
/// text-oriented model; `DirectorySession::get_binary_attribute` is the
/// exact-bytes path.
pub fn binary_placeholder(len: usize) -> String {
    format!("<binary data, {} bytes>", len)
}

/// True when `value` was produced by `binary_placeholder`.
pub fn is_binary_placeholder(value: &str) -> bool {
    value.starts_with("<binary data, ") && value.ends_with(" bytes>")
}

/// One LDAP entry: a DN with named attribute values.
///
/// Attribute names compare case-insensitively. Value order within an
/// attribute is preserved as received; attribute order is normalized
/// (sorted by name) when an entry is built from a server result and on
/// LDIF export. Entries are constructed fresh from each search or read
/// result and never mutated in place; edits go through the session's
/// modify/create/delete operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

/// An attribute: a name with an ordered list of string values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> DirectoryEntry {
        DirectoryEntry {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// The value portion of the first RDN component of the DN: the text
    /// after `=` in the first comma-separated segment, or the whole
    /// segment if it carries no `=`. Recomputed on demand, never stored.
    pub fn display_name(&self) -> String {
        let first = self.dn.split(',').next().unwrap_or(&self.dn);
        match first.split_once('=') {
            Some((_, value)) => value.to_string(),
            None => first.to_string(),
        }
    }

    /// Look up an attribute by name, case-insensitively.
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Look up an attribute by name; with `create` set, a missing
    /// attribute is appended first.
    pub fn find_attribute(&mut self, name: &str, create: bool) -> Option<&mut Attribute> {
        let pos = self
            .attributes
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name));
        match pos {
            Some(i) => Some(&mut self.attributes[i]),
            None if create => {
                self.attributes.push(Attribute::new(name));
                self.attributes.last_mut()
            }
            None => None,
        }
    }

    /// First value of the named attribute, if any.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.get_attribute(name)
            .and_then(|a| a.values.first())
            .map(String::as_str)
    }

    /// Sort attributes by name, case-insensitively.
    pub fn sort_attributes(&mut self) {
        self.attributes
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Attribute {
        Attribute {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(name: impl Into<String>, values: Vec<String>) -> Attribute {
        Attribute {
            name: name.into(),
            values,
        }
    }
}

/// LDAP modification operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Replace,
    Delete,
}

/// One attribute change within a modify request.
///
/// An empty `values` list on a Delete removes every value of the
/// attribute; otherwise only the listed values are affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapModification {
    pub op: ModOp,
    pub attribute: String,
    pub values: Vec<String>,
}

impl LdapModification {
    pub fn add(attribute: impl Into<String>, value: impl Into<String>) -> LdapModification {
        LdapModification {
            op: ModOp::Add,
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn replace(attribute: impl Into<String>, value: impl Into<String>) -> LdapModification {
        LdapModification {
            op: ModOp::Replace,
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Delete one value of an attribute.
    pub fn delete(attribute: impl Into<String>, value: impl Into<String>) -> LdapModification {
        LdapModification {
            op: ModOp::Delete,
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Delete all values of an attribute.
    pub fn delete_all(attribute: impl Into<String>) -> LdapModification {
        LdapModification {
            op: ModOp::Delete,
            attribute: attribute.into(),
            values: Vec::new(),
        }
    }
}

/// Change type of one parsed LDIF block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
}

/// One parsed LDIF change block. `attributes` is populated for Add,
/// `modifications` for Modify; Delete carries only the DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdifOperation {
    pub dn: String,
    pub change_type: ChangeType,
    pub attributes: Vec<Attribute>,
    pub modifications: Vec<LdapModification>,
}

/// Outcome of applying one LDIF operation: success, or the captured
/// error message. A batch always yields one outcome per input operation,
/// in input order.
#[derive(Debug, Clone)]
pub struct LdifOutcome {
    pub dn: String,
    pub change_type: ChangeType,
    pub success: bool,
    pub error: Option<String>,
}
