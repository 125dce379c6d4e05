//! LDIF codec: RFC 2849-flavored, deliberately tolerant.
//!
//! The parser is a line scanner over whole blocks of text, not a strict
//! grammar: comment lines are dropped, lines without a colon are
//! skipped, an unrecognized changetype falls back to Add, a base64
//! value that fails to decode keeps its raw text, and a block without a
//! `dn:` line is dropped entirely. Imperfect server and tool output
//! must still import.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::data::{
    binary_placeholder, is_binary_placeholder, Attribute, ChangeType, DirectoryEntry,
    LdapModification, LdifOperation, LdifOutcome, ModOp,
};
use crate::session::DirectorySession;

/// Parse LDIF text into change operations, in input order.
///
/// Input order is application order: later operations may depend on
/// earlier ones (a parent created before its children), so callers must
/// not reorder the result.
pub fn parse_ldif(text: &str) -> Vec<LdifOperation> {
    let mut operations = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !block.is_empty() {
                operations.extend(parse_block(&block));
                block.clear();
            }
        } else {
            block.push(line);
        }
    }
    if !block.is_empty() {
        operations.extend(parse_block(&block));
    }

    operations
}

/// Parse one blank-line-delimited block. Returns `None` for blocks
/// without a `dn:` line.
fn parse_block(lines: &[&str]) -> Option<LdifOperation> {
    let mut dn: Option<String> = None;
    let mut change_type = ChangeType::Add;
    let mut attributes: Vec<Attribute> = Vec::new();
    let mut modifications: Vec<LdapModification> = Vec::new();
    let mut open: Option<LdapModification> = None;

    for line in lines {
        if line.starts_with('#') {
            continue;
        }
        if line.trim() == "-" {
            if let Some(m) = open.take() {
                modifications.push(m);
            }
            continue;
        }
        let Some((key, value)) = split_line(line) else {
            continue;
        };

        if key.eq_ignore_ascii_case("dn") {
            dn = Some(value);
        } else if key.eq_ignore_ascii_case("changetype") {
            change_type = match value.to_ascii_lowercase().as_str() {
                "modify" => ChangeType::Modify,
                "delete" => ChangeType::Delete,
                // "add" and anything unrecognized
                _ => ChangeType::Add,
            };
        } else if change_type == ChangeType::Modify {
            if let Some(m) = open.as_mut() {
                if key.eq_ignore_ascii_case(&m.attribute) {
                    m.values.push(value);
                    continue;
                }
            }
            let op = match key.to_ascii_lowercase().as_str() {
                "add" => Some(ModOp::Add),
                "replace" => Some(ModOp::Replace),
                "delete" => Some(ModOp::Delete),
                // Stray line inside a modify block: skipped.
                _ => None,
            };
            if let Some(op) = op {
                // A new operation line implicitly closes an open one
                // whose trailing "-" was omitted.
                if let Some(m) = open.take() {
                    modifications.push(m);
                }
                open = Some(LdapModification {
                    op,
                    attribute: value,
                    values: Vec::new(),
                });
            }
        } else {
            match attributes.iter_mut().find(|a| a.name.eq_ignore_ascii_case(key)) {
                Some(attr) => attr.values.push(value),
                None => attributes.push(Attribute::with_values(key, vec![value])),
            }
        }
    }

    // Flush a modification left open at block end.
    if let Some(m) = open.take() {
        modifications.push(m);
    }

    Some(LdifOperation {
        dn: dn?,
        change_type,
        attributes,
        modifications,
    })
}

/// Split one LDIF line at the first colon. `attr:: <b64>` values are
/// base64-decoded; decode failure keeps the raw text, and decoded bytes
/// that are not UTF-8 become a binary placeholder.
fn split_line(line: &str) -> Option<(&str, String)> {
    let (key, rest) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    if let Some(encoded) = rest.strip_prefix(':') {
        let encoded = encoded.trim();
        let value = match STANDARD.decode(encoded) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => binary_placeholder(err.as_bytes().len()),
            },
            Err(_) => encoded.to_string(),
        };
        Some((key, value))
    } else {
        Some((key, rest.trim().to_string()))
    }
}

/// Apply parsed operations against a session, strictly in order.
///
/// Each operation's outcome is captured independently; a failure is
/// recorded and the batch continues, so the result always carries one
/// outcome per input operation in input order.
pub fn apply_ldif(session: &DirectorySession, operations: &[LdifOperation]) -> Vec<LdifOutcome> {
    operations
        .iter()
        .map(|operation| {
            let result = match operation.change_type {
                ChangeType::Add => session.create_entry(&operation.dn, &operation.attributes),
                ChangeType::Modify => {
                    session.modify_entry(&operation.dn, &operation.modifications)
                }
                ChangeType::Delete => session.delete_entry(&operation.dn),
            };
            match result {
                Ok(()) => LdifOutcome {
                    dn: operation.dn.clone(),
                    change_type: operation.change_type,
                    success: true,
                    error: None,
                },
                Err(err) => LdifOutcome {
                    dn: operation.dn.clone(),
                    change_type: operation.change_type,
                    success: false,
                    error: Some(err.to_string()),
                },
            }
        })
        .collect()
}

/// Serialize one entry as an LDIF block, attributes sorted by name.
///
/// Binary placeholder values are emitted as a valueless base64 marker
/// line (`attr:: `), since the original bytes were never retained.
pub fn entry_to_ldif(entry: &DirectoryEntry) -> String {
    let mut out = String::new();
    out.push_str("dn: ");
    out.push_str(&entry.dn);
    out.push('\n');

    let mut attributes: Vec<&Attribute> = entry.attributes.iter().collect();
    attributes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    for attribute in attributes {
        for value in &attribute.values {
            if is_binary_placeholder(value) {
                out.push_str(&format!("{}:: \n", attribute.name));
            } else {
                out.push_str(&format!("{}: {}\n", attribute.name, value));
            }
        }
    }
    out
}

/// Serialize a sequence of entries, blocks separated by a blank line.
pub fn entries_to_ldif(entries: &[DirectoryEntry]) -> String {
    entries
        .iter()
        .map(entry_to_ldif)
        .collect::<Vec<_>>()
        .join("\n")
}
