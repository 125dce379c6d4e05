//! Schema model: objectClass/attributeType definitions and the derived
//! attribute queries driven by them.
//!
//! Definitions are kept as the raw description strings the server
//! returned and re-scanned on demand. The scanner is a tolerant
//! best-effort reader of the `( <oid> NAME '<name>' DESC '<desc>' ... )`
//! shape, not an RFC 4512 grammar: malformed definitions degrade to
//! partial items instead of failing the schema read.

use std::collections::{BTreeSet, HashSet};

/// One objectClass or attributeType definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaItem {
    pub name: String,
    pub oid: Option<String>,
    pub description: Option<String>,
    /// Raw definition string, kept for lazy MUST/MAY/SUP extraction.
    pub definition: String,
}

/// The schema advertised by one server: objectClasses and
/// attributeTypes, each sorted case-insensitively by name after load.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub object_classes: Vec<SchemaItem>,
    pub attribute_types: Vec<SchemaItem>,
}

/// Scan one schema description string into a `SchemaItem`.
///
/// Extracts the first quoted name after the `NAME ` token (a
/// parenthesized `NAME ( 'a' 'b' )` list yields the first name), the
/// leading OID when it looks numeric (contains a `.`), and the quoted
/// text after `DESC '`. A nameless item falls back to the OID, then to
/// `"unknown"`.
pub fn parse_schema_item(definition: &str) -> SchemaItem {
    let trimmed = definition.trim_start();
    let oid = trimmed.strip_prefix('(').and_then(|body| {
        let token = body.split_whitespace().next()?;
        // Numeric OIDs contain dots; bare keywords do not. An OID-less
        // definition starting with a dotted token misparses here; that
        // behavior is long-standing and kept as-is.
        if token.contains('.') {
            Some(token.to_string())
        } else {
            None
        }
    });

    let name = definition
        .find("NAME ")
        .and_then(|i| first_quoted(&definition[i + 5..]));

    let description = definition.find("DESC '").and_then(|i| {
        let rest = &definition[i + 6..];
        rest.find('\'').map(|end| rest[..end].to_string())
    });

    let name = name
        .or_else(|| oid.clone())
        .unwrap_or_else(|| "unknown".to_string());

    SchemaItem {
        name,
        oid,
        description,
        definition: definition.to_string(),
    }
}

/// Text between the first quote pair in `s`, if any.
fn first_quoted(s: &str) -> Option<String> {
    let start = s.find('\'')? + 1;
    let rest = &s[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

/// Extract the value list following `keyword` in a definition string.
///
/// The keyword must appear as a space-delimited token. A parenthesized
/// `( a $ b )` list splits on `$`; a bare value runs to the next space
/// or closing parenthesis. Absent keyword yields an empty list.
pub fn extract_keyword_list(definition: &str, keyword: &str) -> Vec<String> {
    let needle = format!(" {} ", keyword);
    let Some(at) = definition.find(&needle) else {
        return Vec::new();
    };
    let rest = definition[at + needle.len()..].trim_start();

    if let Some(body) = rest.strip_prefix('(') {
        let body = match body.find(')') {
            Some(end) => &body[..end],
            None => body,
        };
        body.split('$')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    } else {
        let end = rest
            .find(|c: char| c == ' ' || c == ')')
            .unwrap_or(rest.len());
        let value = rest[..end].trim();
        if value.is_empty() {
            Vec::new()
        } else {
            vec![value.to_string()]
        }
    }
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    /// Restore the ordered-by-name invariant on both lists.
    pub fn sort(&mut self) {
        self.object_classes
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        self.attribute_types
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }

    /// Case-insensitive objectClass lookup.
    pub fn find_object_class(&self, name: &str) -> Option<&SchemaItem> {
        self.object_classes
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive attributeType lookup.
    pub fn find_attribute_type(&self, name: &str) -> Option<&SchemaItem> {
        self.attribute_types
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }

    /// All attributes an entry with these objectClasses may carry:
    /// the union of MUST and MAY across each class and its SUP chain.
    /// Unknown class names are skipped. Sorted and deduplicated.
    pub fn allowed_attributes(&self, object_class_names: &[String]) -> Vec<String> {
        self.resolve_attributes(object_class_names, true)
    }

    /// Attributes an entry with these objectClasses must carry: the
    /// union of MUST across each class and its SUP chain.
    pub fn required_attributes(&self, object_class_names: &[String]) -> Vec<String> {
        self.resolve_attributes(object_class_names, false)
    }

    fn resolve_attributes(&self, object_class_names: &[String], include_may: bool) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut out = BTreeSet::new();
        for name in object_class_names {
            self.collect_attributes(name, include_may, &mut visited, &mut out);
        }
        out.into_iter().collect()
    }

    fn collect_attributes(
        &self,
        class_name: &str,
        include_may: bool,
        visited: &mut HashSet<String>,
        out: &mut BTreeSet<String>,
    ) {
        // The visited set bounds recursion: a class listing itself (or a
        // cycle) in its SUP chain is processed at most once per query.
        if !visited.insert(class_name.to_lowercase()) {
            return;
        }
        let Some(item) = self.find_object_class(class_name) else {
            return;
        };

        out.extend(extract_keyword_list(&item.definition, "MUST"));
        if include_may {
            out.extend(extract_keyword_list(&item.definition, "MAY"));
        }
        for sup in extract_keyword_list(&item.definition, "SUP") {
            self.collect_attributes(&sup, include_may, visited, out);
        }
    }
}

/// The attribute conventionally used as the RDN for well-known
/// structural objectClasses, used to suggest a default when creating
/// entries. `None` when no listed class matches.
pub fn typical_rdn_attribute(object_class_names: &[String]) -> Option<&'static str> {
    const TABLE: &[(&str, &str)] = &[
        ("inetOrgPerson", "cn"),
        ("organizationalPerson", "cn"),
        ("person", "cn"),
        ("groupOfNames", "cn"),
        ("groupOfUniqueNames", "cn"),
        ("posixGroup", "cn"),
        ("organizationalUnit", "ou"),
        ("dcObject", "dc"),
        ("domain", "dc"),
        ("organization", "o"),
        ("locality", "l"),
        ("country", "c"),
    ];
    for name in object_class_names {
        for (class, attribute) in TABLE {
            if class.eq_ignore_ascii_case(name) {
                return Some(attribute);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test fixture: top, person, organizationalPerson with a SUP chain.
    fn make_test_schema() -> Schema {
        let mut schema = Schema::new();
        schema.object_classes.push(parse_schema_item(
            "( 2.5.6.0 NAME 'top' ABSTRACT MUST objectClass )",
        ));
        schema.object_classes.push(parse_schema_item(
            "( 2.5.6.6 NAME 'person' SUP top STRUCTURAL \
             MUST ( cn $ sn ) MAY description )",
        ));
        schema.object_classes.push(parse_schema_item(
            "( 2.5.6.7 NAME 'organizationalPerson' SUP person STRUCTURAL \
             MAY title )",
        ));
        schema.sort();
        schema
    }

    fn names(list: &[String]) -> Vec<&str> {
        list.iter().map(String::as_str).collect()
    }

    // ── Group 1: definition scanner ─────────────────────────────

    #[test]
    fn parse_full_definition() {
        let item = parse_schema_item(
            "( 2.5.6.6 NAME 'person' DESC 'RFC2256: a person' SUP top STRUCTURAL \
             MUST ( sn $ cn ) )",
        );
        assert_eq!(item.name, "person");
        assert_eq!(item.oid.as_deref(), Some("2.5.6.6"));
        assert_eq!(item.description.as_deref(), Some("RFC2256: a person"));
    }

    #[test]
    fn parse_multiple_names_takes_first() {
        let item = parse_schema_item("( 2.5.4.3 NAME ( 'cn' 'commonName' ) )");
        assert_eq!(item.name, "cn");
    }

    #[test]
    fn parse_name_missing_falls_back_to_oid() {
        let item = parse_schema_item("( 1.2.3.4.5 DESC 'no name' )");
        assert_eq!(item.name, "1.2.3.4.5");
        assert_eq!(item.oid.as_deref(), Some("1.2.3.4.5"));
    }

    #[test]
    fn parse_unparseable_falls_back_to_unknown() {
        let item = parse_schema_item("garbage");
        assert_eq!(item.name, "unknown");
        assert!(item.oid.is_none());
        assert!(item.description.is_none());
    }

    #[test]
    fn parse_keyword_leading_token_is_not_an_oid() {
        // Bare keywords carry no dot and must not be taken for an OID.
        let item = parse_schema_item("( name-form NAME 'thing' )");
        assert!(item.oid.is_none());
        assert_eq!(item.name, "thing");
    }

    #[test]
    fn parse_keeps_raw_definition() {
        let raw = "( 2.5.6.0 NAME 'top' ABSTRACT MUST objectClass )";
        assert_eq!(parse_schema_item(raw).definition, raw);
    }

    // ── Group 2: keyword list extraction ────────────────────────

    #[test]
    fn keyword_list_parenthesized() {
        let list = extract_keyword_list("( 1.2.3 MUST ( sn $ cn $ uid ) )", "MUST");
        assert_eq!(names(&list), vec!["sn", "cn", "uid"]);
    }

    #[test]
    fn keyword_list_bare_token() {
        let list = extract_keyword_list("( 2.5.6.0 NAME 'top' MUST objectClass )", "MUST");
        assert_eq!(names(&list), vec!["objectClass"]);
    }

    #[test]
    fn keyword_list_bare_token_at_paren() {
        let list = extract_keyword_list("( 1.2.3 SUP top)", "SUP");
        assert_eq!(names(&list), vec!["top"]);
    }

    #[test]
    fn keyword_list_absent() {
        assert!(extract_keyword_list("( 1.2.3 NAME 'x' )", "MAY").is_empty());
    }

    // ── Group 3: attribute resolution via SUP chains ────────────

    #[test]
    fn required_attributes_follow_sup_chain() {
        let schema = make_test_schema();
        let required = schema.required_attributes(&["organizationalPerson".to_string()]);
        assert_eq!(names(&required), vec!["cn", "objectClass", "sn"]);
    }

    #[test]
    fn allowed_attributes_union_must_and_may() {
        let schema = make_test_schema();
        let allowed = schema.allowed_attributes(&["organizationalPerson".to_string()]);
        assert_eq!(
            names(&allowed),
            vec!["cn", "description", "objectClass", "sn", "title"]
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let schema = make_test_schema();
        let required = schema.required_attributes(&["PERSON".to_string()]);
        assert!(required.iter().any(|a| a == "sn"));
    }

    #[test]
    fn unknown_class_silently_skipped() {
        let schema = make_test_schema();
        let mixed = schema.required_attributes(&["bogus".to_string(), "person".to_string()]);
        assert!(mixed.iter().any(|a| a == "cn"));
        assert!(schema.required_attributes(&["bogus".to_string()]).is_empty());
    }

    #[test]
    fn self_referential_sup_terminates() {
        let mut schema = Schema::new();
        schema
            .object_classes
            .push(parse_schema_item("( 1.2.3 NAME 'loop' SUP loop MUST cn )"));
        let required = schema.required_attributes(&["loop".to_string()]);
        assert_eq!(names(&required), vec!["cn"]);
    }

    #[test]
    fn cyclic_sup_chain_terminates() {
        let mut schema = Schema::new();
        schema
            .object_classes
            .push(parse_schema_item("( 1.2.3 NAME 'a' SUP b MUST x )"));
        schema
            .object_classes
            .push(parse_schema_item("( 1.2.4 NAME 'b' SUP a MUST y )"));
        let required = schema.required_attributes(&["a".to_string()]);
        assert_eq!(names(&required), vec!["x", "y"]);
    }

    // ── Group 4: schema ordering ────────────────────────────────

    #[test]
    fn sort_is_case_insensitive() {
        let mut schema = Schema::new();
        schema.object_classes.push(parse_schema_item("( 1.1 NAME 'zebra' )"));
        schema.object_classes.push(parse_schema_item("( 1.2 NAME 'Apple' )"));
        schema.object_classes.push(parse_schema_item("( 1.3 NAME 'mango' )"));
        schema.sort();
        let order: Vec<&str> = schema.object_classes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(order, vec!["Apple", "mango", "zebra"]);
    }

    // ── Group 5: typical RDN attribute ──────────────────────────

    #[test]
    fn typical_rdn_known_classes() {
        let classes = vec!["top".to_string(), "inetOrgPerson".to_string()];
        assert_eq!(typical_rdn_attribute(&classes), Some("cn"));
        assert_eq!(
            typical_rdn_attribute(&["organizationalUnit".to_string()]),
            Some("ou")
        );
        assert_eq!(typical_rdn_attribute(&["dcObject".to_string()]), Some("dc"));
    }

    #[test]
    fn typical_rdn_unknown_class() {
        assert_eq!(typical_rdn_attribute(&["applicationProcess".to_string()]), None);
        assert_eq!(typical_rdn_attribute(&[]), None);
    }
}
