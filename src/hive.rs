//! Custom option interpretation.
//!
//! The uninterpreted options of one options node are merged into a trie keyed by
//! name segment, so `(a).b.c` and `(a).b.d` share the `(a).b` node. Each node is
//! then resolved to a field of the running message type, and the tree is written
//! out as wire-format extension data.

use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::hierarchy::Symbol;
use crate::lexer::Token;
use crate::literal::{parse_float, parse_integer, unescape};
use crate::resolver::Resolver;
use crate::wire::{zigzag32, zigzag64, WireType, WireWriter};

#[derive(Debug, Clone, Default)]
pub struct OptionHive {
    pub name: String,
    pub is_extension: bool,
    pub token: Option<Token>,
    pub values: Vec<(OptionLiteral, Token)>,
    pub children: Vec<OptionHive>,
    /// The field this node was resolved to; `None` on the root or on failure.
    pub field: Option<FieldId>,
    /// Set when the node was given a `{ ... }` value, even an empty one.
    pub is_aggregate: bool,
}

/// A scalar encoded for one wire type.
#[derive(Debug, Clone, PartialEq)]
enum Encoded {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Bytes(Vec<u8>),
}

impl OptionHive {
    pub fn from_options(options: &[UninterpretedOption]) -> Self {
        let mut root = OptionHive::default();
        for option in options {
            root.insert(&option.name, &option.value, &option.token);
        }
        root
    }

    fn node(part: &OptionNamePart, token: &Token) -> Self {
        OptionHive {
            name: part.name.clone(),
            is_extension: part.is_extension,
            token: Some(token.clone()),
            ..OptionHive::default()
        }
    }

    fn shared_child(&mut self, part: &OptionNamePart, token: &Token) -> &mut OptionHive {
        let existing = self
            .children
            .iter()
            .position(|c| c.name == part.name && c.is_extension == part.is_extension);
        let index = match existing {
            Some(index) => index,
            None => {
                self.children.push(OptionHive::node(part, token));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    fn new_child(&mut self, part: &OptionNamePart, token: &Token) -> &mut OptionHive {
        self.children.push(OptionHive::node(part, token));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    fn insert(&mut self, path: &[OptionNamePart], value: &OptionValue, token: &Token) {
        match path.split_first() {
            Some((head, rest)) => self.shared_child(head, token).insert(rest, value, token),
            None => self.add_value(value),
        }
    }

    fn add_value(&mut self, value: &OptionValue) {
        match value {
            OptionValue::Scalar(literal, token) => self.values.push((literal.clone(), token.clone())),
            OptionValue::Aggregate(entries, _) => {
                self.is_aggregate = true;
                for entry in entries {
                    self.add_entry(&entry.name, &entry.value, &entry.token);
                }
            }
            OptionValue::List(items, _) => {
                for item in items {
                    self.add_value(item);
                }
            }
        }
    }

    /// Text-format entries: repeated scalars share a node, each message value gets its own.
    fn add_entry(&mut self, name: &OptionNamePart, value: &OptionValue, token: &Token) {
        match value {
            OptionValue::List(items, _) => {
                for item in items {
                    self.add_entry(name, item, token);
                }
            }
            OptionValue::Aggregate(..) => self.new_child(name, token).add_value(value),
            OptionValue::Scalar(..) => self.shared_child(name, token).add_value(value),
        }
    }

    // === Resolution ===

    /// Resolves every node below the root against the options message of `kind`.
    pub fn resolve_root(&mut self, resolver: &mut Resolver<'_>, file: FileId, scope: Scope, kind: OptionsKind) {
        let extendee = resolver.symbols.find_message(kind.type_name());
        self.resolve_children(resolver, file, scope, kind.type_name(), extendee, true);
    }

    fn resolve_children(
        &mut self,
        resolver: &mut Resolver<'_>,
        file: FileId,
        scope: Scope,
        extendee_name: &str,
        extendee: Option<MessageId>,
        is_root: bool,
    ) {
        for child in &mut self.children {
            let Some(token) = child.token.clone() else {
                continue;
            };
            child.field = if child.is_extension {
                resolve_extension(resolver, file, scope, &child.name, &token, extendee_name)
            } else {
                let field = extendee.and_then(|m| resolver.db.find_field_by_name(m, &child.name));
                if field.is_none() {
                    resolver.diagnostics.push(Diagnostic::error(
                        &token,
                        ErrorCode::OptionNotFound,
                        format!(
                            "option field '{}' is not a field of '{}'",
                            child.name,
                            extendee_name.trim_start_matches('.')
                        ),
                    ));
                }
                field
            };
            let Some(field) = child.field else {
                continue;
            };
            let resolved = resolver.db[field].resolved_type;
            match resolved {
                Some(TypeRef::Message(message)) => {
                    let name = resolver.db[message].full_name.clone();
                    child.resolve_children(resolver, file, scope, &name, Some(message), false);
                }
                _ if !child.children.is_empty() || child.is_aggregate => {
                    resolver.diagnostics.push(Diagnostic::error(
                        &token,
                        ErrorCode::OptionTypeMismatch,
                        format!("option field '{}' is not a message and cannot have sub-fields", child.name),
                    ));
                    child.field = None;
                }
                _ => {}
            }
        }
        if !is_root {
            let db = &*resolver.db;
            self.children
                .sort_by_key(|c| c.field.map_or(i32::MAX, |f| db[f].number));
        }
    }

    // === Emission ===

    /// Writes the resolved tree as wire-format extension data.
    pub fn serialize(&self, resolver: &mut Resolver<'_>, kind: OptionsKind) -> Vec<u8> {
        let message_set = resolver
            .symbols
            .find_message(kind.type_name())
            .is_some_and(|m| resolver.db[m].is_message_set());
        let mut out = WireWriter::new();
        self.emit_children(resolver, &mut out, message_set);
        out.into_bytes()
    }

    fn emit_children(&self, resolver: &mut Resolver<'_>, out: &mut WireWriter, message_set: bool) {
        let mut seen: Vec<FieldId> = Vec::new();
        for child in &self.children {
            let Some(field) = child.field else {
                continue;
            };
            let repeated = resolver.db[field].label == Label::Repeated;
            if !repeated && (seen.contains(&field) || child.values.len() > 1) {
                let token = child.values.get(1).map(|(_, t)| t).or(child.token.as_ref()).cloned();
                if let Some(token) = token {
                    resolver.diagnostics.push(Diagnostic::error(
                        &token,
                        ErrorCode::OptionAlreadySet,
                        format!("option field '{}' is not repeated and was set more than once", child.name),
                    ));
                }
                if seen.contains(&field) {
                    continue;
                }
            }
            seen.push(field);
            child.emit(resolver, out, field, message_set);
        }
    }

    fn emit(&self, resolver: &mut Resolver<'_>, out: &mut WireWriter, field: FieldId, parent_is_message_set: bool) {
        let node = resolver.db[field].clone();
        let number = node.number as u32;

        if let Some(TypeRef::Message(message)) = node.resolved_type {
            if let Some((literal, token)) = self.values.first() {
                resolver.diagnostics.push(Diagnostic::error(
                    token,
                    ErrorCode::OptionTypeMismatch,
                    format!(
                        "value {} is not valid for message option '{}'; use an aggregate {{ ... }}",
                        literal.describe(),
                        self.name
                    ),
                ));
                return;
            }
            let nested_message_set = resolver.db[message].is_message_set();
            let mut payload = WireWriter::new();
            self.emit_children(resolver, &mut payload, nested_message_set);
            if node.ty == FieldType::Group {
                out.write_group(number, payload.as_bytes());
            } else if parent_is_message_set && node.is_extension() {
                out.write_message_set_item(number, payload.as_bytes());
            } else {
                out.write_length_delimited(number, payload.as_bytes());
            }
            return;
        }

        let repeated = node.label == Label::Repeated;
        let packed = repeated && node.is_packed();
        let mut packed_payload = WireWriter::new();
        let limit = if repeated { self.values.len() } else { 1 };
        for (literal, token) in self.values.iter().take(limit) {
            let Some(encoded) = encode_scalar(resolver, &node, literal, token) else {
                continue;
            };
            if node.label == Label::Optional && is_default(resolver.db, &node, &encoded) {
                continue;
            }
            if packed {
                write_value(&mut packed_payload, &encoded);
            } else {
                out.write_tag(number, wire_type(&encoded));
                write_value(out, &encoded);
            }
        }
        if packed && !packed_payload.is_empty() {
            out.write_length_delimited(number, packed_payload.as_bytes());
        }
    }
}

fn resolve_extension(
    resolver: &mut Resolver<'_>,
    file: FileId,
    scope: Scope,
    name: &str,
    token: &Token,
    extendee_name: &str,
) -> Option<FieldId> {
    let field = match resolver.lookup(file, scope, name, |s| matches!(s, Symbol::Extension(_))) {
        Ok(Symbol::Extension(field)) => field,
        Ok(_) => return None,
        Err(err) => {
            resolver.report_lookup(err, token, name, "an extension", ErrorCode::OptionNotFound);
            return None;
        }
    };
    if resolver.db[field].extendee.as_deref() != Some(extendee_name) {
        resolver.diagnostics.push(Diagnostic::error(
            token,
            ErrorCode::OptionNotFound,
            format!(
                "'({name})' is not an extension of '{}'",
                extendee_name.trim_start_matches('.')
            ),
        ));
        return None;
    }
    Some(field)
}

fn mismatch(resolver: &mut Resolver<'_>, field: &FieldNode, literal: &OptionLiteral, token: &Token) {
    let type_name = match field.ty {
        FieldType::Enum => field.type_name.as_deref().unwrap_or("enum").trim_start_matches('.'),
        ty => ty.name(),
    };
    resolver.diagnostics.push(Diagnostic::error(
        token,
        ErrorCode::OptionTypeMismatch,
        format!(
            "value {} is not valid for option field '{}' of type {}",
            literal.describe(),
            field.name,
            type_name
        ),
    ));
}

fn encode_scalar(resolver: &mut Resolver<'_>, field: &FieldNode, literal: &OptionLiteral, token: &Token) -> Option<Encoded> {
    let encoded = match (field.ty, literal) {
        (ty, OptionLiteral::Integer(i)) if ty.is_integral() => {
            let (min, max) = ty.integer_bounds()?;
            if *i < min || *i > max {
                None
            } else {
                Some(match ty {
                    FieldType::Int32 | FieldType::Int64 | FieldType::Uint32 | FieldType::Uint64 => {
                        Encoded::Varint(*i as i64 as u64)
                    }
                    FieldType::Sint32 => Encoded::Varint(u64::from(zigzag32(*i as i32))),
                    FieldType::Sint64 => Encoded::Varint(zigzag64(*i as i64)),
                    FieldType::Fixed32 | FieldType::Sfixed32 => Encoded::Fixed32(*i as i32 as u32),
                    _ => Encoded::Fixed64(*i as i64 as u64),
                })
            }
        }
        (FieldType::Bool, OptionLiteral::Identifier(v)) => match v.as_str() {
            "true" => Some(Encoded::Varint(1)),
            "false" => Some(Encoded::Varint(0)),
            _ => None,
        },
        (FieldType::Float | FieldType::Double, literal) => {
            let value = match literal {
                OptionLiteral::Integer(i) => Some(*i as f64),
                OptionLiteral::Float(f) => Some(*f),
                OptionLiteral::Identifier(v) => parse_float(v),
                OptionLiteral::String(_) => None,
            };
            value.map(|v| {
                if field.ty == FieldType::Float {
                    Encoded::Fixed32((v as f32).to_bits())
                } else {
                    Encoded::Fixed64(v.to_bits())
                }
            })
        }
        (FieldType::String, OptionLiteral::String(bytes)) => {
            if std::str::from_utf8(bytes).is_err() {
                resolver.diagnostics.push(Diagnostic::warning(
                    token,
                    ErrorCode::InvalidUtf8,
                    format!("value of string option field '{}' is not valid UTF-8", field.name),
                ));
            }
            Some(Encoded::Bytes(bytes.clone()))
        }
        (FieldType::Bytes, OptionLiteral::String(bytes)) => Some(Encoded::Bytes(bytes.clone())),
        (FieldType::Enum, OptionLiteral::Identifier(v)) => match field.resolved_type {
            Some(TypeRef::Enum(enum_id)) => resolver
                .db
                .find_enum_value(enum_id, v)
                .map(|value| Encoded::Varint(i64::from(resolver.db[value].number) as u64)),
            _ => None,
        },
        _ => None,
    };
    if encoded.is_none() {
        mismatch(resolver, field, literal, token);
    }
    encoded
}

/// True when `encoded` equals the field's default: the explicit `[default = ...]`
/// if there is one, otherwise zero, `false`, empty or the first enum value.
fn is_default(db: &Descriptors, field: &FieldNode, encoded: &Encoded) -> bool {
    let default = field.default_value.as_deref();
    let expected = match field.ty {
        FieldType::Bool => match default.unwrap_or("false") {
            "true" => Encoded::Varint(1),
            "false" => Encoded::Varint(0),
            _ => return false,
        },
        FieldType::String => Encoded::Bytes(default.unwrap_or_default().as_bytes().to_vec()),
        FieldType::Bytes => match unescape(&format!("\"{}\"", default.unwrap_or_default())) {
            Ok(decoded) => Encoded::Bytes(decoded.bytes),
            Err(_) => return false,
        },
        FieldType::Float => match parse_float(default.unwrap_or("0")) {
            Some(v) => Encoded::Fixed32((v as f32).to_bits()),
            None => return false,
        },
        FieldType::Double => match parse_float(default.unwrap_or("0")) {
            Some(v) => Encoded::Fixed64(v.to_bits()),
            None => return false,
        },
        FieldType::Enum => {
            let Some(TypeRef::Enum(enum_id)) = field.resolved_type else {
                return false;
            };
            let value = match default {
                Some(name) => db.find_enum_value(enum_id, name),
                None => db[enum_id].values.first().copied(),
            };
            match value {
                Some(value) => Encoded::Varint(i64::from(db[value].number) as u64),
                None => return false,
            }
        }
        ty if ty.is_integral() => {
            let Some(i) = parse_integer(default.unwrap_or("0")) else {
                return false;
            };
            match ty {
                FieldType::Sint32 => Encoded::Varint(u64::from(zigzag32(i as i32))),
                FieldType::Sint64 => Encoded::Varint(zigzag64(i as i64)),
                FieldType::Fixed32 | FieldType::Sfixed32 => Encoded::Fixed32(i as i32 as u32),
                FieldType::Fixed64 | FieldType::Sfixed64 => Encoded::Fixed64(i as i64 as u64),
                _ => Encoded::Varint(i as i64 as u64),
            }
        }
        _ => return false,
    };
    *encoded == expected
}

fn wire_type(encoded: &Encoded) -> WireType {
    match encoded {
        Encoded::Varint(_) => WireType::Varint,
        Encoded::Fixed32(_) => WireType::Fixed32,
        Encoded::Fixed64(_) => WireType::Fixed64,
        Encoded::Bytes(_) => WireType::LengthDelimited,
    }
}

fn write_value(out: &mut WireWriter, encoded: &Encoded) {
    match encoded {
        Encoded::Varint(v) => out.write_varint(*v),
        Encoded::Fixed32(v) => out.write_fixed32(*v),
        Encoded::Fixed64(v) => out.write_fixed64(*v),
        Encoded::Bytes(b) => out.write_bytes(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn hive(source: &str) -> OptionHive {
        let (db, file, diagnostics) = parse_source(source, "test.proto");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let message = db[file].messages[0];
        let options = db[message].options.as_ref().unwrap();
        OptionHive::from_options(&options.uninterpreted)
    }

    #[test]
    fn test_shared_prefixes_collapse() {
        let root = hive("message M { option (a).b.c = 1; option (a).b.d = 2; option (z) = 3; }");
        assert_eq!(root.children.len(), 2);
        let a = &root.children[0];
        assert!(a.is_extension);
        assert_eq!(a.children.len(), 1);
        let b = &a.children[0];
        assert_eq!(b.name, "b");
        let names: Vec<&str> = b.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "d"]);
    }

    #[test]
    fn test_aggregate_entries_become_children() {
        let root = hive("message M { option (a) = { x: 1 x: 2 y { z: \"s\" } y { z: \"t\" } [e]: true }; }");
        let a = &root.children[0];
        assert!(a.is_aggregate);
        let names: Vec<(&str, bool)> = a.children.iter().map(|c| (c.name.as_str(), c.is_extension)).collect();
        assert_eq!(names, vec![("x", false), ("y", false), ("y", false), ("e", true)]);
        assert_eq!(a.children[0].values.len(), 2);
    }

    #[test]
    fn test_empty_aggregate_is_marked() {
        let root = hive("message M { option (a) = {}; }");
        assert!(root.children[0].is_aggregate);
        assert!(root.children[0].children.is_empty());
    }

    #[test]
    fn test_default_detection() {
        let (db, file, _) = parse_source("message M { optional int32 x = 1; }", "t.proto");
        let field = |ty, default: Option<&str>| {
            let mut node = db[db[db[file].messages[0]].fields[0]].clone();
            node.ty = ty;
            node.default_value = default.map(str::to_string);
            node
        };
        assert!(is_default(&db, &field(FieldType::Int32, Some("5")), &Encoded::Varint(5)));
        assert!(!is_default(&db, &field(FieldType::Int32, Some("5")), &Encoded::Varint(6)));
        assert!(!is_default(&db, &field(FieldType::Int32, Some("5")), &Encoded::Varint(0)));
        assert!(is_default(&db, &field(FieldType::Sint32, Some("-1")), &Encoded::Varint(1)));
        assert!(is_default(&db, &field(FieldType::Bytes, Some("a\\001")), &Encoded::Bytes(vec![b'a', 1])));
        assert!(is_default(&db, &field(FieldType::Double, Some("1.5")), &Encoded::Fixed64(1.5f64.to_bits())));
    }

    #[test]
    fn test_implicit_default_detection() {
        let (db, file, _) = parse_source(
            "enum E { B = 2; A = 1; } message M { optional int32 x = 1; optional E e = 2; }",
            "t.proto",
        );
        let fields = &db[db[file].messages[0]].fields;
        let node = |ty| {
            let mut node = db[fields[0]].clone();
            node.ty = ty;
            node
        };
        assert!(is_default(&db, &node(FieldType::Int32), &Encoded::Varint(0)));
        assert!(!is_default(&db, &node(FieldType::Int32), &Encoded::Varint(1)));
        assert!(is_default(&db, &node(FieldType::Bool), &Encoded::Varint(0)));
        assert!(is_default(&db, &node(FieldType::Fixed32), &Encoded::Fixed32(0)));
        assert!(is_default(&db, &node(FieldType::Float), &Encoded::Fixed32(0)));
        assert!(is_default(&db, &node(FieldType::Sfixed64), &Encoded::Fixed64(0)));
        assert!(is_default(&db, &node(FieldType::String), &Encoded::Bytes(Vec::new())));
        assert!(!is_default(&db, &node(FieldType::Bytes), &Encoded::Bytes(vec![0])));

        let mut e = db[fields[1]].clone();
        e.ty = FieldType::Enum;
        e.resolved_type = Some(TypeRef::Enum(db[file].enums[0]));
        assert!(is_default(&db, &e, &Encoded::Varint(2)));
        assert!(!is_default(&db, &e, &Encoded::Varint(1)));
        e.default_value = Some("A".to_string());
        assert!(is_default(&db, &e, &Encoded::Varint(1)));
    }
}
