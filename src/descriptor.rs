//! The descriptor model: an arena of file, message, field, enum, service, method
//! and oneof nodes. Nodes refer to each other by typed ids; parent links are plain
//! lookups into the arena, never owning references.

use crate::lexer::Token;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

macro_rules! define_id {
    ($($name:ident => $node:ident, $field:ident;)*) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);

            impl $name {
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }

            impl Index<$name> for Descriptors {
                type Output = $node;

                fn index(&self, id: $name) -> &$node {
                    &self.$field[id.index()]
                }
            }

            impl IndexMut<$name> for Descriptors {
                fn index_mut(&mut self, id: $name) -> &mut $node {
                    &mut self.$field[id.index()]
                }
            }
        )*

        /// Owns every node of every file in a compilation.
        #[derive(Debug, Default)]
        pub struct Descriptors {
            $(pub $field: Vec<$node>,)*
        }
    };
}

define_id! {
    FileId => FileNode, files;
    MessageId => MessageNode, messages;
    FieldId => FieldNode, fields;
    EnumId => EnumNode, enums;
    EnumValueId => EnumValueNode, enum_values;
    ServiceId => ServiceNode, services;
    MethodId => MethodNode, methods;
    OneofId => OneofNode, oneofs;
}

fn next_id(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl Descriptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, node: FileNode) -> FileId {
        self.files.push(node);
        FileId(next_id(self.files.len() - 1))
    }

    pub fn add_message(&mut self, node: MessageNode) -> MessageId {
        self.messages.push(node);
        MessageId(next_id(self.messages.len() - 1))
    }

    pub fn add_field(&mut self, node: FieldNode) -> FieldId {
        self.fields.push(node);
        FieldId(next_id(self.fields.len() - 1))
    }

    pub fn add_enum(&mut self, node: EnumNode) -> EnumId {
        self.enums.push(node);
        EnumId(next_id(self.enums.len() - 1))
    }

    pub fn add_enum_value(&mut self, node: EnumValueNode) -> EnumValueId {
        self.enum_values.push(node);
        EnumValueId(next_id(self.enum_values.len() - 1))
    }

    pub fn add_service(&mut self, node: ServiceNode) -> ServiceId {
        self.services.push(node);
        ServiceId(next_id(self.services.len() - 1))
    }

    pub fn add_method(&mut self, node: MethodNode) -> MethodId {
        self.methods.push(node);
        MethodId(next_id(self.methods.len() - 1))
    }

    pub fn add_oneof(&mut self, node: OneofNode) -> OneofId {
        self.oneofs.push(node);
        OneofId(next_id(self.oneofs.len() - 1))
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> {
        (0..self.files.len()).map(|i| FileId(next_id(i)))
    }

    pub fn message_ids(&self) -> impl Iterator<Item = MessageId> {
        (0..self.messages.len()).map(|i| MessageId(next_id(i)))
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> {
        (0..self.fields.len()).map(|i| FieldId(next_id(i)))
    }

    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> {
        (0..self.methods.len()).map(|i| MethodId(next_id(i)))
    }

    /// Fully-qualified name of a scope, without the leading dot (`""` for a
    /// file without a package).
    pub fn scope_name(&self, scope: Scope) -> String {
        match scope {
            Scope::File(id) => self[id].package.clone().unwrap_or_default(),
            Scope::Message(id) => self[id].full_name.trim_start_matches('.').to_string(),
        }
    }

    pub fn scope_file(&self, scope: Scope) -> FileId {
        match scope {
            Scope::File(id) => id,
            Scope::Message(id) => self[id].file,
        }
    }

    pub fn find_field_by_name(&self, message: MessageId, name: &str) -> Option<FieldId> {
        self[message].fields.iter().copied().find(|&f| {
            let field = &self[f];
            field.name == name
                || (field.ty == FieldType::Group
                    && field
                        .type_name
                        .as_deref()
                        .is_some_and(|t| t.rsplit('.').next() == Some(name)))
        })
    }

    pub fn find_field_by_number(&self, message: MessageId, number: i32) -> Option<FieldId> {
        self[message].fields.iter().copied().find(|&f| self[f].number == number)
    }

    pub fn find_enum_value(&self, id: EnumId, name: &str) -> Option<EnumValueId> {
        self[id].values.iter().copied().find(|&v| self[v].name == name)
    }
}

/// Where a node was declared: at file level or inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    File(FileId),
    Message(MessageId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
    Edition(String),
}

impl Syntax {
    pub fn name(&self) -> &str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
            Syntax::Edition(_) => "editions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Normal,
    Public,
    Weak,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub path: String,
    pub kind: ImportKind,
    pub token: Token,
    pub used: bool,
    pub file: Option<FileId>,
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: String,
    pub package: Option<String>,
    pub syntax: Syntax,
    pub messages: Vec<MessageId>,
    pub enums: Vec<EnumId>,
    pub services: Vec<ServiceId>,
    pub extensions: Vec<FieldId>,
    pub imports: Vec<Import>,
    /// Resolved imported files, in import order.
    pub dependencies: Vec<FileId>,
    pub include_in_output: bool,
    pub has_pending_imports: bool,
    pub options: Option<OptionsNode>,
    pub source: Arc<str>,
}

impl FileNode {
    pub fn new(name: &str, source: Arc<str>, include_in_output: bool) -> Self {
        FileNode {
            name: name.to_string(),
            package: None,
            syntax: Syntax::Proto2,
            messages: Vec::new(),
            enums: Vec::new(),
            services: Vec::new(),
            extensions: Vec::new(),
            imports: Vec::new(),
            dependencies: Vec::new(),
            include_in_output,
            has_pending_imports: false,
            options: None,
            source,
        }
    }
}

/// A closed range of numbers, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberRange {
    pub start: i32,
    pub end: i32,
}

impl NumberRange {
    pub fn contains(&self, number: i32) -> bool {
        self.start <= number && number <= self.end
    }

    pub fn overlaps(&self, other: &NumberRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct ExtensionRange {
    pub range: NumberRange,
    pub options: Option<OptionsNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Message,
    /// The synthetic entry type of a `map<K,V>` field.
    MapEntry,
    /// Exactly one non-repeated field, numbered 1.
    Wrapper,
}

#[derive(Debug, Clone)]
pub struct MessageNode {
    pub name: String,
    pub full_name: String,
    pub fields: Vec<FieldId>,
    pub extensions: Vec<FieldId>,
    pub messages: Vec<MessageId>,
    pub enums: Vec<EnumId>,
    pub oneofs: Vec<OneofId>,
    pub extension_ranges: Vec<ExtensionRange>,
    pub reserved_ranges: Vec<NumberRange>,
    pub reserved_names: Vec<String>,
    pub options: Option<OptionsNode>,
    pub parent: Option<Scope>,
    pub kind: MessageKind,
    pub file: FileId,
    pub token: Token,
}

impl MessageNode {
    pub fn new(name: &str, file: FileId, token: Token) -> Self {
        MessageNode {
            name: name.to_string(),
            full_name: String::new(),
            fields: Vec::new(),
            extensions: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            oneofs: Vec::new(),
            extension_ranges: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            options: None,
            parent: None,
            kind: MessageKind::Message,
            file,
            token,
        }
    }

    pub fn is_map_entry(&self) -> bool {
        self.options.as_ref().and_then(|o| o.get_bool("map_entry")) == Some(true)
    }

    pub fn is_message_set(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.get_bool("message_set_wire_format"))
            == Some(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

impl Label {
    pub fn from_keyword(text: &str) -> Option<Label> {
        match text {
            "optional" => Some(Label::Optional),
            "required" => Some(Label::Required),
            "repeated" => Some(Label::Repeated),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Required => "required",
            Label::Repeated => "repeated",
        }
    }
}

/// The declared type of a field. `MessageOrEnum` is the placeholder used between
/// parsing and resolution for a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
    MessageOrEnum,
}

impl FieldType {
    pub fn from_keyword(text: &str) -> Option<FieldType> {
        Some(match text {
            "double" => FieldType::Double,
            "float" => FieldType::Float,
            "int64" => FieldType::Int64,
            "uint64" => FieldType::Uint64,
            "int32" => FieldType::Int32,
            "fixed64" => FieldType::Fixed64,
            "fixed32" => FieldType::Fixed32,
            "bool" => FieldType::Bool,
            "string" => FieldType::String,
            "bytes" => FieldType::Bytes,
            "uint32" => FieldType::Uint32,
            "sfixed32" => FieldType::Sfixed32,
            "sfixed64" => FieldType::Sfixed64,
            "sint32" => FieldType::Sint32,
            "sint64" => FieldType::Sint64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int64 => "int64",
            FieldType::Uint64 => "uint64",
            FieldType::Int32 => "int32",
            FieldType::Fixed64 => "fixed64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Group => "group",
            FieldType::Message => "message",
            FieldType::Bytes => "bytes",
            FieldType::Uint32 => "uint32",
            FieldType::Enum => "enum",
            FieldType::Sfixed32 => "sfixed32",
            FieldType::Sfixed64 => "sfixed64",
            FieldType::Sint32 => "sint32",
            FieldType::Sint64 => "sint64",
            FieldType::MessageOrEnum => "message-or-enum",
        }
    }

    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldType::String
                | FieldType::Bytes
                | FieldType::Message
                | FieldType::Group
                | FieldType::MessageOrEnum
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            FieldType::Int64
                | FieldType::Uint64
                | FieldType::Int32
                | FieldType::Fixed64
                | FieldType::Fixed32
                | FieldType::Uint32
                | FieldType::Sfixed32
                | FieldType::Sfixed64
                | FieldType::Sint32
                | FieldType::Sint64
        )
    }

    /// Valid key types of a `map<K,V>` field.
    pub fn is_map_key(self) -> bool {
        self.is_integral() || matches!(self, FieldType::Bool | FieldType::String)
    }

    /// Inclusive value range of an integral type.
    pub fn integer_bounds(self) -> Option<(i128, i128)> {
        match self {
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => {
                Some((i32::MIN.into(), i32::MAX.into()))
            }
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
                Some((i64::MIN.into(), i64::MAX.into()))
            }
            FieldType::Uint32 | FieldType::Fixed32 => Some((0, u32::MAX.into())),
            FieldType::Uint64 | FieldType::Fixed64 => Some((0, u64::MAX.into())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Message(MessageId),
    Enum(EnumId),
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub name: String,
    pub full_name: String,
    pub number: i32,
    pub label: Label,
    pub ty: FieldType,
    /// Textual type name before resolution, fully-qualified (`.pkg.Type`) after.
    pub type_name: Option<String>,
    pub resolved_type: Option<TypeRef>,
    pub default_value: Option<String>,
    pub json_name: Option<String>,
    pub oneof_index: Option<usize>,
    pub extendee: Option<String>,
    pub resolved_extendee: Option<MessageId>,
    pub options: Option<OptionsNode>,
    pub parent: Option<Scope>,
    pub proto3_optional: bool,
    pub file: FileId,
    pub token: Token,
    pub type_token: Token,
    pub number_token: Token,
}

impl FieldNode {
    pub fn is_extension(&self) -> bool {
        self.extendee.is_some()
    }

    pub fn is_packed(&self) -> bool {
        self.options.as_ref().and_then(|o| o.get_bool("packed")) == Some(true)
    }

    pub fn effective_json_name(&self) -> String {
        self.json_name
            .clone()
            .unwrap_or_else(|| crate::utils::json_name(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct EnumNode {
    pub name: String,
    pub full_name: String,
    pub values: Vec<EnumValueId>,
    pub reserved_ranges: Vec<NumberRange>,
    pub reserved_names: Vec<String>,
    pub options: Option<OptionsNode>,
    pub parent: Option<Scope>,
    pub file: FileId,
    pub token: Token,
}

#[derive(Debug, Clone)]
pub struct EnumValueNode {
    pub name: String,
    pub full_name: String,
    pub number: i32,
    pub options: Option<OptionsNode>,
    pub parent: Option<EnumId>,
    pub file: FileId,
    pub token: Token,
    pub number_token: Token,
}

#[derive(Debug, Clone)]
pub struct ServiceNode {
    pub name: String,
    pub full_name: String,
    pub methods: Vec<MethodId>,
    pub options: Option<OptionsNode>,
    pub parent: Option<FileId>,
    pub file: FileId,
    pub token: Token,
}

#[derive(Debug, Clone)]
pub struct MethodNode {
    pub name: String,
    pub full_name: String,
    pub input_type: String,
    pub output_type: String,
    pub resolved_input: Option<MessageId>,
    pub resolved_output: Option<MessageId>,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub options: Option<OptionsNode>,
    pub parent: Option<ServiceId>,
    pub file: FileId,
    pub token: Token,
    pub input_token: Token,
    pub output_token: Token,
}

#[derive(Debug, Clone)]
pub struct OneofNode {
    pub name: String,
    pub full_name: String,
    pub fields: Vec<FieldId>,
    pub options: Option<OptionsNode>,
    pub parent: Option<MessageId>,
    /// Created for a proto3 `optional` field rather than written in source.
    pub synthetic: bool,
    pub file: FileId,
    pub token: Token,
}

/// Which descriptor options message an options node corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsKind {
    File,
    Message,
    Field,
    Oneof,
    Enum,
    EnumValue,
    Service,
    Method,
    ExtensionRange,
}

impl OptionsKind {
    /// Fully-qualified name of the options message that custom options extend.
    pub fn type_name(self) -> &'static str {
        match self {
            OptionsKind::File => ".google.protobuf.FileOptions",
            OptionsKind::Message => ".google.protobuf.MessageOptions",
            OptionsKind::Field => ".google.protobuf.FieldOptions",
            OptionsKind::Oneof => ".google.protobuf.OneofOptions",
            OptionsKind::Enum => ".google.protobuf.EnumOptions",
            OptionsKind::EnumValue => ".google.protobuf.EnumValueOptions",
            OptionsKind::Service => ".google.protobuf.ServiceOptions",
            OptionsKind::Method => ".google.protobuf.MethodOptions",
            OptionsKind::ExtensionRange => ".google.protobuf.ExtensionRangeOptions",
        }
    }

    /// The value type of a built-in (non-extension) option, if `name` is one.
    pub fn builtin(self, name: &str) -> Option<BuiltinType> {
        use BuiltinType::{Bool, Enum, Text};
        let common = match name {
            "deprecated" => Some(Bool),
            _ => None,
        };
        let specific = match self {
            OptionsKind::File => match name {
                "java_package" | "java_outer_classname" | "go_package" | "objc_class_prefix"
                | "csharp_namespace" | "swift_prefix" | "php_class_prefix" | "php_namespace"
                | "php_metadata_namespace" | "ruby_package" => Some(Text),
                "java_multiple_files" | "java_generate_equals_and_hash"
                | "java_string_check_utf8" | "cc_generic_services" | "java_generic_services"
                | "py_generic_services" | "cc_enable_arenas" => Some(Bool),
                "optimize_for" => Some(Enum(&["SPEED", "CODE_SIZE", "LITE_RUNTIME"])),
                _ => None,
            },
            OptionsKind::Message => match name {
                "message_set_wire_format" | "no_standard_descriptor_accessor" | "map_entry"
                | "deprecated_legacy_json_field_conflicts" => Some(Bool),
                _ => None,
            },
            OptionsKind::Field => match name {
                "packed" | "lazy" | "unverified_lazy" | "weak" | "debug_redact" => Some(Bool),
                "ctype" => Some(Enum(&["STRING", "CORD", "STRING_PIECE"])),
                "jstype" => Some(Enum(&["JS_NORMAL", "JS_STRING", "JS_NUMBER"])),
                _ => None,
            },
            OptionsKind::Enum => match name {
                "allow_alias" | "deprecated_legacy_json_field_conflicts" => Some(Bool),
                _ => None,
            },
            OptionsKind::EnumValue => match name {
                "debug_redact" => Some(Bool),
                _ => None,
            },
            OptionsKind::Method => match name {
                "idempotency_level" => Some(Enum(&[
                    "IDEMPOTENCY_UNKNOWN",
                    "NO_SIDE_EFFECTS",
                    "IDEMPOTENT",
                ])),
                _ => None,
            },
            OptionsKind::Oneof | OptionsKind::Service | OptionsKind::ExtensionRange => None,
        };
        specific.or(common)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinType {
    Bool,
    Text,
    Enum(&'static [&'static str]),
}

/// A literal option value as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionLiteral {
    Identifier(String),
    Integer(i128),
    Float(f64),
    String(Vec<u8>),
}

impl OptionLiteral {
    pub fn describe(&self) -> String {
        match self {
            OptionLiteral::Identifier(s) => s.clone(),
            OptionLiteral::Integer(i) => i.to_string(),
            OptionLiteral::Float(f) => f.to_string(),
            OptionLiteral::String(b) => format!("\"{}\"", crate::literal::escape_bytes(b)),
        }
    }
}

/// One segment of an option name; `(foo.bar)` segments are extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionNamePart {
    pub name: String,
    pub is_extension: bool,
}

#[derive(Debug, Clone)]
pub enum OptionValue {
    Scalar(OptionLiteral, Token),
    /// A `{ ... }` text-format block.
    Aggregate(Vec<AggregateEntry>, Token),
    /// A `[a, b]` list inside an aggregate.
    List(Vec<OptionValue>, Token),
}

impl OptionValue {
    pub fn token(&self) -> &Token {
        match self {
            OptionValue::Scalar(_, t) | OptionValue::Aggregate(_, t) | OptionValue::List(_, t) => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateEntry {
    pub name: OptionNamePart,
    pub value: OptionValue,
    pub token: Token,
}

/// A custom option not yet resolved to a concrete field.
#[derive(Debug, Clone)]
pub struct UninterpretedOption {
    pub name: Vec<OptionNamePart>,
    pub value: OptionValue,
    pub token: Token,
}

#[derive(Debug, Clone)]
pub struct BuiltinOption {
    pub name: String,
    pub value: OptionLiteral,
    pub token: Token,
}

/// Options attached to one descriptor node. Built-in options are stored typed;
/// custom options are kept uninterpreted until the option pass drains them into
/// `extension_data`, the wire-format bytes of the extension fields.
#[derive(Debug, Clone)]
pub struct OptionsNode {
    pub kind: OptionsKind,
    pub builtins: Vec<BuiltinOption>,
    pub uninterpreted: Vec<UninterpretedOption>,
    pub extension_data: Vec<u8>,
}

impl OptionsNode {
    pub fn new(kind: OptionsKind) -> Self {
        OptionsNode {
            kind,
            builtins: Vec::new(),
            uninterpreted: Vec::new(),
            extension_data: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinOption> {
        self.builtins.iter().rev().find(|b| b.name == name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name).map(|b| &b.value) {
            Some(OptionLiteral::Identifier(v)) if v == "true" => Some(true),
            Some(OptionLiteral::Identifier(v)) if v == "false" => Some(false),
            _ => None,
        }
    }

    pub fn set_bool(&mut self, name: &str, value: bool, token: Token) {
        self.builtins.retain(|b| b.name != name);
        self.builtins.push(BuiltinOption {
            name: name.to_string(),
            value: OptionLiteral::Identifier(value.to_string()),
            token,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty() && self.uninterpreted.is_empty() && self.extension_data.is_empty()
    }
}
