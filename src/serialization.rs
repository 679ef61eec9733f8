use crate::descriptor::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// A built-in option value in its natural JSON/YAML shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
}

impl From<&OptionLiteral> for Value {
    fn from(literal: &OptionLiteral) -> Self {
        match literal {
            OptionLiteral::Identifier(v) if v == "true" => Value::Boolean(true),
            OptionLiteral::Identifier(v) if v == "false" => Value::Boolean(false),
            OptionLiteral::Identifier(v) => Value::String(v.clone()),
            OptionLiteral::Integer(i) => i64::try_from(*i).map_or_else(|_| Value::String(i.to_string()), Value::Integer),
            OptionLiteral::Float(f) => Value::Number(*f),
            OptionLiteral::String(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionsView {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub builtins: BTreeMap<String, Value>,
    /// Wire-format bytes of the custom options, hex encoded.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extension_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub syntax: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub public_dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<FieldView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub name: String,
    pub full_name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<MessageView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<FieldView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub oneofs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extension_ranges: Vec<(i32, i32)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved_ranges: Vec<(i32, i32)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldView {
    pub name: String,
    pub number: i32,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub ty: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extendee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub json_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneof_index: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub proto3_optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumView {
    pub name: String,
    pub full_name: String,
    pub values: Vec<EnumValueView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumValueView {
    pub name: String,
    pub number: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub full_name: String,
    pub methods: Vec<MethodView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodView {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub client_streaming: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub server_streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsView>,
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn options_view(options: Option<&OptionsNode>) -> Option<OptionsView> {
    let options = options.filter(|o| !o.builtins.is_empty() || !o.extension_data.is_empty())?;
    Some(OptionsView {
        builtins: options
            .builtins
            .iter()
            .map(|b| (b.name.clone(), Value::from(&b.value)))
            .collect(),
        extension_data: hex(&options.extension_data),
    })
}

fn ranges(ranges: impl Iterator<Item = NumberRange>) -> Vec<(i32, i32)> {
    ranges.map(|r| (r.start, r.end)).collect()
}

pub(crate) fn file_view(db: &Descriptors, id: FileId) -> FileView {
    let file = &db[id];
    let dependency_name = |f: &FileId| db[*f].name.clone();
    FileView {
        name: file.name.clone(),
        package: file.package.clone(),
        syntax: match &file.syntax {
            Syntax::Edition(edition) => edition.clone(),
            other => other.name().to_string(),
        },
        dependencies: file.dependencies.iter().map(dependency_name).collect(),
        public_dependencies: file
            .imports
            .iter()
            .filter(|i| i.kind == ImportKind::Public)
            .filter_map(|i| i.file.as_ref().map(dependency_name))
            .collect(),
        messages: file.messages.iter().map(|&m| message_view(db, m)).collect(),
        enums: file.enums.iter().map(|&e| enum_view(db, e)).collect(),
        services: file.services.iter().map(|&s| service_view(db, s)).collect(),
        extensions: file.extensions.iter().map(|&f| field_view(db, f)).collect(),
        options: options_view(file.options.as_ref()),
    }
}

fn message_view(db: &Descriptors, id: MessageId) -> MessageView {
    let message = &db[id];
    MessageView {
        name: message.name.clone(),
        full_name: message.full_name.clone(),
        kind: match message.kind {
            MessageKind::Message => "message",
            MessageKind::MapEntry => "map_entry",
            MessageKind::Wrapper => "wrapper",
        },
        fields: message.fields.iter().map(|&f| field_view(db, f)).collect(),
        nested: message.messages.iter().map(|&m| message_view(db, m)).collect(),
        enums: message.enums.iter().map(|&e| enum_view(db, e)).collect(),
        extensions: message.extensions.iter().map(|&f| field_view(db, f)).collect(),
        oneofs: message.oneofs.iter().map(|&o| db[o].name.clone()).collect(),
        extension_ranges: ranges(message.extension_ranges.iter().map(|r| r.range)),
        reserved_ranges: ranges(message.reserved_ranges.iter().copied()),
        reserved_names: message.reserved_names.clone(),
        options: options_view(message.options.as_ref()),
    }
}

fn field_view(db: &Descriptors, id: FieldId) -> FieldView {
    let field = &db[id];
    FieldView {
        name: field.name.clone(),
        number: field.number,
        label: field.label.name(),
        ty: field.ty.name(),
        type_name: field.type_name.clone(),
        extendee: field.extendee.clone(),
        default_value: field.default_value.clone(),
        json_name: field.effective_json_name(),
        oneof_index: field.oneof_index,
        proto3_optional: field.proto3_optional,
        options: options_view(field.options.as_ref()),
    }
}

fn enum_view(db: &Descriptors, id: EnumId) -> EnumView {
    let node = &db[id];
    EnumView {
        name: node.name.clone(),
        full_name: node.full_name.clone(),
        values: node
            .values
            .iter()
            .map(|&v| EnumValueView {
                name: db[v].name.clone(),
                number: db[v].number,
                options: options_view(db[v].options.as_ref()),
            })
            .collect(),
        options: options_view(node.options.as_ref()),
    }
}

fn service_view(db: &Descriptors, id: ServiceId) -> ServiceView {
    let service = &db[id];
    ServiceView {
        name: service.name.clone(),
        full_name: service.full_name.clone(),
        methods: service
            .methods
            .iter()
            .map(|&m| {
                let method = &db[m];
                MethodView {
                    name: method.name.clone(),
                    input_type: method.input_type.clone(),
                    output_type: method.output_type.clone(),
                    client_streaming: method.client_streaming,
                    server_streaming: method.server_streaming,
                    options: options_view(method.options.as_ref()),
                }
            })
            .collect(),
        options: options_view(service.options.as_ref()),
    }
}
