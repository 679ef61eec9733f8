use crate::cursor::{ParseFault, ParseResult, TokenCursor};
use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::literal::{
    escape_bytes, is_dotted_name, is_identifier, is_numeric, parse_float, parse_integer,
    parse_number_with_max, unescape, IMPLEMENTATION_RESERVED, MAX_FIELD_NUMBER,
};
use crate::utils::map_entry_name;

/// How far to skip when a production faults: to the end of the current
/// statement or past the end of the current object body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbortState {
    None,
    Statement,
    Object,
}

/// The node whose body the fill driver is currently reading.
#[derive(Debug, Clone)]
enum Container {
    File,
    Message(MessageId),
    Enum(EnumId),
    Service(ServiceId),
    Method(MethodId),
    Oneof {
        message: MessageId,
        oneof: OneofId,
        index: usize,
    },
    Extend {
        scope: Scope,
        extendee: String,
    },
}

#[derive(Debug, Clone)]
enum FieldContext {
    Message(MessageId),
    Oneof {
        message: MessageId,
        oneof: OneofId,
        index: usize,
    },
    Extension {
        scope: Scope,
        extendee: String,
    },
}

impl FieldContext {
    fn scope(&self) -> Scope {
        match self {
            FieldContext::Message(m) | FieldContext::Oneof { message: m, .. } => Scope::Message(*m),
            FieldContext::Extension { scope, .. } => *scope,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OptionsTarget {
    File,
    Message(MessageId),
    Enum(EnumId),
    Service(ServiceId),
    Method(MethodId),
    Oneof(OneofId),
}

#[derive(Debug, Clone, Copy)]
enum ReservedTarget {
    Message(MessageId),
    Enum(EnumId),
}

/// The pseudo-options `default` and `json_name`, which set field properties
/// rather than options.
#[derive(Debug, Default)]
struct FieldExtras {
    default: Option<OptionValue>,
    json_name: Option<String>,
}

/// A recursive descent parser for `.proto` files that writes straight into the
/// descriptor arena and keeps going after errors.
pub struct Parser<'a, 'db> {
    cursor: TokenCursor<'a>,
    db: &'db mut Descriptors,
    file: FileId,
    syntax: Syntax,
    abort: AbortState,
    seen_statement: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, 'db> Parser<'a, 'db> {
    pub fn new(source: &'a str, db: &'db mut Descriptors, file: FileId) -> Self {
        let name = db[file].name.clone();
        Self {
            cursor: TokenCursor::new(Lexer::new(source, &name)),
            db,
            file,
            syntax: Syntax::Proto2,
            abort: AbortState::None,
            seen_statement: false,
            diagnostics: Vec::new(),
        }
    }

    /// Parses the whole file into the arena, returning every diagnostic found.
    pub fn parse_file(mut self) -> Vec<Diagnostic> {
        self.fill(&Container::File);
        self.diagnostics
    }

    // === Driver ===

    /// Reads declarations into `container` until end of input or its closing `}`.
    fn fill(&mut self, container: &Container) {
        let nested = !matches!(container, Container::File);
        loop {
            let Some(token) = self.cursor.peek() else {
                if nested {
                    let anchor = self.cursor.previous().cloned();
                    self.record_fault(ParseFault::new(
                        anchor,
                        ErrorCode::UnexpectedEof,
                        "unexpected end of input; expected '}'",
                    ));
                }
                return;
            };
            if nested && token.is("}") {
                self.cursor.consume();
                return;
            }
            if token.is(";") {
                self.cursor.consume();
                continue;
            }

            let before = self.cursor.position();
            let outer = std::mem::replace(&mut self.abort, AbortState::None);
            let result = self.read_one(container);
            let state = std::mem::replace(&mut self.abort, outer);
            let faulted = result.is_err();
            if let Err(fault) = result {
                self.record_fault(fault);
                match state {
                    AbortState::Statement => self.cursor.skip_to_statement_end(),
                    AbortState::Object => self.cursor.skip_to_object_end(),
                    AbortState::None => {}
                }
            }

            if self.cursor.position() == before {
                // Nothing was consumed: force progress so the loop terminates.
                if let Some(stuck) = self.cursor.peek().cloned() {
                    if !faulted {
                        self.error(&stuck, ErrorCode::UnknownError, format!("unknown error near {stuck}"));
                    }
                    if stuck.is("}") {
                        self.cursor.consume();
                    } else {
                        self.cursor.skip_to_statement_end();
                        if self.cursor.position() == before {
                            self.cursor.consume();
                        }
                    }
                }
            }
        }
    }

    fn read_one(&mut self, container: &Container) -> ParseResult<()> {
        let token = self.cursor.read()?.clone();
        let keyword = if token.kind == TokenKind::AlphaNumeric {
            token.value.as_str()
        } else {
            ""
        };
        match container {
            Container::File => {
                if keyword != "syntax" && keyword != "edition" {
                    self.seen_statement = true;
                }
                match keyword {
                    "syntax" => self.read_syntax(),
                    "edition" => self.read_edition(),
                    "package" => self.read_package(),
                    "import" => self.read_import(),
                    "option" => self.read_option_statement(OptionsTarget::File),
                    "message" => self.read_message(Scope::File(self.file)),
                    "enum" => self.read_enum(Scope::File(self.file)),
                    "service" => self.read_service(),
                    "extend" => self.read_extend(Scope::File(self.file)),
                    _ => self.unexpected(&token, "a top-level declaration"),
                }
            }
            Container::Message(id) => match keyword {
                "message" => self.read_message(Scope::Message(*id)),
                "enum" => self.read_enum(Scope::Message(*id)),
                "oneof" => self.read_oneof(*id),
                "option" => self.read_option_statement(OptionsTarget::Message(*id)),
                "reserved" => self.read_reserved(ReservedTarget::Message(*id)),
                "extensions" => self.read_extensions(*id),
                "extend" => self.read_extend(Scope::Message(*id)),
                "" => self.unexpected(&token, "a field or nested declaration"),
                _ => self.read_field(FieldContext::Message(*id)),
            },
            Container::Enum(id) => match keyword {
                "option" => self.read_option_statement(OptionsTarget::Enum(*id)),
                "reserved" => self.read_reserved(ReservedTarget::Enum(*id)),
                "" => self.unexpected(&token, "an enum value"),
                _ => self.read_enum_value(*id),
            },
            Container::Service(id) => match keyword {
                "option" => self.read_option_statement(OptionsTarget::Service(*id)),
                "rpc" => self.read_method(*id),
                _ => self.unexpected(&token, "'rpc' or 'option'"),
            },
            Container::Method(id) => match keyword {
                "option" => self.read_option_statement(OptionsTarget::Method(*id)),
                _ => self.unexpected(&token, "'option'"),
            },
            Container::Oneof {
                message,
                oneof,
                index,
            } => match keyword {
                "option" => self.read_option_statement(OptionsTarget::Oneof(*oneof)),
                "" => self.unexpected(&token, "a oneof field"),
                _ => self.read_field(FieldContext::Oneof {
                    message: *message,
                    oneof: *oneof,
                    index: *index,
                }),
            },
            Container::Extend { scope, extendee } => match keyword {
                "" => self.unexpected(&token, "an extension field"),
                _ => self.read_field(FieldContext::Extension {
                    scope: *scope,
                    extendee: extendee.clone(),
                }),
            },
        }
    }

    // === File-level statements ===

    /// `syntax = "proto2" | "proto3" ;`
    fn read_syntax(&mut self) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        let keyword = self.cursor.expect("syntax")?;
        if self.seen_statement {
            self.error(&keyword, ErrorCode::Syntax, "'syntax' must be the first statement in a file");
        }
        self.cursor.expect("=")?;
        let (bytes, token) = self.read_string(true)?;
        match String::from_utf8_lossy(&bytes).as_ref() {
            "proto2" => self.syntax = Syntax::Proto2,
            "proto3" => self.syntax = Syntax::Proto3,
            other => self.error(
                &token,
                ErrorCode::InvalidSyntaxVersion,
                format!("unrecognized syntax identifier \"{other}\"; expected \"proto2\" or \"proto3\""),
            ),
        }
        self.db[self.file].syntax = self.syntax.clone();
        self.cursor.expect(";")?;
        Ok(())
    }

    /// `edition = "2023" ;`
    fn read_edition(&mut self) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        self.cursor.expect("edition")?;
        self.cursor.expect("=")?;
        let (bytes, _) = self.read_string(true)?;
        self.syntax = Syntax::Edition(String::from_utf8_lossy(&bytes).into_owned());
        self.db[self.file].syntax = self.syntax.clone();
        self.cursor.expect(";")?;
        Ok(())
    }

    /// `package a.b.c ;`
    fn read_package(&mut self) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        self.cursor.expect("package")?;
        let token = self.cursor.expect_identifier("a package name")?;
        if !is_dotted_name(&token.value) || token.value.starts_with('.') {
            return Err(self.fault(&token, ErrorCode::Syntax, format!("invalid package name {token}")));
        }
        if self.db[self.file].package.is_some() {
            self.error(&token, ErrorCode::DuplicateName, "multiple package declarations");
        } else {
            self.db[self.file].package = Some(token.value.clone());
        }
        self.cursor.expect(";")?;
        Ok(())
    }

    /// `import [public|weak] "path" ;`
    fn read_import(&mut self) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        self.cursor.expect("import")?;
        let kind = if self.cursor.consume_if("public") {
            ImportKind::Public
        } else if self.cursor.consume_if("weak") {
            ImportKind::Weak
        } else {
            ImportKind::Normal
        };
        let (bytes, token) = self.read_string(true)?;
        self.cursor.expect(";")?;
        let path = String::from_utf8_lossy(&bytes).into_owned();
        let file = &mut self.db[self.file];
        if file.imports.iter().any(|i| i.path == path) {
            let message = format!("import \"{path}\" was listed twice");
            self.error(&token, ErrorCode::DuplicateName, message);
            return Ok(());
        }
        file.imports.push(Import {
            path,
            kind,
            token,
            used: false,
            file: None,
        });
        file.has_pending_imports = true;
        Ok(())
    }

    // === Types ===

    /// `message Name { ... }`
    fn read_message(&mut self, scope: Scope) -> ParseResult<()> {
        self.abort = AbortState::Object;
        self.cursor.expect("message")?;
        let name = self.read_type_name("a message name")?;
        let id = self.new_message(scope, &name);
        self.cursor.expect("{")?;
        self.fill(&Container::Message(id));
        self.add_synthetic_oneofs(id);
        Ok(())
    }

    fn new_message(&mut self, scope: Scope, name: &Token) -> MessageId {
        self.check_member_name(scope, &name.value, name);
        let id = self.db.add_message(MessageNode::new(&name.value, self.file, name.clone()));
        match scope {
            Scope::File(f) => self.db[f].messages.push(id),
            Scope::Message(m) => self.db[m].messages.push(id),
        }
        id
    }

    /// Proto3 `optional` fields each get a oneof of their own, after any real oneofs.
    fn add_synthetic_oneofs(&mut self, message: MessageId) {
        let fields: Vec<FieldId> = self.db[message]
            .fields
            .iter()
            .copied()
            .filter(|&f| self.db[f].proto3_optional)
            .collect();
        for field in fields {
            let mut name = format!("_{}", self.db[field].name);
            while self.member_names(Scope::Message(message)).any(|n| n == name) {
                name.insert(0, 'X');
            }
            let index = self.db[message].oneofs.len();
            let oneof = self.db.add_oneof(OneofNode {
                name,
                full_name: String::new(),
                fields: vec![field],
                options: None,
                parent: None,
                synthetic: true,
                file: self.file,
                token: self.db[field].token.clone(),
            });
            self.db[message].oneofs.push(oneof);
            self.db[field].oneof_index = Some(index);
        }
    }

    /// `enum Name { VALUE = 0; ... }`
    fn read_enum(&mut self, scope: Scope) -> ParseResult<()> {
        self.abort = AbortState::Object;
        self.cursor.expect("enum")?;
        let name = self.read_type_name("an enum name")?;
        self.check_member_name(scope, &name.value, &name);
        let id = self.db.add_enum(EnumNode {
            name: name.value.clone(),
            full_name: String::new(),
            values: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            options: None,
            parent: None,
            file: self.file,
            token: name.clone(),
        });
        match scope {
            Scope::File(f) => self.db[f].enums.push(id),
            Scope::Message(m) => self.db[m].enums.push(id),
        }
        self.cursor.expect("{")?;
        self.fill(&Container::Enum(id));
        self.check_enum(id);
        Ok(())
    }

    fn check_enum(&mut self, id: EnumId) {
        let values = self.db[id].values.clone();
        let Some(&first) = values.first() else {
            let token = self.db[id].token.clone();
            self.error(&token, ErrorCode::Syntax, format!("enum '{}' must contain at least one value", token.value));
            return;
        };
        if self.syntax == Syntax::Proto3 && self.db[first].number != 0 {
            let token = self.db[first].number_token.clone();
            self.error(&token, ErrorCode::InvalidNumber, "the first enum value must be zero in proto3");
        }
        let allow_alias = self.db[id].options.as_ref().and_then(|o| o.get_bool("allow_alias")) == Some(true);
        if allow_alias {
            return;
        }
        for (i, &value) in values.iter().enumerate() {
            let number = self.db[value].number;
            if let Some(&earlier) = values[..i].iter().find(|&&v| self.db[v].number == number) {
                let message = format!(
                    "enum value number {} is already used by '{}'; set 'option allow_alias = true;' to allow aliases",
                    number, self.db[earlier].name
                );
                let token = self.db[value].number_token.clone();
                self.error(&token, ErrorCode::DuplicateNumber, message);
            }
        }
    }

    /// `NAME = number [options] ;`
    fn read_enum_value(&mut self, enum_id: EnumId) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        let name = self.cursor.expect_identifier("an enum value name")?;
        if !is_identifier(&name.value) {
            return Err(self.fault(&name, ErrorCode::Syntax, format!("invalid enum value name {name}")));
        }
        self.cursor.expect("=")?;
        let number_token = self.read_signed_number_token()?;
        let number = match parse_integer(&number_token.value).and_then(|n| i32::try_from(n).ok()) {
            Some(n) => n,
            None => {
                self.error(&number_token, ErrorCode::InvalidNumber, format!("invalid enum value number {number_token}"));
                0
            }
        };
        let mut options = None;
        self.read_bracket_options(OptionsKind::EnumValue, &mut options, None)?;
        self.cursor.expect(";")?;

        let node = &self.db[enum_id];
        let duplicate = node.values.iter().any(|&v| self.db[v].name == name.value);
        let reserved_name = node.reserved_names.contains(&name.value);
        let reserved_number = node.reserved_ranges.iter().any(|r| r.contains(number));
        if duplicate {
            self.error(&name, ErrorCode::DuplicateName, format!("enum value '{}' is already defined", name.value));
        }
        if reserved_name {
            self.error(&name, ErrorCode::ReservedName, format!("enum value name '{}' is reserved", name.value));
        }
        if reserved_number {
            self.error(&number_token, ErrorCode::ReservedNumber, format!("enum value number {number} is reserved"));
        }
        let value = self.db.add_enum_value(EnumValueNode {
            name: name.value.clone(),
            full_name: String::new(),
            number,
            options,
            parent: None,
            file: self.file,
            token: name,
            number_token,
        });
        self.db[enum_id].values.push(value);
        Ok(())
    }

    /// `oneof name { fields }`
    fn read_oneof(&mut self, message: MessageId) -> ParseResult<()> {
        self.abort = AbortState::Object;
        self.cursor.expect("oneof")?;
        let name = self.read_type_name("a oneof name")?;
        self.check_member_name(Scope::Message(message), &name.value, &name);
        let oneof = self.db.add_oneof(OneofNode {
            name: name.value.clone(),
            full_name: String::new(),
            fields: Vec::new(),
            options: None,
            parent: None,
            synthetic: false,
            file: self.file,
            token: name.clone(),
        });
        let index = self.db[message].oneofs.len();
        self.db[message].oneofs.push(oneof);
        self.cursor.expect("{")?;
        self.fill(&Container::Oneof {
            message,
            oneof,
            index,
        });
        if self.db[oneof].fields.is_empty() {
            self.error(&name, ErrorCode::Syntax, format!("oneof '{}' must have at least one field", name.value));
        }
        Ok(())
    }

    /// `service Name { rpc ... }`
    fn read_service(&mut self) -> ParseResult<()> {
        self.abort = AbortState::Object;
        self.cursor.expect("service")?;
        let name = self.read_type_name("a service name")?;
        self.check_member_name(Scope::File(self.file), &name.value, &name);
        let id = self.db.add_service(ServiceNode {
            name: name.value.clone(),
            full_name: String::new(),
            methods: Vec::new(),
            options: None,
            parent: None,
            file: self.file,
            token: name,
        });
        self.db[self.file].services.push(id);
        self.cursor.expect("{")?;
        self.fill(&Container::Service(id));
        Ok(())
    }

    /// `rpc Name ( [stream] Request ) returns ( [stream] Response ) ( ; | { options } )`
    fn read_method(&mut self, service: ServiceId) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        self.cursor.expect("rpc")?;
        let name = self.read_type_name("a method name")?;
        let (client_streaming, input_token) = self.read_method_type()?;
        self.cursor.expect("returns")?;
        let (server_streaming, output_token) = self.read_method_type()?;

        if self.db[service].methods.iter().any(|&m| self.db[m].name == name.value) {
            self.error(&name, ErrorCode::DuplicateName, format!("method '{}' is already defined", name.value));
        }
        let id = self.db.add_method(MethodNode {
            name: name.value.clone(),
            full_name: String::new(),
            input_type: input_token.value.clone(),
            output_type: output_token.value.clone(),
            resolved_input: None,
            resolved_output: None,
            client_streaming,
            server_streaming,
            options: None,
            parent: None,
            file: self.file,
            token: name,
            input_token,
            output_token,
        });
        self.db[service].methods.push(id);

        if self.cursor.consume_if("{") {
            self.fill(&Container::Method(id));
            self.cursor.consume_if(";");
        } else {
            self.cursor.expect(";")?;
        }
        Ok(())
    }

    fn read_method_type(&mut self) -> ParseResult<(bool, Token)> {
        self.cursor.expect("(")?;
        let first = self.cursor.expect_identifier("a message type")?;
        let (streaming, token) = if first.value == "stream" && !self.cursor.is(")") {
            (true, self.cursor.expect_identifier("a message type")?)
        } else {
            (false, first)
        };
        if !is_dotted_name(&token.value) {
            return Err(self.fault(&token, ErrorCode::Syntax, format!("invalid type name {token}")));
        }
        self.cursor.expect(")")?;
        Ok((streaming, token))
    }

    /// `extend Extendee { fields }`
    fn read_extend(&mut self, scope: Scope) -> ParseResult<()> {
        self.abort = AbortState::Object;
        self.cursor.expect("extend")?;
        let extendee = self.cursor.expect_identifier("an extendee type name")?;
        if !is_dotted_name(&extendee.value) {
            return Err(self.fault(&extendee, ErrorCode::Syntax, format!("invalid type name {extendee}")));
        }
        self.cursor.expect("{")?;
        self.fill(&Container::Extend {
            scope,
            extendee: extendee.value,
        });
        Ok(())
    }

    // === Fields ===

    /// `[label] type name = number [options] ;`, `map<K,V> ...` or a proto2 group.
    fn read_field(&mut self, ctx: FieldContext) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        let first = self.cursor.read()?.clone();
        let label = match Label::from_keyword(&first.value) {
            Some(label) if first.kind == TokenKind::AlphaNumeric => {
                self.cursor.consume();
                Some(label)
            }
            _ => None,
        };
        let type_token = self.cursor.expect_identifier("a field type")?;
        if type_token.value == "map" && self.cursor.is("<") {
            return self.read_map_field(ctx, label, type_token);
        }
        let is_group = type_token.value == "group" && self.syntax != Syntax::Proto3;
        let (ty, type_name) = if is_group {
            (FieldType::Group, None)
        } else if let Some(ty) = FieldType::from_keyword(&type_token.value) {
            (ty, None)
        } else if is_dotted_name(&type_token.value) {
            (FieldType::MessageOrEnum, Some(type_token.value.clone()))
        } else {
            return Err(self.fault(&type_token, ErrorCode::Syntax, format!("invalid field type {type_token}")));
        };

        let name = self.cursor.expect_identifier("a field name")?;
        if !is_identifier(&name.value) {
            return Err(self.fault(&name, ErrorCode::Syntax, format!("invalid field name {name}")));
        }
        self.cursor.expect("=")?;
        let number_token = self.cursor.expect_identifier("a field number")?;
        let number = self.field_number(&number_token);
        let mut options = None;
        let mut extras = FieldExtras::default();
        self.read_bracket_options(OptionsKind::Field, &mut options, Some(&mut extras))?;

        let (label, proto3_optional) = self.check_label(&ctx, label, &first);
        let default_value = match extras.default.take() {
            Some(value) => self.convert_default(ty, label, &value),
            None => None,
        };

        let mut node = FieldNode {
            name: name.value.clone(),
            full_name: String::new(),
            number: number.unwrap_or(0),
            label,
            ty,
            type_name,
            resolved_type: None,
            default_value,
            json_name: extras.json_name,
            oneof_index: None,
            extendee: None,
            resolved_extendee: None,
            options,
            parent: None,
            proto3_optional,
            file: self.file,
            token: name.clone(),
            type_token,
            number_token,
        };

        if is_group {
            if !name.value.starts_with(|c: char| c.is_ascii_uppercase()) {
                self.error(&name, ErrorCode::Syntax, "group names must start with a capital letter");
            }
            node.name = name.value.to_lowercase();
            node.type_name = Some(name.value.clone());
            self.cursor.expect("{")?;
            let group = self.new_message(ctx.scope(), &name);
            self.register_field(&ctx, node, number.is_some());
            self.fill(&Container::Message(group));
            self.add_synthetic_oneofs(group);
        } else {
            self.cursor.expect(";")?;
            self.register_field(&ctx, node, number.is_some());
        }
        Ok(())
    }

    /// `map < KeyType , ValueType > name = number [options] ;`
    fn read_map_field(&mut self, ctx: FieldContext, label: Option<Label>, map_token: Token) -> ParseResult<()> {
        self.cursor.expect("<")?;
        let key_token = self.cursor.expect_identifier("a map key type")?;
        self.cursor.expect(",")?;
        let value_token = self.cursor.expect_identifier("a map value type")?;
        self.cursor.expect(">")?;
        let name = self.cursor.expect_identifier("a field name")?;
        if !is_identifier(&name.value) {
            return Err(self.fault(&name, ErrorCode::Syntax, format!("invalid field name {name}")));
        }
        self.cursor.expect("=")?;
        let number_token = self.cursor.expect_identifier("a field number")?;
        let number = self.field_number(&number_token);
        let mut options = None;
        let mut extras = FieldExtras::default();
        self.read_bracket_options(OptionsKind::Field, &mut options, Some(&mut extras))?;
        self.cursor.expect(";")?;

        if label.is_some() {
            self.error(&map_token, ErrorCode::InvalidLabel, "map fields cannot have labels");
        }
        if extras.default.is_some() {
            self.error(&name, ErrorCode::InvalidDefault, "map fields cannot have default values");
        }
        let message = match &ctx {
            FieldContext::Message(m) => *m,
            FieldContext::Oneof { .. } => {
                self.error(&map_token, ErrorCode::Syntax, "map fields are not allowed in oneofs");
                return Ok(());
            }
            FieldContext::Extension { .. } => {
                self.error(&map_token, ErrorCode::Syntax, "map fields cannot be extensions");
                return Ok(());
            }
        };

        let key_type = match FieldType::from_keyword(&key_token.value) {
            Some(ty) if ty.is_map_key() => ty,
            _ => {
                self.error(
                    &key_token,
                    ErrorCode::InvalidMapKey,
                    format!("{key_token} is not a valid map key type; use an integral, bool or string type"),
                );
                FieldType::String
            }
        };
        let (value_type, value_type_name) = match FieldType::from_keyword(&value_token.value) {
            Some(ty) => (ty, None),
            None if value_token.value != "map" && is_dotted_name(&value_token.value) => {
                (FieldType::MessageOrEnum, Some(value_token.value.clone()))
            }
            None => {
                return Err(self.fault(&value_token, ErrorCode::Syntax, format!("invalid map value type {value_token}")));
            }
        };

        let entry_name = map_entry_name(&name.value);
        let mut entry_token = name.clone();
        entry_token.value = entry_name.clone();
        let entry = self.new_message(Scope::Message(message), &entry_token);
        self.db[entry].kind = MessageKind::MapEntry;
        self.db[entry]
            .options
            .get_or_insert_with(|| OptionsNode::new(OptionsKind::Message))
            .set_bool("map_entry", true, map_token.clone());

        for (field_name, number, ty, type_name, type_token) in [
            ("key", 1, key_type, None, key_token),
            ("value", 2, value_type, value_type_name, value_token),
        ] {
            let field = self.db.add_field(FieldNode {
                name: field_name.to_string(),
                full_name: String::new(),
                number,
                label: Label::Optional,
                ty,
                type_name,
                resolved_type: None,
                default_value: None,
                json_name: None,
                oneof_index: None,
                extendee: None,
                resolved_extendee: None,
                options: None,
                parent: None,
                proto3_optional: false,
                file: self.file,
                token: type_token.clone(),
                type_token: type_token.clone(),
                number_token: type_token,
            });
            self.db[entry].fields.push(field);
        }

        let node = FieldNode {
            name: name.value.clone(),
            full_name: String::new(),
            number: number.unwrap_or(0),
            label: Label::Repeated,
            ty: FieldType::Message,
            type_name: Some(entry_name),
            resolved_type: None,
            default_value: None,
            json_name: extras.json_name,
            oneof_index: None,
            extendee: None,
            resolved_extendee: None,
            options,
            parent: None,
            proto3_optional: false,
            file: self.file,
            token: name,
            type_token: map_token,
            number_token,
        };
        self.register_field(&ctx, node, number.is_some());
        Ok(())
    }

    fn check_label(&mut self, ctx: &FieldContext, label: Option<Label>, token: &Token) -> (Label, bool) {
        let in_oneof = matches!(ctx, FieldContext::Oneof { .. });
        let syntax = self.syntax.clone();
        match (label, &syntax) {
            (Some(_), _) if in_oneof => {
                self.error(token, ErrorCode::InvalidLabel, "fields in oneofs must not have labels");
                (Label::Optional, false)
            }
            (None, _) if in_oneof => (Label::Optional, false),
            (Some(Label::Required), Syntax::Proto3) => {
                self.error(token, ErrorCode::InvalidLabel, "required fields are not allowed in proto3");
                (Label::Required, false)
            }
            (Some(Label::Optional), Syntax::Proto3) => {
                let synthetic = matches!(ctx, FieldContext::Message(_));
                (Label::Optional, synthetic)
            }
            (Some(l @ (Label::Optional | Label::Required)), Syntax::Edition(_)) => {
                self.error(
                    token,
                    ErrorCode::InvalidLabel,
                    format!("label '{}' is not allowed in editions; use field presence features", l.name()),
                );
                (l, false)
            }
            (Some(l), _) => (l, false),
            (None, Syntax::Proto2) => {
                self.error(token, ErrorCode::InvalidLabel, "expected 'required', 'optional', or 'repeated'");
                (Label::Optional, false)
            }
            (None, _) => (Label::Optional, false),
        }
    }

    /// Validates a field number token, reporting problems without faulting.
    fn field_number(&mut self, token: &Token) -> Option<i32> {
        match parse_integer(&token.value) {
            Some(n) if (1..=i128::from(MAX_FIELD_NUMBER)).contains(&n) => {
                let n = n as i64;
                if IMPLEMENTATION_RESERVED.contains(&n) {
                    self.error(
                        token,
                        ErrorCode::InvalidNumber,
                        "field numbers 19000 through 19999 are reserved for the protobuf implementation",
                    );
                }
                i32::try_from(n).ok()
            }
            Some(n) => {
                self.error(
                    token,
                    ErrorCode::InvalidNumber,
                    format!("field number {n} is out of range; must be between 1 and {MAX_FIELD_NUMBER}"),
                );
                None
            }
            None => {
                self.error(token, ErrorCode::InvalidNumber, format!("invalid field number {token}"));
                None
            }
        }
    }

    /// Adds a parsed field to its message, oneof or extension scope, checking
    /// the name and number against what the parent already declares.
    fn register_field(&mut self, ctx: &FieldContext, mut node: FieldNode, number_valid: bool) -> FieldId {
        let name_token = node.token.clone();
        let number_token = node.number_token.clone();
        match ctx {
            FieldContext::Message(message) | FieldContext::Oneof { message, .. } => {
                self.check_member_name(Scope::Message(*message), &node.name, &name_token);
                if number_valid {
                    self.check_field_number(*message, node.number, &number_token);
                }
                if let FieldContext::Oneof { index, .. } = ctx {
                    node.oneof_index = Some(*index);
                }
                let id = self.db.add_field(node);
                self.db[*message].fields.push(id);
                if let FieldContext::Oneof { oneof, .. } = ctx {
                    self.db[*oneof].fields.push(id);
                }
                id
            }
            FieldContext::Extension { scope, extendee } => {
                self.check_member_name(*scope, &node.name, &name_token);
                node.extendee = Some(extendee.clone());
                let id = self.db.add_field(node);
                match scope {
                    Scope::File(f) => self.db[*f].extensions.push(id),
                    Scope::Message(m) => self.db[*m].extensions.push(id),
                }
                id
            }
        }
    }

    fn check_field_number(&mut self, message: MessageId, number: i32, token: &Token) {
        let node = &self.db[message];
        let existing = node.fields.iter().map(|&f| &self.db[f]).find(|f| f.number == number);
        if let Some(existing) = existing {
            let text = format!(
                "field number {} has already been used in '{}' by field '{}'",
                number, node.name, existing.name
            );
            self.error(token, ErrorCode::DuplicateNumber, text);
            return;
        }
        if node.reserved_ranges.iter().any(|r| r.contains(number)) {
            let text = format!("field number {number} is reserved in '{}'", node.name);
            self.error(token, ErrorCode::ReservedNumber, text);
            return;
        }
        if let Some(range) = node.extension_ranges.iter().find(|r| r.range.contains(number)) {
            let text = format!(
                "field number {} conflicts with extension range {} to {}",
                number, range.range.start, range.range.end
            );
            self.error(token, ErrorCode::InvalidNumber, text);
        }
    }

    /// Names already claimed in a scope by sibling declarations.
    fn member_names(&self, scope: Scope) -> Box<dyn Iterator<Item = &str> + '_> {
        let db = &*self.db;
        match scope {
            Scope::File(f) => {
                let file = &db[f];
                Box::new(
                    file.messages
                        .iter()
                        .map(move |&m| db[m].name.as_str())
                        .chain(file.enums.iter().map(move |&e| db[e].name.as_str()))
                        .chain(file.services.iter().map(move |&s| db[s].name.as_str()))
                        .chain(file.extensions.iter().map(move |&x| db[x].name.as_str())),
                )
            }
            Scope::Message(m) => {
                let message = &db[m];
                Box::new(
                    message
                        .fields
                        .iter()
                        .map(move |&f| db[f].name.as_str())
                        .chain(message.messages.iter().map(move |&n| db[n].name.as_str()))
                        .chain(message.enums.iter().map(move |&e| db[e].name.as_str()))
                        .chain(message.oneofs.iter().map(move |&o| db[o].name.as_str()))
                        .chain(message.extensions.iter().map(move |&x| db[x].name.as_str())),
                )
            }
        }
    }

    /// Reports a name that collides with a sibling or a reserved name. The
    /// diagnostic points at the second occurrence.
    fn check_member_name(&mut self, scope: Scope, name: &str, token: &Token) -> bool {
        if self.member_names(scope).any(|n| n == name) {
            let owner = match scope {
                Scope::File(f) => self.db[f].name.clone(),
                Scope::Message(m) => self.db[m].name.clone(),
            };
            self.error(token, ErrorCode::DuplicateName, format!("'{name}' is already defined in '{owner}'"));
            return false;
        }
        if let Scope::Message(m) = scope {
            if self.db[m].reserved_names.iter().any(|r| r == name) {
                let owner = self.db[m].name.clone();
                self.error(token, ErrorCode::ReservedName, format!("name '{name}' is reserved in '{owner}'"));
                return false;
            }
        }
        true
    }

    fn convert_default(&mut self, ty: FieldType, label: Label, value: &OptionValue) -> Option<String> {
        let token = value.token().clone();
        if self.syntax == Syntax::Proto3 {
            self.error(&token, ErrorCode::InvalidDefault, "explicit default values are not allowed in proto3");
            return None;
        }
        if label == Label::Repeated {
            self.error(&token, ErrorCode::InvalidDefault, "repeated fields can't have default values");
            return None;
        }
        let OptionValue::Scalar(literal, _) = value else {
            self.error(&token, ErrorCode::InvalidDefault, "default values must be scalar");
            return None;
        };
        let converted = match (ty, literal) {
            (FieldType::Group | FieldType::Message, _) => {
                self.error(&token, ErrorCode::InvalidDefault, "messages can't have default values");
                return None;
            }
            (FieldType::Bool, OptionLiteral::Identifier(v)) if v == "true" || v == "false" => Some(v.clone()),
            (FieldType::Float | FieldType::Double, OptionLiteral::Integer(i)) => Some(i.to_string()),
            (FieldType::Float | FieldType::Double, OptionLiteral::Float(f)) => Some(format_float(*f)),
            (FieldType::Float | FieldType::Double, OptionLiteral::Identifier(v))
                if matches!(v.as_str(), "inf" | "nan") =>
            {
                Some(v.clone())
            }
            (FieldType::String, OptionLiteral::String(bytes)) => {
                if std::str::from_utf8(bytes).is_err() {
                    self.warning(&token, ErrorCode::InvalidUtf8, "string default is not valid UTF-8");
                }
                Some(String::from_utf8_lossy(bytes).into_owned())
            }
            (FieldType::Bytes, OptionLiteral::String(bytes)) => Some(escape_bytes(bytes)),
            (FieldType::Enum | FieldType::MessageOrEnum, OptionLiteral::Identifier(v)) => Some(v.clone()),
            (ty, OptionLiteral::Integer(i)) => match ty.integer_bounds() {
                Some((min, max)) if (min..=max).contains(i) => Some(i.to_string()),
                Some(_) => {
                    self.error(&token, ErrorCode::InvalidDefault, format!("default value {i} is out of range for {}", ty.name()));
                    return None;
                }
                None => None,
            },
            _ => None,
        };
        if converted.is_none() {
            self.error(
                &token,
                ErrorCode::InvalidDefault,
                format!("invalid default value {} for a {} field", literal.describe(), ty.name()),
            );
        }
        converted
    }

    // === Ranges ===

    /// `reserved 1, 5 to 10, 20 to max ;` or `reserved "a", "b" ;`
    fn read_reserved(&mut self, target: ReservedTarget) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        self.cursor.expect("reserved")?;
        let first = self.cursor.read()?.clone();
        let by_name = first.kind == TokenKind::StringLiteral
            || (first.kind == TokenKind::AlphaNumeric && !is_numeric(&first.value));
        if by_name {
            loop {
                let token = self.cursor.read()?.clone();
                let name = if token.kind == TokenKind::StringLiteral {
                    let (bytes, _) = self.read_string(true)?;
                    String::from_utf8_lossy(&bytes).into_owned()
                } else {
                    self.cursor.expect_identifier("a reserved name")?.value
                };
                if !is_identifier(&name) {
                    self.error(&token, ErrorCode::ReservedName, format!("reserved name \"{name}\" is not a valid identifier"));
                }
                self.add_reserved_name(target, name, &token);
                if !self.cursor.consume_if(",") {
                    break;
                }
            }
        } else {
            let max = match target {
                ReservedTarget::Message(_) => MAX_FIELD_NUMBER,
                ReservedTarget::Enum(_) => i64::from(i32::MAX),
            };
            loop {
                let (range, token) = self.read_range(max)?;
                self.add_reserved_range(target, range, &token);
                if !self.cursor.consume_if(",") {
                    break;
                }
            }
        }
        self.cursor.expect(";")?;
        Ok(())
    }

    fn add_reserved_name(&mut self, target: ReservedTarget, name: String, token: &Token) {
        match target {
            ReservedTarget::Message(m) => {
                let clash = self.db[m].fields.iter().find(|&&f| self.db[f].name == name).copied();
                if let Some(field) = clash {
                    let text = format!("reserved name '{}' conflicts with field '{}'", name, self.db[field].name);
                    self.error(token, ErrorCode::ReservedName, text);
                }
                if self.db[m].reserved_names.contains(&name) {
                    self.error(token, ErrorCode::DuplicateName, format!("name '{name}' is reserved multiple times"));
                } else {
                    self.db[m].reserved_names.push(name);
                }
            }
            ReservedTarget::Enum(e) => {
                let clash = self.db[e].values.iter().any(|&v| self.db[v].name == name);
                if clash {
                    self.error(token, ErrorCode::ReservedName, format!("reserved name '{name}' conflicts with an enum value"));
                }
                if self.db[e].reserved_names.contains(&name) {
                    self.error(token, ErrorCode::DuplicateName, format!("name '{name}' is reserved multiple times"));
                } else {
                    self.db[e].reserved_names.push(name);
                }
            }
        }
    }

    fn add_reserved_range(&mut self, target: ReservedTarget, range: NumberRange, token: &Token) {
        let (existing, clash) = match target {
            ReservedTarget::Message(m) => {
                let clash = self.db[m]
                    .fields
                    .iter()
                    .map(|&f| &self.db[f])
                    .find(|f| range.contains(f.number))
                    .map(|f| (f.name.clone(), f.number));
                (&self.db[m].reserved_ranges, clash)
            }
            ReservedTarget::Enum(e) => {
                let clash = self.db[e]
                    .values
                    .iter()
                    .map(|&v| &self.db[v])
                    .find(|v| range.contains(v.number))
                    .map(|v| (v.name.clone(), v.number));
                (&self.db[e].reserved_ranges, clash)
            }
        };
        let overlaps = existing.iter().any(|r| r.overlaps(&range));
        if let Some((name, number)) = clash {
            self.error(token, ErrorCode::ReservedNumber, format!("'{name}' uses reserved number {number}"));
        }
        if overlaps {
            self.error(token, ErrorCode::ReservedNumber, "reserved range overlaps another reserved range");
        }
        match target {
            ReservedTarget::Message(m) => self.db[m].reserved_ranges.push(range),
            ReservedTarget::Enum(e) => self.db[e].reserved_ranges.push(range),
        }
    }

    /// `extensions 100 to 199 [options] ;`
    fn read_extensions(&mut self, message: MessageId) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        self.cursor.expect("extensions")?;
        let mut ranges = Vec::new();
        loop {
            ranges.push(self.read_range(MAX_FIELD_NUMBER)?);
            if !self.cursor.consume_if(",") {
                break;
            }
        }
        let mut options = None;
        self.read_bracket_options(OptionsKind::ExtensionRange, &mut options, None)?;
        self.cursor.expect(";")?;
        for (range, token) in ranges {
            let node = &self.db[message];
            let clash = node.fields.iter().map(|&f| &self.db[f]).find(|f| range.contains(f.number));
            if let Some(field) = clash {
                let text = format!("extension range conflicts with field '{}' ({})", field.name, field.number);
                self.error(&token, ErrorCode::InvalidNumber, text);
            } else if node.reserved_ranges.iter().any(|r| r.overlaps(&range)) {
                self.error(&token, ErrorCode::ReservedNumber, "extension range overlaps a reserved range");
            } else if node.extension_ranges.iter().any(|r| r.range.overlaps(&range)) {
                self.error(&token, ErrorCode::InvalidNumber, "extension range overlaps another extension range");
            }
            self.db[message].extension_ranges.push(ExtensionRange {
                range,
                options: options.clone(),
            });
        }
        Ok(())
    }

    /// `N` or `N to M` or `N to max`.
    fn read_range(&mut self, max: i64) -> ParseResult<(NumberRange, Token)> {
        let start_token = self.read_signed_number_token()?;
        let start = parse_number_with_max(&start_token.value, max);
        let end = if self.cursor.consume_if("to") {
            let end_token = self.read_signed_number_token()?;
            parse_number_with_max(&end_token.value, max)
        } else {
            start
        };
        let min = if max == MAX_FIELD_NUMBER { 1 } else { i64::from(i32::MIN) };
        match (start, end) {
            (Some(s), Some(e)) if s >= min && e <= max && s <= e => Ok((
                NumberRange {
                    start: s as i32,
                    end: e as i32,
                },
                start_token,
            )),
            _ => Err(self.fault(&start_token, ErrorCode::InvalidNumber, "invalid range")),
        }
    }

    /// A number token, allowing a detached leading `-`.
    fn read_signed_number_token(&mut self) -> ParseResult<Token> {
        let mut token = self.cursor.expect_identifier("a number")?;
        if token.value == "-" {
            let digits = self.cursor.expect_identifier("a number")?;
            token.value = format!("-{}", digits.value);
        }
        Ok(token)
    }

    // === Options ===

    /// `option name = value ;`
    fn read_option_statement(&mut self, target: OptionsTarget) -> ParseResult<()> {
        self.abort = AbortState::Statement;
        self.cursor.expect("option")?;
        let name_token = self.cursor.read()?.clone();
        let name = self.read_option_name()?;
        self.cursor.expect("=")?;
        let value = self.read_option_value()?;
        self.cursor.expect(";")?;

        let (mut slot, kind) = match target {
            OptionsTarget::File => (self.db[self.file].options.take(), OptionsKind::File),
            OptionsTarget::Message(id) => (self.db[id].options.take(), OptionsKind::Message),
            OptionsTarget::Enum(id) => (self.db[id].options.take(), OptionsKind::Enum),
            OptionsTarget::Service(id) => (self.db[id].options.take(), OptionsKind::Service),
            OptionsTarget::Method(id) => (self.db[id].options.take(), OptionsKind::Method),
            OptionsTarget::Oneof(id) => (self.db[id].options.take(), OptionsKind::Oneof),
        };
        self.apply_option(&mut slot, kind, name, value, name_token);
        match target {
            OptionsTarget::File => self.db[self.file].options = slot,
            OptionsTarget::Message(id) => self.db[id].options = slot,
            OptionsTarget::Enum(id) => self.db[id].options = slot,
            OptionsTarget::Service(id) => self.db[id].options = slot,
            OptionsTarget::Method(id) => self.db[id].options = slot,
            OptionsTarget::Oneof(id) => self.db[id].options = slot,
        }
        Ok(())
    }

    /// `[ name = value, ... ]` after a field, enum value or extension range.
    fn read_bracket_options(
        &mut self,
        kind: OptionsKind,
        options: &mut Option<OptionsNode>,
        mut extras: Option<&mut FieldExtras>,
    ) -> ParseResult<()> {
        if !self.cursor.consume_if("[") {
            return Ok(());
        }
        loop {
            let name_token = self.cursor.read()?.clone();
            let name = self.read_option_name()?;
            self.cursor.expect("=")?;
            let value = self.read_option_value()?;
            let pseudo = match (name.as_slice(), extras.as_deref_mut()) {
                ([part], Some(extras)) if !part.is_extension && part.name == "default" => {
                    if extras.default.is_some() {
                        self.error(&name_token, ErrorCode::OptionAlreadySet, "'default' was already set");
                    }
                    extras.default = Some(value.clone());
                    true
                }
                ([part], Some(extras)) if !part.is_extension && part.name == "json_name" => {
                    match &value {
                        OptionValue::Scalar(OptionLiteral::String(bytes), _) => {
                            extras.json_name = Some(String::from_utf8_lossy(bytes).into_owned());
                        }
                        other => self.error(
                            other.token(),
                            ErrorCode::OptionTypeMismatch,
                            "'json_name' must be a string",
                        ),
                    }
                    true
                }
                _ => false,
            };
            if !pseudo {
                self.apply_option(options, kind, name, value, name_token);
            }
            if !self.cursor.consume_if(",") {
                break;
            }
        }
        self.cursor.expect("]")?;
        Ok(())
    }

    /// Reads `a.b`, `(ext.name)`, `(ext).sub.field` or `(a).(b)` as name parts.
    fn read_option_name(&mut self) -> ParseResult<Vec<OptionNamePart>> {
        let mut parts = Vec::new();
        loop {
            let Some(token) = self.cursor.peek().cloned() else {
                break;
            };
            if token.is("(") {
                self.cursor.consume();
                let name = self.cursor.expect_identifier("an extension name")?;
                if !is_dotted_name(&name.value) {
                    return Err(self.fault(&name, ErrorCode::Syntax, format!("invalid extension name {name}")));
                }
                self.cursor.expect(")")?;
                parts.push(OptionNamePart {
                    name: name.value,
                    is_extension: true,
                });
            } else if token.kind == TokenKind::AlphaNumeric
                && (parts.is_empty() || token.value.starts_with('.'))
            {
                self.cursor.consume();
                for segment in token.value.split('.').filter(|s| !s.is_empty()) {
                    if !is_identifier(segment) {
                        return Err(self.fault(&token, ErrorCode::Syntax, format!("invalid option name {token}")));
                    }
                    parts.push(OptionNamePart {
                        name: segment.to_string(),
                        is_extension: false,
                    });
                }
            } else {
                break;
            }
        }
        if parts.is_empty() {
            let token = self.cursor.read()?.clone();
            return Err(self.fault(&token, ErrorCode::Syntax, format!("expected an option name, found {token}")));
        }
        Ok(parts)
    }

    /// A scalar literal or a `{ ... }` aggregate.
    fn read_option_value(&mut self) -> ParseResult<OptionValue> {
        let token = self.cursor.read()?.clone();
        if token.is("{") {
            self.cursor.consume();
            let entries = self.read_aggregate_body("}")?;
            return Ok(OptionValue::Aggregate(entries, token));
        }
        if token.kind == TokenKind::StringLiteral {
            let (bytes, token) = self.read_string(false)?;
            return Ok(OptionValue::Scalar(OptionLiteral::String(bytes), token));
        }
        if token.kind == TokenKind::AlphaNumeric {
            let token = self.read_signed_number_token()?;
            let literal = self.scalar_literal(&token)?;
            return Ok(OptionValue::Scalar(literal, token));
        }
        Err(self.fault(&token, ErrorCode::Syntax, format!("expected an option value, found {token}")))
    }

    fn scalar_literal(&self, token: &Token) -> ParseResult<OptionLiteral> {
        let text = token.value.as_str();
        if is_numeric(text) {
            if let Some(i) = parse_integer(text) {
                return Ok(OptionLiteral::Integer(i));
            }
            if let Some(f) = parse_float(text) {
                return Ok(OptionLiteral::Float(f));
            }
            return Err(self.fault(token, ErrorCode::InvalidLiteral, format!("invalid number {token}")));
        }
        if is_dotted_name(text) {
            return Ok(OptionLiteral::Identifier(text.to_string()));
        }
        Err(self.fault(token, ErrorCode::InvalidLiteral, format!("invalid option value {token}")))
    }

    /// Text-format message body up to `close`.
    fn read_aggregate_body(&mut self, close: &str) -> ParseResult<Vec<AggregateEntry>> {
        let mut entries = Vec::new();
        loop {
            let token = self.cursor.read()?.clone();
            if token.is(close) {
                self.cursor.consume();
                return Ok(entries);
            }
            let name = if token.is("[") {
                self.cursor.consume();
                let mut name = self.cursor.expect_identifier("an extension name")?.value;
                while !self.cursor.is("]") {
                    let part = self.cursor.read()?.clone();
                    self.cursor.consume();
                    name.push_str(&part.value);
                }
                self.cursor.expect("]")?;
                OptionNamePart {
                    name,
                    is_extension: true,
                }
            } else {
                let name = self.cursor.expect_identifier("a field name")?;
                if !is_identifier(&name.value) {
                    return Err(self.fault(&name, ErrorCode::Syntax, format!("invalid field name {name}")));
                }
                OptionNamePart {
                    name: name.value,
                    is_extension: false,
                }
            };
            let value = if self.cursor.consume_if(":") {
                if self.cursor.is("[") {
                    self.read_aggregate_list()?
                } else {
                    self.read_aggregate_value()?
                }
            } else if self.cursor.is("{") || self.cursor.is("<") {
                self.read_aggregate_value()?
            } else {
                let found = self.cursor.read()?.clone();
                return Err(self.fault(&found, ErrorCode::Syntax, format!("expected ':', found {found}")));
            };
            entries.push(AggregateEntry { name, value, token });
            if !self.cursor.consume_if(",") {
                self.cursor.consume_if(";");
            }
        }
    }

    fn read_aggregate_value(&mut self) -> ParseResult<OptionValue> {
        let token = self.cursor.read()?.clone();
        if token.is("<") {
            self.cursor.consume();
            let entries = self.read_aggregate_body(">")?;
            return Ok(OptionValue::Aggregate(entries, token));
        }
        self.read_option_value()
    }

    fn read_aggregate_list(&mut self) -> ParseResult<OptionValue> {
        let open = self.cursor.expect("[")?;
        let mut values = Vec::new();
        if self.cursor.consume_if("]") {
            return Ok(OptionValue::List(values, open));
        }
        loop {
            values.push(self.read_aggregate_value()?);
            if !self.cursor.consume_if(",") {
                self.cursor.expect("]")?;
                return Ok(OptionValue::List(values, open));
            }
        }
    }

    /// Stores an option: built-in names are checked and kept typed, anything
    /// naming an extension is kept uninterpreted for the option pass.
    fn apply_option(
        &mut self,
        slot: &mut Option<OptionsNode>,
        kind: OptionsKind,
        name: Vec<OptionNamePart>,
        value: OptionValue,
        token: Token,
    ) {
        if name.iter().any(|p| p.is_extension) {
            slot.get_or_insert_with(|| OptionsNode::new(kind))
                .uninterpreted
                .push(UninterpretedOption { name, value, token });
            return;
        }
        let full: Vec<&str> = name.iter().map(|p| p.name.as_str()).collect();
        let full = full.join(".");
        let builtin = match name.as_slice() {
            [single] => kind.builtin(&single.name),
            _ => None,
        };
        let Some(builtin) = builtin else {
            self.error(&token, ErrorCode::UnknownOption, format!("option '{full}' unknown"));
            return;
        };
        if full == "map_entry" {
            self.error(
                &token,
                ErrorCode::UnknownOption,
                "map_entry should not be set explicitly; use map<KeyType, ValueType> instead",
            );
            return;
        }
        let OptionValue::Scalar(literal, value_token) = value else {
            self.error(&token, ErrorCode::OptionTypeMismatch, format!("option '{full}' takes a scalar value"));
            return;
        };
        let valid = match (builtin, &literal) {
            (BuiltinType::Bool, OptionLiteral::Identifier(v)) => v == "true" || v == "false",
            (BuiltinType::Text, OptionLiteral::String(_)) => true,
            (BuiltinType::Enum(values), OptionLiteral::Identifier(v)) => values.contains(&v.as_str()),
            _ => false,
        };
        if !valid {
            self.error(
                &value_token,
                ErrorCode::OptionTypeMismatch,
                format!("value {} is not valid for option '{full}'", literal.describe()),
            );
            return;
        }
        let options = slot.get_or_insert_with(|| OptionsNode::new(kind));
        if options.get(&full).is_some() {
            self.error(&token, ErrorCode::OptionAlreadySet, format!("option '{full}' was already set"));
            return;
        }
        options.builtins.push(BuiltinOption {
            name: full,
            value: literal,
            token,
        });
    }

    // === Helpers ===

    /// One or more adjacent string literals, decoded and concatenated.
    fn read_string(&mut self, require_utf8: bool) -> ParseResult<(Vec<u8>, Token)> {
        let first = self.cursor.read()?.clone();
        if first.kind != TokenKind::StringLiteral {
            return Err(self.fault(&first, ErrorCode::Syntax, format!("expected a string literal, found {first}")));
        }
        let mut bytes = Vec::new();
        while let Some(token) = self.cursor.peek().filter(|t| t.kind == TokenKind::StringLiteral).cloned() {
            self.cursor.consume();
            match unescape(&token.value) {
                Ok(decoded) => {
                    for warning in &decoded.warnings {
                        self.warning(&token, ErrorCode::InvalidEscape, warning.clone());
                    }
                    bytes.extend(decoded.bytes);
                }
                Err(err) => return Err(self.fault(&token, ErrorCode::InvalidLiteral, err.to_string())),
            }
        }
        if require_utf8 && std::str::from_utf8(&bytes).is_err() {
            self.warning(&first, ErrorCode::InvalidUtf8, "string literal is not valid UTF-8");
        }
        Ok((bytes, first))
    }

    fn read_type_name(&mut self, what: &str) -> ParseResult<Token> {
        let token = self.cursor.expect_identifier(what)?;
        if !is_identifier(&token.value) {
            return Err(self.fault(&token, ErrorCode::Syntax, format!("invalid name {token}")));
        }
        Ok(token)
    }

    fn unexpected<T>(&mut self, token: &Token, expected: &str) -> ParseResult<T> {
        self.abort = AbortState::Statement;
        Err(self.fault(token, ErrorCode::Syntax, format!("unexpected {token}; expected {expected}")))
    }

    fn fault(&self, token: &Token, code: ErrorCode, message: impl Into<String>) -> ParseFault {
        ParseFault::new(Some(token.clone()), code, message)
    }

    fn record_fault(&mut self, fault: ParseFault) {
        let diagnostic = match fault.token.as_ref().or(self.cursor.previous()) {
            Some(token) => Diagnostic::error(token, fault.code, fault.message),
            None => Diagnostic::file_level(
                &self.db[self.file].name,
                crate::diagnostics::Severity::Error,
                fault.code,
                fault.message,
            ),
        };
        self.diagnostics.push(diagnostic);
    }

    fn error(&mut self, token: &Token, code: ErrorCode, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(token, code, message));
    }

    fn warning(&mut self, token: &Token, code: ErrorCode, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(token, code, message));
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        f.to_string()
    }
}

/// Parses one standalone source into a fresh arena. Mostly useful for tests and
/// tools that do not need imports.
pub fn parse_source(source: &str, name: &str) -> (Descriptors, FileId, Vec<Diagnostic>) {
    let mut db = Descriptors::new();
    let file = db.add_file(FileNode::new(name, std::sync::Arc::from(source), true));
    let diagnostics = Parser::new(source, &mut db, file).parse_file();
    (db, file, diagnostics)
}
