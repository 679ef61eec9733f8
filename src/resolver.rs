use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::fileset::FileSetConfig;
use crate::hierarchy::{qualify, Symbol, SymbolTable};
use crate::hive::OptionHive;
use crate::lexer::Token;
use std::collections::{HashMap, HashSet};

/// Why a name could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    WrongKind(Symbol),
    NotImported(FileId),
}

impl LookupError {
    fn rank(self) -> u8 {
        match self {
            LookupError::NotFound => 0,
            LookupError::WrongKind(_) => 1,
            LookupError::NotImported(_) => 2,
        }
    }

    /// Keeps whichever of two failures says more about the name.
    fn most_specific(self, other: LookupError) -> LookupError {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// Files a given file may see, and which of its direct imports exposes each.
#[derive(Debug, Default)]
struct Visibility {
    files: HashSet<FileId>,
    providers: Vec<(usize, HashSet<FileId>)>,
}

/// Every message, field and enum declared in one file, in declaration order.
#[derive(Debug, Default)]
pub(crate) struct FileContents {
    pub messages: Vec<MessageId>,
    pub fields: Vec<FieldId>,
    pub enums: Vec<EnumId>,
}

pub(crate) fn collect_contents(db: &Descriptors, file: FileId) -> FileContents {
    fn walk(db: &Descriptors, message: MessageId, out: &mut FileContents) {
        out.messages.push(message);
        out.fields.extend(db[message].fields.iter().copied());
        out.fields.extend(db[message].extensions.iter().copied());
        out.enums.extend(db[message].enums.iter().copied());
        for &nested in &db[message].messages {
            walk(db, nested, out);
        }
    }
    let mut out = FileContents::default();
    for &message in &db[file].messages {
        walk(db, message, &mut out);
    }
    out.fields.extend(db[file].extensions.iter().copied());
    out.enums.extend(db[file].enums.iter().copied());
    out
}

/// Resolves type names, extendees, method types and custom options of files
/// whose hierarchy has been built.
pub struct Resolver<'a> {
    pub(crate) db: &'a mut Descriptors,
    pub(crate) symbols: &'a mut SymbolTable,
    config: &'a FileSetConfig,
    pub(crate) diagnostics: &'a mut Vec<Diagnostic>,
    visibility: HashMap<FileId, Visibility>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        db: &'a mut Descriptors,
        symbols: &'a mut SymbolTable,
        config: &'a FileSetConfig,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            db,
            symbols,
            config,
            diagnostics,
            visibility: HashMap::new(),
        }
    }

    // === Name lookup ===

    /// Resolves `name` as seen from `scope` in `file`, accepting only symbols
    /// for which `accept` holds.
    pub fn lookup(
        &mut self,
        file: FileId,
        scope: Scope,
        name: &str,
        accept: fn(Symbol) -> bool,
    ) -> Result<Symbol, LookupError> {
        let mut failure = LookupError::NotFound;

        if let Some(absolute) = name.strip_prefix('.') {
            let mut candidates = vec![absolute.to_string()];
            if let Some(prefix) = self.config.package_prefix.as_deref().filter(|p| !p.is_empty()) {
                if let Some(rest) = absolute.strip_prefix(prefix).and_then(|r| r.strip_prefix('.')) {
                    candidates.push(rest.to_string());
                }
            }
            for candidate in candidates {
                match self.find_visible(file, &candidate, accept) {
                    Ok(symbol) => return Ok(symbol),
                    Err(err) => failure = failure.most_specific(err),
                }
            }
            return Err(failure);
        }

        let first = name.split('.').next().unwrap_or(name);
        let compound = first.len() != name.len();
        for prefix in self.scope_chain(file, scope) {
            // For `A.B`, the innermost scope declaring an aggregate `A` is where `B` is
            // sought, and only there.
            if compound {
                let head = qualify(&prefix, first);
                if !self.symbols.get(&head).iter().any(|e| e.symbol.is_aggregate()) {
                    continue;
                }
                return self.find_visible(file, &qualify(&prefix, name), accept);
            }
            match self.find_visible(file, &qualify(&prefix, name), accept) {
                Ok(symbol) => return Ok(symbol),
                Err(err) => failure = failure.most_specific(err),
            }
        }
        Err(failure)
    }

    fn find_visible(&mut self, file: FileId, full_name: &str, accept: fn(Symbol) -> bool) -> Result<Symbol, LookupError> {
        let entries = self.symbols.get(full_name).to_vec();
        let Some(first) = entries.first() else {
            return Err(LookupError::NotFound);
        };
        let accepted: Vec<_> = entries.iter().filter(|e| accept(e.symbol)).copied().collect();
        let Some(candidate) = accepted.first() else {
            return Err(LookupError::WrongKind(first.symbol));
        };
        match accepted.iter().find(|e| self.is_visible(file, e.file)) {
            Some(entry) => {
                self.mark_used(file, entry.file);
                Ok(entry.symbol)
            }
            None => Err(LookupError::NotImported(candidate.file)),
        }
    }

    /// Enclosing scope names, innermost first: messages, then package components, then the root.
    fn scope_chain(&self, file: FileId, scope: Scope) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(Scope::Message(message)) = current {
            chain.push(self.db.scope_name(Scope::Message(message)));
            current = self.db[message].parent;
        }
        let package = self.db[file].package.clone().unwrap_or_default();
        let mut prefix = package.as_str();
        loop {
            chain.push(prefix.to_string());
            if prefix.is_empty() {
                break;
            }
            prefix = prefix.rfind('.').map_or("", |i| &prefix[..i]);
        }
        chain
    }

    fn visibility(&mut self, file: FileId) -> &Visibility {
        let all_public = self.config.all_imports_public;
        let db = &*self.db;
        self.visibility.entry(file).or_insert_with(|| {
            let mut visibility = Visibility::default();
            visibility.files.insert(file);
            for (index, import) in db[file].imports.iter().enumerate() {
                if let Some(dependency) = import.file {
                    let mut exposed = HashSet::new();
                    collect_public(db, dependency, all_public, &mut exposed);
                    visibility.files.extend(exposed.iter().copied());
                    visibility.providers.push((index, exposed));
                }
            }
            visibility
        })
    }

    fn is_visible(&mut self, file: FileId, target: FileId) -> bool {
        self.visibility(file).files.contains(&target)
    }

    fn mark_used(&mut self, file: FileId, target: FileId) {
        if file == target {
            return;
        }
        let provider = self
            .visibility(file)
            .providers
            .iter()
            .find(|(_, exposed)| exposed.contains(&target))
            .map(|(index, _)| *index);
        if let Some(index) = provider {
            self.db[file].imports[index].used = true;
        }
    }

    pub(crate) fn report_lookup(&mut self, err: LookupError, token: &Token, name: &str, expected: &str, not_found: ErrorCode) {
        let diagnostic = match err {
            LookupError::NotFound => Diagnostic::error(token, not_found, format!("'{name}' is not defined")),
            LookupError::NotImported(defined_in) => {
                let current = &token.file;
                Diagnostic::error(
                    token,
                    ErrorCode::TypeNotImported,
                    format!(
                        "'{name}' is defined in '{}', which is not imported by '{current}'",
                        self.db[defined_in].name
                    ),
                )
            }
            LookupError::WrongKind(symbol) => Diagnostic::error(
                token,
                ErrorCode::WrongTypeKind,
                format!("'{name}' is a {}, not {expected}", symbol.describe()),
            ),
        };
        self.diagnostics.push(diagnostic);
    }

    // === Structural pass ===

    /// Resolves field types, extendees and method signatures of one file.
    pub fn resolve_types(&mut self, file: FileId) {
        log::trace!("resolving types in {}", self.db[file].name);
        let contents = collect_contents(self.db, file);
        for &field in &contents.fields {
            self.resolve_field_type(file, field);
            self.resolve_extendee(file, field);
            self.check_default(field);
            self.check_packed(field);
        }
        for service in self.db[file].services.clone() {
            for method in self.db[service].methods.clone() {
                self.resolve_method(file, method);
            }
        }
    }

    fn resolve_field_type(&mut self, file: FileId, field: FieldId) {
        let node = &self.db[field];
        let Some(type_name) = node.type_name.clone() else {
            return;
        };
        let scope = node.parent.unwrap_or(Scope::File(file));
        let is_group = node.ty == FieldType::Group;
        let accept: fn(Symbol) -> bool = if is_group {
            |s| matches!(s, Symbol::Message(_))
        } else {
            |s| matches!(s, Symbol::Message(_) | Symbol::Enum(_))
        };
        match self.lookup(file, scope, &type_name, accept) {
            Ok(Symbol::Message(message)) => {
                let full_name = self.db[message].full_name.clone();
                let node = &mut self.db[field];
                if !is_group {
                    node.ty = FieldType::Message;
                }
                node.type_name = Some(full_name);
                node.resolved_type = Some(TypeRef::Message(message));
            }
            Ok(Symbol::Enum(enum_id)) => {
                let full_name = self.db[enum_id].full_name.clone();
                let node = &mut self.db[field];
                node.ty = FieldType::Enum;
                node.type_name = Some(full_name);
                node.resolved_type = Some(TypeRef::Enum(enum_id));
            }
            Ok(_) => {}
            Err(err) => {
                let token = self.db[field].type_token.clone();
                self.report_lookup(err, &token, &type_name, "a message or enum type", ErrorCode::TypeNotFound);
            }
        }
    }

    fn resolve_extendee(&mut self, file: FileId, field: FieldId) {
        let node = &self.db[field];
        let Some(extendee) = node.extendee.clone() else {
            return;
        };
        let scope = node.parent.unwrap_or(Scope::File(file));
        let token = node.token.clone();
        let number = node.number;
        let message = match self.lookup(file, scope, &extendee, |s| matches!(s, Symbol::Message(_))) {
            Ok(Symbol::Message(message)) => message,
            Ok(_) => return,
            Err(err) => {
                self.report_lookup(err, &token, &extendee, "a message", ErrorCode::TypeNotFound);
                return;
            }
        };
        let full_name = self.db[message].full_name.clone();
        {
            let node = &mut self.db[field];
            node.extendee = Some(full_name.clone());
            node.resolved_extendee = Some(message);
        }

        if !self.db[message].extension_ranges.iter().any(|r| r.range.contains(number)) {
            self.diagnostics.push(Diagnostic::error(
                &token,
                ErrorCode::InvalidExtension,
                format!("'{full_name}' does not declare {number} as an extension number"),
            ));
            return;
        }
        match self.symbols.extension_numbers.get(&(message, number)).copied() {
            Some(other) if other != field => {
                let other_name = self.db[other].full_name.clone();
                self.diagnostics.push(Diagnostic::error(
                    &token,
                    ErrorCode::InvalidExtension,
                    format!("extension number {number} of '{full_name}' is already used by '{other_name}'"),
                ));
            }
            Some(_) => {}
            None => {
                self.symbols.extension_numbers.insert((message, number), field);
            }
        }
    }

    /// Validates enum defaults and fills in the implicit default of required enum fields.
    fn check_default(&mut self, field: FieldId) {
        let node = &self.db[field];
        match (node.ty, node.resolved_type) {
            (FieldType::Enum, Some(TypeRef::Enum(enum_id))) => match node.default_value.clone() {
                Some(default) => {
                    if self.db.find_enum_value(enum_id, &default).is_none() {
                        let message = format!(
                            "enum type '{}' has no value named '{}'",
                            self.db[enum_id].full_name.trim_start_matches('.'),
                            default
                        );
                        let token = node.token.clone();
                        self.diagnostics.push(Diagnostic::error(&token, ErrorCode::InvalidDefault, message));
                    }
                }
                None if node.label == Label::Required => {
                    let first = self.db[enum_id].values.first().map(|&v| self.db[v].name.clone());
                    self.db[field].default_value = first;
                }
                None => {}
            },
            (FieldType::Message, _) if node.default_value.is_some() => {
                let token = node.token.clone();
                self.diagnostics.push(Diagnostic::error(
                    &token,
                    ErrorCode::InvalidDefault,
                    "messages can't have default values",
                ));
                self.db[field].default_value = None;
            }
            _ => {}
        }
    }

    fn check_packed(&mut self, field: FieldId) {
        let node = &self.db[field];
        if !node.is_packed() || (node.label == Label::Repeated && node.ty.is_packable()) {
            return;
        }
        let token = node.token.clone();
        self.diagnostics.push(Diagnostic::error(
            &token,
            ErrorCode::NotPackable,
            format!(
                "[packed = true] can only be specified for repeated primitive fields; '{}' is a {} {}",
                node.name,
                node.label.name(),
                node.ty.name()
            ),
        ));
        if let Some(options) = self.db[field].options.as_mut() {
            options.set_bool("packed", false, token);
        }
    }

    fn resolve_method(&mut self, file: FileId, method: MethodId) {
        let node = &self.db[method];
        let requests = [
            (node.input_type.clone(), node.input_token.clone(), true),
            (node.output_type.clone(), node.output_token.clone(), false),
        ];
        for (name, token, is_input) in requests {
            match self.lookup(file, Scope::File(file), &name, |s| matches!(s, Symbol::Message(_))) {
                Ok(Symbol::Message(message)) => {
                    let full_name = self.db[message].full_name.clone();
                    let node = &mut self.db[method];
                    if is_input {
                        node.input_type = full_name;
                        node.resolved_input = Some(message);
                    } else {
                        node.output_type = full_name;
                        node.resolved_output = Some(message);
                    }
                }
                Ok(_) => {}
                Err(err) => self.report_lookup(err, &token, &name, "a message", ErrorCode::TypeNotFound),
            }
        }
    }

    // === Option pass ===

    /// Interprets the custom options of every node in one file.
    pub fn resolve_options(&mut self, file: FileId) {
        log::trace!("resolving options in {}", self.db[file].name);
        let contents = collect_contents(self.db, file);
        let file_scope = Scope::File(file);

        let mut options = self.db[file].options.take();
        self.interpret(&mut options, file, file_scope);
        self.db[file].options = options;

        for &message in &contents.messages {
            let scope = Scope::Message(message);
            let mut options = self.db[message].options.take();
            self.interpret(&mut options, file, scope);
            self.db[message].options = options;

            for index in 0..self.db[message].extension_ranges.len() {
                let mut options = self.db[message].extension_ranges[index].options.take();
                self.interpret(&mut options, file, scope);
                self.db[message].extension_ranges[index].options = options;
            }
            for oneof in self.db[message].oneofs.clone() {
                let mut options = self.db[oneof].options.take();
                self.interpret(&mut options, file, scope);
                self.db[oneof].options = options;
            }
        }
        for &field in &contents.fields {
            let scope = self.db[field].parent.unwrap_or(file_scope);
            let mut options = self.db[field].options.take();
            self.interpret(&mut options, file, scope);
            self.db[field].options = options;
        }
        for &enum_id in &contents.enums {
            let scope = self.db[enum_id].parent.unwrap_or(file_scope);
            let mut options = self.db[enum_id].options.take();
            self.interpret(&mut options, file, scope);
            self.db[enum_id].options = options;
            for value in self.db[enum_id].values.clone() {
                let mut options = self.db[value].options.take();
                self.interpret(&mut options, file, scope);
                self.db[value].options = options;
            }
        }
        for service in self.db[file].services.clone() {
            let mut options = self.db[service].options.take();
            self.interpret(&mut options, file, file_scope);
            self.db[service].options = options;
            for method in self.db[service].methods.clone() {
                let mut options = self.db[method].options.take();
                self.interpret(&mut options, file, file_scope);
                self.db[method].options = options;
            }
        }
    }

    fn interpret(&mut self, options: &mut Option<OptionsNode>, file: FileId, scope: Scope) {
        let Some(options) = options.as_mut() else {
            return;
        };
        if options.uninterpreted.is_empty() {
            return;
        }
        let uninterpreted = std::mem::take(&mut options.uninterpreted);
        let mut hive = OptionHive::from_options(&uninterpreted);
        hive.resolve_root(self, file, scope, options.kind);
        options.extension_data = hive.serialize(self, options.kind);
    }

    // === Post-processing ===

    /// Tags each message as a plain message, a map entry or a single-field wrapper.
    pub fn classify_messages(&mut self, file: FileId) {
        for message in collect_contents(self.db, file).messages {
            let node = &self.db[message];
            let kind = if node.kind == MessageKind::MapEntry || node.is_map_entry() {
                MessageKind::MapEntry
            } else if let [only] = node.fields.as_slice() {
                let field = &self.db[*only];
                if field.number == 1 && field.label != Label::Repeated {
                    MessageKind::Wrapper
                } else {
                    MessageKind::Message
                }
            } else {
                MessageKind::Message
            };
            self.db[message].kind = kind;
        }
    }

    /// Warns about non-public imports that resolved no reference.
    pub fn report_unused_imports(&mut self, file: FileId) {
        let node = &self.db[file];
        if !node.include_in_output || !self.config.warn_unused_imports {
            return;
        }
        for import in &node.imports {
            if import.used || import.kind == ImportKind::Public || import.file.is_none() {
                continue;
            }
            self.diagnostics.push(Diagnostic::warning(
                &import.token,
                ErrorCode::UnusedImport,
                format!("import \"{}\" is never used", import.path),
            ));
        }
    }
}

fn collect_public(db: &Descriptors, file: FileId, all_public: bool, out: &mut HashSet<FileId>) {
    if !out.insert(file) {
        return;
    }
    for import in &db[file].imports {
        if let Some(dependency) = import.file {
            if all_public || import.kind == ImportKind::Public {
                collect_public(db, dependency, all_public, out);
            }
        }
    }
}
