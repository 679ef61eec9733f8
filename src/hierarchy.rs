//! Post-parse linking: parent back-references, fully-qualified names and the
//! global symbol table used by name resolution.

use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::lexer::Token;
use std::collections::HashMap;

/// Anything addressable by a fully-qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Package,
    Message(MessageId),
    Enum(EnumId),
    EnumValue(EnumValueId),
    Extension(FieldId),
    Service(ServiceId),
    Method(MethodId),
}

impl Symbol {
    /// Symbols that can contain other named symbols.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Symbol::Package | Symbol::Message(_) | Symbol::Enum(_) | Symbol::Service(_)
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            Symbol::Package => "package",
            Symbol::Message(_) => "message",
            Symbol::Enum(_) => "enum",
            Symbol::EnumValue(_) => "enum value",
            Symbol::Extension(_) => "extension",
            Symbol::Service(_) => "service",
            Symbol::Method(_) => "method",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry {
    pub symbol: Symbol,
    pub file: FileId,
}

/// Fully-qualified names (without the leading dot) of every file in the set.
/// A package name may be contributed by many files; any other name has exactly
/// one definition.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: HashMap<String, Vec<SymbolEntry>>,
    /// Extension numbers claimed per extendee.
    pub(crate) extension_numbers: HashMap<(MessageId, i32), FieldId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> &[SymbolEntry] {
        self.entries.get(name.trim_start_matches('.')).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.get(name).is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a message by fully-qualified name, ignoring visibility.
    pub fn find_message(&self, name: &str) -> Option<MessageId> {
        self.get(name).iter().find_map(|e| match e.symbol {
            Symbol::Message(id) => Some(id),
            _ => None,
        })
    }
}

/// Builds the hierarchy for newly parsed files.
pub struct HierarchyBuilder<'a> {
    db: &'a mut Descriptors,
    symbols: &'a mut SymbolTable,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(db: &'a mut Descriptors, symbols: &'a mut SymbolTable, diagnostics: &'a mut Vec<Diagnostic>) -> Self {
        Self {
            db,
            symbols,
            diagnostics,
        }
    }

    pub fn build_file(&mut self, file: FileId) {
        let package = self.db[file].package.clone().unwrap_or_default();
        if !package.is_empty() {
            let mut prefix = String::new();
            for part in package.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                self.register(prefix.clone(), Symbol::Package, file, None);
            }
        }

        let scope = Scope::File(file);
        for message in self.db[file].messages.clone() {
            self.build_message(message, scope, &package);
        }
        for enum_id in self.db[file].enums.clone() {
            self.build_enum(enum_id, scope, &package);
        }
        for extension in self.db[file].extensions.clone() {
            self.build_extension(extension, scope, &package);
        }
        for service in self.db[file].services.clone() {
            let full_name = qualify(&package, &self.db[service].name);
            let node = &mut self.db[service];
            node.parent = Some(file);
            node.full_name = format!(".{full_name}");
            let token = node.token.clone();
            self.register(full_name.clone(), Symbol::Service(service), file, Some(token));
            for method in self.db[service].methods.clone() {
                let method_name = qualify(&full_name, &self.db[method].name);
                let node = &mut self.db[method];
                node.parent = Some(service);
                node.full_name = format!(".{method_name}");
                let token = node.token.clone();
                self.register(method_name, Symbol::Method(method), file, Some(token));
            }
        }
    }

    fn build_message(&mut self, id: MessageId, parent: Scope, prefix: &str) {
        let full_name = qualify(prefix, &self.db[id].name);
        let file = self.db[id].file;
        {
            let node = &mut self.db[id];
            node.parent = Some(parent);
            node.full_name = format!(".{full_name}");
        }
        let token = self.db[id].token.clone();
        self.register(full_name.clone(), Symbol::Message(id), file, Some(token));

        let scope = Scope::Message(id);
        for field in self.db[id].fields.clone() {
            let name = qualify(&full_name, &self.db[field].name);
            let node = &mut self.db[field];
            node.parent = Some(scope);
            node.full_name = format!(".{name}");
        }
        for oneof in self.db[id].oneofs.clone() {
            let name = qualify(&full_name, &self.db[oneof].name);
            let node = &mut self.db[oneof];
            node.parent = Some(id);
            node.full_name = format!(".{name}");
        }
        for nested in self.db[id].messages.clone() {
            self.build_message(nested, scope, &full_name);
        }
        for enum_id in self.db[id].enums.clone() {
            self.build_enum(enum_id, scope, &full_name);
        }
        for extension in self.db[id].extensions.clone() {
            self.build_extension(extension, scope, &full_name);
        }
    }

    /// Enum values are siblings of their enum, not children of it.
    fn build_enum(&mut self, id: EnumId, parent: Scope, prefix: &str) {
        let full_name = qualify(prefix, &self.db[id].name);
        let file = self.db[id].file;
        {
            let node = &mut self.db[id];
            node.parent = Some(parent);
            node.full_name = format!(".{full_name}");
        }
        let token = self.db[id].token.clone();
        self.register(full_name, Symbol::Enum(id), file, Some(token));
        for value in self.db[id].values.clone() {
            let name = qualify(prefix, &self.db[value].name);
            let node = &mut self.db[value];
            node.parent = Some(id);
            node.full_name = format!(".{name}");
            let token = node.token.clone();
            self.register(name, Symbol::EnumValue(value), file, Some(token));
        }
    }

    fn build_extension(&mut self, id: FieldId, parent: Scope, prefix: &str) {
        let full_name = qualify(prefix, &self.db[id].name);
        let node = &mut self.db[id];
        node.parent = Some(parent);
        node.full_name = format!(".{full_name}");
        let (file, token) = (node.file, node.token.clone());
        self.register(full_name, Symbol::Extension(id), file, Some(token));
    }

    fn register(&mut self, name: String, symbol: Symbol, file: FileId, token: Option<Token>) {
        let existing = self.symbols.entries.entry(name.clone()).or_default();
        let Some(first) = existing.first().copied() else {
            existing.push(SymbolEntry { symbol, file });
            return;
        };
        if symbol == Symbol::Package && first.symbol == Symbol::Package {
            if !existing.iter().any(|e| e.file == file) {
                existing.push(SymbolEntry { symbol, file });
            }
            return;
        }
        if self.already_reported(first, symbol, file) {
            return;
        }
        let Some(token) = token.or_else(|| self.symbol_token(first.symbol)) else {
            return;
        };
        let message = if first.symbol == Symbol::Package {
            format!("'{name}' is already defined as a package")
        } else if first.file == file {
            format!("'{name}' is already defined as a {}", first.symbol.describe())
        } else {
            format!("'{name}' is already defined in file '{}'", self.db[first.file].name)
        };
        self.diagnostics.push(Diagnostic::error(&token, ErrorCode::DuplicateName, message));
    }

    /// Same-scope duplicates within one file were reported by the parser.
    fn already_reported(&self, first: SymbolEntry, symbol: Symbol, file: FileId) -> bool {
        if first.file != file {
            return false;
        }
        match (first.symbol, symbol) {
            (Symbol::EnumValue(a), Symbol::EnumValue(b)) => self.db[a].parent == self.db[b].parent,
            (Symbol::EnumValue(_), _) | (_, Symbol::EnumValue(_)) => false,
            (Symbol::Package, _) | (_, Symbol::Package) => false,
            _ => true,
        }
    }

    fn symbol_token(&self, symbol: Symbol) -> Option<Token> {
        Some(match symbol {
            Symbol::Package => return None,
            Symbol::Message(id) => self.db[id].token.clone(),
            Symbol::Enum(id) => self.db[id].token.clone(),
            Symbol::EnumValue(id) => self.db[id].token.clone(),
            Symbol::Extension(id) => self.db[id].token.clone(),
            Symbol::Service(id) => self.db[id].token.clone(),
            Symbol::Method(id) => self.db[id].token.clone(),
        })
    }
}

/// Joins a scope name and a simple name with a dot, if the scope is non-empty.
pub fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}
