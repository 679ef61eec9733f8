//! The file set owns every file of a compilation. It loads sources, follows
//! imports to a fixed point and drives the hierarchy and resolver passes.

use crate::descriptor::{Descriptors, FileId, FileNode};
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::error::ProtoError;
use crate::hierarchy::{HierarchyBuilder, SymbolTable};
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::utils::normalize_file_name;
use crate::well_known::WellKnownTypes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings that shape loading and name resolution. Loadable from JSON or YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSetConfig {
    /// Roots searched in order for files and imports; the first hit wins.
    pub search_paths: Vec<PathBuf>,
    /// Stripped from absolute type names that do not resolve as written.
    pub package_prefix: Option<String>,
    /// Treat every import as `import public` when computing visibility.
    pub all_imports_public: bool,
    pub warn_unused_imports: bool,
}

impl Default for FileSetConfig {
    fn default() -> Self {
        FileSetConfig {
            search_paths: Vec::new(),
            package_prefix: None,
            all_imports_public: false,
            warn_unused_imports: true,
        }
    }
}

/// A virtual file system for schema sources.
pub trait SourceProvider {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads schema sources from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl SourceProvider for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Embedded schemas addressed by import name, consulted after the search paths.
pub trait ResourceProvider {
    fn get(&self, name: &str) -> Option<&str>;
}

type ImportFilter = Box<dyn Fn(&str) -> bool>;

pub struct FileSet {
    config: FileSetConfig,
    db: Descriptors,
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    by_name: HashMap<String, FileId>,
    sources: Box<dyn SourceProvider>,
    resources: Box<dyn ResourceProvider>,
    import_filter: Option<ImportFilter>,
    import_decisions: HashMap<String, bool>,
    /// Files below this index have been through every pass.
    processed: usize,
}

impl Default for FileSet {
    fn default() -> Self {
        Self::new(FileSetConfig::default())
    }
}

impl FileSet {
    pub fn new(config: FileSetConfig) -> Self {
        FileSet {
            config,
            db: Descriptors::new(),
            symbols: SymbolTable::new(),
            diagnostics: Vec::new(),
            by_name: HashMap::new(),
            sources: Box::new(OsFileSystem),
            resources: Box::new(WellKnownTypes),
            import_filter: None,
            import_decisions: HashMap::new(),
            processed: 0,
        }
    }

    pub fn with_source_provider(mut self, provider: impl SourceProvider + 'static) -> Self {
        self.sources = Box::new(provider);
        self
    }

    pub fn with_resource_provider(mut self, provider: impl ResourceProvider + 'static) -> Self {
        self.resources = Box::new(provider);
        self
    }

    /// Installs a predicate that every distinct import path must pass.
    pub fn with_import_filter(mut self, filter: impl Fn(&str) -> bool + 'static) -> Self {
        self.import_filter = Some(Box::new(filter));
        self
    }

    pub fn config(&self) -> &FileSetConfig {
        &self.config
    }

    pub fn db(&self) -> &Descriptors {
        &self.db
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Looks up a file by the name it was added or imported under.
    pub fn file(&self, name: &str) -> Result<FileId, ProtoError> {
        self.by_name
            .get(&normalize_file_name(name))
            .copied()
            .ok_or_else(|| ProtoError::UnknownFile {
                name: name.to_string(),
            })
    }

    /// Files requested for output, in the order they were added.
    pub fn output_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.db.file_ids().filter(|&f| self.db[f].include_in_output)
    }

    /// Adds a file. The text comes from `source` when given, otherwise from the
    /// search paths, otherwise from the embedded resources. Returns `false` when
    /// no text could be found. Adding a name that is already present is a no-op.
    pub fn add(&mut self, name: &str, include_in_output: bool, source: Option<&str>) -> Result<bool, ProtoError> {
        Ok(self.load(name, include_in_output, source)?.is_some())
    }

    fn load(&mut self, name: &str, include_in_output: bool, source: Option<&str>) -> Result<Option<FileId>, ProtoError> {
        let key = normalize_file_name(name);
        if let Some(&existing) = self.by_name.get(&key) {
            if let Some(text) = source {
                if *self.db[existing].source != *text {
                    return Err(ProtoError::ConflictingSource {
                        name: name.to_string(),
                    });
                }
            }
            if include_in_output {
                self.db[existing].include_in_output = true;
            }
            return Ok(Some(existing));
        }

        let text: Arc<str> = match source {
            Some(text) => Arc::from(text),
            None => match self.locate(name)? {
                Some(text) => text,
                None => {
                    log::debug!("'{name}' not found in search paths or resources");
                    return Ok(None);
                }
            },
        };

        let file = self.db.add_file(FileNode::new(name, Arc::clone(&text), include_in_output));
        self.by_name.insert(key, file);
        let diagnostics = Parser::new(&text, &mut self.db, file).parse_file();
        log::debug!("parsed '{name}' with {} diagnostics", diagnostics.len());
        self.diagnostics.extend(diagnostics);
        Ok(Some(file))
    }

    fn locate(&self, name: &str) -> Result<Option<Arc<str>>, ProtoError> {
        let candidates: Vec<PathBuf> = if self.config.search_paths.is_empty() {
            vec![PathBuf::from(name)]
        } else {
            self.config.search_paths.iter().map(|root| root.join(name)).collect()
        };
        for path in candidates {
            if !self.sources.exists(&path) {
                continue;
            }
            log::trace!("reading '{}'", path.display());
            let text = self.sources.read_to_string(&path).map_err(|source| ProtoError::Io {
                path: path.display().to_string(),
                source,
            })?;
            return Ok(Some(Arc::from(text)));
        }
        Ok(self.resources.get(name).map(Arc::from))
    }

    fn import_allowed(&mut self, path: &str) -> bool {
        let Some(filter) = self.import_filter.as_ref() else {
            return true;
        };
        *self
            .import_decisions
            .entry(path.to_string())
            .or_insert_with(|| filter(path))
    }

    /// Resolves imports until no file has pending ones, then runs the hierarchy,
    /// type, option and post-processing passes over every newly loaded file.
    pub fn process(&mut self) -> Result<(), ProtoError> {
        log::debug!("resolving imports");
        self.resolve_imports()?;

        let new_files = self.dependency_order(self.db.file_ids().skip(self.processed).collect());
        log::debug!("building hierarchy for {} files", new_files.len());
        for &file in &new_files {
            HierarchyBuilder::new(&mut self.db, &mut self.symbols, &mut self.diagnostics).build_file(file);
        }

        let mut resolver = Resolver::new(&mut self.db, &mut self.symbols, &self.config, &mut self.diagnostics);
        log::debug!("resolving types");
        for &file in &new_files {
            resolver.resolve_types(file);
        }
        log::debug!("resolving options");
        for &file in &new_files {
            resolver.resolve_options(file);
        }
        for &file in &new_files {
            resolver.classify_messages(file);
            resolver.report_unused_imports(file);
        }
        self.processed += new_files.len();
        Ok(())
    }

    /// Orders files so that each comes after the files it imports. Cycles are
    /// cut where they are first entered.
    fn dependency_order(&self, files: Vec<FileId>) -> Vec<FileId> {
        fn visit(db: &Descriptors, file: FileId, pending: &HashSet<FileId>, seen: &mut HashSet<FileId>, out: &mut Vec<FileId>) {
            if !pending.contains(&file) || !seen.insert(file) {
                return;
            }
            for &dependency in &db[file].dependencies {
                visit(db, dependency, pending, seen, out);
            }
            out.push(file);
        }

        let pending: HashSet<FileId> = files.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(files.len());
        for file in files {
            visit(&self.db, file, &pending, &mut seen, &mut out);
        }
        out
    }

    fn resolve_imports(&mut self) -> Result<(), ProtoError> {
        loop {
            let pending: Vec<FileId> = self
                .db
                .file_ids()
                .filter(|&f| self.db[f].has_pending_imports)
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            for file in pending {
                self.db[file].has_pending_imports = false;
                for index in 0..self.db[file].imports.len() {
                    self.resolve_import(file, index)?;
                }
            }
        }
    }

    fn resolve_import(&mut self, file: FileId, index: usize) -> Result<(), ProtoError> {
        let import = self.db[file].imports[index].clone();
        if import.file.is_some() {
            return Ok(());
        }
        if !self.import_allowed(&import.path) {
            self.diagnostics.push(Diagnostic::error(
                &import.token,
                ErrorCode::ImportDenied,
                format!("import \"{}\" is not allowed", import.path),
            ));
            return Ok(());
        }
        match self.load(&import.path, false, None)? {
            Some(dependency) if dependency == file => {
                log::debug!("'{}' imports itself", import.path);
            }
            Some(dependency) => {
                log::trace!("'{}' imports '{}'", self.db[file].name, import.path);
                let node = &mut self.db[file];
                node.imports[index].file = Some(dependency);
                if !node.dependencies.contains(&dependency) {
                    node.dependencies.push(dependency);
                }
            }
            None => self.diagnostics.push(Diagnostic::error(
                &import.token,
                ErrorCode::ImportNotFound,
                format!("import \"{}\" was not found", import.path),
            )),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldType, TypeRef};

    struct Memory(HashMap<PathBuf, String>);

    impl SourceProvider for Memory {
        fn exists(&self, path: &Path) -> bool {
            self.0.contains_key(path)
        }

        fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    fn memory(files: &[(&str, &str)]) -> Memory {
        Memory(files.iter().map(|(n, s)| (PathBuf::from(n), s.to_string())).collect())
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut set = FileSet::default();
        let source = "message M { optional int32 x = 1; optional int32 y = 1; }";
        assert!(set.add("a.proto", true, Some(source)).unwrap());
        assert!(set.add("A.proto", true, Some(source)).unwrap());
        set.process().unwrap();
        assert_eq!(set.db().files.len(), 1);
        assert_eq!(set.diagnostics().len(), 1);
    }

    #[test]
    fn test_conflicting_source_is_fatal() {
        let mut set = FileSet::default();
        set.add("a.proto", true, Some("message A {}")).unwrap();
        let err = set.add("a.proto", true, Some("message B {}")).unwrap_err();
        assert!(matches!(err, ProtoError::ConflictingSource { .. }));
    }

    #[test]
    fn test_imports_load_from_provider() {
        let mut set = FileSet::default().with_source_provider(memory(&[
            ("dep.proto", "package dep; message D {}"),
        ]));
        set.add("main.proto", true, Some("import \"dep.proto\"; message M { optional dep.D d = 1; }"))
            .unwrap();
        set.process().unwrap();
        assert!(set.diagnostics().is_empty(), "{:?}", set.diagnostics());
        let main = set.file("main.proto").unwrap();
        let dep = set.file("dep.proto").unwrap();
        assert_eq!(set.db()[main].dependencies, vec![dep]);
        assert_eq!(set.output_files().collect::<Vec<_>>(), vec![main]);

        let field = &set.db()[set.db()[set.db()[main].messages[0]].fields[0]];
        assert_eq!(field.ty, FieldType::Message);
        assert!(matches!(field.resolved_type, Some(TypeRef::Message(_))));
    }

    #[test]
    fn test_missing_and_denied_imports() {
        let mut set = FileSet::default()
            .with_source_provider(memory(&[("secret.proto", "")]))
            .with_import_filter(|path| !path.starts_with("secret"));
        set.add("main.proto", true, Some("import \"nowhere.proto\"; import \"secret.proto\";"))
            .unwrap();
        set.process().unwrap();
        let codes: Vec<_> = set.diagnostics().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![ErrorCode::ImportNotFound, ErrorCode::ImportDenied]);
    }

    #[test]
    fn test_import_cycle_is_tolerated() {
        let mut set = FileSet::default().with_source_provider(memory(&[
            ("a.proto", "import \"b.proto\"; message A { optional B b = 1; }"),
            ("b.proto", "import \"a.proto\"; message B { optional A a = 1; }"),
        ]));
        assert!(set.add("a.proto", true, None).unwrap());
        set.process().unwrap();
        assert!(!set.has_errors(), "{:?}", set.diagnostics());
        assert_eq!(set.db().files.len(), 2);
    }

    #[test]
    fn test_unknown_file() {
        let set = FileSet::default();
        assert!(matches!(set.file("x.proto"), Err(ProtoError::UnknownFile { .. })));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: FileSetConfig = serde_json::from_str(r#"{ "package_prefix": "com.acme" }"#).unwrap();
        assert!(config.warn_unused_imports);
        assert_eq!(config.package_prefix.as_deref(), Some("com.acme"));
        assert!(config.search_paths.is_empty());
    }
}
