use crate::diagnostics::{Diagnostic, ErrorCode, Severity};
use crate::error::ProtoError;
use crate::fileset::{FileSet, FileSetConfig};
use crate::serialization::{file_view, FileView};
use miette::{GraphicalReportHandler, GraphicalTheme};
use serde::{Serialize, Serializer};

/// The result of compiling a set of schema files.
/// Holds the file set with its fully resolved descriptor model, and the
/// diagnostics collected on the way. Only files requested for output are
/// serialized; imported files stay reachable through `file_set`.
pub struct AnalysisResult {
    pub file_set: FileSet,
}

impl Serialize for AnalysisResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl AnalysisResult {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.file_set.diagnostics()
    }

    pub fn has_errors(&self) -> bool {
        self.file_set.has_errors()
    }

    /// The output files as serializable views.
    #[must_use]
    pub fn to_value(&self) -> Vec<FileView> {
        let db = self.file_set.db();
        self.file_set.output_files().map(|f| file_view(db, f)).collect()
    }

    /// Serializes the output files into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns `ProtoError::Serialization` if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Serializes the output files into a YAML string.
    ///
    /// # Errors
    /// Returns `ProtoError::Serialization` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ProtoError> {
        Ok(serde_yaml::to_string(&self)?)
    }

    /// Renders every diagnostic with its source snippet, without colors.
    #[must_use]
    pub fn render_diagnostics(&self) -> String {
        let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
        let mut out = String::new();
        for diagnostic in self.diagnostics() {
            let source = self
                .file_set
                .file(&diagnostic.file)
                .map(|f| self.file_set.db()[f].source.to_string())
                .unwrap_or_default();
            let report = diagnostic.to_report(&source);
            if handler.render_report(&mut out, &*report).is_err() {
                out.push_str(&diagnostic.to_string());
                out.push('\n');
            }
        }
        out
    }
}

/// Compiles a single schema given as text.
///
/// Imports are looked up relative to the current directory and among the
/// embedded well-known schemas.
///
/// # Errors
///
/// Returns a `ProtoError` only for I/O failures while reading imports.
pub fn analyze(source: &str, file_name: &str) -> Result<AnalysisResult, ProtoError> {
    analyze_with(FileSetConfig::default(), &[(file_name, Some(source))])
}

/// Compiles several root files. A root given without text is read from the
/// configured search paths; a root that cannot be found is reported as a
/// diagnostic against its name.
///
/// # Errors
///
/// Returns a `ProtoError` when a name is given twice with different text, or
/// when a file cannot be read.
pub fn analyze_with(config: FileSetConfig, inputs: &[(&str, Option<&str>)]) -> Result<AnalysisResult, ProtoError> {
    let mut file_set = FileSet::new(config);
    for (name, source) in inputs {
        if !file_set.add(name, true, *source)? {
            file_set.push_diagnostic(Diagnostic::file_level(
                name,
                Severity::Error,
                ErrorCode::ImportNotFound,
                format!("file '{name}' was not found"),
            ));
        }
    }
    file_set.process()?;
    log::debug!("analysis finished with {} diagnostics", file_set.diagnostics().len());
    Ok(AnalysisResult { file_set })
}

#[cfg(test)]
mod tests {
    use crate::analyze;

    #[test]
    fn test_simple_schema_to_json() {
        let source = r#"
            syntax = "proto3";
            package demo;
            message Point { int32 x = 1; int32 y = 2; }
        "#;

        let result = analyze(source, "point.proto").unwrap();
        assert!(!result.has_errors());
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        let expected = serde_json::json!([{
            "name": "point.proto",
            "package": "demo",
            "syntax": "proto3",
            "messages": [{
                "name": "Point",
                "full_name": ".demo.Point",
                "kind": "message",
                "fields": [
                    { "name": "x", "number": 1, "label": "optional", "type": "int32", "json_name": "x" },
                    { "name": "y", "number": 2, "label": "optional", "type": "int32", "json_name": "y" }
                ]
            }]
        }]);
        assert_eq!(json, expected);
    }

    #[test]
    fn test_simple_schema_to_yaml() {
        let result = analyze("enum E { A = 0; }", "e.proto").unwrap();
        let yaml = result.to_yaml().unwrap();
        assert!(yaml.contains("full_name: .E"));
        assert!(yaml.contains("syntax: proto2"));
    }

    #[test]
    fn test_rendered_diagnostics_name_the_file() {
        let result = analyze("message M { optional Missing m = 1; }", "broken.proto").unwrap();
        assert!(result.has_errors());
        let rendered = result.render_diagnostics();
        assert!(rendered.contains("broken.proto"));
        assert!(rendered.contains("'Missing' is not defined"));
    }
}
