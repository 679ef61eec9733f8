use crate::lexer::Token;
use crate::utils::get_offset;
use miette::{MietteDiagnostic, NamedSource, Report, Severity as MietteSeverity};
use serde::Serialize;
use std::fmt::{self, Display};

/// How bad a recorded problem is. Only `Error` entries should block generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Machine-readable classification of a diagnostic. The numbers are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    Syntax,
    UnexpectedEof,
    InvalidLiteral,
    InvalidEscape,
    InvalidUtf8,
    DuplicateName,
    DuplicateNumber,
    ReservedNumber,
    ReservedName,
    InvalidNumber,
    InvalidSyntaxVersion,
    TypeNotFound,
    TypeNotImported,
    WrongTypeKind,
    ImportNotFound,
    ImportDenied,
    UnusedImport,
    InvalidDefault,
    NotPackable,
    UnknownOption,
    OptionNotFound,
    OptionTypeMismatch,
    OptionAlreadySet,
    InvalidExtension,
    InvalidMapKey,
    InvalidLabel,
    UnknownError,
}

impl ErrorCode {
    pub fn number(self) -> u16 {
        match self {
            ErrorCode::Syntax => 1001,
            ErrorCode::UnexpectedEof => 1002,
            ErrorCode::InvalidLiteral => 1003,
            ErrorCode::InvalidEscape => 1004,
            ErrorCode::InvalidUtf8 => 1005,
            ErrorCode::InvalidSyntaxVersion => 1006,
            ErrorCode::InvalidLabel => 1007,
            ErrorCode::DuplicateName => 2001,
            ErrorCode::DuplicateNumber => 2002,
            ErrorCode::ReservedNumber => 2003,
            ErrorCode::ReservedName => 2004,
            ErrorCode::InvalidNumber => 2005,
            ErrorCode::InvalidMapKey => 2006,
            ErrorCode::TypeNotFound => 3001,
            ErrorCode::TypeNotImported => 3002,
            ErrorCode::WrongTypeKind => 3003,
            ErrorCode::InvalidDefault => 3004,
            ErrorCode::NotPackable => 3005,
            ErrorCode::InvalidExtension => 3006,
            ErrorCode::ImportNotFound => 4001,
            ErrorCode::ImportDenied => 4002,
            ErrorCode::UnusedImport => 4003,
            ErrorCode::UnknownOption => 5001,
            ErrorCode::OptionNotFound => 5002,
            ErrorCode::OptionTypeMismatch => 5003,
            ErrorCode::OptionAlreadySet => 5004,
            ErrorCode::UnknownError => 9999,
        }
    }
}

/// A recoverable problem found while compiling a file set.
///
/// Diagnostics are appended to the list owned by the `FileSet` and are never
/// thrown; the caller decides whether any error entries block downstream use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub message: String,
    pub severity: Severity,
    pub code: ErrorCode,
}

impl Diagnostic {
    pub fn error(token: &Token, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::at(token, Severity::Error, code, message)
    }

    pub fn warning(token: &Token, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::at(token, Severity::Warning, code, message)
    }

    pub fn at(token: &Token, severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        let width = token.value.chars().count().max(1);
        Diagnostic {
            file: token.file.to_string(),
            line: token.line,
            column: token.column,
            end_line: token.line,
            end_column: token.column + width - 1,
            message: message.into(),
            severity,
            code,
        }
    }

    /// A diagnostic not tied to any token, e.g. a missing root file.
    pub fn file_level(file: &str, severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Diagnostic {
            file: file.to_string(),
            line: 1,
            column: 1,
            end_line: 1,
            end_column: 1,
            message: message.into(),
            severity,
            code,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Wraps this record into a `miette::Report` pointing into `source`.
    pub fn to_report(&self, source: &str) -> Report {
        let start = get_offset(source, self.line, self.column);
        let end = get_offset(source, self.end_line, self.end_column + 1).max(start);
        let severity = match self.severity {
            Severity::Error => MietteSeverity::Error,
            Severity::Warning => MietteSeverity::Warning,
        };
        let diagnostic = MietteDiagnostic::new(self.message.clone())
            .with_code(format!("proto::{:04}", self.code.number()))
            .with_severity(severity)
            .with_label(miette::LabeledSpan::at((start, end - start), "here"));
        Report::new(diagnostic).with_source_code(NamedSource::new(self.file.clone(), source.to_string()))
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{}", self.file, self.line, self.column)?;
        if self.end_line != self.line || self.end_column != self.column {
            write!(f, ",{},{}", self.end_line, self.end_column)?;
        }
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "): {} {:04}: {}", kind, self.code.number(), self.message)
    }
}
