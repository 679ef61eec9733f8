use miette::Diagnostic;
use thiserror::Error;

/// Fatal errors: broken caller contracts and I/O failures. Problems in the
/// schema text itself are never reported this way; they accumulate as
/// [`crate::diagnostics::Diagnostic`] records on the file set.
#[derive(Error, Debug, Diagnostic)]
pub enum ProtoError {
    #[error("file '{name}' was already added with different source text")]
    #[diagnostic(
        code(fileset::conflicting_source),
        help("Each file name identifies exactly one schema; add it once, or use a different name.")
    )]
    ConflictingSource { name: String },

    #[error("failed to read '{path}'")]
    #[diagnostic(code(fileset::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file '{name}' is not part of this file set")]
    #[diagnostic(
        code(fileset::unknown_file),
        help("Add the file, or a search path containing it, before asking for it.")
    )]
    UnknownFile { name: String },

    #[error("failed to serialize the descriptor model")]
    #[diagnostic(code(api::serialization))]
    Serialization(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for ProtoError {
    fn from(err: serde_json::Error) -> Self {
        ProtoError::Serialization(Box::new(err))
    }
}

impl From<serde_yaml::Error> for ProtoError {
    fn from(err: serde_yaml::Error) -> Self {
        ProtoError::Serialization(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_file() {
        let err = ProtoError::ConflictingSource {
            name: "a.proto".to_string(),
        };
        assert_eq!(err.to_string(), "file 'a.proto' was already added with different source text");
        assert_eq!(err.code().map(|c| c.to_string()).as_deref(), Some("fileset::conflicting_source"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = ProtoError::Io {
            path: "missing.proto".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}
