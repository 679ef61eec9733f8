pub mod api;
pub mod cursor;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod fileset;
pub mod hierarchy;
pub mod hive;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod resolver;
pub mod serialization;
pub mod utils;
pub mod well_known;
pub mod wire;

pub use api::{analyze, analyze_with, AnalysisResult};
pub use diagnostics::{Diagnostic, ErrorCode, Severity};
pub use error::ProtoError;
pub use fileset::{FileSet, FileSetConfig, OsFileSystem, ResourceProvider, SourceProvider};
