// API error paths: fatal errors, missing files and diagnostics rendering
use proto_core::{analyze, analyze_with, ErrorCode, FileSet, FileSetConfig, ProtoError, Severity};
use tempfile::tempdir;

#[test]
fn test_conflicting_sources_fail_loudly() {
    let result = analyze_with(
        FileSetConfig::default(),
        &[("a.proto", Some("message A {}")), ("a.proto", Some("message B {}"))],
    );
    match result {
        Err(ProtoError::ConflictingSource { name }) => assert_eq!(name, "a.proto"),
        other => panic!("expected ConflictingSource, got {:?}", other.err()),
    }
}

#[test]
fn test_same_source_twice_is_fine() {
    let result = analyze_with(
        FileSetConfig::default(),
        &[("a.proto", Some("message A {}")), ("A.PROTO", Some("message A {}"))],
    )
    .unwrap();
    assert!(result.diagnostics().is_empty());
    assert_eq!(result.to_value().len(), 1);
}

#[test]
fn test_missing_root_is_a_diagnostic() {
    let dir = tempdir().unwrap();
    let config = FileSetConfig {
        search_paths: vec![dir.path().to_path_buf()],
        ..FileSetConfig::default()
    };
    let result = analyze_with(config, &[("nope.proto", None)]).unwrap();
    assert_eq!(result.diagnostics().len(), 1);
    let diagnostic = &result.diagnostics()[0];
    assert_eq!(diagnostic.code, ErrorCode::ImportNotFound);
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.file, "nope.proto");
}

#[test]
fn test_missing_import_points_at_the_import() {
    let result = analyze("\nimport \"gone.proto\";\nmessage M {}", "main.proto").unwrap();
    assert_eq!(result.diagnostics().len(), 1);
    let diagnostic = &result.diagnostics()[0];
    assert_eq!(diagnostic.code, ErrorCode::ImportNotFound);
    assert_eq!((diagnostic.line, diagnostic.column), (2, 8));
}

#[test]
fn test_unreadable_search_path_entry_is_io_error() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("bad.proto"), [0xff, 0xfe, 0x00]).unwrap();
    let config = FileSetConfig {
        search_paths: vec![dir.path().to_path_buf()],
        ..FileSetConfig::default()
    };
    let mut set = FileSet::new(config);
    assert!(matches!(set.add("bad.proto", true, None), Err(ProtoError::Io { .. })));
}

#[test]
fn test_unknown_file_lookup() {
    let result = analyze("message M {}", "m.proto").unwrap();
    assert!(matches!(
        result.file_set.file("other.proto"),
        Err(ProtoError::UnknownFile { .. })
    ));
}

#[test]
fn test_render_diagnostics_for_every_error() {
    let result = analyze("message M {\n  optional Nope a = 1;\n  optional Gone b = 2;\n}", "r.proto").unwrap();
    assert_eq!(result.diagnostics().len(), 2);
    let rendered = result.render_diagnostics();
    assert!(rendered.contains("'Nope' is not defined"));
    assert!(rendered.contains("'Gone' is not defined"));
    assert!(rendered.contains("proto::"));
}

#[test]
fn test_empty_and_odd_file_names() {
    assert!(analyze("", "").is_ok());
    assert!(analyze("message M {}", "dir/sub-dir/file_v2.proto").is_ok());
}
