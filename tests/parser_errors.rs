// Parse error reporting and recovery, seen through the public API
use proto_core::{analyze, Diagnostic, ErrorCode};

fn diagnostics(source: &str) -> Vec<Diagnostic> {
    analyze(source, "test.proto").unwrap().diagnostics().to_vec()
}

fn codes(source: &str) -> Vec<ErrorCode> {
    diagnostics(source).iter().map(|d| d.code).collect()
}

#[test]
fn test_independent_errors_are_all_reported() {
    let source = r#"
message A {
  optional int32 x = 1;
  optional int32 y = 1;
}
message B {
  optional int32 = 2;
  optional string ok = 3;
}
enum E {
  FIRST = 0;
  SECOND = 0;
}
message C {
  optional Missing m = 1;
}
"#;
    assert_eq!(
        codes(source),
        vec![
            ErrorCode::DuplicateNumber,
            ErrorCode::Syntax,
            ErrorCode::DuplicateNumber,
            ErrorCode::TypeNotFound,
        ]
    );
}

#[test]
fn test_duplicate_number_positions() {
    let found = diagnostics("message A {\n  optional int32 x = 1;\n  optional int32 y = 1;\n}");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].line, 3);
    assert_eq!(found[0].column, 22);
    assert_eq!(found[0].to_string(), format!("test.proto(3,22): error {:04}: {}", found[0].code.number(), found[0].message));
}

#[test]
fn test_reserved_number_and_name() {
    let source = r#"
message M {
  reserved 10 to 20;
  reserved "legacy";
  optional int32 inside = 15;
  optional int32 legacy = 21;
}
"#;
    let found = diagnostics(source);
    let codes: Vec<_> = found.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::ReservedNumber, ErrorCode::ReservedName]);
    assert!(found[0].message.contains("reserved"));
}

#[test]
fn test_garbage_between_messages() {
    let source = "message A {}\n= = =;\nmessage B { optional int32 x = 1; }";
    let result = analyze(source, "test.proto").unwrap();
    assert_eq!(result.diagnostics().len(), 1);
    let db = result.file_set.db();
    let file = result.file_set.file("test.proto").unwrap();
    assert_eq!(db[file].messages.len(), 2);
}

#[test]
fn test_missing_semicolon_recovers_at_next_statement() {
    let source = "message A {\n  optional int32 x = 1\n  optional int32 y = 2;\n}";
    let found = diagnostics(source);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, ErrorCode::Syntax);
}

#[test]
fn test_unexpected_eof_inside_enum() {
    let found = diagnostics("enum E { A = 0;");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, ErrorCode::UnexpectedEof);
}

#[test]
fn test_field_number_out_of_range() {
    assert_eq!(
        codes("message M { optional int32 big = 536870912; }"),
        vec![ErrorCode::InvalidNumber]
    );
    assert!(codes("message M { optional int32 max = 536870911; }").is_empty());
}

#[test]
fn test_proto3_enum_must_start_at_zero() {
    let found = codes("syntax = \"proto3\"; enum E { ONE = 1; }");
    assert_eq!(found.len(), 1);
}

#[test]
fn test_group_field_parses() {
    let source = r#"
message Search {
  repeated group Result = 1 {
    required string url = 2;
  }
}
"#;
    let result = analyze(source, "test.proto").unwrap();
    assert!(result.diagnostics().is_empty(), "{:#?}", result.diagnostics());
    let db = result.file_set.db();
    let file = result.file_set.file("test.proto").unwrap();
    let search = db[file].messages[0];
    assert_eq!(db[db[search].messages[0]].name, "Result");
    assert_eq!(db[db[search].fields[0]].name, "result");
    assert_eq!(db[db[search].fields[0]].type_name.as_deref(), Some(".Search.Result"));
}
