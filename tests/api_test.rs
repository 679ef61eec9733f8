use proto_core::{analyze, analyze_with, FileSetConfig};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_analyze_json_output() {
    let source = r#"
        syntax = "proto3";
        package acme.v1;

        enum Kind { KIND_UNSPECIFIED = 0; KIND_A = 1; }

        message Item {
            string display_name = 1;
            Kind kind = 2;
            repeated int64 ids = 3 [packed = true];
        }

        service Catalog {
            rpc Watch (Item) returns (stream Item);
        }
    "#;
    let result = analyze(source, "catalog.proto").unwrap();
    assert!(result.diagnostics().is_empty(), "{:#?}", result.diagnostics());

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    let file = &json[0];
    assert_eq!(file["package"], "acme.v1");

    let fields = &file["messages"][0]["fields"];
    assert_eq!(fields[0]["json_name"], "displayName");
    assert_eq!(fields[1]["type"], "enum");
    assert_eq!(fields[1]["type_name"], ".acme.v1.Kind");
    assert_eq!(fields[2]["label"], "repeated");
    assert_eq!(fields[2]["options"]["builtins"]["packed"], true);

    let method = &file["services"][0]["methods"][0];
    assert_eq!(method["input_type"], ".acme.v1.Item");
    assert_eq!(method["server_streaming"], true);
    assert!(method.get("client_streaming").is_none());
}

#[test]
fn test_custom_option_bytes_are_hex_in_output() {
    let source = r#"
        import "google/protobuf/descriptor.proto";
        extend google.protobuf.MessageOptions { optional int32 tag = 50000; }
        message M { option (tag) = 1; }
    "#;
    let result = analyze(source, "m.proto").unwrap();
    assert!(result.diagnostics().is_empty(), "{:#?}", result.diagnostics());
    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["messages"][0]["options"]["extension_data"], "80b51801");
}

#[test]
fn test_search_paths_on_disk() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    fs::create_dir_all(first.path().join("common")).unwrap();
    fs::write(
        first.path().join("common/types.proto"),
        "package common; message Money { optional int64 units = 1; }",
    )
    .unwrap();
    fs::write(
        second.path().join("common_shadow.proto"),
        "package shadow; message Unused {}",
    )
    .unwrap();
    fs::write(
        second.path().join("order.proto"),
        "import \"common/types.proto\"; message Order { optional common.Money total = 1; }",
    )
    .unwrap();

    let config = FileSetConfig {
        search_paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        ..FileSetConfig::default()
    };
    let result = analyze_with(config, &[("order.proto", None)]).unwrap();
    assert!(result.diagnostics().is_empty(), "{:#?}", result.diagnostics());

    let output: Vec<_> = result.to_value().into_iter().map(|f| f.name).collect();
    assert_eq!(output, vec!["order.proto".to_string()]);
    assert!(result.file_set.file("common/types.proto").is_ok());
}

#[test]
fn test_first_search_path_wins() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    fs::write(first.path().join("a.proto"), "message First {}").unwrap();
    fs::write(second.path().join("a.proto"), "message Second {}").unwrap();

    let config = FileSetConfig {
        search_paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        ..FileSetConfig::default()
    };
    let result = analyze_with(config, &[("a.proto", None)]).unwrap();
    let files = result.to_value();
    assert_eq!(files[0].messages[0].name, "First");
}

#[test]
fn test_multiple_roots_share_one_model() {
    let result = analyze_with(
        FileSetConfig::default(),
        &[
            ("a.proto", Some("package p; message A {}")),
            ("b.proto", Some("import \"a.proto\"; package p; message B { optional A a = 1; }")),
        ],
    )
    .unwrap();
    assert!(result.diagnostics().is_empty(), "{:#?}", result.diagnostics());
    assert_eq!(result.to_value().len(), 2);
}

#[test]
fn test_config_from_yaml() {
    let yaml = "search_paths: [protos, vendor]\nall_imports_public: true\n";
    let config: FileSetConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.search_paths.len(), 2);
    assert!(config.all_imports_public);
    assert!(config.warn_unused_imports);
}
