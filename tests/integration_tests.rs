// Integration tests for proto-core using test fixtures
use proto_core::{analyze, AnalysisResult, ErrorCode};
use std::fs;
use std::path::PathBuf;

fn get_test_file_path(subdir: &str, filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join(subdir)
        .join(filename)
}

fn read_test_file(subdir: &str, filename: &str) -> String {
    let path = get_test_file_path(subdir, filename);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read test file: {:?}", path))
}

fn analyze_fixture(subdir: &str, filename: &str) -> AnalysisResult {
    let source = read_test_file(subdir, filename);
    analyze(&source, filename).unwrap_or_else(|e| panic!("{filename} failed fatally: {e}"))
}

fn codes(result: &AnalysisResult) -> Vec<ErrorCode> {
    result.diagnostics().iter().map(|d| d.code).collect()
}

// Schemas that should parse, resolve and serialize without a single diagnostic
mod ok_tests {
    use super::*;

    fn assert_clean(filename: &str) -> serde_json::Value {
        let result = analyze_fixture("ok", filename);
        assert!(
            result.diagnostics().is_empty(),
            "{filename} should be clean:\n{}",
            result.render_diagnostics()
        );
        let json = result.to_json();
        assert!(json.is_ok(), "Should serialize to JSON");
        serde_json::from_str(&json.unwrap()).unwrap()
    }

    #[test]
    fn test_scalars() {
        let json = assert_clean("scalars.proto");
        let fields = json[0]["messages"][0]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 17);
        assert_eq!(fields[2]["default_value"], "-42");
        assert_eq!(fields[4]["default_value"], "15");
        assert_eq!(fields[12]["default_value"], "true");
        assert_eq!(fields[16]["label"], "required");
    }

    #[test]
    fn test_nested() {
        let json = assert_clean("nested.proto");
        let tree = &json[0]["messages"][0];
        assert_eq!(tree["name"], "Tree");
        assert_eq!(tree["nested"][0]["name"], "Node");
        assert_eq!(tree["oneofs"][0], "payload");
        assert_eq!(json[0]["extensions"][0]["extendee"], ".fixtures.nested.Tree");
        assert_eq!(json[0]["enums"][0]["values"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_services() {
        let json = assert_clean("services.proto");
        let methods = json[0]["services"][0]["methods"].as_array().unwrap();
        assert_eq!(methods.len(), 4);
        assert_eq!(methods[1]["output_type"], ".google.protobuf.Empty");
        assert_eq!(methods[3]["client_streaming"], true);
        assert_eq!(methods[3]["server_streaming"], true);
    }

    #[test]
    fn test_custom_options() {
        let json = assert_clean("custom_options.proto");
        let file_options = &json[0]["options"];
        assert_eq!(file_options["builtins"]["java_package"], "com.example.fixtures");
        assert!(file_options["extension_data"].as_str().is_some_and(|s| !s.is_empty()));

        let account = &json[0]["messages"][1];
        assert!(account["options"]["extension_data"].is_string());
        for field in account["fields"].as_array().unwrap() {
            assert!(field["options"]["extension_data"].is_string(), "{field}");
        }
    }

    #[test]
    fn test_maps() {
        let json = assert_clean("maps.proto");
        let inventory = &json[0]["messages"][0];
        let entries: Vec<_> = inventory["nested"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| (m["name"].as_str().unwrap().to_string(), m["kind"].as_str().unwrap().to_string()))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("CountsEntry".to_string(), "map_entry".to_string()),
                ("ItemsEntry".to_string(), "map_entry".to_string()),
                ("LabelsEntry".to_string(), "map_entry".to_string()),
            ]
        );
    }

    #[test]
    fn test_every_ok_fixture_is_clean() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("ok");
        let mut seen = 0;
        for entry in fs::read_dir(dir).expect("Failed to read ok directory") {
            let path = entry.expect("Failed to read directory entry").path();
            if path.extension().is_some_and(|ext| ext == "proto") {
                assert_clean(path.file_name().unwrap().to_str().unwrap());
                seen += 1;
            }
        }
        assert!(seen >= 5);
    }
}

// Schemas that must be rejected with diagnostics
mod bad_tests {
    use super::*;

    #[test]
    fn test_duplicate_number() {
        let result = analyze_fixture("bad", "duplicate_number.proto");
        assert!(result.has_errors());
        assert_eq!(codes(&result), vec![ErrorCode::DuplicateNumber]);
        assert_eq!(result.diagnostics()[0].line, 5);
    }

    #[test]
    fn test_unresolved_type() {
        let result = analyze_fixture("bad", "unresolved_type.proto");
        assert_eq!(codes(&result), vec![ErrorCode::TypeNotFound, ErrorCode::TypeNotFound]);
    }

    #[test]
    fn test_reserved_clash() {
        let result = analyze_fixture("bad", "reserved_clash.proto");
        let found = codes(&result);
        assert_eq!(found.len(), 2, "{found:?}");
        assert!(found.contains(&ErrorCode::ReservedName));
        assert!(found.contains(&ErrorCode::ReservedNumber));
    }

    #[test]
    fn test_syntax_error_keeps_later_messages() {
        let result = analyze_fixture("bad", "syntax_error.proto");
        assert!(result.has_errors(), "Should fail with parse error");
        let names: Vec<_> = result.to_value()[0].messages.iter().map(|m| m.name.clone()).collect();
        assert!(names.contains(&"StillParsed".to_string()), "{names:?}");
    }

    #[test]
    fn test_option_mismatch() {
        let result = analyze_fixture("bad", "option_mismatch.proto");
        let found = codes(&result);
        assert!(found.contains(&ErrorCode::OptionTypeMismatch), "{found:?}");
        assert!(found.contains(&ErrorCode::OptionNotFound), "{found:?}");
    }

    #[test]
    fn test_missing_import() {
        let result = analyze_fixture("bad", "missing_import.proto");
        assert_eq!(codes(&result), vec![ErrorCode::ImportNotFound]);
        assert_eq!(result.diagnostics()[0].line, 3);
    }
}
