use proto_core::lexer::{Lexer, TokenKind};
use proto_core::literal::{escape_bytes, unescape};
use proto_core::parser::parse_source;
use std::fs;

#[test]
fn test_all_proto_fixtures_parse() {
    let tests_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/ok");
    let entries = fs::read_dir(tests_dir).expect("Failed to read tests directory");

    for entry in entries {
        let entry = entry.expect("Failed to read directory entry");
        let path = entry.path();

        if path.is_file() && path.extension().map_or(false, |ext| ext == "proto") {
            println!("Parsing file: {:?}", path);
            let source =
                fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read file: {:?}", path));

            let (_, _, diagnostics) = parse_source(&source, &path.to_string_lossy());
            let errors: Vec<String> = diagnostics
                .iter()
                .filter(|d| d.is_error())
                .map(|d| d.to_string())
                .collect();
            assert!(errors.is_empty(), "Failed to parse {:?}: {:#?}", path, errors);
        }
    }
}

#[test]
fn test_escape_then_unescape_restores_bytes() {
    let samples: [&[u8]; 5] = [
        b"",
        b"plain text",
        b"quotes \" and ' and \\",
        b"\x00\x01\x7f\xff control",
        "caf\u{e9} \u{1F980}".as_bytes(),
    ];
    for bytes in samples {
        let quoted = format!("\"{}\"", escape_bytes(bytes));
        let decoded = unescape(&quoted).unwrap();
        assert_eq!(decoded.bytes, bytes, "{quoted}");
        assert!(decoded.warnings.is_empty(), "{quoted}: {:?}", decoded.warnings);
    }
}

#[test]
fn test_lexer_positions_survive_block_comments() {
    let source = "message /* a\n  multi-line */ Foo {\n\toptional int32 x = 1; // trailing\n}";
    let tokens: Vec<_> = Lexer::new(source, "pos.proto")
        .filter(|t| t.kind != TokenKind::Whitespace)
        .collect();

    let foo = tokens.iter().find(|t| t.value == "Foo").unwrap();
    assert_eq!((foo.line, foo.column), (2, 17));
    assert_eq!(foo.kind, TokenKind::AlphaNumeric);

    let comments: Vec<_> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Comment)
        .map(|t| t.value.as_str())
        .collect();
    assert_eq!(comments, vec![" a", "  multi-line ", " trailing"]);

    let number = tokens.iter().find(|t| t.value == "1").unwrap();
    assert_eq!((number.line, number.column), (3, 21));
    assert_eq!(&*number.line_text, "\toptional int32 x = 1; // trailing");

    let indices: Vec<_> = tokens.iter().map(|t| t.index).collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_lexer_keeps_string_literals_verbatim() {
    let tokens: Vec<_> = Lexer::new(r#"option x = "a \"quoted\" word";"#, "s.proto")
        .filter(|t| t.kind == TokenKind::StringLiteral)
        .collect();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].value, r#""a \"quoted\" word""#);
    assert_eq!(unescape(&tokens[0].value).unwrap().bytes, b"a \"quoted\" word");
}
