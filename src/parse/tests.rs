use super::parse;
use crate::{
    ast,
    error::{DiagnosticSink, LineIndex, Severity},
};

fn parse_ok(source: &str) -> ast::File {
    let lines = LineIndex::new("test.proto".into(), source);
    let mut sink = DiagnosticSink::new(None);
    let file = parse(source, &lines, &mut sink);
    let diagnostics = sink.finish().expect("unexpected parse errors");
    assert!(
        diagnostics.iter().all(|d| d.severity() == Severity::Warning),
        "unexpected diagnostics: {:?}",
        diagnostics
    );
    file
}

fn parse_err(source: &str) -> Vec<String> {
    let lines = LineIndex::new("test.proto".into(), source);
    let mut sink = DiagnosticSink::new(None);
    let _ = parse(source, &lines, &mut sink);
    sink.finish()
        .expect_err("expected parse errors")
        .diagnostics()
        .iter()
        .map(|d| d.to_string())
        .collect()
}

#[track_caller]
fn assert_round_trip(source: &str) {
    let file = parse_ok(source);
    similar_asserts::assert_eq!(file.to_source(), source);
}

#[test]
fn round_trip_simple_message() {
    assert_round_trip("syntax = \"proto3\";\n\nmessage Foo {\n  string bar = 1;\n}\n");
}

#[test]
fn round_trip_preserves_comments_and_spacing() {
    assert_round_trip(
        "// leading\nsyntax = \"proto2\";  // trailing\n\n/* detached */\n\n\
         package foo.bar;\n\nimport public \"other.proto\";\n\n\
         message Foo {\n  // a field\n  optional int32 a = 1 [default = -1];\n\
         \n  repeated group Bar = 2 {\n    optional string s = 3;\n  }\n}\n",
    );
}

#[test]
fn round_trip_every_declaration_kind() {
    assert_round_trip(
        "syntax = \"proto2\";\n\
         package a.b;\n\
         import \"x.proto\";\n\
         import weak \"y.proto\";\n\
         option java_package = \"com.example\";\n\
         option (custom).nested = { foo: 1 bar: \"s\" };\n\
         message M {\n\
           required int32 a = 1;\n\
           optional .a.b.M b = 2;\n\
           repeated string c = 3 [packed = true, (o) = FOO];\n\
           map<int32, string> d = 4;\n\
           oneof which {\n\
             int64 e = 5;\n\
             group F = 6 {\n\
               optional bool g = 7;\n\
             }\n\
           }\n\
           extensions 100 to 199, 500 to max;\n\
           reserved 8, 10 to 20;\n\
           reserved \"h\", \"i\";\n\
           message Nested {}\n\
           enum E {\n\
             option allow_alias = true;\n\
             A = 0;\n\
             B = 0 [deprecated = true];\n\
             reserved -5 to -1;\n\
           }\n\
           extend M {\n\
             optional uint32 ext = 100;\n\
           }\n\
           ;\n\
         }\n\
         service S {\n\
           option deprecated = false;\n\
           rpc Call (M) returns (stream M);\n\
           rpc Other (stream .a.b.M) returns (M) {\n\
             option idempotency_level = NO_SIDE_EFFECTS;\n\
           }\n\
         }\n",
    );
}

#[test]
fn round_trip_aggregate_values() {
    assert_round_trip(
        "option (complex) = {\n\
           plain: 1\n\
           [ext.field]: \"x\",\n\
           nested { a: true };\n\
           angle < b: inf >\n\
           list: [1, 2.5, -3]\n\
           [type.googleapis.com/foo.Bar] { baz: NAN }\n\
         };\n",
    );
}

#[test]
fn contextual_keywords_as_names() {
    let file = parse_ok(
        "message message { optional int32 optional = 1; }\n\
         enum option { reserved = 0; }\n",
    );
    match &file.items[0] {
        ast::FileItem::Message(message) => {
            assert_eq!(message.name.value(), "message");
            match &message.body.items[0] {
                ast::MessageItem::Field(field) => assert_eq!(field.name.value(), "optional"),
                other => panic!("expected field, got {:?}", other),
            }
        }
        other => panic!("expected message, got {:?}", other),
    }
    match &file.items[1] {
        ast::FileItem::Enum(enum_) => {
            assert_eq!(enum_.name.value(), "option");
            match &enum_.items[0] {
                ast::EnumItem::Value(value) => assert_eq!(value.name.value(), "reserved"),
                other => panic!("expected enum value, got {:?}", other),
            }
        }
        other => panic!("expected enum, got {:?}", other),
    }
}

#[test]
fn map_as_type_name() {
    let file = parse_ok("message M { optional map foo = 1; map<string, int32> bar = 2; }");
    match &file.items[0] {
        ast::FileItem::Message(message) => {
            assert!(matches!(&message.body.items[0], ast::MessageItem::Field(_)));
            assert!(matches!(&message.body.items[1], ast::MessageItem::Map(_)));
        }
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn unexpected_token_position_and_message() {
    let errors = parse_err("message Foo }");
    assert_eq!(errors, vec!["test.proto:1:13: unexpected '}', expecting '{'"]);
}

#[test]
fn unexpected_eof() {
    let errors = parse_err("message Foo ");
    assert_eq!(errors, vec!["test.proto:1:13: unexpected EOF, expecting '{'"]);
}

#[test]
fn recovers_at_statement_boundary() {
    let errors = parse_err(
        "message Foo {\n  int32 = 1;\n  string ok = 2;\n  int64 3;\n}\nmessage = {}\n",
    );
    assert_eq!(
        errors,
        vec![
            "test.proto:2:9: unexpected '=', expecting a field name",
            "test.proto:4:9: unexpected '3', expecting a field name",
            "test.proto:6:9: unexpected '=', expecting a message name",
        ]
    );
}

#[test]
fn recovery_keeps_good_declarations() {
    let source = "message Foo {\n  int32 = 1;\n  string ok = 2;\n}\n";
    let lines = LineIndex::new("test.proto".into(), source);
    let mut sink = DiagnosticSink::new(None);
    let file = parse(source, &lines, &mut sink);
    assert!(sink.finish().is_err());
    match &file.items[0] {
        ast::FileItem::Message(message) => {
            let fields: Vec<_> = message
                .body
                .items
                .iter()
                .filter_map(|item| match item {
                    ast::MessageItem::Field(field) => Some(field.name.value()),
                    _ => None,
                })
                .collect();
            assert_eq!(fields, vec!["ok"]);
        }
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn lexical_error_does_not_stop_parse() {
    let errors = parse_err("message Foo { optional int32 a = 1; $ optional int32 b = 2; }");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("invalid token"), "{}", errors[0]);
}

#[test]
fn comment_attachment() {
    let file = parse_ok(
        "// detached paragraph\n\n// leading comment\nmessage Foo {} // trailing comment\n\n\
         message Bar {}\n",
    );
    match &file.items[0] {
        ast::FileItem::Message(message) => {
            assert_eq!(
                message.comments.leading_detached,
                vec![" detached paragraph\n".to_owned()]
            );
            assert_eq!(
                message.comments.leading.as_deref(),
                Some(" leading comment\n")
            );
            assert_eq!(
                message.comments.trailing.as_deref(),
                Some(" trailing comment\n")
            );
        }
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn comment_attachment_inside_message() {
    let file = parse_ok(
        "message Foo {\n  // about a\n  optional int32 a = 1; // trail a\n  optional int32 b = 2;\n}\n",
    );
    match &file.items[0] {
        ast::FileItem::Message(message) => {
            match &message.body.items[0] {
                ast::MessageItem::Field(field) => {
                    assert_eq!(field.comments.leading.as_deref(), Some(" about a\n"));
                    assert_eq!(field.comments.trailing.as_deref(), Some(" trail a\n"));
                }
                other => panic!("expected field, got {:?}", other),
            }
            match &message.body.items[1] {
                ast::MessageItem::Field(field) => {
                    assert_eq!(field.comments.leading, None);
                }
                other => panic!("expected field, got {:?}", other),
            }
        }
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn negative_field_numbers_parse() {
    // Range validation happens later, with a better message than a syntax
    // error could give.
    let file = parse_ok("message Foo { optional int32 i = -5; }");
    match &file.items[0] {
        ast::FileItem::Message(message) => match &message.body.items[0] {
            ast::MessageItem::Field(field) => {
                assert_eq!(field.number.as_i64(), Some(-5));
            }
            other => panic!("expected field, got {:?}", other),
        },
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn adjacent_string_literals_concatenate() {
    let file = parse_ok("syntax = \"pro\" \"to3\";");
    let syntax = file.syntax().unwrap();
    assert_eq!(syntax.value.as_utf8().as_deref(), Some("proto3"));
}

#[test]
fn empty_file() {
    let file = parse_ok("");
    assert!(file.items.is_empty());
    assert_eq!(file.to_source(), "");
}

#[test]
fn file_of_only_comments() {
    assert_round_trip("// just a comment\n/* and another */\n");
}
