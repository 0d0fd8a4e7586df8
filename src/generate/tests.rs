use super::{generate, to_json_name, GeneratedFile};
use crate::{
    error::{DiagnosticSink, LineIndex},
    parse,
    types::field_descriptor_proto::{Label, Type},
    Syntax,
};

fn generate_ok(source: &str) -> GeneratedFile {
    let lines = LineIndex::new("test.proto".into(), source);
    let mut sink = DiagnosticSink::new(None);
    let file = parse::parse(source, &lines, &mut sink);
    let generated = generate("test.proto", &file, source, &lines, &mut sink);
    assert!(
        !sink.has_errors(),
        "unexpected errors: {:?}",
        sink.finish().unwrap_err().diagnostics()
    );
    generated
}

fn generate_err(source: &str) -> Vec<String> {
    let lines = LineIndex::new("test.proto".into(), source);
    let mut sink = DiagnosticSink::new(None);
    let file = parse::parse(source, &lines, &mut sink);
    let _ = generate("test.proto", &file, source, &lines, &mut sink);
    sink.finish()
        .expect_err("expected errors")
        .diagnostics()
        .iter()
        .map(|d| d.to_string())
        .collect()
}

#[test]
fn json_name_derivation() {
    assert_eq!(to_json_name("foo_bar"), "fooBar");
    assert_eq!(to_json_name("foo"), "foo");
    assert_eq!(to_json_name("_foo"), "Foo");
    assert_eq!(to_json_name("foo_bar_baz"), "fooBarBaz");
    assert_eq!(to_json_name("foo__bar"), "fooBar");
    assert_eq!(to_json_name("fooBar"), "fooBar");
}

#[test]
fn syntax_detection() {
    assert_eq!(
        generate_ok("syntax = \"proto3\";").syntax,
        Syntax::Proto3
    );
    assert_eq!(generate_ok("syntax = \"proto2\";").syntax, Syntax::Proto2);

    // Missing syntax defaults to proto2 with a warning.
    let lines = LineIndex::new("test.proto".into(), "");
    let mut sink = DiagnosticSink::new(None);
    let file = parse::parse("", &lines, &mut sink);
    let generated = generate("test.proto", &file, "", &lines, &mut sink);
    assert_eq!(generated.syntax, Syntax::Proto2);
    let diagnostics = sink.finish().unwrap();
    assert_eq!(
        diagnostics[0].to_string(),
        "test.proto:1:1: no syntax specified; defaulting to proto2 syntax"
    );
}

#[test]
fn proto2_syntax_field_is_omitted() {
    assert_eq!(generate_ok("syntax = \"proto2\";").descriptor.syntax, None);
    assert_eq!(
        generate_ok("syntax = \"proto3\";").descriptor.syntax.as_deref(),
        Some("proto3")
    );
}

#[test]
fn unknown_syntax() {
    let errors = generate_err("syntax = \"proto4\";");
    assert_eq!(
        errors,
        vec!["test.proto:1:10: syntax value must be \"proto2\" or \"proto3\""]
    );
}

#[test]
fn map_field_synthesis() {
    let generated = generate_ok(
        "syntax = \"proto3\";\npackage demo;\nmessage M { map<string, int64> foo_bar = 3; }\n",
    );
    let message = &generated.descriptor.message_type[0];

    let field = &message.field[0];
    assert_eq!(field.name(), "foo_bar");
    assert_eq!(field.label(), Label::Repeated);
    assert_eq!(field.r#type(), Type::Message);
    assert_eq!(field.type_name(), ".demo.M.FooBarEntry");
    assert_eq!(field.json_name(), "fooBar");

    let entry = &message.nested_type[0];
    assert_eq!(entry.name(), "FooBarEntry");
    assert!(entry.options.as_ref().unwrap().get().map_entry());
    assert_eq!(entry.field[0].name(), "key");
    assert_eq!(entry.field[0].number(), 1);
    assert_eq!(entry.field[0].r#type(), Type::String);
    assert_eq!(entry.field[1].name(), "value");
    assert_eq!(entry.field[1].number(), 2);
    assert_eq!(entry.field[1].r#type(), Type::Int64);
}

#[test]
fn invalid_map_key() {
    let errors = generate_err("syntax = \"proto3\";\nmessage M { map<float, int64> m = 1; }\n");
    assert_eq!(errors, vec!["test.proto:2:17: invalid key type for map field"]);
}

#[test]
fn synthetic_oneof_for_proto3_optional() {
    let generated = generate_ok(
        "syntax = \"proto3\";\n\
         message M {\n\
           optional string a = 1;\n\
           oneof choice { int32 b = 2; int32 c = 3; }\n\
           optional int32 d = 4;\n\
         }\n",
    );
    let message = &generated.descriptor.message_type[0];

    // Synthetic oneofs come after every explicit oneof.
    let oneofs: Vec<_> = message.oneof_decl.iter().map(|o| o.name()).collect();
    assert_eq!(oneofs, vec!["choice", "_a", "_d"]);

    let a = &message.field[0];
    assert_eq!(a.proto3_optional, Some(true));
    assert_eq!(a.oneof_index, Some(1));
    let b = &message.field[1];
    assert_eq!(b.proto3_optional, None);
    assert_eq!(b.oneof_index, Some(0));
    let d = &message.field[3];
    assert_eq!(d.proto3_optional, Some(true));
    assert_eq!(d.oneof_index, Some(2));
}

#[test]
fn group_synthesis() {
    let generated = generate_ok(
        "syntax = \"proto2\";\nmessage M { repeated group Stuff = 7 { optional bool x = 1; } }\n",
    );
    let message = &generated.descriptor.message_type[0];
    let field = &message.field[0];
    assert_eq!(field.name(), "stuff");
    assert_eq!(field.r#type(), Type::Group);
    assert_eq!(field.type_name(), ".M.Stuff");
    assert_eq!(field.label(), Label::Repeated);
    assert_eq!(message.nested_type[0].name(), "Stuff");
}

#[test]
fn group_name_must_be_capitalized() {
    let errors =
        generate_err("syntax = \"proto2\";\nmessage M { optional group stuff = 7 {} }\n");
    assert_eq!(
        errors,
        vec!["test.proto:2:28: group names must start with a capital letter"]
    );
}

#[test]
fn default_pseudo_option_is_hoisted() {
    let generated = generate_ok(
        "syntax = \"proto2\";\n\
         message M {\n\
           optional int32 a = 1 [default = -7];\n\
           optional string b = 2 [default = \"hi\"];\n\
           optional bytes c = 3 [default = \"a\\x00b\"];\n\
           optional double d = 4 [default = -inf];\n\
           optional bool e = 5 [default = true];\n\
         }\n",
    );
    let fields = &generated.descriptor.message_type[0].field;
    assert_eq!(fields[0].default_value.as_deref(), Some("-7"));
    assert!(fields[0].options.is_none());
    assert_eq!(fields[1].default_value.as_deref(), Some("hi"));
    assert_eq!(fields[2].default_value.as_deref(), Some("a\\000b"));
    assert_eq!(fields[3].default_value.as_deref(), Some("-inf"));
    assert_eq!(fields[4].default_value.as_deref(), Some("true"));
}

#[test]
fn default_out_of_range() {
    let errors = generate_err(
        "syntax = \"proto2\";\nmessage M { optional int32 a = 1 [default = 3000000000]; }\n",
    );
    assert_eq!(
        errors,
        vec!["test.proto:2:45: invalid default value: integer is out of range"]
    );
}

#[test]
fn proto3_default_forbidden() {
    let errors =
        generate_err("syntax = \"proto3\";\nmessage M { int32 a = 1 [default = 1]; }\n");
    assert_eq!(
        errors,
        vec!["test.proto:2:26: default values are not allowed in proto3"]
    );
}

#[test]
fn json_name_pseudo_option_overrides() {
    let generated = generate_ok(
        "syntax = \"proto3\";\nmessage M { string foo_bar = 1 [json_name = \"custom\"]; }\n",
    );
    let field = &generated.descriptor.message_type[0].field[0];
    assert_eq!(field.json_name.as_deref(), Some("custom"));
    assert!(field.options.is_none());
}

#[test]
fn json_name_forbidden_on_extensions() {
    let errors = generate_err(
        "syntax = \"proto2\";\n\
         message M { extensions 1 to 10; }\n\
         extend M { optional string e = 1 [json_name = \"x\"]; }\n",
    );
    assert_eq!(
        errors,
        vec!["test.proto:3:35: custom JSON names are not allowed on extension fields"]
    );
}

#[test]
fn remaining_options_stay_uninterpreted() {
    let generated = generate_ok(
        "syntax = \"proto3\";\n\
         option java_package = \"com.example\";\n\
         option (custom).x = 5;\n",
    );
    let options = generated.descriptor.options.as_ref().unwrap().get();
    assert_eq!(options.uninterpreted_option.len(), 2);

    let first = &options.uninterpreted_option[0];
    assert_eq!(first.name[0].name_part, "java_package");
    assert!(!first.name[0].is_extension);
    assert_eq!(first.string_value.as_deref(), Some(b"com.example".as_ref()));

    let second = &options.uninterpreted_option[1];
    assert_eq!(second.name[0].name_part, "custom");
    assert!(second.name[0].is_extension);
    assert_eq!(second.name[1].name_part, "x");
    assert!(!second.name[1].is_extension);
    assert_eq!(second.positive_int_value, Some(5));
}

#[test]
fn aggregate_options_serialize_to_text() {
    let generated = generate_ok(
        "syntax = \"proto3\";\n\
         option (custom) = { a: 1 b { c: \"x\" } d: [1, 2] e: FOO };\n",
    );
    let options = generated.descriptor.options.as_ref().unwrap().get();
    assert_eq!(
        options.uninterpreted_option[0].aggregate_value.as_deref(),
        Some("a: 1 b { c: \"x\" } d: [1, 2] e: FOO")
    );
}

#[test]
fn tag_range_checks() {
    let errors = generate_err(
        "syntax = \"proto3\";\n\
         message M {\n\
           int32 a = 0;\n\
           int32 b = -5;\n\
           int32 c = 536870912;\n\
           int32 d = 19500;\n\
         }\n",
    );
    assert_eq!(
        errors,
        vec![
            "test.proto:3:13: tag number 0 must be greater than zero",
            "test.proto:4:13: tag number -5 must be greater than zero",
            "test.proto:5:13: tag number 536870912 is higher than max allowed tag number (536870911)",
            "test.proto:6:13: tag number 19500 is in disallowed reserved range 19000-19999",
        ]
    );
}

#[test]
fn reserved_ranges_use_exclusive_end() {
    let generated = generate_ok(
        "syntax = \"proto3\";\nmessage M { reserved 5, 10 to 20, 30 to max; }\n",
    );
    let ranges = &generated.descriptor.message_type[0].reserved_range;
    assert_eq!((ranges[0].start(), ranges[0].end()), (5, 6));
    assert_eq!((ranges[1].start(), ranges[1].end()), (10, 21));
    assert_eq!((ranges[2].start(), ranges[2].end()), (30, crate::MAX_TAG + 1));
}

#[test]
fn enum_reserved_ranges_are_inclusive() {
    let generated =
        generate_ok("syntax = \"proto2\";\nenum E { A = 1; reserved -5 to -1, 10; }\n");
    let ranges = &generated.descriptor.enum_type[0].reserved_range;
    assert_eq!((ranges[0].start(), ranges[0].end()), (-5, -1));
    assert_eq!((ranges[1].start(), ranges[1].end()), (10, 10));
}

#[test]
fn proto2_requires_labels() {
    let errors = generate_err("syntax = \"proto2\";\nmessage M { int32 a = 1; }\n");
    assert_eq!(
        errors,
        vec!["test.proto:2:13: field has no label; proto2 requires explicit 'optional' or 'required' label"]
    );
}

#[test]
fn proto3_forbids_required_and_groups_and_extension_ranges() {
    let errors = generate_err(
        "syntax = \"proto3\";\n\
         message M {\n\
           required int32 a = 1;\n\
           extensions 100 to 200;\n\
         }\n",
    );
    assert_eq!(
        errors,
        vec![
            "test.proto:3:3: label 'required' is not allowed in proto3",
            "test.proto:4:3: extension ranges are not allowed in proto3",
        ]
    );
}

#[test]
fn extension_fields_cannot_be_required() {
    let errors = generate_err(
        "syntax = \"proto2\";\n\
         message M { extensions 1 to 10; }\n\
         extend M { required int32 e = 1; }\n",
    );
    assert_eq!(
        errors,
        vec!["test.proto:3:12: extension fields cannot be required"]
    );
}

#[test]
fn explicit_map_entry_rejected() {
    let errors = generate_err(
        "syntax = \"proto2\";\nmessage M { option map_entry = true; }\n",
    );
    assert_eq!(
        errors,
        vec!["test.proto:2:13: map_entry option may not be set explicitly; use a map field instead"]
    );
    // Setting it to false is dropped silently.
    let generated =
        generate_ok("syntax = \"proto2\";\nmessage M { option map_entry = false; }\n");
    assert!(generated.descriptor.message_type[0].options.is_none());
}

#[test]
fn empty_oneof_and_extend_rejected() {
    let errors = generate_err(
        "syntax = \"proto2\";\nmessage M { oneof o {} extensions 1; }\nextend M {}\n",
    );
    assert_eq!(
        errors,
        vec![
            "test.proto:2:13: oneofs must contain at least one field",
            "test.proto:3:1: extend sections must define at least one extension",
        ]
    );
}

#[test]
fn source_map_records_spans() {
    let source = "syntax = \"proto3\";\nmessage M { string a = 1; }\n";
    let generated = generate_ok(source);
    // message M
    let span = generated.source_map.span(&[4, 0, 1]).unwrap();
    assert_eq!(&source[span], "M");
    // field a's number
    let span = generated.source_map.span(&[4, 0, 2, 0, 3]).unwrap();
    assert_eq!(&source[span], "1");
}

#[test]
fn source_code_info_spans_and_comments() {
    let source = "// about M\nmessage M {}\n";
    let lines = LineIndex::new("test.proto".into(), source);
    let mut sink = DiagnosticSink::new(None);
    let file = parse::parse(source, &lines, &mut sink);
    let generated = generate("test.proto", &file, source, &lines, &mut sink);
    let info = generated.source_map.to_source_code_info(&lines);

    let message = info
        .location
        .iter()
        .find(|location| location.path == [4, 0])
        .unwrap();
    // Zero-based [start_line, start_col, end_line, end_col].
    assert_eq!(message.span, vec![1, 0, 12]);
    assert_eq!(message.leading_comments.as_deref(), Some(" about M\n"));
}
