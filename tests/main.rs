use std::{
    cell::RefCell,
    rc::Rc,
    sync::{Arc, Mutex},
};

use prost::Message;
use protolink::{types, Compiler, Error, MemoryAccessor};
use similar_asserts::assert_eq;

fn compiler(sources: &[(&str, &str)]) -> Compiler {
    let mut accessor = MemoryAccessor::new();
    for (name, source) in sources {
        accessor.add(*name, *source);
    }
    Compiler::new().accessor(accessor)
}

#[track_caller]
fn compile(
    entries: &[&str],
    sources: &[(&str, &str)],
) -> Result<Vec<types::FileDescriptorProto>, Error> {
    compiler(sources).parse_files(entries)
}

#[track_caller]
fn compile_one(source: &str) -> Result<Vec<types::FileDescriptorProto>, Error> {
    compile(&["test.proto"], &[("test.proto", source)])
}

#[track_caller]
fn first_error(source: &str) -> String {
    compile_one(source)
        .expect_err("expected compilation to fail")
        .first()
        .expect("expected an error diagnostic")
        .to_string()
}

#[track_caller]
fn first_error_message(source: &str) -> String {
    compile_one(source)
        .expect_err("expected compilation to fail")
        .first()
        .expect("expected an error diagnostic")
        .message()
}

// ---------------------------------------------------------------------------
// The concrete scenarios of the compatibility contract.

#[test]
fn duplicate_symbol_across_kinds() {
    assert_eq!(
        first_error("message foo {} enum foo { V = 0; }"),
        "test.proto:1:21: symbol \"foo\" already defined at test.proto:1:9"
    );
}

#[test]
fn duplicate_extension_tag() {
    assert_eq!(
        first_error(
            "message foo { extensions 1 to 2; } \
             extend foo { optional string a = 1; } \
             extend foo { optional int32 b = 1; }"
        ),
        "test.proto:1:106: extension with tag 1 for message foo already defined at test.proto:1:69"
    );
}

#[test]
fn oneof_double_set_in_aggregate_option() {
    let source = "syntax = \"proto3\";\n\
                  import \"google/protobuf/descriptor.proto\";\n\
                  message Foo { oneof bar { string baz = 1; string buzz = 2; } }\n\
                  extend google.protobuf.FileOptions { Foo foo = 50000; }\n\
                  option (foo) = { baz: \"abc\" buzz: \"xyz\" };\n";
    assert_eq!(
        first_error_message(source),
        "oneof \"bar\" already has field \"baz\" set"
    );
}

#[test]
fn derived_json_name_conflict() {
    assert_eq!(
        first_error("syntax = \"proto3\"; message Foo { string fooBar = 1; string foo_bar = 2; }"),
        "test.proto:1:60: default JSON name \"fooBar\" conflicts with default JSON name of field fooBar, defined at test.proto:1:41"
    );
}

#[test]
fn enum_value_camel_case_conflict() {
    assert_eq!(
        first_error("syntax = \"proto3\"; enum Foo { true = 0; TRUE = 1; }"),
        "test.proto:1:41: camel-case name \"True\" conflicts with camel-case name of enum value true, defined at test.proto:1:31"
    );
}

#[test]
fn enum_value_camel_case_conflict_is_warning_in_proto2() {
    let warnings = Rc::new(RefCell::new(Vec::new()));
    let sink = warnings.clone();
    let source = "syntax = \"proto2\"; enum Foo { true = 0; TRUE = 1; }";

    let mut accessor = MemoryAccessor::new();
    accessor.add("test.proto", source);
    Compiler::new()
        .accessor(accessor)
        .warning_reporter(move |diagnostic| sink.borrow_mut().push(diagnostic.to_string()))
        .parse_files(["test.proto"])
        .expect("proto2 camel-case conflicts are only warnings");

    assert_eq!(
        *warnings.borrow(),
        vec![
            "test.proto:1:41: camel-case name \"True\" conflicts with camel-case name of enum value true, defined at test.proto:1:31".to_owned()
        ]
    );
}

#[test]
fn cross_file_symbol_collisions_include_synthetic_oneofs() {
    let source = "syntax = \"proto3\"; message Foo { optional string bar = 1; }";
    let err = compile(
        &["a.proto", "b.proto"],
        &[("a.proto", source), ("b.proto", source)],
    )
    .expect_err("expected symbol collisions");

    let messages: Vec<String> = err.diagnostics().iter().map(|d| d.message()).collect();
    for symbol in ["\"Foo\"", "\"Foo.bar\"", "\"Foo._bar\""] {
        assert!(
            messages
                .iter()
                .any(|m| m.contains(symbol) && m.contains("already defined at")),
            "missing collision for {}: {:?}",
            symbol,
            messages
        );
    }
}

#[test]
fn message_set_extensions_must_be_optional() {
    assert_eq!(
        first_error_message(
            "message Foo { option message_set_wire_format = true; extensions 1 to 100; } \
             extend Foo { repeated Foo bar = 1; }"
        ),
        "messages with message-set wire format cannot contain repeated extensions, only optional"
    );
}

#[test]
fn message_set_extensions_must_be_messages() {
    assert_eq!(
        first_error_message(
            "message Foo { option message_set_wire_format = true; extensions 1 to 100; } \
             extend Foo { optional string bar = 1; }"
        ),
        "messages with message-set wire format cannot contain scalar extensions, only messages"
    );
}

#[test]
fn unresolvable_any_type_reference() {
    let source = "syntax = \"proto3\";\n\
                  import \"google/protobuf/any.proto\";\n\
                  import \"google/protobuf/descriptor.proto\";\n\
                  extend google.protobuf.FileOptions { google.protobuf.Any any = 50000; }\n\
                  option (any) = { [types.custom.io/foo.bar.Foo] <f: 10> };\n";
    assert_eq!(
        first_error_message(source),
        "could not resolve type reference types.custom.io/foo.bar.Foo"
    );
}

// ---------------------------------------------------------------------------
// Universal invariants.

#[test]
fn round_trip_through_the_syntax_tree() {
    let source = "syntax = \"proto2\";\n\n// A package.\npackage demo;  // yes\n\n\
                  import public \"google/protobuf/empty.proto\";\n\n\
                  message A {\n  optional int32 x = 1 [default = 2];\n\n\
                  /* block */  extensions 100 to max;\n}\n";
    let mut accessor = MemoryAccessor::new();
    accessor.add("test.proto", source);
    let ast = Compiler::new()
        .accessor(accessor)
        .parse_to_ast("test.proto")
        .unwrap();
    assert_eq!(ast.to_source(), source);
}

#[test]
fn enum_values_are_lifted_to_the_enclosing_scope() {
    // The enum value claims `P.V` in the enum's enclosing scope, so it
    // collides with the message named V. Messages are registered before
    // enums, which makes the message the anchor.
    assert_eq!(
        first_error_message(
            "syntax = \"proto3\"; package P; enum E { V = 0; } message V { }"
        ),
        "symbol \"P.V\" already defined at test.proto:1:57"
    );
}

#[test]
fn synthetic_oneof_is_generated_for_proto3_optional() {
    let files = compile_one("syntax = \"proto3\"; message M { optional int32 f = 1; }").unwrap();
    let message = &files[0].message_type[0];
    assert_eq!(message.oneof_decl.len(), 1);
    assert_eq!(message.oneof_decl[0].name(), "_f");
    assert_eq!(message.field[0].proto3_optional, Some(true));
    assert_eq!(message.field[0].oneof_index, Some(0));
}

#[test]
fn map_entries_may_not_be_referenced() {
    assert_eq!(
        first_error_message(
            "syntax = \"proto3\"; message Foo { map<string, int32> items = 1; ItemsEntry bad = 2; }"
        ),
        "Foo.ItemsEntry is a synthetic map entry and may not be referenced explicitly"
    );
}

#[test]
fn descriptors_are_byte_compatible_with_prost_types() {
    let files = compile_one(
        "syntax = \"proto3\";\n\
         option java_package = \"com.example\";\n\
         option optimize_for = CODE_SIZE;\n\
         message M {\n\
           string name = 1;\n\
           repeated int32 nums = 2 [packed = false];\n\
         }\n\
         enum E { ZERO = 0; ONE = 1; }\n\
         service S { rpc Get (M) returns (M); }\n",
    )
    .unwrap();

    let bytes = files[0].encode_to_vec();
    let decoded = prost_types::FileDescriptorProto::decode(bytes.as_slice()).unwrap();

    assert_eq!(decoded.name(), "test.proto");
    assert_eq!(decoded.syntax(), "proto3");
    let options = decoded.options.as_ref().unwrap();
    assert_eq!(options.java_package(), "com.example");
    assert_eq!(
        options.optimize_for(),
        prost_types::file_options::OptimizeMode::CodeSize
    );
    assert!(options.uninterpreted_option.is_empty());
    assert_eq!(decoded.message_type[0].name(), "M");
    assert_eq!(decoded.message_type[0].field[1].options.as_ref().unwrap().packed(), false);
    assert_eq!(decoded.enum_type[0].value[1].number(), 1);
    assert_eq!(decoded.service[0].method[0].input_type(), ".M");
}

#[test]
fn reparsing_serialized_output_is_idempotent() {
    let source = "syntax = \"proto3\";\n\
                  package demo;\n\
                  message M { map<string, M> children = 1; oneof o { int32 a = 2; } }\n";
    let first = compile_one(source).unwrap();

    // A descriptor round-tripped through bytes and compiled again compares
    // equal under proto equality.
    let bytes = first[0].encode_to_vec();
    let reparsed = types::FileDescriptorProto::decode(bytes.as_slice()).unwrap();
    assert_eq!(first[0], reparsed);
}

// ---------------------------------------------------------------------------
// Linking.

#[test]
fn type_references_are_canonicalized() {
    let files = compile(
        &["b.proto"],
        &[
            ("a.proto", "syntax = \"proto3\"; package pkg; message A { message Inner {} }"),
            (
                "b.proto",
                "syntax = \"proto3\"; package pkg; import \"a.proto\"; \
                 message B { A.Inner f = 1; .pkg.A g = 2; }",
            ),
        ],
    )
    .unwrap();
    let fields = &files[0].message_type[0].field;
    assert_eq!(fields[0].type_name(), ".pkg.A.Inner");
    assert_eq!(fields[1].type_name(), ".pkg.A");
    assert_eq!(
        fields[0].r#type(),
        types::field_descriptor_proto::Type::Message
    );
}

#[test]
fn unresolved_type_reference() {
    assert_eq!(
        first_error_message("syntax = \"proto3\"; message M { Missing f = 1; }"),
        "could not resolve type reference Missing"
    );
}

#[test]
fn wrong_kind_type_reference() {
    assert_eq!(
        first_error_message(
            "syntax = \"proto3\"; message M { int32 a = 1; } \
             service S { rpc Get (M) returns (M.a); }"
        ),
        "invalid type: M.a is a field, not a message"
    );
}

#[test]
fn field_type_must_be_message_or_enum() {
    assert_eq!(
        first_error_message(
            "syntax = \"proto3\"; service S {} message M { S f = 1; }"
        ),
        "invalid type: S is a service, not a message or enum"
    );
}

#[test]
fn proto3_may_not_use_proto2_enums() {
    let err = compile(
        &["b.proto"],
        &[
            ("a.proto", "syntax = \"proto2\"; enum Old { FIRST = 1; }"),
            (
                "b.proto",
                "syntax = \"proto3\"; import \"a.proto\"; message M { Old f = 1; }",
            ),
        ],
    )
    .expect_err("expected cross-syntax enum error");
    assert_eq!(
        err.first().unwrap().message(),
        "field \"f\" uses a proto2 enum type \"Old\", which is not allowed in a proto3 message"
    );
}

#[test]
fn extension_tag_must_be_in_extendee_range() {
    assert_eq!(
        first_error_message(
            "syntax = \"proto2\"; message M { extensions 10 to 20; } \
             extend M { optional int32 e = 5; }"
        ),
        "extension \"e\": tag 5 is not in any extension range of message M"
    );
}

#[test]
fn import_cycle_is_reported() {
    let err = compile(
        &["a.proto"],
        &[
            ("a.proto", "syntax = \"proto3\"; import \"b.proto\";"),
            ("b.proto", "syntax = \"proto3\"; import \"a.proto\";"),
        ],
    )
    .expect_err("expected an import cycle");
    assert_eq!(
        err.first().unwrap().message(),
        "cycle found in imports: a.proto -> b.proto -> a.proto"
    );
}

#[test]
fn unused_import_warns() {
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = warnings.clone();

    let mut accessor = MemoryAccessor::new();
    accessor.add("a.proto", "syntax = \"proto3\"; message A {}");
    accessor.add(
        "b.proto",
        "syntax = \"proto3\"; import \"a.proto\"; message B {}",
    );
    Compiler::new()
        .accessor(accessor)
        .warning_reporter(move |diagnostic| {
            sink.lock().unwrap().push(diagnostic.to_string());
        })
        .parse_files(["b.proto"])
        .unwrap();

    assert_eq!(
        *warnings.lock().unwrap(),
        vec!["b.proto:1:20: import \"a.proto\" not used".to_owned()]
    );
}

#[test]
fn public_imports_reexport_symbols() {
    let files = compile(
        &["c.proto"],
        &[
            ("a.proto", "syntax = \"proto3\"; message M {}"),
            ("b.proto", "syntax = \"proto3\"; import public \"a.proto\";"),
            (
                "c.proto",
                "syntax = \"proto3\"; import \"b.proto\"; message C { M f = 1; }",
            ),
        ],
    )
    .unwrap();
    assert_eq!(files[0].message_type[0].field[0].type_name(), ".M");
}

#[test]
fn symbols_from_unimported_files_are_not_visible() {
    let err = compile(
        &["a.proto", "c.proto"],
        &[
            ("a.proto", "syntax = \"proto3\"; message M {}"),
            ("c.proto", "syntax = \"proto3\"; message C { M f = 1; }"),
        ],
    )
    .expect_err("expected resolution failure");
    assert_eq!(
        err.first().unwrap().message(),
        "could not resolve type reference M"
    );
}

// ---------------------------------------------------------------------------
// Option interpretation.

#[test]
fn custom_option_bytes_are_installed() {
    let files = compile_one(
        "syntax = \"proto3\";\n\
         import \"google/protobuf/descriptor.proto\";\n\
         extend google.protobuf.FileOptions { int32 answer = 50000; }\n\
         option (answer) = 7;\n",
    )
    .unwrap();

    let options = files[0].options.as_ref().unwrap();
    // Field 50000, varint wire type, value 7.
    assert_eq!(options.encoded(), [0x80, 0xb5, 0x18, 0x07]);
    assert!(options.get().uninterpreted_option.is_empty());
}

#[test]
fn standard_options_decode_into_typed_fields() {
    let files = compile_one(
        "syntax = \"proto3\";\n\
         message M { string s = 1 [deprecated = true]; }\n",
    )
    .unwrap();
    let field_options = files[0].message_type[0].field[0].options.as_ref().unwrap();
    assert!(field_options.get().deprecated());
}

#[test]
fn unknown_option_field() {
    assert_eq!(
        first_error_message("syntax = \"proto3\"; option no_such_option = 1;"),
        "field \"no_such_option\" of google.protobuf.FileOptions does not exist"
    );
}

#[test]
fn unknown_custom_option() {
    assert_eq!(
        first_error_message("syntax = \"proto3\"; option (missing.option) = 1;"),
        "unknown extension missing.option"
    );
}

#[test]
fn invalid_extension_kind() {
    assert_eq!(
        first_error_message(
            "syntax = \"proto3\"; message M {} option (M) = 1;"
        ),
        "invalid extension: M is a message, not an extension"
    );
}

#[test]
fn non_repeated_option_double_set() {
    assert_eq!(
        first_error_message(
            "syntax = \"proto3\"; option java_package = \"a\"; option java_package = \"b\";"
        ),
        "option java_package: non-repeated option field already set"
    );
}

#[test]
fn non_repeated_option_double_set_through_partial_paths() {
    let source = "syntax = \"proto3\";\n\
                  import \"google/protobuf/descriptor.proto\";\n\
                  message Conf { int32 a = 1; int32 b = 2; }\n\
                  extend google.protobuf.FileOptions { Conf conf = 50000; }\n\
                  option (conf) = { a: 1 };\n\
                  option (conf).b = 2;\n";
    assert_eq!(
        first_error_message(source),
        "option (conf).b: non-repeated option field already set"
    );
}

#[test]
fn option_value_type_checking() {
    assert_eq!(
        first_error_message("syntax = \"proto3\"; option java_package = 42;"),
        "expected a string for field \"java_package\", found '42'"
    );
    assert_eq!(
        first_error_message("syntax = \"proto3\"; option deprecated = \"nope\";"),
        "expected 'true' or 'false' for field \"deprecated\", found string literal"
    );
}

#[test]
fn option_int_range_checking() {
    let source = "syntax = \"proto3\";\n\
                  import \"google/protobuf/descriptor.proto\";\n\
                  extend google.protobuf.FileOptions { int32 small = 50000; }\n\
                  option (small) = 3000000000;\n";
    assert_eq!(
        first_error_message(source),
        "value 3000000000 is out of range for int32"
    );
}

#[test]
fn option_enum_values_match_by_name() {
    assert_eq!(
        first_error_message("syntax = \"proto3\"; option optimize_for = TURBO;"),
        "enum google.protobuf.FileOptions.OptimizeMode has no value named TURBO"
    );
}

#[test]
fn any_expansion_packs_the_value() {
    let source = "syntax = \"proto3\";\n\
                  import \"google/protobuf/any.proto\";\n\
                  import \"google/protobuf/descriptor.proto\";\n\
                  message Payload { int32 num = 1; }\n\
                  extend google.protobuf.FileOptions { google.protobuf.Any any = 50000; }\n\
                  option (any) = { [type.googleapis.com/Payload] { num: 3 } };\n";
    let files = compiler(&[("test.proto", source)])
        .parse_files(["test.proto"])
        .unwrap();

    let encoded = files[0].options.as_ref().unwrap().encoded().to_vec();
    // The extension holds an Any message whose type_url names Payload.
    let text = String::from_utf8_lossy(&encoded);
    assert!(
        text.contains("type.googleapis.com/Payload"),
        "missing type url in {:?}",
        encoded
    );
}

#[test]
fn any_expansion_requires_any_typed_field() {
    let source = "syntax = \"proto3\";\n\
                  import \"google/protobuf/descriptor.proto\";\n\
                  message NotAny { int32 num = 1; }\n\
                  extend google.protobuf.FileOptions { NotAny opt = 50000; }\n\
                  option (opt) = { [type.googleapis.com/NotAny] { num: 3 } };\n";
    assert_eq!(
        first_error_message(source),
        "the field type must be 'google.protobuf.Any' to use Any expansion syntax"
    );
}

#[test]
fn required_option_fields_are_enforced() {
    let source = "syntax = \"proto2\";\n\
                  import \"google/protobuf/descriptor.proto\";\n\
                  message Strict { required int32 must = 1; optional int32 may = 2; }\n\
                  extend google.protobuf.FileOptions { optional Strict strict = 50000; }\n\
                  option (strict) = { may: 1 };\n";
    assert_eq!(
        first_error_message(source),
        "some required fields missing: (strict).must"
    );
}

// ---------------------------------------------------------------------------
// Driver behavior.

#[test]
fn standard_imports_are_bundled() {
    let files = compile_one(
        "syntax = \"proto3\";\n\
         import \"google/protobuf/timestamp.proto\";\n\
         message Event { google.protobuf.Timestamp at = 1; }\n",
    )
    .unwrap();
    assert_eq!(
        files[0].message_type[0].field[0].type_name(),
        ".google.protobuf.Timestamp"
    );
}

#[test]
fn entry_file_not_found() {
    let err = Compiler::new()
        .accessor(MemoryAccessor::new())
        .parse_files(["nope.proto"])
        .expect_err("expected missing file");
    assert!(err.is_file_not_found());
    assert_eq!(err.to_string(), "file 'nope.proto' was not found");
}

#[test]
fn missing_import_is_positioned_at_the_import() {
    assert_eq!(
        first_error("syntax = \"proto3\";\nimport \"gone.proto\";"),
        "test.proto:2:1: import \"gone.proto\" was not found"
    );
}

#[test]
fn error_reporter_can_stop_the_pipeline() {
    let mut accessor = MemoryAccessor::new();
    accessor.add("test.proto", "message foo {} enum foo { V = 0; }");
    let err = Compiler::new()
        .accessor(accessor)
        .error_reporter(|_| Err("stopped by reporter".into()))
        .parse_files(["test.proto"])
        .expect_err("reporter stops the compilation");
    assert_eq!(err.to_string(), "stopped by reporter");
}

#[test]
fn unlinked_parse_keeps_written_references() {
    let mut accessor = MemoryAccessor::new();
    accessor.add(
        "test.proto",
        "syntax = \"proto3\"; message M { Other f = 1; } option java_package = \"x\";",
    );
    let files = Compiler::new()
        .accessor(accessor)
        .parse_files_but_do_not_link(["test.proto"])
        .unwrap();
    // The reference to the (missing) type stays as written, and options stay
    // uninterpreted.
    assert_eq!(files[0].message_type[0].field[0].type_name(), "Other");
    let options = files[0].options.as_ref().unwrap().get();
    assert_eq!(options.uninterpreted_option.len(), 1);
    assert_eq!(options.java_package, None);
}

#[test]
fn unlinked_validation_is_opt_in() {
    let source = "syntax = \"proto3\"; enum E {}";
    let mut accessor = MemoryAccessor::new();
    accessor.add("test.proto", source);
    // Without the flag the empty enum goes unnoticed.
    Compiler::new()
        .accessor(accessor.clone())
        .parse_files_but_do_not_link(["test.proto"])
        .unwrap();
    // With it, validation runs.
    let err = Compiler::new()
        .accessor(accessor)
        .validate_unlinked_files(true)
        .parse_files_but_do_not_link(["test.proto"])
        .expect_err("expected validation error");
    assert_eq!(
        err.first().unwrap().message(),
        "enums must define at least one value"
    );
}

#[test]
fn unlinked_option_interpretation_is_best_effort() {
    let mut accessor = MemoryAccessor::new();
    accessor.add(
        "test.proto",
        "syntax = \"proto3\"; option java_package = \"com.example\"; option (missing) = 1;",
    );
    let files = Compiler::new()
        .accessor(accessor)
        .interpret_options_in_unlinked_files(true)
        .parse_files_but_do_not_link(["test.proto"])
        .unwrap();
    let options = files[0].options.as_ref().unwrap().get();
    // The known option was interpreted; the unresolvable one neither errored
    // nor survived.
    assert_eq!(options.java_package(), "com.example");
}

#[test]
fn source_code_info_is_opt_in() {
    let mut accessor = MemoryAccessor::new();
    accessor.add("test.proto", "syntax = \"proto3\"; message M {}");
    let files = Compiler::new()
        .accessor(accessor.clone())
        .parse_files(["test.proto"])
        .unwrap();
    assert!(files[0].source_code_info.is_none());

    let files = Compiler::new()
        .accessor(accessor)
        .include_source_code_info(true)
        .parse_files(["test.proto"])
        .unwrap();
    let info = files[0].source_code_info.as_ref().unwrap();
    assert!(info.location.iter().any(|l| l.path == [4, 0]));
}

#[test]
fn file_descriptor_set_is_ordered_dependencies_first() {
    let mut accessor = MemoryAccessor::new();
    accessor.add("a.proto", "syntax = \"proto3\"; message A {}");
    accessor.add(
        "b.proto",
        "syntax = \"proto3\"; import \"a.proto\"; message B { A a = 1; }",
    );
    let set = Compiler::new()
        .accessor(accessor)
        .parse_file_descriptor_set(["b.proto"])
        .unwrap();
    let names: Vec<_> = set.file.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["a.proto", "b.proto"]);
}

#[test]
fn lookup_import_proto_short_circuits_parsing() {
    let dependency = types::FileDescriptorProto {
        name: Some("dep.proto".to_owned()),
        syntax: Some("proto3".to_owned()),
        message_type: vec![types::DescriptorProto {
            name: Some("FromLookup".to_owned()),
            ..Default::default()
        }],
        ..Default::default()
    };

    let mut accessor = MemoryAccessor::new();
    accessor.add(
        "test.proto",
        "syntax = \"proto3\"; import \"dep.proto\"; message M { FromLookup f = 1; }",
    );
    let files = Compiler::new()
        .accessor(accessor)
        .lookup_import_proto(move |name| {
            (name == "dep.proto").then(|| dependency.clone())
        })
        .parse_files(["test.proto"])
        .unwrap();
    assert_eq!(files[0].message_type[0].field[0].type_name(), ".FromLookup");
}

#[test]
fn import_path_roots_are_searched() {
    let mut accessor = MemoryAccessor::new();
    accessor.add("vendor/dep.proto", "syntax = \"proto3\"; message D {}");
    accessor.add(
        "test.proto",
        "syntax = \"proto3\"; import \"dep.proto\"; message M { D d = 1; }",
    );
    let files = Compiler::new()
        .accessor(accessor)
        .import_paths(["vendor"])
        .parse_files(["test.proto"])
        .unwrap();
    assert_eq!(files[0].message_type[0].field[0].type_name(), ".D");
}

#[test]
fn inferred_import_paths_rename_files() {
    let mut accessor = MemoryAccessor::new();
    accessor.add("protos/a.proto", "syntax = \"proto3\"; message A {}");
    accessor.add(
        "protos/b.proto",
        "syntax = \"proto3\"; import \"a.proto\"; message B { A a = 1; }",
    );
    let files = Compiler::new()
        .accessor(accessor)
        .infer_import_paths(true)
        .parse_files(["protos/b.proto"])
        .unwrap();
    assert_eq!(files[0].message_type[0].field[0].type_name(), ".A");
}

#[test]
fn duplicate_file_level_imports() {
    assert_eq!(
        first_error_message(
            "syntax = \"proto3\";\n\
             import \"google/protobuf/empty.proto\";\n\
             import \"google/protobuf/empty.proto\";\n\
             message M { google.protobuf.Empty e = 1; }\n"
        ),
        "duplicate import of \"google/protobuf/empty.proto\""
    );
}
