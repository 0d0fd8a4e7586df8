//! Property test: printing the syntax tree reproduces the input exactly,
//! whatever the spacing, comments, and declaration mix.

use proptest::prelude::*;
use protolink::{Compiler, MemoryAccessor};

fn round_trip(source: &str) -> Result<(), TestCaseError> {
    let mut accessor = MemoryAccessor::new();
    accessor.add("test.proto", source);
    let ast = Compiler::new()
        .accessor(accessor)
        .parse_to_ast("test.proto")
        .map_err(|err| TestCaseError::fail(format!("parse failed: {}", err)))?;
    prop_assert_eq!(ast.to_source(), source);
    Ok(())
}

prop_compose! {
    fn field()(
        name in "[a-z][a-z0-9_]{0,8}",
        ty in prop::sample::select(vec!["int32", "string", "bool", "bytes", "sfixed64"]),
        number in 1i64..100_000,
        pad in "[ \t]{1,3}",
    ) -> String {
        format!("  {ty}{pad}{name} = {number};\n")
    }
}

prop_compose! {
    fn comment()(text in "[ a-zA-Z0-9.,]{0,30}") -> String {
        format!("  // {text}\n")
    }
}

proptest! {
    #[test]
    fn printing_reproduces_arbitrary_messages(
        message_name in "[A-Z][A-Za-z0-9]{0,8}",
        items in prop::collection::vec(
            prop_oneof![field(), comment(), Just(";\n".to_owned())],
            0..12,
        ),
        trailing in "[ \t\n]{0,4}",
    ) {
        let mut source = String::from("syntax = \"proto3\";\n");
        source.push_str(&format!("message {} {{\n", message_name));
        for item in &items {
            source.push_str(item);
        }
        source.push_str("}\n");
        source.push_str(&trailing);

        round_trip(&source)?;
    }

    #[test]
    fn printing_reproduces_string_literals(
        package in "[a-z][a-z0-9]{0,6}(\\.[a-z][a-z0-9]{0,6}){0,2}",
        value in "[ -!#-\\[\\]-~]{0,20}",
    ) {
        // The character class avoids quote and backslash so the literal is
        // valid as written.
        let source = format!(
            "syntax = \"proto3\";\npackage {};\noption java_package = \"{}\";\n",
            package, value,
        );
        round_trip(&source)?;
    }
}
