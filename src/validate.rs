//! Per-file validation: every rule that needs no information from other
//! files. Rules that depend on the declared syntax but not on the syntax
//! tree itself live here; the rest of the per-file rules are enforced
//! during lowering, where the syntax tree is still in view.

use std::collections::HashMap;

use prost_types::UninterpretedOption;

use crate::{
    error::{DiagnosticKind, DiagnosticSink, LineIndex},
    generate::SourceMap,
    tag,
    types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto},
    Syntax,
};

pub(crate) fn validate(
    descriptor: &FileDescriptorProto,
    syntax: Syntax,
    map: &SourceMap,
    source: &str,
    lines: &LineIndex,
    sink: &mut DiagnosticSink,
) {
    let mut validator = Validator {
        syntax,
        map,
        source,
        lines,
        sink,
        path: Vec::new(),
    };
    validator.file(descriptor);
}

/// Probes an uninterpreted option list for a boolean option set by its
/// simple name, before interpretation has run.
pub(crate) fn find_bool_option(
    options: &[UninterpretedOption],
    name: &str,
) -> Option<(usize, bool)> {
    options.iter().enumerate().find_map(|(index, option)| {
        if option.name.len() == 1
            && !option.name[0].is_extension
            && option.name[0].name_part == name
        {
            match option.identifier_value.as_deref() {
                Some("true") => Some((index, true)),
                Some("false") => Some((index, false)),
                _ => None,
            }
        } else {
            None
        }
    })
}

/// The PascalCase form protoc uses to detect enum values that would map to
/// the same generated name.
fn enum_value_pascal_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut uppercase_next = true;
    for ch in name.chars() {
        if ch == '_' {
            uppercase_next = true;
        } else if uppercase_next {
            result.push(ch.to_ascii_uppercase());
            uppercase_next = false;
        } else {
            result.push(ch.to_ascii_lowercase());
        }
    }
    result
}

/// An inclusive tag range for overlap checks and display.
#[derive(Clone, Copy, PartialEq)]
struct Range {
    start: i32,
    end: i32,
}

impl Range {
    fn overlaps(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    fn contains(&self, value: i32) -> bool {
        (self.start..=self.end).contains(&value)
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}

struct Validator<'a, 'b, 'c> {
    syntax: Syntax,
    map: &'a SourceMap,
    source: &'a str,
    lines: &'b LineIndex,
    sink: &'b mut DiagnosticSink<'c>,
    path: Vec<i32>,
}

impl<'a, 'b, 'c> Validator<'a, 'b, 'c> {
    fn error_at(&mut self, suffix: &[i32], kind: DiagnosticKind) {
        let span = self.span(suffix);
        self.sink.error(self.lines, self.source, span, kind);
    }

    fn warning_at(&mut self, suffix: &[i32], kind: DiagnosticKind) {
        let span = self.span(suffix);
        self.sink.warning(self.lines, self.source, span, kind);
    }

    fn span(&self, suffix: &[i32]) -> std::ops::Range<usize> {
        let mut path = self.path.clone();
        path.extend_from_slice(suffix);
        self.map.span_or_enclosing(&path)
    }

    fn location(&self, suffix: &[i32]) -> crate::SourceLocation {
        self.lines.location(self.span(suffix).start)
    }

    fn file(&mut self, file: &FileDescriptorProto) {
        let mut seen = HashMap::new();
        for (i, dependency) in file.dependency.iter().enumerate() {
            if seen.insert(dependency.as_str(), i).is_some() {
                self.error_at(
                    &[tag::file::DEPENDENCY, i as i32],
                    DiagnosticKind::DuplicateImport {
                        name: dependency.clone(),
                    },
                );
            }
        }

        for (i, message) in file.message_type.iter().enumerate() {
            self.path.extend([tag::file::MESSAGE_TYPE, i as i32]);
            self.message(message);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, enum_) in file.enum_type.iter().enumerate() {
            self.path.extend([tag::file::ENUM_TYPE, i as i32]);
            self.enum_(enum_);
            self.path.truncate(self.path.len() - 2);
        }
    }

    fn message(&mut self, message: &DescriptorProto) {
        self.check_ranges(message);
        self.check_field_tags(message);
        self.check_json_names(message);
        self.check_message_set(message);

        for (i, nested) in message.nested_type.iter().enumerate() {
            self.path.extend([tag::message::NESTED_TYPE, i as i32]);
            self.message(nested);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, enum_) in message.enum_type.iter().enumerate() {
            self.path.extend([tag::message::ENUM_TYPE, i as i32]);
            self.enum_(enum_);
            self.path.truncate(self.path.len() - 2);
        }
    }

    fn check_ranges(&mut self, message: &DescriptorProto) {
        let reserved: Vec<Range> = message
            .reserved_range
            .iter()
            .map(|r| Range {
                start: r.start(),
                end: r.end().saturating_sub(1),
            })
            .collect();
        let extensions: Vec<Range> = message
            .extension_range
            .iter()
            .map(|r| Range {
                start: r.start(),
                end: r.end().saturating_sub(1),
            })
            .collect();

        for (i, second) in reserved.iter().enumerate() {
            for first in &reserved[..i] {
                if second.overlaps(first) {
                    self.error_at(
                        &[tag::message::RESERVED_RANGE, i as i32],
                        DiagnosticKind::RangeOverlap {
                            kind: "reserved",
                            first: first.to_string(),
                            second: second.to_string(),
                        },
                    );
                }
            }
        }

        for (i, second) in extensions.iter().enumerate() {
            for first in &extensions[..i] {
                if second.overlaps(first) {
                    self.error_at(
                        &[tag::message::EXTENSION_RANGE, i as i32],
                        DiagnosticKind::RangeOverlap {
                            kind: "extension",
                            first: first.to_string(),
                            second: second.to_string(),
                        },
                    );
                }
            }
            for first in &reserved {
                if second.overlaps(first) {
                    self.error_at(
                        &[tag::message::EXTENSION_RANGE, i as i32],
                        DiagnosticKind::RangeOverlap {
                            kind: "reserved",
                            first: first.to_string(),
                            second: second.to_string(),
                        },
                    );
                }
            }
        }

        for (i, field) in message.field.iter().enumerate() {
            let number = field.number();
            if reserved.iter().any(|range| range.contains(number)) {
                self.error_at(
                    &[tag::message::FIELD, i as i32, tag::field::NUMBER],
                    DiagnosticKind::FieldReservedNumber {
                        name: field.name().to_owned(),
                        number,
                    },
                );
            }
            if extensions.iter().any(|range| range.contains(number)) {
                self.error_at(
                    &[tag::message::FIELD, i as i32, tag::field::NUMBER],
                    DiagnosticKind::FieldExtensionRangeNumber {
                        name: field.name().to_owned(),
                        number,
                    },
                );
            }
            if message.reserved_name.iter().any(|name| name == field.name()) {
                self.error_at(
                    &[tag::message::FIELD, i as i32, tag::field::NAME],
                    DiagnosticKind::FieldReservedName {
                        name: field.name().to_owned(),
                    },
                );
            }
        }
    }

    fn check_field_tags(&mut self, message: &DescriptorProto) {
        let mut numbers: HashMap<i32, &FieldDescriptorProto> = HashMap::new();
        for (i, field) in message.field.iter().enumerate() {
            if let Some(first) = numbers.insert(field.number(), field) {
                self.error_at(
                    &[tag::message::FIELD, i as i32, tag::field::NUMBER],
                    DiagnosticKind::DuplicateFieldTag {
                        tag: field.number(),
                        first: first.name().to_owned(),
                        second: field.name().to_owned(),
                    },
                );
            }
        }
    }

    fn check_json_names(&mut self, message: &DescriptorProto) {
        // (json name, custom) -> first declaring field index
        let mut names: HashMap<&str, (usize, bool)> = HashMap::new();
        for (i, field) in message.field.iter().enumerate() {
            let custom = self
                .map
                .span(
                    &[
                        self.path.as_slice(),
                        &[tag::message::FIELD, i as i32, tag::field::JSON_NAME],
                    ]
                    .concat(),
                )
                .is_some();
            let json_name = field.json_name();

            match names.get(json_name) {
                None => {
                    names.insert(json_name, (i, custom));
                }
                Some(&(first, first_custom)) => {
                    let defined_at =
                        self.location(&[tag::message::FIELD, first as i32, tag::field::NAME]);
                    let kind = DiagnosticKind::JsonNameConflict {
                        kind: if custom { "custom" } else { "default" },
                        json_name: json_name.to_owned(),
                        other_kind: if first_custom { "custom" } else { "default" },
                        other: message.field[first].name().to_owned(),
                        defined_at,
                    };
                    let suffix = [tag::message::FIELD, i as i32, tag::field::NAME];
                    if !custom && !first_custom && self.syntax == Syntax::Proto2 {
                        self.warning_at(&suffix, kind);
                    } else {
                        self.error_at(&suffix, kind);
                    }
                }
            }
        }
    }

    fn check_message_set(&mut self, message: &DescriptorProto) {
        let message_set = message.options.as_ref().is_some_and(|options| {
            options.get().message_set_wire_format()
                || matches!(
                    find_bool_option(
                        &options.get().uninterpreted_option,
                        "message_set_wire_format"
                    ),
                    Some((_, true))
                )
        });
        if !message_set {
            return;
        }

        if message.extension_range.is_empty() {
            self.error_at(&[], DiagnosticKind::MessageSetWithoutRanges);
        }
        for (i, _) in message.field.iter().enumerate() {
            self.error_at(
                &[tag::message::FIELD, i as i32],
                DiagnosticKind::MessageSetWithFields,
            );
        }
    }

    fn enum_(&mut self, enum_: &EnumDescriptorProto) {
        if enum_.value.is_empty() {
            self.error_at(&[], DiagnosticKind::EmptyEnum);
            return;
        }

        if self.syntax == Syntax::Proto3 && enum_.value[0].number() != 0 {
            self.error_at(
                &[tag::enum_::VALUE, 0, tag::enum_value::NUMBER],
                DiagnosticKind::Proto3EnumFirstValueNotZero,
            );
        }

        let allow_alias = enum_.options.as_ref().and_then(|options| {
            if options.get().allow_alias() {
                return Some(true);
            }
            find_bool_option(&options.get().uninterpreted_option, "allow_alias")
                .map(|(_, value)| value)
        });

        let mut numbers: HashMap<i32, usize> = HashMap::new();
        let mut has_alias = false;
        for (i, value) in enum_.value.iter().enumerate() {
            match numbers.get(&value.number()) {
                None => {
                    numbers.insert(value.number(), i);
                }
                Some(&first) => {
                    has_alias = true;
                    if allow_alias != Some(true) {
                        self.error_at(
                            &[tag::enum_::VALUE, i as i32, tag::enum_value::NUMBER],
                            DiagnosticKind::DuplicateEnumNumber {
                                number: value.number(),
                                first: enum_.value[first].name().to_owned(),
                                second: value.name().to_owned(),
                            },
                        );
                    }
                }
            }
        }
        if allow_alias == Some(true) && !has_alias {
            self.error_at(&[], DiagnosticKind::AllowAliasWithoutAliases);
        }

        let reserved: Vec<Range> = enum_
            .reserved_range
            .iter()
            .map(|r| Range {
                start: r.start(),
                end: r.end(),
            })
            .collect();
        for (i, second) in reserved.iter().enumerate() {
            for first in &reserved[..i] {
                if second.overlaps(first) {
                    self.error_at(
                        &[tag::enum_::RESERVED_RANGE, i as i32],
                        DiagnosticKind::RangeOverlap {
                            kind: "reserved",
                            first: first.to_string(),
                            second: second.to_string(),
                        },
                    );
                }
            }
        }

        for (i, value) in enum_.value.iter().enumerate() {
            if reserved.iter().any(|range| range.contains(value.number())) {
                self.error_at(
                    &[tag::enum_::VALUE, i as i32, tag::enum_value::NUMBER],
                    DiagnosticKind::EnumValueReservedNumber {
                        name: value.name().to_owned(),
                        number: value.number(),
                    },
                );
            }
            if enum_.reserved_name.iter().any(|name| name == value.name()) {
                self.error_at(
                    &[tag::enum_::VALUE, i as i32, tag::enum_value::NAME],
                    DiagnosticKind::EnumValueReservedName {
                        name: value.name().to_owned(),
                    },
                );
            }
        }

        self.check_enum_camel_case(enum_);
    }

    fn check_enum_camel_case(&mut self, enum_: &EnumDescriptorProto) {
        let mut names: HashMap<String, usize> = HashMap::new();
        for (i, value) in enum_.value.iter().enumerate() {
            let camel = enum_value_pascal_case(value.name());
            match names.get(&camel) {
                None => {
                    names.insert(camel, i);
                }
                Some(&first) => {
                    let defined_at =
                        self.location(&[tag::enum_::VALUE, first as i32, tag::enum_value::NAME]);
                    let kind = DiagnosticKind::EnumValueCamelCaseConflict {
                        camel,
                        other: enum_.value[first].name().to_owned(),
                        defined_at,
                    };
                    let suffix = [tag::enum_::VALUE, i as i32, tag::enum_value::NAME];
                    if self.syntax == Syntax::Proto2 {
                        self.warning_at(&suffix, kind);
                    } else {
                        self.error_at(&suffix, kind);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_case_for_enum_values() {
        assert_eq!(enum_value_pascal_case("true"), "True");
        assert_eq!(enum_value_pascal_case("TRUE"), "True");
        assert_eq!(enum_value_pascal_case("FOO_BAR"), "FooBar");
        assert_eq!(enum_value_pascal_case("fooBar"), "Foobar");
    }

    #[test]
    fn range_display() {
        assert_eq!(Range { start: 1, end: 1 }.to_string(), "1");
        assert_eq!(Range { start: 1, end: 9 }.to_string(), "1 to 9");
    }

    #[test]
    fn range_overlap() {
        let a = Range { start: 1, end: 5 };
        let b = Range { start: 5, end: 9 };
        let c = Range { start: 6, end: 9 };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(b.overlaps(&c));
    }
}
