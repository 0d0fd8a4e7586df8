//! Renders parsed aggregate option values into the canonical text-format
//! string stored in `UninterpretedOption.aggregate_value`.
//!
//! The descriptor schema has no structured slot for an aggregate, so the
//! value is carried as text until the option interpreter re-examines it.

use std::fmt::Write;

use crate::ast;

pub(crate) fn aggregate_to_text(aggregate: &ast::Aggregate) -> String {
    let mut out = String::new();
    write_fields(&aggregate.fields, &mut out);
    out
}

fn write_fields(fields: &[ast::AggregateField], out: &mut String) {
    for (i, field) in fields.iter().enumerate() {
        if i != 0 {
            out.push(' ');
        }
        write_field(field, out);
    }
}

fn write_field(field: &ast::AggregateField, out: &mut String) {
    match &field.name {
        ast::AggregateFieldName::Plain(name) => out.push_str(name.value()),
        ast::AggregateFieldName::Extension { name, .. } => {
            write!(out, "[{}]", name).unwrap();
        }
        ast::AggregateFieldName::AnyUrl { domain, name, .. } => {
            write!(out, "[{}/{}]", domain, name).unwrap();
        }
    }
    match &field.value {
        ast::Value::Aggregate(aggregate) => {
            out.push_str(" { ");
            write_fields(&aggregate.fields, out);
            out.push_str(" }");
        }
        value => {
            out.push_str(": ");
            write_value(value, out);
        }
    }
}

/// Renders a single value (used for array values that have no structured
/// slot in `UninterpretedOption`).
pub(crate) fn write_value_text(value: &ast::Value, out: &mut String) {
    write_value(value, out);
}

fn write_value(value: &ast::Value, out: &mut String) {
    match value {
        ast::Value::Ident(name) => {
            write!(out, "{}", name).unwrap();
        }
        ast::Value::Int(int) => {
            write!(out, "{}", int.value).unwrap();
        }
        ast::Value::Float(float) => write_float(float.value, out),
        ast::Value::String(string) => write_bytes(&string.value(), out),
        ast::Value::Signed {
            negative, value, ..
        } => {
            if *negative {
                out.push('-');
            }
            write_value(value, out);
        }
        ast::Value::Array(array) => {
            out.push('[');
            for (i, value) in array.values.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                write_value(value, out);
            }
            out.push(']');
        }
        ast::Value::Aggregate(aggregate) => {
            out.push_str("{ ");
            write_fields(&aggregate.fields, out);
            out.push_str(" }");
        }
    }
}

pub(crate) fn write_float(value: f64, out: &mut String) {
    if value.is_nan() {
        out.push_str("nan");
    } else if value.is_infinite() {
        if value.is_sign_negative() {
            out.push('-');
        }
        out.push_str("inf");
    } else {
        write!(out, "{}", value).unwrap();
    }
}

pub(crate) fn write_bytes(bytes: &[u8], out: &mut String) {
    out.push('"');
    escape_bytes(bytes, out);
    out.push('"');
}

/// C-style escaping matching `google::protobuf::CEscape`: printable ASCII
/// except quote and backslash passes through, everything else becomes an
/// octal escape.
pub(crate) fn escape_bytes(bytes: &[u8], out: &mut String) {
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                write!(out, "\\{:03o}", b).unwrap();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_bytes() {
        let mut out = String::new();
        write_bytes(b"a\"b\\c\nd\x01\xff", &mut out);
        assert_eq!(out, r#""a\"b\\c\nd\001\377""#);
    }

    #[test]
    fn formats_floats() {
        let mut out = String::new();
        write_float(1.5, &mut out);
        out.push(' ');
        write_float(f64::NEG_INFINITY, &mut out);
        out.push(' ');
        write_float(f64::NAN, &mut out);
        assert_eq!(out, "1.5 -inf nan");
    }
}
