//! Lowers the concrete syntax tree to a file descriptor.
//!
//! Everything that can be decided from one file alone happens here: JSON
//! name derivation, map-entry and synthetic-oneof synthesis, pseudo-option
//! hoisting, and the collection of every remaining option into the
//! `uninterpreted_option` list for the interpreter. Each lowered element
//! records its source span in the back-map, keyed by the same path that
//! names it in `source_code_info`.

mod fmt;
#[cfg(test)]
mod tests;

use std::collections::HashMap;

use prost_types::{
    source_code_info::Location, uninterpreted_option::NamePart, SourceCodeInfo,
    UninterpretedOption,
};

use crate::{
    ast,
    error::{DiagnosticKind, DiagnosticSink, LineIndex},
    tag,
    types::{
        field_descriptor_proto::{Label, Type},
        DescriptorProto, EnumDescriptorProto, EnumOptions, EnumReservedRange,
        EnumValueDescriptorProto, EnumValueOptions, ExtensionRange, ExtensionRangeOptions,
        FieldDescriptorProto, FieldOptions, FileDescriptorProto, FileOptions, MessageOptions,
        MethodDescriptorProto, MethodOptions, OneofDescriptorProto, OneofOptions, Options,
        ReservedRange, ServiceDescriptorProto, ServiceOptions,
    },
    Syntax, MAX_TAG,
};

/// Reserved tag sub-range for the wire format itself.
const RESERVED_TAG_START: i64 = 19000;
const RESERVED_TAG_END: i64 = 19999;

/// A lowered file: the descriptor, its syntax, and the back-map from
/// descriptor paths to source spans and option syntax.
pub(crate) struct GeneratedFile {
    pub(crate) descriptor: FileDescriptorProto,
    pub(crate) syntax: Syntax,
    pub(crate) source_map: SourceMap,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SourceInfo {
    pub(crate) span: ast::Span,
    pub(crate) comments: ast::Comments,
}

/// Maps descriptor paths (the `source_code_info` path convention) back to
/// source spans, and retains the parsed form of every uninterpreted option
/// for the interpreter.
#[derive(Debug, Default)]
pub(crate) struct SourceMap {
    locations: Vec<(Box<[i32]>, SourceInfo)>,
    by_path: HashMap<Box<[i32]>, usize>,
    options: HashMap<Box<[i32]>, ast::OptionBody>,
}

impl SourceMap {
    fn record(&mut self, path: Box<[i32]>, span: ast::Span) {
        self.record_with_comments(path, span, ast::Comments::default());
    }

    fn record_with_comments(&mut self, path: Box<[i32]>, span: ast::Span, comments: ast::Comments) {
        let index = self.locations.len();
        self.locations.push((path.clone(), SourceInfo { span, comments }));
        self.by_path.insert(path, index);
    }

    fn record_option(&mut self, path: Box<[i32]>, body: ast::OptionBody) {
        self.options.insert(path, body);
    }

    pub(crate) fn span(&self, path: &[i32]) -> Option<ast::Span> {
        self.by_path
            .get(path)
            .map(|&index| self.locations[index].1.span.clone())
    }

    /// The span for a path, walking up to enclosing elements when the exact
    /// path was not recorded.
    pub(crate) fn span_or_enclosing(&self, path: &[i32]) -> ast::Span {
        let mut path = path;
        loop {
            if let Some(span) = self.span(path) {
                return span;
            }
            match path.split_last() {
                Some((_, rest)) => path = rest,
                None => return 0..0,
            }
        }
    }

    pub(crate) fn option_body(&self, path: &[i32]) -> Option<&ast::OptionBody> {
        self.options.get(path)
    }

    pub(crate) fn to_source_code_info(&self, lines: &LineIndex) -> SourceCodeInfo {
        let location = self
            .locations
            .iter()
            .map(|(path, info)| {
                let start = lines.location(info.span.start);
                let end = lines.location(info.span.end);
                let span = if start.line == end.line {
                    vec![
                        start.line as i32 - 1,
                        start.column as i32 - 1,
                        end.column as i32 - 1,
                    ]
                } else {
                    vec![
                        start.line as i32 - 1,
                        start.column as i32 - 1,
                        end.line as i32 - 1,
                        end.column as i32 - 1,
                    ]
                };
                Location {
                    path: path.to_vec(),
                    span,
                    leading_comments: info.comments.leading.clone(),
                    trailing_comments: info.comments.trailing.clone(),
                    leading_detached_comments: info.comments.leading_detached.clone(),
                }
            })
            .collect();
        SourceCodeInfo { location }
    }
}

pub(crate) fn generate(
    name: &str,
    file: &ast::File,
    source: &str,
    lines: &LineIndex,
    sink: &mut DiagnosticSink,
) -> GeneratedFile {
    let mut generator = Generator {
        source,
        lines,
        sink,
        syntax: Syntax::Proto2,
        path: Vec::new(),
        map: SourceMap::default(),
        scope: String::new(),
    };
    let descriptor = generator.file(name, file);
    GeneratedFile {
        descriptor,
        syntax: generator.syntax,
        source_map: generator.map,
    }
}

struct Generator<'a, 'b, 'c> {
    source: &'a str,
    lines: &'b LineIndex,
    sink: &'b mut DiagnosticSink<'c>,
    syntax: Syntax,
    path: Vec<i32>,
    map: SourceMap,
    scope: String,
}

impl<'a, 'b, 'c> Generator<'a, 'b, 'c> {
    fn error(&mut self, span: ast::Span, kind: DiagnosticKind) {
        self.sink.error(self.lines, self.source, span, kind);
    }

    fn warning(&mut self, span: ast::Span, kind: DiagnosticKind) {
        self.sink.warning(self.lines, self.source, span, kind);
    }

    fn push(&mut self, component: i32) {
        self.path.push(component);
    }

    fn pop(&mut self) {
        self.path.pop().unwrap();
    }

    fn record(&mut self, span: ast::Span) {
        self.map.record(self.path.clone().into(), span);
    }

    fn record_with_comments(&mut self, span: ast::Span, comments: &ast::Comments) {
        self.map
            .record_with_comments(self.path.clone().into(), span, comments.clone());
    }

    fn record_child(&mut self, component: i32, span: ast::Span) {
        self.push(component);
        self.record(span);
        self.pop();
    }

    fn with_scope<R>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let len = self.scope.len();
        if !self.scope.is_empty() {
            self.scope.push('.');
        }
        self.scope.push_str(name);
        let result = f(self);
        self.scope.truncate(len);
        result
    }

    /// The absolute reference for `name` declared in the current scope.
    fn type_in_scope(&self, name: &str) -> String {
        if self.scope.is_empty() {
            format!(".{}", name)
        } else {
            format!(".{}.{}", self.scope, name)
        }
    }

    fn file(&mut self, name: &str, file: &ast::File) -> FileDescriptorProto {
        self.record(file.span.clone());

        let syntax = self.file_syntax(file);
        self.syntax = syntax;

        let mut descriptor = FileDescriptorProto {
            name: Some(name.to_owned()),
            syntax: match syntax {
                Syntax::Proto2 => None,
                Syntax::Proto3 => Some("proto3".to_owned()),
            },
            ..Default::default()
        };

        if let Some(package) = self.file_package(file) {
            descriptor.package = Some(package);
        }
        self.scope = descriptor.package().to_owned();

        let mut options = Vec::new();
        for item in &file.items {
            match item {
                ast::FileItem::Syntax(_) | ast::FileItem::Package(_) | ast::FileItem::Empty(_) => {}
                ast::FileItem::Import(import) => self.import(import, &mut descriptor),
                ast::FileItem::Option(option) => {
                    self.push(tag::file::OPTIONS);
                    if let Some(value) =
                        self.uninterpreted_option(option, options.len() as i32)
                    {
                        options.push(value);
                    }
                    self.pop();
                }
                ast::FileItem::Message(message) => {
                    self.push(tag::file::MESSAGE_TYPE);
                    self.push(descriptor.message_type.len() as i32);
                    let lowered = self.message(message);
                    self.pop();
                    self.pop();
                    descriptor.message_type.push(lowered);
                }
                ast::FileItem::Enum(enum_) => {
                    self.push(tag::file::ENUM_TYPE);
                    self.push(descriptor.enum_type.len() as i32);
                    let lowered = self.enum_(enum_);
                    self.pop();
                    self.pop();
                    descriptor.enum_type.push(lowered);
                }
                ast::FileItem::Service(service) => {
                    self.push(tag::file::SERVICE);
                    self.push(descriptor.service.len() as i32);
                    let lowered = self.service(service);
                    self.pop();
                    self.pop();
                    descriptor.service.push(lowered);
                }
                ast::FileItem::Extend(extend) => {
                    self.extend(
                        extend,
                        tag::file::EXTENSION,
                        &mut descriptor.extension,
                        &mut descriptor.message_type,
                        tag::file::MESSAGE_TYPE,
                    );
                }
            }
        }

        if !options.is_empty() {
            descriptor.options = Some(Options::new(FileOptions {
                uninterpreted_option: options,
                ..Default::default()
            }));
        }

        descriptor
    }

    fn file_syntax(&mut self, file: &ast::File) -> Syntax {
        let mut declared: Option<Syntax> = None;
        let mut first_decl = true;
        for item in &file.items {
            match item {
                ast::FileItem::Empty(_) => continue,
                ast::FileItem::Syntax(syntax) => {
                    if declared.is_some() {
                        self.error(syntax.span.clone(), DiagnosticKind::DuplicateSyntax);
                        continue;
                    }
                    if !first_decl {
                        self.error(syntax.span.clone(), DiagnosticKind::MisplacedSyntax);
                    }
                    self.push(tag::file::SYNTAX);
                    self.record_with_comments(syntax.span.clone(), &syntax.comments);
                    self.pop();
                    match syntax.value.as_utf8().as_deref() {
                        Some("proto2") => declared = Some(Syntax::Proto2),
                        Some("proto3") => declared = Some(Syntax::Proto3),
                        _ => {
                            self.error(syntax.value.span(), DiagnosticKind::UnknownSyntax);
                            declared = Some(Syntax::Proto2);
                        }
                    }
                    first_decl = false;
                }
                _ => first_decl = false,
            }
        }
        match declared {
            Some(syntax) => syntax,
            None => {
                self.warning(0..0, DiagnosticKind::NoSyntaxSpecified);
                Syntax::Proto2
            }
        }
    }

    fn file_package(&mut self, file: &ast::File) -> Option<String> {
        let mut package = None;
        for item in &file.items {
            if let ast::FileItem::Package(decl) = item {
                if package.is_some() {
                    self.error(decl.span.clone(), DiagnosticKind::DuplicatePackage);
                    continue;
                }
                self.push(tag::file::PACKAGE);
                self.record_with_comments(decl.span.clone(), &decl.comments);
                self.pop();
                package = Some(decl.name.to_string());
            }
        }
        package
    }

    fn import(&mut self, import: &ast::ImportDecl, descriptor: &mut FileDescriptorProto) {
        let name = match import.name.as_utf8() {
            Some(name) => name,
            None => {
                self.error(import.name.span(), DiagnosticKind::InvalidUtf8String);
                return;
            }
        };
        let index = descriptor.dependency.len() as i32;
        self.push(tag::file::DEPENDENCY);
        self.push(index);
        self.record_with_comments(import.span.clone(), &import.comments);
        self.pop();
        self.pop();
        match import.kind() {
            ast::ImportKind::Default => {}
            ast::ImportKind::Public => {
                self.push(tag::file::PUBLIC_DEPENDENCY);
                self.push(descriptor.public_dependency.len() as i32);
                self.record(import.span.clone());
                self.pop();
                self.pop();
                descriptor.public_dependency.push(index);
            }
            ast::ImportKind::Weak => descriptor.weak_dependency.push(index),
        }
        descriptor.dependency.push(name);
    }

    fn message(&mut self, message: &ast::Message) -> DescriptorProto {
        self.record_with_comments(message.span.clone(), &message.comments);
        self.record_child(tag::message::NAME, message.name.span());
        let mut descriptor =
            self.with_scope(message.name.value(), |gen| gen.message_body(&message.body));
        descriptor.name = Some(message.name.value().to_owned());
        descriptor
    }

    /// Lowers a message or group body. The caller sets the name and has
    /// already pushed the message's path and scope.
    fn message_body(&mut self, body: &ast::MessageBody) -> DescriptorProto {
        let mut descriptor = DescriptorProto::default();
        let mut options = Vec::new();
        let explicit_oneofs = body
            .items
            .iter()
            .filter(|item| matches!(item, ast::MessageItem::Oneof(_)))
            .count() as i32;
        let mut synthetic_oneofs: Vec<OneofDescriptorProto> = Vec::new();

        for item in &body.items {
            match item {
                ast::MessageItem::Field(field) => {
                    let index = descriptor.field.len() as i32;
                    self.push(tag::message::FIELD);
                    self.push(index);
                    let mut lowered = self.field(field, None, None);
                    self.pop();
                    self.pop();
                    if self.needs_synthetic_oneof(field, &lowered) {
                        lowered.proto3_optional = Some(true);
                        lowered.oneof_index =
                            Some(explicit_oneofs + synthetic_oneofs.len() as i32);
                        synthetic_oneofs.push(OneofDescriptorProto {
                            name: Some(format!("_{}", field.name.value())),
                            options: None,
                        });
                    }
                    descriptor.field.push(lowered);
                }
                ast::MessageItem::Map(map) => {
                    let (field, entry) = self.map_field(
                        map,
                        descriptor.field.len() as i32,
                        descriptor.nested_type.len() as i32,
                    );
                    descriptor.field.push(field);
                    descriptor.nested_type.push(entry);
                }
                ast::MessageItem::Group(group) => {
                    let (field, nested) = self.group(
                        group,
                        tag::message::FIELD,
                        descriptor.field.len() as i32,
                        tag::message::NESTED_TYPE,
                        descriptor.nested_type.len() as i32,
                        None,
                        None,
                    );
                    descriptor.field.push(field);
                    descriptor.nested_type.push(nested);
                }
                ast::MessageItem::Oneof(oneof) => {
                    let oneof_index = descriptor.oneof_decl.len() as i32;
                    let lowered = self.oneof(oneof, oneof_index, &mut descriptor);
                    descriptor.oneof_decl.push(lowered);
                }
                ast::MessageItem::Message(message) => {
                    self.push(tag::message::NESTED_TYPE);
                    self.push(descriptor.nested_type.len() as i32);
                    let lowered = self.message(message);
                    self.pop();
                    self.pop();
                    descriptor.nested_type.push(lowered);
                }
                ast::MessageItem::Enum(enum_) => {
                    self.push(tag::message::ENUM_TYPE);
                    self.push(descriptor.enum_type.len() as i32);
                    let lowered = self.enum_(enum_);
                    self.pop();
                    self.pop();
                    descriptor.enum_type.push(lowered);
                }
                ast::MessageItem::Extend(extend) => {
                    self.extend(
                        extend,
                        tag::message::EXTENSION,
                        &mut descriptor.extension,
                        &mut descriptor.nested_type,
                        tag::message::NESTED_TYPE,
                    );
                }
                ast::MessageItem::ExtensionRange(range) => {
                    self.extension_ranges(range, &mut descriptor);
                }
                ast::MessageItem::Reserved(reserved) => {
                    self.message_reserved(reserved, &mut descriptor);
                }
                ast::MessageItem::Option(option) => {
                    if option.body.name.is_plain("map_entry") {
                        self.explicit_map_entry(option);
                        continue;
                    }
                    self.push(tag::message::OPTIONS);
                    if let Some(value) = self.uninterpreted_option(option, options.len() as i32)
                    {
                        options.push(value);
                    }
                    self.pop();
                }
                ast::MessageItem::Empty(_) => {}
            }
        }

        descriptor.oneof_decl.extend(synthetic_oneofs);

        if !options.is_empty() {
            descriptor.options = Some(Options::new(MessageOptions {
                uninterpreted_option: options,
                ..Default::default()
            }));
        }

        descriptor
    }

    /// `option map_entry = false;` is dropped, matching the descriptor the
    /// canonical compiler produces; any other explicit setting is an error.
    fn explicit_map_entry(&mut self, option: &ast::OptionDecl) {
        match &option.body.value {
            ast::Value::Ident(ident) if ident.to_string() == "false" => {}
            _ => self.error(option.span.clone(), DiagnosticKind::ExplicitMapEntry),
        }
    }

    fn needs_synthetic_oneof(&self, field: &ast::Field, lowered: &FieldDescriptorProto) -> bool {
        self.syntax == Syntax::Proto3
            && matches!(
                &field.label,
                Some(ast::FieldLabel {
                    label: ast::Label::Optional,
                    ..
                })
            )
            && lowered.oneof_index.is_none()
    }

    /// Lowers one field declaration. The caller has pushed the field's path.
    fn field(
        &mut self,
        field: &ast::Field,
        oneof_index: Option<i32>,
        extendee: Option<&ast::TypeRef>,
    ) -> FieldDescriptorProto {
        self.record_with_comments(field.span.clone(), &field.comments);
        self.record_child(tag::field::NAME, field.name.span());
        self.record_child(tag::field::NUMBER, field.number.span());

        let label = match &field.label {
            Some(label) => {
                self.record_child(tag::field::LABEL, label.tok.span.clone());
                if oneof_index.is_some() {
                    let kind = DiagnosticKind::MisplacedFieldLabel {
                        label: label.label.as_str(),
                    };
                    self.error(label.tok.span.clone(), kind);
                }
                if label.label == ast::Label::Required {
                    if self.syntax == Syntax::Proto3 {
                        self.error(
                            label.tok.span.clone(),
                            DiagnosticKind::Proto3RequiredField,
                        );
                    } else if extendee.is_some() {
                        self.error(label.tok.span.clone(), DiagnosticKind::RequiredExtension);
                    }
                }
                match label.label {
                    ast::Label::Optional => Label::Optional,
                    ast::Label::Required => Label::Required,
                    ast::Label::Repeated => Label::Repeated,
                }
            }
            None => {
                if self.syntax == Syntax::Proto2 && oneof_index.is_none() {
                    self.error(field.ty.span(), DiagnosticKind::MissingFieldLabel);
                }
                Label::Optional
            }
        };

        let mut descriptor = FieldDescriptorProto {
            name: Some(field.name.value().to_owned()),
            number: Some(self.field_number(&field.number)),
            label: Some(label as i32),
            json_name: Some(to_json_name(field.name.value())),
            oneof_index,
            extendee: extendee.map(|extendee| {
                self.record_child(tag::field::EXTENDEE, extendee.span());
                extendee.to_string()
            }),
            ..Default::default()
        };

        match &field.ty {
            ast::FieldType::Scalar(scalar, ident) => {
                self.record_child(tag::field::TYPE, ident.span());
                descriptor.r#type = Some(scalar_type(*scalar) as i32);
            }
            ast::FieldType::Named(name) => {
                self.record_child(tag::field::TYPE_NAME, name.span());
                descriptor.type_name = Some(name.to_string());
            }
        }

        if let Some(compact) = &field.options {
            self.field_options(compact, &mut descriptor, field, extendee.is_some());
        }

        descriptor
    }

    /// Hoists the `default` and `json_name` pseudo-options and collects the
    /// rest as uninterpreted options.
    fn field_options(
        &mut self,
        compact: &ast::CompactOptions,
        descriptor: &mut FieldDescriptorProto,
        field: &ast::Field,
        is_extension: bool,
    ) {
        let mut options = Vec::new();
        for option in &compact.options {
            if option.name.is_plain("default") {
                self.hoist_default(option, descriptor, field);
            } else if option.name.is_plain("json_name") {
                self.hoist_json_name(option, descriptor, is_extension);
            } else {
                self.push(tag::field::OPTIONS);
                if let Some(value) =
                    self.uninterpreted_option_body(option, options.len() as i32, None)
                {
                    options.push(value);
                }
                self.pop();
            }
        }
        if !options.is_empty() {
            descriptor.options = Some(Options::new(FieldOptions {
                uninterpreted_option: options,
                ..Default::default()
            }));
        }
    }

    fn hoist_default(
        &mut self,
        option: &ast::OptionBody,
        descriptor: &mut FieldDescriptorProto,
        field: &ast::Field,
    ) {
        let span = option.value.span();
        if self.syntax == Syntax::Proto3 {
            self.error(option.span(), DiagnosticKind::Proto3DefaultValue);
            return;
        }
        if descriptor.label == Some(Label::Repeated as i32) {
            self.error(option.span(), DiagnosticKind::DefaultValueRepeated);
            return;
        }
        if descriptor.default_value.is_some() {
            let kind = DiagnosticKind::OptionAlreadySet {
                name: "default".to_owned(),
            };
            self.error(option.span(), kind);
            return;
        }
        if let Some(text) = self.default_value_text(&field.ty, &option.value) {
            self.record_child(tag::field::DEFAULT_VALUE, span);
            descriptor.default_value = Some(text);
        }
    }

    fn hoist_json_name(
        &mut self,
        option: &ast::OptionBody,
        descriptor: &mut FieldDescriptorProto,
        is_extension: bool,
    ) {
        if is_extension {
            self.error(option.span(), DiagnosticKind::JsonNameOnExtension);
            return;
        }
        match &option.value {
            ast::Value::String(value) => match value.as_utf8() {
                Some(name) => {
                    self.record_child(tag::field::JSON_NAME, value.span());
                    descriptor.json_name = Some(name);
                }
                None => self.error(value.span(), DiagnosticKind::InvalidUtf8String),
            },
            value => {
                let kind = DiagnosticKind::OptionValueTypeMismatch {
                    name: "json_name".to_owned(),
                    expected: "a string",
                    actual: value_description(value),
                };
                self.error(value.span(), kind);
            }
        }
    }

    fn field_number(&mut self, number: &ast::IntValue) -> i32 {
        match number.as_i64() {
            Some(value) => {
                if value <= 0 {
                    self.error(number.span(), DiagnosticKind::TagTooSmall { tag: value });
                } else if value > MAX_TAG as i64 {
                    self.error(
                        number.span(),
                        DiagnosticKind::TagTooLarge {
                            tag: value as u64,
                        },
                    );
                } else if (RESERVED_TAG_START..=RESERVED_TAG_END).contains(&value) {
                    self.error(
                        number.span(),
                        DiagnosticKind::TagInReservedRange { tag: value as u64 },
                    );
                }
                value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
            }
            None => {
                self.error(
                    number.span(),
                    DiagnosticKind::TagTooLarge {
                        tag: number.lit.value,
                    },
                );
                0
            }
        }
    }

    fn enum_number(&mut self, number: &ast::IntValue) -> i32 {
        match number.as_i64() {
            Some(value) if i32::try_from(value).is_ok() => value as i32,
            _ => {
                self.error(number.span(), DiagnosticKind::IntegerOutOfRange);
                0
            }
        }
    }

    fn map_field(
        &mut self,
        map: &ast::MapField,
        field_index: i32,
        nested_index: i32,
    ) -> (FieldDescriptorProto, DescriptorProto) {
        let entry_name = format!("{}Entry", underscores_to_pascal(map.name.value()));

        self.push(tag::message::FIELD);
        self.push(field_index);
        self.record_with_comments(map.span.clone(), &map.comments);
        self.record_child(tag::field::NAME, map.name.span());
        self.record_child(tag::field::NUMBER, map.number.span());
        self.record_child(tag::field::TYPE_NAME, map.span.clone());

        let mut field = FieldDescriptorProto {
            name: Some(map.name.value().to_owned()),
            number: Some(self.field_number(&map.number)),
            label: Some(Label::Repeated as i32),
            r#type: Some(Type::Message as i32),
            type_name: Some(self.type_in_scope(&entry_name)),
            json_name: Some(to_json_name(map.name.value())),
            ..Default::default()
        };

        if !matches!(
            map.key_ty,
            ast::ScalarType::Int32
                | ast::ScalarType::Int64
                | ast::ScalarType::Uint32
                | ast::ScalarType::Uint64
                | ast::ScalarType::Sint32
                | ast::ScalarType::Sint64
                | ast::ScalarType::Fixed32
                | ast::ScalarType::Fixed64
                | ast::ScalarType::Sfixed32
                | ast::ScalarType::Sfixed64
                | ast::ScalarType::Bool
                | ast::ScalarType::String
        ) {
            self.error(map.key_ident.span(), DiagnosticKind::InvalidMapKeyType);
        }

        if let Some(compact) = &map.options {
            let mut options = Vec::new();
            for option in &compact.options {
                if option.name.is_plain("default") {
                    self.error(option.span(), DiagnosticKind::DefaultValueRepeated);
                } else if option.name.is_plain("json_name") {
                    self.hoist_json_name(option, &mut field, false);
                } else {
                    self.push(tag::field::OPTIONS);
                    if let Some(value) =
                        self.uninterpreted_option_body(option, options.len() as i32, None)
                    {
                        options.push(value);
                    }
                    self.pop();
                }
            }
            if !options.is_empty() {
                field.options = Some(Options::new(FieldOptions {
                    uninterpreted_option: options,
                    ..Default::default()
                }));
            }
        }

        self.pop();
        self.pop();

        let key = FieldDescriptorProto {
            name: Some("key".to_owned()),
            number: Some(1),
            label: Some(Label::Optional as i32),
            r#type: Some(scalar_type(map.key_ty) as i32),
            json_name: Some("key".to_owned()),
            ..Default::default()
        };
        let mut value = FieldDescriptorProto {
            name: Some("value".to_owned()),
            number: Some(2),
            label: Some(Label::Optional as i32),
            json_name: Some("value".to_owned()),
            ..Default::default()
        };
        match &map.value_ty {
            ast::FieldType::Scalar(scalar, _) => value.r#type = Some(scalar_type(*scalar) as i32),
            ast::FieldType::Named(name) => value.type_name = Some(name.to_string()),
        }

        self.push(tag::message::NESTED_TYPE);
        self.push(nested_index);
        self.record(map.span.clone());
        self.pop();
        self.pop();

        let entry = DescriptorProto {
            name: Some(entry_name),
            field: vec![key, value],
            options: Some(Options::new(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            })),
            ..Default::default()
        };

        (field, entry)
    }

    fn group(
        &mut self,
        group: &ast::Group,
        field_tag: i32,
        field_index: i32,
        nested_tag: i32,
        nested_index: i32,
        oneof_index: Option<i32>,
        extendee: Option<&ast::TypeRef>,
    ) -> (FieldDescriptorProto, DescriptorProto) {
        if self.syntax == Syntax::Proto3 {
            self.error(group.keyword.span.clone(), DiagnosticKind::Proto3Group);
        }
        if !group
            .name
            .value()
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_uppercase())
        {
            self.error(group.name.span(), DiagnosticKind::GroupNameNotCapitalized);
        }

        self.push(field_tag);
        self.push(field_index);
        self.record_with_comments(group.span.clone(), &group.comments);
        self.record_child(tag::field::NAME, group.name.span());
        self.record_child(tag::field::NUMBER, group.number.span());
        let label = match &group.label {
            Some(label) => {
                self.record_child(tag::field::LABEL, label.tok.span.clone());
                if oneof_index.is_some() {
                    let kind = DiagnosticKind::MisplacedFieldLabel {
                        label: label.label.as_str(),
                    };
                    self.error(label.tok.span.clone(), kind);
                }
                if label.label == ast::Label::Required && extendee.is_some() {
                    self.error(label.tok.span.clone(), DiagnosticKind::RequiredExtension);
                }
                match label.label {
                    ast::Label::Optional => Label::Optional,
                    ast::Label::Required => Label::Required,
                    ast::Label::Repeated => Label::Repeated,
                }
            }
            None => {
                if self.syntax == Syntax::Proto2 && oneof_index.is_none() {
                    self.error(group.keyword.span.clone(), DiagnosticKind::MissingFieldLabel);
                }
                Label::Optional
            }
        };
        let field = FieldDescriptorProto {
            name: Some(group.name.value().to_ascii_lowercase()),
            number: Some(self.field_number(&group.number)),
            label: Some(label as i32),
            r#type: Some(Type::Group as i32),
            type_name: Some(self.type_in_scope(group.name.value())),
            json_name: Some(to_json_name(&group.name.value().to_ascii_lowercase())),
            oneof_index,
            extendee: extendee.map(|extendee| {
                self.record_child(tag::field::EXTENDEE, extendee.span());
                extendee.to_string()
            }),
            ..Default::default()
        };
        self.pop();
        self.pop();

        self.push(nested_tag);
        self.push(nested_index);
        self.record(group.span.clone());
        self.record_child(tag::message::NAME, group.name.span());
        let mut nested =
            self.with_scope(group.name.value(), |gen| gen.message_body(&group.body));
        nested.name = Some(group.name.value().to_owned());
        self.pop();
        self.pop();

        (field, nested)
    }

    fn oneof(
        &mut self,
        oneof: &ast::Oneof,
        oneof_index: i32,
        message: &mut DescriptorProto,
    ) -> OneofDescriptorProto {
        self.push(tag::message::ONEOF_DECL);
        self.push(oneof_index);
        self.record_with_comments(oneof.span.clone(), &oneof.comments);
        self.record_child(tag::oneof::NAME, oneof.name.span());
        self.pop();
        self.pop();

        let mut options = Vec::new();
        let mut field_count = 0usize;
        for item in &oneof.items {
            match item {
                ast::OneofItem::Field(field) => {
                    field_count += 1;
                    let index = message.field.len() as i32;
                    self.push(tag::message::FIELD);
                    self.push(index);
                    let lowered = self.field(field, Some(oneof_index), None);
                    self.pop();
                    self.pop();
                    message.field.push(lowered);
                }
                ast::OneofItem::Group(group) => {
                    field_count += 1;
                    let (field, nested) = self.group(
                        group,
                        tag::message::FIELD,
                        message.field.len() as i32,
                        tag::message::NESTED_TYPE,
                        message.nested_type.len() as i32,
                        Some(oneof_index),
                        None,
                    );
                    message.field.push(field);
                    message.nested_type.push(nested);
                }
                ast::OneofItem::Option(option) => {
                    self.push(tag::message::ONEOF_DECL);
                    self.push(oneof_index);
                    self.push(tag::oneof::OPTIONS);
                    if let Some(value) = self.uninterpreted_option(option, options.len() as i32)
                    {
                        options.push(value);
                    }
                    self.pop();
                    self.pop();
                    self.pop();
                }
                ast::OneofItem::Empty(_) => {}
            }
        }

        if field_count == 0 {
            self.error(oneof.span.clone(), DiagnosticKind::EmptyOneof);
        }

        OneofDescriptorProto {
            name: Some(oneof.name.value().to_owned()),
            options: if options.is_empty() {
                None
            } else {
                Some(Options::new(OneofOptions {
                    uninterpreted_option: options,
                    ..Default::default()
                }))
            },
        }
    }

    fn extend(
        &mut self,
        extend: &ast::Extend,
        extension_tag: i32,
        extensions: &mut Vec<FieldDescriptorProto>,
        nested: &mut Vec<DescriptorProto>,
        nested_tag: i32,
    ) {
        let mut field_count = 0usize;
        for item in &extend.items {
            match item {
                ast::ExtendItem::Field(field) => {
                    field_count += 1;
                    self.push(extension_tag);
                    self.push(extensions.len() as i32);
                    let lowered = self.field(field, None, Some(&extend.extendee));
                    self.pop();
                    self.pop();
                    extensions.push(lowered);
                }
                ast::ExtendItem::Group(group) => {
                    field_count += 1;
                    let (field, nested_message) = self.group(
                        group,
                        extension_tag,
                        extensions.len() as i32,
                        nested_tag,
                        nested.len() as i32,
                        None,
                        Some(&extend.extendee),
                    );
                    extensions.push(field);
                    nested.push(nested_message);
                }
                ast::ExtendItem::Empty(_) => {}
            }
        }
        if field_count == 0 {
            self.error(extend.span.clone(), DiagnosticKind::EmptyExtend);
        }
    }

    fn extension_ranges(&mut self, range: &ast::ExtensionRange, message: &mut DescriptorProto) {
        if self.syntax == Syntax::Proto3 {
            self.error(range.span.clone(), DiagnosticKind::Proto3ExtensionRange);
        }
        // The option list is shared by every range in the statement; each
        // range gets its own copy, with the option syntax registered under
        // that range's path for the interpreter.
        let lowered = range.options.as_ref().map(|compact| {
            compact
                .options
                .iter()
                .filter_map(|option| self.lower_option_value(option).map(|value| (value, option)))
                .collect::<Vec<_>>()
        });

        for tag_range in &range.ranges {
            let index = message.extension_range.len() as i32;
            self.push(tag::message::EXTENSION_RANGE);
            self.push(index);
            self.record_with_comments(tag_range.span(), &range.comments);
            let (start, end) = self.tag_range_bounds(tag_range);
            let options = lowered.as_ref().map(|lowered| {
                self.push(tag::message::extension_range::OPTIONS);
                for (i, (_, body)) in lowered.iter().enumerate() {
                    self.record_uninterpreted(body, i as i32, None);
                }
                self.pop();
                Options::new(ExtensionRangeOptions {
                    uninterpreted_option: lowered.iter().map(|(value, _)| value.clone()).collect(),
                    ..Default::default()
                })
            });
            self.pop();
            self.pop();
            message.extension_range.push(ExtensionRange {
                start: Some(start),
                // The descriptor stores an exclusive end.
                end: Some(end.saturating_add(1)),
                options,
            });
        }
    }

    /// Inclusive bounds of a `start [to end|max]` range, range-checked for
    /// message tags.
    fn tag_range_bounds(&mut self, range: &ast::TagRange) -> (i32, i32) {
        let start = match range.start.as_i64() {
            Some(value) => {
                if value <= 0 {
                    self.error(
                        range.start.span(),
                        DiagnosticKind::TagTooSmall { tag: value },
                    );
                } else if value > MAX_TAG as i64 {
                    self.error(
                        range.start.span(),
                        DiagnosticKind::TagTooLarge { tag: value as u64 },
                    );
                }
                value.clamp(1, MAX_TAG as i64) as i32
            }
            None => {
                self.error(
                    range.start.span(),
                    DiagnosticKind::TagTooLarge {
                        tag: range.start.lit.value,
                    },
                );
                1
            }
        };
        let end = match &range.to {
            None => start,
            Some((_, ast::RangeEnd::Max(_))) => MAX_TAG,
            Some((_, ast::RangeEnd::Int(value))) => match value.as_i64() {
                Some(end) => {
                    if end > MAX_TAG as i64 {
                        self.error(
                            value.span(),
                            DiagnosticKind::TagTooLarge { tag: end as u64 },
                        );
                    }
                    if end < start as i64 {
                        self.error(
                            range.span(),
                            DiagnosticKind::RangeStartAfterEnd {
                                start: start as i64,
                                end,
                            },
                        );
                    }
                    end.clamp(1, MAX_TAG as i64) as i32
                }
                None => {
                    self.error(
                        value.span(),
                        DiagnosticKind::TagTooLarge {
                            tag: value.lit.value,
                        },
                    );
                    MAX_TAG
                }
            },
        };
        (start, end)
    }

    fn message_reserved(&mut self, reserved: &ast::Reserved, message: &mut DescriptorProto) {
        match &reserved.kind {
            ast::ReservedKind::Ranges { ranges, .. } => {
                for range in ranges {
                    let index = message.reserved_range.len() as i32;
                    self.push(tag::message::RESERVED_RANGE);
                    self.push(index);
                    self.record_with_comments(range.span(), &reserved.comments);
                    let (start, end) = self.tag_range_bounds(range);
                    self.pop();
                    self.pop();
                    message.reserved_range.push(ReservedRange {
                        start: Some(start),
                        end: Some(end.saturating_add(1)),
                    });
                }
            }
            ast::ReservedKind::Names { names, .. } => {
                for name in names {
                    let index = message.reserved_name.len() as i32;
                    self.push(tag::message::RESERVED_NAME);
                    self.push(index);
                    self.record(name.span());
                    self.pop();
                    self.pop();
                    match name.as_utf8() {
                        Some(name) => message.reserved_name.push(name),
                        None => self.error(name.span(), DiagnosticKind::InvalidUtf8String),
                    }
                }
            }
        }
    }

    fn enum_(&mut self, enum_: &ast::Enum) -> EnumDescriptorProto {
        self.record_with_comments(enum_.span.clone(), &enum_.comments);
        self.record_child(tag::enum_::NAME, enum_.name.span());

        let mut descriptor = EnumDescriptorProto {
            name: Some(enum_.name.value().to_owned()),
            ..Default::default()
        };
        let mut options = Vec::new();

        for item in &enum_.items {
            match item {
                ast::EnumItem::Value(value) => {
                    let index = descriptor.value.len() as i32;
                    self.push(tag::enum_::VALUE);
                    self.push(index);
                    let lowered = self.enum_value(value);
                    self.pop();
                    self.pop();
                    descriptor.value.push(lowered);
                }
                ast::EnumItem::Option(option) => {
                    self.push(tag::enum_::OPTIONS);
                    if let Some(value) = self.uninterpreted_option(option, options.len() as i32)
                    {
                        options.push(value);
                    }
                    self.pop();
                }
                ast::EnumItem::Reserved(reserved) => {
                    self.enum_reserved(reserved, &mut descriptor);
                }
                ast::EnumItem::Empty(_) => {}
            }
        }

        if !options.is_empty() {
            descriptor.options = Some(Options::new(EnumOptions {
                uninterpreted_option: options,
                ..Default::default()
            }));
        }

        descriptor
    }

    fn enum_value(&mut self, value: &ast::EnumValueDecl) -> EnumValueDescriptorProto {
        self.record_with_comments(value.span.clone(), &value.comments);
        self.record_child(tag::enum_value::NAME, value.name.span());
        self.record_child(tag::enum_value::NUMBER, value.number.span());

        let mut options = Vec::new();
        if let Some(compact) = &value.options {
            for option in &compact.options {
                self.push(tag::enum_value::OPTIONS);
                if let Some(lowered) =
                    self.uninterpreted_option_body(option, options.len() as i32, None)
                {
                    options.push(lowered);
                }
                self.pop();
            }
        }

        EnumValueDescriptorProto {
            name: Some(value.name.value().to_owned()),
            number: Some(self.enum_number(&value.number)),
            options: if options.is_empty() {
                None
            } else {
                Some(Options::new(EnumValueOptions {
                    uninterpreted_option: options,
                    ..Default::default()
                }))
            },
        }
    }

    fn enum_reserved(&mut self, reserved: &ast::Reserved, descriptor: &mut EnumDescriptorProto) {
        match &reserved.kind {
            ast::ReservedKind::Ranges { ranges, .. } => {
                for range in ranges {
                    let index = descriptor.reserved_range.len() as i32;
                    self.push(tag::enum_::RESERVED_RANGE);
                    self.push(index);
                    self.record_with_comments(range.span(), &reserved.comments);
                    let start = self.enum_number(&range.start);
                    // Enum reserved ranges are inclusive on both ends.
                    let end = match &range.to {
                        None => start,
                        Some((_, ast::RangeEnd::Max(_))) => i32::MAX,
                        Some((_, ast::RangeEnd::Int(value))) => {
                            let end = self.enum_number(value);
                            if end < start {
                                self.error(
                                    range.span(),
                                    DiagnosticKind::RangeStartAfterEnd {
                                        start: start as i64,
                                        end: end as i64,
                                    },
                                );
                            }
                            end
                        }
                    };
                    self.pop();
                    self.pop();
                    descriptor.reserved_range.push(EnumReservedRange {
                        start: Some(start),
                        end: Some(end),
                    });
                }
            }
            ast::ReservedKind::Names { names, .. } => {
                for name in names {
                    let index = descriptor.reserved_name.len() as i32;
                    self.push(tag::enum_::RESERVED_NAME);
                    self.push(index);
                    self.record(name.span());
                    self.pop();
                    self.pop();
                    match name.as_utf8() {
                        Some(name) => descriptor.reserved_name.push(name),
                        None => self.error(name.span(), DiagnosticKind::InvalidUtf8String),
                    }
                }
            }
        }
    }

    fn service(&mut self, service: &ast::Service) -> ServiceDescriptorProto {
        self.record_with_comments(service.span.clone(), &service.comments);
        self.record_child(tag::service::NAME, service.name.span());

        let mut descriptor = ServiceDescriptorProto {
            name: Some(service.name.value().to_owned()),
            ..Default::default()
        };
        let mut options = Vec::new();

        for item in &service.items {
            match item {
                ast::ServiceItem::Method(method) => {
                    let index = descriptor.method.len() as i32;
                    self.push(tag::service::METHOD);
                    self.push(index);
                    let lowered = self.method(method);
                    self.pop();
                    self.pop();
                    descriptor.method.push(lowered);
                }
                ast::ServiceItem::Option(option) => {
                    self.push(tag::service::OPTIONS);
                    if let Some(value) = self.uninterpreted_option(option, options.len() as i32)
                    {
                        options.push(value);
                    }
                    self.pop();
                }
                ast::ServiceItem::Empty(_) => {}
            }
        }

        if !options.is_empty() {
            descriptor.options = Some(Options::new(ServiceOptions {
                uninterpreted_option: options,
                ..Default::default()
            }));
        }

        descriptor
    }

    fn method(&mut self, method: &ast::Method) -> MethodDescriptorProto {
        self.record_with_comments(method.span.clone(), &method.comments);
        self.record_child(tag::method::NAME, method.name.span());
        self.record_child(tag::method::INPUT_TYPE, method.input.ty.span());
        self.record_child(tag::method::OUTPUT_TYPE, method.output.ty.span());

        let mut options = Vec::new();
        if let Some(body) = &method.body {
            for item in &body.items {
                if let ast::MethodItem::Option(option) = item {
                    self.push(tag::method::OPTIONS);
                    if let Some(value) = self.uninterpreted_option(option, options.len() as i32)
                    {
                        options.push(value);
                    }
                    self.pop();
                }
            }
        }

        MethodDescriptorProto {
            name: Some(method.name.value().to_owned()),
            input_type: Some(method.input.ty.to_string()),
            output_type: Some(method.output.ty.to_string()),
            client_streaming: method.input.stream.as_ref().map(|_| true),
            server_streaming: method.output.stream.as_ref().map(|_| true),
            options: if options.is_empty() {
                None
            } else {
                Some(Options::new(MethodOptions {
                    uninterpreted_option: options,
                    ..Default::default()
                }))
            },
        }
    }

    /// Lowers one `option` statement under the current (element) path; the
    /// options-field tag has already been pushed by the caller.
    fn uninterpreted_option(
        &mut self,
        option: &ast::OptionDecl,
        index: i32,
    ) -> Option<UninterpretedOption> {
        self.uninterpreted_option_body(&option.body, index, Some(&option.comments))
    }

    fn uninterpreted_option_body(
        &mut self,
        body: &ast::OptionBody,
        index: i32,
        comments: Option<&ast::Comments>,
    ) -> Option<UninterpretedOption> {
        self.record_uninterpreted(body, index, comments);
        self.lower_option_value(body)
    }

    /// Records the uninterpreted option's span and parsed syntax under
    /// `current_path/999/index` so the interpreter can find both.
    fn record_uninterpreted(
        &mut self,
        body: &ast::OptionBody,
        index: i32,
        comments: Option<&ast::Comments>,
    ) {
        self.push(tag::UNINTERPRETED_OPTION);
        self.push(index);
        match comments {
            Some(comments) => self.record_with_comments(body.span(), comments),
            None => self.record(body.span()),
        }
        self.map
            .record_option(self.path.clone().into(), body.clone());
        self.pop();
        self.pop();
    }

    fn lower_option_value(&mut self, body: &ast::OptionBody) -> Option<UninterpretedOption> {
        let mut name = Vec::new();
        for part in &body.name.parts {
            match part {
                ast::OptionNamePart::Plain(ident) => name.push(NamePart {
                    name_part: ident.value().to_owned(),
                    is_extension: false,
                }),
                ast::OptionNamePart::Extension { name: reference, .. } => name.push(NamePart {
                    name_part: reference.to_string(),
                    is_extension: true,
                }),
            }
        }

        let mut option = UninterpretedOption {
            name,
            ..Default::default()
        };
        match &body.value {
            ast::Value::Ident(ident) => option.identifier_value = Some(ident.to_string()),
            ast::Value::Int(int) => option.positive_int_value = Some(int.value),
            ast::Value::Float(float) => option.double_value = Some(float.value),
            ast::Value::String(string) => option.string_value = Some(string.value()),
            ast::Value::Signed {
                negative, value, ..
            } => match &**value {
                ast::Value::Int(int) => {
                    if *negative {
                        if int.value <= i64::MIN.unsigned_abs() {
                            option.negative_int_value =
                                Some((int.value as i64).wrapping_neg());
                        } else {
                            self.error(body.value.span(), DiagnosticKind::IntegerOutOfRange);
                            return None;
                        }
                    } else {
                        option.positive_int_value = Some(int.value);
                    }
                }
                ast::Value::Float(float) => {
                    option.double_value =
                        Some(if *negative { -float.value } else { float.value })
                }
                ast::Value::Ident(ident) if is_inf(&ident.to_string()) => {
                    option.double_value = Some(if *negative {
                        f64::NEG_INFINITY
                    } else {
                        f64::INFINITY
                    })
                }
                ast::Value::Ident(ident) if is_nan(&ident.to_string()) => {
                    option.double_value = Some(f64::NAN)
                }
                other => {
                    let kind = DiagnosticKind::UnexpectedToken {
                        expected: "a number".to_owned(),
                        found: value_description(other).to_owned(),
                    };
                    self.error(other.span(), kind);
                    return None;
                }
            },
            ast::Value::Aggregate(aggregate) => {
                option.aggregate_value = Some(fmt::aggregate_to_text(aggregate))
            }
            ast::Value::Array(_) => {
                let mut text = String::new();
                fmt::write_value_text(&body.value, &mut text);
                option.aggregate_value = Some(text);
            }
        }
        Some(option)
    }

    /// Serializes a `default` pseudo-option value into the text form the
    /// descriptor schema stores.
    fn default_value_text(&mut self, ty: &ast::FieldType, value: &ast::Value) -> Option<String> {
        use ast::ScalarType::*;

        let scalar = match ty {
            ast::FieldType::Scalar(scalar, _) => *scalar,
            ast::FieldType::Named(_) => {
                // The type may turn out to be an enum; only an identifier can
                // be valid, and the linker checks it against the enum values.
                return match value {
                    ast::Value::Ident(ident) if ident.parts.len() == 1 => {
                        Some(ident.to_string())
                    }
                    _ => {
                        self.invalid_default(value, "expected an enum value identifier");
                        None
                    }
                };
            }
        };

        match scalar {
            String => match value {
                ast::Value::String(string) => match string.as_utf8() {
                    Some(text) => Some(text),
                    None => {
                        self.invalid_default(value, "string default must be valid UTF-8");
                        None
                    }
                },
                _ => {
                    self.invalid_default(value, "expected a string literal");
                    None
                }
            },
            Bytes => match value {
                ast::Value::String(string) => {
                    let mut out = std::string::String::new();
                    fmt::escape_bytes(&string.value(), &mut out);
                    Some(out)
                }
                _ => {
                    self.invalid_default(value, "expected a string literal");
                    None
                }
            },
            Bool => match value {
                ast::Value::Ident(ident) if ident.to_string() == "true" => {
                    Some("true".to_owned())
                }
                ast::Value::Ident(ident) if ident.to_string() == "false" => {
                    Some("false".to_owned())
                }
                _ => {
                    self.invalid_default(value, "expected 'true' or 'false'");
                    None
                }
            },
            Float | Double => match self.float_value(value) {
                Some(float) => {
                    let mut out = std::string::String::new();
                    fmt::write_float(float, &mut out);
                    Some(out)
                }
                None => {
                    self.invalid_default(value, "expected a number");
                    None
                }
            },
            Int32 | Sint32 | Sfixed32 => self.int_default(value, i32::MIN as i64, i32::MAX as i64),
            Int64 | Sint64 | Sfixed64 => self.int_default(value, i64::MIN, i64::MAX),
            Uint32 | Fixed32 => self.uint_default(value, u32::MAX as u64),
            Uint64 | Fixed64 => self.uint_default(value, u64::MAX),
        }
    }

    fn int_default(&mut self, value: &ast::Value, min: i64, max: i64) -> Option<String> {
        let parsed = match value {
            ast::Value::Int(int) => i64::try_from(int.value).ok(),
            ast::Value::Signed {
                negative: true,
                value,
                ..
            } => match &**value {
                ast::Value::Int(int) => {
                    if int.value <= i64::MIN.unsigned_abs() {
                        Some((int.value as i64).wrapping_neg())
                    } else {
                        None
                    }
                }
                _ => None,
            },
            _ => {
                self.invalid_default(value, "expected an integer");
                return None;
            }
        };
        match parsed {
            Some(parsed) if (min..=max).contains(&parsed) => Some(parsed.to_string()),
            _ => {
                self.invalid_default(value, "integer is out of range");
                None
            }
        }
    }

    fn uint_default(&mut self, value: &ast::Value, max: u64) -> Option<String> {
        match value {
            ast::Value::Int(int) if int.value <= max => Some(int.value.to_string()),
            ast::Value::Int(_) => {
                self.invalid_default(value, "integer is out of range");
                None
            }
            _ => {
                self.invalid_default(value, "expected a non-negative integer");
                None
            }
        }
    }

    fn float_value(&mut self, value: &ast::Value) -> Option<f64> {
        match value {
            ast::Value::Float(float) => Some(float.value),
            ast::Value::Int(int) => Some(int.value as f64),
            ast::Value::Ident(ident) if is_inf(&ident.to_string()) => Some(f64::INFINITY),
            ast::Value::Ident(ident) if is_nan(&ident.to_string()) => Some(f64::NAN),
            ast::Value::Signed {
                negative, value, ..
            } => {
                let inner = self.float_value(value)?;
                Some(if *negative { -inner } else { inner })
            }
            _ => None,
        }
    }

    fn invalid_default(&mut self, value: &ast::Value, reason: &str) {
        self.error(
            value.span(),
            DiagnosticKind::InvalidDefaultValue {
                reason: reason.to_owned(),
            },
        );
    }
}

fn scalar_type(scalar: ast::ScalarType) -> Type {
    match scalar {
        ast::ScalarType::Double => Type::Double,
        ast::ScalarType::Float => Type::Float,
        ast::ScalarType::Int32 => Type::Int32,
        ast::ScalarType::Int64 => Type::Int64,
        ast::ScalarType::Uint32 => Type::Uint32,
        ast::ScalarType::Uint64 => Type::Uint64,
        ast::ScalarType::Sint32 => Type::Sint32,
        ast::ScalarType::Sint64 => Type::Sint64,
        ast::ScalarType::Fixed32 => Type::Fixed32,
        ast::ScalarType::Fixed64 => Type::Fixed64,
        ast::ScalarType::Sfixed32 => Type::Sfixed32,
        ast::ScalarType::Sfixed64 => Type::Sfixed64,
        ast::ScalarType::Bool => Type::Bool,
        ast::ScalarType::String => Type::String,
        ast::ScalarType::Bytes => Type::Bytes,
    }
}

fn is_inf(ident: &str) -> bool {
    ident.eq_ignore_ascii_case("inf") || ident.eq_ignore_ascii_case("infinity")
}

fn is_nan(ident: &str) -> bool {
    ident.eq_ignore_ascii_case("nan")
}

pub(crate) fn value_description(value: &ast::Value) -> String {
    match value {
        ast::Value::Ident(ident) => format!("'{}'", ident),
        ast::Value::Int(int) => format!("'{}'", int.value),
        ast::Value::Float(float) => format!("'{}'", float.value),
        ast::Value::String(_) => "string literal".to_owned(),
        ast::Value::Signed { .. } => "signed value".to_owned(),
        ast::Value::Array(_) => "array literal".to_owned(),
        ast::Value::Aggregate(_) => "message literal".to_owned(),
    }
}

/// Derives the default JSON name: lower-camel-case on underscores. Leading
/// underscores drop out, capitalizing the first letter they precede.
pub(crate) fn to_json_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut uppercase_next = false;

    for ch in name.chars() {
        if ch == '_' {
            uppercase_next = true;
        } else if uppercase_next {
            result.push(ch.to_ascii_uppercase());
            uppercase_next = false;
        } else {
            result.push(ch);
        }
    }

    result
}

/// PascalCase for synthesized map entry message names.
pub(crate) fn underscores_to_pascal(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut uppercase_next = true;
    for ch in name.chars() {
        if ch == '_' {
            uppercase_next = true;
        } else if uppercase_next {
            result.push(ch.to_ascii_uppercase());
            uppercase_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}
