//! Option interpretation: the final pass over a linked file set.
//!
//! Every uninterpreted option is walked against the options-message
//! descriptor for its attach point, resolved through the same scoping rules
//! as type references, type-checked, and encoded. The encoded bytes replace
//! the uninterpreted entries inside the element's [`Options`] wrapper, so
//! custom extensions survive even though the typed options structs have no
//! field for them.

use std::collections::{btree_map, hash_map, BTreeMap, HashMap, HashSet};

use prost::{
    encoding::{encode_key, encode_varint, WireType},
    Message,
};
use prost_types::UninterpretedOption;

use crate::{
    ast,
    compile::FileRecord,
    error::{DiagnosticKind, DiagnosticSink},
    generate::value_description,
    link::{extension_field_at, message_at, resolve_visible, DefKind, SymbolTable},
    tag,
    types::{
        field_descriptor_proto::{Label, Type},
        DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
        Options, OptionsMessage, ServiceDescriptorProto,
    },
};

pub(crate) fn interpret(
    records: &mut Vec<FileRecord>,
    table: &SymbolTable,
    sink: &mut DiagnosticSink,
) {
    for index in 0..records.len() {
        // Interpretation reads descriptors across the whole pool, including
        // this file's own; mutate a copy and swap it in afterwards.
        let mut descriptor = records[index].descriptor.clone();
        let mut used = HashSet::new();
        {
            let mut interpreter = Interpreter {
                records,
                table,
                file: index,
                sink,
                used: &mut used,
                scope: String::new(),
                path: Vec::new(),
            };
            interpreter.file(&mut descriptor);
        }
        records[index].descriptor = descriptor;
        records[index].used_files.extend(used);
        if sink.is_stopped() {
            return;
        }
    }
}

/// One field of the options message, with its type resolved.
#[derive(Clone)]
struct FieldInfo {
    name: String,
    display: String,
    number: u32,
    repeated: bool,
    oneof_index: Option<i32>,
    kind: FieldKind,
}

#[derive(Clone, Copy)]
enum FieldKind {
    Scalar(Type),
    Enum(u32),
    Message(u32),
    Group(u32),
}

/// A partially built message value. Fields are keyed by number so encoding
/// is deterministic; each entry remembers the display name that set it for
/// the oneof and required-field messages.
struct MessageValue {
    msg: u32,
    fields: BTreeMap<u32, (String, FieldValue)>,
    oneofs: HashMap<i32, String>,
}

impl MessageValue {
    fn new(msg: u32) -> Self {
        MessageValue {
            msg,
            fields: BTreeMap::new(),
            oneofs: HashMap::new(),
        }
    }
}

enum FieldValue {
    Single(EncodedValue),
    Repeated(Vec<EncodedValue>),
    Message {
        group: bool,
        /// Whether the whole value was assigned at once; merging into it
        /// afterwards is a double-set.
        full: bool,
        value: MessageValue,
    },
}

enum EncodedValue {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    /// Length-delimited payload: string, bytes, or an encoded message.
    Bytes(Vec<u8>),
    /// Pre-encoded group body, framed with start/end tags when written.
    Group(Vec<u8>),
}

struct Interpreter<'a, 'b, 'c> {
    records: &'a [FileRecord],
    table: &'a SymbolTable,
    file: usize,
    sink: &'b mut DiagnosticSink<'c>,
    used: &'a mut HashSet<usize>,
    scope: String,
    path: Vec<i32>,
}

impl<'a, 'b, 'c> Interpreter<'a, 'b, 'c> {
    fn error(&mut self, span: ast::Span, kind: DiagnosticKind) {
        let record = &self.records[self.file];
        self.sink.error(&record.lines, &record.source, span, kind);
    }

    fn msg_descriptor(&self, msg: u32) -> &'a DescriptorProto {
        let info = self.table.message(msg);
        message_at(&self.records[info.file].descriptor, &info.path)
            .expect("symbol table points at a message")
    }

    fn msg_full_name(&self, msg: u32) -> &'a str {
        &self.table.message(msg).full_name
    }

    fn push_scope(&mut self, name: &str) -> usize {
        let len = self.scope.len();
        if !self.scope.is_empty() {
            self.scope.push('.');
        }
        self.scope.push_str(name);
        len
    }

    fn file(&mut self, file: &mut FileDescriptorProto) {
        self.scope = file.package().to_owned();

        if let Some(options) = &mut file.options {
            self.path.push(tag::file::OPTIONS);
            self.interpret_options(options, "google.protobuf.FileOptions");
            self.path.pop();
        }

        for (i, message) in file.message_type.iter_mut().enumerate() {
            self.path.extend([tag::file::MESSAGE_TYPE, i as i32]);
            self.message(message);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, enum_) in file.enum_type.iter_mut().enumerate() {
            self.path.extend([tag::file::ENUM_TYPE, i as i32]);
            self.enum_(enum_);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, service) in file.service.iter_mut().enumerate() {
            self.path.extend([tag::file::SERVICE, i as i32]);
            self.service(service);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, extension) in file.extension.iter_mut().enumerate() {
            self.path.extend([tag::file::EXTENSION, i as i32]);
            if let Some(options) = &mut extension.options {
                self.path.push(tag::field::OPTIONS);
                self.interpret_options(options, "google.protobuf.FieldOptions");
                self.path.pop();
            }
            self.path.truncate(self.path.len() - 2);
        }
    }

    fn message(&mut self, message: &mut DescriptorProto) {
        let scope_len = self.push_scope(message.name());

        if let Some(options) = &mut message.options {
            self.path.push(tag::message::OPTIONS);
            self.interpret_options(options, "google.protobuf.MessageOptions");
            self.path.pop();
        }
        for (i, field) in message.field.iter_mut().enumerate() {
            if let Some(options) = &mut field.options {
                self.path
                    .extend([tag::message::FIELD, i as i32, tag::field::OPTIONS]);
                self.interpret_options(options, "google.protobuf.FieldOptions");
                self.path.truncate(self.path.len() - 3);
            }
        }
        for (i, oneof) in message.oneof_decl.iter_mut().enumerate() {
            if let Some(options) = &mut oneof.options {
                self.path
                    .extend([tag::message::ONEOF_DECL, i as i32, tag::oneof::OPTIONS]);
                self.interpret_options(options, "google.protobuf.OneofOptions");
                self.path.truncate(self.path.len() - 3);
            }
        }
        for (i, range) in message.extension_range.iter_mut().enumerate() {
            if let Some(options) = &mut range.options {
                self.path.extend([
                    tag::message::EXTENSION_RANGE,
                    i as i32,
                    tag::message::extension_range::OPTIONS,
                ]);
                self.interpret_options(options, "google.protobuf.ExtensionRangeOptions");
                self.path.truncate(self.path.len() - 3);
            }
        }
        for (i, extension) in message.extension.iter_mut().enumerate() {
            if let Some(options) = &mut extension.options {
                self.path
                    .extend([tag::message::EXTENSION, i as i32, tag::field::OPTIONS]);
                self.interpret_options(options, "google.protobuf.FieldOptions");
                self.path.truncate(self.path.len() - 3);
            }
        }
        for (i, nested) in message.nested_type.iter_mut().enumerate() {
            self.path.extend([tag::message::NESTED_TYPE, i as i32]);
            self.message(nested);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, enum_) in message.enum_type.iter_mut().enumerate() {
            self.path.extend([tag::message::ENUM_TYPE, i as i32]);
            self.enum_(enum_);
            self.path.truncate(self.path.len() - 2);
        }

        self.scope.truncate(scope_len);
    }

    fn enum_(&mut self, enum_: &mut EnumDescriptorProto) {
        if let Some(options) = &mut enum_.options {
            self.path.push(tag::enum_::OPTIONS);
            self.interpret_options(options, "google.protobuf.EnumOptions");
            self.path.pop();
        }
        for (i, value) in enum_.value.iter_mut().enumerate() {
            if let Some(options) = &mut value.options {
                self.path
                    .extend([tag::enum_::VALUE, i as i32, tag::enum_value::OPTIONS]);
                self.interpret_options(options, "google.protobuf.EnumValueOptions");
                self.path.truncate(self.path.len() - 3);
            }
        }
    }

    fn service(&mut self, service: &mut ServiceDescriptorProto) {
        if let Some(options) = &mut service.options {
            self.path.push(tag::service::OPTIONS);
            self.interpret_options(options, "google.protobuf.ServiceOptions");
            self.path.pop();
        }
        for (i, method) in service.method.iter_mut().enumerate() {
            if let Some(options) = &mut method.options {
                self.path
                    .extend([tag::service::METHOD, i as i32, tag::method::OPTIONS]);
                self.interpret_options(options, "google.protobuf.MethodOptions");
                self.path.truncate(self.path.len() - 3);
            }
        }
    }

    fn interpret_options<T: OptionsMessage>(
        &mut self,
        options: &mut Options<T>,
        options_message: &str,
    ) {
        let uninterpreted = std::mem::take(options.value.uninterpreted_mut());
        if uninterpreted.is_empty() {
            return;
        }

        let msg_index = match self.table.get(options_message) {
            Some(symbol) => match symbol.kind {
                DefKind::Message(index) => index,
                _ => {
                    *options.value.uninterpreted_mut() = uninterpreted;
                    return;
                }
            },
            // Without a descriptor for the options message (descriptor.proto
            // absent from the pool) the options stay uninterpreted.
            None => {
                *options.value.uninterpreted_mut() = uninterpreted;
                return;
            }
        };

        let mut root = MessageValue::new(msg_index);
        let mut remaining: Vec<UninterpretedOption> = Vec::new();
        let mut first_span: Option<ast::Span> = None;

        for (i, uninterpreted_option) in uninterpreted.into_iter().enumerate() {
            let mut path = self.path.clone();
            path.extend([tag::UNINTERPRETED_OPTION, i as i32]);
            let body = self.records[self.file]
                .source_map
                .option_body(&path)
                .cloned();
            match body {
                Some(body) => {
                    if first_span.is_none() {
                        first_span = Some(body.span());
                    }
                    let _ = self.interpret_option(&mut root, &body);
                }
                // No retained syntax (a pre-built dependency): keep the
                // option uninterpreted.
                None => remaining.push(uninterpreted_option),
            }
        }

        let mut missing = Vec::new();
        self.check_required(&root, "", &mut missing);
        if !missing.is_empty() {
            let span = first_span.clone().unwrap_or(0..0);
            self.error(
                span,
                DiagnosticKind::RequiredOptionFieldsMissing {
                    fields: missing.join(", "),
                },
            );
        }

        let mut buf = Vec::new();
        encode_message(&root, &mut buf);
        for option in &remaining {
            encode_key(tag::UNINTERPRETED_OPTION as u32, WireType::LengthDelimited, &mut buf);
            let encoded = option.encode_to_vec();
            encode_varint(encoded.len() as u64, &mut buf);
            buf.extend_from_slice(&encoded);
        }

        *options = Options::from_encoded(buf).expect("round-trip of self-encoded options");
    }

    fn interpret_option(
        &mut self,
        root: &mut MessageValue,
        body: &ast::OptionBody,
    ) -> Result<(), ()> {
        let display = body.name.to_string();
        let mut current: &mut MessageValue = root;

        for (i, part) in body.name.parts.iter().enumerate() {
            let field = self.resolve_name_part(current.msg, part)?;
            if i + 1 == body.name.parts.len() {
                return self.set_field(current, &field, &body.value, &display, part.span());
            }
            current = self.enter_message_field(current, field, &display, part.span())?;
        }
        Ok(())
    }

    fn resolve_name_part(
        &mut self,
        msg: u32,
        part: &ast::OptionNamePart,
    ) -> Result<FieldInfo, ()> {
        match part {
            ast::OptionNamePart::Plain(ident) => {
                let descriptor = self.msg_descriptor(msg);
                match descriptor
                    .field
                    .iter()
                    .find(|field| field.name() == ident.value())
                {
                    Some(field) => {
                        let field = field.clone();
                        self.field_info(&field, ident.value().to_owned())
                    }
                    None => {
                        let kind = DiagnosticKind::OptionFieldNotFound {
                            name: ident.value().to_owned(),
                            message: self.msg_full_name(msg).to_owned(),
                        };
                        self.error(ident.span(), kind);
                        Err(())
                    }
                }
            }
            ast::OptionNamePart::Extension { name, .. } => {
                self.resolve_extension(msg, name, part.span())
            }
        }
    }

    fn resolve_extension(
        &mut self,
        msg: u32,
        name: &ast::TypeRef,
        span: ast::Span,
    ) -> Result<FieldInfo, ()> {
        let written = name.to_string();
        let visible = &self.records[self.file].visible;
        match resolve_visible(self.table, visible, &self.scope, &written) {
            Some((full_name, symbol)) => {
                self.used.insert(symbol.file);
                match symbol.kind {
                    DefKind::Extension => {
                        let field =
                            extension_field_at(&self.records[symbol.file].descriptor, &symbol.path)
                                .expect("symbol table points at an extension")
                                .clone();
                        let expected = self.msg_full_name(msg).to_owned();
                        let actual = field.extendee().trim_start_matches('.').to_owned();
                        if actual != expected {
                            self.error(
                                span,
                                DiagnosticKind::ExtensionWrongExtendee {
                                    name: full_name,
                                    expected,
                                    actual,
                                },
                            );
                            return Err(());
                        }
                        self.field_info(&field, format!("({})", full_name))
                    }
                    kind => {
                        self.error(
                            span,
                            DiagnosticKind::InvalidExtension {
                                name: written,
                                actual: kind.describe(),
                            },
                        );
                        Err(())
                    }
                }
            }
            None => {
                self.error(span, DiagnosticKind::UnknownExtension { name: written });
                Err(())
            }
        }
    }

    fn field_info(
        &mut self,
        field: &FieldDescriptorProto,
        display: String,
    ) -> Result<FieldInfo, ()> {
        let declared = field.r#type.and_then(|value| Type::try_from(value).ok());
        let kind = match declared {
            Some(Type::Message) | Some(Type::Group) | Some(Type::Enum) | None => {
                let type_name = field.type_name().trim_start_matches('.');
                match self.table.get(type_name).map(|symbol| symbol.kind) {
                    Some(DefKind::Message(index)) => {
                        if declared == Some(Type::Group) {
                            FieldKind::Group(index)
                        } else {
                            FieldKind::Message(index)
                        }
                    }
                    Some(DefKind::Enum(index)) => FieldKind::Enum(index),
                    // Linked options descriptors always resolve; give up
                    // quietly on a malformed pool.
                    _ => return Err(()),
                }
            }
            Some(scalar) => FieldKind::Scalar(scalar),
        };
        Ok(FieldInfo {
            name: field.name().to_owned(),
            display,
            number: field.number() as u32,
            repeated: field.label == Some(Label::Repeated as i32),
            oneof_index: field.oneof_index,
            kind,
        })
    }

    fn enter_message_field<'m>(
        &mut self,
        current: &'m mut MessageValue,
        field: FieldInfo,
        display: &str,
        span: ast::Span,
    ) -> Result<&'m mut MessageValue, ()> {
        let msg = match field.kind {
            FieldKind::Message(msg) | FieldKind::Group(msg) => msg,
            _ => {
                self.error(
                    span,
                    DiagnosticKind::OptionFieldNotMessage {
                        name: field.name.clone(),
                    },
                );
                return Err(());
            }
        };

        if self.check_oneof(current, &field, span.clone()).is_err() {
            return Err(());
        }

        let group = matches!(field.kind, FieldKind::Group(_));
        let slot = current.fields.entry(field.number).or_insert_with(|| {
            (
                field.display.clone(),
                FieldValue::Message {
                    group,
                    full: false,
                    value: MessageValue::new(msg),
                },
            )
        });
        match &mut slot.1 {
            FieldValue::Message { full: false, value, .. } => Ok(value),
            _ => {
                self.error(
                    span,
                    DiagnosticKind::OptionAlreadySet {
                        name: display.to_owned(),
                    },
                );
                Err(())
            }
        }
    }

    fn check_oneof(
        &mut self,
        current: &mut MessageValue,
        field: &FieldInfo,
        span: ast::Span,
    ) -> Result<(), ()> {
        let oneof_index = match field.oneof_index {
            Some(index) => index,
            None => return Ok(()),
        };
        match current.oneofs.entry(oneof_index) {
            hash_map::Entry::Vacant(entry) => {
                entry.insert(field.name.clone());
                Ok(())
            }
            hash_map::Entry::Occupied(entry) if *entry.get() == field.name => Ok(()),
            hash_map::Entry::Occupied(entry) => {
                let set_field = entry.get().clone();
                let oneof = self.msg_descriptor(current.msg).oneof_decl
                    [oneof_index as usize]
                    .name()
                    .to_owned();
                self.error(
                    span,
                    DiagnosticKind::OneofAlreadySet {
                        oneof,
                        field: set_field,
                    },
                );
                Err(())
            }
        }
    }

    /// Assigns a value to a field of `current`, enforcing cardinality and
    /// oneof rules. `display` names the option in double-set messages.
    fn set_field(
        &mut self,
        current: &mut MessageValue,
        field: &FieldInfo,
        value: &ast::Value,
        display: &str,
        span: ast::Span,
    ) -> Result<(), ()> {
        if field.repeated {
            let mut elements = Vec::new();
            match value {
                ast::Value::Array(array) => {
                    for element in &array.values {
                        elements.push(self.convert_element(field, element)?);
                    }
                }
                value => elements.push(self.convert_element(field, value)?),
            }
            match current
                .fields
                .entry(field.number)
                .or_insert_with(|| (field.display.clone(), FieldValue::Repeated(Vec::new())))
            {
                (_, FieldValue::Repeated(values)) => values.extend(elements),
                _ => {
                    self.error(
                        span,
                        DiagnosticKind::OptionAlreadySet {
                            name: display.to_owned(),
                        },
                    );
                    return Err(());
                }
            }
            return Ok(());
        }

        if current.fields.contains_key(&field.number) {
            self.error(
                span,
                DiagnosticKind::OptionAlreadySet {
                    name: display.to_owned(),
                },
            );
            return Err(());
        }
        self.check_oneof(current, field, span.clone())?;

        match field.kind {
            FieldKind::Message(msg) | FieldKind::Group(msg) => match value {
                ast::Value::Aggregate(aggregate) => {
                    let built = self.aggregate(msg, aggregate)?;
                    current.fields.insert(
                        field.number,
                        (
                            field.display.clone(),
                            FieldValue::Message {
                                group: matches!(field.kind, FieldKind::Group(_)),
                                full: true,
                                value: built,
                            },
                        ),
                    );
                    Ok(())
                }
                value => {
                    let kind = DiagnosticKind::OptionValueTypeMismatch {
                        name: field.name.clone(),
                        expected: "a message",
                        actual: value_description(value),
                    };
                    self.error(value.span(), kind);
                    Err(())
                }
            },
            _ => {
                let encoded = self.convert_scalar(field, value)?;
                current
                    .fields
                    .insert(field.number, (field.display.clone(), FieldValue::Single(encoded)));
                Ok(())
            }
        }
    }

    /// Converts one element of a repeated field; message elements encode
    /// eagerly since merge semantics do not apply to list entries.
    fn convert_element(
        &mut self,
        field: &FieldInfo,
        value: &ast::Value,
    ) -> Result<EncodedValue, ()> {
        match field.kind {
            FieldKind::Message(msg) | FieldKind::Group(msg) => match value {
                ast::Value::Aggregate(aggregate) => {
                    let built = self.aggregate(msg, aggregate)?;
                    let mut buf = Vec::new();
                    encode_message(&built, &mut buf);
                    if matches!(field.kind, FieldKind::Group(_)) {
                        Ok(EncodedValue::Group(buf))
                    } else {
                        Ok(EncodedValue::Bytes(buf))
                    }
                }
                value => {
                    let kind = DiagnosticKind::OptionValueTypeMismatch {
                        name: field.name.clone(),
                        expected: "a message",
                        actual: value_description(value),
                    };
                    self.error(value.span(), kind);
                    Err(())
                }
            },
            _ => self.convert_scalar(field, value),
        }
    }

    fn aggregate(&mut self, msg: u32, aggregate: &ast::Aggregate) -> Result<MessageValue, ()> {
        let mut value = MessageValue::new(msg);
        for field in &aggregate.fields {
            self.aggregate_field(&mut value, field)?;
        }
        Ok(value)
    }

    fn aggregate_field(
        &mut self,
        current: &mut MessageValue,
        field: &ast::AggregateField,
    ) -> Result<(), ()> {
        let info = match &field.name {
            ast::AggregateFieldName::Plain(ident) => {
                match self.find_aggregate_field(current.msg, ident.value()) {
                    Some(info) => info,
                    None => {
                        let kind = DiagnosticKind::OptionFieldNotFound {
                            name: ident.value().to_owned(),
                            message: self.msg_full_name(current.msg).to_owned(),
                        };
                        self.error(ident.span(), kind);
                        return Err(());
                    }
                }
            }
            ast::AggregateFieldName::Extension { name, .. } => {
                self.resolve_extension(current.msg, name, field.name.span())?
            }
            ast::AggregateFieldName::AnyUrl { domain, name, .. } => {
                return self.any_field(current, field, domain, name);
            }
        };
        let display = info.display.clone();
        self.set_field(current, &info, &field.value, &display, field.name.span())
    }

    /// Field lookup inside aggregates: group fields are addressed by the
    /// group's message name, never by the lowercased field name.
    fn find_aggregate_field(&mut self, msg: u32, name: &str) -> Option<FieldInfo> {
        let descriptor = self.msg_descriptor(msg);
        if let Some(field) = descriptor.field.iter().find(|field| field.name() == name) {
            if field.r#type != Some(Type::Group as i32) {
                let field = field.clone();
                return self.field_info(&field, name.to_owned()).ok();
            }
        }
        let lower = name.to_ascii_lowercase();
        if let Some(field) = descriptor.field.iter().find(|field| field.name() == lower) {
            if field.r#type == Some(Type::Group as i32)
                && field
                    .type_name()
                    .rsplit('.')
                    .next()
                    .is_some_and(|group_name| group_name == name)
            {
                let field = field.clone();
                return self.field_info(&field, name.to_owned()).ok();
            }
        }
        None
    }

    /// `[domain/Type] { ... }` inside an aggregate: packs the value as a
    /// `google.protobuf.Any`.
    fn any_field(
        &mut self,
        current: &mut MessageValue,
        field: &ast::AggregateField,
        domain: &ast::TypeRef,
        name: &ast::TypeRef,
    ) -> Result<(), ()> {
        let span = field.name.span();
        if self.msg_full_name(current.msg) != "google.protobuf.Any" {
            self.error(span, DiagnosticKind::InvalidTypeForAny);
            return Err(());
        }

        let type_name = name.to_string();
        let reference = format!("{}/{}", domain, type_name);
        let msg = match self.table.get(&type_name) {
            Some(symbol) => match symbol.kind {
                DefKind::Message(index) => {
                    self.used.insert(symbol.file);
                    index
                }
                _ => {
                    self.error(
                        span,
                        DiagnosticKind::UnresolvedTypeReference { name: reference },
                    );
                    return Err(());
                }
            },
            None => {
                self.error(
                    span,
                    DiagnosticKind::UnresolvedTypeReference { name: reference },
                );
                return Err(());
            }
        };

        let built = match &field.value {
            ast::Value::Aggregate(aggregate) => self.aggregate(msg, aggregate)?,
            value => {
                let kind = DiagnosticKind::OptionValueTypeMismatch {
                    name: type_name,
                    expected: "a message",
                    actual: value_description(value),
                };
                self.error(value.span(), kind);
                return Err(());
            }
        };
        let mut encoded = Vec::new();
        encode_message(&built, &mut encoded);

        for (number, value) in [
            (1u32, EncodedValue::Bytes(reference.into_bytes())),
            (2u32, EncodedValue::Bytes(encoded)),
        ] {
            match current.fields.entry(number) {
                btree_map::Entry::Vacant(entry) => {
                    let display = if number == 1 { "type_url" } else { "value" };
                    entry.insert((display.to_owned(), FieldValue::Single(value)));
                }
                btree_map::Entry::Occupied(_) => {
                    self.error(
                        span.clone(),
                        DiagnosticKind::OptionAlreadySet {
                            name: if number == 1 { "type_url" } else { "value" }.to_owned(),
                        },
                    );
                    return Err(());
                }
            }
        }
        Ok(())
    }

    fn convert_scalar(&mut self, field: &FieldInfo, value: &ast::Value) -> Result<EncodedValue, ()> {
        match field.kind {
            FieldKind::Scalar(Type::Double) => {
                let float = self.expect_float(field, value)?;
                Ok(EncodedValue::Fixed64(float.to_bits()))
            }
            FieldKind::Scalar(Type::Float) => {
                let float = self.expect_float(field, value)?;
                Ok(EncodedValue::Fixed32((float as f32).to_bits()))
            }
            FieldKind::Scalar(Type::Int32) => {
                let int = self.expect_int(field, value, i32::MIN as i128, i32::MAX as i128, "int32")?;
                Ok(EncodedValue::Varint(int as i64 as u64))
            }
            FieldKind::Scalar(Type::Int64) => {
                let int = self.expect_int(field, value, i64::MIN as i128, i64::MAX as i128, "int64")?;
                Ok(EncodedValue::Varint(int as i64 as u64))
            }
            FieldKind::Scalar(Type::Uint32) => {
                let int = self.expect_int(field, value, 0, u32::MAX as i128, "uint32")?;
                Ok(EncodedValue::Varint(int as u64))
            }
            FieldKind::Scalar(Type::Uint64) => {
                let int = self.expect_int(field, value, 0, u64::MAX as i128, "uint64")?;
                Ok(EncodedValue::Varint(int as u64))
            }
            FieldKind::Scalar(Type::Sint32) => {
                let int = self.expect_int(field, value, i32::MIN as i128, i32::MAX as i128, "sint32")?;
                let zigzag = ((int as i32) << 1) ^ ((int as i32) >> 31);
                Ok(EncodedValue::Varint(zigzag as u32 as u64))
            }
            FieldKind::Scalar(Type::Sint64) => {
                let int = self.expect_int(field, value, i64::MIN as i128, i64::MAX as i128, "sint64")?;
                let zigzag = ((int as i64) << 1) ^ ((int as i64) >> 63);
                Ok(EncodedValue::Varint(zigzag as u64))
            }
            FieldKind::Scalar(Type::Fixed32) => {
                let int = self.expect_int(field, value, 0, u32::MAX as i128, "fixed32")?;
                Ok(EncodedValue::Fixed32(int as u32))
            }
            FieldKind::Scalar(Type::Fixed64) => {
                let int = self.expect_int(field, value, 0, u64::MAX as i128, "fixed64")?;
                Ok(EncodedValue::Fixed64(int as u64))
            }
            FieldKind::Scalar(Type::Sfixed32) => {
                let int =
                    self.expect_int(field, value, i32::MIN as i128, i32::MAX as i128, "sfixed32")?;
                Ok(EncodedValue::Fixed32(int as i32 as u32))
            }
            FieldKind::Scalar(Type::Sfixed64) => {
                let int =
                    self.expect_int(field, value, i64::MIN as i128, i64::MAX as i128, "sfixed64")?;
                Ok(EncodedValue::Fixed64(int as i64 as u64))
            }
            FieldKind::Scalar(Type::Bool) => self.expect_bool(field, value),
            FieldKind::Scalar(Type::String) => match value {
                ast::Value::String(string) => match string.as_utf8() {
                    Some(text) => Ok(EncodedValue::Bytes(text.into_bytes())),
                    None => {
                        self.error(string.span(), DiagnosticKind::InvalidUtf8String);
                        Err(())
                    }
                },
                value => self.type_mismatch(field, value, "a string"),
            },
            FieldKind::Scalar(Type::Bytes) => match value {
                ast::Value::String(string) => Ok(EncodedValue::Bytes(string.value())),
                value => self.type_mismatch(field, value, "a string"),
            },
            FieldKind::Enum(enum_index) => self.expect_enum(enum_index, value),
            FieldKind::Scalar(Type::Group | Type::Message | Type::Enum)
            | FieldKind::Message(_)
            | FieldKind::Group(_) => self.type_mismatch(field, value, "a message"),
        }
    }

    fn type_mismatch(
        &mut self,
        field: &FieldInfo,
        value: &ast::Value,
        expected: &'static str,
    ) -> Result<EncodedValue, ()> {
        let kind = DiagnosticKind::OptionValueTypeMismatch {
            name: field.name.clone(),
            expected,
            actual: value_description(value),
        };
        self.error(value.span(), kind);
        Err(())
    }

    fn expect_float(&mut self, field: &FieldInfo, value: &ast::Value) -> Result<f64, ()> {
        match float_of(value) {
            Some(float) => Ok(float),
            None => {
                let _ = self.type_mismatch(field, value, "a number");
                Err(())
            }
        }
    }

    fn expect_int(
        &mut self,
        field: &FieldInfo,
        value: &ast::Value,
        min: i128,
        max: i128,
        type_name: &'static str,
    ) -> Result<i128, ()> {
        match int_of(value) {
            Some(int) if (min..=max).contains(&int) => Ok(int),
            Some(int) => {
                self.error(
                    value.span(),
                    DiagnosticKind::OptionValueOutOfRange {
                        expected: type_name,
                        value: int.to_string(),
                    },
                );
                Err(())
            }
            None => {
                let _ = self.type_mismatch(field, value, "an integer");
                Err(())
            }
        }
    }

    fn expect_bool(&mut self, field: &FieldInfo, value: &ast::Value) -> Result<EncodedValue, ()> {
        match value {
            ast::Value::Ident(ident) => match ident.to_string().as_str() {
                "true" | "True" | "t" => Ok(EncodedValue::Varint(1)),
                "false" | "False" | "f" => Ok(EncodedValue::Varint(0)),
                _ => self.type_mismatch(field, value, "'true' or 'false'"),
            },
            ast::Value::Int(int) if int.value == 0 => Ok(EncodedValue::Varint(0)),
            ast::Value::Int(int) if int.value == 1 => Ok(EncodedValue::Varint(1)),
            value => self.type_mismatch(field, value, "'true' or 'false'"),
        }
    }

    fn expect_enum(&mut self, enum_index: u32, value: &ast::Value) -> Result<EncodedValue, ()> {
        let info = self.table.enum_(enum_index);
        match value {
            ast::Value::Ident(ident) if ident.parts.len() == 1 => {
                let name = ident.to_string();
                match info.values.iter().find(|(value_name, _)| *value_name == name) {
                    Some(&(_, number)) => Ok(EncodedValue::Varint(number as i64 as u64)),
                    None => {
                        let kind = DiagnosticKind::OptionUnknownEnumValue {
                            enum_: info.full_name.to_string(),
                            name,
                        };
                        self.error(ident.span(), kind);
                        Err(())
                    }
                }
            }
            value => match int_of(value) {
                Some(int) if i32::try_from(int).is_ok() => {
                    Ok(EncodedValue::Varint(int as i64 as u64))
                }
                _ => {
                    let kind = DiagnosticKind::OptionValueTypeMismatch {
                        name: info.full_name.to_string(),
                        expected: "an enum value",
                        actual: value_description(value),
                    };
                    self.error(value.span(), kind);
                    Err(())
                }
            },
        }
    }

    fn check_required(&self, value: &MessageValue, prefix: &str, missing: &mut Vec<String>) {
        let descriptor = self.msg_descriptor(value.msg);
        for field in &descriptor.field {
            if field.label == Some(Label::Required as i32)
                && !value.fields.contains_key(&(field.number() as u32))
            {
                missing.push(join_path(prefix, field.name()));
            }
        }
        for (display, field_value) in value.fields.values() {
            if let FieldValue::Message { value: inner, .. } = field_value {
                self.check_required(inner, &join_path(prefix, display), missing);
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn float_of(value: &ast::Value) -> Option<f64> {
    match value {
        ast::Value::Float(float) => Some(float.value),
        ast::Value::Int(int) => Some(int.value as f64),
        ast::Value::Ident(ident) => {
            let name = ident.to_string();
            if name.eq_ignore_ascii_case("inf") || name.eq_ignore_ascii_case("infinity") {
                Some(f64::INFINITY)
            } else if name.eq_ignore_ascii_case("nan") {
                Some(f64::NAN)
            } else {
                None
            }
        }
        ast::Value::Signed {
            negative, value, ..
        } => {
            let inner = float_of(value)?;
            Some(if *negative { -inner } else { inner })
        }
        _ => None,
    }
}

fn int_of(value: &ast::Value) -> Option<i128> {
    match value {
        ast::Value::Int(int) => Some(int.value as i128),
        ast::Value::Signed {
            negative, value, ..
        } => match &**value {
            ast::Value::Int(int) => {
                let int = int.value as i128;
                Some(if *negative { -int } else { int })
            }
            _ => None,
        },
        _ => None,
    }
}

fn encode_message(value: &MessageValue, buf: &mut Vec<u8>) {
    use prost::bytes::BufMut;

    for (&number, (_, field_value)) in &value.fields {
        let write = |value: &EncodedValue, buf: &mut Vec<u8>| match value {
            EncodedValue::Varint(v) => {
                encode_key(number, WireType::Varint, buf);
                encode_varint(*v, buf);
            }
            EncodedValue::Fixed32(v) => {
                encode_key(number, WireType::ThirtyTwoBit, buf);
                buf.put_u32_le(*v);
            }
            EncodedValue::Fixed64(v) => {
                encode_key(number, WireType::SixtyFourBit, buf);
                buf.put_u64_le(*v);
            }
            EncodedValue::Bytes(bytes) => {
                encode_key(number, WireType::LengthDelimited, buf);
                encode_varint(bytes.len() as u64, buf);
                buf.extend_from_slice(bytes);
            }
            EncodedValue::Group(bytes) => {
                encode_key(number, WireType::StartGroup, buf);
                buf.extend_from_slice(bytes);
                encode_key(number, WireType::EndGroup, buf);
            }
        };

        match field_value {
            FieldValue::Single(value) => write(value, buf),
            FieldValue::Repeated(values) => {
                for value in values {
                    write(value, buf);
                }
            }
            FieldValue::Message { group, value, .. } => {
                if *group {
                    encode_key(number, WireType::StartGroup, buf);
                    encode_message(value, buf);
                    encode_key(number, WireType::EndGroup, buf);
                } else {
                    let mut inner = Vec::new();
                    encode_message(value, &mut inner);
                    encode_key(number, WireType::LengthDelimited, buf);
                    encode_varint(inner.len() as u64, buf);
                    buf.extend_from_slice(&inner);
                }
            }
        }
    }
}
