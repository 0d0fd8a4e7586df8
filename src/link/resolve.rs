//! Type-reference resolution over the linked file set.
//!
//! Every written reference is resolved with protobuf's nested-scope rule
//! (innermost scope outward, then the file's package chain, restricted to
//! the importable file set) and rewritten to its canonical absolute form.
//! Extension placement and the map-entry reference ban are enforced here,
//! where the resolved target is first known.

use std::collections::{HashMap, HashSet};

use crate::{
    compile::FileRecord,
    error::{DiagnosticKind, DiagnosticSink},
    tag,
    types::{
        field_descriptor_proto::{Label, Type},
        DescriptorProto, FieldDescriptorProto, FileDescriptorProto, ServiceDescriptorProto,
    },
    Syntax,
};

use super::{DefKind, Symbol, SymbolTable};

/// Extendees that proto3 files may legally extend: custom options.
const OPTIONS_MESSAGES: &[&str] = &[
    "google.protobuf.FileOptions",
    "google.protobuf.MessageOptions",
    "google.protobuf.FieldOptions",
    "google.protobuf.OneofOptions",
    "google.protobuf.EnumOptions",
    "google.protobuf.EnumValueOptions",
    "google.protobuf.ExtensionRangeOptions",
    "google.protobuf.ServiceOptions",
    "google.protobuf.MethodOptions",
];

pub(super) fn resolve(
    records: &mut Vec<FileRecord>,
    table: &SymbolTable,
    sink: &mut DiagnosticSink,
) {
    let mut extension_tags: HashMap<(u32, i32), (usize, Box<[i32]>)> = HashMap::new();

    for index in 0..records.len() {
        let mut descriptor = std::mem::take(&mut records[index].descriptor);
        let mut used = HashSet::new();
        {
            let mut resolver = Resolver {
                records,
                table,
                file: index,
                sink,
                used: &mut used,
                extension_tags: &mut extension_tags,
                scope: String::new(),
                path: Vec::new(),
            };
            resolver.file(&mut descriptor);
        }
        records[index].descriptor = descriptor;
        records[index].used_files.extend(used);
        if sink.is_stopped() {
            return;
        }
    }
}

/// Emits "import not used" warnings. Runs after option interpretation, so
/// imports that only supply custom option extensions count as used.
pub(crate) fn warn_unused_imports(records: &[FileRecord], sink: &mut DiagnosticSink) {
    for record in records {
        if record.synthetic {
            continue;
        }
        let descriptor = &record.descriptor;
        for (i, dependency) in descriptor.dependency.iter().enumerate() {
            if descriptor.public_dependency.contains(&(i as i32)) {
                continue;
            }
            let dep_index = match record.direct_deps.get(i).copied().flatten() {
                Some(dep) => dep,
                None => continue,
            };
            if dependency == "google/protobuf/descriptor.proto" && has_any_options(descriptor) {
                continue;
            }
            let is_used = record
                .used_files
                .iter()
                .any(|file| records[dep_index].public_closure.contains(file));
            if !is_used {
                let span = record
                    .source_map
                    .span_or_enclosing(&[tag::file::DEPENDENCY, i as i32]);
                sink.warning(
                    &record.lines,
                    &record.source,
                    span,
                    DiagnosticKind::ImportNotUsed {
                        name: dependency.clone(),
                    },
                );
            }
        }
    }
}

/// Whether any descriptor in the file carries options; the standard
/// descriptor.proto import counts as used in that case.
fn has_any_options(file: &FileDescriptorProto) -> bool {
    fn message_has_options(message: &DescriptorProto) -> bool {
        message.options.is_some()
            || message.field.iter().any(|f| f.options.is_some())
            || message.extension.iter().any(|f| f.options.is_some())
            || message.oneof_decl.iter().any(|o| o.options.is_some())
            || message.extension_range.iter().any(|r| r.options.is_some())
            || message.enum_type.iter().any(enum_has_options)
            || message.nested_type.iter().any(message_has_options)
    }
    fn enum_has_options(enum_: &crate::types::EnumDescriptorProto) -> bool {
        enum_.options.is_some() || enum_.value.iter().any(|v| v.options.is_some())
    }

    file.options.is_some()
        || file.extension.iter().any(|f| f.options.is_some())
        || file.message_type.iter().any(message_has_options)
        || file.enum_type.iter().any(enum_has_options)
        || file.service.iter().any(|s| {
            s.options.is_some() || s.method.iter().any(|m| m.options.is_some())
        })
}

enum Resolved<'t> {
    Found { full_name: String, symbol: &'t Symbol },
    NotFound,
}

struct Resolver<'a, 'b, 'c> {
    records: &'a [FileRecord],
    table: &'a SymbolTable,
    file: usize,
    sink: &'b mut DiagnosticSink<'c>,
    used: &'a mut HashSet<usize>,
    extension_tags: &'a mut HashMap<(u32, i32), (usize, Box<[i32]>)>,
    scope: String,
    path: Vec<i32>,
}

impl<'a, 'b, 'c> Resolver<'a, 'b, 'c> {
    fn syntax(&self) -> Syntax {
        self.records[self.file].syntax
    }

    fn error_at(&mut self, suffix: &[i32], kind: DiagnosticKind) {
        let record = &self.records[self.file];
        let mut path = self.path.clone();
        path.extend_from_slice(suffix);
        let span = record.source_map.span_or_enclosing(&path);
        self.sink
            .error(&record.lines, &record.source, span, kind);
    }

    fn file(&mut self, file: &mut FileDescriptorProto) {
        self.scope = file.package().to_owned();

        for (i, message) in file.message_type.iter_mut().enumerate() {
            self.path.extend([tag::file::MESSAGE_TYPE, i as i32]);
            self.message(message);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, extension) in file.extension.iter_mut().enumerate() {
            self.path.extend([tag::file::EXTENSION, i as i32]);
            self.extension(extension);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, service) in file.service.iter_mut().enumerate() {
            self.path.extend([tag::file::SERVICE, i as i32]);
            self.service(service);
            self.path.truncate(self.path.len() - 2);
        }
    }

    fn message(&mut self, message: &mut DescriptorProto) {
        let scope_len = self.scope.len();
        if !self.scope.is_empty() {
            self.scope.push('.');
        }
        self.scope.push_str(message.name());

        let message_path: Box<[i32]> = self.path.clone().into();
        for (i, field) in message.field.iter_mut().enumerate() {
            self.path.extend([tag::message::FIELD, i as i32]);
            self.field_type(field, Some(&message_path));
            self.path.truncate(self.path.len() - 2);
        }
        for (i, nested) in message.nested_type.iter_mut().enumerate() {
            self.path.extend([tag::message::NESTED_TYPE, i as i32]);
            self.message(nested);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, extension) in message.extension.iter_mut().enumerate() {
            self.path.extend([tag::message::EXTENSION, i as i32]);
            self.extension(extension);
            self.path.truncate(self.path.len() - 2);
        }

        self.scope.truncate(scope_len);
    }

    /// Resolves a field's value type. `owner_path` is the enclosing
    /// message's path, used to allow the one legal reference to a synthetic
    /// map entry: the repeated field it was generated for.
    fn field_type(&mut self, field: &mut FieldDescriptorProto, owner_path: Option<&[i32]>) {
        let written = match &field.type_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => return,
        };

        match self.resolve_name(&written) {
            Resolved::Found { full_name, symbol } => match symbol.kind {
                DefKind::Message(info_index) => {
                    let info = self.table.message(info_index);
                    if info.map_entry && !self.is_map_entry_owner(field, info_index, owner_path)
                    {
                        self.error_at(
                            &[tag::field::TYPE_NAME],
                            DiagnosticKind::MapEntryReference {
                                name: full_name.clone(),
                            },
                        );
                    }
                    if field.r#type != Some(Type::Group as i32) {
                        field.r#type = Some(Type::Message as i32);
                    }
                    if field.default_value.is_some() {
                        self.error_at(
                            &[tag::field::DEFAULT_VALUE],
                            DiagnosticKind::DefaultValueMessage,
                        );
                    }
                    field.type_name = Some(format!(".{}", full_name));
                }
                DefKind::Enum(info_index) => {
                    let info = self.table.enum_(info_index);
                    if self.syntax() == Syntax::Proto3
                        && self.records[info.file].syntax == Syntax::Proto2
                    {
                        let field_name = field.name().to_owned();
                        let enum_name = full_name.clone();
                        self.error_at(
                            &[tag::field::TYPE_NAME],
                            DiagnosticKind::Proto2EnumInProto3 {
                                field: field_name,
                                enum_: enum_name,
                            },
                        );
                    }
                    if let Some(default) = field.default_value.clone() {
                        if !info.values.iter().any(|(name, _)| *name == default) {
                            self.error_at(
                                &[tag::field::DEFAULT_VALUE],
                                DiagnosticKind::InvalidDefaultValue {
                                    reason: format!(
                                        "enum {} has no value named {}",
                                        full_name, default
                                    ),
                                },
                            );
                        }
                    }
                    field.r#type = Some(Type::Enum as i32);
                    field.type_name = Some(format!(".{}", full_name));
                }
                kind => {
                    self.error_at(
                        &[tag::field::TYPE_NAME],
                        DiagnosticKind::InvalidTypeReference {
                            name: written,
                            actual: kind.describe(),
                            expected: "a message or enum",
                        },
                    );
                }
            },
            Resolved::NotFound => {
                self.error_at(
                    &[tag::field::TYPE_NAME],
                    DiagnosticKind::UnresolvedTypeReference { name: written },
                );
            }
        }
    }

    fn is_map_entry_owner(
        &self,
        field: &FieldDescriptorProto,
        info_index: u32,
        owner_path: Option<&[i32]>,
    ) -> bool {
        let info = self.table.message(info_index);
        let owner_path = match owner_path {
            Some(path) => path,
            None => return false,
        };
        let entry_name = info.full_name.rsplit('.').next().unwrap_or_default();
        info.file == self.file
            && info.path.len() == owner_path.len() + 2
            && info.path.starts_with(owner_path)
            && field.label == Some(Label::Repeated as i32)
            && entry_name == format!("{}Entry", crate::generate::underscores_to_pascal(field.name()))
    }

    fn extension(&mut self, extension: &mut FieldDescriptorProto) {
        self.field_type(extension, None);

        let written = match &extension.extendee {
            Some(name) if !name.is_empty() => name.clone(),
            _ => return,
        };

        let (full_name, info_index) = match self.resolve_name(&written) {
            Resolved::Found { full_name, symbol } => match symbol.kind {
                DefKind::Message(info_index) => (full_name, info_index),
                kind => {
                    self.error_at(
                        &[tag::field::EXTENDEE],
                        DiagnosticKind::InvalidTypeReference {
                            name: written,
                            actual: kind.describe(),
                            expected: "a message",
                        },
                    );
                    return;
                }
            },
            Resolved::NotFound => {
                self.error_at(
                    &[tag::field::EXTENDEE],
                    DiagnosticKind::UnresolvedTypeReference { name: written },
                );
                return;
            }
        };

        extension.extendee = Some(format!(".{}", full_name));

        let info = self.table.message(info_index);
        if info.map_entry {
            self.error_at(
                &[tag::field::EXTENDEE],
                DiagnosticKind::MapEntryReference {
                    name: full_name.clone(),
                },
            );
            return;
        }

        if self.syntax() == Syntax::Proto3 && !OPTIONS_MESSAGES.contains(&full_name.as_str()) {
            self.error_at(&[tag::field::EXTENDEE], DiagnosticKind::Proto3ExtendNonOption);
        }

        let tag_value = extension.number();
        if !info
            .extension_ranges
            .iter()
            .any(|&(start, end)| (start..=end).contains(&tag_value))
        {
            let name = if self.scope.is_empty() {
                extension.name().to_owned()
            } else {
                format!("{}.{}", self.scope, extension.name())
            };
            self.error_at(
                &[tag::field::NUMBER],
                DiagnosticKind::ExtensionTagNotInRange {
                    name,
                    tag: tag_value,
                    extendee: full_name.clone(),
                },
            );
        }

        match self.extension_tags.entry((info_index, tag_value)) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert((self.file, self.path.clone().into()));
            }
            std::collections::hash_map::Entry::Occupied(entry) => {
                let (first_file, first_path) = entry.get().clone();
                let mut number_path = first_path.to_vec();
                number_path.push(tag::field::NUMBER);
                let defined_at = {
                    let record = &self.records[first_file];
                    let span = record.source_map.span_or_enclosing(&number_path);
                    record.lines.location(span.start)
                };
                self.error_at(
                    &[tag::field::NUMBER],
                    DiagnosticKind::ExtensionTagAlreadyDefined {
                        tag: tag_value,
                        extendee: full_name.clone(),
                        defined_at,
                    },
                );
            }
        }

        if self.table.message(info_index).message_set {
            if extension.label != Some(Label::Optional as i32) {
                self.error_at(&[], DiagnosticKind::MessageSetRepeatedExtension);
            }
            if extension.r#type != Some(Type::Message as i32)
                && extension.r#type != Some(Type::Group as i32)
            {
                self.error_at(&[], DiagnosticKind::MessageSetScalarExtension);
            }
        }
    }

    fn service(&mut self, service: &mut ServiceDescriptorProto) {
        let scope_len = self.scope.len();
        if !self.scope.is_empty() {
            self.scope.push('.');
        }
        self.scope.push_str(service.name());

        for (i, method) in service.method.iter_mut().enumerate() {
            self.path.extend([tag::service::METHOD, i as i32]);
            if let Some(input) = method.input_type.clone() {
                if let Some(full) = self.method_type(&input, tag::method::INPUT_TYPE) {
                    method.input_type = Some(full);
                }
            }
            if let Some(output) = method.output_type.clone() {
                if let Some(full) = self.method_type(&output, tag::method::OUTPUT_TYPE) {
                    method.output_type = Some(full);
                }
            }
            self.path.truncate(self.path.len() - 2);
        }

        self.scope.truncate(scope_len);
    }

    fn method_type(&mut self, written: &str, type_tag: i32) -> Option<String> {
        match self.resolve_name(written) {
            Resolved::Found { full_name, symbol } => match symbol.kind {
                DefKind::Message(info_index) => {
                    if self.table.message(info_index).map_entry {
                        self.error_at(
                            &[type_tag],
                            DiagnosticKind::MapEntryReference {
                                name: full_name.clone(),
                            },
                        );
                        return None;
                    }
                    Some(format!(".{}", full_name))
                }
                kind => {
                    self.error_at(
                        &[type_tag],
                        DiagnosticKind::InvalidTypeReference {
                            name: written.to_owned(),
                            actual: kind.describe(),
                            expected: "a message",
                        },
                    );
                    None
                }
            },
            Resolved::NotFound => {
                self.error_at(
                    &[type_tag],
                    DiagnosticKind::UnresolvedTypeReference {
                        name: written.to_owned(),
                    },
                );
                None
            }
        }
    }

    /// Protobuf's nested-scope resolution: a leading dot forces absolute
    /// lookup; otherwise the name is tried in the current scope, each outer
    /// scope, and finally unqualified. Only symbols from importable files
    /// are candidates.
    fn resolve_name(&mut self, name: &str) -> Resolved<'a> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self.lookup(absolute);
        }

        let scope = self.scope.clone();
        if let found @ Resolved::Found { .. } = self.lookup(&format!("{}.{}", scope, name)) {
            return found;
        }
        for (i, _) in scope.rmatch_indices('.') {
            if let found @ Resolved::Found { .. } =
                self.lookup(&format!("{}.{}", &scope[..i], name))
            {
                return found;
            }
        }
        self.lookup(name)
    }

    fn lookup(&mut self, full_name: &str) -> Resolved<'a> {
        match self.table.get(full_name) {
            Some(symbol) if self.records[self.file].visible.contains(&symbol.file) => {
                self.used.insert(symbol.file);
                Resolved::Found {
                    full_name: full_name.to_owned(),
                    symbol,
                }
            }
            _ => Resolved::NotFound,
        }
    }
}
