//! Cross-file linking: the symbol table over every fully-qualified name in
//! the compilation, duplicate detection, type-reference resolution, and
//! used-import tracking.
//!
//! Enum values are registered in the scope *enclosing* their enum (C++
//! scoping), in addition to their own full name.

mod resolve;

pub(crate) use self::resolve::warn_unused_imports;

use std::collections::{hash_map, HashMap, HashSet};

use crate::{
    compile::FileRecord,
    error::{DiagnosticKind, DiagnosticSink},
    tag,
    types::{
        DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
        ServiceDescriptorProto,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DefKind {
    Package,
    Message(u32),
    Enum(u32),
    EnumValue,
    Field,
    Oneof,
    Service,
    Method,
    Extension,
}

impl DefKind {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            DefKind::Package => "a package",
            DefKind::Message(_) => "a message",
            DefKind::Enum(_) => "an enum",
            DefKind::EnumValue => "an enum value",
            DefKind::Field => "a field",
            DefKind::Oneof => "a oneof",
            DefKind::Service => "a service",
            DefKind::Method => "a method",
            DefKind::Extension => "an extension",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Symbol {
    pub(crate) kind: DefKind,
    pub(crate) file: usize,
    pub(crate) path: Box<[i32]>,
}

#[derive(Debug)]
pub(crate) struct MessageInfo {
    pub(crate) full_name: Box<str>,
    pub(crate) file: usize,
    pub(crate) path: Box<[i32]>,
    /// Inclusive extension range bounds.
    pub(crate) extension_ranges: Vec<(i32, i32)>,
    pub(crate) map_entry: bool,
    pub(crate) message_set: bool,
}

#[derive(Debug)]
pub(crate) struct EnumInfo {
    pub(crate) full_name: Box<str>,
    pub(crate) file: usize,
    pub(crate) values: Vec<(String, i32)>,
}

#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    pub(crate) names: HashMap<Box<str>, Symbol>,
    pub(crate) messages: Vec<MessageInfo>,
    pub(crate) enums: Vec<EnumInfo>,
}

impl SymbolTable {
    pub(crate) fn get(&self, name: &str) -> Option<&Symbol> {
        self.names.get(name)
    }

    pub(crate) fn message(&self, index: u32) -> &MessageInfo {
        &self.messages[index as usize]
    }

    pub(crate) fn enum_(&self, index: u32) -> &EnumInfo {
        &self.enums[index as usize]
    }
}

/// Fetches the message descriptor a symbol path points at.
pub(crate) fn message_at<'a>(
    file: &'a FileDescriptorProto,
    path: &[i32],
) -> Option<&'a DescriptorProto> {
    let mut chunks = path.chunks_exact(2);
    let first = chunks.next()?;
    let mut message = match first {
        [t, i] if *t == tag::file::MESSAGE_TYPE => file.message_type.get(*i as usize)?,
        _ => return None,
    };
    for chunk in chunks {
        message = match chunk {
            [t, i] if *t == tag::message::NESTED_TYPE => message.nested_type.get(*i as usize)?,
            _ => return None,
        };
    }
    Some(message)
}

/// Fetches the extension field descriptor a symbol path points at.
pub(crate) fn extension_field_at<'a>(
    file: &'a FileDescriptorProto,
    path: &[i32],
) -> Option<&'a FieldDescriptorProto> {
    if path.len() < 2 {
        return None;
    }
    let (prefix, last) = path.split_at(path.len() - 2);
    match last {
        [t, i] if *t == tag::file::EXTENSION && prefix.is_empty() => {
            file.extension.get(*i as usize)
        }
        [t, i] if *t == tag::message::EXTENSION => {
            message_at(file, prefix)?.extension.get(*i as usize)
        }
        _ => None,
    }
}

/// The `FILE:LINE:COL` location of a symbol's name token.
pub(crate) fn symbol_location(
    records: &[FileRecord],
    file: usize,
    path: &[i32],
    name_tag: i32,
) -> crate::SourceLocation {
    let record = &records[file];
    let mut full_path = path.to_vec();
    full_path.push(name_tag);
    let span = record.source_map.span_or_enclosing(&full_path);
    record.lines.location(span.start)
}

/// Nested-scope lookup restricted to `visible` files: the name is tried in
/// `scope`, each outer scope, and finally unqualified. A leading dot forces
/// absolute lookup.
pub(crate) fn resolve_visible<'t>(
    table: &'t SymbolTable,
    visible: &HashSet<usize>,
    scope: &str,
    name: &str,
) -> Option<(String, &'t Symbol)> {
    let lookup = |full_name: &str| match table.get(full_name) {
        Some(symbol) if visible.contains(&symbol.file) => {
            Some((full_name.to_owned(), symbol))
        }
        _ => None,
    };

    if let Some(absolute) = name.strip_prefix('.') {
        return lookup(absolute);
    }
    if !scope.is_empty() {
        if let Some(found) = lookup(&format!("{}.{}", scope, name)) {
            return Some(found);
        }
        for (i, _) in scope.rmatch_indices('.') {
            if let Some(found) = lookup(&format!("{}.{}", &scope[..i], name)) {
                return Some(found);
            }
        }
    }
    lookup(name)
}

pub(crate) fn link(records: &mut Vec<FileRecord>, sink: &mut DiagnosticSink) -> SymbolTable {
    let mut table = SymbolTable::default();
    for index in 0..records.len() {
        collect_file(&mut table, records, index, sink);
        if sink.is_stopped() {
            return table;
        }
    }

    compute_visibility(records);
    resolve::resolve(records, &table, sink);
    table
}

/// `visible` is the set of files whose symbols a file may reference: itself,
/// its direct imports, and the public-import closure of those imports.
fn compute_visibility(records: &mut Vec<FileRecord>) {
    let mut closures: Vec<HashSet<usize>> = Vec::with_capacity(records.len());
    // Records are ordered dependencies-first, so closures of imports are
    // complete by the time an importer needs them.
    for index in 0..records.len() {
        let mut closure = HashSet::new();
        closure.insert(index);
        for &public in &records[index].descriptor.public_dependency {
            if let Some(Some(dep)) = records[index].direct_deps.get(public as usize) {
                if *dep < closures.len() {
                    closure.extend(closures[*dep].iter().copied());
                }
            }
        }
        closures.push(closure);
    }

    for index in 0..records.len() {
        let mut visible = HashSet::new();
        visible.insert(index);
        for dep in records[index].direct_deps.clone().into_iter().flatten() {
            if dep < closures.len() {
                visible.extend(closures[dep].iter().copied());
            }
        }
        records[index].visible = visible;
        records[index].public_closure = closures[index].clone();
    }
}

struct Collector<'a, 'b, 'c> {
    table: &'a mut SymbolTable,
    records: &'a [FileRecord],
    file: usize,
    sink: &'b mut DiagnosticSink<'c>,
    scope: String,
    path: Vec<i32>,
}

fn collect_file(
    table: &mut SymbolTable,
    records: &[FileRecord],
    file: usize,
    sink: &mut DiagnosticSink,
) {
    let mut collector = Collector {
        table,
        records,
        file,
        sink,
        scope: String::new(),
        path: Vec::new(),
    };
    collector.file(&records[file].descriptor);
}

impl<'a, 'b, 'c> Collector<'a, 'b, 'c> {
    fn file(&mut self, file: &FileDescriptorProto) {
        let package = file.package().to_owned();
        if !package.is_empty() {
            for (i, _) in package.match_indices('.') {
                self.add_package(&package[..i]);
            }
            self.add_package(&package);
            self.scope = package;
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
        for (i, service) in file.service.iter().enumerate() {
            self.path.extend([tag::file::SERVICE, i as i32]);
            self.service(service);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, extension) in file.extension.iter().enumerate() {
            self.path.extend([tag::file::EXTENSION, i as i32]);
            self.extension(extension);
            self.path.truncate(self.path.len() - 2);
        }
    }

    fn message(&mut self, message: &DescriptorProto) {
        let full_name = self.qualify(message.name());
        let info = MessageInfo {
            full_name: full_name.clone().into(),
            file: self.file,
            path: self.path.clone().into(),
            extension_ranges: message
                .extension_range
                .iter()
                .map(|range| (range.start(), range.end().saturating_sub(1)))
                .collect(),
            map_entry: message
                .options
                .as_ref()
                .is_some_and(|options| options.get().map_entry()),
            message_set: message.options.as_ref().is_some_and(|options| {
                options.get().message_set_wire_format()
                    || matches!(
                        crate::validate::find_bool_option(
                            &options.get().uninterpreted_option,
                            "message_set_wire_format",
                        ),
                        Some((_, true))
                    )
            }),
        };
        let index = self.table.messages.len() as u32;
        self.table.messages.push(info);
        self.add(&full_name, tag::message::NAME, DefKind::Message(index));

        let scope_len = self.scope.len();
        self.push_scope(message.name());

        for (i, field) in message.field.iter().enumerate() {
            self.path.extend([tag::message::FIELD, i as i32]);
            let name = self.qualify(field.name());
            self.add(&name, tag::field::NAME, DefKind::Field);
            self.path.truncate(self.path.len() - 2);
        }
        for (i, oneof) in message.oneof_decl.iter().enumerate() {
            self.path.extend([tag::message::ONEOF_DECL, i as i32]);
            let name = self.qualify(oneof.name());
            self.add(&name, tag::oneof::NAME, DefKind::Oneof);
            self.path.truncate(self.path.len() - 2);
        }
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
        for (i, extension) in message.extension.iter().enumerate() {
            self.path.extend([tag::message::EXTENSION, i as i32]);
            self.extension(extension);
            self.path.truncate(self.path.len() - 2);
        }

        self.pop_scope(scope_len);
    }

    fn enum_(&mut self, enum_: &EnumDescriptorProto) {
        let full_name = self.qualify(enum_.name());
        let info = EnumInfo {
            full_name: full_name.clone().into(),
            file: self.file,
            values: enum_
                .value
                .iter()
                .map(|value| (value.name().to_owned(), value.number()))
                .collect(),
        };
        let index = self.table.enums.len() as u32;
        self.table.enums.push(info);
        self.add(&full_name, tag::enum_::NAME, DefKind::Enum(index));

        for (i, value) in enum_.value.iter().enumerate() {
            self.path.extend([tag::enum_::VALUE, i as i32]);
            // The value's own full name, plus the C++-scoped alias in the
            // enum's enclosing scope.
            let qualified = format!("{}.{}", full_name, value.name());
            if self.add(&qualified, tag::enum_value::NAME, DefKind::EnumValue) {
                let enclosing = self.qualify(value.name());
                self.add(&enclosing, tag::enum_value::NAME, DefKind::EnumValue);
            }
            self.path.truncate(self.path.len() - 2);
        }
    }

    fn service(&mut self, service: &ServiceDescriptorProto) {
        let full_name = self.qualify(service.name());
        self.add(&full_name, tag::service::NAME, DefKind::Service);

        for (i, method) in service.method.iter().enumerate() {
            self.path.extend([tag::service::METHOD, i as i32]);
            let name = format!("{}.{}", full_name, method.name());
            self.add(&name, tag::method::NAME, DefKind::Method);
            self.path.truncate(self.path.len() - 2);
        }
    }

    fn extension(&mut self, extension: &FieldDescriptorProto) {
        let full_name = self.qualify(extension.name());
        self.add(&full_name, tag::field::NAME, DefKind::Extension);
    }

    fn qualify(&self, name: &str) -> String {
        if self.scope.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{}", self.scope, name)
        }
    }

    fn push_scope(&mut self, name: &str) {
        if !self.scope.is_empty() {
            self.scope.push('.');
        }
        self.scope.push_str(name);
    }

    fn pop_scope(&mut self, len: usize) {
        self.scope.truncate(len);
    }

    fn add_package(&mut self, name: &str) {
        match self.table.names.entry(name.into()) {
            hash_map::Entry::Vacant(entry) => {
                entry.insert(Symbol {
                    kind: DefKind::Package,
                    file: self.file,
                    path: Box::from([]),
                });
            }
            hash_map::Entry::Occupied(entry) => {
                if entry.get().kind == DefKind::Package {
                    return;
                }
                let existing = entry.get().clone();
                self.report_duplicate(name, &[tag::file::PACKAGE], &existing);
            }
        }
    }

    /// Registers a symbol at the current path. Returns `false` on a
    /// duplicate, which is reported against the earlier definition.
    fn add(&mut self, name: &str, name_tag: i32, kind: DefKind) -> bool {
        match self.table.names.entry(name.into()) {
            hash_map::Entry::Vacant(entry) => {
                entry.insert(Symbol {
                    kind,
                    file: self.file,
                    path: self.path.clone().into(),
                });
                true
            }
            hash_map::Entry::Occupied(entry) => {
                let existing = entry.get().clone();
                let mut path = self.path.clone();
                path.push(name_tag);
                self.report_duplicate(name, &path, &existing);
                false
            }
        }
    }

    fn report_duplicate(&mut self, name: &str, path_with_name: &[i32], existing: &Symbol) {
        let existing_name_tag = name_tag_for(existing.kind);
        let defined_at =
            symbol_location(self.records, existing.file, &existing.path, existing_name_tag);
        let record = &self.records[self.file];
        let span = record.source_map.span_or_enclosing(path_with_name);
        self.sink.error(
            &record.lines,
            &record.source,
            span,
            DiagnosticKind::SymbolAlreadyDefined {
                name: name.to_owned(),
                defined_at,
            },
        );
    }
}

pub(crate) fn name_tag_for(kind: DefKind) -> i32 {
    match kind {
        DefKind::Package => tag::file::PACKAGE,
        DefKind::Message(_) => tag::message::NAME,
        DefKind::Enum(_) => tag::enum_::NAME,
        DefKind::EnumValue => tag::enum_value::NAME,
        DefKind::Field | DefKind::Extension => tag::field::NAME,
        DefKind::Oneof => tag::oneof::NAME,
        DefKind::Service => tag::service::NAME,
        DefKind::Method => tag::method::NAME,
    }
}
