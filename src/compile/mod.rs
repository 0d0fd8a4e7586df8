//! The compiler entry point: configuration, the import loader, and the
//! pipeline driver.
//!
//! The loader parses each file at most once, recursing into imports through
//! an abstract [`FileAccessor`] with the bundled `google/protobuf` sources
//! as a fallback, and detects import cycles on the way down. The loaded set
//! is ordered dependencies-first, which the later passes rely on.

mod include;

use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    sync::Arc,
};

use crate::{
    ast,
    error::{BoxError, Diagnostic, DiagnosticKind, DiagnosticSink, Error, ErrorKind, LineIndex},
    generate, link, options, parse, tag,
    types::{FileDescriptorProto, FileDescriptorSet},
    validate, Reporter, Syntax,
};

/// Supplies source bytes for an import name.
///
/// This is the only blocking boundary in the pipeline; the accessor may
/// perform I/O.
pub trait FileAccessor {
    fn access(&self, name: &str) -> Result<Vec<u8>, AccessorError>;
}

/// The result of a failed [`FileAccessor`] lookup.
#[derive(Debug)]
pub enum AccessorError {
    /// The accessor has no file by this name; the compiler falls back to
    /// the bundled standard imports.
    NotFound,
    /// The lookup failed for another reason; the compilation is aborted.
    Other(BoxError),
}

impl<F> FileAccessor for F
where
    F: Fn(&str) -> Result<Vec<u8>, AccessorError>,
{
    fn access(&self, name: &str) -> Result<Vec<u8>, AccessorError> {
        self(name)
    }
}

/// An in-memory [`FileAccessor`], mainly useful for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccessor {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, source: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(name.into(), source.into());
        self
    }
}

impl FileAccessor for MemoryAccessor {
    fn access(&self, name: &str) -> Result<Vec<u8>, AccessorError> {
        match self.files.get(name) {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(AccessorError::NotFound),
        }
    }
}

/// One loaded file, carried through every pipeline stage.
pub(crate) struct FileRecord {
    pub(crate) name: Arc<str>,
    pub(crate) source: String,
    pub(crate) lines: LineIndex,
    pub(crate) descriptor: FileDescriptorProto,
    pub(crate) syntax: Syntax,
    pub(crate) source_map: generate::SourceMap,
    /// Injected for option interpretation without being imported.
    pub(crate) synthetic: bool,
    /// Supplied pre-compiled through `lookup_import_proto`.
    pub(crate) prebuilt: bool,
    /// Record index per dependency list entry; `None` if it failed to load.
    pub(crate) direct_deps: Vec<Option<usize>>,
    /// Files whose symbols this file may reference.
    pub(crate) visible: HashSet<usize>,
    /// This file plus its public-import closure.
    pub(crate) public_closure: HashSet<usize>,
    /// Files that supplied at least one resolved symbol.
    pub(crate) used_files: HashSet<usize>,
}

type LookupImport = dyn Fn(&str) -> Option<FileDescriptorProto>;
type ErrorCallback = dyn FnMut(&Diagnostic) -> Result<(), BoxError>;
type WarningCallback = dyn FnMut(&Diagnostic);

/// The compiler configuration and entry point.
///
/// ```
/// use protolink::{Compiler, MemoryAccessor};
///
/// let mut accessor = MemoryAccessor::new();
/// accessor.add("test.proto", "syntax = \"proto3\"; message Foo {}");
///
/// let files = Compiler::new()
///     .accessor(accessor)
///     .parse_files(["test.proto"])
///     .unwrap();
/// assert_eq!(files[0].message_type[0].name(), "Foo");
/// ```
#[derive(Default)]
pub struct Compiler {
    import_paths: Vec<String>,
    accessor: Option<Box<dyn FileAccessor>>,
    infer_import_paths: bool,
    validate_unlinked_files: bool,
    interpret_options_in_unlinked_files: bool,
    include_source_code_info: bool,
    lookup_import: Option<Box<LookupImport>>,
    custom_reporter: Option<Box<dyn Reporter>>,
    error_callback: Option<Box<ErrorCallback>>,
    warning_callback: Option<Box<WarningCallback>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered search roots prepended to accessor lookups.
    pub fn import_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.import_paths = paths
            .into_iter()
            .map(|path| path.into().trim_end_matches('/').to_owned())
            .collect();
        self
    }

    /// The function used to open files.
    pub fn accessor(mut self, accessor: impl FileAccessor + 'static) -> Self {
        self.accessor = Some(Box::new(accessor));
        self
    }

    /// Strip leading path components so file names match their imports.
    pub fn infer_import_paths(mut self, value: bool) -> Self {
        self.infer_import_paths = value;
        self
    }

    /// Run the basic validator when linking is skipped.
    pub fn validate_unlinked_files(mut self, value: bool) -> Self {
        self.validate_unlinked_files = value;
        self
    }

    /// Best-effort option interpretation when linking is skipped. Failures
    /// leave options uninterpreted instead of reporting errors.
    pub fn interpret_options_in_unlinked_files(mut self, value: bool) -> Self {
        self.interpret_options_in_unlinked_files = value;
        self
    }

    /// Populate `source_code_info` on the produced descriptors.
    pub fn include_source_code_info(mut self, value: bool) -> Self {
        self.include_source_code_info = value;
        self
    }

    /// Short-circuits parsing of an import when the caller already has a
    /// compiled descriptor for it.
    pub fn lookup_import_proto(
        mut self,
        lookup: impl Fn(&str) -> Option<FileDescriptorProto> + 'static,
    ) -> Self {
        self.lookup_import = Some(Box::new(lookup));
        self
    }

    /// Callback invoked for each error; returning `Err` stops the
    /// compilation, which then returns that error verbatim.
    pub fn error_reporter(
        mut self,
        reporter: impl FnMut(&Diagnostic) -> Result<(), BoxError> + 'static,
    ) -> Self {
        self.error_callback = Some(Box::new(reporter));
        self
    }

    /// Callback invoked for each warning.
    pub fn warning_reporter(mut self, reporter: impl FnMut(&Diagnostic) + 'static) -> Self {
        self.warning_callback = Some(Box::new(reporter));
        self
    }

    /// A full [`Reporter`], replacing any callbacks.
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.custom_reporter = Some(Box::new(reporter));
        self
    }

    /// Runs the full pipeline and returns the linked descriptor of each
    /// named file, in input order.
    pub fn parse_files<I, S>(&mut self, names: I) -> Result<Vec<FileDescriptorProto>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect();
        self.with_reporter(|compiler, reporter| compiler.run(&names, Mode::Link, reporter))
    }

    /// Stops after per-file processing: descriptors are produced but type
    /// references stay as written and options stay uninterpreted (unless
    /// [`interpret_options_in_unlinked_files`](Self::interpret_options_in_unlinked_files)
    /// is set).
    pub fn parse_files_but_do_not_link<I, S>(
        &mut self,
        names: I,
    ) -> Result<Vec<FileDescriptorProto>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect();
        self.with_reporter(|compiler, reporter| compiler.run(&names, Mode::NoLink, reporter))
    }

    /// Runs the full pipeline and returns every compiled file as a
    /// [`FileDescriptorSet`], ordered dependencies-first.
    pub fn parse_file_descriptor_set<I, S>(&mut self, names: I) -> Result<FileDescriptorSet, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect();
        self.with_reporter(|compiler, reporter| {
            let mut sink = DiagnosticSink::new(reporter);
            let (records, _) = compiler.pipeline(&names, Mode::Link, &mut sink)?;
            sink.finish()?;
            Ok(FileDescriptorSet {
                file: records
                    .into_iter()
                    .filter(|record| !record.synthetic)
                    .map(|record| record.descriptor)
                    .collect(),
            })
        })
    }

    /// Stops after parsing: the concrete syntax tree of one file, which
    /// prints back to the original source byte-for-byte.
    pub fn parse_to_ast(&mut self, name: &str) -> Result<ast::File, Error> {
        self.with_reporter(|compiler, reporter| {
            let mut sink = DiagnosticSink::new(reporter);
            let source = match compiler.read_source(name, None)? {
                Some(source) => source,
                None => return Err(Error::file_not_found(name)),
            };
            let lines = LineIndex::new(name.into(), &source);
            let file = parse::parse(&source, &lines, &mut sink);
            sink.finish()?;
            Ok(file)
        })
    }

    fn with_reporter<R>(
        &mut self,
        f: impl FnOnce(&Self, Option<&mut dyn Reporter>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut custom = self.custom_reporter.take();
        let mut callbacks = CallbackReporter {
            error: self.error_callback.take(),
            warning: self.warning_callback.take(),
        };

        let result = {
            let reporter: Option<&mut dyn Reporter> = match &mut custom {
                Some(reporter) => Some(reporter.as_mut()),
                None if callbacks.error.is_some() || callbacks.warning.is_some() => {
                    Some(&mut callbacks)
                }
                None => None,
            };
            f(self, reporter)
        };

        self.custom_reporter = custom;
        self.error_callback = callbacks.error;
        self.warning_callback = callbacks.warning;
        result
    }

    fn run(
        &self,
        names: &[String],
        mode: Mode,
        reporter: Option<&mut dyn Reporter>,
    ) -> Result<Vec<FileDescriptorProto>, Error> {
        let mut sink = DiagnosticSink::new(reporter);
        let (records, entries) = self.pipeline(names, mode, &mut sink)?;
        sink.finish()?;
        Ok(entries
            .iter()
            .map(|&index| records[index].descriptor.clone())
            .collect())
    }

    fn pipeline(
        &self,
        names: &[String],
        mode: Mode,
        sink: &mut DiagnosticSink,
    ) -> Result<(Vec<FileRecord>, Vec<usize>), Error> {
        let mut loader = Loader {
            compiler: self,
            records: Vec::new(),
            by_name: HashMap::new(),
            stack: Vec::new(),
        };

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            match loader.load(name, None, sink)? {
                Some(index) => entries.push(index),
                None => return Err(Error::file_not_found(name)),
            }
            if sink.is_stopped() {
                return Ok((loader.records, entries));
            }
        }

        let mut records = loader.records;
        let by_name = loader.by_name;

        let run_validate = mode == Mode::Link || self.validate_unlinked_files;
        if run_validate {
            for record in &records {
                if record.prebuilt {
                    continue;
                }
                validate::validate(
                    &record.descriptor,
                    record.syntax,
                    &record.source_map,
                    &record.source,
                    &record.lines,
                    sink,
                );
                if sink.is_stopped() {
                    return Ok((records, entries));
                }
            }
        }

        match mode {
            Mode::Link => {
                self.inject_descriptor_proto(&mut records, &by_name, sink);
                let table = link::link(&mut records, sink);
                if !sink.is_stopped() {
                    options::interpret(&mut records, &table, sink);
                }
                if !sink.is_stopped() {
                    link::warn_unused_imports(&records, sink);
                }
            }
            Mode::NoLink => {
                if self.interpret_options_in_unlinked_files {
                    // Best effort: resolution and interpretation problems are
                    // discarded rather than reported.
                    let mut scratch = DiagnosticSink::new(None);
                    self.inject_descriptor_proto(&mut records, &by_name, &mut scratch);
                    let table = link::link(&mut records, &mut scratch);
                    options::interpret(&mut records, &table, &mut scratch);
                    let _ = scratch.finish();
                }
            }
        }

        if self.include_source_code_info {
            for record in &mut records {
                if record.prebuilt || record.synthetic {
                    continue;
                }
                record.descriptor.source_code_info =
                    Some(record.source_map.to_source_code_info(&record.lines));
            }
        }

        Ok((records, entries))
    }

    /// Option interpretation needs the options descriptors from
    /// `google/protobuf/descriptor.proto`; compile the bundled copy when no
    /// file in the set imported it.
    fn inject_descriptor_proto(
        &self,
        records: &mut Vec<FileRecord>,
        by_name: &HashMap<String, usize>,
        sink: &mut DiagnosticSink,
    ) {
        const DESCRIPTOR: &str = "google/protobuf/descriptor.proto";
        if by_name.contains_key(DESCRIPTOR) {
            return;
        }
        let source = include::standard_import(DESCRIPTOR)
            .expect("descriptor.proto is bundled")
            .to_owned();
        let mut record = parse_record(DESCRIPTOR, source, sink);
        record.synthetic = true;
        records.push(record);
    }

    /// Locates source text for `name`, trying the configured import paths,
    /// the accessor itself, inferred prefixes from the importing file, and
    /// finally the bundled standard imports.
    fn read_source(
        &self,
        name: &str,
        importer: Option<&str>,
    ) -> Result<Option<String>, Error> {
        if let Some(accessor) = &self.accessor {
            let mut candidates = Vec::new();
            for root in &self.import_paths {
                candidates.push(format!("{}/{}", root, name));
            }
            candidates.push(name.to_owned());
            if self.infer_import_paths {
                if let Some(importer) = importer {
                    let mut dir = importer;
                    while let Some(slash) = dir.rfind('/') {
                        dir = &dir[..slash];
                        candidates.push(format!("{}/{}", dir, name));
                    }
                }
            }

            for candidate in candidates {
                match accessor.access(&candidate) {
                    Ok(bytes) => return decode_source(name, bytes).map(Some),
                    Err(AccessorError::NotFound) => continue,
                    Err(AccessorError::Other(source)) => {
                        return Err(Error::new(ErrorKind::OpenFile {
                            name: candidate,
                            source,
                        }))
                    }
                }
            }
        }

        Ok(include::standard_import(name).map(str::to_owned))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Link,
    NoLink,
}

struct CallbackReporter {
    error: Option<Box<ErrorCallback>>,
    warning: Option<Box<WarningCallback>>,
}

impl Reporter for CallbackReporter {
    fn report_error(&mut self, diagnostic: &Diagnostic) -> Result<(), BoxError> {
        match &mut self.error {
            Some(callback) => callback(diagnostic),
            None => Ok(()),
        }
    }

    fn report_warning(&mut self, diagnostic: &Diagnostic) {
        if let Some(callback) = &mut self.warning {
            callback(diagnostic);
        }
    }
}

/// Strips a UTF-8 BOM and validates the encoding.
fn decode_source(name: &str, bytes: Vec<u8>) -> Result<String, Error> {
    match String::from_utf8(bytes) {
        Ok(source) => Ok(source
            .strip_prefix('\u{feff}')
            .map(str::to_owned)
            .unwrap_or(source)),
        Err(_) => Err(Error::new(ErrorKind::FileInvalidUtf8 {
            name: name.to_owned(),
        })),
    }
}

fn parse_record(name: &str, source: String, sink: &mut DiagnosticSink) -> FileRecord {
    let name: Arc<str> = name.into();
    let lines = LineIndex::new(name.clone(), &source);
    let file = parse::parse(&source, &lines, sink);
    let generated = generate::generate(&name, &file, &source, &lines, sink);
    FileRecord {
        name,
        source,
        lines,
        descriptor: generated.descriptor,
        syntax: generated.syntax,
        source_map: generated.source_map,
        synthetic: false,
        prebuilt: false,
        direct_deps: Vec::new(),
        visible: HashSet::new(),
        public_closure: HashSet::new(),
        used_files: HashSet::new(),
    }
}

struct ImportContext<'a> {
    lines: &'a LineIndex,
    source: &'a str,
    span: Range<usize>,
}

struct Loader<'a> {
    compiler: &'a Compiler,
    records: Vec<FileRecord>,
    by_name: HashMap<String, usize>,
    stack: Vec<String>,
}

impl<'a> Loader<'a> {
    /// Loads one file and its transitive imports, dependencies first.
    /// Returns `None` if the file could not be loaded; the cause has been
    /// reported (for imports) or is a hard error (for entry points).
    fn load(
        &mut self,
        name: &str,
        importer: Option<&ImportContext>,
        sink: &mut DiagnosticSink,
    ) -> Result<Option<usize>, Error> {
        if let Some(&index) = self.by_name.get(name) {
            return Ok(Some(index));
        }

        // With path inference, an entry loaded under a longer filesystem
        // name is renamed to match the import that refers to it. Several
        // registered names can share the suffix; take the shortest, then
        // the lexicographically smallest, so the same input set always
        // links against the same file.
        if self.compiler.infer_import_paths {
            let suffix = format!("/{}", name);
            let matched = self
                .by_name
                .iter()
                .filter(|(registered, _)| registered.ends_with(&suffix))
                .min_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
                .map(|(_, &index)| index);
            if let Some(index) = matched {
                self.rename(index, name);
                return Ok(Some(index));
            }
        }

        if let Some(position) = self.stack.iter().position(|loading| loading == name) {
            let mut cycle = self.stack[position..].join(" -> ");
            cycle.push_str(" -> ");
            cycle.push_str(name);
            if let Some(importer) = importer {
                sink.error(
                    importer.lines,
                    importer.source,
                    importer.span.clone(),
                    DiagnosticKind::ImportCycle { cycle },
                );
            }
            return Ok(None);
        }

        if let Some(lookup) = &self.compiler.lookup_import {
            if let Some(descriptor) = lookup(name) {
                return self.load_prebuilt(name, descriptor, sink).map(Some);
            }
        }

        let source = match self.compiler.read_source(name, self.stack.last().map(String::as_str))? {
            Some(source) => source,
            None => {
                if let Some(importer) = importer {
                    sink.error(
                        importer.lines,
                        importer.source,
                        importer.span.clone(),
                        DiagnosticKind::ImportNotFound {
                            name: name.to_owned(),
                        },
                    );
                }
                return Ok(None);
            }
        };

        self.stack.push(name.to_owned());
        let mut record = parse_record(name, source, sink);
        record.direct_deps = self.load_imports(&record, sink)?;
        self.stack.pop();

        let index = self.records.len();
        self.records.push(record);
        self.by_name.insert(name.to_owned(), index);
        Ok(Some(index))
    }

    fn load_imports(
        &mut self,
        record: &FileRecord,
        sink: &mut DiagnosticSink,
    ) -> Result<Vec<Option<usize>>, Error> {
        let mut direct_deps = Vec::with_capacity(record.descriptor.dependency.len());
        for (i, dependency) in record.descriptor.dependency.iter().enumerate() {
            let span = record
                .source_map
                .span_or_enclosing(&[tag::file::DEPENDENCY, i as i32]);
            let context = ImportContext {
                lines: &record.lines,
                source: &record.source,
                span,
            };
            direct_deps.push(self.load(dependency, Some(&context), sink)?);
            if sink.is_stopped() {
                break;
            }
        }
        Ok(direct_deps)
    }

    fn load_prebuilt(
        &mut self,
        name: &str,
        descriptor: FileDescriptorProto,
        sink: &mut DiagnosticSink,
    ) -> Result<usize, Error> {
        self.stack.push(name.to_owned());
        let syntax = match descriptor.syntax.as_deref() {
            Some("proto3") => Syntax::Proto3,
            _ => Syntax::Proto2,
        };
        let arc_name: Arc<str> = name.into();
        let mut record = FileRecord {
            lines: LineIndex::new(arc_name.clone(), ""),
            name: arc_name,
            source: String::new(),
            descriptor,
            syntax,
            source_map: generate::SourceMap::default(),
            synthetic: false,
            prebuilt: true,
            direct_deps: Vec::new(),
            visible: HashSet::new(),
            public_closure: HashSet::new(),
            used_files: HashSet::new(),
        };
        record.direct_deps = self.load_imports(&record, sink)?;
        self.stack.pop();

        let index = self.records.len();
        self.records.push(record);
        self.by_name.insert(name.to_owned(), index);
        Ok(index)
    }

    fn rename(&mut self, index: usize, name: &str) {
        let record = &mut self.records[index];
        let old: String = record.name.to_string();
        record.name = name.into();
        record.descriptor.name = Some(name.to_owned());
        record.lines = LineIndex::new(record.name.clone(), &record.source);
        self.by_name.remove(&old);
        self.by_name.insert(name.to_owned(), index);
    }
}
