use std::{fmt, ops::Range, sync::Arc};

use miette::{LabeledSpan, NamedSource};

/// A boxed error returned from reporter callbacks to stop a compilation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error that may occur while compiling a set of `.proto` files.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error {
    kind: Box<ErrorKind>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorKind {
    #[error("the source contains errors")]
    InvalidSource { diagnostics: Vec<Diagnostic> },
    #[error(transparent)]
    Stopped { source: BoxError },
    #[error("file '{name}' was not found")]
    FileNotFound { name: String },
    #[error("error opening file '{name}': {source}")]
    OpenFile { name: String, source: BoxError },
    #[error("file '{name}' is not valid UTF-8")]
    FileInvalidUtf8 { name: String },
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Error {
            kind: Box::new(kind),
        }
    }

    pub(crate) fn invalid_source(diagnostics: Vec<Diagnostic>) -> Self {
        Error::new(ErrorKind::InvalidSource { diagnostics })
    }

    pub(crate) fn file_not_found(name: impl ToString) -> Self {
        Error::new(ErrorKind::FileNotFound {
            name: name.to_string(),
        })
    }

    /// Returns `true` if this error was produced by one or more diagnostics in
    /// the compiled sources, rather than by a failure to read them or by a
    /// reporter callback stopping the compilation.
    pub fn is_invalid_source(&self) -> bool {
        matches!(&*self.kind, ErrorKind::InvalidSource { .. })
    }

    /// Returns `true` if this error was caused by a missing file.
    pub fn is_file_not_found(&self) -> bool {
        matches!(&*self.kind, ErrorKind::FileNotFound { .. })
    }

    /// The diagnostics reported during the failed compilation, ordered by file
    /// and source position.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match &*self.kind {
            ErrorKind::InvalidSource { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// The first error diagnostic, if any.
    pub fn first(&self) -> Option<&Diagnostic> {
        self.diagnostics()
            .iter()
            .find(|d| d.severity == Severity::Error)
    }
}

impl miette::Diagnostic for Error {
    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn miette::Diagnostic> + 'a>> {
        match &*self.kind {
            ErrorKind::InvalidSource { diagnostics } => Some(Box::new(
                diagnostics.iter().map(|d| d as &dyn miette::Diagnostic),
            )),
            _ => None,
        }
    }
}

/// The severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The compilation cannot produce descriptors.
    Error,
    /// The compilation may still succeed.
    Warning,
}

/// A position in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Maps byte offsets in one source file to line and column numbers.
#[derive(Debug, Clone)]
pub(crate) struct LineIndex {
    file: Arc<str>,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(file: Arc<str>, source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex { file, line_starts }
    }

    pub(crate) fn file(&self) -> &Arc<str> {
        &self.file
    }

    pub(crate) fn location(&self, offset: usize) -> SourceLocation {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        SourceLocation {
            file: self.file.clone(),
            line: (line + 1) as u32,
            column: (offset - self.line_starts[line] + 1) as u32,
            offset,
        }
    }
}

/// A single error or warning produced during compilation, with its source
/// position.
#[derive(Debug, thiserror::Error)]
#[error("{location}: {kind}")]
pub struct Diagnostic {
    pub(crate) location: SourceLocation,
    pub(crate) span: Option<Range<usize>>,
    pub(crate) severity: Severity,
    pub(crate) kind: DiagnosticKind,
    pub(crate) source_code: Option<NamedSource<String>>,
}

impl Diagnostic {
    /// The severity of this diagnostic.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The position of the offending source text.
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// The rendered message, without the position prefix.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl miette::Diagnostic for Diagnostic {
    fn severity(&self) -> Option<miette::Severity> {
        match self.severity {
            Severity::Error => Some(miette::Severity::Error),
            Severity::Warning => Some(miette::Severity::Warning),
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_code
            .as_ref()
            .map(|s| s as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span.clone()?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(self.kind.label().to_owned()),
            span.start..span.end,
        ))))
    }
}

/// Every diagnostic the pipeline can produce. The `Display` strings are part
/// of the crate's compatibility contract and are asserted verbatim by tests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub(crate) enum DiagnosticKind {
    // Lexical errors.
    #[error("invalid string character")]
    InvalidCharacters,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid octal literal")]
    InvalidOctalLiteral,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid string escape")]
    InvalidStringEscape,
    #[error("string is not valid utf-8")]
    InvalidUtf8String,
    #[error("whitespace is required between an integer literal and an identifier")]
    NoSpaceBetweenIntAndIdent,
    #[error("integer literal is out of range")]
    IntegerOutOfRange,

    // Syntax errors.
    #[error("unexpected {found}, expecting {expected}")]
    UnexpectedToken { expected: String, found: String },
    #[error("unexpected EOF, expecting {expected}")]
    UnexpectedEof { expected: String },

    // Per-file validation.
    #[error("no syntax specified; defaulting to proto2 syntax")]
    NoSyntaxSpecified,
    #[error("syntax value must be \"proto2\" or \"proto3\"")]
    UnknownSyntax,
    #[error("only one syntax declaration is allowed per file")]
    DuplicateSyntax,
    #[error("syntax declaration must be the first statement in the file")]
    MisplacedSyntax,
    #[error("only one package declaration is allowed per file")]
    DuplicatePackage,
    #[error("oneofs must contain at least one field")]
    EmptyOneof,
    #[error("extend sections must define at least one extension")]
    EmptyExtend,
    #[error("invalid key type for map field")]
    InvalidMapKeyType,
    #[error("tag number {tag} must be greater than zero")]
    TagTooSmall { tag: i64 },
    #[error("tag number {tag} is higher than max allowed tag number ({max})", max = crate::MAX_TAG)]
    TagTooLarge { tag: u64 },
    #[error("tag number {tag} is in disallowed reserved range 19000-19999")]
    TagInReservedRange { tag: u64 },
    #[error("field has no label; proto2 requires explicit 'optional' or 'required' label")]
    MissingFieldLabel,
    #[error("label 'required' is not allowed in proto3")]
    Proto3RequiredField,
    #[error("field has label {label}, but it is not allowed here")]
    MisplacedFieldLabel { label: &'static str },
    #[error("groups are not allowed in proto3")]
    Proto3Group,
    #[error("extension ranges are not allowed in proto3")]
    Proto3ExtensionRange,
    #[error("default values are not allowed in proto3")]
    Proto3DefaultValue,
    #[error("extension fields cannot be required")]
    RequiredExtension,
    #[error("enums must define at least one value")]
    EmptyEnum,
    #[error("proto3 requires that the first value of an enum have the numeric value zero")]
    Proto3EnumFirstValueNotZero,
    #[error("allow_alias is set to true but no enum values share a number")]
    AllowAliasWithoutAliases,
    #[error("enum value \"{second}\" reuses number {number} of enum value \"{first}\"; set the allow_alias option to allow aliases")]
    DuplicateEnumNumber {
        number: i32,
        first: String,
        second: String,
    },
    #[error("range {second} overlaps {kind} range {first}")]
    RangeOverlap {
        kind: &'static str,
        first: String,
        second: String,
    },
    #[error("range start {start} is greater than range end {end}")]
    RangeStartAfterEnd { start: i64, end: i64 },
    #[error("field \"{name}\" uses reserved number {number}")]
    FieldReservedNumber { name: String, number: i32 },
    #[error("field \"{name}\" uses reserved name \"{name}\"")]
    FieldReservedName { name: String },
    #[error("enum value \"{name}\" uses reserved number {number}")]
    EnumValueReservedNumber { name: String, number: i32 },
    #[error("enum value \"{name}\" uses reserved name \"{name}\"")]
    EnumValueReservedName { name: String },
    #[error("field \"{second}\" reuses tag {tag} of field \"{first}\"")]
    DuplicateFieldTag {
        tag: i32,
        first: String,
        second: String,
    },
    #[error("field \"{name}\" uses number {number} which is in an extension range")]
    FieldExtensionRangeNumber { name: String, number: i32 },
    #[error("messages with message-set wire format must define at least one extension range")]
    MessageSetWithoutRanges,
    #[error("messages with message-set wire format cannot contain non-extension fields")]
    MessageSetWithFields,
    #[error("messages with message-set wire format cannot contain repeated extensions, only optional")]
    MessageSetRepeatedExtension,
    #[error("messages with message-set wire format cannot contain scalar extensions, only messages")]
    MessageSetScalarExtension,
    #[error("group names must start with a capital letter")]
    GroupNameNotCapitalized,
    #[error("duplicate import of \"{name}\"")]
    DuplicateImport { name: String },
    #[error("import \"{name}\" was not found")]
    ImportNotFound { name: String },
    #[error("map_entry option may not be set explicitly; use a map field instead")]
    ExplicitMapEntry,
    #[error("custom JSON names are not allowed on extension fields")]
    JsonNameOnExtension,
    #[error("default value cannot be set because field is repeated")]
    DefaultValueRepeated,
    #[error("default value cannot be set because field is a message")]
    DefaultValueMessage,
    #[error("invalid default value: {reason}")]
    InvalidDefaultValue { reason: String },
    #[error("{kind} JSON name \"{json_name}\" conflicts with {other_kind} JSON name of field {other}, defined at {defined_at}")]
    JsonNameConflict {
        kind: &'static str,
        json_name: String,
        other_kind: &'static str,
        other: String,
        defined_at: SourceLocation,
    },
    #[error("camel-case name \"{camel}\" conflicts with camel-case name of enum value {other}, defined at {defined_at}")]
    EnumValueCamelCaseConflict {
        camel: String,
        other: String,
        defined_at: SourceLocation,
    },

    // Link errors.
    #[error("symbol \"{name}\" already defined at {defined_at}")]
    SymbolAlreadyDefined {
        name: String,
        defined_at: SourceLocation,
    },
    #[error("extension with tag {tag} for message {extendee} already defined at {defined_at}")]
    ExtensionTagAlreadyDefined {
        tag: i32,
        extendee: String,
        defined_at: SourceLocation,
    },
    #[error("cycle found in imports: {cycle}")]
    ImportCycle { cycle: String },
    #[error("could not resolve type reference {name}")]
    UnresolvedTypeReference { name: String },
    #[error("invalid type: {name} is {actual}, not {expected}")]
    InvalidTypeReference {
        name: String,
        actual: &'static str,
        expected: &'static str,
    },
    #[error("{name} is a synthetic map entry and may not be referenced explicitly")]
    MapEntryReference { name: String },
    #[error("field \"{field}\" uses a proto2 enum type \"{enum_}\", which is not allowed in a proto3 message")]
    Proto2EnumInProto3 { field: String, enum_: String },
    #[error("extension \"{name}\": tag {tag} is not in any extension range of message {extendee}")]
    ExtensionTagNotInRange {
        name: String,
        tag: i32,
        extendee: String,
    },
    #[error("import \"{name}\" not used")]
    ImportNotUsed { name: String },
    #[error("extensions in proto3 are only allowed for defining options")]
    Proto3ExtendNonOption,

    // Option interpretation errors.
    #[error("field \"{name}\" of {message} does not exist")]
    OptionFieldNotFound { name: String, message: String },
    #[error("unknown extension {name}")]
    UnknownExtension { name: String },
    #[error("invalid extension: {name} is {actual}, not an extension")]
    InvalidExtension { name: String, actual: &'static str },
    #[error("extension {name} should extend {expected} but instead extends {actual}")]
    ExtensionWrongExtendee {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("option {name}: non-repeated option field already set")]
    OptionAlreadySet { name: String },
    #[error("oneof \"{oneof}\" already has field \"{field}\" set")]
    OneofAlreadySet { oneof: String, field: String },
    #[error("field \"{name}\" is not a message, and so cannot have sub-fields")]
    OptionFieldNotMessage { name: String },
    #[error("expected {expected} for field \"{name}\", found {actual}")]
    OptionValueTypeMismatch {
        name: String,
        expected: &'static str,
        actual: String,
    },
    #[error("value {value} is out of range for {expected}")]
    OptionValueOutOfRange { expected: &'static str, value: String },
    #[error("enum {enum_} has no value named {name}")]
    OptionUnknownEnumValue { enum_: String, name: String },
    #[error("some required fields missing: {fields}")]
    RequiredOptionFieldsMissing { fields: String },
    #[error("the field type must be 'google.protobuf.Any' to use Any expansion syntax")]
    InvalidTypeForAny,
}

impl DiagnosticKind {
    fn label(&self) -> &'static str {
        match self {
            DiagnosticKind::SymbolAlreadyDefined { .. }
            | DiagnosticKind::ExtensionTagAlreadyDefined { .. } => "defined again here",
            DiagnosticKind::OptionAlreadySet { .. } | DiagnosticKind::OneofAlreadySet { .. } => {
                "set again here"
            }
            _ => "found here",
        }
    }
}

/// A callback invoked for each diagnostic as it is produced.
///
/// Returning `Err` from [`report_error`](Reporter::report_error) stops the
/// compilation immediately; the pipeline returns the callback's error
/// verbatim. Warnings never stop the pipeline.
pub trait Reporter {
    fn report_error(&mut self, diagnostic: &Diagnostic) -> Result<(), BoxError>;

    fn report_warning(&mut self, _diagnostic: &Diagnostic) {}
}

/// Accumulates diagnostics for one compilation, forwarding each to the
/// configured reporter.
pub(crate) struct DiagnosticSink<'a> {
    reporter: Option<&'a mut dyn Reporter>,
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    stopped: Option<Error>,
}

impl<'a> DiagnosticSink<'a> {
    pub(crate) fn new(reporter: Option<&'a mut dyn Reporter>) -> Self {
        DiagnosticSink {
            reporter,
            diagnostics: Vec::new(),
            errors: 0,
            stopped: None,
        }
    }

    pub(crate) fn error(
        &mut self,
        lines: &LineIndex,
        source: &str,
        span: Range<usize>,
        kind: DiagnosticKind,
    ) {
        self.push(lines, source, span, Severity::Error, kind);
    }

    pub(crate) fn warning(
        &mut self,
        lines: &LineIndex,
        source: &str,
        span: Range<usize>,
        kind: DiagnosticKind,
    ) {
        self.push(lines, source, span, Severity::Warning, kind);
    }

    fn push(
        &mut self,
        lines: &LineIndex,
        source: &str,
        span: Range<usize>,
        severity: Severity,
        kind: DiagnosticKind,
    ) {
        if self.stopped.is_some() {
            return;
        }

        let diagnostic = Diagnostic {
            location: lines.location(span.start),
            span: Some(span),
            severity,
            kind,
            source_code: Some(NamedSource::new(lines.file().as_ref(), source.to_owned())),
        };

        match severity {
            Severity::Error => {
                self.errors += 1;
                if let Some(reporter) = self.reporter.as_deref_mut() {
                    if let Err(err) = reporter.report_error(&diagnostic) {
                        self.stopped = Some(Error::new(ErrorKind::Stopped { source: err }));
                    }
                }
            }
            Severity::Warning => {
                if let Some(reporter) = self.reporter.as_deref_mut() {
                    reporter.report_warning(&diagnostic);
                }
            }
        }

        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    /// Consumes the sink. Returns `Ok` if no error diagnostic was produced,
    /// the reporter's error if it stopped the pipeline, or the
    /// invalid-source sentinel wrapping every collected diagnostic.
    pub(crate) fn finish(self) -> Result<Vec<Diagnostic>, Error> {
        if let Some(stopped) = self.stopped {
            Err(stopped)
        } else if self.errors > 0 {
            Err(Error::invalid_source(self.diagnostics))
        } else {
            Ok(self.diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_locations() {
        let lines = LineIndex::new("test.proto".into(), "foo\nbar\n\nbaz");
        assert_eq!(lines.location(0).to_string(), "test.proto:1:1");
        assert_eq!(lines.location(2).to_string(), "test.proto:1:3");
        assert_eq!(lines.location(4).to_string(), "test.proto:2:1");
        assert_eq!(lines.location(8).to_string(), "test.proto:3:1");
        assert_eq!(lines.location(9).to_string(), "test.proto:4:1");
        assert_eq!(lines.location(11).to_string(), "test.proto:4:3");
    }

    #[test]
    fn sink_returns_invalid_source_sentinel() {
        let lines = LineIndex::new("test.proto".into(), "syntax");
        let mut sink = DiagnosticSink::new(None);
        sink.error(&lines, "syntax", 0..6, DiagnosticKind::UnknownSyntax);
        let err = sink.finish().unwrap_err();
        assert!(err.is_invalid_source());
        assert_eq!(
            err.first().unwrap().to_string(),
            "test.proto:1:1: syntax value must be \"proto2\" or \"proto3\""
        );
    }

    #[test]
    fn sink_stops_when_reporter_fails() {
        struct Stop;
        impl Reporter for Stop {
            fn report_error(&mut self, _: &Diagnostic) -> Result<(), BoxError> {
                Err("stop".into())
            }
        }

        let lines = LineIndex::new("test.proto".into(), "x");
        let mut reporter = Stop;
        let mut sink = DiagnosticSink::new(Some(&mut reporter));
        sink.error(&lines, "x", 0..1, DiagnosticKind::InvalidToken);
        assert!(sink.is_stopped());
        let err = sink.finish().unwrap_err();
        assert_eq!(err.to_string(), "stop");
    }
}
