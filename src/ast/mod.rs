//! The concrete syntax tree produced by [`parse`](crate::Compiler::parse_to_ast).
//!
//! Every token in the tree owns its exact source text together with the
//! trivia (whitespace and comments) separating it from the previous token,
//! so printing the tree reproduces the input byte-for-byte. Spans are byte
//! ranges into the original source.

mod comments;
mod print;

pub(crate) use self::comments::{split_trivia, TriviaComments};

use std::{fmt, ops::Range};

pub type Span = Range<usize>;

/// A single token: its raw text, the source text preceding it, and its span.
#[derive(Debug, Clone, PartialEq)]
pub struct Tok {
    pub raw: Box<str>,
    pub trivia: Box<str>,
    pub span: Span,
}

/// An identifier token. Contextual keywords are plain identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub tok: Tok,
}

impl Ident {
    pub fn value(&self) -> &str {
        &self.tok.raw
    }

    pub fn span(&self) -> Span {
        self.tok.span.clone()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// A non-negative integer literal. The value is held as unsigned 64-bit;
/// range checks against the target type are deferred to validation.
#[derive(Debug, Clone, PartialEq)]
pub struct IntLit {
    pub tok: Tok,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatLit {
    pub tok: Tok,
    pub value: f64,
}

/// One string literal token, decoded to raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct StrLit {
    pub tok: Tok,
    pub value: Vec<u8>,
}

/// One or more adjacent string literals; adjacent literals concatenate.
#[derive(Debug, Clone, PartialEq)]
pub struct StringValue {
    pub literals: Vec<StrLit>,
}

impl StringValue {
    pub fn value(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for lit in &self.literals {
            bytes.extend_from_slice(&lit.value);
        }
        bytes
    }

    pub fn as_utf8(&self) -> Option<String> {
        String::from_utf8(self.value()).ok()
    }

    pub fn span(&self) -> Span {
        let start = self.literals.first().map_or(0, |l| l.tok.span.start);
        let end = self.literals.last().map_or(0, |l| l.tok.span.end);
        start..end
    }
}

/// A possibly negated integer literal, used where the grammar admits
/// negative numbers (enum values, enum reserved ranges, field tags are
/// validated later).
#[derive(Debug, Clone, PartialEq)]
pub struct IntValue {
    pub minus: Option<Tok>,
    pub lit: IntLit,
}

impl IntValue {
    pub fn as_i64(&self) -> Option<i64> {
        if self.minus.is_some() {
            if self.lit.value == i64::MIN.unsigned_abs() {
                Some(i64::MIN)
            } else {
                i64::try_from(self.lit.value).ok().map(|v| -v)
            }
        } else {
            i64::try_from(self.lit.value).ok()
        }
    }

    pub fn is_negative(&self) -> bool {
        self.minus.is_some()
    }

    pub fn span(&self) -> Span {
        let start = self
            .minus
            .as_ref()
            .map_or(self.lit.tok.span.start, |m| m.span.start);
        start..self.lit.tok.span.end
    }
}

/// A dot-separated reference, optionally rooted with a leading dot.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub leading_dot: Option<Tok>,
    pub parts: Vec<Ident>,
    pub dots: Vec<Tok>,
}

impl TypeRef {
    pub fn span(&self) -> Span {
        let start = match &self.leading_dot {
            Some(dot) => dot.span.start,
            None => self.parts.first().map_or(0, |p| p.tok.span.start),
        };
        let end = self.parts.last().map_or(start, |p| p.tok.span.end);
        start..end
    }

    pub fn is_absolute(&self) -> bool {
        self.leading_dot.is_some()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.leading_dot.is_some() {
            f.write_str(".")?;
        }
        for (i, part) in self.parts.iter().enumerate() {
            if i != 0 {
                f.write_str(".")?;
            }
            f.write_str(part.value())?;
        }
        Ok(())
    }
}

/// Comment text attached to a declaration, bucketed the way
/// `source_code_info` wants it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comments {
    pub leading_detached: Vec<String>,
    pub leading: Option<String>,
    pub trailing: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub items: Vec<FileItem>,
    pub trailing_trivia: Box<str>,
    pub span: Span,
}

impl File {
    /// Prints the tree back to the original source text, byte-for-byte.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        print::print_file(self, &mut out);
        out
    }

    pub fn syntax(&self) -> Option<&SyntaxDecl> {
        self.items.iter().find_map(|item| match item {
            FileItem::Syntax(syntax) => Some(syntax),
            _ => None,
        })
    }

    pub fn package(&self) -> Option<&PackageDecl> {
        self.items.iter().find_map(|item| match item {
            FileItem::Package(package) => Some(package),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileItem {
    Syntax(SyntaxDecl),
    Package(PackageDecl),
    Import(ImportDecl),
    Option(OptionDecl),
    Message(Message),
    Enum(Enum),
    Service(Service),
    Extend(Extend),
    Empty(Tok),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxDecl {
    pub keyword: Tok,
    pub equals: Tok,
    pub value: StringValue,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageDecl {
    pub keyword: Tok,
    pub name: TypeRef,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Default,
    Public,
    Weak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub keyword: Tok,
    pub modifier: Option<(ImportKind, Tok)>,
    pub name: StringValue,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

impl ImportDecl {
    pub fn kind(&self) -> ImportKind {
        self.modifier
            .as_ref()
            .map_or(ImportKind::Default, |(kind, _)| *kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionDecl {
    pub keyword: Tok,
    pub body: OptionBody,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

/// The `name = value` part of an option, shared between `option` statements
/// and compact `[...]` option lists.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionBody {
    pub name: OptionName,
    pub equals: Tok,
    pub value: Value,
}

impl OptionBody {
    pub fn span(&self) -> Span {
        self.name.span().start..self.value.span().end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionName {
    pub parts: Vec<OptionNamePart>,
    pub dots: Vec<Tok>,
}

impl OptionName {
    pub fn span(&self) -> Span {
        let start = self.parts.first().map_or(0, |p| p.span().start);
        let end = self.parts.last().map_or(start, |p| p.span().end);
        start..end
    }

    /// `true` if the name is the single plain identifier `name`.
    pub fn is_plain(&self, name: &str) -> bool {
        matches!(&self.parts[..], [OptionNamePart::Plain(ident)] if ident.value() == name)
    }
}

impl fmt::Display for OptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i != 0 {
                f.write_str(".")?;
            }
            match part {
                OptionNamePart::Plain(ident) => write!(f, "{}", ident)?,
                OptionNamePart::Extension { name, .. } => write!(f, "({})", name)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionNamePart {
    Plain(Ident),
    Extension { open: Tok, name: TypeRef, close: Tok },
}

impl OptionNamePart {
    pub fn span(&self) -> Span {
        match self {
            OptionNamePart::Plain(ident) => ident.span(),
            OptionNamePart::Extension { open, close, .. } => open.span.start..close.span.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Ident(TypeRef),
    Int(IntLit),
    Float(FloatLit),
    String(StringValue),
    Signed {
        sign: Tok,
        negative: bool,
        value: Box<Value>,
    },
    Array(ArrayValue),
    Aggregate(Aggregate),
}

impl Value {
    pub fn span(&self) -> Span {
        match self {
            Value::Ident(ident) => ident.span(),
            Value::Int(int) => int.tok.span.clone(),
            Value::Float(float) => float.tok.span.clone(),
            Value::String(string) => string.span(),
            Value::Signed { sign, value, .. } => sign.span.start..value.span().end,
            Value::Array(array) => array.open.span.start..array.close.span.end,
            Value::Aggregate(aggregate) => {
                aggregate.open.span.start..aggregate.close.span.end
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub open: Tok,
    pub values: Vec<Value>,
    pub commas: Vec<Tok>,
    pub close: Tok,
}

/// A brace- or angle-delimited message literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub open: Tok,
    pub fields: Vec<AggregateField>,
    pub close: Tok,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateField {
    pub name: AggregateFieldName,
    pub colon: Option<Tok>,
    pub value: Value,
    pub separator: Option<Tok>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateFieldName {
    Plain(Ident),
    Extension {
        open: Tok,
        name: TypeRef,
        close: Tok,
    },
    AnyUrl {
        open: Tok,
        domain: TypeRef,
        slash: Tok,
        name: TypeRef,
        close: Tok,
    },
}

impl AggregateFieldName {
    pub fn span(&self) -> Span {
        match self {
            AggregateFieldName::Plain(ident) => ident.span(),
            AggregateFieldName::Extension { open, close, .. }
            | AggregateFieldName::AnyUrl { open, close, .. } => open.span.start..close.span.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub keyword: Tok,
    pub name: Ident,
    pub body: MessageBody,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody {
    pub open: Tok,
    pub items: Vec<MessageItem>,
    pub close: Tok,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageItem {
    Field(Field),
    Map(MapField),
    Group(Group),
    Oneof(Oneof),
    Message(Message),
    Enum(Enum),
    Extend(Extend),
    ExtensionRange(ExtensionRange),
    Reserved(Reserved),
    Option(OptionDecl),
    Empty(Tok),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Required => "required",
            Label::Repeated => "repeated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldLabel {
    pub label: Label,
    pub tok: Tok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    pub fn parse(name: &str) -> Option<ScalarType> {
        match name {
            "double" => Some(ScalarType::Double),
            "float" => Some(ScalarType::Float),
            "int32" => Some(ScalarType::Int32),
            "int64" => Some(ScalarType::Int64),
            "uint32" => Some(ScalarType::Uint32),
            "uint64" => Some(ScalarType::Uint64),
            "sint32" => Some(ScalarType::Sint32),
            "sint64" => Some(ScalarType::Sint64),
            "fixed32" => Some(ScalarType::Fixed32),
            "fixed64" => Some(ScalarType::Fixed64),
            "sfixed32" => Some(ScalarType::Sfixed32),
            "sfixed64" => Some(ScalarType::Sfixed64),
            "bool" => Some(ScalarType::Bool),
            "string" => Some(ScalarType::String),
            "bytes" => Some(ScalarType::Bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Scalar(ScalarType, Ident),
    Named(TypeRef),
}

impl FieldType {
    pub fn span(&self) -> Span {
        match self {
            FieldType::Scalar(_, ident) => ident.span(),
            FieldType::Named(name) => name.span(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: Option<FieldLabel>,
    pub ty: FieldType,
    pub name: Ident,
    pub equals: Tok,
    pub number: IntValue,
    pub options: Option<CompactOptions>,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompactOptions {
    pub open: Tok,
    pub options: Vec<OptionBody>,
    pub commas: Vec<Tok>,
    pub close: Tok,
}

impl CompactOptions {
    pub fn span(&self) -> Span {
        self.open.span.start..self.close.span.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapField {
    pub keyword: Tok,
    pub open_angle: Tok,
    pub key_ty: ScalarType,
    pub key_ident: Ident,
    pub comma: Tok,
    pub value_ty: FieldType,
    pub close_angle: Tok,
    pub name: Ident,
    pub equals: Tok,
    pub number: IntValue,
    pub options: Option<CompactOptions>,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: Option<FieldLabel>,
    pub keyword: Tok,
    pub name: Ident,
    pub equals: Tok,
    pub number: IntValue,
    pub body: MessageBody,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Oneof {
    pub keyword: Tok,
    pub name: Ident,
    pub open: Tok,
    pub items: Vec<OneofItem>,
    pub close: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OneofItem {
    Field(Field),
    Group(Group),
    Option(OptionDecl),
    Empty(Tok),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionRange {
    pub keyword: Tok,
    pub ranges: Vec<TagRange>,
    pub commas: Vec<Tok>,
    pub options: Option<CompactOptions>,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagRange {
    pub start: IntValue,
    pub to: Option<(Tok, RangeEnd)>,
}

impl TagRange {
    pub fn span(&self) -> Span {
        let end = match &self.to {
            Some((_, RangeEnd::Int(int))) => int.span().end,
            Some((_, RangeEnd::Max(tok))) => tok.span.end,
            None => self.start.span().end,
        };
        self.start.span().start..end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeEnd {
    Int(IntValue),
    Max(Tok),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reserved {
    pub keyword: Tok,
    pub kind: ReservedKind,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReservedKind {
    Ranges {
        ranges: Vec<TagRange>,
        commas: Vec<Tok>,
    },
    Names {
        names: Vec<StringValue>,
        commas: Vec<Tok>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enum {
    pub keyword: Tok,
    pub name: Ident,
    pub open: Tok,
    pub items: Vec<EnumItem>,
    pub close: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnumItem {
    Value(EnumValueDecl),
    Option(OptionDecl),
    Reserved(Reserved),
    Empty(Tok),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDecl {
    pub name: Ident,
    pub equals: Tok,
    pub number: IntValue,
    pub options: Option<CompactOptions>,
    pub semicolon: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub keyword: Tok,
    pub name: Ident,
    pub open: Tok,
    pub items: Vec<ServiceItem>,
    pub close: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceItem {
    Method(Method),
    Option(OptionDecl),
    Empty(Tok),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub keyword: Tok,
    pub name: Ident,
    pub input: MethodType,
    pub returns: Tok,
    pub output: MethodType,
    pub body: Option<MethodBody>,
    pub semicolon: Option<Tok>,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodType {
    pub open: Tok,
    pub stream: Option<Tok>,
    pub ty: TypeRef,
    pub close: Tok,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    pub open: Tok,
    pub items: Vec<MethodItem>,
    pub close: Tok,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodItem {
    Option(OptionDecl),
    Empty(Tok),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extend {
    pub keyword: Tok,
    pub extendee: TypeRef,
    pub open: Tok,
    pub items: Vec<ExtendItem>,
    pub close: Tok,
    pub comments: Comments,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtendItem {
    Field(Field),
    Group(Group),
    Empty(Tok),
}
