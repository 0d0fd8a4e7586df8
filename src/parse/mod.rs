//! Recursive-descent parser from tokens to the concrete syntax tree.
//!
//! The parser accepts both proto2 and proto3 grammar; rules that depend on
//! the declared syntax are deferred to validation so that a single pass can
//! report as many problems as possible. Recovery happens at statement
//! boundaries: a failed declaration skips to the next `;` or matching `}`.

#[cfg(test)]
mod tests;

use logos::Span;

use crate::{
    ast::{self, split_trivia, Comments},
    error::{DiagnosticKind, DiagnosticSink, LineIndex},
    lex::{Int, Lexed, Token, Tokens},
};

pub(crate) fn parse(source: &str, lines: &LineIndex, sink: &mut DiagnosticSink) -> ast::File {
    let mut toks = Vec::new();
    let mut lexer = Tokens::new(source);
    while let Some(result) = lexer.next() {
        match result {
            Ok(lexed) => toks.push(lexed),
            Err((kind, span)) => sink.error(lines, source, span, kind),
        }
    }
    let trailing_trivia = lexer.pending_trivia();

    let mut parser = Parser {
        source,
        lines,
        sink,
        toks,
        pos: 0,
    };
    let items = parser.parse_file_items(trailing_trivia);
    ast::File {
        items,
        trailing_trivia: trailing_trivia.into(),
        span: 0..source.len(),
    }
}

struct Parser<'a, 'b, 'c> {
    source: &'a str,
    lines: &'b LineIndex,
    sink: &'b mut DiagnosticSink<'c>,
    toks: Vec<Lexed<'a>>,
    pos: usize,
}

impl<'a, 'b, 'c> Parser<'a, 'b, 'c> {
    fn peek(&self) -> Option<&Lexed<'a>> {
        self.toks.get(self.pos)
    }

    fn peek2(&self) -> Option<&Lexed<'a>> {
        self.toks.get(self.pos + 1)
    }

    fn at(&self, token: &Token) -> bool {
        matches!(self.peek(), Some(l) if l.token == *token)
    }

    fn at_ident(&self, value: &str) -> bool {
        matches!(self.peek(), Some(Lexed { token: Token::Ident(s), .. }) if *s == value)
    }

    fn bump(&mut self) -> ast::Tok {
        let span = self.toks[self.pos].span.clone();
        let trivia = self.toks[self.pos].trivia;
        self.pos += 1;
        ast::Tok {
            raw: self.source[span.clone()].into(),
            trivia: trivia.into(),
            span,
        }
    }

    fn error(&mut self, span: Span, kind: DiagnosticKind) {
        self.sink.error(self.lines, self.source, span, kind);
    }

    fn unexpected<T>(&mut self, expected: impl ToString) -> Result<T, ()> {
        match self.peek() {
            Some(lexed) => {
                let kind = DiagnosticKind::UnexpectedToken {
                    expected: expected.to_string(),
                    found: lexed.token.to_string(),
                };
                let span = lexed.span.clone();
                self.error(span, kind);
            }
            None => {
                let end = self.source.len();
                let kind = DiagnosticKind::UnexpectedEof {
                    expected: expected.to_string(),
                };
                self.error(end..end, kind);
            }
        }
        Err(())
    }

    fn expect(&mut self, token: Token<'a>, expected: &str) -> Result<ast::Tok, ()> {
        if self.at(&token) {
            Ok(self.bump())
        } else {
            self.unexpected(expected)
        }
    }

    /// Any identifier, including contextual keywords.
    fn ident(&mut self, expected: &str) -> Result<ast::Ident, ()> {
        match self.peek() {
            Some(Lexed {
                token: Token::Ident(_),
                ..
            }) => Ok(ast::Ident { tok: self.bump() }),
            _ => self.unexpected(expected),
        }
    }

    /// Skips to the next statement boundary: past the next `;` at brace depth
    /// zero, past a balanced `{...}` block, or up to (optionally past) an
    /// unmatched `}`.
    fn skip_statement(&mut self, consume_close_brace: bool) {
        let mut depth = 0usize;
        while let Some(lexed) = self.peek() {
            match &lexed.token {
                Token::Semicolon if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                Token::LeftBrace => {
                    depth += 1;
                    self.pos += 1;
                }
                Token::RightBrace => {
                    if depth == 0 {
                        if consume_close_brace {
                            self.pos += 1;
                        }
                        return;
                    }
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Splits the trivia of the upcoming token into the comments for the
    /// next declaration and the trailing comment of the previous one.
    fn decl_comments(&mut self) -> (Comments, Option<String>) {
        let trivia = self.peek().map_or("", |l| l.trivia);
        let split = split_trivia(trivia, self.pos > 0);
        (
            Comments {
                leading_detached: split.detached,
                leading: split.leading,
                trailing: None,
            },
            split.trailing_for_previous,
        )
    }

    fn parse_file_items(&mut self, trailing_trivia: &str) -> Vec<ast::FileItem> {
        let mut items: Vec<ast::FileItem> = Vec::new();
        while self.peek().is_some() {
            let (comments, trailing) = self.decl_comments();
            if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                set_file_item_trailing(prev, trailing);
            }
            let before = self.pos;
            match self.parse_file_item(comments) {
                Ok(item) => items.push(item),
                Err(()) => {
                    self.skip_statement(true);
                    if self.pos == before {
                        // Guarantee progress on a token no statement can start with.
                        self.pos += 1;
                    }
                }
            }
        }
        let split = split_trivia(trailing_trivia, true);
        if let (Some(trailing), Some(prev)) = (split.trailing_for_previous, items.last_mut()) {
            set_file_item_trailing(prev, trailing);
        }
        items
    }

    fn parse_file_item(&mut self, comments: Comments) -> Result<ast::FileItem, ()> {
        match self.peek() {
            Some(Lexed {
                token: Token::Ident(ident),
                ..
            }) => match *ident {
                "syntax" => self.parse_syntax(comments).map(ast::FileItem::Syntax),
                "package" => self.parse_package(comments).map(ast::FileItem::Package),
                "import" => self.parse_import(comments).map(ast::FileItem::Import),
                "option" => self.parse_option_decl(comments).map(ast::FileItem::Option),
                "message" => self.parse_message(comments).map(ast::FileItem::Message),
                "enum" => self.parse_enum(comments).map(ast::FileItem::Enum),
                "service" => self.parse_service(comments).map(ast::FileItem::Service),
                "extend" => self.parse_extend(comments).map(ast::FileItem::Extend),
                _ => self.unexpected("a top-level declaration"),
            },
            Some(Lexed {
                token: Token::Semicolon,
                ..
            }) => Ok(ast::FileItem::Empty(self.bump())),
            _ => self.unexpected("a top-level declaration"),
        }
    }

    fn parse_syntax(&mut self, comments: Comments) -> Result<ast::SyntaxDecl, ()> {
        let keyword = self.bump();
        let equals = self.expect(Token::Equals, "'='")?;
        let value = self.parse_string_value()?;
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = keyword.span.start..semicolon.span.end;
        Ok(ast::SyntaxDecl {
            keyword,
            equals,
            value,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_package(&mut self, comments: Comments) -> Result<ast::PackageDecl, ()> {
        let keyword = self.bump();
        let name = self.parse_type_ref(false)?;
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = keyword.span.start..semicolon.span.end;
        Ok(ast::PackageDecl {
            keyword,
            name,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_import(&mut self, comments: Comments) -> Result<ast::ImportDecl, ()> {
        let keyword = self.bump();
        let modifier = if self.at_ident("public") {
            Some((ast::ImportKind::Public, self.bump()))
        } else if self.at_ident("weak") {
            Some((ast::ImportKind::Weak, self.bump()))
        } else {
            None
        };
        let name = self.parse_string_value()?;
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = keyword.span.start..semicolon.span.end;
        Ok(ast::ImportDecl {
            keyword,
            modifier,
            name,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_string_value(&mut self) -> Result<ast::StringValue, ()> {
        let mut literals = Vec::new();
        loop {
            match self.peek() {
                Some(Lexed {
                    token: Token::StringLiteral(value),
                    ..
                }) => {
                    let value = value.clone();
                    literals.push(ast::StrLit {
                        tok: self.bump(),
                        value,
                    });
                }
                _ if literals.is_empty() => return self.unexpected("a string literal"),
                _ => return Ok(ast::StringValue { literals }),
            }
        }
    }

    fn parse_type_ref(&mut self, allow_leading_dot: bool) -> Result<ast::TypeRef, ()> {
        let leading_dot = if allow_leading_dot && self.at(&Token::Dot) {
            Some(self.bump())
        } else {
            None
        };
        let mut parts = vec![self.ident("an identifier")?];
        let mut dots = Vec::new();
        while self.at(&Token::Dot) {
            dots.push(self.bump());
            parts.push(self.ident("an identifier")?);
        }
        Ok(ast::TypeRef {
            leading_dot,
            parts,
            dots,
        })
    }

    fn parse_option_decl(&mut self, comments: Comments) -> Result<ast::OptionDecl, ()> {
        let keyword = self.bump();
        let body = self.parse_option_body()?;
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = keyword.span.start..semicolon.span.end;
        Ok(ast::OptionDecl {
            keyword,
            body,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_option_body(&mut self) -> Result<ast::OptionBody, ()> {
        let name = self.parse_option_name()?;
        let equals = self.expect(Token::Equals, "'='")?;
        let value = self.parse_value()?;
        Ok(ast::OptionBody {
            name,
            equals,
            value,
        })
    }

    fn parse_option_name(&mut self) -> Result<ast::OptionName, ()> {
        let mut parts = vec![self.parse_option_name_part()?];
        let mut dots = Vec::new();
        while self.at(&Token::Dot) {
            dots.push(self.bump());
            parts.push(self.parse_option_name_part()?);
        }
        Ok(ast::OptionName { parts, dots })
    }

    fn parse_option_name_part(&mut self) -> Result<ast::OptionNamePart, ()> {
        if self.at(&Token::LeftParen) {
            let open = self.bump();
            let name = self.parse_type_ref(true)?;
            let close = self.expect(Token::RightParen, "')'")?;
            Ok(ast::OptionNamePart::Extension { open, name, close })
        } else {
            Ok(ast::OptionNamePart::Plain(self.ident("an option name")?))
        }
    }

    fn parse_value(&mut self) -> Result<ast::Value, ()> {
        match self.peek() {
            Some(Lexed {
                token: Token::StringLiteral(_),
                ..
            }) => Ok(ast::Value::String(self.parse_string_value()?)),
            Some(Lexed {
                token: Token::IntLiteral(_),
                ..
            }) => Ok(ast::Value::Int(self.parse_int_lit()?)),
            Some(Lexed {
                token: Token::FloatLiteral(value),
                ..
            }) => {
                let value = *value;
                Ok(ast::Value::Float(ast::FloatLit {
                    tok: self.bump(),
                    value,
                }))
            }
            Some(Lexed {
                token: Token::Minus,
                ..
            }) => {
                let sign = self.bump();
                let value = self.parse_signed_operand()?;
                Ok(ast::Value::Signed {
                    sign,
                    negative: true,
                    value: Box::new(value),
                })
            }
            Some(Lexed {
                token: Token::Plus, ..
            }) => {
                let sign = self.bump();
                let value = self.parse_signed_operand()?;
                Ok(ast::Value::Signed {
                    sign,
                    negative: false,
                    value: Box::new(value),
                })
            }
            Some(Lexed {
                token: Token::Ident(_),
                ..
            }) => Ok(ast::Value::Ident(self.parse_type_ref(false)?)),
            Some(Lexed {
                token: Token::LeftBrace | Token::LeftAngleBracket,
                ..
            }) => Ok(ast::Value::Aggregate(self.parse_aggregate()?)),
            Some(Lexed {
                token: Token::LeftBracket,
                ..
            }) => Ok(ast::Value::Array(self.parse_array_value()?)),
            _ => self.unexpected("a value"),
        }
    }

    fn parse_signed_operand(&mut self) -> Result<ast::Value, ()> {
        match self.peek() {
            Some(Lexed {
                token: Token::IntLiteral(_),
                ..
            }) => Ok(ast::Value::Int(self.parse_int_lit()?)),
            Some(Lexed {
                token: Token::FloatLiteral(value),
                ..
            }) => {
                let value = *value;
                Ok(ast::Value::Float(ast::FloatLit {
                    tok: self.bump(),
                    value,
                }))
            }
            Some(Lexed {
                token: Token::Ident(_),
                ..
            }) => Ok(ast::Value::Ident(ast::TypeRef {
                leading_dot: None,
                parts: vec![ast::Ident { tok: self.bump() }],
                dots: Vec::new(),
            })),
            _ => self.unexpected("a number"),
        }
    }

    fn parse_int_lit(&mut self) -> Result<ast::IntLit, ()> {
        match self.peek() {
            Some(Lexed {
                token: Token::IntLiteral(int),
                span,
                ..
            }) => {
                let span = span.clone();
                let value = match int.as_u64() {
                    Some(value) => value,
                    None => {
                        self.error(span, DiagnosticKind::IntegerOutOfRange);
                        0
                    }
                };
                Ok(ast::IntLit {
                    tok: self.bump(),
                    value,
                })
            }
            _ => self.unexpected("an integer"),
        }
    }

    fn parse_int_value(&mut self) -> Result<ast::IntValue, ()> {
        let minus = if self.at(&Token::Minus) {
            Some(self.bump())
        } else {
            None
        };
        let lit = self.parse_int_lit()?;
        Ok(ast::IntValue { minus, lit })
    }

    fn parse_array_value(&mut self) -> Result<ast::ArrayValue, ()> {
        let open = self.bump();
        let mut values = Vec::new();
        let mut commas = Vec::new();
        if !self.at(&Token::RightBracket) {
            values.push(self.parse_value()?);
            while self.at(&Token::Comma) {
                commas.push(self.bump());
                values.push(self.parse_value()?);
            }
        }
        let close = self.expect(Token::RightBracket, "',' or ']'")?;
        Ok(ast::ArrayValue {
            open,
            values,
            commas,
            close,
        })
    }

    fn parse_aggregate(&mut self) -> Result<ast::Aggregate, ()> {
        let (open, terminator, expected) = match self.peek() {
            Some(Lexed {
                token: Token::LeftBrace,
                ..
            }) => (self.bump(), Token::RightBrace, "'}' or a field name"),
            Some(Lexed {
                token: Token::LeftAngleBracket,
                ..
            }) => (self.bump(), Token::RightAngleBracket, "'>' or a field name"),
            _ => return self.unexpected("'{' or '<'"),
        };

        let mut fields = Vec::new();
        loop {
            if self.at(&terminator) {
                let close = self.bump();
                return Ok(ast::Aggregate {
                    open,
                    fields,
                    close,
                });
            }
            match self.peek() {
                Some(Lexed {
                    token: Token::Ident(_) | Token::LeftBracket,
                    ..
                }) => fields.push(self.parse_aggregate_field()?),
                _ => return self.unexpected(expected),
            }
        }
    }

    fn parse_aggregate_field(&mut self) -> Result<ast::AggregateField, ()> {
        let name = if self.at(&Token::LeftBracket) {
            let open = self.bump();
            let name_or_domain = self.parse_type_ref(false)?;
            if self.at(&Token::ForwardSlash) {
                let slash = self.bump();
                let name = self.parse_type_ref(false)?;
                let close = self.expect(Token::RightBracket, "']'")?;
                ast::AggregateFieldName::AnyUrl {
                    open,
                    domain: name_or_domain,
                    slash,
                    name,
                    close,
                }
            } else {
                let close = self.expect(Token::RightBracket, "']' or '/'")?;
                ast::AggregateFieldName::Extension {
                    open,
                    name: name_or_domain,
                    close,
                }
            }
        } else {
            ast::AggregateFieldName::Plain(self.ident("a field name")?)
        };

        let colon = if self.at(&Token::Colon) {
            Some(self.bump())
        } else {
            match self.peek() {
                Some(Lexed {
                    token: Token::LeftBrace | Token::LeftAngleBracket,
                    ..
                }) => None,
                _ => return self.unexpected("':' or a message value"),
            }
        };

        let value = self.parse_value()?;

        let separator = match self.peek() {
            Some(Lexed {
                token: Token::Comma | Token::Semicolon,
                ..
            }) => Some(self.bump()),
            _ => None,
        };

        Ok(ast::AggregateField {
            name,
            colon,
            value,
            separator,
        })
    }

    fn parse_compact_options(&mut self) -> Result<ast::CompactOptions, ()> {
        let open = self.bump();
        let mut options = vec![self.parse_option_body()?];
        let mut commas = Vec::new();
        while self.at(&Token::Comma) {
            commas.push(self.bump());
            options.push(self.parse_option_body()?);
        }
        let close = self.expect(Token::RightBracket, "',' or ']'")?;
        Ok(ast::CompactOptions {
            open,
            options,
            commas,
            close,
        })
    }

    fn parse_message(&mut self, comments: Comments) -> Result<ast::Message, ()> {
        let keyword = self.bump();
        let name = self.ident("a message name")?;
        let body = self.parse_message_body()?;
        let span = keyword.span.start..body.close.span.end;
        Ok(ast::Message {
            keyword,
            name,
            body,
            comments,
            span,
        })
    }

    fn parse_message_body(&mut self) -> Result<ast::MessageBody, ()> {
        let open = self.expect(Token::LeftBrace, "'{'")?;
        let mut items: Vec<ast::MessageItem> = Vec::new();
        loop {
            if self.at(&Token::RightBrace) || self.peek().is_none() {
                let (_, trailing) = self.decl_comments();
                if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                    set_message_item_trailing(prev, trailing);
                }
                let close = self.expect(Token::RightBrace, "'}'")?;
                return Ok(ast::MessageBody { open, items, close });
            }
            let (comments, trailing) = self.decl_comments();
            if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                set_message_item_trailing(prev, trailing);
            }
            match self.parse_message_item(comments) {
                Ok(item) => items.push(item),
                Err(()) => self.skip_statement(false),
            }
        }
    }

    fn parse_message_item(&mut self, comments: Comments) -> Result<ast::MessageItem, ()> {
        match self.peek() {
            Some(Lexed {
                token: Token::Semicolon,
                ..
            }) => Ok(ast::MessageItem::Empty(self.bump())),
            Some(Lexed {
                token: Token::Ident(ident),
                ..
            }) => match *ident {
                "message" => self.parse_message(comments).map(ast::MessageItem::Message),
                "enum" => self.parse_enum(comments).map(ast::MessageItem::Enum),
                "extend" => self.parse_extend(comments).map(ast::MessageItem::Extend),
                "oneof" => self.parse_oneof(comments).map(ast::MessageItem::Oneof),
                "option" => self.parse_option_decl(comments).map(ast::MessageItem::Option),
                "extensions" => self
                    .parse_extension_range(comments)
                    .map(ast::MessageItem::ExtensionRange),
                "reserved" => self.parse_reserved(comments).map(ast::MessageItem::Reserved),
                "map" if matches!(
                    self.peek2(),
                    Some(Lexed {
                        token: Token::LeftAngleBracket,
                        ..
                    })
                ) =>
                {
                    self.parse_map_field(comments).map(ast::MessageItem::Map)
                }
                "optional" | "required" | "repeated" => {
                    let label = self.parse_label();
                    if self.at_ident("group") {
                        self.parse_group(label, comments).map(ast::MessageItem::Group)
                    } else {
                        self.parse_field(label, comments).map(ast::MessageItem::Field)
                    }
                }
                "group" => self.parse_group(None, comments).map(ast::MessageItem::Group),
                _ => self.parse_field(None, comments).map(ast::MessageItem::Field),
            },
            Some(Lexed {
                token: Token::Dot, ..
            }) => self.parse_field(None, comments).map(ast::MessageItem::Field),
            _ => self.unexpected("a message element"),
        }
    }

    fn parse_label(&mut self) -> Option<ast::FieldLabel> {
        let label = match self.peek() {
            Some(Lexed {
                token: Token::Ident("optional"),
                ..
            }) => ast::Label::Optional,
            Some(Lexed {
                token: Token::Ident("required"),
                ..
            }) => ast::Label::Required,
            Some(Lexed {
                token: Token::Ident("repeated"),
                ..
            }) => ast::Label::Repeated,
            _ => return None,
        };
        Some(ast::FieldLabel {
            label,
            tok: self.bump(),
        })
    }

    fn parse_field_type(&mut self) -> Result<ast::FieldType, ()> {
        match self.peek() {
            Some(Lexed {
                token: Token::Ident(ident),
                ..
            }) => {
                let followed_by_dot = matches!(
                    self.peek2(),
                    Some(Lexed {
                        token: Token::Dot,
                        ..
                    })
                );
                match ast::ScalarType::parse(ident) {
                    Some(scalar) if !followed_by_dot => {
                        Ok(ast::FieldType::Scalar(scalar, ast::Ident { tok: self.bump() }))
                    }
                    _ => Ok(ast::FieldType::Named(self.parse_type_ref(false)?)),
                }
            }
            Some(Lexed {
                token: Token::Dot, ..
            }) => Ok(ast::FieldType::Named(self.parse_type_ref(true)?)),
            _ => self.unexpected("a type name"),
        }
    }

    fn parse_field(
        &mut self,
        label: Option<ast::FieldLabel>,
        comments: Comments,
    ) -> Result<ast::Field, ()> {
        let ty = self.parse_field_type()?;
        let name = self.ident("a field name")?;
        let equals = self.expect(Token::Equals, "'='")?;
        let number = self.parse_int_value()?;
        let options = if self.at(&Token::LeftBracket) {
            Some(self.parse_compact_options()?)
        } else {
            None
        };
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let start = label
            .as_ref()
            .map_or(ty.span().start, |l| l.tok.span.start);
        let span = start..semicolon.span.end;
        Ok(ast::Field {
            label,
            ty,
            name,
            equals,
            number,
            options,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_map_field(&mut self, comments: Comments) -> Result<ast::MapField, ()> {
        let keyword = self.bump();
        let open_angle = self.expect(Token::LeftAngleBracket, "'<'")?;
        let key_ident = self.ident("a scalar type")?;
        let key_ty = match ast::ScalarType::parse(key_ident.value()) {
            Some(ty) => ty,
            None => {
                let span = key_ident.span();
                let kind = DiagnosticKind::UnexpectedToken {
                    expected: "a scalar type".to_owned(),
                    found: format!("'{}'", key_ident.value()),
                };
                self.error(span, kind);
                return Err(());
            }
        };
        let comma = self.expect(Token::Comma, "','")?;
        let value_ty = self.parse_field_type()?;
        let close_angle = self.expect(Token::RightAngleBracket, "'>'")?;
        let name = self.ident("a field name")?;
        let equals = self.expect(Token::Equals, "'='")?;
        let number = self.parse_int_value()?;
        let options = if self.at(&Token::LeftBracket) {
            Some(self.parse_compact_options()?)
        } else {
            None
        };
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = keyword.span.start..semicolon.span.end;
        Ok(ast::MapField {
            keyword,
            open_angle,
            key_ty,
            key_ident,
            comma,
            value_ty,
            close_angle,
            name,
            equals,
            number,
            options,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_group(
        &mut self,
        label: Option<ast::FieldLabel>,
        comments: Comments,
    ) -> Result<ast::Group, ()> {
        let keyword = self.bump();
        let name = self.ident("a group name")?;
        let equals = self.expect(Token::Equals, "'='")?;
        let number = self.parse_int_value()?;
        let body = self.parse_message_body()?;
        let start = label
            .as_ref()
            .map_or(keyword.span.start, |l| l.tok.span.start);
        let span = start..body.close.span.end;
        Ok(ast::Group {
            label,
            keyword,
            name,
            equals,
            number,
            body,
            comments,
            span,
        })
    }

    fn parse_oneof(&mut self, comments: Comments) -> Result<ast::Oneof, ()> {
        let keyword = self.bump();
        let name = self.ident("a oneof name")?;
        let open = self.expect(Token::LeftBrace, "'{'")?;
        let mut items: Vec<ast::OneofItem> = Vec::new();
        loop {
            if self.at(&Token::RightBrace) || self.peek().is_none() {
                let (_, trailing) = self.decl_comments();
                if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                    set_oneof_item_trailing(prev, trailing);
                }
                let close = self.expect(Token::RightBrace, "'}'")?;
                let span = keyword.span.start..close.span.end;
                return Ok(ast::Oneof {
                    keyword,
                    name,
                    open,
                    items,
                    close,
                    comments,
                    span,
                });
            }
            let (item_comments, trailing) = self.decl_comments();
            if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                set_oneof_item_trailing(prev, trailing);
            }
            let result = match self.peek() {
                Some(Lexed {
                    token: Token::Semicolon,
                    ..
                }) => Ok(ast::OneofItem::Empty(self.bump())),
                Some(Lexed {
                    token: Token::Ident("option"),
                    ..
                }) => self.parse_option_decl(item_comments).map(ast::OneofItem::Option),
                Some(Lexed {
                    token: Token::Ident("optional" | "required" | "repeated"),
                    ..
                }) if matches!(
                    self.peek2(),
                    Some(Lexed {
                        token: Token::Ident(_) | Token::Dot,
                        ..
                    })
                ) =>
                {
                    // A label here is illegal but easy to recover from.
                    let label = self.parse_label().expect("label token");
                    let kind = DiagnosticKind::MisplacedFieldLabel {
                        label: label.label.as_str(),
                    };
                    self.error(label.tok.span.clone(), kind);
                    if self.at_ident("group") {
                        self.parse_group(None, item_comments).map(ast::OneofItem::Group)
                    } else {
                        self.parse_field(None, item_comments).map(ast::OneofItem::Field)
                    }
                }
                Some(Lexed {
                    token: Token::Ident("group"),
                    ..
                }) => self.parse_group(None, item_comments).map(ast::OneofItem::Group),
                _ => self.parse_field(None, item_comments).map(ast::OneofItem::Field),
            };
            match result {
                Ok(item) => items.push(item),
                Err(()) => self.skip_statement(false),
            }
        }
    }

    fn parse_extension_range(&mut self, comments: Comments) -> Result<ast::ExtensionRange, ()> {
        let keyword = self.bump();
        let mut ranges = vec![self.parse_tag_range()?];
        let mut commas = Vec::new();
        while self.at(&Token::Comma) {
            commas.push(self.bump());
            ranges.push(self.parse_tag_range()?);
        }
        let options = if self.at(&Token::LeftBracket) {
            Some(self.parse_compact_options()?)
        } else {
            None
        };
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = keyword.span.start..semicolon.span.end;
        Ok(ast::ExtensionRange {
            keyword,
            ranges,
            commas,
            options,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_tag_range(&mut self) -> Result<ast::TagRange, ()> {
        let start = self.parse_int_value()?;
        let to = if self.at_ident("to") {
            let to = self.bump();
            let end = if self.at_ident("max") {
                ast::RangeEnd::Max(self.bump())
            } else {
                ast::RangeEnd::Int(self.parse_int_value()?)
            };
            Some((to, end))
        } else {
            None
        };
        Ok(ast::TagRange { start, to })
    }

    fn parse_reserved(&mut self, comments: Comments) -> Result<ast::Reserved, ()> {
        let keyword = self.bump();
        let kind = match self.peek() {
            Some(Lexed {
                token: Token::StringLiteral(_),
                ..
            }) => {
                let mut names = vec![self.parse_string_value()?];
                let mut commas = Vec::new();
                while self.at(&Token::Comma) {
                    commas.push(self.bump());
                    names.push(self.parse_string_value()?);
                }
                ast::ReservedKind::Names { names, commas }
            }
            _ => {
                let mut ranges = vec![self.parse_tag_range()?];
                let mut commas = Vec::new();
                while self.at(&Token::Comma) {
                    commas.push(self.bump());
                    ranges.push(self.parse_tag_range()?);
                }
                ast::ReservedKind::Ranges { ranges, commas }
            }
        };
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = keyword.span.start..semicolon.span.end;
        Ok(ast::Reserved {
            keyword,
            kind,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_enum(&mut self, comments: Comments) -> Result<ast::Enum, ()> {
        let keyword = self.bump();
        let name = self.ident("an enum name")?;
        let open = self.expect(Token::LeftBrace, "'{'")?;
        let mut items: Vec<ast::EnumItem> = Vec::new();
        loop {
            if self.at(&Token::RightBrace) || self.peek().is_none() {
                let (_, trailing) = self.decl_comments();
                if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                    set_enum_item_trailing(prev, trailing);
                }
                let close = self.expect(Token::RightBrace, "'}'")?;
                let span = keyword.span.start..close.span.end;
                return Ok(ast::Enum {
                    keyword,
                    name,
                    open,
                    items,
                    close,
                    comments,
                    span,
                });
            }
            let (item_comments, trailing) = self.decl_comments();
            if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                set_enum_item_trailing(prev, trailing);
            }
            let result = match self.peek() {
                Some(Lexed {
                    token: Token::Semicolon,
                    ..
                }) => Ok(ast::EnumItem::Empty(self.bump())),
                Some(Lexed {
                    token: Token::Ident("option"),
                    ..
                }) => self.parse_option_decl(item_comments).map(ast::EnumItem::Option),
                Some(Lexed {
                    token: Token::Ident("reserved"),
                    ..
                }) => self.parse_reserved(item_comments).map(ast::EnumItem::Reserved),
                _ => self.parse_enum_value(item_comments).map(ast::EnumItem::Value),
            };
            match result {
                Ok(item) => items.push(item),
                Err(()) => self.skip_statement(false),
            }
        }
    }

    fn parse_enum_value(&mut self, comments: Comments) -> Result<ast::EnumValueDecl, ()> {
        let name = self.ident("an enum value name")?;
        let equals = self.expect(Token::Equals, "'='")?;
        let number = self.parse_int_value()?;
        let options = if self.at(&Token::LeftBracket) {
            Some(self.parse_compact_options()?)
        } else {
            None
        };
        let semicolon = self.expect(Token::Semicolon, "';'")?;
        let span = name.tok.span.start..semicolon.span.end;
        Ok(ast::EnumValueDecl {
            name,
            equals,
            number,
            options,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_service(&mut self, comments: Comments) -> Result<ast::Service, ()> {
        let keyword = self.bump();
        let name = self.ident("a service name")?;
        let open = self.expect(Token::LeftBrace, "'{'")?;
        let mut items: Vec<ast::ServiceItem> = Vec::new();
        loop {
            if self.at(&Token::RightBrace) || self.peek().is_none() {
                let (_, trailing) = self.decl_comments();
                if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                    set_service_item_trailing(prev, trailing);
                }
                let close = self.expect(Token::RightBrace, "'}'")?;
                let span = keyword.span.start..close.span.end;
                return Ok(ast::Service {
                    keyword,
                    name,
                    open,
                    items,
                    close,
                    comments,
                    span,
                });
            }
            let (item_comments, trailing) = self.decl_comments();
            if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                set_service_item_trailing(prev, trailing);
            }
            let result = match self.peek() {
                Some(Lexed {
                    token: Token::Semicolon,
                    ..
                }) => Ok(ast::ServiceItem::Empty(self.bump())),
                Some(Lexed {
                    token: Token::Ident("option"),
                    ..
                }) => self
                    .parse_option_decl(item_comments)
                    .map(ast::ServiceItem::Option),
                Some(Lexed {
                    token: Token::Ident("rpc"),
                    ..
                }) => self.parse_method(item_comments).map(ast::ServiceItem::Method),
                _ => self.unexpected("a service element"),
            };
            match result {
                Ok(item) => items.push(item),
                Err(()) => self.skip_statement(false),
            }
        }
    }

    fn parse_method(&mut self, comments: Comments) -> Result<ast::Method, ()> {
        let keyword = self.bump();
        let name = self.ident("a method name")?;
        let input = self.parse_method_type()?;
        let returns = match self.peek() {
            Some(Lexed {
                token: Token::Ident("returns"),
                ..
            }) => self.bump(),
            _ => return self.unexpected("'returns'"),
        };
        let output = self.parse_method_type()?;

        let (body, semicolon) = match self.peek() {
            Some(Lexed {
                token: Token::Semicolon,
                ..
            }) => (None, Some(self.bump())),
            Some(Lexed {
                token: Token::LeftBrace,
                ..
            }) => {
                let open = self.bump();
                let mut items: Vec<ast::MethodItem> = Vec::new();
                let close = loop {
                    if self.at(&Token::RightBrace) || self.peek().is_none() {
                        break self.expect(Token::RightBrace, "'}'")?;
                    }
                    let (item_comments, _) = self.decl_comments();
                    let result = match self.peek() {
                        Some(Lexed {
                            token: Token::Semicolon,
                            ..
                        }) => Ok(ast::MethodItem::Empty(self.bump())),
                        Some(Lexed {
                            token: Token::Ident("option"),
                            ..
                        }) => self
                            .parse_option_decl(item_comments)
                            .map(ast::MethodItem::Option),
                        _ => self.unexpected("'option', ';' or '}'"),
                    };
                    match result {
                        Ok(item) => items.push(item),
                        Err(()) => self.skip_statement(false),
                    }
                };
                (Some(ast::MethodBody { open, items, close }), None)
            }
            _ => return self.unexpected("';' or '{'"),
        };

        let end = match (&body, &semicolon) {
            (Some(body), _) => body.close.span.end,
            (None, Some(semicolon)) => semicolon.span.end,
            (None, None) => output.close.span.end,
        };
        let span = keyword.span.start..end;
        Ok(ast::Method {
            keyword,
            name,
            input,
            returns,
            output,
            body,
            semicolon,
            comments,
            span,
        })
    }

    fn parse_method_type(&mut self) -> Result<ast::MethodType, ()> {
        let open = self.expect(Token::LeftParen, "'('")?;
        // 'stream' is contextual: it is the streaming marker only when a
        // type name follows.
        let stream = if self.at_ident("stream")
            && matches!(
                self.peek2(),
                Some(Lexed {
                    token: Token::Ident(_) | Token::Dot,
                    ..
                })
            ) {
            Some(self.bump())
        } else {
            None
        };
        let ty = self.parse_type_ref(true)?;
        let close = self.expect(Token::RightParen, "')'")?;
        Ok(ast::MethodType {
            open,
            stream,
            ty,
            close,
        })
    }

    fn parse_extend(&mut self, comments: Comments) -> Result<ast::Extend, ()> {
        let keyword = self.bump();
        let extendee = self.parse_type_ref(true)?;
        let open = self.expect(Token::LeftBrace, "'{'")?;
        let mut items: Vec<ast::ExtendItem> = Vec::new();
        loop {
            if self.at(&Token::RightBrace) || self.peek().is_none() {
                let (_, trailing) = self.decl_comments();
                if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                    set_extend_item_trailing(prev, trailing);
                }
                let close = self.expect(Token::RightBrace, "'}'")?;
                let span = keyword.span.start..close.span.end;
                return Ok(ast::Extend {
                    keyword,
                    extendee,
                    open,
                    items,
                    close,
                    comments,
                    span,
                });
            }
            let (item_comments, trailing) = self.decl_comments();
            if let (Some(trailing), Some(prev)) = (trailing, items.last_mut()) {
                set_extend_item_trailing(prev, trailing);
            }
            let result = match self.peek() {
                Some(Lexed {
                    token: Token::Semicolon,
                    ..
                }) => Ok(ast::ExtendItem::Empty(self.bump())),
                Some(Lexed {
                    token: Token::Ident("optional" | "required" | "repeated"),
                    ..
                }) => {
                    let label = self.parse_label();
                    if self.at_ident("group") {
                        self.parse_group(label, item_comments).map(ast::ExtendItem::Group)
                    } else {
                        self.parse_field(label, item_comments).map(ast::ExtendItem::Field)
                    }
                }
                Some(Lexed {
                    token: Token::Ident("group"),
                    ..
                }) => self.parse_group(None, item_comments).map(ast::ExtendItem::Group),
                _ => self.parse_field(None, item_comments).map(ast::ExtendItem::Field),
            };
            match result {
                Ok(item) => items.push(item),
                Err(()) => self.skip_statement(false),
            }
        }
    }
}

fn set_file_item_trailing(item: &mut ast::FileItem, trailing: String) {
    match item {
        ast::FileItem::Syntax(syntax) => syntax.comments.trailing = Some(trailing),
        ast::FileItem::Package(package) => package.comments.trailing = Some(trailing),
        ast::FileItem::Import(import) => import.comments.trailing = Some(trailing),
        ast::FileItem::Option(option) => option.comments.trailing = Some(trailing),
        ast::FileItem::Message(message) => message.comments.trailing = Some(trailing),
        ast::FileItem::Enum(enum_) => enum_.comments.trailing = Some(trailing),
        ast::FileItem::Service(service) => service.comments.trailing = Some(trailing),
        ast::FileItem::Extend(extend) => extend.comments.trailing = Some(trailing),
        ast::FileItem::Empty(_) => (),
    }
}

fn set_message_item_trailing(item: &mut ast::MessageItem, trailing: String) {
    match item {
        ast::MessageItem::Field(field) => field.comments.trailing = Some(trailing),
        ast::MessageItem::Map(field) => field.comments.trailing = Some(trailing),
        ast::MessageItem::Group(group) => group.comments.trailing = Some(trailing),
        ast::MessageItem::Oneof(oneof) => oneof.comments.trailing = Some(trailing),
        ast::MessageItem::Message(message) => message.comments.trailing = Some(trailing),
        ast::MessageItem::Enum(enum_) => enum_.comments.trailing = Some(trailing),
        ast::MessageItem::Extend(extend) => extend.comments.trailing = Some(trailing),
        ast::MessageItem::ExtensionRange(range) => range.comments.trailing = Some(trailing),
        ast::MessageItem::Reserved(reserved) => reserved.comments.trailing = Some(trailing),
        ast::MessageItem::Option(option) => option.comments.trailing = Some(trailing),
        ast::MessageItem::Empty(_) => (),
    }
}

fn set_oneof_item_trailing(item: &mut ast::OneofItem, trailing: String) {
    match item {
        ast::OneofItem::Field(field) => field.comments.trailing = Some(trailing),
        ast::OneofItem::Group(group) => group.comments.trailing = Some(trailing),
        ast::OneofItem::Option(option) => option.comments.trailing = Some(trailing),
        ast::OneofItem::Empty(_) => (),
    }
}

fn set_enum_item_trailing(item: &mut ast::EnumItem, trailing: String) {
    match item {
        ast::EnumItem::Value(value) => value.comments.trailing = Some(trailing),
        ast::EnumItem::Option(option) => option.comments.trailing = Some(trailing),
        ast::EnumItem::Reserved(reserved) => reserved.comments.trailing = Some(trailing),
        ast::EnumItem::Empty(_) => (),
    }
}

fn set_service_item_trailing(item: &mut ast::ServiceItem, trailing: String) {
    match item {
        ast::ServiceItem::Method(method) => method.comments.trailing = Some(trailing),
        ast::ServiceItem::Option(option) => option.comments.trailing = Some(trailing),
        ast::ServiceItem::Empty(_) => (),
    }
}

fn set_extend_item_trailing(item: &mut ast::ExtendItem, trailing: String) {
    match item {
        ast::ExtendItem::Field(field) => field.comments.trailing = Some(trailing),
        ast::ExtendItem::Group(group) => group.comments.trailing = Some(trailing),
        ast::ExtendItem::Empty(_) => (),
    }
}
