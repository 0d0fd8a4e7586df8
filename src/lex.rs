use std::fmt;

use logos::{Lexer, Logos, Span};

use crate::error::DiagnosticKind;

/// Tokens of the protobuf IDL.
///
/// Whitespace and comments are lexed as ordinary tokens rather than skipped:
/// [`Tokens`] gathers them into the trivia attached to the next substantive
/// token, which is what lets the syntax tree print itself back to the
/// original bytes.
#[derive(Debug, Clone, Logos, PartialEq)]
#[logos(extras = TokenExtras)]
#[logos(subpattern exponent = r"[eE][+\-]?[0-9]+")]
pub(crate) enum Token<'a> {
    #[regex("[A-Za-z_][A-Za-z0-9_]*")]
    Ident(&'a str),
    #[regex("0", |lex| int(lex, 10, 0))]
    #[regex("[1-9][0-9]*", |lex| int(lex, 10, 0))]
    #[regex("0[0-9]+", |lex| int(lex, 8, 1))]
    #[regex("0[xX][0-9A-Fa-f]+", |lex| int(lex, 16, 2))]
    IntLiteral(Int<'a>),
    #[regex(r#"[0-9]+\.[0-9]*(?&exponent)?"#, float)]
    #[regex(r#"[0-9]+(?&exponent)"#, float)]
    #[regex(r#"\.[0-9]+(?&exponent)?"#, float)]
    FloatLiteral(f64),
    #[regex(r#"'|""#, string)]
    StringLiteral(Vec<u8>),
    #[token(".")]
    Dot,
    #[token("-")]
    Minus,
    #[token("+")]
    Plus,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("<")]
    LeftAngleBracket,
    #[token(">")]
    RightAngleBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("=")]
    Equals,
    #[token("/")]
    ForwardSlash,
    #[regex(r"[\t\v\f\r\n ]+")]
    Whitespace(&'a str),
    #[regex("//[^\n]*")]
    LineComment(&'a str),
    #[token("/*", block_comment)]
    BlockComment(&'a str),
}

/// An integer literal, preserved as source text so range checks can be
/// deferred until the target type is known.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Int<'a> {
    pub value: &'a str,
    pub radix: u32,
}

impl<'a> Int<'a> {
    pub(crate) fn as_u64(&self) -> Option<u64> {
        u64::from_str_radix(self.value, self.radix).ok()
    }
}

#[derive(Default)]
pub(crate) struct TokenExtras {
    pub error: Option<(DiagnosticKind, Span)>,
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(value) => write!(f, "'{}'", value),
            Token::IntLiteral(value) => write!(f, "'{}'", value.value),
            Token::FloatLiteral(value) => write!(f, "'{}'", value),
            Token::StringLiteral(_) => write!(f, "string literal"),
            Token::Dot => write!(f, "'.'"),
            Token::Minus => write!(f, "'-'"),
            Token::Plus => write!(f, "'+'"),
            Token::LeftBrace => write!(f, "'{{'"),
            Token::RightBrace => write!(f, "'}}'"),
            Token::LeftBracket => write!(f, "'['"),
            Token::RightBracket => write!(f, "']'"),
            Token::LeftParen => write!(f, "'('"),
            Token::RightParen => write!(f, "')'"),
            Token::LeftAngleBracket => write!(f, "'<'"),
            Token::RightAngleBracket => write!(f, "'>'"),
            Token::Comma => write!(f, "','"),
            Token::Colon => write!(f, "':'"),
            Token::Semicolon => write!(f, "';'"),
            Token::Equals => write!(f, "'='"),
            Token::ForwardSlash => write!(f, "'/'"),
            Token::Whitespace(_) => write!(f, "whitespace"),
            Token::LineComment(_) | Token::BlockComment(_) => write!(f, "comment"),
        }
    }
}

fn int<'a>(lex: &mut Lexer<'a, Token<'a>>, radix: u32, prefix_len: usize) -> Result<Int<'a>, ()> {
    debug_assert!(lex.slice().len() > prefix_len);
    let span = lex.span().start + prefix_len..lex.span().end;

    if radix == 8 && lex.slice().bytes().any(|b| b == b'8' || b == b'9') {
        lex.extras.error = Some((DiagnosticKind::InvalidOctalLiteral, lex.span()));
        return Err(());
    }

    if matches!(lex.remainder().chars().next(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_') {
        let mut end = span.end + 1;
        while end < lex.source().len() && lex.source().as_bytes()[end].is_ascii_alphabetic() {
            end += 1;
        }
        lex.extras.error = Some((
            DiagnosticKind::NoSpaceBetweenIntAndIdent,
            span.start..end,
        ));
        return Err(());
    }

    Ok(Int {
        value: &lex.source()[span],
        radix,
    })
}

fn float<'a>(lex: &mut Lexer<'a, Token<'a>>) -> f64 {
    lex.slice().parse().expect("failed to parse float")
}

fn block_comment<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Result<&'a str, ()> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            Ok(lex.slice())
        }
        None => {
            let span = lex.span().start..lex.source().len();
            lex.bump(lex.remainder().len());
            lex.extras.error = Some((DiagnosticKind::UnterminatedComment, span));
            Err(())
        }
    }
}

fn string<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Result<Vec<u8>, ()> {
    #[derive(Logos)]
    #[logos(subpattern hex = r"[0-9A-Fa-f]")]
    enum Component<'a> {
        #[regex(r#"[^\x00\n\\'"]+"#)]
        Unescaped(&'a str),
        #[regex(r#"['"]"#, terminator)]
        Terminator(u8),
        #[regex(r#"\\[xX](?&hex)(?&hex)?"#, hex_escape)]
        #[regex(r#"\\[0-7][0-7]?[0-7]?"#, oct_escape)]
        #[regex(r#"\\[abfnrtv?\\'"]"#, char_escape)]
        Byte(u8),
        #[regex(r#"\\u(?&hex)(?&hex)(?&hex)(?&hex)"#, unicode_escape)]
        #[regex(
            r#"\\U(?&hex)(?&hex)(?&hex)(?&hex)(?&hex)(?&hex)(?&hex)(?&hex)"#,
            unicode_escape
        )]
        Char(char),
    }

    fn terminator<'a>(lex: &mut Lexer<'a, Component<'a>>) -> u8 {
        debug_assert_eq!(lex.slice().len(), 1);
        lex.slice().bytes().next().unwrap()
    }

    fn hex_escape<'a>(lex: &mut Lexer<'a, Component<'a>>) -> u8 {
        u32::from_str_radix(&lex.slice()[2..], 16)
            .expect("expected valid hex escape")
            .try_into()
            .expect("two-digit hex escape should be valid byte")
    }

    fn oct_escape<'a>(lex: &mut Lexer<'a, Component<'a>>) -> Result<u8, ()> {
        u32::from_str_radix(&lex.slice()[1..], 8)
            .expect("expected valid oct escape")
            .try_into()
            .map_err(drop)
    }

    fn char_escape<'a>(lex: &mut Lexer<'a, Component<'a>>) -> u8 {
        match lex.slice().as_bytes()[1] {
            b'a' => b'\x07',
            b'b' => b'\x08',
            b'f' => b'\x0c',
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => b'\x0b',
            b'?' => b'?',
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            _ => panic!("failed to parse char escape"),
        }
    }

    fn unicode_escape<'a>(lex: &mut Lexer<'a, Component<'a>>) -> Option<char> {
        let value = u32::from_str_radix(&lex.slice()[2..], 16).expect("expected valid hex escape");
        char::from_u32(value)
    }

    let mut result = Vec::new();

    let mut char_lexer = Component::lexer(lex.remainder());
    let terminator = lex.slice().as_bytes()[0];

    loop {
        match char_lexer.next() {
            Some(Ok(Component::Unescaped(s))) => result.extend_from_slice(s.as_bytes()),
            Some(Ok(Component::Terminator(t))) if t == terminator => {
                break;
            }
            Some(Ok(Component::Terminator(ch) | Component::Byte(ch))) => result.push(ch),
            Some(Ok(Component::Char(ch))) => {
                let mut buf = [0; 4];
                result.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            Some(Err(())) => {
                let start = lex.span().end + char_lexer.span().start;
                let end = lex.span().end + char_lexer.span().end;

                if char_lexer.slice().starts_with('\\') {
                    lex.extras.error =
                        Some((DiagnosticKind::InvalidStringEscape, start..end));
                } else {
                    lex.extras.error =
                        Some((DiagnosticKind::InvalidCharacters, start..end));
                }
                return Err(());
            }
            None => {
                let span = lex.span().start..lex.source().len();
                lex.bump(char_lexer.span().end);
                lex.extras.error = Some((DiagnosticKind::UnterminatedString, span));
                return Err(());
            }
        }
    }

    lex.bump(char_lexer.span().end);
    Ok(result)
}

/// A substantive token together with its span and the exact source text
/// (whitespace and comments) separating it from the previous token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexed<'a> {
    pub token: Token<'a>,
    pub span: Span,
    pub trivia: &'a str,
}

/// Iterator over substantive tokens, folding trivia into the following
/// token. Lexical errors are yielded in place so the parser can recover and
/// keep going.
pub(crate) struct Tokens<'a> {
    source: &'a str,
    lexer: Lexer<'a, Token<'a>>,
    trivia_start: usize,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Tokens {
            source,
            lexer: Token::lexer(source),
            trivia_start: 0,
        }
    }

    /// The source text between the last substantive token and the current
    /// lexer position; at end of input this is the file's trailing trivia.
    pub(crate) fn pending_trivia(&self) -> &'a str {
        &self.source[self.trivia_start..self.lexer.span().end]
    }

    pub(crate) fn next(&mut self) -> Option<Result<Lexed<'a>, (DiagnosticKind, Span)>> {
        loop {
            match self.lexer.next() {
                Some(Ok(
                    Token::Whitespace(_) | Token::LineComment(_) | Token::BlockComment(_),
                )) => continue,
                Some(Ok(token)) => {
                    let span = self.lexer.span();
                    let trivia = &self.source[self.trivia_start..span.start];
                    self.trivia_start = span.end;
                    return Some(Ok(Lexed {
                        token,
                        span,
                        trivia,
                    }));
                }
                Some(Err(())) => {
                    let err = match self.lexer.extras.error.take() {
                        Some(err) => err,
                        None => (DiagnosticKind::InvalidToken, self.lexer.span()),
                    };
                    // Resynchronize after the offending bytes.
                    self.trivia_start = self.lexer.span().end;
                    return Some(Err(err));
                }
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Tokens::new(source);
        let mut result = Vec::new();
        while let Some(tok) = lexer.next() {
            result.push(tok.unwrap().token);
        }
        result
    }

    #[test]
    fn simple_tokens() {
        assert_eq!(
            tokens("message Foo { optional int32 bar = 1; }"),
            vec![
                Token::Ident("message"),
                Token::Ident("Foo"),
                Token::LeftBrace,
                Token::Ident("optional"),
                Token::Ident("int32"),
                Token::Ident("bar"),
                Token::Equals,
                Token::IntLiteral(Int {
                    value: "1",
                    radix: 10,
                }),
                Token::Semicolon,
                Token::RightBrace,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            tokens("0 52 0x2A 012 5. 0.5 .5 2e-4 52e3"),
            vec![
                Token::IntLiteral(Int {
                    value: "0",
                    radix: 10,
                }),
                Token::IntLiteral(Int {
                    value: "52",
                    radix: 10,
                }),
                Token::IntLiteral(Int {
                    value: "2A",
                    radix: 16,
                }),
                Token::IntLiteral(Int {
                    value: "12",
                    radix: 8,
                }),
                Token::FloatLiteral(5.),
                Token::FloatLiteral(0.5),
                Token::FloatLiteral(0.5),
                Token::FloatLiteral(2e-4),
                Token::FloatLiteral(52e3),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(r#""hello \a\b\f\n\r\t\v\?\\\'\" \052 \x2a" 'single'"#),
            vec![
                Token::StringLiteral(b"hello \x07\x08\x0c\n\r\t\x0b?\\'\" * *".as_ref().into()),
                Token::StringLiteral(b"single".as_ref().into()),
            ]
        );
    }

    #[test]
    fn trivia_attaches_to_following_token() {
        let mut lexer = Tokens::new("  // hello\nfoo /* x */ bar");
        let foo = lexer.next().unwrap().unwrap();
        assert_eq!(foo.token, Token::Ident("foo"));
        assert_eq!(foo.trivia, "  // hello\n");
        let bar = lexer.next().unwrap().unwrap();
        assert_eq!(bar.token, Token::Ident("bar"));
        assert_eq!(bar.trivia, " /* x */ ");
        assert!(lexer.next().is_none());
        assert_eq!(lexer.pending_trivia(), "");
    }

    #[test]
    fn trailing_trivia() {
        let mut lexer = Tokens::new("foo ; // done\n");
        while let Some(tok) = lexer.next() {
            tok.unwrap();
        }
        assert_eq!(lexer.pending_trivia(), " // done\n");
    }

    #[test]
    fn unterminated_string() {
        let mut lexer = Tokens::new("\"hello");
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.0, DiagnosticKind::UnterminatedString);
    }

    #[test]
    fn unterminated_comment() {
        let mut lexer = Tokens::new("/* hello");
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.0, DiagnosticKind::UnterminatedComment);
    }

    #[test]
    fn invalid_octal() {
        let mut lexer = Tokens::new("08");
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.0, DiagnosticKind::InvalidOctalLiteral);
    }

    #[test]
    fn no_space_between_int_and_ident() {
        let mut lexer = Tokens::new("1to");
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.0, DiagnosticKind::NoSpaceBetweenIntAndIdent);
    }

    #[test]
    fn invalid_character() {
        let mut lexer = Tokens::new("@ foo");
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.0, DiagnosticKind::InvalidToken);
        let foo = lexer.next().unwrap().unwrap();
        assert_eq!(foo.token, Token::Ident("foo"));
    }
}
