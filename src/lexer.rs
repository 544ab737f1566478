// ABOUTME: Source text -> token stream, tracking line/column for every token.

use crate::error::{SourceSpan, ZephyrError};
use crate::token::{keyword_from_str, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            source,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ZephyrError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let start_line = self.line;
            let start_col = self.column;
            let Some(c) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, "", SourceSpan::point(start_line, start_col)));
                break;
            };

            let token = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).map_or(false, |d| d.is_ascii_digit())) {
                self.lex_number(start_line, start_col)?
            } else if c.is_alphabetic() || c == '_' {
                self.lex_identifier_or_keyword(start_line, start_col)
            } else if c == '"' || c == '\'' {
                self.lex_string(c, start_line, start_col)?
            } else if (c == 'r' || c == 'f') && matches!(self.peek_at(1), Some('"') | Some('\'')) {
                self.lex_prefixed_string(c, start_line, start_col)?
            } else {
                self.lex_operator(start_line, start_col)?
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self, line: usize, col: usize) -> Result<Token, ZephyrError> {
        let start = self.pos;
        let mut is_float = false;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X') | Some('b') | Some('B') | Some('o') | Some('O')) {
            self.advance();
            self.advance();
            while self.peek().map_or(false, |c| c.is_ascii_alphanumeric()) {
                self.advance();
            }
        } else {
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
            if self.peek() == Some('.') && self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
                while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
                while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
            if !is_float {
                while matches!(self.peek(), Some('i') | Some('u')) {
                    self.advance();
                    while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                        self.advance();
                    }
                }
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let span = SourceSpan::new(line, col, self.pos - start);
        if is_float {
            let value: f64 = text.parse().map_err(|_| {
                ZephyrError::syntax(format!("invalid float literal '{}'", text), span)
            })?;
            Ok(Token::new(TokenKind::Float(value), text, span))
        } else {
            Ok(Token::new(TokenKind::Integer { text: text.clone() }, text, span))
        }
    }

    fn lex_identifier_or_keyword(&mut self, line: usize, col: usize) -> Token {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let span = SourceSpan::new(line, col, self.pos - start);
        if let Some(kind) = keyword_from_str(&text) {
            Token::new(kind, text, span)
        } else {
            Token::new(TokenKind::Identifier(text.clone()), text, span)
        }
    }

    fn lex_prefixed_string(&mut self, prefix: char, line: usize, col: usize) -> Result<Token, ZephyrError> {
        let start_pos = self.pos;
        self.advance(); // consume r/f
        let quote = self.peek().unwrap();
        let raw = self.scan_quoted(quote)?;
        let span = SourceSpan::new(line, col, self.pos - start_pos);
        if prefix == 'r' {
            Ok(Token::new(TokenKind::RawString(raw.clone()), raw, span))
        } else {
            Ok(Token::new(TokenKind::FString(raw.clone()), raw, span))
        }
    }

    /// Scans a plain (unprefixed) quoted string, leaving escape sequences
    /// unresolved in the token text -- per spec.md 4.1, escape processing
    /// happens during parsing, not tokenization.
    fn lex_string(&mut self, quote: char, line: usize, col: usize) -> Result<Token, ZephyrError> {
        let start_pos = self.pos;
        let text = self.scan_quoted(quote)?;
        let span = SourceSpan::new(line, col, self.pos - start_pos);
        Ok(Token::new(TokenKind::String(text.clone()), text, span))
    }

    /// Scans a quoted string (handling the triple-quote form), returning the
    /// raw inner text with backslash escapes left untouched -- the caller
    /// decides whether and when to resolve them.
    fn scan_quoted(&mut self, quote: char) -> Result<String, ZephyrError> {
        let start_line = self.line;
        let start_col = self.column;
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote) && self.peek_at(2) != Some(quote);
        let fence_len = if triple { 3 } else { 1 };
        for _ in 0..fence_len {
            self.advance();
        }
        let mut out = String::new();
        loop {
            if triple {
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    return Ok(out);
                }
            } else if self.peek() == Some(quote) {
                self.advance();
                return Ok(out);
            }
            match self.advance() {
                Some('\\') => {
                    out.push('\\');
                    if let Some(c) = self.advance() {
                        out.push(c);
                    }
                }
                Some(c) => out.push(c),
                Option::None => {
                    return Err(ZephyrError::syntax(
                        "unterminated string literal",
                        SourceSpan::new(start_line, start_col, 1),
                    ))
                }
            }
        }
    }

    fn lex_operator(&mut self, line: usize, col: usize) -> Result<Token, ZephyrError> {
        use TokenKind::*;
        let start_pos = self.pos;
        let c = self.advance().unwrap();
        let kind = match c {
            '+' => {
                if self.matches('=') { PlusEq } else if self.matches('+') { PlusPlus } else { Plus }
            }
            '-' => {
                if self.matches('=') { MinusEq } else if self.matches('-') { MinusMinus } else if self.matches('>') { Arrow } else { Minus }
            }
            '*' => {
                if self.matches('*') {
                    if self.matches('=') { StarStarEq } else { StarStar }
                } else if self.matches('=') {
                    StarEq
                } else {
                    Star
                }
            }
            '/' => if self.matches('=') { SlashEq } else { Slash },
            '%' => if self.matches('=') { PercentEq } else { Percent },
            '=' => if self.matches('=') { EqEq } else if self.matches('>') { FatArrow } else { Eq },
            '!' => if self.matches('=') { NotEq } else { Bang },
            '<' => if self.matches('=') { LtEq } else if self.matches('<') { LtLt } else { Lt },
            '>' => if self.matches('=') { GtEq } else if self.matches('>') { GtGt } else { Gt },
            '&' => if self.matches('&') { AndAnd } else { Amp },
            '|' => if self.matches('|') { OrOr } else if self.matches('>') { PipeGt } else { Pipe },
            '^' => Caret,
            '~' => Tilde,
            '?' => {
                if self.matches('?') { QuestionQuestion } else if self.matches('.') { QuestionDot } else if self.matches('[') { QuestionLBracket } else { Question }
            }
            '.' => Dot,
            ':' => Colon,
            ',' => Comma,
            ';' => Semicolon,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            other => {
                return Err(ZephyrError::syntax(
                    format!("unrecognized character '{}'", other),
                    SourceSpan::point(line, col),
                ))
            }
        };
        let lexeme: String = self.chars[start_pos..self.pos].iter().collect();
        let span = SourceSpan::new(line, col, self.pos - start_pos);
        Ok(Token::new(kind, lexeme, span))
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ZephyrError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(src: &str) -> Vec<crate::token::TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_integer_with_suffix() {
        assert_eq!(kinds("300u8"), vec![Integer { text: "300u8".into() }, Eof]);
    }

    #[test]
    fn lexes_hex_binary_octal() {
        assert_eq!(kinds("0xFF")[0], Integer { text: "0xFF".into() });
        assert_eq!(kinds("0b101")[0], Integer { text: "0b101".into() });
        assert_eq!(kinds("0o17")[0], Integer { text: "0o17".into() });
    }

    #[test]
    fn lexes_float() {
        match &kinds("3.14")[0] {
            Float(f) => assert!((f - 3.14).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        assert_eq!(kinds("class Foo"), vec![Class, Identifier("Foo".into()), Eof]);
    }

    #[test]
    fn lexes_string_leaving_escapes_unresolved() {
        // Escape resolution is a parser concern (spec.md 4.1); the lexer
        // only carries the raw quoted text through.
        match &kinds(r#""a\nb""#)[0] {
            String(s) => assert_eq!(s, "a\\nb"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lexes_raw_string_keeps_escapes() {
        match &kinds(r#"r"a\nb""#)[0] {
            RawString(s) => assert_eq!(s, "a\\nb"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lexes_fstring_as_raw_template() {
        match &kinds(r#"f"hi {name}!""#)[0] {
            FString(s) => assert_eq!(s, "hi {name}!"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lexes_triple_quoted_string() {
        match &kinds("\"\"\"line1\nline2\"\"\"")[0] {
            String(s) => assert_eq!(s, "line1\nline2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn operators_are_greedy_longest_first() {
        assert_eq!(kinds("**="), vec![StarStarEq, Eof]);
        assert_eq!(kinds("**"), vec![StarStar, Eof]);
        assert_eq!(kinds(">>"), vec![GtGt, Eof]);
        assert_eq!(kinds("?.") , vec![QuestionDot, Eof]);
        assert_eq!(kinds("?["), vec![QuestionLBracket, Eof]);
        assert_eq!(kinds("??"), vec![QuestionQuestion, Eof]);
        assert_eq!(kinds("|>"), vec![PipeGt, Eof]);
        assert_eq!(kinds("->"), vec![Arrow, Eof]);
    }

    #[test]
    fn skips_hash_comments() {
        assert_eq!(kinds("1 # comment\n2"), vec![Integer { text: "1".into() }, Integer { text: "2".into() }, Eof]);
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        let err = tokenize("\"abc").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SyntaxError);
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("a\nb").unwrap();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
    }
}
