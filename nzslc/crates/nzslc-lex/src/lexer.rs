//! Lexer implementation.
//!
//! The lexer walks the source one character at a time, skipping
//! whitespace and comments, and dispatches on the current character to
//! the literal/identifier/operator sub-lexers. Block comments nest.

use nzslc_util::{Error, LexingError, Result, SourceFile, SourceLocation};
use std::sync::Arc;

use crate::token::{Token, TokenKind};

/// Tokenizes a whole source file.
///
/// Returns every token in source order followed by exactly one
/// [`TokenKind::EndOfStream`]. `file_path` is interned once and shared by
/// every token location.
pub fn tokenize(source: &str, file_path: Option<&str>) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(source, file_path.map(|path| Arc::new(path.to_owned())));

    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::EndOfStream;
        tokens.push(token);
        if done {
            break;
        }
    }

    Ok(tokens)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    // line/column of the last consumed character, used as span ends
    last_line: u32,
    last_column: u32,
    token_start_line: u32,
    token_start_column: u32,
    file: Option<SourceFile>,
}

impl Lexer {
    fn new(source: &str, file: Option<SourceFile>) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            last_line: 1,
            last_column: 1,
            token_start_line: 1,
            token_start_column: 1,
            file,
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn current(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek(&self, offset: usize) -> char {
        self.chars.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.current();
        self.last_line = self.line;
        self.last_column = self.column;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn token_location(&self) -> SourceLocation {
        SourceLocation::new_range(
            self.file.clone(),
            self.token_start_line,
            self.token_start_column,
            self.last_line,
            self.last_column,
        )
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line, self.column)
    }

    fn error(&self, kind: LexingError) -> Error {
        Error::new(self.token_location(), kind)
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            location: self.token_location(),
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        self.token_start_line = self.line;
        self.token_start_column = self.column;

        if self.is_at_end() {
            // the end-of-stream span points one past the last character
            self.last_line = self.line;
            self.last_column = self.column;
            return Ok(self.token(TokenKind::EndOfStream));
        }

        let c = self.current();
        let kind = match c {
            '(' => {
                self.advance();
                TokenKind::OpenParenthesis
            }
            ')' => {
                self.advance();
                TokenKind::ClosingParenthesis
            }
            '{' => {
                self.advance();
                TokenKind::OpenCurlyBracket
            }
            '}' => {
                self.advance();
                TokenKind::ClosingCurlyBracket
            }
            '[' => {
                self.advance();
                TokenKind::OpenSquareBracket
            }
            ']' => {
                self.advance();
                TokenKind::ClosingSquareBracket
            }
            ',' => {
                self.advance();
                TokenKind::Comma
            }
            ':' => {
                self.advance();
                TokenKind::Colon
            }
            ';' => {
                self.advance();
                TokenKind::Semicolon
            }
            '.' => {
                self.advance();
                TokenKind::Dot
            }
            '~' => {
                self.advance();
                TokenKind::BitwiseNot
            }
            '^' => {
                self.advance();
                TokenKind::BitwiseXor
            }
            '+' => {
                self.advance();
                if self.current() == '=' {
                    self.advance();
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                self.advance();
                match self.current() {
                    '=' => {
                        self.advance();
                        TokenKind::MinusAssign
                    }
                    '>' => {
                        self.advance();
                        TokenKind::Arrow
                    }
                    _ => TokenKind::Minus,
                }
            }
            '*' => {
                self.advance();
                if self.current() == '=' {
                    self.advance();
                    TokenKind::MultiplyAssign
                } else {
                    TokenKind::Multiply
                }
            }
            '/' => {
                // comments were skipped above, this is a plain division
                self.advance();
                if self.current() == '=' {
                    self.advance();
                    TokenKind::DivideAssign
                } else {
                    TokenKind::Divide
                }
            }
            '%' => {
                self.advance();
                if self.current() == '=' {
                    self.advance();
                    TokenKind::ModuloAssign
                } else {
                    TokenKind::Modulo
                }
            }
            '=' => {
                self.advance();
                if self.current() == '=' {
                    self.advance();
                    TokenKind::Equal
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                self.advance();
                if self.current() == '=' {
                    self.advance();
                    TokenKind::NotEqual
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                self.advance();
                match self.current() {
                    '=' => {
                        self.advance();
                        TokenKind::LessThanEqual
                    }
                    '<' => {
                        self.advance();
                        TokenKind::ShiftLeft
                    }
                    _ => TokenKind::LessThan,
                }
            }
            '>' => {
                self.advance();
                match self.current() {
                    '=' => {
                        self.advance();
                        TokenKind::GreaterThanEqual
                    }
                    '>' => {
                        self.advance();
                        TokenKind::ShiftRight
                    }
                    _ => TokenKind::GreaterThan,
                }
            }
            '&' => {
                self.advance();
                if self.current() == '&' {
                    self.advance();
                    if self.current() == '=' {
                        self.advance();
                        TokenKind::LogicalAndAssign
                    } else {
                        TokenKind::LogicalAnd
                    }
                } else {
                    TokenKind::BitwiseAnd
                }
            }
            '|' => {
                self.advance();
                if self.current() == '|' {
                    self.advance();
                    if self.current() == '=' {
                        self.advance();
                        TokenKind::LogicalOrAssign
                    } else {
                        TokenKind::LogicalOr
                    }
                } else {
                    TokenKind::BitwiseOr
                }
            }
            '"' => return self.lex_string(),
            c if c.is_ascii_digit() => return self.lex_number(),
            c if c.is_ascii_alphabetic() || c == '_' => return Ok(self.lex_identifier()),
            _ => {
                self.advance();
                return Err(self.error(LexingError::UnrecognizedChar));
            }
        };

        Ok(self.token(kind))
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let c = self.current();
            if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek(1) == '/' {
                while !self.is_at_end() && self.current() != '\n' {
                    self.advance();
                }
            } else if c == '/' && self.peek(1) == '*' {
                self.advance();
                self.advance();
                let mut depth = 1usize;
                while !self.is_at_end() && depth > 0 {
                    if self.current() == '/' && self.peek(1) == '*' {
                        self.advance();
                        self.advance();
                        depth += 1;
                    } else if self.current() == '*' && self.peek(1) == '/' {
                        self.advance();
                        self.advance();
                        depth -= 1;
                    } else {
                        self.advance();
                    }
                }
            } else {
                break;
            }
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.pos;
        while self.current().is_ascii_alphanumeric() || self.current() == '_' {
            self.advance();
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = match text.as_str() {
            "alias" => TokenKind::Alias,
            "as" => TokenKind::As,
            "break" => TokenKind::Break,
            "const" => TokenKind::Const,
            "const_select" => TokenKind::ConstSelect,
            "continue" => TokenKind::Continue,
            "discard" => TokenKind::Discard,
            "else" => TokenKind::Else,
            "external" => TokenKind::External,
            "false" => TokenKind::BoolFalse,
            "fn" => TokenKind::FunctionDeclaration,
            "for" => TokenKind::For,
            "from" => TokenKind::From,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "in" => TokenKind::In,
            "inout" => TokenKind::InOut,
            "let" => TokenKind::Let,
            "module" => TokenKind::Module,
            "option" => TokenKind::Option,
            "out" => TokenKind::Out,
            "return" => TokenKind::Return,
            "struct" => TokenKind::Struct,
            "true" => TokenKind::BoolTrue,
            "while" => TokenKind::While,
            _ => TokenKind::Identifier(text),
        };

        self.token(kind)
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            if self.is_at_end() || self.current() == '\n' {
                return Err(self.error(LexingError::UnfinishedString));
            }

            match self.advance() {
                '"' => break,
                '\\' => {
                    if self.is_at_end() {
                        return Err(self.error(LexingError::UnfinishedString));
                    }
                    match self.advance() {
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        _ => return Err(self.error(LexingError::UnrecognizedChar)),
                    }
                }
                c => value.push(c),
            }
        }

        Ok(self.token(TokenKind::StringValue(value)))
    }

    fn lex_number(&mut self) -> Result<Token> {
        // hex and binary literals
        if self.current() == '0' && matches!(self.peek(1), 'x' | 'X' | 'b' | 'B') {
            let base = if matches!(self.peek(1), 'x' | 'X') { 16 } else { 2 };
            self.advance();
            self.advance();
            return self.lex_radix_integer(base);
        }

        let mut digits = String::new();
        self.collect_digits(&mut digits, 10);

        let mut is_float = false;
        if self.current() == '.' && self.peek(1).is_ascii_digit() {
            is_float = true;
            digits.push(self.advance());
            self.collect_digits(&mut digits, 10);
        }

        if matches!(self.current(), 'e' | 'E') {
            is_float = true;
            digits.push('e');
            self.advance();
            if matches!(self.current(), '+' | '-') {
                digits.push(self.advance());
            }
            if !self.current().is_ascii_digit() {
                return Err(self.error(LexingError::BadNumber));
            }
            self.collect_digits(&mut digits, 10);
        }

        // a literal glued to an identifier character is malformed
        if self.current().is_ascii_alphanumeric() || self.current() == '_' || self.current() == '.'
        {
            while self.current().is_ascii_alphanumeric()
                || self.current() == '_'
                || self.current() == '.'
            {
                self.advance();
            }
            return Err(self.error(LexingError::BadNumber));
        }

        if is_float {
            let value: f64 = digits
                .parse()
                .map_err(|_| self.error(LexingError::BadNumber))?;
            if !value.is_finite() {
                return Err(self.error(LexingError::NumberOutOfRange));
            }
            Ok(self.token(TokenKind::FloatingPointValue(value)))
        } else {
            let value: i64 = digits
                .parse()
                .map_err(|_| self.error(LexingError::NumberOutOfRange))?;
            Ok(self.token(TokenKind::IntegerValue(value)))
        }
    }

    fn lex_radix_integer(&mut self, base: u32) -> Result<Token> {
        let mut digits = String::new();
        self.collect_digits(&mut digits, base);

        if digits.is_empty() {
            return Err(self.error(LexingError::BadNumber));
        }

        if self.current().is_ascii_alphanumeric() || self.current() == '_' {
            while self.current().is_ascii_alphanumeric() || self.current() == '_' {
                self.advance();
            }
            return Err(self.error(LexingError::BadNumber));
        }

        let value = i64::from_str_radix(&digits, base)
            .map_err(|_| self.error(LexingError::NumberOutOfRange))?;
        Ok(self.token(TokenKind::IntegerValue(value)))
    }

    /// Consumes digits of `base`, skipping `_` separators.
    fn collect_digits(&mut self, into: &mut String, base: u32) {
        loop {
            let c = self.current();
            if c == '_' {
                self.advance();
            } else if c.is_digit(base) {
                into.push(self.advance());
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_util::ErrorCategory;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, None)
            .expect("tokenization failed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    fn lex_error(source: &str) -> Error {
        tokenize(source, None).expect_err("tokenization should fail")
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(kinds(""), vec![TokenKind::EndOfStream]);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("let foo = bar;"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier(String::from("foo")),
                TokenKind::Assign,
                TokenKind::Identifier(String::from("bar")),
                TokenKind::Semicolon,
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("+ += - -= -> * / % == != < <= << > >= >> & && &&= | || ||= ^ ~ !"),
            vec![
                TokenKind::Plus,
                TokenKind::PlusAssign,
                TokenKind::Minus,
                TokenKind::MinusAssign,
                TokenKind::Arrow,
                TokenKind::Multiply,
                TokenKind::Divide,
                TokenKind::Modulo,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessThan,
                TokenKind::LessThanEqual,
                TokenKind::ShiftLeft,
                TokenKind::GreaterThan,
                TokenKind::GreaterThanEqual,
                TokenKind::ShiftRight,
                TokenKind::BitwiseAnd,
                TokenKind::LogicalAnd,
                TokenKind::LogicalAndAssign,
                TokenKind::BitwiseOr,
                TokenKind::LogicalOr,
                TokenKind::LogicalOrAssign,
                TokenKind::BitwiseXor,
                TokenKind::BitwiseNot,
                TokenKind::Not,
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_integer_literals() {
        assert_eq!(kinds("42"), vec![TokenKind::IntegerValue(42), TokenKind::EndOfStream]);
        assert_eq!(
            kinds("0xFF 0b1010 1_000_000"),
            vec![
                TokenKind::IntegerValue(0xFF),
                TokenKind::IntegerValue(0b1010),
                TokenKind::IntegerValue(1_000_000),
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(
            kinds("3.14 1e10 2.5e-3"),
            vec![
                TokenKind::FloatingPointValue(3.14),
                TokenKind::FloatingPointValue(1e10),
                TokenKind::FloatingPointValue(2.5e-3),
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_integer_dot_is_member_access() {
        // `value.xxx` must lex as identifier/dot/identifier, but `1.x` is
        // a malformed number
        assert_eq!(
            kinds("value.xyz"),
            vec![
                TokenKind::Identifier(String::from("value")),
                TokenKind::Dot,
                TokenKind::Identifier(String::from("xyz")),
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(
            kinds(r#""hello\n\"world\"""#),
            vec![
                TokenKind::StringValue(String::from("hello\n\"world\"")),
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("a // comment\nb /* block */ c"),
            vec![
                TokenKind::Identifier(String::from("a")),
                TokenKind::Identifier(String::from("b")),
                TokenKind::Identifier(String::from("c")),
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_nested_block_comment() {
        assert_eq!(
            kinds("a /* outer /* inner */ still out */ b"),
            vec![
                TokenKind::Identifier(String::from("a")),
                TokenKind::Identifier(String::from("b")),
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_bad_number() {
        let err = lex_error("123abc");
        assert_eq!(err.category(), ErrorCategory::Lexing);
        assert_eq!(err.to_string(), "(1,1 -> 6): Lexing error: bad number");
    }

    #[test]
    fn test_number_out_of_range() {
        let err = lex_error("99999999999999999999999999");
        assert_eq!(
            err.to_string(),
            "(1,1 -> 26): Lexing error: number is out of range"
        );
    }

    #[test]
    fn test_unfinished_string() {
        let err = lex_error("\"never closed");
        assert_eq!(err.category(), ErrorCategory::Lexing);
    }

    #[test]
    fn test_unrecognized_char() {
        let err = lex_error("let $ = 1;");
        assert_eq!(err.category(), ErrorCategory::Lexing);
    }

    #[test]
    fn test_token_locations() {
        let tokens = tokenize("let x;", Some("file.nzsl")).unwrap();
        assert_eq!(tokens[0].location.start_column, 1);
        assert_eq!(tokens[0].location.end_column, 3);
        assert_eq!(tokens[1].location.start_column, 5);
        assert_eq!(tokens[0].location.file.as_deref().map(String::as_str), Some("file.nzsl"));
    }

    #[test]
    fn test_ends_with_single_end_of_stream() {
        let tokens = tokenize("a b c", None).unwrap();
        let eos: Vec<_> = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::EndOfStream)
            .collect();
        assert_eq!(eos.len(), 1);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::EndOfStream);
    }
}
