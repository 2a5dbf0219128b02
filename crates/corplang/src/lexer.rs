//! Source scanner for `.mp` files.
//!
//! Produces a flat token stream terminated by `Eof`. Two behaviours set this
//! lexer apart from a conventional scanner: JSON-looking `{…}`/`[…]` spans in
//! value position are captured whole as `Object`/`Array` tokens (validated
//! with serde_json, rolled back on failure), and `f"…"` literals are emitted
//! as single `FString` tokens whose placeholder content the parser re-lexes.

use crate::{
    exceptions::{ExcType, RunError},
    token::{Token, TokenKind},
};

/// Streaming scanner over a source string.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl Lexer {
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::with_capacity(text.len() / 6),
        }
    }

    /// Scans the whole input, returning the token list ending in `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, RunError> {
        while let Some(ch) = self.current() {
            match ch {
                ' ' | '\t' | '\r' => self.skip_whitespace(),
                '\n' => {
                    self.push(TokenKind::Newline, "\n");
                    self.advance();
                }
                '#' | '/' => {
                    if !self.scan_comment() {
                        self.scan_operator()?;
                    }
                }
                '{' | '[' => {
                    if !self.scan_json_blob()? {
                        self.scan_operator()?;
                    }
                }
                'f' | 'F' if matches!(self.peek(1), Some('\'' | '"')) => self.scan_fstring(),
                c if c.is_ascii_digit() => self.scan_number(),
                '\'' | '"' => self.scan_string(false, None),
                c if c.is_alphabetic() || c == '_' => self.scan_identifier(),
                _ => self.scan_operator()?,
            }
        }
        self.tokens
            .push(Token::new(TokenKind::Eof, "", self.line, self.column));
        Ok(self.tokens)
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current() {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>) {
        let (line, column) = (self.line, self.column);
        self.push_at(kind, text, line, column);
    }

    fn push_at(&mut self, kind: TokenKind, text: impl Into<String>, line: u32, column: u32) {
        self.tokens.push(Token::new(kind, text, line, column));
    }

    /// Last non-whitespace character before the cursor, used by the JSON
    /// value-position heuristic.
    fn last_significant_char(&self) -> Option<char> {
        self.chars[..self.pos]
            .iter()
            .rev()
            .copied()
            .find(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.current(), Some(' ' | '\t' | '\r')) {
            self.advance();
        }
    }

    /// Consumes `# …`, `// …`, or `/* … */` comments. Returns false when the
    /// cursor is on a bare `/` that must be tokenized as an operator.
    fn scan_comment(&mut self) -> bool {
        match (self.current(), self.peek(1)) {
            (Some('#'), _) => {
                while self.current().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                true
            }
            (Some('/'), Some('/')) => {
                while self.current().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                true
            }
            (Some('/'), Some('*')) => {
                self.advance();
                self.advance();
                while let Some(ch) = self.current() {
                    if ch == '*' && self.peek(1) == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                true
            }
            _ => false,
        }
    }

    /// Attempts to capture a balanced `{…}`/`[…]` span as a JSON literal.
    ///
    /// Only tried in value position: after `: = ( [ ,` or at start of input.
    /// Following an identifier or a closing bracket the span is index access
    /// or a block opener, never a literal. On any failure the cursor rolls
    /// back and the ordinary punctuation tokens are emitted instead.
    fn scan_json_blob(&mut self) -> Result<bool, RunError> {
        let open = match self.current() {
            Some(c @ ('{' | '[')) => c,
            _ => return Ok(false),
        };

        if let Some(prev) = self.last_significant_char() {
            let ident_like = prev.is_alphanumeric() || matches!(prev, '}' | ']' | ')' | '"' | '\'' | '_');
            if ident_like {
                if open == '[' {
                    return Ok(false);
                }
                if !matches!(prev, ':' | '=' | '(' | '[' | ',') {
                    return Ok(false);
                }
            }
        }

        let (start_pos, start_line, start_col) = (self.pos, self.line, self.column);
        match self.read_balanced_structure(open) {
            Ok(captured) => {
                if serde_json::from_str::<serde_json::Value>(&captured).is_ok() {
                    let kind = if open == '{' { TokenKind::Object } else { TokenKind::Array };
                    self.push_at(kind, captured, start_line, start_col);
                    Ok(true)
                } else {
                    self.pos = start_pos;
                    self.line = start_line;
                    self.column = start_col;
                    Ok(false)
                }
            }
            Err(BalanceError::Unterminated) => {
                self.pos = start_pos;
                self.line = start_line;
                self.column = start_col;
                Ok(false)
            }
            Err(BalanceError::InvalidChar(ch)) => Err(ExcType::syntax_error(format!(
                "Invalid character {ch:?} in structure at line {start_line}, column {start_col}"
            ))),
        }
    }

    /// Reads a balanced bracket structure tracking string literals and escapes.
    fn read_balanced_structure(&mut self, open: char) -> Result<String, BalanceError> {
        let close = if open == '{' { '}' } else { ']' };
        let mut depth = 0usize;
        let mut result = String::new();
        let mut in_string = false;
        let mut quote = '"';
        let mut escape_next = false;

        while let Some(ch) = self.current() {
            if !in_string && ch.is_control() && !matches!(ch, '\n' | '\r' | '\t') {
                return Err(BalanceError::InvalidChar(ch));
            }
            result.push(ch);

            if !escape_next && (ch == '"' || ch == '\'') {
                if !in_string {
                    in_string = true;
                    quote = ch;
                } else if ch == quote {
                    in_string = false;
                }
            }
            escape_next = in_string && ch == '\\' && !escape_next;

            if !in_string {
                if ch == open {
                    depth += 1;
                } else if ch == close {
                    depth -= 1;
                }
            }

            self.advance();
            if depth == 0 && !in_string {
                return Ok(result);
            }
        }
        Err(BalanceError::Unterminated)
    }

    fn scan_number(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() || ch == '.' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        self.push_at(TokenKind::Number, text, line, column);
    }

    fn scan_fstring(&mut self) {
        let (line, column) = (self.line, self.column);
        self.advance(); // f
        self.scan_string(true, Some((line, column)));
    }

    /// Reads single-, double-, or triple-quoted strings. Triple-quoted become
    /// `DocString` tokens; `\n \t \r \\ \' \"` escapes apply outside triples.
    fn scan_string(&mut self, is_fstring: bool, start: Option<(u32, u32)>) {
        let (line, column) = start.unwrap_or((self.line, self.column));
        let quote = self.current().unwrap_or('"');

        let is_triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        if is_triple {
            self.advance();
            self.advance();
            self.advance();
        } else {
            self.advance();
        }

        let mut content = String::new();
        while let Some(ch) = self.current() {
            if is_triple {
                if ch == quote && self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
            } else if ch == quote {
                self.advance();
                break;
            }

            if ch == '\\' && !is_triple {
                self.advance();
                if let Some(esc) = self.current() {
                    content.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
            } else {
                content.push(ch);
            }
            self.advance();
        }

        let kind = if is_fstring {
            TokenKind::FString
        } else if is_triple {
            TokenKind::DocString
        } else {
            TokenKind::Str
        };
        self.push_at(kind, content, line, column);
    }

    fn scan_identifier(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut name = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        let kind = TokenKind::keyword(&name).unwrap_or(TokenKind::Identifier);
        self.push_at(kind, name, line, column);
    }

    fn scan_operator(&mut self) -> Result<(), RunError> {
        let (line, column) = (self.line, self.column);
        let ch = self.current().expect("scan_operator called at EOF");

        if let Some(next) = self.peek(1) {
            let pair = match (ch, next) {
                ('=', '=') => Some(TokenKind::Equal),
                ('!', '=') => Some(TokenKind::NotEqual),
                ('<', '=') => Some(TokenKind::LessEqual),
                ('>', '=') => Some(TokenKind::GreaterEqual),
                _ => None,
            };
            if let Some(kind) = pair {
                self.push_at(kind, format!("{ch}{next}"), line, column);
                self.advance();
                self.advance();
                return Ok(());
            }
        }

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Multiply,
            '/' => TokenKind::Divide,
            '%' => TokenKind::Modulo,
            '=' => TokenKind::Assign,
            '!' => TokenKind::Not,
            '<' => TokenKind::LessThan,
            '>' => TokenKind::GreaterThan,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '|' => TokenKind::Or,
            '&' => TokenKind::And,
            other => {
                return Err(ExcType::syntax_error(format!(
                    "Unexpected character '{other}' at line {line}, col {column}"
                )));
            }
        };
        self.push_at(kind, ch.to_string(), line, column);
        self.advance();
        Ok(())
    }
}

enum BalanceError {
    Unterminated,
    InvalidChar(char),
}

/// Tokenizes a source string, discarding lexer internals.
pub fn tokenize(source: &str) -> Result<Vec<Token>, RunError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !matches!(k, TokenKind::Newline))
            .collect()
    }

    #[test]
    fn scans_simple_declaration() {
        assert_eq!(
            kinds("var x = 1"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn json_blob_in_value_position() {
        let tokens = tokenize(r#"var cfg = {"a": 1, "b": [1, 2]}"#).unwrap();
        let blob = tokens.iter().find(|t| t.kind == TokenKind::Object).unwrap();
        assert_eq!(blob.text, r#"{"a": 1, "b": [1, 2]}"#);
    }

    #[test]
    fn index_access_is_not_a_blob() {
        assert_eq!(
            kinds("a[0]"),
            vec![
                TokenKind::Identifier,
                TokenKind::LBracket,
                TokenKind::Number,
                TokenKind::RBracket,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn block_opener_is_not_a_blob() {
        let tokens = kinds("if x { y }");
        assert!(tokens.contains(&TokenKind::LBrace));
        assert!(!tokens.contains(&TokenKind::Object));
    }

    #[test]
    fn non_json_braces_roll_back() {
        // expression-bearing object literal fails serde_json validation and
        // falls through to individual punctuation
        let tokens = kinds("var m = {a: x}");
        assert!(tokens.contains(&TokenKind::LBrace));
        assert!(!tokens.contains(&TokenKind::Object));
    }

    #[test]
    fn fstring_token_captures_raw_content() {
        let tokens = tokenize(r#"f"hi {name}!""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FString);
        assert_eq!(tokens[0].text, "hi {name}!");
    }

    #[test]
    fn triple_quoted_is_docstring() {
        let tokens = tokenize("\"\"\"module doc\"\"\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::DocString);
        assert_eq!(tokens[0].text, "module doc");
    }

    #[test]
    fn string_escapes_decode() {
        let tokens = tokenize(r#""a\nb\tc\\d""#).unwrap();
        assert_eq!(tokens[0].text, "a\nb\tc\\d");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("# line\n// other\n/* block\nstill */ 1"),
            vec![TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn multi_char_operators() {
        assert_eq!(
            kinds("a == b != c <= d >= e"),
            vec![
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::Identifier,
                TokenKind::NotEqual,
                TokenKind::Identifier,
                TokenKind::LessEqual,
                TokenKind::Identifier,
                TokenKind::GreaterEqual,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("a\n  b").unwrap();
        let b = tokens.iter().find(|t| t.text == "b").unwrap();
        assert_eq!((b.line, b.column), (2, 3));
    }

    #[test]
    fn unknown_character_is_an_error() {
        assert!(tokenize("a @ b").is_err());
    }

    #[test]
    fn relex_is_stable() {
        let source = r#"fn f(x: int) { return f"v={x}" } var l = [1, 2]"#;
        let first: Vec<(TokenKind, String)> = tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect();
        let second: Vec<(TokenKind, String)> = tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect();
        assert_eq!(first, second);
    }
}
