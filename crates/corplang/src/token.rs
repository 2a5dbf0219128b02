use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Token kinds produced by the lexer.
///
/// The set is closed: every character sequence the lexer accepts maps onto
/// exactly one of these. The parser filters `Newline` tokens and treats the
/// trailing `Eof` as the end-of-stream sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum TokenKind {
    // JSON structures captured whole by the blob heuristic
    Null,
    Array,
    Object,

    // Literals
    Number,
    Str,
    DocString,
    FString,
    Boolean,

    Identifier,

    // Arithmetic operators
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // Logical
    And,
    Or,
    Not,

    Assign,

    // Keywords
    Var,
    Intent,
    Fn,
    If,
    Else,
    While,
    For,
    In,
    Of,
    Return,
    Break,
    Continue,
    Try,
    Catch,
    Finally,
    Throw,

    // OOP
    Class,
    Extends,
    Implements,
    Interface,
    Abstract,
    Super,
    Static,
    Private,
    Public,
    Protected,
    Contract,
    Driver,
    New,
    This,

    With,

    // Data / AI surface keywords (parsed; execution is a collaborator concern)
    Enum,
    Model,
    Predict,
    Train,
    Analyze,
    Migration,
    Import,
    From,
    As,
    Async,
    Await,
    Agent,
    Run,
    Intelligence,
    Context,
    Execution,
    Allow,
    Deny,
    Provider,
    Capability,
    Loop,
    Using,
    Serve,
    Stop,
    Delete,
    Get,
    Set,
    Authentication,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Colon,
    Question,
    Comma,
    Dot,

    // Special
    Newline,
    Eof,
}

impl TokenKind {
    /// Resolves an identifier-shaped word to its keyword kind, if any.
    ///
    /// `true`/`false` both map to `Boolean`; `null` and `None` both map to
    /// `Null`. Everything else falls through to `Identifier` in the lexer.
    pub fn keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "var" => Self::Var,
            "intent" => Self::Intent,
            "fn" => Self::Fn,
            "async" => Self::Async,
            "await" => Self::Await,
            "class" => Self::Class,
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "interface" => Self::Interface,
            "abstract" => Self::Abstract,
            "static" => Self::Static,
            "private" => Self::Private,
            "public" => Self::Public,
            "protected" => Self::Protected,
            "contract" => Self::Contract,
            "driver" => Self::Driver,
            "new" => Self::New,
            "this" => Self::This,
            "super" => Self::Super,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "for" => Self::For,
            "in" => Self::In,
            "of" => Self::Of,
            "return" => Self::Return,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "true" | "false" => Self::Boolean,
            "null" | "None" => Self::Null,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "enum" => Self::Enum,
            "model" => Self::Model,
            "predict" => Self::Predict,
            "train" => Self::Train,
            "analyze" => Self::Analyze,
            "migration" => Self::Migration,
            "import" => Self::Import,
            "from" => Self::From,
            "as" => Self::As,
            "try" => Self::Try,
            "catch" => Self::Catch,
            "finally" => Self::Finally,
            "throw" => Self::Throw,
            "with" => Self::With,
            "agent" => Self::Agent,
            "run" => Self::Run,
            "intelligence" => Self::Intelligence,
            "context" => Self::Context,
            "execution" => Self::Execution,
            "allow" => Self::Allow,
            "deny" => Self::Deny,
            "provider" => Self::Provider,
            "capability" => Self::Capability,
            "loop" => Self::Loop,
            "using" => Self::Using,
            "serve" => Self::Serve,
            "stop" => Self::Stop,
            "delete" => Self::Delete,
            "get" => Self::Get,
            "set" => Self::Set,
            "authentication" => Self::Authentication,
            _ => return None,
        };
        Some(kind)
    }

    /// Keywords that are accepted where an identifier is expected.
    ///
    /// Method/field/parameter names, import path segments and type names may
    /// reuse these words; the parser calls this through
    /// `TokenStream::expect_identifier_like`.
    pub fn is_identifier_like(self) -> bool {
        matches!(
            self,
            Self::Identifier
                | Self::Fn
                | Self::Import
                | Self::Driver
                | Self::From
                | Self::As
                | Self::In
                | Self::Of
                | Self::Train
                | Self::Run
                | Self::Predict
                | Self::Stop
                | Self::Analyze
                | Self::Using
                | Self::Provider
                | Self::Capability
                | Self::Null
                | Self::Context
                | Self::Static
                | Self::Async
                | Self::Await
                | Self::Public
                | Self::Private
                | Self::Protected
                | Self::Delete
                | Self::Get
                | Self::Set
        )
    }
}

/// A single token produced by the lexer.
///
/// Tokens are immutable; `text` holds the raw value (for strings, the decoded
/// content; for JSON blobs, the captured source substring).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_resolve() {
        assert_eq!(TokenKind::keyword("fn"), Some(TokenKind::Fn));
        assert_eq!(TokenKind::keyword("intent"), Some(TokenKind::Intent));
        assert_eq!(TokenKind::keyword("None"), Some(TokenKind::Null));
        assert_eq!(TokenKind::keyword("true"), Some(TokenKind::Boolean));
        assert_eq!(TokenKind::keyword("frobnicate"), None);
    }

    #[test]
    fn identifier_like_covers_soft_keywords() {
        assert!(TokenKind::Run.is_identifier_like());
        assert!(TokenKind::Get.is_identifier_like());
        assert!(!TokenKind::Class.is_identifier_like());
        assert!(!TokenKind::Return.is_identifier_like());
    }
}
