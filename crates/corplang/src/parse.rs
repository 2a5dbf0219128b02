//! Recursive-descent parser over the token stream.
//!
//! The stream drops `NEWLINE` tokens up front: semicolons are optional and
//! statements end where the next token cannot continue the current
//! production. Lookahead disambiguates `name<…>` generics from comparisons,
//! named call arguments from expressions, and the three `for` headers.
//! Recovery always makes forward progress so a bad statement cannot wedge the
//! parser; collected errors surface as `SyntaxError`s.

use std::{fmt, rc::Rc};

use crate::{
    ast::{
        BinOp, CallArg, CatchClause, ClassDef, ClassMember, CodeLoc, EnumDef, FStringPart, FieldDef, FunctionDef,
        InterfaceDef, Literal, MethodDef, Node, NodeVariant, Param, TypeExpr, UnOp, WithItem,
    },
    diagnostics::Exception,
    exceptions::RunError,
    lexer::tokenize,
    token::{Token, TokenKind},
};

/// A parse failure with position and expectation context.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
    pub expected: String,
    pub found: String,
}

impl SyntaxError {
    fn new(token: Option<&Token>, offset: usize, expected: impl Into<String>) -> Self {
        Self {
            line: token.map_or(0, |t| t.line),
            column: token.map_or(0, |t| t.column),
            offset,
            expected: expected.into(),
            found: token.map_or_else(|| "EOF".to_string(), |t| <&str>::from(t.kind).to_string()),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Syntax error at line {}, column {} (offset {}): expected {}, found {}.",
            self.line, self.column, self.offset, self.expected, self.found
        )
    }
}

type ParseOutcome<T> = Result<T, SyntaxError>;

/// Cursor over the newline-filtered token list.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_iter().filter(|t| t.kind != TokenKind::Newline).collect(),
            pos: 0,
        }
    }

    pub fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    pub fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Clones the current token and advances past it.
    pub fn bump(&mut self) -> Option<Token> {
        let token = self.current().cloned();
        if token.is_some() {
            self.advance();
        }
        token
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.current().is_some_and(|t| t.kind == kind)
    }

    /// Consumes and returns the current token when its kind is one of `kinds`.
    pub fn eat(&mut self, kinds: &[TokenKind]) -> Option<Token> {
        let matched = self.current().is_some_and(|t| kinds.contains(&t.kind));
        if matched { self.bump() } else { None }
    }

    pub fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseOutcome<Token> {
        if self.check(kind) {
            return Ok(self.bump().expect("checked token exists"));
        }
        Err(SyntaxError::new(self.current(), self.pos, expected))
    }

    /// Accepts an identifier or any keyword usable in identifier position.
    pub fn expect_identifier_like(&mut self) -> ParseOutcome<Token> {
        if self.current().is_some_and(|t| t.kind.is_identifier_like()) {
            return Ok(self.bump().expect("checked token exists"));
        }
        Err(SyntaxError::new(self.current(), self.pos, "identifier"))
    }

    pub fn eof(&self) -> bool {
        self.current().is_none_or(|t| t.kind == TokenKind::Eof)
    }
}

/// Parses `source` into a `Program` node.
///
/// All collected syntax errors abort the parse; the first is reported with
/// its position.
pub fn parse(source: &str, file: &str) -> Result<Node, Exception> {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(RunError::Exc(exc)) => return Err(exc.into_public()),
        Err(RunError::Internal(msg)) => return Err(Exception::syntax(msg.to_string())),
    };
    let mut parser = Parser::new(tokens, file);
    let program = parser.parse_program();
    match parser.errors.into_iter().next() {
        Some(err) => Err(Exception::syntax(err.to_string())),
        None => Ok(program),
    }
}

pub struct Parser {
    stream: TokenStream,
    file: Rc<str>,
    errors: Vec<SyntaxError>,
}

struct Modifiers {
    is_async: bool,
    is_static: bool,
    is_private: bool,
    is_abstract: bool,
}

impl Parser {
    #[must_use]
    pub fn new(tokens: Vec<Token>, file: &str) -> Self {
        Self {
            stream: TokenStream::new(tokens),
            file: Rc::from(file),
            errors: Vec::new(),
        }
    }

    fn node(&self, variant: NodeVariant, token: &Token) -> Node {
        Node::new(variant, CodeLoc::new(token.line, token.column), self.file.clone())
    }

    fn node_at(&self, variant: NodeVariant, loc: CodeLoc) -> Node {
        Node::new(variant, loc, self.file.clone())
    }

    pub fn parse_program(&mut self) -> Node {
        let docstring = if self.stream.check(TokenKind::DocString) {
            self.stream.bump().map(|t| Rc::from(t.text.as_str()))
        } else {
            None
        };

        let mut statements = Vec::new();
        while !self.stream.eof() {
            let start = self.stream.pos;
            match self.parse_top_level() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => {
                    // Stray closer or filler token; step over it.
                    if self.stream.pos == start {
                        self.stream.advance();
                    }
                }
                Err(err) => {
                    self.errors.push(err);
                    if self.stream.pos == start {
                        self.stream.advance();
                    }
                }
            }
            // Safeguard against a production that consumed nothing.
            if self.stream.pos == start && !self.stream.eof() {
                self.stream.advance();
            }
        }

        Node::new(
            NodeVariant::Program { docstring, statements },
            CodeLoc::new(1, 1),
            self.file.clone(),
        )
    }

    fn collect_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers {
            is_async: false,
            is_static: false,
            is_private: false,
            is_abstract: false,
        };
        while let Some(token) = self.stream.eat(&[
            TokenKind::Public,
            TokenKind::Private,
            TokenKind::Protected,
            TokenKind::Static,
            TokenKind::Abstract,
            TokenKind::Async,
        ]) {
            match token.kind {
                TokenKind::Async => modifiers.is_async = true,
                TokenKind::Static => modifiers.is_static = true,
                TokenKind::Private => modifiers.is_private = true,
                TokenKind::Abstract => modifiers.is_abstract = true,
                _ => {}
            }
        }
        modifiers
    }

    fn parse_top_level(&mut self) -> ParseOutcome<Option<Node>> {
        let modifiers = self.collect_modifiers();
        let Some(token) = self.stream.current() else {
            return Ok(None);
        };

        let stmt = match token.kind {
            TokenKind::Eof => return Ok(None),
            TokenKind::RBrace => {
                // Unmatched closer at top level; parse_program advances past it.
                return Ok(None);
            }
            TokenKind::Intent | TokenKind::Fn if self.looks_like_function_decl() => {
                self.parse_function_declaration(modifiers.is_async)?
            }
            TokenKind::Class | TokenKind::Driver => self.parse_class_declaration()?,
            TokenKind::Agent => self.parse_agent_statement()?,
            TokenKind::Import => self.parse_import_declaration()?,
            TokenKind::From => self.parse_from_import_declaration()?,
            TokenKind::Interface => self.parse_interface_declaration(false)?,
            TokenKind::Contract => self.parse_interface_declaration(true)?,
            TokenKind::Enum => self.parse_enum_declaration()?,
            TokenKind::Model => self.parse_model_declaration()?,
            TokenKind::Migration => self.parse_migration_declaration()?,
            _ => self.parse_statement()?,
        };
        Ok(Some(stmt))
    }

    /// `fn name(` is a declaration; `fn (` is a lambda expression statement.
    fn looks_like_function_decl(&self) -> bool {
        self.stream
            .peek(1)
            .is_some_and(|t| t.kind.is_identifier_like() && t.kind != TokenKind::Fn)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> ParseOutcome<Node> {
        let Some(token) = self.stream.current() else {
            return Err(SyntaxError::new(None, self.stream.pos, "statement"));
        };

        match token.kind {
            TokenKind::Var => self.parse_var_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::With => self.parse_with_statement(),
            TokenKind::Serve => self.parse_serve_statement(),
            TokenKind::Stop => self.parse_stop_statement(),
            TokenKind::Delete => self.parse_delete_statement(),
            TokenKind::Loop => self.parse_loop_statement(),
            TokenKind::Enum => self.parse_enum_declaration(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Intent | TokenKind::Fn if self.looks_like_function_decl() => {
                self.parse_function_declaration(false)
            }
            TokenKind::Async
                if matches!(
                    self.stream.peek(1).map(|t| t.kind),
                    Some(TokenKind::Intent | TokenKind::Fn)
                ) =>
            {
                self.stream.advance();
                self.parse_function_declaration(true)
            }
            TokenKind::Break => {
                let token = self.stream.bump().expect("checked");
                self.stream.eat(&[TokenKind::Semicolon]);
                Ok(self.node(NodeVariant::Break, &token))
            }
            TokenKind::Continue => {
                let token = self.stream.bump().expect("checked");
                self.stream.eat(&[TokenKind::Semicolon]);
                Ok(self.node(NodeVariant::Continue, &token))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.stream.eat(&[TokenKind::Semicolon]);
                Ok(expr)
            }
        }
    }

    fn parse_block(&mut self) -> ParseOutcome<Vec<Node>> {
        self.stream.expect(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while let Some(token) = self.stream.current() {
            if token.kind == TokenKind::RBrace || token.kind == TokenKind::Eof {
                break;
            }
            let start = self.stream.pos;
            body.push(self.parse_statement()?);
            // Guarantee forward progress inside blocks.
            if self.stream.pos == start {
                self.stream.advance();
            }
        }
        self.stream.expect(TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    fn parse_block_or_single(&mut self) -> ParseOutcome<Vec<Node>> {
        if self.stream.check(TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_var_declaration(&mut self) -> ParseOutcome<Node> {
        let var_tok = self.stream.expect(TokenKind::Var, "'var'")?;
        let name_tok = self.stream.expect_identifier_like()?;

        let annotation = if self.stream.eat(&[TokenKind::Colon]).is_some() {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        self.stream.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_expression()?;
        self.stream.eat(&[TokenKind::Semicolon]);

        Ok(self.node(
            NodeVariant::Var {
                name: Rc::from(name_tok.text.as_str()),
                annotation,
                value: Box::new(value),
            },
            &var_tok,
        ))
    }

    fn parse_if_statement(&mut self) -> ParseOutcome<Node> {
        let if_tok = self.stream.expect(TokenKind::If, "'if'")?;
        let condition = if self.stream.eat(&[TokenKind::LParen]).is_some() {
            let condition = self.parse_expression()?;
            self.stream.expect(TokenKind::RParen, "')'")?;
            condition
        } else {
            self.parse_expression()?
        };

        let then_branch = self.parse_block_or_single()?;
        let else_branch = if self.stream.eat(&[TokenKind::Else]).is_some() {
            Some(self.parse_block_or_single()?)
        } else {
            None
        };

        Ok(self.node(
            NodeVariant::If {
                condition: Box::new(condition),
                then_branch,
                else_branch,
            },
            &if_tok,
        ))
    }

    fn parse_while_statement(&mut self) -> ParseOutcome<Node> {
        let while_tok = self.stream.expect(TokenKind::While, "'while'")?;
        let condition = if self.stream.eat(&[TokenKind::LParen]).is_some() {
            let condition = self.parse_expression()?;
            self.stream.expect(TokenKind::RParen, "')'")?;
            condition
        } else {
            self.parse_expression()?
        };
        let body = self.parse_block()?;
        Ok(self.node(
            NodeVariant::While {
                condition: Box::new(condition),
                body,
            },
            &while_tok,
        ))
    }

    fn parse_for_statement(&mut self) -> ParseOutcome<Node> {
        let for_tok = self.stream.expect(TokenKind::For, "'for'")?;
        self.stream.expect(TokenKind::LParen, "'('")?;

        // Dispatch on the loop-header shape: `var x in/of`, `x in/of`, or the
        // three-part C-style header.
        let header_kind = |offset: usize, stream: &TokenStream| stream.peek(offset).map(|t| t.kind);
        let dispatch = if self.stream.check(TokenKind::Var) {
            header_kind(2, &self.stream)
        } else {
            header_kind(1, &self.stream)
        };

        match dispatch {
            Some(TokenKind::In) => self.parse_for_in_statement(&for_tok, false),
            Some(TokenKind::Of) => self.parse_for_in_statement(&for_tok, true),
            _ => self.parse_standard_for_statement(&for_tok),
        }
    }

    fn parse_for_in_statement(&mut self, for_tok: &Token, is_of: bool) -> ParseOutcome<Node> {
        self.stream.eat(&[TokenKind::Var]);
        let var_tok = self.stream.expect(TokenKind::Identifier, "loop variable")?;
        if is_of {
            self.stream.expect(TokenKind::Of, "'of'")?;
        } else {
            self.stream.expect(TokenKind::In, "'in'")?;
        }
        let iterable = self.parse_expression()?;
        self.stream.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;

        let variable = Rc::from(var_tok.text.as_str());
        let variant = if is_of {
            NodeVariant::ForOf {
                variable,
                iterable: Box::new(iterable),
                body,
            }
        } else {
            NodeVariant::ForIn {
                variable,
                iterable: Box::new(iterable),
                body,
            }
        };
        Ok(self.node(variant, for_tok))
    }

    fn parse_standard_for_statement(&mut self, for_tok: &Token) -> ParseOutcome<Node> {
        let init = if self.stream.check(TokenKind::Semicolon) {
            self.stream.advance();
            None
        } else if self.stream.check(TokenKind::Var) {
            Some(Box::new(self.parse_var_declaration()?))
        } else {
            let expr = self.parse_expression()?;
            self.stream.eat(&[TokenKind::Semicolon]);
            Some(Box::new(expr))
        };

        let condition = if self.stream.check(TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.stream.expect(TokenKind::Semicolon, "';'")?;

        let update = if self.stream.check(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.stream.expect(TokenKind::RParen, "')'")?;

        let body = self.parse_block_or_single()?;
        Ok(self.node(
            NodeVariant::For {
                init,
                condition,
                update,
                body,
            },
            for_tok,
        ))
    }

    fn parse_try_statement(&mut self) -> ParseOutcome<Node> {
        let try_tok = self.stream.expect(TokenKind::Try, "'try'")?;
        let body = self.parse_block()?;

        let mut catches = Vec::new();
        while self.stream.check(TokenKind::Catch) {
            let catch_tok = self.stream.bump().expect("checked");
            let has_paren = self.stream.eat(&[TokenKind::LParen]).is_some();

            let var_tok = self.stream.expect(TokenKind::Identifier, "exception variable")?;
            if self.stream.eat(&[TokenKind::Colon]).is_none() {
                return Err(SyntaxError::new(Some(&var_tok), self.stream.pos, "typed catch"));
            }
            let exception_type = self.parse_type_annotation()?;
            if exception_type.base.eq_ignore_ascii_case("any") {
                return Err(SyntaxError::new(
                    Some(&catch_tok),
                    self.stream.pos,
                    "specific exception type",
                ));
            }

            if has_paren {
                self.stream.expect(TokenKind::RParen, "')'")?;
            }

            let clause_body = self.parse_block()?;
            catches.push(CatchClause {
                exception_type,
                variable: Some(Rc::from(var_tok.text.as_str())),
                body: clause_body,
                loc: CodeLoc::new(catch_tok.line, catch_tok.column),
            });
        }

        let finally = if self.stream.eat(&[TokenKind::Finally]).is_some() {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(self.node(NodeVariant::Try { body, catches, finally }, &try_tok))
    }

    fn parse_throw_statement(&mut self) -> ParseOutcome<Node> {
        let throw_tok = self.stream.expect(TokenKind::Throw, "'throw'")?;
        let expr = self.parse_expression()?;
        self.stream.eat(&[TokenKind::Semicolon]);
        Ok(self.node(NodeVariant::Throw { expr: Box::new(expr) }, &throw_tok))
    }

    fn parse_with_statement(&mut self) -> ParseOutcome<Node> {
        let with_tok = self.stream.expect(TokenKind::With, "'with'")?;
        self.stream.expect(TokenKind::LParen, "'('")?;

        let mut items = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            let target = if self.stream.eat(&[TokenKind::As]).is_some() {
                let name = self.stream.expect(TokenKind::Identifier, "binding name")?;
                Some(Rc::from(name.text.as_str()))
            } else {
                None
            };
            items.push(WithItem { expr, target });
            if self.stream.eat(&[TokenKind::Comma]).is_none() {
                break;
            }
        }
        self.stream.expect(TokenKind::RParen, "')'")?;

        let body = self.parse_block()?;
        Ok(self.node(NodeVariant::With { items, body }, &with_tok))
    }

    fn parse_delete_statement(&mut self) -> ParseOutcome<Node> {
        let delete_tok = self.stream.expect(TokenKind::Delete, "'delete'")?;
        let target = self.parse_expression()?;
        self.stream.eat(&[TokenKind::Semicolon]);
        Ok(self.node(
            NodeVariant::Delete {
                target: Box::new(target),
            },
            &delete_tok,
        ))
    }

    fn parse_loop_statement(&mut self) -> ParseOutcome<Node> {
        let loop_tok = self.stream.expect(TokenKind::Loop, "'loop'")?;

        // `loop stdin using Agent` wires the interaction adapter, which lives
        // in an external runtime; the body-less form still has to parse.
        if self.stream.current().is_some_and(|t| t.kind == TokenKind::Identifier && t.text == "stdin") {
            self.stream.advance();
            if self.stream.eat(&[TokenKind::Using]).is_some() {
                self.stream.expect(TokenKind::Identifier, "agent name")?;
            }
            return Ok(self.node(
                NodeVariant::Loop {
                    body: Vec::new(),
                    uses_adapter: true,
                },
                &loop_tok,
            ));
        }

        let body = self.parse_block_or_single()?;
        Ok(self.node(
            NodeVariant::Loop {
                body,
                uses_adapter: false,
            },
            &loop_tok,
        ))
    }

    fn parse_serve_statement(&mut self) -> ParseOutcome<Node> {
        let serve_tok = self.stream.expect(TokenKind::Serve, "'serve'")?;
        let adapter_tok = self.stream.expect_identifier_like()?;
        let mut name = String::from("unnamed");

        // `serve http port 8361 name myserver using MyAgent`
        while let Some(key_tok) = self.stream.eat(&[TokenKind::Identifier, TokenKind::Using]) {
            if key_tok.kind == TokenKind::Using {
                self.stream.expect(TokenKind::Identifier, "agent name")?;
                continue;
            }
            match key_tok.text.as_str() {
                "port" => {
                    self.stream.expect(TokenKind::Number, "port number")?;
                }
                "host" | "name" => {
                    let value = self
                        .stream
                        .eat(&[TokenKind::Str, TokenKind::Identifier])
                        .ok_or_else(|| SyntaxError::new(self.stream.current(), self.stream.pos, "value"))?;
                    if key_tok.text == "name" {
                        name = value.text;
                    }
                }
                _ => {
                    self.stream.eat(&[TokenKind::Number, TokenKind::Str, TokenKind::Identifier]);
                }
            }
        }
        self.stream.eat(&[TokenKind::Semicolon]);

        Ok(self.node(
            NodeVariant::Serve {
                adapter: Rc::from(adapter_tok.text.as_str()),
                name: Rc::from(name.as_str()),
            },
            &serve_tok,
        ))
    }

    fn parse_stop_statement(&mut self) -> ParseOutcome<Node> {
        let stop_tok = self.stream.expect(TokenKind::Stop, "'stop'")?;
        let target = self.stream.expect(TokenKind::Identifier, "server name")?;
        self.stream.eat(&[TokenKind::Semicolon]);
        Ok(self.node(
            NodeVariant::StopServer {
                target: Rc::from(target.text.as_str()),
            },
            &stop_tok,
        ))
    }

    fn parse_return_statement(&mut self) -> ParseOutcome<Node> {
        let return_tok = self.stream.expect(TokenKind::Return, "'return'")?;
        let has_value = self
            .stream
            .current()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof));
        let value = if has_value {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.stream.eat(&[TokenKind::Semicolon]);
        Ok(self.node(NodeVariant::Return { value }, &return_tok))
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_params(&mut self) -> ParseOutcome<Vec<Param>> {
        let mut params = Vec::new();
        self.stream.expect(TokenKind::LParen, "'('")?;
        if !self.stream.check(TokenKind::RParen) {
            loop {
                let name_tok = self.stream.expect_identifier_like()?;
                let annotation = if self.stream.eat(&[TokenKind::Colon]).is_some() {
                    Some(self.parse_type_annotation()?)
                } else {
                    None
                };
                let default = if self.stream.eat(&[TokenKind::Assign]).is_some() {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                params.push(Param {
                    name: Rc::from(name_tok.text.as_str()),
                    annotation,
                    default,
                });
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
        }
        self.stream.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_generic_params(&mut self) -> ParseOutcome<Vec<Rc<str>>> {
        let mut generic_params = Vec::new();
        if self.stream.eat(&[TokenKind::LessThan]).is_some() {
            loop {
                let name = self.stream.expect_identifier_like()?;
                generic_params.push(Rc::from(name.text.as_str()));
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
            self.stream.expect(TokenKind::GreaterThan, "'>'")?;
        }
        Ok(generic_params)
    }

    fn parse_return_type(&mut self) -> ParseOutcome<Option<TypeExpr>> {
        // `: type` or `-> type`
        if self.stream.eat(&[TokenKind::Colon]).is_some() {
            return Ok(Some(self.parse_type_annotation()?));
        }
        if self.stream.check(TokenKind::Minus) && self.stream.peek(1).is_some_and(|t| t.kind == TokenKind::GreaterThan)
        {
            self.stream.advance();
            self.stream.advance();
            return Ok(Some(self.parse_type_annotation()?));
        }
        Ok(None)
    }

    fn parse_function_declaration(&mut self, is_async: bool) -> ParseOutcome<Node> {
        let fn_tok = self
            .stream
            .eat(&[TokenKind::Intent, TokenKind::Fn])
            .ok_or_else(|| SyntaxError::new(self.stream.current(), self.stream.pos, "intent or fn"))?;
        let name_tok = self.stream.expect_identifier_like()?;
        let generic_params = self.parse_generic_params()?;
        let params = self.parse_params()?;
        let return_type = self.parse_return_type()?;

        let docstring = if self.stream.check(TokenKind::DocString) {
            self.stream.bump().map(|t| Rc::from(t.text.as_str()))
        } else {
            None
        };

        let mut def = FunctionDef {
            name: Some(Rc::from(name_tok.text.as_str())),
            params,
            return_type,
            generic_params,
            is_async,
            docstring,
            body: Vec::new(),
            loc: CodeLoc::new(fn_tok.line, fn_tok.column),
            file: self.file.clone(),
        };
        def.body = self.parse_block()?;
        Ok(self.node(NodeVariant::Function(Rc::new(def)), &fn_tok))
    }

    fn parse_class_declaration(&mut self) -> ParseOutcome<Node> {
        let class_tok = self
            .stream
            .eat(&[TokenKind::Class, TokenKind::Driver])
            .ok_or_else(|| SyntaxError::new(self.stream.current(), self.stream.pos, "class or driver"))?;
        let is_driver = class_tok.kind == TokenKind::Driver;
        let name_tok = self.stream.expect_identifier_like()?;
        let generic_params = self.parse_generic_params()?;

        let extends = if self.stream.eat(&[TokenKind::Extends]).is_some() {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let mut implements = Vec::new();
        if self.stream.eat(&[TokenKind::Implements]).is_some() {
            loop {
                implements.push(self.parse_type_annotation()?);
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
        }

        self.stream.expect(TokenKind::LBrace, "'{'")?;
        let mut docstring = None;
        let mut members = Vec::new();
        while let Some(token) = self.stream.current() {
            if token.kind == TokenKind::RBrace || token.kind == TokenKind::Eof {
                break;
            }
            if token.kind == TokenKind::DocString {
                docstring = self.stream.bump().map(|t| Rc::from(t.text.as_str()));
                continue;
            }

            let modifiers = self.collect_modifiers();
            match self.stream.current().map(|t| t.kind) {
                Some(TokenKind::Intent | TokenKind::Fn) => {
                    members.push(ClassMember::Method(Rc::new(self.parse_method_declaration(&modifiers)?)));
                }
                Some(TokenKind::Var | TokenKind::Identifier) => {
                    members.push(ClassMember::Field(Rc::new(self.parse_field_declaration(&modifiers)?)));
                }
                _ => self.stream.advance(),
            }
        }
        self.stream.expect(TokenKind::RBrace, "'}'")?;

        let def = ClassDef {
            name: Rc::from(name_tok.text.as_str()),
            extends,
            implements,
            generic_params,
            is_driver,
            docstring,
            members,
            loc: CodeLoc::new(class_tok.line, class_tok.column),
            file: self.file.clone(),
        };
        Ok(self.node(NodeVariant::Class(Rc::new(def)), &class_tok))
    }

    fn parse_method_declaration(&mut self, modifiers: &Modifiers) -> ParseOutcome<MethodDef> {
        let fn_tok = self
            .stream
            .eat(&[TokenKind::Intent, TokenKind::Fn])
            .ok_or_else(|| SyntaxError::new(self.stream.current(), self.stream.pos, "intent or fn"))?;
        let name_tok = self.stream.expect_identifier_like()?;
        let generic_params = self.parse_generic_params()?;
        let params = self.parse_params()?;
        let return_type = self.parse_return_type()?;

        let docstring = if self.stream.check(TokenKind::DocString) {
            self.stream.bump().map(|t| Rc::from(t.text.as_str()))
        } else {
            None
        };

        let body = if self.stream.check(TokenKind::LBrace) {
            self.parse_block()?
        } else {
            // Abstract and interface methods carry no body.
            Vec::new()
        };

        Ok(MethodDef {
            def: Rc::new(FunctionDef {
                name: Some(Rc::from(name_tok.text.as_str())),
                params,
                return_type,
                generic_params,
                is_async: modifiers.is_async,
                docstring,
                body,
                loc: CodeLoc::new(fn_tok.line, fn_tok.column),
                file: self.file.clone(),
            }),
            is_private: modifiers.is_private,
            is_static: modifiers.is_static,
            is_abstract: modifiers.is_abstract,
        })
    }

    fn parse_field_declaration(&mut self, modifiers: &Modifiers) -> ParseOutcome<FieldDef> {
        self.stream.eat(&[TokenKind::Var]);
        let name_tok = self.stream.expect_identifier_like()?;

        let annotation = if self.stream.eat(&[TokenKind::Colon]).is_some() {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let value = if self.stream.eat(&[TokenKind::Assign]).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.stream.eat(&[TokenKind::Semicolon]);

        Ok(FieldDef {
            name: Rc::from(name_tok.text.as_str()),
            annotation,
            value,
            is_private: modifiers.is_private,
            is_static: modifiers.is_static,
            loc: CodeLoc::new(name_tok.line, name_tok.column),
            file: self.file.clone(),
        })
    }

    fn parse_interface_declaration(&mut self, is_contract: bool) -> ParseOutcome<Node> {
        let kw_tok = self
            .stream
            .eat(&[TokenKind::Interface, TokenKind::Contract])
            .ok_or_else(|| SyntaxError::new(self.stream.current(), self.stream.pos, "interface or contract"))?;
        let name_tok = self.stream.expect(TokenKind::Identifier, "interface name")?;
        let generic_params = self.parse_generic_params()?;

        let mut extends = Vec::new();
        if self.stream.eat(&[TokenKind::Extends]).is_some() {
            loop {
                let parent = self.stream.expect(TokenKind::Identifier, "parent name")?;
                extends.push(Rc::from(parent.text.as_str()));
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
        }

        self.stream.expect(TokenKind::LBrace, "'{'")?;
        let mut methods = Vec::new();
        while let Some(token) = self.stream.current() {
            if token.kind == TokenKind::RBrace || token.kind == TokenKind::Eof {
                break;
            }
            if matches!(token.kind, TokenKind::Intent | TokenKind::Fn) {
                let modifiers = Modifiers {
                    is_async: false,
                    is_static: false,
                    is_private: false,
                    is_abstract: true,
                };
                methods.push(Rc::new(self.parse_method_declaration(&modifiers)?));
            } else {
                self.stream.advance();
            }
        }
        self.stream.expect(TokenKind::RBrace, "'}'")?;

        let def = Rc::new(InterfaceDef {
            name: Rc::from(name_tok.text.as_str()),
            extends,
            generic_params,
            methods,
            loc: CodeLoc::new(kw_tok.line, kw_tok.column),
            file: self.file.clone(),
        });
        let variant = if is_contract {
            NodeVariant::Contract(def)
        } else {
            NodeVariant::Interface(def)
        };
        Ok(self.node(variant, &kw_tok))
    }

    fn parse_enum_declaration(&mut self) -> ParseOutcome<Node> {
        let enum_tok = self.stream.expect(TokenKind::Enum, "'enum'")?;
        let name_tok = self.stream.expect_identifier_like()?;
        self.stream.expect(TokenKind::LBrace, "'{'")?;

        let mut members: Vec<(Rc<str>, Rc<str>)> = Vec::new();
        while let Some(token) = self.stream.current() {
            if token.kind == TokenKind::RBrace || token.kind == TokenKind::Eof {
                break;
            }
            if !token.kind.is_identifier_like() {
                self.stream.advance();
                continue;
            }
            let member_tok = self.stream.expect_identifier_like()?;
            let member_name: Rc<str> = Rc::from(member_tok.text.as_str());
            let value: Rc<str> = if self.stream.eat(&[TokenKind::Assign]).is_some() {
                let value_tok = self
                    .stream
                    .bump()
                    .ok_or_else(|| SyntaxError::new(None, self.stream.pos, "enum member value"))?;
                Rc::from(value_tok.text.as_str())
            } else {
                Rc::from(member_tok.text.to_lowercase().as_str())
            };
            members.push((member_name, value));
            self.stream.eat(&[TokenKind::Comma]);
        }
        self.stream.expect(TokenKind::RBrace, "'}'")?;

        Ok(self.node(
            NodeVariant::Enum(Rc::new(EnumDef {
                name: Rc::from(name_tok.text.as_str()),
                members,
                loc: CodeLoc::new(enum_tok.line, enum_tok.column),
                file: self.file.clone(),
            })),
            &enum_tok,
        ))
    }

    fn parse_dotted_module_path(&mut self) -> ParseOutcome<String> {
        let mut parts = vec![self.stream.expect_identifier_like()?.text];
        while self.stream.eat(&[TokenKind::Dot]).is_some() {
            parts.push(self.stream.expect_identifier_like()?.text);
        }
        Ok(parts.join("."))
    }

    fn parse_import_declaration(&mut self) -> ParseOutcome<Node> {
        let import_tok = self.stream.expect(TokenKind::Import, "'import'")?;
        let module = self.parse_dotted_module_path()?;
        self.stream.eat(&[TokenKind::Semicolon]);
        Ok(self.node(
            NodeVariant::Import {
                module: Rc::from(module.as_str()),
            },
            &import_tok,
        ))
    }

    fn parse_from_import_declaration(&mut self) -> ParseOutcome<Node> {
        let from_tok = self.stream.expect(TokenKind::From, "'from'")?;
        let module = self.parse_dotted_module_path()?;
        self.stream.expect(TokenKind::Import, "'import'")?;

        let mut items = Vec::new();
        loop {
            let name = self.stream.expect_identifier_like()?;
            let alias = if self.stream.eat(&[TokenKind::As]).is_some() {
                Some(Rc::from(self.stream.expect_identifier_like()?.text.as_str()))
            } else {
                None
            };
            items.push((Rc::from(name.text.as_str()), alias));
            if self.stream.eat(&[TokenKind::Comma]).is_none() {
                break;
            }
        }
        self.stream.eat(&[TokenKind::Semicolon]);

        Ok(self.node(
            NodeVariant::FromImport {
                module: Rc::from(module.as_str()),
                items,
            },
            &from_tok,
        ))
    }

    fn parse_model_declaration(&mut self) -> ParseOutcome<Node> {
        let model_tok = self.stream.expect(TokenKind::Model, "'model'")?;
        let name_tok = self.stream.expect_identifier_like()?;
        self.skip_balanced_braces()?;
        Ok(self.node(
            NodeVariant::ModelDecl {
                name: Rc::from(name_tok.text.as_str()),
            },
            &model_tok,
        ))
    }

    fn parse_migration_declaration(&mut self) -> ParseOutcome<Node> {
        let migration_tok = self.stream.expect(TokenKind::Migration, "'migration'")?;
        let name_tok = self.stream.expect(TokenKind::Identifier, "migration name")?;
        self.skip_balanced_braces()?;
        Ok(self.node(
            NodeVariant::MigrationDecl {
                name: Rc::from(name_tok.text.as_str()),
            },
            &migration_tok,
        ))
    }

    fn parse_agent_statement(&mut self) -> ParseOutcome<Node> {
        let agent_tok = self.stream.expect(TokenKind::Agent, "'agent'")?;

        // `agent train/run/predict/stop Name …` operation forms
        if let Some(op_tok) = self.stream.eat(&[
            TokenKind::Train,
            TokenKind::Run,
            TokenKind::Predict,
            TokenKind::Stop,
        ]) {
            let name_tok = self.stream.expect(TokenKind::Identifier, "agent name")?;
            // Consume an optional argument tail up to the statement boundary.
            if self.stream.eat(&[TokenKind::LParen]).is_some() {
                let mut depth = 1u32;
                while depth > 0 && !self.stream.eof() {
                    match self.stream.current().map(|t| t.kind) {
                        Some(TokenKind::LParen) => depth += 1,
                        Some(TokenKind::RParen) => depth -= 1,
                        _ => {}
                    }
                    self.stream.advance();
                }
            } else if op_tok.kind == TokenKind::Train && self.stream.eat(&[TokenKind::With]).is_some() {
                if self.stream.check(TokenKind::LBrace) {
                    self.skip_balanced_braces()?;
                } else {
                    self.parse_expression()?;
                }
            }
            self.stream.eat(&[TokenKind::Semicolon]);
            return Ok(self.node(
                NodeVariant::AgentDecl {
                    name: Rc::from(name_tok.text.as_str()),
                },
                &agent_tok,
            ));
        }

        let name_tok = self.stream.expect(TokenKind::Identifier, "agent name")?;
        self.skip_balanced_braces()?;
        Ok(self.node(
            NodeVariant::AgentDecl {
                name: Rc::from(name_tok.text.as_str()),
            },
            &agent_tok,
        ))
    }

    /// Consumes a `{ … }` region without interpreting its contents, used for
    /// declaration bodies whose semantics live in external collaborators.
    fn skip_balanced_braces(&mut self) -> ParseOutcome<()> {
        self.stream.expect(TokenKind::LBrace, "'{'")?;
        let mut depth = 1u32;
        while depth > 0 {
            match self.stream.current().map(|t| t.kind) {
                Some(TokenKind::LBrace) => depth += 1,
                Some(TokenKind::RBrace) => depth -= 1,
                Some(TokenKind::Eof) | None => {
                    return Err(SyntaxError::new(self.stream.current(), self.stream.pos, "'}'"));
                }
                _ => {}
            }
            self.stream.advance();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn parse_type_annotation(&mut self) -> ParseOutcome<TypeExpr> {
        let base_tok = self.stream.expect_identifier_like()?;
        let mut node = TypeExpr {
            base: Rc::from(base_tok.text.as_str()),
            args: Vec::new(),
        };

        if let Some(open) = self.stream.eat(&[TokenKind::LessThan, TokenKind::LBracket]) {
            let closing = if open.kind == TokenKind::LessThan {
                TokenKind::GreaterThan
            } else {
                TokenKind::RBracket
            };
            loop {
                node.args.push(self.parse_type_annotation()?);
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
            self.stream.expect(closing, "closing type bracket")?;
        }

        // `int|float` unions via the `|` operator
        if self.stream.check(TokenKind::Or) && self.stream.current().is_some_and(|t| t.text == "|") {
            let mut parts = vec![node];
            while self.stream.current().is_some_and(|t| t.kind == TokenKind::Or && t.text == "|") {
                self.stream.advance();
                parts.push(self.parse_type_annotation()?);
            }
            return Ok(TypeExpr {
                base: Rc::from("Union"),
                args: parts,
            });
        }

        // `Union<a, b>` normalises to the same representation.
        if &*node.base == "Union" {
            return Ok(node);
        }
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> ParseOutcome<Node> {
        if self.stream.check(TokenKind::Await) {
            return self.parse_await();
        }
        self.parse_assignment()
    }

    fn parse_await(&mut self) -> ParseOutcome<Node> {
        let await_tok = self.stream.expect(TokenKind::Await, "'await'")?;

        // `await handle;` with nothing following is the server-handle form.
        if self.stream.current().is_some_and(|t| t.kind == TokenKind::Identifier)
            && self
                .stream
                .peek(1)
                .is_none_or(|t| matches!(t.kind, TokenKind::Semicolon | TokenKind::Eof))
        {
            let target = self.stream.bump().expect("checked");
            self.stream.eat(&[TokenKind::Semicolon]);
            return Ok(self.node(
                NodeVariant::ServerAwait {
                    target: Rc::from(target.text.as_str()),
                },
                &await_tok,
            ));
        }

        let expr = self.parse_expression()?;
        Ok(self.node(NodeVariant::Await { expr: Box::new(expr) }, &await_tok))
    }

    fn parse_assignment(&mut self) -> ParseOutcome<Node> {
        let target = self.parse_ternary()?;
        if self.stream.eat(&[TokenKind::Assign]).is_some() {
            let loc = target.loc;
            let value = self.parse_expression()?;
            return Ok(self.node_at(
                NodeVariant::Assignment {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                loc,
            ));
        }
        Ok(target)
    }

    fn parse_ternary(&mut self) -> ParseOutcome<Node> {
        let condition = self.parse_or()?;
        if self.stream.eat(&[TokenKind::Question]).is_some() {
            let loc = condition.loc;
            let then_expr = self.parse_expression()?;
            self.stream.expect(TokenKind::Colon, "':'")?;
            let else_expr = self.parse_expression()?;
            return Ok(self.node_at(
                NodeVariant::Ternary {
                    condition: Box::new(condition),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                loc,
            ));
        }
        Ok(condition)
    }

    fn binary_ladder(
        &mut self,
        kinds: &[TokenKind],
        op_of: fn(&Token) -> BinOp,
        next: fn(&mut Self) -> ParseOutcome<Node>,
    ) -> ParseOutcome<Node> {
        let mut left = next(self)?;
        while let Some(op_tok) = self.stream.eat(kinds) {
            let right = next(self)?;
            let loc = CodeLoc::new(op_tok.line, op_tok.column);
            left = self.node_at(
                NodeVariant::BinaryOp {
                    op: op_of(&op_tok),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> ParseOutcome<Node> {
        self.binary_ladder(&[TokenKind::Or], |_| BinOp::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> ParseOutcome<Node> {
        self.binary_ladder(&[TokenKind::And], |_| BinOp::And, Self::parse_equality)
    }

    fn parse_equality(&mut self) -> ParseOutcome<Node> {
        self.binary_ladder(
            &[TokenKind::Equal, TokenKind::NotEqual],
            |t| {
                if t.kind == TokenKind::Equal {
                    BinOp::Eq
                } else {
                    BinOp::NotEq
                }
            },
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> ParseOutcome<Node> {
        self.binary_ladder(
            &[
                TokenKind::LessThan,
                TokenKind::GreaterThan,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::In,
            ],
            |t| match t.kind {
                TokenKind::LessThan => BinOp::Lt,
                TokenKind::GreaterThan => BinOp::Gt,
                TokenKind::LessEqual => BinOp::LtEq,
                TokenKind::GreaterEqual => BinOp::GtEq,
                _ => BinOp::In,
            },
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> ParseOutcome<Node> {
        self.binary_ladder(
            &[TokenKind::Plus, TokenKind::Minus],
            |t| {
                if t.kind == TokenKind::Plus {
                    BinOp::Add
                } else {
                    BinOp::Sub
                }
            },
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> ParseOutcome<Node> {
        self.binary_ladder(
            &[TokenKind::Multiply, TokenKind::Divide, TokenKind::Modulo],
            |t| match t.kind {
                TokenKind::Multiply => BinOp::Mul,
                TokenKind::Divide => BinOp::Div,
                _ => BinOp::Mod,
            },
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> ParseOutcome<Node> {
        if let Some(op_tok) = self.stream.eat(&[TokenKind::Minus, TokenKind::Not]) {
            let operand = self.parse_unary()?;
            let op = if op_tok.kind == TokenKind::Minus {
                UnOp::Neg
            } else {
                UnOp::Not
            };
            return Ok(self.node(
                NodeVariant::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                &op_tok,
            ));
        }
        self.parse_primary()
    }

    fn parse_lambda_expression(&mut self) -> ParseOutcome<Node> {
        let fn_tok = self.stream.expect(TokenKind::Fn, "'fn'")?;

        let params = if self.stream.check(TokenKind::LParen) {
            self.parse_params()?
        } else {
            Vec::new()
        };
        let return_type = if self.stream.eat(&[TokenKind::Colon]).is_some() {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let body = if self.stream.check(TokenKind::LBrace) {
            self.parse_block()?
        } else {
            vec![self.parse_expression()?]
        };

        Ok(self.node(
            NodeVariant::Lambda(Rc::new(FunctionDef {
                name: None,
                params,
                return_type,
                generic_params: Vec::new(),
                is_async: false,
                docstring: None,
                body,
                loc: CodeLoc::new(fn_tok.line, fn_tok.column),
                file: self.file.clone(),
            })),
            &fn_tok,
        ))
    }

    /// Scans forward from a `<` after an identifier to decide between generic
    /// type arguments and a comparison: a matching `>` before a hard
    /// delimiter means generics.
    fn looks_like_generic(&self) -> bool {
        if self.stream.peek(1).map(|t| t.kind) != Some(TokenKind::LessThan) {
            return false;
        }
        let mut lookahead = 2;
        while let Some(token) = self.stream.peek(lookahead) {
            match token.kind {
                TokenKind::Semicolon
                | TokenKind::LBrace
                | TokenKind::RBrace
                | TokenKind::RParen
                | TokenKind::LParen
                | TokenKind::Assign
                | TokenKind::Eof => return false,
                TokenKind::GreaterThan => return true,
                _ => lookahead += 1,
            }
        }
        false
    }

    fn parse_number_literal(&mut self) -> ParseOutcome<Node> {
        let token = self.stream.expect(TokenKind::Number, "number")?;
        let literal = if token.text.contains('.') {
            match token.text.parse::<f64>() {
                Ok(v) => Literal::Float(v),
                Err(_) => return Err(SyntaxError::new(Some(&token), self.stream.pos, "numeric literal")),
            }
        } else {
            match token.text.parse::<i64>() {
                Ok(v) => Literal::Int(v),
                Err(_) => return Err(SyntaxError::new(Some(&token), self.stream.pos, "numeric literal")),
            }
        };
        Ok(self.node(NodeVariant::Literal(literal), &token))
    }

    fn parse_primary(&mut self) -> ParseOutcome<Node> {
        let Some(token) = self.stream.current().cloned() else {
            return Err(SyntaxError::new(None, self.stream.pos, "expression"));
        };

        let node = match token.kind {
            TokenKind::Number => self.parse_number_literal()?,
            TokenKind::Str => {
                self.stream.advance();
                self.node(
                    NodeVariant::Literal(Literal::Str(Rc::from(token.text.as_str()))),
                    &token,
                )
            }
            TokenKind::DocString => {
                self.stream.advance();
                self.node(
                    NodeVariant::Literal(Literal::Str(Rc::from(token.text.as_str()))),
                    &token,
                )
            }
            TokenKind::Boolean => {
                self.stream.advance();
                self.node(NodeVariant::Literal(Literal::Bool(token.text == "true")), &token)
            }
            TokenKind::Null => {
                self.stream.advance();
                self.node(NodeVariant::NullLiteral, &token)
            }
            TokenKind::Fn => self.parse_lambda_expression()?,
            TokenKind::Object => {
                self.stream.advance();
                self.json_blob_to_node(&token)?
            }
            TokenKind::Array => {
                self.stream.advance();
                self.json_blob_to_node(&token)?
            }
            TokenKind::FString => {
                self.stream.advance();
                self.parse_fstring(&token)
            }
            TokenKind::LBracket => self.parse_array_literal()?,
            TokenKind::LBrace => self.parse_object_literal()?,
            TokenKind::New => self.parse_new_expression()?,
            TokenKind::This => {
                self.stream.advance();
                self.node(NodeVariant::This, &token)
            }
            TokenKind::Super => {
                self.stream.advance();
                self.node(NodeVariant::Super, &token)
            }
            TokenKind::LParen => {
                self.stream.advance();
                let inner = self.parse_expression()?;
                self.stream.expect(TokenKind::RParen, "')'")?;
                inner
            }
            kind if kind.is_identifier_like() => {
                if self.looks_like_generic() {
                    let name_tok = self.stream.expect_identifier_like()?;
                    self.stream.expect(TokenKind::LessThan, "'<'")?;
                    let mut args = Vec::new();
                    loop {
                        args.push(self.parse_type_annotation()?);
                        if self.stream.eat(&[TokenKind::Comma]).is_none() {
                            break;
                        }
                    }
                    self.stream.expect(TokenKind::GreaterThan, "'>'")?;
                    self.node(
                        NodeVariant::GenericIdentifier {
                            name: Rc::from(name_tok.text.as_str()),
                            args,
                        },
                        &name_tok,
                    )
                } else {
                    self.stream.advance();
                    self.node(
                        NodeVariant::Identifier {
                            name: Rc::from(token.text.as_str()),
                        },
                        &token,
                    )
                }
            }
            _ => return Err(SyntaxError::new(Some(&token), self.stream.pos, "expression")),
        };

        self.parse_access_and_call(node)
    }

    fn parse_access_and_call(&mut self, mut node: Node) -> ParseOutcome<Node> {
        loop {
            if self.stream.eat(&[TokenKind::Dot]).is_some() {
                let prop_tok = self.stream.expect_identifier_like()?;
                let loc = node.loc;
                node = self.node_at(
                    NodeVariant::PropertyAccess {
                        object: Box::new(node),
                        property: Rc::from(prop_tok.text.as_str()),
                    },
                    loc,
                );
            } else if self.stream.eat(&[TokenKind::LBracket]).is_some() {
                let index = self.parse_expression()?;
                self.stream.expect(TokenKind::RBracket, "']'")?;
                let loc = node.loc;
                node = self.node_at(
                    NodeVariant::IndexAccess {
                        object: Box::new(node),
                        index: Box::new(index),
                    },
                    loc,
                );
            } else if self.stream.eat(&[TokenKind::LParen]).is_some() {
                let args = self.parse_call_arguments()?;
                let loc = node.loc;
                node = self.node_at(
                    NodeVariant::FunctionCall {
                        callee: Box::new(node),
                        args,
                    },
                    loc,
                );
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// The opening paren is already consumed.
    fn parse_call_arguments(&mut self) -> ParseOutcome<Vec<CallArg>> {
        let mut args = Vec::new();
        if !self.stream.check(TokenKind::RParen) {
            loop {
                // Named argument: identifier-like followed by `=` or `:`.
                let name = if self.stream.current().is_some_and(|t| t.kind.is_identifier_like())
                    && self
                        .stream
                        .peek(1)
                        .is_some_and(|t| matches!(t.kind, TokenKind::Assign | TokenKind::Colon))
                {
                    let name_tok = self.stream.bump().expect("checked");
                    self.stream.advance(); // '=' or ':'
                    Some(Rc::from(name_tok.text.as_str()))
                } else {
                    None
                };

                let value = self.parse_expression()?;
                args.push(CallArg { name, value });
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
        }
        self.stream.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_new_expression(&mut self) -> ParseOutcome<Node> {
        let new_tok = self.stream.expect(TokenKind::New, "'new'")?;
        let class_tok = self.stream.expect_identifier_like()?;

        let mut type_args = Vec::new();
        if self.stream.eat(&[TokenKind::LessThan]).is_some() {
            loop {
                type_args.push(self.parse_type_annotation()?);
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
            self.stream.expect(TokenKind::GreaterThan, "'>'")?;
        }

        self.stream.expect(TokenKind::LParen, "'('")?;
        let args = self.parse_call_arguments()?;

        let node = self.node(
            NodeVariant::New {
                class_name: Rc::from(class_tok.text.as_str()),
                type_args,
                args,
            },
            &new_tok,
        );
        self.parse_access_and_call(node)
    }

    fn parse_array_literal(&mut self) -> ParseOutcome<Node> {
        let open_tok = self.stream.expect(TokenKind::LBracket, "'['")?;
        let mut items = Vec::new();
        if !self.stream.check(TokenKind::RBracket) {
            loop {
                items.push(self.parse_expression()?);
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
        }
        self.stream.expect(TokenKind::RBracket, "']'")?;
        Ok(self.node(NodeVariant::JsonArray { items }, &open_tok))
    }

    fn parse_object_literal(&mut self) -> ParseOutcome<Node> {
        let open_tok = self.stream.expect(TokenKind::LBrace, "'{'")?;
        let mut entries = Vec::new();
        if !self.stream.check(TokenKind::RBrace) {
            loop {
                let key_tok = self
                    .stream
                    .eat(&[TokenKind::Str, TokenKind::Identifier])
                    .ok_or_else(|| SyntaxError::new(self.stream.current(), self.stream.pos, "object key"))?;
                self.stream.expect(TokenKind::Colon, "':'")?;
                let value = self.parse_expression()?;
                entries.push((Rc::from(key_tok.text.as_str()), value));
                if self.stream.eat(&[TokenKind::Comma]).is_none() {
                    break;
                }
            }
        }
        self.stream.expect(TokenKind::RBrace, "'}'")?;
        Ok(self.node(NodeVariant::JsonObject { entries }, &open_tok))
    }

    /// Converts a lexer-captured JSON blob into literal nodes.
    fn json_blob_to_node(&mut self, token: &Token) -> ParseOutcome<Node> {
        let parsed: serde_json::Value = serde_json::from_str(&token.text)
            .map_err(|_| SyntaxError::new(Some(token), self.stream.pos, "valid JSON structure"))?;
        Ok(self.json_value_to_node(parsed, token))
    }

    fn json_value_to_node(&self, value: serde_json::Value, token: &Token) -> Node {
        let variant = match value {
            serde_json::Value::Null => NodeVariant::NullLiteral,
            serde_json::Value::Bool(b) => NodeVariant::Literal(Literal::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    NodeVariant::Literal(Literal::Int(i))
                } else {
                    NodeVariant::Literal(Literal::Float(n.as_f64().unwrap_or(0.0)))
                }
            }
            serde_json::Value::String(s) => NodeVariant::Literal(Literal::Str(Rc::from(s.as_str()))),
            serde_json::Value::Array(items) => NodeVariant::JsonArray {
                items: items
                    .into_iter()
                    .map(|item| self.json_value_to_node(item, token))
                    .collect(),
            },
            serde_json::Value::Object(entries) => NodeVariant::JsonObject {
                entries: entries
                    .into_iter()
                    .map(|(k, v)| (Rc::from(k.as_str()), self.json_value_to_node(v, token)))
                    .collect(),
            },
        };
        self.node(variant, token)
    }

    /// Splits f-string content into static text and embedded expressions.
    ///
    /// `{{`/`}}` escape literal braces; each `{…}` placeholder is re-lexed
    /// and parsed as an expression. Placeholders that fail to parse keep
    /// their raw text, matching the forgiving source behaviour.
    fn parse_fstring(&mut self, token: &Token) -> Node {
        let content: Vec<char> = token.text.chars().collect();
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut i = 0usize;

        let push_text = |parts: &mut Vec<FStringPart>, text: &str| {
            if text.is_empty() {
                return;
            }
            if let Some(FStringPart::Text(existing)) = parts.last_mut() {
                let merged = format!("{existing}{text}");
                *existing = Rc::from(merged.as_str());
            } else {
                parts.push(FStringPart::Text(Rc::from(text)));
            }
        };

        while i < content.len() {
            let ch = content[i];
            if ch == '{' && content.get(i + 1) == Some(&'{') {
                push_text(&mut parts, "{");
                i += 2;
                continue;
            }
            if ch == '}' && content.get(i + 1) == Some(&'}') {
                push_text(&mut parts, "}");
                i += 2;
                continue;
            }
            if ch == '{' {
                let mut j = i + 1;
                while j < content.len() && content[j] != '}' {
                    j += 1;
                }
                if j >= content.len() {
                    // Unmatched brace: keep the rest as literal text.
                    let rest: String = content[i..].iter().collect();
                    push_text(&mut parts, &rest);
                    break;
                }
                let expr_text: String = content[i + 1..j].iter().collect();
                let expr_text = expr_text.trim().to_string();
                match self.parse_embedded_expression(&expr_text) {
                    Some(expr) => parts.push(FStringPart::Expr(Box::new(expr))),
                    None => push_text(&mut parts, &format!("{{{expr_text}}}")),
                }
                i = j + 1;
                continue;
            }
            let mut j = i;
            while j < content.len() && content[j] != '{' && content[j] != '}' {
                j += 1;
            }
            let text: String = content[i..j].iter().collect();
            push_text(&mut parts, &text);
            i = j;
        }

        self.node(NodeVariant::InterpolatedString { parts }, token)
    }

    fn parse_embedded_expression(&self, text: &str) -> Option<Node> {
        let tokens = tokenize(text).ok()?;
        let mut inner = Parser::new(tokens, &self.file);
        let expr = inner.parse_expression().ok()?;
        if inner.errors.is_empty() { Some(expr) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeTag;

    fn parse_ok(source: &str) -> Node {
        parse(source, "<test>").expect("parse should succeed")
    }

    fn first_statement(program: &Node) -> &Node {
        match &program.variant {
            NodeVariant::Program { statements, .. } => &statements[0],
            _ => panic!("expected program"),
        }
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let program = parse_ok("1 + 2 * 3");
        assert_eq!(first_statement(&program).pretty(), "(1 + (2 * 3))");
    }

    #[test]
    fn ternary_and_logic() {
        let program = parse_ok("a and b or c ? 1 : 2");
        assert_eq!(first_statement(&program).pretty(), "(((a and b) or c) ? 1 : 2)");
    }

    #[test]
    fn generic_identifier_lookahead() {
        let program = parse_ok("var l = new List<int>()");
        let stmt = first_statement(&program);
        match &stmt.variant {
            NodeVariant::Var { value, .. } => match &value.variant {
                NodeVariant::New {
                    class_name, type_args, ..
                } => {
                    assert_eq!(&**class_name, "List");
                    assert_eq!(type_args.len(), 1);
                }
                other => panic!("expected New, got {other:?}"),
            },
            other => panic!("expected Var, got {other:?}"),
        }
    }

    #[test]
    fn comparison_is_not_mistaken_for_generics() {
        let program = parse_ok("a < b");
        assert_eq!(first_statement(&program).tag(), NodeTag::BinaryOp);
    }

    #[test]
    fn named_call_arguments() {
        let program = parse_ok("f(1, name = 2, other: 3)");
        match &first_statement(&program).variant {
            NodeVariant::FunctionCall { args, .. } => {
                assert!(args[0].name.is_none());
                assert_eq!(args[1].name.as_deref(), Some("name"));
                assert_eq!(args[2].name.as_deref(), Some("other"));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn for_header_dispatch() {
        let program = parse_ok("for (var k in m) { k }");
        assert_eq!(first_statement(&program).tag(), NodeTag::ForIn);
        let program = parse_ok("for (var v of m) { v }");
        assert_eq!(first_statement(&program).tag(), NodeTag::ForOf);
        let program = parse_ok("for (var i = 0; i < 3; i = i + 1) { i }");
        assert_eq!(first_statement(&program).tag(), NodeTag::For);
    }

    #[test]
    fn untyped_catch_is_a_syntax_error() {
        assert!(parse("try { 1 } catch (e) { 2 }", "<test>").is_err());
        assert!(parse("try { 1 } catch (e: any) { 2 }", "<test>").is_err());
        assert!(parse("try { 1 } catch (e: TypeError) { 2 }", "<test>").is_ok());
    }

    #[test]
    fn fstring_parts_split_on_placeholders() {
        let program = parse_ok(r#"f"a {x} b {{literal}}""#);
        match &first_statement(&program).variant {
            NodeVariant::InterpolatedString { parts } => {
                assert!(matches!(&parts[0], FStringPart::Text(t) if &**t == "a "));
                assert!(matches!(&parts[1], FStringPart::Expr(_)));
                assert!(matches!(&parts[2], FStringPart::Text(t) if &**t == " b {literal}"));
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn json_blob_becomes_literal_tree() {
        let program = parse_ok(r#"var cfg = {"port": 80, "tags": ["a"]}"#);
        match &first_statement(&program).variant {
            NodeVariant::Var { value, .. } => assert_eq!(value.tag(), NodeTag::JsonObject),
            other => panic!("expected var, got {other:?}"),
        }
    }

    #[test]
    fn class_members_parse_with_modifiers() {
        let source = r#"
            class Account extends Base implements Auditable {
                private var secret = 1
                static var count = 0
                fn constructor(owner) { this.owner = owner }
                private fn hidden() { return this.secret }
                static fn total() { return 0 }
                async fn sync() { return 1 }
            }
        "#;
        let program = parse_ok(source);
        match &first_statement(&program).variant {
            NodeVariant::Class(def) => {
                assert_eq!(&*def.name, "Account");
                assert_eq!(def.extends.as_ref().unwrap().base.as_ref(), "Base");
                assert_eq!(def.members.len(), 6);
                let mut privates = 0;
                let mut statics = 0;
                let mut asyncs = 0;
                for member in &def.members {
                    match member {
                        ClassMember::Method(m) => {
                            privates += usize::from(m.is_private);
                            statics += usize::from(m.is_static);
                            asyncs += usize::from(m.def.is_async);
                        }
                        ClassMember::Field(f) => {
                            privates += usize::from(f.is_private);
                            statics += usize::from(f.is_static);
                        }
                    }
                }
                assert_eq!((privates, statics, asyncs), (2, 2, 1));
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn union_type_annotations() {
        let program = parse_ok("var x: int|float = 1");
        match &first_statement(&program).variant {
            NodeVariant::Var { annotation, .. } => {
                assert_eq!(annotation.as_ref().unwrap().to_string(), "int|float");
            }
            other => panic!("expected var, got {other:?}"),
        }
        let program = parse_ok("var y: Union<int, string> = 1");
        match &first_statement(&program).variant {
            NodeVariant::Var { annotation, .. } => {
                assert_eq!(annotation.as_ref().unwrap().to_string(), "int|string");
            }
            other => panic!("expected var, got {other:?}"),
        }
    }

    #[test]
    fn expression_pretty_round_trip() {
        for source in [
            "1 + 2 * 3",
            "a.b.c(1, 2)[0]",
            "(x ? y : z) + 1",
            "not a and -b",
            "new Point(1, 2).x",
            "items in registry",
        ] {
            let first = parse_ok(source);
            let printed = first_statement(&first).pretty();
            let second = parse_ok(&printed);
            assert_eq!(printed, first_statement(&second).pretty());
        }
    }

    #[test]
    fn enum_declaration_defaults_values() {
        let program = parse_ok("enum Role { ADMIN, STAFF = \"people\" }");
        match &first_statement(&program).variant {
            NodeVariant::Enum(def) => {
                assert_eq!(&*def.members[0].0, "ADMIN");
                assert_eq!(&*def.members[0].1, "admin");
                assert_eq!(&*def.members[1].1, "people");
            }
            other => panic!("expected enum, got {other:?}"),
        }
    }

    #[test]
    fn parser_recovers_and_reports() {
        let result = parse("var = 1", "<test>");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.message.contains("Syntax error"));
    }

    #[test]
    fn parse_is_deterministic() {
        let source = "fn add(a, b) { return a + b }\nadd(1, 2)";
        let a = format!("{:?}", parse_ok(source));
        let b = format!("{:?}", parse_ok(source));
        assert_eq!(a, b);
    }
}
