// ABOUTME: Recursive-descent parser: token stream -> AST, precedence climbing
// ABOUTME: plus bounded lookahead for the grammar's ambiguous constructs.

use crate::ast::*;
use crate::error::{SourceSpan, ZephyrError};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse(source: &str) -> Result<Program, ZephyrError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_program()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn peek_span(&self) -> SourceSpan {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ZephyrError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ZephyrError::syntax(
                format!("expected {}, found {:?}", what, self.peek()),
                self.peek_span(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ZephyrError> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ZephyrError::syntax(
                format!("expected identifier, found {:?}", other),
                self.peek_span(),
            )),
        }
    }

    fn unexpected_eof(&self) -> ZephyrError {
        ZephyrError::syntax("Unexpected end of file", self.peek_span())
    }

    // ---------------------------------------------------------------- program

    pub fn parse_program(&mut self) -> Result<Program, ZephyrError> {
        let mut stmts = Vec::new();
        while !self.is_eof() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    // --------------------------------------------------------------- statements

    fn parse_statement(&mut self) -> Result<Stmt, ZephyrError> {
        let mut is_final = false;
        let mut is_abstract = false;
        let mut is_internal = false;
        let mut is_async = false;
        loop {
            match self.peek() {
                TokenKind::Final => {
                    is_final = true;
                    self.advance();
                }
                TokenKind::Abstract => {
                    is_abstract = true;
                    self.advance();
                }
                TokenKind::Internal => {
                    is_internal = true;
                    self.advance();
                }
                TokenKind::Async => {
                    is_async = true;
                    self.advance();
                }
                _ => break,
            }
        }

        match self.peek() {
            TokenKind::Class => self.parse_class_decl(is_final, is_abstract, is_internal),
            TokenKind::Interface => self.parse_interface_decl(is_internal),
            TokenKind::Enum => self.parse_enum_decl(is_internal),
            TokenKind::Func => self.parse_func_decl_stmt(is_async, is_abstract, is_internal),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do(),
            TokenKind::For => self.parse_for_or_foreach(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::Break => {
                let span = self.peek_span();
                self.advance();
                self.consume_optional_semicolon();
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::Continue => {
                let span = self.peek_span();
                self.advance();
                self.consume_optional_semicolon();
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::Return => {
                let span = self.peek_span();
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RBrace) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_optional_semicolon();
                Ok(Stmt::new(StmtKind::Return(value), span))
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Try => self.parse_try(),
            TokenKind::With => self.parse_with(),
            TokenKind::Throw => {
                let span = self.peek_span();
                self.advance();
                let expr = self.parse_expression()?;
                self.consume_optional_semicolon();
                Ok(Stmt::new(StmtKind::Throw(expr), span))
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::Const => self.parse_var_decl(true),
            TokenKind::Identifier(_) if matches!(self.peek_at(1), TokenKind::Colon) => {
                self.parse_var_decl(false)
            }
            _ => self.parse_expr_statement(),
        }
    }

    fn consume_optional_semicolon(&mut self) {
        self.matches(&TokenKind::Semicolon);
    }

    fn parse_block(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.is_eof() {
                return Err(self.unexpected_eof());
            }
            stmts.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Stmt::new(StmtKind::Block(stmts), span))
    }

    fn parse_var_decl(&mut self, leading_const: bool) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        let is_const = if leading_const {
            self.expect(&TokenKind::Const, "'const'")?;
            true
        } else {
            false
        };
        let name = self.expect_identifier()?;
        let type_name = if self.matches(&TokenKind::Colon) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let value = if self.matches(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_optional_semicolon();
        Ok(Stmt::new(
            StmtKind::VarDecl(VarDecl { name, type_name, is_const, value }),
            span,
        ))
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        let expr = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt::new(StmtKind::ExprStmt(expr), span))
    }

    fn parse_if(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')' after condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.matches(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::new(StmtKind::If { cond, then_branch, else_branch }, span))
    }

    fn parse_while(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        self.expect(&TokenKind::LParen, "'(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')' after condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(StmtKind::While { cond, body }, span))
    }

    fn parse_do(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        if self.matches(&TokenKind::While) {
            self.expect(&TokenKind::LParen, "'(' after 'while'")?;
            let cond = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')' after condition")?;
            self.consume_optional_semicolon();
            Ok(Stmt::new(StmtKind::DoWhile { body, cond }, span))
        } else {
            self.expect(&TokenKind::Until, "'while' or 'until' after do-block")?;
            self.expect(&TokenKind::LParen, "'(' after 'until'")?;
            let cond = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')' after condition")?;
            self.consume_optional_semicolon();
            Ok(Stmt::new(StmtKind::DoUntil { body, cond }, span))
        }
    }

    fn parse_loop(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(StmtKind::Loop { body }, span))
    }

    fn looks_like_foreach(&self) -> bool {
        match self.peek() {
            TokenKind::Const => true,
            TokenKind::Identifier(_) => {
                matches!(self.peek_at(1), TokenKind::In | TokenKind::Comma)
            }
            _ => false,
        }
    }

    fn parse_for_or_foreach(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        self.expect(&TokenKind::LParen, "'(' after 'for'")?;

        if self.looks_like_foreach() {
            let is_const = self.matches(&TokenKind::Const);
            let mut names = vec![self.expect_identifier()?];
            while self.matches(&TokenKind::Comma) {
                names.push(self.expect_identifier()?);
            }
            self.expect(&TokenKind::In, "'in' in for-each loop")?;
            let iterable = self.parse_expression()?;
            let filter = if self.matches(&TokenKind::Where) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(&TokenKind::RParen, "')' closing for-each header")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::new(
                StmtKind::ForEach { vars: ForEachVars { names, is_const }, iterable, filter, body },
                span,
            ));
        }

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else if matches!(self.peek(), TokenKind::Identifier(_)) && matches!(self.peek_at(1), TokenKind::Colon) {
            Some(Box::new(self.parse_var_decl(false)?))
        } else if self.check(&TokenKind::Const) {
            Some(Box::new(self.parse_var_decl(true)?))
        } else {
            let e = self.parse_expression()?;
            self.expect(&TokenKind::Semicolon, "';' after for-init")?;
            Some(Box::new(Stmt::new(StmtKind::ExprStmt(e.clone()), e.span)))
        };
        if init.is_none() {
            self.expect(&TokenKind::Semicolon, "';' after for-init")?;
        }
        let cond = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after for-condition")?;
        let post = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen, "')' closing for-header")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(StmtKind::For { init, cond, post, body }, span))
    }

    fn parse_switch(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        self.expect(&TokenKind::LParen, "'(' after 'switch'")?;
        let subject = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')' after switch subject")?;
        self.expect(&TokenKind::LBrace, "'{' to open switch body")?;
        let mut cases = Vec::new();
        let mut default = None;
        loop {
            if self.matches(&TokenKind::Case) {
                let value = self.parse_expression()?;
                self.expect(&TokenKind::Colon, "':' after case value")?;
                let body = self.parse_case_body()?;
                cases.push(SwitchCase { value, body });
            } else if self.matches(&TokenKind::Default) {
                self.expect(&TokenKind::Colon, "':' after 'default'")?;
                default = Some(self.parse_case_body()?);
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' closing switch")?;
        Ok(Stmt::new(StmtKind::Switch { subject, cases, default }, span))
    }

    fn parse_case_body(&mut self) -> Result<Vec<Stmt>, ZephyrError> {
        let mut stmts = Vec::new();
        while !matches!(self.peek(), TokenKind::Case | TokenKind::Default | TokenKind::RBrace) {
            if self.is_eof() {
                return Err(self.unexpected_eof());
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_try(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        let try_block = Box::new(self.parse_block()?);
        self.expect(&TokenKind::Catch, "'catch' after try block")?;
        let catch_var = if self.matches(&TokenKind::LParen) {
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::RParen, "')' after catch variable")?;
            Some(name)
        } else {
            None
        };
        let catch_block = Box::new(self.parse_block()?);
        let finally_block = if self.matches(&TokenKind::Finally) {
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        Ok(Stmt::new(StmtKind::TryCatch { try_block, catch_var, catch_block, finally_block }, span))
    }

    fn parse_with(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        let ctx_expr = self.parse_expression()?;
        self.expect(&TokenKind::As, "'as' in with-statement")?;
        let var = self.expect_identifier()?;
        let body = Box::new(self.parse_block()?);
        Ok(Stmt::new(StmtKind::With { ctx_expr, var, body }, span))
    }

    fn parse_import(&mut self) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();

        if let TokenKind::String(path) = self.peek().clone() {
            let path_span = self.peek_span();
            self.advance();
            let path = process_escapes(&path, path_span)?;
            let alias = self.parse_optional_alias()?;
            self.consume_optional_semicolon();
            return Ok(Stmt::new(StmtKind::Import(ImportDecl::Path { path, alias }), span));
        }

        let first = self.expect_identifier()?;
        if self.check(&TokenKind::Comma) || self.check(&TokenKind::From) {
            let mut names = vec![first];
            while self.matches(&TokenKind::Comma) {
                names.push(self.expect_identifier()?);
            }
            self.expect(&TokenKind::From, "'from' in named import")?;
            let module = self.expect_identifier()?;
            let alias = self.parse_optional_alias()?;
            self.consume_optional_semicolon();
            return Ok(Stmt::new(StmtKind::Import(ImportDecl::Named { names, module, alias }), span));
        }

        let mut path = vec![first];
        while self.matches(&TokenKind::Dot) {
            path.push(self.expect_identifier()?);
        }
        let alias = self.parse_optional_alias()?;
        self.consume_optional_semicolon();
        Ok(Stmt::new(StmtKind::Import(ImportDecl::Bare { path, alias }), span))
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>, ZephyrError> {
        if self.matches(&TokenKind::As) {
            Ok(Some(self.expect_identifier()?))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------- functions

    fn parse_params(&mut self) -> Result<Vec<Param>, ZephyrError> {
        let mut params = Vec::new();
        self.expect(&TokenKind::LParen, "'(' to start parameter list")?;
        if !self.check(&TokenKind::RParen) {
            loop {
                let is_const = self.matches(&TokenKind::Const);
                let name = self.expect_identifier()?;
                let type_name = if self.matches(&TokenKind::Colon) {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                let default = if self.matches(&TokenKind::Eq) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                params.push(Param { name, type_name, is_const, default });
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' closing parameter list")?;
        Ok(params)
    }

    fn parse_func_decl_stmt(
        &mut self,
        is_async: bool,
        is_abstract: bool,
        is_internal: bool,
    ) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        let decl = self.parse_function_decl(is_async, is_abstract, is_internal)?;
        Ok(Stmt::new(StmtKind::FuncDecl(decl), span))
    }

    fn parse_function_decl(
        &mut self,
        is_async: bool,
        is_abstract: bool,
        is_internal: bool,
    ) -> Result<FunctionDecl, ZephyrError> {
        self.expect(&TokenKind::Func, "'func'")?;
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        let return_type = if self.matches(&TokenKind::Arrow) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let body = if is_abstract {
            self.consume_optional_semicolon();
            Vec::new()
        } else {
            match self.parse_block()?.kind {
                StmtKind::Block(stmts) => stmts,
                _ => unreachable!(),
            }
        };
        Ok(FunctionDecl { name, params, return_type, body, is_async, is_abstract, is_internal })
    }

    // ---------------------------------------------------------------- classes

    fn parse_class_decl(
        &mut self,
        is_final: bool,
        is_abstract: bool,
        is_internal: bool,
    ) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        let name = self.expect_identifier()?;
        let mut parent = None;
        let mut interfaces = Vec::new();
        if self.matches(&TokenKind::Colon) {
            loop {
                let n = self.expect_identifier()?;
                // Resolved at evaluation time which of these is the parent
                // class versus interfaces; the parser just records order.
                if parent.is_none() && interfaces.is_empty() {
                    parent = Some(n);
                } else {
                    interfaces.push(n);
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::LBrace, "'{' to open class body")?;
        let mut members = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.is_eof() {
                return Err(self.unexpected_eof());
            }
            let mut m_internal = false;
            let mut m_abstract = false;
            let mut m_async = false;
            loop {
                match self.peek() {
                    TokenKind::Internal => {
                        m_internal = true;
                        self.advance();
                    }
                    TokenKind::Abstract => {
                        m_abstract = true;
                        self.advance();
                    }
                    TokenKind::Async => {
                        m_async = true;
                        self.advance();
                    }
                    _ => break,
                }
            }
            if self.check(&TokenKind::Func) {
                methods.push(self.parse_function_decl(m_async, m_abstract, m_internal)?);
            } else {
                let is_const = self.matches(&TokenKind::Const);
                let name = self.expect_identifier()?;
                let has_explicit_type = self.matches(&TokenKind::Colon);
                let type_name = if has_explicit_type { Some(self.expect_identifier()?) } else { None };
                let has_default_value = self.matches(&TokenKind::Eq);
                let default = if has_default_value { Some(self.parse_expression()?) } else { None };
                self.consume_optional_semicolon();
                members.push(MemberVarDecl {
                    name,
                    type_name,
                    is_const,
                    has_explicit_type,
                    has_default_value,
                    default,
                });
            }
        }
        self.expect(&TokenKind::RBrace, "'}' closing class body")?;
        Ok(Stmt::new(
            StmtKind::ClassDecl(ClassDecl {
                name,
                parent,
                interfaces,
                is_final,
                is_abstract,
                is_internal,
                members,
                methods,
            }),
            span,
        ))
    }

    fn parse_interface_decl(&mut self, is_internal: bool) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LBrace, "'{' to open interface body")?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.is_eof() {
                return Err(self.unexpected_eof());
            }
            self.expect(&TokenKind::Func, "method signature in interface")?;
            let mname = self.expect_identifier()?;
            let params = self.parse_params()?;
            let return_type = if self.matches(&TokenKind::Arrow) {
                Some(self.expect_identifier()?)
            } else {
                None
            };
            self.consume_optional_semicolon();
            methods.push(InterfaceMethodSig { name: mname, params, return_type });
        }
        self.expect(&TokenKind::RBrace, "'}' closing interface body")?;
        Ok(Stmt::new(StmtKind::InterfaceDecl(InterfaceDecl { name, is_internal, methods }), span))
    }

    /// `enum Name { Red, Green, Pair(x, y) }` -- a variant with no
    /// parentheses is a bare tag; one with parentheses carries positional
    /// data bound under the given names when an instance is constructed.
    fn parse_enum_decl(&mut self, is_internal: bool) -> Result<Stmt, ZephyrError> {
        let span = self.peek_span();
        self.advance();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LBrace, "'{' to open enum body")?;
        let mut variants = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.is_eof() {
                return Err(self.unexpected_eof());
            }
            let variant_name = self.expect_identifier()?;
            let params = if self.matches(&TokenKind::LParen) {
                let mut names = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        names.push(self.expect_identifier()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen, "')' closing variant parameters")?;
                names
            } else {
                Vec::new()
            };
            variants.push(EnumVariantDecl { name: variant_name, params });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' closing enum body")?;
        Ok(Stmt::new(StmtKind::EnumDecl(EnumDecl { name, is_internal, variants }), span))
    }

    // --------------------------------------------------------------- expressions

    pub fn parse_expression(&mut self) -> Result<Expr, ZephyrError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let left = self.parse_pipe()?;

        if self.check(&TokenKind::Eq) {
            if let ExprKind::ListLiteral(items) = &left.kind {
                let targets: Result<Vec<AssignTarget>, ZephyrError> =
                    items.iter().cloned().map(expr_to_target).collect();
                if let Ok(targets) = targets {
                    self.advance();
                    let value = Box::new(self.parse_assignment()?);
                    return Ok(Expr::new(ExprKind::ListDestructureAssign { targets, value }, span));
                }
            }
            self.advance();
            let target = Box::new(expr_to_target(left)?);
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expr::new(ExprKind::Assign { target, value }, span));
        }

        if let Some(op) = compound_op(self.peek()) {
            self.advance();
            let target = Box::new(expr_to_target(left)?);
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expr::new(ExprKind::CompoundAssign { target, op, value }, span));
        }

        Ok(left)
    }

    fn parse_pipe(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_ternary()?;
        while self.matches(&TokenKind::PipeGt) {
            let right = self.parse_ternary()?;
            left = Expr::new(ExprKind::Pipe { left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_ternary(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let cond = self.parse_nullish()?;
        if self.matches(&TokenKind::Question) {
            let then_branch = Box::new(self.parse_expression()?);
            self.expect(&TokenKind::Colon, "':' in ternary expression")?;
            let else_branch = Box::new(self.parse_ternary()?);
            return Ok(Expr::new(ExprKind::Ternary { cond: Box::new(cond), then_branch, else_branch }, span));
        }
        Ok(cond)
    }

    fn parse_nullish(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_or()?;
        while self.matches(&TokenKind::QuestionQuestion) {
            let right = self.parse_or()?;
            left = Expr::new(ExprKind::NullishCoalesce { left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) || self.check(&TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::new(ExprKind::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_bitor()?;
        while self.check(&TokenKind::And) || self.check(&TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_bitor()?;
            left = Expr::new(ExprKind::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_bitxor()?;
        while self.matches(&TokenKind::Pipe) {
            let right = self.parse_bitxor()?;
            left = Expr::new(ExprKind::Binary { op: BinaryOp::BitOr, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_bitand()?;
        while self.matches(&TokenKind::Caret) {
            let right = self.parse_bitand()?;
            left = Expr::new(ExprKind::Binary { op: BinaryOp::BitXor, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_comparison()?;
        while self.matches(&TokenKind::Amp) {
            let right = self.parse_comparison()?;
            left = Expr::new(ExprKind::Binary { op: BinaryOp::BitAnd, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                TokenKind::Is => BinaryOp::Is,
                TokenKind::In => BinaryOp::In,
                _ => break,
            };
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::LtLt => BinaryOp::Shl,
                TokenKind::GtGt => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        let left = self.parse_unary()?;
        if self.matches(&TokenKind::StarStar) {
            let right = self.parse_power()?; // right-associative
            return Ok(Expr::new(ExprKind::Binary { op: BinaryOp::Pow, left: Box::new(left), right: Box::new(right) }, span));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        match self.peek() {
            TokenKind::Minus => {
                self.advance();
                let expr = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Unary { op: UnaryOp::Neg, expr }, span))
            }
            TokenKind::Not | TokenKind::Bang => {
                self.advance();
                let expr = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Unary { op: UnaryOp::Not, expr }, span))
            }
            TokenKind::Tilde => {
                self.advance();
                let expr = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Unary { op: UnaryOp::BitNot, expr }, span))
            }
            TokenKind::PlusPlus => {
                self.advance();
                let operand = self.parse_unary()?;
                let target = Box::new(expr_to_target(operand)?);
                Ok(Expr::new(ExprKind::PreIncrement { target, increment: true }, span))
            }
            TokenKind::MinusMinus => {
                self.advance();
                let operand = self.parse_unary()?;
                let target = Box::new(expr_to_target(operand)?);
                Ok(Expr::new(ExprKind::PreIncrement { target, increment: false }, span))
            }
            TokenKind::Await => {
                self.advance();
                let expr = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Await { expr }, span))
            }
            TokenKind::Spawn => {
                self.advance();
                let expr = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Spawn { expr }, span))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ZephyrError> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.peek_span();
            match self.peek() {
                TokenKind::Dot | TokenKind::QuestionDot => {
                    let optional = matches!(self.peek(), TokenKind::QuestionDot);
                    self.advance();
                    let name = self.expect_identifier()?;
                    if self.check(&TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        expr = Expr::new(
                            ExprKind::MethodCall { object: Box::new(expr), method: name, args, optional },
                            span,
                        );
                    } else {
                        expr = Expr::new(ExprKind::Member { object: Box::new(expr), name, optional }, span);
                    }
                }
                TokenKind::LBracket | TokenKind::QuestionLBracket => {
                    let optional = matches!(self.peek(), TokenKind::QuestionLBracket);
                    self.advance();
                    expr = self.parse_index_or_slice(expr, optional, span)?;
                }
                TokenKind::LParen => {
                    let args = self.parse_call_args()?;
                    expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args, optional: false }, span);
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    let target = Box::new(expr_to_target(expr)?);
                    expr = Expr::new(ExprKind::PostIncrement { target, increment: true }, span);
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    let target = Box::new(expr_to_target(expr)?);
                    expr = Expr::new(ExprKind::PostIncrement { target, increment: false }, span);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_index_or_slice(&mut self, object: Expr, optional: bool, span: SourceSpan) -> Result<Expr, ZephyrError> {
        let start = if self.check(&TokenKind::Colon) { None } else { Some(Box::new(self.parse_expression()?)) };
        if self.matches(&TokenKind::Colon) {
            let end = if self.check(&TokenKind::Colon) || self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            let step = if self.matches(&TokenKind::Colon) {
                if self.check(&TokenKind::RBracket) { None } else { Some(Box::new(self.parse_expression()?)) }
            } else {
                None
            };
            self.expect(&TokenKind::RBracket, "']' closing slice")?;
            return Ok(Expr::new(ExprKind::Slice { object: Box::new(object), start, end, step }, span));
        }
        let index = start.ok_or_else(|| ZephyrError::syntax("expected index expression", self.peek_span()))?;
        self.expect(&TokenKind::RBracket, "']' closing index")?;
        Ok(Expr::new(ExprKind::Index { object: Box::new(object), index, optional }, span))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ZephyrError> {
        self.expect(&TokenKind::LParen, "'(' to start call arguments")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' closing call arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ZephyrError> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::Integer { text } => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLiteral { text }, span))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::new(ExprKind::FloatLiteral(f), span))
            }
            TokenKind::String(s) => {
                self.advance();
                let value = process_escapes(&s, span)?;
                Ok(Expr::new(ExprKind::StringLiteral(value), span))
            }
            TokenKind::RawString(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(s), span))
            }
            TokenKind::FString(template) => {
                self.advance();
                let parts = parse_fstring_template(&template, span)?;
                Ok(Expr::new(ExprKind::FString(parts), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(false), span))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::new(ExprKind::NoneLiteral, span))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::new(ExprKind::This, span))
            }
            TokenKind::Super => {
                self.advance();
                Ok(Expr::new(ExprKind::Super, span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), span))
            }
            TokenKind::Async => {
                self.advance();
                self.parse_lambda(true, span)
            }
            TokenKind::LParen => {
                let checkpoint = self.pos;
                if let Ok(lambda) = self.try_parse_lambda(span) {
                    return Ok(lambda);
                }
                self.pos = checkpoint;
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')' closing parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "']' closing list literal")?;
                Ok(Expr::new(ExprKind::ListLiteral(items), span))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let key = self.parse_expression()?;
                        self.expect(&TokenKind::Colon, "':' in dictionary literal")?;
                        let value = self.parse_expression()?;
                        entries.push((key, value));
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace, "'}' closing dictionary literal")?;
                Ok(Expr::new(ExprKind::DictLiteral(entries), span))
            }
            TokenKind::Eof => Err(self.unexpected_eof()),
            other => Err(ZephyrError::syntax(format!("unexpected token {:?}", other), span)),
        }
    }

    fn try_parse_lambda(&mut self, span: SourceSpan) -> Result<Expr, ZephyrError> {
        let params = self.parse_params()?;
        self.expect(&TokenKind::Arrow, "'->' in lambda")?;
        self.parse_lambda_body(params, false, span)
    }

    fn parse_lambda(&mut self, is_async: bool, span: SourceSpan) -> Result<Expr, ZephyrError> {
        let params = self.parse_params()?;
        self.expect(&TokenKind::Arrow, "'->' in lambda")?;
        self.parse_lambda_body(params, is_async, span)
    }

    fn parse_lambda_body(&mut self, params: Vec<Param>, is_async: bool, span: SourceSpan) -> Result<Expr, ZephyrError> {
        let body = if self.check(&TokenKind::LBrace) {
            match self.parse_block()?.kind {
                StmtKind::Block(stmts) => LambdaBody::Block(stmts),
                _ => unreachable!(),
            }
        } else {
            LambdaBody::Expr(self.parse_expression()?)
        };
        Ok(Expr::new(ExprKind::Lambda { params, body: Box::new(body), is_async }, span))
    }
}

fn compound_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::PlusEq => Some(BinaryOp::Add),
        TokenKind::MinusEq => Some(BinaryOp::Sub),
        TokenKind::StarEq => Some(BinaryOp::Mul),
        TokenKind::SlashEq => Some(BinaryOp::Div),
        TokenKind::PercentEq => Some(BinaryOp::Mod),
        TokenKind::StarStarEq => Some(BinaryOp::Pow),
        _ => None,
    }
}

fn expr_to_target(expr: Expr) -> Result<AssignTarget, ZephyrError> {
    match expr.kind {
        ExprKind::Identifier(name) => Ok(AssignTarget::Name(name)),
        ExprKind::Member { object, name, .. } => Ok(AssignTarget::Member { object, name }),
        ExprKind::Index { object, index, .. } => Ok(AssignTarget::Index { object, index }),
        _ => Err(ZephyrError::syntax("invalid assignment target", expr.span)),
    }
}

/// Splits an f-string's raw template text into literal-text and
/// embedded-expression parts, re-lexing/re-parsing each `{expr}` section as
/// an ordinary expression (per the evaluator's f-string contract).
fn parse_fstring_template(template: &str, span: SourceSpan) -> Result<Vec<FStringPart>, ZephyrError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                text.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                text.push('}');
                i += 2;
            }
            '{' => {
                if !text.is_empty() {
                    let resolved = process_escapes(&std::mem::take(&mut text), span)?;
                    parts.push(FStringPart::Text(resolved));
                }
                let mut depth = 1;
                let mut expr_src = String::new();
                i += 1;
                while i < chars.len() && depth > 0 {
                    match chars[i] {
                        '{' => {
                            depth += 1;
                            expr_src.push('{');
                        }
                        '}' => {
                            depth -= 1;
                            if depth > 0 {
                                expr_src.push('}');
                            }
                        }
                        c => expr_src.push(c),
                    }
                    i += 1;
                }
                if depth != 0 {
                    return Err(ZephyrError::syntax("unterminated f-string expression", span));
                }
                let expr = parse_embedded_expression(&expr_src, span)?;
                parts.push(FStringPart::Expr(Box::new(expr)));
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    if !text.is_empty() {
        parts.push(FStringPart::Text(process_escapes(&text, span)?));
    }
    Ok(parts)
}

/// Resolves `\n \t \r \\ \' \" \b \f \v \0 \xHH \uHHHH \UHHHHHHHH` in a
/// string literal's raw quoted text. Called from the parser rather than the
/// lexer per spec.md 4.1; the raw (`r"..."`) form never goes through this.
fn process_escapes(text: &str, span: SourceSpan) -> Result<String, ZephyrError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = (0..2).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| ZephyrError::syntax("invalid \\x escape", span))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| ZephyrError::syntax("invalid \\u escape", span))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            Some('U') => {
                let hex: String = (0..8).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| ZephyrError::syntax("invalid \\U escape", span))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            Option::None => return Err(ZephyrError::syntax("dangling escape at end of string", span)),
        }
    }
    Ok(out)
}

fn parse_embedded_expression(src: &str, span: SourceSpan) -> Result<Expr, ZephyrError> {
    let tokens = tokenize(src).map_err(|_| ZephyrError::syntax("invalid f-string expression", span))?;
    let mut sub_parser = Parser::new(tokens);
    sub_parser.parse_expression()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap_or_else(|e| panic!("parse error on `{}`: {:?}", src, e))
    }

    #[test]
    fn parses_var_decl_forms() {
        let prog = parse_ok("x = 5;");
        assert!(matches!(prog[0].kind, StmtKind::ExprStmt(_)));
        let prog = parse_ok("const y : u8 = 5;");
        match &prog[0].kind {
            StmtKind::VarDecl(v) => {
                assert!(v.is_const);
                assert_eq!(v.type_name.as_deref(), Some("u8"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let prog = parse_ok("z : int;");
        match &prog[0].kind {
            StmtKind::VarDecl(v) => assert!(v.value.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_binary_precedence() {
        let prog = parse_ok("a = 1 + 2 * 3;");
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            match &value.kind {
                ExprKind::Binary { op: BinaryOp::Add, right, .. } => {
                    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("unexpected {:?}", other),
            }
        } else {
            panic!("expected assignment expr stmt");
        }
    }

    #[test]
    fn parses_power_right_associative() {
        let prog = parse_ok("a = 2 ** 3 ** 2;");
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            match &value.kind {
                ExprKind::Binary { op: BinaryOp::Pow, right, .. } => {
                    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Pow, .. }));
                }
                other => panic!("unexpected {:?}", other),
            }
        } else {
            panic!("expected expr");
        }
    }

    #[test]
    fn disambiguates_lambda_from_parens() {
        let prog = parse_ok("f = (x) -> x + 1;");
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            assert!(matches!(value.kind, ExprKind::Lambda { .. }));
        } else {
            panic!("expected lambda assign");
        }
        let prog = parse_ok("f = (1 + 2) * 3;");
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            assert!(matches!(value.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
        } else {
            panic!("expected parenthesized mul");
        }
    }

    #[test]
    fn disambiguates_destructure_from_list_literal() {
        let prog = parse_ok("[a, b] = pair;");
        assert!(matches!(prog[0].kind, StmtKind::ExprStmt(Expr { kind: ExprKind::ListDestructureAssign { .. }, .. })));
        let prog = parse_ok("x = [1, 2];");
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            assert!(matches!(value.kind, ExprKind::ListLiteral(_)));
        } else {
            panic!("expected list literal assign");
        }
    }

    #[test]
    fn disambiguates_foreach_from_c_style_for() {
        let prog = parse_ok("for (x in items) { y = x; }");
        assert!(matches!(prog[0].kind, StmtKind::ForEach { .. }));
        let prog = parse_ok("for (i = 0; i < 10; i = i + 1) { }");
        assert!(matches!(prog[0].kind, StmtKind::For { .. }));
    }

    #[test]
    fn parses_optional_chaining() {
        let prog = parse_ok("x = a?.b;");
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            assert!(matches!(value.kind, ExprKind::Member { optional: true, .. }));
        } else {
            panic!("expected optional member");
        }
    }

    #[test]
    fn parses_class_with_parent_and_interfaces() {
        let prog = parse_ok("class Dog : Animal, Named { func bark() { } }");
        match &prog[0].kind {
            StmtKind::ClassDecl(c) => {
                assert_eq!(c.parent.as_deref(), Some("Animal"));
                assert_eq!(c.interfaces, vec!["Named".to_string()]);
                assert_eq!(c.methods.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_fstring_with_embedded_expression() {
        let prog = parse_ok(r#"x = f"hi {1 + 2}";"#);
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            if let ExprKind::FString(parts) = &value.kind {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], FStringPart::Text(_)));
                assert!(matches!(parts[1], FStringPart::Expr(_)));
            } else {
                panic!("expected fstring");
            }
        } else {
            panic!("expected assign");
        }
    }

    #[test]
    fn resolves_string_escapes_during_parsing() {
        let prog = parse_ok(r#"x = "a\nb";"#);
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            assert_eq!(value.kind, ExprKind::StringLiteral("a\nb".to_string()));
        } else {
            panic!("expected assign");
        }
    }

    #[test]
    fn raw_string_preserves_escapes() {
        let prog = parse_ok(r#"x = r"a\nb";"#);
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            assert_eq!(value.kind, ExprKind::StringLiteral("a\\nb".to_string()));
        } else {
            panic!("expected assign");
        }
    }

    #[test]
    fn fstring_text_parts_resolve_escapes() {
        let prog = parse_ok(r#"x = f"a\nb {1}";"#);
        if let StmtKind::ExprStmt(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &prog[0].kind {
            if let ExprKind::FString(parts) = &value.kind {
                match &parts[0] {
                    FStringPart::Text(t) => assert_eq!(t, "a\nb "),
                    other => panic!("unexpected {:?}", other),
                }
            } else {
                panic!("expected fstring");
            }
        } else {
            panic!("expected assign");
        }
    }

    #[test]
    fn parses_import_forms() {
        let prog = parse_ok("import math;");
        assert!(matches!(prog[0].kind, StmtKind::Import(ImportDecl::Bare { .. })));
        let prog = parse_ok("import sqrt, pow from math;");
        assert!(matches!(prog[0].kind, StmtKind::Import(ImportDecl::Named { .. })));
        let prog = parse_ok(r#"import "./lib.zephyr" as lib;"#);
        assert!(matches!(prog[0].kind, StmtKind::Import(ImportDecl::Path { .. })));
    }

    #[test]
    fn parses_switch_try_with() {
        let prog = parse_ok("switch (x) { case 1: y = 1; default: y = 2; }");
        assert!(matches!(prog[0].kind, StmtKind::Switch { .. }));
        let prog = parse_ok("try { risky(); } catch (e) { log(e); } finally { cleanup(); }");
        assert!(matches!(prog[0].kind, StmtKind::TryCatch { .. }));
        let prog = parse_ok("with opener() as f { read(f); }");
        assert!(matches!(prog[0].kind, StmtKind::With { .. }));
    }

    #[test]
    fn parses_enum_with_bare_and_data_variants() {
        let prog = parse_ok("enum Shape { Circle(radius), Square(side), Point }");
        match &prog[0].kind {
            StmtKind::EnumDecl(decl) => {
                assert_eq!(decl.name, "Shape");
                assert_eq!(decl.variants.len(), 3);
                assert_eq!(decl.variants[0].name, "Circle");
                assert_eq!(decl.variants[0].params, vec!["radius".to_string()]);
                assert_eq!(decl.variants[2].name, "Point");
                assert!(decl.variants[2].params.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_internal_enum() {
        let prog = parse_ok("internal enum Status { Ok, Err(message) }");
        match &prog[0].kind {
            StmtKind::EnumDecl(decl) => assert!(decl.is_internal),
            other => panic!("unexpected {:?}", other),
        }
    }
}
