//! Recursive-descent parser for the restricted dialect
//!
//! Constructs outside the dialect (classes, `with`, generators, decorators,
//! ...) are rejected here with a diagnostic that names them.

use std::rc::Rc;

use crate::lang::CompileError;
use crate::lang::ast::{
    Arg, BinOp, BoolOp, CmpOp, Comprehension, Const, ExceptHandler, Expr, ExprKind, FStringPart,
    FunctionDef, ImportAlias, Param, Program, Stmt, StmtKind, Target, UnaryOp,
};
use crate::lang::lexer::{Keyword, Op, Token, TokenKind, tokenize};

/// Maximum nesting of expressions and blocks.
///
/// Validation also runs on the coordinating side, so parser recursion has to
/// stay well inside a default thread stack.
pub const MAX_NESTING: usize = 50;

/// Parse source text into a syntax tree
pub fn parse(source: &str) -> Result<Program, CompileError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens, 0).program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

type ParseResult<T> = Result<T, CompileError>;

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
        token
    }

    fn at_op(&self, op: Op) -> bool {
        *self.peek_kind() == TokenKind::Op(op)
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        *self.peek_kind() == TokenKind::Keyword(kw)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.at_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op) -> ParseResult<Token> {
        if self.at_op(op) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected '{}', found {}",
                op.as_str(),
                self.peek_kind().describe()
            )))
        }
    }

    fn expect_kw(&mut self, kw: Keyword) -> ParseResult<Token> {
        if self.at_kw(kw) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected '{}', found {}",
                kw.as_str(),
                self.peek_kind().describe()
            )))
        }
    }

    fn expect_name(&mut self) -> ParseResult<(String, u32, u32)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Name(name) => {
                self.advance();
                Ok((name, token.line, token.col))
            }
            other => Err(self.error(format!("expected a name, found {}", other.describe()))),
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Eof | TokenKind::Op(Op::Semicolon)
        )
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let token = self.peek();
        CompileError::at(message, token.line, token.col)
    }

    fn unexpected(&self) -> CompileError {
        self.error(format!(
            "invalid syntax: unexpected {}",
            self.peek_kind().describe()
        ))
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("too many nested expressions or blocks"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn program(&mut self) -> ParseResult<Program> {
        let mut body = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> ParseResult<Vec<Stmt>> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::If) => Ok(vec![self.if_statement()?]),
            TokenKind::Keyword(Keyword::While) => Ok(vec![self.while_statement()?]),
            TokenKind::Keyword(Keyword::For) => Ok(vec![self.for_statement()?]),
            TokenKind::Keyword(Keyword::Def) => Ok(vec![self.function_def()?]),
            TokenKind::Keyword(Keyword::Try) => Ok(vec![self.try_statement()?]),
            TokenKind::Keyword(Keyword::Class) => {
                Err(self.error("class definitions are not supported"))
            }
            TokenKind::Keyword(Keyword::With) => {
                Err(self.error("'with' statements are not supported"))
            }
            TokenKind::Keyword(Keyword::Async) | TokenKind::Keyword(Keyword::Await) => {
                Err(self.error("async code is not supported"))
            }
            TokenKind::Op(Op::At) => Err(self.error("decorators are not supported")),
            TokenKind::Indent => Err(self.error("unexpected indent")),
            TokenKind::Dedent => Err(self.unexpected()),
            _ => self.simple_statements(),
        }
    }

    fn simple_statements(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = vec![self.small_statement()?];
        while self.eat_op(Op::Semicolon) {
            if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.small_statement()?);
        }
        match self.peek_kind() {
            TokenKind::Newline => {
                self.advance();
            }
            TokenKind::Eof => {}
            _ => return Err(self.unexpected()),
        }
        Ok(stmts)
    }

    fn small_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.peek().line;
        let kind = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Pass) => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expression_list()?))
                }
            }
            TokenKind::Keyword(Keyword::Import) => self.import_statement()?,
            TokenKind::Keyword(Keyword::From) => self.from_import()?,
            TokenKind::Keyword(Keyword::Raise) => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Raise(None)
                } else {
                    let exc = self.expression()?;
                    if self.at_kw(Keyword::From) {
                        return Err(self.error("'raise ... from' is not supported"));
                    }
                    StmtKind::Raise(Some(exc))
                }
            }
            TokenKind::Keyword(Keyword::Assert) => {
                self.advance();
                let test = self.expression()?;
                let msg = if self.eat_op(Op::Comma) {
                    Some(self.expression()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Keyword(Keyword::Del) => {
                self.advance();
                let expr = self.expression_list()?;
                let targets = match self.to_target(expr)? {
                    Target::Tuple(items) => items,
                    single => vec![single],
                };
                StmtKind::Del(targets)
            }
            TokenKind::Keyword(Keyword::Global) => {
                return Err(self.error("'global' statements are not supported"));
            }
            TokenKind::Keyword(Keyword::Nonlocal) => {
                return Err(self.error("'nonlocal' statements are not supported"));
            }
            TokenKind::Keyword(Keyword::Yield) => {
                return Err(self.error("generators ('yield') are not supported"));
            }
            _ => self.expression_statement()?,
        };
        Ok(Stmt { kind, line })
    }

    fn expression_statement(&mut self) -> ParseResult<StmtKind> {
        let first = self.expression_list()?;

        if let TokenKind::Op(op) = *self.peek_kind()
            && let Some(bin) = augmented_op(op)
        {
            self.advance();
            let target = self.to_target(first)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            let value = self.expression_list()?;
            return Ok(StmtKind::AugAssign {
                target,
                op: bin,
                value,
            });
        }

        if self.at_op(Op::Assign) {
            let mut exprs = vec![first];
            while self.eat_op(Op::Assign) {
                exprs.push(self.expression_list()?);
            }
            let value = exprs.pop().ok_or_else(|| self.unexpected())?;
            let targets = exprs
                .into_iter()
                .map(|e| self.to_target(e))
                .collect::<ParseResult<Vec<_>>>()?;
            return Ok(StmtKind::Assign { targets, value });
        }

        if self.at_op(Op::Colon) {
            return Err(self.error("variable annotations are not supported"));
        }

        Ok(StmtKind::Expr(first))
    }

    fn to_target(&self, expr: Expr) -> ParseResult<Target> {
        let what = match expr.kind {
            ExprKind::Name(name) => return Ok(Target::Name(name)),
            ExprKind::Subscript { value, index } => {
                return Ok(Target::Subscript {
                    value: *value,
                    index: *index,
                });
            }
            ExprKind::Attribute { value, name } => {
                return Ok(Target::Attribute {
                    value: *value,
                    name,
                });
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                let targets = items
                    .into_iter()
                    .map(|item| self.to_target(item))
                    .collect::<ParseResult<Vec<_>>>()?;
                return Ok(Target::Tuple(targets));
            }
            ExprKind::Const(_) | ExprKind::FString(_) => "literal",
            ExprKind::Call { .. } => "function call",
            ExprKind::Lambda(_) => "lambda",
            ExprKind::Compare { .. } => "comparison",
            _ => "expression",
        };
        Err(CompileError::at(
            format!("cannot assign to {what}"),
            expr.line,
            expr.col,
        ))
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect_op(Op::Colon)?;
        if !matches!(self.peek_kind(), TokenKind::Newline) {
            return self.simple_statements();
        }
        self.advance();
        if !matches!(self.peek_kind(), TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.advance();
        self.enter()?;
        let mut body = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        self.leave();
        Ok(body)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        // Consumes `if` or `elif`
        let line = self.advance().line;
        let test = self.expression()?;
        let body = self.block()?;
        let orelse = if self.at_kw(Keyword::Elif) {
            vec![self.if_statement()?]
        } else if self.eat_kw(Keyword::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            line,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        let test = self.expression()?;
        let body = self.block()?;
        let orelse = if self.eat_kw(Keyword::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::While { test, body, orelse },
            line,
        })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        let target = self.target_list()?;
        self.expect_kw(Keyword::In)?;
        let iter = self.expression_list()?;
        let body = self.block()?;
        let orelse = if self.eat_kw(Keyword::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            line,
        })
    }

    /// Targets of `for` loops and comprehensions, which stop before `in`
    fn target_list(&mut self) -> ParseResult<Target> {
        let first = self.bit_or()?;
        if !self.at_op(Op::Comma) {
            return self.to_target(first);
        }
        let (line, col) = (first.line, first.col);
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.at_kw(Keyword::In) {
                break;
            }
            items.push(self.bit_or()?);
        }
        self.to_target(Expr {
            kind: ExprKind::Tuple(items),
            line,
            col,
        })
    }

    fn function_def(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        let (name, _, _) = self.expect_name()?;
        self.expect_op(Op::LParen)?;
        let (params, vararg) = self.parameters(Op::RParen)?;
        self.expect_op(Op::RParen)?;
        if self.eat_op(Op::Arrow) {
            self.expression()?;
        }
        let body = self.block()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef(Rc::new(FunctionDef {
                name,
                params,
                vararg,
                body,
                line,
            })),
            line,
        })
    }

    fn parameters(&mut self, end: Op) -> ParseResult<(Vec<Param>, Option<String>)> {
        let mut params: Vec<Param> = Vec::new();
        let mut vararg = None;
        while !self.at_op(end) {
            if self.eat_op(Op::DoubleStar) {
                return Err(self.error("'**' parameters are not supported"));
            }
            if self.eat_op(Op::Star) {
                if vararg.is_some() {
                    return Err(self.error("duplicate '*' parameter"));
                }
                let (name, _, _) = self.expect_name()?;
                vararg = Some(name);
            } else {
                if vararg.is_some() {
                    return Err(self.error("keyword-only parameters are not supported"));
                }
                let (name, _, _) = self.expect_name()?;
                if params.iter().any(|p| p.name == name) {
                    return Err(self.error(format!(
                        "duplicate argument '{name}' in function definition"
                    )));
                }
                if end == Op::RParen && self.eat_op(Op::Colon) {
                    // annotations are parsed and dropped
                    self.expression()?;
                }
                let default = if self.eat_op(Op::Assign) {
                    Some(self.expression()?)
                } else {
                    if params.iter().any(|p| p.default.is_some()) {
                        return Err(
                            self.error("non-default argument follows default argument")
                        );
                    }
                    None
                };
                params.push(Param { name, default });
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        Ok((params, vararg))
    }

    fn try_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.at_kw(Keyword::Except) {
            let handler_line = self.advance().line;
            let (kind, name) = if self.at_op(Op::Colon) {
                (None, None)
            } else {
                let kind = self.expression()?;
                let name = if self.eat_kw(Keyword::As) {
                    Some(self.expect_name()?.0)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let body = self.block()?;
            handlers.push(ExceptHandler {
                kind,
                name,
                body,
                line: handler_line,
            });
        }

        let orelse = if !handlers.is_empty() && self.eat_kw(Keyword::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_kw(Keyword::Finally) {
            self.block()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }

        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            line,
        })
    }

    fn dotted_name(&mut self) -> ParseResult<(String, u32, u32)> {
        let (mut name, line, col) = self.expect_name()?;
        while self.eat_op(Op::Dot) {
            let (part, _, _) = self.expect_name()?;
            name.push('.');
            name.push_str(&part);
        }
        Ok((name, line, col))
    }

    fn import_statement(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let (name, line, col) = self.dotted_name()?;
            let asname = if self.eat_kw(Keyword::As) {
                Some(self.expect_name()?.0)
            } else {
                None
            };
            names.push(ImportAlias {
                name,
                asname,
                line,
                col,
            });
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn from_import(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        if self.at_op(Op::Dot) {
            return Err(self.error("relative imports are not supported"));
        }
        let (module, _, _) = self.dotted_name()?;
        self.expect_kw(Keyword::Import)?;
        if self.at_op(Op::Star) {
            return Err(self.error(format!(
                "wildcard import from '{module}' is not allowed"
            )));
        }
        let parenthesised = self.eat_op(Op::LParen);
        let mut names = Vec::new();
        loop {
            let (name, line, col) = self.expect_name()?;
            let asname = if self.eat_kw(Keyword::As) {
                Some(self.expect_name()?.0)
            } else {
                None
            };
            names.push(ImportAlias {
                name,
                asname,
                line,
                col,
            });
            if !self.eat_op(Op::Comma) {
                break;
            }
            if parenthesised && self.at_op(Op::RParen) {
                break;
            }
        }
        if parenthesised {
            self.expect_op(Op::RParen)?;
        }
        Ok(StmtKind::ImportFrom { module, names })
    }

    fn starts_expression(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Name(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::FString(_) => true,
            TokenKind::Keyword(kw) => matches!(
                kw,
                Keyword::None | Keyword::True | Keyword::False | Keyword::Not | Keyword::Lambda
            ),
            TokenKind::Op(op) => matches!(
                op,
                Op::LParen | Op::LBracket | Op::LBrace | Op::Minus | Op::Plus | Op::Tilde
            ),
            _ => false,
        }
    }

    /// One or more comma-separated expressions; more than one makes a tuple
    fn expression_list(&mut self) -> ParseResult<Expr> {
        let first = self.expression()?;
        if !self.at_op(Op::Comma) {
            return Ok(first);
        }
        let (line, col) = (first.line, first.col);
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr {
            kind: ExprKind::Tuple(items),
            line,
            col,
        })
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = if self.at_kw(Keyword::Lambda) {
            self.lambda()
        } else {
            self.conditional()
        };
        self.leave();
        result
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let body = self.or_test()?;
        if !self.at_kw(Keyword::If) {
            return Ok(body);
        }
        self.advance();
        let test = self.or_test()?;
        self.expect_kw(Keyword::Else)?;
        let orelse = self.expression()?;
        let (line, col) = (body.line, body.col);
        Ok(Expr {
            kind: ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            line,
            col,
        })
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let (params, vararg) = self.parameters(Op::Colon)?;
        self.expect_op(Op::Colon)?;
        let value = self.expression()?;
        let body = vec![Stmt {
            line: value.line,
            kind: StmtKind::Return(Some(value)),
        }];
        Ok(Expr {
            kind: ExprKind::Lambda(Rc::new(FunctionDef {
                name: "<lambda>".to_owned(),
                params,
                vararg,
                body,
                line: token.line,
            })),
            line: token.line,
            col: token.col,
        })
    }

    fn or_test(&mut self) -> ParseResult<Expr> {
        let mut left = self.and_test()?;
        while self.eat_kw(Keyword::Or) {
            let right = self.and_test()?;
            left = bool_op(BoolOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_test(&mut self) -> ParseResult<Expr> {
        let mut left = self.not_test()?;
        while self.eat_kw(Keyword::And) {
            let right = self.not_test()?;
            left = bool_op(BoolOp::And, left, right);
        }
        Ok(left)
    }

    fn not_test(&mut self) -> ParseResult<Expr> {
        if self.at_kw(Keyword::Not) {
            let token = self.advance();
            self.enter()?;
            let operand = self.not_test()?;
            self.leave();
            return Ok(Expr {
                kind: ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line: token.line,
                col: token.col,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let left = self.bit_or()?;
        let mut ops = Vec::new();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Op(Op::Eq) => CmpOp::Eq,
                TokenKind::Op(Op::NotEq) => CmpOp::NotEq,
                TokenKind::Op(Op::Lt) => CmpOp::Lt,
                TokenKind::Op(Op::LtE) => CmpOp::LtE,
                TokenKind::Op(Op::Gt) => CmpOp::Gt,
                TokenKind::Op(Op::GtE) => CmpOp::GtE,
                TokenKind::Keyword(Keyword::In) => CmpOp::In,
                TokenKind::Keyword(Keyword::Not)
                    if *self.peek_nth(1) == TokenKind::Keyword(Keyword::In) =>
                {
                    self.advance();
                    CmpOp::NotIn
                }
                TokenKind::Keyword(Keyword::Is) => {
                    if *self.peek_nth(1) == TokenKind::Keyword(Keyword::Not) {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.advance();
            ops.push((op, self.bit_or()?));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let (line, col) = (left.line, left.col);
        Ok(Expr {
            kind: ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
            line,
            col,
        })
    }

    fn binary_level(
        &mut self,
        table: &[(Op, BinOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (token_op, op) in table {
                if self.at_op(*token_op) {
                    self.advance();
                    let right = next(self)?;
                    left = bin_op(*op, left, right);
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(Op::Pipe, BinOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(Op::Caret, BinOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(Op::Amp, BinOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[(Op::LShift, BinOp::LShift), (Op::RShift, BinOp::RShift)],
            Self::arith,
        )
    }

    fn arith(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[(Op::Plus, BinOp::Add), (Op::Minus, BinOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (Op::Star, BinOp::Mul),
                (Op::Slash, BinOp::Div),
                (Op::DoubleSlash, BinOp::FloorDiv),
                (Op::Percent, BinOp::Mod),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Op(Op::Minus) => UnaryOp::Neg,
            TokenKind::Op(Op::Plus) => UnaryOp::Pos,
            TokenKind::Op(Op::Tilde) => UnaryOp::Invert,
            _ => return self.power(),
        };
        let token = self.advance();
        self.enter()?;
        let operand = self.factor()?;
        self.leave();
        Ok(Expr {
            kind: ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            line: token.line,
            col: token.col,
        })
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let base = self.primary()?;
        if self.eat_op(Op::DoubleStar) {
            self.enter()?;
            let exponent = self.factor()?;
            self.leave();
            return Ok(bin_op(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            let (line, col) = (self.peek().line, self.peek().col);
            if self.eat_op(Op::LParen) {
                let args = self.call_arguments()?;
                self.expect_op(Op::RParen)?;
                expr = Expr {
                    kind: ExprKind::Call {
                        func: Box::new(expr),
                        args,
                    },
                    line,
                    col,
                };
            } else if self.eat_op(Op::LBracket) {
                let index = self.subscript()?;
                self.expect_op(Op::RBracket)?;
                expr = Expr {
                    kind: ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                    col,
                };
            } else if self.eat_op(Op::Dot) {
                let (name, _, _) = self.expect_name()?;
                expr = Expr {
                    kind: ExprKind::Attribute {
                        value: Box::new(expr),
                        name,
                    },
                    line,
                    col,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> ParseResult<Vec<Arg>> {
        let mut args = Vec::new();
        let mut seen_keyword = false;
        while !self.at_op(Op::RParen) {
            if self.eat_op(Op::DoubleStar) {
                return Err(self.error("'**' arguments are not supported"));
            }
            if self.eat_op(Op::Star) {
                args.push(Arg::Star(self.expression()?));
            } else if matches!(self.peek_kind(), TokenKind::Name(_))
                && *self.peek_nth(1) == TokenKind::Op(Op::Assign)
            {
                let (name, _, _) = self.expect_name()?;
                self.advance();
                args.push(Arg::Keyword(name, self.expression()?));
                seen_keyword = true;
            } else {
                if seen_keyword {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let value = self.expression()?;
                if self.at_kw(Keyword::For) {
                    if !args.is_empty() {
                        return Err(self.error(
                            "generator expression must be parenthesized",
                        ));
                    }
                    let comp = self.comprehension(value)?;
                    if !self.at_op(Op::RParen) {
                        return Err(self.error(
                            "generator expression must be parenthesized",
                        ));
                    }
                    args.push(Arg::Positional(comp));
                    break;
                }
                args.push(Arg::Positional(value));
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn subscript(&mut self) -> ParseResult<Expr> {
        let first = self.slice_item()?;
        if !self.at_op(Op::Comma) {
            return Ok(first);
        }
        let (line, col) = (first.line, first.col);
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.at_op(Op::RBracket) {
                break;
            }
            items.push(self.slice_item()?);
        }
        Ok(Expr {
            kind: ExprKind::Tuple(items),
            line,
            col,
        })
    }

    fn slice_item(&mut self) -> ParseResult<Expr> {
        let (line, col) = (self.peek().line, self.peek().col);
        let lower = if self.at_op(Op::Colon) {
            None
        } else {
            let expr = self.expression()?;
            if !self.at_op(Op::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(Op::Colon)?;
        let bound = |p: &mut Self| -> ParseResult<Option<Box<Expr>>> {
            if p.at_op(Op::Colon) || p.at_op(Op::RBracket) || p.at_op(Op::Comma) {
                Ok(None)
            } else {
                Ok(Some(Box::new(p.expression()?)))
            }
        };
        let upper = bound(self)?;
        let step = if self.eat_op(Op::Colon) {
            bound(self)?
        } else {
            None
        };
        Ok(Expr {
            kind: ExprKind::Slice { lower, upper, step },
            line,
            col,
        })
    }

    fn comprehension(&mut self, elt: Expr) -> ParseResult<Expr> {
        let (line, col) = (elt.line, elt.col);
        let mut generators = Vec::new();
        while self.eat_kw(Keyword::For) {
            let target = self.target_list()?;
            self.expect_kw(Keyword::In)?;
            let iter = self.or_test()?;
            let mut ifs = Vec::new();
            while self.eat_kw(Keyword::If) {
                ifs.push(self.or_test()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(Expr {
            kind: ExprKind::ListComp {
                elt: Box::new(elt),
                generators,
            },
            line,
            col,
        })
    }

    fn atom(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let (line, col) = (token.line, token.col);
        let make = |kind| Expr { kind, line, col };

        match token.kind {
            TokenKind::Name(name) => {
                self.advance();
                Ok(make(ExprKind::Name(name)))
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(make(ExprKind::Const(Const::Int(value))))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(make(ExprKind::Const(Const::Float(value))))
            }
            TokenKind::Str(_) | TokenKind::FString(_) => self.strings(),
            TokenKind::Keyword(Keyword::None) => {
                self.advance();
                Ok(make(ExprKind::Const(Const::None)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(make(ExprKind::Const(Const::Bool(true))))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(make(ExprKind::Const(Const::Bool(false))))
            }
            TokenKind::Keyword(Keyword::Yield) => {
                Err(self.error("generators ('yield') are not supported"))
            }
            TokenKind::Keyword(Keyword::Await) => Err(self.error("async code is not supported")),
            TokenKind::Op(Op::LParen) => {
                self.advance();
                if self.eat_op(Op::RParen) {
                    return Ok(make(ExprKind::Tuple(Vec::new())));
                }
                let first = self.expression()?;
                if self.at_kw(Keyword::For) {
                    let comp = self.comprehension(first)?;
                    self.expect_op(Op::RParen)?;
                    return Ok(comp);
                }
                if !self.at_op(Op::Comma) {
                    self.expect_op(Op::RParen)?;
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(Op::Comma) {
                    if self.at_op(Op::RParen) {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op(Op::RParen)?;
                Ok(make(ExprKind::Tuple(items)))
            }
            TokenKind::Op(Op::LBracket) => {
                self.advance();
                if self.eat_op(Op::RBracket) {
                    return Ok(make(ExprKind::List(Vec::new())));
                }
                let first = self.expression()?;
                if self.at_kw(Keyword::For) {
                    let comp = self.comprehension(first)?;
                    self.expect_op(Op::RBracket)?;
                    return Ok(comp);
                }
                let mut items = vec![first];
                while self.eat_op(Op::Comma) {
                    if self.at_op(Op::RBracket) {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op(Op::RBracket)?;
                Ok(make(ExprKind::List(items)))
            }
            TokenKind::Op(Op::LBrace) => {
                self.advance();
                let mut pairs = Vec::new();
                while !self.at_op(Op::RBrace) {
                    if self.at_op(Op::DoubleStar) {
                        return Err(self.error("dict unpacking is not supported"));
                    }
                    let key = self.expression()?;
                    if !self.at_op(Op::Colon) {
                        return Err(self.error("set literals are not supported"));
                    }
                    self.advance();
                    let value = self.expression()?;
                    if self.at_kw(Keyword::For) {
                        return Err(self.error("dict comprehensions are not supported"));
                    }
                    pairs.push((key, value));
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                self.expect_op(Op::RBrace)?;
                Ok(make(ExprKind::Dict(pairs)))
            }
            TokenKind::Op(Op::Star) => Err(self.error("starred expressions are not supported")),
            _ => Err(self.unexpected()),
        }
    }

    /// Adjacent string literals, concatenated; f-strings make the whole run formatted
    fn strings(&mut self) -> ParseResult<Expr> {
        let (line, col) = (self.peek().line, self.peek().col);
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut formatted = false;

        loop {
            match self.peek_kind().clone() {
                TokenKind::Str(text) => {
                    self.advance();
                    push_literal(&mut parts, &text);
                }
                TokenKind::FString(body) => {
                    let token = self.advance();
                    formatted = true;
                    for part in self.fstring(&body, token.line, token.col)? {
                        match part {
                            FStringPart::Literal(text) => push_literal(&mut parts, &text),
                            field => parts.push(field),
                        }
                    }
                }
                _ => break,
            }
        }

        let kind = if formatted {
            ExprKind::FString(parts)
        } else {
            let text = match parts.pop() {
                Some(FStringPart::Literal(text)) => text,
                _ => String::new(),
            };
            ExprKind::Const(Const::Str(Rc::from(text)))
        };
        Ok(Expr { kind, line, col })
    }

    fn fstring(&mut self, body: &str, line: u32, col: u32) -> ParseResult<Vec<FStringPart>> {
        let fail = |message: &str| CompileError::at(format!("f-string: {message}"), line, col);
        let chars: Vec<char> = body.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '{' && chars.get(i + 1) == Some(&'{') {
                literal.push('{');
                i += 2;
                continue;
            }
            if c == '}' {
                if chars.get(i + 1) == Some(&'}') {
                    literal.push('}');
                    i += 2;
                    continue;
                }
                return Err(fail("single '}' is not allowed"));
            }
            if c != '{' {
                literal.push(c);
                i += 1;
                continue;
            }

            // Scan the replacement field up to its closing brace
            i += 1;
            let mut depth = 0usize;
            let mut quote: Option<char> = None;
            let mut expr_end = None;
            let mut conversion = None;
            let mut spec = None;
            let start = i;
            while i < chars.len() {
                let c = chars[i];
                if let Some(q) = quote {
                    if c == q {
                        quote = None;
                    }
                    i += 1;
                    continue;
                }
                match c {
                    '\'' | '"' => quote = Some(c),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' => depth = depth.saturating_sub(1),
                    '}' if depth > 0 => depth -= 1,
                    '}' => break,
                    '!' if depth == 0
                        && chars.get(i + 1) != Some(&'=')
                        && expr_end.is_none() =>
                    {
                        expr_end = Some(i);
                        let conv = chars
                            .get(i + 1)
                            .copied()
                            .filter(|c| matches!(c, 'r' | 's' | 'a'))
                            .ok_or_else(|| fail("invalid conversion character"))?;
                        conversion = Some(conv);
                        i += 2;
                        continue;
                    }
                    ':' if depth == 0 => {
                        if expr_end.is_none() {
                            expr_end = Some(i);
                        }
                        let spec_start = i + 1;
                        let mut j = spec_start;
                        while j < chars.len() && chars[j] != '}' {
                            j += 1;
                        }
                        spec = Some(chars[spec_start..j].iter().collect::<String>());
                        i = j;
                        break;
                    }
                    _ => {}
                }
                i += 1;
            }
            if i >= chars.len() {
                return Err(fail("expecting '}'"));
            }
            let end = expr_end.unwrap_or(i);
            let text: String = chars[start..end].iter().collect();
            if text.trim().is_empty() {
                return Err(fail("empty expression not allowed"));
            }
            // skip the closing brace
            i += 1;

            let tokens = tokenize(text.trim()).map_err(|e| fail(&e.message))?;
            let mut sub = Parser::new(tokens, self.depth);
            let mut expr = sub.expression_list().map_err(|e| fail(&e.message))?;
            while matches!(sub.peek_kind(), TokenKind::Newline) {
                sub.advance();
            }
            if !matches!(sub.peek_kind(), TokenKind::Eof) {
                return Err(fail("invalid syntax in replacement field"));
            }
            relocate(&mut expr, line, col);

            if !literal.is_empty() {
                parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
            }
            parts.push(FStringPart::Field {
                expr,
                conversion,
                spec,
            });
        }

        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        Ok(parts)
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FStringPart::Literal(text.to_owned()));
    }
}

/// Replacement fields are parsed on their own; pin them to the enclosing literal
fn relocate(expr: &mut Expr, line: u32, col: u32) {
    expr.line = line;
    expr.col = col;
}

fn augmented_op(op: Op) -> Option<BinOp> {
    let bin = match op {
        Op::PlusAssign => BinOp::Add,
        Op::MinusAssign => BinOp::Sub,
        Op::StarAssign => BinOp::Mul,
        Op::SlashAssign => BinOp::Div,
        Op::DoubleSlashAssign => BinOp::FloorDiv,
        Op::PercentAssign => BinOp::Mod,
        Op::DoubleStarAssign => BinOp::Pow,
        Op::AmpAssign => BinOp::BitAnd,
        Op::PipeAssign => BinOp::BitOr,
        Op::CaretAssign => BinOp::BitXor,
        Op::LShiftAssign => BinOp::LShift,
        Op::RShiftAssign => BinOp::RShift,
        _ => return None,
    };
    Some(bin)
}

fn bin_op(op: BinOp, left: Expr, right: Expr) -> Expr {
    let (line, col) = (left.line, left.col);
    Expr {
        kind: ExprKind::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        line,
        col,
    }
}

fn bool_op(op: BoolOp, left: Expr, right: Expr) -> Expr {
    let (line, col) = (left.line, left.col);
    Expr {
        kind: ExprKind::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
        col,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> StmtKind {
        let program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1, "expected one statement");
        program.body.into_iter().next().unwrap().kind
    }

    fn expr(source: &str) -> ExprKind {
        match single(source) {
            StmtKind::Expr(e) => e.kind,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        match expr("1 + 2 * 3") {
            ExprKind::BinOp { op, right, .. } => {
                assert_eq!(op, BinOp::Add);
                assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_unary() {
        match expr("-2 ** 2") {
            ExprKind::UnaryOp { op, operand } => {
                assert_eq!(op, UnaryOp::Neg);
                assert!(matches!(operand.kind, ExprKind::BinOp { op: BinOp::Pow, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chained_comparison() {
        match expr("1 < x <= 3") {
            ExprKind::Compare { ops, .. } => {
                assert_eq!(ops.len(), 2);
                assert_eq!(ops[0].0, CmpOp::Lt);
                assert_eq!(ops[1].0, CmpOp::LtE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn not_in_and_is_not() {
        match expr("a not in b") {
            ExprKind::Compare { ops, .. } => assert_eq!(ops[0].0, CmpOp::NotIn),
            other => panic!("unexpected {other:?}"),
        }
        match expr("a is not None") {
            ExprKind::Compare { ops, .. } => assert_eq!(ops[0].0, CmpOp::IsNot),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tuple_unpacking_assignment() {
        match single("a, b = 1, 2") {
            StmtKind::Assign { targets, value } => {
                assert_eq!(targets.len(), 1);
                assert!(matches!(targets[0], Target::Tuple(ref t) if t.len() == 2));
                assert!(matches!(value.kind, ExprKind::Tuple(ref t) if t.len() == 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chained_assignment() {
        match single("a = b = 0") {
            StmtKind::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn augmented_assignment() {
        assert!(matches!(
            single("x += 1"),
            StmtKind::AugAssign { op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn cannot_assign_to_literal() {
        let err = parse("1 = x").unwrap_err();
        assert!(err.message.contains("cannot assign to literal"));
    }

    #[test]
    fn if_elif_else() {
        let program = parse("if a:\n    x\nelif b:\n    y\nelse:\n    z\n").unwrap();
        match &program.body[0].kind {
            StmtKind::If { orelse, .. } => {
                assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_line_while() {
        assert!(matches!(single("while True: pass"), StmtKind::While { .. }));
    }

    #[test]
    fn function_with_defaults_and_varargs() {
        match single("def f(a, b=2, *rest):\n    return a\n") {
            StmtKind::FunctionDef(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.params.len(), 2);
                assert!(def.params[1].default.is_some());
                assert_eq!(def.vararg.as_deref(), Some("rest"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_default_after_default_is_rejected() {
        assert!(parse("def f(a=1, b):\n    pass\n").is_err());
    }

    #[test]
    fn lambda_expression() {
        assert!(matches!(expr("lambda x: x + 1"), ExprKind::Lambda(_)));
    }

    #[test]
    fn list_comprehension_with_condition() {
        match expr("[x * x for x in range(10) if x % 2]") {
            ExprKind::ListComp { generators, .. } => {
                assert_eq!(generators.len(), 1);
                assert_eq!(generators[0].ifs.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn generator_argument_becomes_comprehension() {
        match expr("sum(x for x in y)") {
            ExprKind::Call { args, .. } => {
                assert!(matches!(
                    args[0],
                    Arg::Positional(Expr {
                        kind: ExprKind::ListComp { .. },
                        ..
                    })
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn keyword_arguments() {
        match expr("print(1, 2, sep='-')") {
            ExprKind::Call { args, .. } => {
                assert_eq!(args.len(), 3);
                assert!(matches!(args[2], Arg::Keyword(ref name, _) if name == "sep"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slices() {
        match expr("x[1:10:2]") {
            ExprKind::Subscript { index, .. } => {
                assert!(matches!(
                    index.kind,
                    ExprKind::Slice {
                        lower: Some(_),
                        upper: Some(_),
                        step: Some(_)
                    }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
        match expr("x[::-1]") {
            ExprKind::Subscript { index, .. } => {
                assert!(matches!(
                    index.kind,
                    ExprKind::Slice {
                        lower: None,
                        upper: None,
                        step: Some(_)
                    }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fstring_fields() {
        match expr("f'a{x!r:>5}b{{c}}'") {
            ExprKind::FString(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[0], FStringPart::Literal(ref s) if s == "a"));
                match &parts[1] {
                    FStringPart::Field {
                        conversion, spec, ..
                    } => {
                        assert_eq!(*conversion, Some('r'));
                        assert_eq!(spec.as_deref(), Some(">5"));
                    }
                    other => panic!("unexpected {other:?}"),
                }
                assert!(matches!(parts[2], FStringPart::Literal(ref s) if s == "b{c}"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fstring_comparison_is_not_conversion() {
        assert!(matches!(expr("f'{a != b}'"), ExprKind::FString(_)));
    }

    #[test]
    fn fstring_errors() {
        assert!(parse("f'{}'").is_err());
        assert!(parse("f'{x'").is_err());
        assert!(parse("f'}'").is_err());
    }

    #[test]
    fn adjacent_strings_concatenate() {
        assert_eq!(
            expr("'a' 'b'"),
            ExprKind::Const(Const::Str(Rc::from("ab")))
        );
    }

    #[test]
    fn try_except_else_finally() {
        let source = "try:\n    x\nexcept ValueError as e:\n    y\nexcept:\n    z\nelse:\n    w\nfinally:\n    v\n";
        match single(source) {
            StmtKind::Try {
                handlers,
                orelse,
                finalbody,
                ..
            } => {
                assert_eq!(handlers.len(), 2);
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert!(handlers[1].kind.is_none());
                assert_eq!(orelse.len(), 1);
                assert_eq!(finalbody.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn imports() {
        match single("import math as m, random") {
            StmtKind::Import(names) => {
                assert_eq!(names.len(), 2);
                assert_eq!(names[0].bound_name(), "m");
                assert_eq!(names[1].bound_name(), "random");
            }
            other => panic!("unexpected {other:?}"),
        }
        match single("from math import (sqrt, pi as PI,)") {
            StmtKind::ImportFrom { module, names } => {
                assert_eq!(module, "math");
                assert_eq!(names[1].bound_name(), "PI");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn semicolon_separated_statements() {
        assert_eq!(parse("a = 1; b = 2; print(a)").unwrap().body.len(), 3);
    }

    #[test]
    fn unsupported_constructs_are_named() {
        let cases = [
            ("class A:\n    pass\n", "class"),
            ("with x:\n    pass\n", "with"),
            ("global x", "global"),
            ("def f():\n    yield 1\n", "yield"),
            ("from math import *", "wildcard"),
            ("x = {1, 2}", "set literals"),
            ("@d\ndef f():\n    pass\n", "decorators"),
        ];
        for (source, needle) in cases {
            let err = parse(source).unwrap_err();
            assert!(
                err.message.contains(needle),
                "{source:?} gave {:?}",
                err.message
            );
        }
    }

    #[test]
    fn syntax_error_reports_location() {
        let err = parse("x = (1 +\n").unwrap_err();
        assert!(err.line.is_some());
        let err = parse("print(1))").unwrap_err();
        assert_eq!(err.line, Some(1));
        assert_eq!(err.col, Some(9));
    }

    #[test]
    fn unexpected_indent() {
        let err = parse("  x = 1").unwrap_err();
        assert!(err.message.contains("unexpected indent"));
    }

    #[test]
    fn deep_nesting_is_rejected_without_overflow() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("nested"));

        let unary = format!("{}1", "-".repeat(500));
        assert!(parse(&unary).is_err());
    }

    #[test]
    fn lambda_parameters_are_not_annotations() {
        let ExprKind::Lambda(def) = expr("lambda a, b: a + b") else {
            panic!("expected lambda");
        };
        assert_eq!(def.params.len(), 2);
        assert!(def.params.iter().all(|p| p.default.is_none()));
        assert!(matches!(
            def.body[0].kind,
            StmtKind::Return(Some(Expr {
                kind: ExprKind::BinOp { .. },
                ..
            }))
        ));
    }

    #[test]
    fn def_parameters_may_be_annotated() {
        assert!(parse("def f(a: int, b: str = 'x'):\n    return a\n").is_ok());
    }
}
