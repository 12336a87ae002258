use crate::ast::{
    BinaryOp, Block, Expr, ExprKind, Ident, LogicalOp, Program, Stmt, StmtKind, TemplateSegment,
    UnaryOp,
};
use crate::error::SyntaxError;
use crate::span::Span;
use crate::token::{Keyword, Punct, TemplateChunk, Token, TokenKind};
use crate::tokenizer::{tokenize, tokenize_at};

type ParseResult<T> = Result<T, SyntaxError>;

/// Parser limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum nesting of statements and expressions. Operator chains count
    /// one level per operator, since each one nests the tree a level deeper.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// Parse a complete script.
pub fn parse_program(source: &str, options: ParseOptions) -> ParseResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, 0, options.max_depth);
    parser.program()
}

const EQUALITY_OPS: &[(Punct, BinaryOp)] = &[
    (Punct::EqEqEq, BinaryOp::StrictEq),
    (Punct::NotEqEq, BinaryOp::StrictNotEq),
    (Punct::EqEq, BinaryOp::Eq),
    (Punct::NotEq, BinaryOp::NotEq),
];

const COMPARISON_OPS: &[(Punct, BinaryOp)] = &[
    (Punct::Lt, BinaryOp::Lt),
    (Punct::Le, BinaryOp::Le),
    (Punct::Gt, BinaryOp::Gt),
    (Punct::Ge, BinaryOp::Ge),
];

const ADDITIVE_OPS: &[(Punct, BinaryOp)] = &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)];

const MULTIPLICATIVE_OPS: &[(Punct, BinaryOp)] = &[
    (Punct::Star, BinaryOp::Mul),
    (Punct::Slash, BinaryOp::Div),
    (Punct::Percent, BinaryOp::Rem),
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    prev_end: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize, max_depth: usize) -> Self {
        let prev_end = tokens.first().map_or(0, |token| token.span.start);
        Self {
            tokens,
            pos: 0,
            prev_end,
            depth,
            max_depth,
        }
    }

    fn program(&mut self) -> ParseResult<Program> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    // ---- token helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        // The tokenizer always terminates the list with `Eof`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        self.prev_end = token.span.end;
        token
    }

    fn check(&self, punct: Punct) -> bool {
        self.peek().is_punct(punct)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: Punct) -> ParseResult<Token> {
        if self.check(punct) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("expected `{punct}`")))
        }
    }

    fn unexpected(&self, context: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::unexpected(
            format!("{context}, found {}", token.kind.describe()),
            token.span,
        )
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    /// Run `f` one nesting level deeper, failing once the depth budget is spent.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= self.max_depth {
            return Err(SyntaxError::TooDeep {
                limit: self.max_depth,
                span: self.peek().span,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Build an expression node `height` levels tall, charging it against the
    /// depth budget on top of the current nesting.
    fn node(&self, kind: ExprKind, span: Span, height: usize) -> ParseResult<Expr> {
        if self.depth + height > self.max_depth {
            return Err(SyntaxError::TooDeep {
                limit: self.max_depth,
                span,
            });
        }
        Ok(Expr { kind, span, height })
    }

    fn logical(&self, op: LogicalOp, lhs: Expr, rhs: Expr) -> ParseResult<Expr> {
        let span = lhs.span.to(rhs.span);
        let height = 1 + lhs.height.max(rhs.height);
        self.node(
            ExprKind::Logical {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
            height,
        )
    }

    /// Statement terminator with the usual automatic semicolon insertion.
    fn terminate(&mut self) -> ParseResult<()> {
        if self.eat(Punct::Semicolon) {
            return Ok(());
        }
        let next = self.peek();
        if next.newline_before || next.is_punct(Punct::RBrace) || next.kind == TokenKind::Eof {
            return Ok(());
        }
        Err(self.unexpected("expected `;` after statement"))
    }

    fn ident(&mut self) -> ParseResult<Ident> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident {
                    name,
                    span: token.span,
                })
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    // ---- statements ----------------------------------------------------

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span.start;
        match self.peek().kind {
            TokenKind::Punct(Punct::Semicolon) => {
                self.advance();
                Ok(Stmt {
                    kind: StmtKind::Empty,
                    span: self.span_from(start),
                })
            }
            TokenKind::Punct(Punct::LBrace) => {
                let block = self.block()?;
                Ok(Stmt {
                    span: block.span,
                    kind: StmtKind::Block(block),
                })
            }
            TokenKind::Keyword(Keyword::Let) => self.let_statement(start),
            TokenKind::Keyword(Keyword::Const) => self.const_statement(start),
            TokenKind::Keyword(Keyword::If) => self.if_statement(start),
            TokenKind::Keyword(Keyword::Throw) => self.throw_statement(start),
            TokenKind::Keyword(Keyword::Else) => Err(self.unexpected("expected statement")),
            _ => self.expression_statement(start),
        }
    }

    fn block(&mut self) -> ParseResult<Block> {
        let start = self.expect(Punct::LBrace)?.span.start;
        let mut stmts = Vec::new();
        while !self.check(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.unexpected("expected `}`"));
            }
            stmts.push(self.statement()?);
        }
        self.advance();
        Ok(Block {
            stmts,
            span: self.span_from(start),
        })
    }

    fn let_statement(&mut self, start: usize) -> ParseResult<Stmt> {
        self.advance();
        let name = self.ident()?;
        let init = if self.eat(Punct::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.terminate()?;
        Ok(Stmt {
            kind: StmtKind::Let { name, init },
            span: self.span_from(start),
        })
    }

    fn const_statement(&mut self, start: usize) -> ParseResult<Stmt> {
        self.advance();
        let name = self.ident()?;
        if !self.eat(Punct::Assign) {
            return Err(SyntaxError::unexpected(
                "missing initializer in const declaration",
                name.span,
            ));
        }
        let init = self.expression()?;
        self.terminate()?;
        Ok(Stmt {
            kind: StmtKind::Const { name, init },
            span: self.span_from(start),
        })
    }

    fn if_statement(&mut self, start: usize) -> ParseResult<Stmt> {
        self.advance();
        self.expect(Punct::LParen)?;
        let cond = self.expression()?;
        self.expect(Punct::RParen)?;
        let then_branch = self.branch_body()?;
        let else_branch = if self.peek().is_keyword(Keyword::Else) {
            self.advance();
            let else_start = self.peek().span.start;
            let body = if self.peek().is_keyword(Keyword::If) {
                self.nested(|p| p.if_statement(else_start))?
            } else {
                let block = self.branch_body()?;
                Stmt {
                    span: block.span,
                    kind: StmtKind::Block(block),
                }
            };
            Some(Box::new(body))
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            span: self.span_from(start),
        })
    }

    /// Body of an `if`/`else`: a block, or a single non-declaration statement.
    fn branch_body(&mut self) -> ParseResult<Block> {
        if self.check(Punct::LBrace) {
            return self.block();
        }
        let stmt = self.statement()?;
        if matches!(stmt.kind, StmtKind::Let { .. } | StmtKind::Const { .. }) {
            return Err(SyntaxError::unexpected(
                "lexical declaration cannot appear in a single-statement context",
                stmt.span,
            ));
        }
        Ok(Block {
            span: stmt.span,
            stmts: vec![stmt],
        })
    }

    fn throw_statement(&mut self, start: usize) -> ParseResult<Stmt> {
        let keyword = self.advance();
        if self.peek().newline_before || self.at_eof() {
            return Err(SyntaxError::unexpected(
                "line break is not allowed after `throw`",
                keyword.span,
            ));
        }
        let value = self.expression()?;
        self.terminate()?;
        Ok(Stmt {
            kind: StmtKind::Throw(value),
            span: self.span_from(start),
        })
    }

    fn expression_statement(&mut self, start: usize) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        let kind = if self.check(Punct::Assign) {
            let assign = self.advance();
            let ExprKind::Ident(name) = expr.kind else {
                return Err(SyntaxError::unexpected(
                    "invalid assignment target",
                    expr.span.to(assign.span),
                ));
            };
            let value = self.expression()?;
            StmtKind::Assign {
                target: Ident {
                    name,
                    span: expr.span,
                },
                value,
            }
        } else {
            StmtKind::Expr(expr)
        };
        self.terminate()?;
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    // ---- expressions ---------------------------------------------------

    fn expression(&mut self) -> ParseResult<Expr> {
        self.nested(Self::logical_or)
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.logical_and()?;
        while self.eat(Punct::OrOr) {
            let rhs = self.logical_and()?;
            lhs = self.logical(LogicalOp::Or, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.equality()?;
        while self.eat(Punct::AndAnd) {
            let rhs = self.equality()?;
            lhs = self.logical(LogicalOp::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(EQUALITY_OPS, Self::comparison)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary_level(COMPARISON_OPS, Self::additive)
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.binary_level(ADDITIVE_OPS, Self::multiplicative)
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary_level(MULTIPLICATIVE_OPS, Self::unary)
    }

    fn binary_level(
        &mut self,
        ops: &[(Punct, BinaryOp)],
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut lhs = operand(self)?;
        loop {
            let Some(op) = ops
                .iter()
                .find(|(punct, _)| self.check(*punct))
                .map(|(_, op)| *op)
            else {
                return Ok(lhs);
            };
            self.advance();
            let rhs = operand(self)?;
            let span = lhs.span.to(rhs.span);
            let height = 1 + lhs.height.max(rhs.height);
            lhs = self.node(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
                height,
            )?;
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Minus) => UnaryOp::Neg,
            TokenKind::Punct(Punct::Bang) => UnaryOp::Not,
            TokenKind::Keyword(Keyword::Typeof) => UnaryOp::Typeof,
            _ => return self.call(),
        };
        let start = self.advance().span;
        let operand = self.nested(Self::unary)?;
        let span = start.to(operand.span);
        let height = 1 + operand.height;
        self.node(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
            height,
        )
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        while self.check(Punct::LParen) {
            self.advance();
            let mut args = Vec::new();
            while !self.check(Punct::RParen) {
                args.push(self.expression()?);
                if !self.eat(Punct::Comma) {
                    break;
                }
            }
            let close = self.expect(Punct::RParen)?;
            let span = expr.span.to(close.span);
            let height = 1 + args.iter().map(|arg| arg.height).fold(expr.height, usize::max);
            expr = self.node(
                ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                },
                span,
                height,
            )?;
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Number(value) => ExprKind::Number(value),
            TokenKind::String(value) => ExprKind::String(value),
            TokenKind::Template(chunks) => {
                self.advance();
                let segments = self.template(chunks)?;
                let height = 1 + segments
                    .iter()
                    .map(|segment| match segment {
                        TemplateSegment::Text(_) => 0,
                        TemplateSegment::Expr(expr) => expr.height,
                    })
                    .max()
                    .unwrap_or(0);
                return self.node(ExprKind::Template(segments), token.span, height);
            }
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::Keyword(Keyword::True) => ExprKind::Bool(true),
            TokenKind::Keyword(Keyword::False) => ExprKind::Bool(false),
            TokenKind::Keyword(Keyword::Null) => ExprKind::Null,
            TokenKind::Keyword(Keyword::Undefined) => ExprKind::Undefined,
            TokenKind::Keyword(Keyword::Await) => {
                return Err(SyntaxError::unexpected(
                    "await is only valid in async functions and the top level bodies of modules",
                    token.span,
                ));
            }
            TokenKind::Keyword(Keyword::Reserved(word)) => {
                return Err(SyntaxError::unexpected(
                    format!("`{word}` is not supported in stencil scripts"),
                    token.span,
                ));
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.expression()?;
                let close = self.expect(Punct::RParen)?;
                return Ok(Expr {
                    span: token.span.to(close.span),
                    ..inner
                });
            }
            _ => return Err(self.unexpected("expected expression")),
        };
        self.advance();
        self.node(kind, token.span, 1)
    }

    fn template(&mut self, chunks: Vec<TemplateChunk>) -> ParseResult<Vec<TemplateSegment>> {
        let mut segments = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match chunk {
                TemplateChunk::Text(text) => segments.push(TemplateSegment::Text(text)),
                TemplateChunk::Code { source, offset } => {
                    if source.trim().is_empty() {
                        return Err(SyntaxError::unexpected(
                            "empty template substitution",
                            Span::new(offset, offset + source.len()),
                        ));
                    }
                    let tokens = tokenize_at(&source, offset)?;
                    let mut inner = Parser::new(tokens, self.depth, self.max_depth);
                    let expr = inner.expression()?;
                    if !inner.at_eof() {
                        return Err(inner.unexpected("expected `}` closing template substitution"));
                    }
                    segments.push(TemplateSegment::Expr(expr));
                }
            }
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program(source, ParseOptions::default()).unwrap()
    }

    fn parse_err(source: &str) -> SyntaxError {
        parse_program(source, ParseOptions::default()).unwrap_err()
    }

    #[test]
    fn test_print_call() {
        let program = parse("print(\"hello\");");
        assert_eq!(program.body.len(), 1);
        let StmtKind::Expr(expr) = &program.body[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { callee, args } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(callee.kind, ExprKind::Ident("print".into()));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_precedence() {
        let program = parse("1 + 2 * 3");
        let StmtKind::Expr(expr) = &program.body[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_automatic_semicolons() {
        let program = parse("let a = 1\nlet b = 2\nprint(a + b)");
        assert_eq!(program.body.len(), 3);
        assert!(matches!(
            parse_err("let a = 1 let b = 2"),
            SyntaxError::Unexpected { .. }
        ));
    }

    #[test]
    fn test_template_substitution() {
        let program = parse("print(`JS log one: ${1 + 2} end`);");
        let StmtKind::Expr(expr) = &program.body[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { args, .. } = &expr.kind else {
            panic!("expected call");
        };
        let ExprKind::Template(segments) = &args[0].kind else {
            panic!("expected template");
        };
        assert_eq!(segments.len(), 3);
        let TemplateSegment::Expr(inner) = &segments[1] else {
            panic!("expected substitution");
        };
        assert_eq!(inner.span, Span::new(21, 26));
    }

    #[test]
    fn test_top_level_await_is_rejected() {
        let source = "\n        await print(`JS log two`);\n        ";
        let err = parse_err(source);
        assert!(err.to_string().contains("await is only valid"));
        assert_eq!(err.span().start, 9);
    }

    #[test]
    fn test_reserved_word() {
        let err = parse_err("function f() {}");
        assert!(err.to_string().contains("`function` is not supported"));
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse("if (a) { print(1) } else if (b) print(2); else { print(3) }");
        let StmtKind::If { else_branch, .. } = &program.body[0].kind else {
            panic!("expected if");
        };
        let else_branch = else_branch.as_ref().unwrap();
        assert!(matches!(else_branch.kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_declaration_in_single_statement_context() {
        assert!(parse_err("if (a) let x = 1;").to_string().contains("lexical declaration"));
    }

    #[test]
    fn test_assignment_target_must_be_identifier() {
        assert!(parse_err("f() = 1").to_string().contains("invalid assignment target"));
    }

    #[test]
    fn test_throw_requires_same_line_value() {
        assert!(parse_err("throw\n'x'").to_string().contains("line break"));
    }

    #[test]
    fn test_depth_limit() {
        let nested = format!("{}1{}", "(".repeat(64), ")".repeat(64));
        let err = parse_program(&nested, ParseOptions { max_depth: 16 }).unwrap_err();
        assert!(matches!(err, SyntaxError::TooDeep { limit: 16, .. }));
        assert!(parse_program(&nested, ParseOptions { max_depth: 512 }).is_ok());
    }

    #[test]
    fn test_operator_chains_count_toward_depth() {
        let chain = |terms: usize| format!("1{}", " + 1".repeat(terms - 1));
        assert!(parse_program(&chain(40), ParseOptions::default()).is_ok());

        for source in [
            chain(20_000),
            format!("a{}", " && a".repeat(20_000)),
            format!("f{}", "()".repeat(20_000)),
            format!("{}1", "-".repeat(20_000)),
        ] {
            let err = parse_program(&source, ParseOptions::default()).unwrap_err();
            assert!(matches!(err, SyntaxError::TooDeep { limit: 64, .. }));
        }
    }

    #[test]
    fn test_expression_height() {
        let program = parse("f(1 + 2 * 3) || x");
        let StmtKind::Expr(expr) = &program.body[0].kind else {
            panic!("expected expression statement");
        };
        assert_eq!(expr.height, 5);
    }

    #[test]
    fn test_depth_limit_applies_inside_templates() {
        let nested = format!("`${{{}1{}}}`", "(".repeat(64), ")".repeat(64));
        let err = parse_program(&nested, ParseOptions { max_depth: 16 }).unwrap_err();
        assert!(matches!(err, SyntaxError::TooDeep { .. }));
    }

    #[test]
    fn test_unclosed_block() {
        assert!(parse_err("{ print(1)").to_string().contains("expected `}`"));
    }

    #[test]
    fn test_missing_const_initializer() {
        assert!(parse_err("const x;").to_string().contains("missing initializer"));
    }
}
