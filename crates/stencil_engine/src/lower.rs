//! Lowering of a parsed program into a [`Stencil`].
//!
//! Lexical declarations are hoisted per block: every `let`/`const` gets its
//! own slot when the block is entered and stays in its dead zone until the
//! declaration runs. Identifiers that resolve to no declaration become free
//! globals linked at instantiation.
//!
//! Lowering recurses along the tree, so it is held to the same depth limit as
//! the parser.

use std::sync::Arc;

use ahash::AHashMap;
use stencil_syntax::ast::{
    Block, Expr, ExprKind, LogicalOp, Program, Stmt, StmtKind, TemplateSegment,
};
use stencil_syntax::{LineIndex, Span, SyntaxError};

use crate::artifact::{Constant, Op, Stencil};

type LowerResult<T> = Result<T, SyntaxError>;

#[derive(Debug, Clone, Copy)]
struct Binding {
    slot: u32,
    constant: bool,
}

pub(crate) fn lower(
    program: &Program,
    source: &str,
    filename: &str,
    base_line: u32,
    max_depth: usize,
) -> LowerResult<Stencil> {
    let mut lowerer = Lowerer {
        source,
        depth: 0,
        max_depth,
        line_index: LineIndex::new(source),
        base_line,
        ops: Vec::new(),
        lines: Vec::new(),
        constants: Vec::new(),
        locals: Vec::new(),
        globals: Vec::new(),
        global_slots: AHashMap::new(),
        scopes: Vec::new(),
    };
    lowerer.statements(&program.body)?;

    Ok(Stencil {
        ops: lowerer.ops,
        lines: lowerer.lines,
        constants: lowerer.constants,
        locals: lowerer.locals,
        globals: lowerer.globals,
        filename: Arc::from(filename),
        base_line,
        source_len: source.len(),
    })
}

struct Lowerer<'a> {
    source: &'a str,
    depth: usize,
    max_depth: usize,
    line_index: LineIndex,
    base_line: u32,
    ops: Vec<Op>,
    lines: Vec<u32>,
    constants: Vec<Constant>,
    locals: Vec<Arc<str>>,
    globals: Vec<Arc<str>>,
    global_slots: AHashMap<String, u32>,
    scopes: Vec<AHashMap<String, Binding>>,
}

fn operand(value: usize, span: Span) -> LowerResult<u32> {
    u32::try_from(value).map_err(|_| SyntaxError::unexpected("script is too large to compile", span))
}

impl Lowerer<'_> {
    fn emit(&mut self, op: Op, span: Span) -> usize {
        let (line, _) = self.line_index.line_col(span.start);
        self.ops.push(op);
        self.lines
            .push(self.base_line.saturating_add(line.saturating_sub(1)));
        self.ops.len() - 1
    }

    /// Point the jump at `at` to the next op to be emitted.
    fn patch(&mut self, at: usize, span: Span) -> LowerResult<()> {
        let target = operand(self.ops.len(), span)?;
        if let Some(
            Op::Jump(slot)
            | Op::JumpIfFalse(slot)
            | Op::JumpIfFalseOrPop(slot)
            | Op::JumpIfTrueOrPop(slot),
        ) = self.ops.get_mut(at)
        {
            *slot = target;
        }
        Ok(())
    }

    fn constant(&mut self, constant: Constant, span: Span) -> LowerResult<u32> {
        let index = operand(self.constants.len(), span)?;
        self.constants.push(constant);
        Ok(index)
    }

    fn resolve(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn global(&mut self, name: &str, span: Span) -> LowerResult<u32> {
        if let Some(index) = self.global_slots.get(name) {
            return Ok(*index);
        }
        let index = operand(self.globals.len(), span)?;
        self.globals.push(Arc::from(name));
        self.global_slots.insert(name.to_string(), index);
        Ok(index)
    }

    fn descend<T>(
        &mut self,
        span: Span,
        f: impl FnOnce(&mut Self) -> LowerResult<T>,
    ) -> LowerResult<T> {
        if self.depth >= self.max_depth {
            return Err(SyntaxError::TooDeep {
                limit: self.max_depth,
                span,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ---- statements ----------------------------------------------------

    /// Lower a statement list in a fresh lexical scope.
    fn statements(&mut self, stmts: &[Stmt]) -> LowerResult<()> {
        let mut scope = AHashMap::new();
        for stmt in stmts {
            let (name, constant) = match &stmt.kind {
                StmtKind::Let { name, .. } => (name, false),
                StmtKind::Const { name, .. } => (name, true),
                _ => continue,
            };
            if scope.contains_key(&name.name) {
                return Err(SyntaxError::unexpected(
                    format!("Identifier '{}' has already been declared", name.name),
                    name.span,
                ));
            }
            let slot = operand(self.locals.len(), name.span)?;
            self.locals.push(Arc::from(name.name.as_str()));
            scope.insert(name.name.clone(), Binding { slot, constant });
        }

        self.scopes.push(scope);
        let result = stmts.iter().try_for_each(|stmt| self.statement(stmt));
        self.scopes.pop();
        result
    }

    fn block(&mut self, block: &Block) -> LowerResult<()> {
        self.statements(&block.stmts)
    }

    fn statement(&mut self, stmt: &Stmt) -> LowerResult<()> {
        self.descend(stmt.span, |this| this.statement_inner(stmt))
    }

    fn statement_inner(&mut self, stmt: &Stmt) -> LowerResult<()> {
        match &stmt.kind {
            StmtKind::Let { name, init } => {
                match init {
                    Some(init) => self.expression(init)?,
                    None => {
                        self.emit(Op::Undefined, stmt.span);
                    }
                }
                self.declare(&name.name, stmt.span)
            }
            StmtKind::Const { name, init } => {
                self.expression(init)?;
                self.declare(&name.name, stmt.span)
            }
            StmtKind::Assign { target, value } => {
                let Some(binding) = self.resolve(&target.name) else {
                    return Err(SyntaxError::unexpected(
                        format!("assignment to undeclared variable '{}'", target.name),
                        target.span,
                    ));
                };
                self.expression(value)?;
                let op = if binding.constant {
                    Op::AssignConst(binding.slot)
                } else {
                    Op::SetLocal(binding.slot)
                };
                self.emit(op, stmt.span);
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.expression(expr)?;
                self.emit(Op::SetCompletion, stmt.span);
                Ok(())
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expression(cond)?;
                let skip_then = self.emit(Op::JumpIfFalse(0), cond.span);
                self.block(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.emit(Op::Jump(0), else_branch.span);
                        self.patch(skip_then, stmt.span)?;
                        self.statement(else_branch)?;
                        self.patch(skip_else, stmt.span)
                    }
                    None => self.patch(skip_then, stmt.span),
                }
            }
            StmtKind::Throw(value) => {
                self.expression(value)?;
                self.emit(Op::Throw, stmt.span);
                Ok(())
            }
            StmtKind::Block(block) => self.block(block),
            StmtKind::Empty => Ok(()),
        }
    }

    /// Initialize the hoisted slot for `name` in the innermost scope.
    fn declare(&mut self, name: &str, span: Span) -> LowerResult<()> {
        let binding = self
            .scopes
            .last()
            .and_then(|scope| scope.get(name).copied())
            .ok_or_else(|| {
                SyntaxError::unexpected(format!("declaration of '{name}' is not hoisted"), span)
            })?;
        self.emit(Op::InitLocal(binding.slot), span);
        Ok(())
    }

    // ---- expressions ---------------------------------------------------

    fn expression(&mut self, expr: &Expr) -> LowerResult<()> {
        self.descend(expr.span, |this| this.expression_inner(expr))
    }

    fn expression_inner(&mut self, expr: &Expr) -> LowerResult<()> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Number(value) => {
                let index = self.constant(Constant::Number(*value), span)?;
                self.emit(Op::Constant(index), span);
            }
            ExprKind::String(text) => {
                let index = self.constant(Constant::String(Arc::from(text.as_str())), span)?;
                self.emit(Op::Constant(index), span);
            }
            ExprKind::Template(segments) => self.template(segments, span)?,
            ExprKind::Bool(true) => {
                self.emit(Op::True, span);
            }
            ExprKind::Bool(false) => {
                self.emit(Op::False, span);
            }
            ExprKind::Null => {
                self.emit(Op::Null, span);
            }
            ExprKind::Undefined => {
                self.emit(Op::Undefined, span);
            }
            ExprKind::Ident(name) => {
                let op = match self.resolve(name) {
                    Some(binding) => Op::GetLocal(binding.slot),
                    None => Op::GetGlobal(self.global(name, span)?),
                };
                self.emit(op, span);
            }
            ExprKind::Unary { op, operand: inner } => {
                self.expression(inner)?;
                self.emit(Op::Unary(*op), span);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expression(lhs)?;
                self.expression(rhs)?;
                self.emit(Op::Binary(*op), span);
            }
            ExprKind::Logical { op, lhs, rhs } => {
                self.expression(lhs)?;
                let jump = match op {
                    LogicalOp::And => Op::JumpIfFalseOrPop(0),
                    LogicalOp::Or => Op::JumpIfTrueOrPop(0),
                };
                let short_circuit = self.emit(jump, span);
                self.expression(rhs)?;
                self.patch(short_circuit, span)?;
            }
            ExprKind::Call { callee, args } => {
                self.expression(callee)?;
                for arg in args {
                    self.expression(arg)?;
                }
                let text = self.source.get(callee.span.range()).unwrap_or("expression");
                let callee = self.constant(Constant::String(Arc::from(text)), span)?;
                let argc = operand(args.len(), span)?;
                self.emit(Op::Call { argc, callee }, span);
            }
        }
        Ok(())
    }

    fn template(&mut self, segments: &[TemplateSegment], span: Span) -> LowerResult<()> {
        for segment in segments {
            match segment {
                TemplateSegment::Text(text) => {
                    let index = self.constant(Constant::String(Arc::from(text.as_str())), span)?;
                    self.emit(Op::Constant(index), span);
                }
                TemplateSegment::Expr(expr) => self.expression(expr)?,
            }
        }
        let count = operand(segments.len(), span)?;
        self.emit(Op::Concat(count), span);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_syntax::{ParseOptions, parse_program};

    const MAX_DEPTH: usize = 64;

    fn lower_source(source: &str) -> LowerResult<Stencil> {
        let program = parse_program(source, ParseOptions::default())?;
        lower(&program, source, "test.js", 1, MAX_DEPTH)
    }

    #[test]
    fn test_free_identifiers_become_globals() {
        let stencil = lower_source("let x = 1; print(x); print(x + y)").unwrap();
        let globals: Vec<&str> = stencil.globals().iter().map(AsRef::as_ref).collect();
        assert_eq!(globals, vec!["print", "y"]);
        assert_eq!(stencil.local_count(), 1);
        assert!(stencil.constants().contains(&Constant::String(Arc::from("print"))));
    }

    #[test]
    fn test_lowering_honours_depth_limit() {
        let source = "{ { { 1 + (2 + (3 + 4)) } } }";
        let program = parse_program(source, ParseOptions::default()).unwrap();

        let err = lower(&program, source, "deep.js", 1, 6).unwrap_err();
        assert!(matches!(err, SyntaxError::TooDeep { limit: 6, .. }));
        assert!(lower(&program, source, "deep.js", 1, MAX_DEPTH).is_ok());
    }

    #[test]
    fn test_redeclaration_is_rejected() {
        let err = lower_source("let a = 1;\nconst a = 2;").unwrap_err();
        assert!(err.to_string().contains("already been declared"));
        assert_eq!(err.span().start, 17);
    }

    #[test]
    fn test_shadowing_in_nested_block() {
        let stencil = lower_source("let a = 1; { let a = 2; print(a) } print(a)").unwrap();
        assert_eq!(stencil.local_count(), 2);
    }

    #[test]
    fn test_assignment_to_undeclared_name() {
        let err = lower_source("print = 1").unwrap_err();
        assert!(err.to_string().contains("undeclared variable 'print'"));
    }

    #[test]
    fn test_const_assignment_lowers_to_error_op() {
        let stencil = lower_source("const a = 1; a = 2").unwrap();
        assert!(stencil.ops().contains(&Op::AssignConst(0)));
    }

    #[test]
    fn test_line_table_uses_base_line() {
        let program = parse_program("\n\nthrow 1", ParseOptions::default()).unwrap();
        let stencil = lower(&program, "\n\nthrow 1", "none", 10, MAX_DEPTH).unwrap();
        let throw_at = stencil.ops().iter().position(|op| *op == Op::Throw).unwrap();
        assert_eq!(stencil.line_at(throw_at), 12);
    }

    #[test]
    fn test_jumps_are_patched() {
        let stencil = lower_source("if (a) { print(1) } else { print(2) }").unwrap();
        let len = u32::try_from(stencil.ops().len()).unwrap();
        for op in stencil.ops() {
            if let Op::Jump(target) | Op::JumpIfFalse(target) = op {
                assert!(*target > 0 && *target <= len);
            }
        }
    }
}
