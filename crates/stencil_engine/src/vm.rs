use std::cmp::Ordering;
use std::rc::Rc;

use stencil_syntax::ast::{BinaryOp, UnaryOp};

use crate::artifact::{Constant, Op, Stencil};
use crate::error::RuntimeError;
use crate::value::Value;

/// Runs one instantiated stencil to completion.
pub(crate) struct Interpreter<'a> {
    stencil: &'a Stencil,
    globals: &'a [Value],
    max_string_bytes: usize,
    stack: Vec<Value>,
    /// `None` while a slot is in its dead zone.
    locals: Vec<Option<Value>>,
    completion: Value,
    pc: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(stencil: &'a Stencil, globals: &'a [Value], max_string_bytes: usize) -> Self {
        Self {
            stencil,
            globals,
            max_string_bytes,
            stack: Vec::with_capacity(16),
            locals: vec![None; stencil.locals.len()],
            completion: Value::Undefined,
            pc: 0,
        }
    }

    pub(crate) fn run(mut self) -> Result<Value, RuntimeError> {
        while let Some(op) = self.stencil.ops.get(self.pc).copied() {
            let mut next = self.pc + 1;
            match op {
                Op::Constant(index) => {
                    let value = self
                        .stencil
                        .constants
                        .get(index as usize)
                        .map_or(Value::Undefined, Value::from_constant);
                    self.stack.push(value);
                }
                Op::Undefined => self.stack.push(Value::Undefined),
                Op::Null => self.stack.push(Value::Null),
                Op::True => self.stack.push(Value::Bool(true)),
                Op::False => self.stack.push(Value::Bool(false)),
                Op::GetLocal(slot) => {
                    let value = self.initialized(slot)?.clone();
                    self.stack.push(value);
                }
                Op::InitLocal(slot) => {
                    let value = self.pop();
                    if let Some(local) = self.locals.get_mut(slot as usize) {
                        *local = Some(value);
                    }
                }
                Op::SetLocal(slot) => {
                    self.initialized(slot)?;
                    let value = self.pop();
                    if let Some(local) = self.locals.get_mut(slot as usize) {
                        *local = Some(value);
                    }
                }
                Op::AssignConst(_) => {
                    return Err(RuntimeError::TypeError {
                        message: "Assignment to constant variable.".to_string(),
                        location: self.location(),
                    });
                }
                Op::GetGlobal(index) => {
                    let value = self
                        .globals
                        .get(index as usize)
                        .cloned()
                        .unwrap_or(Value::Undefined);
                    self.stack.push(value);
                }
                Op::Unary(op) => {
                    let operand = self.pop();
                    self.stack.push(unary(op, &operand));
                }
                Op::Binary(op) => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    let value = self.binary(op, &lhs, &rhs)?;
                    self.stack.push(value);
                }
                Op::Concat(count) => {
                    let start = self.stack.len().saturating_sub(count as usize);
                    let mut text = String::new();
                    for part in self.stack.drain(start..) {
                        text.push_str(&part.to_display());
                    }
                    let value = self.checked_string(text)?;
                    self.stack.push(value);
                }
                Op::Call { argc, callee } => {
                    let start = self.stack.len().saturating_sub(argc as usize);
                    let args: Vec<Value> = self.stack.drain(start..).collect();
                    let function = self.pop();
                    let result = self.call(&function, &args, callee)?;
                    self.stack.push(result);
                }
                Op::Jump(target) => next = target as usize,
                Op::JumpIfFalse(target) => {
                    if !self.pop().is_truthy() {
                        next = target as usize;
                    }
                }
                Op::JumpIfFalseOrPop(target) => {
                    if self.peek_truthy() {
                        self.pop();
                    } else {
                        next = target as usize;
                    }
                }
                Op::JumpIfTrueOrPop(target) => {
                    if self.peek_truthy() {
                        next = target as usize;
                    } else {
                        self.pop();
                    }
                }
                Op::SetCompletion => self.completion = self.pop(),
                Op::Throw => {
                    let value = self.pop();
                    return Err(RuntimeError::Uncaught {
                        value: value.to_display(),
                        location: self.location(),
                    });
                }
            }
            self.pc = next;
        }
        Ok(self.completion)
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Undefined)
    }

    fn peek_truthy(&self) -> bool {
        self.stack.last().is_some_and(Value::is_truthy)
    }

    fn location(&self) -> String {
        format!("{}:{}", self.stencil.filename, self.stencil.line_at(self.pc))
    }

    fn initialized(&self, slot: u32) -> Result<&Value, RuntimeError> {
        match self.locals.get(slot as usize) {
            Some(Some(value)) => Ok(value),
            _ => {
                let name = self
                    .stencil
                    .locals
                    .get(slot as usize)
                    .map_or("<local>", |name| &**name);
                Err(RuntimeError::ReferenceError {
                    message: format!("Cannot access '{name}' before initialization"),
                    location: self.location(),
                })
            }
        }
    }

    fn checked_string(&self, text: String) -> Result<Value, RuntimeError> {
        if text.len() > self.max_string_bytes {
            return Err(RuntimeError::RangeError {
                message: "Invalid string length".to_string(),
                location: self.location(),
            });
        }
        Ok(Value::String(Rc::from(text)))
    }

    fn binary(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
        let value = match op {
            BinaryOp::Add => {
                if is_stringish(lhs) || is_stringish(rhs) {
                    let mut text = lhs.to_display();
                    text.push_str(&rhs.to_display());
                    return self.checked_string(text);
                }
                Value::Number(lhs.to_number() + rhs.to_number())
            }
            BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
            BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
            BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
            BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
            BinaryOp::Eq => Value::Bool(lhs.loose_eq(rhs)),
            BinaryOp::NotEq => Value::Bool(!lhs.loose_eq(rhs)),
            BinaryOp::StrictEq => Value::Bool(lhs.strict_eq(rhs)),
            BinaryOp::StrictNotEq => Value::Bool(!lhs.strict_eq(rhs)),
            BinaryOp::Lt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Less)),
            BinaryOp::Le => Value::Bool(matches!(
                compare(lhs, rhs),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Greater)),
            BinaryOp::Ge => Value::Bool(matches!(
                compare(lhs, rhs),
                Some(Ordering::Greater | Ordering::Equal)
            )),
        };
        Ok(value)
    }

    fn call(&self, function: &Value, args: &[Value], callee: u32) -> Result<Value, RuntimeError> {
        let Value::Function(function) = function else {
            let text = match self.stencil.constants.get(callee as usize) {
                Some(Constant::String(text)) => text.to_string(),
                _ => function.to_display(),
            };
            return Err(RuntimeError::TypeError {
                message: format!("{text} is not a function"),
                location: self.location(),
            });
        };
        function.call(args).map_err(|message| RuntimeError::Host {
            function: function.name().to_string(),
            message,
            location: self.location(),
        })
    }
}

fn is_stringish(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Function(_))
}

fn unary(op: UnaryOp, operand: &Value) -> Value {
    match op {
        UnaryOp::Neg => Value::Number(-operand.to_number()),
        UnaryOp::Not => Value::Bool(!operand.is_truthy()),
        UnaryOp::Typeof => Value::string(operand.type_of()),
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower;
    use stencil_syntax::{ParseOptions, parse_program};

    fn eval_with(
        source: &str,
        globals: &[Value],
        max_string_bytes: usize,
    ) -> Result<Value, RuntimeError> {
        let options = ParseOptions::default();
        let program = parse_program(source, options).unwrap();
        let stencil = lower(&program, source, "vm.js", 1, options.max_depth).unwrap();
        Interpreter::new(&stencil, globals, max_string_bytes).run()
    }

    fn eval(source: &str) -> Result<Value, RuntimeError> {
        eval_with(source, &[], 1024)
    }

    fn eval_text(source: &str) -> String {
        eval(source).unwrap().to_display()
    }

    #[test]
    fn test_arithmetic_and_concatenation() {
        assert_eq!(eval_text("1 + 2 * 3"), "7");
        assert_eq!(eval_text("'a' + 1 + 2"), "a12");
        assert_eq!(eval_text("1 + 2 + 'a'"), "3a");
        assert_eq!(eval_text("7 % 4 - 1 / 2"), "2.5");
        assert_eq!(eval_text("-'3'"), "-3");
    }

    #[test]
    fn test_template_and_typeof() {
        assert_eq!(eval_text("let n = 2; `n=${n} ${typeof n}`"), "n=2 number");
        assert_eq!(eval_text("``"), "");
    }

    #[test]
    fn test_logical_short_circuit() {
        assert_eq!(eval_text("0 || 'fallback'"), "fallback");
        assert_eq!(eval_text("'' && missing()"), "");
        assert_eq!(eval_text("1 && 2 && 3"), "3");
    }

    #[test]
    fn test_if_else_completion() {
        assert_eq!(eval_text("let x = 3; if (x > 2) { 'big' } else { 'small' }"), "big");
        assert_eq!(eval_text("if (0) 'yes'; else if ('') 'maybe'; else 'no'"), "no");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval_text("'a' < 'b'"), "true");
        assert_eq!(eval_text("2 >= '2'"), "true");
        assert_eq!(eval_text("1 < undefined"), "false");
        assert_eq!(eval_text("null == undefined"), "true");
        assert_eq!(eval_text("1 === '1'"), "false");
    }

    #[test]
    fn test_temporal_dead_zone() {
        let err = eval("print(x); let x = 1;").unwrap_err();
        assert!(matches!(err, RuntimeError::ReferenceError { .. }));

        let err = eval("x; let x = 1;").unwrap_err();
        let RuntimeError::ReferenceError { message, location } = err else {
            panic!("expected reference error");
        };
        assert_eq!(message, "Cannot access 'x' before initialization");
        assert_eq!(location, "vm.js:1");
    }

    #[test]
    fn test_const_assignment() {
        let err = eval("const a = 1;\na = 2").unwrap_err();
        let RuntimeError::TypeError { location, .. } = err else {
            panic!("expected type error");
        };
        assert_eq!(location, "vm.js:2");
    }

    #[test]
    fn test_let_assignment() {
        assert_eq!(eval_text("let a = 1; a = a + 1; a"), "2");
        assert_eq!(eval_text("let a; typeof a"), "undefined");
    }

    #[test]
    fn test_throw_reports_line() {
        let err = eval("let a = 1\n\nthrow 'boom ' + a").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::Uncaught {
                value: "boom 1".into(),
                location: "vm.js:3".into(),
            }
        );
    }

    #[test]
    fn test_calling_a_non_function() {
        let err = eval_with("missing(1)", &[Value::Number(1.0)], 1024).unwrap_err();
        let RuntimeError::TypeError { message, .. } = err else {
            panic!("expected type error");
        };
        assert_eq!(message, "missing is not a function");
    }

    #[test]
    fn test_host_errors() {
        let fail = Value::Function(Rc::new(crate::host::HostFunction::new("fail", |_| {
            Err("nope".to_string())
        })));
        let err = eval_with("fail()", &[fail], 1024).unwrap_err();
        assert!(matches!(err, RuntimeError::Host { ref function, .. } if function == "fail"));
    }

    #[test]
    fn test_string_length_limit() {
        let err = eval_with("'abcd' + 'efgh'", &[], 6).unwrap_err();
        assert!(matches!(err, RuntimeError::RangeError { .. }));
        assert_eq!(eval_with("'abc' + 'def'", &[], 6).unwrap().to_display(), "abcdef");
    }
}
