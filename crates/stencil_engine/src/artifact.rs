//! Compiled script representation.
//!
//! A [`Stencil`] is the context-independent output of one compile: a flat
//! operation list, its constant pool and a line table. Nothing in it refers to
//! an execution context, so one stencil can be instantiated by any number of
//! contexts on any number of threads through an [`ArtifactHandle`].

use std::fmt;
use std::sync::Arc;

use stencil_syntax::ast::{BinaryOp, UnaryOp};

/// A pooled constant. Runtime strings are created from these per context.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Number(f64),
    String(Arc<str>),
}

/// One stencil operation. Operands index the stencil's tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// Push a constant from the pool.
    Constant(u32),
    Undefined,
    Null,
    True,
    False,
    /// Push a local slot; fails while the slot is in its dead zone.
    GetLocal(u32),
    /// Pop into a local slot, ending its dead zone.
    InitLocal(u32),
    /// Pop into an already initialized local slot.
    SetLocal(u32),
    /// Raise the error for assigning to a `const` slot.
    AssignConst(u32),
    /// Push a global linked at instantiation.
    GetGlobal(u32),
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Pop `n` values and push their concatenated string forms.
    Concat(u32),
    /// Call with `argc` arguments; `callee` is the constant holding the callee's source text.
    Call { argc: u32, callee: u32 },
    Jump(u32),
    /// Pop the condition and jump when it is falsy.
    JumpIfFalse(u32),
    /// `&&`: jump keeping the value when falsy, otherwise pop it.
    JumpIfFalseOrPop(u32),
    /// `||`: jump keeping the value when truthy, otherwise pop it.
    JumpIfTrueOrPop(u32),
    /// Pop into the completion value.
    SetCompletion,
    Throw,
}

/// Compiled, not yet instantiated script.
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
    pub(crate) ops: Vec<Op>,
    /// Script line of each op, parallel to `ops`.
    pub(crate) lines: Vec<u32>,
    pub(crate) constants: Vec<Constant>,
    /// Names of the lexical slots, indexed by slot.
    pub(crate) locals: Vec<Arc<str>>,
    /// Free identifiers, resolved against context globals when instantiated.
    pub(crate) globals: Vec<Arc<str>>,
    pub(crate) filename: Arc<str>,
    pub(crate) base_line: u32,
    pub(crate) source_len: usize,
}

impl Stencil {
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn globals(&self) -> &[Arc<str>] {
        &self.globals
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Script line of the op at `pc`, falling back to the base line.
    pub fn line_at(&self, pc: usize) -> u32 {
        self.lines.get(pc).copied().unwrap_or(self.base_line)
    }
}

/// Shared, immutable handle to a compiled stencil.
///
/// Cloning acquires another reference; the stencil is freed when the last
/// handle is dropped.
#[derive(Clone)]
pub struct ArtifactHandle(Arc<Stencil>);

impl ArtifactHandle {
    pub(crate) fn new(stencil: Stencil) -> Self {
        Self(Arc::new(stencil))
    }

    pub fn stencil(&self) -> &Stencil {
        &self.0
    }

    pub fn filename(&self) -> &str {
        &self.0.filename
    }

    pub fn base_line(&self) -> u32 {
        self.0.base_line
    }

    /// Length in bytes of the source the stencil was compiled from.
    pub fn source_len(&self) -> usize {
        self.0.source_len
    }

    pub fn op_count(&self) -> usize {
        self.0.ops.len()
    }

    /// Whether both handles refer to the same compiled stencil.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles to this stencil.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("filename", &self.filename())
            .field("base_line", &self.base_line())
            .field("ops", &self.op_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stencil() -> Stencil {
        Stencil {
            ops: vec![Op::Constant(0), Op::SetCompletion],
            lines: vec![3, 3],
            constants: vec![Constant::Number(1.0)],
            locals: Vec::new(),
            globals: Vec::new(),
            filename: Arc::from("none"),
            base_line: 3,
            source_len: 1,
        }
    }

    #[test]
    fn test_handle_identity() {
        let handle = ArtifactHandle::new(stencil());
        let clone = handle.clone();
        let other = ArtifactHandle::new(stencil());

        assert!(handle.ptr_eq(&clone));
        assert!(!handle.ptr_eq(&other));
        assert_eq!(handle.holders(), 2);
        drop(clone);
        assert_eq!(handle.holders(), 1);
    }

    #[test]
    fn test_handle_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ArtifactHandle>();
    }

    #[test]
    fn test_line_lookup() {
        let stencil = stencil();
        assert_eq!(stencil.line_at(1), 3);
        assert_eq!(stencil.line_at(99), 3);
    }
}
