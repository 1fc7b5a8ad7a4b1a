use crate::middle::ir::{BlockId, FrameId, FunctionId, ValueId};

/// What the value of the node being proved is needed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalTarget {
    /// Evaluated for effect only
    Void,
    /// The value is used by the enclosing expression
    Symbol,
    /// The value is returned from the enclosing function. Branching forms in
    /// this position return from each branch directly.
    Return,
}

/// Cursor threaded through the recursive proof. Never mutated in place;
/// nested forms derive a new context with one of the `with_*` methods.
#[derive(Debug, Clone, Copy)]
pub struct ASTContext {
    pub function: FunctionId,
    pub frame: FrameId,
    /// Instructions are appended here
    pub block: BlockId,
    pub target: EvalTarget,
    /// Innermost loop, the target of `repeat` and `break`
    pub loop_label: Option<ValueId>,
}

impl ASTContext {
    pub fn new(function: FunctionId, frame: FrameId, block: BlockId) -> Self {
        Self {
            function,
            frame,
            block,
            target: EvalTarget::Return,
            loop_label: None,
        }
    }

    pub fn with_target(self, target: EvalTarget) -> Self {
        Self { target, ..self }
    }

    pub fn with_block(self, block: BlockId) -> Self {
        Self { block, ..self }
    }

    pub fn with_frame(self, frame: FrameId) -> Self {
        Self { frame, ..self }
    }

    pub fn for_loop(self, loop_label: ValueId, body: BlockId) -> Self {
        Self {
            block: body,
            target: EvalTarget::Symbol,
            loop_label: Some(loop_label),
            ..self
        }
    }

    pub fn is_target_void(&self) -> bool {
        self.target == EvalTarget::Void
    }
}
