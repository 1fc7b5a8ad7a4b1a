//! Typed IR. Proving an untyped node produces a [`TypedValue`]; values which
//! do work at runtime are [`Instruction`]s living in exactly one [`Block`].
//! Blocks nest through parent links, mirroring the structure of the source:
//! the branches of a conditional, the body of a label or loop. Control flow
//! between them is expressed by the terminators which leave a block for an
//! enclosing merge point.

use hashbrown::{HashMap, HashSet};

use crate::{
    frontend::{anchor::Anchor, intern::Symbol, node::NodeId},
    index::simple_index,
    middle::{
        prover::builtin::Builtin,
        qualifier::{IdSet, UniqueId},
        ty::Type,
    },
};

pub mod pretty_print;

simple_index! {
    /// Identifies a typed value
    pub struct ValueId;
}

simple_index! {
    /// Identifies a block of instructions
    pub struct BlockId;
}

simple_index! {
    /// Identifies a specialized function
    pub struct FunctionId;
}

simple_index! {
    /// Identifies an inlining frame
    pub struct FrameId;
}

#[derive(Debug, Clone)]
pub struct TypedValue {
    pub kind: ValueKind,
    pub ty: Type,
    pub anchor: Anchor,
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    ConstInt(i128),
    ConstReal(f64),
    ConstNull,
    ConstType(Type),
    Extern(Symbol),
    Builtin(Builtin),
    Function(FunctionId),
    /// A template paired with the frame it closes over. Specialized on call.
    Closure {
        template: NodeId,
        frame: FrameId,
    },
    Parameter {
        function: FunctionId,
        index: usize,
    },
    /// The per-iteration arguments of a loop
    LoopArguments {
        loop_label: ValueId,
    },
    ArgumentList(Vec<ValueId>),
    ExtractArgument {
        value: ValueId,
        index: usize,
    },
    Keyed {
        key: Symbol,
        value: ValueId,
    },
    Instruction(Instruction),
}

impl ValueKind {
    /// Values which exist at compile time and may be shared between
    /// functions
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            ValueKind::ConstInt(_)
                | ValueKind::ConstReal(_)
                | ValueKind::ConstNull
                | ValueKind::ConstType(_)
                | ValueKind::Extern(_)
                | ValueKind::Builtin(_)
                | ValueKind::Function(_)
                | ValueKind::Closure { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub block: BlockId,
}

#[derive(Debug, Clone)]
pub struct SwitchArm {
    /// `None` for the default arm
    pub literal: Option<i128>,
    /// Pass arms fall through into the next arm
    pub pass: bool,
    pub body: BlockId,
}

#[derive(Debug, Clone)]
pub enum InstructionKind {
    Call {
        callee: ValueId,
        args: Vec<ValueId>,
    },
    Builtin {
        op: Builtin,
        args: Vec<ValueId>,
    },
    /// Merge point; yields whatever its `merges` carry
    Label {
        name: Symbol,
        body: BlockId,
        merges: Vec<ValueId>,
    },
    CondBr {
        condition: ValueId,
        then_body: BlockId,
        else_body: BlockId,
    },
    Switch {
        expr: ValueId,
        arms: Vec<SwitchArm>,
    },
    /// Merge point for both `repeat` (back to the top of `body`) and `break`
    LoopLabel {
        init: Vec<ValueId>,
        args: ValueId,
        body: BlockId,
        repeats: Vec<ValueId>,
        breaks: Vec<ValueId>,
    },
    Merge {
        label: ValueId,
        value: ValueId,
    },
    Repeat {
        loop_label: ValueId,
        value: ValueId,
    },
    Return {
        value: ValueId,
    },
    Raise {
        value: ValueId,
    },
}

impl InstructionKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionKind::Merge { .. }
                | InstructionKind::Repeat { .. }
                | InstructionKind::Return { .. }
                | InstructionKind::Raise { .. }
        )
    }

    /// The value carried by a terminator
    pub fn carried_value(&self) -> Option<ValueId> {
        match self {
            InstructionKind::Merge { value, .. }
            | InstructionKind::Repeat { value, .. }
            | InstructionKind::Return { value }
            | InstructionKind::Raise { value } => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub parent: Option<BlockId>,
    /// 0 is reserved for function parameters, a function's root block has
    /// depth 1
    pub depth: u32,
    pub body: Vec<ValueId>,
    pub terminator: Option<ValueId>,
    /// Unique ids alive at the current end of the block
    pub valid: IdSet,
}

impl Block {
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// Bookkeeping for one resource owned by a function
#[derive(Debug, Clone)]
pub struct UniqueInfo {
    /// The value which carries the id
    pub value: ValueId,
    /// Depth of the block the id was created in
    pub depth: u32,
    /// Where the id was most recently moved or dropped
    pub moved_at: Option<Anchor>,
    /// A parameter the function only views. It stays alive for the whole
    /// body and is never moved or dropped.
    pub borrowed: bool,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Symbol,
    pub template: NodeId,
    /// Root frame the body is proved in
    pub frame: FrameId,
    /// Canonical argument types this instance was specialized for
    pub instance_args: Vec<Type>,
    pub params: Vec<ValueId>,
    pub body: BlockId,
    /// Union of all `return` edges seen so far
    pub return_type: Option<Type>,
    /// Union of all `raise` edges seen so far
    pub raise_type: Option<Type>,
    /// Final function type, set when the body has been proved
    pub signature: Option<Type>,
    pub complete: bool,
    pub uniques: HashMap<UniqueId, UniqueInfo>,
    pub returns: Vec<ValueId>,
    pub raises: Vec<ValueId>,
    /// Signature handed to a recursive call before the body was complete
    pub published_signature: Option<Type>,
    pub next_unique: i32,
}

impl Function {
    pub fn allocate_unique(&mut self, value: ValueId, depth: u32) -> UniqueId {
        let id = UniqueId::new(self.next_unique);
        self.next_unique += 1;
        self.uniques.insert(
            id,
            UniqueInfo {
                value,
                depth,
                moved_at: None,
                borrowed: false,
            },
        );
        id
    }

    pub fn unique_depth(&self, id: UniqueId) -> Option<u32> {
        self.uniques.get(&id).map(|info| info.depth)
    }

    pub fn is_borrowed(&self, id: UniqueId) -> bool {
        self.uniques.get(&id).is_some_and(|info| info.borrowed)
    }
}

/// One expansion of a template: the root of a specialized function, or an
/// inline template expanded into its caller
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub parent: Option<FrameId>,
    pub template: Option<NodeId>,
    pub function: Option<FunctionId>,
    pub inline: bool,
    /// Proof cache
    pub bindings: HashMap<NodeId, ValueId>,
    /// How many parents of each node have been proved in this frame
    pub appearances: HashMap<NodeId, u32>,
    /// Labels and loops currently open in this frame
    pub targets: HashMap<NodeId, ValueId>,
    /// Parameters bound to values the caller still uses afterwards
    pub borrowed: HashSet<NodeId>,
}
