use std::rc::Rc;

use hashbrown::HashMap;

use crate::{
    frontend::{node::NodeArena, node::NodeId, scope::Scope},
    index::IndexVec,
    middle::{
        ir::{Block, BlockId, Frame, FrameId, Function, FunctionId, TypedValue, ValueId},
        prover::{InstanceKey, Result, ownership::ActiveLoop},
        ty::{Type, TypeContext},
    },
};

/// Limits which keep the prover from running away on pathological input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProverConfig {
    /// How deep specializations and inline expansions of one template may
    /// nest
    pub max_recursion_depth: u32,
    /// How often a loop body is proved again after its argument types
    /// widened
    pub max_loop_retries: u32,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 64,
            max_loop_retries: 8,
        }
    }
}

/// Owns everything one compilation produces: the node graph handed in by the
/// expander, the interned types, and the typed IR of every specialized
/// function. Nothing is shared between sessions.
#[derive(Debug)]
pub struct Session {
    pub(crate) config: ProverConfig,
    pub(crate) types: TypeContext,
    pub(crate) nodes: NodeArena,
    pub(crate) scope: Rc<Scope>,

    pub(crate) values: IndexVec<ValueId, TypedValue>,
    pub(crate) blocks: IndexVec<BlockId, Block>,
    pub(crate) functions: IndexVec<FunctionId, Function>,
    pub(crate) frames: IndexVec<FrameId, Frame>,
    /// Frame of top-level templates, which close over nothing
    pub(crate) root_frame: FrameId,

    /// Memoized specializations
    pub(crate) instances: HashMap<InstanceKey, FunctionId>,
    /// How many specializations or expansions of each template are in
    /// progress
    pub(crate) recursion: HashMap<NodeId, u32>,
    /// Type carried by each terminator to its merge point
    pub(crate) edge_types: HashMap<ValueId, Type>,
    /// Loops currently being proved, innermost last
    pub(crate) active_loops: Vec<ActiveLoop>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(ProverConfig::default())
    }

    pub fn with_config(config: ProverConfig) -> Self {
        let mut frames = IndexVec::new();
        let root_frame = frames.push(Frame::default());

        Self {
            config,
            types: TypeContext::new(),
            nodes: NodeArena::new(),
            scope: Rc::new(Scope::new()),
            values: IndexVec::new(),
            blocks: IndexVec::new(),
            functions: IndexVec::new(),
            frames,
            root_frame,
            instances: HashMap::new(),
            recursion: HashMap::new(),
            edge_types: HashMap::new(),
            active_loops: vec![],
        }
    }

    pub fn config(&self) -> &ProverConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeContext {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeContext {
        &mut self.types
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut NodeArena {
        &mut self.nodes
    }

    pub fn root_frame(&self) -> FrameId {
        self.root_frame
    }

    /// Sets the scope free symbols are resolved in
    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = Rc::new(scope);
    }

    /// Entry point: proves the argument-less template `main`, resolving free
    /// symbols through `scope`
    pub fn prove_module(&mut self, main: NodeId, scope: Scope) -> Result<FunctionId> {
        self.set_scope(scope);
        self.specialize(main, self.root_frame, &[])
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions.enumerate()
    }

    pub fn value(&self, id: ValueId) -> &TypedValue {
        &self.values[id]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }
}
