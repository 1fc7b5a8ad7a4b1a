//! Move, view and drop tracking.
//!
//! Every unique value passed to an operation is either moved (its id stops
//! being valid in the current block), viewed (the id stays valid), or passed
//! `Auto`: on the value's last appearance in its frame it is dropped right
//! after the operation, otherwise it is viewed. Ids leaving a scope through a
//! merge edge are moved if they were created inside the scope and viewed
//! otherwise; ids nobody moved are dropped at the edge, newest first.

use super::{
    ASTContext, Result,
    error::{ProveErrorKind, fail},
};
use crate::{
    frontend::anchor::Anchor,
    middle::{
        ir::{BlockId, FunctionId, TypedValue, ValueId, ValueKind},
        qualifier::{IdSet, Ownership, UniqueId},
        ty::Type,
    },
    session::Session,
};

/// How an operation takes a unique argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMode {
    /// Ownership is transferred to the operation
    Move,
    /// The operation only observes the value
    View,
    /// Dropped after the operation on its last appearance, viewed otherwise
    Auto,
}

/// A proved argument together with whether this is the last time its node
/// appears in the current frame
#[derive(Debug, Clone, Copy)]
pub struct Operand {
    pub value: ValueId,
    pub last: bool,
    pub anchor: Anchor,
}

impl Operand {
    pub fn new(value: ValueId, anchor: Anchor) -> Self {
        Self {
            value,
            last: false,
            anchor,
        }
    }
}

/// Where a merge edge leads, in terms of block depth
#[derive(Debug, Clone, Copy)]
pub struct EdgeScope {
    /// Ids created at this depth or deeper belong to the scope being left
    pub inner_depth: u32,
    /// Views may only observe ids created above this depth
    pub view_limit: u32,
}

/// A loop whose body is being proved
#[derive(Debug, Clone)]
pub struct ActiveLoop {
    pub function: FunctionId,
    /// Depth of the loop body block
    pub depth: u32,
    /// Outer ids the loop arguments view
    pub viewed: IdSet,
}

impl Session {
    /// Depth of the innermost loop body of `function` being proved. Ids
    /// created above it are still needed by the next iteration.
    fn loop_depth(&self, function: FunctionId) -> u32 {
        self.active_loops
            .iter()
            .rev()
            .find(|active| active.function == function)
            .map_or(0, |active| active.depth)
    }

    /// Hands out a new id owned by the current function, alive in the
    /// current block
    pub(crate) fn allocate_unique(&mut self, ctx: &ASTContext, value: ValueId) -> UniqueId {
        let depth = self.blocks[ctx.block].depth;
        let id = self.functions[ctx.function].allocate_unique(value, depth);
        self.blocks[ctx.block].valid.insert(id);

        log::trace!("allocated unique {id} for {value} at depth {depth}");
        id
    }

    /// Ids owned or viewed by a type, including every element of a
    /// multi-value
    pub(crate) fn tracked_ids(ty: &Type) -> Vec<UniqueId> {
        ty.argument_types()
            .iter()
            .flat_map(|ty| match ty.ownership() {
                Some(Ownership::Unique(id)) => vec![*id],
                Some(Ownership::View(ids)) => ids.iter().collect(),
                None => vec![],
            })
            .filter(|id| !id.is_reserved())
            .collect()
    }

    fn not_alive(&self, ctx: &ASTContext, id: UniqueId, anchor: Anchor) -> Result<()> {
        let moved_at = self.functions[ctx.function]
            .uniques
            .get(&id)
            .and_then(|info| info.moved_at);

        match moved_at {
            Some(moved_at) => fail(ProveErrorKind::UseAfterMove { id, moved_at }, anchor),
            None => fail(ProveErrorKind::NotAlive { id }, anchor),
        }
    }

    /// Fails unless every id `ty` owns or views is alive in the current block
    pub(crate) fn verify_alive(&self, ctx: &ASTContext, ty: &Type, anchor: Anchor) -> Result<()> {
        let valid = &self.blocks[ctx.block].valid;
        for id in Self::tracked_ids(ty) {
            if !valid.contains(id) {
                return self.not_alive(ctx, id, anchor);
            }
        }

        Ok(())
    }

    fn invalidate(&mut self, ctx: &ASTContext, id: UniqueId, anchor: Anchor) {
        self.blocks[ctx.block].valid.remove(id);
        if let Some(info) = self.functions[ctx.function].uniques.get_mut(&id) {
            info.moved_at = Some(anchor);
        }
    }

    /// Transfers ownership of `id` away from the current block
    pub(crate) fn move_id(&mut self, ctx: &ASTContext, id: UniqueId, anchor: Anchor) -> Result<()> {
        if id.is_reserved() {
            return Ok(());
        }

        if !self.blocks[ctx.block].valid.contains(id) {
            return self.not_alive(ctx, id, anchor);
        }

        let function = &self.functions[ctx.function];
        if function.is_borrowed(id)
            && let Some(info) = function.uniques.get(&id)
        {
            let ty = self.values[info.value].ty.clone();
            return fail(ProveErrorKind::CannotMoveView(ty), anchor);
        }

        let viewed_by_loop = self
            .active_loops
            .iter()
            .any(|active| active.function == ctx.function && active.viewed.contains(id));
        if viewed_by_loop {
            return fail(ProveErrorKind::LoopViewMoved { id }, anchor);
        }

        log::trace!("moved {id} at {anchor}");
        self.invalidate(ctx, id, anchor);
        Ok(())
    }

    /// Applies the argument mode of each operand. Returns the ids which must
    /// be dropped once the operation has been emitted. Ids in `keep` are
    /// borrowed by the operation's result and are never auto-dropped.
    pub(crate) fn apply_modes(
        &mut self,
        ctx: &ASTContext,
        args: &[Operand],
        mode: impl Fn(usize) -> ArgMode,
        keep: &IdSet,
        anchor: Anchor,
    ) -> Result<Vec<UniqueId>> {
        let mut pending = vec![];

        for (index, arg) in args.iter().enumerate() {
            let ty = self.values[arg.value].ty.clone();
            for element in ty.argument_types() {
                match element.ownership() {
                    Some(Ownership::Unique(id)) if !id.is_reserved() => match mode(index) {
                        ArgMode::Move => self.move_id(ctx, *id, arg.anchor)?,
                        ArgMode::View => self.verify_alive(ctx, &element, arg.anchor)?,
                        ArgMode::Auto => {
                            self.verify_alive(ctx, &element, arg.anchor)?;
                            // parameters are only given up by an explicit
                            // move, and values from outside a loop outlive
                            // the iteration
                            let floor = self.loop_depth(ctx.function).max(1);
                            let owned = self.functions[ctx.function]
                                .unique_depth(*id)
                                .is_some_and(|depth| depth >= floor);
                            if owned && arg.last && !keep.contains(*id) && !pending.contains(id) {
                                pending.push(*id);
                            }
                        }
                    },
                    Some(Ownership::View(_)) => {
                        if mode(index) == ArgMode::Move {
                            return fail(ProveErrorKind::CannotMoveView(element.clone()), anchor);
                        }
                        self.verify_alive(ctx, &element, arg.anchor)?;
                    }
                    Some(Ownership::Unique(_)) | None => {}
                }
            }
        }

        Ok(pending)
    }

    /// Drops the ids collected by [`Session::apply_modes`], newest first
    pub(crate) fn finish_auto_drops(
        &mut self,
        ctx: &ASTContext,
        mut pending: Vec<UniqueId>,
        anchor: Anchor,
    ) -> Result<()> {
        pending.sort_unstable_by(|a, b| b.cmp(a));
        for id in pending {
            if self.blocks[ctx.block].valid.contains(id) {
                self.drop_id(ctx, id, anchor)?;
            }
        }

        Ok(())
    }

    /// Runs the destructor of the value carrying `id`, if its type has one,
    /// and invalidates the id
    pub(crate) fn drop_id(&mut self, ctx: &ASTContext, id: UniqueId, anchor: Anchor) -> Result<()> {
        let Some(info) = self.functions[ctx.function].uniques.get(&id) else {
            return fail(ProveErrorKind::NotAlive { id }, anchor);
        };
        if info.borrowed {
            return Ok(());
        }
        let value = info.value;
        let ty = self.values[value].ty.clone();

        log::debug!("dropping {id} ({ty}) at {anchor}");

        if let Some(destructor) = self.types.destructor(&ty) {
            let symbol_ctx = ctx.with_target(super::EvalTarget::Symbol);
            let callee = self.prove(&symbol_ctx, destructor)?;
            self.call_value(&symbol_ctx, callee, vec![Operand::new(value, anchor)], anchor)?;
        }

        if self.blocks[ctx.block].valid.contains(id) {
            self.invalidate(ctx, id, anchor);
        }

        Ok(())
    }

    /// `drop` builtin: destroys a unique value before its scope ends
    pub(crate) fn prove_explicit_drop(
        &mut self,
        ctx: &ASTContext,
        arg: &Operand,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let ty = self.values[arg.value].ty.clone();
        match ty.ownership() {
            Some(Ownership::Unique(id)) if !id.is_reserved() => {
                self.verify_alive(ctx, &ty, arg.anchor)?;
                self.drop_id(ctx, *id, anchor)?;
            }
            Some(Ownership::View(_)) => {
                return fail(ProveErrorKind::CannotMoveView(ty), anchor);
            }
            Some(Ownership::Unique(_)) | None => {}
        }

        Ok(self.empty_value(anchor))
    }

    /// Computes the type crossing a merge edge, moving ids which belong to
    /// the scope being left and viewing the rest
    pub(crate) fn edge_type(
        &mut self,
        ctx: &ASTContext,
        args: &[Operand],
        scope: EdgeScope,
    ) -> Result<Type> {
        let mut types = vec![];

        for arg in args {
            let ty = self.values[arg.value].ty.clone();
            for element in ty.argument_types() {
                let crossing = match element.ownership() {
                    Some(Ownership::Unique(id)) if !id.is_reserved() => {
                        let depth = self.functions[ctx.function].unique_depth(*id);
                        if depth.is_some_and(|depth| depth >= scope.inner_depth) {
                            self.move_id(ctx, *id, arg.anchor)?;
                            element.clone()
                        } else {
                            self.verify_alive(ctx, &element, arg.anchor)?;
                            self.types.view_type(&element, IdSet::single(*id))
                        }
                    }
                    Some(Ownership::View(ids)) => {
                        self.verify_alive(ctx, &element, arg.anchor)?;
                        self.verify_view_scope(ctx, ids, scope.view_limit, arg.anchor)?;
                        element.clone()
                    }
                    Some(Ownership::Unique(_)) | None => element.clone(),
                };
                types.push(crossing);
            }
        }

        Ok(self.types.arguments(&types))
    }

    /// Views must not observe ids created at `limit` depth or deeper
    pub(crate) fn verify_view_scope(
        &self,
        ctx: &ASTContext,
        ids: &IdSet,
        limit: u32,
        anchor: Anchor,
    ) -> Result<()> {
        let function = &self.functions[ctx.function];
        for id in ids.iter().filter(|id| !id.is_reserved()) {
            if function.unique_depth(id).is_none_or(|depth| depth >= limit) {
                return fail(ProveErrorKind::ViewEscapesScope { id }, anchor);
            }
        }

        Ok(())
    }

    /// Drops every id still alive in the current block which was created at
    /// `depth` or deeper, newest first
    pub(crate) fn drop_scope(&mut self, ctx: &ASTContext, depth: u32, anchor: Anchor) -> Result<()> {
        let function = &self.functions[ctx.function];
        let doomed = self.blocks[ctx.block]
            .valid
            .newest_first()
            .filter(|id| function.unique_depth(*id).is_some_and(|d| d >= depth))
            .collect::<Vec<_>>();

        for id in doomed {
            if self.blocks[ctx.block].valid.contains(id) {
                self.drop_id(ctx, id, anchor)?;
            }
        }

        Ok(())
    }

    /// Drops the ids in `lost` on every edge where they are still alive, so
    /// that each one is destroyed exactly once on every path
    pub(crate) fn drop_lost_ids(
        &mut self,
        ctx: &ASTContext,
        edges: &[ValueId],
        lost: &IdSet,
        anchor: Anchor,
    ) -> Result<()> {
        for edge in edges {
            let Some(block) = self.instruction_block(*edge) else {
                continue;
            };
            let edge_ctx = ctx.with_block(block);

            for id in lost.newest_first() {
                if self.blocks[block].valid.contains(id) {
                    self.drop_id(&edge_ctx, id, anchor)?;
                }
            }
        }

        Ok(())
    }

    /// Ids of `entry` which are no longer alive at the end of at least one
    /// of `edges`
    pub(crate) fn lost_ids(&self, edges: &[ValueId], entry: &IdSet) -> IdSet {
        let mut lost = IdSet::new();
        for edge in edges {
            let Some(block) = self.instruction_block(*edge) else {
                continue;
            };
            for id in entry.iter() {
                if !self.blocks[block].valid.contains(id) {
                    lost.insert(id);
                }
            }
        }
        lost
    }

    pub(crate) fn instruction_block(&self, value: ValueId) -> Option<BlockId> {
        match &self.values[value] {
            TypedValue {
                kind: ValueKind::Instruction(instruction),
                ..
            } => Some(instruction.block),
            _ => None,
        }
    }
}
