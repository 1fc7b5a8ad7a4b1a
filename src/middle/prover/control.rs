//! Branching forms and the edges which leave them.
//!
//! Every conditional, switch, label and loop proved for its value opens a
//! merge point in the current block. Its body lives in a nested block, and
//! each path out of the body ends in a terminator which carries a value to
//! the merge point. Once the body is complete the merge point is finalized
//! and proving continues in the enclosing block. In return position a
//! conditional skips the merge point and returns from each branch directly.

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use super::{
    ASTContext, EvalTarget, Result,
    builtin::Builtin,
    error::{ProveErrorKind, WithAnchor, fail},
    ownership::{ActiveLoop, EdgeScope, Operand},
};
use crate::{
    frontend::{
        anchor::Anchor,
        intern::Symbol,
        node::{CaseKind, Clause, NodeId, NodeKind, SwitchCase},
    },
    middle::{
        ir::{BlockId, Instruction, InstructionKind, SwitchArm, ValueId, ValueKind},
        qualifier::{IdSet, Ownership},
        ty::{Type, TypeKind},
    },
    session::Session,
};

/// State rolled back when a loop body has to be proved again
struct LoopSnapshot {
    appearances: HashMap<NodeId, u32>,
    returns: usize,
    raises: usize,
    return_type: Option<Type>,
    raise_type: Option<Type>,
}

impl Session {
    fn instruction_kind(&self, value: ValueId) -> Option<&InstructionKind> {
        match &self.values[value].kind {
            ValueKind::Instruction(instruction) => Some(&instruction.kind),
            _ => None,
        }
    }

    fn instruction_kind_mut(&mut self, value: ValueId) -> Option<&mut InstructionKind> {
        match &mut self.values[value].kind {
            ValueKind::Instruction(instruction) => Some(&mut instruction.kind),
            _ => None,
        }
    }

    /// The open label or loop created for `node`, looked up through the
    /// frames of the current function
    fn find_target(&self, ctx: &ASTContext, node: NodeId) -> Option<ValueId> {
        let mut frame = Some(ctx.frame);
        while let Some(id) = frame {
            let current = &self.frames[id];
            if current.function != Some(ctx.function) {
                return None;
            }
            if let Some(target) = current.targets.get(&node) {
                return Some(*target);
            }
            frame = current.parent;
        }
        None
    }

    /// Whether anything in `body` merges into `label`. Nested templates are
    /// not searched; they cannot see the label.
    fn merges_into(&self, label: NodeId, body: NodeId) -> bool {
        let mut stack = vec![body];
        let mut seen = HashSet::new();

        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            match self.nodes.kind(node) {
                NodeKind::Merge { label: target, .. } if *target == label => return true,
                NodeKind::Template(_) => {}
                kind => stack.extend(kind.children()),
            }
        }

        false
    }

    /// The value a terminator hands to its merge point
    fn carried_value(&mut self, args: &[Operand], ty: &Type, anchor: Anchor) -> ValueId {
        match args {
            [single] => single.value,
            _ => {
                let values = args.iter().map(|arg| arg.value).collect();
                self.push_value(ValueKind::ArgumentList(values), ty.clone(), anchor)
            }
        }
    }

    /// Widens the function's return or raise type with `ty`
    pub(crate) fn widen_exit_type(
        &mut self,
        ctx: &ASTContext,
        raise: bool,
        ty: Type,
        anchor: Anchor,
    ) -> Result<()> {
        let function = &self.functions[ctx.function];
        let (current, edges) = if raise {
            (function.raise_type.clone(), &function.raises)
        } else {
            (function.return_type.clone(), &function.returns)
        };
        let other = edges
            .first()
            .map_or(anchor, |edge| self.values[*edge].anchor);

        let widened = match current {
            None => ty,
            Some(current) => match self.unify(&current, &ty) {
                Some(widened) => widened,
                None => {
                    return fail(
                        ProveErrorKind::MergeMismatch {
                            first: current,
                            second: ty,
                            other,
                        },
                        anchor,
                    );
                }
            },
        };

        let function = &mut self.functions[ctx.function];
        if raise {
            function.raise_type = Some(widened);
        } else {
            function.return_type = Some(widened);
        }
        Ok(())
    }

    /// `return` and `raise`
    pub(crate) fn prove_return(
        &mut self,
        ctx: &ASTContext,
        args: Vec<Operand>,
        anchor: Anchor,
        raise: bool,
    ) -> Result<ValueId> {
        if self.frames[ctx.frame].inline {
            return fail(ProveErrorKind::ReturnInInline, anchor);
        }

        self.return_edge(ctx, args, anchor, raise)
    }

    /// Leaves the function. Everything the function owns is either handed to
    /// the caller or dropped; views may only observe parameters.
    pub(crate) fn return_edge(
        &mut self,
        ctx: &ASTContext,
        args: Vec<Operand>,
        anchor: Anchor,
        raise: bool,
    ) -> Result<ValueId> {
        let scope = EdgeScope {
            inner_depth: 0,
            view_limit: 1,
        };
        let ty = self.edge_type(ctx, &args, scope)?;
        self.drop_scope(ctx, 1, anchor)?;

        // callers allocate their own ids for returned resources
        let ty = self.shape(&ty);
        self.widen_exit_type(ctx, raise, ty.clone(), anchor)?;

        let value = self.carried_value(&args, &ty, anchor);
        let kind = if raise {
            InstructionKind::Raise { value }
        } else {
            InstructionKind::Return { value }
        };
        let edge = self.terminate(ctx, kind, ty, anchor);

        let function = &mut self.functions[ctx.function];
        if raise {
            function.raises.push(edge);
        } else {
            function.returns.push(edge);
        }
        Ok(edge)
    }

    /// Leaves the body of `label` with `args`
    pub(crate) fn merge_edge(
        &mut self,
        ctx: &ASTContext,
        label: ValueId,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let body = match self.instruction_kind(label) {
            Some(InstructionKind::Label { body, .. } | InstructionKind::LoopLabel { body, .. }) => {
                *body
            }
            _ => return fail(ProveErrorKind::MergeOutsideLabel, anchor),
        };

        let depth = self.blocks[body].depth;
        let scope = EdgeScope {
            inner_depth: depth,
            view_limit: depth,
        };
        let ty = self.edge_type(ctx, &args, scope)?;
        self.drop_scope(ctx, depth, anchor)?;

        let value = self.carried_value(&args, &ty, anchor);
        let edge = self.terminate(ctx, InstructionKind::Merge { label, value }, ty, anchor);

        match self.instruction_kind_mut(label) {
            Some(InstructionKind::Label { merges, .. }) => merges.push(edge),
            Some(InstructionKind::LoopLabel { breaks, .. }) => breaks.push(edge),
            _ => {}
        }
        Ok(edge)
    }

    pub(crate) fn prove_break(
        &mut self,
        ctx: &ASTContext,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let Some(loop_label) = ctx.loop_label else {
            return fail(ProveErrorKind::OutsideLoop(Builtin::Break), anchor);
        };

        self.merge_edge(ctx, loop_label, args, anchor)
    }

    /// Jumps back to the top of the innermost loop with new arguments
    pub(crate) fn prove_repeat(
        &mut self,
        ctx: &ASTContext,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let Some(loop_label) = ctx.loop_label else {
            return fail(ProveErrorKind::OutsideLoop(Builtin::Repeat), anchor);
        };
        let Some((body, parent)) = self.loop_blocks(loop_label) else {
            return fail(ProveErrorKind::OutsideLoop(Builtin::Repeat), anchor);
        };

        let depth = self.blocks[body].depth;
        let scope = EdgeScope {
            inner_depth: depth,
            view_limit: depth,
        };
        let ty = self.edge_type(ctx, &args, scope)?;
        self.drop_scope(ctx, depth, anchor)?;

        // the next iteration starts with the same outer values alive
        let entry = &self.blocks[parent].valid;
        let valid = &self.blocks[ctx.block].valid;
        if let Some(id) = entry.iter().find(|id| !valid.contains(*id)) {
            return fail(ProveErrorKind::LoopInvalidatesOuterValue { id }, anchor);
        }

        let value = self.carried_value(&args, &ty, anchor);
        let edge = self.terminate(ctx, InstructionKind::Repeat { loop_label, value }, ty, anchor);

        if let Some(InstructionKind::LoopLabel { repeats, .. }) = self.instruction_kind_mut(loop_label)
        {
            repeats.push(edge);
        }
        Ok(edge)
    }

    /// Body block and enclosing block of a loop
    fn loop_blocks(&self, loop_label: ValueId) -> Option<(BlockId, BlockId)> {
        match &self.values[loop_label].kind {
            ValueKind::Instruction(Instruction {
                kind: InstructionKind::LoopLabel { body, .. },
                block,
            }) => Some((*body, *block)),
            _ => None,
        }
    }

    /// Carries the value a body ends with to its merge point. Bodies proved
    /// for effect carry nothing.
    fn fall_through(
        &mut self,
        ctx: &ASTContext,
        label: ValueId,
        operand: Operand,
        anchor: Anchor,
    ) -> Result<()> {
        if self.values[operand.value].ty.is_noreturn() {
            return Ok(());
        }

        let args = if ctx.is_target_void() {
            vec![]
        } else {
            self.flatten_operands(vec![operand])?
        };
        self.merge_edge(ctx, label, args, anchor)?;
        Ok(())
    }

    /// Adds a finished merge point to the enclosing block and settles its
    /// type
    fn close_label(
        &mut self,
        ctx: &ASTContext,
        label: ValueId,
        entry: &IdSet,
        anchor: Anchor,
    ) -> Result<ValueId> {
        self.blocks[ctx.block].body.push(label);

        let edges = match self.instruction_kind(label) {
            Some(InstructionKind::Label { merges, .. }) => merges.clone(),
            Some(InstructionKind::LoopLabel { breaks, .. }) => breaks.clone(),
            _ => vec![],
        };
        let ty = self.finalize_merge(ctx, label, &edges, entry, anchor)?;
        self.values[label].ty = ty;

        Ok(label)
    }

    fn open_label(&mut self, ctx: &ASTContext, name: Symbol, anchor: Anchor) -> (ValueId, BlockId) {
        let body = self.new_block(ctx.block);
        let noreturn = self.types.noreturn();
        let label = self.push_value(
            ValueKind::Instruction(Instruction {
                kind: InstructionKind::Label {
                    name,
                    body,
                    merges: vec![],
                },
                block: ctx.block,
            }),
            noreturn,
            anchor,
        );

        (label, body)
    }

    pub(super) fn prove_label(
        &mut self,
        ctx: &ASTContext,
        node: NodeId,
        name: Symbol,
        body_node: NodeId,
        anchor: Anchor,
    ) -> Result<ValueId> {
        // nothing can leave early, so the body is just an expression
        if !self.merges_into(node, body_node) {
            return Ok(self.prove_child(ctx, body_node)?.value);
        }

        let entry = self.blocks[ctx.block].valid.clone();
        let (label, body) = self.open_label(ctx, name, anchor);
        let body_ctx = ctx.with_block(body).with_target(EvalTarget::Symbol);

        self.frames[ctx.frame].targets.insert(node, label);
        let result = self
            .prove_child(&body_ctx, body_node)
            .and_then(|operand| self.fall_through(&body_ctx, label, operand, anchor));
        self.frames[ctx.frame].targets.remove(&node);
        result?;

        self.close_label(ctx, label, &entry, anchor)
    }

    pub(super) fn prove_merge(
        &mut self,
        ctx: &ASTContext,
        label_node: NodeId,
        value: NodeId,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let Some(label) = self.find_target(ctx, label_node) else {
            return fail(ProveErrorKind::MergeOutsideLabel, anchor);
        };

        let operand = self.prove_child(&ctx.with_target(EvalTarget::Symbol), value)?;
        if self.values[operand.value].ty.is_noreturn() {
            return Ok(operand.value);
        }

        let args = self.flatten_operands(vec![operand])?;
        self.merge_edge(ctx, label, args, anchor)
    }

    /// Branching forms in return position return from every branch and need
    /// no merge point
    fn open_branches(
        &mut self,
        ctx: &ASTContext,
        name: &str,
        anchor: Anchor,
    ) -> (Option<ValueId>, BlockId) {
        if ctx.target == EvalTarget::Return {
            return (None, ctx.block);
        }

        let (label, body) = self.open_label(ctx, name.into(), anchor);
        (Some(label), body)
    }

    fn finish_branch(
        &mut self,
        ctx: &ASTContext,
        label: Option<ValueId>,
        operand: Operand,
        anchor: Anchor,
    ) -> Result<()> {
        if self.values[operand.value].ty.is_noreturn() {
            return Ok(());
        }

        match label {
            Some(label) => self.fall_through(ctx, label, operand, anchor),
            None => {
                let args = self.flatten_operands(vec![operand])?;
                self.return_edge(ctx, args, anchor, false)?;
                Ok(())
            }
        }
    }

    fn close_branches(
        &mut self,
        ctx: &ASTContext,
        label: Option<ValueId>,
        branch: ValueId,
        entry: &IdSet,
        anchor: Anchor,
    ) -> Result<ValueId> {
        match label {
            Some(label) => self.close_label(ctx, label, entry, anchor),
            None => Ok(branch),
        }
    }

    pub(super) fn prove_if(
        &mut self,
        ctx: &ASTContext,
        clauses: &[Clause],
        else_value: Option<NodeId>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let Some((clause, rest)) = clauses.split_first() else {
            return match else_value {
                Some(value) => Ok(self.prove_child(ctx, value)?.value),
                None => Ok(self.empty_value(anchor)),
            };
        };

        let condition = self.prove_child(&ctx.with_target(EvalTarget::Symbol), clause.condition)?;
        let condition_ty = self.values[condition.value].ty.clone();
        if condition_ty.is_noreturn() {
            return Ok(condition.value);
        }
        if !condition_ty.is_bool() {
            return fail(ProveErrorKind::NonBoolCondition(condition_ty), condition.anchor);
        }

        if let ValueKind::ConstInt(value) = self.values[condition.value].kind {
            log::trace!("folding constant condition at {}", condition.anchor);
            return if value != 0 {
                Ok(self.prove_child(ctx, clause.value)?.value)
            } else {
                self.prove_if(ctx, rest, else_value, anchor)
            };
        }

        let entry = self.blocks[ctx.block].valid.clone();
        let (label, container) = self.open_branches(ctx, "if", anchor);
        let then_body = self.new_block(container);
        let else_body = self.new_block(container);

        let noreturn = self.types.noreturn();
        let branch = self.push_instruction(
            &ctx.with_block(container),
            InstructionKind::CondBr {
                condition: condition.value,
                then_body,
                else_body,
            },
            noreturn,
            anchor,
        );

        let then_ctx = ctx.with_block(then_body);
        let operand = self.prove_child(&then_ctx, clause.value)?;
        self.finish_branch(&then_ctx, label, operand, anchor)?;

        let else_ctx = ctx.with_block(else_body);
        let value = self.prove_if(&else_ctx, rest, else_value, anchor)?;
        self.finish_branch(&else_ctx, label, Operand::new(value, anchor), anchor)?;

        self.close_branches(ctx, label, branch, &entry, anchor)
    }

    pub(super) fn prove_switch(
        &mut self,
        ctx: &ASTContext,
        expr: NodeId,
        cases: &[SwitchCase],
        anchor: Anchor,
    ) -> Result<ValueId> {
        let symbol_ctx = ctx.with_target(EvalTarget::Symbol);
        let operand = self.prove_child(&symbol_ctx, expr)?;
        let ty = self.values[operand.value].ty.clone();
        if ty.is_noreturn() {
            return Ok(operand.value);
        }

        let storage = self.types.storage_type(&ty).at(operand.anchor)?;
        if !matches!(&*storage, TypeKind::Integer { .. }) {
            return fail(ProveErrorKind::NonIntegerSwitch(ty), operand.anchor);
        }

        let entry = self.blocks[ctx.block].valid.clone();
        let (label, container) = self.open_branches(ctx, "switch", anchor);
        let mut arms = Vec::with_capacity(cases.len() + 1);

        for case in cases {
            let literal = match (case.kind, case.literal) {
                (CaseKind::Default, _) | (_, None) => None,
                (_, Some(node)) => {
                    let literal = self.prove_child(&symbol_ctx.with_block(container), node)?;
                    match self.values[literal.value].kind {
                        ValueKind::ConstInt(value) => Some(value),
                        _ => return fail(ProveErrorKind::ExpectedConstant("integer"), literal.anchor),
                    }
                }
            };

            let body = self.new_block(container);
            let case_ctx = ctx.with_block(body);
            let value = self.prove_child(&case_ctx, case.value)?;
            let pass = case.kind == CaseKind::Pass;

            if !pass {
                self.finish_branch(&case_ctx, label, value, anchor)?;
            } else if !self.values[value.value].ty.is_noreturn() {
                // control continues into the next case, which expects
                // everything alive that was alive on entry
                let valid = &self.blocks[body].valid;
                if let Some(id) = entry.iter().find(|id| !valid.contains(*id)) {
                    return fail(ProveErrorKind::PassCaseMovesValue { id }, value.anchor);
                }
                let depth = self.blocks[body].depth;
                self.drop_scope(&case_ctx, depth, anchor)?;
            }

            arms.push(SwitchArm {
                literal,
                pass,
                body,
            });
        }

        if !cases.iter().any(|case| case.kind == CaseKind::Default) {
            let body = self.new_block(container);
            let empty = self.empty_value(anchor);
            self.finish_branch(&ctx.with_block(body), label, Operand::new(empty, anchor), anchor)?;
            arms.push(SwitchArm {
                literal: None,
                pass: false,
                body,
            });
        }

        let noreturn = self.types.noreturn();
        let branch = self.push_instruction(
            &ctx.with_block(container),
            InstructionKind::Switch {
                expr: operand.value,
                arms,
            },
            noreturn,
            anchor,
        );

        self.close_branches(ctx, label, branch, &entry, anchor)
    }

    pub(super) fn prove_loop_arguments(
        &mut self,
        ctx: &ASTContext,
        loop_node: NodeId,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let args = self
            .find_target(ctx, loop_node)
            .and_then(|label| match self.instruction_kind(label) {
                Some(InstructionKind::LoopLabel { args, .. }) => Some(*args),
                _ => None,
            });

        match args {
            Some(args) => Ok(args),
            None => fail(ProveErrorKind::LoopArgumentsOutsideLoop, anchor),
        }
    }

    /// Proves a loop. The body is proved with argument types seeded from
    /// the initial values; if a `repeat` carries wider types the body is
    /// proved again with those, until the types settle.
    pub(super) fn prove_loop(
        &mut self,
        ctx: &ASTContext,
        node: NodeId,
        init: NodeId,
        body: NodeId,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let operand = self.prove_child(&ctx.with_target(EvalTarget::Symbol), init)?;
        if self.values[operand.value].ty.is_noreturn() {
            return Ok(operand.value);
        }
        let inits = self.flatten_operands(vec![operand])?;

        // initial values are moved in on their last appearance and viewed
        // otherwise
        let mut types = Vec::with_capacity(inits.len());
        for init in &inits {
            let ty = self.values[init.value].ty.clone();
            self.verify_alive(ctx, &ty, init.anchor)?;

            let seeded = match ty.ownership() {
                Some(Ownership::Unique(id)) if !id.is_reserved() && !init.last => {
                    self.types.view_type(&ty, IdSet::single(*id))
                }
                Some(Ownership::Unique(id)) => {
                    self.move_id(ctx, *id, init.anchor)?;
                    ty.clone()
                }
                _ => ty.clone(),
            };
            types.push(seeded);
        }

        let entry = self.blocks[ctx.block].valid.clone();
        let init_values = inits.iter().map(|init| init.value).collect::<Vec<_>>();

        let mut attempts = 0;
        loop {
            let snapshot = self.loop_snapshot(ctx);
            let label = self.prove_loop_body(ctx, node, &init_values, &types, body, anchor)?;

            let repeats = match self.instruction_kind(label) {
                Some(InstructionKind::LoopLabel { repeats, .. }) => repeats.clone(),
                _ => vec![],
            };
            let widened = self.widen_loop_types(&types, &repeats)?;
            if self.same_shape(&widened, &types) {
                return self.close_label(ctx, label, &entry, anchor);
            }

            attempts += 1;
            if attempts > self.config.max_loop_retries {
                return fail(ProveErrorKind::LoopDidNotConverge(attempts), anchor);
            }

            log::debug!(
                "loop arguments at {anchor} widened to ({}), proving the body again",
                widened.iter().join(" ")
            );
            self.restore_loop_snapshot(ctx, snapshot);
            types = widened;
        }
    }

    fn prove_loop_body(
        &mut self,
        ctx: &ASTContext,
        node: NodeId,
        init: &[ValueId],
        types: &[Type],
        body_node: NodeId,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let body = self.new_block(ctx.block);
        let noreturn = self.types.noreturn();
        // replaced once the arguments exist
        let placeholder = self.values.next_index();
        let label = self.push_value(
            ValueKind::Instruction(Instruction {
                kind: InstructionKind::LoopLabel {
                    init: init.to_vec(),
                    args: placeholder,
                    body,
                    repeats: vec![],
                    breaks: vec![],
                },
                block: ctx.block,
            }),
            noreturn,
            anchor,
        );

        let body_ctx = ctx.for_loop(label, body);
        let ty = self.types.arguments(types);
        let args = self.push_value(ValueKind::LoopArguments { loop_label: label }, ty.clone(), anchor);
        let args_ty = self.qualify_result(&body_ctx, args, &ty, |ids| ids.clone());
        self.values[args].ty = args_ty;
        if let Some(InstructionKind::LoopLabel { args: slot, .. }) = self.instruction_kind_mut(label) {
            *slot = args;
        }

        let viewed = types
            .iter()
            .filter_map(|ty| ty.view_ids())
            .fold(IdSet::new(), |acc, ids| acc.union(ids));

        self.frames[ctx.frame].targets.insert(node, label);
        self.active_loops.push(ActiveLoop {
            function: ctx.function,
            depth: self.blocks[body].depth,
            viewed,
        });
        let result = self
            .prove_child(&body_ctx, body_node)
            .and_then(|operand| self.fall_through(&body_ctx, label, operand, anchor));
        self.active_loops.pop();
        self.frames[ctx.frame].targets.remove(&node);
        result?;

        Ok(label)
    }

    /// Unifies the loop argument types with what every `repeat` carries
    fn widen_loop_types(&mut self, types: &[Type], repeats: &[ValueId]) -> Result<Vec<Type>> {
        let mut widened = types.to_vec();

        for repeat in repeats {
            let Some(carried) = self.edge_types.get(repeat).cloned() else {
                continue;
            };
            let at = self.values[*repeat].anchor;
            let elements = carried.argument_types();

            if elements.len() != widened.len() {
                let first = self.types.arguments(&widened);
                return fail(
                    ProveErrorKind::MergeMismatch {
                        first,
                        second: carried,
                        other: at,
                    },
                    at,
                );
            }

            for (slot, element) in widened.iter_mut().zip(elements) {
                match self.unify(slot, &element) {
                    Some(unified) => *slot = unified,
                    None => {
                        return fail(
                            ProveErrorKind::MergeMismatch {
                                first: slot.clone(),
                                second: element,
                                other: at,
                            },
                            at,
                        );
                    }
                }
            }
        }

        Ok(widened)
    }

    fn same_shape(&mut self, left: &[Type], right: &[Type]) -> bool {
        left.len() == right.len()
            && left
                .iter()
                .zip(right)
                .all(|(l, r)| self.shape(l) == self.shape(r))
    }

    fn loop_snapshot(&self, ctx: &ASTContext) -> LoopSnapshot {
        let function = &self.functions[ctx.function];
        LoopSnapshot {
            appearances: self.frames[ctx.frame].appearances.clone(),
            returns: function.returns.len(),
            raises: function.raises.len(),
            return_type: function.return_type.clone(),
            raise_type: function.raise_type.clone(),
        }
    }

    fn restore_loop_snapshot(&mut self, ctx: &ASTContext, snapshot: LoopSnapshot) {
        self.frames[ctx.frame].appearances = snapshot.appearances;

        let function = &mut self.functions[ctx.function];
        function.returns.truncate(snapshot.returns);
        function.raises.truncate(snapshot.raises);
        function.return_type = snapshot.return_type;
        function.raise_type = snapshot.raise_type;
    }
}
