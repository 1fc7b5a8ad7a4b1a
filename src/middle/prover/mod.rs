//! Turns the untyped node graph into typed IR.
//!
//! Proving is a single recursive walk: each node is proved in an
//! [`ASTContext`] which names the function, frame and block being written
//! to. Results are cached per frame, so a node referenced twice within the
//! same expansion is only evaluated once as long as its value is visible
//! from where it is needed.

pub mod builtin;
pub mod context;
mod control;
pub mod error;
mod merge;
pub mod ownership;
mod specialize;

pub use context::{ASTContext, EvalTarget};
pub use error::{ProveError, ProveErrorKind, Result, TraceFrame};
pub use specialize::InstanceKey;

use error::fail;
use ownership::{ArgMode, Operand};

use crate::{
    frontend::{
        anchor::Anchor,
        node::{Constant, NodeId, NodeKind, Template},
    },
    middle::{
        ir::{
            Block, BlockId, FrameId, Instruction, InstructionKind, TypedValue, ValueId, ValueKind,
        },
        qualifier::{IdSet, Ownership, UniqueId},
        ty::{Type, TypeKind},
    },
    session::Session,
};

impl Session {
    pub(crate) fn push_value(&mut self, kind: ValueKind, ty: Type, anchor: Anchor) -> ValueId {
        self.values.push(TypedValue { kind, ty, anchor })
    }

    /// Appends an instruction to the current block
    pub(crate) fn push_instruction(
        &mut self,
        ctx: &ASTContext,
        kind: InstructionKind,
        ty: Type,
        anchor: Anchor,
    ) -> ValueId {
        let value = self.push_value(
            ValueKind::Instruction(Instruction {
                kind,
                block: ctx.block,
            }),
            ty,
            anchor,
        );
        self.blocks[ctx.block].body.push(value);
        value
    }

    /// Ends the current block with a control transfer carrying `carried`
    pub(crate) fn terminate(
        &mut self,
        ctx: &ASTContext,
        kind: InstructionKind,
        carried: Type,
        anchor: Anchor,
    ) -> ValueId {
        let noreturn = self.types.noreturn();
        let value = self.push_value(
            ValueKind::Instruction(Instruction {
                kind,
                block: ctx.block,
            }),
            noreturn,
            anchor,
        );

        debug_assert!(!self.blocks[ctx.block].is_terminated());
        self.blocks[ctx.block].terminator = Some(value);
        self.edge_types.insert(value, carried);
        value
    }

    /// A nested block which starts out with its parent's live ids
    pub(crate) fn new_block(&mut self, parent: BlockId) -> BlockId {
        let Block { depth, valid, .. } = &self.blocks[parent];
        let block = Block {
            parent: Some(parent),
            depth: depth + 1,
            body: vec![],
            terminator: None,
            valid: valid.clone(),
        };

        self.blocks.push(block)
    }

    pub(crate) fn empty_value(&mut self, anchor: Anchor) -> ValueId {
        let ty = self.types.empty_arguments();
        self.push_value(ValueKind::ArgumentList(vec![]), ty, anchor)
    }

    fn is_ancestor_block(&self, ancestor: BlockId, mut block: BlockId) -> bool {
        loop {
            if block == ancestor {
                return true;
            }
            match self.blocks[block].parent {
                Some(parent) => block = parent,
                None => return false,
            }
        }
    }

    /// Whether a value of the current function may be used at the end of
    /// `block`
    fn is_visible(&self, value: ValueId, block: BlockId) -> bool {
        match &self.values[value].kind {
            kind if kind.is_constant() => true,
            ValueKind::Parameter { .. } => true,
            ValueKind::Instruction(instruction) => self.is_ancestor_block(instruction.block, block),
            ValueKind::LoopArguments { loop_label } => match &self.values[*loop_label].kind {
                ValueKind::Instruction(Instruction {
                    kind: InstructionKind::LoopLabel { body, .. },
                    ..
                }) => self.is_ancestor_block(*body, block),
                _ => false,
            },
            ValueKind::ArgumentList(values) => values.iter().all(|v| self.is_visible(*v, block)),
            ValueKind::ExtractArgument { value, .. } | ValueKind::Keyed { value, .. } => {
                self.is_visible(*value, block)
            }
            _ => false,
        }
    }

    /// Finds a cached proof of `node` usable from `ctx`
    fn lookup_binding(&self, ctx: &ASTContext, node: NodeId) -> Result<Option<ValueId>> {
        let mut frame = Some(ctx.frame);

        while let Some(id) = frame {
            let current = &self.frames[id];
            if let Some(&value) = current.bindings.get(&node) {
                if self.values[value].kind.is_constant() {
                    return Ok(Some(value));
                }

                if current.function == Some(ctx.function) {
                    return Ok(self.is_visible(value, ctx.block).then_some(value));
                }

                // runtime values never cross into another function
                if let NodeKind::Parameter { name, .. } = self.nodes.kind(node) {
                    return fail(
                        ProveErrorKind::CapturedRuntimeValue(*name),
                        self.nodes.anchor(node),
                    );
                }

                return Ok(None);
            }

            frame = current.parent;
        }

        Ok(None)
    }

    /// Proves `node`, reusing the frame's cached value where possible
    pub(crate) fn prove(&mut self, ctx: &ASTContext, node: NodeId) -> Result<ValueId> {
        if let Some(value) = self.lookup_binding(ctx, node)? {
            return Ok(value);
        }

        let value = self.prove_node(ctx, node)?;
        self.frames[ctx.frame].bindings.insert(node, value);
        Ok(value)
    }

    /// Proves a child of the node being proved and records the appearance.
    /// The operand is `last` once every parent of the node in this frame has
    /// been proved.
    pub(crate) fn prove_child(&mut self, ctx: &ASTContext, node: NodeId) -> Result<Operand> {
        let value = self.prove(ctx, node)?;

        let uses = self.nodes.uses(node);
        let is_symbol = matches!(self.nodes.kind(node), NodeKind::Symbol(_));
        let frame = &mut self.frames[ctx.frame];
        let last = if frame.bindings.contains_key(&node) && !is_symbol {
            let seen = frame.appearances.entry(node).or_insert(0);
            *seen += 1;
            *seen >= uses && !frame.borrowed.contains(&node)
        } else {
            false
        };

        Ok(Operand {
            value,
            last,
            anchor: self.nodes.anchor(node),
        })
    }

    fn prove_node(&mut self, ctx: &ASTContext, node: NodeId) -> Result<ValueId> {
        let anchor = self.nodes.anchor(node);
        log::trace!("proving node {node} at {anchor}");

        match self.nodes.kind(node).clone() {
            NodeKind::Reserved => fail(ProveErrorKind::UnfinishedNode, anchor),
            NodeKind::Constant(constant) => Ok(self.prove_constant(constant, anchor)),
            NodeKind::Symbol(name) => match self.scope.lookup(name) {
                Some(target) => self.prove(ctx, target),
                None => fail(ProveErrorKind::UnboundSymbol(name), anchor),
            },
            // bound when their template is expanded
            NodeKind::Parameter { name, .. } => fail(ProveErrorKind::UnboundParameter(name), anchor),
            NodeKind::Template(template) => self.prove_template(ctx, node, &template, anchor),
            NodeKind::Call { callee, args } => self.prove_call(ctx, callee, &args, anchor),
            NodeKind::Expression { body, value } => self.prove_expression(ctx, &body, value),
            NodeKind::ArgumentList(values) => self.prove_argument_list(ctx, &values, anchor),
            NodeKind::ExtractArgument { value, index } => {
                self.prove_extract_argument(ctx, value, index, anchor)
            }
            NodeKind::Keyed { key, value } => {
                let operand = self.prove_child(&ctx.with_target(EvalTarget::Symbol), value)?;
                let ty = self.values[operand.value].ty.clone();
                Ok(self.push_value(
                    ValueKind::Keyed {
                        key,
                        value: operand.value,
                    },
                    ty,
                    anchor,
                ))
            }
            NodeKind::If {
                clauses,
                else_value,
            } => self.prove_if(ctx, &clauses, else_value, anchor),
            NodeKind::Switch { expr, cases } => self.prove_switch(ctx, expr, &cases, anchor),
            NodeKind::Loop { init, body } => self.prove_loop(ctx, node, init, body, anchor),
            NodeKind::LoopArguments { loop_node } => {
                self.prove_loop_arguments(ctx, loop_node, anchor)
            }
            NodeKind::Label { name, body } => self.prove_label(ctx, node, name, body, anchor),
            NodeKind::Merge { label, value } => self.prove_merge(ctx, label, value, anchor),
        }
    }

    fn prove_constant(&mut self, constant: Constant, anchor: Anchor) -> ValueId {
        let (kind, ty) = match constant {
            Constant::Integer { value, ty } => (ValueKind::ConstInt(value), ty),
            Constant::Real { value, ty } => (ValueKind::ConstReal(value), ty),
            Constant::Null(ty) => (ValueKind::ConstNull, ty),
            Constant::Type(ty) => (ValueKind::ConstType(ty), self.types.type_type()),
            Constant::Extern { name, ty } => (ValueKind::Extern(name), ty),
            Constant::Builtin(builtin) => (ValueKind::Builtin(builtin), self.types.builtin()),
        };

        self.push_value(kind, ty, anchor)
    }

    /// Pairs a template with the frame of the template it is nested in
    fn prove_template(
        &mut self,
        ctx: &ASTContext,
        node: NodeId,
        template: &Template,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let frame = match template.scope {
            None => self.root_frame,
            Some(scope) => match self.closure_frame(ctx.frame, scope) {
                Some(frame) => frame,
                None => return fail(ProveErrorKind::MissingClosureFrame(template.name), anchor),
            },
        };

        let ty = self.types.closure();
        Ok(self.push_value(
            ValueKind::Closure {
                template: node,
                frame,
            },
            ty,
            anchor,
        ))
    }

    fn closure_frame(&self, mut frame: FrameId, scope: NodeId) -> Option<FrameId> {
        loop {
            if self.frames[frame].template == Some(scope) {
                return Some(frame);
            }
            frame = self.frames[frame].parent?;
        }
    }

    fn prove_expression(
        &mut self,
        ctx: &ASTContext,
        body: &[NodeId],
        value: NodeId,
    ) -> Result<ValueId> {
        let void_ctx = ctx.with_target(EvalTarget::Void);
        for statement in body {
            let operand = self.prove_child(&void_ctx, *statement)?;
            if self.values[operand.value].ty.is_noreturn() {
                return fail(ProveErrorKind::NoReturnNotLast, operand.anchor);
            }
        }

        Ok(self.prove_child(ctx, value)?.value)
    }

    fn prove_argument_list(
        &mut self,
        ctx: &ASTContext,
        nodes: &[NodeId],
        anchor: Anchor,
    ) -> Result<ValueId> {
        let symbol_ctx = ctx.with_target(EvalTarget::Symbol);

        let mut operands = Vec::with_capacity(nodes.len());
        for node in nodes {
            let operand = self.prove_child(&symbol_ctx, *node)?;
            if self.values[operand.value].ty.is_noreturn() {
                return fail(ProveErrorKind::NoReturnNotLast, operand.anchor);
            }
            operands.push(operand);
        }

        let operands = self.flatten_operands(operands)?;
        if let [single] = operands.as_slice() {
            return Ok(single.value);
        }

        let types = operands
            .iter()
            .map(|operand| self.values[operand.value].ty.clone())
            .collect::<Vec<_>>();
        let ty = self.types.intern(TypeKind::Arguments(types.into()));
        let values = operands.iter().map(|operand| operand.value).collect();

        Ok(self.push_value(ValueKind::ArgumentList(values), ty, anchor))
    }

    fn prove_extract_argument(
        &mut self,
        ctx: &ASTContext,
        node: NodeId,
        index: usize,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let operand = self.prove_child(&ctx.with_target(EvalTarget::Symbol), node)?;
        let ty = self.values[operand.value].ty.clone();
        if ty.is_noreturn() {
            return Ok(operand.value);
        }

        match self.spread(operand.value).get(index) {
            Some(value) => Ok(*value),
            None => fail(ProveErrorKind::ArgumentIndexOutOfRange { index, ty }, anchor),
        }
    }

    /// The single values a multi-value stands for
    pub(crate) fn spread(&mut self, value: ValueId) -> Vec<ValueId> {
        let TypedValue { kind, ty, anchor } = &self.values[value];
        if let ValueKind::ArgumentList(values) = kind {
            return values.clone();
        }

        let (ty, anchor) = (ty.clone(), *anchor);
        match &*ty {
            TypeKind::Arguments(types) => types
                .iter()
                .enumerate()
                .map(|(index, ty)| {
                    self.push_value(ValueKind::ExtractArgument { value, index }, ty.clone(), anchor)
                })
                .collect(),
            TypeKind::NoReturn => vec![],
            _ => vec![value],
        }
    }

    /// Spreads the last operand into its values and truncates the others to
    /// their first value. Keywords are dropped.
    pub(crate) fn flatten_operands(&mut self, args: Vec<Operand>) -> Result<Vec<Operand>> {
        let count = args.len();
        let mut flat = Vec::with_capacity(count);

        for (index, arg) in args.into_iter().enumerate() {
            let value = match &self.values[arg.value].kind {
                ValueKind::Keyed { value, .. } => *value,
                _ => arg.value,
            };
            let values = self.spread(value);

            if index + 1 == count {
                flat.extend(values.into_iter().map(|value| Operand { value, ..arg }));
            } else if let Some(first) = values.first() {
                flat.push(Operand {
                    value: *first,
                    ..arg
                });
            } else {
                let ty = self.values[value].ty.clone();
                return fail(
                    ProveErrorKind::ArgumentIndexOutOfRange { index: 0, ty },
                    arg.anchor,
                );
            }
        }

        Ok(flat)
    }

    fn prove_call(
        &mut self,
        ctx: &ASTContext,
        callee: NodeId,
        args: &[NodeId],
        anchor: Anchor,
    ) -> Result<ValueId> {
        let symbol_ctx = ctx.with_target(EvalTarget::Symbol);
        let callee = self.prove_child(&symbol_ctx, callee)?.value;

        let mut operands = Vec::with_capacity(args.len());
        for arg in args {
            let operand = self.prove_child(&symbol_ctx, *arg)?;
            if self.values[operand.value].ty.is_noreturn() {
                return fail(ProveErrorKind::NoReturnNotLast, operand.anchor);
            }
            operands.push(operand);
        }

        self.call_value(ctx, callee, operands, anchor)
    }

    /// Calls any callable value: builtins are dispatched to the operator
    /// table, templates are expanded inline or specialized, and everything
    /// else is called through its function type
    pub(crate) fn call_value(
        &mut self,
        ctx: &ASTContext,
        callee: ValueId,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        match self.values[callee].kind.clone() {
            ValueKind::Builtin(builtin) => {
                let args = self.flatten_operands(args)?;
                self.prove_builtin(ctx, builtin, args, anchor)
            }
            ValueKind::Closure { template, frame } => {
                let Some(definition) = self.nodes.as_template(template).cloned() else {
                    return fail(ProveErrorKind::NotATemplate, anchor);
                };
                let args = self.arrange_arguments(&definition, args, anchor)?;

                if definition.inline {
                    return self.inline_call(ctx, template, frame, &definition, args, anchor);
                }

                let types = args
                    .iter()
                    .map(|arg| self.values[arg.value].ty.clone())
                    .collect::<Vec<_>>();
                let function = self.specialize_at(template, frame, &types, anchor)?;
                let callee = self.function_value(function, anchor)?;
                self.call_function(ctx, callee, args, anchor)
            }
            _ => {
                let args = self.flatten_operands(args)?;
                self.call_function(ctx, callee, args, anchor)
            }
        }
    }

    /// Emits a call through a function type. Unique parameters take their
    /// argument by move; all others observe it and drop it afterwards if
    /// this was its last appearance.
    fn call_function(
        &mut self,
        ctx: &ASTContext,
        callee: ValueId,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let callee_ty = self.values[callee].ty.clone();
        let function_ty = match &**callee_ty.base() {
            TypeKind::Pointer { element, .. } => element.clone(),
            _ => callee_ty.base().clone(),
        };
        let TypeKind::Function {
            return_type,
            params,
            variadic,
            raises,
        } = &*function_ty
        else {
            return fail(ProveErrorKind::NotCallable(callee_ty), anchor);
        };

        let count_matches = if *variadic {
            args.len() >= params.len()
        } else {
            args.len() == params.len()
        };
        if !count_matches {
            return fail(
                ProveErrorKind::ArgumentCountMismatch {
                    expected: params.len(),
                    actual: args.len(),
                },
                anchor,
            );
        }

        for (index, (arg, param)) in args.iter().zip(params.iter()).enumerate() {
            let actual = &self.values[arg.value].ty;
            if actual.base() != param.base() {
                return fail(
                    ProveErrorKind::ArgumentTypeMismatch {
                        index,
                        expected: param.clone(),
                        actual: actual.clone(),
                    },
                    arg.anchor,
                );
            }
        }

        // views in the result are expressed in terms of parameter ids
        let arg_ids = args
            .iter()
            .map(|arg| self.operand_ids(std::slice::from_ref(arg)))
            .collect::<Vec<_>>();
        let param_count = params.len();
        let borrowed_from = |ids: &IdSet| -> IdSet {
            ids.iter()
                .filter_map(|id| id.parameter_index(param_count))
                .fold(IdSet::new(), |acc, index| acc.union(&arg_ids[index]))
        };

        let keep = return_type
            .argument_types()
            .iter()
            .filter_map(|ty| ty.view_ids())
            .fold(IdSet::new(), |acc, ids| acc.union(&borrowed_from(ids)));

        let pending = self.apply_modes(
            ctx,
            &args,
            |index| match params.get(index).and_then(|param| param.ownership()) {
                Some(Ownership::Unique(_)) => ArgMode::Move,
                _ => ArgMode::Auto,
            },
            &keep,
            anchor,
        )?;

        let value = self.push_instruction(
            ctx,
            InstructionKind::Call {
                callee,
                args: args.iter().map(|arg| arg.value).collect(),
            },
            return_type.clone(),
            anchor,
        );
        let ty = self.qualify_result(ctx, value, return_type, borrowed_from);
        self.values[value].ty = ty;

        if let Some(raises) = raises {
            self.widen_exit_type(ctx, true, raises.clone(), anchor)?;
        }

        self.finish_auto_drops(ctx, pending, anchor)?;
        Ok(value)
    }

    /// Gives every unique element of a fresh result a new id and rewrites
    /// views through `map_view`
    pub(crate) fn qualify_result(
        &mut self,
        ctx: &ASTContext,
        value: ValueId,
        ty: &Type,
        map_view: impl Fn(&IdSet) -> IdSet,
    ) -> Type {
        let TypeKind::Arguments(elements) = &**ty else {
            if ty.is_noreturn() {
                return ty.clone();
            }
            return self.qualify_element(ctx, value, ty, &map_view);
        };

        let anchor = self.values[value].anchor;
        let elements = elements.clone();
        let mut qualified = Vec::with_capacity(elements.len());

        for (index, element) in elements.iter().enumerate() {
            let carrier =
                self.push_value(ValueKind::ExtractArgument { value, index }, element.clone(), anchor);
            let element = self.qualify_element(ctx, carrier, element, &map_view);
            self.values[carrier].ty = element.clone();
            qualified.push(element);
        }

        self.types.intern(TypeKind::Arguments(qualified.into()))
    }

    fn qualify_element(
        &mut self,
        ctx: &ASTContext,
        carrier: ValueId,
        ty: &Type,
        map_view: &impl Fn(&IdSet) -> IdSet,
    ) -> Type {
        match ty.ownership() {
            Some(Ownership::Unique(id)) if *id != UniqueId::GLOBAL => {
                let id = self.allocate_unique(ctx, carrier);
                self.types.unique_type(ty, id)
            }
            Some(Ownership::View(ids)) => {
                let ids = map_view(ids);
                self.types.view_type(ty, ids)
            }
            _ => ty.clone(),
        }
    }
}
