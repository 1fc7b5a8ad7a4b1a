//! Templates are compiled once per closure frame and argument types.
//!
//! Ownership in the argument types is renumbered relative to the parameter
//! list before lookup: whatever the caller's ids are, the i-th argument owns
//! or views id `i + 1`. Two calls passing different resources of the same
//! type therefore share one function.

use hashbrown::HashMap;
use itertools::Itertools;

use super::{
    ASTContext, EvalTarget, Result, TraceFrame,
    error::{ProveErrorKind, fail},
    ownership::Operand,
};
use crate::{
    frontend::{
        anchor::Anchor,
        intern::Symbol,
        node::{NodeId, NodeKind, Template},
    },
    middle::{
        ir::{Block, Frame, FrameId, Function, FunctionId, UniqueInfo, ValueId, ValueKind},
        qualifier::{IdSet, Ownership, UniqueId},
        ty::{PointerFlags, StorageClass, Type, TypeKind},
    },
    session::Session,
};

/// Memoization key of a specialization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub template: NodeId,
    pub frame: FrameId,
    /// Argument types with parameter-relative ownership
    pub args: Vec<Type>,
}

impl Session {
    /// Specializes `template`, closed over `frame`, for arguments of the
    /// given types. Repeated requests for the same key return the same
    /// function.
    pub fn specialize(
        &mut self,
        template: NodeId,
        frame: FrameId,
        args: &[Type],
    ) -> Result<FunctionId> {
        let anchor = self.nodes.anchor(template);
        self.specialize_at(template, frame, args, anchor)
    }

    pub(crate) fn specialize_at(
        &mut self,
        template: NodeId,
        frame: FrameId,
        args: &[Type],
        anchor: Anchor,
    ) -> Result<FunctionId> {
        let Some(definition) = self.nodes.as_template(template).cloned() else {
            return fail(ProveErrorKind::NotATemplate, anchor);
        };
        let Some(body) = definition.body else {
            return fail(ProveErrorKind::ForwardDeclaration(definition.name), anchor);
        };

        let args = self.canonical_args(args);
        let key = InstanceKey {
            template,
            frame,
            args: args.clone(),
        };
        if let Some(function) = self.instances.get(&key) {
            log::trace!("reusing {} for ({})", definition.name, args.iter().join(" "));
            return Ok(*function);
        }

        self.verify_parameter_count(&definition, args.len(), anchor)?;
        self.enter_template(template, definition.name, anchor)?;
        let result = self.instantiate(key.clone(), &definition, body);
        self.leave_template(template);

        result.map_err(|error| {
            self.instances.remove(&key);
            error.with_trace(TraceFrame::Specialize {
                name: definition.name,
                args,
                anchor,
            })
        })
    }

    /// Renumbers ownership so that the i-th argument owns or views id i + 1
    fn canonical_args(&mut self, args: &[Type]) -> Vec<Type> {
        args.iter()
            .enumerate()
            .map(|(index, ty)| {
                let id = UniqueId::for_parameter(index);
                match ty.ownership() {
                    Some(Ownership::Unique(unique)) if *unique != UniqueId::GLOBAL => {
                        self.types.unique_type(ty, id)
                    }
                    Some(Ownership::View(_)) => self.types.view_type(ty, IdSet::single(id)),
                    _ => ty.clone(),
                }
            })
            .collect()
    }

    fn is_variadic(&self, definition: &Template) -> bool {
        definition.params.last().is_some_and(|param| {
            matches!(
                self.nodes.kind(*param),
                NodeKind::Parameter { variadic: true, .. }
            )
        })
    }

    fn verify_parameter_count(
        &self,
        definition: &Template,
        count: usize,
        anchor: Anchor,
    ) -> Result<()> {
        let expected = definition.params.len();
        let matches = if self.is_variadic(definition) {
            count + 1 >= expected
        } else {
            count == expected
        };

        if !matches {
            return fail(
                ProveErrorKind::ArgumentCountMismatch {
                    expected,
                    actual: count,
                },
                anchor,
            );
        }

        Ok(())
    }

    fn enter_template(&mut self, template: NodeId, name: Symbol, anchor: Anchor) -> Result<()> {
        let limit = self.config.max_recursion_depth;
        let depth = self.recursion.entry(template).or_insert(0);
        if *depth >= limit {
            return fail(ProveErrorKind::RecursionOverflow { name, limit }, anchor);
        }

        *depth += 1;
        Ok(())
    }

    fn leave_template(&mut self, template: NodeId) {
        if let Some(depth) = self.recursion.get_mut(&template) {
            *depth = depth.saturating_sub(1);
        }
    }

    /// Binds each parameter node in `frame`. A variadic last parameter
    /// receives all remaining arguments.
    fn bind_parameters(&mut self, frame: FrameId, definition: &Template, args: &[Operand]) {
        let variadic = self.is_variadic(definition);
        let count = definition.params.len();

        for (index, param) in definition.params.iter().enumerate() {
            let bound = if variadic && index + 1 == count {
                &args[index.min(args.len())..]
            } else {
                &args[index..index + 1]
            };

            let value = match bound {
                [single] => single.value,
                _ => {
                    let anchor = self.nodes.anchor(*param);
                    let types = bound
                        .iter()
                        .map(|arg| self.values[arg.value].ty.clone())
                        .collect::<Vec<_>>();
                    let ty = self.types.intern(TypeKind::Arguments(types.into()));
                    let values = bound.iter().map(|arg| arg.value).collect();
                    self.push_value(ValueKind::ArgumentList(values), ty, anchor)
                }
            };

            let frame = &mut self.frames[frame];
            frame.bindings.insert(*param, value);
            if bound.iter().any(|arg| !arg.last) {
                frame.borrowed.insert(*param);
            }
        }
    }

    fn instantiate(
        &mut self,
        key: InstanceKey,
        definition: &Template,
        body: NodeId,
    ) -> Result<FunctionId> {
        let (template, closure, args) = (key.template, key.frame, key.args.clone());
        let name = definition.name;

        let function = self.functions.next_index();
        let frame = self.frames.push(Frame {
            parent: Some(closure),
            template: Some(template),
            function: Some(function),
            inline: false,
            ..Frame::default()
        });
        let block = self.blocks.push(Block {
            parent: None,
            depth: 1,
            body: vec![],
            terminator: None,
            valid: IdSet::new(),
        });
        self.functions.push(Function {
            name,
            template,
            frame,
            instance_args: args.clone(),
            params: vec![],
            body: block,
            return_type: None,
            raise_type: None,
            signature: None,
            complete: false,
            uniques: HashMap::new(),
            returns: vec![],
            raises: vec![],
            published_signature: None,
            next_unique: args.len() as i32 + 1,
        });
        // registered before the body is proved so recursive calls find it
        self.instances.insert(key, function);

        log::debug!("specializing {name} for ({})", args.iter().join(" "));

        let anchor = self.nodes.anchor(template);
        let mut params = Vec::with_capacity(args.len());
        for (index, ty) in args.iter().enumerate() {
            let param_anchor = definition
                .params
                .get(index)
                .map_or(anchor, |param| self.nodes.anchor(*param));
            let value = self.push_value(
                ValueKind::Parameter { function, index },
                ty.clone(),
                param_anchor,
            );

            // viewed parameters stand for the caller's ids, which outlive
            // the body
            let tracked = match ty.ownership() {
                Some(Ownership::Unique(id)) if !id.is_reserved() => Some((*id, false)),
                Some(Ownership::View(_)) => Some((UniqueId::for_parameter(index), true)),
                _ => None,
            };
            if let Some((id, borrowed)) = tracked {
                self.functions[function].uniques.insert(
                    id,
                    UniqueInfo {
                        value,
                        depth: 0,
                        moved_at: None,
                        borrowed,
                    },
                );
                self.blocks[block].valid.insert(id);
            }

            params.push(Operand {
                value,
                last: true,
                anchor: param_anchor,
            });
        }

        self.functions[function].params = params.iter().map(|param| param.value).collect();
        self.bind_parameters(frame, definition, &params);

        let ctx = ASTContext::new(function, frame, block);
        let result = self.prove_child(&ctx, body)?;
        if !self.values[result.value].ty.is_noreturn() {
            let values = self.flatten_operands(vec![result])?;
            self.return_edge(&ctx, values, result.anchor, false)?;
        }

        self.finalize_function(function, anchor)?;
        Ok(function)
    }

    /// Parameter types as callers see them: unique parameters the body never
    /// gives up are only viewed
    fn signature_params(&mut self, args: &[Type], consumed: &IdSet) -> Vec<Type> {
        args.iter()
            .map(|ty| match ty.unique_id() {
                Some(id) if !id.is_reserved() && !consumed.contains(id) => {
                    self.types.view_type(ty, IdSet::single(id))
                }
                _ => ty.clone(),
            })
            .collect()
    }

    /// Settles the signature once every exit of the body is known
    fn finalize_function(&mut self, function: FunctionId, anchor: Anchor) -> Result<()> {
        let current = &self.functions[function];
        let edges = current
            .returns
            .iter()
            .chain(&current.raises)
            .copied()
            .collect::<Vec<_>>();
        let param_ids = current
            .instance_args
            .iter()
            .filter_map(|ty| ty.unique_id())
            .filter(|id| !id.is_reserved())
            .collect::<IdSet>();
        let ctx = ASTContext::new(function, current.frame, current.body);

        // a parameter given up on any path is owned by the function, and
        // dropped on the paths which kept it
        let consumed = self.lost_ids(&edges, &param_ids);
        self.drop_lost_ids(&ctx, &edges, &consumed, anchor)?;

        let current = &self.functions[function];
        let name = current.name;
        let args = current.instance_args.clone();
        let raise_type = current.raise_type.clone();
        let published = current.published_signature.clone();
        let return_type = match current.return_type.clone() {
            Some(ty) => ty,
            None => self.types.noreturn(),
        };

        let params = self.signature_params(&args, &consumed);
        let signature = self.types.function(return_type, &params, false, raise_type);

        if let Some(published) = published
            && published != signature
        {
            return fail(
                ProveErrorKind::InconsistentRecursiveSignature {
                    name,
                    published,
                    actual: signature,
                },
                anchor,
            );
        }

        log::debug!("finished {name}: {signature}");
        let current = &mut self.functions[function];
        current.signature = Some(signature);
        current.complete = true;
        Ok(())
    }

    /// The signature of a function, or for one whose body is still being
    /// proved, the signature implied by the returns seen so far
    fn function_signature(&mut self, function: FunctionId, anchor: Anchor) -> Result<Type> {
        let current = &self.functions[function];
        if let Some(signature) = &current.signature {
            return Ok(signature.clone());
        }

        let name = current.name;
        let Some(return_type) = current.return_type.clone() else {
            return fail(ProveErrorKind::UntypedRecursiveCall(name), anchor);
        };
        let args = current.instance_args.clone();
        let raise_type = current.raise_type.clone();
        let published = current.published_signature.clone();

        let params = self.signature_params(&args, &IdSet::new());
        let signature = self.types.function(return_type, &params, false, raise_type);

        if let Some(published) = published
            && published != signature
        {
            return fail(
                ProveErrorKind::InconsistentRecursiveSignature {
                    name,
                    published,
                    actual: signature,
                },
                anchor,
            );
        }

        log::debug!("{name} is called recursively, assuming {signature}");
        self.functions[function].published_signature = Some(signature.clone());
        Ok(signature)
    }

    /// A constant referring to a specialized function
    pub(crate) fn function_value(&mut self, function: FunctionId, anchor: Anchor) -> Result<ValueId> {
        let signature = self.function_signature(function, anchor)?;
        let ty = self
            .types
            .pointer(signature, PointerFlags::readonly(), StorageClass::Function);

        Ok(self.push_value(ValueKind::Function(function), ty, anchor))
    }

    /// Orders call arguments by parameter: positional arguments first, then
    /// keyword arguments by parameter name
    pub(crate) fn arrange_arguments(
        &mut self,
        definition: &Template,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<Vec<Operand>> {
        let (keyed, positional): (Vec<_>, Vec<_>) = args
            .into_iter()
            .partition(|arg| matches!(self.values[arg.value].kind, ValueKind::Keyed { .. }));
        let positional = self.flatten_operands(positional)?;
        if keyed.is_empty() {
            return Ok(positional);
        }

        let names = definition
            .params
            .iter()
            .map(|param| match self.nodes.kind(*param) {
                NodeKind::Parameter { name, .. } => Some(*name),
                _ => None,
            })
            .collect::<Vec<_>>();

        let mut slots = positional.into_iter().map(Some).collect::<Vec<_>>();
        for arg in keyed {
            let ValueKind::Keyed { key, value } = self.values[arg.value].kind.clone() else {
                continue;
            };
            let Some(index) = names.iter().position(|name| *name == Some(key)) else {
                return fail(ProveErrorKind::UnknownKeyword(key), arg.anchor);
            };

            if slots.len() <= index {
                slots.resize(index + 1, None);
            }
            if slots[index].is_some() {
                return fail(ProveErrorKind::DuplicateArgument(key), arg.anchor);
            }
            slots[index] = Some(Operand { value, ..arg });
        }

        let filled = slots.iter().flatten().count();
        match slots.into_iter().collect::<Option<Vec<_>>>() {
            Some(arranged) => Ok(arranged),
            None => fail(
                ProveErrorKind::ArgumentCountMismatch {
                    expected: names.len(),
                    actual: filled,
                },
                anchor,
            ),
        }
    }

    /// Expands an inline template into the calling function
    pub(crate) fn inline_call(
        &mut self,
        ctx: &ASTContext,
        template: NodeId,
        closure: FrameId,
        definition: &Template,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        let Some(body) = definition.body else {
            return fail(ProveErrorKind::ForwardDeclaration(definition.name), anchor);
        };

        self.verify_parameter_count(definition, args.len(), anchor)?;
        self.enter_template(template, definition.name, anchor)?;

        let frame = self.frames.push(Frame {
            parent: Some(closure),
            template: Some(template),
            function: Some(ctx.function),
            inline: true,
            ..Frame::default()
        });
        self.bind_parameters(frame, definition, &args);

        log::trace!("expanding {} inline at {anchor}", definition.name);

        let target = if ctx.is_target_void() {
            EvalTarget::Void
        } else {
            EvalTarget::Symbol
        };
        // labels and loops of the caller are not visible inside
        let inline_ctx = ASTContext {
            frame,
            target,
            loop_label: None,
            ..*ctx
        };
        let result = self
            .prove_child(&inline_ctx, body)
            .map(|operand| operand.value);
        self.leave_template(template);

        result.map_err(|error| {
            error.with_trace(TraceFrame::Inline {
                name: definition.name,
                anchor,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_args_renumber_ownership_by_position() {
        let mut session = Session::new();
        let i32 = session.types.int(32);
        let owned = session.types.unique_type(&i32, UniqueId::new(17));
        let viewed = session
            .types
            .view_type(&i32, [UniqueId::new(3), UniqueId::new(9)].into_iter().collect());

        let canonical = session.canonical_args(&[i32.clone(), owned, viewed]);

        assert_eq!(canonical[0], i32);
        assert_eq!(canonical[1].unique_id(), Some(UniqueId::new(2)));
        assert_eq!(
            canonical[2].view_ids(),
            Some(&IdSet::single(UniqueId::new(3)))
        );
    }
}
