//! The untyped node graph handed to the prover by the macro expander.
//!
//! Nodes are immutable once filled in. Cyclic structures (a loop whose body
//! refers back to its arguments, a label whose body merges into it, a template
//! nested inside its enclosing template) are built by [`NodeArena::reserve`]ing
//! the outer node first and [`NodeArena::fill`]ing it once its children exist.
//!
//! The arena also counts how many times each node is referenced from another
//! node. The prover uses these counts to find the last appearance of a value
//! within a frame.

use super::{anchor::Anchor, intern::Symbol};
use crate::{
    index::{IndexVec, simple_index},
    middle::{prover::builtin::Builtin, ty::Type},
};

simple_index! {
    /// Index of a node in the session's [`NodeArena`]
    pub struct NodeId;
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub anchor: Anchor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer { value: i128, ty: Type },
    Real { value: f64, ty: Type },
    /// A null pointer of the given pointer type
    Null(Type),
    Type(Type),
    /// A symbol resolved at link time
    Extern { name: Symbol, ty: Type },
    Builtin(Builtin),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    /// Exits the switch with the case's value
    Case,
    /// Falls through into the next case
    Pass,
    Default,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub kind: CaseKind,
    /// Integer constant node to compare against. Absent for `Default`.
    pub literal: Option<NodeId>,
    pub value: NodeId,
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub condition: NodeId,
    pub value: NodeId,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub name: Symbol,
    /// [`NodeKind::Parameter`] nodes
    pub params: Vec<NodeId>,
    /// `None` for a forward declaration which was never defined
    pub body: Option<NodeId>,
    /// Inline templates are expanded in the caller's function
    pub inline: bool,
    /// Enclosing template, if this template closes over its parameters
    pub scope: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Placeholder handed out by [`NodeArena::reserve`]
    Reserved,
    Constant(Constant),
    /// A free identifier, resolved through the scope given to the prover
    Symbol(Symbol),
    Parameter {
        name: Symbol,
        variadic: bool,
    },
    Template(Template),
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    /// Evaluates `body` in order for effect, then yields `value`
    Expression {
        body: Vec<NodeId>,
        value: NodeId,
    },
    /// Yields all of its elements as one multi-value
    ArgumentList(Vec<NodeId>),
    ExtractArgument {
        value: NodeId,
        index: usize,
    },
    Keyed {
        key: Symbol,
        value: NodeId,
    },
    If {
        clauses: Vec<Clause>,
        else_value: Option<NodeId>,
    },
    Switch {
        expr: NodeId,
        cases: Vec<SwitchCase>,
    },
    Loop {
        init: NodeId,
        body: NodeId,
    },
    /// The current iteration's arguments of `loop_node`
    LoopArguments {
        loop_node: NodeId,
    },
    Label {
        name: Symbol,
        body: NodeId,
    },
    /// Leaves `label` with `value`
    Merge {
        label: NodeId,
        value: NodeId,
    },
}

impl NodeKind {
    /// Children which count as appearances. Back edges (parameters, scopes,
    /// loop and label targets) are not included.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Reserved
            | NodeKind::Constant(_)
            | NodeKind::Symbol(_)
            | NodeKind::Parameter { .. }
            | NodeKind::LoopArguments { .. } => vec![],
            NodeKind::Template(template) => template.body.into_iter().collect(),
            NodeKind::Call { callee, args } => std::iter::once(*callee)
                .chain(args.iter().copied())
                .collect(),
            NodeKind::Expression { body, value } => {
                body.iter().copied().chain(std::iter::once(*value)).collect()
            }
            NodeKind::ArgumentList(values) => values.clone(),
            NodeKind::ExtractArgument { value, .. } | NodeKind::Keyed { value, .. } => {
                vec![*value]
            }
            NodeKind::If {
                clauses,
                else_value,
            } => clauses
                .iter()
                .flat_map(|c| [c.condition, c.value])
                .chain(*else_value)
                .collect(),
            NodeKind::Switch { expr, cases } => std::iter::once(*expr)
                .chain(cases.iter().flat_map(|c| c.literal.into_iter().chain([c.value])))
                .collect(),
            NodeKind::Loop { init, body } => vec![*init, *body],
            NodeKind::Label { body, .. } => vec![*body],
            NodeKind::Merge { value, .. } => vec![*value],
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: IndexVec<NodeId, Node>,
    uses: IndexVec<NodeId, u32>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind, anchor: Anchor) -> NodeId {
        self.count_uses(&kind);
        self.uses.push(0);
        self.nodes.push(Node { kind, anchor })
    }

    /// Hands out an id for a node whose children refer back to it
    pub fn reserve(&mut self, anchor: Anchor) -> NodeId {
        self.push(NodeKind::Reserved, anchor)
    }

    /// Completes a reserved node
    ///
    /// # Panics
    ///
    /// If `id` was not reserved or has already been filled
    pub fn fill(&mut self, id: NodeId, kind: NodeKind) {
        assert!(
            matches!(self.nodes[id].kind, NodeKind::Reserved),
            "node {id} has already been filled"
        );

        self.count_uses(&kind);
        self.nodes[id].kind = kind;
    }

    fn count_uses(&mut self, kind: &NodeKind) {
        for child in kind.children() {
            self.uses[child] += 1;
        }
    }

    /// How many nodes refer to `id`
    pub fn uses(&self, id: NodeId) -> u32 {
        self.uses[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn anchor(&self, id: NodeId) -> Anchor {
        self.nodes[id].anchor
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn as_template(&self, id: NodeId) -> Option<&Template> {
        match &self.nodes[id].kind {
            NodeKind::Template(template) => Some(template),
            _ => None,
        }
    }

    pub fn constant(&mut self, anchor: Anchor, constant: Constant) -> NodeId {
        self.push(NodeKind::Constant(constant), anchor)
    }

    pub fn int(&mut self, anchor: Anchor, value: i128, ty: Type) -> NodeId {
        self.constant(anchor, Constant::Integer { value, ty })
    }

    pub fn builtin(&mut self, anchor: Anchor, builtin: Builtin) -> NodeId {
        self.constant(anchor, Constant::Builtin(builtin))
    }

    pub fn symbol(&mut self, anchor: Anchor, name: impl Into<Symbol>) -> NodeId {
        self.push(NodeKind::Symbol(name.into()), anchor)
    }

    pub fn parameter(&mut self, anchor: Anchor, name: impl Into<Symbol>) -> NodeId {
        self.push(
            NodeKind::Parameter {
                name: name.into(),
                variadic: false,
            },
            anchor,
        )
    }

    pub fn call(&mut self, anchor: Anchor, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Call { callee, args }, anchor)
    }

    /// Shorthand for calling a builtin operator
    pub fn call_builtin(&mut self, anchor: Anchor, builtin: Builtin, args: Vec<NodeId>) -> NodeId {
        let callee = self.builtin(anchor, builtin);
        self.call(anchor, callee, args)
    }

    pub fn expression(&mut self, anchor: Anchor, body: Vec<NodeId>, value: NodeId) -> NodeId {
        self.push(NodeKind::Expression { body, value }, anchor)
    }

    pub fn template(
        &mut self,
        anchor: Anchor,
        name: impl Into<Symbol>,
        params: Vec<NodeId>,
        body: NodeId,
    ) -> NodeId {
        self.push(
            NodeKind::Template(Template {
                name: name.into(),
                params,
                body: Some(body),
                inline: false,
                scope: None,
            }),
            anchor,
        )
    }
}

impl core::ops::Index<NodeId> for NodeArena {
    type Output = Node;

    #[track_caller]
    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ty::TypeContext;

    #[test]
    fn uses_count_parent_references() {
        let mut types = TypeContext::new();
        let i32 = types.int(32);
        let mut nodes = NodeArena::new();
        let at = Anchor::new("test", 1, 1);

        let x = nodes.parameter(at, "x");
        let one = nodes.int(at, 1, i32);
        let sum = nodes.call_builtin(at, Builtin::Add, vec![x, one]);
        let twice = nodes.call_builtin(at, Builtin::Add, vec![sum, x]);
        nodes.template(at, "f", vec![x], twice);

        assert_eq!(nodes.uses(x), 2);
        assert_eq!(nodes.uses(one), 1);
        assert_eq!(nodes.uses(twice), 1);
    }

    #[test]
    fn reserved_nodes_count_uses_when_filled() {
        let mut nodes = NodeArena::new();
        let at = Anchor::new("test", 1, 1);

        let label = nodes.reserve(at);
        let value = nodes.symbol(at, "v");
        let merge = nodes.push(NodeKind::Merge { label, value }, at);
        assert_eq!(nodes.uses(label), 0);

        nodes.fill(
            label,
            NodeKind::Label {
                name: "exit".into(),
                body: merge,
            },
        );

        assert_eq!(nodes.uses(merge), 1);
        assert_eq!(nodes.uses(label), 0);
    }

    #[test]
    #[should_panic]
    fn filling_twice_panics() {
        let mut nodes = NodeArena::new();
        let at = Anchor::new("test", 1, 1);

        let id = nodes.reserve(at);
        let value = nodes.symbol(at, "v");
        nodes.fill(id, NodeKind::Keyed {
            key: "k".into(),
            value,
        });
        nodes.fill(id, NodeKind::Keyed {
            key: "k".into(),
            value,
        });
    }
}
