use std::rc::Rc;

use hashbrown::HashMap;

use super::{intern::Symbol, node::NodeId};

/// A lexical symbol table handed over by the macro expander. The prover only
/// ever asks it to resolve free identifiers.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    bindings: HashMap<Symbol, NodeId>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty scope whose misses fall through to `parent`
    pub fn with_parent(parent: Rc<Scope>) -> Self {
        Self {
            parent: Some(parent),
            bindings: HashMap::new(),
        }
    }

    pub fn bind(&mut self, name: impl Into<Symbol>, node: NodeId) {
        self.bindings.insert(name.into(), node);
    }

    pub fn lookup(&self, name: Symbol) -> Option<NodeId> {
        match self.bindings.get(&name) {
            Some(node) => Some(*node),
            None => self.parent.as_ref().and_then(|parent| parent.lookup(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    #[test]
    fn lookup_falls_through_to_parent() {
        let mut parent = Scope::new();
        parent.bind("outer", NodeId::new(1));
        parent.bind("shadowed", NodeId::new(2));

        let mut child = Scope::with_parent(Rc::new(parent));
        child.bind("shadowed", NodeId::new(3));

        assert_eq!(child.lookup("outer".into()), Some(NodeId::new(1)));
        assert_eq!(child.lookup("shadowed".into()), Some(NodeId::new(3)));
        assert_eq!(child.lookup("missing".into()), None);
    }
}
