#![allow(dead_code)]

use prover::{
    Session,
    frontend::{
        anchor::Anchor,
        intern::Symbol,
        node::{Clause, Constant, NodeId, NodeKind, Template},
        scope::Scope,
    },
    middle::{
        ir::FunctionId,
        prover::builtin::Builtin,
        qualifier::{IdSet, UniqueId},
        ty::Type,
    },
};

pub fn at(line: u32) -> Anchor {
    Anchor::new("test.sc", line, 1)
}

/// A session preloaded with a `Handle` resource type and externs to work
/// with it:
///
/// - `acquire: () -> unique Handle`
/// - `consume: (unique Handle) -> i32`
/// - `peek: (view Handle) -> i32`
/// - `close: (unique Handle) -> ()`, the destructor of `Handle`
/// - `flag: () -> bool`
pub struct Fixture {
    pub session: Session,
    pub scope: Scope,
    pub i32: Type,
    pub handle: Type,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_session(Session::new())
    }

    pub fn with_session(mut session: Session) -> Self {
        let types = session.types_mut();
        let i32 = types.int(32);
        let bool = types.bool();
        let unit = types.empty_arguments();
        let handle = types.typename("Handle", None);
        types.set_storage(&handle, i32.clone()).unwrap();

        let first = UniqueId::for_parameter(0);
        let fresh = types.unique_type(&handle, UniqueId::UNKNOWN);
        let owned = types.unique_type(&handle, first);
        let viewed = types.view_type(&handle, IdSet::single(first));

        let externs = [
            ("acquire", types.function(fresh, &[], false, None)),
            (
                "consume",
                types.function(i32.clone(), &[owned.clone()], false, None),
            ),
            ("peek", types.function(i32.clone(), &[viewed], false, None)),
            ("close", types.function(unit, &[owned], false, None)),
            ("flag", types.function(bool, &[], false, None)),
        ];

        let mut fixture = Self {
            session,
            scope: Scope::new(),
            i32,
            handle,
        };

        for (name, ty) in externs {
            let node = fixture.session.nodes_mut().constant(
                at(0),
                Constant::Extern {
                    name: name.into(),
                    ty,
                },
            );
            fixture.scope.bind(name, node);
        }

        let close = fixture.scope.lookup("close".into()).unwrap();
        let handle = fixture.handle.clone();
        fixture
            .session
            .types_mut()
            .set_destructor(&handle, close)
            .unwrap();

        fixture
    }

    pub fn push(&mut self, line: u32, kind: NodeKind) -> NodeId {
        self.session.nodes_mut().push(kind, at(line))
    }

    pub fn int(&mut self, line: u32, value: i128) -> NodeId {
        let ty = self.i32.clone();
        self.session.nodes_mut().int(at(line), value, ty)
    }

    pub fn param(&mut self, line: u32, name: &str) -> NodeId {
        self.session.nodes_mut().parameter(at(line), name)
    }

    /// Calls whatever `name` is bound to in the scope
    pub fn call(&mut self, line: u32, name: &str, args: Vec<NodeId>) -> NodeId {
        let nodes = self.session.nodes_mut();
        let callee = nodes.symbol(at(line), name);
        nodes.call(at(line), callee, args)
    }

    pub fn builtin(&mut self, line: u32, op: Builtin, args: Vec<NodeId>) -> NodeId {
        self.session.nodes_mut().call_builtin(at(line), op, args)
    }

    pub fn expression(&mut self, line: u32, body: Vec<NodeId>, value: NodeId) -> NodeId {
        self.session.nodes_mut().expression(at(line), body, value)
    }

    pub fn if_else(
        &mut self,
        line: u32,
        condition: NodeId,
        value: NodeId,
        else_value: Option<NodeId>,
    ) -> NodeId {
        self.push(
            line,
            NodeKind::If {
                clauses: vec![Clause { condition, value }],
                else_value,
            },
        )
    }

    /// Defines a top-level template and binds it in the scope
    pub fn define(&mut self, line: u32, name: &str, params: Vec<NodeId>, body: NodeId) -> NodeId {
        let node = self
            .session
            .nodes_mut()
            .template(at(line), name, params, body);
        self.scope.bind(name, node);
        node
    }

    pub fn define_inline(
        &mut self,
        line: u32,
        name: &str,
        params: Vec<NodeId>,
        body: NodeId,
    ) -> NodeId {
        let node = self.push(
            line,
            NodeKind::Template(Template {
                name: name.into(),
                params,
                body: Some(body),
                inline: true,
                scope: None,
            }),
        );
        self.scope.bind(name, node);
        node
    }

    /// Proves the argument-less template `main`
    pub fn prove(&mut self, main: NodeId) -> prover::Result<FunctionId> {
        let scope = self.scope.clone();
        self.session.prove_module(main, scope)
    }

    pub fn specialize(&mut self, template: NodeId, args: &[Type]) -> prover::Result<FunctionId> {
        self.session.set_scope(self.scope.clone());
        let root = self.session.root_frame();
        self.session.specialize(template, root, args)
    }

    pub fn function_named(&self, name: &str) -> FunctionId {
        self.session
            .functions()
            .find(|(_, function)| function.name == Symbol::from(name))
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no function named {name}"))
    }

    /// The function's IR dump without colors
    pub fn dump(&self, function: FunctionId) -> String {
        strip_ansi_escapes::strip_str(self.session.dump_function(function))
    }
}
