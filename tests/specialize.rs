mod common;

use common::{Fixture, at};
use indoc::indoc;
use prover::{
    ProveErrorKind, ProverConfig, Session,
    frontend::node::{CaseKind, Constant, NodeId, NodeKind, SwitchCase, Template},
    middle::{prover::builtin::Builtin, qualifier::UniqueId, ty::TypeKind},
};

#[test]
fn identical_instantiations_are_memoized() {
    let mut fixture = Fixture::new();
    let x = fixture.param(1, "x");
    let id = fixture.define(1, "id", vec![x], x);
    let i32 = fixture.i32.clone();
    let f32 = fixture.session.types_mut().real(32);

    let first = fixture.specialize(id, &[i32.clone()]).unwrap();
    let second = fixture.specialize(id, &[i32]).unwrap();
    let real = fixture.specialize(id, &[f32]).unwrap();

    assert_eq!(first, second);
    assert_ne!(first, real);
    assert!(fixture.session.function(first).complete);
}

#[test]
fn resources_of_the_same_type_share_an_instance() {
    let mut fixture = Fixture::new();
    let x = fixture.param(1, "x");
    let id = fixture.define(1, "id", vec![x], x);
    let handle = fixture.handle.clone();
    let types = fixture.session.types_mut();
    let a = types.unique_type(&handle, UniqueId::new(7));
    let b = types.unique_type(&handle, UniqueId::new(9));

    let first = fixture.specialize(id, &[a]).unwrap();
    let second = fixture.specialize(id, &[b]).unwrap();
    assert_eq!(first, second);

    // handing the parameter back gives it up
    let signature = fixture.session.function(first).signature.clone().unwrap();
    let TypeKind::Function {
        params,
        return_type,
        ..
    } = &*signature
    else {
        panic!("not a function type: {signature}");
    };
    assert_eq!(params[0].unique_id(), Some(UniqueId::for_parameter(0)));
    assert_eq!(return_type.unique_id(), Some(UniqueId::UNKNOWN));
}

#[test]
fn identity_dump() {
    let mut fixture = Fixture::new();
    let x = fixture.param(1, "x");
    let id = fixture.define(1, "id", vec![x], x);
    let i32 = fixture.i32.clone();

    let function = fixture.specialize(id, &[i32]).unwrap();

    assert_eq!(
        fixture.dump(function),
        indoc! {"
            fn id(%0: i32) -> i32 {
                return %0
            }"
        }
    );
}

#[test]
fn recursive_call_uses_the_return_type_seen_so_far() {
    let mut fixture = Fixture::new();

    let n = fixture.param(1, "n");
    let one = fixture.int(2, 1);
    let done = fixture.builtin(2, Builtin::ICmpSLe, vec![n, one]);
    let base = fixture.int(3, 1);
    let step = fixture.int(4, 1);
    let smaller = fixture.builtin(4, Builtin::Sub, vec![n, step]);
    let recurse = fixture.call(4, "fact", vec![smaller]);
    let product = fixture.builtin(4, Builtin::Mul, vec![n, recurse]);
    let body = fixture.if_else(2, done, base, Some(product));
    fixture.define(1, "fact", vec![n], body);

    let five = fixture.int(6, 5);
    let call = fixture.call(6, "fact", vec![five]);
    let main = fixture.define(6, "main", vec![], call);

    fixture.prove(main).unwrap();

    let fact = fixture.function_named("fact");
    let function = fixture.session.function(fact);
    assert!(function.complete);
    assert_eq!(function.return_type, Some(fixture.i32.clone()));
    assert!(fixture.dump(fact).contains("call @fact(%"));
}

#[test]
fn recursion_before_any_return_is_an_error() {
    let mut fixture = Fixture::new();

    let x = fixture.param(1, "x");
    let recurse = fixture.call(1, "f", vec![x]);
    fixture.define(1, "f", vec![x], recurse);
    let one = fixture.int(2, 1);
    let call = fixture.call(2, "f", vec![one]);
    let main = fixture.define(2, "main", vec![], call);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::UntypedRecursiveCall(_)),
        "{}",
        error.report()
    );

    let report = strip_ansi_escapes::strip_str(error.report());
    assert!(report.contains("while specializing `f`"), "{report}");
    assert!(report.contains("while specializing `main`"), "{report}");
}

#[test]
fn signature_changed_after_recursive_call_is_an_error() {
    let mut fixture = Fixture::new();

    // g(h) = if flag() { 0 } else { g(h) + consume(h) }
    let h = fixture.param(1, "h");
    let condition = fixture.call(2, "flag", vec![]);
    let zero = fixture.int(2, 0);
    let recurse = fixture.call(3, "g", vec![h]);
    let consumed = fixture.call(3, "consume", vec![h]);
    let sum = fixture.builtin(3, Builtin::Add, vec![recurse, consumed]);
    let body = fixture.if_else(2, condition, zero, Some(sum));
    fixture.define(1, "g", vec![h], body);

    let resource = fixture.call(5, "acquire", vec![]);
    let call = fixture.call(5, "g", vec![resource]);
    let main = fixture.define(5, "main", vec![], call);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(
            error.kind,
            ProveErrorKind::InconsistentRecursiveSignature { .. }
        ),
        "{}",
        error.report()
    );
}

#[test]
fn forward_declarations_cannot_be_called() {
    let mut fixture = Fixture::new();

    let declared = fixture.push(
        1,
        NodeKind::Template(Template {
            name: "later".into(),
            params: vec![],
            body: None,
            inline: false,
            scope: None,
        }),
    );
    fixture.scope.bind("later", declared);
    let call = fixture.call(2, "later", vec![]);
    let main = fixture.define(2, "main", vec![], call);

    let error = fixture.prove(main).unwrap_err();
    assert!(matches!(error.kind, ProveErrorKind::ForwardDeclaration(_)));
    assert_eq!(error.anchor, at(2));
}

#[test]
fn runaway_inline_recursion_is_cut_off() {
    let session = Session::with_config(ProverConfig {
        max_recursion_depth: 4,
        ..ProverConfig::default()
    });
    let mut fixture = Fixture::with_session(session);

    let x = fixture.param(1, "x");
    let recurse = fixture.call(1, "spin", vec![x]);
    fixture.define_inline(1, "spin", vec![x], recurse);
    let one = fixture.int(2, 1);
    let call = fixture.call(2, "spin", vec![one]);
    let main = fixture.define(2, "main", vec![], call);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::RecursionOverflow { limit: 4, .. }),
        "{}",
        error.report()
    );
    assert_eq!(
        error
            .trace
            .iter()
            .filter(|frame| frame.to_string().contains("inline `spin`"))
            .count(),
        4
    );
}

/// outer(x) = inner() where inner's body is `x`
fn nested_template(fixture: &mut Fixture, inline: bool) -> NodeId {
    let outer = fixture.session.nodes_mut().reserve(at(1));
    let x = fixture.param(1, "x");
    let inner = fixture.push(
        2,
        NodeKind::Template(Template {
            name: "inner".into(),
            params: vec![],
            body: Some(x),
            inline,
            scope: Some(outer),
        }),
    );
    let call_inner = fixture.session.nodes_mut().call(at(2), inner, vec![]);
    fixture.session.nodes_mut().fill(
        outer,
        NodeKind::Template(Template {
            name: "outer".into(),
            params: vec![x],
            body: Some(call_inner),
            inline: false,
            scope: None,
        }),
    );
    fixture.scope.bind("outer", outer);

    let three = fixture.int(3, 3);
    let call = fixture.call(3, "outer", vec![three]);
    fixture.define(3, "main", vec![], call)
}

#[test]
fn inline_closures_see_the_enclosing_parameters() {
    let mut fixture = Fixture::new();
    let main = nested_template(&mut fixture, true);

    fixture.prove(main).unwrap();

    let outer = fixture.function_named("outer");
    assert_eq!(
        fixture.session.function(outer).return_type,
        Some(fixture.i32.clone())
    );
}

#[test]
fn specialized_closures_cannot_capture_runtime_values() {
    let mut fixture = Fixture::new();
    let main = nested_template(&mut fixture, false);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::CapturedRuntimeValue(_)),
        "{}",
        error.report()
    );
}

#[test]
fn keyword_arguments_are_matched_by_name() {
    let mut fixture = Fixture::new();

    let a = fixture.param(1, "a");
    let b = fixture.param(1, "b");
    let difference = fixture.builtin(1, Builtin::Sub, vec![a, b]);
    fixture.define(1, "minus", vec![a, b], difference);

    let one = fixture.int(2, 1);
    let five = fixture.int(2, 5);
    let keyed_b = fixture.push(
        2,
        NodeKind::Keyed {
            key: "b".into(),
            value: one,
        },
    );
    let keyed_a = fixture.push(
        2,
        NodeKind::Keyed {
            key: "a".into(),
            value: five,
        },
    );
    let call = fixture.call(2, "minus", vec![keyed_b, keyed_a]);
    let main = fixture.define(2, "main", vec![], call);

    let function = fixture.prove(main).unwrap();

    assert!(fixture.dump(function).contains("call @minus(5, 1)"));
    let minus = fixture.function_named("minus");
    let params = fixture.session.function(minus).params.clone();
    let expected = format!("sub %{} %{}", params[0], params[1]);
    assert!(fixture.dump(minus).contains(&expected));
}

#[test]
fn unknown_keywords_are_rejected() {
    let mut fixture = Fixture::new();

    let a = fixture.param(1, "a");
    fixture.define(1, "first", vec![a], a);
    let one = fixture.int(2, 1);
    let keyed = fixture.push(
        2,
        NodeKind::Keyed {
            key: "z".into(),
            value: one,
        },
    );
    let call = fixture.call(2, "first", vec![keyed]);
    let main = fixture.define(2, "main", vec![], call);

    let error = fixture.prove(main).unwrap_err();
    assert!(matches!(error.kind, ProveErrorKind::UnknownKeyword(_)));
}

#[test]
fn builtin_argument_count_and_kinds_are_checked() {
    let mut fixture = Fixture::new();
    let one = fixture.int(1, 1);
    let add = fixture.builtin(1, Builtin::Add, vec![one]);
    let main = fixture.define(1, "main", vec![], add);

    let error = fixture.prove(main).unwrap_err();
    assert!(matches!(
        error.kind,
        ProveErrorKind::InvalidBuiltinArgumentCount { actual: 1, .. }
    ));

    let mut fixture = Fixture::new();
    let f32 = fixture.session.types_mut().real(32);
    let one = fixture.int(1, 1);
    let half = fixture.session.nodes_mut().constant(
        at(1),
        Constant::Real {
            value: 0.5,
            ty: f32,
        },
    );
    let add = fixture.builtin(1, Builtin::Add, vec![one, half]);
    let main = fixture.define(1, "main", vec![], add);

    let error = fixture.prove(main).unwrap_err();
    assert!(matches!(
        error.kind,
        ProveErrorKind::InvalidBuiltinArgument { index: 1, .. }
    ));
}

#[test]
fn branches_of_different_arity_do_not_merge() {
    let mut fixture = Fixture::new();

    let condition = fixture.call(1, "flag", vec![]);
    let one = fixture.int(2, 1);
    let two = fixture.int(2, 2);
    let pair = fixture.push(2, NodeKind::ArgumentList(vec![one, two]));
    let three = fixture.int(3, 3);
    let branch = fixture.if_else(1, condition, pair, Some(three));
    let main = fixture.define(1, "main", vec![], branch);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::MergeMismatch { .. }),
        "{}",
        error.report()
    );
}

#[test]
fn constant_conditions_are_folded() {
    let mut fixture = Fixture::new();

    let bool = fixture.session.types_mut().bool();
    let yes = fixture.session.nodes_mut().int(at(1), 1, bool);
    let one = fixture.int(1, 1);
    let two = fixture.int(1, 2);
    let branch = fixture.if_else(1, yes, one, Some(two));
    let main = fixture.define(1, "main", vec![], branch);

    let function = fixture.prove(main).unwrap();

    assert_eq!(
        fixture.dump(function),
        indoc! {"
            fn main() -> i32 {
                return 1
            }"
        }
    );
}

#[test]
fn switch_merges_its_arms() {
    let mut fixture = Fixture::new();

    let x = fixture.param(1, "x");
    let literal = fixture.int(2, 1);
    let ten = fixture.int(2, 10);
    let twenty = fixture.int(3, 20);
    let switch = fixture.push(
        1,
        NodeKind::Switch {
            expr: x,
            cases: vec![
                SwitchCase {
                    kind: CaseKind::Case,
                    literal: Some(literal),
                    value: ten,
                },
                SwitchCase {
                    kind: CaseKind::Default,
                    literal: None,
                    value: twenty,
                },
            ],
        },
    );
    let id = fixture.define(1, "pick", vec![x], switch);
    let i32 = fixture.i32.clone();

    let function = fixture.specialize(id, &[i32.clone()]).unwrap();

    assert_eq!(fixture.session.function(function).return_type, Some(i32));
    let dump = fixture.dump(function);
    assert!(dump.contains("switch %0 {"), "{dump}");
    assert!(dump.contains("case 1 {"), "{dump}");
    assert!(dump.contains("default {"), "{dump}");
}

#[test]
fn loops_merge_their_breaks() {
    let mut fixture = Fixture::new();

    // loop (i = 10) { if i > 0 { repeat i - 1 } else { break i } }
    let node = fixture.session.nodes_mut().reserve(at(1));
    let args = fixture.push(2, NodeKind::LoopArguments { loop_node: node });
    let zero = fixture.int(2, 0);
    let positive = fixture.builtin(2, Builtin::ICmpSGt, vec![args, zero]);
    let one = fixture.int(3, 1);
    let next = fixture.builtin(3, Builtin::Sub, vec![args, one]);
    let repeat = fixture.builtin(3, Builtin::Repeat, vec![next]);
    let exit = fixture.builtin(4, Builtin::Break, vec![args]);
    let body = fixture.if_else(2, positive, repeat, Some(exit));
    let ten = fixture.int(1, 10);
    fixture
        .session
        .nodes_mut()
        .fill(node, NodeKind::Loop { init: ten, body });
    let main = fixture.define(1, "main", vec![], node);

    let function = fixture.prove(main).unwrap();

    assert_eq!(
        fixture.session.function(function).return_type,
        Some(fixture.i32.clone())
    );
    let dump = fixture.dump(function);
    assert!(dump.contains("loop %"), "{dump}");
    assert!(dump.contains("repeat %"), "{dump}");
    assert!(dump.contains("merge %"), "{dump}");
}

#[test]
fn raised_types_are_part_of_the_signature() {
    let mut fixture = Fixture::new();

    // risky() = if flag() { raise 1 } else { 2 }
    let condition = fixture.call(1, "flag", vec![]);
    let code = fixture.int(1, 1);
    let raise = fixture.builtin(1, Builtin::Raise, vec![code]);
    let two = fixture.int(2, 2);
    let body = fixture.if_else(1, condition, raise, Some(two));
    fixture.define(1, "risky", vec![], body);

    let call = fixture.call(3, "risky", vec![]);
    let main = fixture.define(3, "main", vec![], call);

    let function = fixture.prove(main).unwrap();

    let risky = fixture.function_named("risky");
    let dump = fixture.dump(risky);
    assert!(dump.contains("-> i32 raises i32 {"), "{dump}");
    assert!(dump.contains("raise 1"), "{dump}");

    // callers raise whatever their callees raise
    let i32 = fixture.i32.clone();
    assert_eq!(fixture.session.function(function).raise_type, Some(i32));
}

#[test]
fn raised_types_must_agree() {
    let mut fixture = Fixture::new();
    let bool = fixture.session.types_mut().bool();

    // if flag() { raise 1 } else { raise true }
    let condition = fixture.call(1, "flag", vec![]);
    let code = fixture.int(1, 1);
    let first = fixture.builtin(1, Builtin::Raise, vec![code]);
    let truth = fixture.session.nodes_mut().int(at(2), 1, bool);
    let second = fixture.builtin(2, Builtin::Raise, vec![truth]);
    let body = fixture.if_else(1, condition, first, Some(second));
    let main = fixture.define(1, "main", vec![], body);

    let error = fixture.prove(main).unwrap_err();
    let ProveErrorKind::MergeMismatch { other, .. } = error.kind else {
        panic!("{}", error.report());
    };
    assert_eq!(other, at(1));
    assert_eq!(error.anchor, at(2));
}

/// r1 = acquire(); r2 = acquire();
/// loop (r1) { if flag() { repeat view(r2) } else { break 0 } };
/// peek(r2); peek(r1)
///
/// The loop argument starts out viewing r1 and widens to view r2 as well.
fn widening_loop(fixture: &mut Fixture) -> NodeId {
    let first = fixture.call(1, "acquire", vec![]);
    let second = fixture.call(2, "acquire", vec![]);

    let node = fixture.session.nodes_mut().reserve(at(3));
    let condition = fixture.call(4, "flag", vec![]);
    let viewed = fixture.builtin(4, Builtin::View, vec![second]);
    let repeat = fixture.builtin(4, Builtin::Repeat, vec![viewed]);
    let zero = fixture.int(5, 0);
    let exit = fixture.builtin(5, Builtin::Break, vec![zero]);
    let body = fixture.if_else(4, condition, repeat, Some(exit));
    fixture
        .session
        .nodes_mut()
        .fill(node, NodeKind::Loop { init: first, body });

    let peek_second = fixture.call(6, "peek", vec![second]);
    let peek_first = fixture.call(7, "peek", vec![first]);
    let main_body = fixture.expression(1, vec![first, second, node, peek_second], peek_first);
    fixture.define(1, "main", vec![], main_body)
}

#[test]
fn loop_arguments_widen_until_they_settle() {
    let mut fixture = Fixture::new();
    let main = widening_loop(&mut fixture);

    let function = fixture.prove(main).unwrap();

    let dump = fixture.dump(function);
    assert_eq!(dump.matches("loop %").count(), 1, "{dump}");
    assert_eq!(dump.matches("call @close(").count(), 2, "{dump}");
}

#[test]
fn loop_retries_are_bounded() {
    let config = ProverConfig {
        max_loop_retries: 0,
        ..ProverConfig::default()
    };
    let mut fixture = Fixture::with_session(Session::with_config(config));
    let main = widening_loop(&mut fixture);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::LoopDidNotConverge(1)),
        "{}",
        error.report()
    );
    assert_eq!(error.anchor, at(3));
}
