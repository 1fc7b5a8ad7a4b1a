mod common;

use common::{Fixture, at};
use prover::{
    ProveErrorKind,
    frontend::node::{CaseKind, NodeKind, SwitchCase},
    middle::{prover::builtin::Builtin, ty::TypeKind},
};

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn unused_resources_are_dropped_on_return() {
    let mut fixture = Fixture::new();

    let resource = fixture.call(1, "acquire", vec![]);
    let zero = fixture.int(2, 0);
    let body = fixture.expression(1, vec![resource], zero);
    let main = fixture.define(1, "main", vec![], body);

    let function = fixture.prove(main).unwrap();

    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "call @close("), 1, "{dump}");
    assert!(dump.find("@close").unwrap() < dump.find("return 0").unwrap());
}

#[test]
fn resource_is_dropped_on_the_path_that_keeps_it() {
    let mut fixture = Fixture::new();

    // r = acquire(); if flag() { consume(r) } else { 0 }
    let resource = fixture.call(1, "acquire", vec![]);
    let condition = fixture.call(2, "flag", vec![]);
    let consumed = fixture.call(2, "consume", vec![resource]);
    let zero = fixture.int(3, 0);
    let branch = fixture.if_else(2, condition, consumed, Some(zero));
    let body = fixture.expression(1, vec![resource], branch);
    let main = fixture.define(1, "main", vec![], body);

    let function = fixture.prove(main).unwrap();

    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "call @consume("), 1, "{dump}");
    assert_eq!(count(&dump, "call @close("), 1, "{dump}");
    assert!(dump.find("else").unwrap() < dump.find("@close").unwrap(), "{dump}");
}

#[test]
fn moved_values_cannot_be_used_again() {
    let mut fixture = Fixture::new();

    let resource = fixture.call(1, "acquire", vec![]);
    let first = fixture.call(2, "consume", vec![resource]);
    let second = fixture.call(3, "consume", vec![resource]);
    let body = fixture.expression(1, vec![first], second);
    let main = fixture.define(1, "main", vec![], body);

    let error = fixture.prove(main).unwrap_err();
    let ProveErrorKind::UseAfterMove { moved_at, .. } = error.kind else {
        panic!("{}", error.report());
    };
    assert_eq!(moved_at, at(1));
    assert_eq!(error.anchor, at(1));
}

#[test]
fn explicitly_dropped_values_are_gone() {
    let mut fixture = Fixture::new();

    let resource = fixture.call(1, "acquire", vec![]);
    let dropped = fixture.builtin(2, Builtin::Drop, vec![resource]);
    let peeked = fixture.call(3, "peek", vec![resource]);
    let body = fixture.expression(1, vec![dropped], peeked);
    let main = fixture.define(1, "main", vec![], body);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::UseAfterMove { .. }),
        "{}",
        error.report()
    );
}

#[test]
fn lost_values_skip_their_destructor() {
    let mut fixture = Fixture::new();

    let resource = fixture.call(1, "acquire", vec![]);
    let lost = fixture.builtin(2, Builtin::Lose, vec![resource]);
    let zero = fixture.int(3, 0);
    let body = fixture.expression(1, vec![lost], zero);
    let main = fixture.define(1, "main", vec![], body);

    let function = fixture.prove(main).unwrap();

    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "@close"), 0, "{dump}");
}

#[test]
fn parameters_only_observed_are_views() {
    let mut fixture = Fixture::new();

    let h = fixture.param(1, "h");
    let peeked = fixture.call(1, "peek", vec![h]);
    fixture.define(1, "inspect", vec![h], peeked);

    let resource = fixture.call(2, "acquire", vec![]);
    let call = fixture.call(2, "inspect", vec![resource]);
    let main = fixture.define(2, "main", vec![], call);

    let function = fixture.prove(main).unwrap();

    let inspect = fixture.function_named("inspect");
    let signature = fixture.session.function(inspect).signature.clone().unwrap();
    let TypeKind::Function { params, .. } = &*signature else {
        panic!("not a function type: {signature}");
    };
    assert!(params[0].view_ids().is_some(), "{signature}");
    assert_eq!(count(&fixture.dump(inspect), "@close"), 0);

    // the caller still owns the resource and drops it after the call
    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "call @close("), 1, "{dump}");
    assert!(dump.find("@inspect").unwrap() < dump.find("@close").unwrap());
}

#[test]
fn parameters_consumed_on_one_path_are_dropped_on_the_others() {
    let mut fixture = Fixture::new();

    // maybe(h) = if flag() { consume(h) } else { 0 }
    let h = fixture.param(1, "h");
    let condition = fixture.call(1, "flag", vec![]);
    let consumed = fixture.call(1, "consume", vec![h]);
    let zero = fixture.int(1, 0);
    let body = fixture.if_else(1, condition, consumed, Some(zero));
    fixture.define(1, "maybe", vec![h], body);

    let resource = fixture.call(2, "acquire", vec![]);
    let call = fixture.call(2, "maybe", vec![resource]);
    let main = fixture.define(2, "main", vec![], call);

    let function = fixture.prove(main).unwrap();

    let maybe = fixture.function_named("maybe");
    let signature = fixture.session.function(maybe).signature.clone().unwrap();
    let TypeKind::Function { params, .. } = &*signature else {
        panic!("not a function type: {signature}");
    };
    assert!(params[0].unique_id().is_some(), "{signature}");
    assert_eq!(count(&fixture.dump(maybe), "call @close("), 1);

    // ownership moved into `maybe`
    assert_eq!(count(&fixture.dump(function), "@close"), 0);
}

#[test]
fn loop_arguments_pin_the_values_they_view() {
    let mut fixture = Fixture::new();

    // r = acquire(); loop (r) { consume(r) }; peek(r)
    let resource = fixture.call(1, "acquire", vec![]);
    let node = fixture.session.nodes_mut().reserve(at(2));
    let consumed = fixture.call(3, "consume", vec![resource]);
    fixture.session.nodes_mut().fill(
        node,
        NodeKind::Loop {
            init: resource,
            body: consumed,
        },
    );
    let peeked = fixture.call(4, "peek", vec![resource]);
    let body = fixture.expression(1, vec![node], peeked);
    let main = fixture.define(1, "main", vec![], body);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::LoopViewMoved { .. }),
        "{}",
        error.report()
    );
}

#[test]
fn views_cannot_leave_the_label_owning_their_value() {
    let mut fixture = Fixture::new();

    // label out { merge out view(acquire()) }
    let label = fixture.session.nodes_mut().reserve(at(1));
    let resource = fixture.call(2, "acquire", vec![]);
    let viewed = fixture.builtin(2, Builtin::View, vec![resource]);
    let merge = fixture.push(
        2,
        NodeKind::Merge {
            label,
            value: viewed,
        },
    );
    fixture.session.nodes_mut().fill(
        label,
        NodeKind::Label {
            name: "out".into(),
            body: merge,
        },
    );
    let main = fixture.define(1, "main", vec![], label);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::ViewEscapesScope { .. }),
        "{}",
        error.report()
    );
}

#[test]
fn views_cannot_be_moved() {
    let mut fixture = Fixture::new();

    let resource = fixture.call(1, "acquire", vec![]);
    let viewed = fixture.builtin(1, Builtin::View, vec![resource]);
    let moved = fixture.builtin(1, Builtin::Move, vec![viewed]);
    let main = fixture.define(1, "main", vec![], moved);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::CannotMoveView(_)),
        "{}",
        error.report()
    );
}

#[test]
fn resources_acquired_in_a_branch_are_dropped_in_that_branch() {
    let mut fixture = Fixture::new();

    // if flag() { r = acquire(); peek(r) } else { 0 }
    let condition = fixture.call(1, "flag", vec![]);
    let resource = fixture.call(2, "acquire", vec![]);
    let peeked = fixture.call(2, "peek", vec![resource]);
    let then_value = fixture.expression(2, vec![resource], peeked);
    let zero = fixture.int(3, 0);
    let branch = fixture.if_else(1, condition, then_value, Some(zero));
    let main = fixture.define(1, "main", vec![], branch);

    let function = fixture.prove(main).unwrap();

    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "call @close("), 1, "{dump}");
    let close = dump.find("@close").unwrap();
    assert!(dump.find("@peek").unwrap() < close, "{dump}");
    assert!(close < dump.find("else").unwrap(), "{dump}");
}

#[test]
fn pass_cases_cannot_give_up_values() {
    let mut fixture = Fixture::new();

    // r = acquire(); switch 1 { pass 1: consume(r); default: 0 }
    let resource = fixture.call(1, "acquire", vec![]);
    let selector = fixture.int(2, 1);
    let literal = fixture.int(3, 1);
    let consumed = fixture.call(3, "consume", vec![resource]);
    let zero = fixture.int(4, 0);
    let switch = fixture.push(
        2,
        NodeKind::Switch {
            expr: selector,
            cases: vec![
                SwitchCase {
                    kind: CaseKind::Pass,
                    literal: Some(literal),
                    value: consumed,
                },
                SwitchCase {
                    kind: CaseKind::Default,
                    literal: None,
                    value: zero,
                },
            ],
        },
    );
    let body = fixture.expression(1, vec![resource], switch);
    let main = fixture.define(1, "main", vec![], body);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::PassCaseMovesValue { .. }),
        "{}",
        error.report()
    );
    assert_eq!(error.anchor, at(3));
}

#[test]
fn views_can_be_passed_to_specialized_templates() {
    let mut fixture = Fixture::new();

    let h = fixture.param(1, "h");
    let peeked = fixture.call(1, "peek", vec![h]);
    fixture.define(1, "inspect", vec![h], peeked);

    // r = acquire(); inspect(view(r))
    let resource = fixture.call(2, "acquire", vec![]);
    let viewed = fixture.builtin(2, Builtin::View, vec![resource]);
    let call = fixture.call(2, "inspect", vec![viewed]);
    let body = fixture.expression(2, vec![resource], call);
    let main = fixture.define(2, "main", vec![], body);

    let function = fixture.prove(main).unwrap();

    let inspect = fixture.function_named("inspect");
    let signature = fixture.session.function(inspect).signature.clone().unwrap();
    let TypeKind::Function { params, .. } = &*signature else {
        panic!("not a function type: {signature}");
    };
    assert!(params[0].view_ids().is_some(), "{signature}");
    assert_eq!(count(&fixture.dump(inspect), "@close"), 0);

    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "call @close("), 1, "{dump}");
    assert!(dump.find("@inspect").unwrap() < dump.find("@close").unwrap());
}

#[test]
fn viewed_parameters_can_be_returned() {
    let mut fixture = Fixture::new();

    let x = fixture.param(1, "x");
    fixture.define(1, "id", vec![x], x);

    // r = acquire(); peek(id(view(r)))
    let resource = fixture.call(2, "acquire", vec![]);
    let viewed = fixture.builtin(2, Builtin::View, vec![resource]);
    let passed = fixture.call(2, "id", vec![viewed]);
    let peeked = fixture.call(2, "peek", vec![passed]);
    let body = fixture.expression(2, vec![resource], peeked);
    let main = fixture.define(2, "main", vec![], body);

    let function = fixture.prove(main).unwrap();

    let id = fixture.function_named("id");
    let signature = fixture.session.function(id).signature.clone().unwrap();
    let TypeKind::Function { return_type, .. } = &*signature else {
        panic!("not a function type: {signature}");
    };
    assert!(return_type.view_ids().is_some(), "{signature}");

    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "call @close("), 1, "{dump}");
    assert!(dump.find("@peek").unwrap() < dump.find("@close").unwrap());
}

#[test]
fn viewed_parameters_cannot_be_consumed() {
    let mut fixture = Fixture::new();

    let h = fixture.param(1, "h");
    let consumed = fixture.call(1, "consume", vec![h]);
    fixture.define(1, "take", vec![h], consumed);

    let resource = fixture.call(2, "acquire", vec![]);
    let viewed = fixture.builtin(2, Builtin::View, vec![resource]);
    let call = fixture.call(2, "take", vec![viewed]);
    let body = fixture.expression(2, vec![resource], call);
    let main = fixture.define(2, "main", vec![], body);

    let error = fixture.prove(main).unwrap_err();
    assert!(
        matches!(error.kind, ProveErrorKind::CannotMoveView(_)),
        "{}",
        error.report()
    );
}

#[test]
fn outer_resources_survive_every_iteration() {
    let mut fixture = Fixture::new();

    // r = acquire(); loop (i = 10) { peek(r); if i > 0 { repeat i - 1 } else { break i } }
    let resource = fixture.call(1, "acquire", vec![]);
    let node = fixture.session.nodes_mut().reserve(at(2));
    let args = fixture.push(3, NodeKind::LoopArguments { loop_node: node });
    let peeked = fixture.call(3, "peek", vec![resource]);
    let zero = fixture.int(4, 0);
    let positive = fixture.builtin(4, Builtin::ICmpSGt, vec![args, zero]);
    let one = fixture.int(4, 1);
    let next = fixture.builtin(4, Builtin::Sub, vec![args, one]);
    let repeat = fixture.builtin(4, Builtin::Repeat, vec![next]);
    let exit = fixture.builtin(5, Builtin::Break, vec![args]);
    let branch = fixture.if_else(4, positive, repeat, Some(exit));
    let loop_body = fixture.expression(3, vec![peeked], branch);
    let ten = fixture.int(2, 10);
    fixture.session.nodes_mut().fill(
        node,
        NodeKind::Loop {
            init: ten,
            body: loop_body,
        },
    );
    let body = fixture.expression(1, vec![resource], node);
    let main = fixture.define(1, "main", vec![], body);

    let function = fixture.prove(main).unwrap();

    // dropped once, after the loop
    let dump = fixture.dump(function);
    assert_eq!(count(&dump, "call @close("), 1, "{dump}");
    assert!(dump.find("repeat").unwrap() < dump.find("@close").unwrap(), "{dump}");
}
