use pretty_assertions::assert_eq;

use super::*;
use crate::{BinaryOp, CatchBlock, Name, Ty};

#[test]
fn binary_children_are_left_then_right() {
    let mut arena = Arena::new();
    let a = arena.int(1);
    let b = arena.int(2);
    let sum = arena.binary(BinaryOp::Add, a, b).unwrap();
    assert_eq!(children(&arena, sum).as_slice(), &[a, b]);
}

#[test]
fn try_children_follow_execution_order() {
    let mut arena = Arena::new();
    let body = arena.unit();
    let filter = arena.bool(true);
    let handler = arena.unit();
    let fin = arena.unit();
    let catch = CatchBlock {
        test: Ty::EXCEPTION,
        variable: None,
        filter: Some(filter),
        body: handler,
    };
    let node = arena.try_node(body, &[catch], Some(fin), None).unwrap();
    assert_eq!(children(&arena, node).as_slice(), &[body, filter, handler, fin]);
}

#[test]
fn any_node_stops_at_unit_boundaries() {
    let mut arena = Arena::new();
    let target = arena.new_label(Name::EMPTY, Ty::Int);
    let one = arena.int(1);
    let inner_yield = arena.yield_value(target, one).unwrap();
    let lambda = arena.lambda(Name::EMPTY, &[], inner_yield);
    let outer = arena.block(&[], &[lambda]);

    let mut is_yield = |_: NodeId, kind: NodeKind| matches!(kind, NodeKind::Yield { .. });
    assert!(!any_node(&arena, outer, false, &mut is_yield));
    assert!(any_node(&arena, outer, true, &mut is_yield));
}

#[test]
fn visitor_reaches_every_node() {
    struct Count(usize);
    impl Visitor for Count {
        fn visit_node(&mut self, arena: &Arena, id: NodeId) {
            self.0 += 1;
            walk_node(self, arena, id);
        }
    }

    let mut arena = Arena::new();
    let a = arena.int(1);
    let b = arena.int(2);
    let sum = arena.binary(BinaryOp::Add, a, b).unwrap();
    let block = arena.block(&[], &[sum]);
    let mut count = Count(0);
    count.visit_node(&arena, block);
    assert_eq!(count.0, 4);
}
