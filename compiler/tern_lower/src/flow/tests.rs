use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tern_eval::{ExceptionValue, Interpreter, Value};
use tern_ir::{Arena, CatchBlock, LabelId, NodeId, StringInterner, Ty};

use crate::{lower, LowerError, LowerOptions, Unsupported};

const HOSTS: [&str; 9] = [
    "a", "b", "side", "done", "fin", "outer", "other", "after", "skipped",
];

struct Fixture {
    arena: Arena,
    interner: StringInterner,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            arena: Arena::new(),
            interner: StringInterner::new(),
            log: Rc::default(),
        }
    }

    fn call(&mut self, name: &str) -> NodeId {
        let func = self.interner.intern(name);
        self.arena.call(func, &[], Ty::Void)
    }

    fn label(&mut self, name: &str, ty: Ty) -> LabelId {
        let name = self.interner.intern(name);
        self.arena.new_label(name, ty)
    }

    fn goto(&mut self, label: LabelId) -> NodeId {
        self.arena.goto(label, None).unwrap()
    }

    fn mark(&mut self, label: LabelId) -> NodeId {
        self.arena.label_node(label, None).unwrap()
    }

    fn seq(&mut self, items: &[NodeId]) -> NodeId {
        self.arena.void_block(&[], items)
    }

    fn try_finally(&mut self, body: &[NodeId], finally: &[NodeId]) -> NodeId {
        let body = self.seq(body);
        let finally = self.seq(finally);
        self.arena.try_finally(body, finally).unwrap()
    }

    /// `try { body } catch {}`
    fn swallow(&mut self, body: &[NodeId]) -> NodeId {
        let body = self.seq(body);
        let empty = self.seq(&[]);
        let handler = CatchBlock {
            test: Ty::EXCEPTION,
            variable: None,
            filter: None,
            body: empty,
        };
        self.arena.try_catch(body, &[handler]).unwrap()
    }

    /// `if (false) goto label`
    fn never_goto(&mut self, label: LabelId) -> NodeId {
        let never = self.arena.bool(false);
        let jump = self.goto(label);
        self.arena.if_then_else(never, jump, None).unwrap()
    }

    fn lower_unit(&mut self, body: NodeId) -> Result<NodeId, LowerError> {
        let unit = self.arena.finally_flow_control(body);
        let options = LowerOptions::default().with_validation(true);
        lower(&mut self.arena, &self.interner, unit, options)
    }

    fn interpreter(&self) -> Interpreter<'_> {
        let mut interp = Interpreter::new(&self.arena, &self.interner);
        for name in HOSTS {
            let log = Rc::clone(&self.log);
            interp.define_host(name, move |_| {
                log.borrow_mut().push(name);
                Ok(Value::Unit)
            });
        }
        interp.define_host("fail", |_| Err(ExceptionValue::new(None, "raised")));
        interp
    }

    fn run(&self, root: NodeId) -> Value {
        let mut interp = self.interpreter();
        interp.eval(root).unwrap()
    }
}

#[test]
fn jump_out_of_try_body_keeps_the_tree() {
    // try { goto L } finally { side() }  L: done()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let jump = f.goto(l);
    let side = f.call("side");
    let protected = f.try_finally(&[jump], &[side]);
    let mark = f.mark(l);
    let done = f.call("done");
    let body = f.seq(&[protected, mark, done]);

    let lowered = f.lower_unit(body).unwrap();
    assert_eq!(lowered, body);
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["side", "done"]);
}

#[test]
fn jump_out_of_finally_goes_through_the_dispatch() {
    // try { a() } finally { fin(); goto L; after() }  skipped()  L: done()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let a = f.call("a");
    let fin = f.call("fin");
    let jump = f.goto(l);
    let after = f.call("after");
    let protected = f.try_finally(&[a], &[fin, jump, after]);
    let skipped = f.call("skipped");
    let mark = f.mark(l);
    let done = f.call("done");
    let body = f.seq(&[protected, skipped, mark, done]);

    let lowered = f.lower_unit(body).unwrap();
    assert_ne!(lowered, body);
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["a", "fin", "done"]);
}

#[test]
fn unlowered_jump_out_of_finally_fails_validation() {
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let a = f.call("a");
    let jump = f.goto(l);
    let protected = f.try_finally(&[a], &[jump]);
    let mark = f.mark(l);
    let body = f.seq(&[protected, mark]);

    let options = LowerOptions::default().with_validation(true);
    assert_eq!(
        lower(&mut f.arena, &f.interner, body, options),
        Err(LowerError::JumpOutOfFinally { label: l })
    );
}

#[test]
fn jump_value_survives_the_dispatch() {
    // { try { a() } finally { goto L(7) }; L: 5 }
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Int);
    let a = f.call("a");
    let seven = f.arena.int(7);
    let jump = f.arena.goto(l, Some(seven)).unwrap();
    let protected = f.try_finally(&[a], &[jump]);
    let five = f.arena.int(5);
    let mark = f.arena.label_node(l, Some(five)).unwrap();
    let body = f.arena.block(&[], &[protected, mark]);

    let lowered = f.lower_unit(body).unwrap();
    assert_eq!(f.run(lowered), Value::Int(7));
}

#[test]
fn nested_finally_forwards_one_level_at_a_time() {
    // try { try { a() } finally { fin(); goto L }; b() } finally { outer() }
    // L: done()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let a = f.call("a");
    let fin = f.call("fin");
    let jump = f.goto(l);
    let inner = f.try_finally(&[a], &[fin, jump]);
    let b = f.call("b");
    let outer_fin = f.call("outer");
    let outer = f.try_finally(&[inner, b], &[outer_fin]);
    let mark = f.mark(l);
    let done = f.call("done");
    let body = f.seq(&[outer, mark, done]);

    let lowered = f.lower_unit(body).unwrap();
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["a", "fin", "outer", "done"]);
}

#[test]
fn outer_finally_jump_overrides_the_pending_one() {
    // try { try { a() } finally { fin(); goto L } } finally { outer(); goto M }
    // L: done()  M: other()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let m = f.label("M", Ty::Void);
    let a = f.call("a");
    let fin = f.call("fin");
    let to_l = f.goto(l);
    let inner = f.try_finally(&[a], &[fin, to_l]);
    let outer_fin = f.call("outer");
    let to_m = f.goto(m);
    let outer = f.try_finally(&[inner], &[outer_fin, to_m]);
    let mark_l = f.mark(l);
    let done = f.call("done");
    let mark_m = f.mark(m);
    let other = f.call("other");
    let body = f.seq(&[outer, mark_l, done, mark_m, other]);

    let lowered = f.lower_unit(body).unwrap();
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["a", "fin", "outer", "other"]);
}

#[test]
fn jump_out_of_fault_goes_through_the_dispatch() {
    // try { fail() } fault { fin(); goto L }  L: done()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let fail = f.call("fail");
    let body = f.seq(&[fail]);
    let fin = f.call("fin");
    let jump = f.goto(l);
    let fault = f.seq(&[fin, jump]);
    let protected = f.arena.try_fault(body, fault).unwrap();
    let mark = f.mark(l);
    let done = f.call("done");
    let root = f.seq(&[protected, mark, done]);

    let lowered = f.lower_unit(root).unwrap();
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["fin", "done"]);
}

#[test]
fn taken_jump_drops_the_pending_exception() {
    // try { fail() } finally { goto L }  L: done()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let fail = f.call("fail");
    let jump = f.goto(l);
    let protected = f.try_finally(&[fail], &[jump]);
    let mark = f.mark(l);
    let done = f.call("done");
    let body = f.seq(&[protected, mark, done]);

    let lowered = f.lower_unit(body).unwrap();
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["done"]);
}

#[test]
fn untaken_jump_rethrows_the_pending_exception() {
    // try { fail() } finally { if (false) goto L }  L: done()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let fail = f.call("fail");
    let never = f.arena.bool(false);
    let jump = f.goto(l);
    let maybe = f.arena.if_then_else(never, jump, None).unwrap();
    let protected = f.try_finally(&[fail], &[maybe]);
    let mark = f.mark(l);
    let done = f.call("done");
    let body = f.seq(&[protected, mark, done]);

    let lowered = f.lower_unit(body).unwrap();
    let mut interp = f.interpreter();
    assert!(interp.eval(lowered).is_err());
    assert!(f.log.borrow().is_empty());
}

#[test]
fn exception_from_a_finally_abandons_its_pending_jump() {
    // try { try { goto A } finally { fail(); if (false) goto B } } catch {}
    // try { a() } finally { if (false) goto A }
    // other()  A: done()  B: skipped()
    let mut f = Fixture::new();
    let a_label = f.label("A", Ty::Void);
    let b_label = f.label("B", Ty::Void);
    let to_a = f.goto(a_label);
    let fail = f.call("fail");
    let maybe_b = f.never_goto(b_label);
    let inner = f.try_finally(&[to_a], &[fail, maybe_b]);
    let first = f.swallow(&[inner]);
    let a = f.call("a");
    let maybe_a = f.never_goto(a_label);
    let second = f.try_finally(&[a], &[maybe_a]);
    let other = f.call("other");
    let mark_a = f.mark(a_label);
    let done = f.call("done");
    let mark_b = f.mark(b_label);
    let skipped = f.call("skipped");
    let body = f.seq(&[first, second, other, mark_a, done, mark_b, skipped]);

    let lowered = f.lower_unit(body).unwrap();
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["a", "other", "done", "skipped"]);
}

#[test]
fn exception_caught_inside_a_finally_keeps_the_outer_jump() {
    // try { goto L } finally {
    //     try { try {} finally { fail(); if (false) goto M } } catch {}
    //     fin()
    // }
    // M: skipped()  L: done()
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let m = f.label("M", Ty::Void);
    let to_l = f.goto(l);
    let fail = f.call("fail");
    let maybe_m = f.never_goto(m);
    let inner = f.try_finally(&[], &[fail, maybe_m]);
    let caught = f.swallow(&[inner]);
    let fin = f.call("fin");
    let outer = f.try_finally(&[to_l], &[caught, fin]);
    let mark_m = f.mark(m);
    let skipped = f.call("skipped");
    let mark_l = f.mark(l);
    let done = f.call("done");
    let body = f.seq(&[outer, mark_m, skipped, mark_l, done]);

    let lowered = f.lower_unit(body).unwrap();
    f.run(lowered);
    assert_eq!(*f.log.borrow(), vec!["fin", "done"]);
}

#[test]
fn forwarding_from_a_valued_try_is_rejected() {
    let mut f = Fixture::new();
    let l = f.label("L", Ty::Void);
    let one = f.arena.int(1);
    let jump = f.goto(l);
    let finally = f.seq(&[jump]);
    let protected = f.arena.try_finally(one, finally).unwrap();
    let mark = f.mark(l);
    let body = f.seq(&[protected, mark]);

    assert_eq!(
        f.lower_unit(body),
        Err(Unsupported::NonVoidTryWithFlow.into())
    );
}

// ── Trees without jumps out of cleanup bodies ───────────────────────

#[derive(Clone, Debug)]
enum Shape {
    Call,
    /// Jump to the label closing the root block.
    Exit,
    Block(Vec<Shape>),
    If(Box<Shape>, Box<Shape>),
    TryFinally(Box<Shape>, Box<Shape>),
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![Just(Shape::Call), Just(Shape::Exit)];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Shape::Block),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Shape::If(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Shape::TryFinally(Box::new(a), Box::new(b))),
        ]
    })
}

/// Build `shape`; exits inside a finally become plain calls.
fn build(f: &mut Fixture, shape: &Shape, exit: LabelId, in_finally: bool) -> NodeId {
    match shape {
        Shape::Call => f.call("a"),
        Shape::Exit if in_finally => f.call("a"),
        Shape::Exit => f.goto(exit),
        Shape::Block(items) => {
            let items: Vec<NodeId> = items
                .iter()
                .map(|item| build(f, item, exit, in_finally))
                .collect();
            f.seq(&items)
        }
        Shape::If(then_shape, else_shape) => {
            let test = f.arena.bool(true);
            let then_branch = build(f, then_shape, exit, in_finally);
            let else_branch = build(f, else_shape, exit, in_finally);
            f.arena
                .if_then_else(test, then_branch, Some(else_branch))
                .unwrap()
        }
        Shape::TryFinally(body, finally) => {
            let body = build(f, body, exit, in_finally);
            let finally = build(f, finally, exit, true);
            let body = f.seq(&[body]);
            let finally = f.seq(&[finally]);
            f.arena.try_finally(body, finally).unwrap()
        }
    }
}

proptest! {
    #[test]
    fn unit_without_cleanup_jumps_is_unchanged(shape in shape_strategy()) {
        let mut f = Fixture::new();
        let exit = f.label("exit", Ty::Void);
        let tree = build(&mut f, &shape, exit, false);
        let mark = f.mark(exit);
        let body = f.seq(&[tree, mark]);

        let lowered = f.lower_unit(body).unwrap();
        prop_assert_eq!(lowered, body);
    }
}
