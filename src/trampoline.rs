//! The iterative frame evaluator and the `Expr` combinator surface.
//!
//! `eval_frames` is one tight loop over a `(current, frame)` pair,
//! parameterized by a [`FrameProcessor`]. Three processors share it: the
//! handler-driven processor here (`handle_expr` / `run_pure`), the stepper
//! in [`step`](crate::step), and the reflect processor in
//! [`bridge`](crate::bridge). The processor type is known at
//! monomorphization time, so its calls devirtualize.
//!
//! Each iteration has two phases: chain flattening (left-nested chains are
//! rotated right to keep the left spine short) and a single direct step.
//! Pooled nodes are returned to their pool as their fields are extracted,
//! before any new node is built from those fields.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::effect::{Dispatch, Handler, Operation};
use crate::fault::{self, Fault};
use crate::frame::{recover, BindFrame, Expr, Frame, MapFrame, ResumeFn, Shared, ThenFrame};
use crate::pool;

/// One evaluation strategy plugged into [`eval_frames`].
pub(crate) trait FrameProcessor<R> {
    /// Reacts to a suspended effect operation. `rest` is the remaining
    /// chain after the effect frame (already folded with the frame's own
    /// `next`).
    fn process_effect(&mut self, op: Operation, resume: ResumeFn, rest: Frame) -> EffectStep<R>;

    /// Produces the final answer from the accumulated value.
    fn process_return(&mut self, current: Option<Shared>) -> R;
}

/// The outcome of [`FrameProcessor::process_effect`].
pub(crate) enum EffectStep<R> {
    /// Keep evaluating with a new `(current, frame)` pair.
    Resume { current: Option<Shared>, frame: Frame },
    /// Exit the loop with the given result.
    Finish(R),
}

/// Links two frame chains together.
///
/// Identity elision is mandatory: `Return` is the identity element of frame
/// composition, so either operand being `Return` yields the other operand
/// with no allocation. Construction is O(1) in all cases.
pub fn chain_frames(first: Frame, second: Frame) -> Frame {
    match (first, second) {
        (Frame::Return, s) => s,
        (f, Frame::Return) => f,
        (f, s) => Frame::Chain(crate::frame::ChainNode::new(f, s)),
    }
}

/// `chain_frames` for interpreter splices: the node comes from the chain
/// pool and is released when consumed.
pub(crate) fn chain_pooled(first: Frame, second: Frame) -> Frame {
    match (first, second) {
        (Frame::Return, s) => s,
        (f, Frame::Return) => f,
        (f, s) => Frame::Chain(pool::acquire_chain(f, s)),
    }
}

fn take_current(current: &mut Option<Shared>) -> Shared {
    current.take().expect("missing intermediate value at frame boundary")
}

/// The unified iterative evaluator for frame chains.
pub(crate) fn eval_frames<R, P: FrameProcessor<R>>(
    mut current: Option<Shared>,
    mut frame: Frame,
    processor: &mut P,
) -> R {
    loop {
        // Phase 1: flatten chained frames.
        while let Frame::Chain(node) = frame {
            let (first, rest) = node.consume();
            match first {
                Frame::Chain(inner) => {
                    // Rotate left-nested chains right to keep the spine short.
                    let (inner_first, inner_rest) = inner.consume();
                    frame = chain_pooled(inner_first, chain_pooled(inner_rest, rest));
                }
                Frame::Return => frame = rest,
                Frame::Bind(b) => {
                    let (f, next) = b.consume();
                    let e = f(take_current(&mut current));
                    current = e.value;
                    frame = chain_pooled(chain_pooled(e.frame, next), rest);
                }
                Frame::Map(m) => {
                    let MapFrame { f, next } = *m;
                    current = Some(f(take_current(&mut current)));
                    frame = chain_pooled(next, rest);
                }
                Frame::Then(t) => {
                    let (second, next) = t.consume();
                    current = second.value;
                    frame = chain_pooled(chain_pooled(second.frame, next), rest);
                }
                Frame::Effect(ef) => {
                    let (op, resume, next) = ef.consume();
                    match processor.process_effect(op, resume, chain_pooled(next, rest)) {
                        EffectStep::Resume { current: c, frame: f } => {
                            current = c;
                            frame = f;
                        }
                        EffectStep::Finish(r) => return r,
                    }
                }
                Frame::Unwind(u) => {
                    let (d1, d2, d3, reduce) = u.consume();
                    let (c, next) = reduce(d1, d2, d3, current.take());
                    current = c;
                    frame = chain_pooled(next, rest);
                }
                Frame::User(u) => match u.unwind(current.take()) {
                    Some((c, next)) => {
                        current = c;
                        frame = chain_pooled(next, rest);
                    }
                    None => fault::raise(Fault::UnknownFrameInChain),
                },
            }
        }

        // Phase 2: a single direct step.
        match frame {
            Frame::Return => return processor.process_return(current),
            Frame::Bind(b) => {
                let (f, next) = b.consume();
                let e = f(take_current(&mut current));
                current = e.value;
                frame = chain_pooled(e.frame, next);
            }
            Frame::Map(m) => {
                let MapFrame { f, next } = *m;
                current = Some(f(take_current(&mut current)));
                frame = next;
            }
            Frame::Then(t) => {
                let (second, next) = t.consume();
                current = second.value;
                frame = chain_pooled(second.frame, next);
            }
            Frame::Effect(ef) => {
                let (op, resume, next) = ef.consume();
                match processor.process_effect(op, resume, next) {
                    EffectStep::Resume { current: c, frame: f } => {
                        current = c;
                        frame = f;
                    }
                    EffectStep::Finish(r) => return r,
                }
            }
            Frame::Unwind(u) => {
                let (d1, d2, d3, reduce) = u.consume();
                let (c, next) = reduce(d1, d2, d3, current.take());
                current = c;
                frame = next;
            }
            Frame::User(u) => match u.unwind(current.take()) {
                Some((c, next)) => {
                    current = c;
                    frame = next;
                }
                None => fault::raise(Fault::UnknownFrame),
            },
            Frame::Chain(_) => unreachable!("phase 1 flattens all Chain frames before phase 2"),
        }
    }
}

/// Releases a chain that will not be evaluated, returning every pooled node
/// it contains. Iterative, so arbitrarily deep chains cannot overflow the
/// stack.
pub(crate) fn drain(frame: Frame) {
    let mut work = vec![frame];
    while let Some(f) = work.pop() {
        match f {
            Frame::Return | Frame::User(_) => {}
            Frame::Bind(b) => {
                let (_, next) = b.consume();
                work.push(next);
            }
            Frame::Map(m) => work.push(m.next),
            Frame::Then(t) => {
                let (second, next) = t.consume();
                work.push(second.frame);
                work.push(next);
            }
            Frame::Effect(e) => {
                let (_, _, next) = e.consume();
                work.push(next);
            }
            Frame::Chain(c) => {
                let (first, rest) = c.consume();
                work.push(first);
                work.push(rest);
            }
            Frame::Unwind(u) => {
                u.consume();
            }
        }
    }
}

/// Adapts a [`Handler`] for `eval_frames`.
struct HandlerProcessor<'h, R, H> {
    handler: &'h mut H,
    empty: fn() -> R,
}

impl<R: Any + Clone, H: Handler<R>> FrameProcessor<R> for HandlerProcessor<'_, R, H> {
    fn process_effect(&mut self, op: Operation, resume: ResumeFn, rest: Frame) -> EffectStep<R> {
        match self.handler.dispatch(&*op) {
            Dispatch::Resume(v) => EffectStep::Resume { current: Some(resume(v)), frame: rest },
            Dispatch::Abort(v) => {
                drain(rest);
                EffectStep::Finish(*v.downcast::<R>().expect("handler answer type mismatch"))
            }
        }
    }

    fn process_return(&mut self, current: Option<Shared>) -> R {
        match current {
            Some(v) => recover::<R>(v),
            None => (self.empty)(),
        }
    }
}

/// Evaluates a defunctionalized computation under an effect handler.
///
/// The `Expr` counterpart of [`handle`](crate::effect::handle): frames are
/// processed iteratively without stack growth, and each [`EffectFrame`]
/// operation is dispatched to the handler.
///
/// [`EffectFrame`]: crate::frame::EffectFrame
pub fn handle_expr<R: Any + Clone + Default, H: Handler<R>>(m: Expr<R>, mut h: H) -> R {
    handle_expr_with(m, &mut h, R::default)
}

/// `handle_expr` with an explicit empty-completion fallback.
pub(crate) fn handle_expr_with<R: Any + Clone, H: Handler<R>>(
    m: Expr<R>,
    h: &mut H,
    empty: fn() -> R,
) -> R {
    let m = m.erase();
    eval_frames(m.value, m.frame, &mut HandlerProcessor { handler: h, empty })
}

/// The sentinel handler for [`Expr::run_pure`]: any effect operation in a
/// supposedly pure computation is a bug.
struct PureEval<R>(PhantomData<fn() -> R>);

impl<R> Handler<R> for PureEval<R> {
    fn dispatch(&mut self, _op: &dyn Any) -> Dispatch {
        fault::unhandled_effect("run_pure");
    }
}

impl<A: Any> Expr<A> {
    /// Evaluates a pure computation to completion.
    ///
    /// Iterative: frames are processed one step per loop iteration, so
    /// arbitrarily deep chains complete without stack growth.
    ///
    /// Panics with the unhandled-effect fault if the computation contains
    /// an effect frame; use [`handle_expr`] for computations with effects.
    pub fn run_pure(self) -> A
    where
        A: Clone + Default,
    {
        handle_expr_with(self, &mut PureEval(PhantomData), A::default)
    }

    /// Sequences this computation with `f` (monadic bind).
    ///
    /// If the computation has already completed, `f` is applied eagerly;
    /// otherwise a bind frame is spliced onto the chain.
    pub fn bind<B: Any>(self, f: impl Fn(A) -> Expr<B> + 'static) -> Expr<B>
    where
        A: Clone,
    {
        match self {
            Expr { value: Some(a), frame: Frame::Return } => f(a),
            Expr { value: _, frame } => {
                let f = Rc::new(f);
                let bind = BindFrame::new(
                    Rc::new(move |a: Shared| f(recover::<A>(a)).erase()),
                    Frame::Return,
                );
                Expr { value: None, frame: chain_frames(frame, Frame::Bind(bind)) }
            }
        }
    }

    /// Transforms the result with a pure function.
    ///
    /// Applied eagerly when the computation has already completed.
    pub fn map<B: Any>(self, f: impl Fn(A) -> B + 'static) -> Expr<B>
    where
        A: Clone,
    {
        match self {
            Expr { value: Some(a), frame: Frame::Return } => Expr::of(f(a)),
            Expr { value: _, frame } => {
                let f = Rc::new(f);
                let map = MapFrame::new(
                    Rc::new(move |a: Shared| -> Shared { Rc::new(f(recover::<A>(a))) }),
                    Frame::Return,
                );
                Expr { value: None, frame: chain_frames(frame, Frame::Map(map)) }
            }
        }
    }

    /// Sequences this computation before `n`, discarding this result.
    ///
    /// If the computation has already completed, `n` is substituted
    /// directly.
    pub fn then<B: Any>(self, n: Expr<B>) -> Expr<B> {
        match self {
            Expr { value: Some(_), frame: Frame::Return } => n,
            Expr { value: _, frame } => {
                let then = ThenFrame::new(n.erase(), Frame::Return);
                Expr { value: None, frame: chain_frames(frame, Frame::Then(then)) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{UnwindFrame, UserFrame};

    #[test]
    fn test_run_pure_completed() {
        assert_eq!(Expr::of(42).run_pure(), 42);
    }

    #[test]
    fn test_bind_eager_on_completed() {
        let e = Expr::of(20).bind(|a| Expr::of(a + 22));
        assert!(e.is_complete());
        assert_eq!(e.run_pure(), 42);
    }

    #[test]
    fn test_map_then_chain() {
        let e = Expr::of(1)
            .map(|a| a + 1)
            .then(Expr::of(10))
            .bind(|a: i32| Expr::of(a * 2));
        assert_eq!(e.run_pure(), 20);
    }

    #[test]
    fn test_chain_identity_elision() {
        let m = Frame::Map(MapFrame::new(Rc::new(|v| v), Frame::Return));
        assert!(matches!(chain_frames(Frame::Return, Frame::Return), Frame::Return));
        assert!(matches!(
            chain_frames(m.clone(), Frame::Return),
            Frame::Map(_)
        ));
        assert!(matches!(chain_frames(Frame::Return, m), Frame::Map(_)));
    }

    /// A computation equivalent to `Expr::of(0)` whose frame chain is not
    /// yet `Return`, so combinators build real frames instead of taking
    /// the eager pure path.
    fn deferred_zero() -> Expr<u64> {
        Expr::suspended(Frame::Then(ThenFrame::new(Expr::of(0u64).erase(), Frame::Return)))
    }

    #[test]
    fn test_deferred_seed_evaluates() {
        assert_eq!(deferred_zero().run_pure(), 0);
    }

    #[test]
    fn test_deep_chain_is_stack_safe() {
        let mut e = deferred_zero();
        for _ in 0..10_000 {
            e = e.bind(|a| Expr::of(a + 1));
        }
        assert!(!e.is_complete());
        assert_eq!(e.run_pure(), 10_000);
    }

    #[test]
    fn test_deep_map_chain_is_stack_safe() {
        let mut e = deferred_zero();
        for _ in 0..10_000 {
            e = e.map(|a| a + 1);
        }
        assert_eq!(e.run_pure(), 10_000);
    }

    #[test]
    fn test_pool_balanced_after_evaluation() {
        let before = pool::stats();
        let mut e = deferred_zero();
        for _ in 0..100 {
            e = e.bind(|a| Expr::of(a + 1)).map(|a| a + 1);
        }
        assert_eq!(e.run_pure(), 200);
        let after = pool::stats();
        assert_eq!(after.outstanding(), before.outstanding());
    }

    #[test]
    fn test_unwind_frame_reduces() {
        fn add_payload(
            d1: crate::frame::UnwindData,
            _d2: crate::frame::UnwindData,
            _d3: crate::frame::UnwindData,
            current: Option<Shared>,
        ) -> (Option<Shared>, Frame) {
            let base = recover::<i32>(current.expect("unwind step needs a value"));
            let bump = recover::<i32>(d1.expect("payload"));
            (Some(Rc::new(base + bump)), Frame::Return)
        }
        let frame = Frame::Unwind(UnwindFrame::new(
            Some(Rc::new(2i32)),
            None,
            None,
            add_payload,
        ));
        let e: Expr<i32> = Expr { value: Some(40), frame };
        assert_eq!(e.run_pure(), 42);
    }

    struct Opaque;
    impl UserFrame for Opaque {}

    #[test]
    #[should_panic(expected = "delimit: unknown frame variant")]
    fn test_user_frame_without_unwind_panics() {
        let e: Expr<i32> = Expr { value: Some(1), frame: Frame::User(Rc::new(Opaque)) };
        e.run_pure();
    }

    #[test]
    #[should_panic(expected = "delimit: unknown frame variant in chain")]
    fn test_user_frame_without_unwind_in_chain_panics() {
        let chained = chain_frames(
            Frame::User(Rc::new(Opaque)),
            Frame::Map(MapFrame::new(Rc::new(|v| v), Frame::Return)),
        );
        let e: Expr<i32> = Expr { value: Some(1), frame: chained };
        e.run_pure();
    }

    struct AddTen;
    impl UserFrame for AddTen {
        fn unwind(&self, current: Option<Shared>) -> Option<(Option<Shared>, Frame)> {
            let v = *current?.downcast::<i32>().ok()?;
            Some((Some(Rc::new(v + 10)), Frame::Return))
        }
    }

    #[test]
    fn test_user_frame_with_unwind_reduces() {
        let e: Expr<i32> = Expr { value: Some(32), frame: Frame::User(Rc::new(AddTen)) };
        assert_eq!(e.run_pure(), 42);
    }

    #[test]
    fn test_pooled_acquire_apis_evaluate_and_release() {
        let before = pool::stats();
        // A hand-built single-use chain: bind(+1) after a pooled then.
        let mut bind = pool::acquire_bind_frame();
        bind.f = Some(Rc::new(|v: Shared| Expr::of(recover::<i32>(v) + 1).erase()));
        let mut then = pool::acquire_then_frame();
        then.second = Some(Expr::of(41i32).erase());
        then.next = Frame::Bind(bind);
        let e: Expr<i32> = Expr { value: Some(0), frame: Frame::Then(then) };
        assert_eq!(e.run_pure(), 42);
        let after = pool::stats();
        assert_eq!(after.outstanding(), before.outstanding());
    }

    #[test]
    fn test_evaluation_order_left_to_right() {
        use std::cell::RefCell;
        let order: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let o2 = Rc::clone(&order);
        let e = deferred_zero()
            .bind(move |a| {
                o1.borrow_mut().push(1);
                Expr::of(a)
            })
            .bind(move |a| {
                o2.borrow_mut().push(2);
                Expr::of(a)
            });
        // Neither bind ran at construction time.
        assert!(order.borrow().is_empty());
        assert_eq!(e.run_pure(), 0);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }
}
