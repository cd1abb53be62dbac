//! Bridge between the closure and frame representations.
//!
//! [`reify`] turns a closure-encoded computation into a frame chain;
//! [`reflect`] turns a frame chain back into closures. Both directions are
//! eager for pure computations and lazy for effectful ones: each effect
//! step is translated on demand as the receiving world evaluates it. The
//! round trips preserve semantics — the same final value, the same
//! observable effect sequence, the same handler interaction.
//!
//! The names follow Filinski (1994): *reify* converts a semantic value
//! (functional representation) into its syntactic representation (data);
//! *reflect* goes the other way.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::cont::{Cont, ContFn, Eff};
use crate::effect::{to_resumed, Erased, Operation, Resumed};
use crate::fault::{self, Fault};
use crate::frame::{recover, take_unique, BindFrame, EffectFrame, Expr, Frame, ResumeFn, Shared};
use crate::marker::{ClosureMarker, Suspended};
use crate::trampoline::{eval_frames, EffectStep, FrameProcessor};

/// Converts a closure-based effectful computation into a frame chain.
///
/// Pure computations convert eagerly into a completed [`Expr`]. An
/// effectful computation becomes an effect frame whose resume feeds the
/// handler's reply back into the original suspension, followed by a bind
/// frame that converts the next step on demand.
///
/// The resulting `Expr` inherits the affinity of the underlying
/// suspensions: evaluating it (or a clone of it) more than once resumes a
/// consumed suspension and aborts with the resumed-twice fault.
pub fn reify<A: Any + Default>(m: Eff<A>) -> Expr<A> {
    from_resumed(m.call(to_resumed::<A>()))
}

/// Converts a classified step of a closure computation into an `Expr`.
fn from_resumed<A: Any + Default>(r: Resumed) -> Expr<A> {
    use crate::effect::ResumedState;
    match r.0 {
        ResumedState::Empty => Expr::of(A::default()),
        ResumedState::Value(v) => {
            Expr::of(*v.downcast::<A>().expect("final value type mismatch"))
        }
        ResumedState::Suspended(s) => {
            let op = s.operation();
            let slot = RefCell::new(Some(s));
            let resume: ResumeFn = Rc::new(move |v: Erased| -> Shared {
                let s = slot
                    .borrow_mut()
                    .take()
                    .unwrap_or_else(|| fault::raise(Fault::ResumedTwice));
                Rc::new(s.resume(v))
            });
            let convert = BindFrame::new(
                Rc::new(move |v: Shared| from_resumed::<A>(take_unique::<Resumed>(v)).erase()),
                Frame::Return,
            );
            Expr::suspended(Frame::Effect(EffectFrame::new(
                op,
                resume,
                Frame::Bind(convert),
            )))
        }
    }
}

/// Converts a frame chain back into a closure-based computation.
///
/// The resulting computation can be used with
/// [`handle`](crate::effect::handle), [`run_state`](crate::state::run_state),
/// and every other closure-world runner. At each effect frame a synthetic
/// suspension is emitted whose resume re-enters the frame evaluator; at the
/// return frame the caller's final continuation is applied.
pub fn reflect<A: Any + Clone + Default>(m: Expr<A>) -> Eff<A> {
    Cont::suspend(move |k: ContFn<A, Resumed>| {
        let e = m.clone().erase();
        eval_frames(e.value, e.frame, &mut ReflectProcessor { k })
    })
}

/// Converts effect frames to synthetic closure-world suspensions and
/// applies the final continuation at the return frame.
struct ReflectProcessor<A> {
    k: ContFn<A, Resumed>,
}

impl<A: Any + Clone + Default> FrameProcessor<Resumed> for ReflectProcessor<A> {
    fn process_effect(&mut self, op: Operation, resume: ResumeFn, rest: Frame) -> EffectStep<Resumed> {
        let k = Rc::clone(&self.k);
        EffectStep::Finish(Resumed::suspended(Suspended::Closure(ClosureMarker {
            op,
            k: Box::new(move |v: Erased| {
                eval_frames(Some(resume(v)), rest, &mut ReflectProcessor { k })
            }),
        })))
    }

    fn process_return(&mut self, current: Option<Shared>) -> Resumed {
        match current {
            Some(v) => (self.k)(recover::<A>(v)),
            None => (self.k)(A::default()),
        }
    }
}
