//! Stepping boundary for external drivers.
//!
//! [`step`]/[`step_expr`] provide shallow one-effect-at-a-time evaluation,
//! unlike [`handle`](crate::effect::handle)/[`handle_expr`](crate::trampoline::handle_expr)
//! which run a synchronous trampoline to completion. Each [`Suspension`]
//! carries the pending operation and a one-shot resumption handle; driving
//! code inspects the operation, chooses a reply, and resumes — or discards
//! the suspension to cooperatively cancel the computation.
//!
//! Suspensions enforce affine semantics: at most one of `resume`, a
//! successful `try_resume`, or `discard` succeeds, guarded by an atomic
//! counter so the guarantee holds even under concurrent attempts.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cont::Eff;
use crate::effect::{to_resumed, Erased, Operation, Resumed, ResumedState};
use crate::fault::{self, Fault, DISCARD_MARK};
use crate::frame::{recover, Expr, Frame, ResumeFn, Shared};
use crate::marker::Suspended;
use crate::trampoline::{drain, eval_frames, EffectStep, FrameProcessor};

/// The outcome of driving a computation one step.
#[derive(Debug)]
pub enum StepResult<A> {
    /// The computation completed with a value.
    Done(A),
    /// The computation is suspended on an effect operation.
    Pending(Suspension<A>),
}

impl<A> StepResult<A> {
    /// The completed value, if the computation finished.
    pub fn done(self) -> Option<A> {
        match self {
            StepResult::Done(a) => Some(a),
            StepResult::Pending(_) => None,
        }
    }

    /// The suspension, if the computation is pending.
    pub fn pending(self) -> Option<Suspension<A>> {
        match self {
            StepResult::Done(_) => None,
            StepResult::Pending(s) => Some(s),
        }
    }
}

/// A computation suspended on an effect operation.
///
/// Holds the pending operation and the state needed to advance exactly one
/// more step in whichever representation the computation uses.
pub struct Suspension<A> {
    used: AtomicUsize,
    op: Operation,
    work: RefCell<Option<Work>>,
    _answer: PhantomData<fn() -> A>,
}

enum Work {
    /// Closure world: resume through the suspension marker.
    Cont(Suspended),
    /// Frame world: resume the effect frame, then re-enter the evaluator.
    Frames { resume: ResumeFn, rest: Frame },
}

impl<A: Any + Clone + Default> Suspension<A> {
    /// The effect operation that caused the suspension.
    pub fn op(&self) -> &dyn Any {
        &*self.op
    }

    /// Advances the computation with the given reply.
    ///
    /// Returns the completed value or the next suspension. Panics with the
    /// resumed-twice fault if this suspension was already consumed, or the
    /// resumed-after-discard fault if it was discarded.
    ///
    /// The reply is erased internally; a reply that is already a
    /// `Box<dyn Any>` must go through [`resume_boxed`](Self::resume_boxed)
    /// instead, or it arrives double-boxed.
    pub fn resume<V: Any>(&self, v: V) -> StepResult<A> {
        self.resume_boxed(Box::new(v))
    }

    /// [`resume`](Self::resume) for an already-erased reply, such as the
    /// value carried by a [`Dispatch::Resume`](crate::effect::Dispatch).
    pub fn resume_boxed(&self, v: Erased) -> StepResult<A> {
        match self.used.fetch_add(1, Ordering::AcqRel) {
            0 => self.advance(v),
            n if n >= DISCARD_MARK => fault::raise(Fault::ResumedAfterDiscard),
            _ => fault::raise(Fault::ResumedTwice),
        }
    }

    /// Non-panicking variant of [`resume`](Self::resume).
    ///
    /// Returns `None` if the suspension was already consumed or discarded.
    pub fn try_resume<V: Any>(&self, v: V) -> Option<StepResult<A>> {
        match self.used.fetch_add(1, Ordering::AcqRel) {
            0 => Some(self.advance(Box::new(v))),
            _ => None,
        }
    }

    /// Marks the suspension as consumed without resuming it.
    ///
    /// The computation simply ceases to advance; pooled resources held by
    /// the suspended chain are returned.
    pub fn discard(&self) {
        self.used.store(DISCARD_MARK, Ordering::Release);
        match self.work.borrow_mut().take() {
            Some(Work::Cont(s)) => s.release(),
            Some(Work::Frames { rest, .. }) => drain(rest),
            None => {}
        }
    }

    fn advance(&self, v: Erased) -> StepResult<A> {
        let work = self.work.borrow_mut().take().expect("suspension payload missing");
        match work {
            Work::Cont(s) => classify_resumed(s.resume(v)),
            Work::Frames { resume, rest } => {
                classify_step(eval_frames(Some(resume(v)), rest, &mut StepProcessor))
            }
        }
    }

    fn from_cont(s: Suspended) -> Self {
        Suspension {
            used: AtomicUsize::new(0),
            op: s.operation(),
            work: RefCell::new(Some(Work::Cont(s))),
            _answer: PhantomData,
        }
    }

    fn from_frames(op: Operation, resume: ResumeFn, rest: Frame) -> Self {
        Suspension {
            used: AtomicUsize::new(0),
            op,
            work: RefCell::new(Some(Work::Frames { resume, rest })),
            _answer: PhantomData,
        }
    }
}

impl<A> std::fmt::Debug for Suspension<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suspension")
            .field("used", &self.used.load(Ordering::Relaxed))
            .finish()
    }
}

/// Drives a closure-world computation until it completes or suspends.
///
/// # Example
///
/// ```
/// use delimit::{perform, step, Op, StepResult};
///
/// struct Prompt;
/// impl Op for Prompt {
///     type Output = i32;
/// }
///
/// let mut result = step(perform(Prompt).map(|n| n * 2));
/// while let StepResult::Pending(s) = result {
///     assert!(s.op().downcast_ref::<Prompt>().is_some());
///     result = s.resume(21i32);
/// }
/// assert_eq!(result.done(), Some(42));
/// ```
pub fn step<A: Any + Clone + Default>(m: Eff<A>) -> StepResult<A> {
    classify_resumed(m.call(to_resumed::<A>()))
}

/// Drives a frame-world computation until it completes or suspends.
pub fn step_expr<A: Any + Clone + Default>(m: Expr<A>) -> StepResult<A> {
    let m = m.erase();
    classify_step(eval_frames(m.value, m.frame, &mut StepProcessor))
}

/// Classifies a [`Resumed`] as a completed value or a suspension.
pub(crate) fn classify_resumed<A: Any + Clone + Default>(result: Resumed) -> StepResult<A> {
    match result.0 {
        ResumedState::Suspended(s) => {
            tracing::trace!("computation suspended on effect operation");
            StepResult::Pending(Suspension::from_cont(s))
        }
        ResumedState::Empty => StepResult::Done(A::default()),
        ResumedState::Value(v) => {
            StepResult::Done(*v.downcast::<A>().expect("final value type mismatch"))
        }
    }
}

/// What the stepper processor hands back through `eval_frames`.
pub(crate) enum StepOutcome {
    Finished(Option<Shared>),
    Suspended { op: Operation, resume: ResumeFn, rest: Frame },
}

/// Yields at effect frames instead of dispatching them.
pub(crate) struct StepProcessor;

impl FrameProcessor<StepOutcome> for StepProcessor {
    fn process_effect(&mut self, op: Operation, resume: ResumeFn, rest: Frame) -> EffectStep<StepOutcome> {
        tracing::trace!("computation suspended on effect operation");
        EffectStep::Finish(StepOutcome::Suspended { op, resume, rest })
    }

    fn process_return(&mut self, current: Option<Shared>) -> StepOutcome {
        StepOutcome::Finished(current)
    }
}

pub(crate) fn classify_step<A: Any + Clone + Default>(outcome: StepOutcome) -> StepResult<A> {
    match outcome {
        StepOutcome::Suspended { op, resume, rest } => {
            StepResult::Pending(Suspension::from_frames(op, resume, rest))
        }
        StepOutcome::Finished(None) => StepResult::Done(A::default()),
        StepOutcome::Finished(Some(v)) => StepResult::Done(recover::<A>(v)),
    }
}
