//! Effect protocol: operations, handlers, and the dispatch trampoline.
//!
//! Effectful computations use [`Eff<A>`](crate::cont::Eff) — a continuation
//! whose answer type is the opaque [`Resumed`]. Performing an operation
//! suspends the computation: instead of a final value, applying it yields a
//! suspension carrying the operation and a typed resume path. A [`Handler`]
//! intercepts each operation and decides how to resume (or short-circuits
//! with a final answer).
//!
//! Operations know their result type at compile time through the [`Op`]
//! trait's associated `Output`; at runtime they travel type-erased and
//! handlers recover concrete types by downcasting.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::cont::{Cont, ContFn, Eff};
use crate::marker::{self, Suspended};

/// A type-erased intermediate value.
///
/// Concrete types are recovered at protocol boundaries where the
/// construction site's knowledge applies.
pub type Erased = Box<dyn Any>;

/// A performed effect operation, as seen by handler dispatch.
///
/// Cheaply clonable; handlers downcast to concrete operation types.
pub type Operation = Rc<dyn Any>;

/// An effect operation with a statically known result type.
///
/// Each effect defines concrete types implementing `Op` with the
/// appropriate `Output`. The handler's reply to the operation is
/// interpreted as `Output` on resume.
///
/// # Example
///
/// ```
/// use delimit::{Op, perform, handler_fn, handle, Dispatch};
///
/// struct Roll;
/// impl Op for Roll {
///     type Output = i32;
/// }
///
/// let program = perform(Roll);
/// let result = handle(program, handler_fn(|op| {
///     assert!(op.downcast_ref::<Roll>().is_some());
///     Dispatch::Resume(Box::new(4i32)) // chosen by fair dice roll
/// }));
/// assert_eq!(result, 4);
/// ```
pub trait Op: Any {
    /// The type the operation produces when resumed.
    type Output: Any;
}

/// The answer type of effectful computations.
///
/// A `Resumed` is either a final value, a pending effect suspension, or
/// *empty*. Empty is the nil-completion convention: it is semantically equal
/// to "finished with the zero value of the answer type", and runners map it
/// to `Default::default()`. Consequently an empty `Resumed` cannot be used
/// as a meaningful result; wrap results in [`Either`](crate::either::Either)
/// or `Option` if that ambiguity matters.
pub struct Resumed(pub(crate) ResumedState);

pub(crate) enum ResumedState {
    Empty,
    Value(Erased),
    Suspended(Suspended),
}

impl Resumed {
    /// The empty completion: "finished with the zero value".
    pub fn empty() -> Self {
        Resumed(ResumedState::Empty)
    }

    /// A completed computation carrying `v` as its final value.
    pub fn of<T: Any>(v: T) -> Self {
        Resumed(ResumedState::Value(Box::new(v)))
    }

    pub(crate) fn suspended(s: Suspended) -> Self {
        Resumed(ResumedState::Suspended(s))
    }
}

impl std::fmt::Debug for Resumed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            ResumedState::Empty => f.write_str("Resumed::Empty"),
            ResumedState::Value(_) => f.write_str("Resumed::Value"),
            ResumedState::Suspended(_) => f.write_str("Resumed::Suspended"),
        }
    }
}

/// A handler's verdict on a dispatched operation.
pub enum Dispatch {
    /// Continue the computation with this value as the operation's result.
    Resume(Erased),
    /// Short-circuit: terminate with this value as the overall answer.
    Abort(Erased),
}

/// An interpreter for a set of effect operations.
///
/// Runners monomorphize over the concrete handler type, so dispatch calls
/// devirtualize; built-in handlers additionally match concrete operation
/// types before falling through to open-extension carriers.
pub trait Handler<R> {
    /// Maps an operation to a resume value or a short-circuit answer.
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch;
}

/// A handler backed by a plain dispatch function.
pub struct HandlerFn<R, F> {
    f: F,
    _result: PhantomData<fn() -> R>,
}

impl<R, F: FnMut(&dyn Any) -> Dispatch> Handler<R> for HandlerFn<R, F> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        (self.f)(op)
    }
}

/// Creates a handler from a dispatch function.
///
/// The function receives each effect operation and returns
/// [`Dispatch::Resume`] to continue the computation or [`Dispatch::Abort`]
/// to short-circuit.
pub fn handler_fn<R, F: FnMut(&dyn Any) -> Dispatch>(f: F) -> HandlerFn<R, F> {
    HandlerFn { f, _result: PhantomData }
}

/// The identity continuation for CPS entry points (`handle`, `step`,
/// `reify`): wraps the final value into a [`Resumed`].
pub(crate) fn to_resumed<A: Any>() -> ContFn<A, Resumed> {
    Rc::new(|a: A| Resumed::of(a))
}

/// Triggers an effect operation and suspends the computation.
///
/// The handler receives the operation via [`Handler::dispatch`] and
/// provides a resume value, or short-circuits with a final result.
pub fn perform<O: Op>(op: O) -> Eff<O::Output> {
    perform_raw(Rc::new(op))
}

/// `perform` for an already-erased operation, typed by the caller.
///
/// This is the escape hatch used by operations whose result type is not
/// expressible through [`Op`] (`throw`, `catch`, `listen`, and the
/// open-extension carriers).
pub(crate) fn perform_raw<A: Any>(op: Operation) -> Eff<A> {
    Cont::suspend(move |k: ContFn<A, Resumed>| {
        let mut m = marker::acquire();
        m.op = Some(Rc::clone(&op));
        m.k = Some(Box::new(k));
        m.resume = Some(marker::effect_resume::<A>);
        Resumed::suspended(Suspended::Marker(m))
    })
}

/// Runs a computation under an effect handler.
///
/// Starting from the computation applied to the identity continuation,
/// loops: each suspension's operation is dispatched; on
/// [`Dispatch::Resume`] the suspension continues with the reply, on
/// [`Dispatch::Abort`] the reply is the overall answer. An empty completion
/// yields `R::default()` (nil-completion convention, see [`Resumed`]).
pub fn handle<R: Any + Default, H: Handler<R>>(m: Eff<R>, mut h: H) -> R {
    let result = m.run_with(|a: R| Resumed::of(a));
    handle_dispatch(result, &mut h, R::default)
}

/// The dispatch trampoline shared by `handle` and the effect runners.
pub(crate) fn handle_dispatch<R: Any>(
    mut result: Resumed,
    h: &mut impl Handler<R>,
    empty: impl FnOnce() -> R,
) -> R {
    loop {
        match result.0 {
            ResumedState::Suspended(s) => match h.dispatch(s.op()) {
                Dispatch::Resume(v) => result = s.resume(v),
                Dispatch::Abort(v) => {
                    s.release();
                    return *v.downcast::<R>().expect("handler answer type mismatch");
                }
            },
            ResumedState::Empty => return empty(),
            ResumedState::Value(v) => {
                return *v.downcast::<R>().expect("final value type mismatch")
            }
        }
    }
}
