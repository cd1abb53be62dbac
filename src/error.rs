//! The Error effect: exception-like error handling.
//!
//! [`throw`] aborts the computation; the handler surfaces the error as an
//! [`Either::Left`] out of the runner — the one recoverable error kind in
//! the library. [`catch`] runs a body and, if it throws, hands the error to
//! a recovery function.
//!
//! Scope restriction: like the writer's `listen`/`censor`, the body and
//! recovery function of `catch` run under an internal error-only handler;
//! effect operations from other families inside a catch scope are not
//! forwarded and abort with the unhandled-effect fault.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::cont::{ContFn, Eff};
use crate::effect::{handle_dispatch, Dispatch, Erased, Handler, Resumed};
use crate::either::Either;
use crate::fault;
use crate::frame::{EffectFrame, Expr, Frame};
use crate::trampoline::handle_expr_with;

/// The mutable error slot an error handler dispatches against.
pub struct ErrorContext<E> {
    pub(crate) err: Option<E>,
}

impl<E> ErrorContext<E> {
    pub(crate) fn new() -> Self {
        ErrorContext { err: None }
    }
}

/// Operations dispatchable against an error slot.
pub trait ErrorOp<E> {
    /// Applies the operation, possibly setting the error slot, and
    /// produces the resume value.
    fn dispatch_error(&self, ctx: &mut ErrorContext<E>) -> Erased;
}

/// Raises an error.
///
/// The continuation of a `Throw` is never invoked; the handler
/// short-circuits with `Left` instead.
pub struct Throw<E> {
    /// The raised error.
    pub error: E,
}

impl<E> Throw<E> {
    /// The raise operation.
    pub fn new(error: E) -> Self {
        Throw { error }
    }
}

impl<E: Any + Clone> ErrorOp<E> for Throw<E> {
    fn dispatch_error(&self, ctx: &mut ErrorContext<E>) -> Erased {
        ctx.err = Some(self.error.clone());
        Box::new(())
    }
}

/// Handles errors raised by a sub-computation.
///
/// Carries its body and recovery function with the result type erased;
/// built by [`catch`].
pub struct Catch<E> {
    run: Rc<dyn Fn(&mut ErrorContext<E>) -> Erased>,
}

impl<E: Any> ErrorOp<E> for Catch<E> {
    fn dispatch_error(&self, ctx: &mut ErrorContext<E>) -> Erased {
        (self.run)(ctx)
    }
}

/// Raises an error, aborting the computation.
pub fn throw<E: Any + Clone, A: Any>(error: E) -> Eff<A> {
    crate::effect::perform_raw::<A>(Rc::new(Throw::new(error)))
}

/// The frame-world counterpart of [`throw`].
pub fn throw_expr<E: Any + Clone, A: Any>(error: E) -> Expr<A> {
    Expr::suspended(Frame::Effect(EffectFrame::new(
        Rc::new(Throw::new(error)),
        crate::frame::identity_resume(),
        Frame::Return,
    )))
}

/// Runs `body`, recovering from a thrown error with `handler`.
///
/// An error thrown by the recovery itself propagates outward. See the
/// module documentation for the scope restriction.
pub fn catch<E: Any + Clone, A: Any + Default>(
    body: Eff<A>,
    handler: impl Fn(E) -> Eff<A> + 'static,
) -> Eff<A> {
    let handler = Rc::new(handler);
    let run: Rc<dyn Fn(&mut ErrorContext<E>) -> Erased> = Rc::new(move |ctx| {
        match run_error::<E, A>(body.clone()) {
            Either::Right(v) => Box::new(v) as Erased,
            Either::Left(e) => match run_error::<E, A>(handler(e)) {
                Either::Right(v) => Box::new(v) as Erased,
                Either::Left(e2) => {
                    ctx.err = Some(e2);
                    Box::new(())
                }
            },
        }
    });
    crate::effect::perform_raw::<A>(Rc::new(Catch::<E> { run }))
}

/// Dispatches an error operation, or reports that none matched.
///
/// After the operation runs, a populated error slot short-circuits with
/// `Left`; otherwise the computation resumes.
pub(crate) fn try_dispatch<E: Any + Clone, A: Any>(
    op: &dyn Any,
    ctx: &mut ErrorContext<E>,
) -> Option<Dispatch> {
    let v = if let Some(o) = op.downcast_ref::<Throw<E>>() {
        o.dispatch_error(ctx)
    } else if let Some(o) = op.downcast_ref::<Catch<E>>() {
        o.dispatch_error(ctx)
    } else {
        return None;
    };
    Some(match ctx.err.take() {
        Some(e) => Dispatch::Abort(Box::new(Either::<E, A>::Left(e))),
        None => Dispatch::Resume(v),
    })
}

/// The handler for Error effects.
pub struct ErrorHandler<E, A> {
    ctx: ErrorContext<E>,
    _answer: PhantomData<fn() -> A>,
}

impl<E, A> ErrorHandler<E, A> {
    /// A handler with an empty error slot.
    pub fn new() -> Self {
        ErrorHandler { ctx: ErrorContext::new(), _answer: PhantomData }
    }
}

impl<E, A> Default for ErrorHandler<E, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Any + Clone, A: Any> Handler<Either<E, A>> for ErrorHandler<E, A> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        try_dispatch::<E, A>(op, &mut self.ctx)
            .unwrap_or_else(|| fault::unhandled_effect("ErrorHandler"))
    }
}

/// The identity continuation for error runners: wraps the final value in
/// `Right`.
pub(crate) fn right_cont<E: Any, A: Any>() -> ContFn<A, Resumed> {
    Rc::new(|a: A| Resumed::of(Either::<E, A>::Right(a)))
}

/// Runs an error-capable computation, returning `Either`.
pub fn run_error<E: Any + Clone, A: Any + Default>(m: Eff<A>) -> Either<E, A> {
    let mut h = ErrorHandler::<E, A>::new();
    let result = m.call(right_cont::<E, A>());
    handle_dispatch(result, &mut h, || Either::Right(A::default()))
}

/// Runs a frame-world error-capable computation, returning `Either`.
pub fn run_error_expr<E: Any + Clone, A: Any + Clone + Default>(m: Expr<A>) -> Either<E, A> {
    let wrapped = m.map(|a: A| Either::<E, A>::Right(a));
    let mut h = ErrorHandler::<E, A>::new();
    handle_expr_with(wrapped, &mut h, || Either::Right(A::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cont::pure;

    #[test]
    fn test_pure_is_right() {
        assert_eq!(run_error::<&str, i32>(pure(42)), Either::Right(42));
    }

    #[test]
    fn test_throw_is_left() {
        let m = throw::<&str, i32>("boom");
        assert_eq!(run_error::<&str, i32>(m), Either::Left("boom"));
    }

    #[test]
    fn test_throw_skips_rest() {
        let m = throw::<&str, i32>("boom").map(|v: i32| v + 1);
        assert_eq!(run_error::<&str, i32>(m), Either::Left("boom"));
    }

    #[test]
    fn test_catch_recovers() {
        let m = catch(throw::<&str, i32>("e"), |_: &str| pure(99));
        assert_eq!(run_error::<&str, i32>(m), Either::Right(99));
    }

    #[test]
    fn test_catch_passes_error_value() {
        let m = catch(throw::<String, usize>("four".to_string()), |e: String| pure(e.len()));
        assert_eq!(run_error::<String, usize>(m), Either::Right(4));
    }

    #[test]
    fn test_catch_without_throw_is_transparent() {
        let m = catch(pure(7), |_: &str| pure(0));
        assert_eq!(run_error::<&str, i32>(m), Either::Right(7));
    }

    #[test]
    fn test_rethrow_from_recovery_propagates() {
        let m = catch(throw::<&str, i32>("first"), |_: &str| throw::<&str, i32>("second"));
        assert_eq!(run_error::<&str, i32>(m), Either::Left("second"));
    }

    #[test]
    fn test_throw_expr_is_left() {
        let m = throw_expr::<&str, i32>("boom").map(|v| v + 1);
        assert_eq!(run_error_expr(m), Either::Left("boom"));
    }

    #[test]
    fn test_run_error_expr_right() {
        let m = Expr::of(21).map(|v| v * 2);
        assert_eq!(run_error_expr::<&str, i32>(m), Either::Right(42));
    }

    #[test]
    #[should_panic(expected = "delimit: unhandled effect in ErrorHandler")]
    fn test_catch_does_not_forward_foreign_effects() {
        let m = catch(crate::state::get::<i32>(), |_: &str| pure(0));
        let _ = run_error::<&str, i32>(m);
    }
}
