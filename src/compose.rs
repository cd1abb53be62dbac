//! Composed handlers for multi-effect computations.
//!
//! These avoid nesting single-effect runners by dispatching several effect
//! families from one handler. Each family is tried in a documented order;
//! an operation no family recognizes aborts with the unhandled-effect
//! fault naming the composed handler.

use std::any::Any;
use std::marker::PhantomData;

use crate::cont::Eff;
use crate::effect::{handle_dispatch, to_resumed, Dispatch, Handler};
use crate::either::Either;
use crate::error::{self, right_cont, ErrorContext};
use crate::fault;
use crate::frame::Expr;
use crate::reader;
use crate::state;
use crate::trampoline::handle_expr_with;
use crate::writer::{self, WriterContext};

/// Handles State and Reader effects. Dispatch order: State → Reader.
struct StateReaderHandler<S, E> {
    state: S,
    env: E,
}

impl<S: Any + Clone, E: Any + Clone, R> Handler<R> for StateReaderHandler<S, E> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        state::try_dispatch(op, &mut self.state)
            .or_else(|| reader::try_dispatch(op, &self.env))
            .unwrap_or_else(|| fault::unhandled_effect("StateReaderHandler"))
    }
}

/// Runs a computation with State and Reader effects, returning the result
/// and the final state.
pub fn run_state_reader<S, E, A>(initial: S, env: E, m: Eff<A>) -> (A, S)
where
    S: Any + Clone,
    E: Any + Clone,
    A: Any + Default,
{
    let mut h = StateReaderHandler { state: initial, env };
    let result = m.call(to_resumed::<A>());
    let a = handle_dispatch(result, &mut h, A::default);
    (a, h.state)
}

/// The frame-world twin of [`run_state_reader`].
pub fn run_state_reader_expr<S, E, A>(initial: S, env: E, m: Expr<A>) -> (A, S)
where
    S: Any + Clone,
    E: Any + Clone,
    A: Any + Clone + Default,
{
    let mut h = StateReaderHandler { state: initial, env };
    let a = handle_expr_with(m, &mut h, A::default);
    (a, h.state)
}

/// Handles State and Error effects. Dispatch order: State → Error.
struct StateErrorHandler<S, E, A> {
    state: S,
    ctx: ErrorContext<E>,
    _answer: PhantomData<fn() -> A>,
}

impl<S: Any + Clone, E: Any + Clone, A: Any> Handler<Either<E, A>> for StateErrorHandler<S, E, A> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        state::try_dispatch(op, &mut self.state)
            .or_else(|| error::try_dispatch::<E, A>(op, &mut self.ctx))
            .unwrap_or_else(|| fault::unhandled_effect("StateErrorHandler"))
    }
}

/// Runs a computation with State and Error effects.
///
/// Returns `(Either, state)` — the state is preserved as of the throw
/// point even when the computation fails.
pub fn run_state_error<S, E, A>(initial: S, m: Eff<A>) -> (Either<E, A>, S)
where
    S: Any + Clone,
    E: Any + Clone,
    A: Any + Default,
{
    let mut h = StateErrorHandler { state: initial, ctx: ErrorContext::new(), _answer: PhantomData };
    let result = m.call(right_cont::<E, A>());
    let either = handle_dispatch(result, &mut h, || Either::Right(A::default()));
    (either, h.state)
}

/// Runs a State+Error computation, returning only the `Either` result.
pub fn eval_state_error<S, E, A>(initial: S, m: Eff<A>) -> Either<E, A>
where
    S: Any + Clone,
    E: Any + Clone,
    A: Any + Default,
{
    run_state_error(initial, m).0
}

/// Runs a State+Error computation, returning only the final state.
pub fn exec_state_error<S, E, A>(initial: S, m: Eff<A>) -> S
where
    S: Any + Clone,
    E: Any + Clone,
    A: Any + Default,
{
    run_state_error::<S, E, A>(initial, m).1
}

/// The frame-world twin of [`run_state_error`].
pub fn run_state_error_expr<S, E, A>(initial: S, m: Expr<A>) -> (Either<E, A>, S)
where
    S: Any + Clone,
    E: Any + Clone,
    A: Any + Clone + Default,
{
    let wrapped = m.map(|a: A| Either::<E, A>::Right(a));
    let mut h = StateErrorHandler { state: initial, ctx: ErrorContext::new(), _answer: PhantomData };
    let either = handle_expr_with(wrapped, &mut h, || Either::Right(A::default()));
    (either, h.state)
}

/// Handles State and Writer effects. Dispatch order: State → Writer.
/// Both families always resume, so there is no short-circuit.
struct StateWriterHandler<S, W> {
    state: S,
    ctx: WriterContext<W>,
}

impl<S: Any + Clone, W: Any + Clone, R> Handler<R> for StateWriterHandler<S, W> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        state::try_dispatch(op, &mut self.state)
            .or_else(|| writer::try_dispatch(op, &mut self.ctx))
            .unwrap_or_else(|| fault::unhandled_effect("StateWriterHandler"))
    }
}

/// Runs a computation with State and Writer effects, returning the result,
/// the final state, and the output.
pub fn run_state_writer<S, W, A>(initial: S, m: Eff<A>) -> (A, S, Vec<W>)
where
    S: Any + Clone,
    W: Any + Clone,
    A: Any + Default,
{
    let mut h = StateWriterHandler { state: initial, ctx: WriterContext::new() };
    let result = m.call(to_resumed::<A>());
    let a = handle_dispatch(result, &mut h, A::default);
    (a, h.state, h.ctx.output)
}

/// The frame-world twin of [`run_state_writer`].
pub fn run_state_writer_expr<S, W, A>(initial: S, m: Expr<A>) -> (A, S, Vec<W>)
where
    S: Any + Clone,
    W: Any + Clone,
    A: Any + Clone + Default,
{
    let mut h = StateWriterHandler { state: initial, ctx: WriterContext::new() };
    let a = handle_expr_with(m, &mut h, A::default);
    (a, h.state, h.ctx.output)
}

/// Handles Reader, State, and Error effects.
/// Dispatch order: Reader → State → Error.
struct ReaderStateErrorHandler<Env, S, Err, A> {
    env: Env,
    state: S,
    ctx: ErrorContext<Err>,
    _answer: PhantomData<fn() -> A>,
}

impl<Env, S, Err, A> Handler<Either<Err, A>> for ReaderStateErrorHandler<Env, S, Err, A>
where
    Env: Any + Clone,
    S: Any + Clone,
    Err: Any + Clone,
    A: Any,
{
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        reader::try_dispatch(op, &self.env)
            .or_else(|| state::try_dispatch(op, &mut self.state))
            .or_else(|| error::try_dispatch::<Err, A>(op, &mut self.ctx))
            .unwrap_or_else(|| fault::unhandled_effect("ReaderStateErrorHandler"))
    }
}

/// Runs a computation with Reader, State, and Error effects.
///
/// Returns `(Either, state)`; the state is preserved at the throw point.
pub fn run_reader_state_error<Env, S, Err, A>(
    env: Env,
    initial: S,
    m: Eff<A>,
) -> (Either<Err, A>, S)
where
    Env: Any + Clone,
    S: Any + Clone,
    Err: Any + Clone,
    A: Any + Default,
{
    let mut h = ReaderStateErrorHandler {
        env,
        state: initial,
        ctx: ErrorContext::new(),
        _answer: PhantomData,
    };
    let result = m.call(right_cont::<Err, A>());
    let either = handle_dispatch(result, &mut h, || Either::Right(A::default()));
    (either, h.state)
}

/// The frame-world twin of [`run_reader_state_error`].
pub fn run_reader_state_error_expr<Env, S, Err, A>(
    env: Env,
    initial: S,
    m: Expr<A>,
) -> (Either<Err, A>, S)
where
    Env: Any + Clone,
    S: Any + Clone,
    Err: Any + Clone,
    A: Any + Clone + Default,
{
    let wrapped = m.map(|a: A| Either::<Err, A>::Right(a));
    let mut h = ReaderStateErrorHandler {
        env,
        state: initial,
        ctx: ErrorContext::new(),
        _answer: PhantomData,
    };
    let either = handle_expr_with(wrapped, &mut h, || Either::Right(A::default()));
    (either, h.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cont::pure;
    use crate::error::throw;
    use crate::reader::ask;
    use crate::state::{get, put};
    use crate::writer::tell;

    #[test]
    fn test_state_reader() {
        // result = env + state; final state = env
        let m = ask::<i32>().bind(|env| {
            get::<i32>().bind(move |s| put(env).then(pure(env + s)))
        });
        assert_eq!(run_state_reader(2, 40, m), (42, 40));
    }

    #[test]
    fn test_state_reader_expr() {
        let m = Expr::perform(crate::reader::Ask::<i32>::new())
            .bind(|env| Expr::perform(crate::state::Get::<i32>::new()).map(move |s| env + s));
        assert_eq!(run_state_reader_expr(2, 40, m), (42, 2));
    }

    #[test]
    fn test_state_error_success() {
        let m = get::<i32>().bind(|s| put(s + 1).then(pure(s)));
        assert_eq!(run_state_error::<_, &str, _>(10, m), (Either::Right(10), 11));
    }

    #[test]
    fn test_state_error_preserves_state_at_throw() {
        let m = put(7).then(throw::<&str, i32>("boom"));
        assert_eq!(run_state_error(0, m), (Either::Left("boom"), 7));
    }

    #[test]
    fn test_eval_exec_state_error() {
        let m = || put(3).then(pure(1));
        assert_eq!(eval_state_error::<_, &str, _>(0, m()), Either::Right(1));
        assert_eq!(exec_state_error::<_, &str, i32>(0, m()), 3);
    }

    #[test]
    fn test_state_error_expr() {
        let m = Expr::perform(crate::state::Put::new(7))
            .then(crate::error::throw_expr::<&str, i32>("boom"));
        assert_eq!(run_state_error_expr(0, m), (Either::Left("boom"), 7));
    }

    #[test]
    fn test_state_writer_no_short_circuit() {
        let m = tell("a")
            .then(get::<i32>())
            .bind(|s| put(s * 2).then(tell("b")).then(pure(s)));
        let (a, s, w) = run_state_writer::<i32, &str, i32>(21, m);
        assert_eq!(a, 21);
        assert_eq!(s, 42);
        assert_eq!(w, vec!["a", "b"]);
    }

    #[test]
    fn test_state_writer_expr() {
        let m = Expr::perform(crate::writer::Tell::new("x"))
            .then(Expr::perform(crate::state::Get::<i32>::new()));
        let (a, s, w) = run_state_writer_expr::<i32, &str, i32>(5, m);
        assert_eq!(a, 5);
        assert_eq!(s, 5);
        assert_eq!(w, vec!["x"]);
    }

    #[test]
    fn test_reader_state_error_success() {
        let m = ask::<i32>().bind(|env| get::<i32>().bind(move |s| put(s + env).then(get())));
        assert_eq!(
            run_reader_state_error::<_, _, &str, i32>(10, 1, m),
            (Either::Right(11), 11)
        );
    }

    #[test]
    fn test_reader_state_error_throw() {
        let m = ask::<i32>().bind(|env| put(env).then(throw::<&str, i32>("nope")));
        assert_eq!(
            run_reader_state_error(9, 0, m),
            (Either::Left("nope"), 9)
        );
    }

    #[test]
    fn test_reader_state_error_expr() {
        let m = Expr::perform(crate::reader::Ask::<i32>::new())
            .bind(|env| Expr::perform(crate::state::Put::new(env)).then(Expr::of(env * 2)));
        assert_eq!(
            run_reader_state_error_expr::<_, _, &str, i32>(4, 0, m),
            (Either::Right(8), 4)
        );
    }

    #[test]
    #[should_panic(expected = "delimit: unhandled effect in StateErrorHandler")]
    fn test_composed_unhandled_names_handler() {
        let m = tell("w").then(pure(1));
        let _ = run_state_error::<i32, &str, i32>(0, m);
    }
}
