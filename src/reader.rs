//! The Reader effect: read-only access to an environment.
//!
//! [`Ask`] dispatches against a borrowed environment and returns it
//! unchanged. User-defined projections go through the open-extension
//! carrier [`ReaderAccess`], built with [`asking`].

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::cont::Eff;
use crate::effect::{handle_dispatch, perform, to_resumed, Dispatch, Erased, Handler, Op};
use crate::fault;
use crate::frame::Expr;
use crate::marker::{fused_bind, fused_map};
use crate::trampoline::handle_expr_with;

/// Operations dispatchable against a borrowed environment.
pub trait ReaderOp<E> {
    /// Reads from the environment and produces the resume value.
    fn dispatch_reader(&self, env: &E) -> Erased;
}

/// Reads the environment.
///
/// `perform(Ask::new())` resumes with the environment of type `E`.
pub struct Ask<E>(PhantomData<fn() -> E>);

impl<E> Ask<E> {
    /// The read operation.
    pub fn new() -> Self {
        Ask(PhantomData)
    }
}

impl<E> Default for Ask<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Any> Op for Ask<E> {
    type Output = E;
}

impl<E: Any + Clone> ReaderOp<E> for Ask<E> {
    fn dispatch_reader(&self, env: &E) -> Erased {
        Box::new(env.clone())
    }
}

/// Open-extension carrier for user-defined reader operations.
pub struct ReaderAccess<E> {
    apply: Rc<dyn Fn(&E) -> Erased>,
}

impl<E: Any> ReaderOp<E> for ReaderAccess<E> {
    fn dispatch_reader(&self, env: &E) -> Erased {
        (self.apply)(env)
    }
}

/// Performs a user-defined reader operation: `f` projects out of the
/// handler's environment, and its result is the resume value.
pub fn asking<E: Any, T: Any>(f: impl Fn(&E) -> T + 'static) -> Eff<T> {
    let op = ReaderAccess::<E> { apply: Rc::new(move |e: &E| Box::new(f(e)) as Erased) };
    crate::effect::perform_raw::<T>(Rc::new(op))
}

/// Reads the environment.
pub fn ask<E: Any + Clone>() -> Eff<E> {
    perform(Ask::<E>::new())
}

/// Fused `ask` + `bind`: reads the environment and passes it to `f`.
pub fn ask_reader<E: Any + Clone, B: Any>(f: impl Fn(E) -> Eff<B> + 'static) -> Eff<B> {
    fused_bind::<E, B>(Rc::new(Ask::<E>::new()), Rc::new(f))
}

/// Fused `ask` + `map`: reads the environment and applies projection `f`.
pub fn map_reader<E: Any + Clone, A: Any>(f: impl Fn(E) -> A + 'static) -> Eff<A> {
    fused_map::<E, A>(Rc::new(Ask::<E>::new()), Rc::new(f))
}

/// Dispatches a reader operation, or reports that none matched.
pub(crate) fn try_dispatch<E: Any + Clone>(op: &dyn Any, env: &E) -> Option<Dispatch> {
    let v = if let Some(o) = op.downcast_ref::<Ask<E>>() {
        o.dispatch_reader(env)
    } else if let Some(o) = op.downcast_ref::<ReaderAccess<E>>() {
        o.dispatch_reader(env)
    } else {
        return None;
    };
    Some(Dispatch::Resume(v))
}

/// The handler for Reader effects.
pub struct ReaderHandler<E> {
    env: E,
}

impl<E> ReaderHandler<E> {
    /// A handler over the given environment.
    pub fn new(env: E) -> Self {
        ReaderHandler { env }
    }
}

impl<E: Any + Clone, R> Handler<R> for ReaderHandler<E> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        try_dispatch(op, &self.env)
            .unwrap_or_else(|| fault::unhandled_effect("ReaderHandler"))
    }
}

/// Runs a computation with the given environment.
pub fn run_reader<E: Any + Clone, A: Any + Default>(env: E, m: Eff<A>) -> A {
    let mut h = ReaderHandler::new(env);
    let result = m.call(to_resumed::<A>());
    handle_dispatch(result, &mut h, A::default)
}

/// Runs a frame-world computation with the given environment.
pub fn run_reader_expr<E: Any + Clone, A: Any + Clone + Default>(env: E, m: Expr<A>) -> A {
    let mut h = ReaderHandler::new(env);
    handle_expr_with(m, &mut h, A::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cont::pure;

    #[test]
    fn test_ask_returns_environment() {
        let m = ask::<i32>();
        assert_eq!(run_reader(42, m), 42);
    }

    #[test]
    fn test_ask_bind() {
        let m = ask::<i32>().bind(|e| pure(e * 2));
        assert_eq!(run_reader(21, m), 42);
    }

    #[test]
    fn test_fused_ask_reader() {
        let m = ask_reader(|e: String| pure(e.len()));
        assert_eq!(run_reader("four".to_string(), m), 4);
    }

    #[test]
    fn test_fused_map_reader() {
        let m = map_reader(|e: i32| e + 1);
        assert_eq!(run_reader(41, m), 42);
    }

    #[test]
    fn test_asking_projection() {
        let m = asking(|e: &(i32, i32)| e.0 + e.1);
        assert_eq!(run_reader((40, 2), m), 42);
    }

    #[test]
    fn test_run_reader_expr() {
        let m = Expr::perform(Ask::<i32>::new()).map(|e| e * 2);
        assert_eq!(run_reader_expr(21, m), 42);
    }

    #[test]
    #[should_panic(expected = "delimit: unhandled effect in ReaderHandler")]
    fn test_foreign_effect_panics() {
        let m = crate::state::get::<i32>();
        let _ = run_reader(0i32, m);
    }
}
