//! The State effect: mutable state threading.
//!
//! Operations carry the capability to dispatch against a mutable `S`:
//! [`Get`] returns the current state, [`Put`] replaces it, [`Modify`]
//! applies a function and returns the new state. The handler matches the
//! concrete operations first, then falls through to the open-extension
//! carrier [`StateAccess`] for user-defined state operations built with
//! [`dispatching`].

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::cont::Eff;
use crate::effect::{
    handle_dispatch, perform, to_resumed, Dispatch, Erased, Handler, Op,
};
use crate::fault;
use crate::frame::Expr;
use crate::marker::{fused_bind, fused_then};
use crate::trampoline::handle_expr_with;

/// Operations dispatchable against mutable state.
///
/// The concrete operations implement this; [`StateAccess`] carries it for
/// user-defined operations.
pub trait StateOp<S> {
    /// Applies the operation to the state and produces the resume value.
    fn dispatch_state(&self, state: &mut S) -> Erased;
}

/// Reads the current state.
///
/// `perform(Get::new())` resumes with the state of type `S`.
pub struct Get<S>(PhantomData<fn() -> S>);

impl<S> Get<S> {
    /// The read operation.
    pub fn new() -> Self {
        Get(PhantomData)
    }
}

impl<S> Default for Get<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Any> Op for Get<S> {
    type Output = S;
}

impl<S: Any + Clone> StateOp<S> for Get<S> {
    fn dispatch_state(&self, state: &mut S) -> Erased {
        Box::new(state.clone())
    }
}

/// Replaces the current state.
///
/// `perform(Put::new(s))` resumes with `()`.
pub struct Put<S> {
    /// The replacement state.
    pub value: S,
}

impl<S> Put<S> {
    /// The write operation.
    pub fn new(value: S) -> Self {
        Put { value }
    }
}

impl<S: Any> Op for Put<S> {
    type Output = ();
}

impl<S: Any + Clone> StateOp<S> for Put<S> {
    fn dispatch_state(&self, state: &mut S) -> Erased {
        *state = self.value.clone();
        Box::new(())
    }
}

/// Applies a function to the state and returns the new state.
pub struct Modify<S> {
    /// The state transformation.
    pub f: Rc<dyn Fn(S) -> S>,
}

impl<S: 'static> Modify<S> {
    /// The modify operation.
    pub fn new(f: impl Fn(S) -> S + 'static) -> Self {
        Modify { f: Rc::new(f) }
    }
}

impl<S: Any> Op for Modify<S> {
    type Output = S;
}

impl<S: Any + Clone> StateOp<S> for Modify<S> {
    fn dispatch_state(&self, state: &mut S) -> Erased {
        *state = (self.f)(state.clone());
        Box::new(state.clone())
    }
}

/// Open-extension carrier for user-defined state operations.
///
/// Built by [`dispatching`]; the result type is erased inside the carrier
/// so the handler can dispatch it without knowing it.
pub struct StateAccess<S> {
    apply: Rc<dyn Fn(&mut S) -> Erased>,
}

impl<S: Any> StateOp<S> for StateAccess<S> {
    fn dispatch_state(&self, state: &mut S) -> Erased {
        (self.apply)(state)
    }
}

/// Performs a user-defined state operation.
///
/// `f` receives the handler's mutable state and its result becomes the
/// operation's resume value.
///
/// # Example
///
/// ```
/// use delimit::state::{dispatching, run_state};
///
/// // A compare-and-increment the built-in operations don't offer.
/// let m = dispatching(|s: &mut i32| {
///     let seen = *s;
///     *s += 1;
///     seen
/// });
/// assert_eq!(run_state(10, m), (10, 11));
/// ```
pub fn dispatching<S: Any, T: Any>(f: impl Fn(&mut S) -> T + 'static) -> Eff<T> {
    let op = StateAccess::<S> { apply: Rc::new(move |s: &mut S| Box::new(f(s)) as Erased) };
    crate::effect::perform_raw::<T>(Rc::new(op))
}

/// Reads the current state.
pub fn get<S: Any + Clone>() -> Eff<S> {
    perform(Get::<S>::new())
}

/// Replaces the current state.
pub fn put<S: Any + Clone>(value: S) -> Eff<()> {
    perform(Put::new(value))
}

/// Applies `f` to the state and returns the new state.
pub fn modify<S: Any + Clone>(f: impl Fn(S) -> S + 'static) -> Eff<S> {
    perform(Modify::new(f))
}

/// Fused `get` + `bind`: reads the state and passes it to `f`.
///
/// Equivalent to `get().bind(f)` but suspends through a single pooled
/// marker.
pub fn get_state<S: Any + Clone, B: Any>(f: impl Fn(S) -> Eff<B> + 'static) -> Eff<B> {
    fused_bind::<S, B>(Rc::new(Get::<S>::new()), Rc::new(f))
}

/// Fused `put` + `then`: writes the state, then runs `next`.
pub fn put_state<S: Any + Clone, B: Any>(value: S, next: Eff<B>) -> Eff<B> {
    fused_then::<B>(Rc::new(Put::new(value)), next)
}

/// Fused `modify` + `bind`: transforms the state and passes the new state
/// to `then`.
pub fn modify_state<S: Any + Clone, B: Any>(
    f: impl Fn(S) -> S + 'static,
    then: impl Fn(S) -> Eff<B> + 'static,
) -> Eff<B> {
    fused_bind::<S, B>(Rc::new(Modify::new(f)), Rc::new(then))
}

/// Dispatches a state operation, or reports that none matched.
pub(crate) fn try_dispatch<S: Any + Clone>(op: &dyn Any, state: &mut S) -> Option<Dispatch> {
    let v = if let Some(o) = op.downcast_ref::<Get<S>>() {
        o.dispatch_state(state)
    } else if let Some(o) = op.downcast_ref::<Put<S>>() {
        o.dispatch_state(state)
    } else if let Some(o) = op.downcast_ref::<Modify<S>>() {
        o.dispatch_state(state)
    } else if let Some(o) = op.downcast_ref::<StateAccess<S>>() {
        o.dispatch_state(state)
    } else {
        return None;
    };
    Some(Dispatch::Resume(v))
}

/// The handler for State effects.
///
/// Owns the threaded state; runners read it back after evaluation.
pub struct StateHandler<S> {
    state: S,
}

impl<S> StateHandler<S> {
    /// A handler starting from the given state.
    pub fn new(initial: S) -> Self {
        StateHandler { state: initial }
    }

    /// The current state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Consumes the handler, yielding the final state.
    pub fn into_state(self) -> S {
        self.state
    }
}

impl<S: Any + Clone, R> Handler<R> for StateHandler<S> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        try_dispatch(op, &mut self.state)
            .unwrap_or_else(|| fault::unhandled_effect("StateHandler"))
    }
}

/// Runs a stateful computation, returning the result and the final state.
pub fn run_state<S: Any + Clone, A: Any + Default>(initial: S, m: Eff<A>) -> (A, S) {
    let mut h = StateHandler::new(initial);
    let result = m.call(to_resumed::<A>());
    let a = handle_dispatch(result, &mut h, A::default);
    (a, h.into_state())
}

/// Runs a stateful computation, returning only the result.
pub fn eval_state<S: Any + Clone, A: Any + Default>(initial: S, m: Eff<A>) -> A {
    run_state(initial, m).0
}

/// Runs a stateful computation, returning only the final state.
pub fn exec_state<S: Any + Clone, A: Any + Default>(initial: S, m: Eff<A>) -> S {
    run_state(initial, m).1
}

/// Runs a stateful frame-world computation.
pub fn run_state_expr<S: Any + Clone, A: Any + Clone + Default>(initial: S, m: Expr<A>) -> (A, S) {
    let mut h = StateHandler::new(initial);
    let a = handle_expr_with(m, &mut h, A::default);
    (a, h.into_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cont::pure;

    #[test]
    fn test_get_put_cycle() {
        // let s = get in put(s + 1); get
        let m = get::<i32>().bind(|s| put(s + 1).then(get::<i32>()));
        assert_eq!(run_state(10, m), (11, 11));
    }

    #[test]
    fn test_modify_returns_new_state() {
        let m = modify(|s: i32| s * 2);
        assert_eq!(run_state(21, m), (42, 42));
    }

    #[test]
    fn test_eval_and_exec() {
        let m = || get::<i32>().bind(|s| put(s + 5).then(pure("done")));
        assert_eq!(eval_state(1, m()), "done");
        assert_eq!(exec_state(1, m()), 6);
    }

    #[test]
    fn test_fused_constructors() {
        // let s = get in put(s + 10); get  — all through fused markers
        let m = get_state(|s: i32| put_state(s + 10, get::<i32>()));
        assert_eq!(run_state(5, m), (15, 15));
    }

    #[test]
    fn test_modify_state_fused() {
        let m = modify_state(|s: i32| s + 1, |new| pure(new * 2));
        assert_eq!(run_state(10, m), (22, 11));
    }

    #[test]
    fn test_run_state_expr() {
        let m = Expr::perform(Get::<i32>::new())
            .bind(|s| Expr::perform(Put::new(s + 1)).then(Expr::perform(Get::<i32>::new())));
        assert_eq!(run_state_expr(10, m), (11, 11));
    }

    #[test]
    fn test_dispatching_custom_operation() {
        let m = dispatching(|s: &mut Vec<i32>| {
            s.push(1);
            s.len()
        });
        let (len, state) = run_state(vec![0], m);
        assert_eq!(len, 2);
        assert_eq!(state, vec![0, 1]);
    }

    #[test]
    #[should_panic(expected = "delimit: unhandled effect in StateHandler")]
    fn test_foreign_effect_panics() {
        let m = crate::reader::ask::<String>().map(|e| e.len() as i32);
        let _ = run_state(0i32, m);
    }

    #[test]
    fn test_state_pool_balanced() {
        let before = crate::pool::stats();
        let m = get_state(|s: i32| put_state(s + 10, get::<i32>()));
        assert_eq!(run_state(5, m), (15, 15));
        let after = crate::pool::stats();
        assert_eq!(after.outstanding(), before.outstanding());
    }
}
