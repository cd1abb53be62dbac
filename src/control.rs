//! Delimited control operators.
//!
//! `shift`/`reset` follow Danvy & Filinski's formulation (1990). Because the
//! library already represents computations in CPS, neither operator needs
//! runtime stack capture: `shift` reifies the continuation it receives, and
//! `reset` runs its body under the identity continuation lifted to the
//! answer type.

use crate::cont::{Cont, ContFn};

/// Captures the current continuation up to the nearest [`reset`].
///
/// The function `f` receives the captured continuation `k`, which may be
/// invoked zero or more times; each invocation restarts from the capture
/// point. A `shift` outside any `reset` captures up to the outermost
/// [`Cont::run`], which acts as the implicit delimiter.
///
/// # Example
///
/// ```
/// use delimit::{shift, reset, Cont};
///
/// // k is applied twice: (3 * 2) * 2 = 12
/// let m = reset::<i32, i32>(
///     shift(|k: delimit::ContFn<i32, i32>| k(k(3)))
///         .bind(|x| Cont::of(x * 2)),
/// );
/// assert_eq!(m.run(), 12);
/// ```
pub fn shift<R: 'static, A: 'static>(f: impl Fn(ContFn<A, R>) -> R + 'static) -> Cont<R, A> {
    Cont::suspend(f)
}

/// Establishes a delimiter for [`shift`].
///
/// Continuations captured by `shift` stop at the nearest enclosing `reset`.
/// The body is evaluated immediately under the identity continuation and its
/// result lifted into the outer answer type.
pub fn reset<R: 'static, A: Clone + 'static>(m: Cont<A, A>) -> Cont<R, A> {
    Cont::of(m.run())
}
