//! Closure-encoded continuation-passing computations.
//!
//! [`Cont<R, A>`] computes a value of type `A` with final answer type `R`.
//! It wraps a function that receives a continuation `k: Fn(A) -> R` — "the
//! rest of the computation" — and produces the final answer by (eventually)
//! applying `k`.
//!
//! Continuations here are multishot: a captured continuation may be invoked
//! zero or more times, which [`shift`](crate::control::shift) relies on. The
//! encoding is therefore `Rc`-backed `Fn` closures rather than `FnOnce`; a
//! `Cont` value is cheap to clone and may be run more than once.
//!
//! Minimal monad definition: [`Cont::of`] (unit) and [`Cont::bind`] are
//! necessary and sufficient. [`Cont::map`] and [`Cont::then`] are derived
//! operations kept as optimizations to avoid intermediate closures.

use std::rc::Rc;

use crate::effect::Resumed;

/// A reified continuation: the rest of the computation, awaiting an `A`.
pub type ContFn<A, R> = Rc<dyn Fn(A) -> R>;

/// A continuation-passing computation producing `A` with answer type `R`.
///
/// A computation is *pure* when applying it to a continuation simply applies
/// the continuation; with `R = `[`Resumed`] it may instead return an effect
/// suspension, which is how [`perform`](crate::effect::perform) works.
pub struct Cont<R, A> {
    cps: Rc<dyn Fn(ContFn<A, R>) -> R>,
}

/// An effectful computation producing a value of type `A`.
///
/// This is the most common continuation type in effectful code; its answer
/// type is the opaque [`Resumed`], which carries either a final value or a
/// pending effect suspension.
pub type Eff<A> = Cont<Resumed, A>;

impl<R, A> Clone for Cont<R, A> {
    fn clone(&self) -> Self {
        Cont { cps: Rc::clone(&self.cps) }
    }
}

impl<R: 'static, A: 'static> Cont<R, A> {
    /// Lifts a pure value into the continuation monad.
    ///
    /// The resulting computation immediately passes the value to its
    /// continuation.
    pub fn of(a: A) -> Self
    where
        A: Clone,
    {
        Cont { cps: Rc::new(move |k: ContFn<A, R>| k(a.clone())) }
    }

    /// Creates a continuation from a CPS function.
    ///
    /// This is the primitive constructor for computations that need direct
    /// access to their continuation.
    pub fn suspend(f: impl Fn(ContFn<A, R>) -> R + 'static) -> Self {
        Cont { cps: Rc::new(f) }
    }

    /// Sequences two computations (monadic bind).
    ///
    /// Runs `self`, then passes the result to `f` to get the next
    /// computation.
    pub fn bind<B: 'static>(self, f: impl Fn(A) -> Cont<R, B> + 'static) -> Cont<R, B> {
        let f: Rc<dyn Fn(A) -> Cont<R, B>> = Rc::new(f);
        Cont {
            cps: Rc::new(move |k: ContFn<B, R>| {
                let f = Rc::clone(&f);
                (self.cps)(Rc::new(move |a: A| f(a).call(Rc::clone(&k))))
            }),
        }
    }

    /// Applies a pure function to the result.
    ///
    /// Equivalent to `bind(|a| Cont::of(f(a)))` but avoids the intermediate
    /// `of` closure, making it the preferred choice when the transformation
    /// does not produce effects.
    pub fn map<B: 'static>(self, f: impl Fn(A) -> B + 'static) -> Cont<R, B> {
        let f: Rc<dyn Fn(A) -> B> = Rc::new(f);
        Cont {
            cps: Rc::new(move |k: ContFn<B, R>| {
                let f = Rc::clone(&f);
                (self.cps)(Rc::new(move |a: A| k(f(a))))
            }),
        }
    }

    /// Sequences two computations, discarding the first result.
    ///
    /// More efficient than `bind` when the second computation does not
    /// depend on the first result: no transformation closure is captured.
    pub fn then<B: 'static>(self, n: Cont<R, B>) -> Cont<R, B> {
        Cont {
            cps: Rc::new(move |k: ContFn<B, R>| {
                let n = n.clone();
                (self.cps)(Rc::new(move |_: A| n.call(Rc::clone(&k))))
            }),
        }
    }

    /// Executes the computation with a custom final continuation.
    pub fn run_with(self, k: impl Fn(A) -> R + 'static) -> R {
        (self.cps)(Rc::new(k))
    }

    /// Applies the computation to an already-reified continuation.
    pub(crate) fn call(&self, k: ContFn<A, R>) -> R {
        (self.cps)(k)
    }
}

impl<A: 'static> Cont<A, A> {
    /// Executes the computation with the identity continuation.
    ///
    /// The answer type must match the value type.
    pub fn run(self) -> A {
        (self.cps)(Rc::new(|a| a))
    }
}

/// Lifts a value into an effectful computation with no effects.
///
/// `pure(a)` is [`Cont::of`] specialized to the effect answer type, with
/// full inference on `A`.
pub fn pure<A: Clone + 'static>(a: A) -> Eff<A> {
    Cont::of(a)
}
