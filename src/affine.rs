//! One-shot continuation wrappers.
//!
//! [`Affine`] wraps an arbitrary continuation with one-shot enforcement,
//! for clients that need to hand out a resumable callback without going
//! through the full effect machinery. The guard is a single atomic
//! counter: every attempt increments it, and the unique winner is the
//! attempt that observed zero — correct even when attempts race across
//! threads.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::fault::{self, Fault, DISCARD_MARK};

/// A continuation that may be resumed at most once.
///
/// Affine values model one-shot resource usage; continuations in effect
/// handlers must not be duplicated, and `Affine` is the standalone form of
/// that guarantee. Subsequent resume attempts panic ([`resume`](Self::resume))
/// or report failure ([`try_resume`](Self::try_resume)).
///
/// `Affine<F>` is `Send`/`Sync` exactly when `F` is, so a one-shot callback
/// built from a thread-safe closure can be raced from several threads; the
/// atomic guard admits exactly one winner.
pub struct Affine<F> {
    used: AtomicUsize,
    resume: F,
}

/// Creates an affine continuation from a regular one.
///
/// # Example
///
/// ```
/// use delimit::once;
///
/// let k = once(|x: i32| x + 1);
/// assert_eq!(k.resume(41), 42);
/// assert_eq!(k.try_resume(0), None);
/// ```
pub fn once<F>(k: F) -> Affine<F> {
    Affine { used: AtomicUsize::new(0), resume: k }
}

impl<F> Affine<F> {
    /// Invokes the continuation with the given value.
    ///
    /// Panics with the resumed-twice fault if the continuation has already
    /// been used, or the resumed-after-discard fault if it was discarded.
    pub fn resume<A, R>(&self, v: A) -> R
    where
        F: Fn(A) -> R,
    {
        match self.used.fetch_add(1, Ordering::AcqRel) {
            0 => (self.resume)(v),
            n if n >= DISCARD_MARK => fault::raise(Fault::ResumedAfterDiscard),
            _ => fault::raise(Fault::ResumedTwice),
        }
    }

    /// Attempts to invoke the continuation.
    ///
    /// Returns `None` if the continuation has already been used or
    /// discarded.
    pub fn try_resume<A, R>(&self, v: A) -> Option<R>
    where
        F: Fn(A) -> R,
    {
        match self.used.fetch_add(1, Ordering::AcqRel) {
            0 => Some((self.resume)(v)),
            _ => None,
        }
    }

    /// Marks the continuation as used without invoking it.
    pub fn discard(&self) {
        self.used.store(DISCARD_MARK, Ordering::Release);
    }
}

impl<F> std::fmt::Debug for Affine<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Affine")
            .field("used", &self.used.load(Ordering::Relaxed))
            .finish()
    }
}
