//! Fused effect-suspension markers and their pool.
//!
//! A suspension carries a pending operation and a typed resume path. Four
//! shapes exist — bare effect, effect fused with `bind`, with `then`, and
//! with `map` — and all four share one pooled [`Marker`] struct: the shape
//! is the monomorphized resume function pointer stored in the marker, so a
//! single free list covers every case and resumption allocates nothing.
//!
//! Markers are acquired by [`perform`](crate::effect::perform) and the
//! fused constructors, and released on the resume path immediately after
//! their fields are read, before the continuation runs.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::cont::{ContFn, Eff};
use crate::effect::{Erased, Operation, Resumed};
use crate::pool;

/// Maximum number of free markers retained per thread.
const MAX_FREE: usize = 64;

/// A monomorphized resume strategy. Consumes the marker (releasing it back
/// to the pool) and continues the computation with the handler's reply.
pub(crate) type MarkerResume = fn(Box<Marker>, Erased) -> Resumed;

/// A pooled effect-suspension marker.
///
/// Field meaning depends on the resume strategy: `payload` holds the fused
/// bind function / next computation / map function (or nothing for a bare
/// effect), `k` holds the erased typed continuation.
pub(crate) struct Marker {
    pub(crate) op: Option<Operation>,
    pub(crate) resume: Option<MarkerResume>,
    pub(crate) payload: Option<Erased>,
    pub(crate) k: Option<Erased>,
    pooled: bool,
}

impl Marker {
    fn empty() -> Self {
        Marker { op: None, resume: None, payload: None, k: None, pooled: false }
    }
}

thread_local! {
    static MARKER_POOL: RefCell<Vec<Box<Marker>>> = const { RefCell::new(Vec::new()) };
}

/// Acquires a marker from the thread-local pool (or allocates on miss).
pub(crate) fn acquire() -> Box<Marker> {
    pool::with_counters(|c| c.marker.note_acquire());
    let mut m = MARKER_POOL.with(|p| p.borrow_mut().pop()).unwrap_or_else(|| {
        tracing::debug!("marker pool miss, allocating");
        Box::new(Marker::empty())
    });
    m.pooled = true;
    m
}

/// Zeroes all owning fields and returns the marker to the pool.
///
/// No-op for markers that were not pool-acquired.
pub(crate) fn release(mut m: Box<Marker>) {
    if !m.pooled {
        return;
    }
    m.op = None;
    m.resume = None;
    m.payload = None;
    m.k = None;
    m.pooled = false;
    pool::with_counters(|c| c.marker.note_release());
    MARKER_POOL.with(|p| {
        let mut p = p.borrow_mut();
        if p.len() < MAX_FREE {
            p.push(m);
        }
    });
}

/// A pending effect suspension: a pooled marker or a one-off closure.
///
/// The closure shape is used by `reflect`, which synthesizes suspensions
/// whose resume re-enters the frame evaluator.
pub(crate) enum Suspended {
    Marker(Box<Marker>),
    Closure(ClosureMarker),
}

/// An unpooled suspension built from a plain resume closure.
pub(crate) struct ClosureMarker {
    pub(crate) op: Operation,
    pub(crate) k: Box<dyn FnOnce(Erased) -> Resumed>,
}

impl Suspended {
    /// The pending operation, for handler dispatch.
    pub(crate) fn op(&self) -> &dyn Any {
        match self {
            Suspended::Marker(m) => {
                m.op.as_deref().expect("marker operation missing")
            }
            Suspended::Closure(c) => &*c.op,
        }
    }

    /// A shared handle on the pending operation.
    pub(crate) fn operation(&self) -> Operation {
        match self {
            Suspended::Marker(m) => {
                Rc::clone(m.op.as_ref().expect("marker operation missing"))
            }
            Suspended::Closure(c) => Rc::clone(&c.op),
        }
    }

    /// Continues the computation with the handler's reply.
    pub(crate) fn resume(self, v: Erased) -> Resumed {
        match self {
            Suspended::Marker(mut m) => {
                let resume = m.resume.take().expect("marker resume missing");
                resume(m, v)
            }
            Suspended::Closure(c) => (c.k)(v),
        }
    }

    /// Abandons the suspension, returning pooled storage without resuming.
    pub(crate) fn release(self) {
        match self {
            Suspended::Marker(m) => release(m),
            Suspended::Closure(_) => {}
        }
    }
}

// ----------------------------------------------------------------------
// Resume strategies (one per fused shape)
// ----------------------------------------------------------------------

/// Bare effect: apply the typed final continuation to the reply.
pub(crate) fn effect_resume<A: Any>(mut m: Box<Marker>, v: Erased) -> Resumed {
    let k = m.k.take().expect("marker continuation missing");
    release(m);
    let k = *k
        .downcast::<ContFn<A, Resumed>>()
        .expect("marker continuation type mismatch");
    let v = *v.downcast::<A>().expect("resume value type mismatch");
    k(v)
}

/// Fused `perform` + `bind`: feed the reply to `f`, run the result.
pub(crate) fn bind_resume<A: Any, B: Any>(mut m: Box<Marker>, v: Erased) -> Resumed {
    let f = m.payload.take().expect("marker payload missing");
    let k = m.k.take().expect("marker continuation missing");
    release(m);
    let f = *f
        .downcast::<Rc<dyn Fn(A) -> Eff<B>>>()
        .expect("marker payload type mismatch");
    let k = *k
        .downcast::<ContFn<B, Resumed>>()
        .expect("marker continuation type mismatch");
    let v = *v.downcast::<A>().expect("resume value type mismatch");
    f(v).call(k)
}

/// Fused `perform` + `then`: discard the reply, run the next computation.
pub(crate) fn then_resume<B: Any>(mut m: Box<Marker>, _v: Erased) -> Resumed {
    let next = m.payload.take().expect("marker payload missing");
    let k = m.k.take().expect("marker continuation missing");
    release(m);
    let next = *next.downcast::<Eff<B>>().expect("marker payload type mismatch");
    let k = *k
        .downcast::<ContFn<B, Resumed>>()
        .expect("marker continuation type mismatch");
    next.call(k)
}

/// Fused `perform` + `map`: apply `f` to the reply, continue.
pub(crate) fn map_resume<A: Any, B: Any>(mut m: Box<Marker>, v: Erased) -> Resumed {
    let f = m.payload.take().expect("marker payload missing");
    let k = m.k.take().expect("marker continuation missing");
    release(m);
    let f = *f
        .downcast::<Rc<dyn Fn(A) -> B>>()
        .expect("marker payload type mismatch");
    let k = *k
        .downcast::<ContFn<B, Resumed>>()
        .expect("marker continuation type mismatch");
    let v = *v.downcast::<A>().expect("resume value type mismatch");
    k(f(v))
}

// ----------------------------------------------------------------------
// Fused constructors
// ----------------------------------------------------------------------

/// Builds a fused `perform(op)`-then-`bind(f)` computation.
pub(crate) fn fused_bind<A: Any, B: Any>(
    op: Operation,
    f: Rc<dyn Fn(A) -> Eff<B>>,
) -> Eff<B> {
    crate::cont::Cont::suspend(move |k: ContFn<B, Resumed>| {
        let mut m = acquire();
        m.op = Some(Rc::clone(&op));
        m.payload = Some(Box::new(Rc::clone(&f)));
        m.k = Some(Box::new(k));
        m.resume = Some(bind_resume::<A, B>);
        Resumed::suspended(Suspended::Marker(m))
    })
}

/// Builds a fused `perform(op)`-then-`then(next)` computation.
pub(crate) fn fused_then<B: Any>(op: Operation, next: Eff<B>) -> Eff<B> {
    crate::cont::Cont::suspend(move |k: ContFn<B, Resumed>| {
        let mut m = acquire();
        m.op = Some(Rc::clone(&op));
        m.payload = Some(Box::new(next.clone()));
        m.k = Some(Box::new(k));
        m.resume = Some(then_resume::<B>);
        Resumed::suspended(Suspended::Marker(m))
    })
}

/// Builds a fused `perform(op)`-then-`map(f)` computation.
pub(crate) fn fused_map<A: Any, B: Any>(op: Operation, f: Rc<dyn Fn(A) -> B>) -> Eff<B> {
    crate::cont::Cont::suspend(move |k: ContFn<B, Resumed>| {
        let mut m = acquire();
        m.op = Some(Rc::clone(&op));
        m.payload = Some(Box::new(Rc::clone(&f)));
        m.k = Some(Box::new(k));
        m.resume = Some(map_resume::<A, B>);
        Resumed::suspended(Suspended::Marker(m))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{handle, handler_fn, Dispatch};

    struct Probe;

    #[test]
    fn test_marker_acquire_release_roundtrip() {
        let before = pool::stats().marker;
        let m = acquire();
        release(m);
        let after = pool::stats().marker;
        assert_eq!(after.acquired - before.acquired, 1);
        assert_eq!(after.released - before.released, 1);
    }

    #[test]
    fn test_release_is_noop_for_unpooled() {
        let before = pool::stats().marker;
        release(Box::new(Marker::empty()));
        let after = pool::stats().marker;
        assert_eq!(after.released, before.released);
    }

    #[test]
    fn test_fused_shapes_balance_pool() {
        let before = pool::stats().marker;
        let m = fused_bind::<i32, i32>(
            Rc::new(Probe),
            Rc::new(|v: i32| crate::cont::pure(v + 1)),
        );
        let result = handle(
            m,
            handler_fn(|op: &dyn Any| {
                assert!(op.downcast_ref::<Probe>().is_some());
                Dispatch::Resume(Box::new(41i32))
            }),
        );
        assert_eq!(result, 42);
        let after = pool::stats().marker;
        assert_eq!(
            after.acquired - before.acquired,
            after.released - before.released
        );
    }
}
