//! Free-list pools for frames and chain nodes.
//!
//! Pools are thread-local: pooled nodes capture `Rc` closures and cannot
//! cross threads, and the evaluation model is single-threaded cooperative.
//! Every pooled node carries a `pooled` flag set on acquisition; release
//! zeroes all owning fields, clears the flag, and re-pools. Release is a
//! no-op for nodes built by the public constructors (flag unset), whose
//! output may be reused.
//!
//! Acquire/release counters are kept per thread so tests can verify that a
//! completed evaluation released every node it acquired.

use std::cell::{Cell, RefCell};

use crate::frame::{BindFrame, ChainNode, EffectFrame, Frame, ThenFrame, UnwindFrame};

/// Maximum number of free nodes retained per pool per thread.
pub(crate) const MAX_FREE: usize = 64;

/// A snapshot of one pool's acquire/release counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Nodes handed out since thread start.
    pub acquired: u64,
    /// Nodes returned since thread start.
    pub released: u64,
}

impl PoolStats {
    /// Acquired-minus-released; zero when the pool is balanced.
    pub fn outstanding(&self) -> i64 {
        self.acquired as i64 - self.released as i64
    }
}

#[derive(Default)]
pub(crate) struct Counter {
    acquired: Cell<u64>,
    released: Cell<u64>,
}

impl Counter {
    pub(crate) fn note_acquire(&self) {
        self.acquired.set(self.acquired.get() + 1);
    }

    pub(crate) fn note_release(&self) {
        self.released.set(self.released.get() + 1);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats { acquired: self.acquired.get(), released: self.released.get() }
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) marker: Counter,
    pub(crate) bind: Counter,
    pub(crate) then: Counter,
    pub(crate) effect: Counter,
    pub(crate) unwind: Counter,
    pub(crate) chain: Counter,
}

thread_local! {
    static COUNTERS: Counters = Counters::default();
}

pub(crate) fn with_counters<T>(f: impl FnOnce(&Counters) -> T) -> T {
    COUNTERS.with(f)
}

/// A snapshot of every pool's counters on the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSnapshot {
    /// Fused suspension markers.
    pub marker: PoolStats,
    /// Bind frames.
    pub bind: PoolStats,
    /// Then frames.
    pub then: PoolStats,
    /// Effect frames.
    pub effect: PoolStats,
    /// Unwind frames.
    pub unwind: PoolStats,
    /// Chain nodes.
    pub chain: PoolStats,
}

impl PoolSnapshot {
    /// Total acquired-minus-released across all pools.
    pub fn outstanding(&self) -> i64 {
        self.marker.outstanding()
            + self.bind.outstanding()
            + self.then.outstanding()
            + self.effect.outstanding()
            + self.unwind.outstanding()
            + self.chain.outstanding()
    }
}

/// Reads the current thread's pool counters.
pub fn stats() -> PoolSnapshot {
    with_counters(|c| PoolSnapshot {
        marker: c.marker.snapshot(),
        bind: c.bind.snapshot(),
        then: c.then.snapshot(),
        effect: c.effect.snapshot(),
        unwind: c.unwind.snapshot(),
        chain: c.chain.snapshot(),
    })
}

thread_local! {
    static BIND_POOL: RefCell<Vec<Box<BindFrame>>> = const { RefCell::new(Vec::new()) };
    static THEN_POOL: RefCell<Vec<Box<ThenFrame>>> = const { RefCell::new(Vec::new()) };
    static EFFECT_POOL: RefCell<Vec<Box<EffectFrame>>> = const { RefCell::new(Vec::new()) };
    static UNWIND_POOL: RefCell<Vec<Box<UnwindFrame>>> = const { RefCell::new(Vec::new()) };
    static CHAIN_POOL: RefCell<Vec<Box<ChainNode>>> = const { RefCell::new(Vec::new()) };
}

/// Acquires a pooled single-use [`BindFrame`] whose `f` and `next` fields
/// must be filled before evaluation.
pub fn acquire_bind_frame() -> Box<BindFrame> {
    with_counters(|c| c.bind.note_acquire());
    let mut f = BIND_POOL.with(|p| p.borrow_mut().pop()).unwrap_or_else(|| {
        tracing::debug!("bind frame pool miss, allocating");
        Box::new(BindFrame { f: None, next: Frame::Return, pooled: false })
    });
    f.pooled = true;
    f
}

/// Acquires a pooled single-use [`ThenFrame`] whose `second` and `next`
/// fields must be filled before evaluation.
pub fn acquire_then_frame() -> Box<ThenFrame> {
    with_counters(|c| c.then.note_acquire());
    let mut f = THEN_POOL.with(|p| p.borrow_mut().pop()).unwrap_or_else(|| {
        tracing::debug!("then frame pool miss, allocating");
        Box::new(ThenFrame { second: None, next: Frame::Return, pooled: false })
    });
    f.pooled = true;
    f
}

/// Acquires a pooled single-use [`EffectFrame`] whose `operation`,
/// `resume`, and `next` fields must be filled before evaluation.
pub fn acquire_effect_frame() -> Box<EffectFrame> {
    with_counters(|c| c.effect.note_acquire());
    let mut f = EFFECT_POOL.with(|p| p.borrow_mut().pop()).unwrap_or_else(|| {
        tracing::debug!("effect frame pool miss, allocating");
        Box::new(EffectFrame { operation: None, resume: None, next: Frame::Return, pooled: false })
    });
    f.pooled = true;
    f
}

/// Acquires a pooled single-use [`UnwindFrame`] whose payload slots and
/// `unwind` reducer must be filled before evaluation.
pub fn acquire_unwind_frame() -> Box<UnwindFrame> {
    with_counters(|c| c.unwind.note_acquire());
    let mut f = UNWIND_POOL.with(|p| p.borrow_mut().pop()).unwrap_or_else(|| {
        tracing::debug!("unwind frame pool miss, allocating");
        Box::new(UnwindFrame { data1: None, data2: None, data3: None, unwind: None, pooled: false })
    });
    f.pooled = true;
    f
}

/// Acquires a pooled chain node for an interpreter splice.
pub(crate) fn acquire_chain(first: Frame, rest: Frame) -> Box<ChainNode> {
    with_counters(|c| c.chain.note_acquire());
    let mut n = CHAIN_POOL.with(|p| p.borrow_mut().pop()).unwrap_or_else(|| {
        tracing::debug!("chain pool miss, allocating");
        ChainNode::new(Frame::Return, Frame::Return)
    });
    n.first = first;
    n.rest = rest;
    n.pooled = true;
    n
}

macro_rules! release_into {
    ($pool:ident, $counter:ident, $node:ident) => {
        with_counters(|c| c.$counter.note_release());
        $pool.with(|p| {
            let mut p = p.borrow_mut();
            if p.len() < MAX_FREE {
                p.push($node);
            }
        });
    };
}

/// Zeroes and re-pools a bind frame; no-op if not pooled.
pub(crate) fn release_bind(mut f: Box<BindFrame>) {
    if !f.pooled {
        return;
    }
    f.f = None;
    f.next = Frame::Return;
    f.pooled = false;
    release_into!(BIND_POOL, bind, f);
}

/// Zeroes and re-pools a then frame; no-op if not pooled.
pub(crate) fn release_then(mut f: Box<ThenFrame>) {
    if !f.pooled {
        return;
    }
    f.second = None;
    f.next = Frame::Return;
    f.pooled = false;
    release_into!(THEN_POOL, then, f);
}

/// Zeroes and re-pools an effect frame; no-op if not pooled.
pub(crate) fn release_effect(mut f: Box<EffectFrame>) {
    if !f.pooled {
        return;
    }
    f.operation = None;
    f.resume = None;
    f.next = Frame::Return;
    f.pooled = false;
    release_into!(EFFECT_POOL, effect, f);
}

/// Zeroes and re-pools an unwind frame; no-op if not pooled.
pub(crate) fn release_unwind(mut f: Box<UnwindFrame>) {
    if !f.pooled {
        return;
    }
    f.data1 = None;
    f.data2 = None;
    f.data3 = None;
    f.unwind = None;
    f.pooled = false;
    release_into!(UNWIND_POOL, unwind, f);
}

/// Zeroes and re-pools a chain node; no-op if not pooled.
pub(crate) fn release_chain(mut n: Box<ChainNode>) {
    if !n.pooled {
        return;
    }
    n.first = Frame::Return;
    n.rest = Frame::Return;
    n.pooled = false;
    release_into!(CHAIN_POOL, chain, n);
}
