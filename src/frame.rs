//! Defunctionalized continuation frames.
//!
//! [`Expr<A>`] is the second representation of a computation: instead of
//! nested closures it carries a chain of tagged [`Frame`]s, which the
//! iterative evaluator in [`trampoline`](crate::trampoline) reduces one
//! step at a time without growing the call stack.
//!
//! Frames store their intermediate values type-erased. Two erased shapes
//! exist: handler replies are owned ([`Erased`]); values flowing through
//! the frame pipeline are shared ([`Shared`]), because frames are
//! reusable data and may be cloned. Concrete types are recovered with
//! [`recover`] at frame boundaries where the construction site's knowledge
//! applies — a recovery moves the value out when it is unaliased and
//! clones only if the frame chain was cloned.

use std::any::Any;
use std::mem;
use std::rc::Rc;

use crate::effect::{Erased, Op, Operation};
use crate::pool;

/// A shared type-erased value in the frame pipeline.
pub type Shared = Rc<dyn Any>;

/// Recovers a typed value from the shared pipeline.
///
/// Moves the value out when this is the only reference; clones when the
/// owning frame chain was cloned and the value is still aliased.
///
/// # Panics
///
/// Panics if the value is not an `A` — the frame was constructed for a
/// different intermediate type.
pub fn recover<A: Any + Clone>(v: Shared) -> A {
    let v = v.downcast::<A>().expect("frame value type mismatch");
    Rc::try_unwrap(v).unwrap_or_else(|rc| (*rc).clone())
}

/// Recovers a typed value that is never aliased (crate-internal values
/// created and consumed within one evaluation step).
pub(crate) fn take_unique<A: Any>(v: Shared) -> A {
    let v = v.downcast::<A>().expect("frame value type mismatch");
    match Rc::try_unwrap(v) {
        Ok(a) => a,
        Err(_) => unreachable!("single-step frame value aliased"),
    }
}

/// The continuation function of a [`BindFrame`].
pub type BindFn = Rc<dyn Fn(Shared) -> Expr<Shared>>;

/// The transformation function of a [`MapFrame`].
pub type MapFn = Rc<dyn Fn(Shared) -> Shared>;

/// The resume function of an [`EffectFrame`]: maps the handler's owned
/// reply into the next pipeline value.
pub type ResumeFn = Rc<dyn Fn(Erased) -> Shared>;

/// A payload slot of an [`UnwindFrame`].
pub type UnwindData = Option<Shared>;

/// The reducer of an [`UnwindFrame`]: a plain function pointer over the
/// frame's three payload slots and the current value, producing the next
/// `(value, frame)` pair. Closure-free by construction.
pub type UnwindFn = fn(UnwindData, UnwindData, UnwindData, Option<Shared>) -> (Option<Shared>, Frame);

/// A node in a defunctionalized continuation chain.
#[derive(Clone)]
pub enum Frame {
    /// Terminal; the accumulated value is the result.
    Return,
    /// Monadic bind: apply the stored function to the current value and
    /// splice the resulting chain.
    Bind(Box<BindFrame>),
    /// Functor map: replace the current value.
    Map(Box<MapFrame>),
    /// Sequencing with discard: drop the current value, adopt the second
    /// computation.
    Then(Box<ThenFrame>),
    /// A suspended effect operation awaiting handler dispatch.
    Effect(Box<EffectFrame>),
    /// Pure composition of two chains.
    Chain(Box<ChainNode>),
    /// A closure-free user-defined step: payload slots plus a reducer.
    Unwind(Box<UnwindFrame>),
    /// An open-extension frame. Frames that do not override
    /// [`UserFrame::unwind`] cannot be evaluated and abort with the
    /// unknown-frame fault.
    User(Rc<dyn UserFrame>),
}

impl Frame {
    /// Whether this is the terminal [`Frame::Return`].
    pub fn is_return(&self) -> bool {
        matches!(self, Frame::Return)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Return => f.write_str("Return"),
            Frame::Bind(_) => f.write_str("Bind"),
            Frame::Map(_) => f.write_str("Map"),
            Frame::Then(_) => f.write_str("Then"),
            Frame::Effect(_) => f.write_str("Effect"),
            Frame::Chain(_) => f.write_str("Chain"),
            Frame::Unwind(_) => f.write_str("Unwind"),
            Frame::User(_) => f.write_str("User"),
        }
    }
}

/// An advanced extension point: arbitrary user frames.
///
/// The evaluator invokes [`unwind`](Self::unwind) for a single reduction
/// step. The default implementation returns `None`, which the evaluator
/// treats as an irreducible frame and aborts with
/// [`Fault::UnknownFrame`](crate::fault::Fault::UnknownFrame).
pub trait UserFrame {
    /// Performs one reduction step: consumes the current value and yields
    /// the next `(value, frame)` pair.
    fn unwind(&self, current: Option<Shared>) -> Option<(Option<Shared>, Frame)> {
        let _ = current;
        None
    }
}

/// Monadic bind as data: `bind(m, f)`.
pub struct BindFrame {
    /// The continuation function to apply to the incoming value.
    pub f: Option<BindFn>,
    /// The frame to continue with after `f`'s result completes.
    pub next: Frame,
    pub(crate) pooled: bool,
}

impl BindFrame {
    /// Builds an unpooled bind frame.
    pub fn new(f: BindFn, next: Frame) -> Box<Self> {
        Box::new(BindFrame { f: Some(f), next, pooled: false })
    }

    /// Extracts the fields, releasing pooled storage first.
    pub(crate) fn consume(mut self: Box<Self>) -> (BindFn, Frame) {
        let f = self.f.take().expect("bind frame function missing");
        let next = mem::replace(&mut self.next, Frame::Return);
        pool::release_bind(self);
        (f, next)
    }
}

impl Clone for BindFrame {
    fn clone(&self) -> Self {
        BindFrame { f: self.f.clone(), next: self.next.clone(), pooled: false }
    }
}

/// Functor map as data: `map(m, f)`. Flyweight: never pooled.
pub struct MapFrame {
    /// The transformation function.
    pub f: MapFn,
    /// The frame to continue with after transformation.
    pub next: Frame,
}

impl MapFrame {
    /// Builds a map frame.
    pub fn new(f: MapFn, next: Frame) -> Box<Self> {
        Box::new(MapFrame { f, next })
    }
}

impl Clone for MapFrame {
    fn clone(&self) -> Self {
        MapFrame { f: self.f.clone(), next: self.next.clone() }
    }
}

/// Sequencing as data: `then(m, n)`.
pub struct ThenFrame {
    /// The computation to adopt after discarding the incoming value.
    pub second: Option<Expr<Shared>>,
    /// The frame to continue with after `second` completes.
    pub next: Frame,
    pub(crate) pooled: bool,
}

impl ThenFrame {
    /// Builds an unpooled then frame.
    pub fn new(second: Expr<Shared>, next: Frame) -> Box<Self> {
        Box::new(ThenFrame { second: Some(second), next, pooled: false })
    }

    /// Extracts the fields, releasing pooled storage first.
    pub(crate) fn consume(mut self: Box<Self>) -> (Expr<Shared>, Frame) {
        let second = self.second.take().expect("then frame second missing");
        let next = mem::replace(&mut self.next, Frame::Return);
        pool::release_then(self);
        (second, next)
    }
}

impl Clone for ThenFrame {
    fn clone(&self) -> Self {
        ThenFrame { second: self.second.clone(), next: self.next.clone(), pooled: false }
    }
}

/// A suspended effect operation as data.
pub struct EffectFrame {
    /// The operation for handler dispatch.
    pub operation: Option<Operation>,
    /// Called with the handler's reply to produce the next value.
    pub resume: Option<ResumeFn>,
    /// The frame to continue with after resumption.
    pub next: Frame,
    pub(crate) pooled: bool,
}

impl EffectFrame {
    /// Builds an unpooled effect frame.
    pub fn new(operation: Operation, resume: ResumeFn, next: Frame) -> Box<Self> {
        Box::new(EffectFrame {
            operation: Some(operation),
            resume: Some(resume),
            next,
            pooled: false,
        })
    }

    /// Extracts the fields, releasing pooled storage first.
    pub(crate) fn consume(mut self: Box<Self>) -> (Operation, ResumeFn, Frame) {
        let op = self.operation.take().expect("effect frame operation missing");
        let resume = self.resume.take().expect("effect frame resume missing");
        let next = mem::replace(&mut self.next, Frame::Return);
        pool::release_effect(self);
        (op, resume, next)
    }
}

impl Clone for EffectFrame {
    fn clone(&self) -> Self {
        EffectFrame {
            operation: self.operation.clone(),
            resume: self.resume.clone(),
            next: self.next.clone(),
            pooled: false,
        }
    }
}

/// An unrolled continuation frame that avoids closure allocation.
///
/// Stores up to three type-erased payload values alongside a plain function
/// pointer; the evaluator passes the payloads and the current value to the
/// reducer for a single step.
pub struct UnwindFrame {
    /// First payload slot.
    pub data1: UnwindData,
    /// Second payload slot.
    pub data2: UnwindData,
    /// Third payload slot.
    pub data3: UnwindData,
    /// The single-step reducer.
    pub unwind: Option<UnwindFn>,
    pub(crate) pooled: bool,
}

impl UnwindFrame {
    /// Builds an unpooled unwind frame.
    pub fn new(data1: UnwindData, data2: UnwindData, data3: UnwindData, unwind: UnwindFn) -> Box<Self> {
        Box::new(UnwindFrame { data1, data2, data3, unwind: Some(unwind), pooled: false })
    }

    /// Extracts the fields, releasing pooled storage first.
    pub(crate) fn consume(mut self: Box<Self>) -> (UnwindData, UnwindData, UnwindData, UnwindFn) {
        let d1 = self.data1.take();
        let d2 = self.data2.take();
        let d3 = self.data3.take();
        let f = self.unwind.take().expect("unwind frame reducer missing");
        pool::release_unwind(self);
        (d1, d2, d3, f)
    }
}

impl Clone for UnwindFrame {
    fn clone(&self) -> Self {
        UnwindFrame {
            data1: self.data1.clone(),
            data2: self.data2.clone(),
            data3: self.data3.clone(),
            unwind: self.unwind,
            pooled: false,
        }
    }
}

/// Pure composition of two frame chains.
pub struct ChainNode {
    pub(crate) first: Frame,
    pub(crate) rest: Frame,
    pub(crate) pooled: bool,
}

impl ChainNode {
    /// Builds an unpooled chain node.
    pub(crate) fn new(first: Frame, rest: Frame) -> Box<Self> {
        Box::new(ChainNode { first, rest, pooled: false })
    }

    /// Extracts the fields, releasing pooled storage first.
    pub(crate) fn consume(mut self: Box<Self>) -> (Frame, Frame) {
        let first = mem::replace(&mut self.first, Frame::Return);
        let rest = mem::replace(&mut self.rest, Frame::Return);
        pool::release_chain(self);
        (first, rest)
    }
}

impl Clone for ChainNode {
    fn clone(&self) -> Self {
        ChainNode { first: self.first.clone(), rest: self.rest.clone(), pooled: false }
    }
}

/// A defunctionalized computation.
///
/// A pair of a value and a frame chain. When `frame` is [`Frame::Return`]
/// the computation has completed with `value`; otherwise `value` is
/// unobserved and `frame` heads the remaining work.
#[derive(Clone)]
pub struct Expr<A> {
    pub(crate) value: Option<A>,
    pub(crate) frame: Frame,
}

impl<A: Any> Expr<A> {
    /// A completed computation with the given value.
    pub fn of(a: A) -> Self {
        Expr { value: Some(a), frame: Frame::Return }
    }

    /// A computation suspended at the given frame.
    pub fn suspended(frame: Frame) -> Self {
        Expr { value: None, frame }
    }

    /// A computation that performs an effect operation.
    ///
    /// This is the `Expr` counterpart of [`perform`](crate::effect::perform):
    /// the computation suspends at an [`EffectFrame`] carrying the
    /// operation, and the handler's reply becomes the value.
    pub fn perform<O: Op<Output = A>>(op: O) -> Self {
        Expr::suspended(Frame::Effect(EffectFrame::new(
            Rc::new(op),
            identity_resume(),
            Frame::Return,
        )))
    }

    /// Whether the computation has completed.
    pub fn is_complete(&self) -> bool {
        self.frame.is_return()
    }

    /// Erases the value type for the homogeneous evaluation pipeline.
    ///
    /// Used when feeding typed computations into directly-constructed
    /// frames ([`ThenFrame::new`], [`BindFrame`] functions).
    pub fn erase(self) -> Expr<Shared> {
        Expr { value: self.value.map(|a| Rc::new(a) as Shared), frame: self.frame }
    }
}

/// The pass-through resume used by `Expr::perform` and `throw_expr`: the
/// handler's owned reply becomes the pipeline value unchanged.
pub(crate) fn identity_resume() -> ResumeFn {
    Rc::new(|v: Erased| Rc::from(v))
}
