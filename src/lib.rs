//! # delimit
//!
//! Delimited continuations and algebraic effects as first-class,
//! composable values.
//!
//! Client code expresses effectful computations — state, reader, writer,
//! error, or user-defined operations — as pure descriptions; handlers
//! interpret those descriptions by intercepting operations and deciding
//! how to resume. The same computation exists in two interchangeable
//! representations:
//!
//! - **Closure form** ([`Cont`]): a continuation-passing computation
//!   `(A → R) → R` with monadic composition and the delimited control
//!   operators [`shift`]/[`reset`].
//! - **Frame form** ([`Expr`]): the same computation defunctionalized into
//!   a chain of tagged frames, evaluated by a pool-backed iterative
//!   trampoline that never grows the call stack.
//!
//! [`reify`] and [`reflect`] translate between the two on demand, lazily
//! for effectful subcomputations, and preserve semantics: the same final
//! value, the same observable effect sequence, the same handler
//! interaction.
//!
//! ## Core operations
//!
//! Minimal monad definition: [`Cont::of`] (unit) and [`Cont::bind`].
//! Derived: [`Cont::map`], [`Cont::then`]. Execution: [`Cont::run`],
//! [`Cont::run_with`]. Delimited control: [`shift`], [`reset`].
//!
//! ## Algebraic effects
//!
//! Operations implement [`Op`] with an associated `Output` type; handlers
//! implement [`Handler`] (or are built from a closure with
//! [`handler_fn`]). [`perform`] raises an operation; [`handle`] /
//! [`handle_expr`] run a computation under a handler.
//!
//! Standard effects ship in [`state`], [`reader`], [`writer`], and
//! [`error`], with composed multi-effect runners in [`compose`] and
//! resource-safety wrappers in [`resource`].
//!
//! ## Stepping
//!
//! [`step`] and [`step_expr`] give one-effect-at-a-time evaluation for
//! external drivers (event loops, schedulers): each [`Suspension`] exposes
//! the pending operation and a one-shot resume handle. Suspensions — and
//! the standalone [`Affine`] wrapper from [`once`] — may be resumed at
//! most once, enforced by an atomic guard.
//!
//! ## Nil-completion convention
//!
//! Effect runners and stepping treat an empty [`Resumed`] as "completed
//! with the zero value" (`Default::default()`). Computations whose final
//! result needs to distinguish "empty" from "zero" should wrap it in
//! [`Either`] or `Option`.
//!
//! # Example
//!
//! ```
//! use delimit::state::{get, put, run_state};
//!
//! // let s = get in put(s + 1); get
//! let program = get::<i32>().bind(|s| put(s + 1).then(get::<i32>()));
//! assert_eq!(run_state(10, program), (11, 11));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod affine;
pub mod bridge;
pub mod compose;
pub mod cont;
pub mod control;
pub mod effect;
pub mod either;
pub mod error;
pub mod fault;
pub mod frame;
mod marker;
pub mod pool;
pub mod reader;
pub mod resource;
pub mod state;
pub mod step;
pub mod trampoline;
pub mod writer;

pub use affine::{once, Affine};
pub use bridge::{reflect, reify};
pub use cont::{pure, Cont, ContFn, Eff};
pub use control::{reset, shift};
pub use effect::{
    handle, handler_fn, perform, Dispatch, Erased, Handler, HandlerFn, Op, Operation, Resumed,
};
pub use either::Either;
pub use fault::Fault;
pub use frame::{
    recover, BindFrame, BindFn, ChainNode, EffectFrame, Expr, Frame, MapFrame, MapFn, ResumeFn,
    Shared, ThenFrame, UnwindData, UnwindFn, UnwindFrame, UserFrame,
};
pub use pool::{acquire_bind_frame, acquire_effect_frame, acquire_then_frame, acquire_unwind_frame};
pub use step::{step, step_expr, StepResult, Suspension};
pub use trampoline::{chain_frames, handle_expr};
pub use writer::Pair;
