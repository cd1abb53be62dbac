//! Fatal protocol violations.
//!
//! Recoverable failures flow through the error effect as [`Either`] values.
//! Everything in this module is a precondition violation: the computation is
//! in a state the protocol forbids, and evaluation aborts via `panic!` with a
//! stable message rendered from [`Fault`].
//!
//! [`Either`]: crate::either::Either

use thiserror::Error;

/// A fatal violation of the effect protocol.
///
/// These are programming errors, not runtime conditions; none of them is
/// recoverable. The `Display` text of each variant is the panic message
/// (prefixed with `delimit: `), so tests can assert on it with
/// `#[should_panic(expected = ...)]`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A handler's dispatch found no capability matching the operation.
    #[error("unhandled effect in {handler}")]
    UnhandledEffect {
        /// Name of the handler that rejected the operation.
        handler: &'static str,
    },

    /// A one-shot continuation or suspension was resumed a second time.
    #[error("suspension resumed twice")]
    ResumedTwice,

    /// A one-shot continuation or suspension was resumed after `discard`.
    #[error("suspension resumed after discard")]
    ResumedAfterDiscard,

    /// The frame evaluator encountered a frame it cannot reduce.
    #[error("unknown frame variant")]
    UnknownFrame,

    /// The frame evaluator encountered an irreducible frame inside a chain.
    #[error("unknown frame variant in chain")]
    UnknownFrameInChain,
}

/// Counter value stored by `discard`, so that a later resume attempt reports
/// [`Fault::ResumedAfterDiscard`] instead of [`Fault::ResumedTwice`].
pub(crate) const DISCARD_MARK: usize = usize::MAX / 2;

/// Abort evaluation with the given fault.
pub(crate) fn raise(fault: Fault) -> ! {
    tracing::error!(%fault, "fatal effect-protocol violation");
    panic!("delimit: {fault}");
}

/// Abort evaluation because no capability matched the dispatched operation.
pub(crate) fn unhandled_effect(handler: &'static str) -> ! {
    raise(Fault::UnhandledEffect { handler });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_messages_are_stable() {
        assert_eq!(
            Fault::UnhandledEffect { handler: "StateHandler" }.to_string(),
            "unhandled effect in StateHandler"
        );
        assert_eq!(Fault::ResumedTwice.to_string(), "suspension resumed twice");
        assert_eq!(
            Fault::ResumedAfterDiscard.to_string(),
            "suspension resumed after discard"
        );
        assert_eq!(Fault::UnknownFrame.to_string(), "unknown frame variant");
        assert_eq!(
            Fault::UnknownFrameInChain.to_string(),
            "unknown frame variant in chain"
        );
    }

    #[test]
    #[should_panic(expected = "delimit: unhandled effect in ReaderHandler")]
    fn test_unhandled_effect_panics_with_handler_name() {
        unhandled_effect("ReaderHandler");
    }
}
