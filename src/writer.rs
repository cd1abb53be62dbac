//! The Writer effect: accumulating output.
//!
//! [`Tell`] appends to an output sequence held by the handler. [`listen`]
//! and [`censor`] run a sub-computation under a scoped view of the output
//! appended while it ran.
//!
//! Scope restriction: the bodies of `listen` and `censor` run under an
//! internal writer-only handler — effect operations from other families
//! performed inside the scope are not forwarded to the outer handler and
//! abort with the unhandled-effect fault. This is a deliberate
//! restriction, not an oversight.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::cont::Eff;
use crate::effect::{handle_dispatch, perform, to_resumed, Dispatch, Erased, Handler, Op};
use crate::fault;
use crate::frame::Expr;
use crate::marker::fused_then;
use crate::trampoline::handle_expr_with;

/// Two values. The result shape of [`listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pair<A, B> {
    /// The first component.
    pub fst: A,
    /// The second component.
    pub snd: B,
}

/// The mutable output sequence a writer handler dispatches against.
pub struct WriterContext<W> {
    pub(crate) output: Vec<W>,
}

impl<W> WriterContext<W> {
    pub(crate) fn new() -> Self {
        WriterContext { output: Vec::new() }
    }
}

/// Operations dispatchable against an output sequence.
pub trait WriterOp<W> {
    /// Applies the operation to the output and produces the resume value.
    fn dispatch_writer(&self, ctx: &mut WriterContext<W>) -> Erased;
}

/// Appends a value to the output.
///
/// `perform(Tell::new(w))` resumes with `()`.
pub struct Tell<W> {
    /// The value to append.
    pub value: W,
}

impl<W> Tell<W> {
    /// The append operation.
    pub fn new(value: W) -> Self {
        Tell { value }
    }
}

impl<W: Any> Op for Tell<W> {
    type Output = ();
}

impl<W: Any + Clone> WriterOp<W> for Tell<W> {
    fn dispatch_writer(&self, ctx: &mut WriterContext<W>) -> Erased {
        ctx.output.push(self.value.clone());
        Box::new(())
    }
}

/// Observes the output of a sub-computation.
///
/// Carries its body with the result type erased; built by [`listen`].
pub struct Listen<W> {
    run: Rc<dyn Fn(&mut WriterContext<W>) -> Erased>,
}

impl<W: Any> WriterOp<W> for Listen<W> {
    fn dispatch_writer(&self, ctx: &mut WriterContext<W>) -> Erased {
        (self.run)(ctx)
    }
}

/// Rewrites the output of a sub-computation.
///
/// Carries its body and censor function erased; built by [`censor`].
pub struct Censor<W> {
    run: Rc<dyn Fn(&mut WriterContext<W>) -> Erased>,
}

impl<W: Any> WriterOp<W> for Censor<W> {
    fn dispatch_writer(&self, ctx: &mut WriterContext<W>) -> Erased {
        (self.run)(ctx)
    }
}

/// Appends a value to the output.
pub fn tell<W: Any + Clone>(value: W) -> Eff<()> {
    perform(Tell::new(value))
}

/// Fused `tell` + `then`: appends, then runs `next`.
pub fn tell_writer<W: Any + Clone, B: Any>(value: W, next: Eff<B>) -> Eff<B> {
    fused_then::<B>(Rc::new(Tell::new(value)), next)
}

/// Runs `body` and resumes with both its result and the output it
/// appended.
///
/// The total output keeps the appended values; the suspension's result
/// pairs the body's value with just the newly appended slice. See the
/// module documentation for the scope restriction.
pub fn listen<W: Any + Clone, A: Any + Default>(body: Eff<A>) -> Eff<Pair<A, Vec<W>>> {
    let run: Rc<dyn Fn(&mut WriterContext<W>) -> Erased> = Rc::new(move |ctx| {
        let start = ctx.output.len();
        let result = scoped_run::<W, A>(body.clone(), ctx);
        let written = ctx.output[start..].to_vec();
        Box::new(Pair { fst: result, snd: written })
    });
    crate::effect::perform_raw::<Pair<A, Vec<W>>>(Rc::new(Listen::<W> { run }))
}

/// Runs `body` and rewrites the output it appended with `f`.
///
/// See the module documentation for the scope restriction.
pub fn censor<W: Any + Clone, A: Any + Default>(
    f: impl Fn(Vec<W>) -> Vec<W> + 'static,
    body: Eff<A>,
) -> Eff<A> {
    let f = Rc::new(f);
    let run: Rc<dyn Fn(&mut WriterContext<W>) -> Erased> = Rc::new(move |ctx| {
        let start = ctx.output.len();
        let result = scoped_run::<W, A>(body.clone(), ctx);
        let appended = ctx.output.split_off(start);
        ctx.output.extend(f(appended));
        Box::new(result)
    });
    crate::effect::perform_raw::<A>(Rc::new(Censor::<W> { run }))
}

/// Runs a body computation under a writer-only scope sharing `ctx`.
fn scoped_run<W: Any + Clone, A: Any + Default>(body: Eff<A>, ctx: &mut WriterContext<W>) -> A {
    struct Scoped<'a, W, A> {
        ctx: &'a mut WriterContext<W>,
        _answer: PhantomData<fn() -> A>,
    }
    impl<W: Any + Clone, A> Handler<A> for Scoped<'_, W, A> {
        fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
            try_dispatch(op, self.ctx)
                .unwrap_or_else(|| fault::unhandled_effect("WriterHandler"))
        }
    }
    let result = body.call(to_resumed::<A>());
    handle_dispatch(result, &mut Scoped { ctx, _answer: PhantomData }, A::default)
}

/// Dispatches a writer operation, or reports that none matched.
pub(crate) fn try_dispatch<W: Any + Clone>(
    op: &dyn Any,
    ctx: &mut WriterContext<W>,
) -> Option<Dispatch> {
    let v = if let Some(o) = op.downcast_ref::<Tell<W>>() {
        o.dispatch_writer(ctx)
    } else if let Some(o) = op.downcast_ref::<Listen<W>>() {
        o.dispatch_writer(ctx)
    } else if let Some(o) = op.downcast_ref::<Censor<W>>() {
        o.dispatch_writer(ctx)
    } else {
        return None;
    };
    Some(Dispatch::Resume(v))
}

/// The handler for Writer effects.
///
/// Owns the accumulated output; runners read it back after evaluation.
pub struct WriterHandler<W> {
    ctx: WriterContext<W>,
}

impl<W> WriterHandler<W> {
    /// A handler with empty output.
    pub fn new() -> Self {
        WriterHandler { ctx: WriterContext::new() }
    }

    /// Consumes the handler, yielding the accumulated output.
    pub fn into_output(self) -> Vec<W> {
        self.ctx.output
    }
}

impl<W> Default for WriterHandler<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Any + Clone, R> Handler<R> for WriterHandler<W> {
    fn dispatch(&mut self, op: &dyn Any) -> Dispatch {
        try_dispatch(op, &mut self.ctx)
            .unwrap_or_else(|| fault::unhandled_effect("WriterHandler"))
    }
}

/// Runs a writer computation, returning the result and the output.
pub fn run_writer<W: Any + Clone, A: Any + Default>(m: Eff<A>) -> (A, Vec<W>) {
    let mut h = WriterHandler::new();
    let result = m.call(to_resumed::<A>());
    let a = handle_dispatch(result, &mut h, A::default);
    (a, h.into_output())
}

/// Runs a writer computation, returning only the output.
pub fn exec_writer<W: Any + Clone, A: Any + Default>(m: Eff<A>) -> Vec<W> {
    run_writer::<W, A>(m).1
}

/// Runs a frame-world writer computation.
pub fn run_writer_expr<W: Any + Clone, A: Any + Clone + Default>(m: Expr<A>) -> (A, Vec<W>) {
    let mut h = WriterHandler::new();
    let a = handle_expr_with(m, &mut h, A::default);
    (a, h.into_output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cont::pure;

    #[test]
    fn test_tell_sequence() {
        let m = tell("a").then(tell("b")).then(pure(42));
        let (result, output) = run_writer::<&str, i32>(m);
        assert_eq!(result, 42);
        assert_eq!(output, vec!["a", "b"]);
    }

    #[test]
    fn test_tell_writer_fused() {
        let m = tell_writer("x", pure(1));
        let (result, output) = run_writer::<&str, i32>(m);
        assert_eq!(result, 1);
        assert_eq!(output, vec!["x"]);
    }

    #[test]
    fn test_listen_scopes_output() {
        // tell("outer-before"); let p = listen(tell("inner"); 42) in
        // tell("outer-after"); p
        let m = tell("outer-before")
            .then(listen::<&str, i32>(tell("inner").then(pure(42))))
            .bind(|p| tell("outer-after").then(pure(p)));
        let (p, output) = run_writer::<&str, Pair<i32, Vec<&str>>>(m);
        assert_eq!(output, vec!["outer-before", "inner", "outer-after"]);
        assert_eq!(p.fst, 42);
        assert_eq!(p.snd, vec!["inner"]);
    }

    #[test]
    fn test_censor_rewrites_scoped_output() {
        let m = tell("keep").then(censor::<&str, i32>(
            |out| out.into_iter().filter(|w| *w != "drop").collect(),
            tell("drop").then(tell("stay")).then(pure(5)),
        ));
        let (result, output) = run_writer::<&str, i32>(m);
        assert_eq!(result, 5);
        assert_eq!(output, vec!["keep", "stay"]);
    }

    #[test]
    fn test_exec_writer() {
        let m = tell(1).then(tell(2)).then(pure(()));
        assert_eq!(exec_writer::<i32, ()>(m), vec![1, 2]);
    }

    #[test]
    fn test_run_writer_expr() {
        let m = Expr::perform(Tell::new("a")).then(Expr::perform(Tell::new("b"))).then(Expr::of(7));
        let (result, output) = run_writer_expr::<&str, i32>(m);
        assert_eq!(result, 7);
        assert_eq!(output, vec!["a", "b"]);
    }

    #[test]
    #[should_panic(expected = "delimit: unhandled effect in WriterHandler")]
    fn test_listen_does_not_forward_foreign_effects() {
        let m = listen::<&str, i32>(crate::state::get::<i32>());
        let _ = run_writer::<&str, Pair<i32, Vec<&str>>>(m);
    }
}
