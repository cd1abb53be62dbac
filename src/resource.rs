//! Resource safety primitives built on the error effect.
//!
//! [`bracket`] guarantees release after use, whether or not the use throws;
//! [`on_error`] runs cleanup only when the body throws, then re-throws.

use std::any::Any;
use std::rc::Rc;

use crate::cont::{Cont, Eff};
use crate::either::Either;
use crate::error::{catch, run_error, throw};

/// Exception-safe resource acquisition and release.
///
/// Acquire → use → release, where release is guaranteed to run even if
/// `use_` raises an error. The error (if any) is surfaced in the returned
/// `Either` rather than short-circuiting past the release.
pub fn bracket<E, R, A>(
    acquire: Eff<R>,
    release: impl Fn(R) -> Eff<()> + 'static,
    use_: impl Fn(R) -> Eff<A> + 'static,
) -> Eff<Either<E, A>>
where
    E: Any + Clone,
    R: Any + Clone,
    A: Any + Clone + Default,
{
    let release = Rc::new(release);
    acquire.bind(move |resource: R| {
        let result = run_error::<E, A>(use_(resource.clone()));
        release(resource.clone()).bind(move |_| Cont::of(result.clone()))
    })
}

/// Runs cleanup only if the computation throws, then re-throws the error.
pub fn on_error<E, A>(body: Eff<A>, cleanup: impl Fn(E) -> Eff<()> + 'static) -> Eff<A>
where
    E: Any + Clone,
    A: Any + Default,
{
    let cleanup = Rc::new(cleanup);
    catch(body, move |e: E| {
        let rethrow = e.clone();
        cleanup(e).bind(move |_| throw::<E, A>(rethrow.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cont::pure;
    use crate::error::run_error;
    use std::cell::Cell;

    #[test]
    fn test_bracket_releases_on_success() {
        let released = Rc::new(Cell::new(false));
        let flag = Rc::clone(&released);
        let m = bracket::<&str, i32, i32>(
            pure(7),
            move |_| {
                flag.set(true);
                pure(())
            },
            |r| pure(r * 6),
        );
        assert_eq!(run_error::<&str, _>(m), Either::Right(Either::Right(42)));
        assert!(released.get());
    }

    #[test]
    fn test_bracket_releases_on_error() {
        let released = Rc::new(Cell::new(false));
        let flag = Rc::clone(&released);
        let m = bracket::<&str, i32, i32>(
            pure(7),
            move |_| {
                flag.set(true);
                pure(())
            },
            |_| throw("use failed"),
        );
        assert_eq!(
            run_error::<&str, _>(m),
            Either::Right(Either::Left("use failed"))
        );
        assert!(released.get());
    }

    #[test]
    fn test_on_error_skips_cleanup_on_success() {
        let cleaned = Rc::new(Cell::new(false));
        let flag = Rc::clone(&cleaned);
        let m = on_error::<&str, i32>(pure(5), move |_: &str| {
            flag.set(true);
            pure(())
        });
        assert_eq!(run_error::<&str, i32>(m), Either::Right(5));
        assert!(!cleaned.get());
    }

    #[test]
    fn test_on_error_cleans_and_rethrows() {
        let cleaned = Rc::new(Cell::new(false));
        let flag = Rc::clone(&cleaned);
        let m = on_error::<&str, i32>(throw("boom"), move |_: &str| {
            flag.set(true);
            pure(())
        });
        assert_eq!(run_error::<&str, i32>(m), Either::Left("boom"));
        assert!(cleaned.get());
    }
}
