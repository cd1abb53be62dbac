//! A sum of two alternatives.
//!
//! [`Either<E, A>`] is the answer shape of the error effect: `Left` carries
//! an error, `Right` carries success. It exists alongside `Result` because
//! effect runners need a type the library owns to thread through the erased
//! dispatch pipeline, with exactly the combinator surface the runners use.

/// A value that is either `Left` (error) or `Right` (success).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<E, A> {
    /// The error alternative.
    Left(E),
    /// The success alternative.
    Right(A),
}

/// The zero value of an `Either` is `Left` of the zero error, matching the
/// nil-completion convention of the effect runners (an empty completion is
/// "finished with the zero value", and the zero `Either` is not a success).
impl<E: Default, A> Default for Either<E, A> {
    fn default() -> Self {
        Either::Left(E::default())
    }
}

impl<E, A> Either<E, A> {
    /// Whether this is a `Left` value.
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    /// Whether this is a `Right` value.
    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    /// The `Left` value, if present.
    pub fn left(self) -> Option<E> {
        match self {
            Either::Left(e) => Some(e),
            Either::Right(_) => None,
        }
    }

    /// The `Right` value, if present.
    pub fn right(self) -> Option<A> {
        match self {
            Either::Left(_) => None,
            Either::Right(a) => Some(a),
        }
    }

    /// Pattern-matches, applying `on_left` or `on_right`.
    pub fn either<T>(self, on_left: impl FnOnce(E) -> T, on_right: impl FnOnce(A) -> T) -> T {
        match self {
            Either::Left(e) => on_left(e),
            Either::Right(a) => on_right(a),
        }
    }

    /// Applies a function to the `Right` value.
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Either<E, B> {
        match self {
            Either::Left(e) => Either::Left(e),
            Either::Right(a) => Either::Right(f(a)),
        }
    }

    /// Applies a function to the `Left` value.
    pub fn map_left<F>(self, f: impl FnOnce(E) -> F) -> Either<F, A> {
        match self {
            Either::Left(e) => Either::Left(f(e)),
            Either::Right(a) => Either::Right(a),
        }
    }

    /// Sequences two `Either` computations.
    pub fn and_then<B>(self, f: impl FnOnce(A) -> Either<E, B>) -> Either<E, B> {
        match self {
            Either::Left(e) => Either::Left(e),
            Either::Right(a) => f(a),
        }
    }
}
