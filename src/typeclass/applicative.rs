//! Applicative type class - applying functions within contexts.
//!
//! `Applicative` extends [`Functor`] with the ability to lift plain values
//! into the context (`pure`) and to combine multiple independent contexts
//! (`map2`, `map3`, `product`). It is the interface the persistent
//! collections use to rebuild their shape inside an effect: a tree node is
//! reconstructed by lifting its constructor over the effects of traversing
//! the left subtree, the node value, and the right subtree.
//!
//! # Laws
//!
//! All `Applicative` implementations must satisfy:
//!
//! - **Identity**: `pure(()).map2(v, |(), x| x) == v`
//! - **Homomorphism**: `pure(a).map2(pure(b), f) == pure(f(a, b))`
//! - **Composition**: combining with `map2` is associative up to tuple
//!   re-association.

use super::functor::Functor;

/// A type class for contexts supporting lifted application.
///
/// # Examples
///
/// ```rust
/// use evergreen::typeclass::Applicative;
///
/// let sum = Some(1).map2(Some(2), |x, y| x + y);
/// assert_eq!(sum, Some(3));
///
/// let missing = Some(1).map2(None::<i32>, |x, y| x + y);
/// assert_eq!(missing, None);
/// ```
pub trait Applicative: Functor {
    /// Lifts a pure value into the applicative context.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::typeclass::Applicative;
    ///
    /// let lifted: Option<i32> = <Option<()>>::pure(42);
    /// assert_eq!(lifted, Some(42));
    /// ```
    fn pure<B>(value: B) -> Self::WithType<B>;

    /// Combines two applicative values with a binary function.
    ///
    /// If either side fails (in the sense appropriate to the context), the
    /// combination fails the same way.
    fn map2<B, C, F>(self, other: Self::WithType<B>, function: F) -> Self::WithType<C>
    where
        F: FnOnce(Self::Inner, B) -> C;

    /// Combines three applicative values with a ternary function.
    fn map3<B, C, D, F>(
        self,
        second: Self::WithType<B>,
        third: Self::WithType<C>,
        function: F,
    ) -> Self::WithType<D>
    where
        F: FnOnce(Self::Inner, B, C) -> D;

    /// Combines two applicative values into a tuple.
    fn product<B>(self, other: Self::WithType<B>) -> Self::WithType<(Self::Inner, B)>
    where
        Self: Sized,
    {
        self.map2(other, |first, second| (first, second))
    }
}

impl<A> Applicative for Option<A> {
    fn pure<B>(value: B) -> Option<B> {
        Some(value)
    }

    fn map2<B, C, F>(self, other: Option<B>, function: F) -> Option<C>
    where
        F: FnOnce(A, B) -> C,
    {
        match (self, other) {
            (Some(first), Some(second)) => Some(function(first, second)),
            _ => None,
        }
    }

    fn map3<B, C, D, F>(self, second: Option<B>, third: Option<C>, function: F) -> Option<D>
    where
        F: FnOnce(A, B, C) -> D,
    {
        match (self, second, third) {
            (Some(first), Some(second), Some(third)) => Some(function(first, second, third)),
            _ => None,
        }
    }
}

impl<A, E> Applicative for Result<A, E>
where
    E: Clone,
{
    fn pure<B>(value: B) -> Result<B, E> {
        Ok(value)
    }

    fn map2<B, C, F>(self, other: Result<B, E>, function: F) -> Result<C, E>
    where
        F: FnOnce(A, B) -> C,
    {
        match (self, other) {
            (Ok(first), Ok(second)) => Ok(function(first, second)),
            (Err(error), _) | (_, Err(error)) => Err(error),
        }
    }

    fn map3<B, C, D, F>(self, second: Result<B, E>, third: Result<C, E>, function: F) -> Result<D, E>
    where
        F: FnOnce(A, B, C) -> D,
    {
        match (self, second, third) {
            (Ok(first), Ok(second), Ok(third)) => Ok(function(first, second, third)),
            (Err(error), _, _) | (_, Err(error), _) | (_, _, Err(error)) => Err(error),
        }
    }
}
