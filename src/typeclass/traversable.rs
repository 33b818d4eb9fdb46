//! Traversable type class - mapping with effects and collecting results.
//!
//! A `Traversable` container can have an effectful function applied to each
//! element while the results are collected *inside* the effect, preserving
//! the container's shape.
//!
//! # Limitations in Rust
//!
//! Rust lacks Higher-Kinded Types, which would allow a single generic
//! `traverse` over any [`Applicative`](super::Applicative). Instead this
//! trait provides specialized methods for the common effect types:
//!
//! - `traverse_option` for functions returning `Option<B>`
//! - `traverse_result` for functions returning `Result<B, E>`
//!
//! Implementations still route the shape reconstruction through the
//! `Applicative` instances of `Option` and `Result`, so the semantics match
//! the general formulation.
//!
//! # Examples
//!
//! ```rust
//! use evergreen::typeclass::Traversable;
//!
//! let numbers: Option<Vec<i32>> = vec!["1", "2", "3"]
//!     .traverse_option(|s| s.parse().ok());
//! assert_eq!(numbers, Some(vec![1, 2, 3]));
//!
//! let failed: Option<Vec<i32>> = vec!["1", "oops", "3"]
//!     .traverse_option(|s| s.parse().ok());
//! assert_eq!(failed, None);
//! ```

use super::foldable::Foldable;
use super::functor::Functor;
use super::higher::TypeConstructor;

/// A type class for structures that can be traversed with effects.
///
/// # Laws
///
/// Expressed informally (Rust cannot state them generically without HKT):
///
/// - **Identity**: traversing with a total function that never fails is the
///   same as mapping.
/// - **Naturality**: converting the effect after traversing equals
///   traversing with the converted function.
pub trait Traversable: Functor + Foldable {
    /// Applies a fallible function to each element; `None` aborts the whole
    /// traversal.
    fn traverse_option<B, F>(self, function: F) -> Option<Self::WithType<B>>
    where
        F: FnMut(Self::Inner) -> Option<B>;

    /// Applies a fallible function to each element; the first `Err` in
    /// left-to-right order becomes the result.
    fn traverse_result<B, E, F>(self, function: F) -> Result<Self::WithType<B>, E>
    where
        F: FnMut(Self::Inner) -> Result<B, E>;

    /// Turns a structure of `Option`s inside out.
    fn sequence_option<B>(self) -> Option<Self::WithType<B>>
    where
        Self: Sized + TypeConstructor<Inner = Option<B>>,
    {
        self.traverse_option(|element| element)
    }

    /// Turns a structure of `Result`s inside out.
    fn sequence_result<B, E>(self) -> Result<Self::WithType<B>, E>
    where
        Self: Sized + TypeConstructor<Inner = Result<B, E>>,
    {
        self.traverse_result(|element| element)
    }
}

impl<A> Traversable for Vec<A> {
    fn traverse_option<B, F>(self, mut function: F) -> Option<Vec<B>>
    where
        F: FnMut(A) -> Option<B>,
    {
        let mut collected = Vec::with_capacity(self.len());
        for element in self {
            collected.push(function(element)?);
        }
        Some(collected)
    }

    fn traverse_result<B, E, F>(self, mut function: F) -> Result<Vec<B>, E>
    where
        F: FnMut(A) -> Result<B, E>,
    {
        let mut collected = Vec::with_capacity(self.len());
        for element in self {
            collected.push(function(element)?);
        }
        Ok(collected)
    }
}
