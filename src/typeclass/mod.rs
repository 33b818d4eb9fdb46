//! Type classes for effectful traversal of containers.
//!
//! This module provides a small hierarchy of type class traits, emulating
//! Higher-Kinded Types through Generic Associated Types:
//!
//! - [`TypeConstructor`]: the HKT foundation (`Option<_>`, `Vec<_>`, ...)
//! - [`Functor`]: mapping a function over a context
//! - [`Applicative`]: lifting values and combining independent contexts
//! - [`Foldable`]: collapsing a container to a summary value
//! - [`Traversable`]: mapping with effects while rebuilding the shape
//!
//! The persistent collections in this crate implement these traits so that a
//! map can, for example, be traversed with a fallible function and rebuilt
//! inside `Result` without losing its shape:
//!
//! ```rust
//! use evergreen::persistent::TreeMap;
//! use evergreen::typeclass::Traversable;
//!
//! let map = TreeMap::new()
//!     .insert(1, "10".to_string())
//!     .insert(2, "20".to_string());
//!
//! let parsed: Option<TreeMap<i32, i32>> = map.traverse_option(|v| v.parse().ok());
//! assert_eq!(parsed.unwrap().get(&2), Some(&20));
//! ```

mod applicative;
mod foldable;
mod functor;
mod higher;
mod traversable;

pub use applicative::Applicative;
pub use foldable::Foldable;
pub use functor::Functor;
pub use higher::TypeConstructor;
pub use traversable::Traversable;
