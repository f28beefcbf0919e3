//! Foundation types for the noctua engine.
//!
//! This module provides fundamental types used throughout the engine:
//! - [`Sym`], [`Interner`], [`intern`] - String interning for atom symbols
//! - [`FreshIds`] - Monotonic counters for renaming and Skolem generation
//! - Reserved operator names and the Skolem prefix ([`constants`])
//!
//! This module has NO dependencies on other noctua modules.

pub mod constants;
mod fresh;
mod intern;

pub use fresh::FreshIds;
pub use intern::{Interner, Sym, intern};
