//! Unification, matching, substitution, and quantifier elimination.

mod skolem;
mod unify;

pub use skolem::{free_vars, simplify, skolemize};
pub use unify::{Bindings, match_pattern, rename_vars, substitute, unify};
