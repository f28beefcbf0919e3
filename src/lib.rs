//! # noctua
//!
//! Forward-chaining reasoning engine over a KIF-like S-expression logic,
//! organized as note-scoped knowledge bases sharing a central
//! justification-based truth maintenance store.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! engine    → Cognition, Knowledge, TMS, path index, rules, queries
//!   ↓
//! logic     → unification, matching, substitution, skolemization
//!   ↓
//! kif       → Term AST, logos lexer, recursive-descent parser, printer
//!   ↓
//! base      → primitives (interning, fresh ids, reserved names)
//! ```

// ============================================================================
// MODULES (dependency order: base → kif → logic → engine)
// ============================================================================

/// Foundation types: interning, fresh ids, reserved names
pub mod base;

/// KIF surface: Term AST, logos lexer, recursive-descent parser
pub mod kif;

/// Unification, matching, substitution, skolemization
pub mod logic;

/// Stores, truth maintenance, rules, queries
pub mod engine;

// Re-export the types external callers touch first
pub use base::{FreshIds, Interner, Sym, intern};
pub use engine::{
    Assertion, AssertionType, Cognition, Engine, EngineConfig, EngineError, EventBus, KbEvent,
    KbEventKind, KbId, Knowledge, NoteId, PotentialAssertion, Query, QueryResult, QueryStatus,
    QueryType, Rule,
};
pub use kif::{ParseError, Term, parse_kif};
pub use logic::{Bindings, match_pattern, substitute, unify};
