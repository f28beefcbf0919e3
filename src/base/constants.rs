//! Reserved names recognized by the engine.

/// Logical negation operator.
pub const OP_NOT: &str = "not";
/// Conjunction operator.
pub const OP_AND: &str = "and";
/// Disjunction operator.
pub const OP_OR: &str = "or";
/// Implication operator (rules).
pub const OP_IMPLIES: &str = "=>";
/// Bi-implication operator (rules).
pub const OP_IFF: &str = "<=>";
/// Universal quantifier.
pub const OP_FORALL: &str = "forall";
/// Existential quantifier.
pub const OP_EXISTS: &str = "exists";
/// Equality predicate.
pub const OP_EQUALS: &str = "=";

/// Prefix of generated Skolem constants and functions.
///
/// `#` cannot start a bare user atom in practice because generated names are
/// the only producers of this prefix; the parser still accepts it, so the
/// reservation is a convention enforced at skolemization time, not a lexical
/// rule.
pub const SKOLEM_PREFIX: &str = "#sk_";

/// Identifier of the global knowledge base.
pub const GLOBAL_KB: &str = "global";
