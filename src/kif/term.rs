//! The term language: atoms, variables, and lists.

use crate::base::{Sym, constants::SKOLEM_PREFIX, intern};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::fmt;

/// An interned atom. Symbols and string literals are the same thing
/// semantically; `quoted` only records which surface form produced it so the
/// printer can reproduce it.
#[derive(Debug, Clone)]
pub struct Atom {
    sym: Sym,
    quoted: bool,
}

impl Atom {
    pub fn new(value: &str) -> Self {
        Self {
            sym: intern(value),
            quoted: false,
        }
    }

    pub fn new_quoted(value: &str) -> Self {
        Self {
            sym: intern(value),
            quoted: true,
        }
    }

    pub fn value(&self) -> &str {
        &self.sym
    }

    pub fn sym(&self) -> &Sym {
        &self.sym
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }
}

// Equality and hashing ignore the lexical `quoted` flag: `abc` and `"abc"`
// are the same atom.
impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.sym == other.sym
    }
}

impl Eq for Atom {}

impl std::hash::Hash for Atom {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sym.hash(state);
    }
}

/// A KIF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Symbol or string literal, interned on its value.
    Atom(Atom),
    /// Variable; the name includes the leading `?` and equality is by name.
    Var(SmolStr),
    /// Ordered list; `children[0]` is the operator position when nonempty.
    Lst(Vec<Term>),
}

impl Term {
    pub fn atom(value: &str) -> Self {
        Term::Atom(Atom::new(value))
    }

    pub fn quoted_atom(value: &str) -> Self {
        Term::Atom(Atom::new_quoted(value))
    }

    /// Construct a variable. Accepts the name with or without the leading
    /// `?`; the stored name always carries it.
    pub fn var(name: &str) -> Self {
        if let Some(rest) = name.strip_prefix('?') {
            debug_assert!(!rest.is_empty(), "variable name must be nonempty");
            Term::Var(SmolStr::new(name))
        } else {
            debug_assert!(!name.is_empty(), "variable name must be nonempty");
            Term::Var(SmolStr::new(format!("?{name}")))
        }
    }

    pub fn lst(children: Vec<Term>) -> Self {
        Term::Lst(children)
    }

    /// Operator name: the head atom of a nonempty list.
    pub fn op(&self) -> Option<&str> {
        match self {
            Term::Lst(children) => match children.first() {
                Some(Term::Atom(a)) => Some(a.value()),
                _ => None,
            },
            _ => None,
        }
    }

    /// List children, if this is a list.
    pub fn children(&self) -> Option<&[Term]> {
        match self {
            Term::Lst(children) => Some(children),
            _ => None,
        }
    }

    /// Arguments of a list term (everything after the operator position).
    pub fn args(&self) -> &[Term] {
        match self {
            Term::Lst(children) if !children.is_empty() => &children[1..],
            _ => &[],
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Term::Lst(_))
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// Atom value if this is an atom.
    pub fn atom_value(&self) -> Option<&str> {
        match self {
            Term::Atom(a) => Some(a.value()),
            _ => None,
        }
    }

    /// All variables appearing anywhere in the term.
    pub fn vars(&self) -> BTreeSet<SmolStr> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<SmolStr>) {
        match self {
            Term::Atom(_) => {}
            Term::Var(name) => {
                out.insert(name.clone());
            }
            Term::Lst(children) => {
                for child in children {
                    child.collect_vars(out);
                }
            }
        }
    }

    /// Structural size: atoms and variables count 1, a list counts 1 plus
    /// the sum of its children. Used for equality orientation and priority
    /// decay decisions.
    pub fn weight(&self) -> usize {
        match self {
            Term::Atom(_) | Term::Var(_) => 1,
            Term::Lst(children) => 1 + children.iter().map(Term::weight).sum::<usize>(),
        }
    }

    /// True if any atom in the term carries the reserved Skolem prefix.
    pub fn contains_skolem(&self) -> bool {
        match self {
            Term::Atom(a) => a.value().starts_with(SKOLEM_PREFIX),
            Term::Var(_) => false,
            Term::Lst(children) => children.iter().any(Term::contains_skolem),
        }
    }
}

/// True if the value can be printed as a bare atom and re-lexed unchanged.
fn is_bare_printable(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ';' | '?' | '"'))
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in value.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            other => write!(f, "{other}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(a) => {
                if a.is_quoted() || !is_bare_printable(a.value()) {
                    write_quoted(f, a.value())
                } else {
                    write!(f, "{}", a.value())
                }
            }
            Term::Var(name) => write!(f, "{name}"),
            Term::Lst(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}
