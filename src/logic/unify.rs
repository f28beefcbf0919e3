//! Unification and one-way matching over [`Term`]s.
//!
//! Substitutions are maps from variable name to term. [`unify`] is full
//! two-way unification with an occur check; [`match_pattern`] is the one-way
//! variant where only pattern variables may bind. Both take the incoming
//! substitution by reference and return an extended copy on success, so a
//! failed attempt never disturbs the caller's bindings.

use crate::base::FreshIds;
use crate::kif::Term;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

/// A substitution: variable name → term.
pub type Bindings = FxHashMap<SmolStr, Term>;

/// Dereference a variable through the bindings until it hits an unbound
/// variable or a non-variable term.
fn walk<'a>(term: &'a Term, bindings: &'a Bindings) -> &'a Term {
    let mut current = term;
    while let Term::Var(name) = current {
        match bindings.get(name) {
            Some(bound) => current = bound,
            None => break,
        }
    }
    current
}

/// True if `var` occurs in `term` after dereferencing through `bindings`.
fn occurs(var: &SmolStr, term: &Term, bindings: &Bindings) -> bool {
    match walk(term, bindings) {
        Term::Var(name) => name == var,
        Term::Atom(_) => false,
        Term::Lst(children) => children.iter().any(|c| occurs(var, c, bindings)),
    }
}

/// Unify two terms under an existing substitution.
///
/// Returns the extended substitution, or `None` if the terms do not unify.
/// Lists of different arities never unify; binding a variable to a term
/// containing it (occur check) fails.
pub fn unify(a: &Term, b: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut extended = bindings.clone();
    unify_terms(a, b, &mut extended).then_some(extended)
}

fn unify_terms(a: &Term, b: &Term, bindings: &mut Bindings) -> bool {
    let a = walk(a, bindings).clone();
    let b = walk(b, bindings).clone();
    match (&a, &b) {
        (Term::Var(x), Term::Var(y)) if x == y => true,
        (Term::Var(x), t) | (t, Term::Var(x)) => {
            if occurs(x, t, bindings) {
                false
            } else {
                bindings.insert(x.clone(), t.clone());
                true
            }
        }
        (Term::Atom(p), Term::Atom(q)) => p == q,
        (Term::Lst(xs), Term::Lst(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| unify_terms(x, y, bindings))
        }
        _ => false,
    }
}

/// One-way match: only variables in `pattern` may bind; every other
/// position must equal the corresponding position in `term`.
pub fn match_pattern(pattern: &Term, term: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut extended = bindings.clone();
    match_terms(pattern, term, &mut extended).then_some(extended)
}

fn match_terms(pattern: &Term, term: &Term, bindings: &mut Bindings) -> bool {
    match pattern {
        Term::Var(name) => match bindings.get(name) {
            Some(bound) => bound == term,
            None => {
                bindings.insert(name.clone(), term.clone());
                true
            }
        },
        Term::Atom(a) => matches!(term, Term::Atom(b) if a == b),
        Term::Lst(ps) => match term {
            Term::Lst(ts) => {
                ps.len() == ts.len() && ps.iter().zip(ts).all(|(p, t)| match_terms(p, t, bindings))
            }
            _ => false,
        },
    }
}

/// Apply a substitution recursively. Idempotent: substituting the result
/// again yields the same term.
///
/// Terminates only for acyclic bindings; [`unify`]'s occur check guarantees
/// the substitutions it builds are acyclic.
pub fn substitute(term: &Term, bindings: &Bindings) -> Term {
    match term {
        Term::Var(name) => match bindings.get(name) {
            Some(bound) => substitute(bound, bindings),
            None => term.clone(),
        },
        Term::Atom(_) => term.clone(),
        Term::Lst(children) => {
            Term::lst(children.iter().map(|c| substitute(c, bindings)).collect())
        }
    }
}

/// Uniformly α-rename every variable in `term` using the shared fresh-id
/// source. Occurrences of the same variable map to the same fresh name.
pub fn rename_vars(term: &Term, fresh: &FreshIds) -> Term {
    let mut mapping: FxHashMap<SmolStr, SmolStr> = FxHashMap::default();
    rename_inner(term, fresh, &mut mapping)
}

fn rename_inner(
    term: &Term,
    fresh: &FreshIds,
    mapping: &mut FxHashMap<SmolStr, SmolStr>,
) -> Term {
    match term {
        Term::Var(name) => {
            let renamed = mapping
                .entry(name.clone())
                .or_insert_with(|| SmolStr::new(format!("?v{}", fresh.next())))
                .clone();
            Term::Var(renamed)
        }
        Term::Atom(_) => term.clone(),
        Term::Lst(children) => Term::lst(
            children
                .iter()
                .map(|c| rename_inner(c, fresh, mapping))
                .collect(),
        ),
    }
}
