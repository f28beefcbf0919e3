//! Existential elimination and double-negation simplification.

use super::unify::{Bindings, substitute};
use crate::base::FreshIds;
use crate::base::constants::{OP_EXISTS, OP_FORALL, OP_NOT, SKOLEM_PREFIX};
use crate::kif::Term;
use smol_str::SmolStr;
use tracing::warn;

/// Passes [`simplify`] runs before giving up on convergence.
const SIMPLIFY_MAX_PASSES: usize = 5;

/// Replace existentially quantified variables with fresh Skolem terms.
///
/// With no surrounding universal variables an existential becomes a Skolem
/// constant; otherwise it becomes a Skolem function applied to the
/// surrounding universal variables. `universal_vars` carries the universals
/// already in scope at the point `term` was taken from (for example the
/// quantified variables of an enclosing `forall`). Free variables that are
/// not quantified anywhere pass through untouched.
pub fn skolemize(term: &Term, universal_vars: &[SmolStr], fresh: &FreshIds) -> Term {
    match term.op() {
        Some(op) if op == OP_EXISTS && quantifier_shape(term) => {
            let children = term.children().expect("checked by quantifier_shape");
            let qvars = quantified_var_names(&children[1]);
            let mut bindings = Bindings::default();
            for name in qvars {
                bindings.insert(name, skolem_term(universal_vars, fresh));
            }
            let body = substitute(&children[2], &bindings);
            skolemize(&body, universal_vars, fresh)
        }
        Some(op) if op == OP_FORALL && quantifier_shape(term) => {
            let children = term.children().expect("checked by quantifier_shape");
            let mut extended = universal_vars.to_vec();
            extended.extend(quantified_var_names(&children[1]));
            let body = skolemize(&children[2], &extended, fresh);
            Term::lst(vec![children[0].clone(), children[1].clone(), body])
        }
        _ => match term {
            Term::Lst(children) => Term::lst(
                children
                    .iter()
                    .map(|c| skolemize(c, universal_vars, fresh))
                    .collect(),
            ),
            _ => term.clone(),
        },
    }
}

/// A quantifier term is `(op vars body)` with arity 3.
fn quantifier_shape(term: &Term) -> bool {
    term.children().map(|c| c.len()) == Some(3)
}

/// Variable names in a quantifier's var position: either a single variable
/// or a list of variables. Non-variable entries are ignored.
fn quantified_var_names(vars: &Term) -> Vec<SmolStr> {
    match vars {
        Term::Var(name) => vec![name.clone()],
        Term::Lst(children) => children
            .iter()
            .filter_map(|c| match c {
                Term::Var(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Variables occurring free in `term`: every variable not bound by an
/// enclosing `forall`/`exists`.
pub fn free_vars(term: &Term) -> Vec<SmolStr> {
    fn walk(term: &Term, bound: &mut Vec<SmolStr>, out: &mut Vec<SmolStr>) {
        match term {
            Term::Var(name) => {
                if !bound.contains(name) && !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Term::Atom(_) => {}
            Term::Lst(children) => {
                let is_quantifier = matches!(term.op(), Some(op) if op == OP_FORALL || op == OP_EXISTS)
                    && children.len() == 3;
                if is_quantifier {
                    let depth = bound.len();
                    bound.extend(quantified_var_names(&children[1]));
                    walk(&children[2], bound, out);
                    bound.truncate(depth);
                } else {
                    for child in children {
                        walk(child, bound, out);
                    }
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(term, &mut Vec::new(), &mut out);
    out
}

/// Fresh Skolem constant, or function application over the universal
/// context.
fn skolem_term(universal_vars: &[SmolStr], fresh: &FreshIds) -> Term {
    let head = Term::atom(&format!("{}{}", SKOLEM_PREFIX, fresh.next()));
    if universal_vars.is_empty() {
        head
    } else {
        let mut children = Vec::with_capacity(universal_vars.len() + 1);
        children.push(head);
        children.extend(universal_vars.iter().map(|v| Term::Var(v.clone())));
        Term::lst(children)
    }
}

/// Eliminate double negations: `(not (not X)) → X`, applied recursively to
/// a fixed point, capped at [`SIMPLIFY_MAX_PASSES`] passes.
pub fn simplify(term: &Term) -> Term {
    let mut current = term.clone();
    for _ in 0..SIMPLIFY_MAX_PASSES {
        let next = simplify_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
    if simplify_once(&current) != current {
        warn!(term = %current, "simplify did not converge within {SIMPLIFY_MAX_PASSES} passes");
    }
    current
}

fn simplify_once(term: &Term) -> Term {
    if let Term::Lst(children) = term
        && children.len() == 2
        && term.op() == Some(OP_NOT)
        && let Term::Lst(inner) = &children[1]
        && inner.len() == 2
        && children[1].op() == Some(OP_NOT)
    {
        return simplify_once(&inner[1]);
    }
    match term {
        Term::Lst(children) => Term::lst(children.iter().map(simplify_once).collect()),
        _ => term.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kif::parse_kif;

    fn term(s: &str) -> Term {
        parse_kif(s).unwrap().remove(0)
    }

    #[test]
    fn test_skolem_constant_without_universals() {
        let fresh = FreshIds::new();
        let out = skolemize(&term("(exists (?x) (p ?x))"), &[], &fresh);
        assert_eq!(out.op(), Some("p"));
        let arg = &out.args()[0];
        assert!(arg.contains_skolem());
        assert!(!arg.is_list());
    }

    #[test]
    fn test_skolem_function_of_universals() {
        let fresh = FreshIds::new();
        let ctx = vec![SmolStr::new("?u")];
        let out = skolemize(&term("(exists (?x) (p ?x ?u))"), &ctx, &fresh);
        // ?x became (#sk_n ?u)
        let arg = &out.args()[0];
        assert!(arg.is_list());
        assert!(arg.contains_skolem());
        assert_eq!(arg.args(), &[term("?u")]);
        // The free universal is untouched.
        assert_eq!(out.args()[1], term("?u"));
    }

    #[test]
    fn test_forall_extends_context_for_inner_exists() {
        let fresh = FreshIds::new();
        let out = skolemize(&term("(forall (?y) (exists (?x) (p ?x ?y)))"), &[], &fresh);
        assert_eq!(out.op(), Some("forall"));
        let body = &out.children().unwrap()[2];
        let arg = &body.args()[0];
        assert!(arg.is_list(), "inner existential must become a function of ?y");
        assert_eq!(arg.args(), &[term("?y")]);
    }

    #[test]
    fn test_multiple_existentials_get_distinct_skolems() {
        let fresh = FreshIds::new();
        let out = skolemize(&term("(exists (?x ?y) (p ?x ?y))"), &[], &fresh);
        let args = out.args();
        assert_ne!(args[0], args[1]);
    }

    #[test]
    fn test_free_vars_excludes_bound() {
        let t = term("(p ?a (exists (?b) (q ?a ?b)))");
        assert_eq!(free_vars(&t), vec![SmolStr::new("?a")]);
        assert!(free_vars(&term("(forall (?x) (p ?x))")).is_empty());
    }

    #[test]
    fn test_free_vars_left_intact() {
        let fresh = FreshIds::new();
        let out = skolemize(&term("(p ?free)"), &[], &fresh);
        assert_eq!(out, term("(p ?free)"));
    }

    #[test]
    fn test_simplify_double_negation() {
        assert_eq!(simplify(&term("(not (not (p a)))")), term("(p a)"));
        assert_eq!(simplify(&term("(not (p a))")), term("(not (p a))"));
    }

    #[test]
    fn test_simplify_nested() {
        assert_eq!(
            simplify(&term("(and (not (not (p a))) (not (not (not (q b)))))")),
            term("(and (p a) (not (q b)))")
        );
    }

    #[test]
    fn test_simplify_deeply_stacked() {
        // Eight negations collapse to none within the pass cap.
        let t = term("(not (not (not (not (not (not (not (not x))))))))");
        assert_eq!(simplify(&t), term("x"));
    }
}
