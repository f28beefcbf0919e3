//! Multi-way candidate index over assertion terms.
//!
//! Discriminates stored terms by head symbol and arity, then by the shape of
//! each argument position. The three queries return candidate id sets for
//! unification, instance, and generalization relations.
//!
//! The index never produces a false negative for its stated relation; false
//! positives are allowed and the caller confirms candidates with an explicit
//! unify/match. Insert and remove are O(size of the term).

use crate::base::Sym;
use crate::kif::Term;
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// One-level summary of a term's structure.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    Var,
    Atom(Sym),
    Lst { head: Option<Sym>, arity: usize },
}

fn shape_of(term: &Term) -> Shape {
    match term {
        Term::Var(_) => Shape::Var,
        Term::Atom(a) => Shape::Atom(a.sym().clone()),
        Term::Lst(children) => Shape::Lst {
            head: match children.first() {
                Some(Term::Atom(a)) => Some(a.sym().clone()),
                _ => None,
            },
            arity: children.len(),
        },
    }
}

/// Where an id was filed, for O(1) removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TopKey {
    /// Atom-headed list: bucketed under (head, arity).
    Bucket(Sym, usize),
    /// Everything else: atoms, variables, var/list-headed lists.
    Wild,
}

/// Candidate index over a set of assertion terms.
#[derive(Debug, Default)]
pub struct PathIndex {
    /// (head, arity) → id → argument shapes.
    buckets: FxHashMap<(Sym, usize), FxHashMap<Uuid, Vec<Shape>>>,
    /// Terms without an atom head, filtered only by their own shape.
    wild: FxHashMap<Uuid, Shape>,
    by_id: FxHashMap<Uuid, TopKey>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `term` under `id`. Re-inserting an id replaces its entry.
    pub fn insert(&mut self, id: Uuid, term: &Term) {
        self.remove(id);
        match term {
            Term::Lst(children) if matches!(children.first(), Some(Term::Atom(_))) => {
                let Some(Term::Atom(head)) = children.first() else {
                    unreachable!("matched above");
                };
                let key = (head.sym().clone(), children.len());
                let shapes = children[1..].iter().map(shape_of).collect();
                self.buckets.entry(key.clone()).or_default().insert(id, shapes);
                self.by_id.insert(id, TopKey::Bucket(key.0, key.1));
            }
            _ => {
                self.wild.insert(id, shape_of(term));
                self.by_id.insert(id, TopKey::Wild);
            }
        }
    }

    pub fn remove(&mut self, id: Uuid) {
        match self.by_id.remove(&id) {
            Some(TopKey::Bucket(head, arity)) => {
                if let Some(bucket) = self.buckets.get_mut(&(head.clone(), arity)) {
                    bucket.remove(&id);
                    if bucket.is_empty() {
                        self.buckets.remove(&(head, arity));
                    }
                }
            }
            Some(TopKey::Wild) => {
                self.wild.remove(&id);
            }
            None => {}
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.wild.clear();
        self.by_id.clear();
    }

    /// Candidates whose term may unify with `term`.
    pub fn find_unifiable(&self, term: &Term) -> Vec<Uuid> {
        match term {
            Term::Var(_) => self.by_id.keys().copied().collect(),
            Term::Atom(_) => self.filter_wild(|shape| unifiable(term, shape)),
            Term::Lst(children) => {
                let mut out = self.filter_wild(|shape| unifiable(term, shape));
                let args: &[Term] = if children.is_empty() { &[] } else { &children[1..] };
                match children.first() {
                    Some(Term::Atom(head)) => {
                        self.scan_bucket(&(head.sym().clone(), children.len()), args, &mut out, unifiable);
                    }
                    _ => {
                        // Var-headed query can unify with any head of the
                        // same arity; empty list only with empty lists.
                        for ((_, arity), bucket) in &self.buckets {
                            if *arity == children.len() {
                                for (id, shapes) in bucket {
                                    if args_compatible(args, shapes, unifiable) {
                                        out.push(*id);
                                    }
                                }
                            }
                        }
                    }
                }
                out
            }
        }
    }

    /// Candidates whose term may be an instance of `pattern` (one-way match
    /// with the pattern on the query side).
    pub fn find_instances_of(&self, pattern: &Term) -> Vec<Uuid> {
        match pattern {
            Term::Var(_) => self.by_id.keys().copied().collect(),
            Term::Atom(_) => self.filter_wild(|shape| instance_of(pattern, shape)),
            Term::Lst(children) => {
                let args: &[Term] = if children.is_empty() { &[] } else { &children[1..] };
                match children.first() {
                    Some(Term::Atom(head)) => {
                        let mut out = Vec::new();
                        self.scan_bucket(
                            &(head.sym().clone(), children.len()),
                            args,
                            &mut out,
                            instance_of,
                        );
                        out
                    }
                    _ => {
                        let mut out = self.filter_wild(|shape| instance_of(pattern, shape));
                        for ((_, arity), bucket) in &self.buckets {
                            if *arity == children.len() {
                                for (id, shapes) in bucket {
                                    if args_compatible(args, shapes, instance_of) {
                                        out.push(*id);
                                    }
                                }
                            }
                        }
                        out
                    }
                }
            }
        }
    }

    /// Candidates whose term may generalize `term` (one-way match with the
    /// stored term on the pattern side).
    pub fn find_generalizations_of(&self, term: &Term) -> Vec<Uuid> {
        let mut out = self.filter_wild(|shape| generalizes(shape, term));
        if let Term::Lst(children) = term
            && let Some(Term::Atom(head)) = children.first()
        {
            self.scan_bucket(
                &(head.sym().clone(), children.len()),
                &children[1..],
                &mut out,
                |query, stored| generalizes(stored, query),
            );
        }
        out
    }

    fn scan_bucket(
        &self,
        key: &(Sym, usize),
        args: &[Term],
        out: &mut Vec<Uuid>,
        compat: impl Fn(&Term, &Shape) -> bool + Copy,
    ) {
        if let Some(bucket) = self.buckets.get(key) {
            for (id, shapes) in bucket {
                if args_compatible(args, shapes, compat) {
                    out.push(*id);
                }
            }
        }
    }

    fn filter_wild(&self, predicate: impl Fn(&Shape) -> bool) -> Vec<Uuid> {
        self.wild
            .iter()
            .filter(|(_, shape)| predicate(shape))
            .map(|(id, _)| *id)
            .collect()
    }
}

fn args_compatible(
    args: &[Term],
    shapes: &[Shape],
    compat: impl Fn(&Term, &Shape) -> bool,
) -> bool {
    args.len() == shapes.len() && args.iter().zip(shapes).all(|(a, s)| compat(a, s))
}

/// May `query` unify with a term of this shape?
fn unifiable(query: &Term, stored: &Shape) -> bool {
    match (query, stored) {
        (Term::Var(_), _) | (_, Shape::Var) => true,
        (Term::Atom(a), Shape::Atom(s)) => a.sym() == s,
        (Term::Atom(_), Shape::Lst { .. }) => false,
        (Term::Lst(children), Shape::Lst { head, arity }) => {
            children.len() == *arity
                && match (children.first(), head) {
                    (Some(Term::Atom(a)), Some(h)) => a.sym() == h,
                    _ => true,
                }
        }
        (Term::Lst(_), Shape::Atom(_)) => false,
    }
}

/// May a term of this shape be an instance of `pattern`?
fn instance_of(pattern: &Term, stored: &Shape) -> bool {
    match (pattern, stored) {
        (Term::Var(_), _) => true,
        (Term::Atom(a), Shape::Atom(s)) => a.sym() == s,
        (Term::Atom(_), _) => false,
        (Term::Lst(children), Shape::Lst { head, arity }) => {
            children.len() == *arity
                && match children.first() {
                    Some(Term::Atom(a)) => head.as_ref() == Some(a.sym()),
                    // Var head binds anything; list head needs a non-atom
                    // stored head, which `None` summarizes.
                    Some(Term::Var(_)) | None => true,
                    Some(Term::Lst(_)) => head.is_none(),
                }
        }
        (Term::Lst(_), _) => false,
    }
}

/// May a term of this shape generalize `query`?
fn generalizes(stored: &Shape, query: &Term) -> bool {
    match (stored, query) {
        (Shape::Var, _) => true,
        (Shape::Atom(s), Term::Atom(a)) => a.sym() == s,
        (Shape::Atom(_), _) => false,
        (Shape::Lst { head, arity }, Term::Lst(children)) => {
            children.len() == *arity
                && match head {
                    Some(h) => matches!(children.first(), Some(Term::Atom(a)) if a.sym() == h),
                    None => true,
                }
        }
        (Shape::Lst { .. }, _) => false,
    }
}
