//! The typed assertion and rule data model.
//!
//! Invariants are enforced at construction: a [`PotentialAssertion`] derives
//! its negation/equality/quantification attributes from the KIF shape, so a
//! committed [`Assertion`] can never carry flags inconsistent with its term.

use crate::base::Sym;
use crate::base::constants::{OP_AND, OP_EQUALS, OP_FORALL, OP_IFF, OP_IMPLIES, OP_NOT};
use crate::engine::error::EngineError;
use crate::kif::Term;
use smol_str::SmolStr;
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

/// Identifier of a knowledge base.
pub type KbId = Sym;
/// Identifier of an originating note.
pub type NoteId = Sym;

/// How an assertion's term is quantified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionType {
    /// Variable-free (after any skolemization elsewhere).
    Ground,
    /// Contains a generated Skolem constant or function.
    Skolemized,
    /// A `forall` with a nonempty quantified-variable list.
    Universal,
}

/// A committed assertion, owned by the TMS.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub id: Uuid,
    pub kif: Term,
    pub priority: f64,
    pub timestamp: u64,
    pub source_note_id: Option<NoteId>,
    /// Support set: ids of the assertions justifying this one.
    pub justification_ids: BTreeSet<Uuid>,
    pub assertion_type: AssertionType,
    pub is_equality: bool,
    pub is_oriented_equality: bool,
    pub negated: bool,
    /// Nonempty only for [`AssertionType::Universal`].
    pub quantified_vars: Vec<SmolStr>,
    /// 0 for externally introduced facts, 1 + max over support otherwise.
    pub derivation_depth: u32,
    pub is_active: bool,
    pub kb_id: KbId,
}

impl Assertion {
    /// The term the matching machinery works on: the `forall` body for
    /// universals, the negated body for negations, the `kif` itself
    /// otherwise.
    pub fn effective_term(&self) -> &Term {
        let children = self.kif.children().unwrap_or(&[]);
        match self.assertion_type {
            AssertionType::Universal => &children[2],
            _ if self.negated => &children[1],
            _ => &self.kif,
        }
    }

    /// Predicate atoms referenced anywhere in the effective term, used to
    /// key the universal index.
    pub fn referenced_predicates(&self) -> BTreeSet<Sym> {
        fn collect(term: &Term, out: &mut BTreeSet<Sym>) {
            if let Term::Lst(children) = term {
                if let Some(Term::Atom(head)) = children.first() {
                    out.insert(head.sym().clone());
                }
                for child in children {
                    collect(child, out);
                }
            }
        }
        let mut out = BTreeSet::new();
        collect(self.effective_term(), &mut out);
        out
    }
}

/// A candidate assertion submitted for commit.
///
/// Negation, equality, orientation, quantification, and type are derived
/// from the KIF shape at construction, which keeps the input contract's
/// consistency requirement unrepresentable rather than checked downstream.
#[derive(Debug, Clone)]
pub struct PotentialAssertion {
    pub kif: Term,
    pub priority: f64,
    pub support: BTreeSet<Uuid>,
    /// Originating note; also the commit route when no target is given.
    pub source_note_id: Option<NoteId>,
    /// Explicit commit destination, overriding the source route.
    pub target_note_id: Option<NoteId>,
    pub derived_type: AssertionType,
    pub is_equality: bool,
    pub is_oriented_equality: bool,
    pub negated: bool,
    pub quantified_vars: Vec<SmolStr>,
    pub derivation_depth: u32,
}

impl PotentialAssertion {
    /// Build a candidate from a term, deriving all shape attributes.
    ///
    /// # Errors
    /// `Validation` if the term is not a list, a `not` does not have exactly
    /// one body, or a `forall` is not `(forall vars body)`.
    pub fn new(kif: Term, priority: f64) -> Result<Self, EngineError> {
        if !kif.is_list() {
            return Err(EngineError::validation(format!(
                "assertion must be a list, got `{kif}`"
            )));
        }
        let negated = kif.op() == Some(OP_NOT);
        if negated && kif.args().len() != 1 {
            return Err(EngineError::validation(format!(
                "`not` takes exactly one body, got `{kif}`"
            )));
        }
        let mut quantified_vars = Vec::new();
        if kif.op() == Some(OP_FORALL) {
            let children = kif.children().expect("is_list checked above");
            if children.len() != 3 {
                return Err(EngineError::validation(format!(
                    "`forall` must be (forall vars body), got `{kif}`"
                )));
            }
            quantified_vars = var_names(&children[1]);
        }
        let derived_type = if !quantified_vars.is_empty() {
            AssertionType::Universal
        } else if kif.contains_skolem() {
            AssertionType::Skolemized
        } else {
            AssertionType::Ground
        };
        let is_equality = kif.op() == Some(OP_EQUALS);
        let is_oriented_equality = is_equality
            && kif.args().len() == 2
            && kif.args()[0].weight() > kif.args()[1].weight();

        Ok(Self {
            kif,
            priority,
            support: BTreeSet::new(),
            source_note_id: None,
            target_note_id: None,
            derived_type,
            is_equality,
            is_oriented_equality,
            negated,
            quantified_vars,
            derivation_depth: 0,
        })
    }

    pub fn with_support(mut self, support: impl IntoIterator<Item = Uuid>) -> Self {
        self.support = support.into_iter().collect();
        self
    }

    pub fn with_source_note(mut self, note: NoteId) -> Self {
        self.source_note_id = Some(note);
        self
    }

    pub fn with_target_note(mut self, note: NoteId) -> Self {
        self.target_note_id = Some(note);
        self
    }

    pub fn with_derivation_depth(mut self, depth: u32) -> Self {
        self.derivation_depth = depth;
        self
    }

    /// The KB this candidate routes to: the explicit target if set,
    /// otherwise the source note, otherwise the global KB.
    pub fn route(&self) -> Option<&NoteId> {
        self.target_note_id.as_ref().or(self.source_note_id.as_ref())
    }

    /// Finalize into an [`Assertion`] owned by `kb_id`.
    pub(crate) fn into_assertion(self, id: Uuid, timestamp: u64, kb_id: KbId) -> Assertion {
        Assertion {
            id,
            kif: self.kif,
            priority: self.priority,
            timestamp,
            source_note_id: self.source_note_id,
            justification_ids: self.support,
            assertion_type: self.derived_type,
            is_equality: self.is_equality,
            is_oriented_equality: self.is_oriented_equality,
            negated: self.negated,
            quantified_vars: self.quantified_vars,
            derivation_depth: self.derivation_depth,
            is_active: true,
            kb_id,
        }
    }
}

/// Variable names in a quantifier var position (single var or list of vars).
fn var_names(vars: &Term) -> Vec<SmolStr> {
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

/// An implication (`=>`) or bi-implication (`<=>`) over terms.
///
/// Equality, hashing, and ordering are by `form` alone: two rules with the
/// same form are the same rule regardless of priority or provenance.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: Uuid,
    pub form: Term,
    pub antecedent: Term,
    pub consequent: Term,
    pub priority: f64,
    /// Antecedent conjuncts in order: the `and` clauses, the single body,
    /// or empty for the literal antecedent `true`.
    pub antecedents: Vec<Term>,
    pub source_note_id: Option<NoteId>,
}

impl Rule {
    /// Validate a rule form and split it into antecedent conjuncts.
    ///
    /// # Errors
    /// `Validation` if the form is not `(=> ant con)` / `(<=> ant con)`, or
    /// the antecedent is not a list, `(not list)`, `(and clause …)`, or the
    /// literal `true`.
    pub fn new(form: Term, priority: f64) -> Result<Self, EngineError> {
        let op = form.op().ok_or_else(|| {
            EngineError::validation(format!("rule form must be a list with an operator: `{form}`"))
        })?;
        if op != OP_IMPLIES && op != OP_IFF {
            return Err(EngineError::validation(format!(
                "rule operator must be `{OP_IMPLIES}` or `{OP_IFF}`, got `{op}`"
            )));
        }
        let children = form.children().expect("op() implies list");
        if children.len() != 3 {
            return Err(EngineError::validation(format!(
                "rule form must have antecedent and consequent: `{form}`"
            )));
        }
        let antecedent = children[1].clone();
        let consequent = children[2].clone();
        let antecedents = split_antecedent(&antecedent)?;

        if op == OP_IFF {
            let mut bound: BTreeSet<SmolStr> = antecedent.vars();
            bound.extend(locally_quantified(&consequent));
            let unbound: Vec<_> = consequent
                .vars()
                .into_iter()
                .filter(|v| !bound.contains(v))
                .collect();
            if !unbound.is_empty() {
                warn!(
                    form = %form,
                    vars = ?unbound,
                    "bi-implication consequent has variables unbound by its antecedent"
                );
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            form,
            antecedent,
            consequent,
            priority,
            antecedents,
            source_note_id: None,
        })
    }

    pub fn with_source_note(mut self, note: NoteId) -> Self {
        self.source_note_id = Some(note);
        self
    }

    /// Parse a KIF string of rule forms, validating each.
    pub fn parse_forms(kif: &str, priority: f64) -> Result<Vec<Rule>, EngineError> {
        crate::kif::parse_kif(kif)?
            .into_iter()
            .map(|form| Rule::new(form, priority))
            .collect()
    }

    /// True for `<=>` rules, which fire in both directions.
    pub fn is_bidirectional(&self) -> bool {
        self.form.op() == Some(OP_IFF)
    }

    /// The reversed reading of a `<=>` rule, if well formed as a rule.
    pub fn reversed(&self) -> Option<Rule> {
        if !self.is_bidirectional() {
            return None;
        }
        let form = Term::lst(vec![
            Term::atom(OP_IMPLIES),
            self.consequent.clone(),
            self.antecedent.clone(),
        ]);
        Rule::new(form, self.priority).ok()
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.form == other.form
    }
}

impl Eq for Rule {}

impl std::hash::Hash for Rule {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.form.hash(state);
    }
}

/// Split an antecedent into conjuncts, validating each clause shape.
fn split_antecedent(antecedent: &Term) -> Result<Vec<Term>, EngineError> {
    if antecedent.atom_value() == Some("true") {
        return Ok(Vec::new());
    }
    let clauses: Vec<Term> = if antecedent.op() == Some(OP_AND) {
        antecedent.args().to_vec()
    } else {
        vec![antecedent.clone()]
    };
    for clause in &clauses {
        let valid = match clause.op() {
            Some(op) if op == OP_NOT => clause.args().len() == 1 && clause.args()[0].is_list(),
            _ => clause.is_list(),
        };
        if !valid {
            return Err(EngineError::validation(format!(
                "antecedent clause must be a list or (not list): `{clause}`"
            )));
        }
    }
    Ok(clauses)
}

/// Variables bound by a quantifier somewhere inside `term`.
fn locally_quantified(term: &Term) -> BTreeSet<SmolStr> {
    let mut out = BTreeSet::new();
    fn walk(term: &Term, out: &mut BTreeSet<SmolStr>) {
        if let Some(op) = term.op()
            && (op == OP_FORALL || op == crate::base::constants::OP_EXISTS)
            && let Some(children) = term.children()
            && children.len() == 3
        {
            out.extend(var_names(&children[1]));
        }
        if let Term::Lst(children) = term {
            for child in children {
                walk(child, out);
            }
        }
    }
    walk(term, &mut out);
    out
}
