//! Forward-chaining rule application.
//!
//! One pass matches every rule's antecedent conjuncts against the active
//! scope by a binding join: each conjunct extends the set of candidate
//! substitutions, accumulating the matched assertions as support. Negative
//! conjuncts `(not body)` are satisfied either by an explicitly negated
//! assertion that unifies, or by the absence of any active assertion
//! matching the fully instantiated body. Instantiated consequents are
//! skolemized, simplified, split on `and`, and submitted with the matched
//! support; derivations that would exceed the depth limit are skipped.
//!
//! Rules are α-renamed before matching so their variables cannot capture
//! variables in stored assertions. `<=>` rules fire in both directions.

use crate::base::constants::{OP_AND, OP_FORALL, OP_NOT};
use crate::engine::assertion::{PotentialAssertion, Rule};
use crate::engine::cognition::Cognition;
use crate::kif::Term;
use crate::logic::{Bindings, free_vars, rename_vars, simplify, skolemize, substitute, unify};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Source tag used for derived commits.
const SOURCE: &str = "reasoner";

pub struct Reasoner {
    cognition: Arc<Cognition>,
}

impl Reasoner {
    pub fn new(cognition: Arc<Cognition>) -> Self {
        Self { cognition }
    }

    /// Apply every rule once against the current active scope. Returns the
    /// number of newly committed derivations.
    pub fn step(&self) -> usize {
        let mut derived = 0;
        for rule in self.cognition.rules() {
            derived += self.fire(&rule);
            if let Some(reversed) = rule.reversed() {
                derived += self.fire(&reversed);
            }
        }
        derived
    }

    /// Run passes until a pass derives nothing new, bounded by
    /// `max_passes`. Idempotent on a saturated store.
    pub fn run_to_fixpoint(&self, max_passes: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_passes {
            let derived = self.step();
            if derived == 0 {
                break;
            }
            total += derived;
        }
        total
    }

    fn fire(&self, rule: &Rule) -> usize {
        let (antecedents, consequent) = rename_rule_apart(rule, &self.cognition);

        // Binding join over the conjuncts.
        let mut matches: Vec<(Bindings, BTreeSet<Uuid>)> =
            vec![(Bindings::default(), BTreeSet::new())];
        for conjunct in &antecedents {
            let mut extended = Vec::new();
            for (theta, support) in &matches {
                if conjunct.op() == Some(OP_NOT) {
                    self.match_negative(conjunct, theta, support, &mut extended);
                } else {
                    self.match_positive(conjunct, theta, support, &mut extended);
                }
            }
            matches = extended;
            if matches.is_empty() {
                return 0;
            }
        }

        let mut count = 0;
        for (theta, support) in matches {
            count += self.derive(rule, &consequent, &theta, &support);
        }
        count
    }

    fn match_positive(
        &self,
        conjunct: &Term,
        theta: &Bindings,
        support: &BTreeSet<Uuid>,
        out: &mut Vec<(Bindings, BTreeSet<Uuid>)>,
    ) {
        let pattern = substitute(conjunct, theta);
        let candidates = self
            .cognition
            .find_assertions_across_active_kbs(&pattern, |a| !a.negated);
        for assertion in candidates {
            if let Some(extended) = unify(conjunct, &assertion.kif, theta) {
                let mut support = support.clone();
                support.insert(assertion.id);
                out.push((extended, support));
            }
        }
    }

    /// A negative conjunct is satisfied by an explicitly negated assertion
    /// that unifies, or by the absence of any active match for the fully
    /// instantiated body. The absence reading needs a ground body - an open
    /// body under the current bindings is skipped as unsound.
    fn match_negative(
        &self,
        conjunct: &Term,
        theta: &Bindings,
        support: &BTreeSet<Uuid>,
        out: &mut Vec<(Bindings, BTreeSet<Uuid>)>,
    ) {
        let pattern = substitute(conjunct, theta);
        for assertion in self
            .cognition
            .find_assertions_across_active_kbs(&pattern, |a| a.negated)
        {
            if let Some(extended) = unify(conjunct, &assertion.kif, theta) {
                let mut support = support.clone();
                support.insert(assertion.id);
                out.push((extended, support));
            }
        }

        let body = substitute(&conjunct.args()[0], theta);
        if !body.vars().is_empty() {
            trace!(conjunct = %pattern, "open negative conjunct skipped");
            return;
        }
        let present = self
            .cognition
            .find_assertions_across_active_kbs(&body, |a| !a.negated)
            .iter()
            .any(|a| unify(&body, &a.kif, &Bindings::default()).is_some());
        if !present {
            out.push((theta.clone(), support.clone()));
        }
    }

    fn derive(
        &self,
        rule: &Rule,
        consequent: &Term,
        theta: &Bindings,
        support: &BTreeSet<Uuid>,
    ) -> usize {
        let depth = self.cognition.calculate_derived_depth(support);
        if depth > self.cognition.config().reasoning_depth_limit {
            trace!(
                rule = %rule.form,
                depth,
                limit = self.cognition.config().reasoning_depth_limit,
                "derivation beyond depth limit skipped"
            );
            return 0;
        }

        let instantiated = substitute(consequent, theta);
        let universal_ctx: Vec<SmolStr> = free_vars(&instantiated);
        let skolemized = skolemize(&instantiated, &universal_ctx, self.cognition.fresh_ids());
        let simplified = simplify(&skolemized);

        let conjuncts: Vec<Term> = if simplified.op() == Some(OP_AND) {
            simplified.args().to_vec()
        } else {
            vec![simplified]
        };

        let priority = self
            .cognition
            .calculate_derived_priority(support, rule.priority);
        let source_note = self.cognition.common_source_note_id(support);

        let mut count = 0;
        for conjunct in conjuncts {
            if !conjunct.is_list() {
                trace!(consequent = %conjunct, "non-list consequent skipped");
                continue;
            }
            if !conjunct.vars().is_empty() && conjunct.op() != Some(OP_FORALL) {
                trace!(consequent = %conjunct, "open consequent skipped");
                continue;
            }
            let pa = match PotentialAssertion::new(conjunct, priority) {
                Ok(pa) => pa,
                Err(err) => {
                    debug!(rule = %rule.form, %err, "derived consequent invalid");
                    continue;
                }
            };
            let mut pa = pa
                .with_support(support.iter().copied())
                .with_derivation_depth(depth);
            if let Some(note) = &source_note {
                pa = pa.with_source_note(note.clone());
            }
            if self.cognition.try_commit(pa, SOURCE).is_some() {
                count += 1;
            }
        }
        count
    }
}

/// α-rename a rule's variables so they cannot collide with variables in
/// stored assertions. Antecedents and consequent are renamed together so
/// shared variables stay shared.
fn rename_rule_apart(rule: &Rule, cognition: &Cognition) -> (Vec<Term>, Term) {
    let mut combined = Vec::with_capacity(rule.antecedents.len() + 1);
    combined.push(rule.consequent.clone());
    combined.extend(rule.antecedents.iter().cloned());
    let renamed = rename_vars(&Term::lst(combined), cognition.fresh_ids());
    let mut children = match renamed {
        Term::Lst(children) => children,
        _ => unreachable!("rename preserves structure"),
    };
    let consequent = children.remove(0);
    (children, consequent)
}
