//! Cross-KB arbitration: KB routing, rules, derivation bookkeeping, and
//! search across the active scope.
//!
//! One `Cognition` owns the global KB, lazily creates a per-note KB the
//! first time a note id is seen, holds the rule set and the active-note
//! set, and shares a single TMS and event bus across all of them.

use crate::base::constants::GLOBAL_KB;
use crate::base::{FreshIds, Sym, intern};
use crate::engine::assertion::{Assertion, NoteId, PotentialAssertion, Rule};
use crate::engine::config::EngineConfig;
use crate::engine::events::{EventBus, KbEvent};
use crate::engine::kb::Knowledge;
use crate::engine::tms::Tms;
use crate::kif::Term;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct Cognition {
    config: EngineConfig,
    bus: EventBus,
    tms: Arc<Tms>,
    /// Monotonic timestamp source shared by every KB.
    clock: Arc<FreshIds>,
    /// Fresh ids for renaming and skolemization.
    fresh: Arc<FreshIds>,
    global: Arc<Knowledge>,
    note_kbs: RwLock<rustc_hash::FxHashMap<NoteId, Arc<Knowledge>>>,
    /// Rules keyed by form; insertion order is preserved.
    rules: RwLock<IndexMap<Term, Arc<Rule>>>,
    /// Note ids participating in cross-KB search. Always contains the
    /// global id.
    active_notes: RwLock<FxHashSet<NoteId>>,
}

impl Cognition {
    pub fn new(config: EngineConfig, bus: EventBus) -> Arc<Self> {
        let tms = Arc::new(Tms::new(bus.clone()));
        let clock = Arc::new(FreshIds::new());
        let global = Knowledge::new(
            intern(GLOBAL_KB),
            config.global_kb_capacity,
            config.subsumption_enabled,
            Arc::clone(&tms),
            bus.clone(),
            Arc::clone(&clock),
        );
        let mut active = FxHashSet::default();
        active.insert(intern(GLOBAL_KB));
        Arc::new(Self {
            config,
            bus,
            tms,
            clock,
            fresh: Arc::new(FreshIds::new()),
            global,
            note_kbs: RwLock::new(rustc_hash::FxHashMap::default()),
            rules: RwLock::new(IndexMap::new()),
            active_notes: RwLock::new(active),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tms(&self) -> &Arc<Tms> {
        &self.tms
    }

    pub fn fresh_ids(&self) -> &Arc<FreshIds> {
        &self.fresh
    }

    /// The global KB for `None` or the global id; otherwise the note's KB,
    /// created on first use with the same capacity as the global one.
    pub fn kb(&self, note_id: Option<&NoteId>) -> Arc<Knowledge> {
        let Some(note_id) = note_id else {
            return Arc::clone(&self.global);
        };
        if **note_id == *GLOBAL_KB {
            return Arc::clone(&self.global);
        }
        if let Some(existing) = self.note_kbs.read().get(note_id) {
            return Arc::clone(existing);
        }
        let mut kbs = self.note_kbs.write();
        Arc::clone(kbs.entry(note_id.clone()).or_insert_with(|| {
            debug!(note = %note_id, "creating note KB");
            Knowledge::new(
                note_id.clone(),
                self.config.global_kb_capacity,
                self.config.subsumption_enabled,
                Arc::clone(&self.tms),
                self.bus.clone(),
                Arc::clone(&self.clock),
            )
        }))
    }

    /// Commit a candidate into the KB it routes to.
    pub fn try_commit(&self, pa: PotentialAssertion, source: &str) -> Option<Arc<Assertion>> {
        let kb = self.kb(pa.route().cloned().as_ref());
        kb.commit(pa, source)
    }

    /// External input contract: commit and hand back the new id, or `None`
    /// with no visible side effects on rejection.
    pub fn submit(&self, pa: PotentialAssertion, source: &str) -> Option<Uuid> {
        self.try_commit(pa, source).map(|a| a.id)
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// Add a rule. Returns false (no event) when a rule with the same form
    /// is already present.
    pub fn add_rule(&self, rule: Rule) -> bool {
        let rule = Arc::new(rule);
        let added = {
            let mut rules = self.rules.write();
            if rules.contains_key(&rule.form) {
                false
            } else {
                rules.insert(rule.form.clone(), Arc::clone(&rule));
                true
            }
        };
        if added {
            self.bus.publish(KbEvent::RuleAdded { rule });
        }
        added
    }

    /// Remove the rule with this form. Returns false when absent.
    pub fn remove_rule(&self, form: &Term) -> bool {
        let removed = self.rules.write().shift_remove(form);
        match removed {
            Some(rule) => {
                self.bus.publish(KbEvent::RuleRemoved { rule });
                true
            }
            None => false,
        }
    }

    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.rules.read().values().cloned().collect()
    }

    /// Parse a KIF string of rule forms and add each one. Returns the ids
    /// of the rules actually added (forms already present are skipped).
    pub fn add_rules_from_kif(
        &self,
        kif: &str,
        priority: f64,
    ) -> Result<Vec<Uuid>, crate::engine::error::EngineError> {
        let mut added = Vec::new();
        for rule in Rule::parse_forms(kif, priority)? {
            let id = rule.id;
            if self.add_rule(rule) {
                added.push(id);
            }
        }
        Ok(added)
    }

    // ------------------------------------------------------------------
    // Derivation bookkeeping
    // ------------------------------------------------------------------

    /// Derived priority: min over the support's priorities, decayed.
    /// Empty support keeps the base priority.
    pub fn calculate_derived_priority(&self, support: &BTreeSet<Uuid>, base: f64) -> f64 {
        let min = support
            .iter()
            .filter_map(|id| self.tms.get(*id))
            .map(|a| a.priority)
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            min * self.config.decay()
        } else {
            base
        }
    }

    /// Derived depth: 1 + max over the support's depths; 0 for empty
    /// support.
    pub fn calculate_derived_depth(&self, support: &BTreeSet<Uuid>) -> u32 {
        support
            .iter()
            .filter_map(|id| self.tms.get(*id))
            .map(|a| a.derivation_depth)
            .max()
            .map(|depth| depth + 1)
            .unwrap_or(0)
    }

    /// BFS through the justification graph: the single source note all
    /// support paths agree on, or `None` when they disagree or none is
    /// recorded. Each id is visited at most once.
    pub fn common_source_note_id(&self, support: &BTreeSet<Uuid>) -> Option<NoteId> {
        let mut queue: VecDeque<Uuid> = support.iter().copied().collect();
        let mut visited: FxHashSet<Uuid> = FxHashSet::default();
        let mut common: Option<NoteId> = None;
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(assertion) = self.tms.get(id) else {
                continue;
            };
            if let Some(note) = &assertion.source_note_id {
                match &common {
                    None => common = Some(note.clone()),
                    Some(existing) if existing == note => {}
                    Some(_) => return None,
                }
            }
            queue.extend(assertion.justification_ids.iter().copied());
        }
        common
    }

    // ------------------------------------------------------------------
    // Active-note set and cross-KB search
    // ------------------------------------------------------------------

    pub fn add_active_note(&self, note: NoteId) {
        self.active_notes.write().insert(note);
    }

    /// The global id stays active regardless.
    pub fn remove_active_note(&self, note: &NoteId) {
        if **note != *GLOBAL_KB {
            self.active_notes.write().remove(note);
        }
    }

    pub fn is_active_note(&self, note: &NoteId) -> bool {
        self.active_notes.read().contains(note)
    }

    pub fn active_notes(&self) -> Vec<NoteId> {
        self.active_notes.read().iter().cloned().collect()
    }

    /// KBs in the current search scope: global plus the active notes' KBs
    /// that exist.
    fn active_scope(&self) -> Vec<Arc<Knowledge>> {
        let mut scope = vec![Arc::clone(&self.global)];
        let notes = self.active_notes.read();
        let kbs = self.note_kbs.read();
        for note in notes.iter() {
            if let Some(kb) = kbs.get(note) {
                scope.push(Arc::clone(kb));
            }
        }
        scope
    }

    /// Union of the per-KB unifiable-candidate queries across the active
    /// scope, keeping active assertions whose KB or source note is active
    /// and which pass `filter`.
    pub fn find_assertions_across_active_kbs(
        &self,
        pattern: &Term,
        filter: impl Fn(&Assertion) -> bool + Send + Sync,
    ) -> Vec<Arc<Assertion>> {
        let scope = self.active_scope();
        let mut found: Vec<Arc<Assertion>> = scope
            .par_iter()
            .flat_map_iter(|kb| kb.find_unifiable(pattern))
            .filter(|a| {
                a.is_active
                    && (self.is_scope_id(&a.kb_id)
                        || a.source_note_id.as_ref().is_some_and(|n| self.is_scope_id(n)))
                    && filter(a)
            })
            .collect();
        found.sort_by_key(|a| a.id);
        found.dedup_by_key(|a| a.id);
        found
    }

    /// Universal assertions referencing `pred` across the active scope.
    pub fn find_universals_across_active_kbs(&self, pred: &Sym) -> Vec<Arc<Assertion>> {
        let mut found: Vec<Arc<Assertion>> = self
            .active_scope()
            .iter()
            .flat_map(|kb| kb.find_relevant_universals(pred))
            .collect();
        found.sort_by_key(|a| a.id);
        found.dedup_by_key(|a| a.id);
        found
    }

    fn is_scope_id(&self, id: &Sym) -> bool {
        **id == *GLOBAL_KB || self.active_notes.read().contains(id)
    }
}
