//! Structural query execution over the TMS and indices.
//!
//! Queries are idempotent and read-only. `ASK_BINDINGS` collects variable
//! bindings against the active scope (or one target KB) in a deterministic
//! order; `ASK_TRUE_FALSE` succeeds when at least one binding exists;
//! `ACHIEVE_GOAL` first tries existing bindings and then defers to a
//! registered goal resolver for the pattern's head operator. Operator
//! machinery itself lives outside the engine - only the hook is exposed.

use crate::base::Sym;
use crate::engine::assertion::{Assertion, KbId};
use crate::engine::cognition::Cognition;
use crate::engine::error::EngineError;
use crate::kif::Term;
use crate::logic::{Bindings, substitute, unify};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    AskBindings,
    AskTrueFalse,
    AchieveGoal,
}

/// Optional execution knobs carried by a query.
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    /// Report `Timeout` once this much time has elapsed.
    pub timeout: Option<Duration>,
    /// Cap on the number of returned bindings.
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub id: Uuid,
    pub query_type: QueryType,
    pub pattern: Term,
    /// Restrict the search to one KB instead of the active scope.
    pub target_kb_id: Option<KbId>,
    pub parameters: QueryParameters,
}

impl Query {
    pub fn new(query_type: QueryType, pattern: Term) -> Self {
        Self {
            id: Uuid::new_v4(),
            query_type,
            pattern,
            target_kb_id: None,
            parameters: QueryParameters::default(),
        }
    }

    pub fn with_target_kb(mut self, kb: KbId) -> Self {
        self.target_kb_id = Some(kb);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.parameters.timeout = Some(timeout);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.parameters.max_results = Some(max);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Success,
    Failure,
    Timeout,
    Error,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query_id: Uuid,
    pub status: QueryStatus,
    pub bindings: Vec<Bindings>,
    /// Details accompanying `Error` (and occasionally `Failure`).
    pub explanation: Option<String>,
}

impl QueryResult {
    fn new(query_id: Uuid, status: QueryStatus) -> Self {
        Self {
            query_id,
            status,
            bindings: Vec::new(),
            explanation: None,
        }
    }

    fn error(query_id: Uuid, explanation: impl Into<String>) -> Self {
        Self {
            explanation: Some(explanation.into()),
            ..Self::new(query_id, QueryStatus::Error)
        }
    }
}

/// Hook for `ACHIEVE_GOAL` patterns whose head is a registered operator.
/// The goal arrives with its arguments already bound.
pub trait GoalResolver: Send + Sync {
    fn resolve(&self, goal: &Term) -> Result<bool, EngineError>;
}

pub struct QueryExecutor {
    cognition: Arc<Cognition>,
    resolvers: RwLock<FxHashMap<Sym, Arc<dyn GoalResolver>>>,
}

impl QueryExecutor {
    pub fn new(cognition: Arc<Cognition>) -> Self {
        Self {
            cognition,
            resolvers: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register the resolver invoked for goals with this head operator.
    pub fn register_goal_resolver(&self, operator: Sym, resolver: Arc<dyn GoalResolver>) {
        self.resolvers.write().insert(operator, resolver);
    }

    pub fn execute(&self, query: &Query) -> QueryResult {
        if !query.pattern.is_list() {
            return QueryResult::error(
                query.id,
                format!("query pattern must be a list, got `{}`", query.pattern),
            );
        }
        let deadline = query.parameters.timeout.map(|t| Instant::now() + t);
        match query.query_type {
            QueryType::AskBindings => self.ask(query, deadline),
            QueryType::AskTrueFalse => {
                let mut result = self.ask(query, deadline);
                // True/false carries no bindings, only the verdict.
                result.bindings.clear();
                result
            }
            QueryType::AchieveGoal => self.achieve(query, deadline),
        }
    }

    /// Candidate assertions for the query's scope: one target KB, or the
    /// global-plus-active-notes union.
    fn candidates(&self, query: &Query) -> Vec<Arc<Assertion>> {
        match &query.target_kb_id {
            Some(target) => self.cognition.kb(Some(target)).find_unifiable(&query.pattern),
            None => self
                .cognition
                .find_assertions_across_active_kbs(&query.pattern, |_| true),
        }
    }

    fn ask(&self, query: &Query, deadline: Option<Instant>) -> QueryResult {
        let mut candidates = self.candidates(query);
        // Deterministic ordering: priority desc, timestamp asc, id asc.
        candidates.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
                .then_with(|| a.id.cmp(&b.id))
        });

        let pattern_vars = query.pattern.vars();
        let max_results = query.parameters.max_results.unwrap_or(usize::MAX);
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut bindings = Vec::new();

        for assertion in candidates {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return QueryResult::new(query.id, QueryStatus::Timeout);
            }
            let Some(theta) = unify(&query.pattern, &assertion.kif, &Bindings::default()) else {
                continue;
            };
            // Restrict to the pattern's own variables, fully resolved.
            let restricted: Bindings = pattern_vars
                .iter()
                .filter_map(|v| {
                    theta
                        .get(v.as_str())
                        .map(|t| (v.clone(), substitute(t, &theta)))
                })
                .collect();
            if seen.insert(render_bindings(&restricted)) {
                bindings.push(restricted);
                if bindings.len() >= max_results {
                    break;
                }
            }
        }

        let status = if bindings.is_empty() {
            QueryStatus::Failure
        } else {
            QueryStatus::Success
        };
        QueryResult {
            query_id: query.id,
            status,
            bindings,
            explanation: None,
        }
    }

    fn achieve(&self, query: &Query, deadline: Option<Instant>) -> QueryResult {
        let asked = self.ask(query, deadline);
        if matches!(asked.status, QueryStatus::Success | QueryStatus::Timeout) {
            return asked;
        }

        let Some(Term::Atom(head)) = query.pattern.children().and_then(|c| c.first()) else {
            return asked;
        };
        let resolver = self.resolvers.read().get(head.sym()).cloned();
        let Some(resolver) = resolver else {
            return asked;
        };
        match resolver.resolve(&query.pattern) {
            Ok(true) => QueryResult::new(query.id, QueryStatus::Success),
            Ok(false) => QueryResult::new(query.id, QueryStatus::Failure),
            Err(err) => QueryResult::error(query.id, err.to_string()),
        }
    }
}

/// Canonical rendering used to collapse duplicate binding sets.
fn render_bindings(bindings: &Bindings) -> String {
    let mut entries: Vec<String> = bindings
        .iter()
        .map(|(var, term)| format!("{var}={term}"))
        .collect();
    entries.sort();
    entries.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::intern;
    use crate::engine::assertion::PotentialAssertion;
    use crate::engine::config::EngineConfig;
    use crate::engine::events::EventBus;
    use crate::kif::parse_kif;

    fn term(s: &str) -> Term {
        parse_kif(s).unwrap().remove(0)
    }

    fn pa(kif: &str, priority: f64) -> PotentialAssertion {
        PotentialAssertion::new(term(kif), priority).unwrap()
    }

    fn setup() -> (Arc<Cognition>, QueryExecutor) {
        let cognition = Cognition::new(EngineConfig::default(), EventBus::new());
        let executor = QueryExecutor::new(Arc::clone(&cognition));
        (cognition, executor)
    }

    #[test]
    fn test_ask_bindings_orders_by_priority_then_timestamp() {
        let (cognition, executor) = setup();
        cognition.submit(pa("(likes Alice Bob)", 0.4), "test").unwrap();
        cognition.submit(pa("(likes Carol Bob)", 0.9), "test").unwrap();

        let query = Query::new(QueryType::AskBindings, term("(likes ?who Bob)"));
        let result = executor.execute(&query);
        assert_eq!(result.status, QueryStatus::Success);
        assert_eq!(result.bindings.len(), 2);
        assert_eq!(result.bindings[0].get("?who"), Some(&term("Carol")));
        assert_eq!(result.bindings[1].get("?who"), Some(&term("Alice")));
    }

    #[test]
    fn test_ask_bindings_deduplicates() {
        let (cognition, executor) = setup();
        let note = intern("note-1");
        cognition.add_active_note(note.clone());
        // Same binding reachable from two KBs.
        cognition.submit(pa("(likes Alice Bob)", 0.5), "test").unwrap();
        cognition
            .submit(pa("(likes Alice Bob)", 0.5).with_source_note(note), "test")
            .unwrap();

        let query = Query::new(QueryType::AskBindings, term("(likes ?who Bob)"));
        let result = executor.execute(&query);
        assert_eq!(result.bindings.len(), 1);
    }

    #[test]
    fn test_ask_bindings_no_match_is_failure() {
        let (_cognition, executor) = setup();
        let query = Query::new(QueryType::AskBindings, term("(likes ?who Bob)"));
        let result = executor.execute(&query);
        assert_eq!(result.status, QueryStatus::Failure);
        assert!(result.bindings.is_empty());
    }

    #[test]
    fn test_ask_true_false() {
        let (cognition, executor) = setup();
        cognition.submit(pa("(likes Alice Bob)", 0.5), "test").unwrap();

        let result = executor.execute(&Query::new(
            QueryType::AskTrueFalse,
            term("(likes Alice ?x)"),
        ));
        assert_eq!(result.status, QueryStatus::Success);
        assert!(result.bindings.is_empty(), "true/false carries no bindings");

        let result = executor.execute(&Query::new(
            QueryType::AskTrueFalse,
            term("(likes Bob ?x)"),
        ));
        assert_eq!(result.status, QueryStatus::Failure);
    }

    #[test]
    fn test_target_kb_scopes_query() {
        let (cognition, executor) = setup();
        let note = intern("note-1");
        cognition
            .submit(
                pa("(likes Carol Bob)", 0.5).with_source_note(note.clone()),
                "test",
            )
            .unwrap();
        cognition.submit(pa("(likes Alice Bob)", 0.5), "test").unwrap();

        // The note KB is not active, but targeting it directly still works.
        let query =
            Query::new(QueryType::AskBindings, term("(likes ?who Bob)")).with_target_kb(note);
        let result = executor.execute(&query);
        assert_eq!(result.bindings.len(), 1);
        assert_eq!(result.bindings[0].get("?who"), Some(&term("Carol")));
    }

    #[test]
    fn test_non_list_pattern_is_error() {
        let (_cognition, executor) = setup();
        let result = executor.execute(&Query::new(QueryType::AskBindings, term("atom")));
        assert_eq!(result.status, QueryStatus::Error);
        assert!(result.explanation.is_some());
    }

    #[test]
    fn test_expired_deadline_reports_timeout() {
        let (cognition, executor) = setup();
        cognition.submit(pa("(likes Alice Bob)", 0.5), "test").unwrap();
        let query = Query::new(QueryType::AskBindings, term("(likes ?who Bob)"))
            .with_timeout(Duration::ZERO);
        let result = executor.execute(&query);
        assert_eq!(result.status, QueryStatus::Timeout);
    }

    #[test]
    fn test_max_results_caps_bindings() {
        let (cognition, executor) = setup();
        for name in ["Alice", "Carol", "Dave"] {
            cognition
                .submit(pa(&format!("(likes {name} Bob)"), 0.5), "test")
                .unwrap();
        }
        let query =
            Query::new(QueryType::AskBindings, term("(likes ?who Bob)")).with_max_results(2);
        let result = executor.execute(&query);
        assert_eq!(result.bindings.len(), 2);
    }

    #[test]
    fn test_achieve_goal_from_existing_bindings() {
        let (cognition, executor) = setup();
        cognition.submit(pa("(door open)", 0.5), "test").unwrap();
        let result = executor.execute(&Query::new(QueryType::AchieveGoal, term("(door ?state)")));
        assert_eq!(result.status, QueryStatus::Success);
    }

    #[test]
    fn test_achieve_goal_defers_to_resolver() {
        struct AlwaysAchieves;
        impl GoalResolver for AlwaysAchieves {
            fn resolve(&self, _goal: &Term) -> Result<bool, EngineError> {
                Ok(true)
            }
        }

        let (_cognition, executor) = setup();
        let result = executor.execute(&Query::new(QueryType::AchieveGoal, term("(open door)")));
        assert_eq!(result.status, QueryStatus::Failure);

        executor.register_goal_resolver(intern("open"), Arc::new(AlwaysAchieves));
        let result = executor.execute(&Query::new(QueryType::AchieveGoal, term("(open door)")));
        assert_eq!(result.status, QueryStatus::Success);
    }

    #[test]
    fn test_failed_resolver_is_error_with_details() {
        struct Broken;
        impl GoalResolver for Broken {
            fn resolve(&self, goal: &Term) -> Result<bool, EngineError> {
                Err(EngineError::query(format!("operator failed on `{goal}`")))
            }
        }

        let (_cognition, executor) = setup();
        executor.register_goal_resolver(intern("open"), Arc::new(Broken));
        let result = executor.execute(&Query::new(QueryType::AchieveGoal, term("(open door)")));
        assert_eq!(result.status, QueryStatus::Error);
        assert!(result.explanation.unwrap().contains("operator failed"));
    }
}
