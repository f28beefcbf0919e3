//! The reasoning engine: stores, truth maintenance, rules, and queries.
//!
//! [`Engine`] wires the pieces together for external callers: one event
//! bus, one TMS, a [`Cognition`] arbitrating commits across note-scoped
//! KBs, a forward-chaining [`Reasoner`], and a [`QueryExecutor`].

pub mod assertion;
pub mod cognition;
pub mod config;
pub mod error;
pub mod events;
pub mod kb;
pub mod path_index;
pub mod query;
pub mod reasoner;
pub mod tms;

pub use assertion::{Assertion, AssertionType, KbId, NoteId, PotentialAssertion, Rule};
pub use cognition::Cognition;
pub use config::EngineConfig;
pub use error::EngineError;
pub use events::{EventBus, KbEvent, KbEventKind};
pub use kb::Knowledge;
pub use path_index::PathIndex;
pub use query::{GoalResolver, Query, QueryExecutor, QueryResult, QueryStatus, QueryType};
pub use reasoner::Reasoner;
pub use tms::Tms;

use crate::base::Sym;
use std::sync::Arc;
use uuid::Uuid;

/// Facade owning a fully wired engine.
pub struct Engine {
    bus: EventBus,
    cognition: Arc<Cognition>,
    reasoner: Reasoner,
    executor: QueryExecutor,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let bus = EventBus::new();
        let cognition = Cognition::new(config, bus.clone());
        let reasoner = Reasoner::new(Arc::clone(&cognition));
        let executor = QueryExecutor::new(Arc::clone(&cognition));
        Self {
            bus,
            cognition,
            reasoner,
            executor,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn cognition(&self) -> &Arc<Cognition> {
        &self.cognition
    }

    /// Submit a candidate assertion; `None` on any rejection.
    pub fn submit(&self, pa: PotentialAssertion, source: &str) -> Option<Uuid> {
        self.cognition.submit(pa, source)
    }

    /// Parse rule forms from KIF and register them.
    pub fn add_rules_from_kif(&self, kif: &str, priority: f64) -> Result<Vec<Uuid>, EngineError> {
        self.cognition.add_rules_from_kif(kif, priority)
    }

    pub fn submit_query(&self, query: &Query) -> QueryResult {
        self.executor.execute(query)
    }

    /// One forward-chaining pass; returns the number of new derivations.
    pub fn step(&self) -> usize {
        self.reasoner.step()
    }

    /// Forward-chain until saturated, bounded by `max_passes`.
    pub fn run_to_fixpoint(&self, max_passes: usize) -> usize {
        self.reasoner.run_to_fixpoint(max_passes)
    }

    pub fn register_goal_resolver(&self, operator: Sym, resolver: Arc<dyn GoalResolver>) {
        self.executor.register_goal_resolver(operator, resolver);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
