//! Typed publish/subscribe façade over a queue-backed event bus.
//!
//! Publishers enqueue and return immediately; a dedicated dispatch thread
//! drains the queue and invokes handlers, so events can be emitted from
//! inside locked sections without ever waiting on subscribers. Handler
//! panics are caught and logged without halting publication.

use crate::engine::assertion::{Assertion, KbId, Rule};
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;
use tracing::{error, trace};
use uuid::Uuid;

/// State-change notifications the engine publishes.
#[derive(Debug, Clone)]
pub enum KbEvent {
    /// An assertion was committed and is active.
    Asserted { assertion: Arc<Assertion> },
    /// An assertion was explicitly retracted; carries its final value.
    Retracted { assertion: Arc<Assertion> },
    /// An assertion was evicted to make room.
    Evicted { assertion: Arc<Assertion> },
    /// An assertion's active status changed.
    StateChanged {
        id: Uuid,
        kb: KbId,
        is_active: bool,
    },
    RuleAdded { rule: Arc<Rule> },
    RuleRemoved { rule: Arc<Rule> },
}

/// Discriminant used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KbEventKind {
    Asserted,
    Retracted,
    Evicted,
    StateChanged,
    RuleAdded,
    RuleRemoved,
}

impl KbEvent {
    pub fn kind(&self) -> KbEventKind {
        match self {
            KbEvent::Asserted { .. } => KbEventKind::Asserted,
            KbEvent::Retracted { .. } => KbEventKind::Retracted,
            KbEvent::Evicted { .. } => KbEventKind::Evicted,
            KbEvent::StateChanged { .. } => KbEventKind::StateChanged,
            KbEvent::RuleAdded { .. } => KbEventKind::RuleAdded,
            KbEvent::RuleRemoved { .. } => KbEventKind::RuleRemoved,
        }
    }
}

type Handler = Arc<dyn Fn(&KbEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    by_kind: rustc_hash::FxHashMap<KbEventKind, Vec<Handler>>,
    all: Vec<Handler>,
}

/// Cloneable handle to the bus. All clones share one queue and one
/// dispatch thread; the thread exits when the last handle is dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<KbEvent>,
    subscribers: Arc<RwLock<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<KbEvent>();
        let subscribers: Arc<RwLock<Subscribers>> = Arc::default();
        let dispatch_subs = Arc::clone(&subscribers);
        std::thread::Builder::new()
            .name("noctua-event-bus".into())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    trace!(kind = ?event.kind(), "dispatching event");
                    let handlers: Vec<Handler> = {
                        let subs = dispatch_subs.read();
                        subs.by_kind
                            .get(&event.kind())
                            .into_iter()
                            .flatten()
                            .chain(subs.all.iter())
                            .cloned()
                            .collect()
                    };
                    for handler in handlers {
                        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                            error!(kind = ?event.kind(), ?panic, "event handler panicked");
                        }
                    }
                }
            })
            .expect("failed to spawn event bus thread");
        Self { tx, subscribers }
    }

    /// Enqueue an event. Never blocks on subscribers; events published after
    /// every bus handle is gone are dropped.
    pub fn publish(&self, event: KbEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to one event kind.
    pub fn subscribe(&self, kind: KbEventKind, handler: impl Fn(&KbEvent) + Send + Sync + 'static) {
        self.subscribers
            .write()
            .by_kind
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Subscribe to every event kind.
    pub fn subscribe_all(&self, handler: impl Fn(&KbEvent) + Send + Sync + 'static) {
        self.subscribers.write().all.push(Arc::new(handler));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn wait_for(predicate: impl Fn() -> bool) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("event bus did not deliver in time");
    }

    fn state_changed(active: bool) -> KbEvent {
        KbEvent::StateChanged {
            id: Uuid::new_v4(),
            kb: crate::base::intern("global"),
            is_active: active,
        }
    }

    #[test]
    fn test_subscribe_receives_matching_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(KbEventKind::StateChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(state_changed(true));
        bus.publish(state_changed(false));
        wait_for(|| seen.load(Ordering::SeqCst) == 2);
    }

    #[test]
    fn test_kind_filter_excludes_others() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(KbEventKind::RuleAdded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(state_changed(true));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_halt_dispatch() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        bus.subscribe(KbEventKind::StateChanged, |_| panic!("boom"));
        let counter = Arc::clone(&seen);
        bus.subscribe(KbEventKind::StateChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(state_changed(true));
        wait_for(|| seen.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn test_events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        bus.subscribe(KbEventKind::StateChanged, move |event| {
            if let KbEvent::StateChanged { is_active, .. } = event {
                sink.lock().unwrap().push(*is_active);
            }
        });
        bus.publish(state_changed(true));
        bus.publish(state_changed(false));
        bus.publish(state_changed(true));
        wait_for(|| order.lock().unwrap().len() == 3);
        assert_eq!(*order.lock().unwrap(), vec![true, false, true]);
    }
}
