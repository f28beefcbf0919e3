//! String interner for atom symbols.
//!
//! Uses `Arc<str>` for cheap cloning (reference count increment instead of
//! allocation). The interner deduplicates strings so identical symbols share
//! the same allocation, which makes atom equality a pointer-or-content check
//! on a shared buffer.
//!
//! A single process-wide table backs [`intern`]; it is synchronized
//! internally so lexing and engine threads can intern concurrently.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// An interned symbol - cheap to clone (just Arc increment)
pub type Sym = Arc<str>;

/// String interner that deduplicates symbols.
///
/// Interning a string returns an `Arc<str>` that can be cheaply cloned.
/// If the same string is interned multiple times, the same `Arc` is returned.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Mutex<HashSet<Arc<str>>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning a cheap-to-clone reference.
    ///
    /// If the string was already interned, returns the existing `Arc`.
    /// Otherwise, creates a new `Arc` and stores it.
    pub fn intern(&self, s: &str) -> Sym {
        let mut strings = self.strings.lock();
        if let Some(existing) = strings.get(s) {
            Arc::clone(existing)
        } else {
            let arc: Arc<str> = Arc::from(s);
            strings.insert(Arc::clone(&arc));
            arc
        }
    }

    /// Get an interned symbol if it exists, without creating it.
    pub fn get(&self, s: &str) -> Option<Sym> {
        self.strings.lock().get(s).cloned()
    }

    /// Number of unique symbols interned.
    pub fn len(&self) -> usize {
        self.strings.lock().len()
    }

    /// Returns true if no symbols have been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.lock().is_empty()
    }
}

/// Intern a symbol in the process-wide table.
pub fn intern(s: &str) -> Sym {
    static GLOBAL: OnceLock<Interner> = OnceLock::new();
    GLOBAL.get_or_init(Interner::new).intern(s)
}
