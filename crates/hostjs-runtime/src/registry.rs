//! The Value Registry: maps a handle's address to the [`Value`] it was
//! minted from.
//!
//! Grounded on `otter-runtime`'s `Holt` (a `DashMap`-backed handle table),
//! but keyed by the address of the embedded `ValueHandle` instead of a
//! sequential id — §3's load-bearing invariant is that handle identity *is*
//! an address, not an index, so the client can dereference the payload
//! union directly without a registry round-trip for primitives.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::value::Value;

/// Owns every live [`Value`] reachable from the client, keyed by
/// `Value::handle_addr()`.
pub struct Registry {
    entries: DashMap<usize, Box<Value>>,
    live: AtomicUsize,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            live: AtomicUsize::new(0),
        }
    }

    /// Box `value`, record it under its own handle address, and return that
    /// address — the wire-level handle the client receives.
    pub fn remember(&self, value: Value) -> usize {
        let boxed = Box::new(value);
        let addr = boxed.handle_addr();
        self.entries.insert(addr, boxed);
        self.live.fetch_add(1, Ordering::Relaxed);
        addr
    }

    /// Remove and return the entry at `addr`, if present. The caller is
    /// responsible for routing any persistent engine handle inside it to
    /// the Object Collector.
    pub fn forget(&self, addr: usize) -> Option<Box<Value>> {
        let removed = self.entries.remove(&addr).map(|(_, v)| v);
        if removed.is_some() {
            self.live.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Borrow the entry at `addr` without removing it. `DashMap`'s guard
    /// holds a shard lock, so callers must not call back into the Registry
    /// while holding the returned reference.
    pub fn with<R>(&self, addr: usize, f: impl FnOnce(&Value) -> R) -> Option<R> {
        self.entries.get(&addr).map(|entry| f(entry.value()))
    }

    pub fn count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn remember_then_forget() {
        let reg = Registry::new();
        let addr = reg.remember(Value::integer(42));
        assert_eq!(reg.count(), 1);

        let got = reg.with(addr, |v| match v.data {
            crate::value::ValueData::Inline => unsafe { v.handle.payload.integer },
            _ => panic!("wrong variant"),
        });
        assert_eq!(got, Some(42));

        assert!(reg.forget(addr).is_some());
        assert_eq!(reg.count(), 0);
        assert!(reg.forget(addr).is_none());
    }

    #[test]
    fn addresses_are_distinct() {
        let reg = Registry::new();
        let a = reg.remember(Value::integer(1));
        let b = reg.remember(Value::integer(2));
        assert_ne!(a, b);
    }
}
