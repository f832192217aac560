//! Per-batch entity registry
//!
//! Memoizes resolved matches for the lifetime of one top-level resolution so
//! that a league match shared by both teams' histories is resolved once, and
//! detects cyclic dependencies (a match transitively depending on itself).
//! Released in bulk at batch boundaries to bound memory over long runs.

use crate::{LineupError, MatchKey, Result};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Scoped cache of resolved entities keyed by composite match identity.
///
/// Resolution is single-threaded but reentrant: the factory for one match may
/// recursively resolve its dependencies through the same registry. A key is
/// marked in progress before its factory runs; re-entering the same key while
/// it is still in progress is a `CyclicDependency` error.
pub struct Registry<V> {
    entries: HashMap<MatchKey, Rc<V>>,
    in_progress: HashSet<MatchKey>,
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Registry {
            entries: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Cached entity for a key, if already resolved in this batch
    pub fn get(&self, key: MatchKey) -> Option<Rc<V>> {
        self.entries.get(&key).cloned()
    }

    /// Mark a key as being resolved. Fails if the key is already in flight.
    pub fn begin(&mut self, key: MatchKey) -> Result<()> {
        if !self.in_progress.insert(key) {
            return Err(LineupError::CyclicDependency(key));
        }
        Ok(())
    }

    /// Store the finished entity and clear the in-progress mark
    pub fn finish(&mut self, key: MatchKey, value: V) -> Rc<V> {
        self.in_progress.remove(&key);
        let entity = Rc::new(value);
        self.entries.insert(key, Rc::clone(&entity));
        entity
    }

    /// Clear the in-progress mark after a failed resolution
    pub fn abandon(&mut self, key: MatchKey) {
        self.in_progress.remove(&key);
    }

    /// Drop a single entry once no further consumer needs it
    pub fn release(&mut self, key: MatchKey) {
        self.entries.remove(&key);
    }

    /// Bulk teardown at a batch boundary
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_progress.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatchId;

    #[test]
    fn test_memoization() {
        let mut registry: Registry<String> = Registry::new();
        let key = MatchKey::tournament(MatchId(1));

        assert!(registry.get(key).is_none());
        registry.begin(key).unwrap();
        let entity = registry.finish(key, "resolved".to_string());
        assert_eq!(*entity, "resolved");
        assert_eq!(*registry.get(key).unwrap(), "resolved");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_cycle_detection() {
        let mut registry: Registry<()> = Registry::new();
        let key = MatchKey::league(MatchId(42));

        registry.begin(key).unwrap();
        match registry.begin(key) {
            Err(LineupError::CyclicDependency(k)) => assert_eq!(k, key),
            other => panic!("expected CyclicDependency, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_same_id_different_competition() {
        let mut registry: Registry<()> = Registry::new();
        registry.begin(MatchKey::tournament(MatchId(7))).unwrap();
        // A league match with the same numeric id is a distinct entity
        registry.begin(MatchKey::league(MatchId(7))).unwrap();
    }

    #[test]
    fn test_abandon_allows_retry() {
        let mut registry: Registry<()> = Registry::new();
        let key = MatchKey::league(MatchId(3));

        registry.begin(key).unwrap();
        registry.abandon(key);
        registry.begin(key).unwrap();
    }

    #[test]
    fn test_clear() {
        let mut registry: Registry<u32> = Registry::new();
        let key = MatchKey::tournament(MatchId(9));
        registry.begin(key).unwrap();
        registry.finish(key, 9);
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(key).is_none());
    }
}
