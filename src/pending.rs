//! Pending media reference set
//! Accumulates media ids discovered across records for batch prefetching

use dashmap::DashSet;

/// Process-wide accumulator of media ids referenced by record content but
/// not yet fetched. Owned by the orchestrating caller and shared by
/// reference across concurrent `process_node` calls; insertion is
/// idempotent and safe under concurrent writers.
#[derive(Debug, Default)]
pub struct PendingReferenceSet {
    ids: DashSet<String>,
}

impl PendingReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the id was not already pending.
    pub fn insert(&self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Takes every pending id, leaving the set empty. Callers use this to
    /// issue one batch prefetch for everything discovered so far.
    pub fn drain(&self) -> Vec<String> {
        let ids: Vec<String> = self.ids.iter().map(|id| id.key().clone()).collect();
        for id in &ids {
            self.ids.remove(id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_is_idempotent() {
        let pending = PendingReferenceSet::new();
        assert!(pending.insert("cG9zdDo3"));
        assert!(!pending.insert("cG9zdDo3"));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_drain_empties_the_set() {
        let pending = PendingReferenceSet::new();
        pending.insert("a");
        pending.insert("b");

        let mut drained = pending.drain();
        drained.sort();
        assert_eq!(drained, vec!["a".to_string(), "b".to_string()]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_concurrent_insertion() {
        tokio_test::block_on(async {
            let pending = Arc::new(PendingReferenceSet::new());

            let mut handles = Vec::new();
            for worker in 0..8 {
                let pending = Arc::clone(&pending);
                handles.push(tokio::spawn(async move {
                    for i in 0..50 {
                        // half the ids collide across workers
                        pending.insert(format!("shared:{}", i));
                        pending.insert(format!("worker:{}:{}", worker, i));
                    }
                }));
            }

            for handle in handles {
                handle.await.unwrap();
            }

            assert_eq!(pending.len(), 50 + 8 * 50);
        });
    }
}
