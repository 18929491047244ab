//! Concurrent position store.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::market::types::PositionId;

use super::types::Position;

/// Concurrent mapping from position id to position.
///
/// Reads are consistent; mutations of a single position must run inside
/// that position's serializer lane (the store does not enforce this).
#[derive(Debug, Default)]
pub struct PositionStore {
    inner: DashMap<PositionId, Position>,
    next_id: AtomicU64,
}

impl PositionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next position id.
    pub fn allocate_id(&self) -> PositionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Insert or replace a position.
    pub fn insert(&self, position: Position) {
        self.inner.insert(position.id, position);
    }

    /// Get a consistent copy of a position.
    pub fn get(&self, id: PositionId) -> Option<Position> {
        self.inner.get(&id).map(|p| p.clone())
    }

    /// Mutate a position in place, returning the closure's result.
    pub fn modify<R>(&self, id: PositionId, f: impl FnOnce(&mut Position) -> R) -> Option<R> {
        self.inner.get_mut(&id).map(|mut p| f(&mut p))
    }

    /// Remove a position.
    pub fn remove(&self, id: PositionId) -> Option<Position> {
        self.inner.remove(&id).map(|(_, p)| p)
    }

    /// Whether a position exists.
    pub fn contains(&self, id: PositionId) -> bool {
        self.inner.contains_key(&id)
    }

    /// Consistent enumeration of all positions.
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.inner.iter().map(|p| p.clone()).collect();
        positions.sort_by_key(|p| p.id);
        positions
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
