//! Pluggable persistence for breaker state.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::state::BreakerState;

/// Persistence contract for breaker state, keyed by circuit id.
///
/// The store owns the consistency model; the breaker's
/// [`snapshot`](crate::CircuitBreaker::snapshot) and
/// [`restore`](crate::CircuitBreaker::restore) are the serialization
/// boundary. The interface is sufficient for a distributed implementation,
/// though none is provided here.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetches the persisted state for a circuit, if any.
    async fn get_state(&self, circuit_id: &str) -> Result<Option<BreakerState>, StoreError>;

    /// Persists the state for a circuit, replacing any previous record.
    async fn set_state(&self, circuit_id: &str, state: &BreakerState) -> Result<(), StoreError>;

    /// Removes the persisted state for a circuit.
    async fn delete_state(&self, circuit_id: &str) -> Result<(), StoreError>;
}

/// Process-local store backed by a map.
///
/// State is copied on both write and read, so a caller mutating its own
/// `BreakerState` never bleeds into the stored record and vice versa.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, BreakerState>>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_state(&self, circuit_id: &str) -> Result<Option<BreakerState>, StoreError> {
        Ok(self.states.read().get(circuit_id).cloned())
    }

    async fn set_state(&self, circuit_id: &str, state: &BreakerState) -> Result<(), StoreError> {
        self.states
            .write()
            .insert(circuit_id.to_string(), state.clone());
        Ok(())
    }

    async fn delete_state(&self, circuit_id: &str) -> Result<(), StoreError> {
        self.states.write().remove(circuit_id);
        Ok(())
    }
}
