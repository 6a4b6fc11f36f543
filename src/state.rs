//! Circuit breaker state machine and persisted state record.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::metrics::Bucket;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum State {
    /// Circuit is closed and requests pass through.
    Closed = 0,

    /// Circuit is open and requests are rejected.
    Open = 1,

    /// Circuit is allowing a limited number of probes to test recovery.
    HalfOpen = 2,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            1 => State::Open,
            2 => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Atomic holder for the breaker's state word.
///
/// Transitions go through compare-and-swap, so when several callers race
/// toward the same transition exactly one of them wins; only the winner
/// fires observer hooks, which keeps nested evaluations from reporting a
/// single change twice.
pub(crate) struct StateManager {
    state: AtomicU8,
}

impl StateManager {
    pub(crate) fn new(initial: State) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    /// Gets the current state.
    pub(crate) fn current(&self) -> State {
        State::from(self.state.load(Ordering::Acquire))
    }

    /// Attempts to transition from one state to another.
    /// Returns true if this caller performed the transition.
    pub(crate) fn transition(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Sets the state unconditionally, without transition semantics.
    pub(crate) fn set(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// The persisted form of a breaker: everything needed to reconstruct its
/// decision state in another process or after a restart.
///
/// Timestamps are unix-epoch milliseconds; the layout is store-format
/// agnostic and serializes with serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerState {
    /// Current state of the circuit.
    pub state: State,
    /// The bucket ring, oldest slot first.
    pub buckets: Vec<Bucket>,
    /// When the last failure was recorded, if any.
    pub last_failure_time: Option<u64>,
    /// When the last success was recorded, if any.
    pub last_success_time: Option<u64>,
    /// Consecutive probe successes while half-open.
    pub half_open_successes: u32,
    /// Probes currently in flight while half-open.
    pub half_open_active_requests: u32,
}
