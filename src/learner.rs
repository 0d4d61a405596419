//! The learner role.
//!
//! `decided_value` is written at most once and is safe to read without
//! holding any lock afterward — modeled here as an `RwLock<Option<Value>>`
//! rather than a lock-free cell, preferring explicit `std` synchronization
//! primitives over atomics or `OnceLock` tricks. `relayed_decisions` is an
//! independent set guarding the gossip-once behaviour.

use std::collections::HashSet;
use std::sync::{Mutex, RwLock};

use log::error;

use crate::message::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecideEffect {
    /// First time this participant has ever decided: the caller should emit
    /// the user-visible "consensus reached" line.
    Notify { v: Value },
    /// The value was already decided; still relay to peers once per value.
    Relay { v: Value },
    /// Nothing to do — already decided and already relayed.
    None,
}

pub struct Learner {
    decided_value: RwLock<Option<Value>>,
    relayed_decisions: Mutex<HashSet<Value>>,
}

impl Default for Learner {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner {
    pub fn new() -> Self {
        Learner {
            decided_value: RwLock::new(None),
            relayed_decisions: Mutex::new(HashSet::new()),
        }
    }

    /// Read-only, lock-light check used by the proposer/dispatch fast path.
    pub fn is_decided(&self) -> bool {
        self.decided_value.read().expect("learner lock poisoned").is_some()
    }

    pub fn decided_value(&self) -> Option<Value> {
        self.decided_value.read().expect("learner lock poisoned").clone()
    }

    /// `decide_local(v)`. Idempotent: once set, later calls
    /// never overwrite. A later call carrying a *different* value would be a
    /// protocol-safety violation (never expected under Paxos); this is
    /// logged defensively rather than panicked on, since the consensus core
    /// has no panic path.
    fn decide_local(&self, v: &Value) -> bool {
        let mut guard = self.decided_value.write().expect("learner lock poisoned");
        match guard.as_ref() {
            None => {
                *guard = Some(v.clone());
                true
            }
            Some(existing) => {
                if existing != v {
                    error!(
                        "protocol violation: learner already decided {existing:?}, \
                         ignoring conflicting decide {v:?}"
                    );
                }
                false
            }
        }
    }

    /// `on_decide(m)`: the entry point for an inbound DECIDE.
    pub fn on_decide(&self, v: Value) -> DecideEffect {
        let first_time = self.decide_local(&v);
        let mut relayed = self.relayed_decisions.lock().expect("relay set poisoned");
        if relayed.insert(v.clone()) {
            if first_time {
                DecideEffect::Notify { v }
            } else {
                DecideEffect::Relay { v }
            }
        } else {
            DecideEffect::None
        }
    }
}
