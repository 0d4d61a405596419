//! The consensus engine: wires acceptor, proposer and learner together
//! behind a single inbound dispatch point, and
//! applies the [`crate::proposer::Effect`]s the proposer's pure state
//! machine hands back (broadcasting, arming timers, scheduling retries).
//!
//! One `Engine` is built per participant and shared (via `Arc`) between the
//! listener's worker threads and every timer closure it arms. The engine
//! keeps a weak handle to its own `Arc` (set once, right after
//! construction) so ordinary `&self` methods can still hand out an owned,
//! `'static` `Arc<Engine>` to a spawned timer closure without resorting to
//! `self: Arc<Self>` receivers everywhere.

use std::net::SocketAddrV4;
use std::sync::{Arc, OnceLock, Weak};

use log::{debug, info};

use crate::acceptor::{AcceptOutcome, Acceptor, PromiseOutcome};
use crate::identity::{MemberId, Peers};
use crate::learner::{DecideEffect, Learner};
use crate::message::{Message, Value};
use crate::profile::Profile;
use crate::proposal::ProposalNumber;
use crate::proposer::{Effect, Proposer};
use crate::scheduler;
use crate::transport::Dispatch;

pub struct Engine {
    pub self_id: MemberId,
    peers: Peers,
    profile: Profile,
    acceptor: Acceptor,
    proposer: Proposer,
    learner: Learner,
    weak_self: OnceLock<Weak<Engine>>,
}

impl Engine {
    pub fn new(self_id: MemberId, peers: Peers, profile: Profile) -> Arc<Engine> {
        let proposer = Proposer::new(&self_id);
        let engine = Arc::new(Engine {
            self_id,
            peers,
            profile,
            acceptor: Acceptor::new(),
            proposer,
            learner: Learner::default(),
            weak_self: OnceLock::new(),
        });
        engine
            .weak_self
            .set(Arc::downgrade(&engine))
            .unwrap_or_else(|_| unreachable!("weak_self set exactly once, right after construction"));
        engine
    }

    fn arc(&self) -> Arc<Engine> {
        self.weak_self
            .get()
            .expect("weak_self initialized in Engine::new")
            .upgrade()
            .expect("engine outlives its own handle")
    }

    /// The value this participant's learner has settled on, if any.
    pub fn decided_value(&self) -> Option<Value> {
        self.learner.decided_value()
    }

    pub fn listen_addr(&self) -> SocketAddrV4 {
        self.peers
            .address_of(&self.self_id)
            .expect("self id must be present in the peer table")
    }

    fn peer_addrs(&self) -> Vec<SocketAddrV4> {
        self.peers
            .others(&self.self_id)
            .into_iter()
            .filter_map(|id| self.peers.address_of(&id))
            .collect()
    }

    fn addr_of(&self, id: &MemberId) -> Option<SocketAddrV4> {
        self.peers.address_of(id)
    }

    /// External trigger: `type=PROPOSE` from the test harness or another
    /// process (an external PROPOSE injection, or a local call).
    pub fn propose(&self, candidate: Value) {
        if self.learner.is_decided() {
            info!("[{}] already decided, dropping propose({candidate:?})", self.self_id);
            return;
        }
        info!("[{}] proposing {candidate:?}", self.self_id);
        let effects = self.proposer.propose(candidate, self.learner.is_decided());
        self.apply(effects);
    }

    /// Single inbound demux for every wire message type.
    pub fn handle(&self, m: Message) {
        debug!("[{}] received {m}", self.self_id);
        match m {
            Message::Propose { v, .. } => self.propose(v),
            Message::Prepare { from, n } => self.handle_prepare(from, n),
            Message::AcceptRequest { from, n, v } => self.handle_accept_request(from, n, v),
            Message::Promise { from, n, prior } => {
                let effects = self.proposer.on_promise(from, n, prior, self.learner.is_decided());
                self.apply(effects);
            }
            Message::Accepted { from, n, .. } => {
                let effects = self.proposer.on_accepted(from, n);
                self.apply(effects);
            }
            Message::Reject { higher_n, .. } => self.proposer.on_reject(higher_n),
            Message::Decide { v, .. } => self.handle_decide(v),
        }
    }

    fn handle_prepare(&self, from: MemberId, n: ProposalNumber) {
        if let Some(v) = self.learner.decided_value() {
            self.reply_decide(&from, v);
            return;
        }
        let outcome = self.acceptor.on_prepare(n);
        let Some(to) = self.addr_of(&from) else { return };
        let reply = match outcome {
            PromiseOutcome::Promise { prior } => {
                Message::Promise { from: self.self_id.clone(), n, prior }
            }
            PromiseOutcome::Reject { higher_n } => {
                Message::Reject { from: self.self_id.clone(), higher_n }
            }
        };
        self.profile.send(to, &reply);
    }

    /// Inbound `ACCEPT_REQUEST` from some proposer `from`.
    fn handle_accept_request(&self, from: MemberId, n: ProposalNumber, v: Value) {
        if let Some(decided_v) = self.learner.decided_value() {
            self.reply_decide(&from, decided_v);
            return;
        }
        match self.acceptor.on_accept_request(n, v) {
            AcceptOutcome::Accepted { n, v } => self.on_accepted_locally(n, v),
            AcceptOutcome::Reject { higher_n } => {
                if let Some(to) = self.addr_of(&from) {
                    let reply = Message::Reject { from: self.self_id.clone(), higher_n };
                    self.profile.send(to, &reply);
                }
            }
        }
    }

    /// Runs this host's own accept_request against its own acceptor right
    /// after broadcasting one ("self-acceptance"): broadcast
    /// never reaches self, so without this call `self` could never appear
    /// in its own `acceptedFrom`.
    fn apply_own_accept_request(&self, n: ProposalNumber, v: Value) {
        if self.learner.is_decided() {
            return;
        }
        if let AcceptOutcome::Accepted { n, v } = self.acceptor.on_accept_request(n, v) {
            self.on_accepted_locally(n, v);
        }
        // A Reject here means a higher prepare has since arrived for this
        // acceptor; there is no sender to notify for a purely local call.
    }

    /// Broadcasts the accepted vote and, if it belongs to this host's own
    /// active round, feeds it back into the proposer's accept-quorum count.
    fn on_accepted_locally(&self, n: ProposalNumber, v: Value) {
        let accepted = Message::Accepted { from: self.self_id.clone(), n, v };
        self.broadcast(&accepted);
        if self.proposer.current_round_n() == Some(n) {
            let effects = self.proposer.on_accepted(self.self_id.clone(), n);
            self.apply(effects);
        }
    }

    fn handle_decide(&self, v: Value) {
        match self.learner.on_decide(v) {
            DecideEffect::Notify { v } => {
                info!("[{}] consensus reached: decidedValue = {v:?}", self.self_id);
                self.broadcast(&Message::Decide { from: self.self_id.to_string(), v });
            }
            DecideEffect::Relay { v } => {
                info!("[{}] learn: relaying decide({v:?})", self.self_id);
                self.broadcast(&Message::Decide { from: self.self_id.to_string(), v });
            }
            DecideEffect::None => {}
        }
    }

    fn reply_decide(&self, to: &MemberId, v: Value) {
        if let Some(addr) = self.addr_of(to) {
            let m = Message::Decide { from: self.self_id.to_string(), v };
            self.profile.send(addr, &m);
        }
    }

    fn broadcast(&self, m: &Message) {
        self.profile.broadcast(&self.peer_addrs(), m);
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::BroadcastPrepare { n } => {
                    self.broadcast(&Message::Prepare { from: self.self_id.clone(), n });
                }
                Effect::BroadcastAcceptRequest { n, v } => {
                    self.broadcast(&Message::AcceptRequest {
                        from: self.self_id.clone(),
                        n,
                        v: v.clone(),
                    });
                    self.apply_own_accept_request(n, v);
                }
                Effect::ArmPrepareTimeout { n } => {
                    let engine = self.arc();
                    scheduler::after(crate::proposer::PREPARE_TIMEOUT, move || {
                        let effects = engine.proposer.on_prepare_timeout(n, engine.learner.is_decided());
                        engine.apply(effects);
                    });
                }
                Effect::ArmAcceptTimeout { n } => {
                    let engine = self.arc();
                    scheduler::after(crate::proposer::ACCEPT_TIMEOUT, move || {
                        let effects = engine.proposer.on_accept_timeout(n, engine.learner.is_decided());
                        engine.apply(effects);
                    });
                }
                Effect::ScheduleRetry { v, jitter } => {
                    let engine = self.arc();
                    scheduler::after(jitter, move || {
                        engine.propose(v);
                    });
                }
                Effect::DecidedLocally { v } => {
                    // Feed straight into the learner so the single
                    // "consensus reached" line is emitted exactly once,
                    // whether the decision was reached locally or learned
                    // from a peer's DECIDE.
                    self.handle_decide(v);
                }
            }
        }
    }
}

impl Dispatch for Engine {
    fn dispatch(&self, m: Message) {
        self.handle(m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn mid(raw: &str) -> MemberId {
        MemberId::parse(raw).unwrap()
    }

    fn test_peers() -> Peers {
        let mut addrs = HashMap::new();
        for k in 1..=9u8 {
            addrs.insert(mid(&format!("M{k}")), format!("127.0.0.1:{}", 19000 + k as u16).parse().unwrap());
        }
        Peers::new(addrs)
    }

    #[test]
    fn engine_holds_a_live_self_handle() {
        let engine = Engine::new(mid("M1"), test_peers(), Profile::Reliable);
        // arc() must not panic while the Arc returned by `new` is alive.
        let handle = engine.arc();
        assert_eq!(handle.self_id, mid("M1"));
    }

    #[test]
    fn self_acceptance_counts_toward_quorum_without_a_wire_round_trip() {
        let engine = Engine::new(mid("M1"), test_peers(), Profile::Reliable);
        engine.propose("M5".into());
        let n = engine.proposer.current_round_n().unwrap();

        // Drive promise-quorum (5 distinct peers); this triggers the
        // proposer's BroadcastAcceptRequest effect, which in turn calls
        // apply_own_accept_request — self's own acceptor grants it, so
        // self is already in acceptedFrom before any Accepted arrives.
        for k in 2..=6u8 {
            engine.handle(Message::Promise { from: mid(&format!("M{k}")), n, prior: None });
        }

        // Only 4 more peers should be needed to reach accept-quorum of 5.
        for k in 2..=4u8 {
            engine.handle(Message::Accepted { from: mid(&format!("M{k}")), n, v: "M5".into() });
            assert!(!engine.learner.is_decided(), "decided too early at M{k}");
        }
        engine.handle(Message::Accepted { from: mid("M5"), n, v: "M5".into() });

        assert!(engine.learner.is_decided());
        assert_eq!(engine.learner.decided_value(), Some("M5".into()));
    }
}
