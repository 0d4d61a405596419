//! The acceptor role: promise/accept bookkeeping for one Paxos instance.
//!
//! Acceptor state is the durable (in-memory, for the life of the process)
//! promise/accept record. Both operations are executed atomically with
//! respect to each other and to reads, via a single [`std::sync::Mutex`]
//! guarding the three fields together as one state machine, with a single
//! record in place of a per-instance `HashMap`, since this crate runs
//! exactly one Paxos instance.

use std::sync::Mutex;

use crate::message::Value;
use crate::proposal::ProposalNumber;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseOutcome {
    Promise { prior: Option<(ProposalNumber, Value)> },
    Reject { higher_n: ProposalNumber },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted { n: ProposalNumber, v: Value },
    Reject { higher_n: ProposalNumber },
}

#[derive(Debug, Default)]
struct AcceptorFields {
    promised_n: ProposalNumberOrNone,
    accepted_n: ProposalNumberOrNone,
    accepted_v: Option<Value>,
}

/// A thin newtype so `Default` gives us `NO_ROUND` instead of `0`, which
/// would collide with a legitimate proposal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProposalNumberOrNone(ProposalNumber);

impl Default for ProposalNumberOrNone {
    fn default() -> Self {
        ProposalNumberOrNone(ProposalNumber::NONE)
    }
}

pub struct Acceptor {
    state: Mutex<AcceptorFields>,
}

impl Default for Acceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Acceptor {
    pub fn new() -> Self {
        Acceptor { state: Mutex::new(AcceptorFields::default()) }
    }

    /// `on_prepare(n)`: promise if `n` is strictly higher than anything promised so far.
    pub fn on_prepare(&self, n: ProposalNumber) -> PromiseOutcome {
        let mut s = self.state.lock().expect("acceptor mutex poisoned");
        if n > s.promised_n.0 {
            s.promised_n = ProposalNumberOrNone(n);
            let prior = if s.accepted_n.0.is_none() {
                None
            } else {
                Some((s.accepted_n.0, s.accepted_v.clone().expect("accepted_v set with accepted_n")))
            };
            PromiseOutcome::Promise { prior }
        } else {
            PromiseOutcome::Reject { higher_n: s.promised_n.0 }
        }
    }

    /// `on_accept_request(n, v)`. Note the `>=`, not `>`: a
    /// proposer that received a promise at exactly `n` must still be able to
    /// get accepted by the same acceptor at that `n`.
    pub fn on_accept_request(&self, n: ProposalNumber, v: Value) -> AcceptOutcome {
        let mut s = self.state.lock().expect("acceptor mutex poisoned");
        if n >= s.promised_n.0 {
            s.promised_n = ProposalNumberOrNone(n);
            s.accepted_n = ProposalNumberOrNone(n);
            s.accepted_v = Some(v.clone());
            AcceptOutcome::Accepted { n, v }
        } else {
            AcceptOutcome::Reject { higher_n: s.promised_n.0 }
        }
    }

    /// Snapshot of `(promisedN, acceptedN, acceptedV)`, for tests and
    /// diagnostics only; never used by the protocol logic itself.
    #[cfg(test)]
    fn snapshot(&self) -> (ProposalNumber, ProposalNumber, Option<Value>) {
        let s = self.state.lock().expect("acceptor mutex poisoned");
        (s.promised_n.0, s.accepted_n.0, s.accepted_v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_no_round() {
        let a = Acceptor::new();
        let (promised, accepted, v) = a.snapshot();
        assert_eq!(promised, ProposalNumber::NONE);
        assert_eq!(accepted, ProposalNumber::NONE);
        assert_eq!(v, None);
    }

    #[test]
    fn promises_on_strictly_higher_n_and_rejects_equal_or_lower() {
        let a = Acceptor::new();
        assert!(matches!(a.on_prepare(ProposalNumber(200)), PromiseOutcome::Promise { prior: None }));

        match a.on_prepare(ProposalNumber(199)) {
            PromiseOutcome::Reject { higher_n } => assert_eq!(higher_n, ProposalNumber(200)),
            other => panic!("expected reject, got {other:?}"),
        }

        assert!(matches!(a.on_prepare(ProposalNumber(201)), PromiseOutcome::Promise { prior: None }));
    }

    #[test]
    fn accept_at_exactly_promised_n_succeeds() {
        let a = Acceptor::new();
        a.on_prepare(ProposalNumber(200));
        let outcome = a.on_accept_request(ProposalNumber(200), "M3".into());
        assert_eq!(outcome, AcceptOutcome::Accepted { n: ProposalNumber(200), v: "M3".into() });
    }

    #[test]
    fn accept_below_promised_n_is_rejected() {
        let a = Acceptor::new();
        a.on_prepare(ProposalNumber(200));
        let outcome = a.on_accept_request(ProposalNumber(199), "M3".into());
        assert_eq!(outcome, AcceptOutcome::Reject { higher_n: ProposalNumber(200) });
    }

    #[test]
    fn subsequent_prepare_carries_prior_accept() {
        let a = Acceptor::new();
        a.on_prepare(ProposalNumber(103));
        a.on_accept_request(ProposalNumber(103), "M3".into());

        match a.on_prepare(ProposalNumber(201)) {
            PromiseOutcome::Promise { prior: Some((n, v)) } => {
                assert_eq!(n, ProposalNumber(103));
                assert_eq!(v, "M3");
            }
            other => panic!("expected promise with prior accept, got {other:?}"),
        }
    }

    #[test]
    fn promised_n_advances_past_a_stale_accept_request() {
        let a = Acceptor::new();
        a.on_prepare(ProposalNumber(200));

        assert!(matches!(a.on_prepare(ProposalNumber(199)), PromiseOutcome::Reject { .. }));
        assert!(matches!(a.on_prepare(ProposalNumber(201)), PromiseOutcome::Promise { .. }));

        // promisedN has since moved to 201, so an accept_request at 200 is
        // correctly rejected; the `>=` rule itself is exercised in isolation
        // by `accept_at_exactly_promised_n_succeeds`.
        match a.on_accept_request(ProposalNumber(200), "X".into()) {
            AcceptOutcome::Reject { higher_n } => assert_eq!(higher_n, ProposalNumber(201)),
            other => panic!("expected reject, got {other:?}"),
        }
    }
}
