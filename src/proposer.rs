//! The proposer role.
//!
//! The round record and driver here are deliberately *pure*: every public
//! method takes the proposer mutex internally, mutates state, and returns a
//! list of [`Effect`]s for the caller (the [`crate::engine::Engine`]) to
//! carry out — broadcasting a message, arming a timer, scheduling a retry.
//! No network I/O happens while the mutex is held: it is released before
//! any broadcast, and re-acquired on the way back in after re-checking
//! round identity (every timer effect carries the `n` it was armed for,
//! and every handler re-validates `n` against the *current* round before
//! anything fires).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::identity::{MemberId, QUORUM};
use crate::message::Value;
use crate::proposal::{self, ProposalNumber};

pub const PREPARE_TIMEOUT: Duration = Duration::from_millis(2500);
pub const ACCEPT_TIMEOUT: Duration = Duration::from_millis(2500);
const JITTER_MIN_MS: u64 = 50;
const JITTER_MAX_MS: u64 = 200;

/// A unit of work the driver wants performed outside the proposer mutex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    BroadcastPrepare { n: ProposalNumber },
    BroadcastAcceptRequest { n: ProposalNumber, v: Value },
    ArmPrepareTimeout { n: ProposalNumber },
    ArmAcceptTimeout { n: ProposalNumber },
    ScheduleRetry { v: Value, jitter: Duration },
    /// The round just reached accept-quorum; the caller must record this
    /// decision in the learner, which performs the one `DECIDE` broadcast
    /// this triggers.
    DecidedLocally { v: Value },
}

struct Round {
    n: ProposalNumber,
    proposed_v: Value,
    promises_from: HashSet<MemberId>,
    accepted_by: HashMap<MemberId, (ProposalNumber, Value)>,
    accepted_from: HashSet<MemberId>,
    highest_rejection_n: ProposalNumber,
    phase2_launched: bool,
    decided: bool,
}

impl Round {
    fn new(n: ProposalNumber, proposed_v: Value) -> Self {
        Round {
            n,
            proposed_v,
            promises_from: HashSet::new(),
            accepted_by: HashMap::new(),
            accepted_from: HashSet::new(),
            highest_rejection_n: ProposalNumber::NONE,
            phase2_launched: false,
            decided: false,
        }
    }
}

struct Inner {
    counter: i64,
    round: Option<Round>,
}

pub struct Proposer {
    id_num: u8,
    state: Mutex<Inner>,
}

impl Proposer {
    pub fn new(self_id: &MemberId) -> Self {
        Proposer {
            id_num: self_id.id_num(),
            state: Mutex::new(Inner { counter: 0, round: None }),
        }
    }

    /// `propose(candidate)`. `already_decided` is the learner's current
    /// decision state; the caller is expected to check it, since it lives
    /// outside this module's mutex.
    pub fn propose(&self, candidate: Value, already_decided: bool) -> Vec<Effect> {
        if already_decided {
            return Vec::new();
        }
        let mut s = self.state.lock().expect("proposer mutex poisoned");
        s.counter += 1;
        let n = proposal::mint(s.counter, self.id_num);
        s.round = Some(Round::new(n, candidate));
        vec![Effect::BroadcastPrepare { n }, Effect::ArmPrepareTimeout { n }]
    }

    pub fn on_promise(
        &self,
        from: MemberId,
        n: ProposalNumber,
        prior: Option<(ProposalNumber, Value)>,
        already_decided: bool,
    ) -> Vec<Effect> {
        if already_decided {
            return Vec::new();
        }
        let mut s = self.state.lock().expect("proposer mutex poisoned");
        let Some(round) = s.round.as_mut() else { return Vec::new() };
        if round.n != n {
            return Vec::new();
        }

        round.promises_from.insert(from.clone());
        if let Some((accepted_n, accepted_v)) = prior {
            round.accepted_by.insert(from, (accepted_n, accepted_v));
        }

        if round.promises_from.len() < QUORUM || round.phase2_launched {
            return Vec::new();
        }

        round.phase2_launched = true;

        // Value-selection rule: the accepted value paired with the highest
        // accepted_n among all recorded promises wins; otherwise keep the
        // caller's original candidate.
        if let Some((_, best_v)) = round
            .accepted_by
            .values()
            .max_by_key(|(accepted_n, _)| *accepted_n)
            .cloned()
        {
            round.proposed_v = best_v;
        }

        let n = round.n;
        let v = round.proposed_v.clone();
        vec![
            Effect::BroadcastAcceptRequest { n, v },
            Effect::ArmAcceptTimeout { n },
        ]
    }

    pub fn on_accepted(&self, from: MemberId, n: ProposalNumber) -> Vec<Effect> {
        let mut s = self.state.lock().expect("proposer mutex poisoned");
        let Some(round) = s.round.as_mut() else { return Vec::new() };
        if round.n != n {
            return Vec::new();
        }

        round.accepted_from.insert(from);
        if round.accepted_from.len() < QUORUM || round.decided {
            return Vec::new();
        }

        round.decided = true;
        let v = round.proposed_v.clone();
        vec![Effect::DecidedLocally { v }]
    }

    pub fn on_reject(&self, higher_n: ProposalNumber) {
        let mut s = self.state.lock().expect("proposer mutex poisoned");
        if let Some(round) = s.round.as_mut() {
            if higher_n >= ProposalNumber(0) && higher_n > round.highest_rejection_n {
                round.highest_rejection_n = higher_n;
            }
        }
    }

    /// Fires when the prepare timer armed for `n` expires. A no-op if the
    /// round has since been superseded, already reached promise-quorum, or
    /// the learner has already decided.
    pub fn on_prepare_timeout(&self, n: ProposalNumber, already_decided: bool) -> Vec<Effect> {
        if already_decided {
            return Vec::new();
        }
        let mut s = self.state.lock().expect("proposer mutex poisoned");
        let Some(round) = s.round.as_ref() else { return Vec::new() };
        if round.n != n || round.promises_from.len() >= QUORUM {
            return Vec::new();
        }

        let bump_counter = std::cmp::max(round.highest_rejection_n.value() + 1, n.value() + 100) / 100;
        s.counter = std::cmp::max(s.counter, bump_counter);
        let v = s.round.as_ref().unwrap().proposed_v.clone();
        vec![Effect::ScheduleRetry { v, jitter: jitter() }]
    }

    /// Symmetric to [`Self::on_prepare_timeout`], keyed on accept-quorum.
    pub fn on_accept_timeout(&self, n: ProposalNumber, already_decided: bool) -> Vec<Effect> {
        if already_decided {
            return Vec::new();
        }
        let mut s = self.state.lock().expect("proposer mutex poisoned");
        let Some(round) = s.round.as_ref() else { return Vec::new() };
        if round.n != n || round.decided {
            return Vec::new();
        }

        let bump_counter = std::cmp::max(round.highest_rejection_n.value() + 1, n.value() + 100) / 100;
        s.counter = std::cmp::max(s.counter, bump_counter);
        let v = s.round.as_ref().unwrap().proposed_v.clone();
        vec![Effect::ScheduleRetry { v, jitter: jitter() }]
    }

    /// The proposal number of the currently active round, if any. Used by
    /// the engine to short-circuit self-acceptance bookkeeping.
    pub fn current_round_n(&self) -> Option<ProposalNumber> {
        let s = self.state.lock().expect("proposer mutex poisoned");
        s.round.as_ref().map(|r| r.n)
    }
}

fn jitter() -> Duration {
    let ms = rand::thread_rng().gen_range(JITTER_MIN_MS..JITTER_MAX_MS);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mid(raw: &str) -> MemberId {
        MemberId::parse(raw).unwrap()
    }

    #[test]
    fn propose_mints_and_broadcasts() {
        let p = Proposer::new(&mid("M4"));
        let effects = p.propose("M5".into(), false);
        assert_eq!(
            effects,
            vec![
                Effect::BroadcastPrepare { n: ProposalNumber(104) },
                Effect::ArmPrepareTimeout { n: ProposalNumber(104) },
            ]
        );
    }

    #[test]
    fn propose_is_dropped_when_already_decided() {
        let p = Proposer::new(&mid("M4"));
        assert!(p.propose("M5".into(), true).is_empty());
    }

    #[test]
    fn four_promises_do_not_trigger_accept_request() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M5".into(), false);
        let n = p.current_round_n().unwrap();
        for k in [2, 3, 4, 5] {
            let effects = p.on_promise(mid(&format!("M{k}")), n, None, false);
            assert!(effects.is_empty(), "unexpected effects at promise #{k}");
        }
    }

    #[test]
    fn fifth_promise_triggers_accept_request_exactly_once() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M5".into(), false);
        let n = p.current_round_n().unwrap();
        for k in [2, 3, 4, 5] {
            p.on_promise(mid(&format!("M{k}")), n, None, false);
        }
        let effects = p.on_promise(mid("M6"), n, None, false);
        assert_eq!(
            effects,
            vec![
                Effect::BroadcastAcceptRequest { n, v: "M5".into() },
                Effect::ArmAcceptTimeout { n },
            ]
        );

        // A sixth promise arriving after quorum must not re-launch phase 2.
        let effects = p.on_promise(mid("M7"), n, None, false);
        assert!(effects.is_empty());
    }

    #[test]
    fn value_selection_prefers_highest_accepted_n() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M7".into(), false);
        let n = p.current_round_n().unwrap();

        p.on_promise(mid("M2"), n, None, false);
        p.on_promise(mid("M3"), n, Some((ProposalNumber(103), "M3".into())), false);
        p.on_promise(mid("M4"), n, Some((ProposalNumber(90), "M9".into())), false);
        p.on_promise(mid("M5"), n, None, false);
        let effects = p.on_promise(mid("M6"), n, None, false);

        assert_eq!(
            effects,
            vec![
                Effect::BroadcastAcceptRequest { n, v: "M3".into() },
                Effect::ArmAcceptTimeout { n },
            ]
        );
    }

    #[test]
    fn value_selection_keeps_candidate_when_no_prior_accepts() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M7".into(), false);
        let n = p.current_round_n().unwrap();
        for k in [2, 3, 4, 5] {
            let _ = p.on_promise(mid(&format!("M{k}")), n, None, false);
        }
        let effects = p.on_promise(mid("M6"), n, None, false);
        assert_eq!(effects[0], Effect::BroadcastAcceptRequest { n, v: "M7".into() });
    }

    #[test]
    fn accept_quorum_decides_exactly_once() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M5".into(), false);
        let n = p.current_round_n().unwrap();
        for k in [2, 3, 4, 5] {
            p.on_promise(mid(&format!("M{k}")), n, None, false);
        }
        p.on_promise(mid("M6"), n, None, false);

        for k in [2, 3, 4, 5] {
            let effects = p.on_accepted(mid(&format!("M{k}")), n);
            if k < 5 {
                assert!(effects.is_empty());
            } else {
                assert_eq!(effects, vec![Effect::DecidedLocally { v: "M5".into() }]);
            }
        }

        assert!(p.on_accepted(mid("M6"), n).is_empty());
    }

    #[test]
    fn stale_round_messages_are_ignored() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M5".into(), false);
        let stale_n = p.current_round_n().unwrap();
        p.propose("M8".into(), false); // supersedes the round in place
        let fresh_n = p.current_round_n().unwrap();
        assert_ne!(stale_n, fresh_n);

        assert!(p.on_promise(mid("M2"), stale_n, None, false).is_empty());
        assert!(p.on_accepted(mid("M2"), stale_n).is_empty());
    }

    #[test]
    fn prepare_timeout_noops_past_quorum_or_on_stale_n() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M5".into(), false);
        let n = p.current_round_n().unwrap();
        for k in [2, 3, 4, 5] {
            p.on_promise(mid(&format!("M{k}")), n, None, false);
        }
        assert!(p.on_prepare_timeout(n, false).is_empty(), "already at quorum");
        assert!(p.on_prepare_timeout(ProposalNumber(9999), false).is_empty(), "stale n");
    }

    #[test]
    fn prepare_timeout_schedules_retry_below_quorum() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M5".into(), false);
        let n = p.current_round_n().unwrap();
        p.on_promise(mid("M2"), n, None, false);
        let effects = p.on_prepare_timeout(n, false);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::ScheduleRetry { .. }));
    }

    #[test]
    fn bump_uses_rejection_feedback() {
        let p = Proposer::new(&mid("M1"));
        p.propose("M5".into(), false);
        let n = p.current_round_n().unwrap();
        p.on_reject(ProposalNumber(530));
        p.on_prepare_timeout(n, false);
        let effects = p.propose("M5".into(), false);
        match effects[0] {
            Effect::BroadcastPrepare { n: new_n } => assert!(new_n.value() > 530),
            ref other => panic!("unexpected effect {other:?}"),
        }
    }
}
