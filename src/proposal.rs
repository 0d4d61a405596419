//! Proposal numbers: a totally ordered, per-process-unique 64-bit id.
//!
//! `n = counter * 100 + idNum(self)`. Because `idNum` is drawn from `1..=9`
//! and every process's tail digit differs, two participants never mint the
//! same `n`, and each participant's own minted sequence is strictly
//! increasing as long as `counter` only grows.

use std::fmt;

/// Sentinel meaning "no round in progress". Never a value a proposer mints.
pub const NO_ROUND: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalNumber(pub i64);

impl ProposalNumber {
    pub const NONE: ProposalNumber = ProposalNumber(NO_ROUND);

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == NO_ROUND
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints `n` for the given per-participant `counter` (>= 1) and `id_num`
/// (the numeric suffix of this participant's `M<k>` id).
pub fn mint(counter: i64, id_num: u8) -> ProposalNumber {
    debug_assert!(counter >= 1, "counter must be at least 1 before minting");
    ProposalNumber(counter * 100 + id_num as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_participants_never_collide() {
        for counter in 1..=50i64 {
            let mut seen = std::collections::HashSet::new();
            for id_num in 1..=9u8 {
                let n = mint(counter, id_num);
                assert!(seen.insert(n), "collision at counter={counter} id_num={id_num}");
            }
        }
    }

    #[test]
    fn single_participant_sequence_is_strictly_increasing() {
        let mut prev = ProposalNumber::NONE;
        for counter in 1..=20i64 {
            let n = mint(counter, 4);
            assert!(n > prev);
            prev = n;
        }
    }

    #[test]
    fn sentinel_is_never_minted() {
        for counter in 1..=1000i64 {
            for id_num in 1..=9u8 {
                assert_ne!(mint(counter, id_num), ProposalNumber::NONE);
            }
        }
    }
}
