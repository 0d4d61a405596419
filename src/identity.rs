//! Participant identity: the `M<k>` naming scheme and the fixed nine-member
//! group.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddrV4;

use crate::error::IdentityError;

/// Number of participants in the fixed membership set.
pub const GROUP_SIZE: u8 = 9;

/// A majority of [`GROUP_SIZE`].
pub const QUORUM: usize = 5;

/// A validated participant id of the form `M<k>`, `k` in `1..=9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(String);

impl MemberId {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let suffix = raw
            .strip_prefix('M')
            .ok_or_else(|| IdentityError::Invalid(raw.to_string()))?;
        let k: u8 = suffix
            .parse()
            .map_err(|_| IdentityError::Invalid(raw.to_string()))?;
        if !(1..=GROUP_SIZE).contains(&k) {
            return Err(IdentityError::Invalid(raw.to_string()));
        }
        Ok(MemberId(raw.to_string()))
    }

    /// The numeric suffix `k` of `M<k>`.
    pub fn id_num(&self) -> u8 {
        self.0[1..].parse().expect("validated at construction")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed membership of nine participants, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Peers {
    addresses: HashMap<MemberId, SocketAddrV4>,
}

impl Peers {
    pub fn new(addresses: HashMap<MemberId, SocketAddrV4>) -> Self {
        Peers { addresses }
    }

    pub fn address_of(&self, id: &MemberId) -> Option<SocketAddrV4> {
        self.addresses.get(id).copied()
    }

    /// All members other than `self_id`, in a stable order.
    pub fn others(&self, self_id: &MemberId) -> Vec<MemberId> {
        let mut ids: Vec<MemberId> = self
            .addresses
            .keys()
            .filter(|id| *id != self_id)
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_ids() {
        for k in 1..=9 {
            let raw = format!("M{k}");
            let id = MemberId::parse(&raw).unwrap();
            assert_eq!(id.id_num(), k);
            assert_eq!(id.as_str(), raw);
        }
    }

    #[test]
    fn rejects_out_of_range_and_malformed() {
        assert!(MemberId::parse("M0").is_err());
        assert!(MemberId::parse("M10").is_err());
        assert!(MemberId::parse("X1").is_err());
        assert!(MemberId::parse("M").is_err());
        assert!(MemberId::parse("M-1").is_err());
    }

    #[test]
    fn others_excludes_self_and_is_sorted() {
        let mut addrs = HashMap::new();
        for k in 1..=9u8 {
            let id = MemberId::parse(&format!("M{k}")).unwrap();
            addrs.insert(id, format!("127.0.0.1:{}", 9000 + k as u16).parse().unwrap());
        }
        let peers = Peers::new(addrs);
        let self_id = MemberId::parse("M4").unwrap();
        let others = peers.others(&self_id);
        assert_eq!(others.len(), 8);
        assert!(!others.contains(&self_id));
        assert!(others.windows(2).all(|w| w[0] < w[1]));
    }
}
