//! Network configuration loading.
//!
//! The wire format here is a flat `memberId,host,port` list, not the nested
//! tables a TOML-oriented config crate is built for — forcing this format
//! through one would fight its data model for no benefit, so this module
//! reads the file directly, line by line, as a thin, single-purpose loader
//! that returns a typed `Result` instead of `unwrap()`-ing through every
//! step.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddrV4;

use crate::error::ConfigError;
use crate::identity::{MemberId, Peers};

pub const DEFAULT_CONFIG_PATH: &str = "network.config";

/// Loads `path`, returning the full peer table. Every non-empty,
/// non-`#`-prefixed line must be `memberId,host,port`.
pub fn load(path: &str) -> Result<Peers, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;

    let mut addresses: HashMap<MemberId, SocketAddrV4> = HashMap::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let [member, host, port] = parts.as_slice() else {
            return Err(ConfigError::MalformedLine {
                path: path.to_string(),
                line: idx + 1,
                text: raw_line.to_string(),
            });
        };

        let id = MemberId::parse(member).map_err(|source| ConfigError::InvalidMemberId {
            path: path.to_string(),
            line: idx + 1,
            text: member.to_string(),
            source,
        })?;

        let socket_text = format!("{host}:{port}");
        let addr: SocketAddrV4 = socket_text.parse().map_err(|source| ConfigError::InvalidAddress {
            path: path.to_string(),
            line: idx + 1,
            text: socket_text.clone(),
            source,
        })?;

        addresses.insert(id, addr);
    }

    if addresses.len() != crate::identity::GROUP_SIZE as usize {
        return Err(ConfigError::IncompleteMembership {
            path: path.to_string(),
            found: addresses.len(),
        });
    }

    Ok(Peers::new(addresses))
}
