//! Fault-injection profiles: validated behaviors of the
//! transport/host, entirely outside the consensus core. The core only ever
//! sees `send`/`deliver`; a `Profile` decorates the outbound side of
//! [`crate::transport::send`] with latency, drops, or a scheduled crash.

use std::net::SocketAddrV4;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};
use rand::Rng;

use crate::message::Message;
use crate::transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// No injected faults.
    Reliable,
    /// Adds a random delay before each send.
    Latent,
    /// Behaves reliably but schedules a one-shot process exit, modelling a
    /// crashing participant.
    Failure,
    /// A modest fixed drop probability plus a small delay — the "lossy
    /// network" scenario.
    Standard,
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reliable" => Ok(Profile::Reliable),
            "latent" => Ok(Profile::Latent),
            "failure" => Ok(Profile::Failure),
            "standard" => Ok(Profile::Standard),
            other => Err(format!("unknown profile {other:?}")),
        }
    }
}

const LATENT_DELAY: Duration = Duration::from_millis(150);
const STANDARD_DELAY: Duration = Duration::from_millis(40);
const STANDARD_DROP_PROBABILITY: f64 = 0.25;
const FAILURE_CRASH_AFTER: Duration = Duration::from_secs(5);

impl Profile {
    /// Arms this profile's one-shot behaviors (currently only `Failure`'s
    /// scheduled crash) for the life of the process.
    pub fn arm(self) {
        if self == Profile::Failure {
            let delay = FAILURE_CRASH_AFTER;
            crate::scheduler::after(delay, || {
                warn!("failure profile: crashing now, as scheduled");
                std::process::exit(1);
            });
        }
    }

    /// Sends `m` to `to`, applying this profile's latency/drop behavior
    /// first. Matches the core's `send(peer, message)` interface — the core
    /// calls this, never `transport::send` directly, once a profile has
    /// been selected.
    pub fn send(self, to: SocketAddrV4, m: &Message) {
        match self {
            Profile::Reliable | Profile::Failure => transport::send(to, m),
            Profile::Latent => {
                std::thread::sleep(LATENT_DELAY);
                transport::send(to, m);
            }
            Profile::Standard => {
                if rand::thread_rng().gen_bool(STANDARD_DROP_PROBABILITY) {
                    info!("standard profile: dropping message to {to}");
                    return;
                }
                std::thread::sleep(STANDARD_DELAY);
                transport::send(to, m);
            }
        }
    }

    pub fn broadcast(self, to: &[SocketAddrV4], m: &Message) {
        for addr in to {
            self.send(*addr, m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_profiles() {
        assert_eq!(Profile::from_str("reliable"), Ok(Profile::Reliable));
        assert_eq!(Profile::from_str("latent"), Ok(Profile::Latent));
        assert_eq!(Profile::from_str("failure"), Ok(Profile::Failure));
        assert_eq!(Profile::from_str("standard"), Ok(Profile::Standard));
        assert!(Profile::from_str("bogus").is_err());
    }
}
