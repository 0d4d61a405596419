//! Process entrypoint: starts one participant's consensus engine.
//!
//! ```text
//! paxos-member <memberId> --profile <reliable|latent|failure|standard> [--config <path>]
//! ```
//!
//! Exits with status 1 on a usage error. Every other startup
//! failure (bad config file, unbindable address) is also reported on stderr
//! and exits 1 — the CLI's own error handling is intentionally blunt, since
//! the interesting error handling lives in the consensus core, not here.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use paxos9::config;
use paxos9::engine::Engine;
use paxos9::identity::MemberId;
use paxos9::profile::Profile;
use paxos9::transport;

struct Args {
    member_id: MemberId,
    profile: Profile,
    config_path: String,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let Some(member_id_raw) = raw.first() else {
        return Err("expected <memberId>".to_string());
    };
    let member_id = MemberId::parse(member_id_raw).map_err(|e| e.to_string())?;

    let mut profile: Option<Profile> = None;
    let mut config_path = config::DEFAULT_CONFIG_PATH.to_string();

    let mut i = 1;
    while i < raw.len() {
        match raw[i].as_str() {
            "--profile" => {
                let value = raw.get(i + 1).ok_or("--profile requires a value")?;
                profile = Some(value.parse::<Profile>()?);
                i += 2;
            }
            "--config" => {
                let value = raw.get(i + 1).ok_or("--config requires a value")?;
                config_path = value.clone();
                i += 2;
            }
            other => return Err(format!("unrecognized argument {other:?}")),
        }
    }

    let profile = profile.ok_or("missing required --profile <reliable|latent|failure|standard>")?;

    Ok(Args { member_id, profile, config_path })
}

fn main() -> ExitCode {
    env_logger::init();

    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw_args) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("usage: paxos-member <memberId> --profile <reliable|latent|failure|standard> [--config <path>]");
            eprintln!("error: {msg}");
            return ExitCode::from(1);
        }
    };

    let peers = match config::load(&args.config_path) {
        Ok(peers) => peers,
        Err(e) => {
            eprintln!("error loading {:?}: {e}", args.config_path);
            return ExitCode::from(1);
        }
    };

    if peers.address_of(&args.member_id).is_none() {
        eprintln!("error: {} is not listed in {:?}", args.member_id, args.config_path);
        return ExitCode::from(1);
    }

    args.profile.arm();

    let engine: Arc<Engine> = Engine::new(args.member_id.clone(), peers, args.profile);
    let bind_addr = engine.listen_addr();

    if let Err(e) = transport::listen(bind_addr, engine.clone()) {
        eprintln!("error: could not bind {bind_addr}: {e}");
        return ExitCode::from(1);
    }

    info!("[{}] listening on {bind_addr} with profile {:?}", args.member_id, args.profile);

    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
