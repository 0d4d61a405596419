//! A demo which runs all nine participants in-process, bound to loopback
//! ports, and drives a single proposal through to consensus.
//!
//! Run this demo as follows
//!     RUST_LOG=paxos9=info cargo run --example simulate

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;

use paxos9::engine::Engine;
use paxos9::identity::{MemberId, Peers, GROUP_SIZE};
use paxos9::profile::Profile;
use paxos9::transport;

const BASE_PORT: u16 = 19100;

fn main() {
    env_logger::init();

    let mut addresses = HashMap::new();
    for k in 1..=GROUP_SIZE {
        let id = MemberId::parse(&format!("M{k}")).expect("in-range member id");
        let addr: SocketAddrV4 = format!("127.0.0.1:{}", BASE_PORT + k as u16)
            .parse()
            .expect("valid loopback address");
        addresses.insert(id, addr);
    }
    let peers = Peers::new(addresses);

    let mut engines: Vec<Arc<Engine>> = Vec::new();
    for k in 1..=GROUP_SIZE {
        let id = MemberId::parse(&format!("M{k}")).unwrap();
        let engine = Engine::new(id, peers.clone(), Profile::Reliable);
        let bind_addr = engine.listen_addr();
        transport::listen(bind_addr, engine.clone()).expect("bind loopback port");
        engines.push(engine);
    }

    info!(
        "nine members listening on 127.0.0.1:{}..={}",
        BASE_PORT + 1,
        BASE_PORT + GROUP_SIZE as u16
    );

    // Give every listener a moment to come up before the first proposal.
    thread::sleep(Duration::from_millis(100));

    engines[0].propose("hello-paxos".to_string());

    // Consensus typically settles within a couple of round trips; poll
    // every member's learner rather than guessing a single fixed delay.
    for _ in 0..50 {
        thread::sleep(Duration::from_millis(100));
        if engines.iter().all(|e| e.decided_value().is_some()) {
            break;
        }
    }

    for engine in &engines {
        info!("[{}] decided = {:?}", engine.self_id, engine.decided_value());
    }
}
