//! TCP transport facade: one connection per message,
//! connect-write-flush-close on the sending side, one connection per
//! inbound message on the listener side. All transport failures are caught
//! and discarded — modelling an unreliable network — never propagated past
//! this module.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddrV4, TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::message::Message;

/// Hard per-operation socket deadline.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(2);

/// Number of worker threads draining the inbound connection queue. The
/// reference scheduling model calls for "a bounded worker pool"; nine
/// concurrent in-flight messages comfortably covers a full broadcast round
/// from every peer without unbounded thread growth.
const WORKER_POOL_SIZE: usize = 9;

/// Anything that can turn a decoded [`Message`] into further work. The
/// engine implements this; kept as a trait so the listener/worker plumbing
/// has no dependency on the engine's internals.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, m: Message);
}

/// Sends one message per TCP connection, honouring the 2-second socket
/// deadline and swallowing every I/O error ("silently
/// discarded").
pub fn send(to: SocketAddrV4, m: &Message) {
    let line = format!("{}\n", crate::message::encode(m));
    let addr: std::net::SocketAddr = to.into();
    match TcpStream::connect_timeout(&addr, SOCKET_TIMEOUT) {
        Ok(stream) => {
            let _ = stream.set_nodelay(true);
            let _ = stream.set_write_timeout(Some(SOCKET_TIMEOUT));
            let mut stream = stream;
            if let Err(e) = stream.write_all(line.as_bytes()) {
                debug!("send to {to} failed: {e}");
                return;
            }
            if let Err(e) = stream.flush() {
                debug!("flush to {to} failed: {e}");
            }
        }
        Err(e) => {
            debug!("connect to {to} failed: {e}");
        }
    }
}

/// Broadcasts `m` to every address in `to`, sequentially; each send is
/// fire-and-forget so the caller never blocks longer than
/// `len(to) * SOCKET_TIMEOUT` in the worst case.
pub fn broadcast(to: &[SocketAddrV4], m: &Message) {
    for addr in to {
        send(*addr, m);
    }
}

/// Binds one listener socket and starts the bounded worker pool that reads
/// one line per connection, decodes it, and hands it to `dispatch`.
/// Returns immediately; the listener and workers run on their own threads
/// for the life of the process.
pub fn listen(bind_addr: SocketAddrV4, dispatch: Arc<dyn Dispatch>) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    let (tx, rx) = mpsc::channel::<TcpStream>();
    let rx = Arc::new(std::sync::Mutex::new(rx));

    for worker_id in 0..WORKER_POOL_SIZE {
        let rx = Arc::clone(&rx);
        let dispatch = Arc::clone(&dispatch);
        thread::Builder::new()
            .name(format!("paxos-worker-{worker_id}"))
            .spawn(move || worker_loop(worker_id, rx, dispatch))
            .expect("failed to spawn worker thread");
    }

    thread::Builder::new()
        .name("paxos-listener".into())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if tx.send(stream).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("accept failed on {bind_addr}: {e}"),
                }
            }
        })?;

    Ok(())
}

fn worker_loop(
    worker_id: usize,
    rx: Arc<std::sync::Mutex<mpsc::Receiver<TcpStream>>>,
    dispatch: Arc<dyn Dispatch>,
) {
    loop {
        let stream = {
            let guard = rx.lock().expect("worker queue mutex poisoned");
            guard.recv()
        };
        let Ok(stream) = stream else { break };
        handle_connection(worker_id, stream, dispatch.as_ref());
    }
}

fn handle_connection(worker_id: usize, stream: TcpStream, dispatch: &dyn Dispatch) {
    let _ = stream.set_read_timeout(Some(SOCKET_TIMEOUT));
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => {}
        Ok(_) => {
            let line = line.trim_end_matches(['\n', '\r']);
            match crate::message::decode(line) {
                Ok(m) => dispatch.dispatch(m),
                Err(e) => warn!("worker {worker_id}: dropping malformed line {line:?}: {e}"),
            }
        }
        Err(e) => debug!("worker {worker_id}: read failed: {e}"),
    }
}
