//! Timer task: arms one-shot callbacks for prepare/accept timeouts and
//! retry jitter. At most two live timers per round are ever needed, so a
//! thread-per-timer model is the idiomatic choice here rather than pulling
//! in an async runtime or a dedicated timer wheel.
//!
//! Timer callbacks self-cancel by re-checking round identity once they
//! fire — this module only guarantees *when* a closure runs, never whether
//! its effect is still relevant.

use std::thread;
use std::time::Duration;

/// Runs `callback` on its own thread after `after` elapses. Returns
/// immediately; the caller does not block and holds no handle to cancel it
/// — there is no explicit cancellation of obsolete timers.
pub fn after<F>(after: Duration, callback: F)
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        thread::sleep(after);
        callback();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn callback_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        after(Duration::from_millis(20), move || {
            fired2.store(true, Ordering::SeqCst);
        });
        assert!(!fired.load(Ordering::SeqCst));
        thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst));
    }
}
