//! Request/acknowledge handshakes between a worker thread and its clients.
//!
//! Each worker owns one [`Handshake`]: a single mutex guarding the worker's
//! queue and its request counters, plus three condition variables (start,
//! stop, ack). The request pattern is lock → bump counter → unlock → wake;
//! the wait pattern is lock → wait while the counter is unsatisfied →
//! consume → unlock. Counters are integers so overlapping requests never
//! lose a wake; at steady state they return to zero.
//!
//! Critical sections stay short — no synthesis, I/O, or callback invocation
//! ever happens under this mutex.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// The worker's queue plus its handshake counters, all behind one mutex.
pub struct Guarded<T> {
    pub shared: T,
    start_req: u32,
    stop_req: u32,
    running: bool,
    started: bool,
    shutdown: bool,
    exited: bool,
}

impl<T> Guarded<T> {
    /// Client → worker: work is available, wake up.
    pub fn request_start(&mut self) {
        self.start_req += 1;
    }

    /// Worker: discard queued start tokens after taking work. Callers must
    /// notify the start condvar afterwards so blocked submitters observe
    /// the consumption.
    pub fn purge_start(&mut self) {
        self.start_req = 0;
    }

    pub fn start_pending(&self) -> bool {
        self.start_req > 0
    }

    /// Client → worker: abort.
    pub fn request_stop(&mut self) {
        self.stop_req += 1;
    }

    pub fn stop_pending(&self) -> bool {
        self.stop_req > 0 || self.shutdown
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }
}

pub struct Handshake<T> {
    inner: Mutex<Guarded<T>>,
    start: Condvar,
    stop: Condvar,
    ack: Condvar,
}

impl<T> Handshake<T> {
    pub fn new(shared: T) -> Self {
        Self {
            inner: Mutex::new(Guarded {
                shared,
                start_req: 0,
                stop_req: 0,
                running: false,
                started: false,
                shutdown: false,
                exited: false,
            }),
            start: Condvar::new(),
            stop: Condvar::new(),
            ack: Condvar::new(),
        }
    }

    // A poisoned mutex only means some other thread panicked mid-section;
    // the counters are still coherent, so keep dispatching.
    fn guard(&self) -> MutexGuard<'_, Guarded<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one short critical section over the queue and counters.
    pub fn lock<R>(&self, f: impl FnOnce(&mut Guarded<T>) -> R) -> R {
        f(&mut self.guard())
    }

    pub fn notify_start(&self) {
        self.start.notify_all();
    }

    pub fn notify_stop(&self) {
        self.stop.notify_all();
    }

    pub fn notify_ack(&self) {
        self.ack.notify_all();
    }

    // ─── Client side ──────────────────────────────────────────────────────

    /// Block until the worker has consumed every queued start token, so an
    /// immediate `is_running` query after a submit observes the pickup.
    pub fn wait_start_consumed(&self) {
        let mut g = self.guard();
        while g.start_req > 0 && !g.shutdown && !g.exited {
            g = self.start.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the worker acknowledges every pending stop request.
    pub fn await_stop_ack(&self) {
        let mut g = self.guard();
        while g.stop_req > 0 && !g.exited {
            g = self.ack.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard().running
    }

    pub fn stop_pending(&self) -> bool {
        self.guard().stop_pending()
    }

    pub fn is_shutdown(&self) -> bool {
        self.guard().shutdown
    }

    /// Ask the worker to exit at its next wait site and wake every sleeper.
    pub fn begin_shutdown(&self) {
        self.guard().shutdown = true;
        self.start.notify_all();
        self.stop.notify_all();
        self.ack.notify_all();
    }

    /// Wait up to `timeout` for the worker to mark itself exited.
    pub fn await_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.guard();
        while !g.exited {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .ack
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            g = guard;
        }
        true
    }

    // ─── Worker side ──────────────────────────────────────────────────────

    /// Announce that the worker thread is alive. Constructors block in
    /// [`await_started`](Self::await_started) so that once they return the
    /// worker is provably running.
    pub fn mark_started(&self) {
        self.guard().started = true;
        self.ack.notify_all();
    }

    pub fn await_started(&self) {
        let mut g = self.guard();
        while !g.started {
            g = self.ack.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until a start request arrives, consume one token, and mark the
    /// worker running — in one critical section, so a submitter unblocked
    /// by the consumption already observes `is_running() == true`.
    /// Returns `false` when shutdown was requested instead.
    pub fn await_start(&self) -> bool {
        let mut g = self.guard();
        while g.start_req == 0 && !g.shutdown {
            g = self.start.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        if g.shutdown {
            return false;
        }
        g.start_req -= 1;
        g.running = true;
        drop(g);
        self.start.notify_all();
        true
    }

    /// One bounded wait slice on the start condvar, without consuming.
    /// Returns whether a start request (or shutdown) is now pending.
    pub fn start_arrived_within(&self, timeout: Duration) -> bool {
        let g = self.guard();
        if g.start_req > 0 || g.shutdown {
            return true;
        }
        let (g, _) = self
            .start
            .wait_timeout(g, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        g.start_req > 0 || g.shutdown
    }

    /// Sleep up to `duration`, waking early on a stop request or shutdown.
    /// Returns whether a stop was observed.
    pub fn sleep_unless_stop(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut g = self.guard();
        loop {
            if g.stop_req > 0 || g.shutdown {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .stop
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            g = guard;
        }
    }

    /// Acknowledge every pending stop request. The drain that precedes this
    /// satisfied all of them at once, so overlapping cancels unblock
    /// together.
    pub fn acknowledge_stop(&self) {
        self.guard().stop_req = 0;
        self.ack.notify_all();
    }

    /// Final word from the worker thread; unblocks every waiter.
    pub fn mark_exited(&self) {
        {
            let mut g = self.guard();
            g.exited = true;
            g.running = false;
        }
        self.start.notify_all();
        self.ack.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn start_token_requested_before_wait_is_not_lost() {
        let hs = Handshake::new(());
        hs.lock(|g| g.request_start());
        hs.notify_start();
        // the token is already queued, so this must not block
        assert!(hs.await_start());
    }

    #[test]
    fn wait_start_consumed_unblocks_after_worker_pickup() {
        let hs = Arc::new(Handshake::new(()));
        hs.lock(|g| g.request_start());
        hs.notify_start();

        let worker = {
            let hs = hs.clone();
            thread::spawn(move || {
                assert!(hs.await_start());
            })
        };
        hs.wait_start_consumed();
        assert!(!hs.lock(|g| g.start_pending()));
        worker.join().unwrap();
    }

    #[test]
    fn stop_request_round_trips_through_ack() {
        let hs = Arc::new(Handshake::new(()));
        let worker = {
            let hs = hs.clone();
            thread::spawn(move || {
                // worker notices the stop and acknowledges it
                while !hs.stop_pending() {
                    thread::sleep(Duration::from_millis(1));
                }
                hs.acknowledge_stop();
            })
        };

        hs.lock(|g| g.request_stop());
        hs.notify_stop();
        hs.await_stop_ack();
        assert!(!hs.stop_pending());
        worker.join().unwrap();
    }

    #[test]
    fn sleep_unless_stop_returns_early_on_stop() {
        let hs = Arc::new(Handshake::new(()));
        let stopper = {
            let hs = hs.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                hs.lock(|g| g.request_stop());
                hs.notify_stop();
            })
        };

        let t0 = Instant::now();
        let stopped = hs.sleep_unless_stop(Duration::from_secs(10));
        assert!(stopped);
        assert!(t0.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }

    #[test]
    fn sleep_unless_stop_times_out_without_stop() {
        let hs = Handshake::new(());
        let t0 = Instant::now();
        assert!(!hs.sleep_unless_stop(Duration::from_millis(10)));
        assert!(t0.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn shutdown_wakes_start_waiter() {
        let hs = Arc::new(Handshake::new(()));
        let worker = {
            let hs = hs.clone();
            thread::spawn(move || hs.await_start())
        };
        thread::sleep(Duration::from_millis(10));
        hs.begin_shutdown();
        assert!(!worker.join().unwrap());
    }

    #[test]
    fn await_exit_times_out_when_worker_never_exits() {
        let hs = Handshake::new(());
        assert!(!hs.await_exit(Duration::from_millis(10)));
        hs.mark_exited();
        assert!(hs.await_exit(Duration::from_millis(10)));
    }

    #[test]
    fn counters_return_to_zero_at_steady_state() {
        let hs = Handshake::new(());
        hs.lock(|g| {
            g.request_start();
            g.request_start();
        });
        assert!(hs.await_start());
        assert!(hs.await_start());
        hs.lock(|g| {
            assert!(!g.start_pending());
            g.request_stop();
        });
        hs.acknowledge_stop();
        assert!(!hs.stop_pending());
    }
}
