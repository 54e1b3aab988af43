//! Channel tick threads.
//!
//! Each channel's [`ChannelState`] lives behind a mutex shared by exactly two
//! parties: its own tick thread and the dispatcher acting for the connected
//! client. The lock is held for a single tick or a single read/write, never
//! across a sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use sd_controls::{ChannelState, PollConfig, TickClock};
use sd_core::ChannelId;
use tracing::{debug, error, info, trace};

use crate::error::DeviceResult;

/// A channel and the thread that drives it.
pub struct ChannelWorker {
    id: ChannelId,
    state: Arc<Mutex<ChannelState>>,
    alive: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelWorker {
    /// Start ticking `state` every `poll.interval`. The first tick runs immediately.
    pub fn spawn(state: ChannelState, poll: PollConfig) -> DeviceResult<Self> {
        let id = state.id();
        let state = Arc::new(Mutex::new(state));
        let alive = Arc::new(AtomicBool::new(true));

        let handle = {
            let state = Arc::clone(&state);
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name(format!("sd-channel-{id}"))
                .spawn(move || run(id, &state, &alive, poll))?
        };

        Ok(Self {
            id,
            state,
            alive,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Run `f` with the channel locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ChannelState {
        lock(&self.state).clone()
    }

    /// `true` until [`kill`](Self::kill) has been called.
    pub fn is_running(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stop the tick loop and wait for its thread to exit.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
        let handle = lock(&self.handle).take();
        let Some(handle) = handle else {
            return;
        };
        info!(channel = %self.id, "Shutting down channel...");
        handle.thread().unpark();
        if handle.join().is_err() {
            error!(channel = %self.id, "channel thread panicked");
        } else {
            info!(channel = %self.id, "Channel shut down.");
        }
    }
}

impl Drop for ChannelWorker {
    fn drop(&mut self) {
        self.kill();
    }
}

fn run(id: ChannelId, state: &Mutex<ChannelState>, alive: &AtomicBool, poll: PollConfig) {
    let mut clock = TickClock::new(poll, Instant::now());
    while alive.load(Ordering::Acquire) {
        let now = Instant::now();
        if clock.should_tick(now) {
            let (was_at_rest, at_rest, readback) = {
                let mut ch = lock(state);
                let was_at_rest = ch.is_at_rest();
                ch.tick(poll.dt());
                (was_at_rest, ch.is_at_rest(), ch.readback())
            };
            trace!(channel = %id, readback, "tick");
            if at_rest && !was_at_rest {
                debug!(channel = %id, readback, "channel reached setpoint");
            }
            clock.advance(now);
        } else {
            // Woken early by kill() or spuriously; the loop re-checks both.
            thread::park_timeout(clock.time_until_tick(now));
        }
    }
}

/// Channel state is plain data, so a panic elsewhere cannot leave it torn.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_controls::ChannelConfig;
    use std::time::Duration;

    fn worker(poll_ms: u64) -> ChannelWorker {
        let state = ChannelState::new(ChannelId::from_index(0), &ChannelConfig::default()).unwrap();
        ChannelWorker::spawn(state, PollConfig::from_millis(poll_ms).unwrap()).unwrap()
    }

    #[test]
    fn ticks_advance_readback_in_background() {
        let w = worker(2);
        w.with_state(|ch| ch.set_setpoint(3.0)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !w.snapshot().is_at_rest() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let snap = w.snapshot();
        assert!(snap.is_at_rest());
        assert_eq!(snap.readback(), 3.0);
        assert!(snap.ticks() >= 3);
        w.kill();
    }

    #[test]
    fn kill_wakes_a_sleeping_tick_loop() {
        let w = worker(60_000);
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        w.kill();
        assert!(!w.is_running());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn kill_twice_is_harmless() {
        let w = worker(5);
        w.kill();
        w.kill();
        assert!(!w.is_running());
    }

    #[test]
    fn no_ticks_after_kill() {
        let w = worker(1);
        w.kill();
        let ticks = w.snapshot().ticks();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(w.snapshot().ticks(), ticks);
    }
}
