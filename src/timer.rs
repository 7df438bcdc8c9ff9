//! A repeating background timer, grounded on `RepeatedTimer` from the
//! runtime this crate's scheduling protocol is modeled on: a dedicated
//! thread parked on a condvar until either its deadline elapses or it's
//! told to move the deadline or shut down.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::Clock;

struct TimerState {
    deadline_nanos: u64,
    shutdown: bool,
}

/// Runs `callback` once per period on a dedicated thread, where the period
/// is whatever `callback` returns (letting a caller like the `WithTimer`
/// scheduler policy re-read a tunable interval on every tick). Dropping the
/// timer requests shutdown and joins the thread.
pub struct RepeatedTimer {
    state: Arc<(Mutex<TimerState>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl RepeatedTimer {
    pub fn new<F>(clock: Arc<dyn Clock>, initial_period_nanos: u64, mut callback: F) -> Self
    where
        F: FnMut() -> u64 + Send + 'static,
    {
        let state = Arc::new((
            Mutex::new(TimerState {
                deadline_nanos: clock.now_nanos() + initial_period_nanos,
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let thread_state = state.clone();
        let thread = thread::Builder::new()
            .name("epochgc-timer".to_owned())
            .spawn(move || {
                let (mutex, cv) = &*thread_state;
                let mut guard = mutex.lock().unwrap();
                loop {
                    if guard.shutdown {
                        return;
                    }
                    let now = clock.now_nanos();
                    if now >= guard.deadline_nanos {
                        let deadline = guard.deadline_nanos;
                        drop(guard);
                        let period = callback();
                        guard = mutex.lock().unwrap();
                        if !guard.shutdown && guard.deadline_nanos == deadline {
                            guard.deadline_nanos = clock.now_nanos() + period;
                        }
                        continue;
                    }
                    let wait_for = Duration::from_nanos(now.abs_diff(guard.deadline_nanos));
                    let (g, _timeout) = cv.wait_timeout(guard, wait_for).unwrap();
                    guard = g;
                }
            })
            .expect("epochgc: failed to spawn timer thread");

        RepeatedTimer { state, thread: Some(thread) }
    }

    /// Moves the next firing to `deadline_nanos`, waking the timer thread
    /// immediately so it re-evaluates instead of sleeping out its old
    /// deadline.
    pub fn update_at(&self, deadline_nanos: u64) {
        let (mutex, cv) = &*self.state;
        let mut guard = mutex.lock().unwrap();
        guard.deadline_nanos = deadline_nanos;
        cv.notify_all();
    }
}

impl Drop for RepeatedTimer {
    fn drop(&mut self) {
        {
            let (mutex, cv) = &*self.state;
            let mut guard = mutex.lock().unwrap();
            guard.shutdown = true;
            cv.notify_all();
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[test]
    fn fires_and_reschedules() {
        let clock = Arc::new(ManualClock::new(0));
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_for_cb = ticks.clone();
        let timer = RepeatedTimer::new(clock.clone(), 1, move || {
            ticks_for_cb.fetch_add(1, Ordering::SeqCst);
            1_000_000
        });
        clock.advance(1);
        for _ in 0..200 {
            if ticks.load(Ordering::SeqCst) >= 1 {
                break;
            }
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert!(ticks.load(Ordering::SeqCst) >= 1);
        drop(timer);
    }
}
