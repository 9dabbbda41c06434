//! A one-shot release signal: a flag behind a Mutex plus a Condvar to sleep on it.
//! The driver fires it once, the participant waits on it once.
//! Firing before anybody waits isn't lost - the flag stays set.

use std::sync::{Condvar, Mutex, MutexGuard};

pub struct ReleaseSignal {
    fired: Mutex<bool>,
    fired_cond: Condvar,
}

impl ReleaseSignal {
    pub fn new() -> Self {
        Self {
            fired: Mutex::new(false),
            fired_cond: Condvar::new(),
        }
    }

    /// set the flag and wake the waiter, firing again changes nothing
    pub fn fire(&self) {
        *self.flag() = true;
        self.fired_cond.notify_one();
    }

    /// block until fired, returns right away if it already was
    pub fn wait(&self) {
        let mut fired = self.flag();
        // loop, as the condvar can wake up spuriously
        while !*fired {
            fired = self
                .fired_cond
                .wait(fired)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.fired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicBool, Ordering::Relaxed},
        thread::{scope, sleep},
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_wait_blocks_until_fired() {
        let signal = ReleaseSignal::new();
        let woken = AtomicBool::new(false);
        scope(|s| {
            s.spawn(|| {
                signal.wait();
                woken.store(true, Relaxed);
            });
            sleep(Duration::from_millis(50));
            assert!(!woken.load(Relaxed));
            signal.fire();
        });
        assert!(woken.load(Relaxed));
    }

    #[test]
    fn test_fire_before_wait() {
        let signal = ReleaseSignal::new();
        assert!(!*signal.flag());
        signal.fire();
        signal.fire();
        assert!(*signal.flag());
        // doesn't block
        signal.wait();
    }
}
