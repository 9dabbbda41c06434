//! # Raw read-write lock
//! A reader-writer lock without data and without guards: locking and unlocking are separate calls,
//! so a participant can request access in one call and give it back much later in another one.
//!
//! 2 types of locking:
//! - exclusive / write - a single holder
//! - shared / read - there can be multiple
//!
//! ## Who goes next
//! The hand-off is deterministic, there's no race between the woken threads:
//! - a reader gets in right away unless a writer holds the lock or waits for it, otherwise it queues
//! - writers are served in the order they came (a ticket each), a writer waits for the active readers to leave
//! - a leaving writer lets in *every* queued reader at once, as one batch, and the next writer waits for that batch
//!
//! So readers can't starve writers and writers can't starve readers.
//!
//! ## Waiting
//! The counters live behind a single mutex, sleeping is done on a futex counter the same way as
//! a hand-made condition variable: read the counter, unlock, `wait` while it's unchanged, lock again.
//! A notification bumps the counter, so it can't slip in between the unlock and the `wait`.
//!
//! As all the counters change under one mutex, [RawRwLock::state] is exact: it tells how many
//! participants hold the lock and how many of them can't move until somebody releases.

use std::sync::{
    atomic::{AtomicU32, Ordering::Relaxed},
    Mutex, MutexGuard,
};

use atomic_wait::{wait, wake_all};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Counters {
    readers: u32, // granted shared holders, a freshly admitted batch included
    write_locked: bool,
    readers_queued: u32,
    batch: u32, // bumped when the queued readers are let in
    writers_queued: u32,
    next_ticket: u32,
    serving: u32, // the ticket of the writer that goes next
}

/// A condition variable on top of a futex: the counter changes on every notification
#[derive(Default)]
struct Wakeup {
    counter: AtomicU32,
}

impl Wakeup {
    const fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
        }
    }

    /// the mutex orders everything else, so Relaxed is enough
    fn wait<'a>(
        &self,
        mutex: &'a Mutex<Counters>,
        guard: MutexGuard<'a, Counters>,
    ) -> MutexGuard<'a, Counters> {
        let counter = self.counter.load(Relaxed);
        drop(guard);
        wait(&self.counter, counter);
        lock(mutex)
    }

    fn notify_all(&self) {
        self.counter.fetch_add(1, Relaxed);
        wake_all(&self.counter);
    }
}

#[derive(Default)]
pub struct RawRwLock {
    counters: Mutex<Counters>,
    readers_wakeup: Wakeup,
    writers_wakeup: Wakeup,
}

impl RawRwLock {
    pub const fn new() -> Self {
        Self {
            counters: Mutex::new(Counters {
                readers: 0,
                write_locked: false,
                readers_queued: 0,
                batch: 0,
                writers_queued: 0,
                next_ticket: 0,
                serving: 0,
            }),
            readers_wakeup: Wakeup::new(),
            writers_wakeup: Wakeup::new(),
        }
    }

    /// blocks while a writer holds the lock or waits for it
    pub fn lock_shared(&self) {
        let mut c = lock(&self.counters);
        if !c.write_locked && c.writers_queued == 0 {
            c.readers += 1;
            return;
        }
        c.readers_queued += 1;
        let batch = c.batch;
        // loop, as the futex can wake up spuriously
        while c.batch == batch {
            c = self.readers_wakeup.wait(&self.counters, c);
        }
        // the writer that let the batch in has already counted us in `readers`
    }

    /// the last reader out wakes the writers
    pub fn unlock_shared(&self) {
        let mut c = lock(&self.counters);
        debug_assert!(c.readers > 0, "unlock_shared on a lock without readers");
        c.readers = c.readers.saturating_sub(1);
        let wake_writers = c.readers == 0 && c.writers_queued > 0;
        drop(c);
        if wake_writers {
            self.writers_wakeup.notify_all();
        }
    }

    pub fn lock_exclusive(&self) {
        let mut c = lock(&self.counters);
        let ticket = c.next_ticket;
        c.next_ticket = c.next_ticket.wrapping_add(1);
        c.writers_queued += 1;
        while c.write_locked || c.readers > 0 || c.serving != ticket {
            c = self.writers_wakeup.wait(&self.counters, c);
        }
        c.writers_queued -= 1;
        c.write_locked = true;
        c.serving = c.serving.wrapping_add(1);
    }

    /// queued readers go first as one batch, writers are woken only if there's none
    pub fn unlock_exclusive(&self) {
        let mut c = lock(&self.counters);
        debug_assert!(c.write_locked, "unlock_exclusive on a lock that isn't write-locked");
        c.write_locked = false;
        let admit_readers = c.readers_queued > 0;
        if admit_readers {
            c.readers += c.readers_queued;
            c.readers_queued = 0;
            c.batch = c.batch.wrapping_add(1);
        }
        drop(c);
        if admit_readers {
            self.readers_wakeup.notify_all();
        } else {
            self.writers_wakeup.notify_all();
        }
    }

    /// A copy of the counters, exact at the moment it's taken
    pub fn state(&self) -> RawState {
        RawState(*lock(&self.counters))
    }
}

// a panicking participant never leaves the counters half-updated
fn lock(mutex: &Mutex<Counters>) -> MutexGuard<'_, Counters> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawState(Counters);

impl RawState {
    pub fn is_write_locked(&self) -> bool {
        self.0.write_locked
    }

    pub fn readers(&self) -> usize {
        self.0.readers as usize
    }

    /// how many participants hold the lock right now, admitted readers that haven't woken up yet included
    pub fn holders(&self) -> usize {
        self.readers() + usize::from(self.0.write_locked)
    }

    /// How many participants can't move until somebody releases.
    /// With the lock free the first queued writer is about to take it, so it doesn't count.
    pub fn blocked(&self) -> usize {
        let c = &self.0;
        let writer_up_next = !c.write_locked && c.readers == 0 && c.writers_queued > 0;
        (c.readers_queued + c.writers_queued) as usize - usize::from(writer_up_next)
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::AtomicUsize,
        thread::{scope, sleep},
        time::Duration,
    };

    use super::*;

    fn wait_for_blocked(lock: &RawRwLock, n: usize) {
        while lock.state().blocked() != n {
            sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_readers_share() {
        let lock = RawRwLock::new();
        lock.lock_shared();
        lock.lock_shared();
        assert_eq!(lock.state().readers(), 2);
        assert_eq!(lock.state().holders(), 2);
        lock.unlock_shared();
        lock.unlock_shared();
        assert_eq!(lock.state(), RawState(Counters::default()));
    }

    #[test]
    fn test_writer_waits_for_readers() {
        let lock = RawRwLock::new();
        let written = AtomicUsize::new(0);
        lock.lock_shared();
        lock.lock_shared();
        scope(|s| {
            s.spawn(|| {
                lock.lock_exclusive();
                written.store(1, Relaxed);
                lock.unlock_exclusive();
            });
            wait_for_blocked(&lock, 1);
            assert_eq!(written.load(Relaxed), 0);

            lock.unlock_shared();
            sleep(Duration::from_millis(50));
            // one reader is still there
            assert_eq!(written.load(Relaxed), 0);
            assert_eq!(lock.state().blocked(), 1);

            lock.unlock_shared();
        });
        assert_eq!(written.load(Relaxed), 1);
        assert_eq!(lock.state().holders(), 0);
    }

    #[test]
    fn test_reader_queues_behind_waiting_writer() {
        let lock = RawRwLock::new();
        let order = Mutex::new(Vec::new());
        lock.lock_shared();
        scope(|s| {
            s.spawn(|| {
                lock.lock_exclusive();
                order.lock().unwrap().push("w1");
                lock.unlock_exclusive();
            });
            wait_for_blocked(&lock, 1);
            s.spawn(|| {
                lock.lock_shared();
                order.lock().unwrap().push("r2");
                lock.unlock_shared();
            });
            wait_for_blocked(&lock, 2);
            lock.unlock_shared();
        });
        assert_eq!(*order.lock().unwrap(), ["w1", "r2"]);
    }

    #[test]
    fn test_leaving_writer_lets_queued_readers_in_before_next_writer() {
        let lock = RawRwLock::new();
        let order = Mutex::new(Vec::new());
        lock.lock_exclusive();
        scope(|s| {
            let (lock, order) = (&lock, &order);
            s.spawn(move || {
                lock.lock_shared();
                order.lock().unwrap().push("r1");
                lock.unlock_shared();
            });
            wait_for_blocked(lock, 1);
            s.spawn(move || {
                lock.lock_exclusive();
                order.lock().unwrap().push("w2");
                lock.unlock_exclusive();
            });
            wait_for_blocked(lock, 2);
            // came after w2, still goes with the batch
            s.spawn(move || {
                lock.lock_shared();
                order.lock().unwrap().push("r3");
                lock.unlock_shared();
            });
            wait_for_blocked(lock, 3);

            lock.unlock_exclusive();
        });
        let order = order.into_inner().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[2], "w2", "{order:?}");
    }

    #[test]
    fn test_writers_go_in_arrival_order() {
        let lock = RawRwLock::new();
        let order = Mutex::new(Vec::new());
        lock.lock_shared();
        scope(|s| {
            for (i, name) in ["w1", "w2", "w3"].into_iter().enumerate() {
                let (lock, order) = (&lock, &order);
                s.spawn(move || {
                    lock.lock_exclusive();
                    order.lock().unwrap().push(name);
                    lock.unlock_exclusive();
                });
                wait_for_blocked(lock, i + 1);
            }
            lock.unlock_shared();
        });
        assert_eq!(*order.lock().unwrap(), ["w1", "w2", "w3"]);
    }

    #[test]
    fn test_state_counts_the_writer_up_next_as_not_blocked() {
        let lock = RawRwLock::new();
        let mut c = Counters::default();
        c.writers_queued = 2;
        assert_eq!(RawState(c).blocked(), 1);
        c.readers = 1;
        assert_eq!(RawState(c).blocked(), 2);
        lock.lock_exclusive();
        assert!(lock.state().is_write_locked());
        assert_eq!(lock.state().holders(), 1);
        assert_eq!(lock.state().blocked(), 0);
        lock.unlock_exclusive();
    }

    #[test]
    fn test_mixed_load() {
        let lock = RawRwLock::new();
        let inside = AtomicUsize::new(0); // 1000 per writer, 1 per reader
        scope(|s| {
            for i in 0..8 {
                let (lock, inside) = (&lock, &inside);
                s.spawn(move || {
                    for _ in 0..200 {
                        if i % 4 == 0 {
                            lock.lock_exclusive();
                            assert_eq!(inside.fetch_add(1000, Relaxed), 0);
                            inside.fetch_sub(1000, Relaxed);
                            lock.unlock_exclusive();
                        } else {
                            lock.lock_shared();
                            assert!(inside.fetch_add(1, Relaxed) < 1000);
                            inside.fetch_sub(1, Relaxed);
                            lock.unlock_shared();
                        }
                    }
                });
            }
        });
        let state = lock.state();
        assert_eq!((state.holders(), state.blocked()), (0, 0));
    }
}
