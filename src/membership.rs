//! # Membership
//!
//! A list of participant names behind a mutex. The lock keeps two of them: who waits and who holds.
//! It's there for observability only, the exclusion itself is done by [crate::raw_rwlock::RawRwLock].
//!
//! Every mutation and every rendering takes the same guard, so a reader never sees half of an add / remove.
//! Removing rebuilds the list without the matches - O(n), which is fine for a handful of participants.
//!
//! Names aren't required to be unique: duplicates are kept and [Membership::remove] drops all of them.

use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct Membership {
    names: Mutex<Vec<String>>,
}

impl Membership {
    pub const fn new() -> Self {
        Self {
            names: Mutex::new(Vec::new()),
        }
    }

    /// append to the end
    pub fn add(&self, name: &str) {
        self.lock().push(name.to_string());
        log::trace!("membership: added {name}");
    }

    /// drop every entry equal to `name`, absent names are a no-op
    pub fn remove(&self, name: &str) {
        Self::remove_from(&mut self.lock(), name);
        log::trace!("membership: removed {name}");
    }

    /// Runs `before` and drops `name` under one guard, so nobody sees what `before` did
    /// without the removal.
    pub fn remove_after(&self, name: &str, before: impl FnOnce()) {
        let mut names = self.lock();
        before();
        Self::remove_from(&mut names, name);
        log::trace!("membership: removed {name}");
    }

    #[cfg(test)]
    fn contains(&self, name: &str) -> bool {
        self.lock().iter().any(|n| n == name)
    }

    /// names joined with ", " in insertion order, "" when empty
    pub fn render(&self) -> String {
        self.lock().join(", ")
    }

    /// a copy of the names in insertion order
    #[cfg(test)]
    fn members(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Moves `name` from `self` to `to` holding both guards at once.
    /// Callers must always pass the trackers in the same order, see `lock_pair`.
    pub fn transfer(&self, to: &Membership, name: &str) {
        let (mut from_names, mut to_names) = Self::lock_pair(self, to);
        to_names.push(name.to_string());
        Self::remove_from(&mut from_names, name);
        log::trace!("membership: moved {name}");
    }

    /// Locks `first` then `second`. Deadlock-free as long as every caller uses the same order.
    pub(crate) fn lock_pair<'a>(
        first: &'a Membership,
        second: &'a Membership,
    ) -> (MutexGuard<'a, Vec<String>>, MutexGuard<'a, Vec<String>>) {
        let first = first.lock();
        let second = second.lock();
        (first, second)
    }

    fn remove_from(names: &mut Vec<String>, name: &str) {
        names.retain(|n| n != name);
    }

    // a panicked participant can't leave the Vec half-updated, so the poison is ignored
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.names.lock().unwrap_or_else(|poisoned| {
            log::warn!("membership mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
