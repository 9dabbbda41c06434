//! # Tracked read-write lock
//! A [RawRwLock] with two [Membership] lists around it: who's waiting for the lock and who's holding it.
//!
//! The bookkeeping order is what makes it observable:
//! - a name goes to `waiting` strictly before the blocking request
//! - it moves to `holding` strictly after the raw lock granted it
//! - on release the raw lock goes first, then the name leaves `holding`
//!
//! So the lists may lag behind the real lock for a moment (the lock is already granted but the name is still waiting),
//! but they never run ahead of it.
//!
//! The move from `waiting` to `holding` is done under both guards, and [TrackedRwLock::snapshot] takes both too,
//! always `waiting` first. A snapshot never shows a name in both lists or in none of them mid-request.
//!
//! Releasing unlocks the raw lock while holding the `holding` guard. The next holder can't be listed
//! before the previous one is gone, so a writer never shows up in `holding` next to a leaving reader.

use std::fmt;

use strum_macros::{Display, EnumString};

use crate::{membership::Membership, raw_rwlock::RawRwLock};

/// Kind of access a participant asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, Display)]
pub enum Mode {
    /// shared access, any number of holders
    #[strum(serialize = "read")]
    Shared,
    /// exclusive access, a single holder
    #[strum(serialize = "write")]
    Exclusive,
}

#[derive(Default)]
pub struct TrackedRwLock {
    waiting: Membership,
    holding: Membership,
    raw: RawRwLock,
}

impl TrackedRwLock {
    pub const fn new() -> Self {
        Self {
            waiting: Membership::new(),
            holding: Membership::new(),
            raw: RawRwLock::new(),
        }
    }

    pub fn acquire_shared(&self, name: &str) {
        log::debug!("{name} requests shared access");
        self.waiting.add(name);
        self.raw.lock_shared();
        self.waiting.transfer(&self.holding, name);
        log::debug!("{name} got shared access");
    }

    /// The caller must hold shared access under this name, it isn't checked.
    pub fn release_shared(&self, name: &str) {
        self.holding.remove_after(name, || self.raw.unlock_shared());
        log::debug!("{name} released shared access");
    }

    pub fn acquire_exclusive(&self, name: &str) {
        log::debug!("{name} requests exclusive access");
        self.waiting.add(name);
        self.raw.lock_exclusive();
        self.waiting.transfer(&self.holding, name);
        log::debug!("{name} got exclusive access");
    }

    /// The caller must hold exclusive access under this name, it isn't checked.
    pub fn release_exclusive(&self, name: &str) {
        self.holding.remove_after(name, || self.raw.unlock_exclusive());
        log::debug!("{name} released exclusive access");
    }

    pub fn acquire(&self, name: &str, mode: Mode) {
        match mode {
            Mode::Shared => self.acquire_shared(name),
            Mode::Exclusive => self.acquire_exclusive(name),
        }
    }

    pub fn release(&self, name: &str, mode: Mode) {
        match mode {
            Mode::Shared => self.release_shared(name),
            Mode::Exclusive => self.release_exclusive(name),
        }
    }

    /// e.g. "read1, read2"
    pub fn holding(&self) -> String {
        self.holding.render()
    }

    pub fn waiting(&self) -> String {
        self.waiting.render()
    }

    /// Both lists at one point in time
    pub fn snapshot(&self) -> Snapshot {
        let (waiting, holding) = Membership::lock_pair(&self.waiting, &self.holding);
        Snapshot {
            holding: holding.clone(),
            waiting: waiting.clone(),
        }
    }

    /// Both lists, but only if the bookkeeping has caught up with the raw lock: `holding` lists every
    /// holder and `waiting` lists exactly the participants that can't move until somebody releases.
    /// `None` means somebody is still on its way in or out.
    ///
    /// The raw state is read under both list guards, so no name can move between the two while it's looked at.
    /// Assumes unique names.
    pub fn settled_snapshot(&self) -> Option<Snapshot> {
        let (waiting, holding) = Membership::lock_pair(&self.waiting, &self.holding);
        let state = self.raw.state();
        (holding.len() == state.holders() && waiting.len() == state.blocked()).then(|| Snapshot {
            holding: holding.clone(),
            waiting: waiting.clone(),
        })
    }
}

/// Who holds and who waits, captured at once
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub holding: Vec<String>,
    pub waiting: Vec<String>,
}

impl Snapshot {
    pub fn is_holding(&self, name: &str) -> bool {
        self.holding.iter().any(|n| n == name)
    }

    pub fn is_waiting(&self, name: &str) -> bool {
        self.waiting.iter().any(|n| n == name)
    }

    pub fn holding(&self) -> String {
        self.holding.join(", ")
    }

    pub fn waiting(&self) -> String {
        self.waiting.join(", ")
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "holding: [{}]", self.holding())?;
        write!(f, "waiting: [{}]", self.waiting())
    }
}
