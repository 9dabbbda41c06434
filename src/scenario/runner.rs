//! # Runner
//! Plays a [Scenario] against a lock.
//!
//! Every participant gets its own scoped thread and a [ReleaseSignal]. The thread requests the lock,
//! waits for the signal and releases. The runner itself is the observer: before each step it takes a
//! [Snapshot], prints it and, in the interactive mode, waits for <return>.
//!
//! Instead of sleeping for a fixed time and hoping the participants got where they're going,
//! the runner polls [TrackedRwLock::settled_snapshot] after each step. `settle` is an extra pause on top of it,
//! only to let the participants' messages reach the console before the next snapshot.
//!
//! Releasing a holder joins its thread, so the next snapshot already shows it gone. Releasing a participant
//! that is still waiting only fires its signal: it lets go right after it gets the lock. Until its thread
//! is over, the lock counts as settled only while that participant is still stuck in `waiting`,
//! so it never shows up in `holding` at some unrelated step.
//! Whoever is still around at the end (or after an error) is released and joined, so the scope always ends.

use std::{
    collections::HashMap,
    io::{self, BufRead, Write},
    sync::Arc,
    thread::{self, Scope, ScopedJoinHandle},
    time::Duration,
};

use super::{Scenario, Step};
use crate::{
    error::ScenarioError,
    signal::ReleaseSignal,
    tracked_rwlock::{Mode, Snapshot, TrackedRwLock},
};

/// how often the lock is polled while waiting for it to settle
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// wait for <return> before each step
    pub interactive: bool,
    /// extra pause after each step so the console output lines up
    pub settle: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interactive: true,
            settle: Duration::from_millis(250),
        }
    }
}

/// What the observer saw right before a step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    pub label: String,
    pub snapshot: Snapshot,
}

pub const FINISHED: &str = "finished";

struct Participant<'scope> {
    released: bool,
    signal: Arc<ReleaseSignal>,
    handle: ScopedJoinHandle<'scope, ()>,
}

pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Runs every step, returns what was observed before each of them plus the final look (labelled [FINISHED])
    pub fn run(
        &self,
        scenario: &Scenario,
        lock: &TrackedRwLock,
    ) -> Result<Vec<Observation>, ScenarioError> {
        println!("Running {}", scenario.name);
        thread::scope(|s| {
            let mut participants = HashMap::new();
            let result = self.play(scenario, lock, s, &mut participants);
            // nobody may stay blocked on its signal, the scope would never end
            let drained = drain(participants);
            result.and_then(|observations| drained.map(|_| observations))
        })
    }

    fn play<'scope, 'env>(
        &self,
        scenario: &Scenario,
        lock: &'env TrackedRwLock,
        s: &'scope Scope<'scope, 'env>,
        participants: &mut HashMap<String, Participant<'scope>>,
    ) -> Result<Vec<Observation>, ScenarioError> {
        let mut observations = Vec::with_capacity(scenario.steps.len() + 1);
        for step in &scenario.steps {
            let label = step.label();
            observations.push(self.observe(lock, &label)?);
            match step {
                Step::Request { participant, mode } => {
                    if participants.contains_key(participant) {
                        return Err(ScenarioError::DuplicateParticipant(participant.clone()));
                    }
                    let signal = Arc::new(ReleaseSignal::new());
                    let handle = {
                        let (name, mode, signal) = (participant.clone(), *mode, signal.clone());
                        s.spawn(move || participate(lock, &name, mode, &signal))
                    };
                    participants.insert(
                        participant.clone(),
                        Participant {
                            released: false,
                            signal,
                            handle,
                        },
                    );
                    // it has to show up before we can tell whether it's stuck
                    loop {
                        let snapshot = lock.snapshot();
                        if snapshot.is_waiting(participant) || snapshot.is_holding(participant) {
                            break;
                        }
                        thread::sleep(POLL_INTERVAL);
                    }
                }
                Step::Release { participant } => {
                    let released = participants
                        .get_mut(participant)
                        .ok_or_else(|| ScenarioError::UnknownParticipant(participant.clone()))?;
                    released.released = true;
                    released.signal.fire();
                    if lock.snapshot().is_holding(participant) {
                        join(participants, participant)?;
                    } else {
                        // joining now could block forever, settle() picks it up once it's gone
                        log::warn!("{participant} doesn't hold the lock yet, it lets go as soon as it gets it");
                    }
                }
                Step::Observe => {}
            }
            self.settle(lock, participants)?;
        }
        observations.push(self.observe(lock, FINISHED)?);
        Ok(observations)
    }

    /// Wait until the bookkeeping caught up and every released participant is either gone or
    /// still stuck in the queue, then give the console a moment.
    fn settle(
        &self,
        lock: &TrackedRwLock,
        participants: &mut HashMap<String, Participant<'_>>,
    ) -> Result<(), ScenarioError> {
        loop {
            let finished = participants
                .iter()
                .filter(|(_, p)| p.released && p.handle.is_finished())
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>();
            for name in finished {
                join(participants, &name)?;
            }
            let settled = lock.settled_snapshot().is_some_and(|snapshot| {
                participants
                    .iter()
                    .all(|(name, p)| !p.released || snapshot.is_waiting(name))
            });
            if settled {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        if !self.config.settle.is_zero() {
            thread::sleep(self.config.settle);
        }
        Ok(())
    }

    fn observe(&self, lock: &TrackedRwLock, label: &str) -> Result<Observation, ScenarioError> {
        let snapshot = lock.snapshot();
        println!();
        println!("{snapshot}");
        if self.config.interactive && label != FINISHED {
            print!("{label} <return> ");
            io::stdout().flush()?;
            io::stdin().lock().read_line(&mut String::new())?;
        }
        log::debug!("observed before `{label}': {snapshot:?}");
        Ok(Observation {
            label: label.to_string(),
            snapshot,
        })
    }
}

/// a participant's whole life: request, hold until told otherwise, release
fn participate(lock: &TrackedRwLock, name: &str, mode: Mode, signal: &ReleaseSignal) {
    println!("\t{name} -> requesting {mode} lock");
    lock.acquire(name, mode);
    println!("\t{name} -> obtained {mode} lock");

    signal.wait();

    lock.release(name, mode);
    println!("\t{name} -> released {mode} lock");
}

fn join(participants: &mut HashMap<String, Participant<'_>>, name: &str) -> Result<(), ScenarioError> {
    match participants.remove(name) {
        Some(participant) => participant
            .handle
            .join()
            .map_err(|_| ScenarioError::ParticipantPanicked(name.to_string())),
        None => Ok(()),
    }
}

/// release everybody still around and wait for them, reports the first panic
fn drain(participants: HashMap<String, Participant<'_>>) -> Result<(), ScenarioError> {
    if !participants.is_empty() {
        log::info!("releasing {} leftover participant(s)", participants.len());
    }
    for participant in participants.values() {
        participant.signal.fire();
    }
    let mut result = Ok(());
    for (name, participant) in participants {
        if participant.handle.join().is_err() && result.is_ok() {
            result = Err(ScenarioError::ParticipantPanicked(name));
        }
    }
    result
}
