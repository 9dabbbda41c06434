use thiserror::Error;

/// What can go wrong while loading or driving a scenario. The lock itself never fails.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("{0} has already requested the lock and hasn't released it yet")]
    DuplicateParticipant(String),

    #[error("{0} never requested the lock")]
    UnknownParticipant(String),

    #[error("participant {0} panicked")]
    ParticipantPanicked(String),

    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
