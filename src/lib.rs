pub mod error;
pub mod membership;
pub mod raw_rwlock;
pub mod scenario;
pub mod signal;
pub mod tracked_rwlock;
