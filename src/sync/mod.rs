pub mod state;
pub mod synchronizer;

pub use state::{GuardHold, SyncState};
pub use synchronizer::{Reveal, SyncConfig, SyncReport, Synchronizer, ViewOutcome};
