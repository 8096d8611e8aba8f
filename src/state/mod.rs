//! Hotstring recognition state machine
//!
//! Each watch alternates between two states:
//! - Idle: waiting for the trigger's first character
//! - Observing: holding back a typed prefix of the trigger until it either
//!   completes (action fires, keys discarded) or fails (keys replayed)

mod machine;

pub use machine::{FailReason, Hotstring, MatchStats, State, TriggerError, TriggerSpec, DEFAULT_THRESHOLD};
