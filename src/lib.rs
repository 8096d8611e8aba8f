//! hotstringd: system-wide hotstring and hotkey recognition
//!
//! Typed character sequences ("hotstrings") are recognised keystroke by
//! keystroke from a low-level keyboard hook. Candidate keys are suppressed
//! while a trigger is being typed; a completed trigger runs its action, a
//! broken one replays the suppressed keys exactly as they were typed.
//!
//! - [`hotkey`]: event source, dispatch, key classification, hotkeys
//! - [`state`]: the per-watch matching state machine
//! - [`platform`]: OS boundary traits and the Win32 backend

pub mod action;
pub mod config;
pub mod events;
pub mod hotkey;
pub mod lifecycle;
pub mod platform;
pub mod state;

pub use action::{Action, EventAction};
pub use hotkey::{Hotkey, HotkeyCombo, KeyboardHook, ModifierState};
pub use state::Hotstring;
