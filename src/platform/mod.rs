//! OS boundary for the recognizer
//!
//! Everything the matcher needs from the operating system goes through the
//! traits in this module: live modifier state, key-to-character translation,
//! synthetic input injection and hotkey registration. The Win32 backend lives
//! in [`windows`]; [`memory`] provides an in-process backend driven by tests.

pub mod memory;

#[cfg(windows)]
pub mod windows;

use crate::hotkey::{BufferedKey, HotkeyCombo, ModifierState};

/// Errors surfaced by an OS backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("input injection failed: sent {sent} of {expected} events")]
    Injection { sent: usize, expected: usize },

    #[error("hotkey {system_id} could not be registered: {reason}")]
    Register { system_id: u32, reason: String },

    #[error("hotkey {system_id} could not be unregistered: {reason}")]
    Unregister { system_id: u32, reason: String },
}

/// Live keyboard state queried on every observation step
pub trait KeyboardState {
    /// Which of the four modifier keys are physically held right now
    fn modifiers(&self) -> ModifierState;

    /// Resolve a key to exactly one character under the live Shift/Caps
    /// state, or `None` if it does not produce one
    fn translate(&self, vk: u32, scan: u32) -> Option<char>;
}

/// Synthetic input facility
pub trait KeyInjector {
    /// Inject a key-down followed by a key-up for every entry, in order.
    /// Only the virtual key and scan code are carried over.
    fn replay(&self, keys: &[BufferedKey]) -> Result<(), PlatformError>;

    /// Type arbitrary text as Unicode keystrokes
    fn type_text(&self, text: &str) -> Result<(), PlatformError>;
}

/// System-level hotkey registration
pub trait HotkeyRegistrar {
    fn register(&self, system_id: u32, combo: &HotkeyCombo) -> Result<(), PlatformError>;

    fn unregister(&self, system_id: u32) -> Result<(), PlatformError>;
}
