//! Keyboard interception and hotkey handling
//!
//! Uses a Win32 low-level keyboard hook to observe every key press
//! system-wide and route it to the registered hotstring watches, plus
//! `RegisterHotKey` based key-combination hotkeys.

mod classify;
mod combo;
mod dispatch;
mod keys;
mod listener;

pub use classify::{classify, modifiers_match};
pub use combo::{Hotkey, HotkeyCombo, HotkeyError, HotkeyTable, SystemIdPool, SYSTEM_ID_LIMIT};
pub use dispatch::{Dispatcher, WatchId};
pub use keys::{vk, BufferedKey, KeyEvent, KeyFlags, ModifierState};
pub use listener::{Command, Flow, HookError, HookState, KeyboardHook};
