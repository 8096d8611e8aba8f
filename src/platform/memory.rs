//! In-memory backend
//!
//! A scripted keyboard and recording injector/registrar. Letters translate
//! through a US layout; tests flip modifier state between key presses the
//! way a user would hold and release keys.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use super::{HotkeyRegistrar, KeyInjector, KeyboardState, PlatformError};
use crate::hotkey::{vk, BufferedKey, HotkeyCombo, ModifierState};

/// Keyboard whose modifier state is set explicitly
#[derive(Debug, Default)]
pub struct ScriptedKeyboard {
    modifiers: Cell<ModifierState>,
    caps_lock: Cell<bool>,
}

impl ScriptedKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_modifiers(&self, modifiers: ModifierState) {
        self.modifiers.set(modifiers);
    }

    pub fn set_caps_lock(&self, on: bool) {
        self.caps_lock.set(on);
    }
}

impl KeyboardState for ScriptedKeyboard {
    fn modifiers(&self) -> ModifierState {
        self.modifiers.get()
    }

    fn translate(&self, code: u32, _scan: u32) -> Option<char> {
        match code {
            vk::A..=vk::Z => {
                let lower = char::from_u32(code)?.to_ascii_lowercase();
                if self.modifiers.get().shift != self.caps_lock.get() {
                    Some(lower.to_ascii_uppercase())
                } else {
                    Some(lower)
                }
            }
            0x30..=0x39 => char::from_u32(code),
            vk::SPACE => Some(' '),
            _ => None,
        }
    }
}

/// Injector that records what it was asked to send
#[derive(Debug, Default)]
pub struct RecordingInjector {
    replays: RefCell<Vec<Vec<BufferedKey>>>,
    typed: RefCell<Vec<String>>,
    fail: Cell<bool>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent injection report failure
    pub fn fail_injections(&self, fail: bool) {
        self.fail.set(fail);
    }

    /// Each replay call, in order
    pub fn replays(&self) -> Vec<Vec<BufferedKey>> {
        self.replays.borrow().clone()
    }

    /// All replayed virtual key codes flattened in injection order
    pub fn replayed_codes(&self) -> Vec<u32> {
        self.replays
            .borrow()
            .iter()
            .flat_map(|batch| batch.iter().map(|key| key.vk))
            .collect()
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.borrow().clone()
    }
}

impl KeyInjector for RecordingInjector {
    fn replay(&self, keys: &[BufferedKey]) -> Result<(), PlatformError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.replays.borrow_mut().push(keys.to_vec());
        if self.fail.get() {
            return Err(PlatformError::Injection {
                sent: 0,
                expected: keys.len() * 2,
            });
        }
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), PlatformError> {
        self.typed.borrow_mut().push(text.to_string());
        Ok(())
    }
}

/// Registrar that tracks registered ids and can refuse specific combos
#[derive(Debug, Default)]
pub struct RecordingRegistrar {
    registered: RefCell<BTreeSet<u32>>,
    refused: RefCell<Vec<HotkeyCombo>>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another application already owning `combo`
    pub fn refuse(&self, combo: HotkeyCombo) {
        self.refused.borrow_mut().push(combo);
    }

    pub fn registered(&self) -> Vec<u32> {
        self.registered.borrow().iter().copied().collect()
    }
}

impl HotkeyRegistrar for RecordingRegistrar {
    fn register(&self, system_id: u32, combo: &HotkeyCombo) -> Result<(), PlatformError> {
        if self.refused.borrow().contains(combo) {
            return Err(PlatformError::Register {
                system_id,
                reason: "combination already in use".to_string(),
            });
        }
        self.registered.borrow_mut().insert(system_id);
        Ok(())
    }

    fn unregister(&self, system_id: u32) -> Result<(), PlatformError> {
        if !self.registered.borrow_mut().remove(&system_id) {
            return Err(PlatformError::Unregister {
                system_id,
                reason: "not registered".to_string(),
            });
        }
        Ok(())
    }
}
