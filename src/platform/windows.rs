//! Win32 backend
//!
//! Live key state comes from `GetAsyncKeyState`, because the thread key
//! state is stale inside a low-level hook. Every synthetic event is tagged
//! with [`SYNTHETIC_MARKER`] so the hook can recognise and ignore it.

use std::mem::size_of;

use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, GetKeyState, RegisterHotKey, SendInput, ToUnicode, UnregisterHotKey, HOT_KEY_MODIFIERS,
    INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOD_ALT,
    MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, MOD_WIN, VIRTUAL_KEY,
};

use super::{HotkeyRegistrar, KeyInjector, KeyboardState, PlatformError};
use crate::hotkey::{vk, BufferedKey, HotkeyCombo, ModifierState};

/// `dwExtraInfo` value stamped on every injected event ("HSTD")
pub const SYNTHETIC_MARKER: usize = 0x4853_5444;

/// Leave the keyboard state untouched when translating (Windows 10 1607+)
const TO_UNICODE_NO_STATE_CHANGE: u32 = 0x4;

fn is_pressed(code: u32) -> bool {
    (unsafe { GetAsyncKeyState(code as i32) } as u16 & 0x8000) != 0
}

fn is_toggled(code: u32) -> bool {
    (unsafe { GetKeyState(code as i32) } as u16 & 0x0001) != 0
}

/// Live keyboard state of the interactive desktop
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Keyboard;

impl KeyboardState for Win32Keyboard {
    fn modifiers(&self) -> ModifierState {
        ModifierState {
            control: is_pressed(vk::CONTROL),
            alt: is_pressed(vk::MENU),
            shift: is_pressed(vk::SHIFT),
            system: is_pressed(vk::LWIN) || is_pressed(vk::RWIN),
        }
    }

    fn translate(&self, code: u32, scan: u32) -> Option<char> {
        // only Shift and Caps Lock shape the character; Ctrl/Alt are
        // judged separately and would turn letters into control codes
        let mut state = [0u8; 256];
        if is_pressed(vk::SHIFT) {
            state[vk::SHIFT as usize] = 0x80;
        }
        if is_toggled(vk::CAPITAL) {
            state[vk::CAPITAL as usize] = 0x01;
        }

        let mut buffer = [0u16; 4];
        let written = unsafe { ToUnicode(code, scan, Some(&state), &mut buffer, TO_UNICODE_NO_STATE_CHANGE) };
        if written != 1 {
            return None;
        }
        char::from_u32(u32::from(buffer[0]))
    }
}

fn keyboard_input(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: SYNTHETIC_MARKER,
            },
        },
    }
}

fn send(inputs: &[INPUT]) -> Result<(), PlatformError> {
    if inputs.is_empty() {
        return Ok(());
    }
    let sent = unsafe { SendInput(inputs, size_of::<INPUT>() as i32) } as usize;
    if sent != inputs.len() {
        return Err(PlatformError::Injection {
            sent,
            expected: inputs.len(),
        });
    }
    Ok(())
}

/// `SendInput` based injector
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Injector;

impl KeyInjector for Win32Injector {
    fn replay(&self, keys: &[BufferedKey]) -> Result<(), PlatformError> {
        let mut inputs = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            inputs.push(keyboard_input(key.vk as u16, key.scan as u16, KEYBD_EVENT_FLAGS(0)));
            inputs.push(keyboard_input(key.vk as u16, key.scan as u16, KEYEVENTF_KEYUP));
        }
        send(&inputs)
    }

    fn type_text(&self, text: &str) -> Result<(), PlatformError> {
        let mut inputs = Vec::new();
        for unit in text.encode_utf16() {
            inputs.push(keyboard_input(0, unit, KEYEVENTF_UNICODE));
            inputs.push(keyboard_input(0, unit, KEYBD_EVENT_FLAGS(KEYEVENTF_UNICODE.0 | KEYEVENTF_KEYUP.0)));
        }
        send(&inputs)
    }
}

/// `RegisterHotKey` on the calling thread; `WM_HOTKEY` lands in its queue
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Registrar;

impl HotkeyRegistrar for Win32Registrar {
    fn register(&self, system_id: u32, combo: &HotkeyCombo) -> Result<(), PlatformError> {
        let mut modifiers = MOD_NOREPEAT.0;
        if combo.ctrl {
            modifiers |= MOD_CONTROL.0;
        }
        if combo.alt {
            modifiers |= MOD_ALT.0;
        }
        if combo.shift {
            modifiers |= MOD_SHIFT.0;
        }
        if combo.system {
            modifiers |= MOD_WIN.0;
        }

        unsafe { RegisterHotKey(None, system_id as i32, HOT_KEY_MODIFIERS(modifiers), combo.keycode) }.map_err(|e| {
            PlatformError::Register {
                system_id,
                reason: e.to_string(),
            }
        })
    }

    fn unregister(&self, system_id: u32) -> Result<(), PlatformError> {
        unsafe { UnregisterHotKey(None, system_id as i32) }.map_err(|e| PlatformError::Unregister {
            system_id,
            reason: e.to_string(),
        })
    }
}
