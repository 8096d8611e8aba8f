//! Virtual key definitions and modifier state tracking
//!
//! Provides the Win32 virtual key codes the recognizer cares about, the
//! low-level hook flag bits, and a struct for the state of the four
//! modifier keys (Control, Alt, Shift, System).

/// Virtual key codes (Win32 `VK_*` values)
pub mod vk {
    /// Shift (either side)
    pub const SHIFT: u32 = 0x10;
    /// Control (either side)
    pub const CONTROL: u32 = 0x11;
    /// Alt (either side)
    pub const MENU: u32 = 0x12;
    /// Caps Lock
    pub const CAPITAL: u32 = 0x14;
    /// Left Windows key
    pub const LWIN: u32 = 0x5B;
    /// Right Windows key
    pub const RWIN: u32 = 0x5C;
    pub const LSHIFT: u32 = 0xA0;
    pub const RSHIFT: u32 = 0xA1;
    pub const LCONTROL: u32 = 0xA2;
    pub const RCONTROL: u32 = 0xA3;
    pub const LMENU: u32 = 0xA4;
    pub const RMENU: u32 = 0xA5;

    /// `A`..`Z` share their ASCII upper-case values
    pub const A: u32 = 0x41;
    pub const Z: u32 = 0x5A;
    pub const SPACE: u32 = 0x20;
    pub const DIGIT_1: u32 = 0x31;

    /// Virtual key code for an ASCII letter, if it is one
    pub fn from_letter(c: char) -> Option<u32> {
        if c.is_ascii_alphabetic() {
            Some(c.to_ascii_uppercase() as u32)
        } else {
            None
        }
    }

    /// Whether the code names one of the four modifier keys, in either its
    /// generic or left/right form
    pub fn is_modifier(code: u32) -> bool {
        matches!(
            code,
            SHIFT | CONTROL | MENU | LWIN | RWIN | LSHIFT | RSHIFT | LCONTROL | RCONTROL | LMENU | RMENU
        )
    }
}

/// Flag bits carried by a low-level keyboard event (`KBDLLHOOKSTRUCT::flags`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFlags(pub u32);

impl KeyFlags {
    /// Key release transition
    pub const UP: u32 = 0x80;

    pub fn is_key_up(self) -> bool {
        self.0 & Self::UP != 0
    }
}

/// One intercepted key transition as delivered by the event source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Virtual key code
    pub vk: u32,
    /// Hardware scan code
    pub scan: u32,
    /// Original event flags
    pub flags: KeyFlags,
}

impl KeyEvent {
    /// A key-down event with no flags set
    pub fn down(vk: u32, scan: u32) -> Self {
        Self {
            vk,
            scan,
            flags: KeyFlags::default(),
        }
    }

    /// A key-up event
    pub fn up(vk: u32, scan: u32) -> Self {
        Self {
            vk,
            scan,
            flags: KeyFlags(KeyFlags::UP),
        }
    }
}

/// A keystroke captured during an observation, kept for replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedKey {
    pub vk: u32,
    pub scan: u32,
    pub flags: KeyFlags,
}

impl From<&BufferedKey> for KeyEvent {
    fn from(key: &BufferedKey) -> Self {
        Self {
            vk: key.vk,
            scan: key.scan,
            flags: key.flags,
        }
    }
}

impl From<&KeyEvent> for BufferedKey {
    fn from(event: &KeyEvent) -> Self {
        Self {
            vk: event.vk,
            scan: event.scan,
            flags: event.flags,
        }
    }
}

/// Tracks which modifier keys are currently pressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierState {
    /// Control key is held
    pub control: bool,
    /// Alt key is held
    pub alt: bool,
    /// Shift key is held
    pub shift: bool,
    /// Windows/System key is held
    pub system: bool,
}

impl ModifierState {
    /// Build from the `[ctrl, alt, shift, system]` array used at registration
    pub fn from_array(mods: [bool; 4]) -> Self {
        Self {
            control: mods[0],
            alt: mods[1],
            shift: mods[2],
            system: mods[3],
        }
    }

    /// Only Control held
    pub fn control() -> Self {
        Self {
            control: true,
            ..Self::default()
        }
    }

    /// Only Shift held
    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }

    /// Check if all modifiers are released
    pub fn is_empty(&self) -> bool {
        !self.control && !self.alt && !self.shift && !self.system
    }
}

impl std::fmt::Display for ModifierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.control {
            parts.push("Ctrl");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        if self.system {
            parts.push("Win");
        }
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state() {
        let state = ModifierState::default();
        assert!(state.is_empty());
        assert_eq!(state.to_string(), "none");
    }

    #[test]
    fn test_from_array_order() {
        let state = ModifierState::from_array([true, false, true, false]);
        assert!(state.control);
        assert!(!state.alt);
        assert!(state.shift);
        assert!(!state.system);
        assert_eq!(state.to_string(), "Ctrl+Shift");
    }

    #[test]
    fn test_modifier_codes() {
        for code in [vk::SHIFT, vk::LCONTROL, vk::RMENU, vk::LWIN, vk::RWIN] {
            assert!(vk::is_modifier(code));
        }
        assert!(!vk::is_modifier(vk::A));
        assert!(!vk::is_modifier(vk::CAPITAL));
    }

    #[test]
    fn test_letter_codes() {
        assert_eq!(vk::from_letter('b'), Some(0x42));
        assert_eq!(vk::from_letter('B'), Some(0x42));
        assert_eq!(vk::from_letter('1'), None);
    }

    #[test]
    fn test_key_flags() {
        assert!(KeyEvent::up(vk::A, 0x1E).flags.is_key_up());
        assert!(!KeyEvent::down(vk::A, 0x1E).flags.is_key_up());
        // the extended-key bit alone is not a release
        assert!(!KeyFlags(0x01).is_key_up());
    }
}
