//! Key classification and modifier gating
//!
//! Both are pure queries over the live keyboard state. Callers filter the
//! modifier keys themselves before classifying.

use super::keys::{KeyEvent, ModifierState};
use crate::platform::KeyboardState;

/// Resolve a key press to a lower-case ASCII letter.
///
/// Anything that does not translate to exactly one alphabetic character
/// yields `None`; that is an ordinary outcome, not an error.
pub fn classify<K: KeyboardState + ?Sized>(keyboard: &K, event: &KeyEvent) -> Option<char> {
    keyboard
        .translate(event.vk, event.scan)
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
}

/// Whether the live modifier state is exactly `required`: each of the four
/// modifiers pressed iff it is required.
pub fn modifiers_match<K: KeyboardState + ?Sized>(keyboard: &K, required: &ModifierState) -> bool {
    keyboard.modifiers() == *required
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::vk;
    use crate::platform::memory::ScriptedKeyboard;

    #[test]
    fn test_letters_are_lowered() {
        let keyboard = ScriptedKeyboard::new();
        keyboard.set_modifiers(ModifierState::shift());
        assert_eq!(classify(&keyboard, &KeyEvent::down(vk::A, 0x1E)), Some('a'));
    }

    #[test]
    fn test_non_letters_have_no_character() {
        let keyboard = ScriptedKeyboard::new();
        assert_eq!(classify(&keyboard, &KeyEvent::down(vk::DIGIT_1, 0x02)), None);
        assert_eq!(classify(&keyboard, &KeyEvent::down(vk::SPACE, 0x39)), None);
        assert_eq!(classify(&keyboard, &KeyEvent::down(vk::CAPITAL, 0x3A)), None);
    }

    #[test]
    fn test_gate_requires_exact_state() {
        let keyboard = ScriptedKeyboard::new();
        let ctrl = ModifierState::control();

        assert!(modifiers_match(&keyboard, &ModifierState::default()));
        assert!(!modifiers_match(&keyboard, &ctrl));

        keyboard.set_modifiers(ctrl);
        assert!(modifiers_match(&keyboard, &ctrl));

        keyboard.set_modifiers(ModifierState {
            control: true,
            shift: true,
            ..ModifierState::default()
        });
        assert!(!modifiers_match(&keyboard, &ctrl));
    }
}
