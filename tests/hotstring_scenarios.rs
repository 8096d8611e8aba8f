//! End-to-end recognition scenarios against the in-memory backend

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hotstringd::hotkey::{vk, Dispatcher, KeyEvent, ModifierState};
use hotstringd::platform::memory::{RecordingInjector, ScriptedKeyboard};
use hotstringd::state::State;
use hotstringd::Hotstring;

struct Session {
    dispatcher: Dispatcher<ScriptedKeyboard, RecordingInjector>,
    fired: Arc<AtomicUsize>,
    start: Instant,
}

impl Session {
    fn new(trigger: &str, mods: [bool; 4]) -> Self {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let hotstring = Hotstring::new("scenario", mods, trigger, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
        .with_threshold(Duration::from_millis(2000));

        let mut dispatcher = Dispatcher::new(ScriptedKeyboard::new(), RecordingInjector::new());
        dispatcher.insert(1, hotstring);
        Self {
            dispatcher,
            fired,
            start: Instant::now(),
        }
    }

    /// Press a letter at `at_ms` after the session start
    fn press(&mut self, c: char, at_ms: u64) -> bool {
        let code = vk::from_letter(c).unwrap();
        self.key(KeyEvent::down(code, code), at_ms)
    }

    fn key(&mut self, event: KeyEvent, at_ms: u64) -> bool {
        self.dispatcher
            .handle_at(&event, self.start + Duration::from_millis(at_ms))
    }

    fn hold(&self, modifiers: ModifierState) {
        self.dispatcher.keyboard().set_modifiers(modifiers);
    }

    fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    fn replayed(&self) -> String {
        self.dispatcher
            .injector()
            .replayed_codes()
            .into_iter()
            .filter_map(char::from_u32)
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }

    fn state(&self) -> State {
        self.dispatcher.get(1).unwrap().state()
    }
}

#[test]
fn scenario_a_trigger_typed_in_time_fires_once() {
    let mut s = Session::new("btw", [false; 4]);

    assert!(s.press('b', 0));
    assert!(s.press('t', 200));
    assert!(s.press('w', 450));

    assert_eq!(s.fired(), 1);
    assert_eq!(s.replayed(), "");
    assert_eq!(s.state(), State::Idle);
}

#[test]
fn scenario_b_divergent_key_replays_everything_in_order() {
    let mut s = Session::new("btw", [false; 4]);

    assert!(s.press('b', 0));
    assert!(s.press('t', 100));
    assert!(s.press('x', 200));

    assert_eq!(s.replayed(), "btx");
    assert_eq!(s.fired(), 0);
    assert_eq!(s.state(), State::Idle);
}

#[test]
fn scenario_c_timeout_replays_then_evaluates_key_fresh() {
    let mut s = Session::new("btw", [false; 4]);

    assert!(s.press('b', 0));
    assert!(!s.press('t', 2500));

    assert_eq!(s.replayed(), "b");
    assert_eq!(s.fired(), 0);
    assert_eq!(s.state(), State::Idle);
}

#[test]
fn scenario_d_control_trigger_fires_with_control_held() {
    let mut s = Session::new("hi", [true, false, false, false]);

    s.hold(ModifierState::control());
    assert!(!s.key(KeyEvent::down(vk::LCONTROL, 0x1D), 0));
    assert!(s.press('h', 50));
    assert!(s.press('i', 120));

    assert_eq!(s.fired(), 1);
    assert_eq!(s.replayed(), "");
}

#[test]
fn scenario_e_control_trigger_ignored_without_control() {
    let mut s = Session::new("hi", [true, false, false, false]);

    assert!(!s.press('h', 0));
    assert_eq!(s.state(), State::Idle);
    assert!(!s.press('i', 50));
    assert_eq!(s.state(), State::Idle);

    assert_eq!(s.fired(), 0);
    assert_eq!(s.replayed(), "");
}

#[test]
fn divergence_at_each_position_replays_matched_prefix_plus_breaking_key() {
    let trigger = "hello";
    for k in 1..trigger.len() {
        let mut s = Session::new(trigger, [false; 4]);
        for (i, c) in trigger[..k].chars().enumerate() {
            assert!(s.press(c, i as u64 * 10));
        }
        // 'z' breaks the prefix relation at position k
        assert!(s.press('z', 100));

        assert_eq!(s.replayed(), format!("{}z", &trigger[..k]));
        assert_eq!(s.fired(), 0);
    }
}

#[test]
fn non_letter_divergence_replays_only_matched_keys() {
    let mut s = Session::new("btw", [false; 4]);

    assert!(s.press('b', 0));
    assert!(s.press('t', 10));
    assert!(!s.key(KeyEvent::down(vk::SPACE, 0x39), 20));

    assert_eq!(s.replayed(), "bt");
}

#[test]
fn consecutive_failures_leave_matcher_ready() {
    let mut s = Session::new("btw", [false; 4]);

    s.press('b', 0);
    s.press('x', 10);
    s.press('b', 20);
    s.press('y', 30);
    assert_eq!(s.state(), State::Idle);
    assert_eq!(s.dispatcher.get(1).unwrap().prefix(), "");
    assert_eq!(s.replayed(), "bxby");

    assert!(s.press('b', 40));
    assert!(s.press('t', 50));
    assert!(s.press('w', 60));
    assert_eq!(s.fired(), 1);
}

#[test]
fn modifier_presses_never_move_the_buffer() {
    let mut s = Session::new("btw", [false; 4]);

    assert!(s.press('b', 0));
    for code in [vk::LCONTROL, vk::RCONTROL, vk::LSHIFT, vk::LMENU, vk::RWIN] {
        assert!(!s.key(KeyEvent::down(code, 0), 10));
        assert!(!s.key(KeyEvent::up(code, 0), 11));
    }
    assert_eq!(s.dispatcher.get(1).unwrap().prefix(), "b");

    assert!(s.press('t', 20));
    assert!(s.press('w', 30));
    assert_eq!(s.fired(), 1);
    assert_eq!(s.replayed(), "");
}

#[test]
fn trigger_match_ignores_trailing_input() {
    let mut s = Session::new("btw", [false; 4]);

    for (i, c) in "btwx".chars().enumerate() {
        s.press(c, i as u64 * 10);
    }
    // 'x' arrives after the match and passes through untouched
    assert_eq!(s.fired(), 1);
    assert_eq!(s.replayed(), "");
    assert_eq!(s.state(), State::Idle);
}
