//! Hotstring matching state machine
//!
//! Alternates between Idle and Observing. While observing, candidate
//! keystrokes are suppressed and buffered; a completed trigger fires the
//! action and discards the buffer, anything else replays the buffer so the
//! user's typing reaches the focused application unchanged.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::action::Action;
use crate::hotkey::{classify, modifiers_match, vk, BufferedKey, KeyEvent, ModifierState};
use crate::platform::{KeyInjector, KeyboardState};

/// Default time budget for typing a whole trigger
pub const DEFAULT_THRESHOLD: Duration = Duration::from_millis(2000);

/// Errors in a trigger definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("trigger string is empty")]
    Empty,

    #[error("trigger contains non-alphabetic character {0:?}")]
    NotAlphabetic(char),
}

/// The two states of a matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Waiting for the trigger's first character
    #[default]
    Idle,
    /// A candidate prefix has been typed and is being held back
    Observing,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::Observing => write!(f, "Observing"),
        }
    }
}

/// Why an observation was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The time budget ran out before the next key
    Timeout,
    /// A key that is not a letter was pressed
    NotALetter,
    /// Modifier state no longer matches the trigger's
    Modifiers,
    /// The typed prefix diverged from the trigger
    Mismatch,
    /// The watch was reset from outside
    Reset,
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            FailReason::Timeout => "timeout",
            FailReason::NotALetter => "not a letter",
            FailReason::Modifiers => "modifier mismatch",
            FailReason::Mismatch => "mismatch",
            FailReason::Reset => "reset",
        };
        f.write_str(reason)
    }
}

/// Lower-cased trigger plus the exact modifier set it must be typed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    trigger: String,
    modifiers: ModifierState,
}

impl TriggerSpec {
    pub fn new(trigger: &str, modifiers: ModifierState) -> Result<Self, TriggerError> {
        if trigger.is_empty() {
            return Err(TriggerError::Empty);
        }
        if let Some(c) = trigger.chars().find(|c| !c.is_ascii_alphabetic()) {
            return Err(TriggerError::NotAlphabetic(c));
        }
        Ok(Self {
            trigger: trigger.to_ascii_lowercase(),
            modifiers,
        })
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn modifiers(&self) -> &ModifierState {
        &self.modifiers
    }

    fn first(&self) -> char {
        // non-empty ASCII by construction
        self.trigger.as_bytes()[0] as char
    }
}

/// Counters over the lifetime of a watch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Observations that completed the trigger
    pub fired: u64,
    /// Observations that were abandoned
    pub failed: u64,
    /// Keystrokes released by failed observations, counting only
    /// releases the injector accepted
    pub replayed_keys: u64,
}

/// A single hotstring watch
pub struct Hotstring {
    name: String,
    spec: TriggerSpec,
    action: Box<dyn Action>,
    threshold: Duration,
    /// Current state
    state: State,
    /// Lower-cased characters matched so far
    prefix: String,
    /// Suppressed keystrokes, parallel to `prefix`
    buffered: Vec<BufferedKey>,
    /// Time when the current observation started
    observation_started_at: Option<Instant>,
    /// Why the most recent key ended an observation, if it did
    last_failure: Option<FailReason>,
    stats: MatchStats,
}

impl Hotstring {
    /// Create a watch. `mods` is `[ctrl, alt, shift, system]`.
    pub fn new(
        name: impl Into<String>,
        mods: [bool; 4],
        trigger: &str,
        action: impl Action + 'static,
    ) -> Result<Self, TriggerError> {
        let spec = TriggerSpec::new(trigger, ModifierState::from_array(mods))?;
        let len = spec.trigger().len();

        Ok(Self {
            name: name.into(),
            spec,
            action: Box::new(action),
            threshold: DEFAULT_THRESHOLD,
            state: State::Idle,
            // sized once so observing never reallocates
            prefix: String::with_capacity(len + 1),
            buffered: Vec::with_capacity(len + 1),
            observation_started_at: None,
            last_failure: None,
            stats: MatchStats::default(),
        })
    }

    /// Override the time budget for a whole trigger
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> &str {
        self.spec.trigger()
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Get the current state
    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_observing(&self) -> bool {
        self.state == State::Observing
    }

    /// The prefix matched so far (empty when Idle)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn stats(&self) -> MatchStats {
        self.stats
    }

    /// Failure caused by the last processed key, if any
    pub fn last_failure(&self) -> Option<FailReason> {
        self.last_failure
    }

    /// Process a key event at the current time. Returns whether the event
    /// was consumed and must not reach other applications.
    pub fn process_key<K, I>(&mut self, event: &KeyEvent, keyboard: &K, injector: &I) -> bool
    where
        K: KeyboardState + ?Sized,
        I: KeyInjector + ?Sized,
    {
        self.process_key_at(event, Instant::now(), keyboard, injector)
    }

    /// Process a key event observed at `now`
    pub fn process_key_at<K, I>(&mut self, event: &KeyEvent, now: Instant, keyboard: &K, injector: &I) -> bool
    where
        K: KeyboardState + ?Sized,
        I: KeyInjector + ?Sized,
    {
        self.last_failure = None;
        if event.flags.is_key_up() || vk::is_modifier(event.vk) {
            return false;
        }

        if self.is_observing() && self.is_expired(now) {
            self.fail(FailReason::Timeout, injector);
        }

        let Some(c) = classify(keyboard, event) else {
            if self.is_observing() {
                self.fail(FailReason::NotALetter, injector);
            }
            return false;
        };

        match self.state {
            State::Idle => {
                if c != self.spec.first() || !modifiers_match(keyboard, self.spec.modifiers()) {
                    return false;
                }
                self.start(event, c, now);
                true
            }
            State::Observing => {
                if !modifiers_match(keyboard, self.spec.modifiers()) {
                    // consumed, so it has to go out with the replay
                    self.buffered.push(BufferedKey::from(event));
                    self.fail(FailReason::Modifiers, injector);
                    return true;
                }
                self.advance(event, c, injector);
                true
            }
        }
    }

    /// Abandon any observation in progress, replaying what was held back
    pub fn reset<I: KeyInjector + ?Sized>(&mut self, injector: &I) {
        if self.is_observing() {
            self.fail(FailReason::Reset, injector);
        }
    }

    /// Drop any observation without replaying it and restore `stats`.
    /// Undoes a trial run whose outcome was not kept.
    pub(crate) fn rollback(&mut self, stats: MatchStats) {
        self.clear();
        self.last_failure = None;
        self.stats = stats;
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.observation_started_at
            .map(|start| now.saturating_duration_since(start) > self.threshold)
            .unwrap_or(false)
    }

    fn start(&mut self, event: &KeyEvent, c: char, now: Instant) {
        self.state = State::Observing;
        self.prefix.clear();
        self.buffered.clear();
        self.observation_started_at = Some(now);

        debug!(watch = %self.name, "observation started");
        self.push(event, c);

        if self.prefix == self.spec.trigger() {
            self.succeed();
        }
    }

    fn advance<I: KeyInjector + ?Sized>(&mut self, event: &KeyEvent, c: char, injector: &I) {
        self.push(event, c);

        let trigger = self.spec.trigger();
        let diverged = self.prefix.len() > trigger.len() || !trigger.starts_with(self.prefix.as_str());
        let complete = self.prefix == trigger;

        if diverged {
            self.fail(FailReason::Mismatch, injector);
        } else if complete {
            self.succeed();
        } else {
            debug!(watch = %self.name, prefix = %self.prefix, "observation continues");
        }
    }

    fn push(&mut self, event: &KeyEvent, c: char) {
        self.prefix.push(c);
        self.buffered.push(BufferedKey::from(event));
    }

    fn succeed(&mut self) {
        let duration_ms = self.elapsed_ms();
        self.clear();
        self.stats.fired += 1;

        info!(watch = %self.name, duration_ms, "hotstring matched");
        self.action.invoke();
    }

    fn fail<I: KeyInjector + ?Sized>(&mut self, reason: FailReason, injector: &I) {
        debug!(
            watch = %self.name,
            %reason,
            prefix = %self.prefix,
            keys = self.buffered.len(),
            duration_ms = self.elapsed_ms(),
            "observation failed, replaying"
        );

        match injector.replay(&self.buffered) {
            Ok(()) => self.stats.replayed_keys += self.buffered.len() as u64,
            Err(e) => warn!(watch = %self.name, error = %e, "failed to replay buffered keys"),
        }

        self.stats.failed += 1;
        self.last_failure = Some(reason);
        self.clear();
    }

    fn clear(&mut self) {
        self.state = State::Idle;
        self.prefix.clear();
        self.buffered.clear();
        self.observation_started_at = None;
    }

    fn elapsed_ms(&self) -> u64 {
        self.observation_started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for Hotstring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hotstring")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("threshold", &self.threshold)
            .field("state", &self.state)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
