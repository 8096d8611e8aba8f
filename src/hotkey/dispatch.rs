//! Fan-out of the single system key stream to many hotstring watches
//!
//! The OS delivers one event stream; each registered [`Hotstring`] sees it
//! in registration order. A watch that starts observing takes the stream
//! exclusively until it returns to Idle, so every keystroke is buffered by
//! at most one watch at a time.
//!
//! When the active watch breaks on a letter, the keys it held are offered
//! to the other watches before anything is replayed. Triggers sharing a
//! prefix ("btw", "brb") therefore each get their chance.

use std::cell::RefCell;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::keys::{BufferedKey, KeyEvent};
use crate::platform::{KeyInjector, KeyboardState, PlatformError};
use crate::state::{FailReason, Hotstring};

/// Holds replays back so the dispatcher can decide where the keys go
struct Deferred<'a, I> {
    inner: &'a I,
    keys: RefCell<Vec<BufferedKey>>,
}

impl<'a, I: KeyInjector> Deferred<'a, I> {
    fn new(inner: &'a I) -> Self {
        Self {
            inner,
            keys: RefCell::new(Vec::new()),
        }
    }

    fn into_keys(self) -> Vec<BufferedKey> {
        self.keys.into_inner()
    }
}

impl<I: KeyInjector> KeyInjector for Deferred<'_, I> {
    fn replay(&self, keys: &[BufferedKey]) -> Result<(), PlatformError> {
        self.keys.borrow_mut().extend_from_slice(keys);
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), PlatformError> {
        self.inner.type_text(text)
    }
}

/// Handle identifying a registered watch
pub type WatchId = u64;

/// Registry of watches driven by one event source
pub struct Dispatcher<K, I> {
    keyboard: K,
    injector: I,
    watches: Vec<(WatchId, Hotstring)>,
    /// Watch currently observing, if any
    active: Option<WatchId>,
    enabled: bool,
}

impl<K: KeyboardState, I: KeyInjector> Dispatcher<K, I> {
    pub fn new(keyboard: K, injector: I) -> Self {
        Self {
            keyboard,
            injector,
            watches: Vec::new(),
            active: None,
            enabled: true,
        }
    }

    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    pub fn injector(&self) -> &I {
        &self.injector
    }

    /// Register a watch under `id`, replacing any watch with the same id
    pub fn insert(&mut self, id: WatchId, hotstring: Hotstring) {
        self.remove(id);
        info!(id, watch = %hotstring.name(), trigger = %hotstring.trigger(), "watch added");
        self.watches.push((id, hotstring));
    }

    /// Unregister a watch, replaying anything it was holding back
    pub fn remove(&mut self, id: WatchId) -> Option<Hotstring> {
        let index = self.position(id)?;
        let (_, mut hotstring) = self.watches.remove(index);
        hotstring.reset(&self.injector);
        if self.active == Some(id) {
            self.active = None;
        }
        info!(id, watch = %hotstring.name(), "watch removed");
        Some(hotstring)
    }

    pub fn get(&self, id: WatchId) -> Option<&Hotstring> {
        self.position(id).map(|index| &self.watches[index].1)
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Pause or resume recognition. Pausing abandons pending observations.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        if !enabled {
            self.reset_all();
        }
        self.enabled = enabled;
        info!(enabled, "recognition toggled");
    }

    /// Abandon every pending observation
    pub fn reset_all(&mut self) {
        for (_, hotstring) in &mut self.watches {
            hotstring.reset(&self.injector);
        }
        self.active = None;
    }

    /// Handle a key event at the current time; see [`Dispatcher::handle_at`]
    pub fn handle(&mut self, event: &KeyEvent) -> bool {
        self.handle_at(event, Instant::now())
    }

    /// Route one key event. Returns whether it was consumed.
    pub fn handle_at(&mut self, event: &KeyEvent, now: Instant) -> bool {
        if !self.enabled || event.flags.is_key_up() {
            return false;
        }

        let mut skip = None;
        if let Some(id) = self.active.take() {
            if let Some(index) = self.position(id) {
                let deferred = Deferred::new(&self.injector);
                let (_, hotstring) = &mut self.watches[index];
                let consumed = hotstring.process_key_at(event, now, &self.keyboard, &deferred);
                let observing = hotstring.is_observing();
                let broke_on_letter = matches!(
                    hotstring.last_failure(),
                    Some(FailReason::Mismatch | FailReason::Modifiers)
                );
                let held = deferred.into_keys();

                if observing {
                    // timed out and restarted on this key
                    self.active = Some(id);
                    self.replay(&held);
                    return consumed;
                }
                if broke_on_letter && self.hand_off(&held, now, index) {
                    return true;
                }
                self.replay(&held);
                if consumed {
                    return true;
                }
                // went back to Idle without claiming the key; others may
                skip = Some(index);
            }
        }

        self.offer(event, now, skip)
    }

    /// Feed `keys` to each other watch in turn, as if it had seen them
    /// typed. The first watch that fires on them, or consumes all of them
    /// and keeps observing, takes them over; anything it released along the
    /// way is replayed. Watches that do neither are rolled back untouched.
    fn hand_off(&mut self, keys: &[BufferedKey], now: Instant, skip: usize) -> bool {
        for index in 0..self.watches.len() {
            if index == skip {
                continue;
            }

            let deferred = Deferred::new(&self.injector);
            let (id, hotstring) = &mut self.watches[index];
            let before = hotstring.stats();

            let mut taken = 0;
            for key in keys {
                if !hotstring.process_key_at(&KeyEvent::from(key), now, &self.keyboard, &deferred) {
                    break;
                }
                taken += 1;
                if hotstring.stats().fired > before.fired {
                    break;
                }
            }

            let fired = hotstring.stats().fired > before.fired;
            let continues = taken == keys.len() && hotstring.is_observing();
            if !fired && !continues {
                hotstring.rollback(before);
                continue;
            }

            let id = *id;
            debug!(id, watch = %hotstring.name(), keys = keys.len(), "watch took over held keys");
            if continues {
                self.active = Some(id);
            }
            let mut released = deferred.into_keys();
            released.extend_from_slice(&keys[taken..]);
            self.replay(&released);
            return true;
        }
        false
    }

    fn replay(&self, keys: &[BufferedKey]) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.injector.replay(keys) {
            warn!(error = %e, keys = keys.len(), "failed to replay held keys");
        }
    }

    fn offer(&mut self, event: &KeyEvent, now: Instant, skip: Option<usize>) -> bool {
        for (index, (id, hotstring)) in self.watches.iter_mut().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if hotstring.process_key_at(event, now, &self.keyboard, &self.injector) {
                if hotstring.is_observing() {
                    debug!(id = *id, watch = %hotstring.name(), "watch took the key stream");
                    self.active = Some(*id);
                }
                return true;
            }
        }
        false
    }

    fn position(&self, id: WatchId) -> Option<usize> {
        self.watches.iter().position(|(watch_id, _)| *watch_id == id)
    }
}
