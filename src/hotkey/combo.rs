//! Key-combination hotkeys and their system id allocation
//!
//! A [`Hotkey`] binds a [`HotkeyCombo`] to an [`Action`]. Registering it with
//! the OS requires a numeric id, handed out by a [`SystemIdPool`] owned by the
//! [`HotkeyTable`] that manages hotkey lifecycles.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::keys::ModifierState;
use crate::action::Action;
use crate::platform::{HotkeyRegistrar, PlatformError};

/// Application hotkey ids must lie in `0x0000..0xC000`
pub const SYSTEM_ID_LIMIT: u32 = 0xC000;

/// Errors that can occur while managing hotkeys
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyError {
    #[error("no free hotkey ids (limit {limit})")]
    IdsExhausted { limit: u32 },

    #[error("a hotkey with id '{0}' is already registered")]
    DuplicateId(String),

    #[error("no hotkey with id '{0}'")]
    UnknownId(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// A virtual key plus the exact modifier set that must accompany it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HotkeyCombo {
    pub keycode: u32,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub system: bool,
}

impl HotkeyCombo {
    pub fn new(keycode: u32, modifiers: ModifierState) -> Self {
        Self {
            keycode,
            ctrl: modifiers.control,
            alt: modifiers.alt,
            shift: modifiers.shift,
            system: modifiers.system,
        }
    }

    pub fn modifiers(&self) -> ModifierState {
        ModifierState {
            control: self.ctrl,
            alt: self.alt,
            shift: self.shift,
            system: self.system,
        }
    }
}

impl std::fmt::Display for HotkeyCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let modifiers = self.modifiers();
        if modifiers.is_empty() {
            write!(f, "vk {:#04x}", self.keycode)
        } else {
            write!(f, "{}+vk {:#04x}", modifiers, self.keycode)
        }
    }
}

/// Bounded pool of reusable system ids.
///
/// Freed ids are reused (smallest first) before new ones are issued.
#[derive(Debug)]
pub struct SystemIdPool {
    limit: u32,
    next: u32,
    freed: BTreeSet<u32>,
}

impl SystemIdPool {
    pub fn new() -> Self {
        Self::with_limit(SYSTEM_ID_LIMIT)
    }

    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            next: 0,
            freed: BTreeSet::new(),
        }
    }

    pub fn acquire(&mut self) -> Result<u32, HotkeyError> {
        if let Some(id) = self.freed.pop_first() {
            return Ok(id);
        }
        if self.next >= self.limit {
            return Err(HotkeyError::IdsExhausted { limit: self.limit });
        }
        let id = self.next;
        self.next += 1;
        Ok(id)
    }

    /// Return an id to the pool. Ids never issued are ignored.
    pub fn release(&mut self, id: u32) {
        if id < self.next {
            self.freed.insert(id);
        }
    }

    /// Number of ids currently handed out
    pub fn in_use(&self) -> usize {
        self.next as usize - self.freed.len()
    }
}

impl Default for SystemIdPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A named hotkey combination bound to an action
pub struct Hotkey {
    id: String,
    system_id: Option<u32>,
    combo: HotkeyCombo,
    action: Box<dyn Action>,
}

impl Hotkey {
    pub fn new(id: impl Into<String>, combo: HotkeyCombo, action: impl Action + 'static) -> Self {
        Self {
            id: id.into(),
            system_id: None,
            combo,
            action: Box::new(action),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The id assigned by the pool while registered
    pub fn system_id(&self) -> Option<u32> {
        self.system_id
    }

    pub fn combo(&self) -> &HotkeyCombo {
        &self.combo
    }

    pub fn is_registered(&self) -> bool {
        self.system_id.is_some()
    }

    /// Register with the OS. Already registered hotkeys are left alone.
    pub fn register<R: HotkeyRegistrar + ?Sized>(
        &mut self,
        pool: &mut SystemIdPool,
        registrar: &R,
    ) -> Result<u32, HotkeyError> {
        if let Some(system_id) = self.system_id {
            return Ok(system_id);
        }

        let system_id = pool.acquire()?;
        if let Err(e) = registrar.register(system_id, &self.combo) {
            pool.release(system_id);
            return Err(e.into());
        }

        debug!(id = %self.id, system_id, combo = %self.combo, "hotkey registered");
        self.system_id = Some(system_id);
        Ok(system_id)
    }

    pub fn unregister<R: HotkeyRegistrar + ?Sized>(&mut self, pool: &mut SystemIdPool, registrar: &R) {
        let Some(system_id) = self.system_id.take() else {
            return;
        };
        if let Err(e) = registrar.unregister(system_id) {
            warn!(id = %self.id, error = %e, "failed to unregister hotkey");
        }
        pool.release(system_id);
        debug!(id = %self.id, system_id, "hotkey unregistered");
    }

    /// Invoke the action directly
    pub fn trigger(&self) {
        self.action.invoke();
    }
}

impl std::fmt::Debug for Hotkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hotkey")
            .field("id", &self.id)
            .field("system_id", &self.system_id)
            .field("combo", &self.combo)
            .finish_non_exhaustive()
    }
}

/// Registered hotkeys, keyed by system id
#[derive(Debug, Default)]
pub struct HotkeyTable {
    pool: SystemIdPool,
    hotkeys: HashMap<u32, Hotkey>,
}

impl HotkeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(pool: SystemIdPool) -> Self {
        Self {
            pool,
            hotkeys: HashMap::new(),
        }
    }

    pub fn insert<R: HotkeyRegistrar + ?Sized>(
        &mut self,
        mut hotkey: Hotkey,
        registrar: &R,
    ) -> Result<u32, HotkeyError> {
        if self.hotkeys.values().any(|h| h.id() == hotkey.id()) {
            return Err(HotkeyError::DuplicateId(hotkey.id().to_string()));
        }
        let system_id = hotkey.register(&mut self.pool, registrar)?;
        info!(id = %hotkey.id(), combo = %hotkey.combo(), "hotkey active");
        self.hotkeys.insert(system_id, hotkey);
        Ok(system_id)
    }

    pub fn remove<R: HotkeyRegistrar + ?Sized>(&mut self, id: &str, registrar: &R) -> Result<Hotkey, HotkeyError> {
        let system_id = self
            .hotkeys
            .iter()
            .find(|(_, h)| h.id() == id)
            .map(|(system_id, _)| *system_id)
            .ok_or_else(|| HotkeyError::UnknownId(id.to_string()))?;

        let mut hotkey = self
            .hotkeys
            .remove(&system_id)
            .ok_or_else(|| HotkeyError::UnknownId(id.to_string()))?;
        hotkey.unregister(&mut self.pool, registrar);
        Ok(hotkey)
    }

    /// Dispatch a system hotkey notification. Returns false for unknown ids.
    pub fn trigger(&self, system_id: u32) -> bool {
        match self.hotkeys.get(&system_id) {
            Some(hotkey) => {
                debug!(id = %hotkey.id(), "hotkey pressed");
                hotkey.trigger();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.hotkeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotkeys.is_empty()
    }

    /// Unregister everything
    pub fn clear<R: HotkeyRegistrar + ?Sized>(&mut self, registrar: &R) {
        for (_, mut hotkey) in self.hotkeys.drain() {
            hotkey.unregister(&mut self.pool, registrar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::vk;
    use crate::platform::memory::RecordingRegistrar;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctrl_k() -> HotkeyCombo {
        HotkeyCombo::new(0x4B, ModifierState::control())
    }

    #[test]
    fn test_combo_equality() {
        assert_eq!(ctrl_k(), ctrl_k());
        assert_ne!(ctrl_k(), HotkeyCombo::new(0x4B, ModifierState::shift()));
        assert_ne!(ctrl_k(), HotkeyCombo::new(vk::A, ModifierState::control()));
    }

    #[test]
    fn test_pool_prefers_freed_ids() {
        let mut pool = SystemIdPool::new();
        assert_eq!(pool.acquire().unwrap(), 0);
        assert_eq!(pool.acquire().unwrap(), 1);
        assert_eq!(pool.acquire().unwrap(), 2);

        pool.release(1);
        pool.release(0);
        assert_eq!(pool.acquire().unwrap(), 0);
        assert_eq!(pool.acquire().unwrap(), 1);
        assert_eq!(pool.acquire().unwrap(), 3);
        assert_eq!(pool.in_use(), 4);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = SystemIdPool::with_limit(2);
        pool.acquire().unwrap();
        pool.acquire().unwrap();
        assert_eq!(pool.acquire(), Err(HotkeyError::IdsExhausted { limit: 2 }));

        pool.release(1);
        assert_eq!(pool.acquire().unwrap(), 1);
    }

    #[test]
    fn test_pool_ignores_unissued_release() {
        let mut pool = SystemIdPool::new();
        pool.release(7);
        assert_eq!(pool.acquire().unwrap(), 0);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registrar = RecordingRegistrar::new();
        let mut pool = SystemIdPool::new();
        let mut hotkey = Hotkey::new("pause", ctrl_k(), || {});

        let first = hotkey.register(&mut pool, &registrar).unwrap();
        let second = hotkey.register(&mut pool, &registrar).unwrap();
        assert_eq!(first, second);
        assert_eq!(registrar.registered(), vec![first]);
        assert!(hotkey.is_registered());

        hotkey.unregister(&mut pool, &registrar);
        assert!(!hotkey.is_registered());
        assert!(registrar.registered().is_empty());
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_refused_registration_releases_id() {
        let registrar = RecordingRegistrar::new();
        registrar.refuse(ctrl_k());
        let mut pool = SystemIdPool::new();
        let mut hotkey = Hotkey::new("pause", ctrl_k(), || {});

        let err = hotkey.register(&mut pool, &registrar).unwrap_err();
        assert!(matches!(err, HotkeyError::Platform(PlatformError::Register { .. })));
        assert!(!hotkey.is_registered());
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_exhausted_pool_is_a_registration_failure() {
        let registrar = RecordingRegistrar::new();
        let mut table = HotkeyTable::with_pool(SystemIdPool::with_limit(1));

        table.insert(Hotkey::new("a", ctrl_k(), || {}), &registrar).unwrap();
        let err = table
            .insert(Hotkey::new("b", HotkeyCombo::new(vk::A, ModifierState::control()), || {}), &registrar)
            .unwrap_err();
        assert_eq!(err, HotkeyError::IdsExhausted { limit: 1 });
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_trigger_and_remove() {
        let registrar = RecordingRegistrar::new();
        let mut table = HotkeyTable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let system_id = table
            .insert(
                Hotkey::new("pause", ctrl_k(), move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                &registrar,
            )
            .unwrap();

        assert!(table.trigger(system_id));
        assert!(!table.trigger(system_id + 1));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(
            table.insert(Hotkey::new("pause", ctrl_k(), || {}), &registrar).unwrap_err(),
            HotkeyError::DuplicateId("pause".to_string())
        );

        let removed = table.remove("pause", &registrar).unwrap();
        assert!(!removed.is_registered());
        assert!(table.is_empty());
        assert!(registrar.registered().is_empty());
        assert!(matches!(table.remove("pause", &registrar), Err(HotkeyError::UnknownId(_))));
    }

    #[test]
    fn test_clear_unregisters_everything() {
        let registrar = RecordingRegistrar::new();
        let mut table = HotkeyTable::new();
        table.insert(Hotkey::new("a", ctrl_k(), || {}), &registrar).unwrap();
        table
            .insert(Hotkey::new("b", HotkeyCombo::new(vk::A, ModifierState::default()), || {}), &registrar)
            .unwrap();

        table.clear(&registrar);
        assert!(table.is_empty());
        assert!(registrar.registered().is_empty());
    }
}
