//! System-wide keyboard event source
//!
//! Installs a low-level keyboard hook on a dedicated thread that pumps its
//! own message loop. Key-downs are routed through a [`Dispatcher`] owned by
//! that thread; the verdict decides whether the key is swallowed or passed
//! down the hook chain. Everything else (adding watches, registering
//! hotkeys, stopping) arrives as a [`Command`] and is applied by the message
//! loop between hook callbacks, never from inside one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use super::combo::{Hotkey, HotkeyError, HotkeyTable};
use super::dispatch::{Dispatcher, WatchId};
use crate::platform::{HotkeyRegistrar, KeyInjector, KeyboardState};
use crate::state::Hotstring;

/// Errors that can occur in the keyboard hook
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("keyboard hook is already running")]
    AlreadyRunning,

    #[error("keyboard hook is not running")]
    NotRunning,

    #[error("failed to install keyboard hook: {0}")]
    Install(String),

    #[error("low-level keyboard hooks are not supported on this platform")]
    Unsupported,

    #[error("failed to spawn hook thread: {0}")]
    ThreadSpawn(String),

    #[error("hook thread exited before replying")]
    Disconnected,

    #[error(transparent)]
    Hotkey(#[from] HotkeyError),
}

/// Requests applied by the hook thread's message loop
pub enum Command {
    AddWatch(WatchId, Hotstring),
    RemoveWatch(WatchId),
    SetEnabled(bool),
    RegisterHotkey(Hotkey, SyncSender<Result<u32, HotkeyError>>),
    UnregisterHotkey(String, SyncSender<Result<(), HotkeyError>>),
    Stop,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::AddWatch(id, hotstring) => write!(f, "AddWatch({}, {})", id, hotstring.name()),
            Command::RemoveWatch(id) => write!(f, "RemoveWatch({})", id),
            Command::SetEnabled(enabled) => write!(f, "SetEnabled({})", enabled),
            Command::RegisterHotkey(hotkey, _) => write!(f, "RegisterHotkey({})", hotkey.id()),
            Command::UnregisterHotkey(id, _) => write!(f, "UnregisterHotkey({})", id),
            Command::Stop => write!(f, "Stop"),
        }
    }
}

/// Whether the message loop keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Everything the hook thread owns
pub struct HookState<K, I, R> {
    dispatcher: Dispatcher<K, I>,
    hotkeys: HotkeyTable,
    registrar: R,
}

impl<K, I, R> HookState<K, I, R>
where
    K: KeyboardState,
    I: KeyInjector,
    R: HotkeyRegistrar,
{
    pub fn new(dispatcher: Dispatcher<K, I>, registrar: R) -> Self {
        Self {
            dispatcher,
            hotkeys: HotkeyTable::new(),
            registrar,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<K, I> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<K, I> {
        &mut self.dispatcher
    }

    pub fn hotkeys(&self) -> &HotkeyTable {
        &self.hotkeys
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    /// Apply one command
    pub fn apply(&mut self, command: Command) -> Flow {
        debug!(?command, "applying hook command");
        match command {
            Command::AddWatch(id, hotstring) => self.dispatcher.insert(id, hotstring),
            Command::RemoveWatch(id) => {
                if self.dispatcher.remove(id).is_none() {
                    warn!(id, "no such watch");
                }
            }
            Command::SetEnabled(enabled) => self.dispatcher.set_enabled(enabled),
            Command::RegisterHotkey(hotkey, reply) => {
                let result = self.hotkeys.insert(hotkey, &self.registrar);
                if let Err(e) = &result {
                    warn!(error = %e, "hotkey registration failed");
                }
                let _ = reply.send(result);
            }
            Command::UnregisterHotkey(id, reply) => {
                let result = self.hotkeys.remove(&id, &self.registrar).map(|_| ());
                let _ = reply.send(result);
            }
            Command::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    /// Apply every queued command
    pub fn drain(&mut self, commands: &Receiver<Command>) -> Flow {
        while let Ok(command) = commands.try_recv() {
            if self.apply(command) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// A system hotkey notification arrived
    pub fn on_hotkey(&self, system_id: u32) {
        if !self.hotkeys.trigger(system_id) {
            debug!(system_id, "hotkey notification for unknown id");
        }
    }

    /// Tear down: replay pending observations and release every hotkey
    pub fn shutdown(&mut self) {
        self.dispatcher.reset_all();
        self.hotkeys.clear(&self.registrar);
    }
}

struct Running {
    commands: Sender<Command>,
    thread_id: u32,
    handle: JoinHandle<()>,
}

/// Owner-facing handle to the keyboard hook thread
pub struct KeyboardHook {
    running: Arc<AtomicBool>,
    next_watch: AtomicU64,
    thread: Option<Running>,
}

impl KeyboardHook {
    /// Create a new, not yet started, keyboard hook
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            next_watch: AtomicU64::new(1),
            thread: None,
        }
    }

    /// Start the hook thread and wait until the hook is installed.
    ///
    /// On failure nothing is left running and no events are ever delivered.
    pub fn start(&mut self) -> Result<(), HookError> {
        if self.thread.is_some() {
            return Err(HookError::AlreadyRunning);
        }

        let (commands_tx, commands_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let running = Arc::clone(&self.running);

        let handle = std::thread::Builder::new()
            .name("keyboard-hook".to_string())
            .spawn(move || {
                info!("keyboard hook thread started");
                running.store(true, Ordering::SeqCst);
                run_hook_thread(commands_rx, ready_tx);
                running.store(false, Ordering::SeqCst);
                info!("keyboard hook thread stopped");
            })
            .map_err(|e| HookError::ThreadSpawn(e.to_string()))?;

        let thread_id = match ready_rx.recv() {
            Ok(Ok(thread_id)) => thread_id,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(HookError::Disconnected);
            }
        };

        self.thread = Some(Running {
            commands: commands_tx,
            thread_id,
            handle,
        });
        Ok(())
    }

    /// Check if the hook thread is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a hotstring watch; returns the id to remove it with
    pub fn add_watch(&self, hotstring: Hotstring) -> Result<WatchId, HookError> {
        let id = self.next_watch.fetch_add(1, Ordering::Relaxed);
        self.send(Command::AddWatch(id, hotstring))?;
        Ok(id)
    }

    pub fn remove_watch(&self, id: WatchId) -> Result<(), HookError> {
        self.send(Command::RemoveWatch(id))
    }

    /// Pause or resume hotstring recognition
    pub fn set_enabled(&self, enabled: bool) -> Result<(), HookError> {
        self.send(Command::SetEnabled(enabled))
    }

    /// Register a hotkey on the hook thread and wait for the outcome.
    ///
    /// Blocks the caller; async code should go through
    /// `tokio::task::block_in_place`.
    pub fn register_hotkey(&self, hotkey: Hotkey) -> Result<u32, HookError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.send(Command::RegisterHotkey(hotkey, reply_tx))?;
        Ok(reply_rx.recv().map_err(|_| HookError::Disconnected)??)
    }

    pub fn unregister_hotkey(&self, id: &str) -> Result<(), HookError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.send(Command::UnregisterHotkey(id.to_string(), reply_tx))?;
        Ok(reply_rx.recv().map_err(|_| HookError::Disconnected)??)
    }

    /// Stop the hook thread, unhooking on that thread, and wait for it
    pub fn stop(&mut self) {
        let Some(running) = self.thread.take() else {
            return;
        };
        if running.commands.send(Command::Stop).is_ok() {
            wake(running.thread_id);
        }
        if running.handle.join().is_err() {
            warn!("keyboard hook thread panicked");
        }
    }

    fn send(&self, command: Command) -> Result<(), HookError> {
        let running = self.thread.as_ref().ok_or(HookError::NotRunning)?;
        running.commands.send(command).map_err(|_| HookError::Disconnected)?;
        wake(running.thread_id);
        Ok(())
    }
}

impl Default for KeyboardHook {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyboardHook {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(windows)]
use win32::{run_hook_thread, wake};

#[cfg(not(windows))]
fn run_hook_thread(_commands: Receiver<Command>, ready: SyncSender<Result<u32, HookError>>) {
    let _ = ready.send(Err(HookError::Unsupported));
}

#[cfg(not(windows))]
fn wake(_thread_id: u32) {}

#[cfg(windows)]
mod win32 {
    use std::cell::RefCell;
    use std::sync::mpsc::{Receiver, SyncSender};

    use tracing::{error, info, warn};
    use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, GetMessageW, PeekMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
        HC_ACTION, KBDLLHOOKSTRUCT, MSG, PM_NOREMOVE, WH_KEYBOARD_LL, WM_APP, WM_HOTKEY, WM_KEYDOWN,
        WM_SYSKEYDOWN, WM_USER,
    };

    use super::{Command, Flow, HookError, HookState};
    use crate::hotkey::Dispatcher;
    use crate::hotkey::{KeyEvent, KeyFlags};
    use crate::platform::windows::{Win32Injector, Win32Keyboard, Win32Registrar, SYNTHETIC_MARKER};

    type Win32HookState = HookState<Win32Keyboard, Win32Injector, Win32Registrar>;

    thread_local! {
        static HOOK_STATE: RefCell<Option<Win32HookState>> = const { RefCell::new(None) };
    }

    /// Wake the hook thread's message loop so it drains its commands
    pub(super) fn wake(thread_id: u32) {
        if let Err(e) = unsafe { PostThreadMessageW(thread_id, WM_APP, WPARAM(0), LPARAM(0)) } {
            warn!(error = %e, "failed to wake keyboard hook thread");
        }
    }

    pub(super) fn run_hook_thread(commands: Receiver<Command>, ready: SyncSender<Result<u32, HookError>>) {
        let state = HookState::new(Dispatcher::new(Win32Keyboard, Win32Injector), Win32Registrar);
        HOOK_STATE.with(|slot| *slot.borrow_mut() = Some(state));

        // make sure this thread has a message queue before anyone posts to it
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
        }

        let hook = match unsafe { GetModuleHandleW(None) }
            .and_then(|module| unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(low_level_keyboard_proc), Some(module.into()), 0) })
        {
            Ok(hook) => hook,
            Err(e) => {
                error!(error = %e, "failed to install low-level keyboard hook");
                HOOK_STATE.with(|slot| slot.borrow_mut().take());
                let _ = ready.send(Err(HookError::Install(e.to_string())));
                return;
            }
        };

        let _ = ready.send(Ok(unsafe { GetCurrentThreadId() }));
        info!("low-level keyboard hook installed");

        loop {
            let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            // 0 is WM_QUIT, -1 an error
            if ret.0 <= 0 {
                break;
            }
            match msg.message {
                WM_APP => {
                    let flow = HOOK_STATE.with(|slot| match slot.borrow_mut().as_mut() {
                        Some(state) => state.drain(&commands),
                        None => Flow::Stop,
                    });
                    if flow == Flow::Stop {
                        break;
                    }
                }
                WM_HOTKEY => HOOK_STATE.with(|slot| {
                    if let Some(state) = slot.borrow().as_ref() {
                        state.on_hotkey(msg.wParam.0 as u32);
                    }
                }),
                _ => {}
            }
        }

        if let Err(e) = unsafe { UnhookWindowsHookEx(hook) } {
            warn!(error = %e, "failed to remove keyboard hook");
        }
        HOOK_STATE.with(|slot| {
            if let Some(mut state) = slot.borrow_mut().take() {
                state.shutdown();
            }
        });
        info!("low-level keyboard hook removed");
    }

    /// Must return quickly: Windows silently drops hooks that stall
    unsafe extern "system" fn low_level_keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code == HC_ACTION as i32 {
            let message = wparam.0 as u32;
            if message == WM_KEYDOWN || message == WM_SYSKEYDOWN {
                let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
                // our own replays and expansions pass straight through
                if info.dwExtraInfo != SYNTHETIC_MARKER {
                    let event = KeyEvent {
                        vk: info.vkCode,
                        scan: info.scanCode,
                        flags: KeyFlags(info.flags.0),
                    };
                    let consumed = HOOK_STATE.with(|slot| match slot.try_borrow_mut() {
                        Ok(mut state) => state
                            .as_mut()
                            .map(|state| state.dispatcher_mut().handle(&event))
                            .unwrap_or(false),
                        Err(_) => false,
                    });
                    if consumed {
                        return LRESULT(1);
                    }
                }
            }
        }
        CallNextHookEx(None, code, wparam, lparam)
    }
}
