//! hotstringd: background daemon for system-wide hotstrings
//!
//! Provides:
//! - A low-level keyboard hook feeding one matcher per configured hotstring
//! - Replacement text typed after a hotstring fires
//! - Key-combination hotkeys (a hotkey with id `pause` toggles recognition)

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hotstringd::config::Config;
use hotstringd::events::HotstringEvent;
use hotstringd::hotkey::{Hotkey, KeyboardHook};
use hotstringd::lifecycle::ShutdownSignal;
use hotstringd::{EventAction, Hotstring};

/// Hotkey id that pauses and resumes hotstring recognition
const PAUSE_HOTKEY: &str = "pause";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hotstringd starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        path = %config.watch_path.display(),
        hotstrings = config.watches.hotstrings.len(),
        hotkeys = config.watches.hotkeys.len(),
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    // Trigger actions -> main loop
    let (event_tx, mut event_rx) = mpsc::channel::<HotstringEvent>(64);

    let mut hook = KeyboardHook::new();
    if let Err(e) = tokio::task::block_in_place(|| hook.start()) {
        error!(error = %e, "failed to start keyboard hook");
        warn!("no hotstrings will be recognised");
        return Ok(());
    }
    info!("keyboard hook started");

    let mut replacements = HashMap::new();
    for watch in &config.watches.hotstrings {
        let action = EventAction::new(
            HotstringEvent::Fired {
                watch: watch.name.clone(),
            },
            event_tx.clone(),
        );
        // validated at load
        let hotstring = match Hotstring::new(&watch.name, watch.modifiers(), &watch.trigger, action) {
            Ok(hotstring) => hotstring.with_threshold(watch.threshold()),
            Err(e) => {
                warn!(watch = %watch.name, error = %e, "skipping hotstring");
                continue;
            }
        };
        hook.add_watch(hotstring)?;
        if let Some(text) = &watch.replacement {
            replacements.insert(watch.name.clone(), text.clone());
        }
    }

    for hotkey in &config.watches.hotkeys {
        let action = EventAction::new(HotstringEvent::HotkeyPressed { id: hotkey.id.clone() }, event_tx.clone());
        let hotkey_def = Hotkey::new(&hotkey.id, hotkey.combo()?, action);
        // waits on the hook thread's reply; keep the async workers free
        match tokio::task::block_in_place(|| hook.register_hotkey(hotkey_def)) {
            Ok(system_id) => info!(id = %hotkey.id, system_id, "hotkey registered"),
            Err(e) => warn!(id = %hotkey.id, error = %e, "hotkey registration failed"),
        }
    }
    drop(event_tx);

    info!("daemon initialized, entering main loop");

    let mut enabled = true;
    // Main event loop
    tokio::select! {
        _ = async {
            while let Some(event) = event_rx.recv().await {
                info!(%event, "trigger event received");
                match event {
                    HotstringEvent::Fired { watch } => {
                        if let Some(text) = replacements.get(&watch) {
                            type_replacement(text.clone()).await;
                        }
                    }
                    HotstringEvent::HotkeyPressed { id } if id == PAUSE_HOTKEY => {
                        enabled = !enabled;
                        if let Err(e) = hook.set_enabled(enabled) {
                            warn!(error = %e, "failed to toggle recognition");
                        }
                    }
                    HotstringEvent::HotkeyPressed { .. } => {}
                }
            }
        } => {
            info!("event channel closed");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    tokio::task::block_in_place(|| hook.stop());

    info!("hotstringd stopped");

    Ok(())
}

/// Type the replacement off the async workers; SendInput can block briefly
async fn type_replacement(text: String) {
    #[cfg(windows)]
    {
        use hotstringd::platform::{windows::Win32Injector, KeyInjector};

        match tokio::task::spawn_blocking(move || Win32Injector.type_text(&text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to type replacement"),
            Err(e) => error!(error = %e, "replacement task failed"),
        }
    }

    #[cfg(not(windows))]
    warn!(len = text.len(), "text injection is only available on Windows");
}
