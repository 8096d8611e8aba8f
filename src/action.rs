//! Callback capability for hotstring and hotkey triggers
//!
//! Actions run synchronously on the keyboard hook thread, so they must
//! return quickly. Anything slow should be handed off (see [`EventAction`]).

use tokio::sync::mpsc;
use tracing::warn;

use crate::events::HotstringEvent;

/// Something that can be invoked when a trigger fires
pub trait Action: Send {
    fn invoke(&self);
}

impl<F> Action for F
where
    F: Fn() + Send,
{
    fn invoke(&self) {
        self()
    }
}

/// Action that forwards an event to the async side without blocking
pub struct EventAction {
    event: HotstringEvent,
    tx: mpsc::Sender<HotstringEvent>,
}

impl EventAction {
    pub fn new(event: HotstringEvent, tx: mpsc::Sender<HotstringEvent>) -> Self {
        Self { event, tx }
    }
}

impl Action for EventAction {
    fn invoke(&self) {
        // try_send: the hook thread must never wait on the consumer
        if let Err(e) = self.tx.try_send(self.event.clone()) {
            warn!(event = %self.event, error = %e, "dropping trigger event");
        }
    }
}
