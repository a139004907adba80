use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop signal shared between the XML event source and the
/// parse state machine.
///
/// Requesting a stop never interrupts anything by itself; the event source
/// checks the flag before producing each event and ends the stream once it
/// is set. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    stopped: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the event source to stop. Idempotent.
    pub fn request_stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::debug!("Feed parse stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
