use std::sync::{Arc, Mutex};

pub(crate) mod read;
pub(crate) mod write;

/// The first fatal error seen by either pump.
///
/// Set before the shared token is cancelled, so the read pump can tell a
/// failed socket from a caller-initiated close.
#[derive(Debug, Clone, Default)]
pub(crate) struct PumpFailure(Arc<Mutex<Option<String>>>);

impl PumpFailure {
    pub(crate) fn record(&self, reason: String) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(reason);
        }
    }

    pub(crate) fn take(&self) -> Option<String> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}
