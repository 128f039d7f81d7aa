//! Single-slot, latest-wins channel between the decoder producer thread and
//! the DRM presenter thread (§5 concurrency model: "the producer→consumer
//! slot is latest-wins; if the presenter is late, older frames are dropped
//! by overwrite" — a deliberate low-latency-over-completeness choice).
//!
//! Generalizes the condvar-gated single-flight pattern the IDR engine uses
//! to drain in-flight HTTP workers ([`crate::idr::IdrEngine::drain`]) into a
//! value-carrying slot rather than a boolean gate.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A mailbox holding at most one pending value. A publish that lands while a
/// previous value is still unread replaces it rather than queuing.
pub struct SlotChannel<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for SlotChannel<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

impl<T> SlotChannel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite whatever is pending (if anything) with `value`.
    pub fn publish(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.ready.notify_one();
    }

    /// Wait up to `timeout` for a value, returning `None` on timeout so the
    /// caller can re-check its stop flag (every wait in the pipeline is
    /// bounded, per the cancellation design).
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.slot.lock();
        if guard.is_none() {
            self.ready.wait_for(&mut guard, timeout);
        }
        guard.take()
    }

    /// Non-blocking take of whatever is pending right now.
    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn later_publish_overwrites_unread_value() {
        let chan: SlotChannel<u32> = SlotChannel::new();
        chan.publish(1);
        chan.publish(2);
        assert_eq!(chan.try_take(), Some(2));
        assert_eq!(chan.try_take(), None);
    }

    #[test]
    fn wait_times_out_without_a_publish() {
        let chan: SlotChannel<u32> = SlotChannel::new();
        assert_eq!(chan.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn wait_wakes_on_publish_from_another_thread() {
        let chan = Arc::new(SlotChannel::<u32>::new());
        let chan2 = chan.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            chan2.publish(7);
        });
        let got = chan.wait_timeout(Duration::from_secs(1));
        assert_eq!(got, Some(7));
        handle.join().unwrap();
    }
}
