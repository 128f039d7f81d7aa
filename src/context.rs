//! Explicit shared context, replacing the global statics a plugin-style
//! library would otherwise reach for (log level, CPU affinity tables, a
//! verbose flag). Built once at startup and cloned (`Arc`) into every
//! thread's spawn closure, mirroring how the receiver/transmitter threads
//! in the reference input stream are handed their own `Arc<AtomicBool>` /
//! `Arc<AtomicStats>` rather than reading process-global state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;

/// Shared state every pipeline thread is constructed with.
pub struct CoreContext {
    pub config: Config,
    stop: Arc<AtomicBool>,
}

impl CoreContext {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Mark every thread's stop flag. Cooperative: threads observe this at
    /// their own bounded wait points and unwind in order.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }
}

/// Pin the calling thread to the configured CPU set, best-effort. Absence of
/// an affinity list, or failure to apply one, is not an error: the pipeline
/// runs unpinned.
#[cfg(target_os = "linux")]
pub fn apply_cpu_affinity(cores: &[usize]) {
    use std::mem::{size_of, zeroed};

    unsafe {
        let mut set: libc::cpu_set_t = zeroed();
        for &core in cores {
            libc::CPU_SET(core, &mut set);
        }
        let rc = libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            log::warn!("failed to apply cpu affinity {:?}", cores);
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn apply_cpu_affinity(_cores: &[usize]) {}
