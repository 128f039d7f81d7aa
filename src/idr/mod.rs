//! Adaptive IDR (keyframe) request policy engine (component C).
//!
//! Broken out from the receiver by message passing rather than a shared
//! reference, per the design notes: the receiver holds a handle to
//! [`IdrEngine`] and calls [`IdrEngine::on_loss_event`]; the engine holds no
//! reference back to the receiver, only a `reinit` callback.

mod http_client;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::Config;

pub use http_client::send_idr_request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
}

struct State {
    phase: Phase,
    attempts: u32,
    next_interval: Duration,
    last_request: Option<Instant>,
    last_warning: Option<Instant>,
}

impl State {
    fn new(min_interval: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            attempts: 0,
            next_interval: min_interval,
            last_request: None,
            last_warning: None,
        }
    }
}

/// Counters exposed for observability; not part of the core decision logic.
#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    reinits: AtomicU32,
}

/// Adaptive, single-flight IDR request dispatcher.
pub struct IdrEngine {
    state: Mutex<State>,
    in_flight: AtomicBool,
    drain: Condvar,
    enabled: AtomicBool,
    counters: Counters,
    min_interval: Duration,
    max_interval: Duration,
    burst_interval: Duration,
    burst_count: u32,
    quiet_reset: Duration,
    reinit_threshold: u32,
    idr_path: String,
    idr_port: u16,
    timeout: Duration,
    reinit_hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl IdrEngine {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::new(config.idr_min_interval)),
            in_flight: AtomicBool::new(false),
            drain: Condvar::new(),
            enabled: AtomicBool::new(true),
            counters: Counters::default(),
            min_interval: config.idr_min_interval,
            max_interval: config.idr_max_interval,
            burst_interval: config.idr_burst_interval,
            burst_count: config.idr_burst_count,
            quiet_reset: config.idr_quiet_reset,
            reinit_threshold: config.idr_reinit_threshold,
            idr_path: config.idr_path.clone(),
            idr_port: config.idr_port,
            timeout: config.idr_timeout,
            reinit_hook: Mutex::new(None),
        })
    }

    /// Install the callback invoked when the attempt counter reaches the
    /// reinit threshold, so an outer supervisor can rebuild the pipeline.
    pub fn set_reinit_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.reinit_hook.lock() = Some(Box::new(hook));
    }

    pub fn enable(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            let mut state = self.state.lock();
            *state = State::new(self.min_interval);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.counters.total_requests.load(Ordering::Relaxed)
    }

    pub fn reinit_count(&self) -> u32 {
        self.counters.reinits.load(Ordering::Relaxed)
    }

    /// Called by the receiver thread on every loss-classified packet. Drives
    /// the state machine and, when the schedule allows, spawns a single
    /// short-lived HTTP worker thread to issue the keyframe request.
    pub fn on_loss_event(self: &Arc<Self>, source: SocketAddr, now: Instant) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock();

        if state.phase == Phase::Idle {
            state.phase = Phase::Active;
        }

        if let Some(last_warning) = state.last_warning {
            if now.duration_since(last_warning) > self.quiet_reset {
                state.attempts = 0;
                state.next_interval = self.min_interval;
            }
        }
        state.last_warning = Some(now);

        if state.attempts >= self.reinit_threshold {
            state.phase = Phase::Idle;
            state.attempts = 0;
            state.next_interval = self.min_interval;
            drop(state);
            self.counters.reinits.fetch_add(1, Ordering::Relaxed);
            if let Some(hook) = self.reinit_hook.lock().as_ref() {
                hook();
            }
            return;
        }

        let should_fire = !self.in_flight.load(Ordering::SeqCst)
            && state
                .last_request
                .map(|t| now.duration_since(t) >= state.next_interval)
                .unwrap_or(true);

        if !should_fire {
            return;
        }

        state.last_request = Some(now);
        state.attempts += 1;
        let attempt = state.attempts;
        state.next_interval = if attempt < self.burst_count {
            self.burst_interval
        } else {
            (state.next_interval * 2).min(self.max_interval)
        };
        drop(state);

        self.in_flight.store(true, Ordering::SeqCst);
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        let engine = self.clone();
        let host = source.ip().to_string();
        let path = self.idr_path.clone();
        let port = self.idr_port;
        let timeout = self.timeout;
        thread::spawn(move || {
            match send_idr_request(&host, port, &path, timeout) {
                Ok(status) if (200..300).contains(&status) => {
                    log::debug!("idr request to {} succeeded ({})", host, status);
                }
                Ok(status) => {
                    log::warn!("idr request to {} returned {}", host, status);
                }
                Err(e) => {
                    log::warn!("idr request to {} failed: {}", host, e);
                }
            }
            engine.in_flight.store(false, Ordering::SeqCst);
            engine.drain.notify_all();
        });
    }

    /// Block until no request is in flight, used during shutdown.
    pub fn drain(&self) {
        let mut guard = self.state.lock();
        while self.in_flight.load(Ordering::SeqCst) {
            self.drain.wait_for(&mut guard, Duration::from_millis(250));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicU32 as TestCounter;

    fn cfg() -> Config {
        Config::default()
    }

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 59999)
    }

    #[test]
    fn schedule_follows_burst_then_exponential() {
        let mut config = cfg();
        config.idr_burst_count = 3;
        config.idr_min_interval = Duration::from_millis(50);
        config.idr_max_interval = Duration::from_millis(500);
        let engine = IdrEngine::new(&config);

        // Drive the state machine directly (bypassing the HTTP spawn path)
        // by inspecting next_interval progression through repeated locked
        // state transitions mirroring on_loss_event's scheduling math.
        let mut state = engine.state.lock();
        let mut intervals = Vec::new();
        for attempt in 1..=8u32 {
            let interval = if attempt < engine.burst_count {
                engine.burst_interval
            } else {
                (state.next_interval * 2).min(engine.max_interval)
            };
            state.next_interval = interval;
            intervals.push(interval.as_millis());
        }
        // Property 7's pinned gap sequence: 50, 50, 100, 200, 400, 500, 500, ...
        assert_eq!(&intervals[..7], &[50, 50, 100, 200, 400, 500, 500]);
    }

    #[test]
    fn default_burst_count_matches_property_7() {
        let config = cfg();
        assert_eq!(config.idr_burst_count, 3);
    }

    #[test]
    fn reinit_threshold_returns_to_idle_and_fires_hook() {
        let mut config = cfg();
        config.idr_reinit_threshold = 2;
        config.idr_quiet_reset = Duration::from_secs(3600); // never auto-reset in this test
        let engine = IdrEngine::new(&config);

        let fired = Arc::new(TestCounter::new(0));
        let fired2 = fired.clone();
        engine.set_reinit_hook(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        let start = Instant::now();
        {
            let mut state = engine.state.lock();
            state.phase = Phase::Active;
            state.attempts = 2;
        }
        engine.on_loss_event(addr(), start);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(engine.reinit_count(), 1);
        let state = engine.state.lock();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.attempts, 0);
    }

    #[test]
    fn quiet_period_resets_attempts() {
        let mut config = cfg();
        config.idr_quiet_reset = Duration::from_millis(10);
        let engine = IdrEngine::new(&config);

        let t0 = Instant::now();
        {
            let mut state = engine.state.lock();
            state.attempts = 5;
            state.next_interval = Duration::from_millis(400);
            state.last_warning = Some(t0);
        }

        let t1 = t0 + Duration::from_millis(50);
        // Force in_flight true so on_loss_event doesn't actually spawn a thread.
        engine.in_flight.store(true, Ordering::SeqCst);
        engine.on_loss_event(addr(), t1);
        engine.in_flight.store(false, Ordering::SeqCst);

        let state = engine.state.lock();
        assert_eq!(state.attempts, 0);
        assert_eq!(state.next_interval, engine.min_interval);
    }

    #[test]
    fn disabling_resets_state() {
        let engine = IdrEngine::new(&cfg());
        {
            let mut state = engine.state.lock();
            state.attempts = 10;
            state.phase = Phase::Active;
        }
        engine.enable(false);
        let state = engine.state.lock();
        assert_eq!(state.attempts, 0);
        assert_eq!(state.phase, Phase::Idle);
    }
}
