//! RTP parser and statistics engine (component B).
//!
//! Unlike the reference input stream's per-field `AtomicStats` (appropriate
//! there because counters are read independently and never need to agree
//! with each other), `get_snapshot` here must hand back counters and the
//! 512-entry history ring as one consistent point-in-time view. So the
//! state lives behind a single `parking_lot::Mutex` held for the duration of
//! `process_rtp` and `get_snapshot`, per the concurrency model's shared
//! resource policy, rather than as independent atomics.

use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::rtp::{RtpPacket, SampleFlags};

pub const HISTORY_LEN: usize = 512;
const JITTER_CLOCK_HZ: f64 = 90_000.0;
const FRAME_SIZE_EWMA_ALPHA: f64 = 0.1;
const JITTER_EWMA_ALPHA: f64 = 0.1;
const BITRATE_EWMA_ALPHA: f64 = 0.1;
const BITRATE_WINDOW_NS: u64 = 100_000_000;
const SOURCE_ADDR_REFRESH_NS: u64 = 5_000_000_000;

/// One accepted sample, stored in the fixed history ring.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketSample {
    pub sequence: u16,
    pub timestamp: u32,
    pub payload_type: u8,
    pub marker: bool,
    pub size: usize,
    pub arrival_ns: u64,
    pub flags: SampleFlags,
}

struct FrameAccumulator {
    timestamp: u32,
    byte_count: usize,
    missing: bool,
    active: bool,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self {
            timestamp: 0,
            byte_count: 0,
            missing: false,
            active: false,
        }
    }
}

/// Point-in-time copy of the statistician's counters and history, the only
/// thing ever handed to out-of-scope observers (OSD, SSE streamer).
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub packets: u64,
    pub bytes: u64,
    pub frames: u64,
    pub incomplete_frames: u64,
    pub lost: u64,
    pub reorder: u64,
    pub duplicate: u64,
    pub jitter_instant_ns: f64,
    pub jitter_ewma_ns: f64,
    pub bitrate_instant_mbps: f64,
    pub bitrate_ewma_mbps: f64,
    pub last_frame_bytes: usize,
    pub last_rtp_timestamp: u32,
    pub frame_size_ewma: f64,
    pub history_count: usize,
    pub history: Vec<PacketSample>,
}

struct Inner {
    expected_seq: u16,
    last_seq: u16,
    have_ssrc: bool,
    ssrc: u32,

    frame: FrameAccumulator,

    transit_prev: Option<f64>,
    jitter_instant_ns: f64,
    jitter_ewma_ns: f64,

    bitrate_window_start_ns: u64,
    bitrate_window_bytes: u64,
    bitrate_instant_mbps: f64,
    bitrate_ewma_mbps: f64,

    packets: u64,
    bytes: u64,
    frames: u64,
    incomplete_frames: u64,
    lost: u64,
    reorder: u64,
    duplicate: u64,
    last_frame_bytes: usize,
    last_rtp_timestamp: u32,
    frame_size_ewma: f64,

    history: Vec<PacketSample>,
    head: usize,
    count: usize,

    enabled: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            expected_seq: 0,
            last_seq: 0,
            have_ssrc: false,
            ssrc: 0,
            frame: FrameAccumulator::default(),
            transit_prev: None,
            jitter_instant_ns: 0.0,
            jitter_ewma_ns: 0.0,
            bitrate_window_start_ns: 0,
            bitrate_window_bytes: 0,
            bitrate_instant_mbps: 0.0,
            bitrate_ewma_mbps: 0.0,
            packets: 0,
            bytes: 0,
            frames: 0,
            incomplete_frames: 0,
            lost: 0,
            reorder: 0,
            duplicate: 0,
            last_frame_bytes: 0,
            last_rtp_timestamp: 0,
            frame_size_ewma: 0.0,
            history: vec![PacketSample::default(); HISTORY_LEN],
            head: 0,
            count: 0,
            enabled: true,
        }
    }
}

/// Outcome of `process_rtp`, used to decide whether to poke the IDR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossSignal {
    None,
    Loss,
}

/// RTP parser and statistics tracker for a single video payload-type stream.
pub struct Statistician {
    inner: Mutex<Inner>,
}

impl Default for Statistician {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistician {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Enable/disable statistics collection. A rising edge (disabled ->
    /// enabled) resets all sequence/frame/jitter/history state so stale
    /// numbers never leak into a freshly (re)enabled session.
    pub fn enable_stats(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        let rising_edge = enabled && !inner.enabled;
        inner.enabled = enabled;
        if rising_edge {
            let was_enabled = true;
            *inner = Inner::default();
            inner.enabled = was_enabled;
        }
    }

    /// Feed one parsed video-classified packet into the tracker. Returns
    /// `LossSignal::Loss` when this packet advanced the loss counter, which
    /// is the receiver's cue to poke the IDR policy engine.
    pub fn process_rtp(&self, packet: &RtpPacket<'_>, _arrival: Instant, now_ns: u64) -> LossSignal {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return LossSignal::None;
        }

        let header = &packet.header;
        let mut flags = SampleFlags::default();
        let mut loss_signal = LossSignal::None;

        if !inner.have_ssrc || inner.ssrc != header.ssrc {
            // I1: SSRC change resets sequence/frame/jitter state, counters survive.
            inner.have_ssrc = true;
            inner.ssrc = header.ssrc;
            inner.expected_seq = header.sequence.wrapping_add(1);
            inner.last_seq = header.sequence;
            inner.frame = FrameAccumulator::default();
            inner.transit_prev = None;
        } else if header.sequence == inner.last_seq {
            // A duplicate is counted independently of delta classification
            // and takes priority over it: an immediate repeat of the last
            // sequence number (delta == -1 against `expected`) must not
            // also fall through to the reorder branch below.
            inner.duplicate += 1;
            flags.duplicate = true;
        } else {
            let delta = header.sequence.wrapping_sub(inner.expected_seq) as i16;
            if delta == 0 {
                inner.expected_seq = inner.expected_seq.wrapping_add(1);
            } else if delta > 0 {
                inner.lost += delta as u64;
                inner.expected_seq = header.sequence.wrapping_add(1);
                inner.frame.missing = true;
                flags.loss = true;
                loss_signal = LossSignal::Loss;
            } else {
                inner.reorder += 1;
                flags.reorder = true;
            }
            inner.last_seq = header.sequence;
        }

        // Frame tracking: active for one RTP timestamp value; closes on
        // timestamp change or marker=1, never both for the same packet.
        if inner.frame.active && inner.frame.timestamp != header.timestamp {
            Self::finalize_frame(&mut inner);
        }
        if !inner.frame.active {
            inner.frame = FrameAccumulator {
                timestamp: header.timestamp,
                byte_count: 0,
                missing: inner.frame.missing,
                active: true,
            };
        }
        inner.frame.byte_count += packet.payload.len();

        if header.marker {
            flags.frame_end = true;
            Self::finalize_frame(&mut inner);
        }

        // Jitter: RFC 3550 6.4.1 with a fixed 90kHz clock.
        let arrival_ns = now_ns;
        let transit = (arrival_ns as f64) * JITTER_CLOCK_HZ / 1e9 - header.timestamp as f64;
        if let Some(prev_transit) = inner.transit_prev {
            let d = (transit - prev_transit).abs();
            inner.jitter_instant_ns += (d - inner.jitter_instant_ns) / 16.0;
            inner.jitter_ewma_ns +=
                (inner.jitter_instant_ns - inner.jitter_ewma_ns) * JITTER_EWMA_ALPHA;
        }
        inner.transit_prev = Some(transit);

        // Bitrate: 100ms window -> Mbps, EWMA-smoothed.
        if inner.bitrate_window_start_ns == 0 {
            inner.bitrate_window_start_ns = arrival_ns;
        }
        inner.bitrate_window_bytes += packet.payload.len() as u64;
        let elapsed = arrival_ns.saturating_sub(inner.bitrate_window_start_ns);
        if elapsed >= BITRATE_WINDOW_NS {
            let mbps = (inner.bitrate_window_bytes as f64 * 8.0) / (elapsed as f64 / 1000.0);
            inner.bitrate_instant_mbps = mbps;
            inner.bitrate_ewma_mbps += (mbps - inner.bitrate_ewma_mbps) * BITRATE_EWMA_ALPHA;
            inner.bitrate_window_start_ns = arrival_ns;
            inner.bitrate_window_bytes = 0;
        }

        inner.packets += 1;
        inner.bytes += packet.payload.len() as u64;
        inner.last_rtp_timestamp = header.timestamp;

        let sample = PacketSample {
            sequence: header.sequence,
            timestamp: header.timestamp,
            payload_type: header.payload_type,
            marker: header.marker,
            size: packet.payload.len(),
            arrival_ns: now_ns,
            flags,
        };
        Self::push_history(&mut inner, sample);

        loss_signal
    }

    fn finalize_frame(inner: &mut Inner) {
        if !inner.frame.active {
            return;
        }
        inner.frames += 1;
        if inner.frame.missing {
            inner.incomplete_frames += 1;
        }
        inner.last_frame_bytes = inner.frame.byte_count;
        inner.frame_size_ewma +=
            (inner.frame.byte_count as f64 - inner.frame_size_ewma) * FRAME_SIZE_EWMA_ALPHA;
        inner.frame.active = false;
        inner.frame.missing = false;
    }

    fn push_history(inner: &mut Inner, sample: PacketSample) {
        // I2: head always advances mod 512, count saturates at 512.
        inner.history[inner.head] = sample;
        inner.head = (inner.head + 1) % HISTORY_LEN;
        inner.count = (inner.count + 1).min(HISTORY_LEN);
    }

    /// Copy counters and the full history ring under one lock.
    pub fn get_snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        let history = if inner.count < HISTORY_LEN {
            inner.history[..inner.count].to_vec()
        } else {
            // FIFO order oldest -> newest starting at head.
            let mut ordered = Vec::with_capacity(HISTORY_LEN);
            ordered.extend_from_slice(&inner.history[inner.head..]);
            ordered.extend_from_slice(&inner.history[..inner.head]);
            ordered
        };

        Snapshot {
            packets: inner.packets,
            bytes: inner.bytes,
            frames: inner.frames,
            incomplete_frames: inner.incomplete_frames,
            lost: inner.lost,
            reorder: inner.reorder,
            duplicate: inner.duplicate,
            jitter_instant_ns: inner.jitter_instant_ns,
            jitter_ewma_ns: inner.jitter_ewma_ns,
            bitrate_instant_mbps: inner.bitrate_instant_mbps,
            bitrate_ewma_mbps: inner.bitrate_ewma_mbps,
            last_frame_bytes: inner.last_frame_bytes,
            last_rtp_timestamp: inner.last_rtp_timestamp,
            frame_size_ewma: inner.frame_size_ewma,
            history_count: inner.count,
            history,
        }
    }
}

/// Tracks the most recently seen sender address, refreshed at most once per
/// 5 seconds (Source Address in the data model).
pub struct SourceAddrTracker {
    inner: Mutex<(std::net::SocketAddr, u64)>,
}

impl SourceAddrTracker {
    pub fn new(initial: std::net::SocketAddr) -> Self {
        Self {
            inner: Mutex::new((initial, 0)),
        }
    }

    pub fn update(&self, addr: std::net::SocketAddr, now_ns: u64) {
        let mut inner = self.inner.lock();
        if now_ns.saturating_sub(inner.1) >= SOURCE_ADDR_REFRESH_NS {
            inner.0 = addr;
            inner.1 = now_ns;
        }
    }

    pub fn current(&self) -> std::net::SocketAddr {
        self.inner.lock().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::RtpHeader;

    fn packet(seq: u16, ts: u32, marker: bool, ssrc: u32) -> (RtpHeader, Vec<u8>) {
        (
            RtpHeader {
                version: 2,
                padding: false,
                extension: false,
                csrc_count: 0,
                marker,
                payload_type: 97,
                sequence: seq,
                timestamp: ts,
                ssrc,
            },
            vec![0u8; 100],
        )
    }

    fn feed(stat: &Statistician, seq: u16, ts: u32, marker: bool, ssrc: u32, now_ns: u64) -> LossSignal {
        let (header, payload) = packet(seq, ts, marker, ssrc);
        let rtp = RtpPacket { header, payload: &payload };
        stat.process_rtp(&rtp, Instant::now(), now_ns)
    }

    #[test]
    fn sequence_wraps_without_false_loss() {
        let stat = Statistician::new();
        feed(&stat, 65534, 0, false, 1, 0);
        feed(&stat, 65535, 3000, false, 1, 1_000_000);
        feed(&stat, 0, 6000, false, 1, 2_000_000);
        feed(&stat, 1, 9000, false, 1, 3_000_000);
        let snap = stat.get_snapshot();
        assert_eq!(snap.lost, 0);
        assert_eq!(snap.reorder, 0);
        assert_eq!(snap.duplicate, 0);
    }

    #[test]
    fn gap_counts_as_loss_and_marks_frame_missing() {
        let stat = Statistician::new();
        feed(&stat, 10, 0, false, 1, 0);
        feed(&stat, 12, 3000, true, 1, 1_000_000);
        let snap = stat.get_snapshot();
        assert_eq!(snap.lost, 1);
        assert_eq!(snap.incomplete_frames, 1);
    }

    #[test]
    fn reorder_is_counted() {
        let stat = Statistician::new();
        feed(&stat, 10, 0, false, 1, 0);
        feed(&stat, 9, 3000, false, 1, 1_000_000);
        let snap = stat.get_snapshot();
        assert_eq!(snap.reorder, 1);
    }

    #[test]
    fn duplicate_is_counted_independent_of_delta() {
        let stat = Statistician::new();
        feed(&stat, 10, 0, false, 1, 0);
        feed(&stat, 10, 0, false, 1, 1_000_000);
        let snap = stat.get_snapshot();
        assert_eq!(snap.duplicate, 1);
        assert_eq!(snap.lost, 0);
        assert_eq!(snap.reorder, 0);
    }

    #[test]
    fn duplicate_burst_does_not_inflate_reorder() {
        // S4: duplicate each of 10 packets in a row.
        let stat = Statistician::new();
        let mut now_ns = 0u64;
        for seq in 0..10u16 {
            feed(&stat, seq, seq as u32 * 3000, false, 1, now_ns);
            now_ns += 1_000_000;
            feed(&stat, seq, seq as u32 * 3000, false, 1, now_ns);
            now_ns += 1_000_000;
        }
        let snap = stat.get_snapshot();
        assert_eq!(snap.duplicate, 10);
        assert_eq!(snap.lost, 0);
        assert_eq!(snap.reorder, 0);
    }

    #[test]
    fn ssrc_change_resets_sequence_state_but_preserves_counters() {
        let stat = Statistician::new();
        feed(&stat, 10, 0, false, 1, 0);
        feed(&stat, 12, 3000, false, 1, 1_000_000); // +1 lost
        feed(&stat, 500, 9000, false, 2, 2_000_000); // new ssrc
        let snap = stat.get_snapshot();
        assert_eq!(snap.lost, 1); // unchanged by the ssrc switch itself
        assert_eq!(snap.duplicate, 0);
    }

    #[test]
    fn frame_finalizes_once_on_marker() {
        let stat = Statistician::new();
        for i in 0..5u16 {
            feed(&stat, i, 1000, i == 4, 1, i as u64 * 1_000_000);
        }
        let snap = stat.get_snapshot();
        assert_eq!(snap.frames, 1);
        assert_eq!(snap.last_frame_bytes, 500);
    }

    #[test]
    fn jitter_converges_toward_zero_under_uniform_arrival() {
        let stat = Statistician::new();
        let interval_ns = 33_000_000u64; // ~33ms
        let ts_increment = 3000u32; // 90kHz * 33ms / 1000
        for i in 0..2000u32 {
            feed(&stat, i as u16, i * ts_increment, false, 1, i as u64 * interval_ns);
        }
        let snap = stat.get_snapshot();
        assert!(snap.jitter_instant_ns.abs() < 50.0, "jitter={}", snap.jitter_instant_ns);
    }

    #[test]
    fn history_ring_saturates_and_keeps_fifo_order() {
        let stat = Statistician::new();
        for i in 0..600u32 {
            feed(&stat, i as u16, i * 3000, false, 1, i as u64 * 1_000_000);
        }
        let snap = stat.get_snapshot();
        assert_eq!(snap.history_count, HISTORY_LEN);
        assert_eq!(snap.history.len(), HISTORY_LEN);
        // Oldest retained sample should be packet number 600-512 = 88.
        assert_eq!(snap.history[0].sequence, 88);
        assert_eq!(snap.history[HISTORY_LEN - 1].sequence, 599);
    }

    #[test]
    fn history_count_matches_pushes_below_capacity() {
        let stat = Statistician::new();
        for i in 0..10u32 {
            feed(&stat, i as u16, i * 3000, false, 1, i as u64 * 1_000_000);
        }
        let snap = stat.get_snapshot();
        assert_eq!(snap.history_count, 10);
        assert_eq!(snap.history[9].sequence, 9);
    }

    #[test]
    fn enable_stats_rising_edge_resets_state() {
        let stat = Statistician::new();
        feed(&stat, 10, 0, false, 1, 0);
        feed(&stat, 12, 3000, false, 1, 1_000_000);
        stat.enable_stats(false);
        stat.enable_stats(true);
        let snap = stat.get_snapshot();
        assert_eq!(snap.lost, 0);
        assert_eq!(snap.packets, 0);
    }
}
