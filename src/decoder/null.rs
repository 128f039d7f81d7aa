//! Test-fixture decoder used when no vendor H.265 library is present.
//!
//! Stands in for the real hardware adapter in the test suite and as the
//! runtime default: it never touches DRM or any vendor SDK, it just turns
//! every `packets_per_frame`'th submitted packet into a synthetic decoded
//! [`Frame`] cycling through a small fixed set of fake `fb_id`s, so the
//! router→decoder→presenter wiring can be exercised end-to-end without
//! hardware.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{DecodedEvent, Frame, PacketDecoder, SubmitOutcome};
use crate::error::DecoderError;

pub struct NullDecoder {
    queue: Mutex<VecDeque<Frame>>,
    ready: Condvar,
    packets_per_frame: u32,
    packet_count: AtomicU32,
    next_fb_id: AtomicU32,
    fb_id_pool: u32,
    width: u32,
    height: u32,
    info_change_sent: std::sync::atomic::AtomicBool,
}

impl NullDecoder {
    pub fn new(width: u32, height: u32, packets_per_frame: u32, fb_id_pool: u32) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            packets_per_frame: packets_per_frame.max(1),
            packet_count: AtomicU32::new(0),
            next_fb_id: AtomicU32::new(1),
            fb_id_pool: fb_id_pool.max(1),
            width,
            height,
            info_change_sent: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl PacketDecoder for NullDecoder {
    fn submit_packet(&self, _payload: &[u8], pts_ns: u64, eos: bool) -> SubmitOutcome {
        let count = self.packet_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.packets_per_frame == 0 || eos {
            let fb_id = 1 + (self.next_fb_id.fetch_add(1, Ordering::SeqCst) % self.fb_id_pool);
            let frame = Frame {
                fb_id,
                width: self.width,
                height: self.height,
                hor_stride: self.width,
                ver_stride: self.height,
                pts_ns,
                error: false,
                discard: false,
                eos,
            };
            self.queue.lock().push_back(frame);
            self.ready.notify_one();
        }
        SubmitOutcome::Ok
    }

    fn get_frame(&self, timeout: Duration) -> Result<DecodedEvent, DecoderError> {
        if !self.info_change_sent.swap(true, Ordering::SeqCst) {
            return Ok(DecodedEvent::InfoChange(super::FrameFormat {
                hor_stride: self.width,
                ver_stride: self.height,
                bpp: 8,
            }));
        }

        let mut queue = self.queue.lock();
        if queue.is_empty() {
            self.ready.wait_for(&mut queue, timeout);
        }
        Ok(match queue.pop_front() {
            Some(frame) => DecodedEvent::Frame(frame),
            None => DecodedEvent::None,
        })
    }

    fn set_external_buffer_group(&self, _fds: &[RawFd]) {}

    fn signal_info_change_ready(&self) {}

    fn flush(&self) {
        self.queue.lock().clear();
        self.packet_count.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip_initial_info_change(decoder: &NullDecoder) {
        assert!(matches!(
            decoder.get_frame(Duration::from_millis(5)).unwrap(),
            DecodedEvent::InfoChange(_)
        ));
    }

    #[test]
    fn first_get_frame_reports_info_change() {
        let decoder = NullDecoder::new(1920, 1080, 1, 24);
        match decoder.get_frame(Duration::from_millis(5)).unwrap() {
            DecodedEvent::InfoChange(format) => {
                assert_eq!(format.hor_stride, 1920);
                assert_eq!(format.ver_stride, 1080);
            }
            other => panic!("expected InfoChange, got {other:?}"),
        }
    }

    #[test]
    fn produces_a_frame_every_n_packets() {
        let decoder = NullDecoder::new(1920, 1080, 3, 24);
        skip_initial_info_change(&decoder);
        for i in 0..2 {
            assert!(matches!(
                decoder.submit_packet(&[0u8; 10], i as u64, false),
                SubmitOutcome::Ok
            ));
        }
        assert!(matches!(
            decoder.get_frame(Duration::from_millis(5)).unwrap(),
            DecodedEvent::None
        ));

        decoder.submit_packet(&[0u8; 10], 2, false);
        assert!(matches!(
            decoder.get_frame(Duration::from_millis(5)).unwrap(),
            DecodedEvent::Frame(_)
        ));
    }

    #[test]
    fn flush_clears_pending_frames_and_counter() {
        let decoder = NullDecoder::new(1920, 1080, 1, 24);
        skip_initial_info_change(&decoder);
        decoder.submit_packet(&[0u8; 10], 0, false);
        decoder.flush();
        assert!(matches!(
            decoder.get_frame(Duration::from_millis(5)).unwrap(),
            DecodedEvent::None
        ));
    }

    #[test]
    fn eos_flushes_frame_early() {
        let decoder = NullDecoder::new(1920, 1080, 10, 24);
        skip_initial_info_change(&decoder);
        let frame = match decoder.submit_packet(&[0u8; 10], 0, true) {
            SubmitOutcome::Ok => decoder.get_frame(Duration::from_millis(5)).unwrap(),
            _ => DecodedEvent::None,
        };
        match frame {
            DecodedEvent::Frame(f) => assert!(f.eos),
            other => panic!("expected Frame, got {other:?}"),
        }
    }
}
