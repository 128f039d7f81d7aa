//! Packet Router & Feeder (component D).
//!
//! Routes a parsed datagram to the decoder or the audio sink, drops
//! unrecognized payload types, and tags discontinuities on SSRC adoption so
//! the decoder adapter knows to flush on the next feed.

use crate::decoder::PacketDecoder;

/// Classification outcome for one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Video,
    Audio,
    Unknown,
}

pub fn classify(payload_type: u8, video_pt: u8, audio_pt: Option<u8>) -> Route {
    if payload_type == video_pt {
        Route::Video
    } else if audio_pt == Some(payload_type) {
        Route::Audio
    } else {
        Route::Unknown
    }
}

/// Feeds video payloads into the decoder, retrying on back-pressure at a
/// fixed interval until either the feed succeeds or the stop flag is set.
/// The receiver must never drop a video packet for any reason other than a
/// requested stop (Testable Property 12).
pub struct Feeder {
    retry_interval: std::time::Duration,
}

impl Default for Feeder {
    fn default() -> Self {
        Self {
            retry_interval: std::time::Duration::from_millis(2),
        }
    }
}

impl Feeder {
    pub fn feed(
        &self,
        decoder: &dyn PacketDecoder,
        payload: &[u8],
        pts_ns: u64,
        discontinuity: bool,
        stop: &std::sync::atomic::AtomicBool,
    ) {
        use crate::decoder::SubmitOutcome;
        use std::sync::atomic::Ordering;

        if discontinuity {
            decoder.flush();
        }

        loop {
            match decoder.submit_packet(payload, pts_ns, false) {
                SubmitOutcome::Ok => return,
                SubmitOutcome::Busy => {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(self.retry_interval);
                }
                SubmitOutcome::Err(e) => {
                    log::error!("decoder submit_packet failed: {e}");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_video_audio_and_unknown() {
        assert_eq!(classify(97, 97, Some(98)), Route::Video);
        assert_eq!(classify(98, 97, Some(98)), Route::Audio);
        assert_eq!(classify(99, 97, Some(98)), Route::Unknown);
        assert_eq!(classify(98, 97, None), Route::Unknown);
    }
}
