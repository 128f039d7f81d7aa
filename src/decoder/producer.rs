//! Decoder producer thread (§4.E, §5): loops on `get_frame`, drops
//! error/discard frames while poking the IDR engine's reinit hook, and
//! publishes everything else to the presenter's single-slot channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::idr::IdrEngine;
use crate::slot_channel::SlotChannel;

use super::{DecodedEvent, Frame, PacketDecoder};

const GET_FRAME_TIMEOUT: Duration = Duration::from_millis(5);

/// Drive the producer loop until `stop` is set.
///
/// `on_info_change` is called synchronously for every [`DecodedEvent::InfoChange`]
/// (first frame, or a resolution/bit-depth change): it must rebuild the frame
/// pool and re-register it with the decoder (`set_external_buffer_group` +
/// `signal_info_change_ready`) before this loop resumes polling, per §4.E
/// steps 1-4. Frames the decoder marked `error`/`discard` are dropped and poke
/// the IDR engine's reinit/warning hook (§4.E: "the IDR engine is poked via
/// the reinit/warning hook") instead of being published.
pub fn run_producer(
    decoder: &dyn PacketDecoder,
    pending: &SlotChannel<Frame>,
    idr: &Arc<IdrEngine>,
    source: impl Fn() -> std::net::SocketAddr,
    on_info_change: impl Fn(super::FrameFormat),
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst) {
        match decoder.get_frame(GET_FRAME_TIMEOUT) {
            Ok(DecodedEvent::Frame(frame)) => {
                if frame.error || frame.discard {
                    log::warn!(
                        "decoder reported error={} discard={} on fb_id={}",
                        frame.error,
                        frame.discard,
                        frame.fb_id
                    );
                    idr.on_loss_event(source(), std::time::Instant::now());
                    continue;
                }
                pending.publish(frame);
            }
            Ok(DecodedEvent::InfoChange(format)) => {
                log::info!(
                    "decoder info-change: {}x{} bpp={}",
                    format.hor_stride,
                    format.ver_stride,
                    format.bpp
                );
                on_info_change(format);
            }
            Ok(DecodedEvent::None) => {}
            Err(e) => {
                log::error!("decoder get_frame failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::decoder::NullDecoder;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::thread;

    #[test]
    fn good_frames_are_published_to_the_pending_slot() {
        let decoder = NullDecoder::new(64, 64, 1, 4);
        let pending: SlotChannel<Frame> = SlotChannel::new();
        let idr = IdrEngine::new(&Config::default());
        let stop = AtomicBool::new(false);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5600);

        decoder.submit_packet(&[0u8; 4], 1, false);

        thread::scope(|scope| {
            scope.spawn(|| {
                run_producer(&decoder, &pending, &idr, || addr, |_| {}, &stop);
            });
            let got = pending.wait_timeout(Duration::from_millis(200));
            assert!(got.is_some());
            stop.store(true, Ordering::SeqCst);
        });
    }
}
