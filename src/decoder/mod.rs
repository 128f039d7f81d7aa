//! Hardware Decoder Adapter (component E).
//!
//! The vendor decoder is reached through the [`PacketDecoder`] capability
//! trait rather than the function-pointer table the vendor SDK actually
//! exposes — the design-notes translation of "dynamic dispatch via function
//! pointers in the vendor decoder API" into a Rust trait object. The real
//! binding surface lives in [`ffi`] (gated behind the `vendor_decoder`
//! feature, modeled on [`crate`]'s sibling `ffi::bass` typedef tables); the
//! default, and the one the test suite exercises, is [`NullDecoder`].

mod ffi;
mod null;
mod pool;
mod producer;

use std::os::unix::io::RawFd;
use std::time::Duration;

pub use null::NullDecoder;
pub use pool::{FrameFormat, FramePool, FrameSlot};
pub use producer::run_producer;

#[cfg(feature = "vendor_decoder")]
pub use ffi::HardwareDecoder;

use crate::error::DecoderError;

/// Frame interface exposed to the presenter (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub pts_ns: u64,
    pub error: bool,
    pub discard: bool,
    pub eos: bool,
}

/// Outcome of one `submit_packet` call.
#[derive(Debug)]
pub enum SubmitOutcome {
    Ok,
    Busy,
    Err(DecoderError),
}

/// Outcome of one `get_frame` poll (§4.E producer-thread loop).
#[derive(Debug)]
pub enum DecodedEvent {
    /// Nothing ready within the timeout.
    None,
    /// A frame already resolved against the current frame pool.
    Frame(Frame),
    /// The decoder's first frame, or a resolution/bit-depth change:
    /// the caller must rebuild the frame pool for `format` and call
    /// [`PacketDecoder::set_external_buffer_group`] +
    /// [`PacketDecoder::signal_info_change_ready`] before any further
    /// `get_frame` call can return a resolvable `Frame`.
    InfoChange(FrameFormat),
}

/// Capability trait standing in for the vendor decoder's function-pointer
/// table (§6 "Decoder interface consumed from external collaborator").
pub trait PacketDecoder: Send + Sync {
    /// Submit one packet's payload, bounded by `DECODER_READ_BUF_SIZE`.
    /// `eos` marks end-of-stream.
    fn submit_packet(&self, payload: &[u8], pts_ns: u64, eos: bool) -> SubmitOutcome;

    /// Block up to `timeout` for a decoded frame or an info-change event.
    fn get_frame(&self, timeout: Duration) -> Result<DecodedEvent, DecoderError>;

    /// Register the frame pool's PRIME fds as the decoder's external DMA-BUF
    /// buffer group, called after every pool rebuild.
    fn set_external_buffer_group(&self, fds: &[RawFd]);

    /// Acknowledge an info-change (resolution/format change) so the decoder
    /// resumes feeding frames against the new pool.
    fn signal_info_change_ready(&self);

    /// Flush decoder-internal state on a discontinuity (new SSRC adoption,
    /// §4.D "the decoder adapter must honor [a discontinuity marker]:
    /// flush on next feed").
    fn flush(&self);
}
