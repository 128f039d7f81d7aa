//! Frame slot pool: the PRIME fd / framebuffer-ID / dumb-buffer-handle
//! bijection the hardware decoder adapter owns for the lifetime of one
//! negotiated format (Decoder Frame Slot, data model §3; invariant I5).
//!
//! Mirrors the deterministic teardown order design note: remove FB, close
//! fd, destroy dumb buffer, in that order, so a half-torn-down slot never
//! leaves a dangling kernel object.

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use crate::drm::DrmDevice;
use crate::error::DecoderError;

/// One pool entry: a DMA-BUF shared between the decoder and the display.
pub struct FrameSlot {
    pub prime_fd: RawFd,
    pub fb_id: u32,
    pub handle: u32,
}

impl FrameSlot {
    fn destroy(self, device: &DrmDevice) {
        device.remove_framebuffer(self.fb_id);
        unsafe {
            libc::close(self.prime_fd);
        }
        device.destroy_dumb_buffer(self.handle);
    }
}

/// Format negotiated at the most recent info-change; determines dumb-buffer
/// sizing for every slot allocated until the next info-change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub bpp: u32,
}

/// Fixed-size pool of frame slots, rebuilt on every decoder info-change.
pub struct FramePool {
    slots: Vec<FrameSlot>,
    by_prime_fd: HashMap<RawFd, usize>,
    format: Option<FrameFormat>,
}

impl Default for FramePool {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            by_prime_fd: HashMap::new(),
            format: None,
        }
    }
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn format(&self) -> Option<FrameFormat> {
        self.format
    }

    /// Tear down the existing pool (if any) and allocate `count` fresh
    /// slots sized for `format`. Resource exhaustion during allocation is
    /// non-fatal: the pool keeps whatever slots it managed to build, and
    /// the caller (decoder adapter) surfaces an error only if zero slots
    /// came out usable (§7 resource-exhaustion policy).
    pub fn rebuild(
        &mut self,
        device: &DrmDevice,
        count: usize,
        format: FrameFormat,
    ) -> Result<(), DecoderError> {
        self.teardown(device);

        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match Self::allocate_one(device, format) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    log::warn!("frame slot allocation failed, continuing with reduced pool: {e}");
                }
            }
        }

        if slots.is_empty() {
            return Err(DecoderError::ResourceExhausted(
                "no usable frame slots after pool rebuild",
            ));
        }

        self.by_prime_fd = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.prime_fd, i))
            .collect();
        self.slots = slots;
        self.format = Some(format);
        Ok(())
    }

    fn allocate_one(device: &DrmDevice, format: FrameFormat) -> Result<FrameSlot, DecoderError> {
        let height = format.ver_stride * 2; // NV12: luma + chroma plane stacked
        let handle = device
            .create_dumb_buffer(format.hor_stride, height, format.bpp)
            .map_err(|e| DecoderError::ResourceExhaustedDetail(e.to_string()))?;

        let prime_fd = device.export_prime_fd(handle).map_err(|e| {
            device.destroy_dumb_buffer(handle);
            DecoderError::ResourceExhaustedDetail(e.to_string())
        })?;

        let pitch = device.dumb_buffer_pitch(handle);
        let fb_id = device
            .add_nv12_framebuffer(
                handle,
                format.hor_stride,
                height,
                pitch,
                pitch * format.ver_stride,
            )
            .map_err(|e| {
                unsafe {
                    libc::close(prime_fd);
                }
                device.destroy_dumb_buffer(handle);
                DecoderError::ResourceExhaustedDetail(e.to_string())
            })?;

        Ok(FrameSlot {
            prime_fd,
            fb_id,
            handle,
        })
    }

    /// I5: every decoded frame's DMA-BUF maps to exactly one fb_id for the
    /// pool's lifetime; this is the lookup the producer thread uses per
    /// decoded frame.
    pub fn fb_id_for_prime_fd(&self, fd: RawFd) -> Option<u32> {
        self.by_prime_fd.get(&fd).map(|&i| self.slots[i].fb_id)
    }

    pub fn prime_fds(&self) -> Vec<RawFd> {
        self.slots.iter().map(|s| s.prime_fd).collect()
    }

    pub fn teardown(&mut self, device: &DrmDevice) {
        for slot in self.slots.drain(..) {
            slot.destroy(device);
        }
        self.by_prime_fd.clear();
        self.format = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_has_no_format() {
        let pool = FramePool::new();
        assert!(pool.is_empty());
        assert!(pool.format().is_none());
    }

    #[test]
    fn lookup_misses_on_unknown_fd() {
        let pool = FramePool::new();
        assert_eq!(pool.fb_id_for_prime_fd(42), None);
    }
}
