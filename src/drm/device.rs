//! Thin wrapper around a `/dev/dri/cardN` file descriptor.
//!
//! Every raw `drm`/`drm-fourcc` ioctl call in the crate goes through this
//! module so the rest of the presenter and decoder-adapter code reads as
//! plain Rust against a small capability surface, the same separation the
//! BASS FFI bindings keep between `ffi::bass` (raw typedefs) and the
//! higher-level stream code that calls into them.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::Path;

use drm::buffer::DrmFourcc;
use drm::control::{
    atomic::AtomicModeReq, property, AtomicCommitFlags, Device as ControlDevice, PlaneType,
};
use drm::Device as BaseDevice;
use drm_fourcc::DrmModifier;

use crate::config::ModesetResult;
use crate::error::PresenterError;

use super::plane::{FormatSupport, PlaneCandidate, PlaneKind};

/// `/dev/dri/cardN` handle implementing the `drm` crate's device traits.
pub struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}
impl AsRawFd for Card {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}
impl BaseDevice for Card {}
impl ControlDevice for Card {}

/// Cached overlay-plane property IDs, looked up once at startup (§4.F: "the
/// presenter caches property IDs for the overlay plane"). Reads of this
/// struct from other threads are lock-free, matching the concurrency
/// model's note that the DRM fd itself is presenter-owned and every other
/// access is a read of state fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct PlaneProps {
    pub fb_id: property::Handle,
    pub crtc_id: property::Handle,
    pub crtc_x: property::Handle,
    pub crtc_y: property::Handle,
    pub crtc_w: property::Handle,
    pub crtc_h: property::Handle,
    pub src_x: property::Handle,
    pub src_y: property::Handle,
    pub src_w: property::Handle,
    pub src_h: property::Handle,
}

pub struct DrmDevice {
    card: Card,
    pub modeset: ModesetResult,
    pub plane_id: drm::control::plane::Handle,
    pub props: PlaneProps,
}

impl DrmDevice {
    /// Open the DRM node and cache the overlay plane's property IDs. The
    /// modeset itself (connector/CRTC/mode) is performed by an external
    /// collaborator (§6); this only opens the fd and resolves the plane
    /// that was handed in.
    pub fn open(path: &Path, modeset: ModesetResult) -> Result<Self, PresenterError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(PresenterError::Drm)?;
        let card = Card(file);

        let requested = drm::control::plane::Handle::from(modeset.video_plane_id);
        let plane_id = if Self::plane_accepts_linear_nv12_on_crtc(&card, requested, modeset.crtc_id) {
            requested
        } else {
            log::warn!(
                "configured plane {} does not accept linear NV12 on crtc {}, probing for a fallback",
                modeset.video_plane_id, modeset.crtc_id
            );
            Self::pick_fallback_plane(&card, modeset.crtc_id)?
        };
        let props = Self::cache_plane_props(&card, plane_id)?;

        Ok(Self {
            card,
            modeset,
            plane_id,
            props,
        })
    }

    fn plane_accepts_linear_nv12_on_crtc(
        card: &Card,
        plane: drm::control::plane::Handle,
        crtc_id: u32,
    ) -> bool {
        let Ok(info) = card.get_plane(plane) else {
            return false;
        };
        let permitted_on_crtc = info
            .possible_crtcs()
            .contains(drm::control::crtc::Handle::from(crtc_id));
        permitted_on_crtc
            && info.formats().contains(&DrmFourcc::Nv12)
            && Self::probe_linear_nv12(card, plane, crtc_id)
    }

    fn cache_plane_props(
        card: &Card,
        plane_id: drm::control::plane::Handle,
    ) -> Result<PlaneProps, PresenterError> {
        let mut find = |name: &str| -> Result<property::Handle, PresenterError> {
            Self::find_plane_property(card, plane_id, name)
                .ok_or(PresenterError::ModesetInvalid("missing plane property"))
        };

        Ok(PlaneProps {
            fb_id: find("FB_ID")?,
            crtc_id: find("CRTC_ID")?,
            crtc_x: find("CRTC_X")?,
            crtc_y: find("CRTC_Y")?,
            crtc_w: find("CRTC_W")?,
            crtc_h: find("CRTC_H")?,
            src_x: find("SRC_X")?,
            src_y: find("SRC_Y")?,
            src_w: find("SRC_W")?,
            src_h: find("SRC_H")?,
        })
    }

    /// Walk every plane on the device, scoring candidates for `crtc_id`, and
    /// pick the best one that can present linear NV12. Called from `open`
    /// when the configured plane fails its probe commit, and exposed so a
    /// caller can re-probe after a hotplug/connector change.
    pub fn select_fallback_plane(&self) -> Result<drm::control::plane::Handle, PresenterError> {
        Self::pick_fallback_plane(&self.card, self.modeset.crtc_id)
    }

    fn pick_fallback_plane(
        card: &Card,
        crtc_id: u32,
    ) -> Result<drm::control::plane::Handle, PresenterError> {
        let resources = card
            .plane_handles()
            .map_err(|e| PresenterError::CommitFailed(e.to_string()))?;

        let mut candidates = Vec::new();
        for handle in resources {
            let info = match card.get_plane(handle) {
                Ok(i) => i,
                Err(_) => continue,
            };

            let permitted_on_crtc = info
                .possible_crtcs()
                .contains(drm::control::crtc::Handle::from(crtc_id));

            let kind = match card.get_plane_type(handle) {
                Some(PlaneType::Overlay) => PlaneKind::Overlay,
                Some(PlaneType::Primary) => PlaneKind::Primary,
                _ => PlaneKind::Other,
            };

            let format = if info.formats().contains(&DrmFourcc::Nv12) {
                FormatSupport::Nv12
            } else if info.formats().contains(&DrmFourcc::Yuyv) {
                FormatSupport::Yuyv
            } else if info
                .formats()
                .iter()
                .any(|f| matches!(f, DrmFourcc::Xrgb8888 | DrmFourcc::Argb8888))
            {
                FormatSupport::Rgb
            } else {
                FormatSupport::None
            };

            let accepts_linear_nv12 =
                format == FormatSupport::Nv12 && Self::probe_linear_nv12(card, handle, crtc_id);

            candidates.push(PlaneCandidate {
                plane_id: Into::<u32>::into(handle),
                kind,
                format,
                permitted_on_crtc,
                accepts_linear_nv12,
            });
        }

        super::plane::pick_best(&candidates)
            .map(drm::control::plane::Handle::from)
            .ok_or(PresenterError::NoUsablePlane)
    }

    /// Prefer the IN_FORMATS blob when present; fall back to a TEST_ONLY
    /// atomic commit against a 64x64 scratch framebuffer (§4.F).
    fn probe_linear_nv12(card: &Card, plane: drm::control::plane::Handle, crtc_id: u32) -> bool {
        if let Ok(modifiers) = card.get_in_formats(plane) {
            return modifiers
                .iter()
                .any(|(fourcc, modifier)| *fourcc == DrmFourcc::Nv12 && *modifier == DrmModifier::Linear);
        }
        Self::test_only_commit_scratch(card, plane, crtc_id).is_ok()
    }

    fn test_only_commit_scratch(
        card: &Card,
        plane: drm::control::plane::Handle,
        crtc_id: u32,
    ) -> io::Result<()> {
        let format = drm::buffer::DrmFourcc::Nv12;
        let dumb = card.create_dumb_buffer((64, 64), format, 8)?;
        let fb = card.add_framebuffer(&dumb, 8, 8);
        let result = match fb {
            Ok(fb_handle) => {
                let fb_id_prop = Self::find_plane_property(card, plane, "FB_ID");
                let crtc_id_prop = Self::find_plane_property(card, plane, "CRTC_ID");
                let r = match (fb_id_prop, crtc_id_prop) {
                    (Some(fb_id_prop), Some(crtc_id_prop)) => {
                        let mut req = AtomicModeReq::new();
                        req.add_property(plane, fb_id_prop, property::Value::Unsigned(fb_handle.into()));
                        req.add_property(plane, crtc_id_prop, property::Value::Unsigned(crtc_id as u64));
                        card.atomic_commit(AtomicCommitFlags::TEST_ONLY, req)
                    }
                    _ => Err(io::Error::new(io::ErrorKind::NotFound, "plane missing FB_ID/CRTC_ID property")),
                };
                let _ = card.destroy_framebuffer(fb_handle);
                r
            }
            Err(e) => Err(e),
        };
        let _ = card.destroy_dumb_buffer(dumb);
        result
    }

    fn find_plane_property(
        card: &Card,
        plane: drm::control::plane::Handle,
        name: &str,
    ) -> Option<property::Handle> {
        let values = card.get_properties(plane).ok()?;
        for (handle, _) in values.as_hashmap() {
            if let Ok(info) = card.get_property(*handle) {
                if info.name().to_str().unwrap_or("") == name {
                    return Some(*handle);
                }
            }
        }
        None
    }

    // -- frame pool support (called by the decoder adapter's producer thread) --

    pub fn create_dumb_buffer(&self, width: u32, height: u32, bpp: u32) -> io::Result<u32> {
        let dumb = self
            .card
            .create_dumb_buffer((width, height), DrmFourcc::Nv12, bpp)?;
        Ok(dumb.handle().into())
    }

    pub fn destroy_dumb_buffer(&self, handle: u32) {
        let handle = drm::buffer::Handle::from(handle);
        // Best-effort: resource exhaustion on teardown is logged, not fatal.
        if let Err(e) = self.card.destroy_dumb_buffer_raw(handle) {
            log::warn!("failed to destroy dumb buffer {handle:?}: {e}");
        }
    }

    pub fn dumb_buffer_pitch(&self, handle: u32) -> u32 {
        let handle = drm::buffer::Handle::from(handle);
        self.card.dumb_buffer_pitch(handle).unwrap_or(0)
    }

    pub fn export_prime_fd(&self, handle: u32) -> io::Result<RawFd> {
        let handle = drm::buffer::Handle::from(handle);
        self.card.buffer_to_prime_fd(handle, libc::O_CLOEXEC as u32)
    }

    pub fn add_nv12_framebuffer(
        &self,
        handle: u32,
        width: u32,
        height: u32,
        luma_pitch: u32,
        chroma_offset: u32,
    ) -> io::Result<u32> {
        let handle = drm::buffer::Handle::from(handle);
        let buffer = Nv12Buffer {
            handle,
            width,
            height,
            pitch: luma_pitch,
            chroma_offset,
        };
        let fb = self
            .card
            .add_planar_framebuffer(&buffer, drm::control::FbCmd2Flags::empty())?;
        Ok(fb.into())
    }

    pub fn remove_framebuffer(&self, fb_id: u32) {
        let handle = drm::control::framebuffer::Handle::from(fb_id);
        if let Err(e) = self.card.destroy_framebuffer(handle) {
            log::warn!("failed to remove framebuffer {fb_id}: {e}");
        }
    }

    pub fn commit_atomic(&self, req: AtomicModeReq, blocking: bool) -> io::Result<()> {
        // Non-blocking atomic commits are the fast page-flip path (§4.F);
        // the EBUSY retry drops NONBLOCK so the ioctl blocks until the
        // kernel can apply it, rather than requesting a full modeset.
        let flags = if blocking {
            AtomicCommitFlags::empty()
        } else {
            AtomicCommitFlags::NONBLOCK
        };
        self.card.atomic_commit(flags, req)
    }

    pub fn as_raw_fd(&self) -> RawFd {
        AsRawFd::as_raw_fd(&self.card)
    }
}

/// Two-plane NV12 buffer description for `add_planar_framebuffer`: Y plane
/// at offset 0, interleaved UV plane at `chroma_offset` (§4.E step 3).
struct Nv12Buffer {
    handle: drm::buffer::Handle,
    width: u32,
    height: u32,
    pitch: u32,
    chroma_offset: u32,
}

impl drm::buffer::Buffer for Nv12Buffer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    fn format(&self) -> DrmFourcc {
        DrmFourcc::Nv12
    }
    fn pitch(&self) -> u32 {
        self.pitch
    }
    fn handle(&self) -> drm::buffer::Handle {
        self.handle
    }
}

impl drm::buffer::PlanarBuffer for Nv12Buffer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    fn format(&self) -> DrmFourcc {
        DrmFourcc::Nv12
    }
    fn pitches(&self) -> [u32; 4] {
        [self.pitch, self.pitch, 0, 0]
    }
    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        [Some(self.handle), Some(self.handle), None, None]
    }
    fn offsets(&self) -> [u32; 4] {
        [0, self.chroma_offset, 0, 0]
    }
}
