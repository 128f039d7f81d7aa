//! DRM Plane Presenter (component F): the consumer thread that turns
//! decoded frames into atomic-commit page flips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drm::control::atomic::AtomicModeReq;
use drm::control::property;
use parking_lot::Mutex;

use crate::decoder::Frame;
use crate::slot_channel::SlotChannel;

use super::device::DrmDevice;
use super::zoom::{enforce_scaler_cap, letterbox, resolve_zoom_rect, Rect, ZoomRequest};

const CONSUMER_WAIT: Duration = Duration::from_millis(100);

/// Resolved zoom state, re-derived whenever the source dimensions or the
/// requested zoom change (data model §3).
#[derive(Default)]
struct ZoomState {
    request: Option<ZoomRequest>,
    rect: Option<Rect>,
    source: (u32, u32),
    last_fb_id: u32,
}

pub struct Presenter {
    device: Arc<DrmDevice>,
    zoom: Mutex<ZoomState>,
    scaler_max_ratio: f64,
}

impl Presenter {
    pub fn new(device: Arc<DrmDevice>, scaler_max_ratio: f64) -> Self {
        Self {
            device,
            zoom: Mutex::new(ZoomState::default()),
            scaler_max_ratio,
        }
    }

    /// Replace the active zoom request. Takes effect on the next presented
    /// frame; the rectangle is re-resolved against that frame's dimensions.
    pub fn set_zoom(&self, request: Option<ZoomRequest>) {
        let mut zoom = self.zoom.lock();
        zoom.request = request;
        zoom.rect = None; // force re-resolution against the next frame's size
    }

    /// Run the consumer loop: wait on the single-slot channel from the
    /// decoder producer thread, and atomic-commit each new frame. Returns
    /// when `stop` is set.
    pub fn run(&self, pending: &SlotChannel<Frame>, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            let frame = match pending.wait_timeout(CONSUMER_WAIT) {
                Some(f) => f,
                None => continue,
            };

            if frame.error || frame.discard || frame.eos {
                log::debug!(
                    "dropping frame fb_id={} error={} discard={} eos={}",
                    frame.fb_id,
                    frame.error,
                    frame.discard,
                    frame.eos
                );
                continue;
            }

            if let Err(e) = self.present(&frame) {
                log::error!("atomic commit failed: {e}");
            }
        }
        self.release_plane();
    }

    fn present(&self, frame: &Frame) -> std::io::Result<()> {
        let mode_w = self.device.modeset.mode_w;
        let mode_h = self.device.modeset.mode_h;

        let mut zoom = self.zoom.lock();
        if zoom.source != (frame.width, frame.height) {
            zoom.source = (frame.width, frame.height);
            zoom.rect = None;
        }
        if zoom.rect.is_none() {
            zoom.rect = zoom.request.map(|req| {
                let rect = resolve_zoom_rect(frame.width, frame.height, req);
                enforce_scaler_cap(rect, frame.width, frame.height, mode_w, mode_h, self.scaler_max_ratio)
            });
        }
        let src_rect = zoom.rect.unwrap_or(Rect {
            x: 0,
            y: 0,
            w: frame.width,
            h: frame.height,
        });
        zoom.last_fb_id = frame.fb_id;
        drop(zoom);

        let dst = letterbox(src_rect.w, src_rect.h, mode_w, mode_h);

        let req = self.build_commit(frame.fb_id, src_rect, dst);
        match self.device.commit_atomic(req, false) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => {
                let req = self.build_commit(frame.fb_id, src_rect, dst);
                self.device.commit_atomic(req, true)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-commit the last-presented frame under a new zoom rectangle, used
    /// when only the zoom changes and no new decoded frame has arrived yet.
    pub fn recommit_for_zoom_change(&self) -> std::io::Result<()> {
        let (fb_id, width, height) = {
            let zoom = self.zoom.lock();
            (zoom.last_fb_id, zoom.source.0, zoom.source.1)
        };
        if fb_id == 0 {
            return Ok(());
        }
        let frame = Frame {
            fb_id,
            width,
            height,
            hor_stride: 0,
            ver_stride: 0,
            pts_ns: 0,
            error: false,
            discard: false,
            eos: false,
        };
        self.present(&frame)
    }

    fn build_commit(&self, fb_id: u32, src: Rect, dst: Rect) -> AtomicModeReq {
        let mut req = AtomicModeReq::new();
        let props = &self.device.props;
        let plane = self.device.plane_id;

        req.add_property(plane, props.fb_id, property::Value::Unsigned(fb_id as u64));
        req.add_property(
            plane,
            props.crtc_id,
            property::Value::Unsigned(self.device.modeset.crtc_id as u64),
        );
        req.add_property(plane, props.crtc_x, property::Value::SignedRange(dst.x as i64, -32768, 32767));
        req.add_property(plane, props.crtc_y, property::Value::SignedRange(dst.y as i64, -32768, 32767));
        req.add_property(plane, props.crtc_w, property::Value::Unsigned(dst.w as u64));
        req.add_property(plane, props.crtc_h, property::Value::Unsigned(dst.h as u64));

        // SRC_* are Q16.16 fixed point.
        req.add_property(plane, props.src_x, property::Value::Unsigned((src.x as u64) << 16));
        req.add_property(plane, props.src_y, property::Value::Unsigned((src.y as u64) << 16));
        req.add_property(plane, props.src_w, property::Value::Unsigned((src.w as u64) << 16));
        req.add_property(plane, props.src_h, property::Value::Unsigned((src.h as u64) << 16));

        req
    }

    /// Shutdown: push an empty commit releasing the plane (FB_ID=0,
    /// CRTC_ID=0), per §4.F shutdown semantics.
    pub fn release_plane(&self) {
        let mut req = AtomicModeReq::new();
        let props = &self.device.props;
        let plane = self.device.plane_id;
        req.add_property(plane, props.fb_id, property::Value::Unsigned(0));
        req.add_property(plane, props.crtc_id, property::Value::Unsigned(0));
        if let Err(e) = self.device.commit_atomic(req, true) {
            log::warn!("failed to release plane on shutdown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::zoom::ZoomRequest;

    // Presenter itself needs a real DRM device to exercise end-to-end; the
    // rectangle math it calls through (`resolve_zoom_rect`, `letterbox`,
    // `enforce_scaler_cap`) is covered directly in `zoom.rs`. This test
    // only pins the request struct's field semantics used by `set_zoom`.
    #[test]
    fn zoom_request_is_plain_percent_data() {
        let req = ZoomRequest {
            scale_x_pct: 50.0,
            scale_y_pct: 50.0,
            center_x_pct: 50.0,
            center_y_pct: 50.0,
        };
        assert_eq!(req.scale_x_pct, 50.0);
    }
}
