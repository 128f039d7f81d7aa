//! DRM/KMS plane presentation (component F).
//!
//! No crate in the example pack touches DRM/KMS directly; this module is a
//! deliberate, real-crate addition (`drm` + `drm-fourcc`, see DESIGN.md)
//! rather than a reuse of teacher code, kept as small and as pure-function
//! heavy as possible (`zoom`, `plane`) so the parts that do not require
//! real hardware are still directly unit-tested.

mod device;
mod plane;
mod presenter;
mod zoom;

pub use device::{DrmDevice, PlaneProps};
pub use plane::{FormatSupport, PlaneCandidate, PlaneKind};
pub use presenter::Presenter;
pub use zoom::{enforce_scaler_cap, letterbox, resolve_zoom_rect, Rect, ZoomRequest};
