//! Zoom rectangle resolution and letterbox aspect math (component F).
//!
//! Kept free of any DRM handle so the alignment/letterboxing invariants
//! (I6, Testable Properties 10–11) are exercised with plain unit tests, the
//! way the RTP header parser's byte-level invariants are tested without a
//! socket.

/// Pixel rectangle, always §3 I6-aligned when produced by this module:
/// `x+w <= source_w`, `y+h <= source_h`, `w%4==0`, `h%4==0`, `x%2==0`,
/// `y%2==0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A requested zoom in percent-of-source units, resolved against the
/// current source dimensions whenever they change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRequest {
    pub scale_x_pct: f64,
    pub scale_y_pct: f64,
    pub center_x_pct: f64,
    pub center_y_pct: f64,
}

fn align_down(value: u32, boundary: u32) -> u32 {
    value - (value % boundary)
}

fn align_up(value: u32, boundary: u32) -> u32 {
    align_down(value + boundary - 1, boundary)
}

fn round_to(value: i64, boundary: i64) -> i64 {
    ((value + boundary / 2) / boundary) * boundary
}

/// Resolve a zoom request into an aligned pixel rectangle on a source of
/// `src_w x src_h`. `scale_*_pct` is the visible fraction of the source
/// (100 = no zoom, 50 = zoomed in 2x), `center_*_pct` is the requested
/// center of view as a percentage of source dimensions.
pub fn resolve_zoom_rect(src_w: u32, src_h: u32, request: ZoomRequest) -> Rect {
    let scale_x = (request.scale_x_pct / 100.0).clamp(0.01, 1.0);
    let scale_y = (request.scale_y_pct / 100.0).clamp(0.01, 1.0);

    let raw_w = (src_w as f64 * scale_x).round() as i64;
    let raw_h = (src_h as f64 * scale_y).round() as i64;

    let w = align_down(round_to(raw_w, 4).max(4) as u32, 4).min(align_down(src_w, 4));
    let h = align_down(round_to(raw_h, 4).max(4) as u32, 4).min(align_down(src_h, 4));

    let center_x = (request.center_x_pct / 100.0 * src_w as f64).round() as i64;
    let center_y = (request.center_y_pct / 100.0 * src_h as f64).round() as i64;

    let raw_x = center_x - (w as i64) / 2;
    let raw_y = center_y - (h as i64) / 2;

    let max_x = src_w.saturating_sub(w) as i64;
    let max_y = src_h.saturating_sub(h) as i64;

    let x = align_down(round_to(raw_x, 2).clamp(0, max_x) as u32, 2);
    let y = align_down(round_to(raw_y, 2).clamp(0, max_y) as u32, 2);

    Rect { x, y, w, h }
}

/// Letterboxed destination rectangle preserving source aspect ratio inside
/// `mode_w x mode_h` (Testable Property 11).
pub fn letterbox(src_w: u32, src_h: u32, mode_w: u32, mode_h: u32) -> Rect {
    let src_ratio = src_w as f64 / src_h as f64;
    let mode_ratio = mode_w as f64 / mode_h as f64;

    let (dst_w, dst_h) = if src_ratio > mode_ratio {
        let dst_w = mode_w;
        let dst_h = ((mode_w as f64 * src_h as f64 / src_w as f64).round() as u32).max(1);
        (dst_w, dst_h)
    } else {
        let dst_h = mode_h;
        let dst_w = ((mode_h as f64 * src_w as f64 / src_h as f64).round() as u32).max(1);
        (dst_w, dst_h)
    };

    let dst_x = (mode_w.saturating_sub(dst_w)) / 2;
    let dst_y = (mode_h.saturating_sub(dst_h)) / 2;

    Rect {
        x: dst_x,
        y: dst_y,
        w: dst_w,
        h: dst_h,
    }
}

/// Grow `rect` toward its own center, within `(src_w, src_h)`, until the
/// upscale ratio implied by displaying it at `(mode_w, mode_h)` (via
/// [`letterbox`]) is at most `max_ratio` on both axes. Scaler hardware on
/// the target platform caps upscaling (documented as 4x on one reference
/// board, treated here as the configurable `scaler_max_ratio`, Open
/// Question #2).
pub fn enforce_scaler_cap(
    rect: Rect,
    src_w: u32,
    src_h: u32,
    mode_w: u32,
    mode_h: u32,
    max_ratio: f64,
) -> Rect {
    // The destination cannot exceed the output mode regardless of source
    // aspect, so mode_w/mode_h is a sound upper bound on dst_w/dst_h for
    // computing the minimum source window the scaler can still honor.
    let min_w = ((mode_w as f64 / max_ratio).ceil() as u32).min(src_w);
    let min_h = ((mode_h as f64 / max_ratio).ceil() as u32).min(src_h);

    if rect.w >= min_w && rect.h >= min_h {
        return rect;
    }

    let center_x = rect.x as i64 + rect.w as i64 / 2;
    let center_y = rect.y as i64 + rect.h as i64 / 2;

    let new_w = align_up(rect.w.max(min_w), 4)
        .min(align_down(src_w, 4))
        .max(4);
    let new_h = align_up(rect.h.max(min_h), 4)
        .min(align_down(src_h, 4))
        .max(4);

    let max_x = src_w.saturating_sub(new_w) as i64;
    let max_y = src_h.saturating_sub(new_h) as i64;

    let new_x = align_down(
        (center_x - new_w as i64 / 2).clamp(0, max_x) as u32,
        2,
    );
    let new_y = align_down(
        (center_y - new_h as i64 / 2).clamp(0, max_y) as u32,
        2,
    );

    Rect {
        x: new_x,
        y: new_y,
        w: new_w,
        h: new_h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_aligned(rect: Rect, src_w: u32, src_h: u32) {
        assert_eq!(rect.w % 4, 0, "w not 4-aligned: {:?}", rect);
        assert_eq!(rect.h % 4, 0, "h not 4-aligned: {:?}", rect);
        assert_eq!(rect.x % 2, 0, "x not 2-aligned: {:?}", rect);
        assert_eq!(rect.y % 2, 0, "y not 2-aligned: {:?}", rect);
        assert!(rect.x + rect.w <= src_w);
        assert!(rect.y + rect.h <= src_h);
    }

    #[test]
    fn zoom_50_percent_centered_on_1920x1080() {
        let rect = resolve_zoom_rect(
            1920,
            1080,
            ZoomRequest {
                scale_x_pct: 50.0,
                scale_y_pct: 50.0,
                center_x_pct: 50.0,
                center_y_pct: 50.0,
            },
        );
        assert_eq!(rect, Rect { x: 480, y: 270, w: 960, h: 540 });
        assert_aligned(rect, 1920, 1080);
    }

    #[test]
    fn zoom_rect_is_centered_within_two_pixels_for_arbitrary_requests() {
        let cases = [
            (50.0, 50.0, 25.0, 75.0),
            (33.0, 80.0, 10.0, 90.0),
            (75.0, 75.0, 50.0, 50.0),
            (10.0, 10.0, 0.0, 0.0),
            (100.0, 100.0, 50.0, 50.0),
        ];
        for (sx, sy, cx, cy) in cases {
            let rect = resolve_zoom_rect(
                1920,
                1080,
                ZoomRequest {
                    scale_x_pct: sx,
                    scale_y_pct: sy,
                    center_x_pct: cx,
                    center_y_pct: cy,
                },
            );
            assert_aligned(rect, 1920, 1080);
            let want_center_x = (cx / 100.0 * 1920.0).round() as i64;
            let want_center_y = (cy / 100.0 * 1080.0).round() as i64;
            let got_center_x = rect.x as i64 + rect.w as i64 / 2;
            let got_center_y = rect.y as i64 + rect.h as i64 / 2;
            // Clamped near the edges the center can't be honored exactly;
            // only assert tightness away from the boundary.
            if want_center_x - (rect.w as i64 / 2) >= 0
                && want_center_x + (rect.w as i64 / 2) <= 1920
            {
                assert!((got_center_x - want_center_x).abs() <= 2);
            }
            if want_center_y - (rect.h as i64 / 2) >= 0
                && want_center_y + (rect.h as i64 / 2) <= 1080
            {
                assert!((got_center_y - want_center_y).abs() <= 2);
            }
        }
    }

    #[test]
    fn letterbox_wide_source_into_narrower_mode() {
        let rect = letterbox(1920, 1080, 1280, 720);
        assert_eq!(rect, Rect { x: 0, y: 0, w: 1280, h: 720 });
    }

    #[test]
    fn letterbox_narrow_source_pillarboxes_horizontally() {
        let rect = letterbox(1440, 1080, 1280, 720);
        assert_eq!(rect.h, 720);
        assert_eq!(rect.w, 960);
        assert_eq!(rect.x, 160);
    }

    #[test]
    fn letterbox_never_produces_zero_dimension() {
        let rect = letterbox(10_000, 1, 1280, 720);
        assert!(rect.w >= 1);
        assert!(rect.h >= 1);
    }

    #[test]
    fn scaler_cap_grows_rect_until_within_ratio() {
        // Zoomed to a 240x135 window (an 8x upscale to 1920x1080) should be
        // grown until the ratio is at most 4x, i.e. at least 480x270.
        let tight = Rect { x: 840, y: 472, w: 240, h: 136 };
        let grown = enforce_scaler_cap(tight, 1920, 1080, 1920, 1080, 4.0);
        assert!(grown.w >= 480);
        assert!(grown.h >= 270);
        assert_eq!(grown.w % 4, 0);
        assert_eq!(grown.h % 4, 0);
        assert_eq!(grown.x % 2, 0);
        assert_eq!(grown.y % 2, 0);
    }

    #[test]
    fn scaler_cap_is_a_no_op_when_already_within_ratio() {
        let rect = Rect { x: 0, y: 0, w: 1920, h: 1080 };
        let same = enforce_scaler_cap(rect, 1920, 1080, 1920, 1080, 4.0);
        assert_eq!(same, rect);
    }
}
