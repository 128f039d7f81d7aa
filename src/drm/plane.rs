//! Overlay plane selection and scoring.
//!
//! Querying plane capabilities requires a real DRM device (IN_FORMATS blob
//! or a TEST_ONLY atomic commit, see [`super::device`]); the scoring and
//! "pick the best candidate" logic itself is pure and is exercised directly
//! by unit tests, the same separation [`super::zoom`] uses for rectangle
//! math.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneKind {
    Overlay,
    Primary,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSupport {
    Nv12,
    Yuyv,
    Rgb,
    None,
}

/// One candidate plane observed on the target CRTC.
#[derive(Debug, Clone, Copy)]
pub struct PlaneCandidate {
    pub plane_id: u32,
    pub kind: PlaneKind,
    pub format: FormatSupport,
    pub permitted_on_crtc: bool,
    pub accepts_linear_nv12: bool,
}

fn score(candidate: &PlaneCandidate) -> i32 {
    let mut s = match candidate.kind {
        PlaneKind::Overlay => 400,
        PlaneKind::Primary => 200,
        PlaneKind::Other => 100,
    };
    s += match candidate.format {
        FormatSupport::Nv12 => 150,
        FormatSupport::Yuyv => 120,
        FormatSupport::Rgb => 40,
        FormatSupport::None => 0,
    };
    s
}

/// Pick the best plane among `candidates` that is permitted on the target
/// CRTC and accepts linear NV12. Ties break on the lower plane-id.
pub fn pick_best(candidates: &[PlaneCandidate]) -> Option<u32> {
    candidates
        .iter()
        .filter(|c| c.permitted_on_crtc && c.accepts_linear_nv12)
        .max_by(|a, b| {
            score(a)
                .cmp(&score(b))
                .then_with(|| b.plane_id.cmp(&a.plane_id))
        })
        .map(|c| c.plane_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, kind: PlaneKind, format: FormatSupport) -> PlaneCandidate {
        PlaneCandidate {
            plane_id: id,
            kind,
            format,
            permitted_on_crtc: true,
            accepts_linear_nv12: true,
        }
    }

    #[test]
    fn overlay_nv12_beats_primary_nv12() {
        let overlay = candidate(10, PlaneKind::Overlay, FormatSupport::Nv12);
        let primary = candidate(5, PlaneKind::Primary, FormatSupport::Nv12);
        assert_eq!(pick_best(&[primary, overlay]), Some(10));
    }

    #[test]
    fn ties_break_on_lower_plane_id() {
        let a = candidate(20, PlaneKind::Overlay, FormatSupport::Nv12);
        let b = candidate(5, PlaneKind::Overlay, FormatSupport::Nv12);
        assert_eq!(pick_best(&[a, b]), Some(5));
    }

    #[test]
    fn planes_not_permitted_on_crtc_are_excluded() {
        let mut bad = candidate(1, PlaneKind::Overlay, FormatSupport::Nv12);
        bad.permitted_on_crtc = false;
        let ok = candidate(2, PlaneKind::Other, FormatSupport::Rgb);
        assert_eq!(pick_best(&[bad, ok]), Some(2));
    }

    #[test]
    fn planes_rejecting_linear_nv12_are_excluded() {
        let mut bad = candidate(1, PlaneKind::Overlay, FormatSupport::Nv12);
        bad.accepts_linear_nv12 = false;
        assert_eq!(pick_best(&[bad]), None);
    }

    #[test]
    fn no_candidates_returns_none() {
        assert_eq!(pick_best(&[]), None);
    }
}
