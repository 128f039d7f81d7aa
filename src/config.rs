//! External configuration shape.
//!
//! The core never parses INI/CLI text itself (out of scope); it only
//! consumes a populated [`Config`]. `main.rs` builds one from a minimal set
//! of flags/environment variables for standalone runs.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP bind address for the RTP socket. Default port 5600.
    pub bind_addr: SocketAddr,
    /// Payload type carrying H.265 video.
    pub video_pt: u8,
    /// Payload type carrying Opus audio, if the audio branch is enabled.
    pub audio_pt: Option<u8>,
    /// Maximum accepted UDP datagram size; larger datagrams are dropped.
    pub max_datagram: usize,
    /// Number of reusable receive buffers in the socket reader's pool.
    pub recv_buffers: usize,
    /// Up to this many datagrams are drained per wake before re-polling.
    pub recv_batch: usize,

    /// HTTP path requested for keyframe refresh.
    pub idr_path: String,
    /// Destination port for the IDR HTTP GET.
    pub idr_port: u16,
    /// Connect/send/recv timeout for the IDR HTTP client.
    #[serde(with = "duration_ms")]
    pub idr_timeout: Duration,
    /// Number of initial attempts issued at `idr_burst_interval` before the
    /// schedule switches to exponential backoff.
    pub idr_burst_count: u32,
    #[serde(with = "duration_ms")]
    pub idr_burst_interval: Duration,
    #[serde(with = "duration_ms")]
    pub idr_min_interval: Duration,
    #[serde(with = "duration_ms")]
    pub idr_max_interval: Duration,
    #[serde(with = "duration_ms")]
    pub idr_quiet_reset: Duration,
    pub idr_reinit_threshold: u32,

    /// Frame slot pool size for the decoder adapter.
    pub decoder_slots: usize,
    /// Bound on the decoder's packet input buffer.
    pub decoder_read_buf: usize,
    /// Path to the vendor decoder's dynamic library, if present on disk.
    pub decoder_lib_path: Option<String>,

    /// Upscale cap enforced by the presenter's zoom rectangle growth
    /// (Open Question #2 in the design notes: platform-specific, default 4x).
    pub scaler_max_ratio: f64,

    /// Optional CPU core list the receiver thread is pinned to.
    pub cpu_affinity: Option<Vec<usize>>,

    /// Default `env_logger` filter level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5600".parse().unwrap(),
            video_pt: 97,
            audio_pt: Some(98),
            max_datagram: 4096,
            recv_buffers: 64,
            recv_batch: 8,

            idr_path: "/request/idr".to_string(),
            idr_port: 80,
            idr_timeout: Duration::from_millis(200),
            idr_burst_count: 3,
            idr_burst_interval: Duration::from_millis(50),
            idr_min_interval: Duration::from_millis(50),
            idr_max_interval: Duration::from_millis(500),
            idr_quiet_reset: Duration::from_millis(750),
            idr_reinit_threshold: 64,

            decoder_slots: 24,
            decoder_read_buf: 1024 * 1024,
            decoder_lib_path: None,

            scaler_max_ratio: 4.0,

            cpu_affinity: None,
            log_level: "info".to_string(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Modeset result handed in by the external collaborator that owns the
/// actual DRM modeset call. The core never performs modeset itself.
#[derive(Debug, Clone, Copy)]
pub struct ModesetResult {
    pub connector_id: u32,
    pub crtc_id: u32,
    pub video_plane_id: u32,
    pub mode_w: u32,
    pub mode_h: u32,
    pub mode_hz: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.video_pt, 97);
        assert_eq!(cfg.audio_pt, Some(98));
        assert_eq!(cfg.bind_addr.port(), 5600);
        assert_eq!(cfg.idr_min_interval, Duration::from_millis(50));
        assert_eq!(cfg.idr_max_interval, Duration::from_millis(500));
        assert_eq!(cfg.idr_quiet_reset, Duration::from_millis(750));
        assert_eq!(cfg.idr_reinit_threshold, 64);
        assert_eq!(cfg.decoder_slots, 24);
        assert_eq!(cfg.scaler_max_ratio, 4.0);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.idr_port, cfg.idr_port);
        assert_eq!(back.idr_timeout, cfg.idr_timeout);
    }
}
