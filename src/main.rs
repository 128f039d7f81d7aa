//! Process entry point (§6.1): builds a [`pixelpilot::config::Config`] from
//! a minimal set of env vars (the INI/CLI layer proper is out of scope, per
//! spec.md §1), wires up a [`pixelpilot::Pipeline`], and runs it until a
//! `SIGINT`/`SIGTERM` flips a stop flag.
//!
//! Signal handling uses a bare `libc::signal` handler writing to a static
//! atomic rather than pulling in a signal-handling crate, matching the
//! `cfg(unix)` `libc` dependency the rest of the crate already carries
//! (`context::apply_cpu_affinity`) instead of adding a new one.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use pixelpilot::config::{Config, ModesetResult};
use pixelpilot::decoder::NullDecoder;
#[cfg(feature = "vendor_decoder")]
use pixelpilot::decoder::{FramePool, PacketDecoder};
use pixelpilot::drm::DrmDevice;
use pixelpilot::Pipeline;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminate_signal(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, on_terminate_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_terminate_signal as libc::sighandler_t);
    }
}

/// Read `Config` overrides from environment variables. The real INI/CLI
/// parser is an external collaborator (spec.md §1); this is enough to run
/// the core standalone for development and the zero-copy demo path.
fn config_from_env() -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Ok(bind) = std::env::var("PIXELPILOT_BIND") {
        config.bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid PIXELPILOT_BIND={bind}"))?;
    }
    if let Ok(pt) = std::env::var("PIXELPILOT_VIDEO_PT") {
        config.video_pt = pt.parse().context("invalid PIXELPILOT_VIDEO_PT")?;
    }
    if let Ok(level) = std::env::var("PIXELPILOT_LOG") {
        config.log_level = level;
    }
    if let Ok(path) = std::env::var("PIXELPILOT_DECODER_LIB") {
        config.decoder_lib_path = Some(path);
    }

    Ok(config)
}

/// Open the DRM device named by `PIXELPILOT_DRM_CARD` (e.g.
/// `/dev/dri/card0`) plus the modeset result supplied via
/// `PIXELPILOT_CONNECTOR_ID`/`PIXELPILOT_CRTC_ID`/`PIXELPILOT_PLANE_ID`/
/// `PIXELPILOT_MODE` (`WxH@Hz`). Absent `PIXELPILOT_DRM_CARD`, the pipeline
/// runs headless: frames are still decoded (by `NullDecoder`) but never
/// presented, which is how the test suite and a desktop dev box exercise
/// the rest of the pipeline without a KMS overlay plane available.
fn open_drm_device_from_env() -> anyhow::Result<Option<Arc<DrmDevice>>> {
    let Ok(card_path) = std::env::var("PIXELPILOT_DRM_CARD") else {
        return Ok(None);
    };

    let connector_id = env_u32("PIXELPILOT_CONNECTOR_ID")?;
    let crtc_id = env_u32("PIXELPILOT_CRTC_ID")?;
    let video_plane_id = env_u32("PIXELPILOT_PLANE_ID")?;
    let mode = std::env::var("PIXELPILOT_MODE").unwrap_or_else(|_| "1920x1080@60".to_string());
    let (mode_w, mode_h, mode_hz) = parse_mode(&mode)?;

    let modeset = ModesetResult {
        connector_id,
        crtc_id,
        video_plane_id,
        mode_w,
        mode_h,
        mode_hz,
    };

    let device = DrmDevice::open(std::path::Path::new(&card_path), modeset)
        .with_context(|| format!("failed to open DRM device {card_path}"))?;
    Ok(Some(Arc::new(device)))
}

fn env_u32(name: &str) -> anyhow::Result<u32> {
    std::env::var(name)
        .with_context(|| format!("{name} is required when PIXELPILOT_DRM_CARD is set"))?
        .parse()
        .with_context(|| format!("invalid {name}"))
}

fn parse_mode(spec: &str) -> anyhow::Result<(u32, u32, u32)> {
    let (wh, hz) = spec
        .split_once('@')
        .with_context(|| format!("invalid PIXELPILOT_MODE={spec}, expected WxH@Hz"))?;
    let (w, h) = wh
        .split_once('x')
        .with_context(|| format!("invalid PIXELPILOT_MODE={spec}, expected WxH@Hz"))?;
    Ok((
        w.parse().context("invalid mode width")?,
        h.parse().context("invalid mode height")?,
        hz.parse().context("invalid mode refresh")?,
    ))
}

fn main() -> anyhow::Result<()> {
    let config = config_from_env()?;
    pixelpilot::logging::init(&config.log_level);
    install_signal_handlers();

    log::info!(
        "pixelpilot starting: bind={} video_pt={} audio_pt={:?}",
        config.bind_addr,
        config.video_pt,
        config.audio_pt
    );

    let device = open_drm_device_from_env()?;
    let decoder = build_decoder(&device);

    let mut pipeline = Pipeline::new(config, decoder, device);
    pipeline.start().context("failed to start pipeline")?;

    while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutdown requested, stopping pipeline");
    pipeline.stop();
    Ok(())
}

#[cfg(not(feature = "vendor_decoder"))]
fn build_decoder(_device: &Option<Arc<DrmDevice>>) -> Arc<NullDecoder> {
    Arc::new(NullDecoder::new(1920, 1080, 30, 24))
}

#[cfg(feature = "vendor_decoder")]
fn build_decoder(_device: &Option<Arc<DrmDevice>>) -> Arc<dyn PacketDecoder> {
    use pixelpilot::decoder::HardwareDecoder;
    use parking_lot::Mutex;

    let pool = Arc::new(Mutex::new(FramePool::new()));
    match HardwareDecoder::new(0, pool) {
        Ok(decoder) => Arc::new(decoder),
        Err(e) => {
            log::error!("vendor decoder init failed, falling back to NullDecoder: {e}");
            Arc::new(NullDecoder::new(1920, 1080, 30, 24))
        }
    }
}
