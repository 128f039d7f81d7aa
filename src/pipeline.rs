//! Top-level wiring (§5): binds the receiver (components A+B+D), decoder
//! producer (E), and presenter (F) threads around one shared
//! [`CoreContext`], and owns the info-change → frame-pool-rebuild handoff
//! between the decoder adapter and the DRM device (§4.E steps 1-4).
//!
//! Follows the same `Arc<AtomicBool>`-into-`thread::spawn`-closure shape as
//! the reference input stream's `start`/`stop`, generalized from two
//! threads (tx/rx) to the pipeline's four.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::buffer_pool::BufferPool;
use crate::config::Config;
use crate::context::{apply_cpu_affinity, CoreContext};
use crate::decoder::{self, Frame, FrameFormat, FramePool, PacketDecoder};
use crate::drm::{DrmDevice, Presenter};
use crate::idr::IdrEngine;
use crate::router::{classify, Feeder, Route};
use crate::rtp::{is_transient, RtpPacket, RtpSocket};
use crate::slot_channel::SlotChannel;
use crate::stats::{LossSignal, Snapshot, SourceAddrTracker, Statistician};

/// Wires every component into the four-thread topology of §5. `start`/`stop`
/// are not reentrant, mirroring `RtpInput::start`/`stop` in the reference
/// input stream.
pub struct Pipeline {
    ctx: Arc<CoreContext>,
    stats: Arc<Statistician>,
    idr: Arc<IdrEngine>,
    source_addr: Arc<SourceAddrTracker>,
    decoder: Arc<dyn PacketDecoder>,
    pending: Arc<SlotChannel<Frame>>,
    pool: Arc<Mutex<FramePool>>,
    device: Option<Arc<DrmDevice>>,
    presenter: Option<Arc<Presenter>>,
    started_at: Instant,

    receiver_thread: Option<JoinHandle<()>>,
    producer_thread: Option<JoinHandle<()>>,
    presenter_thread: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// `device` is `None` for a headless/dev run (no atomic commits are ever
    /// issued; the presenter thread is simply not started).
    pub fn new(config: Config, decoder: Arc<dyn PacketDecoder>, device: Option<Arc<DrmDevice>>) -> Self {
        let presenter = device
            .clone()
            .map(|d| Arc::new(Presenter::new(d, config.scaler_max_ratio)));
        let ctx = CoreContext::new(config);
        let source_addr = Arc::new(SourceAddrTracker::new(ctx.config.bind_addr));
        let idr = IdrEngine::new(&ctx.config);

        Self {
            stats: Arc::new(Statistician::new()),
            source_addr,
            decoder,
            pending: Arc::new(SlotChannel::new()),
            pool: Arc::new(Mutex::new(FramePool::new())),
            device,
            presenter,
            started_at: Instant::now(),
            idr,
            ctx,
            receiver_thread: None,
            producer_thread: None,
            presenter_thread: None,
        }
    }

    /// Point-in-time counters + history ring (external observer interface).
    pub fn snapshot(&self) -> Snapshot {
        self.stats.get_snapshot()
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.ctx.stop_flag()
    }

    /// Start the receiver, decoder-producer, and (when a DRM device was
    /// supplied) presenter threads.
    pub fn start(&mut self) -> io::Result<()> {
        let socket = RtpSocket::bind(self.ctx.config.bind_addr)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        // §4.E steps 1-4: rebuild the frame pool for the new format and
        // re-register it with the decoder before the producer loop resumes
        // treating subsequent `get_frame` results as resolvable.
        let info_change = {
            let pool = self.pool.clone();
            let device = self.device.clone();
            let decoder = self.decoder.clone();
            let decoder_slots = self.ctx.config.decoder_slots;
            move |format: FrameFormat| {
                let Some(device) = device.as_ref() else {
                    log::warn!("decoder info-change with no DRM device attached, ignoring");
                    return;
                };
                let mut pool = pool.lock();
                match pool.rebuild(device, decoder_slots, format) {
                    Ok(()) => {
                        decoder.set_external_buffer_group(&pool.prime_fds());
                        decoder.signal_info_change_ready();
                    }
                    Err(e) => log::error!("frame pool rebuild failed: {e}"),
                }
            }
        };

        let producer_stop = self.ctx.stop_flag();
        let producer_decoder = self.decoder.clone();
        let producer_pending = self.pending.clone();
        let producer_idr = self.idr.clone();
        let producer_source_addr = self.source_addr.clone();
        self.producer_thread = Some(thread::spawn(move || {
            decoder::run_producer(
                producer_decoder.as_ref(),
                &producer_pending,
                &producer_idr,
                move || producer_source_addr.current(),
                info_change,
                &producer_stop,
            );
        }));

        let receiver_stop = self.ctx.stop_flag();
        let cfg = self.ctx.config.clone();
        let stats = self.stats.clone();
        let idr = self.idr.clone();
        let source_addr = self.source_addr.clone();
        let decoder = self.decoder.clone();
        let started_at = self.started_at;
        self.receiver_thread = Some(thread::spawn(move || {
            if let Some(cores) = &cfg.cpu_affinity {
                apply_cpu_affinity(cores);
            }
            receiver_loop(&cfg, socket, &stats, &idr, &source_addr, decoder.as_ref(), started_at, &receiver_stop);
        }));

        if let Some(presenter) = self.presenter.clone() {
            let presenter_stop = self.ctx.stop_flag();
            let pending = self.pending.clone();
            self.presenter_thread = Some(thread::spawn(move || {
                presenter.run(&pending, &presenter_stop);
            }));
        }

        Ok(())
    }

    /// Cancellation order per §5: mark stop, drain the IDR in-flight
    /// worker, join every thread (the presenter releases its plane as the
    /// last thing it does before returning), then free the frame pool.
    pub fn stop(&mut self) {
        self.ctx.request_stop();
        self.idr.drain();

        if let Some(t) = self.receiver_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.producer_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.presenter_thread.take() {
            let _ = t.join();
        }

        if let Some(device) = &self.device {
            self.pool.lock().teardown(device);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

const RECEIVER_RECV_BUF_COUNT: usize = 8;

#[allow(clippy::too_many_arguments)]
fn receiver_loop(
    cfg: &Config,
    socket: RtpSocket,
    stats: &Statistician,
    idr: &Arc<IdrEngine>,
    source_addr: &SourceAddrTracker,
    decoder: &dyn PacketDecoder,
    started_at: Instant,
    stop: &AtomicBool,
) {
    let feeder = Feeder::default();
    // One byte larger than the accepted maximum so a datagram at or above
    // `max_datagram + 1` bytes still reports its true (truncated) length
    // from `recv_from` instead of silently fitting the buffer (§4.A/§7:
    // oversized datagrams must be detected, dropped, and logged).
    let mut buffers = BufferPool::new(RECEIVER_RECV_BUF_COUNT, cfg.max_datagram + 1);
    let mut active_ssrc: Option<u32> = None;

    while !stop.load(Ordering::SeqCst) {
        // Drain up to `recv_batch` datagrams before re-polling (4.A).
        for _ in 0..cfg.recv_batch {
            if stop.load(Ordering::SeqCst) {
                return;
            }

            let mut buf = buffers.acquire();
            match socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if len > cfg.max_datagram {
                        log::warn!("dropping oversized datagram from {from} ({len} bytes)");
                    } else {
                        handle_datagram(
                            &buf[..len],
                            from,
                            cfg,
                            stats,
                            idr,
                            source_addr,
                            decoder,
                            &feeder,
                            &mut active_ssrc,
                            started_at,
                            stop,
                        );
                    }
                    buffers.release(buf);
                }
                Err(e) => {
                    buffers.release(buf);
                    if is_transient(&e) {
                        break;
                    }
                    log::error!("rtp socket recv failed: {e}");
                    return;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_datagram(
    data: &[u8],
    from: SocketAddr,
    cfg: &Config,
    stats: &Statistician,
    idr: &Arc<IdrEngine>,
    source_addr: &SourceAddrTracker,
    decoder: &dyn PacketDecoder,
    feeder: &Feeder,
    active_ssrc: &mut Option<u32>,
    started_at: Instant,
    stop: &AtomicBool,
) {
    let Some(packet) = RtpPacket::parse(data) else {
        log::warn!("dropping malformed rtp packet from {from}");
        return;
    };

    let now_ns = started_at.elapsed().as_nanos() as u64;

    match classify(packet.header.payload_type, cfg.video_pt, cfg.audio_pt) {
        Route::Video => {
            source_addr.update(from, now_ns);

            let discontinuity = *active_ssrc != Some(packet.header.ssrc);
            *active_ssrc = Some(packet.header.ssrc);

            if stats.process_rtp(&packet, Instant::now(), now_ns) == LossSignal::Loss {
                idr.on_loss_event(source_addr.current(), Instant::now());
            }

            feeder.feed(decoder, packet.payload, now_ns, discontinuity, stop);
        }
        // Audio playback is out of scope (§1 Non-goals); classified and
        // dropped rather than fed anywhere.
        Route::Audio | Route::Unknown => {}
    }
}
