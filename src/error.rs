//! Structured error types for every module boundary.

use thiserror::Error;

/// Errors from the socket reader's startup path. Malformed packets are not
/// represented here: the parser (`rtp::header`) drops them inline and the
/// statistician counts them, per the §7 "malformed RTP" policy drop, rather
/// than surfacing them as a propagated error.
#[derive(Debug, Error)]
pub enum RtpError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
}

/// Errors from the IDR policy engine's HTTP dispatch.
#[derive(Debug, Error)]
pub enum IdrError {
    #[error("idr request timed out")]
    Timeout,

    #[error("idr http transport error: {0}")]
    Http(#[from] std::io::Error),

    #[error("idr response malformed: {0}")]
    Malformed(&'static str),
}

/// Errors from the hardware decoder adapter.
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("decoder initialization failed: {0}")]
    InitFailed(String),

    #[error("decoder resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("decoder resource exhausted: {0}")]
    ResourceExhaustedDetail(String),

    #[error("fatal decoder error: {0}")]
    Fatal(String),
}

/// Errors from the DRM plane presenter.
#[derive(Debug, Error)]
pub enum PresenterError {
    #[error("atomic commit failed: {0}")]
    CommitFailed(String),

    #[error("modeset input invalid: {0}")]
    ModesetInvalid(&'static str),

    #[error("no usable overlay or primary plane found")]
    NoUsablePlane,

    #[error("drm device error: {0}")]
    Drm(#[from] std::io::Error),
}

