//! Ambient logging setup.
//!
//! A one-shot `env_logger` install, replacing the host-process log-level
//! globals a plugin would otherwise inherit: a standalone binary owns its
//! own logger instead.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the global logger once, honoring `RUST_LOG` if set and otherwise
/// falling back to `default_level` (one of the `log::Level` names).
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(default_level.to_string());
        env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .init();
    });
}
