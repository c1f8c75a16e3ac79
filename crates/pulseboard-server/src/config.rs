/// Re-export `Config` from `pulseboard-core` for use within this crate.
///
/// All environment-variable parsing lives in `pulseboard-core` so it can be
/// shared with integration tests without depending on the full server.
pub use pulseboard_core::config::Config;
