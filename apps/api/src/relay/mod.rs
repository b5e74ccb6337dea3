//! Browser to Gemini Live audio relay.

pub mod protocol;
pub mod proxy;

pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.0-flash-live-001";
