pub mod handlers;
pub mod livekit;
pub mod registry;
pub mod sweeper;
