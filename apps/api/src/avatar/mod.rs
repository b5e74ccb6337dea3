pub mod handlers;
pub mod renderer;
