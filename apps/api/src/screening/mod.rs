pub mod assessment;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
