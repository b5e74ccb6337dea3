pub mod audit;
pub mod candidate;
pub mod interview;
pub mod job;
pub mod resume;
pub mod room;
pub mod screening;
pub mod user;
