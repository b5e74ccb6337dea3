pub mod email;
pub mod templates;

pub use email::{EmailAttachment, Mailer, OutgoingEmail};
