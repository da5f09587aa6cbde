pub mod email;

pub use email::{Mailer, MailerError, MailerService, MessageResult};
