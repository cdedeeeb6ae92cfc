pub mod mailgun;
pub mod templates;

pub use mailgun::MailgunSender;
