//! Outgoing email.
//!
//! The server only sends one kind of email, the password reset link. Delivery is behind the
//! [Mailer] trait so that a real transport can be plugged in without touching the handlers.

use std::fmt::Debug;

use crate::Error;

/// An email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// The recipient's address.
    pub to: String,
    /// The subject line.
    pub subject: String,
    /// The plain text body.
    pub body: String,
}

/// Something that can deliver [Mail].
pub trait Mailer: Debug + Send + Sync {
    /// Hand `mail` to the transport.
    ///
    /// # Errors
    ///
    /// Returns an [Error::MailError] if the message could not be delivered.
    fn send(&self, mail: Mail) -> Result<(), Error>;
}

/// A [Mailer] that writes messages to the log instead of sending them.
///
/// Useful for local development, where the reset link can be copied from the server output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: Mail) -> Result<(), Error> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            "Outgoing mail:\n{}",
            mail.body
        );

        Ok(())
    }
}
