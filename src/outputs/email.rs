//! SMTP delivery of the rendered digest.
//!
//! One multipart (plain text + HTML) message goes to all recipients through a
//! STARTTLS relay. `lettre`'s SMTP transport is blocking, so sending and the
//! connection check run on tokio's blocking pool.

use super::html::{render_digest, render_text};
use crate::config::EmailConfig;
use crate::models::Digest;
use lettre::address::{Address, AddressError};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid email address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("no recipients configured")]
    NoRecipients,
    #[error("invalid SMTP port {0}")]
    Port(u32),
    #[error("failed to render digest")]
    Render(#[from] std::fmt::Error),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("digest is empty, nothing to send")]
    EmptyDigest,
    #[error("email task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, EmailError> {
    let parsed = address.trim().parse::<Address>().map_err(|source| EmailError::Address {
        address: address.to_string(),
        source,
    })?;
    Ok(Mailbox::new(name.map(str::to_string), parsed))
}

/// Build the digest message addressed to every configured recipient.
pub fn build_message(settings: &EmailConfig, digest: &Digest) -> Result<Message, EmailError> {
    if settings.recipients.is_empty() {
        return Err(EmailError::NoRecipients);
    }

    let from = mailbox(Some(settings.sender_name.as_str()), &settings.sender_email)?;
    let mut builder = Message::builder().from(from).subject(digest.subject());
    for recipient in &settings.recipients {
        builder = builder.to(mailbox(None, recipient)?);
    }

    let html = render_digest(digest)?;
    let text = render_text(digest);
    Ok(builder.multipart(MultiPart::alternative_plain_html(text, html))?)
}

fn transport(settings: &EmailConfig) -> Result<SmtpTransport, EmailError> {
    let port = u16::try_from(settings.smtp_port).map_err(|_| EmailError::Port(settings.smtp_port))?;
    let credentials = Credentials::new(settings.sender_email.clone(), settings.password.clone());
    Ok(SmtpTransport::starttls_relay(&settings.smtp_server)?
        .port(port)
        .credentials(credentials)
        .timeout(Some(Duration::from_secs(30)))
        .build())
}

/// Send `digest` by email. An empty digest is refused with [`EmailError::EmptyDigest`].
#[instrument(level = "info", skip_all, fields(server = %settings.smtp_server, recipients = settings.recipients.len()))]
pub async fn send_digest(settings: &EmailConfig, digest: &Digest) -> Result<(), EmailError> {
    if digest.is_empty() {
        warn!("Refusing to send an empty digest");
        return Err(EmailError::EmptyDigest);
    }

    let message = build_message(settings, digest)?;
    let mailer = transport(settings)?;
    tokio::task::spawn_blocking(move || mailer.send(&message)).await??;

    info!(
        subject = %digest.subject(),
        articles = digest.stats.total_articles,
        "Digest email sent"
    );
    Ok(())
}

/// Connect and authenticate against the SMTP server without sending anything.
#[instrument(level = "info", skip_all, fields(server = %settings.smtp_server))]
pub async fn check_connection(settings: &EmailConfig) -> Result<bool, EmailError> {
    let mailer = transport(settings)?;
    let ok = tokio::task::spawn_blocking(move || mailer.test_connection()).await??;
    if ok {
        info!("SMTP connection OK");
    } else {
        warn!("SMTP server did not accept the connection");
    }
    Ok(ok)
}
