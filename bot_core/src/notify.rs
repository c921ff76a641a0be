//! Outbound alert delivery.

use lettre::address::AddressError;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

use crate::config::BotConfig;

const SIGNATURE: &str = "Sent by village-bot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub village: String,
    pub subject: String,
    pub body: String,
}

impl Alert {
    pub fn under_attack(village: &str, threat_count: u32) -> Self {
        let headline = format!("Village {village} IS UNDER ATTACK!!!");
        let body = format!(
            "{headline}\n\nIncoming hostile movements: {threat_count}\n\n\n\n{SIGNATURE}"
        );
        Self {
            village: village.to_string(),
            subject: headline,
            body,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid mail address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

pub trait Notifier {
    fn send(&mut self, alert: &Alert) -> Result<(), DeliveryError>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn send(&mut self, alert: &Alert) -> Result<(), DeliveryError> {
        (**self).send(alert)
    }
}

/// Mails alerts through an authenticated STARTTLS relay.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(
        host: &str,
        port: u16,
        from: &str,
        password: &str,
        to: &str,
    ) -> Result<Self, DeliveryError> {
        let from_box = parse_mailbox(from)?;
        let to_box = parse_mailbox(to)?;
        let transport = SmtpTransport::starttls_relay(host)?
            .port(port)
            .credentials(Credentials::new(from.to_string(), password.to_string()))
            .build();
        Ok(Self {
            transport,
            from: from_box,
            to: to_box,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|source| DeliveryError::Address {
            address: address.to_string(),
            source,
        })
}

impl Notifier for SmtpNotifier {
    fn send(&mut self, alert: &Alert) -> Result<(), DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(alert.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body.clone())?;
        self.transport.send(&message)?;
        Ok(())
    }
}

/// Fallback when mail is not configured: the alert only reaches the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&mut self, alert: &Alert) -> Result<(), DeliveryError> {
        tracing::warn!(
            target: "village_bot::notify",
            village = %alert.village,
            subject = %alert.subject,
            "alert.logged_only"
        );
        Ok(())
    }
}

/// Pick the mail notifier when every mail setting is present, otherwise log.
/// Addresses are checked by [`BotConfig::validate`]; a relay that still cannot
/// be set up degrades to logging instead of stopping the bot.
pub fn notifier_from_config(config: &BotConfig) -> Box<dyn Notifier> {
    let Some(mail) = config.mail_settings() else {
        tracing::warn!(
            target: "village_bot::notify",
            "mail settings incomplete; attack alerts will only be logged"
        );
        return Box::new(LogNotifier);
    };
    match SmtpNotifier::new(
        &config.smtp_host,
        config.smtp_port,
        mail.from,
        mail.password,
        mail.to,
    ) {
        Ok(notifier) => {
            tracing::info!(
                target: "village_bot::notify",
                smtp_host = %config.smtp_host,
                smtp_port = config.smtp_port,
                to = %mail.to,
                "notifier.ready=smtp"
            );
            Box::new(notifier)
        }
        Err(err) => {
            tracing::error!(
                target: "village_bot::notify",
                smtp_host = %config.smtp_host,
                error = %err,
                "notifier.setup_failed; attack alerts will only be logged"
            );
            Box::new(LogNotifier)
        }
    }
}
