//! Outbound email for account activation and password reset

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use portico_core::{Account, EmailConfig, EmailTransportConfig};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to create transport: {0}")]
    Transport(String),

    #[error("failed to send: {0}")]
    Send(String),
}

/// A rendered message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Sends rendered messages
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Activation message carrying the single activation link
pub fn activation_email(account: &Account, link: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: account.email.clone(),
        to_name: Some(account.alt_name.clone()),
        subject: "Activate your account".to_string(),
        body: format!(
            "Hello {name},\n\n\
             Thanks for signing up. Confirm your email address to activate your account:\n\n\
             {link}\n\n\
             If you did not create this account you can ignore this message.\n",
            name = account.alt_name,
        ),
    }
}

/// Password reset message carrying the single reset link
pub fn password_reset_email(account: &Account, link: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: account.email.clone(),
        to_name: Some(account.alt_name.clone()),
        subject: "Reset your password".to_string(),
        body: format!(
            "Hello {name},\n\n\
             We received a request to reset your password. Use the link below to choose a new one:\n\n\
             {link}\n\n\
             If you didn't make this request, you can safely ignore this email.\n",
            name = account.alt_name,
        ),
    }
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
    Log,
}

/// [`Mailer`] backed by lettre
pub struct LettreMailer {
    transport: EmailTransport,
    from: Mailbox,
}

impl LettreMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| MailError::Transport(e.to_string()))?
                .port(*port);

                let smtp_builder = if username.is_empty() {
                    smtp_builder
                } else {
                    smtp_builder.credentials(Credentials::new(username.clone(), password.clone()))
                };

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir)
                        .map_err(|e| MailError::Transport(format!("create {path}: {e}")))?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
            EmailTransportConfig::Log => EmailTransport::Log,
        };

        let from = parse_mailbox(Some(&config.from_name), &config.from_email)?;

        Ok(Self { transport, from })
    }
}

fn parse_mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, MailError> {
    let raw = match name {
        Some(name) if !name.is_empty() => format!("{name} <{address}>"),
        _ => address.to_string(),
    };
    raw.parse::<Mailbox>().map_err(|e| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Mailer for LettreMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let to = parse_mailbox(email.to_name.as_deref(), &email.to)?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message)
                    .await
                    .map_err(|e| MailError::Send(e.to_string()))?;
            }
            EmailTransport::File(file) => {
                file.send(message)
                    .await
                    .map_err(|e| MailError::Send(e.to_string()))?;
            }
            EmailTransport::Log => {
                // Bodies carry live action tokens
                tracing::info!(
                    target: "email",
                    to = %email.to,
                    subject = %email.subject,
                    "Email not sent (log transport)"
                );
                tracing::debug!(target: "email", body = %email.body, "Log transport body");
            }
        }

        tracing::debug!(to = %email.to, subject = %email.subject, "Email dispatched");
        Ok(())
    }
}

/// Records messages instead of sending them
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MemoryMailer {
    outbox: tokio::sync::Mutex<Vec<OutgoingEmail>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far
    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().await.clone()
    }

    /// Make subsequent sends fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MailError::Send("outbox closed".to_string()));
        }
        self.outbox.lock().await.push(email);
        Ok(())
    }
}
