use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::{AppError, Result};
use crate::report::{subject_line, Curator, ReportTemplate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// The curator the report is about.
    pub curator: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// STARTTLS submission with password authentication.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.relay)?
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();
        Ok(Self {
            transport,
            sender: config.sender.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML);
        for to in &email.to {
            builder = builder.to(to.parse::<Mailbox>()?);
        }
        let message = builder.body(email.html.clone())?;

        self.transport.send(message).await?;
        info!(curator = %email.curator, to = ?email.to, "report sent");
        Ok(())
    }
}

/// Writes every report to `<dir>/<curator email>.html` instead of sending it.
#[derive(Debug, Clone)]
pub struct DirectoryMailer {
    dir: PathBuf,
}

impl DirectoryMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Mailer for DirectoryMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!("{}.html", email.curator.replace(['/', '\\'], "_"));
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, &email.html).await?;
        info!(curator = %email.curator, path = %path.display(), "report written");
        Ok(())
    }
}

/// Turns a curator's inbox into one rendered email.
pub struct Notifier {
    mailer: Box<dyn Mailer>,
    template: ReportTemplate,
    recipient_override: Vec<String>,
}

impl Notifier {
    pub fn new(mailer: impl Mailer + 'static, template: ReportTemplate) -> Self {
        Self {
            mailer: Box::new(mailer),
            template,
            recipient_override: Vec::new(),
        }
    }

    /// Sends every report to `recipients` rather than to the curator.
    pub fn with_recipient_override(mut self, recipients: Vec<String>) -> Self {
        self.recipient_override = recipients;
        self
    }

    pub fn compose(&self, curator: &Curator, today: NaiveDate) -> Result<OutgoingEmail> {
        let to = if self.recipient_override.is_empty() {
            vec![curator.email.clone()]
        } else {
            self.recipient_override.clone()
        };
        Ok(OutgoingEmail {
            curator: curator.email.clone(),
            to,
            subject: subject_line(today),
            html: self.template.render(curator, today)?,
        })
    }

    pub async fn notify(&self, curator: &Curator, today: NaiveDate) -> Result<()> {
        let email = self.compose(curator, today)?;
        debug!(curator = %curator.email, datasets = curator.datasets.len(), "sending report");
        self.mailer.send(&email).await.map_err(|e| match e {
            AppError::Delivery(_) => e,
            other => AppError::Delivery(other.to_string()),
        })
    }
}
