//! Outgoing mail for account verification and password reset.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail API error: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Sends through an HTTP transactional-mail API (Resend-style JSON body).
pub struct HttpMailer {
    client: Client,
    config: MailConfig,
}

#[derive(Serialize)]
struct MailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Result<Self, MailError> {
        let client = ClientBuilder::new()
            .user_agent("timetable-portal/0.1 (+reqwest)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let body = MailBody {
            from: &self.config.from,
            to: [&mail.to],
            subject: &mail.subject,
            text: &mail.text,
        };

        let t0 = Instant::now();
        let res = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        info!(to = %mail.to, status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "mail sent");

        if status.is_success() {
            Ok(())
        } else {
            Err(MailError::Rejected {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

/// Used when no mail API is configured: the message only goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        warn!(to = %mail.to, subject = %mail.subject, "mail API not configured, logging mail instead:\n{}", mail.text);
        Ok(())
    }
}

pub fn verify_otp_mail(to: &str, otp: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Account Verification OTP".to_string(),
        text: format!("Your OTP is {otp}. Verify your account using this OTP."),
    }
}

pub fn reset_otp_mail(to: &str, otp: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Password Reset OTP".to_string(),
        text: format!(
            "Your OTP for resetting your password is {otp}. Use this OTP to proceed with resetting your password."
        ),
    }
}
