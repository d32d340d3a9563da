//! Quote notification email.
//!
//! [`NotificationDispatcher`] turns a rendered quote into one outgoing message (recipient plan,
//! subject, templated HTML body and the PDF attachment) and hands it to a [`MailTransport`].
//! Two transports exist: SendGrid's v3 mail-send API and Resend's emails API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use quotedesk_core::domain::quote::QuoteSubmission;
use quotedesk_core::recipients::{RecipientPlan, RecipientPolicy};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use tera::{Context, Tera};
use thiserror::Error;

use crate::pdf::{LogoImage, RenderedQuote};

pub const PREVIEW_CHARS: usize = 100;
pub const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";
pub const RESEND_BASE_URL: &str = "https://api.resend.com";

const TEMPLATE_NAME: &str = "quote_notification.html";
const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Option<Vec<String>>,
    pub subject: String,
    pub html: String,
    pub attachment: EmailAttachment,
}

/// What the provider handed back for an accepted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryReceipt {
    StatusCode(u16),
    MessageId(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("{provider} request failed: {message}")]
    Transport { provider: &'static str, message: String },
    #[error("{provider} rejected the message with status {status}: {message}")]
    Rejected { provider: &'static str, status: u16, message: String },
    #[error("{provider} did not answer within {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },
    #[error("notification template failed: {0}")]
    Template(String),
}

impl NotifyError {
    pub fn provider(&self) -> Option<&'static str> {
        match self {
            Self::Transport { provider, .. }
            | Self::Rejected { provider, .. }
            | Self::Timeout { provider, .. } => Some(provider),
            Self::Template(_) => None,
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    fn provider(&self) -> &'static str;
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, NotifyError>;
}

fn http_client(provider: &'static str, timeout: Duration) -> Result<Client, NotifyError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| NotifyError::Transport { provider, message: error.to_string() })
}

fn transport_error(provider: &'static str, timeout: Duration, error: reqwest::Error) -> NotifyError {
    if error.is_timeout() {
        NotifyError::Timeout { provider, seconds: timeout.as_secs() }
    } else {
        NotifyError::Transport { provider, message: error.to_string() }
    }
}

/// Pulls a readable diagnostic out of a provider error body, falling back to the raw text.
fn provider_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|value| {
        if let Some(errors) = value.get("errors").and_then(Value::as_array) {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|error| error.get("message").and_then(Value::as_str))
                .collect();
            return (!messages.is_empty()).then(|| messages.join("; "));
        }
        value.get("message").and_then(Value::as_str).map(str::to_string)
    });

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => status.to_string(),
        None => body.trim().to_string(),
    }
}

pub struct SendGridTransport {
    client: Client,
    api_key: SecretString,
    base_url: String,
    timeout: Duration,
}

impl SendGridTransport {
    pub fn new(
        api_key: SecretString,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: http_client("sendgrid", timeout)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| SENDGRID_BASE_URL.to_string()),
            timeout,
        })
    }

    pub fn request(&self, email: &OutgoingEmail) -> Result<reqwest::Request, NotifyError> {
        let url = format!("{}/v3/mail/send", self.base_url.trim_end_matches('/'));
        self.client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&sendgrid_payload(email))
            .build()
            .map_err(|error| transport_error(self.provider(), self.timeout, error))
    }
}

pub fn sendgrid_payload(email: &OutgoingEmail) -> Value {
    let addresses =
        |list: &[String]| list.iter().map(|email| json!({ "email": email })).collect::<Vec<_>>();

    let mut personalization = json!({ "to": addresses(&email.to) });
    if let Some(cc) = &email.cc {
        personalization["cc"] = Value::Array(addresses(cc));
    }

    json!({
        "personalizations": [personalization],
        "from": { "email": email.from },
        "subject": email.subject,
        "content": [{ "type": "text/html", "value": email.html }],
        "attachments": [{
            "content": BASE64_STANDARD.encode(&email.attachment.bytes),
            "filename": email.attachment.filename,
            "type": email.attachment.content_type,
            "disposition": "attachment",
        }],
    })
}

#[async_trait]
impl MailTransport for SendGridTransport {
    fn provider(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, NotifyError> {
        let request = self.request(email)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|error| transport_error(self.provider(), self.timeout, error))?;

        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryReceipt::StatusCode(status.as_u16()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            provider: self.provider(),
            status: status.as_u16(),
            message: provider_message(status, &body),
        })
    }
}

pub struct ResendTransport {
    client: Client,
    api_key: SecretString,
    base_url: String,
    timeout: Duration,
}

impl ResendTransport {
    pub fn new(
        api_key: SecretString,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: http_client("resend", timeout)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| RESEND_BASE_URL.to_string()),
            timeout,
        })
    }

    pub fn request(&self, email: &OutgoingEmail) -> Result<reqwest::Request, NotifyError> {
        let url = format!("{}/emails", self.base_url.trim_end_matches('/'));
        self.client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&resend_payload(email))
            .build()
            .map_err(|error| transport_error(self.provider(), self.timeout, error))
    }
}

pub fn resend_payload(email: &OutgoingEmail) -> Value {
    let mut payload = json!({
        "from": email.from,
        "to": email.to,
        "subject": email.subject,
        "html": email.html,
        "attachments": [{
            "filename": email.attachment.filename,
            "content": BASE64_STANDARD.encode(&email.attachment.bytes),
        }],
    });
    if let Some(cc) = &email.cc {
        payload["cc"] = json!(cc);
    }
    payload
}

#[async_trait]
impl MailTransport for ResendTransport {
    fn provider(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, NotifyError> {
        let request = self.request(email)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|error| transport_error(self.provider(), self.timeout, error))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                provider: self.provider(),
                status: status.as_u16(),
                message: provider_message(status, &body),
            });
        }

        let id = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("id").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| NotifyError::Transport {
                provider: self.provider(),
                message: format!("response carried no message id: {body}"),
            })?;
        Ok(DeliveryReceipt::MessageId(id))
    }
}

/// Everything the dispatcher needs about one rendered quote.
pub struct QuoteNotice<'a> {
    pub submission: &'a QuoteSubmission,
    pub pdf: &'a RenderedQuote,
    pub logo: &'a LogoImage,
    pub year: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub receipt: DeliveryReceipt,
    pub recipients: RecipientPlan,
}

/// A failed send, carrying the addresses the message was meant for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{source}")]
pub struct DeliveryFailure {
    pub source: NotifyError,
    pub recipients: RecipientPlan,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    policy: RecipientPolicy,
    sender: String,
    company_name: String,
    templates: Arc<Tera>,
}

#[derive(Serialize)]
struct SectionView<'a> {
    department: &'a str,
    items: Vec<ItemView<'a>>,
}

#[derive(Serialize)]
struct ItemView<'a> {
    project: Option<&'a str>,
    preview: String,
    qty: &'a str,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        policy: RecipientPolicy,
        sender: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let mut templates = Tera::default();
        templates
            .add_raw_template(
                TEMPLATE_NAME,
                include_str!("../../../templates/email/quote_notification.html"),
            )
            .map_err(|error| NotifyError::Template(error.to_string()))?;

        Ok(Self {
            transport,
            policy,
            sender: sender.into(),
            company_name: company_name.into(),
            templates: Arc::new(templates),
        })
    }

    pub fn provider(&self) -> &'static str {
        self.transport.provider()
    }

    pub fn recipients(&self, submission: &QuoteSubmission) -> RecipientPlan {
        self.policy.plan(submission.client_email(), submission.request().cc_emails.as_deref())
    }

    pub fn compose(
        &self,
        notice: &QuoteNotice<'_>,
        recipients: &RecipientPlan,
    ) -> Result<OutgoingEmail, NotifyError> {
        let request = notice.submission.request();
        let sections: Vec<SectionView<'_>> = request
            .tables
            .iter()
            .map(|section| SectionView {
                department: &section.department,
                items: section
                    .line_items
                    .iter()
                    .map(|item| ItemView {
                        project: item.project_name(),
                        preview: description_preview(&item.description),
                        qty: &item.qty,
                    })
                    .collect(),
            })
            .collect();

        let logo_data_url = format!(
            "data:{};base64,{}",
            notice.logo.mime(),
            BASE64_STANDARD.encode(notice.logo.raw_bytes())
        );

        let mut context = Context::new();
        context.insert("logo_data_url", &logo_data_url);
        context.insert("company_name", &self.company_name);
        context.insert("client", &request.client);
        context.insert("quote", &request.quote);
        context.insert("sections", &sections);
        context.insert("sender_address", &self.sender);
        context.insert("company_phone", &request.company.phone);
        context.insert("address_footer", &request.company.address_lines().collect::<Vec<_>>().join(" • "));
        context.insert("year", &notice.year);

        let html = self
            .templates
            .render(TEMPLATE_NAME, &context)
            .map_err(|error| NotifyError::Template(error.to_string()))?;

        Ok(OutgoingEmail {
            from: self.sender.clone(),
            to: recipients.to.clone(),
            cc: recipients.cc().map(<[String]>::to_vec),
            subject: format!("Quote {} for {}", request.quote.number, request.client.company),
            html,
            attachment: EmailAttachment {
                filename: notice.submission.attachment_filename(),
                content_type: PDF_CONTENT_TYPE,
                bytes: notice.pdf.as_bytes().to_vec(),
            },
        })
    }

    pub async fn notify(&self, notice: &QuoteNotice<'_>) -> Result<Delivery, DeliveryFailure> {
        let recipients = self.recipients(notice.submission);
        let email = match self.compose(notice, &recipients) {
            Ok(email) => email,
            Err(source) => return Err(DeliveryFailure { source, recipients }),
        };

        match self.transport.send(&email).await {
            Ok(receipt) => Ok(Delivery { receipt, recipients }),
            Err(source) => Err(DeliveryFailure { source, recipients }),
        }
    }
}

/// First two description lines joined by a space, cut to [`PREVIEW_CHARS`] characters, with
/// `...` when the full description is longer than that.
pub fn description_preview(description: &str) -> String {
    let joined = description.split('\n').take(2).collect::<Vec<_>>().join(" ");
    let mut preview: String = joined.chars().take(PREVIEW_CHARS).collect();
    if description.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
