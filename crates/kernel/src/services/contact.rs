//! Contact form submissions.
//!
//! A submission is rate-limited per client, validated, and forwarded to the
//! site inbox. Every outcome is reported as structured data with a message
//! in the visitor's locale; nothing here turns into an HTTP error.

use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::middleware::SubmissionLimiter;
use crate::services::email::{Mailer, OutgoingEmail};

const NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 254;
const OPTIONAL_MAX: usize = 200;
const MESSAGE_MIN: usize = 10;
const MESSAGE_MAX: usize = 5000;

/// Fields posted by the contact form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactSubmission {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// A form field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Name,
    Email,
    Company,
    Phone,
    Subject,
    Message,
}

impl ContactField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Company => "company",
            Self::Phone => "phone",
            Self::Subject => "subject",
            Self::Message => "message",
        }
    }

    fn label(self, lang: Lang) -> &'static str {
        match (self, lang) {
            (Self::Name, Lang::En) => "name",
            (Self::Email, Lang::En) => "email address",
            (Self::Company, Lang::En) => "company",
            (Self::Phone, Lang::En) => "phone number",
            (Self::Subject, Lang::En) => "subject",
            (Self::Message, Lang::En) => "message",
            (Self::Name, Lang::Zh) => "姓名",
            (Self::Email, Lang::Zh) => "電郵地址",
            (Self::Company, Lang::Zh) => "公司",
            (Self::Phone, Lang::Zh) => "電話號碼",
            (Self::Subject, Lang::Zh) => "主題",
            (Self::Message, Lang::Zh) => "訊息",
        }
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    Sent,
    RateLimited,
    InvalidBody,
    Invalid(ContactField),
    SendFailed,
}

/// JSON result returned to the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ContactOutcome {
    /// Render the outcome for a visitor in `locale`.
    pub fn to_result(self, locale: &str) -> ContactResult {
        let lang = Lang::from_locale(locale);
        let text = localized(self, lang);
        match self {
            Self::Sent => ContactResult {
                success: true,
                message: Some(text),
                error: None,
                field: None,
            },
            Self::Invalid(field) => ContactResult {
                success: false,
                message: None,
                error: Some(text),
                field: Some(field.as_str()),
            },
            _ => ContactResult {
                success: false,
                message: None,
                error: Some(text),
                field: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lang {
    En,
    Zh,
}

impl Lang {
    fn from_locale(locale: &str) -> Self {
        let primary = locale.split(['-', '_']).next().unwrap_or(locale);
        if primary.eq_ignore_ascii_case("zh") {
            Lang::Zh
        } else {
            Lang::En
        }
    }
}

fn localized(outcome: ContactOutcome, lang: Lang) -> String {
    match (outcome, lang) {
        (ContactOutcome::Sent, Lang::En) => {
            "Thank you for your message. We will get back to you shortly.".to_string()
        }
        (ContactOutcome::Sent, Lang::Zh) => "感謝您的留言，我們會盡快與您聯絡。".to_string(),
        (ContactOutcome::RateLimited, Lang::En) => {
            "Too many submissions. Please try again in a few minutes.".to_string()
        }
        (ContactOutcome::RateLimited, Lang::Zh) => "提交次數過多，請數分鐘後再試。".to_string(),
        (ContactOutcome::InvalidBody, Lang::En) => {
            "The form could not be read. Please refresh the page and try again.".to_string()
        }
        (ContactOutcome::InvalidBody, Lang::Zh) => "無法讀取表格，請重新整理頁面後再試。".to_string(),
        (ContactOutcome::Invalid(field), Lang::En) => {
            format!("Please enter a valid {}.", field.label(lang))
        }
        (ContactOutcome::Invalid(field), Lang::Zh) => {
            format!("請輸入有效的{}。", field.label(lang))
        }
        (ContactOutcome::SendFailed, Lang::En) => {
            "Sorry, your message could not be sent. Please try again later.".to_string()
        }
        (ContactOutcome::SendFailed, Lang::Zh) => "抱歉，訊息未能發送，請稍後再試。".to_string(),
    }
}

/// Rate-limits, validates and forwards contact submissions.
pub struct ContactService {
    limiter: Arc<dyn SubmissionLimiter>,
    mailer: Arc<dyn Mailer>,
    recipient: String,
    email_pattern: Regex,
}

impl ContactService {
    pub fn new(
        limiter: Arc<dyn SubmissionLimiter>,
        mailer: Arc<dyn Mailer>,
        recipient: impl Into<String>,
    ) -> Result<Self> {
        let email_pattern =
            Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").context("invalid email pattern")?;
        Ok(Self {
            limiter,
            mailer,
            recipient: recipient.into(),
            email_pattern,
        })
    }

    /// Handle one submission from `identity` with the raw request body.
    ///
    /// The rate limit is checked before the body is even parsed, so rejected
    /// attempts cost nothing and are not recorded.
    pub async fn submit(&self, identity: &str, body: &[u8]) -> ContactOutcome {
        if !self.limiter.check(identity).await {
            warn!(client = %identity, "contact form rate limit exceeded");
            return ContactOutcome::RateLimited;
        }

        let submission: ContactSubmission = match serde_json::from_slice(body) {
            Ok(s) => s,
            Err(e) => {
                warn!(client = %identity, error = %e, "unreadable contact form body");
                return ContactOutcome::InvalidBody;
            }
        };

        let submission = match self.validate(submission) {
            Ok(s) => s,
            Err(field) => {
                info!(client = %identity, field = field.as_str(), "contact form rejected");
                return ContactOutcome::Invalid(field);
            }
        };

        let email = self.compose(&submission);
        if let Err(e) = self.mailer.send(email).await {
            error!(client = %identity, error = %e, "failed to forward contact form");
            return ContactOutcome::SendFailed;
        }

        info!(client = %identity, "contact form forwarded");
        ContactOutcome::Sent
    }

    /// Trim fields and check them, returning the first offending field.
    fn validate(&self, mut s: ContactSubmission) -> Result<ContactSubmission, ContactField> {
        s.name = s.name.trim().to_string();
        s.email = s.email.trim().to_string();
        s.message = s.message.trim().to_string();
        s.company = trimmed_optional(s.company);
        s.phone = trimmed_optional(s.phone);
        s.subject = trimmed_optional(s.subject);

        if s.name.is_empty() || s.name.chars().count() > NAME_MAX || has_control(&s.name) {
            return Err(ContactField::Name);
        }

        if s.email.len() > EMAIL_MAX || !self.email_pattern.is_match(&s.email) {
            return Err(ContactField::Email);
        }

        for (value, field) in [
            (&s.company, ContactField::Company),
            (&s.phone, ContactField::Phone),
            (&s.subject, ContactField::Subject),
        ] {
            if let Some(v) = value
                && (v.chars().count() > OPTIONAL_MAX || has_control(v))
            {
                return Err(field);
            }
        }

        if let Some(phone) = &s.phone
            && !phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
        {
            return Err(ContactField::Phone);
        }

        let message_len = s.message.chars().count();
        if !(MESSAGE_MIN..=MESSAGE_MAX).contains(&message_len) {
            return Err(ContactField::Message);
        }

        Ok(s)
    }

    fn compose(&self, s: &ContactSubmission) -> OutgoingEmail {
        let topic = s.subject.as_deref().unwrap_or("Website enquiry");
        let mut body = format!("Name: {}\nEmail: {}\n", s.name, s.email);
        if let Some(company) = &s.company {
            body.push_str(&format!("Company: {company}\n"));
        }
        if let Some(phone) = &s.phone {
            body.push_str(&format!("Phone: {phone}\n"));
        }
        body.push_str(&format!("\n{}\n", s.message));

        OutgoingEmail {
            to: self.recipient.clone(),
            reply_to: Some(s.email.clone()),
            subject: format!("[isBIM website] {topic} (from {})", s.name),
            body,
        }
    }
}

fn trimmed_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn has_control(value: &str) -> bool {
    value.chars().any(char::is_control)
}

impl std::fmt::Debug for ContactService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactService")
            .field("recipient", &self.recipient)
            .finish()
    }
}
