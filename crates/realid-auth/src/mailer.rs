//! OTP delivery contract and the email body it carries.
//!
//! Transport is left to the embedding application; [`LogMailer`] only
//! records the message through `tracing`, for development.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct MailError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    Registration,
}

impl OtpPurpose {
    pub fn subject(self) -> &'static str {
        match self {
            OtpPurpose::Login => "Your REAL ID OTP",
            OtpPurpose::Registration => "Your REAL ID Registration OTP",
        }
    }

    fn title(self) -> &'static str {
        match self {
            OtpPurpose::Login => "Login Verification",
            OtpPurpose::Registration => "Registration Verification",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            OtpPurpose::Login => "Use this code to access your vault:",
            OtpPurpose::Registration => "Use this code to complete your registration:",
        }
    }
}

/// A fully rendered OTP email.
#[derive(Debug, Clone)]
pub struct OtpMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl OtpMessage {
    pub fn new(from: &str, to: &str, code: &str, purpose: OtpPurpose) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: purpose.subject().to_string(),
            html: render_otp_email(code, purpose),
        }
    }
}

/// Delivers OTP codes to users.
pub trait Mailer: Send + Sync {
    fn send_otp(&self, to: &str, code: &str, purpose: OtpPurpose) -> Result<(), MailError>;
}

/// Logs messages instead of sending them. The code itself is only visible
/// at `debug` level.
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

impl Mailer for LogMailer {
    fn send_otp(&self, to: &str, code: &str, purpose: OtpPurpose) -> Result<(), MailError> {
        let message = OtpMessage::new(&self.sender, to, code, purpose);
        tracing::info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            bytes = message.html.len(),
            "OTP email prepared"
        );
        tracing::debug!(to, code, ?purpose, "OTP code");
        Ok(())
    }
}

/// HTML body for an OTP email.
///
/// The ten-minute notice is advisory text; expiry is whatever the
/// [`OtpStore`](crate::OtpStore) is configured with.
pub fn render_otp_email(code: &str, purpose: OtpPurpose) -> String {
    let title = purpose.title();
    let prompt = purpose.prompt();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="margin: 0; padding: 0; background-color: #0a0e1a; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;">
    <table width="100%" cellpadding="0" cellspacing="0" style="background-color: #0a0e1a; padding: 40px 20px;">
        <tr><td align="center">
            <table width="600" cellpadding="0" cellspacing="0" style="background: #1a1f3a; border-radius: 20px; border: 1px solid rgba(0, 240, 255, 0.2);">
                <tr><td style="background: linear-gradient(135deg, #ff0080, #00f0ff); padding: 40px; text-align: center;">
                    <h1 style="margin: 0; color: #ffffff; font-size: 32px; font-weight: 800; letter-spacing: 2px;">REAL ID</h1>
                </td></tr>
                <tr><td style="padding: 50px 40px;">
                    <h2 style="color: #00f0ff; margin: 0 0 20px 0; font-size: 24px;">{title}</h2>
                    <p style="color: rgba(255, 255, 255, 0.8); font-size: 16px; margin: 0 0 30px 0;">{prompt}</p>
                    <p style="margin: 0 0 10px 0; color: rgba(255, 255, 255, 0.6); font-size: 14px; text-transform: uppercase;">Your OTP Code</p>
                    <p style="margin: 0; color: #00f0ff; font-size: 48px; font-weight: 800; letter-spacing: 10px; font-family: 'Courier New', monospace;">{code}</p>
                    <p style="margin: 30px 0 0 0; color: #ff4d9f; font-size: 14px;">
                        <strong>Security Notice:</strong><br>
                        This code expires in 10 minutes. Never share it with anyone. REAL ID will never ask for your OTP.
                    </p>
                    <p style="color: rgba(255, 255, 255, 0.5); font-size: 14px; margin: 30px 0 0 0;">
                        If you didn't request this code, please ignore this email or contact support if you have concerns.
                    </p>
                </td></tr>
                <tr><td style="padding: 30px 40px; border-top: 1px solid rgba(255, 255, 255, 0.1);">
                    <p style="margin: 0; color: rgba(255, 255, 255, 0.5); font-size: 12px; text-align: center;">
                        REAL ID - Biometric Password Manager
                    </p>
                </td></tr>
            </table>
        </td></tr>
    </table>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_login_email() {
        let html = render_otp_email("482913", OtpPurpose::Login);
        assert!(html.contains("482913"));
        assert!(html.contains("Login Verification"));
        assert!(html.contains("Use this code to access your vault:"));
        assert!(html.contains("expires in 10 minutes"));
    }

    #[test]
    fn test_render_registration_email() {
        let html = render_otp_email("000111", OtpPurpose::Registration);
        assert!(html.contains("000111"));
        assert!(html.contains("Registration Verification"));
        assert!(!html.contains("Login Verification"));
    }

    #[test]
    fn test_message_subject_by_purpose() {
        let login = OtpMessage::new("no-reply@realid.local", "a@example.com", "1", OtpPurpose::Login);
        let reg = OtpMessage::new("no-reply@realid.local", "a@example.com", "1", OtpPurpose::Registration);
        assert_eq!(login.subject, "Your REAL ID OTP");
        assert_eq!(reg.subject, "Your REAL ID Registration OTP");
        assert_eq!(login.to, "a@example.com");
    }

    #[test]
    fn test_log_mailer_never_fails() {
        let mailer = LogMailer::new("no-reply@realid.local");
        assert!(mailer.send_otp("a@example.com", "123456", OtpPurpose::Login).is_ok());
    }
}
