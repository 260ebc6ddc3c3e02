//! realid-auth: the two REAL ID login factors and the enrollment flow.
//!
//! - [`OtpStore`]: six-digit codes keyed by email, consumed on success.
//! - [`Mailer`]: delivery contract for those codes.
//! - [`EngineHandle`]: face work on a dedicated thread.
//! - [`AuthService`]: email check, OTP login, face login, and the
//!   registration state machine ([`RegistrationState`]).

pub mod engine;
pub mod error;
pub mod mailer;
pub mod otp;
pub mod registration;
pub mod service;

pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use error::AuthError;
pub use mailer::{render_otp_email, LogMailer, MailError, Mailer, OtpMessage, OtpPurpose};
pub use otp::OtpStore;
pub use registration::RegistrationState;
pub use service::AuthService;
