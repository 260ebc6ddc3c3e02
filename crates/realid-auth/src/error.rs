use crate::engine::EngineError;
use crate::mailer::MailError;
use realid_core::FaceError;
use realid_store::StoreError;
use thiserror::Error;

/// Request-level failures. None is retried internally.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("failed to read image: {0}")]
    Decode(String),
    #[error("no face detected - please ensure your face is visible")]
    NoFaceDetected,
    #[error("email already registered: {0}")]
    DuplicateIdentity(String),
    #[error("face not recognized - please try again or use OTP")]
    NoMatch,
    #[error("email not found, please register: {0}")]
    UnknownIdentity(String),
    #[error("invalid OTP")]
    InvalidOtp,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("failed to send email: {0}")]
    Mail(#[from] MailError),
    #[error("cannot {action} from registration state {state}")]
    InvalidTransition { action: &'static str, state: &'static str },
    #[error("face engine unavailable: {0}")]
    Engine(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(email) => AuthError::DuplicateIdentity(email),
            other => {
                tracing::error!(error = %other, "store failure");
                AuthError::StoreUnavailable(other.to_string())
            }
        }
    }
}

impl From<EngineError> for AuthError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Face(FaceError::Decode(e)) => AuthError::Decode(e.to_string()),
            EngineError::Face(FaceError::NoFaceDetected) => AuthError::NoFaceDetected,
            other => {
                tracing::error!(error = %other, "face engine failure");
                AuthError::Engine(other.to_string())
            }
        }
    }
}
