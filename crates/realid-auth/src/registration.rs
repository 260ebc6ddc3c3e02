//! Registration state machine.
//!
//! ```text
//! Unverified --begin--> OtpPending --confirm otp--> FacePending --face--> Registered
//! ```
//!
//! The state lives with the caller (typically a session), so it is
//! serializable. Nothing is persisted until the final transition. Failed
//! steps leave the state where it was.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationState {
    #[default]
    Unverified,
    OtpPending { email: String, name: String },
    FacePending { email: String, name: String },
    Registered { email: String },
}

impl RegistrationState {
    pub fn name(&self) -> &'static str {
        match self {
            RegistrationState::Unverified => "unverified",
            RegistrationState::OtpPending { .. } => "otp_pending",
            RegistrationState::FacePending { .. } => "face_pending",
            RegistrationState::Registered { .. } => "registered",
        }
    }

    /// Email of the registration in progress, if any.
    pub fn email(&self) -> Option<&str> {
        match self {
            RegistrationState::Unverified => None,
            RegistrationState::OtpPending { email, .. }
            | RegistrationState::FacePending { email, .. }
            | RegistrationState::Registered { email } => Some(email),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unverified() {
        assert_eq!(RegistrationState::default(), RegistrationState::Unverified);
        assert_eq!(RegistrationState::default().email(), None);
    }

    #[test]
    fn test_session_form() {
        let state = RegistrationState::FacePending {
            email: "alice@example.com".into(),
            name: "Alice".into(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "face_pending", "email": "alice@example.com", "name": "Alice"})
        );
        assert_eq!(state.name(), "face_pending");
        assert_eq!(state.email(), Some("alice@example.com"));
    }
}
