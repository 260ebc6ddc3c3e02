use crate::engine::EngineHandle;
use crate::error::AuthError;
use crate::mailer::{Mailer, OtpPurpose};
use crate::otp::OtpStore;
use crate::registration::RegistrationState;
use realid_core::{FirstWithinThreshold, IdentityRecord, Matcher, MATCH_THRESHOLD};
use realid_store::IdentityStore;
use std::sync::Arc;

const DEFAULT_DISPLAY_NAME: &str = "User";

/// Entry point for the web layer: resolves identities by OTP or by face,
/// and drives registration.
///
/// Session handling stays with the caller. Every method is a single
/// request; failures are returned, never retried.
pub struct AuthService<S> {
    store: Arc<S>,
    otp: Arc<OtpStore>,
    mailer: Arc<dyn Mailer>,
    engine: EngineHandle,
    threshold: f32,
}

impl<S: IdentityStore> AuthService<S> {
    pub fn new(store: Arc<S>, otp: Arc<OtpStore>, mailer: Arc<dyn Mailer>, engine: EngineHandle) -> Self {
        Self {
            store,
            otp,
            mailer,
            engine,
            threshold: MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Whether an identity is registered under `email`.
    pub fn check_email(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.store.find_by_email(email)?.is_some())
    }

    /// Greeting name for the vault page.
    pub fn display_name(&self, email: &str) -> Result<String, AuthError> {
        Ok(self
            .store
            .find_by_email(email)?
            .map(|record| record.name)
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()))
    }

    /// Issue and send a login code to a registered email.
    ///
    /// If delivery fails the issued code stays pending.
    pub fn send_login_otp(&self, email: &str) -> Result<(), AuthError> {
        if !self.check_email(email)? {
            return Err(AuthError::UnknownIdentity(email.to_string()));
        }
        let code = self.otp.issue(email);
        self.mailer.send_otp(email, &code, OtpPurpose::Login)?;
        tracing::info!(email, "login OTP sent");
        Ok(())
    }

    pub fn verify_login_otp(&self, email: &str, code: &str) -> Result<(), AuthError> {
        if self.otp.verify(email, code) {
            tracing::info!(email, "login OTP accepted");
            Ok(())
        } else {
            tracing::info!(email, "login OTP rejected");
            Err(AuthError::InvalidOtp)
        }
    }

    /// Identify the person in `image` against every enrolled descriptor.
    /// Returns the matched email.
    pub async fn authenticate_face(&self, image: Vec<u8>) -> Result<String, AuthError> {
        let capture = self.engine.capture(image).await?;
        let gallery = self.store.all()?;
        let result = FirstWithinThreshold.compare(&capture.descriptor, &gallery, self.threshold);

        match result.email {
            Some(email) if result.matched => {
                tracing::info!(
                    email = %email,
                    distance = result.distance.unwrap_or_default(),
                    "face recognized"
                );
                Ok(email)
            }
            _ => {
                tracing::info!(compared = result.compared, "face not recognized");
                Err(AuthError::NoMatch)
            }
        }
    }

    /// Start (or restart) registration: reject known emails, then send a
    /// registration code.
    pub fn begin_registration(
        &self,
        state: &mut RegistrationState,
        email: &str,
        name: &str,
    ) -> Result<(), AuthError> {
        if matches!(state, RegistrationState::Registered { .. }) {
            return Err(AuthError::InvalidTransition {
                action: "begin registration",
                state: state.name(),
            });
        }
        if self.check_email(email)? {
            return Err(AuthError::DuplicateIdentity(email.to_string()));
        }

        let code = self.otp.issue(email);
        self.mailer.send_otp(email, &code, OtpPurpose::Registration)?;

        *state = RegistrationState::OtpPending {
            email: email.to_string(),
            name: name.to_string(),
        };
        tracing::info!(email, "registration OTP sent");
        Ok(())
    }

    /// Check the registration code. On success the flow waits for a face.
    pub fn confirm_registration_otp(
        &self,
        state: &mut RegistrationState,
        code: &str,
    ) -> Result<(), AuthError> {
        let RegistrationState::OtpPending { email, name } = &mut *state else {
            return Err(AuthError::InvalidTransition {
                action: "confirm registration code",
                state: state.name(),
            });
        };
        if !self.otp.verify(email, code) {
            return Err(AuthError::InvalidOtp);
        }

        let email = std::mem::take(email);
        let name = std::mem::take(name);
        tracing::info!(email = %email, "registration OTP accepted");
        *state = RegistrationState::FacePending { email, name };
        Ok(())
    }

    /// Enroll the face in `image` and write the identity record.
    ///
    /// Any failure keeps the state at `FacePending` so the caller can
    /// submit another image.
    pub async fn complete_registration(
        &self,
        state: &mut RegistrationState,
        image: Vec<u8>,
    ) -> Result<IdentityRecord, AuthError> {
        let RegistrationState::FacePending { email, name } = &*state else {
            return Err(AuthError::InvalidTransition {
                action: "enroll face",
                state: state.name(),
            });
        };
        let (email, name) = (email.clone(), name.clone());

        let capture = self.engine.capture(image).await?;

        // Early answer for the common case. The insert is the real guard.
        if self.check_email(&email)? {
            return Err(AuthError::DuplicateIdentity(email));
        }
        let record = self.store.insert(&email, &name, &capture.descriptor)?;

        tracing::info!(email = %email, "face registered");
        *state = RegistrationState::Registered { email };
        Ok(record)
    }
}
