//! In-memory one-time codes, one live code per email.
//!
//! Issuing overwrites any pending code for the email. A successful verify
//! consumes the code; a failed verify leaves it for another attempt. Both
//! happen under one lock, so a code can be redeemed at most once even when
//! verifications race.
//!
//! Codes never expire unless a TTL is configured.

use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const OTP_DIGITS: usize = 6;

type Generator = Box<dyn Fn() -> String + Send + Sync>;

struct PendingCode {
    code: String,
    issued_at: Instant,
}

pub struct OtpStore {
    codes: Mutex<HashMap<String, PendingCode>>,
    ttl: Option<Duration>,
    generator: Generator,
}

impl OtpStore {
    /// Store with random codes and the given expiry (`None` = never).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self::with_generator(ttl, random_code)
    }

    /// Store with a custom code source.
    pub fn with_generator(
        ttl: Option<Duration>,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            ttl,
            generator: Box::new(generator),
        }
    }

    /// Issue a fresh code for `email`, replacing any pending one.
    pub fn issue(&self, email: &str) -> String {
        let code = (self.generator)();
        let replaced = self
            .codes()
            .insert(
                email.to_string(),
                PendingCode {
                    code: code.clone(),
                    issued_at: Instant::now(),
                },
            )
            .is_some();
        tracing::debug!(email, replaced, "OTP issued");
        code
    }

    /// Check `code` for `email`, consuming it on success.
    pub fn verify(&self, email: &str, code: &str) -> bool {
        let mut codes = self.codes();
        let Some(pending) = codes.get(email) else {
            return false;
        };

        if let Some(ttl) = self.ttl {
            if pending.issued_at.elapsed() > ttl {
                codes.remove(email);
                tracing::debug!(email, "OTP expired");
                return false;
            }
        }

        if constant_time_eq(pending.code.as_bytes(), code.as_bytes()) {
            codes.remove(email);
            true
        } else {
            false
        }
    }

    /// Whether a code is waiting for `email`.
    pub fn is_pending(&self, email: &str) -> bool {
        self.codes().contains_key(email)
    }

    fn codes(&self) -> MutexGuard<'_, HashMap<String, PendingCode>> {
        self.codes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new(None)
    }
}

fn random_code() -> String {
    let mut rng = OsRng;
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

// Length is not secret; content is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;

    fn fixed(code: &'static str) -> OtpStore {
        OtpStore::with_generator(None, move || code.to_string())
    }

    #[test]
    fn test_random_code_shape() {
        for _ in 0..100 {
            let code = random_code();
            assert_eq!(code.len(), OTP_DIGITS);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_verify_consumes_code() {
        let otp = fixed("123456");
        otp.issue("bob@example.com");
        assert!(otp.verify("bob@example.com", "123456"));
        assert!(!otp.verify("bob@example.com", "123456"));
        assert!(!otp.is_pending("bob@example.com"));
    }

    #[test]
    fn test_failed_verify_keeps_code() {
        let otp = fixed("123456");
        otp.issue("bob@example.com");
        assert!(!otp.verify("bob@example.com", "000000"));
        assert!(otp.is_pending("bob@example.com"));
        assert!(otp.verify("bob@example.com", "123456"));
    }

    #[test]
    fn test_reissue_overwrites() {
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let otp = OtpStore::with_generator(None, move || {
            format!("{:06}", c.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        });

        let first = otp.issue("bob@example.com");
        let second = otp.issue("bob@example.com");
        assert_ne!(first, second);
        assert!(!otp.verify("bob@example.com", &first));
        assert!(otp.verify("bob@example.com", &second));
    }

    #[test]
    fn test_codes_scoped_per_email() {
        let otp = fixed("111111");
        otp.issue("a@example.com");
        assert!(!otp.verify("b@example.com", "111111"));
        assert!(otp.verify("a@example.com", "111111"));
    }

    #[test]
    fn test_expired_code_rejected_and_dropped() {
        let otp = OtpStore::with_generator(Some(Duration::ZERO), || "123456".to_string());
        otp.issue("bob@example.com");
        std::thread::sleep(Duration::from_millis(5));
        assert!(!otp.verify("bob@example.com", "123456"));
        assert!(!otp.is_pending("bob@example.com"));
    }

    #[test]
    fn test_concurrent_verify_redeems_once() {
        let otp = Arc::new(fixed("654321"));
        otp.issue("bob@example.com");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let otp = Arc::clone(&otp);
                std::thread::spawn(move || otp.verify("bob@example.com", "654321"))
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[rstest]
    #[case("123456", "123456", true)]
    #[case("123456", "123457", false)]
    #[case("123456", "12345", false)]
    #[case("123456", "", false)]
    fn test_constant_time_eq(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(constant_time_eq(a.as_bytes(), b.as_bytes()), expected);
    }
}
