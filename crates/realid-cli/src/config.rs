use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// SeetaFace frontal detector model.
    #[cfg_attr(feature = "opencv", allow(dead_code))]
    pub detector_model: PathBuf,
    /// Haar cascade XML, used by the OpenCV backend.
    #[cfg_attr(not(feature = "opencv"), allow(dead_code))]
    pub cascade_path: PathBuf,
    /// Euclidean distance a probe must stay under to match.
    pub match_threshold: f32,
    /// OTP lifetime in seconds; 0 disables expiry.
    pub otp_ttl_secs: u64,
    /// From address on OTP emails.
    pub mail_sender: String,
}

impl Config {
    /// Load configuration from `REALID_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("realid");

        Self {
            db_path: env_path("REALID_DB_PATH").unwrap_or_else(|| data_dir.join("realid.db")),
            detector_model: env_path("REALID_DETECTOR_MODEL")
                .unwrap_or_else(|| data_dir.join("seeta_fd_frontal_v1.0.bin")),
            cascade_path: env_path("REALID_CASCADE_PATH")
                .unwrap_or_else(|| data_dir.join("haarcascade_frontalface_default.xml")),
            match_threshold: env_f32("REALID_MATCH_THRESHOLD", realid_core::MATCH_THRESHOLD),
            otp_ttl_secs: env_u64("REALID_OTP_TTL_SECS", 0),
            mail_sender: std::env::var("REALID_MAIL_SENDER")
                .unwrap_or_else(|_| "no-reply@realid.local".to_string()),
        }
    }

    pub fn otp_ttl(&self) -> Option<Duration> {
        (self.otp_ttl_secs > 0).then(|| Duration::from_secs(self.otp_ttl_secs))
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(otp_ttl_secs: u64) -> Config {
        Config {
            db_path: PathBuf::from("/tmp/realid.db"),
            detector_model: PathBuf::new(),
            cascade_path: PathBuf::new(),
            match_threshold: 5.0,
            otp_ttl_secs,
            mail_sender: "no-reply@realid.local".into(),
        }
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        assert_eq!(config(0).otp_ttl(), None);
        assert_eq!(config(600).otp_ttl(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_env_helpers_fall_back_on_missing_or_bad_values() {
        assert_eq!(env_f32("REALID_TEST_UNSET_F32", 5.0), 5.0);
        assert_eq!(env_u64("REALID_TEST_UNSET_U64", 7), 7);
        assert_eq!(env_path("REALID_TEST_UNSET_PATH"), None);
    }
}
