//! Password rules and the attach-time challenge

use common::{Error, Result};
use std::time::{Duration, Instant};

/// Seconds before the deadline at which the prompt should warn the user
pub const URGENT_THRESHOLD: Duration = Duration::from_secs(5);

/// Longest challenge window; longer timeouts are clamped to it
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Check a new password and its confirmation
pub fn validate_new_password(password: &str, confirm: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::Auth("password cannot be empty".to_string()));
    }
    if password != confirm {
        return Err(Error::Auth("passwords do not match".to_string()));
    }
    Ok(())
}

/// Result of answering a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    /// Wrong password; the challenge stays open until its deadline
    WrongPassword,
    Expired,
}

/// Challenge raised for a device that is not whitelisted
#[derive(Debug, Clone)]
pub struct PendingAuth {
    device_id: String,
    device_name: String,
    started_at: Instant,
    deadline: Instant,
    attempts: u32,
}

impl PendingAuth {
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>, timeout: Duration) -> Self {
        Self::starting_at(device_id, device_name, timeout, Instant::now())
    }

    pub fn starting_at(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        let timeout = timeout.min(MAX_TIMEOUT);
        let deadline = now.checked_add(timeout).unwrap_or(now);

        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            started_at: now,
            deadline,
            attempts: 0,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// True in the last few seconds before the deadline
    pub fn is_urgent(&self, now: Instant) -> bool {
        !self.is_expired(now) && self.remaining(now) <= URGENT_THRESHOLD
    }

    /// Check an entered password against the stored one
    ///
    /// An unset stored password never matches.
    pub fn verify(&mut self, entered: &str, stored: &str, now: Instant) -> AuthOutcome {
        if self.is_expired(now) {
            return AuthOutcome::Expired;
        }

        self.attempts += 1;
        if !stored.is_empty() && constant_time_eq(entered.as_bytes(), stored.as_bytes()) {
            AuthOutcome::Granted
        } else {
            AuthOutcome::WrongPassword
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("hunter2", "hunter2").is_ok());
        assert!(matches!(
            validate_new_password("", ""),
            Err(Error::Auth(msg)) if msg == "password cannot be empty"
        ));
        assert!(matches!(
            validate_new_password("hunter2", "hunter3"),
            Err(Error::Auth(msg)) if msg == "passwords do not match"
        ));
    }

    #[test]
    fn test_verify_granted() {
        let now = Instant::now();
        let mut pending = PendingAuth::starting_at("1:2:", "Device 1:2", Duration::from_secs(30), now);
        assert_eq!(pending.verify("secret", "secret", now), AuthOutcome::Granted);
        assert_eq!(pending.attempts(), 1);
    }

    #[test]
    fn test_verify_wrong_password_keeps_challenge_open() {
        let now = Instant::now();
        let mut pending = PendingAuth::starting_at("1:2:", "Device 1:2", Duration::from_secs(30), now);
        assert_eq!(pending.verify("guess", "secret", now), AuthOutcome::WrongPassword);
        assert_eq!(
            pending.verify("secret", "secret", now + Duration::from_secs(10)),
            AuthOutcome::Granted
        );
        assert_eq!(pending.attempts(), 2);
    }

    #[test]
    fn test_unset_password_never_matches() {
        let now = Instant::now();
        let mut pending = PendingAuth::starting_at("1:2:", "Device 1:2", Duration::from_secs(30), now);
        assert_eq!(pending.verify("", "", now), AuthOutcome::WrongPassword);
    }

    #[test]
    fn test_expiry() {
        let now = Instant::now();
        let mut pending = PendingAuth::starting_at("1:2:", "Device 1:2", Duration::from_secs(30), now);

        assert_eq!(pending.remaining(now), Duration::from_secs(30));
        assert!(!pending.is_urgent(now + Duration::from_secs(20)));
        assert!(pending.is_urgent(now + Duration::from_secs(25)));

        let late = now + Duration::from_secs(30);
        assert!(pending.is_expired(late));
        assert!(!pending.is_urgent(late));
        assert_eq!(pending.remaining(late), Duration::ZERO);
        assert_eq!(pending.verify("secret", "secret", late), AuthOutcome::Expired);
        assert_eq!(pending.attempts(), 0);
    }

    #[test]
    fn test_oversized_timeout_is_clamped() {
        let now = Instant::now();
        let pending = PendingAuth::starting_at("1:2:", "Device 1:2", Duration::MAX, now);

        assert!(!pending.is_expired(now));
        assert_eq!(pending.remaining(now), MAX_TIMEOUT);

        let pending = PendingAuth::starting_at(
            "1:2:",
            "Device 1:2",
            Duration::from_secs(i64::MAX as u64),
            now,
        );
        assert_eq!(pending.remaining(now), MAX_TIMEOUT);
    }
}
