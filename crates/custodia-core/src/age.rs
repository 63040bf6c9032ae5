//! Date-of-birth checks for the ingestion gate.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to assume when a date of birth does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedDobPolicy {
    /// Treat the subject as an adult.
    #[default]
    AssumeAdult,
    /// Treat the subject as a minor, requiring guardian consent.
    AssumeMinor,
}

/// Outcome of an age check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeCheck {
    pub is_minor: bool,
    pub needs_guardian: bool,
}

/// Computes minor status from a `YYYY-MM-DD` date of birth.
///
/// Age is whole calendar years: someone is a year older only once the
/// month/day of their birthday has passed, never by elapsed-day
/// division.
#[derive(Debug, Clone)]
pub struct AgeVerifier {
    adult_age: i32,
    malformed_policy: MalformedDobPolicy,
}

impl Default for AgeVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AgeVerifier {
    pub const DEFAULT_ADULT_AGE: i32 = 18;

    pub fn new() -> Self {
        Self {
            adult_age: Self::DEFAULT_ADULT_AGE,
            malformed_policy: MalformedDobPolicy::default(),
        }
    }

    pub fn with_malformed_policy(mut self, policy: MalformedDobPolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    pub fn with_adult_age(mut self, years: i32) -> Self {
        self.adult_age = years;
        self
    }

    /// Check against the current date.
    pub fn check(&self, dob: &str) -> AgeCheck {
        self.check_at(dob, Utc::now().date_naive())
    }

    /// Check against an explicit `today`, for deterministic callers.
    pub fn check_at(&self, dob: &str, today: NaiveDate) -> AgeCheck {
        let parsed = match NaiveDate::parse_from_str(dob, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                warn!(
                    policy = ?self.malformed_policy,
                    "unparseable date of birth, applying malformed-DOB policy"
                );
                return match self.malformed_policy {
                    MalformedDobPolicy::AssumeAdult => AgeCheck {
                        is_minor: false,
                        needs_guardian: false,
                    },
                    MalformedDobPolicy::AssumeMinor => AgeCheck {
                        is_minor: true,
                        needs_guardian: true,
                    },
                };
            }
        };
        let mut age = today.year() - parsed.year();
        if (today.month(), today.day()) < (parsed.month(), parsed.day()) {
            age -= 1;
        }
        let is_minor = age < self.adult_age;
        AgeCheck {
            is_minor,
            needs_guardian: is_minor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_adult() {
        let check = AgeVerifier::new().check_at("1990-05-01", day(2026, 8, 22));
        assert!(!check.is_minor);
        assert!(!check.needs_guardian);
    }

    #[test]
    fn test_minor() {
        let check = AgeVerifier::new().check_at("2015-06-01", day(2026, 8, 22));
        assert!(check.is_minor);
        assert!(check.needs_guardian);
    }

    #[test]
    fn test_birthday_boundary_is_calendar_aware() {
        let verifier = AgeVerifier::new();
        // Day before the 18th birthday: still a minor
        let check = verifier.check_at("2008-08-23", day(2026, 8, 22));
        assert!(check.is_minor);
        // The birthday itself: adult
        let check = verifier.check_at("2008-08-22", day(2026, 8, 22));
        assert!(!check.is_minor);
    }

    #[test]
    fn test_future_dob_counts_as_minor() {
        let check = AgeVerifier::new().check_at("2030-01-01", day(2026, 8, 22));
        assert!(check.is_minor);
    }

    #[test]
    fn test_malformed_defaults_to_adult() {
        let check = AgeVerifier::new().check_at("not-a-date", day(2026, 8, 22));
        assert!(!check.is_minor);
        assert!(!check.needs_guardian);
    }

    #[test]
    fn test_malformed_fail_closed() {
        let verifier = AgeVerifier::new().with_malformed_policy(MalformedDobPolicy::AssumeMinor);
        let check = verifier.check_at("02/01/1990", day(2026, 8, 22));
        assert!(check.is_minor);
        assert!(check.needs_guardian);
    }

    #[test]
    fn test_custom_adult_age() {
        let verifier = AgeVerifier::new().with_adult_age(21);
        let check = verifier.check_at("2007-01-01", day(2026, 8, 22));
        assert!(check.is_minor);
    }
}
