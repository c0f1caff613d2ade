/*!
 * Input Validation Module
 *
 * Centralized validation for identifiers and tuning values that cross the
 * engine boundary (owner ids, candidate ids, thresholds, sample counts).
 */
use thiserror::Error;

/// Largest accepted enrollment sample count
pub const MAX_ENROLL_SAMPLES: u32 = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too long: max {max}, got {actual}")]
    ValueTooLong { max: usize, actual: usize },
}

/// Validate template owner id (alphanumeric + `_`, `-`, `.`, max 64 chars)
pub fn validate_owner_id(owner: &str) -> Result<&str, ValidationError> {
    if owner.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Owner id cannot be empty".to_string(),
        ));
    }

    if owner.len() > 64 {
        return Err(ValidationError::ValueTooLong {
            max: 64,
            actual: owner.len(),
        });
    }

    if !owner
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ValidationError::InvalidFormat(
            "Owner id can only contain letters, numbers, dots, underscores, and hyphens"
                .to_string(),
        ));
    }

    Ok(owner)
}

/// Validate gallery candidate id (max 128 chars, no control characters)
pub fn validate_candidate_id(id: &str) -> Result<&str, ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Candidate id cannot be empty".to_string(),
        ));
    }

    if id.len() > 128 {
        return Err(ValidationError::ValueTooLong {
            max: 128,
            actual: id.len(),
        });
    }

    if id.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(
            "Candidate id contains invalid control characters".to_string(),
        ));
    }

    Ok(id)
}

/// Validate match threshold on the 0..=100 score scale
pub fn validate_threshold(threshold: u32) -> Result<u32, ValidationError> {
    if threshold > 100 {
        return Err(ValidationError::InvalidRange(format!(
            "Threshold must be between 0 and 100, got {}",
            threshold
        )));
    }
    Ok(threshold)
}

/// Validate number of enrollment samples (1 to MAX_ENROLL_SAMPLES)
pub fn validate_enroll_samples(samples: u32) -> Result<u32, ValidationError> {
    if !(1..=MAX_ENROLL_SAMPLES).contains(&samples) {
        return Err(ValidationError::InvalidRange(format!(
            "Enrollment samples must be between 1 and {}, got {}",
            MAX_ENROLL_SAMPLES, samples
        )));
    }
    Ok(samples)
}

/// Validate a placeholder score (0..=100)
pub fn validate_score(score: u8) -> Result<u8, ValidationError> {
    if score > 100 {
        return Err(ValidationError::InvalidRange(format!(
            "Score must be between 0 and 100, got {}",
            score
        )));
    }
    Ok(score)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn owner_id_accepts_allowed_set(s in r"[A-Za-z0-9_.\-]{1,64}") {
            assert!(validate_owner_id(&s).is_ok());
        }

        #[test]
        fn owner_id_rejects_whitespace(a in r"[a-z]{1,8}", b in r"[a-z]{1,8}") {
            let s = format!("{} {}", a, b);
            assert!(validate_owner_id(&s).is_err());
        }

        #[test]
        fn candidate_id_rejects_controls(s in r"[\x00-\x1F\x7F]{1,16}") {
            assert!(validate_candidate_id(&s).is_err());
        }

        #[test]
        fn threshold_in_range(x in 0u32..=100) {
            assert!(validate_threshold(x).is_ok());
        }

        #[test]
        fn threshold_outside_range(x in 101u32..) {
            assert!(validate_threshold(x).is_err());
        }

        #[test]
        fn enroll_samples_outside_range(x in any::<u32>().prop_filter("out of [1,16]", |v| *v == 0 || *v > MAX_ENROLL_SAMPLES)) {
            assert!(validate_enroll_samples(x).is_err());
        }
    }
}
