//! Validation helpers for DTOs.

use validator::ValidationError;

const ID_MAX_LENGTH: usize = 64;

/// Validates that a room identifier is 1..=64 characters of lowercase
/// alphanumerics and dashes.
///
/// # Examples
///
/// ```ignore
/// validate_room_id("friday-night-01") // Ok
/// validate_room_id("Friday Night")    // Err - uppercase and space
/// validate_room_id("")                // Err - empty
/// ```
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > ID_MAX_LENGTH {
        let mut err = ValidationError::new("room_id_length");
        err.message =
            Some(format!("Room ID must be 1..={ID_MAX_LENGTH} characters (got {})", id.len()).into());
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        let mut err = ValidationError::new("room_id_format");
        err.message =
            Some("Room ID must contain only lowercase alphanumerics and dashes".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a participant identifier is 1..=64 non-whitespace
/// characters. The identity must be stable across reconnects, so anything
/// that survives URL/JSON round-trips unchanged is accepted.
pub fn validate_participant_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > ID_MAX_LENGTH {
        let mut err = ValidationError::new("participant_id_length");
        err.message = Some(
            format!("Participant ID must be 1..={ID_MAX_LENGTH} characters (got {})", id.len())
                .into(),
        );
        return Err(err);
    }

    if id.chars().any(char::is_whitespace) {
        let mut err = ValidationError::new("participant_id_format");
        err.message = Some("Participant ID must not contain whitespace".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_id_valid() {
        assert!(validate_room_id("friday-night-01").is_ok());
        assert!(validate_room_id("a").is_ok());
        assert!(validate_room_id("0-0").is_ok());
    }

    #[test]
    fn test_validate_room_id_invalid() {
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("Friday").is_err()); // uppercase
        assert!(validate_room_id("friday night").is_err()); // space
        assert!(validate_room_id(&"x".repeat(65)).is_err()); // too long
    }

    #[test]
    fn test_validate_participant_id() {
        assert!(validate_participant_id("device-abc123").is_ok());
        assert!(validate_participant_id("Anna's_Phone").is_ok());
        assert!(validate_participant_id("").is_err());
        assert!(validate_participant_id("two words").is_err());
        assert!(validate_participant_id(&"x".repeat(65)).is_err());
    }
}
