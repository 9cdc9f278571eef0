use validator::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;

const MESSAGE_KINDS: [&str; 3] = ["text", "file", "call"];

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.len() < 3 || trimmed.len() > 32 {
        return Err(ValidationError::new("username_length"));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::new("username_chars"));
    }

    Ok(())
}

pub fn validate_password(value: &str) -> Result<(), ValidationError> {
    if value.len() < MIN_PASSWORD_LEN || value.len() > MAX_PASSWORD_LEN {
        return Err(ValidationError::new("password_length"));
    }
    Ok(())
}

pub fn validate_message_kind(value: &str) -> Result<(), ValidationError> {
    if !MESSAGE_KINDS.contains(&value) {
        return Err(ValidationError::new("message_kind"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation_allows_expected_chars() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("bob-the-builder").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("bad!name").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn password_validation_enforces_length() {
        assert!(validate_password("hunter22").is_ok());
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"p".repeat(129)).is_err());
    }

    #[test]
    fn message_kind_validation_rejects_unknown_kinds() {
        assert!(validate_message_kind("text").is_ok());
        assert!(validate_message_kind("file").is_ok());
        assert!(validate_message_kind("call").is_ok());
        assert!(validate_message_kind("video").is_err());
        assert!(validate_message_kind("").is_err());
    }
}
