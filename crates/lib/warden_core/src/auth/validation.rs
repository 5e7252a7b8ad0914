//! Input checks for registration and login.

use super::AuthError;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt ignores everything past 72 bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Maximum profile name length in characters.
pub const MAX_PROFILE_NAME_CHARS: usize = 64;

const MAX_EMAIL_LENGTH: usize = 254;

/// Trim and lower-case an email for lookup and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check the basic `local@domain.tld` shape of a normalized email.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let invalid = || AuthError::Validation("Invalid email address".into());

    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }
    Ok(())
}

/// Single pass/fail strength check: length plus upper, lower, digit and
/// symbol classes.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::Validation(format!(
            "Password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    let strong = password.chars().any(char::is_uppercase)
        && password.chars().any(char::is_lowercase)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric());
    if !strong {
        return Err(AuthError::Validation(
            "Password must mix upper-case, lower-case, digit and symbol characters".into(),
        ));
    }
    Ok(())
}

/// Trim a profile name and check its length.
pub fn validate_profile_name(name: &str) -> Result<String, AuthError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_PROFILE_NAME_CHARS {
        return Err(AuthError::Validation(format!(
            "Profile name must be 1 to {MAX_PROFILE_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
