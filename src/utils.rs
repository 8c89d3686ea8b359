use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::errors::{AppError, AuthErrorCode};

pub const PASSWORD_MIN: usize = 12;
pub const PASSWORD_MAX: usize = 128;
const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;':\",.<>?/";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map_err(|e| {
            log::error!("Failed to hash password: {}", e);
            AppError::PasswordError(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// `false` for a wrong password; an error only for an unreadable stored hash.
pub fn verify_password(provided: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        log::error!("Stored password hash is malformed: {}", e);
        AppError::PasswordError(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(provided.as_bytes(), &parsed)
        .is_ok())
}

/// Lowercased address, or the auth error the form should show.
pub fn normalise_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::Auth(AuthErrorCode::InvalidEmail));
    }
    Ok(email)
}

pub fn check_password_strength(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    let strong = (PASSWORD_MIN..=PASSWORD_MAX).contains(&len)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| c.is_alphabetic())
        && password.chars().any(|c| SPECIAL_CHARS.contains(c));
    if !strong {
        return Err(AppError::Auth(AuthErrorCode::WeakPassword));
    }
    Ok(())
}
