//! Input rules for account registration.
//!
//! Callers run the checks in a fixed order: presence, email shape, identity
//! format, password policy. Uniqueness is checked against storage afterwards.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const PASSWORD_SYMBOLS: &str = "@$!%*?&";
pub const VALID_DIVISI: [&str; 4] = ["kebersihan", "kesehatan", "fasilitas umum", "kriminalitas"];

static NIK_REGEX: OnceLock<Regex> = OnceLock::new();

fn nik_regex() -> &'static Regex {
    NIK_REGEX.get_or_init(|| Regex::new(r"^[0-9]{16}$").expect("Invalid NIK regex"))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("NIK must be exactly 16 digits")]
    InvalidNik,
    #[error("Invalid divisi. Must be one of: kebersihan, kesehatan, fasilitas umum, kriminalitas")]
    InvalidDivisi,
    #[error("Password must be at least 8 characters long")]
    PasswordTooShort,
    #[error("Password must contain at least one lowercase letter")]
    PasswordMissingLowercase,
    #[error("Password must contain at least one uppercase letter")]
    PasswordMissingUppercase,
    #[error("Password must contain at least one digit")]
    PasswordMissingDigit,
    #[error("Password must contain at least one symbol (@$!%*?&)")]
    PasswordMissingSymbol,
    #[error("Password may only contain letters, digits and the symbols @$!%*?&")]
    PasswordInvalidCharacter,
}

/// Trimmed, non-empty view of an optional request field.
pub fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEmail),
    }
}

pub fn validate_nik(nik: &str) -> Result<(), ValidationError> {
    if nik_regex().is_match(nik) {
        Ok(())
    } else {
        Err(ValidationError::InvalidNik)
    }
}

pub fn validate_divisi(divisi: &str) -> Result<(), ValidationError> {
    if VALID_DIVISI.contains(&divisi) {
        Ok(())
    } else {
        Err(ValidationError::InvalidDivisi)
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }

    if password
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && !PASSWORD_SYMBOLS.contains(c))
    {
        return Err(ValidationError::PasswordInvalidCharacter);
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ValidationError::PasswordMissingLowercase);
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::PasswordMissingUppercase);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::PasswordMissingDigit);
    }

    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        return Err(ValidationError::PasswordMissingSymbol);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_policy_compliant_password() {
        assert_eq!(validate_password("Rahasia1!"), Ok(()));
        assert_eq!(validate_password("aB3$aB3$"), Ok(()));
    }

    #[test]
    fn rejects_each_missing_composition_rule() {
        assert_eq!(validate_password("Ra1!"), Err(ValidationError::PasswordTooShort));
        assert_eq!(
            validate_password("RAHASIA1!"),
            Err(ValidationError::PasswordMissingLowercase)
        );
        assert_eq!(
            validate_password("rahasia1!"),
            Err(ValidationError::PasswordMissingUppercase)
        );
        assert_eq!(
            validate_password("Rahasiaa!"),
            Err(ValidationError::PasswordMissingDigit)
        );
        assert_eq!(
            validate_password("Rahasia12"),
            Err(ValidationError::PasswordMissingSymbol)
        );
    }

    #[test]
    fn rejects_symbols_outside_allowed_set() {
        assert_eq!(
            validate_password("Rahasia1#"),
            Err(ValidationError::PasswordInvalidCharacter)
        );
        assert_eq!(
            validate_password("Rahasia 1!"),
            Err(ValidationError::PasswordInvalidCharacter)
        );
    }

    #[test]
    fn nik_must_be_sixteen_ascii_digits() {
        assert_eq!(validate_nik("3201234567890123"), Ok(()));
        assert_eq!(validate_nik("320123456789012"), Err(ValidationError::InvalidNik));
        assert_eq!(validate_nik("32012345678901234"), Err(ValidationError::InvalidNik));
        assert_eq!(validate_nik("32012345678901a3"), Err(ValidationError::InvalidNik));
        assert_eq!(validate_nik("３２０１２３４５６７８９０１２３"), Err(ValidationError::InvalidNik));
    }

    #[test]
    fn divisi_is_a_closed_set() {
        assert_eq!(validate_divisi("fasilitas umum"), Ok(()));
        assert_eq!(validate_divisi("Kebersihan"), Err(ValidationError::InvalidDivisi));
        assert_eq!(validate_divisi("keuangan"), Err(ValidationError::InvalidDivisi));
    }

    #[test]
    fn email_needs_local_part_and_domain() {
        assert_eq!(validate_email("warga@example.com"), Ok(()));
        assert_eq!(validate_email("warga.example.com"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email("@example.com"), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn present_trims_and_drops_blank_values() {
        assert_eq!(present(&Some("  budi ".into())), Some("budi"));
        assert_eq!(present(&Some("   ".into())), None);
        assert_eq!(present(&None), None);
    }
}
