//! Input validation for API requests.
//!
//! Each function returns the message to report for its field. Collect them
//! into an `ApiError` with the `ValidationErrorBuilder` from the `error`
//! module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Loose email shape check; deliverability is not our concern
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Phone numbers: digits with optional leading +, spaces, dashes, parens
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9][0-9 ()\-]{3,24}$"
    ).unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Non-blank text field
pub fn validate_required(value: &str, label: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    Ok(())
}

/// Database ids are positive
pub fn validate_id(id: i64, label: &str) -> Result<(), String> {
    if id <= 0 {
        return Err(format!("Invalid {}", label));
    }
    Ok(())
}

/// Parse an id taken from a path or form field
pub fn parse_id(raw: &str, label: &str) -> Result<i64, String> {
    let id = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("Invalid {}", label))?;
    validate_id(id, label)?;
    Ok(id)
}

/// Calendar date in `YYYY-MM-DD` form
pub fn validate_date(date: &str) -> Result<(), String> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| "Invalid date format, expected YYYY-MM-DD".to_string())
}

pub fn validate_phone(phone: &str) -> Result<(), String> {
    if phone.trim().is_empty() {
        return Err("Phone is required".to_string());
    }

    if !PHONE_REGEX.is_match(phone.trim()) {
        return Err("Invalid phone number".to_string());
    }

    Ok(())
}

/// Enrollment length in months
pub fn validate_duration_months(months: u32) -> Result<(), String> {
    if months == 0 || months > 120 {
        return Err("Course duration must be between 1 and 120 months".to_string());
    }
    Ok(())
}
