//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{MarketError, MarketResult};

fn invalid(message: &str) -> MarketError {
    MarketError::Validation(message.to_string())
}

/// Validate email
pub fn validate_email(email: &str) -> MarketResult<()> {
    if email.is_empty() {
        return Err(invalid("Email is required"));
    }

    if email.len() > 254 {
        return Err(invalid("Email must be at most 254 characters long"));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err(invalid("Invalid email format"));
    }

    Ok(())
}

/// Validate password
///
/// At least 8 characters, letters and digits only, with one lowercase
/// letter, one uppercase letter and one digit.
pub fn validate_password(password: &str) -> MarketResult<()> {
    if password.len() < 8 {
        return Err(invalid("Password must be at least 8 characters long"));
    }

    if password.len() > 128 {
        return Err(invalid("Password must be at most 128 characters long"));
    }

    if !password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("Password can only contain letters and digits"));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !(has_upper && has_lower && has_digit) {
        return Err(invalid(
            "Password must contain an uppercase letter, a lowercase letter and a digit",
        ));
    }

    Ok(())
}

/// Validate a display name
pub fn validate_name(name: &str) -> MarketResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid("Name is required"));
    }

    if trimmed.chars().count() > 100 {
        return Err(invalid("Name must be at most 100 characters long"));
    }

    Ok(())
}

/// Validate phone number: optional `+`, then 7 to 15 digits
pub fn validate_phone(phone: &str) -> MarketResult<()> {
    static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PHONE_REGEX
        .get_or_init(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("Failed to compile phone regex"));

    if !regex.is_match(phone) {
        return Err(invalid("Invalid phone number"));
    }

    Ok(())
}

/// Validate a category name (3 to 50 characters)
pub fn validate_category_name(name: &str) -> MarketResult<()> {
    let len = name.trim().chars().count();
    if !(3..=50).contains(&len) {
        return Err(invalid("Category name must be between 3 and 50 characters"));
    }

    Ok(())
}

/// Validate a free-text description (at most 500 characters)
pub fn validate_description(description: &str) -> MarketResult<()> {
    if description.chars().count() > 500 {
        return Err(invalid("Description must be at most 500 characters long"));
    }

    Ok(())
}

/// Validate a product cost: finite and non-negative
pub fn validate_cost(cost: f64) -> MarketResult<()> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(invalid("Cost must be a non-negative number"));
    }

    Ok(())
}
