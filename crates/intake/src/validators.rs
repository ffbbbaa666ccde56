//! Pure field validators

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// E.164: leading +, country code 1-9, 8 to 15 digits total
static E164_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{7,14}$").unwrap());

/// Standard email pattern match
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

/// Valid international phone number
///
/// Spaces, dashes and parentheses are tolerated as formatting and
/// stripped before the E.164 check.
pub fn is_valid_phone(value: &str) -> bool {
    let stripped: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    E164_RE.is_match(&stripped)
}

/// URL fields are valid when empty or when they start with `https://`
pub fn is_valid_url(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.starts_with("https://")
}
