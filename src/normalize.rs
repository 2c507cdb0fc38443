//! Canonical forms for phone, email and postal identifiers.

use phonenumber::country::Id as CountryId;
use regex::Regex;
use std::sync::OnceLock;

/// Strips every non-digit character.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Trims and lowercases.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trims, collapses whitespace runs to one space and uppercases.
pub fn normalize_postal(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Ten-digit national number, dropping a leading US country code.
pub fn to_national_us(phone: &str) -> String {
    let digits = normalize_phone(phone);
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| {
            Regex::new(
                r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
            )
            .ok()
        })
        .as_ref()
}

/// Validates email format and rejects obvious filler addresses.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    const FAKE_PATTERNS: [&str; 4] = ["999999", "111111", "000000", "123456789"];
    if let Some(pattern) = FAKE_PATTERNS.iter().find(|p| email.contains(*p)) {
        tracing::debug!("Rejecting email with filler pattern '{}'", pattern);
        return false;
    }

    email_regex().is_some_and(|re| re.is_match(email))
}

/// Parses the number as a US phone number and checks it is dialable.
pub fn is_plausible_us_phone(raw: &str) -> bool {
    let digits = normalize_phone(raw);
    if digits.len() < 10 {
        return false;
    }

    match phonenumber::parse(Some(CountryId::US), &digits) {
        Ok(number) => phonenumber::is_valid(&number),
        Err(e) => {
            tracing::debug!("Failed to parse US phone: {:?}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_keeps_digits_only() {
        assert_eq!(normalize_phone("(650) 776-9592"), "6507769592");
        assert_eq!(normalize_phone("+1 650.776.9592 ext"), "16507769592");
        assert_eq!(normalize_phone("no digits"), "");
    }

    #[test]
    fn national_drops_country_code() {
        assert_eq!(to_national_us("+1 (650) 776-9592"), "6507769592");
        assert_eq!(to_national_us("6507769592"), "6507769592");
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }

    #[test]
    fn postal_whitespace_is_collapsed() {
        assert_eq!(normalize_postal("  k1a   0b1 "), "K1A 0B1");
        assert_eq!(normalize_postal("90210"), "90210");
        assert_eq!(normalize_postal("   "), "");
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("lead999999@example.com"));
        assert!(!is_valid_email("missing@domain"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn us_phone_plausibility() {
        assert!(is_plausible_us_phone("(650) 776-9592"));
        assert!(!is_plausible_us_phone("555"));
        assert!(!is_plausible_us_phone(""));
    }
}
