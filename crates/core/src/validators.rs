//! Shape checks for credentials entered during sign-up and account changes.

use once_cell::sync::Lazy;
use regex::Regex;

/// Special characters a password may draw its symbol from.
pub const PASSWORD_SPECIALS: &str = "#?!@$%^&*-";

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 16;

/// Minimum accepted username length.
pub const MIN_USERNAME_LEN: usize = 2;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("invalid email regex"));

/// Loose structural check: something at-sign something dot something.
pub fn validate_email(mail: &str) -> bool {
    EMAIL_RE.is_match(mail)
}

/// A password needs length plus one character from each of four classes.
///
/// The look-ahead regex this mirrors is not expressible with the `regex`
/// crate, so the classes are scanned explicitly.
pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|ch| ch.is_ascii_uppercase())
        && password.chars().any(|ch| ch.is_ascii_lowercase())
        && password.chars().any(|ch| ch.is_ascii_digit())
        && password.chars().any(|ch| PASSWORD_SPECIALS.contains(ch))
}

/// Usernames are short ASCII alphanumeric handles.
pub fn validate_username(username: &str) -> bool {
    username.len() >= MIN_USERNAME_LEN && username.chars().all(|ch| ch.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email("ada@example.com"));
        assert!(validate_email("a.b+c@mail.example.co"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!validate_email(""));
        assert!(!validate_email("ada@example"));
        assert!(!validate_email("ada example@site.com"));
        assert!(!validate_email("@example.com"));
    }

    #[test]
    fn password_requires_all_classes() {
        assert!(validate_password("Correct#Horse9Battery"));
        // one class missing each time
        assert!(!validate_password("correct#horse9battery"));
        assert!(!validate_password("CORRECT#HORSE9BATTERY"));
        assert!(!validate_password("Correct#HorseBattery"));
        assert!(!validate_password("CorrectHorse9Battery"));
    }

    #[test]
    fn password_requires_length() {
        assert!(!validate_password("Short#1aB"));
        assert!(validate_password("Exactly16chars#A"));
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("ada"));
        assert!(validate_username("u2"));
        assert!(!validate_username("a"));
        assert!(!validate_username(""));
        assert!(!validate_username("ada lovelace"));
        assert!(!validate_username("ada!"));
    }
}
