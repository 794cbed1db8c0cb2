//! Input validation shared by every flow. Failures here never touch storage.

use regex::Regex;
use std::sync::OnceLock;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Length of a one-time passcode.
pub const OTP_CODE_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // local@domain.tld
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
            .expect("static email regex is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Exactly six ASCII digits.
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == OTP_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co.uk"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_password_validation() {
        assert!(!is_valid_password("12345"));
        assert!(is_valid_password("123456"));
        // Counted in characters, not bytes
        assert!(!is_valid_password("ééééé"));
    }

    #[test]
    fn test_code_validation() {
        assert!(is_well_formed_code("012345"));
        assert!(!is_well_formed_code("12345"));
        assert!(!is_well_formed_code("1234567"));
        assert!(!is_well_formed_code("12a456"));
        assert!(!is_well_formed_code("１２３４５６"));
    }
}
