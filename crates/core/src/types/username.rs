//! Username and display-name helpers used during registration.

use super::email::Email;

/// Username used when nothing usable survives sanitization.
pub const FALLBACK_USERNAME: &str = "user";

/// Derive a username from the local part of an email address.
///
/// Letters and digits (any script) are kept, `.`, `-` and `_` become `_`, and
/// everything else is dropped.
///
/// ```
/// use bq_account_core::{Email, username_from_email};
///
/// let email = Email::parse("jane.doe+news@example.com").unwrap();
/// assert_eq!(username_from_email(&email), "jane_doenews");
/// ```
#[must_use]
pub fn username_from_email(email: &Email) -> String {
    let username: String = email
        .local_part()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() => Some(c),
            '.' | '-' | '_' => Some('_'),
            _ => None,
        })
        .collect();

    if username.is_empty() {
        FALLBACK_USERNAME.to_string()
    } else {
        username
    }
}

/// Split a display name into a first name and the remaining names.
///
/// Runs of whitespace are collapsed; either part may be empty.
#[must_use]
pub fn split_display_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    #[test]
    fn test_username_keeps_alphanumerics() {
        assert_eq!(username_from_email(&email("alice42@example.com")), "alice42");
    }

    #[test]
    fn test_username_maps_separators() {
        assert_eq!(
            username_from_email(&email("a.b-c_d@example.com")),
            "a_b_c_d"
        );
    }

    #[test]
    fn test_username_keeps_non_ascii_letters() {
        assert_eq!(
            username_from_email(&email("josé.garcía@example.com")),
            "josé_garcía"
        );
        assert_eq!(username_from_email(&email("李雷42@example.com")), "李雷42");
    }

    #[test]
    fn test_username_drops_other_symbols() {
        assert_eq!(username_from_email(&email("bob+tag@example.com")), "bobtag");
    }

    #[test]
    fn test_username_falls_back_when_empty() {
        assert_eq!(username_from_email(&email("+++@example.com")), FALLBACK_USERNAME);
    }

    #[test]
    fn test_split_display_name() {
        assert_eq!(
            split_display_name("Alice  Mary Smith"),
            ("Alice".to_string(), "Mary Smith".to_string())
        );
        assert_eq!(
            split_display_name("Cher"),
            ("Cher".to_string(), String::new())
        );
        assert_eq!(split_display_name("   "), (String::new(), String::new()));
    }
}
