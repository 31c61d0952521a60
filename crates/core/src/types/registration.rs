//! Registration request.

use serde::Deserialize;

/// Input to account registration.
///
/// `Debug` is implemented by hand so the password never reaches logs.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAccount {
    pub name: String,
    pub email: String,
    /// Explicit username; derived from the email when absent or blank.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Forwarded to the identity provider, never stored locally.
    pub password: String,
}

impl RegisterAccount {
    /// Phone number with surrounding whitespace removed (empty when absent).
    #[must_use]
    pub fn phone_number(&self) -> &str {
        self.phone.as_deref().map_or("", str::trim)
    }

    /// Explicit username, if a non-blank one was supplied.
    #[must_use]
    pub fn requested_username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

impl std::fmt::Debug for RegisterAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterAccount")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("phone", &self.phone)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let req: RegisterAccount = serde_json::from_str(
            r#"{"name":"Alice","email":"alice@example.com","password":"hunter2hunter2"}"#,
        )
        .unwrap();
        let debug = format!("{req:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_optional_fields() {
        let req: RegisterAccount =
            serde_json::from_str(r#"{"name":"Alice","email":"a@b.c","username":"  ","password":"pw"}"#)
                .unwrap();
        assert_eq!(req.phone_number(), "");
        assert_eq!(req.requested_username(), None);
    }

    #[test]
    fn test_password_is_required() {
        let err = serde_json::from_str::<RegisterAccount>(r#"{"name":"Alice","email":"a@b.c"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("missing field `password`"));
    }
}
