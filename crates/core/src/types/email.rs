//! Email addresses as typed into sign-in, sign-up, and newsletter forms.

use core::fmt;

/// Reasons an address is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must contain exactly one @ symbol")]
    AtSymbol,
    #[error("email needs a name before the @ and a domain after it")]
    MissingPart,
}

/// A trimmed, lowercased address with one `@` and text on both sides of it.
///
/// `" Ana@NaxStore.IO "` and `"ana@naxstore.io"` parse to the same value,
/// so the backend only ever sees one spelling of an account.
///
/// ```
/// use naxstore_core::Email;
///
/// let email = Email::parse_normalized(" Ana@NaxStore.IO ").unwrap();
/// assert_eq!(email.as_str(), "ana@naxstore.io");
/// assert_eq!(email.local_part(), "ana");
/// assert!(Email::parse_normalized("no-at-sign").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    /// RFC 5321 limit.
    pub const MAX_LENGTH: usize = 254;

    /// Normalize `input` and check its shape.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if the normalized address is empty, longer than
    /// [`Email::MAX_LENGTH`], has no or several `@`, or is blank on either
    /// side of it.
    pub fn parse_normalized(input: &str) -> Result<Self, EmailError> {
        let email = input.trim().to_lowercase();
        if email.is_empty() {
            return Err(EmailError::Empty);
        }
        if email.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let (local, domain) = email.split_once('@').ok_or(EmailError::AtSymbol)?;
        if domain.contains('@') {
            return Err(EmailError::AtSymbol);
        }
        if local.is_empty() || domain.is_empty() {
            return Err(EmailError::MissingPart);
        }
        Ok(Self(email))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the `@`; new profiles are named after it.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(local, _)| local)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let email = Email::parse_normalized("  Shopper@NaxStore.IO ").unwrap();
        assert_eq!(email.as_str(), "shopper@naxstore.io");
        assert_eq!(email.to_string(), "shopper@naxstore.io");
        assert_eq!(email, Email::parse_normalized("shopper@naxstore.io").unwrap());
    }

    #[test]
    fn test_accepts_tags_and_subdomains() {
        assert!(Email::parse_normalized("ana.lima+orbit@mail.naxstore.co.uk").is_ok());
        assert!(Email::parse_normalized("a@b.c").is_ok());
    }

    #[test]
    fn test_rejections() {
        assert_eq!(Email::parse_normalized("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse_normalized("no-at-sign"), Err(EmailError::AtSymbol));
        assert_eq!(Email::parse_normalized("a@b@c.com"), Err(EmailError::AtSymbol));
        assert_eq!(Email::parse_normalized("@naxstore.io"), Err(EmailError::MissingPart));
        assert_eq!(Email::parse_normalized("ana@"), Err(EmailError::MissingPart));

        let long = format!("{}@naxstore.io", "a".repeat(250));
        assert_eq!(
            Email::parse_normalized(&long),
            Err(EmailError::TooLong { max: 254 })
        );
    }

    #[test]
    fn test_local_part() {
        let email = Email::parse_normalized("Comet.Fan@naxstore.io").unwrap();
        assert_eq!(email.local_part(), "comet.fan");
    }
}
