//! Identity types for card controls
//!
//! Identifiers handed to us by collaborators are opaque strings. Each kind is
//! wrapped in its own newtype so a persona can never be passed where a
//! document id is expected. The plain card number gets a hand-written type
//! because it must never reach a log line unmasked.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CardControlError, Result};

/// Macro to generate string-backed ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier issued by a collaborator
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id_type!(PersonaId, "Identifier of the persona issuing a request");
define_id_type!(DocumentId, "Identifier the rules store assigns to an enrolled card");
define_id_type!(AccountNumber, "Account number an entitlement resolves to");

/// Maximum accepted length of a tokenized card number
const MAX_TOKEN_LEN: usize = 64;

/// Opaque token standing in for a PAN at the API boundary
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenizedCardNumber(String);

impl TokenizedCardNumber {
    /// Parse and validate a token
    ///
    /// Tokens are 1..=64 characters of ASCII alphanumerics, `-` or `_`.
    pub fn parse(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(CardControlError::validation("card", "tokenized card number is empty"));
        }
        if value.len() > MAX_TOKEN_LEN {
            return Err(CardControlError::validation(
                "card",
                format!("tokenized card number exceeds {MAX_TOKEN_LEN} characters"),
            ));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CardControlError::validation(
                "card",
                "tokenized card number contains invalid characters",
            ));
        }
        Ok(Self(value.to_string()))
    }

    /// Get the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenizedCardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TokenizedCardNumber {
    type Error = CardControlError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TokenizedCardNumber> for String {
    fn from(value: TokenizedCardNumber) -> Self {
        value.0
    }
}

/// Plain primary account number (PAN)
///
/// `Debug` and `Display` only ever show the last four digits.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CardNumber(String);

impl CardNumber {
    /// Parse a PAN: 12 to 19 digits passing the Luhn check
    pub fn parse(value: &str) -> Result<Self> {
        let digits = value.trim();
        if !(12..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CardControlError::validation(
                "card_number",
                "card number must be 12 to 19 digits",
            ));
        }
        if !luhn_valid(digits) {
            return Err(CardControlError::validation(
                "card_number",
                "card number failed checksum",
            ));
        }
        Ok(Self(digits.to_string()))
    }

    /// Unmasked digits, for handing to the rules store only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Last four digits
    pub fn last_four(&self) -> &str {
        &self.0[self.0.len() - 4..]
    }
}

impl fmt::Debug for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardNumber(****{})", self.last_four())
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "****{}", self.last_four())
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_rejects_malformed_values() {
        assert!(TokenizedCardNumber::parse("").is_err());
        assert!(TokenizedCardNumber::parse("tok 123").is_err());
        assert!(TokenizedCardNumber::parse(&"a".repeat(65)).is_err());
        assert!(TokenizedCardNumber::parse("tok_abc-123").is_ok());
    }

    #[test]
    fn token_deserialization_validates() {
        let ok: TokenizedCardNumber = serde_json::from_str("\"tok-1\"").unwrap();
        assert_eq!(ok.as_str(), "tok-1");
        assert!(serde_json::from_str::<TokenizedCardNumber>("\"bad token\"").is_err());
    }

    #[test]
    fn card_number_checks_luhn() {
        assert!(CardNumber::parse("4111111111111111").is_ok());
        assert!(CardNumber::parse("1234567812345678").is_err());
        assert!(CardNumber::parse("4111").is_err());
        assert!(CardNumber::parse("41111111111111x1").is_err());
    }

    #[test]
    fn card_number_never_prints_full_pan() {
        let pan = CardNumber::parse("4111111111111111").unwrap();
        assert_eq!(pan.to_string(), "****1111");
        assert_eq!(format!("{pan:?}"), "CardNumber(****1111)");
        assert_eq!(pan.expose(), "4111111111111111");
    }

    #[test]
    fn string_ids_are_transparent() {
        let persona = PersonaId::new("persona-7");
        assert_eq!(serde_json::to_string(&persona).unwrap(), "\"persona-7\"");
        assert_eq!(persona.to_string(), "persona-7");
    }
}
