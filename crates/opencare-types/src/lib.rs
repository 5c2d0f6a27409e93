//! Validated text primitives shared across OpenCare crates.
//!
//! Each type checks its input once at construction, so holders can rely on the
//! invariant without re-validating. All of them serialise as plain JSON strings.

/// Errors that can occur when creating validated text types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("This field may not be blank.")]
    Empty,
    /// The input exceeded the permitted length
    #[error("Ensure this field has no more than {0} characters.")]
    TooLong(usize),
    /// The input was not a phone number in the accepted format
    #[error("Phone number must be entered in the format: +999999999. Up to 15 digits allowed.")]
    InvalidPhone,
    /// The input was not a plausible email address
    #[error("Enter a valid email address.")]
    InvalidEmail,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TextError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a `NonEmptyText` that must also fit within `max` characters.
    pub fn bounded(input: impl AsRef<str>, max: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        if text.0.chars().count() > max {
            return Err(TextError::TooLong(max));
        }
        Ok(text)
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A phone number matching `^\+?1?\d{9,15}$`.
///
/// The leading `+` and `1` are both optional; the remainder must be between 9 and 15
/// ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parses a phone number, rejecting anything outside the accepted format.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidPhone`] if `input` does not match the format.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        let trimmed = input.trim();
        if Self::is_valid(trimmed) {
            return Ok(Self(trimmed.to_owned()));
        }
        Err(TextError::InvalidPhone)
    }

    /// Returns true if `input` matches the accepted phone format.
    pub fn is_valid(input: &str) -> bool {
        let digits = input.strip_prefix('+').unwrap_or(input);
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        // `1?` is greedy but may backtrack, so accept either reading.
        let plain = (9..=15).contains(&digits.len());
        let with_country_one = digits.starts_with('1') && (10..=16).contains(&digits.len());
        plain || with_country_one
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An email address with a non-empty local part and a dotted domain.
///
/// This is a syntactic guard only; deliverability is not checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses an email address.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidEmail`] when the input lacks a local part, an `@`, or a
    /// domain containing a dot, or when it contains whitespace.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        let trimmed = input.trim();
        let Some((local, domain)) = trimmed.rsplit_once('@') else {
            return Err(TextError::InvalidEmail);
        };
        let domain_ok = domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
            && domain.contains('.');
        if local.is_empty() || !domain_ok || trimmed.chars().any(char::is_whitespace) {
            return Err(TextError::InvalidEmail);
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_impls {
    ($ty:ident, $ctor:expr) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $ty {
            type Err = TextError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ctor(s)
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $ctor(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_newtype_impls!(NonEmptyText, NonEmptyText::new);
string_newtype_impls!(PhoneNumber, PhoneNumber::parse);
string_newtype_impls!(EmailAddress, EmailAddress::parse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Kampala  ").expect("text should be accepted");
        assert_eq!(text.as_str(), "Kampala");
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
    }

    #[test]
    fn test_bounded_text_rejects_long_input() {
        assert_eq!(
            NonEmptyText::bounded("abcdef", 5),
            Err(TextError::TooLong(5))
        );
        assert!(NonEmptyText::bounded("abcde", 5).is_ok());
    }

    #[test]
    fn test_phone_number_formats() {
        for ok in ["+256700123456", "256700123", "1234567890123456", "+1234567890"] {
            assert!(PhoneNumber::parse(ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["12345678", "+25670012345678901", "0700-123-456", "", "+"] {
            assert!(PhoneNumber::parse(bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse(" Nurse@Clinic.Example ").expect("valid email");
        assert_eq!(email.as_str(), "nurse@clinic.example");
        for bad in ["nurse", "@clinic.example", "nurse@clinic", "a b@clinic.example"] {
            assert!(EmailAddress::parse(bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn test_serde_rejects_blank_text() {
        let parsed: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(parsed.is_err());
        let phone: PhoneNumber =
            serde_json::from_str("\"+256700123456\"").expect("phone should deserialise");
        assert_eq!(
            serde_json::to_string(&phone).expect("serialise"),
            "\"+256700123456\""
        );
    }
}
