//! Domain records, one module per area.

pub mod analytics;
pub mod appointments;
pub mod facilities;
pub mod patients;
pub mod records;
pub mod reference;
pub mod users;
pub mod workforce;

use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::str::FromStr;

/// Declare a closed set of string choices.
///
/// Each variant maps onto its wire value; the generated `as_str`, `ALL` and `Display` keep the
/// wire value in one place.
macro_rules! choices {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            /// Parse a stored wire value.
            pub fn from_wire(value: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|choice| choice.as_str() == value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
pub(crate) use choices;

pub(crate) fn default_true() -> bool {
    true
}

/// Deserialise an optional validated value, treating a blank string like an absent one.
pub(crate) fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
