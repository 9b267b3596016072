//! Macros for defining typed runtime ID types.

/// Validates the text of a runtime-assigned ID.
///
/// Accepts a bare hex digest or an `algorithm:hex` digest. Rejects empty
/// input, whitespace, control characters, and a trailing algorithm
/// separator with nothing after it.
pub(crate) fn validate_runtime_id(s: &str) -> Result<(), crate::IdError> {
    if s.is_empty() {
        return Err(crate::IdError::Empty);
    }

    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(crate::IdError::InvalidCharacter {
            value: s.to_string(),
        });
    }

    if let Some((_, hex)) = s.split_once(':') {
        if hex.is_empty() {
            return Err(crate::IdError::MissingDigest {
                value: s.to_string(),
            });
        }
    }

    Ok(())
}

/// Macro to define a typed runtime ID.
///
/// This generates a newtype wrapper around the runtime's digest string with:
/// - A `KIND` constant used in log fields and error messages
/// - `parse()` to validate and construct from a string
/// - `as_str()` and `short()` accessors
/// - `Display`, `FromStr`, `AsRef<str>` implementations
/// - `Serialize` and `Deserialize` implementations
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_runtime_id!(ImageId, "image");
///
/// let id: ImageId = "sha256:4f1e9c0a7b3d".parse()?;
/// assert_eq!(id.short(), "4f1e9c0a7b3d");
/// ```
#[macro_export]
macro_rules! define_runtime_id {
    ($name:ident, $kind:literal) => {
        /// A typed runtime-assigned ID.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// The kind of runtime object this ID names.
            pub const KIND: &'static str = $kind;

            /// Number of hex digits shown by [`Self::short`].
            pub const SHORT_LEN: usize = 12;

            /// Parses an ID from a string.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                $crate::macros::validate_runtime_id(s)?;
                Ok(Self(s.to_string()))
            }

            /// Returns the full ID as reported by the runtime.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the hex part of the digest, without the algorithm prefix.
            #[must_use]
            pub fn hex(&self) -> &str {
                match self.0.split_once(':') {
                    Some((_, hex)) => hex,
                    None => &self.0,
                }
            }

            /// Returns the abbreviated form used in logs.
            #[must_use]
            pub fn short(&self) -> &str {
                let hex = self.hex();
                match hex.char_indices().nth(Self::SHORT_LEN) {
                    Some((idx, _)) => &hex[..idx],
                    None => hex,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
