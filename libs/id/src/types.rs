//! Typed identifiers for runtime objects and human-readable references.

use crate::define_runtime_id;
use crate::IdError;

// =============================================================================
// Runtime IDs
// =============================================================================

define_runtime_id!(ImageId, "image");
define_runtime_id!(ContainerId, "container");

// =============================================================================
// Image References
// =============================================================================

/// A human-readable image reference such as `nginx:1.27`.
///
/// References are mutable labels that point at an [`ImageId`]; several
/// references may point at the same image. The name/tag split follows the
/// runtime's rules: the tag is whatever follows the last `:` unless that
/// colon belongs to a registry `host:port`, and a digest suffix (`@sha256:..`)
/// is not part of the tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageRef(String);

impl ImageRef {
    /// Parses a reference from a string.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdError::InvalidCharacter {
                value: s.to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the full reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the reference into `(name, tag)`.
    ///
    /// A reference without a tag yields an empty tag.
    #[must_use]
    pub fn split(&self) -> (&str, &str) {
        let base = match self.0.split_once('@') {
            Some((base, _digest)) => base,
            None => self.0.as_str(),
        };

        match base.rfind(':') {
            Some(idx) if !base[idx + 1..].contains('/') => (&base[..idx], &base[idx + 1..]),
            _ => (base, ""),
        }
    }

    /// Repository name, including any registry host.
    #[must_use]
    pub fn name(&self) -> &str {
        self.split().0
    }

    /// Tag, or an empty string if the reference carries none.
    #[must_use]
    pub fn tag(&self) -> &str {
        self.split().1
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ImageRef {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ImageRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ImageRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for ImageRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_roundtrip() {
        let id: ImageId = "sha256:4f1e9c0a7b3d8e2f".parse().unwrap();
        assert_eq!(id.to_string(), "sha256:4f1e9c0a7b3d8e2f");
        assert_eq!(id.hex(), "4f1e9c0a7b3d8e2f");
        assert_eq!(id.short(), "4f1e9c0a7b3d");
    }

    #[test]
    fn test_image_id_short_of_short_digest() {
        let id: ImageId = "sha256:abc".parse().unwrap();
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn test_image_id_empty() {
        let result: Result<ImageId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), IdError::Empty));
    }

    #[test]
    fn test_image_id_missing_digest() {
        let result: Result<ImageId, _> = "sha256:".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::MissingDigest { .. }
        ));
    }

    #[test]
    fn test_image_id_whitespace() {
        let result: Result<ImageId, _> = "sha256:ab cd".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidCharacter { .. }
        ));
    }

    #[test]
    fn test_image_id_json_roundtrip() {
        let id = ImageId::parse("sha256:0123456789abcdef").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sha256:0123456789abcdef\"");
        let parsed: ImageId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_container_id_bare_hex() {
        let id = ContainerId::parse("9b2c51d0a4e7f00d").unwrap();
        assert_eq!(id.hex(), "9b2c51d0a4e7f00d");
        assert_eq!(ContainerId::KIND, "container");
    }

    #[test]
    fn test_ref_split_simple() {
        let r = ImageRef::parse("nginx:1.27").unwrap();
        assert_eq!(r.split(), ("nginx", "1.27"));
    }

    #[test]
    fn test_ref_split_registry_port() {
        let r = ImageRef::parse("registry.local:5000/team/app:v3").unwrap();
        assert_eq!(r.name(), "registry.local:5000/team/app");
        assert_eq!(r.tag(), "v3");
    }

    #[test]
    fn test_ref_split_registry_port_without_tag() {
        let r = ImageRef::parse("registry.local:5000/team/app").unwrap();
        assert_eq!(r.name(), "registry.local:5000/team/app");
        assert_eq!(r.tag(), "");
    }

    #[test]
    fn test_ref_split_untagged() {
        let r = ImageRef::parse("alpine").unwrap();
        assert_eq!(r.split(), ("alpine", ""));
    }

    #[test]
    fn test_ref_split_digest() {
        let r = ImageRef::parse("alpine@sha256:feedface").unwrap();
        assert_eq!(r.split(), ("alpine", ""));

        let r = ImageRef::parse("alpine:3.20@sha256:feedface").unwrap();
        assert_eq!(r.split(), ("alpine", "3.20"));
    }

    #[test]
    fn test_ref_empty() {
        assert!(ImageRef::parse("").unwrap_err().is_empty());
    }
}
