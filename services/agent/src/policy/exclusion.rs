//! Opt-out rules that protect images from deletion.

use crate::runtime::ImageReferences;

/// Label whose value is matched against [`ExclusionRules::label_values`].
pub const EXCLUDE_LABEL: &str = "exclude";

/// Which rule protected an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionMatch {
    NamePrefix(String),
    NameSuffix(String),
    TagPrefix(String),
    TagSuffix(String),
    Label(String),
}

impl std::fmt::Display for ExclusionMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionMatch::NamePrefix(v) => write!(f, "name prefix '{}'", v),
            ExclusionMatch::NameSuffix(v) => write!(f, "name suffix '{}'", v),
            ExclusionMatch::TagPrefix(v) => write!(f, "tag prefix '{}'", v),
            ExclusionMatch::TagSuffix(v) => write!(f, "tag suffix '{}'", v),
            ExclusionMatch::Label(v) => write!(f, "{} label '{}'", EXCLUDE_LABEL, v),
        }
    }
}

/// Configured exclusion lists.
///
/// Rules never contain empty strings; see [`ExclusionRules::parse_list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules {
    pub name_prefixes: Vec<String>,
    pub name_suffixes: Vec<String>,
    pub tag_prefixes: Vec<String>,
    pub tag_suffixes: Vec<String>,
    pub label_values: Vec<String>,
}

impl ExclusionRules {
    /// Split a comma-separated list, trimming entries and dropping empty ones.
    pub fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Returns true if no rule is configured.
    pub fn is_empty(&self) -> bool {
        self.name_prefixes.is_empty()
            && self.name_suffixes.is_empty()
            && self.tag_prefixes.is_empty()
            && self.tag_suffixes.is_empty()
            && self.label_values.is_empty()
    }

    /// Returns true if any rule protects the image.
    pub fn is_excluded(&self, image: &ImageReferences) -> bool {
        self.matching_rule(image).is_some()
    }

    /// The first rule that protects the image, if any.
    ///
    /// Name and tag rules are checked for every reference; the label rule
    /// needs an `exclude` label whose value equals a configured value.
    pub fn matching_rule(&self, image: &ImageReferences) -> Option<ExclusionMatch> {
        for reference in &image.repo_tags {
            let (name, tag) = reference.split();

            if let Some(p) = self.name_prefixes.iter().find(|p| name.starts_with(p.as_str())) {
                return Some(ExclusionMatch::NamePrefix(p.clone()));
            }
            if let Some(p) = self.tag_prefixes.iter().find(|p| tag.starts_with(p.as_str())) {
                return Some(ExclusionMatch::TagPrefix(p.clone()));
            }
            if let Some(s) = self.name_suffixes.iter().find(|s| name.ends_with(s.as_str())) {
                return Some(ExclusionMatch::NameSuffix(s.clone()));
            }
            if let Some(s) = self.tag_suffixes.iter().find(|s| tag.ends_with(s.as_str())) {
                return Some(ExclusionMatch::TagSuffix(s.clone()));
            }
        }

        let value = image.labels.get(EXCLUDE_LABEL)?;
        self.label_values
            .iter()
            .find(|v| *v == value)
            .map(|v| ExclusionMatch::Label(v.clone()))
    }
}
