//! Docker Engine API wire types.
//!
//! Only the fields the sweeper reads are modelled; everything else in the
//! engine's responses is ignored.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Response of `GET /images/{name}/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInspect {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Option<Vec<String>>,

    #[serde(rename = "Config", default)]
    pub config: Option<ImageConfig>,
}

/// Container config embedded in an image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    #[serde(rename = "Labels", default)]
    pub labels: Option<BTreeMap<String, String>>,
}

impl ImageInspect {
    /// Labels of the image, empty if the engine reported none.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default()
    }

    /// `repo:tag` references, skipping the engine's `<none>:<none>` placeholder.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.repo_tags
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|t| *t != NONE_TAG)
    }
}

/// Placeholder the engine reports for untagged images.
pub const NONE_TAG: &str = "<none>:<none>";

/// One entry of `GET /images/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSummary {
    #[serde(rename = "Id")]
    pub id: String,
}

/// One entry of `GET /containers/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "State", default)]
    pub state: Option<String>,
}

/// One entry of `DELETE /images/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageDeleteItem {
    #[serde(rename = "Untagged", default)]
    pub untagged: Option<String>,

    #[serde(rename = "Deleted", default)]
    pub deleted: Option<String>,
}

/// Response of `POST /images/prune`.
#[derive(Debug, Clone, Deserialize)]
pub struct PruneResponse {
    #[serde(rename = "ImagesDeleted", default)]
    pub images_deleted: Option<Vec<ImageDeleteItem>>,

    #[serde(rename = "SpaceReclaimed", default)]
    pub space_reclaimed: u64,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_inspect_decoding() {
        let json = r#"{
            "Id": "sha256:4b1a",
            "RepoTags": ["web:v1", "registry:5000/web:v1"],
            "Size": 1024,
            "Config": {"Labels": {"exclude": "keep"}, "Env": ["A=1"]}
        }"#;
        let inspect: ImageInspect = serde_json::from_str(json).unwrap();

        assert_eq!(inspect.id, "sha256:4b1a");
        assert_eq!(
            inspect.tags().collect::<Vec<_>>(),
            vec!["web:v1", "registry:5000/web:v1"]
        );
        assert_eq!(inspect.labels().get("exclude").map(String::as_str), Some("keep"));
    }

    #[test]
    fn test_image_inspect_nulls() {
        let json = r#"{"Id": "sha256:4b1a", "RepoTags": null, "Config": {"Labels": null}}"#;
        let inspect: ImageInspect = serde_json::from_str(json).unwrap();

        assert_eq!(inspect.tags().count(), 0);
        assert!(inspect.labels().is_empty());
    }

    #[test]
    fn test_none_placeholder_skipped() {
        let json = r#"{"Id": "sha256:4b1a", "RepoTags": ["<none>:<none>"]}"#;
        let inspect: ImageInspect = serde_json::from_str(json).unwrap();
        assert_eq!(inspect.tags().count(), 0);
    }

    #[test]
    fn test_delete_items() {
        let json = r#"[{"Untagged": "web:v1"}, {"Deleted": "sha256:4b1a"}]"#;
        let items: Vec<ImageDeleteItem> = serde_json::from_str(json).unwrap();

        assert_eq!(items[0].untagged.as_deref(), Some("web:v1"));
        assert!(items[0].deleted.is_none());
        assert_eq!(items[1].deleted.as_deref(), Some("sha256:4b1a"));
    }

    #[test]
    fn test_prune_response() {
        let json = r#"{"ImagesDeleted": [{"Deleted": "sha256:aa"}, {"Deleted": "sha256:bb"}], "SpaceReclaimed": 2048}"#;
        let prune: PruneResponse = serde_json::from_str(json).unwrap();
        assert_eq!(prune.images_deleted.map(|d| d.len()), Some(2));
        assert_eq!(prune.space_reclaimed, 2048);

        let empty: PruneResponse =
            serde_json::from_str(r#"{"ImagesDeleted": null, "SpaceReclaimed": 0}"#).unwrap();
        assert!(empty.images_deleted.is_none());
    }
}
