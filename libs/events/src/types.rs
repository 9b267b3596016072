//! Runtime event records.

use std::collections::BTreeMap;

use imgsweep_id::{ContainerId, ImageRef};
use serde::{Deserialize, Serialize};

use crate::EventError;

/// Kind of object an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Container,
    Image,
    Network,
    Volume,
    Daemon,
    #[default]
    #[serde(other)]
    Other,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectType::Container => "container",
            ObjectType::Image => "image",
            ObjectType::Network => "network",
            ObjectType::Volume => "volume",
            ObjectType::Daemon => "daemon",
            ObjectType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// The object an event refers to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventActor {
    /// Runtime ID of the object.
    #[serde(rename = "ID", default)]
    pub id: String,

    /// Free-form attributes (for containers: `image`, `name`, labels).
    #[serde(rename = "Attributes", default)]
    pub attributes: BTreeMap<String, String>,
}

/// A lifecycle event as published on the runtime's event stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeEvent {
    /// Object type (`container`, `image`, ...).
    #[serde(rename = "Type", default)]
    pub object_type: ObjectType,

    /// Action name (`create`, `start`, `die`, ...).
    #[serde(rename = "Action", default)]
    pub action: String,

    #[serde(rename = "Actor", default)]
    pub actor: EventActor,

    /// Legacy image field, still sent by older runtimes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Unix timestamp (seconds) at which the runtime emitted the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl RuntimeEvent {
    /// The action that marks a newly created container.
    pub const CREATE: &'static str = "create";

    /// Attribute key carrying a container's image reference.
    pub const IMAGE_ATTRIBUTE: &'static str = "image";

    /// Decodes a single JSON-encoded event.
    pub fn from_json(line: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(line)?)
    }

    /// Returns true if this is a container `create` event.
    pub fn is_container_create(&self) -> bool {
        self.object_type == ObjectType::Container && self.action == Self::CREATE
    }

    /// Narrows this event to a creation event.
    ///
    /// Returns `Ok(None)` for any event that is not a container creation.
    pub fn creation(&self) -> Result<Option<CreationEvent>, EventError> {
        if !self.is_container_create() {
            return Ok(None);
        }

        let image = self
            .actor
            .attributes
            .get(Self::IMAGE_ATTRIBUTE)
            .filter(|s| !s.is_empty())
            .or_else(|| self.from.as_ref().filter(|s| !s.is_empty()))
            .ok_or_else(|| EventError::MissingImage {
                container: self.actor.id.clone(),
            })?;

        let image = ImageRef::parse(image).map_err(|e| EventError::InvalidImage(e.to_string()))?;
        let container = ContainerId::parse(&self.actor.id).ok();

        Ok(Some(CreationEvent {
            image,
            container,
            time: self.time,
        }))
    }
}

/// A container was created from `image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationEvent {
    /// Reference the container was created from, as the user wrote it.
    pub image: ImageRef,

    /// The new container, when the runtime reported a usable ID.
    pub container: Option<ContainerId>,

    /// Runtime-side timestamp of the event.
    pub time: Option<i64>,
}

impl CreationEvent {
    /// Builds a creation event for `image` with no container metadata.
    pub fn for_image(image: ImageRef) -> Self {
        Self {
            image,
            container: None,
            time: None,
        }
    }
}
