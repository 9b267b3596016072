//! In-memory record of when each image was last used.
//!
//! An entry exists only for images seen in a container creation event. The
//! store lives for the process lifetime; nothing is persisted.

use std::collections::HashMap;

use imgsweep_id::ImageId;

/// Map from image ID to the unix time it was last referenced by a new container.
#[derive(Debug, Clone, Default)]
pub struct ImageHistory {
    entries: HashMap<ImageId, i64>,
}

impl ImageHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` was used at `now`, creating or refreshing its entry.
    pub fn touch(&mut self, id: ImageId, now: i64) {
        self.entries.insert(id, now);
    }

    /// When `id` was last seen, if ever.
    pub fn last_seen(&self, id: &ImageId) -> Option<i64> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Forget `id`. Returns the removed timestamp.
    pub fn remove(&mut self, id: &ImageId) -> Option<i64> {
        self.entries.remove(id)
    }

    /// IDs whose last use is strictly before `cutoff`.
    ///
    /// Returns a snapshot so callers can mutate the history while acting on it.
    pub fn seen_before(&self, cutoff: i64) -> Vec<ImageId> {
        self.entries
            .iter()
            .filter(|(_, last_seen)| **last_seen < cutoff)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ImageId {
        ImageId::parse(s).unwrap()
    }

    #[test]
    fn test_touch_refreshes() {
        let mut history = ImageHistory::new();
        history.touch(id("sha256:aa"), 10);
        history.touch(id("sha256:aa"), 20);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_seen(&id("sha256:aa")), Some(20));
    }

    #[test]
    fn test_seen_before_is_strict() {
        let mut history = ImageHistory::new();
        history.touch(id("sha256:aa"), 10);
        history.touch(id("sha256:bb"), 50);

        let mut old = history.seen_before(50);
        old.sort();
        assert_eq!(old, vec![id("sha256:aa")]);
        assert!(history.seen_before(10).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut history = ImageHistory::new();
        history.touch(id("sha256:aa"), 10);
        assert_eq!(history.remove(&id("sha256:aa")), Some(10));
        assert_eq!(history.remove(&id("sha256:aa")), None);
        assert!(history.is_empty());
    }
}
