//! Read-only access to user-assigned tags.
//!
//! Tags are owned by the surrounding application; the engine only asks
//! whether a path carries a tag while evaluating filter expressions.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Tag lookup consumed by filtered searches.
pub trait TagSource: Send + Sync {
    /// Returns true if `path` is tagged with `tag`.
    fn has_tag(&self, path: &Path, tag: &str) -> bool;
}

/// In-memory `path -> set of tags` mapping.
///
/// # Example
///
/// ```
/// use mediavec_core::{TagMap, TagSource};
/// use std::path::Path;
///
/// let tags = TagMap::new().with_tags("/photos/a.jpg", ["beach", "sunset"]);
/// assert!(tags.has_tag(Path::new("/photos/a.jpg"), "beach"));
/// assert!(!tags.has_tag(Path::new("/photos/b.jpg"), "beach"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    tags: HashMap<PathBuf, BTreeSet<String>>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tags for a path. Chainable.
    pub fn with_tags<P, I, T>(mut self, path: P, tags: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.insert(path, tags);
        self
    }

    /// Adds tags for a path, merging with any it already has.
    pub fn insert<P, I, T>(&mut self, path: P, tags: I)
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags
            .entry(path.into())
            .or_default()
            .extend(tags.into_iter().map(Into::into));
    }

    /// Returns the tags of a path, if any were recorded.
    pub fn get(&self, path: &Path) -> Option<&BTreeSet<String>> {
        self.tags.get(path)
    }

    /// Number of tagged paths.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl TagSource for TagMap {
    fn has_tag(&self, path: &Path, tag: &str) -> bool {
        self.tags
            .get(path)
            .map(|set| set.contains(tag))
            .unwrap_or(false)
    }
}

impl<S: std::hash::BuildHasher + Send + Sync> TagSource
    for HashMap<PathBuf, std::collections::HashSet<String>, S>
{
    fn has_tag(&self, path: &Path, tag: &str) -> bool {
        self.get(path).map(|set| set.contains(tag)).unwrap_or(false)
    }
}

/// A tag source where nothing is tagged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTags;

impl TagSource for NoTags {
    fn has_tag(&self, _path: &Path, _tag: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tag_map_merges() {
        let mut tags = TagMap::new().with_tags("/a.jpg", ["cat"]);
        tags.insert("/a.jpg", ["dog"]);
        let set = tags.get(Path::new("/a.jpg")).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["cat", "dog"]);
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_hashmap_source() {
        let mut map: HashMap<PathBuf, HashSet<String>> = HashMap::new();
        map.insert(PathBuf::from("/a.jpg"), HashSet::from(["cat".to_string()]));
        assert!(map.has_tag(Path::new("/a.jpg"), "cat"));
        assert!(!map.has_tag(Path::new("/a.jpg"), "dog"));
        assert!(!NoTags.has_tag(Path::new("/a.jpg"), "cat"));
    }
}
