// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reverse index from tag to the local keys carrying it.

use std::collections::{HashMap, HashSet};

/// Maps each tag to the set of local keys currently tagged with it.
///
/// A key is listed under a tag exactly when its local entry carries that tag. The
/// index lives under the same lock as the local layer, so both change together.
#[derive(Debug, Default)]
pub(crate) struct TagIndex {
    buckets: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub(crate) fn add(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            self.buckets.entry(tag.clone()).or_default().insert(key.to_owned());
        }
    }

    /// Removes `key` from the given buckets, dropping buckets that become empty.
    pub(crate) fn remove(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(keys) = self.buckets.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.buckets.remove(tag);
                }
            }
        }
    }

    /// Returns every key tagged with any of `tags`, without duplicates.
    pub(crate) fn keys_for(&self, tags: &[String]) -> HashSet<String> {
        tags.iter()
            .filter_map(|tag| self.buckets.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, tag: &str, key: &str) -> bool {
        self.buckets.get(tag).is_some_and(|keys| keys.contains(key))
    }

    #[cfg(test)]
    pub(crate) fn tag_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn add_and_lookup_by_any_tag() {
        let mut index = TagIndex::default();
        index.add("a", &tags(&["users", "admins"]));
        index.add("b", &tags(&["users"]));
        index.add("c", &tags(&["posts"]));

        let keys = index.keys_for(&tags(&["users", "admins"]));
        assert_eq!(keys, HashSet::from(["a".to_string(), "b".to_string()]));
        assert!(index.keys_for(&tags(&["missing"])).is_empty());
    }

    #[test]
    fn remove_drops_empty_buckets() {
        let mut index = TagIndex::default();
        index.add("a", &tags(&["users", "admins"]));
        index.add("b", &tags(&["users"]));

        index.remove("a", &tags(&["users", "admins"]));
        assert!(!index.contains("users", "a"));
        assert!(index.contains("users", "b"));
        assert_eq!(index.tag_count(), 1);

        index.remove("b", &tags(&["users"]));
        assert_eq!(index.tag_count(), 0);
    }

    #[test]
    fn removing_unknown_key_is_harmless() {
        let mut index = TagIndex::default();
        index.add("a", &tags(&["users"]));
        index.remove("zzz", &tags(&["users", "nope"]));
        assert!(index.contains("users", "a"));
    }
}
