//! Route parameters bound by a matched layer.

use std::collections::BTreeMap;

/// Captured route parameters.
///
/// Named captures (`:id`) and positional captures (wildcards, unnamed groups)
/// live side by side, mirroring how a capture index `0` and a name `id` can
/// both be present on the same match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    named: BTreeMap<String, String>,
    positional: BTreeMap<usize, String>,
}

impl Params {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a named parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Look up a positional parameter.
    pub fn index(&self, index: usize) -> Option<&str> {
        self.positional.get(&index).map(String::as_str)
    }

    /// Bind a named parameter, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.named.insert(name.into(), value.into());
    }

    /// Bind a positional parameter, replacing any previous value.
    pub fn insert_index(&mut self, index: usize, value: impl Into<String>) {
        self.positional.insert(index, value.into());
    }

    /// Remove a named parameter.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.named.remove(name)
    }

    /// Iterate over named parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over positional parameters in index order.
    pub fn positional(&self) -> impl Iterator<Item = (usize, &str)> {
        self.positional.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }

    fn contiguous_len(&self) -> usize {
        (0..).take_while(|i| self.positional.contains_key(i)).count()
    }

    /// Merge these (child) parameters over `parent`.
    ///
    /// Named child values override the parent's. When both sides carry
    /// positional captures starting at `0`, the child's are shifted past the
    /// parent's so that neither is lost.
    pub fn merged_over(&self, parent: &Params) -> Params {
        let mut merged = parent.clone();
        let offset = if self.positional.contains_key(&0) && parent.positional.contains_key(&0) {
            parent.contiguous_len()
        } else {
            0
        };
        for (name, value) in &self.named {
            merged.named.insert(name.clone(), value.clone());
        }
        for (index, value) in &self.positional {
            merged.positional.insert(index + offset, value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_names_override_parent() {
        let mut parent = Params::new();
        parent.insert("user", "tj");
        parent.insert("id", "1");
        let mut child = Params::new();
        child.insert("id", "2");

        let merged = child.merged_over(&parent);
        assert_eq!(merged.get("user"), Some("tj"));
        assert_eq!(merged.get("id"), Some("2"));
    }

    #[test]
    fn positional_captures_are_offset() {
        let mut parent = Params::new();
        parent.insert_index(0, "a");
        parent.insert_index(1, "b");
        let mut child = Params::new();
        child.insert_index(0, "c");

        let merged = child.merged_over(&parent);
        assert_eq!(merged.index(0), Some("a"));
        assert_eq!(merged.index(1), Some("b"));
        assert_eq!(merged.index(2), Some("c"));
    }

    #[test]
    fn positional_without_parent_captures_is_kept() {
        let mut parent = Params::new();
        parent.insert("id", "7");
        let mut child = Params::new();
        child.insert_index(0, "rest");

        let merged = child.merged_over(&parent);
        assert_eq!(merged.index(0), Some("rest"));
        assert_eq!(merged.get("id"), Some("7"));
    }
}
