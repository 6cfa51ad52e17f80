//! Case-insensitive header storage.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    values: Vec<String>,
}

/// A header map with case-insensitive lookup.
///
/// Keys are matched case-insensitively, while the casing used when a field
/// was last set is remembered and reported by [`Headers::iter`].
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: BTreeMap<String, Entry>,
}

impl Headers {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(|e| e.values.first())
            .map(String::as_str)
    }

    /// All values of a field.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|e| e.values.as_slice())
            .unwrap_or(&[])
    }

    /// Whether a field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Replace a field with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_all(name, vec![value.into()]);
    }

    /// Replace a field with several values.
    pub fn set_all(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        self.entries
            .insert(name.to_ascii_lowercase(), Entry { name, values });
    }

    /// Add a value to a field, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Entry {
                name,
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    /// Remove a field. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(&name.to_ascii_lowercase()).is_some()
    }

    /// The casing a field was registered with.
    pub fn original_name(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|e| e.name.as_str())
    }

    /// Iterate over `(original name, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .values()
            .map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    /// Number of distinct fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
