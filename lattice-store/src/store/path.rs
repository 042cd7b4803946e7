//! Path addressing into nested stores.

use std::fmt;

use smallvec::SmallVec;

use super::node::{parse_index, Key};

/// A sequence of keys from a store's root to a nested property.
///
/// Parsed from dotted text: `"todos.0.done"`. Canonical numeric segments
/// become indices, which map nodes read back as field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(SmallVec<[Key; 4]>);

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        text.split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match parse_index(segment) {
                Some(index) => Key::Index(index),
                None => Key::Field(segment.to_string()),
            })
            .collect()
    }

    /// Append a key.
    pub fn push(&mut self, key: impl Into<Key>) {
        self.0.push(key.into());
    }

    /// Builder-style [`Path::push`].
    pub fn join(mut self, key: impl Into<Key>) -> Self {
        self.push(key);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `len` keys.
    pub fn prefix(&self, len: usize) -> Path {
        Self(self.0.iter().take(len).cloned().collect())
    }

    /// The last key and the path leading to it.
    pub fn split_last(&self) -> Option<(&Key, Path)> {
        let last = self.0.last()?;
        Some((last, self.prefix(self.0.len() - 1)))
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<&str> for Path {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}
