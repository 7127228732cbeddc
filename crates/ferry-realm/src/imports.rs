//! Import sets.

use std::collections::BTreeSet;
use std::fmt;

/// Name standing for every export of a module.
pub const WILDCARD: &str = "*";

/// The export names one module imports from another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImportSet {
    names: BTreeSet<String>,
}

impl ImportSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The wildcard set `*`.
    #[must_use]
    pub fn all() -> Self {
        Self::from_iter([WILDCARD])
    }

    /// Check if the set contains the wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.names.contains(WILDCARD)
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check if the set contains `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Iterate over names, wildcard included.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Union of several sets.
    #[must_use]
    pub fn union<'a>(sets: impl IntoIterator<Item = &'a ImportSet>) -> Self {
        Self {
            names: sets
                .into_iter()
                .flat_map(|set| set.names.iter().cloned())
                .collect(),
        }
    }

    /// Replace the wildcard by `all_exports`, keeping explicitly named
    /// imports.
    #[must_use]
    pub fn expand(&self, all_exports: &BTreeSet<String>) -> BTreeSet<String> {
        let mut names = self
            .names
            .iter()
            .filter(|name| *name != WILDCARD)
            .cloned()
            .collect::<BTreeSet<_>>();
        if self.is_wildcard() {
            names.extend(all_exports.iter().cloned());
        }
        names
    }
}

impl<S: Into<String>> FromIterator<S> for ImportSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.is_empty())
                .collect(),
        }
    }
}

impl fmt::Display for ImportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.iter().collect::<Vec<_>>().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union() {
        let a = ImportSet::from_iter(["foo"]);
        let b = ImportSet::from_iter(["bar", "foo"]);

        let union = ImportSet::union([&a, &b]);
        assert_eq!(union.to_string(), "{bar, foo}");
        assert!(!union.is_wildcard());
    }

    #[test]
    fn test_expand_wildcard() {
        let exports = BTreeSet::from(["x".to_string(), "y".to_string()]);
        let set = ImportSet::from_iter(["*", "z"]);

        let expanded = set.expand(&exports);
        assert_eq!(
            expanded.into_iter().collect::<Vec<_>>(),
            vec!["x".to_string(), "y".to_string(), "z".to_string()]
        );
        assert_eq!(ImportSet::from_iter(["a"]).expand(&exports).len(), 1);
    }
}
