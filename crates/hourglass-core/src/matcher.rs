use regex::Regex;

use crate::error::Result;
use crate::types::GroupedKey;

/// Selects a set of job or trigger keys for bulk pause/resume/query calls.
///
/// A closed set of variants rather than an arbitrary predicate, so the
/// engine can also remember "this whole group is paused" for `GroupEquals`.
#[derive(Debug, Clone)]
pub enum KeyMatcher<K> {
    /// Exactly one key.
    Exact(K),
    GroupEquals(String),
    GroupStartsWith(String),
    GroupEndsWith(String),
    GroupContains(String),
    /// Group matches the regex (unanchored, as `Regex::is_match`).
    GroupMatches(Regex),
    /// Every key.
    Any,
}

impl<K: GroupedKey> KeyMatcher<K> {
    pub fn group_equals(group: impl Into<String>) -> Self {
        Self::GroupEquals(group.into())
    }

    pub fn group_starts_with(prefix: impl Into<String>) -> Self {
        Self::GroupStartsWith(prefix.into())
    }

    pub fn group_ends_with(suffix: impl Into<String>) -> Self {
        Self::GroupEndsWith(suffix.into())
    }

    pub fn group_contains(fragment: impl Into<String>) -> Self {
        Self::GroupContains(fragment.into())
    }

    /// Compile `pattern` into a [`KeyMatcher::GroupMatches`].
    pub fn group_matches(pattern: &str) -> Result<Self> {
        Ok(Self::GroupMatches(Regex::new(pattern)?))
    }

    pub fn any() -> Self {
        Self::Any
    }

    /// Whether `key` is selected by this matcher.
    pub fn matches(&self, key: &K) -> bool {
        match self {
            KeyMatcher::Exact(k) => k == key,
            _ => self.matches_group(key.group()),
        }
    }

    /// Whether a whole group is selected. `Exact` selects its key's group
    /// only for the purpose of listing, never for group-level pausing.
    pub fn matches_group(&self, group: &str) -> bool {
        match self {
            KeyMatcher::Exact(k) => k.group() == group,
            KeyMatcher::GroupEquals(g) => g == group,
            KeyMatcher::GroupStartsWith(p) => group.starts_with(p.as_str()),
            KeyMatcher::GroupEndsWith(s) => group.ends_with(s.as_str()),
            KeyMatcher::GroupContains(f) => group.contains(f.as_str()),
            KeyMatcher::GroupMatches(re) => re.is_match(group),
            KeyMatcher::Any => true,
        }
    }

    /// The single group this matcher pins, if any.
    pub fn exact_group(&self) -> Option<&str> {
        match self {
            KeyMatcher::GroupEquals(g) => Some(g),
            _ => None,
        }
    }
}
