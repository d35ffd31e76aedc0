//! Field search
//!
//! Case-insensitive substring search over one creature field. Matching is
//! Knuth-Morris-Pratt over the lowercased bytes, so each field is scanned
//! once regardless of how often the needle's prefix repeats.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::data::Creature;

/// Creature field a search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Species,
    /// All types, joined with single spaces
    Types,
    Description,
}

impl SearchField {
    pub fn name(&self) -> &'static str {
        match self {
            SearchField::Name => "name",
            SearchField::Species => "species",
            SearchField::Types => "types",
            SearchField::Description => "description",
        }
    }

    /// Text of this field in `creature`
    pub fn text<'a>(&self, creature: &'a Creature) -> Cow<'a, str> {
        match self {
            SearchField::Name => Cow::Borrowed(&creature.name),
            SearchField::Species => Cow::Borrowed(&creature.species),
            SearchField::Types => Cow::Owned(creature.types.join(" ")),
            SearchField::Description => Cow::Borrowed(&creature.description),
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SearchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(SearchField::Name),
            "species" => Ok(SearchField::Species),
            "types" | "type" => Ok(SearchField::Types),
            "description" => Ok(SearchField::Description),
            _ => Err(format!("Unknown search field: {}", s)),
        }
    }
}

/// Byte offsets in the lowercased `haystack` where `needle` starts,
/// ignoring case; overlapping occurrences are all reported
///
/// An empty needle matches nothing.
pub fn find_all(haystack: &str, needle: &str) -> Vec<usize> {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    kmp(haystack.as_bytes(), needle.as_bytes())
}

/// Number of case-insensitive occurrences of `needle` in `haystack`
pub fn count_matches(haystack: &str, needle: &str) -> usize {
    find_all(haystack, needle).len()
}

fn kmp(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut matches = Vec::new();
    if needle.is_empty() || haystack.len() < needle.len() {
        return matches;
    }

    let border = border_table(needle);
    let mut matched = 0;
    for (pos, &byte) in haystack.iter().enumerate() {
        while matched > 0 && needle[matched] != byte {
            matched = border[matched - 1];
        }
        if needle[matched] == byte {
            matched += 1;
        }
        if matched == needle.len() {
            matches.push(pos + 1 - matched);
            matched = border[matched - 1];
        }
    }

    matches
}

/// `border[i]` is the length of the longest proper prefix of
/// `needle[..=i]` that is also its suffix
fn border_table(needle: &[u8]) -> Vec<usize> {
    let mut border = vec![0; needle.len()];
    let mut len = 0;

    for i in 1..needle.len() {
        while len > 0 && needle[i] != needle[len] {
            len = border[len - 1];
        }
        if needle[i] == needle[len] {
            len += 1;
        }
        border[i] = len;
    }

    border
}
