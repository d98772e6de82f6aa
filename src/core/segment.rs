//! Multi-spelling segment names.
//!
//! A [`SegmentMatcher`] recognises one path segment (or one host name) against a set of
//! alternative spellings. Every alternative is an ordered list of tokens; a candidate matches when
//! it equals the tokens of some alternative, compared case-insensitively, with each gap between
//! tokens filled by one or more separator characters. `api-v2`, `API.v2` and `api_v2` are therefore
//! the same name to a matcher built from `[["api", "v2"]]`.
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Characters accepted between two tokens.
pub const SEPARATORS: &[char] = &['.', '-', '_', ',', '，', '。'];

const SEPARATOR_CLASS: &str = r"[.\-_,，。]+";

/// Case-insensitive matcher over an ordered list of token alternatives.
#[derive(Debug, Clone)]
pub struct SegmentMatcher {
    alternatives: Vec<Vec<String>>,
    // `None` when there is no alternative at all: nothing matches, not even "".
    pattern: Option<Regex>,
}

impl SegmentMatcher {
    /// Build a matcher from its alternatives.
    pub fn new<A, T>(alternatives: A) -> Self
    where
        A: IntoIterator<Item = T>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let alternatives: Vec<Vec<String>> = alternatives
            .into_iter()
            .map(|tokens| tokens.into_iter().map(Into::into).collect())
            .collect();
        let pattern = Self::compile(&alternatives);
        Self {
            alternatives,
            pattern,
        }
    }

    /// A matcher that accepts nothing.
    pub fn none() -> Self {
        Self {
            alternatives: Vec::new(),
            pattern: None,
        }
    }

    /// A matcher for a single spelling, split on the separator characters.
    ///
    /// `SegmentMatcher::word("api-v2")` is equivalent to `SegmentMatcher::new([["api", "v2"]])`.
    pub fn word(spelling: &str) -> Self {
        let tokens: Vec<String> = spelling
            .split(SEPARATORS)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        Self::new([tokens])
    }

    fn compile(alternatives: &[Vec<String>]) -> Option<Regex> {
        if alternatives.is_empty() {
            return None;
        }
        let branches: Vec<String> = alternatives
            .iter()
            .map(|tokens| {
                let escaped: Vec<String> = tokens.iter().map(|t| regex::escape(t)).collect();
                format!("^(?:{})$", escaped.join(SEPARATOR_CLASS))
            })
            .collect();
        let source = format!("(?i){}", branches.join("|"));
        match Regex::new(&source) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                // Escaped literals only fail on the size limit.
                tracing::error!("Segment pattern rejected ({}): {}", source.len(), e);
                None
            }
        }
    }

    /// Whether `token` is one of the accepted spellings.
    pub fn is_match(&self, token: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(token))
    }

    /// The first non-empty, pure-ASCII alternative joined with dots, or an empty string.
    pub fn canonical_join(&self) -> String {
        self.alternatives
            .iter()
            .filter(|tokens| !tokens.is_empty())
            .find(|tokens| tokens.iter().all(|t| t.is_ascii()))
            .map(|tokens| tokens.join("."))
            .unwrap_or_default()
    }

    pub fn alternatives(&self) -> &[Vec<String>] {
        &self.alternatives
    }
}

impl Default for SegmentMatcher {
    fn default() -> Self {
        Self::none()
    }
}

impl Serialize for SegmentMatcher {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.alternatives.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SegmentMatcher {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let alternatives = Vec::<Vec<String>>::deserialize(deserializer)?;
        Ok(Self::new(alternatives))
    }
}
