//! Per-hop view of the request path.
use std::borrow::Cow;

use thiserror::Error;

/// Rejections produced while normalising a request path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path contains a `.` or `..` segment.
    #[error("relative segment '{0}' in request path")]
    RelativeSegment(String),

    /// The path contains a segment that cannot name a file.
    #[error("invalid segment '{0}' in request path")]
    InvalidSegment(String),
}

/// The request path as seen by the node currently handling it.
///
/// `full` is the whole path split on `/`. The node owning `suffix()[0]` sits at `depth`, so
/// `prefix()` runs from the first segment up to and including that one, and `suffix()` runs from
/// that one to the end. Both are therefore never empty and `prefix ++ suffix[1..] == full`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    full: Vec<String>,
    depth: usize,
}

impl PathContext {
    /// Context for the top level of the tree; `segments` must not be empty.
    pub(crate) fn new(segments: Vec<String>) -> Self {
        debug_assert!(!segments.is_empty());
        Self {
            full: segments,
            depth: 0,
        }
    }

    /// Parse a raw URI path into a top-level context.
    ///
    /// A leading `/` is implied and one trailing `/` is dropped (except for the root path itself).
    /// Each segment is percent-decoded on its own; bytes that are not UTF-8 become U+FFFD and an
    /// encoded `%2F` still separates segments. `.`/`..` segments are rejected after decoding, so
    /// `%2e%2e` cannot slip through either.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut path = raw.strip_prefix('/').unwrap_or(raw);
        if !path.is_empty()
            && let Some(trimmed) = path.strip_suffix('/')
        {
            path = trimmed;
        }

        let mut segments = Vec::new();
        for encoded in path.split('/') {
            let decoded = decode_segment(encoded);
            for segment in decoded.split('/') {
                if segment == "." || segment == ".." {
                    return Err(PathError::RelativeSegment(segment.to_string()));
                }
                if segment.contains(['\\', '\0']) {
                    return Err(PathError::InvalidSegment(segment.to_string()));
                }
                segments.push(segment.to_string());
            }
        }
        Ok(Self::new(segments))
    }

    /// Every segment of the request path.
    pub fn full(&self) -> &[String] {
        &self.full
    }

    /// Segments up to and including the current one.
    pub fn prefix(&self) -> &[String] {
        &self.full[..=self.depth]
    }

    /// Segments from the current one to the end.
    pub fn suffix(&self) -> &[String] {
        &self.full[self.depth..]
    }

    /// The segment owned by the current node.
    pub fn current(&self) -> &str {
        &self.full[self.depth]
    }

    /// Segments after the current one.
    pub fn remaining(&self) -> &[String] {
        &self.full[self.depth + 1..]
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the current segment is the last one.
    pub fn is_last(&self) -> bool {
        self.depth + 1 == self.full.len()
    }

    /// Context one hop deeper, or `None` when the current segment is the last.
    pub(crate) fn advance(&self) -> Option<Self> {
        if self.is_last() {
            return None;
        }
        Some(Self {
            full: self.full.clone(),
            depth: self.depth + 1,
        })
    }
}

fn decode_segment(encoded: &str) -> Cow<'_, str> {
    match urlencoding::decode_binary(encoded.as_bytes()) {
        Cow::Borrowed(_) => Cow::Borrowed(encoded),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(ctx: &PathContext) {
        assert!(!ctx.prefix().is_empty());
        assert!(!ctx.suffix().is_empty());
        let mut rebuilt = ctx.prefix().to_vec();
        rebuilt.extend_from_slice(&ctx.suffix()[1..]);
        assert_eq!(rebuilt, ctx.full());
    }

    #[test]
    fn test_parse_root() {
        let ctx = PathContext::parse("/").unwrap();
        assert_eq!(ctx.full(), [""]);
        assert_eq!(ctx.current(), "");
        assert!(ctx.is_last());
    }

    #[test]
    fn test_parse_strips_single_trailing_slash() {
        let ctx = PathContext::parse("/a/b/").unwrap();
        assert_eq!(ctx.full(), ["a", "b"]);
        let ctx = PathContext::parse("/a//").unwrap();
        assert_eq!(ctx.full(), ["a", ""]);
    }

    #[test]
    fn test_parse_adds_leading_slash() {
        let ctx = PathContext::parse("a/b").unwrap();
        assert_eq!(ctx.full(), ["a", "b"]);
    }

    #[test]
    fn test_parse_rejects_relative_segments() {
        assert_eq!(
            PathContext::parse("/a/../etc"),
            Err(PathError::RelativeSegment("..".to_string()))
        );
        assert!(PathContext::parse("/./a").is_err());
        assert!(PathContext::parse("/a/%2e%2e/b").is_err());
        assert!(PathContext::parse("/..%2Fetc/passwd").is_err());
        assert!(PathContext::parse("/a\\..\\b").is_err());
        assert!(PathContext::parse("/a/...").is_ok());
    }

    #[test]
    fn test_parse_decodes_segments() {
        let ctx = PathContext::parse("/hello%20world/%E6%96%87").unwrap();
        assert_eq!(ctx.full(), ["hello world", "文"]);
    }

    #[test]
    fn test_invalid_escape_only_affects_its_segment() {
        let ctx = PathContext::parse("/%E6%96%87/%FF").unwrap();
        assert_eq!(ctx.full(), ["文", "\u{FFFD}"]);
        assert_eq!(
            PathContext::parse("/%2e%2e/%FF"),
            Err(PathError::RelativeSegment("..".to_string()))
        );
    }

    #[test]
    fn test_encoded_slash_separates_segments() {
        let ctx = PathContext::parse("/a%2Fb/c").unwrap();
        assert_eq!(ctx.full(), ["a", "b", "c"]);
    }

    #[test]
    fn test_invariant_holds_along_walk() {
        let mut ctx = PathContext::parse("/a/b/c").unwrap();
        assert_invariant(&ctx);
        assert_eq!(ctx.prefix(), ["a"]);
        assert_eq!(ctx.suffix(), ["a", "b", "c"]);

        ctx = ctx.advance().unwrap();
        assert_invariant(&ctx);
        assert_eq!(ctx.prefix(), ["a", "b"]);
        assert_eq!(ctx.suffix(), ["b", "c"]);
        assert_eq!(ctx.remaining(), ["c"]);

        ctx = ctx.advance().unwrap();
        assert_invariant(&ctx);
        assert_eq!(ctx.suffix(), ["c"]);
        assert!(ctx.advance().is_none());
    }
}
