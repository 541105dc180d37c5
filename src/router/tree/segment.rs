//! Defines the segment types a route pattern is parsed into, and their
//! relative match priority.

use crate::helpers::split::SegmentSplit;

/// One element of a route pattern, produced by splitting the pattern on `/`.
///
/// Pattern syntax, per segment:
///
/// * `users` - matched literally (ASCII case-insensitive).
/// * `:id` - matches any one segment, binding it to `id`.
/// * `:file.json` - the segment must end with `.json`; the part before the
///   suffix binds to `file`.
/// * `avatar-:size` - the segment must start with `avatar-`; the remainder
///   binds to `size`.
/// * `*` - matches any one segment without binding.
/// * `*.css` / `img-*` - wildcards with a required literal suffix or prefix.
/// * `**` - matches all remaining segments, binding the raw tail under the
///   catch-all key.
///
/// Literal segments are stored lowercased so equal patterns deduplicate
/// regardless of case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// A literal segment, compared case-insensitively.
    Static(String),
    /// Matches any segment, binding the value to the given name.
    Capture(String),
    /// Matches segments ending in `suffix`; binds the leading part.
    PrefixCapture {
        /// Required literal tail of the segment.
        suffix: String,
        /// Name the leading part binds to.
        name: String,
    },
    /// Matches segments starting with `prefix`; binds the trailing part.
    SuffixCapture {
        /// Required literal head of the segment.
        prefix: String,
        /// Name the trailing part binds to.
        name: String,
    },
    /// Matches any segment without binding.
    Wildcard,
    /// Matches segments ending in the given literal suffix, no binding.
    PrefixWildcard(String),
    /// Matches segments starting with the given literal prefix, no binding.
    SuffixWildcard(String),
    /// Matches all remaining segments.
    Glob,
    /// Sentinel for the empty pattern (`/`).
    Empty,
}

impl Segment {
    /// Parses a single raw pattern segment.
    pub fn parse(raw: &str) -> Segment {
        if raw == "**" {
            return Segment::Glob;
        }
        if raw == "*" {
            return Segment::Wildcard;
        }

        if let Some(rest) = raw.strip_prefix(':') {
            return match rest.find(|c: char| !is_name_char(c)) {
                None if !rest.is_empty() => Segment::Capture(rest.to_string()),
                Some(split) if split > 0 => Segment::PrefixCapture {
                    suffix: rest[split..].to_string(),
                    name: rest[..split].to_string(),
                },
                _ => Segment::Static(raw.to_ascii_lowercase()),
            };
        }

        if let Some(colon) = raw.find(':') {
            let name = &raw[colon + 1..];
            if !name.is_empty() && name.chars().all(is_name_char) {
                return Segment::SuffixCapture {
                    prefix: raw[..colon].to_string(),
                    name: name.to_string(),
                };
            }
        }

        if let Some(suffix) = raw.strip_prefix('*') {
            return Segment::PrefixWildcard(suffix.to_string());
        }
        if let Some(prefix) = raw.strip_suffix('*') {
            return Segment::SuffixWildcard(prefix.to_string());
        }

        Segment::Static(raw.to_ascii_lowercase())
    }

    /// Sibling match order, highest first. Ties are broken by build order.
    pub fn priority(&self) -> i8 {
        match self {
            Segment::PrefixCapture { .. } | Segment::SuffixCapture { .. } => 1,
            Segment::Static(_) | Segment::Empty => 0,
            Segment::PrefixWildcard(_) | Segment::SuffixWildcard(_) => -1,
            Segment::Capture(_) => -2,
            Segment::Wildcard => -3,
            Segment::Glob => -4,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A route pattern parsed into ordered segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterPath {
    pub(crate) segments: Vec<Segment>,
}

impl RouterPath {
    /// Splits a pattern on `/` (empty segments elided) and parses each
    /// element. The empty pattern parses to the [`Segment::Empty`] sentinel.
    pub fn parse(pattern: &str) -> RouterPath {
        let segments: Vec<Segment> = SegmentSplit::new(pattern, b'/')
            .map(|s| Segment::parse(s.value))
            .collect();

        if segments.is_empty() {
            RouterPath {
                segments: vec![Segment::Empty],
            }
        } else {
            RouterPath { segments }
        }
    }
}
