//! The external token contract and its canonical, engine-owned projection.
//!
//! Tokens arrive from a tokenizer front-end the engine does not control.
//! They are duck-typed from the engine's point of view: any type
//! implementing [`SourceToken`] is accepted, including hostile
//! implementations whose accessors panic or return garbage. Before any
//! business logic touches them, every token is projected onto a
//! [`CanonicalToken`], a fixed-shape, allow-listed, immutable record.
//! This breaks live references into caller code and removes the code
//! execution surface from the hot paths that read tokens repeatedly.
//!
//! The field allow-list lives here and only here. Downstream consumers
//! (index builder, dispatch engine, collectors) read `CanonicalToken` and
//! carry no second copy of the list.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

/// Caller-owned token as produced by a markup tokenizer.
///
/// Implementations may be arbitrarily misbehaved; every accessor is treated
/// as fallible during canonicalization. Line ranges may be missing,
/// negative, or reversed; they are coerced, never trusted.
pub trait SourceToken {
    /// Type tag, e.g. `heading_open`, `inline`, `fence`.
    fn token_type(&self) -> &str;

    /// Nesting delta: +1 opens a structure, -1 closes one, 0 is flat.
    fn nesting(&self) -> i8;

    /// Rendered tag name, e.g. `h1`. Empty when not applicable.
    fn tag(&self) -> &str {
        ""
    }

    /// Source line range `(start, end)`, when the tokenizer resolved one.
    fn line_range(&self) -> Option<(i64, i64)> {
        None
    }

    /// Heading level 1..6, when the tokenizer exposes one directly.
    fn level(&self) -> Option<u8> {
        None
    }

    /// Free text content.
    fn content(&self) -> &str {
        ""
    }

    /// Markup/info string, e.g. a fence's info line.
    fn info(&self) -> &str {
        ""
    }

    /// Named attributes, e.g. a link destination under `href`.
    fn attrs(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Immutable, allow-listed projection of one [`SourceToken`].
///
/// Plain owned data: cheap to read repeatedly in hot loops, serializable
/// for the downstream facts bundle, and carrying no caller code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalToken {
    /// Type tag.
    pub token_type: String,

    /// Rendered tag name, empty when not applicable.
    pub tag: String,

    /// Nesting delta, clamped to -1..=1.
    pub nesting: i8,

    /// Coerced line range: non-negative, non-decreasing, or absent.
    pub lines: Option<(usize, usize)>,

    /// Heading level, when present on the source token or derivable from a
    /// `h1`..`h6` tag.
    pub level: Option<u8>,

    /// Free text content.
    pub content: String,

    /// Markup/info string.
    pub info: String,

    /// Named attributes, sorted by key, first value kept on duplicates.
    attrs: Vec<(String, String)>,
}

impl CanonicalToken {
    /// Looks up a named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .binary_search_by(|(key, _)| key.as_str().cmp(name))
            .ok()
            .map(|idx| self.attrs[idx].1.as_str())
    }

    /// All attributes, sorted by key.
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// True when this token opens a nested structure.
    pub fn is_opener(&self) -> bool {
        self.nesting > 0
    }

    /// True when this token closes a nested structure.
    pub fn is_closer(&self) -> bool {
        self.nesting < 0
    }

    /// True when this token is flat (carries content, opens nothing).
    pub fn is_leaf(&self) -> bool {
        self.nesting == 0
    }

    /// Start line, when a range is present.
    pub fn line_start(&self) -> Option<usize> {
        self.lines.map(|(start, _)| start)
    }
}

/// Projects a slice of caller-owned tokens onto canonical records.
///
/// Never fails: a panic raised by any single accessor of a hostile token is
/// swallowed and that field takes its default.
pub fn canonicalize<T: SourceToken>(tokens: &[T]) -> Vec<CanonicalToken> {
    tokens.iter().map(canonicalize_one).collect()
}

fn canonicalize_one<T: SourceToken>(token: &T) -> CanonicalToken {
    let token_type = read_field(|| token.token_type().to_string());
    let tag = read_field(|| token.tag().to_string());
    let nesting = read_field(|| token.nesting()).clamp(-1, 1);
    let lines = coerce_lines(read_field(|| token.line_range()));
    let level = read_field(|| token.level())
        .or_else(|| level_from_tag(&tag))
        .map(|lvl| lvl.clamp(1, 6));
    let content = read_field(|| token.content().to_string());
    let info = read_field(|| token.info().to_string());

    let mut attrs = read_field(|| token.attrs());
    attrs.sort_by(|(a, _), (b, _)| a.cmp(b));
    attrs.dedup_by(|(a, _), (b, _)| a == b);

    CanonicalToken {
        token_type,
        tag,
        nesting,
        lines,
        level,
        content,
        info,
        attrs,
    }
}

/// Reads one field from a possibly hostile accessor, defaulting on panic.
fn read_field<T: Default>(accessor: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(accessor)).unwrap_or_default()
}

/// Coerces a raw line range to a safe, non-negative, non-decreasing pair.
fn coerce_lines(raw: Option<(i64, i64)>) -> Option<(usize, usize)> {
    let (start, end) = raw?;
    let start = start.max(0) as usize;
    let end = (end.max(0) as usize).max(start);
    Some((start, end))
}

fn level_from_tag(tag: &str) -> Option<u8> {
    let rest = tag.strip_prefix('h')?;
    let level: u8 = rest.parse().ok()?;
    (1..=6).contains(&level).then_some(level)
}
