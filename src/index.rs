//! Structure index: single-pass construction plus the query surface.
//!
//! Construction runs one forward pass over the canonical tokens with an
//! explicit opener stack, producing type buckets, opener/closer pair maps
//! in both directions, parent links, and the fence list. A second pass
//! (see [`crate::sections`]) derives the hierarchical section list from
//! the heading buckets. Everything is immutable after construction except
//! the children map, which is derived from the parent table on first use
//! and memoized.
//!
//! The index is safely reusable across multiple independent dispatch
//! passes with different collector sets.

use std::collections::HashMap;

use once_cell::unsync::OnceCell;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::BuildError;
use crate::guard;
use crate::sections::{self, Section, SectionMap};
use crate::token::{self, CanonicalToken, SourceToken};

/// Type tag of heading openers.
pub const HEADING_OPEN: &str = "heading_open";

/// Type tag of inline content tokens.
pub const INLINE: &str = "inline";

/// Type tag of fenced code blocks.
pub const FENCE: &str = "fence";

/// One fenced block with a resolved line range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FenceRecord {
    /// First source line of the fence.
    pub start_line: usize,
    /// Last source line of the fence.
    pub end_line: usize,
    /// Info string, e.g. the language tag.
    pub info: String,
}

/// Built structural indices over one canonicalized token stream.
#[derive(Debug)]
pub struct StructureIndex {
    tokens: Vec<CanonicalToken>,
    buckets: HashMap<String, Vec<usize>>,
    line_buckets: HashMap<String, Vec<(usize, usize)>>,
    opener_to_closer: HashMap<usize, usize>,
    closer_to_opener: HashMap<usize, usize>,
    parents: HashMap<usize, usize>,
    children: OnceCell<HashMap<usize, Vec<usize>>>,
    fences: Vec<FenceRecord>,
    sections: SectionMap,
    last_line: usize,
}

impl StructureIndex {
    /// Canonicalizes and indexes a caller-owned token stream.
    ///
    /// The resource guard checks the token count before any processing;
    /// use [`StructureIndex::build_with_source_size`] when the raw byte
    /// size of the document is known too.
    pub fn build<T: SourceToken>(
        tokens: &[T],
        config: &EngineConfig,
    ) -> Result<Self, BuildError> {
        guard::check(tokens.len(), None, config)?;
        Self::from_canonical(token::canonicalize(tokens), config)
    }

    /// Like [`StructureIndex::build`], additionally checking the raw byte
    /// size of the source document against the configured ceiling.
    pub fn build_with_source_size<T: SourceToken>(
        tokens: &[T],
        byte_size: usize,
        config: &EngineConfig,
    ) -> Result<Self, BuildError> {
        guard::check(tokens.len(), Some(byte_size), config)?;
        Self::from_canonical(token::canonicalize(tokens), config)
    }

    fn from_canonical(
        tokens: Vec<CanonicalToken>,
        config: &EngineConfig,
    ) -> Result<Self, BuildError> {
        let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
        let mut line_buckets: HashMap<String, Vec<(usize, usize)>> = HashMap::new();
        let mut opener_to_closer = HashMap::new();
        let mut closer_to_opener = HashMap::new();
        let mut parents = HashMap::new();
        let mut fences = Vec::new();

        let mut opener_stack: Vec<usize> = Vec::new();
        let mut last_line = 0usize;

        for (pos, tok) in tokens.iter().enumerate() {
            buckets
                .entry(tok.token_type.clone())
                .or_default()
                .push(pos);

            if let Some((start, end)) = tok.lines {
                last_line = last_line.max(end);
                line_buckets
                    .entry(tok.token_type.clone())
                    .or_default()
                    .push((start, pos));
            }

            if tok.is_closer() {
                // The closer's parent is its matched opener, assigned here
                // explicitly; the generic stack-top assignment below would
                // otherwise overwrite it with the grandparent.
                if let Some(opener) = opener_stack.pop() {
                    opener_to_closer.insert(opener, pos);
                    closer_to_opener.insert(pos, opener);
                    parents.insert(pos, opener);
                }
            } else {
                if let Some(&top) = opener_stack.last() {
                    parents.insert(pos, top);
                }
                if tok.is_opener() {
                    opener_stack.push(pos);
                    if config.max_depth > 0 && opener_stack.len() > config.max_depth {
                        return Err(BuildError::NestingTooDeep {
                            depth: opener_stack.len(),
                            limit: config.max_depth,
                            position: pos,
                        });
                    }
                }
            }

            if tok.token_type == FENCE {
                if let Some((start, end)) = tok.lines {
                    fences.push(FenceRecord {
                        start_line: start,
                        end_line: end,
                        info: tok.info.clone(),
                    });
                }
            }
        }

        // Coerced line starts can arrive in any order; the per-type line
        // lists must be sorted for the binary searches in
        // `positions_in_lines`.
        for list in line_buckets.values_mut() {
            list.sort_unstable();
        }

        let heading_positions = buckets
            .get(HEADING_OPEN)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let sections = sections::build(&tokens, heading_positions, &parents, last_line);

        Ok(Self {
            tokens,
            buckets,
            line_buckets,
            opener_to_closer,
            closer_to_opener,
            parents,
            children: OnceCell::new(),
            fences,
            sections,
            last_line,
        })
    }

    /// The canonical token array, in document order.
    pub fn tokens(&self) -> &[CanonicalToken] {
        &self.tokens
    }

    /// One canonical token by position.
    pub fn token(&self, position: usize) -> Option<&CanonicalToken> {
        self.tokens.get(position)
    }

    /// Number of indexed tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when the document held no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Highest source line seen on any token.
    pub fn last_line(&self) -> usize {
        self.last_line
    }

    /// Closer position matched to an opener, if any.
    pub fn closer_of(&self, opener: usize) -> Option<usize> {
        self.opener_to_closer.get(&opener).copied()
    }

    /// Opener position matched to a closer, if any.
    pub fn opener_of(&self, closer: usize) -> Option<usize> {
        self.closer_to_opener.get(&closer).copied()
    }

    /// Structural parent of a position, if any.
    pub fn parent_of(&self, position: usize) -> Option<usize> {
        self.parents.get(&position).copied()
    }

    /// Direct children of a position, in document order.
    ///
    /// The children map is derived from the parent table on first call and
    /// memoized; the index is otherwise immutable after construction.
    pub fn children_of(&self, position: usize) -> &[usize] {
        let map = self.children.get_or_init(|| {
            let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
            // Walking positions in order keeps every child list sorted
            // without a separate sort pass.
            for pos in 0..self.tokens.len() {
                if let Some(&parent) = self.parents.get(&pos) {
                    map.entry(parent).or_default().push(pos);
                }
            }
            map
        });
        map.get(&position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All positions of one token type, in document order.
    pub fn positions_of(&self, token_type: &str) -> &[usize] {
        self.buckets
            .get(token_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Positions of one token type whose line range starts inside
    /// `start_line..=end_line`, in document order.
    ///
    /// Binary-searches a per-type list sorted by line start. Only tokens
    /// with a resolved line range participate; a range-less token in the
    /// same bucket never matches and never hides its siblings.
    pub fn positions_in_lines(
        &self,
        token_type: &str,
        start_line: usize,
        end_line: usize,
    ) -> Vec<usize> {
        let entries = self
            .line_buckets
            .get(token_type)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let lower = entries.partition_point(|&(line, _)| line < start_line);
        let upper = entries.partition_point(|&(line, _)| line <= end_line);

        let mut positions: Vec<usize> =
            entries[lower..upper].iter().map(|&(_, pos)| pos).collect();
        positions.sort_unstable();
        positions
    }

    /// Concatenated leaf-text content across a position range
    /// (`start..end`, end exclusive).
    pub fn text_between(&self, start: usize, end: usize) -> String {
        let end = end.min(self.tokens.len());
        let mut text = String::new();
        for tok in &self.tokens[start.min(end)..end] {
            if tok.is_leaf() {
                text.push_str(&tok.content);
            }
        }
        text
    }

    /// All fenced blocks with resolved line ranges, in document order.
    pub fn fences(&self) -> &[FenceRecord] {
        &self.fences
    }

    /// The hierarchical section list, ordered by start line.
    pub fn sections(&self) -> &[Section] {
        self.sections.sections()
    }

    /// The innermost section containing a source line, if any.
    pub fn section_at(&self, line: usize) -> Option<&Section> {
        self.sections.section_at(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Tok;

    fn build(tokens: &[Tok]) -> StructureIndex {
        StructureIndex::build(tokens, &EngineConfig::default()).expect("build")
    }

    #[test]
    fn pairs_are_mutual_inverses() {
        let tokens = [
            Tok::open("blockquote_open"),
            Tok::open("paragraph_open"),
            Tok::inline("quoted"),
            Tok::close("paragraph_close"),
            Tok::close("blockquote_close"),
        ];
        let index = build(&tokens);

        assert_eq!(index.closer_of(0), Some(4));
        assert_eq!(index.opener_of(4), Some(0));
        assert_eq!(index.closer_of(1), Some(3));
        assert_eq!(index.opener_of(3), Some(1));
        assert_eq!(index.closer_of(2), None);
    }

    #[test]
    fn closer_parent_is_its_matched_opener() {
        let tokens = [
            Tok::open("blockquote_open"),
            Tok::open("paragraph_open"),
            Tok::close("paragraph_close"),
            Tok::close("blockquote_close"),
        ];
        let index = build(&tokens);

        // Not the grandparent: position 2 closes the paragraph opened at 1.
        assert_eq!(index.parent_of(2), Some(1));
        assert_eq!(index.parent_of(3), Some(0));
        assert_eq!(index.parent_of(1), Some(0));
        assert_eq!(index.parent_of(0), None);
    }

    #[test]
    fn children_are_sorted_and_memoized() {
        let tokens = [
            Tok::open("bullet_list_open"),
            Tok::open("list_item_open"),
            Tok::close("list_item_close"),
            Tok::open("list_item_open"),
            Tok::close("list_item_close"),
            Tok::close("bullet_list_close"),
        ];
        let index = build(&tokens);

        assert_eq!(index.children_of(0), &[1, 3, 5]);
        assert_eq!(index.children_of(1), &[2]);
        assert_eq!(index.children_of(2), &[] as &[usize]);
        // Second call hits the memoized map.
        assert_eq!(index.children_of(0), &[1, 3, 5]);
    }

    #[test]
    fn depth_ceiling_is_fatal_and_position_tagged() {
        let config = EngineConfig {
            max_depth: 2,
            ..EngineConfig::default()
        };
        let tokens = [
            Tok::open("blockquote_open"),
            Tok::open("blockquote_open"),
            Tok::open("blockquote_open"),
        ];
        let err = StructureIndex::build(&tokens, &config).unwrap_err();
        assert_eq!(
            err,
            BuildError::NestingTooDeep {
                depth: 3,
                limit: 2,
                position: 2,
            }
        );
    }

    #[test]
    fn unbalanced_closer_is_tolerated() {
        let tokens = [Tok::close("paragraph_close"), Tok::inline("after")];
        let index = build(&tokens);
        assert_eq!(index.opener_of(0), None);
        assert_eq!(index.parent_of(0), None);
        assert_eq!(index.parent_of(1), None);
    }

    #[test]
    fn fences_require_resolved_line_ranges() {
        let tokens = [
            Tok::fence("rust", 2, 5),
            Tok::new("fence", 0), // no line range: not recorded
            Tok::fence("", 8, 8),
        ];
        let index = build(&tokens);
        assert_eq!(
            index.fences(),
            &[
                FenceRecord {
                    start_line: 2,
                    end_line: 5,
                    info: "rust".to_string(),
                },
                FenceRecord {
                    start_line: 8,
                    end_line: 8,
                    info: String::new(),
                },
            ]
        );
    }

    #[test]
    fn ranged_queries_filter_by_line_start() {
        let tokens = [
            Tok::inline("a").with_lines(0, 0),
            Tok::inline("b").with_lines(3, 3),
            Tok::inline("c").with_lines(7, 8),
            Tok::inline("d"),
        ];
        let index = build(&tokens);

        assert_eq!(index.positions_in_lines(INLINE, 1, 7), vec![1, 2]);
        assert_eq!(index.positions_in_lines(INLINE, 4, 6), Vec::<usize>::new());
        assert_eq!(index.positions_of(INLINE), &[0, 1, 2, 3]);
        assert_eq!(index.positions_of("fence"), &[] as &[usize]);
    }

    #[test]
    fn range_less_tokens_never_hide_ranged_siblings() {
        let tokens = [
            Tok::inline("a").with_lines(5, 5),
            Tok::inline("no range"),
            Tok::inline("b").with_lines(6, 6),
        ];
        let index = build(&tokens);

        assert_eq!(index.positions_in_lines(INLINE, 5, 6), vec![0, 2]);
        assert_eq!(index.positions_in_lines(INLINE, 0, 100), vec![0, 2]);
    }

    #[test]
    fn out_of_order_line_starts_resolve_in_document_order() {
        // Hostile tokenizers may report lines out of document order.
        let tokens = [
            Tok::inline("late").with_lines(9, 9),
            Tok::inline("early").with_lines(2, 2),
            Tok::inline("mid").with_lines(4, 4),
        ];
        let index = build(&tokens);

        assert_eq!(index.positions_in_lines(INLINE, 2, 4), vec![1, 2]);
        assert_eq!(index.positions_in_lines(INLINE, 0, 9), vec![0, 1, 2]);
    }

    #[test]
    fn text_between_joins_leaf_content_only() {
        let tokens = [
            Tok::open("paragraph_open"),
            Tok::inline("Hello "),
            Tok::inline("world"),
            Tok::close("paragraph_close"),
        ];
        let index = build(&tokens);
        assert_eq!(index.text_between(0, 4), "Hello world");
        assert_eq!(index.text_between(2, 100), "world");
        assert_eq!(index.text_between(3, 3), "");
    }
}
