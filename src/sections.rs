//! Hierarchical section list derived from heading tokens.
//!
//! A section is the document region governed by one heading, running until
//! the next heading of equal or higher level or the end of the document.
//! Sections never overlap at the same level and partition the document:
//! every line maps to at most one innermost section.

use std::collections::HashMap;

use serde::Serialize;

use crate::index::INLINE;
use crate::token::CanonicalToken;

/// One document section governed by a heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Line the governing heading starts on.
    pub start_line: usize,

    /// Last line of the section; `None` only while the section is still
    /// open during construction. Once closed, `end_line >= start_line`.
    pub end_line: Option<usize>,

    /// Position of the heading opener token.
    pub heading_position: usize,

    /// Heading level, 1..6.
    pub level: u8,

    /// Title text, drawn only from inline content whose structural parent
    /// is this exact heading.
    pub title: String,
}

impl Section {
    /// True when `line` falls inside this closed section.
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && self.end_line.is_some_and(|end| line <= end)
    }
}

/// Ordered section list plus the parallel sorted start-line array used for
/// line lookups.
#[derive(Debug, Clone, Default)]
pub struct SectionMap {
    sections: Vec<Section>,
    starts: Vec<usize>,
}

impl SectionMap {
    /// All sections, ordered by start line (ties broken by heading
    /// position, so deeper headings sort later).
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// True when the document had no headings.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The innermost section containing `line`, if any.
    ///
    /// Binary-searches for the last section starting at or before the
    /// line; that candidate wins only if the line falls inside its range.
    pub fn section_at(&self, line: usize) -> Option<&Section> {
        let idx = self.starts.partition_point(|&start| start <= line);
        if idx == 0 {
            return None;
        }
        let candidate = &self.sections[idx - 1];
        candidate.contains_line(line).then_some(candidate)
    }
}

/// Builds the section map from heading-opener positions.
///
/// Input positions are re-sorted by line start, so out-of-order input is
/// tolerated. Sections close in stack order: a new heading pops every open
/// section of equal or higher level. Recorded ranges are the document
/// partition: a section's range ends right before the next heading of any
/// level, even when the section itself stays open on the stack governing
/// deeper headings. Ranges therefore never overlap and every line belongs
/// to at most one section. The document end closes whatever remains at
/// `last_line`.
pub(crate) fn build(
    tokens: &[CanonicalToken],
    heading_positions: &[usize],
    parents: &HashMap<usize, usize>,
    last_line: usize,
) -> SectionMap {
    let mut ordered: Vec<usize> = heading_positions.to_vec();
    ordered.sort_by_key(|&pos| line_start(tokens, pos));

    let mut open: Vec<Section> = Vec::new();
    let mut closed: Vec<Section> = Vec::new();

    for &pos in &ordered {
        let level = tokens[pos].level.unwrap_or(1);
        let start = line_start(tokens, pos);
        // Never negative-length: a heading on the very next line ends the
        // previous section at its own start line.
        let boundary = |section: &Section| start.saturating_sub(1).max(section.start_line);

        while open.last().is_some_and(|section| section.level >= level) {
            let mut section = open.pop().unwrap();
            if section.end_line.is_none() {
                section.end_line = Some(boundary(&section));
            }
            closed.push(section);
        }

        // The enclosing section stays open (a later equal-or-higher heading
        // still closes it) but its recorded range stops here.
        if let Some(outer) = open.last_mut() {
            if outer.end_line.is_none() {
                outer.end_line = Some(boundary(outer));
            }
        }

        open.push(Section {
            start_line: start,
            end_line: None,
            heading_position: pos,
            level,
            title: title_of(tokens, parents, pos),
        });
    }

    while let Some(mut section) = open.pop() {
        if section.end_line.is_none() {
            section.end_line = Some(last_line.max(section.start_line));
        }
        closed.push(section);
    }

    closed.sort_by_key(|section| (section.start_line, section.heading_position));
    let starts = closed.iter().map(|section| section.start_line).collect();

    SectionMap {
        sections: closed,
        starts,
    }
}

fn line_start(tokens: &[CanonicalToken], pos: usize) -> usize {
    tokens[pos].line_start().unwrap_or(0)
}

/// Joins the content of inline tokens parented by this exact heading.
/// Inline content belonging to any other token never leaks into the title.
fn title_of(
    tokens: &[CanonicalToken],
    parents: &HashMap<usize, usize>,
    heading_pos: usize,
) -> String {
    let mut title = String::new();
    for pos in heading_pos + 1..tokens.len() {
        if parents.get(&pos) != Some(&heading_pos) {
            break;
        }
        let tok = &tokens[pos];
        if tok.is_closer() {
            break;
        }
        if tok.token_type == INLINE {
            if !title.is_empty() {
                title.push(' ');
            }
            title.push_str(tok.content.trim());
        }
    }
    title
}
