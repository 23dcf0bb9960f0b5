//! What changed between two revisions of a page.
//!
//! The comparison is line based. Each change is shown with up to three
//! unchanged lines on either side, and changes close enough to share those
//! lines are merged into one hunk. The rendered form is what an approver
//! reads when deciding on a pending save.

use std::fmt;

use similar::{ChangeTag, DiffOp, TextDiff};

const CONTEXT_LINES: usize = 3;

/// Line changes from one revision of a page to the next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageDiff {
    pub hunks: Vec<Hunk>,
    /// Line count of the earlier revision.
    pub old_len: usize,
    /// Line count of the later revision.
    pub new_len: usize,
}

impl PageDiff {
    /// `true` when both revisions hold the same text.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Lines the editor wrote.
    pub fn additions(&self) -> usize {
        self.lines().filter(|l| matches!(l, Line::Added(_))).count()
    }

    /// Lines the editor took out.
    pub fn deletions(&self) -> usize {
        self.lines().filter(|l| matches!(l, Line::Removed(_))).count()
    }

    fn lines(&self) -> impl Iterator<Item = &Line> {
        self.hunks.iter().flat_map(|h| h.lines.iter())
    }

    /// Unified-diff text, without the `---`/`+++` header.
    pub fn to_unified(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PageDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.hunks.iter().try_for_each(|hunk| write!(f, "{hunk}"))
    }
}

/// One run of edits plus the unchanged lines around it.
///
/// Line numbers are 1-based, as in `@@` headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<Line>,
}

impl Hunk {
    fn at(op: &DiffOp) -> Self {
        Self {
            old_start: op.old_range().start + 1,
            old_len: 0,
            new_start: op.new_range().start + 1,
            new_len: 0,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, tag: ChangeTag, text: String) {
        let line = match tag {
            ChangeTag::Equal => {
                self.old_len += 1;
                self.new_len += 1;
                Line::Same(text)
            }
            ChangeTag::Delete => {
                self.old_len += 1;
                Line::Removed(text)
            }
            ChangeTag::Insert => {
                self.new_len += 1;
                Line::Added(text)
            }
        };
        self.lines.push(line);
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_len, self.new_start, self.new_len
        )?;
        for line in &self.lines {
            writeln!(f, "{}{}", line.marker(), line.text())?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Same(String),
    Added(String),
    Removed(String),
}

impl Line {
    pub fn marker(&self) -> char {
        match self {
            Self::Same(_) => ' ',
            Self::Added(_) => '+',
            Self::Removed(_) => '-',
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Same(t) | Self::Added(t) | Self::Removed(t) => t,
        }
    }
}

/// Compare the text of two page revisions.
pub fn diff_text(old: &str, new: &str) -> PageDiff {
    let mut diff = PageDiff {
        hunks: Vec::new(),
        old_len: old.lines().count(),
        new_len: new.lines().count(),
    };
    if old == new {
        return diff;
    }

    let lines = TextDiff::from_lines(old, new);
    for group in lines.grouped_ops(CONTEXT_LINES) {
        let Some(first) = group.first() else { continue };
        let mut hunk = Hunk::at(first);
        for change in group.iter().flat_map(|op| lines.iter_changes(op)) {
            let text = change.value().trim_end_matches(['\r', '\n']);
            hunk.push(change.tag(), text.to_string());
        }
        diff.hunks.push(hunk);
    }
    diff
}
