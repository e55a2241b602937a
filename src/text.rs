use std::fmt;
use std::ops::{Bound, Deref, RangeBounds};

/// Identifies one scanned source (a file or an in-memory string) inside a `Context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) usize);

impl SourceId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// An immutable string that remembers where its first character came from.
///
/// Every derived value (slices, trims, splits, concatenations) carries the
/// position of its own first surviving character, recomputed by walking the
/// removed prefix. Rows advance on `\n`, columns on every other character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Text {
    value: String,
    source: SourceId,
    row: usize,
    col: usize,
}

impl Text {
    pub fn new(value: impl Into<String>, source: SourceId, row: usize, col: usize) -> Self {
        Self {
            value: value.into(),
            source,
            row,
            col,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// 1-based row of the first character.
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// 1-based column of the first character.
    #[must_use]
    pub fn col(&self) -> usize {
        self.col
    }

    /// Row and column of the character at byte `offset`.
    #[must_use]
    pub fn location_at(&self, offset: usize) -> (usize, usize) {
        let offset = self.clamp(offset);
        let mut row = self.row;
        let mut col = self.col;
        for ch in self.value[..offset].chars() {
            if ch == '\n' {
                row += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (row, col)
    }

    /// Sub-slice by byte range, positioned at the start of the range.
    #[must_use]
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Text {
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => self.value.len(),
        };
        let start = self.clamp(start);
        let end = self.clamp(end).max(start);
        let (row, col) = self.location_at(start);
        Text::new(&self.value[start..end], self.source, row, col)
    }

    #[must_use]
    pub fn slice_from(&self, start: usize) -> Text {
        self.slice(start..)
    }

    #[must_use]
    pub fn slice_to(&self, end: usize) -> Text {
        self.slice(..end)
    }

    /// Strips leading whitespace, newlines included.
    #[must_use]
    pub fn trim_start(&self) -> Text {
        let removed = self.value.len() - self.value.trim_start().len();
        self.slice_from(removed)
    }

    /// Strips the given leading characters only.
    #[must_use]
    pub fn trim_start_matches(&self, chars: &[char]) -> Text {
        let removed = self.value.len() - self.value.trim_start_matches(chars).len();
        self.slice_from(removed)
    }

    /// Strips trailing whitespace; the position is unchanged.
    #[must_use]
    pub fn trim_end(&self) -> Text {
        self.slice_to(self.value.trim_end().len())
    }

    #[must_use]
    pub fn trim(&self) -> Text {
        self.trim_start().trim_end()
    }

    /// Splits on every occurrence of `sep`; each piece is positioned at its own start.
    #[must_use]
    pub fn split(&self, sep: &str) -> Vec<Text> {
        if sep.is_empty() {
            return vec![self.clone()];
        }
        let mut parts = Vec::new();
        let mut start = 0;
        while let Some(idx) = self.value[start..].find(sep) {
            parts.push(self.slice(start..start + idx));
            start += idx + sep.len();
        }
        parts.push(self.slice_from(start));
        parts
    }

    /// Splits at the first `sep`, returning the text before and after it.
    #[must_use]
    pub fn split_once(&self, sep: char) -> Option<(Text, Text)> {
        let idx = self.value.find(sep)?;
        Some((self.slice_to(idx), self.slice_from(idx + sep.len_utf8())))
    }

    /// Appends plain text; the result keeps this text's position.
    #[must_use]
    pub fn concat(&self, other: &str) -> Text {
        let mut value = String::with_capacity(self.value.len() + other.len());
        value.push_str(&self.value);
        value.push_str(other);
        Text::new(value, self.source, self.row, self.col)
    }

    /// Joins fragments; the result is positioned at the first one.
    #[must_use]
    pub fn join(parts: &[Text]) -> Option<Text> {
        let first = parts.first()?;
        let value: String = parts.iter().map(Text::as_str).collect();
        Some(Text::new(value, first.source, first.row, first.col))
    }

    fn clamp(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.value.len());
        while !self.value.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }
}

impl Deref for Text {
    type Target = str;

    fn deref(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}

impl PartialEq<&str> for Text {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}
