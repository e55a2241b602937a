use crate::error::ParseError;
use crate::text::Text;
use std::collections::VecDeque;

/// Delimiters that are structural wherever a bare value is read.
pub const STRUCTURAL: [char; 5] = ['(', ')', '[', ']', ','];

/// ASCII control characters (C0 and DEL).
fn is_control(c: char) -> bool {
    (c as u32) < 32 || c == '\u{7f}'
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte length of an identifier (`\w+` not starting with a digit) at the start of `s`.
fn ident_len(s: &str) -> usize {
    match s.chars().next() {
        Some(c) if is_word(c) && !c.is_numeric() => {}
        _ => return 0,
    }
    s.find(|c: char| !is_word(c)).unwrap_or(s.len())
}

fn whitespace_len(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn inline_space_len(s: &str) -> usize {
    s.len() - s.trim_start_matches([' ', '\t']).len()
}

/// Drops a trailing `# comment` and trailing whitespace.
///
/// The comment body may not contain control characters other than tab.
pub fn strip_comments(line: &Text) -> Result<Text, ParseError> {
    let Some(idx) = line.find('#') else {
        return Ok(line.trim_end());
    };
    let comment = line.slice_from(idx + 1);
    let body = comment.trim_end_matches('\n');
    if let Some(bad) = body.chars().find(|&c| is_control(c) && c != '\t') {
        return Err(ParseError::new(
            format!("Invalid characters in comments: {bad:?}"),
            &comment,
        ));
    }
    Ok(line.slice_to(idx).trim_end())
}

/// A `[flag]Type[[]] name:` declaration head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub flag: Option<char>,
    pub type_name: String,
    pub array: bool,
    pub name: String,
    /// Byte offset just past the colon.
    pub value_start: usize,
}

fn match_decl(line: &str, start: usize, flags: &[char]) -> Option<Decl> {
    let mut pos = start;
    let flag = line[pos..].chars().next().filter(|c| flags.contains(c));
    if let Some(f) = flag {
        pos += f.len_utf8();
    }
    let type_len = ident_len(&line[pos..]);
    if type_len == 0 {
        return None;
    }
    let type_name = line[pos..pos + type_len].to_string();
    pos += type_len;
    let array = line[pos..].starts_with("[]");
    if array {
        pos += 2;
    }
    let gap = whitespace_len(&line[pos..]);
    if gap == 0 {
        return None;
    }
    pos += gap;
    let name_len = ident_len(&line[pos..]);
    if name_len == 0 {
        return None;
    }
    let name = line[pos..pos + name_len].to_string();
    pos += name_len;
    pos += whitespace_len(&line[pos..]);
    if !line[pos..].starts_with(':') {
        return None;
    }
    Some(Decl {
        flag,
        type_name,
        array,
        name,
        value_start: pos + 1,
    })
}

/// `[?]Type[[]] name:` at the very start of a line.
#[must_use]
pub fn match_global(line: &str) -> Option<Decl> {
    match_decl(line, 0, &['?'])
}

/// Indented `[*|?]Type[[]] name:` inside a struct block.
#[must_use]
pub fn match_schema(line: &str) -> Option<Decl> {
    let indent = whitespace_len(line);
    if indent == 0 {
        return None;
    }
    match_decl(line, indent, &['*', '?'])
}

/// An indented `word word` line: a schema attribute missing its colon.
#[must_use]
pub fn looks_like_schema_typo(line: &str) -> bool {
    let indent = whitespace_len(line);
    if indent == 0 {
        return false;
    }
    let rest = &line[indent..];
    let first = rest.find(|c: char| !is_word(c)).unwrap_or(rest.len());
    if first == 0 {
        return false;
    }
    let rest = &rest[first..];
    let gap = whitespace_len(rest);
    gap > 0 && rest[gap..].chars().next().is_some_and(is_word)
}

/// `Name:` at the start of a line; returns the name and the offset past the colon.
#[must_use]
pub fn match_block(line: &str) -> Option<(String, usize)> {
    let len = ident_len(line);
    if len == 0 || !line[len..].starts_with(':') {
        return None;
    }
    Some((line[..len].to_string(), len + 1))
}

/// Indented `name:` default override.
#[must_use]
pub fn match_default(line: &str) -> Option<(String, usize)> {
    let indent = whitespace_len(line);
    if indent == 0 {
        return None;
    }
    let len = ident_len(&line[indent..]);
    if len == 0 {
        return None;
    }
    let mut pos = indent + len;
    pos += whitespace_len(&line[pos..]);
    if !line[pos..].starts_with(':') {
        return None;
    }
    Some((line[indent..indent + len].to_string(), pos + 1))
}

/// Indented `-` instance row; returns the offset past the dash.
#[must_use]
pub fn match_row(line: &str) -> Option<usize> {
    let indent = whitespace_len(line);
    (indent > 0 && line[indent..].starts_with('-')).then_some(indent + 1)
}

/// `#include <path>`; returns the path with trailing whitespace removed.
#[must_use]
pub fn include_path(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?;
    let gap = whitespace_len(rest);
    if gap == 0 {
        return None;
    }
    let path = rest[gap..].trim_end();
    (!path.is_empty()).then_some(path)
}

fn describe(delims: &[char]) -> String {
    let names: Vec<String> = delims
        .iter()
        .map(|d| match d {
            '\n' => "end of line".to_string(),
            other => format!("'{other}'"),
        })
        .collect();
    names.join(" or ")
}

/// The line queue of one source plus the token readers that consume it.
///
/// Readers work on the front line and push any unread remainder back, so
/// the parser always sees the next unconsumed text at the front.
#[derive(Debug, Default)]
pub struct Lexer {
    lines: VecDeque<Text>,
}

impl Lexer {
    pub fn new(lines: impl IntoIterator<Item = Text>) -> Self {
        Self {
            lines: lines.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn front(&self) -> Option<&Text> {
        self.lines.front()
    }

    pub fn pop_front(&mut self) -> Option<Text> {
        self.lines.pop_front()
    }

    pub fn push_front(&mut self, line: Text) {
        self.lines.push_front(line);
    }

    pub fn current(&self) -> Result<&Text, ParseError> {
        self.lines
            .front()
            .ok_or_else(|| ParseError::bare("Unexpected end of input"))
    }

    fn replace_front(&mut self, line: Text) {
        match self.lines.front_mut() {
            Some(front) => *front = line,
            None => self.lines.push_front(line),
        }
    }

    /// Drops `bytes` from the front line.
    pub fn advance(&mut self, bytes: usize) -> Result<(), ParseError> {
        let rest = self.current()?.slice_from(bytes);
        self.replace_front(rest);
        Ok(())
    }

    /// Strips spaces and tabs (never newlines) from the front line.
    pub fn skip_inline_space(&mut self) {
        if let Some(front) = self.lines.front_mut() {
            let n = inline_space_len(front);
            if n > 0 {
                *front = front.slice_from(n);
            }
        }
    }

    /// Strips all leading whitespace from the front line (row continuation).
    pub fn trim_front(&mut self) {
        if let Some(front) = self.lines.front_mut() {
            *front = front.trim_start();
        }
    }

    /// A leading `name:` keyed-argument prefix: the name and the bytes to skip.
    /// Tokens starting with a digit never match, so `14:30:00` stays a value.
    #[must_use]
    pub fn peek_key(&self) -> Option<(String, usize)> {
        let front = self.front()?;
        let len = ident_len(front);
        if len == 0 {
            return None;
        }
        let mut pos = len + inline_space_len(&front[len..]);
        if !front[pos..].starts_with(':') {
            return None;
        }
        pos += 1;
        pos += inline_space_len(&front[pos..]);
        Some((front[..len].to_string(), pos))
    }

    /// A leading `Type(` invocation: the type name and the bytes to skip.
    #[must_use]
    pub fn peek_call(&self) -> Option<(String, usize)> {
        let front = self.front()?;
        let len = ident_len(front);
        (len > 0 && front[len..].starts_with('(')).then(|| (front[..len].to_string(), len + 1))
    }

    /// Reads a quoted string starting at the front, quotes included.
    pub fn read_string(&mut self) -> Result<Text, ParseError> {
        let front = self.current()?;
        let quote = match front.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(ParseError::internal("string does not start with a quote", front)),
        };
        let triple: String = [quote; 3].iter().collect();
        if front.starts_with(&triple) {
            self.read_triple_string(quote, &triple)
        } else {
            self.read_single_string(quote)
        }
    }

    fn read_triple_string(&mut self, quote: char, triple: &str) -> Result<Text, ParseError> {
        let literal = quote == '\'';
        let opening = self.current()?.clone();
        let mut start = triple.len();
        let mut parts: Vec<Text> = Vec::new();
        let mut remainder = loop {
            let Some(mut line) = self.lines.pop_front() else {
                return Err(ParseError::new(
                    format!("Unterminated triple-quoted {triple} string"),
                    &opening,
                ));
            };
            if let Some(pos) = line.get(start..).and_then(|s| s.find(triple)) {
                let end = start + pos + triple.len();
                parts.push(line.slice_to(end));
                break line.slice_from(end);
            }
            if !literal && line.ends_with("\\\n") {
                line = line.slice_to(line.len() - 2);
                while let Some(next) = self.lines.front_mut() {
                    let stripped = next.trim_start();
                    if stripped.is_empty() {
                        self.lines.pop_front();
                    } else {
                        *next = stripped;
                        break;
                    }
                }
            }
            parts.push(line);
            start = 0;
        };
        // Up to two quote characters directly before the closing triple belong to the content.
        for _ in 0..2 {
            if !remainder.starts_with(quote) {
                break;
            }
            if let Some(last) = parts.last_mut() {
                *last = last.concat(&quote.to_string());
            }
            remainder = remainder.slice_from(quote.len_utf8());
        }
        let content = Text::join(&parts).unwrap_or(opening);
        if let Some(bad) = content
            .chars()
            .find(|&c| is_control(c) && !matches!(c, '\r' | '\n' | '\t'))
        {
            return Err(ParseError::new(
                format!("Literal multiline strings must not contain control characters (found {bad:?})"),
                &content,
            ));
        }
        self.lines.push_front(remainder);
        Ok(content)
    }

    fn read_single_string(&mut self, quote: char) -> Result<Text, ParseError> {
        let literal = quote == '\'';
        let line = self
            .lines
            .pop_front()
            .ok_or_else(|| ParseError::bare("Unexpected end of input"))?;
        let mut start = quote.len_utf8();
        let end = loop {
            let Some(pos) = line.get(start..).and_then(|s| s.find(quote)) else {
                return Err(ParseError::new(
                    format!("Unterminated string literal (missing closing quote {quote})"),
                    &line,
                ));
            };
            let end = start + pos;
            if literal || !line[..end].ends_with('\\') {
                break end;
            }
            start = end + quote.len_utf8();
        };
        let end = end + quote.len_utf8();
        let content = line.slice_to(end);
        if let Some(bad) = content.chars().find(|&c| is_control(c) && c != '\t') {
            return Err(ParseError::new(
                format!("Literal strings may not contain control characters (found {bad:?})"),
                &content,
            ));
        }
        self.lines.push_front(line.slice_from(end));
        Ok(content)
    }

    /// Consumes the delimiter that must follow a quoted string, array, or call.
    /// A line holding only whitespace or a comment counts as end of line.
    pub fn strip_delim(&mut self, good: &[char]) -> Result<char, ParseError> {
        let front = self.current()?.clone();
        let trimmed = front.trim_start_matches(&[' ', '\t']);
        if let Some(c) = trimmed.chars().next().filter(|c| good.contains(c)) {
            self.replace_front(trimmed.slice_from(c.len_utf8()));
            return Ok(c);
        }
        if good.contains(&'\n') && strip_comments(&front)?.is_empty() {
            self.replace_front(front.slice_from(front.len()));
            return Ok('\n');
        }
        Err(ParseError::new(
            format!("Unable to find expected delimiter: {}", describe(good)),
            &trimmed,
        ))
    }

    /// Reads an unquoted value up to the first delimiter.
    ///
    /// Meeting one of `bad` first is an error: the value must be quoted.
    pub fn read_bare(&mut self, good: &[char], bad: &[char]) -> Result<(Text, char), ParseError> {
        let front = self.current()?.clone();
        let content = strip_comments(&front)?.concat("\n");
        let Some((idx, delim)) = content
            .char_indices()
            .find(|(_, c)| good.contains(c) || bad.contains(c))
        else {
            return Err(ParseError::new(
                format!("Unable to find expected delimiter: {}", describe(good)),
                &front,
            ));
        };
        if !good.contains(&delim) {
            return Err(ParseError::new(
                format!("Delimiter character {delim:?} found - enclose with quotes if correct"),
                &content.slice_from(idx),
            ));
        }
        let value = content.slice_to(idx).trim();
        if value.is_empty() {
            return Err(ParseError::new(
                "Value not found - use empty string with quotes \"\" if truly no content",
                &content,
            ));
        }
        let rest = if delim == '\n' {
            front.slice_from(front.len())
        } else {
            front.slice_from(idx + delim.len_utf8())
        };
        self.replace_front(rest);
        Ok((value, delim))
    }
}
