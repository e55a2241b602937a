/// Calculates the caret offset for a 1-based character column, expanding tabs
/// to the next 8-column stop. Only used for rendering error pointers.
#[must_use]
pub fn display_column(line: &str, col: usize) -> usize {
    let mut visual = 0;
    for (i, c) in line.chars().enumerate() {
        if i + 1 >= col {
            break;
        }
        if c == '\t' {
            visual = (visual / 8 + 1) * 8;
        } else {
            visual += 1;
        }
    }
    visual
}

/// Byte offset of a 1-based (row, column) position in `source`.
/// Positions past the end clamp to the source length.
#[must_use]
pub fn byte_offset(source: &str, row: usize, col: usize) -> usize {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if line == row && column == col {
            return i;
        }
        if c == '\n' {
            if line == row {
                return i;
            }
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    source.len()
}

/// Replaces escape sequences in an interpolating string.
///
/// Handles `\b \t \n \f \r \" \\`, `\uXXXX`, `\UXXXXXXXX`, and an escaped line
/// break (backslash, optional spaces, newline, plus the next line's leading
/// whitespace). Anything else is left untouched.
#[must_use]
pub fn unescape(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            out.push(c);
            break;
        };
        let simple = match next {
            'b' => Some('\u{0008}'),
            't' => Some('\t'),
            'n' => Some('\n'),
            'f' => Some('\u{000C}'),
            'r' => Some('\r'),
            '"' => Some('"'),
            '\\' => Some('\\'),
            _ => None,
        };
        if let Some(replacement) = simple {
            chars.next();
            out.push(replacement);
            continue;
        }
        if next == 'u' || next == 'U' {
            let width = if next == 'u' { 4 } else { 8 };
            let start = i + 2;
            let digits = content.get(start..start + width);
            let decoded = digits
                .filter(|d| d.chars().all(|h| h.is_ascii_hexdigit()))
                .and_then(|d| u32::from_str_radix(d, 16).ok())
                .and_then(char::from_u32);
            if let Some(ch) = decoded {
                out.push(ch);
                for _ in 0..=width {
                    chars.next();
                }
                continue;
            }
        }
        if let Some(skip) = escaped_line_break(&content[i + 1..]) {
            while let Some(&(j, _)) = chars.peek() {
                if j >= i + 1 + skip {
                    break;
                }
                chars.next();
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Length of `[ \t]* \r? \n [whitespace]*` at the start of `rest`, if present.
fn escaped_line_break(rest: &str) -> Option<usize> {
    let after_spaces = rest.trim_start_matches([' ', '\t']);
    let newline = if after_spaces.starts_with("\r\n") {
        2
    } else if after_spaces.starts_with('\n') {
        1
    } else {
        return None;
    };
    let tail = &after_spaces[newline..];
    let consumed = rest.len() - tail.len() + (tail.len() - tail.trim_start().len());
    Some(consumed)
}
