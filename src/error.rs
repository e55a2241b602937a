use crate::text::{SourceId, Text};
use crate::utils::{byte_offset, display_column};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum TycoError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),
}

/// Where in which source an error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub source: SourceId,
    pub row: usize,
    pub col: usize,
}

/// The offending line, kept for plain-text rendering.
#[derive(Debug, Clone)]
struct Excerpt {
    name: String,
    line: String,
}

/// A lexing, scanning, or resolution failure.
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(
    code(tyco::parse),
    help("Fix the marked input; quoting a value usually resolves delimiter and colon errors.")
)]
pub struct ParseError {
    message: String,
    location: Option<Location>,
    excerpt: Option<Excerpt>,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("here")]
    span: Option<SourceSpan>,
}

impl ParseError {
    /// An error pointing at the first character of `fragment`.
    pub fn new(message: impl Into<String>, fragment: &Text) -> Self {
        Self {
            message: message.into(),
            location: Some(Location {
                source: fragment.source(),
                row: fragment.row(),
                col: fragment.col(),
            }),
            excerpt: None,
            src: None,
            span: None,
        }
    }

    /// An error with no source position (missing files, empty input).
    pub fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            excerpt: None,
            src: None,
            span: None,
        }
    }

    /// An internal invariant violation, reported as a parser bug.
    pub(crate) fn internal(message: impl fmt::Display, fragment: &Text) -> Self {
        Self::new(format!("Internal parser error: {message}"), fragment)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Name of the source the error points into, once annotated.
    #[must_use]
    pub fn source_name(&self) -> Option<&str> {
        self.excerpt.as_ref().map(|e| e.name.as_str())
    }

    pub(crate) fn is_located(&self) -> bool {
        self.location.is_some()
    }

    /// Fills in the offending line and span from the full source text.
    pub(crate) fn annotate(mut self, name: &str, source_text: &str) -> Self {
        let Some(loc) = self.location else {
            return self;
        };
        if self.excerpt.is_some() {
            return self;
        }
        let line = source_text
            .lines()
            .nth(loc.row.saturating_sub(1))
            .unwrap_or_default()
            .to_string();
        let offset = byte_offset(source_text, loc.row, loc.col);
        let len = usize::from(offset < source_text.len());
        self.excerpt = Some(Excerpt {
            name: name.to_string(),
            line,
        });
        self.src = Some(NamedSource::new(name, source_text.to_string()));
        self.span = Some((offset, len).into());
        self
    }

    /// Plain-text rendering: location header, the offending line, and a
    /// tab-aware caret under the failing column.
    #[must_use]
    pub fn render(&self) -> String {
        match (&self.location, &self.excerpt) {
            (Some(loc), Some(excerpt)) => {
                let pointer = " ".repeat(display_column(&excerpt.line, loc.col));
                format!(
                    "File \"{}\", line {}, column {}:\n{}\n{}^\nTycoParseError: {}",
                    excerpt.name, loc.row, loc.col, excerpt.line, pointer, self.message
                )
            }
            _ => format!("TycoParseError: {}", self.message),
        }
    }
}

/// A user validator rejected a materialized object.
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("Validation failed for {type_name}: {message}")]
#[diagnostic(
    code(tyco::validation),
    help("The validator registered for this type rejected one of its instances.")
)]
pub struct ValidationError {
    pub type_name: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_points_at_column() {
        let source = "str a: x\nint b: nope\n";
        let fragment = Text::new("nope", SourceId(0), 2, 8);
        let err = ParseError::new("'nope' is not a valid integer literal", &fragment)
            .annotate("demo.tyco", source);
        let rendered = err.render();
        assert_eq!(
            rendered,
            "File \"demo.tyco\", line 2, column 8:\nint b: nope\n       ^\nTycoParseError: 'nope' is not a valid integer literal"
        );
    }

    #[test]
    fn test_render_expands_tabs() {
        let source = "\tx\n";
        let fragment = Text::new("x", SourceId(0), 1, 2);
        let err = ParseError::new("bad", &fragment).annotate("<string>", source);
        assert!(err.render().contains("\n        ^\n"));
    }

    #[test]
    fn test_bare_error_has_no_location() {
        let err = ParseError::bare("Unable to find path nowhere.tyco");
        assert!(err.location().is_none());
        assert_eq!(err.render(), "TycoParseError: Unable to find path nowhere.tyco");
        assert!(err.source_code().is_none());
    }

    #[test]
    fn test_diagnostic_label_span() {
        let source = "ab\ncd\n";
        let fragment = Text::new("d", SourceId(0), 2, 2);
        let err = ParseError::new("oops", &fragment).annotate("f.tyco", source);
        let label = err.labels().unwrap().next().unwrap();
        assert_eq!(label.offset(), 4);
        assert_eq!(label.label(), Some("here"));
        assert_eq!(err.source_name(), Some("f.tyco"));
        assert!(err.help().is_some());
    }

    #[test]
    fn test_unannotated_error_has_no_labels() {
        let fragment = Text::new("x", SourceId(0), 1, 1);
        let err = ParseError::new("bad", &fragment);
        assert!(err.source_code().is_none());
        assert!(err.labels().map_or(true, |mut l| l.next().is_none()));
    }
}
