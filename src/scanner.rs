//! Tag scanner: splits template text into literal runs and tagged runs.
//!
//! Recognized tag forms:
//!
//! - `<%@ ... %>`: directive
//! - `<%= ... %>`: expression
//! - `<%-- ... --%>`: comment
//! - `<% ... %>`: statement block
//!
//! Everything between tags is a literal run. `<%%` and `%%>` are escapes for
//! `<%` and `%>`: they never open or close a tag, and are unescaped only when
//! literal text is taken out of a [`Tag`] (see [`Tag::literal_text`]).

use std::borrow::Cow;

const OPEN: &str = "<%";
const CLOSE: &str = "%>";
const COMMENT_OPEN: &str = "<%--";
const COMMENT_CLOSE: &str = "--%>";
const SNIPPET_CHARS: usize = 60;

/// The kind of a scanned run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Literal,
    Directive,
    Expression,
    Block,
    Comment,
}

/// Byte range of a run in the scanned text, plus the 1-based line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

/// One scanned run. `text` is the raw inner text: the delimiters are stripped
/// for tags, escapes are left in place for literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    pub kind: TagKind,
    pub text: &'a str,
    pub span: Span,
}

impl<'a> Tag<'a> {
    /// Literal text with `<%%`/`%%>` escapes resolved.
    pub fn literal_text(&self) -> Cow<'a, str> {
        unescape_literal(self.text)
    }
}

/// Error raised when a tagged run is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: unterminated tag: {snippet}")]
    UnterminatedTag { line: usize, snippet: String },

    #[error("line {line}: unterminated comment: {snippet}")]
    UnterminatedComment { line: usize, snippet: String },

    #[error("line {line}: tag does not match any tag patterns: {snippet}")]
    UnrecognizedTag { line: usize, snippet: String },

    #[error("line {line}: cannot parse directive tag: {snippet}")]
    MalformedDirective { line: usize, snippet: String },
}

/// Resolve the `<%%` and `%%>` escapes of a literal run.
pub fn unescape_literal(text: &str) -> Cow<'_, str> {
    if !text.contains("<%%") && !text.contains("%%>") {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("<%%", "<%").replace("%%>", "%>"))
}

/// Truncated copy of a tag's text for error messages.
pub(crate) fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

/// Scan template text lazily. Iteration stops after the first error.
pub fn scan(source: &str) -> TagScanner<'_> {
    TagScanner {
        source,
        position: 0,
        line: 1,
        failed: false,
    }
}

/// Lazy iterator over the runs of a template.
#[derive(Debug)]
pub struct TagScanner<'a> {
    source: &'a str,
    position: usize,
    line: usize,
    failed: bool,
}

impl<'a> TagScanner<'a> {
    /// Find the next real tag opener at or after `from`, skipping `<%%` escapes.
    fn find_open(&self, from: usize) -> Option<usize> {
        let bytes = self.source.as_bytes();
        let mut search = from;
        while let Some(offset) = self.source[search..].find(OPEN) {
            let start = search + offset;
            match bytes.get(start + 2) {
                Some(b'%') => search = start + 3,
                Some(_) => return Some(start),
                None => return None,
            }
        }
        None
    }

    /// Find the `%>` closing a tag opened at `start`. The body must be non-empty
    /// and its last character must not be `%` (that would be a `%%>` escape).
    fn find_close(&self, start: usize) -> Option<usize> {
        let bytes = self.source.as_bytes();
        let mut search = start + 2;
        while let Some(offset) = self.source[search..].find(CLOSE) {
            let close = search + offset;
            if close >= start + 3 && bytes[close - 1] != b'%' {
                return Some(close);
            }
            search = close + 1;
        }
        None
    }

    /// Advance past `len` bytes, keeping the line counter in sync.
    fn advance(&mut self, len: usize) -> Span {
        let start = self.position;
        let end = start + len;
        let span = Span {
            start,
            end,
            line: self.line,
        };
        self.line += self.source[start..end].matches('\n').count();
        self.position = end;
        span
    }

    fn scan_tag(&mut self) -> Result<Tag<'a>, ParseError> {
        let start = self.position;
        let rest = &self.source[start..];

        if rest.starts_with(COMMENT_OPEN) {
            let body_start = start + COMMENT_OPEN.len();
            let Some(offset) = self.source[body_start..].find(COMMENT_CLOSE) else {
                return Err(ParseError::UnterminatedComment {
                    line: self.line,
                    snippet: snippet(rest),
                });
            };
            let text = &self.source[body_start..body_start + offset];
            let span = self.advance(COMMENT_OPEN.len() + offset + COMMENT_CLOSE.len());
            return Ok(Tag {
                kind: TagKind::Comment,
                text,
                span,
            });
        }

        let Some(close) = self.find_close(start) else {
            return Err(ParseError::UnterminatedTag {
                line: self.line,
                snippet: snippet(rest),
            });
        };
        let body = &self.source[start + OPEN.len()..close];
        let (kind, text) = classify(body);

        if kind == TagKind::Expression && text.trim().is_empty() {
            return Err(ParseError::UnrecognizedTag {
                line: self.line,
                snippet: snippet(&self.source[start..close + CLOSE.len()]),
            });
        }

        let span = self.advance(close + CLOSE.len() - start);
        Ok(Tag { kind, text, span })
    }
}

/// Classify a tag body (text between `<%` and `%>`).
fn classify(body: &str) -> (TagKind, &str) {
    if let Some(text) = body.strip_prefix('@') {
        (TagKind::Directive, text)
    } else if let Some(text) = body.strip_prefix('=') {
        (TagKind::Expression, text)
    } else {
        (TagKind::Block, body)
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Result<Tag<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.source.len() {
            return None;
        }

        match self.find_open(self.position) {
            Some(open) if open == self.position => {
                let result = self.scan_tag();
                self.failed = result.is_err();
                Some(result)
            }
            found => {
                let end = found.unwrap_or(self.source.len());
                let text = &self.source[self.position..end];
                let span = self.advance(end - self.position);
                Some(Ok(Tag {
                    kind: TagKind::Literal,
                    text,
                    span,
                }))
            }
        }
    }
}
