//! Styled terminal output for `stencil-ctl`.
//!
//! Generated text goes to stdout unstyled (it is the product); status and
//! diagnostics go to stderr through `anstream`, which strips styling when
//! the stream is not a terminal.

mod styles;

use std::io::Write;

pub(crate) use styles::clap_styles;

use stencil::CompileReport;
use styles::{DIM, ERROR, HEADER, SUCCESS};

/// Print a success message to stderr (green checkmark prefix).
pub(crate) fn success(msg: impl std::fmt::Display) {
    let mut out = anstream::stderr().lock();
    writeln!(out, "{SUCCESS}✓{SUCCESS:#} {SUCCESS}{msg}{SUCCESS:#}").ok();
}

/// Print an error message to stderr (red X prefix).
pub(crate) fn error(msg: impl std::fmt::Display) {
    let mut out = anstream::stderr().lock();
    writeln!(out, "{ERROR}✗ {msg}{ERROR:#}").ok();
}

/// Print a section header to stderr (bold).
pub(crate) fn header(msg: impl std::fmt::Display) {
    let mut out = anstream::stderr().lock();
    writeln!(out, "{HEADER}{msg}{HEADER:#}").ok();
}

/// Print dimmed text to stderr.
pub(crate) fn dim(msg: impl std::fmt::Display) {
    let mut out = anstream::stderr().lock();
    writeln!(out, "{DIM}{msg}{DIM:#}").ok();
}

/// Print generated text to stdout exactly as produced.
pub(crate) fn generated(text: &str) -> std::io::Result<()> {
    write_generated(&mut std::io::stdout().lock(), text)
}

fn write_generated(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

/// Print the numbered generated-source listing under a header.
pub(crate) fn listing(class_name: &str, listing: &str) {
    header(format!("{class_name}.lua"));
    dim(listing.trim_end());
}

/// Print every diagnostic, the summary line and the numbered listing.
pub(crate) fn compile_report(report: &CompileReport) {
    for diagnostic in &report.diagnostics {
        error(diagnostic);
    }
    error(report.summary());
    listing(&report.class_name, &report.listing());
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_generated_text_is_written_verbatim() {
        let mut out = Vec::new();
        write_generated(&mut out, "line 1\r\nline 2").unwrap();
        assert_eq!(out, b"line 1\r\nline 2");
    }

    #[test]
    fn test_generated_write_failure_is_reported() {
        let err = write_generated(&mut ClosedPipe, "text").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
