// ABOUTME: Error types for lexing, parsing, and evaluation failures in Zephyr

use std::fmt;
use thiserror::Error;

/// A location in source text: 1-based line/column, plus how many characters
/// the error should highlight (for caret-and-tilde tracebacks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl SourceSpan {
    pub fn new(line: usize, column: usize, length: usize) -> Self {
        SourceSpan { line, column, length }
    }

    pub fn point(line: usize, column: usize) -> Self {
        SourceSpan { line, column, length: 1 }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The full taxonomy of runtime and compile-time error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("SyntaxError")]
    SyntaxError,
    #[error("NameError")]
    NameError,
    #[error("TypeError")]
    TypeError,
    #[error("ValueError")]
    ValueError,
    #[error("IndexError")]
    IndexError,
    #[error("KeyError")]
    KeyError,
    #[error("AttributeError")]
    AttributeError,
    #[error("ZeroDivisionError")]
    ZeroDivisionError,
    #[error("OverflowError")]
    OverflowError,
    #[error("ImportError")]
    ImportError,
    #[error("IOError")]
    IOError,
    #[error("InternalError")]
    InternalError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::IOError => "IOError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

/// A single located Zephyr error. Every fallible operation in the crate
/// returns `Result<T, ZephyrError>`.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct ZephyrError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: SourceSpan,
}

impl ZephyrError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError { kind, message: message.into(), span }
    }

    pub fn syntax(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::SyntaxError, message, span)
    }

    pub fn name(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::NameError, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::TypeError, message, span)
    }

    pub fn value(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::ValueError, message, span)
    }

    pub fn index(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::IndexError, message, span)
    }

    pub fn key(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::KeyError, message, span)
    }

    pub fn attribute(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::AttributeError, message, span)
    }

    pub fn zero_division(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::ZeroDivisionError, message, span)
    }

    pub fn overflow(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::OverflowError, message, span)
    }

    pub fn import(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::ImportError, message, span)
    }

    pub fn io(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::IOError, message, span)
    }

    pub fn internal(message: impl Into<String>, span: SourceSpan) -> Self {
        ZephyrError::new(ErrorKind::InternalError, message, span)
    }

    /// Render the multi-line traceback format described in the external
    /// interfaces: a header, a file/line reference, the offending source
    /// line, a caret-and-tilde indicator, then `Kind: message`.
    pub fn render_traceback(&self, file: &str, source: &str) -> String {
        let mut out = String::new();
        out.push_str("Traceback (most recent call last):\n");
        out.push_str(&format!("  File \"{}\", line {}\n", file, self.span.line));
        if let Some(line) = source.lines().nth(self.span.line.saturating_sub(1)) {
            out.push_str(&format!("    {}\n", line));
            let pad = " ".repeat(4 + self.span.column.saturating_sub(1));
            let marker = if self.span.length <= 1 {
                "^".to_string()
            } else {
                format!("^{}", "~".repeat(self.span.length - 1))
            };
            out.push_str(&format!("{}{}\n", pad, marker));
        }
        out.push_str(&format!("{}: {}", self.kind.name(), self.message));
        out
    }
}

thread_local! {
    static CURRENT_SPAN: std::cell::Cell<SourceSpan> = std::cell::Cell::new(SourceSpan::new(0, 0, 0));
}

/// RAII guard that records the span of the AST node currently being
/// evaluated so any error raised underneath it can be stamped with a
/// location, mirroring the location-tracking thread-locals elsewhere in
/// this codebase.
pub struct SpanGuard {
    previous: SourceSpan,
}

impl SpanGuard {
    pub fn enter(span: SourceSpan) -> Self {
        let previous = CURRENT_SPAN.with(|c| c.replace(span));
        SpanGuard { previous }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        CURRENT_SPAN.with(|c| c.set(self.previous));
    }
}

pub fn current_span() -> SourceSpan {
    CURRENT_SPAN.with(|c| c.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traceback_points_at_column() {
        let err = ZephyrError::overflow("300 out of range 0..255", SourceSpan::new(1, 15, 3));
        let rendered = err.render_traceback("test.zephyr", "const x : u8 = 300");
        assert!(rendered.contains("OverflowError: 300 out of range 0..255"));
        assert!(rendered.contains("^~~"));
    }

    #[test]
    fn span_guard_restores_previous_on_drop() {
        let outer = SourceSpan::new(1, 1, 1);
        let _outer_guard = SpanGuard::enter(outer);
        {
            let inner = SourceSpan::new(2, 2, 1);
            let _inner_guard = SpanGuard::enter(inner);
            assert_eq!(current_span(), inner);
        }
        assert_eq!(current_span(), outer);
    }
}
