//! Parsers under test.
//!
//! The harness only depends on the [`Parser`] trait. The grammar itself is
//! always `serde_json`; implementations differ in where they keep per-parse
//! state, which is what decides whether sharing one instance is safe.

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Failure category of a parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    /// Input is not syntactically valid JSON.
    Syntax,
    /// Input ended in the middle of a value.
    Eof,
    /// Input is valid JSON but semantically rejected.
    Data,
    /// Underlying read failure.
    Io,
    /// The parser panicked; caught at the task boundary.
    Panic,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::Syntax => "SyntaxError",
            ParseErrorKind::Eof => "UnexpectedEof",
            ParseErrorKind::Data => "DataError",
            ParseErrorKind::Io => "IoError",
            ParseErrorKind::Panic => "Panic",
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a [`Parser`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        let kind = match err.classify() {
            Category::Io => ParseErrorKind::Io,
            Category::Syntax => ParseErrorKind::Syntax,
            Category::Data => ParseErrorKind::Data,
            Category::Eof => ParseErrorKind::Eof,
        };
        Self::new(kind, err.to_string())
    }
}

/// A JSON parser that the harness can call from many threads.
///
/// `Sync` only promises memory safety. Implementations are free to keep
/// per-parse state in `&self`, which is exactly the defect the harness
/// exists to expose.
pub trait Parser: Send + Sync {
    /// Short label used in reports.
    fn name(&self) -> &str;

    /// Parse a complete JSON document.
    fn parse(&self, text: &str) -> Result<Value, ParseError>;
}

impl<P: Parser + ?Sized> Parser for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        (**self).parse(text)
    }
}

impl<P: Parser + ?Sized> Parser for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        (**self).parse(text)
    }
}

/// Stateless parser; safe to share between any number of threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeParser;

impl SerdeParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for SerdeParser {
    fn name(&self) -> &str {
        "serde"
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        serde_json::from_str(text).map_err(ParseError::from)
    }
}

/// Number of characters fed into the buffer per step.
pub const DEFAULT_CHUNK_CHARS: usize = 4;

/// Parser that stages its input in an instance buffer before parsing.
///
/// Every step (reset, feed, take) locks the buffer on its own, so the
/// sequence as a whole is not atomic. One caller at a time always gets the
/// right answer. Concurrent callers interleave their chunks and parse each
/// other's fragments.
#[derive(Debug)]
pub struct SharedBufferParser {
    buffer: Mutex<String>,
    chunk_chars: usize,
}

impl Default for SharedBufferParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedBufferParser {
    pub fn new() -> Self {
        Self::with_chunk_chars(DEFAULT_CHUNK_CHARS)
    }

    /// Feed the input `n` characters at a time. Smaller chunks widen the
    /// race window.
    pub fn with_chunk_chars(n: usize) -> Self {
        Self {
            buffer: Mutex::new(String::new()),
            chunk_chars: n.max(1),
        }
    }

    // Poison only means another caller panicked mid-step; the buffer is
    // reset at the start of every parse anyway.
    fn buffer(&self) -> MutexGuard<'_, String> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reset(&self) {
        self.buffer().clear();
    }

    fn feed(&self, chunk: &[char]) {
        self.buffer().extend(chunk.iter());
    }

    fn take(&self) -> String {
        std::mem::take(&mut *self.buffer())
    }
}

impl Parser for SharedBufferParser {
    fn name(&self) -> &str {
        "shared-buffer"
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        self.reset();

        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(self.chunk_chars) {
            self.feed(chunk);
            std::thread::yield_now();
        }

        let staged = self.take();
        serde_json::from_str(&staged).map_err(ParseError::from)
    }
}

/// Wrapper that logs every parse with a running in-flight number.
///
/// The number is the count of parses active on this instance when the parse
/// started, so anything above 1 means concurrent use.
pub struct MonitoredParser<P> {
    inner: P,
    name: String,
    in_flight: AtomicUsize,
}

impl<P: Parser> MonitoredParser<P> {
    pub fn new(inner: P) -> Self {
        let name = format!("monitored({})", inner.name());
        Self {
            inner,
            name,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Parses currently running on this instance.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<P: Parser> Parser for MonitoredParser<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, text: &str) -> Result<Value, ParseError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);

        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("<unnamed>");
        info!("Parsing #{} started by thread: {}", current, thread_name);

        let result = self.inner.parse(text);
        match &result {
            Ok(_) => info!("Parsing #{} completed successfully", current),
            Err(e) => info!("Parsing #{} failed with error: {}", current, e),
        }
        result
    }
}
