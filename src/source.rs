//! How tasks get hold of a parser.

use crate::parser::{ParseError, Parser};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Sharing strategy of a [`ParserSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sharing {
    /// One instance used by every task.
    Shared,
    /// A fresh instance per task.
    PerTask,
    /// A fixed set of instances, checked out one task at a time.
    Pooled,
}

impl Sharing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sharing::Shared => "shared",
            Sharing::PerTask => "per-task",
            Sharing::Pooled => "pooled",
        }
    }
}

impl fmt::Display for Sharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Factory<P> = Box<dyn Fn() -> P + Send + Sync>;

enum Mode<P> {
    Shared(P),
    PerTask(Factory<P>),
    Pooled(ParserPool<P>),
}

/// Supplies a parser to each task.
///
/// # Example
///
/// ```rust
/// use parse_stress::{ParserSource, SharedBufferParser, Sharing};
///
/// // Every task gets its own buffer, so the race disappears.
/// let source = ParserSource::per_task(SharedBufferParser::new);
/// assert_eq!(source.sharing(), Sharing::PerTask);
/// assert!(source.parse("[1,2,3]").is_ok());
/// ```
pub struct ParserSource<P> {
    mode: Mode<P>,
    name: String,
}

impl<P: Parser> ParserSource<P> {
    /// Share one instance between all tasks.
    pub fn shared(parser: P) -> Self {
        let name = parser.name().to_string();
        Self {
            mode: Mode::Shared(parser),
            name,
        }
    }

    /// Build a new instance for every task.
    pub fn per_task<F>(factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        let name = factory().name().to_string();
        Self {
            mode: Mode::PerTask(Box::new(factory)),
            name,
        }
    }

    /// Pre-build `size` instances and hand them out one task at a time.
    pub fn pooled<F>(size: usize, factory: F) -> Self
    where
        F: FnMut() -> P,
    {
        let pool = ParserPool::new(size, factory);
        let name = pool.checkout().name().to_string();
        Self {
            mode: Mode::Pooled(pool),
            name,
        }
    }

    pub fn sharing(&self) -> Sharing {
        match self.mode {
            Mode::Shared(_) => Sharing::Shared,
            Mode::PerTask(_) => Sharing::PerTask,
            Mode::Pooled(_) => Sharing::Pooled,
        }
    }

    /// Name of the parser handed out by this source.
    pub fn parser_name(&self) -> &str {
        &self.name
    }

    /// Parse `text` with whichever instance this source assigns.
    pub fn parse(&self, text: &str) -> Result<Value, ParseError> {
        match &self.mode {
            Mode::Shared(parser) => parser.parse(text),
            Mode::PerTask(factory) => factory().parse(text),
            Mode::Pooled(pool) => pool.checkout().parse(text),
        }
    }
}

/// Fixed set of parser instances with blocking checkout.
pub struct ParserPool<P> {
    idle: Mutex<Vec<P>>,
    available: Condvar,
    size: usize,
}

impl<P: Parser> ParserPool<P> {
    /// Build a pool of `size` instances (at least one).
    pub fn new<F>(size: usize, mut factory: F) -> Self
    where
        F: FnMut() -> P,
    {
        let size = size.max(1);
        let idle = (0..size).map(|_| factory()).collect();
        Self {
            idle: Mutex::new(idle),
            available: Condvar::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Instances not currently checked out.
    pub fn idle(&self) -> usize {
        self.lock_idle().len()
    }

    /// Take an instance, blocking until one is free. It returns to the pool
    /// when the guard drops.
    pub fn checkout(&self) -> PooledParser<'_, P> {
        let mut idle = self.lock_idle();
        loop {
            if let Some(parser) = idle.pop() {
                return PooledParser {
                    pool: self,
                    parser: Some(parser),
                };
            }
            idle = self
                .available
                .wait(idle)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn checkin(&self, parser: P) {
        self.lock_idle().push(parser);
        self.available.notify_one();
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<P>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A parser checked out of a [`ParserPool`].
pub struct PooledParser<'a, P: Parser> {
    pool: &'a ParserPool<P>,
    parser: Option<P>,
}

impl<P: Parser> Deref for PooledParser<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.parser
            .as_ref()
            .expect("pooled parser is only taken on drop")
    }
}

impl<P: Parser> Drop for PooledParser<'_, P> {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.checkin(parser);
        }
    }
}
