//! Error types for controller operations
//!
//! Every fallible operation returns a [`ThreadError`]: one [`ErrorKind`] plus
//! a chain of context messages. Callers prepend context as the error moves
//! up the stack; the kind never changes once set.

use core::fmt;

/// Result type for controller operations
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request, e.g. asking for `Init` or `Exited` directly
    InvalidArgument,

    /// Operation issued before the thread was started
    NotInitialized,

    /// Deadline passed before the condition was met
    TimedOut,

    /// Exiting is already in flight or pending
    ShuttingDown,

    /// Thread has already exited
    ResourceUnavailable,

    /// Redundant request, e.g. pausing a paused thread
    StateAlreadyEffective,

    /// Blocking request a thread made on itself
    DeadlockAverted,

    /// Caller thread is not allowed to perform the operation
    ThreadRestriction,

    /// Sleep woken by a pending state change
    InterruptedOperation,

    /// Unknown listener handle
    NotRegistered,

    /// Not available on this platform
    Unsupported,

    /// OS call failed (errno)
    Os(i32),

    /// User function panicked
    Panicked,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotInitialized => "thread not started",
            ErrorKind::TimedOut => "operation timed out",
            ErrorKind::ShuttingDown => "thread is shutting down",
            ErrorKind::ResourceUnavailable => "thread has exited",
            ErrorKind::StateAlreadyEffective => "state already in effect",
            ErrorKind::DeadlockAverted => "deadlock averted",
            ErrorKind::ThreadRestriction => "not permitted from this thread",
            ErrorKind::InterruptedOperation => "operation interrupted",
            ErrorKind::NotRegistered => "not registered",
            ErrorKind::Unsupported => "unsupported on this platform",
            ErrorKind::Os(_) => "os error",
            ErrorKind::Panicked => "thread function panicked",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Os(code) => write!(f, "os error {}", code),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Error kind with a context chain, outermost message first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadError {
    kind: ErrorKind,
    context: Vec<String>,
}

impl ThreadError {
    /// Bare error with no context
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, context: Vec::new() }
    }

    /// Error with a single context message
    pub fn with_message(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, context: vec![msg.into()] }
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Context messages, outermost first
    pub fn context(&self) -> &[String] {
        &self.context
    }

    /// Innermost message, if any
    pub fn message(&self) -> Option<&str> {
        self.context.last().map(String::as_str)
    }

    /// Add an outer context message, keeping the kind
    pub fn prepend(mut self, msg: impl Into<String>) -> Self {
        self.context.insert(0, msg.into());
        self
    }

    pub fn is_timed_out(&self) -> bool {
        self.kind == ErrorKind::TimedOut
    }

    pub fn is_shutting_down(&self) -> bool {
        self.kind == ErrorKind::ShuttingDown
    }

    pub fn is_resource_unavailable(&self) -> bool {
        self.kind == ErrorKind::ResourceUnavailable
    }
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for msg in &self.context {
            write!(f, "{}: ", msg)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ThreadError {}

impl From<ErrorKind> for ThreadError {
    fn from(kind: ErrorKind) -> Self {
        ThreadError::new(kind)
    }
}

impl From<std::io::Error> for ThreadError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.raw_os_error() {
            Some(code) => ErrorKind::Os(code),
            None => ErrorKind::Os(0),
        };
        ThreadError::with_message(kind, e.to_string())
    }
}

/// Context helpers on `ThreadResult`
pub trait ResultExt<T> {
    /// Prepend a context message to the error, if any
    fn prepend(self, msg: &str) -> ThreadResult<T>;

    /// Like `prepend`, but the message is only built on error
    fn prepend_with<F, S>(self, f: F) -> ThreadResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for ThreadResult<T> {
    fn prepend(self, msg: &str) -> ThreadResult<T> {
        self.map_err(|e| e.prepend(msg))
    }

    fn prepend_with<F, S>(self, f: F) -> ThreadResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.prepend(f()))
    }
}

/// Build a `ThreadError` from a kind and a format string
///
/// ```ignore
/// return Err(thread_err!(NotRegistered, "unknown listener handle '{}'", h));
/// ```
#[macro_export]
macro_rules! thread_err {
    ($kind:ident) => {
        $crate::error::ThreadError::new($crate::error::ErrorKind::$kind)
    };
    ($kind:ident, $($arg:tt)*) => {
        $crate::error::ThreadError::with_message(
            $crate::error::ErrorKind::$kind,
            format!($($arg)*),
        )
    };
}
