/// Category of a subscriber error. Allows callers to make intelligent
/// decisions about error handling (skip, retry, fail fast).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or key material. Permanent for this attempt.
    Config,
    /// Broker connection failure (refused, unreachable, dropped).
    Connection,
    /// Local I/O error: disk full, permission denied, missing file.
    Io,
    /// Logical error (invalid state, generic).
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Connection => f.write_str("connection"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Unified error type for the broker, TLS and sink seams.
///
/// Carries an `ErrorKind` for categorization and a human-readable message
/// that already names the failing resource. Message decode errors are not
/// here: the header decoder returns its own typed `HeaderError`.
#[derive(Clone)]
pub struct SubscriberError {
    kind: ErrorKind,
    message: String,
}

impl SubscriberError {
    /// Generic logic error (default kind).
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    /// Configuration error: bad URL, unreadable store, wrong password.
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    /// Broker connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connection, message: msg.into() }
    }

    /// Local I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for SubscriberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for SubscriberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SubscriberError {}
