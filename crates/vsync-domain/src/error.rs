//! Error taxonomy shared by every layer of vsync.

use std::fmt;

use thiserror::Error;

/// Result type alias used throughout vsync.
pub type Result<T> = std::result::Result<T, Error>;

/// Severity attached to an [`Error`], used by cycle controllers to decide
/// whether to log-and-continue, cancel the cycle, or terminate the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Log and continue; the operation in question was skipped.
    Warn,
    /// Log, cancel the current cycle, exit the process with non-zero status.
    Fatal,
    /// Log with full context and terminate immediately.
    Panic,
}

/// Sentinel tag identifying the class of failure. Callers compare kinds by
/// equality, never by matching on the wrapped message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Config, client construction, or path/mount checks failed at startup.
    Initialization,
    /// Auth capability missing for a required operation.
    PermissionDenied,
    /// The credential used to authenticate was rejected or could not renew.
    InvalidToken,
    /// A secret path could not be read, written, listed or deleted.
    InvalidPath,
    /// KV-v2 metadata for a path was malformed; recoverable per path.
    InvalidMeta,
    /// Sync-info bucket integrity violated.
    InvalidBucket,
    /// Sync-info index integrity violated.
    InvalidIndex,
    /// An insight's fields could not be compared or parsed.
    InvalidInsight,
    /// Coordination-store-side sync info was missing or undecodable.
    InvalidInfo,
    /// No transformer rule matched the path, including the identity tail.
    TransformError,
    /// The comparator or applier encountered an operation it does not know.
    UnknownOp,
    /// A sync-info invariant was violated.
    Corrupted,
    /// The cycle's deadline expired with pending work.
    Timeout,
    /// A shutdown signal was received.
    Interrupted,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Initialization => "initialization",
            Kind::PermissionDenied => "permission denied",
            Kind::InvalidToken => "invalid token",
            Kind::InvalidPath => "invalid path",
            Kind::InvalidMeta => "invalid meta",
            Kind::InvalidBucket => "invalid bucket",
            Kind::InvalidIndex => "invalid index",
            Kind::InvalidInsight => "invalid insight",
            Kind::InvalidInfo => "invalid info",
            Kind::TransformError => "transform error",
            Kind::UnknownOp => "unknown op",
            Kind::Corrupted => "corrupted",
            Kind::Timeout => "timeout",
            Kind::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// A vsync error: the operation that failed, a human context string, a
/// severity, a kind sentinel, and an optional wrapped cause.
#[derive(Error, Debug)]
#[error("{op}: {context} ({kind})")]
pub struct Error {
    /// Component and function name that raised the error, e.g.
    /// `"syncer::compare"`.
    pub op: &'static str,
    /// Human-readable context: what was being attempted.
    pub context: String,
    /// Severity dispatch hint for the cycle controller.
    pub severity: Severity,
    /// Sentinel kind, compared by equality.
    pub kind: Kind,
    /// The underlying cause, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Construct a new warn-severity error.
    pub fn warn(op: &'static str, context: impl Into<String>, kind: Kind) -> Self {
        Self {
            op,
            context: context.into(),
            severity: Severity::Warn,
            kind,
            source: None,
        }
    }

    /// Construct a new fatal-severity error.
    pub fn fatal(op: &'static str, context: impl Into<String>, kind: Kind) -> Self {
        Self {
            op,
            context: context.into(),
            severity: Severity::Fatal,
            kind,
            source: None,
        }
    }

    /// Attach a wrapped cause to this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Walk the source chain collecting each wrapping operation tag, a
    /// direct port of the original's `apperr.Ops`.
    pub fn ops(&self) -> Vec<&'static str> {
        let mut ops = vec![self.op];
        let mut cur: Option<&(dyn std::error::Error + 'static)> =
            self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static));
        while let Some(err) = cur {
            if let Some(vsync_err) = err.downcast_ref::<Error>() {
                ops.push(vsync_err.op);
                cur = vsync_err
                    .source
                    .as_deref()
                    .map(|e| e as &(dyn std::error::Error + 'static));
            } else {
                break;
            }
        }
        ops
    }

    /// True if this error, or any error it wraps, is [`Severity::Panic`].
    pub fn should_panic(&self) -> bool {
        if self.severity == Severity::Panic {
            return true;
        }
        self.source
            .as_deref()
            .and_then(|e| e.downcast_ref::<Error>())
            .is_some_and(Error::should_panic)
    }

    /// True if this error, or any error it wraps, is fatal or panic
    /// severity — the cycle controller should cancel and exit.
    pub fn should_stop(&self) -> bool {
        if matches!(self.severity, Severity::Fatal | Severity::Panic) {
            return true;
        }
        self.source
            .as_deref()
            .and_then(|e| e.downcast_ref::<Error>())
            .is_some_and(Error::should_stop)
    }
}
