//! Proxy errors
//!
//! Failures raised by the proxy machinery are kept apart from failures raised
//! by the target, so callers can always tell which side failed.

use crate::target::TargetError;
use thiserror::Error;

/// A failure originating in the proxy's own bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("proxy target is missing or already released")]
    InvalidTarget,

    #[error("invocation of {operation} was already forwarded")]
    DoubleForward { operation: String },

    #[error("invocation of {operation} is frozen")]
    RecordFrozen { operation: String },

    #[error("argument {index} is out of range for {operation}/{arity}")]
    ArgumentIndex {
        operation: String,
        index: usize,
        arity: usize,
    },

    #[error("invocation of {operation} produced no return value")]
    NoReturnValue { operation: String },

    #[error("reentrant call to {operation} at depth {depth} exceeds limit {limit}")]
    HandlerReentrancy {
        operation: String,
        depth: usize,
        limit: usize,
    },
}

/// The error returned from [`Proxy::invoke`](crate::Proxy::invoke).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    /// The target failed; relayed exactly as a direct call would report it.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// The proxy machinery failed.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl InvokeError {
    pub fn is_target(&self) -> bool {
        matches!(self, InvokeError::Target(_))
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, InvokeError::Proxy(_))
    }

    pub fn as_target(&self) -> Option<&TargetError> {
        match self {
            InvokeError::Target(e) => Some(e),
            InvokeError::Proxy(_) => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&ProxyError> {
        match self {
            InvokeError::Proxy(e) => Some(e),
            InvokeError::Target(_) => None,
        }
    }

    /// Whether the target reported the operation as unsupported.
    pub fn is_unsupported(&self) -> bool {
        self.as_target().is_some_and(TargetError::is_unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_errors_render_transparently() {
        let target = TargetError::unsupported("Calc", "triple", 1);
        let err = InvokeError::from(target.clone());
        assert_eq!(err.to_string(), target.to_string());
        assert!(err.is_target() && err.is_unsupported());
        assert_eq!(err.as_target(), Some(&target));
    }

    #[test]
    fn test_proxy_errors_are_distinct() {
        let err = InvokeError::from(ProxyError::DoubleForward {
            operation: "double".into(),
        });
        assert!(err.is_proxy());
        assert!(!err.is_unsupported());
        assert_eq!(err.as_target(), None);
    }
}
