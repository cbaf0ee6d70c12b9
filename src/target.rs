//! Invokable receivers
//!
//! A proxy has no static knowledge of its target's interface. Instead every
//! target exposes a small dynamic capability: resolve an operation by name
//! and arity, then perform it over boxed arguments.

use crate::operation::Operation;
use crate::value::{ConversionError, Value};
use thiserror::Error;

/// A fault raised by a receiver.
///
/// These are relayed through a proxy unchanged, so a proxied failure compares
/// equal to the failure a direct call would have produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    #[error("{receiver} does not respond to {operation}/{arity}")]
    UnsupportedOperation {
        receiver: String,
        operation: String,
        arity: usize,
    },

    #[error("{operation} takes {expected} argument(s), got {got}")]
    ArityMismatch {
        operation: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of {operation}: {source}")]
    Argument {
        operation: String,
        index: usize,
        #[source]
        source: ConversionError,
    },

    #[error("{message}")]
    Failed { message: String },
}

impl TargetError {
    pub fn unsupported(receiver: &str, operation: &str, arity: usize) -> Self {
        TargetError::UnsupportedOperation {
            receiver: receiver.to_string(),
            operation: operation.to_string(),
            arity,
        }
    }

    /// A failure raised by the operation's own logic.
    pub fn failed(message: impl Into<String>) -> Self {
        TargetError::Failed {
            message: message.into(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, TargetError::UnsupportedOperation { .. })
    }
}

/// An object whose operations can be addressed at runtime.
///
/// Implementations must be safe to call from several threads at once; a
/// proxy forwards concurrent calls without serializing them.
pub trait Invokable: Send + Sync {
    /// Name used in faults and logs.
    fn receiver_name(&self) -> &str;

    /// Resolve `name` called with `arity` arguments against this receiver's
    /// capability set.
    fn resolve(&self, name: &str, arity: usize) -> Option<Operation>;

    /// Perform a resolved operation.
    fn perform(&self, operation: &Operation, arguments: &[Value]) -> Result<Value, TargetError>;

    fn responds_to(&self, name: &str, arity: usize) -> bool {
        self.resolve(name, arity).is_some()
    }

    /// Every operation this receiver can perform, where enumerable.
    fn operations(&self) -> Vec<Operation> {
        Vec::new()
    }

    /// Address an operation directly, without any proxy in between.
    fn call(&self, name: &str, arguments: &[Value]) -> Result<Value, TargetError> {
        let operation = self
            .resolve(name, arguments.len())
            .ok_or_else(|| TargetError::unsupported(self.receiver_name(), name, arguments.len()))?;
        self.perform(&operation, arguments)
    }
}
