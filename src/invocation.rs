//! Invocation records
//!
//! An [`Invocation`] carries the state of one intercepted call: the resolved
//! operation, its (still mutable) arguments and a return slot. It can be
//! forwarded to the target exactly once. After forwarding, or once the proxy
//! has taken its snapshot, the record is frozen.
//!
//! An [`InvocationSnapshot`] is a detached copy of a finished record, safe to
//! keep around for logging or audit.

use crate::error::{InvokeError, ProxyError};
use crate::operation::{Operation, OperationHash};
use crate::target::{Invokable, TargetError};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutable per-call state handed to an interception handler.
pub struct Invocation<'a> {
    operation: Operation,
    arguments: Vec<Value>,
    return_value: Option<Value>,
    forwarded: bool,
    frozen: bool,
    target: &'a dyn Invokable,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(operation: Operation, arguments: Vec<Value>, target: &'a dyn Invokable) -> Self {
        Self {
            operation,
            arguments,
            return_value: None,
            forwarded: false,
            frozen: false,
            target,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Mutable access to the arguments, allowed until the record is forwarded.
    ///
    /// The arity was fixed when the operation was resolved, so only the
    /// values can change.
    pub fn arguments_mut(&mut self) -> Result<&mut [Value], ProxyError> {
        self.ensure_open()?;
        Ok(&mut self.arguments)
    }

    /// Replace a single argument.
    pub fn set_argument(&mut self, index: usize, value: impl Into<Value>) -> Result<(), ProxyError> {
        self.ensure_open()?;
        let arity = self.arguments.len();
        match self.arguments.get_mut(index) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(ProxyError::ArgumentIndex {
                operation: self.operation.name.clone(),
                index,
                arity,
            }),
        }
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Set the return value directly.
    ///
    /// If the record has not been forwarded, this suppresses the call to the
    /// target entirely.
    pub fn set_return_value(&mut self, value: impl Into<Value>) -> Result<(), ProxyError> {
        self.ensure_open()?;
        self.return_value = Some(value.into());
        Ok(())
    }

    pub fn is_forwarded(&self) -> bool {
        self.forwarded
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen || self.forwarded
    }

    /// The receiver this record forwards to by default.
    pub fn target(&self) -> &'a dyn Invokable {
        self.target
    }

    /// Dispatch the record to its target with the current arguments.
    ///
    /// Stores the result as the return value. A target failure is returned
    /// unchanged; the record still counts as forwarded.
    pub fn forward(&mut self) -> Result<&Value, InvokeError> {
        self.begin_forward()?;
        tracing::trace!(
            operation = %self.operation.name,
            receiver = self.target.receiver_name(),
            "forwarding invocation"
        );
        let outcome = self.target.perform(&self.operation, &self.arguments);
        self.complete_forward(outcome)
    }

    /// Dispatch the record to another receiver instead of the target.
    ///
    /// The operation is resolved again by name and arity on `receiver`; if it
    /// does not respond, its own unsupported fault is returned.
    pub fn forward_to(&mut self, receiver: &dyn Invokable) -> Result<&Value, InvokeError> {
        self.begin_forward()?;
        tracing::trace!(
            operation = %self.operation.name,
            receiver = receiver.receiver_name(),
            "forwarding invocation to alternate receiver"
        );
        let outcome = match receiver.resolve(&self.operation.name, self.arguments.len()) {
            Some(operation) => receiver.perform(&operation, &self.arguments),
            None => Err(TargetError::unsupported(
                receiver.receiver_name(),
                &self.operation.name,
                self.arguments.len(),
            )),
        };
        self.complete_forward(outcome)
    }

    fn begin_forward(&mut self) -> Result<(), ProxyError> {
        if self.forwarded {
            return Err(ProxyError::DoubleForward {
                operation: self.operation.name.clone(),
            });
        }
        if self.frozen {
            return Err(self.frozen_error());
        }
        self.forwarded = true;
        Ok(())
    }

    fn complete_forward(&mut self, outcome: Result<Value, TargetError>) -> Result<&Value, InvokeError> {
        let value = outcome?;
        Ok(self.return_value.insert(value))
    }

    fn ensure_open(&self) -> Result<(), ProxyError> {
        if self.is_frozen() {
            Err(self.frozen_error())
        } else {
            Ok(())
        }
    }

    fn frozen_error(&self) -> ProxyError {
        ProxyError::RecordFrozen {
            operation: self.operation.name.clone(),
        }
    }

    /// Whether the call still needs dispatching: neither forwarded nor
    /// answered by the handler.
    pub(crate) fn is_pending(&self) -> bool {
        !self.forwarded && self.return_value.is_none()
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Copy the record into a detached snapshot.
    ///
    /// A failed call is recorded without a return value.
    pub(crate) fn snapshot(&self, proxy: &str, failure: Option<&InvokeError>) -> InvocationSnapshot {
        InvocationSnapshot {
            proxy: proxy.to_string(),
            receiver: self.target.receiver_name().to_string(),
            fingerprint: self.operation.fingerprint(),
            operation: self.operation.clone(),
            arguments: self.arguments.clone(),
            return_value: match failure {
                Some(_) => None,
                None => self.return_value.clone(),
            },
            forwarded: self.forwarded,
            failure: failure.map(ToString::to_string),
        }
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("operation", &self.operation)
            .field("arguments", &self.arguments)
            .field("return_value", &self.return_value)
            .field("forwarded", &self.forwarded)
            .field("frozen", &self.frozen)
            .field("target", &self.target.receiver_name())
            .finish()
    }
}

/// Immutable copy of a completed (or failed) invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationSnapshot {
    /// Label of the proxy that handled the call
    pub proxy: String,
    /// Name of the receiver the call was aimed at
    pub receiver: String,
    pub operation: Operation,
    pub fingerprint: OperationHash,
    pub arguments: Vec<Value>,
    pub return_value: Option<Value>,
    pub forwarded: bool,
    /// Rendered error when the call failed
    pub failure: Option<String>,
}

impl InvocationSnapshot {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Serialize as a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for InvocationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.receiver, self.operation.name)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")?;
        match (&self.return_value, &self.failure) {
            (_, Some(failure)) => write!(f, " failed: {}", failure),
            (Some(value), None) => write!(f, " = {}", value),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method_table::{MethodTable, Object};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Doubler {
        calls: AtomicUsize,
    }

    fn doubler() -> Object<Doubler> {
        let table = MethodTable::new().method("double", |d: &Doubler, x: i64| -> i64 {
            d.calls.fetch_add(1, Ordering::SeqCst);
            x * 2
        });
        Object::new("Doubler", Doubler { calls: AtomicUsize::new(0) }, table)
    }

    fn record<'a>(target: &'a Object<Doubler>, x: i64) -> Invocation<'a> {
        let op = target.resolve("double", 1).unwrap();
        Invocation::new(op, vec![Value::S64(x)], target)
    }

    #[test]
    fn test_forward_stores_result() {
        let target = doubler();
        let mut inv = record(&target, 5);
        assert!(inv.is_pending());
        assert_eq!(inv.forward().unwrap(), &Value::S64(10));
        assert_eq!(inv.return_value(), Some(&Value::S64(10)));
        assert!(inv.is_forwarded());
    }

    #[test]
    fn test_double_forward_rejected() {
        let target = doubler();
        let mut inv = record(&target, 5);
        inv.forward().unwrap();
        let err = inv.forward().unwrap_err();
        assert_eq!(
            err,
            InvokeError::Proxy(ProxyError::DoubleForward {
                operation: "double".into()
            })
        );
        assert_eq!(target.state().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_frozen_after_forward() {
        let target = doubler();
        let mut inv = record(&target, 5);
        inv.forward().unwrap();
        assert!(matches!(inv.set_return_value(1i64), Err(ProxyError::RecordFrozen { .. })));
        assert!(matches!(inv.arguments_mut(), Err(ProxyError::RecordFrozen { .. })));
        assert!(matches!(inv.set_argument(0, 1i64), Err(ProxyError::RecordFrozen { .. })));
    }

    #[test]
    fn test_frozen_before_forward() {
        let target = doubler();
        let mut inv = record(&target, 5);
        inv.freeze();
        assert!(matches!(
            inv.forward(),
            Err(InvokeError::Proxy(ProxyError::RecordFrozen { .. }))
        ));
        assert_eq!(target.state().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_argument_out_of_range() {
        let target = doubler();
        let mut inv = record(&target, 5);
        assert_eq!(
            inv.set_argument(1, 7i64),
            Err(ProxyError::ArgumentIndex {
                operation: "double".into(),
                index: 1,
                arity: 1,
            })
        );
        assert_eq!(inv.arguments(), &[Value::S64(5)]);
        assert_eq!(inv.arguments_mut().unwrap().len(), 1);
    }

    #[test]
    fn test_set_return_value_suppresses() {
        let target = doubler();
        let mut inv = record(&target, 5);
        inv.set_return_value(999i64).unwrap();
        assert!(!inv.is_pending());
        assert!(!inv.is_forwarded());
    }

    #[test]
    fn test_target_failure_still_forwarded() {
        let target = doubler();
        let op = target.resolve("double", 1).unwrap();
        let mut inv = Invocation::new(op, vec![Value::Bool(true)], &target);
        let err = inv.forward().unwrap_err();
        assert!(matches!(err, InvokeError::Target(TargetError::Argument { index: 0, .. })));
        assert!(inv.is_forwarded());
        assert_eq!(inv.return_value(), None);
    }

    #[test]
    fn test_forward_to_other_receiver() {
        let target = doubler();
        let other = Object::new(
            "Tripler",
            (),
            MethodTable::new().method("double", |_: &(), x: i64| -> i64 { x * 3 }),
        );
        let mut inv = record(&target, 5);
        assert_eq!(inv.forward_to(&other).unwrap(), &Value::S64(15));
        assert_eq!(target.state().calls.load(Ordering::SeqCst), 0);

        let empty = Object::new("Empty", (), MethodTable::<()>::new());
        let mut inv = record(&target, 5);
        let err = inv.forward_to(&empty).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_snapshot_drops_value_on_failure() {
        let target = doubler();
        let mut inv = record(&target, 5);
        inv.forward().unwrap();
        let ok = inv.snapshot("p", None);
        assert_eq!(ok.return_value, Some(Value::S64(10)));
        assert!(ok.succeeded());
        assert_eq!(ok.to_string(), "Doubler.double(5) = 10");

        let failure = InvokeError::from(TargetError::failed("boom"));
        let failed = inv.snapshot("p", Some(&failure));
        assert_eq!(failed.return_value, None);
        assert_eq!(failed.failure.as_deref(), Some("boom"));
    }

    #[test]
    fn test_snapshot_json() {
        let target = doubler();
        let mut inv = record(&target, 2);
        inv.forward().unwrap();
        let json = inv.snapshot("p", None).to_json().unwrap();
        let back: InvocationSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.return_value, Some(Value::S64(4)));
        assert_eq!(back.fingerprint, inv.operation().fingerprint());
    }
}
