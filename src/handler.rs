//! Interception handlers
//!
//! A handler gets first refusal over every call that reaches a proxy. It runs
//! synchronously on the caller's thread with the call's [`Invocation`] and may:
//!
//! - rewrite the arguments before they reach the target,
//! - call [`Invocation::forward`] itself and inspect the result,
//! - answer with [`Invocation::set_return_value`] without ever calling the
//!   target,
//! - or do nothing, in which case the proxy forwards the call once the
//!   handler returns (see [`ForwardPolicy`](crate::ForwardPolicy)).
//!
//! Returning `Err` aborts the call: nothing is forwarded afterwards and the
//! error reaches the caller unchanged.

use crate::error::InvokeError;
use crate::invocation::Invocation;

/// Caller-supplied logic invoked once per intercepted call.
pub trait InvocationHandler: Send + Sync {
    fn handle(&self, invocation: &mut Invocation<'_>) -> Result<(), InvokeError>;
}

impl<F> InvocationHandler for F
where
    F: Fn(&mut Invocation<'_>) -> Result<(), InvokeError> + Send + Sync,
{
    fn handle(&self, invocation: &mut Invocation<'_>) -> Result<(), InvokeError> {
        self(invocation)
    }
}

/// A handler that only watches calls go by.
///
/// It never touches the record, so every call is auto-forwarded.
pub struct Passthrough;

impl InvocationHandler for Passthrough {
    fn handle(&self, invocation: &mut Invocation<'_>) -> Result<(), InvokeError> {
        tracing::trace!(operation = %invocation.operation(), "passthrough");
        Ok(())
    }
}

/// Chains handlers: each runs in order until one forwards or answers the
/// call, or fails.
pub struct HandlerChain {
    handlers: Vec<Box<dyn InvocationHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl InvocationHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Append a closure handler.
    pub fn then<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        self.with(f)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationHandler for HandlerChain {
    fn handle(&self, invocation: &mut Invocation<'_>) -> Result<(), InvokeError> {
        for handler in &self.handlers {
            handler.handle(invocation)?;
            if invocation.is_forwarded() || invocation.return_value().is_some() {
                break;
            }
        }
        Ok(())
    }
}
