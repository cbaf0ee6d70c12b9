//! Proxies
//!
//! A [`Proxy`] stands in for a target [`Invokable`]. Every call made through
//! [`Proxy::invoke`] is resolved against the target, wrapped in a fresh
//! [`Invocation`], offered to the installed handler (if any), forwarded, and
//! finally reported to observers as an [`InvocationSnapshot`].
//!
//! # Example
//!
//! ```ignore
//! let proxy = Proxy::with_handler(calculator, |inv: &mut Invocation<'_>| {
//!     if let Some(Value::S64(x)) = inv.arguments().first().cloned() {
//!         inv.set_argument(0, x * 2)?;
//!     }
//!     Ok(())
//! });
//! assert_eq!(proxy.invoke("double", vec![Value::S64(5)])?, Value::S64(20));
//! ```

mod config;
mod reentrancy;

pub use config::{ConfigError, ForwardPolicy, ProxyConfig, DEFAULT_MAX_REENTRANCY_DEPTH};

use crate::error::{InvokeError, ProxyError};
use crate::handler::InvocationHandler;
use crate::invocation::{Invocation, InvocationSnapshot};
use crate::observer::{ObserverId, SnapshotObserver};
use crate::operation::Operation;
use crate::target::{Invokable, TargetError};
use crate::value::Value;
use reentrancy::ReentrancyGuard;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

type SharedHandler = Arc<dyn InvocationHandler>;
type SharedObserver = Arc<dyn SnapshotObserver>;

/// A transparent stand-in for a target object.
///
/// `Proxy` is `Send + Sync`; concurrent calls each get their own invocation
/// record. Handler replacement is serialized by an internal lock, and a call
/// keeps using the handler that was installed when it started.
pub struct Proxy {
    id: u64,
    label: String,
    target: Arc<dyn Invokable>,
    handler: RwLock<Option<SharedHandler>>,
    observers: RwLock<Vec<(ObserverId, SharedObserver)>>,
    synthesized: Vec<Operation>,
    config: ProxyConfig,
}

impl Proxy {
    /// Create a proxy with no handler.
    pub fn new<T: Invokable + 'static>(target: Arc<T>) -> Self {
        Self::assemble(target, None, Vec::new(), Vec::new(), ProxyConfig::default())
    }

    /// Create a proxy with a handler installed from the start.
    pub fn with_handler<T, F>(target: Arc<T>, handler: F) -> Self
    where
        T: Invokable + 'static,
        F: Fn(&mut Invocation<'_>) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        Self::assemble(
            target,
            Some(Arc::new(handler)),
            Vec::new(),
            Vec::new(),
            ProxyConfig::default(),
        )
    }

    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::new()
    }

    fn assemble(
        target: Arc<dyn Invokable>,
        handler: Option<SharedHandler>,
        observers: Vec<SharedObserver>,
        synthesized: Vec<Operation>,
        config: ProxyConfig,
    ) -> Self {
        let id = NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed);
        let label = config
            .label
            .clone()
            .unwrap_or_else(|| format!("{}#{}", target.receiver_name(), id));
        let observers = observers
            .into_iter()
            .map(|observer| (next_observer_id(), observer))
            .collect();
        Self {
            id,
            label,
            target,
            handler: RwLock::new(handler),
            observers: RwLock::new(observers),
            synthesized,
            config,
        }
    }

    /// Unique id of this proxy instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The proxied target.
    pub fn target(&self) -> &Arc<dyn Invokable> {
        &self.target
    }

    // ------------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------------

    /// Install (or replace) the interception handler.
    ///
    /// Calls already in flight finish with the handler they started with.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&mut Invocation<'_>) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        self.replace_handler(Some(Arc::new(handler)));
    }

    /// Install (or replace) a handler implemented as a type.
    pub fn set_interceptor(&self, handler: impl InvocationHandler + 'static) {
        self.replace_handler(Some(Arc::new(handler)));
    }

    /// Remove the handler. Returns whether one was installed.
    pub fn clear_handler(&self) -> bool {
        self.replace_handler(None).is_some()
    }

    pub fn has_handler(&self) -> bool {
        self.current_handler().is_some()
    }

    fn replace_handler(&self, handler: Option<SharedHandler>) -> Option<SharedHandler> {
        tracing::debug!(proxy = %self.label, installed = handler.is_some(), "replacing handler");
        let mut slot = self.handler.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, handler)
    }

    fn current_handler(&self) -> Option<SharedHandler> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    /// Register a closure to receive a snapshot of every finished call.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&InvocationSnapshot) + Send + Sync + 'static,
    {
        self.add_observer(observer)
    }

    /// Register an observer implemented as a type.
    pub fn add_observer(&self, observer: impl SnapshotObserver + 'static) -> ObserverId {
        let id = next_observer_id();
        let observer: SharedObserver = Arc::new(observer);
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != id);
        observers.len() != before
    }

    fn emit(&self, snapshot: &InvocationSnapshot) {
        // Snapshot the list so observers may (un)register while being notified
        let observers: Vec<SharedObserver> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer.on_snapshot(snapshot);
        }
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Resolve `name`/`arity` against the target, then against the operations
    /// this proxy synthesizes.
    pub fn resolve(&self, name: &str, arity: usize) -> Option<Operation> {
        self.target.resolve(name, arity).or_else(|| {
            self.synthesized
                .iter()
                .find(|op| op.matches(name, arity))
                .cloned()
        })
    }

    pub fn responds_to(&self, name: &str, arity: usize) -> bool {
        self.resolve(name, arity).is_some()
    }

    /// The target's operations followed by synthesized ones it lacks.
    pub fn operations(&self) -> Vec<Operation> {
        let mut operations = self.target.operations();
        for op in &self.synthesized {
            if !operations.iter().any(|known| known.matches(&op.name, op.arity())) {
                operations.push(op.clone());
            }
        }
        operations
    }

    // ------------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------------

    /// Invoke `name` with boxed arguments through this proxy.
    ///
    /// With no handler, and for handlers that never touch the record, the
    /// result is exactly what calling the target directly would produce.
    /// Target failures are returned unchanged as [`InvokeError::Target`];
    /// misuse of the interception protocol surfaces as [`InvokeError::Proxy`].
    pub fn invoke(&self, name: &str, arguments: Vec<Value>) -> Result<Value, InvokeError> {
        let arity = arguments.len();
        let Some(operation) = self.resolve(name, arity) else {
            tracing::warn!(
                proxy = %self.label,
                receiver = self.target.receiver_name(),
                operation = name,
                arity,
                "unsupported operation"
            );
            return Err(TargetError::unsupported(self.target.receiver_name(), name, arity).into());
        };

        let guard = ReentrancyGuard::enter(self.id, &operation, self.config.reentrancy_limit())
            .map_err(|e| {
                tracing::warn!(proxy = %self.label, operation = %operation, error = %e, "reentrancy limit hit");
                e
            })?;

        let handler = self.current_handler();
        tracing::debug!(
            proxy = %self.label,
            operation = %operation,
            depth = guard.depth(),
            intercepted = handler.is_some(),
            "invoking"
        );

        let mut invocation = Invocation::new(operation, arguments, self.target.as_ref());
        let result = self
            .dispatch(handler.as_deref(), &mut invocation)
            .and_then(|()| {
                invocation.return_value().cloned().ok_or_else(|| {
                    ProxyError::NoReturnValue {
                        operation: invocation.operation().name.clone(),
                    }
                    .into()
                })
            });
        invocation.freeze();
        drop(guard);

        let snapshot = invocation.snapshot(&self.label, result.as_ref().err());
        tracing::debug!(
            proxy = %self.label,
            operation = %snapshot.operation.name,
            forwarded = snapshot.forwarded,
            ok = result.is_ok(),
            "invocation complete"
        );
        self.emit(&snapshot);
        result
    }

    /// Invoke with any arguments convertible into values.
    pub fn invoke_with<I, V>(&self, name: &str, arguments: I) -> Result<Value, InvokeError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.invoke(name, arguments.into_iter().map(Into::into).collect())
    }

    fn dispatch(
        &self,
        handler: Option<&dyn InvocationHandler>,
        invocation: &mut Invocation<'_>,
    ) -> Result<(), InvokeError> {
        let Some(handler) = handler else {
            return invocation.forward().map(|_| ());
        };
        handler.handle(invocation)?;
        if invocation.is_pending() && self.config.forward_policy == ForwardPolicy::Auto {
            tracing::trace!(proxy = %self.label, operation = %invocation.operation().name, "auto-forwarding");
            invocation.forward()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("target", &self.target.receiver_name())
            .field("has_handler", &self.has_handler())
            .field("synthesized", &self.synthesized)
            .field("config", &self.config)
            .finish()
    }
}

fn next_observer_id() -> ObserverId {
    ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for proxies with handlers, observers and settings.
#[derive(Default)]
pub struct ProxyBuilder {
    target: Option<Arc<dyn Invokable>>,
    weak_target: Option<Weak<dyn Invokable>>,
    handler: Option<SharedHandler>,
    observers: Vec<SharedObserver>,
    synthesized: Vec<Operation>,
    config: ProxyConfig,
}

impl ProxyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target<T: Invokable + 'static>(mut self, target: Arc<T>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn shared_target(mut self, target: Arc<dyn Invokable>) -> Self {
        self.target = Some(target);
        self
    }

    /// Proxy a target known only through a weak reference.
    ///
    /// `build` fails with [`ProxyError::InvalidTarget`] if it was released.
    pub fn weak_target<T: Invokable + 'static>(mut self, target: &Weak<T>) -> Self {
        let target: Weak<dyn Invokable> = target.clone();
        self.weak_target = Some(target);
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn interceptor(mut self, handler: impl InvocationHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn observer<F>(self, observer: F) -> Self
    where
        F: Fn(&InvocationSnapshot) + Send + Sync + 'static,
    {
        self.add_observer(observer)
    }

    pub fn add_observer(mut self, observer: impl SnapshotObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Declare an operation the proxy answers even if the target lacks it.
    ///
    /// The handler is expected to answer it; otherwise the forwarded call
    /// fails with the target's own unsupported fault.
    pub fn synthesize(mut self, operation: Operation) -> Self {
        self.synthesized.push(operation);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    pub fn max_reentrancy_depth(mut self, depth: usize) -> Self {
        self.config.max_reentrancy_depth = depth;
        self
    }

    pub fn forward_policy(mut self, policy: ForwardPolicy) -> Self {
        self.config.forward_policy = policy;
        self
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Proxy, ProxyError> {
        let target = match (self.target, self.weak_target) {
            (Some(target), _) => target,
            (None, Some(weak)) => weak.upgrade().ok_or(ProxyError::InvalidTarget)?,
            (None, None) => return Err(ProxyError::InvalidTarget),
        };
        Ok(Proxy::assemble(
            target,
            self.handler,
            self.observers,
            self.synthesized,
            self.config,
        ))
    }
}
