//! Surrogate: transparent runtime proxies
//!
//! A proxy stands in for a target object and forwards every operation invoked
//! on it, while an optional handler may observe, rewrite or short-circuit each
//! call. Cross-cutting behaviour (logging, validation, mocking, access
//! control) can be layered onto any invokable object without touching it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Proxy                   │
//! │                                         │
//! │  resolve    - name/arity -> Operation   │
//! │  handler    - first refusal per call    │
//! │  forward    - one-shot dispatch         │
//! │  observers  - snapshots of every call   │
//! │                                         │
//! ├─────────────────────────────────────────┤
//! │     Target (Invokable / MethodTable)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Calls
//!
//! Arguments and results travel as boxed [`Value`]s. The target decides what
//! it responds to through [`Invokable::resolve`]; an unsupported call fails
//! through the proxy exactly as it would on the target itself. Failures from
//! the target and failures from the proxy machinery are kept apart in
//! [`InvokeError`].

pub mod error;
pub mod handler;
pub mod invocation;
pub mod method_table;
pub mod observer;
pub mod operation;
pub mod proxy;
pub mod target;
pub mod value;

pub use error::{InvokeError, ProxyError};
pub use handler::{HandlerChain, InvocationHandler, Passthrough};
pub use invocation::{Invocation, InvocationSnapshot};
pub use method_table::{MethodTable, Object};
pub use observer::{ObserverId, SnapshotLog, SnapshotObserver, TracingObserver};
pub use operation::{Operation, OperationHash};
pub use proxy::{ForwardPolicy, Proxy, ProxyBuilder, ProxyConfig};
pub use target::{Invokable, TargetError};
pub use value::{ConversionError, FromValue, Typed, Value, ValueType};
