//! Method Tables
//!
//! The usual way to make a Rust value invokable: declare its operations as
//! typed closures over the receiver state, and let the table derive each
//! operation's signature from the closure's types.
//!
//! # Example
//!
//! ```ignore
//! let table = MethodTable::new()
//!     .method("double", |_: &Calc, x: i64| -> i64 { x * 2 })
//!     .method("divide", |_: &Calc, a: i64, b: i64| -> Result<i64, TargetError> {
//!         a.checked_div(b).ok_or_else(|| TargetError::failed("division by zero"))
//!     });
//!
//! let target = Arc::new(Object::new("Calc", Calc, table));
//! assert_eq!(target.call("double", &[Value::S64(5)])?, Value::S64(10));
//! ```

use crate::operation::Operation;
use crate::target::{Invokable, TargetError};
use crate::value::{ConversionError, FromValue, Typed, Value, ValueType};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

// ============================================================================
// Return values
// ============================================================================

/// Marker for methods that cannot fail.
pub struct Plain;

/// Marker for methods returning `Result<_, TargetError>`.
pub struct Fallible;

/// Conversion of a method's Rust return value into a boxed outcome.
pub trait IntoOutcome<M> {
    fn result_type() -> ValueType;
    fn into_outcome(self) -> Result<Value, TargetError>;
}

impl<T: Typed + Into<Value>> IntoOutcome<Plain> for T {
    fn result_type() -> ValueType {
        T::value_type()
    }

    fn into_outcome(self) -> Result<Value, TargetError> {
        Ok(self.into())
    }
}

impl<T: Typed + Into<Value>> IntoOutcome<Fallible> for Result<T, TargetError> {
    fn result_type() -> ValueType {
        T::value_type()
    }

    fn into_outcome(self) -> Result<Value, TargetError> {
        self.map(Into::into)
    }
}

// ============================================================================
// Typed methods
// ============================================================================

/// Closures usable as methods over receiver state `S`.
///
/// Implemented for `Fn(&S, A, ..) -> R` with up to four arguments. `Marker`
/// only disambiguates the impls and is always inferred.
pub trait IntoMethod<S, Marker>: Send + Sync + 'static {
    fn params() -> Vec<ValueType>;
    fn result() -> ValueType;
    fn invoke(&self, state: &S, operation: &str, arguments: &[Value]) -> Result<Value, TargetError>;
}

fn decode<T: FromValue>(operation: &str, index: usize, arguments: &[Value]) -> Result<T, TargetError> {
    let value = arguments.get(index).cloned().ok_or_else(|| TargetError::ArityMismatch {
        operation: operation.to_string(),
        expected: index + 1,
        got: arguments.len(),
    })?;
    T::from_value(value).map_err(|source| TargetError::Argument {
        operation: operation.to_string(),
        index,
        source,
    })
}

macro_rules! impl_into_method {
    ($($arg:ident $idx:tt),*) => {
        impl<S, F, R, M, $($arg,)*> IntoMethod<S, (M, $($arg,)*)> for F
        where
            F: Fn(&S, $($arg),*) -> R + Send + Sync + 'static,
            R: IntoOutcome<M>,
            $($arg: FromValue + Typed,)*
        {
            fn params() -> Vec<ValueType> {
                vec![$($arg::value_type()),*]
            }

            fn result() -> ValueType {
                R::result_type()
            }

            #[allow(unused_variables)]
            fn invoke(&self, state: &S, operation: &str, arguments: &[Value]) -> Result<Value, TargetError> {
                (self)(state, $(decode::<$arg>(operation, $idx, arguments)?),*).into_outcome()
            }
        }
    };
}

impl_into_method!();
impl_into_method!(A 0);
impl_into_method!(A 0, B 1);
impl_into_method!(A 0, B 1, C 2);
impl_into_method!(A 0, B 1, C 2, D 3);

// ============================================================================
// Method table
// ============================================================================

type MethodFn<S> = Arc<dyn Fn(&S, &Operation, &[Value]) -> Result<Value, TargetError> + Send + Sync>;

struct Method<S> {
    operation: Operation,
    func: MethodFn<S>,
}

/// An ordered table of operations over receiver state `S`, keyed by name and
/// arity.
pub struct MethodTable<S> {
    methods: Vec<Method<S>>,
    _state: PhantomData<fn(&S)>,
}

impl<S: 'static> MethodTable<S> {
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Declare and implement a typed method.
    ///
    /// The signature is extracted from the closure's types. Registering the
    /// same name and arity again replaces the earlier method.
    pub fn method<F, Marker>(self, name: &str, f: F) -> Self
    where
        F: IntoMethod<S, Marker>,
    {
        let operation = Operation::new(name, F::params(), F::result());
        self.insert(Method {
            operation,
            func: Arc::new(move |state: &S, operation: &Operation, arguments: &[Value]| {
                f.invoke(state, &operation.name, arguments)
            }),
        })
    }

    /// Declare a method over boxed arguments.
    ///
    /// Arguments are checked against `params` before `f` runs; use
    /// [`ValueType::Any`] for slots that accept anything.
    pub fn raw_method<F>(self, name: &str, params: Vec<ValueType>, result: ValueType, f: F) -> Self
    where
        F: Fn(&S, &[Value]) -> Result<Value, TargetError> + Send + Sync + 'static,
    {
        let operation = Operation::new(name, params, result);
        self.insert(Method {
            operation,
            func: Arc::new(move |state: &S, operation: &Operation, arguments: &[Value]| {
                if let Err(index) = operation.accepts(arguments) {
                    return Err(match (operation.params.get(index), arguments.get(index)) {
                        (Some(expected), Some(got)) => TargetError::Argument {
                            operation: operation.name.clone(),
                            index,
                            source: ConversionError::TypeMismatch {
                                expected: expected.to_string(),
                                got: format!("{:?}", got),
                            },
                        },
                        _ => TargetError::ArityMismatch {
                            operation: operation.name.clone(),
                            expected: operation.arity(),
                            got: arguments.len(),
                        },
                    });
                }
                f(state, arguments)
            }),
        })
    }

    fn insert(mut self, method: Method<S>) -> Self {
        let existing = self
            .methods
            .iter()
            .position(|m| m.operation.matches(&method.operation.name, method.operation.arity()));
        match existing {
            Some(index) => self.methods[index] = method,
            None => self.methods.push(method),
        }
        self
    }

    /// Find the operation addressed by `name` and `arity`.
    pub fn lookup(&self, name: &str, arity: usize) -> Option<&Operation> {
        self.find(name, arity).map(|m| &m.operation)
    }

    fn find(&self, name: &str, arity: usize) -> Option<&Method<S>> {
        self.methods.iter().find(|m| m.operation.matches(name, arity))
    }

    /// All declared operations, in declaration order.
    pub fn signatures(&self) -> Vec<Operation> {
        self.methods.iter().map(|m| m.operation.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl<S: 'static> Default for MethodTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for MethodTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.methods.iter().map(|m| m.operation.to_string()))
            .finish()
    }
}

// ============================================================================
// Object
// ============================================================================

/// A named receiver: state plus the table of operations it answers.
pub struct Object<S> {
    name: String,
    state: S,
    table: Arc<MethodTable<S>>,
}

impl<S: 'static> Object<S> {
    pub fn new(name: impl Into<String>, state: S, table: impl Into<Arc<MethodTable<S>>>) -> Self {
        Self {
            name: name.into(),
            state,
            table: table.into(),
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn table(&self) -> &Arc<MethodTable<S>> {
        &self.table
    }
}

impl<S: Send + Sync + 'static> Invokable for Object<S> {
    fn receiver_name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, name: &str, arity: usize) -> Option<Operation> {
        self.table.lookup(name, arity).cloned()
    }

    fn perform(&self, operation: &Operation, arguments: &[Value]) -> Result<Value, TargetError> {
        let method = self
            .table
            .find(&operation.name, operation.arity())
            .ok_or_else(|| TargetError::unsupported(&self.name, &operation.name, operation.arity()))?;
        if arguments.len() != method.operation.arity() {
            return Err(TargetError::ArityMismatch {
                operation: operation.name.clone(),
                expected: method.operation.arity(),
                got: arguments.len(),
            });
        }
        (method.func)(&self.state, &method.operation, arguments)
    }

    fn operations(&self) -> Vec<Operation> {
        self.table.signatures()
    }
}

impl<S> fmt::Debug for Object<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("name", &self.name)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
