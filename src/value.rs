//! Boxed values
//!
//! Every argument and return value that crosses a proxy is carried as a
//! [`Value`]. Operations describe their parameters with [`ValueType`], and the
//! [`Typed`] / [`FromValue`] traits map Rust types in and out of the boxed form.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Runtime type descriptor for values and operation signatures
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    Char,
    String,
    List(Box<ValueType>),
    Option(Box<ValueType>),
    Record(String), // type name
    Tuple(Vec<ValueType>),
    Flags,
    /// Dynamically typed slot: accepts any value
    Any,
}

impl ValueType {
    /// The unit type (empty tuple).
    pub fn unit() -> Self {
        ValueType::Tuple(Vec::new())
    }

    /// Check whether `value` is acceptable where this type is expected.
    ///
    /// `Any` matches at any depth, so `list<any>` admits a `list<s64>`.
    pub fn admits(&self, value: &Value) -> bool {
        self.admits_type(&value.value_type())
    }

    fn admits_type(&self, actual: &ValueType) -> bool {
        match (self, actual) {
            (ValueType::Any, _) => true,
            (ValueType::List(expected), ValueType::List(actual))
            | (ValueType::Option(expected), ValueType::Option(actual)) => expected.admits_type(actual),
            (ValueType::Tuple(expected), ValueType::Tuple(actual)) => {
                expected.len() == actual.len()
                    && expected.iter().zip(actual).all(|(e, a)| e.admits_type(a))
            }
            (expected, actual) => expected == actual,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::U8 => write!(f, "u8"),
            ValueType::U16 => write!(f, "u16"),
            ValueType::U32 => write!(f, "u32"),
            ValueType::U64 => write!(f, "u64"),
            ValueType::S8 => write!(f, "s8"),
            ValueType::S16 => write!(f, "s16"),
            ValueType::S32 => write!(f, "s32"),
            ValueType::S64 => write!(f, "s64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
            ValueType::Char => write!(f, "char"),
            ValueType::String => write!(f, "string"),
            ValueType::List(inner) => write!(f, "list<{}>", inner),
            ValueType::Option(inner) => write!(f, "option<{}>", inner),
            ValueType::Record(name) => write!(f, "{}", name),
            ValueType::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            ValueType::Flags => write!(f, "flags"),
            ValueType::Any => write!(f, "any"),
        }
    }
}

/// A boxed value passed to, or returned from, a proxied operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    // Primitives
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),

    // Compound types WITH type info
    List { elem_type: ValueType, items: Vec<Value> },
    Option { inner_type: ValueType, value: Option<Box<Value>> },
    Record { type_name: String, fields: Vec<(String, Value)> },

    // Positional, no type info needed
    Tuple(Vec<Value>),
    Flags(u64),
}

impl Value {
    /// The unit value, returned by operations that produce nothing.
    pub fn unit() -> Self {
        Value::Tuple(Vec::new())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Tuple(items) if items.is_empty())
    }

    /// Infer the ValueType from this Value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::U64(_) => ValueType::U64,
            Value::S8(_) => ValueType::S8,
            Value::S16(_) => ValueType::S16,
            Value::S32(_) => ValueType::S32,
            Value::S64(_) => ValueType::S64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::Char(_) => ValueType::Char,
            Value::String(_) => ValueType::String,
            Value::List { elem_type, .. } => ValueType::List(Box::new(elem_type.clone())),
            Value::Option { inner_type, .. } => ValueType::Option(Box::new(inner_type.clone())),
            Value::Record { type_name, .. } => ValueType::Record(type_name.clone()),
            Value::Tuple(items) => ValueType::Tuple(items.iter().map(|v| v.value_type()).collect()),
            Value::Flags(_) => ValueType::Flags,
        }
    }

    /// Widen any integer value to i64, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U8(x) => Some(x as i64),
            Value::U16(x) => Some(x as i64),
            Value::U32(x) => Some(x as i64),
            Value::U64(x) => i64::try_from(x).ok(),
            Value::S8(x) => Some(x as i64),
            Value::S16(x) => Some(x as i64),
            Value::S32(x) => Some(x as i64),
            Value::S64(x) => Some(x),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::S8(v) => write!(f, "{}", v),
            Value::S16(v) => write!(f, "{}", v),
            Value::S32(v) => write!(f, "{}", v),
            Value::S64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{:?}", v),
            Value::String(v) => write!(f, "{:?}", v),
            Value::List { items, .. } => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Value::Option { value: None, .. } => write!(f, "none"),
            Value::Option { value: Some(inner), .. } => write!(f, "some({})", inner),
            Value::Record { type_name, fields } => {
                write!(f, "{} {{", type_name)?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", name, value)?;
                }
                write!(f, " }}")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                write!(f, ")")
            }
            Value::Flags(bits) => write!(f, "flags({:#x})", bits),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

// ============================================================================
// Conversion errors
// ============================================================================

/// Failure to convert a boxed [`Value`] into a Rust type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("expected list, got {0}")]
    ExpectedList(String),

    #[error("expected option, got {0}")]
    ExpectedOption(String),

    #[error("expected unit, got {0}")]
    ExpectedUnit(String),

    #[error("at index {0}: {1}")]
    IndexError(usize, Box<ConversionError>),
}

// ============================================================================
// Typed - static ValueType of a Rust type
// ============================================================================

/// Trait for types that can provide their ValueType at compile time.
///
/// Method tables use this to derive operation signatures from closure types.
pub trait Typed {
    fn value_type() -> ValueType;
}

macro_rules! primitive_value {
    ($($ty:ty => $variant:ident, $name:literal;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl Typed for $ty {
                fn value_type() -> ValueType {
                    ValueType::$variant
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = ConversionError;
                fn try_from(v: Value) -> Result<Self, Self::Error> {
                    match v {
                        Value::$variant(x) => Ok(x),
                        other => Err(ConversionError::TypeMismatch {
                            expected: String::from($name),
                            got: format!("{:?}", other),
                        }),
                    }
                }
            }

            impl FromValue for $ty {
                fn from_value(v: Value) -> Result<Self, ConversionError> {
                    <$ty>::try_from(v)
                }
            }
        )*
    };
}

primitive_value! {
    bool => Bool, "bool";
    u8 => U8, "u8";
    u16 => U16, "u16";
    u32 => U32, "u32";
    u64 => U64, "u64";
    i8 => S8, "s8";
    i16 => S16, "s16";
    i32 => S32, "s32";
    i64 => S64, "s64";
    f32 => F32, "f32";
    f64 => F64, "f64";
    char => Char, "char";
    String => String, "string";
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(String::from(v))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::unit()
    }
}

impl Typed for () {
    fn value_type() -> ValueType {
        ValueType::unit()
    }
}

impl TryFrom<Value> for () {
    type Error = ConversionError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Tuple(items) if items.is_empty() => Ok(()),
            other => Err(ConversionError::ExpectedUnit(format!("{:?}", other))),
        }
    }
}

impl<T: Typed + Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List {
            elem_type: T::value_type(),
            items: v.into_iter().map(Into::into).collect(),
        }
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::List(Box::new(T::value_type()))
    }
}

impl<T: Typed + Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        Value::Option {
            inner_type: T::value_type(),
            value: v.map(|x| Box::new(x.into())),
        }
    }
}

impl<T: Typed> Typed for Option<T> {
    fn value_type() -> ValueType {
        ValueType::Option(Box::new(T::value_type()))
    }
}

// Value itself is dynamically typed
impl Typed for Value {
    fn value_type() -> ValueType {
        ValueType::Any
    }
}

// ============================================================================
// FromValue trait
// ============================================================================

/// Trait for converting from a Value.
///
/// Exists alongside `TryFrom<Value>` because of the blanket
/// `impl<T, U> TryFrom<U> for T where U: Into<T>`, which blocks a direct
/// `TryFrom<Value>` for `Option<T>` and for `Value` itself.
pub trait FromValue: Sized {
    fn from_value(v: Value) -> Result<Self, ConversionError>;
}

impl FromValue for () {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        <()>::try_from(v)
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        match v {
            Value::List { items, .. } => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    T::from_value(item).map_err(|e| ConversionError::IndexError(i, Box::new(e)))
                })
                .collect(),
            other => Err(ConversionError::ExpectedList(format!("{:?}", other))),
        }
    }
}

impl FromValue for Value {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        Ok(v)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        match v {
            Value::Option { value: None, .. } => Ok(None),
            Value::Option { value: Some(inner), .. } => Ok(Some(T::from_value(*inner)?)),
            other => Err(ConversionError::ExpectedOption(format!("{:?}", other))),
        }
    }
}
