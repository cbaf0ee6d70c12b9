//! Operation identifiers
//!
//! An [`Operation`] names a capability of a receiver together with its
//! signature. Its [`OperationHash`] is a content-addressed fingerprint of the
//! name and the structural shape of every parameter and the result, so two
//! overloads of the same name never collide.

use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// Operation Hashes
// ============================================================================

/// A 256-bit fingerprint of an operation signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationHash([u8; 32]);

impl OperationHash {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Format as hex string (for display).
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Format as short hex (first 8 chars).
    pub fn to_short_hex(&self) -> String {
        self.0.iter().take(4).map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for OperationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_short_hex())
    }
}

const TAG_BOOL: u8 = 0x01;
const TAG_U8: u8 = 0x02;
const TAG_U16: u8 = 0x03;
const TAG_U32: u8 = 0x04;
const TAG_U64: u8 = 0x05;
const TAG_S8: u8 = 0x06;
const TAG_S16: u8 = 0x07;
const TAG_S32: u8 = 0x08;
const TAG_S64: u8 = 0x09;
const TAG_F32: u8 = 0x0a;
const TAG_F64: u8 = 0x0b;
const TAG_CHAR: u8 = 0x0c;
const TAG_STRING: u8 = 0x0d;
const TAG_FLAGS: u8 = 0x0e;
const TAG_ANY: u8 = 0x0f;
const TAG_LIST: u8 = 0x10;
const TAG_OPTION: u8 = 0x11;
const TAG_TUPLE: u8 = 0x13;
const TAG_RECORD: u8 = 0x14;
const TAG_OPERATION: u8 = 0x16;

/// Builder for structural hashes.
struct SignatureHasher {
    hasher: Sha256,
}

impl SignatureHasher {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    fn tag(mut self, tag: u8) -> Self {
        self.hasher.update([tag]);
        self
    }

    fn string(mut self, s: &str) -> Self {
        self.hasher.update((s.len() as u32).to_le_bytes());
        self.hasher.update(s.as_bytes());
        self
    }

    fn count(mut self, n: usize) -> Self {
        self.hasher.update((n as u32).to_le_bytes());
        self
    }

    fn ty(self, ty: &ValueType) -> Self {
        match ty {
            ValueType::Bool => self.tag(TAG_BOOL),
            ValueType::U8 => self.tag(TAG_U8),
            ValueType::U16 => self.tag(TAG_U16),
            ValueType::U32 => self.tag(TAG_U32),
            ValueType::U64 => self.tag(TAG_U64),
            ValueType::S8 => self.tag(TAG_S8),
            ValueType::S16 => self.tag(TAG_S16),
            ValueType::S32 => self.tag(TAG_S32),
            ValueType::S64 => self.tag(TAG_S64),
            ValueType::F32 => self.tag(TAG_F32),
            ValueType::F64 => self.tag(TAG_F64),
            ValueType::Char => self.tag(TAG_CHAR),
            ValueType::String => self.tag(TAG_STRING),
            ValueType::Flags => self.tag(TAG_FLAGS),
            ValueType::Any => self.tag(TAG_ANY),
            ValueType::List(inner) => self.tag(TAG_LIST).ty(inner),
            ValueType::Option(inner) => self.tag(TAG_OPTION).ty(inner),
            ValueType::Record(name) => self.tag(TAG_RECORD).string(name),
            ValueType::Tuple(items) => items
                .iter()
                .fold(self.tag(TAG_TUPLE).count(items.len()), |h, item| h.ty(item)),
        }
    }

    fn finish(self) -> OperationHash {
        let result = self.hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        OperationHash(bytes)
    }
}

// ============================================================================
// Operation
// ============================================================================

/// Stable identifier of an invokable capability: name plus signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub params: Vec<ValueType>,
    pub result: ValueType,
}

impl Operation {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, result: ValueType) -> Self {
        Self {
            name: name.into(),
            params,
            result,
        }
    }

    /// An operation whose parameters and result are all dynamically typed.
    pub fn dynamic(name: impl Into<String>, arity: usize) -> Self {
        Self::new(name, vec![ValueType::Any; arity], ValueType::Any)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether `name`/`arity` address this operation.
    pub fn matches(&self, name: &str, arity: usize) -> bool {
        self.name == name && self.params.len() == arity
    }

    /// Check that `arguments` fit this signature.
    ///
    /// Returns the index of the first offending argument, or the arity when
    /// the count is wrong.
    pub fn accepts(&self, arguments: &[Value]) -> Result<(), usize> {
        if arguments.len() != self.params.len() {
            return Err(self.params.len());
        }
        match self
            .params
            .iter()
            .zip(arguments)
            .position(|(ty, value)| !ty.admits(value))
        {
            Some(index) => Err(index),
            None => Ok(()),
        }
    }

    /// Compute the fingerprint of this operation.
    pub fn fingerprint(&self) -> OperationHash {
        let hasher = SignatureHasher::new()
            .tag(TAG_OPERATION)
            .string(&self.name)
            .count(self.params.len());
        self.params
            .iter()
            .fold(hasher, |h, param| h.ty(param))
            .ty(&self.result)
            .finish()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Operation::new("double", vec![ValueType::S64], ValueType::S64);
        let b = Operation::new("double", vec![ValueType::S64], ValueType::S64);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_on_signature() {
        let a = Operation::new("double", vec![ValueType::S64], ValueType::S64);
        let b = Operation::new("double", vec![ValueType::S32], ValueType::S32);
        let c = Operation::new("double", vec![ValueType::S64, ValueType::S64], ValueType::S64);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_on_nesting() {
        // list<tuple<s64>> vs tuple<list<s64>>
        let a = Operation::new(
            "f",
            vec![ValueType::List(Box::new(ValueType::Tuple(vec![ValueType::S64])))],
            ValueType::unit(),
        );
        let b = Operation::new(
            "f",
            vec![ValueType::Tuple(vec![ValueType::List(Box::new(ValueType::S64))])],
            ValueType::unit(),
        );
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_accepts() {
        let op = Operation::new("add", vec![ValueType::S64, ValueType::Any], ValueType::S64);
        assert_eq!(op.accepts(&[Value::S64(1), Value::Bool(true)]), Ok(()));
        assert_eq!(op.accepts(&[Value::S32(1), Value::S64(2)]), Err(0));
        assert_eq!(op.accepts(&[Value::S64(1)]), Err(2));
    }

    #[test]
    fn test_display() {
        let op = Operation::new("add", vec![ValueType::S64, ValueType::S64], ValueType::S64);
        assert_eq!(op.to_string(), "add(s64, s64) -> s64");
        assert_eq!(op.fingerprint().to_short_hex().len(), 8);
    }
}
