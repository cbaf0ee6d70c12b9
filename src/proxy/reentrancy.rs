//! Per-thread recursion guard
//!
//! Calls are synchronous, so nesting can only happen on the calling thread.
//! Each thread keeps a depth counter per (proxy, operation fingerprint).

use crate::error::ProxyError;
use crate::operation::{Operation, OperationHash};
use std::cell::RefCell;
use std::collections::HashMap;

type GuardKey = (u64, OperationHash);

thread_local! {
    static ACTIVE: RefCell<HashMap<GuardKey, usize>> = RefCell::new(HashMap::new());
}

/// Marks one in-flight call; the depth is released on drop.
#[derive(Debug)]
pub(crate) struct ReentrancyGuard {
    key: GuardKey,
    depth: usize,
}

impl ReentrancyGuard {
    pub(crate) fn enter(proxy: u64, operation: &Operation, limit: usize) -> Result<Self, ProxyError> {
        let key = (proxy, operation.fingerprint());
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            let depth = active.get(&key).copied().unwrap_or(0) + 1;
            if depth > limit {
                return Err(ProxyError::HandlerReentrancy {
                    operation: operation.name.clone(),
                    depth,
                    limit,
                });
            }
            active.insert(key, depth);
            Ok(Self { key, depth })
        })
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        // try_with: the thread-local may already be gone during thread teardown
        let _ = ACTIVE.try_with(|active| {
            let mut active = active.borrow_mut();
            if let Some(depth) = active.get_mut(&self.key) {
                *depth -= 1;
                if *depth == 0 {
                    active.remove(&self.key);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn op(name: &str) -> Operation {
        Operation::new(name, vec![ValueType::S64], ValueType::S64)
    }

    #[test]
    fn test_nested_depth_limit() {
        let double = op("double");
        let outer = ReentrancyGuard::enter(7, &double, 2).unwrap();
        let inner = ReentrancyGuard::enter(7, &double, 2).unwrap();
        assert_eq!(inner.depth(), 2);

        let err = ReentrancyGuard::enter(7, &double, 2).unwrap_err();
        assert_eq!(
            err,
            ProxyError::HandlerReentrancy {
                operation: "double".into(),
                depth: 3,
                limit: 2
            }
        );
        drop(inner);
        drop(outer);
        assert_eq!(ReentrancyGuard::enter(7, &double, 1).unwrap().depth(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let _a = ReentrancyGuard::enter(1, &op("double"), 1).unwrap();
        let _b = ReentrancyGuard::enter(1, &op("negate"), 1).unwrap();
        let _c = ReentrancyGuard::enter(2, &op("double"), 1).unwrap();
    }

    #[test]
    fn test_threads_are_independent() {
        let double = op("double");
        let _held = ReentrancyGuard::enter(3, &double, 1).unwrap();
        let other = std::thread::spawn(move || ReentrancyGuard::enter(3, &double, 1).map(|g| g.depth()))
            .join()
            .unwrap();
        assert_eq!(other, Ok(1));
    }
}
