//! Integration tests for the handler recursion guard

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use surrogate::{Invocation, InvokeError, MethodTable, Object, Proxy, ProxyError, Value};

fn doubler() -> Arc<Object<()>> {
    let table = MethodTable::new()
        .method("double", |_: &(), x: i64| -> i64 { x * 2 })
        .method("negate", |_: &(), x: i64| -> i64 { -x });
    Arc::new(Object::new("Doubler", (), table))
}

/// Install a handler that calls the same operation back through the proxy.
fn recursing_proxy(max_depth: usize, entered: Arc<AtomicUsize>) -> Arc<Proxy> {
    let proxy = Arc::new(
        Proxy::builder()
            .target(doubler())
            .max_reentrancy_depth(max_depth)
            .build()
            .expect("build"),
    );
    let weak: Weak<Proxy> = Arc::downgrade(&proxy);
    proxy.set_handler(move |inv: &mut Invocation<'_>| {
        entered.fetch_add(1, Ordering::SeqCst);
        if let Some(proxy) = weak.upgrade() {
            let inner = proxy.invoke(&inv.operation().name, inv.arguments().to_vec())?;
            inv.set_return_value(inner)?;
        }
        Ok(())
    });
    proxy
}

#[test]
fn test_recursive_handler_rejected_by_default() {
    let entered = Arc::new(AtomicUsize::new(0));
    let proxy = recursing_proxy(1, entered.clone());

    let err = proxy.invoke_with("double", [5i64]).unwrap_err();
    assert_eq!(
        err,
        InvokeError::Proxy(ProxyError::HandlerReentrancy {
            operation: "double".into(),
            depth: 2,
            limit: 1,
        })
    );
    assert_eq!(entered.load(Ordering::SeqCst), 1);
}

#[test]
fn test_configured_depth_bounds_recursion() {
    let entered = Arc::new(AtomicUsize::new(0));
    let proxy = recursing_proxy(3, entered.clone());

    let err = proxy.invoke_with("double", [5i64]).unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Proxy(ProxyError::HandlerReentrancy { depth: 4, limit: 3, .. })
    ));
    assert_eq!(entered.load(Ordering::SeqCst), 3);
}

#[test]
fn test_guard_released_after_failure() {
    let entered = Arc::new(AtomicUsize::new(0));
    let proxy = recursing_proxy(1, entered.clone());

    assert!(proxy.invoke_with("double", [1i64]).is_err());
    proxy.clear_handler();
    assert_eq!(proxy.invoke_with("double", [1i64]), Ok(Value::S64(2)));
}

#[test]
fn test_other_operation_may_nest() {
    let proxy = Arc::new(Proxy::new(doubler()));
    let weak = Arc::downgrade(&proxy);
    proxy.set_handler(move |inv: &mut Invocation<'_>| {
        if inv.operation().name == "double" {
            if let Some(proxy) = weak.upgrade() {
                let negated = proxy.invoke("negate", inv.arguments().to_vec())?;
                inv.set_argument(0, negated)?;
            }
        }
        Ok(())
    });

    assert_eq!(proxy.invoke_with("double", [5i64]), Ok(Value::S64(-10)));
}

#[test]
fn test_separate_proxies_do_not_share_depth() {
    let target = doubler();
    let inner = Arc::new(Proxy::new(target.clone()));
    let outer = Proxy::with_handler(target, move |inv: &mut Invocation<'_>| {
        let value = inner.invoke(&inv.operation().name, inv.arguments().to_vec())?;
        inv.set_return_value(value)?;
        Ok(())
    });

    assert_eq!(outer.invoke_with("double", [3i64]), Ok(Value::S64(6)));
}
