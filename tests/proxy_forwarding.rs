//! Integration tests for transparent forwarding through a proxy

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use surrogate::{
    Invocation, Invokable, InvokeError, MethodTable, Object, Proxy, TargetError, Value,
};

/// Target that doubles numbers and counts how often it ran
struct Doubler {
    calls: AtomicUsize,
}

impl Doubler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn doubler() -> Arc<Object<Doubler>> {
    let table = MethodTable::new()
        .method("double", |d: &Doubler, x: i64| -> i64 {
            d.calls.fetch_add(1, Ordering::SeqCst);
            x * 2
        })
        .method("divide", |_: &Doubler, a: i64, b: i64| -> Result<i64, TargetError> {
            a.checked_div(b)
                .ok_or_else(|| TargetError::failed("division by zero"))
        });
    Arc::new(Object::new(
        "Doubler",
        Doubler {
            calls: AtomicUsize::new(0),
        },
        table,
    ))
}

#[test]
fn test_no_handler_forwards() {
    let target = doubler();
    let proxy = Proxy::new(target.clone());

    let result = proxy.invoke("double", vec![Value::S64(5)]).expect("invoke");
    assert_eq!(result, Value::S64(10));
    assert_eq!(target.state().calls(), 1);
}

#[test]
fn test_handler_rewrites_arguments() {
    let target = doubler();
    let proxy = Proxy::with_handler(target.clone(), |inv: &mut Invocation<'_>| {
        let x = inv.arguments()[0].as_i64().unwrap_or_default();
        inv.set_argument(0, x * 2)?;
        Ok(())
    });

    assert_eq!(proxy.invoke_with("double", [5i64]), Ok(Value::S64(20)));
    assert_eq!(target.state().calls(), 1);
}

#[test]
fn test_handler_answers_without_target() {
    let target = doubler();
    let proxy = Proxy::with_handler(target.clone(), |inv: &mut Invocation<'_>| {
        inv.set_return_value(999i64)?;
        Ok(())
    });

    assert_eq!(proxy.invoke_with("double", [5i64]), Ok(Value::S64(999)));
    assert_eq!(target.state().calls(), 0, "target must not run");
}

#[test]
fn test_handler_sees_forwarded_result() {
    let target = doubler();
    let proxy = Proxy::with_handler(target.clone(), |inv: &mut Invocation<'_>| {
        let doubled = inv.forward()?.as_i64().unwrap_or_default();
        assert_eq!(doubled, 10);
        Ok(())
    });

    assert_eq!(proxy.invoke_with("double", [5i64]), Ok(Value::S64(10)));
    assert_eq!(target.state().calls(), 1);
}

#[test]
fn test_unsupported_without_handler() {
    let target = doubler();
    let proxy = Proxy::new(target.clone());

    let err = proxy.invoke_with("triple", [5i64]).unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(
        err,
        InvokeError::Target(TargetError::UnsupportedOperation {
            receiver: "Doubler".into(),
            operation: "triple".into(),
            arity: 1,
        })
    );
}

#[test]
fn test_unsupported_never_reaches_handler() {
    let seen = Arc::new(AtomicUsize::new(0));
    let handler_seen = seen.clone();
    let proxy = Proxy::with_handler(doubler(), move |_inv: &mut Invocation<'_>| {
        handler_seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = proxy.invoke_with("triple", [5i64]).unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unsupported_matches_direct_call() {
    let target = doubler();
    let proxy = Proxy::new(target.clone());

    let direct = target.call("triple", &[Value::S64(5)]).unwrap_err();
    let proxied = proxy.invoke("triple", vec![Value::S64(5)]).unwrap_err();
    assert_eq!(proxied, InvokeError::Target(direct.clone()));
    assert_eq!(proxied.to_string(), direct.to_string());
}

#[test]
fn test_wrong_arity_is_unsupported() {
    let proxy = Proxy::new(doubler());
    let err = proxy.invoke_with("double", [1i64, 2]).unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn test_target_failure_relayed_unchanged() {
    let target = doubler();
    let proxy = Proxy::new(target.clone());

    let direct = target.call("divide", &[Value::S64(1), Value::S64(0)]).unwrap_err();
    let proxied = proxy.invoke_with("divide", [1i64, 0]).unwrap_err();
    assert_eq!(proxied, InvokeError::Target(direct));
    assert_eq!(proxied.to_string(), "division by zero");
}

#[test]
fn test_target_failure_relayed_through_handler() {
    let proxy = Proxy::with_handler(doubler(), |inv: &mut Invocation<'_>| {
        inv.forward()?;
        Ok(())
    });

    let err = proxy.invoke_with("divide", [1i64, 0]).unwrap_err();
    assert_eq!(err, InvokeError::Target(TargetError::failed("division by zero")));
}

#[test]
fn test_argument_type_error_from_target() {
    let proxy = Proxy::new(doubler());
    let err = proxy.invoke("double", vec![Value::String("five".into())]).unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Target(TargetError::Argument { index: 0, .. })
    ));
}

#[test]
fn test_target_accessor_is_same_object() {
    let target = doubler();
    let proxy = Proxy::new(target.clone());

    assert_eq!(proxy.target().receiver_name(), "Doubler");
    proxy.target().call("double", &[Value::S64(1)]).expect("direct call");
    assert_eq!(target.state().calls(), 1);
}

#[test]
fn test_proxy_reports_target_operations() {
    let proxy = Proxy::new(doubler());
    assert!(proxy.responds_to("double", 1));
    assert!(!proxy.responds_to("triple", 1));

    let names: Vec<_> = proxy.operations().into_iter().map(|op| op.name).collect();
    assert_eq!(names, vec!["double", "divide"]);
}
