//! Integration tests for dynamic member access and overload resolution

mod common;

use tether_bridge::{AnyValue, BridgeError, DynamicObject};
use tether_host::{ClassBuilder, ForeignValue, Host, ObjRef};
use tether_sdk::reflect::{ParamDesc, TypeDesc};
use tether_sdk::{names, ForeignContext};

use common::{host, int_of, str_of};

const CALC: &str = "test/Calc";

fn text(host: &Host, value: &str) -> ForeignValue {
    ForeignValue::Object(host.string(value))
}

fn receiver(this: Option<ObjRef>) -> ObjRef {
    this.expect("instance function without receiver")
}

/// A class exercising every member shape the resolver handles
fn define_calc(host: &Host) {
    let string = || TypeDesc::object(names::STRING);
    host.define_class(
        ClassBuilder::new(CALC)
            .property("total", TypeDesc::Int, true)
            .field("secret", "Llang/String;")
            .reflective_constructor(
                vec![ParamDesc::optional("start", TypeDesc::Int)],
                |host, this, args| {
                    host.set_field_named(receiver(this), "total", args[0])?;
                    Ok(ForeignValue::Null)
                },
            )
            .function(
                "add",
                vec![ParamDesc::value("x", TypeDesc::Int)],
                TypeDesc::Int,
                |host, this, args| {
                    let this = receiver(this);
                    let total = int_of(host, host.field_named(this, "total")?).unwrap_or(0);
                    let sum = total + int_of(host, args[0]).unwrap_or(0);
                    host.set_field_named(this, "total", ForeignValue::Int(sum))?;
                    Ok(ForeignValue::Int(sum))
                },
            )
            .function(
                "add",
                vec![ParamDesc::value("a", TypeDesc::Int), ParamDesc::value("b", TypeDesc::Int)],
                TypeDesc::Int,
                |host, _, args| {
                    let a = int_of(host, args[0]).unwrap_or(0);
                    let b = int_of(host, args[1]).unwrap_or(0);
                    Ok(ForeignValue::Int(a + b))
                },
            )
            .function("kind", vec![ParamDesc::value("v", TypeDesc::Int)], string(), |host, _, _| {
                Ok(text(host, "int"))
            })
            .function("kind", vec![ParamDesc::value("v", TypeDesc::Long)], string(), |host, _, _| {
                Ok(text(host, "long"))
            })
            .function(
                "kind",
                vec![ParamDesc::value("v", TypeDesc::object(names::OBJECT))],
                string(),
                |host, _, _| Ok(text(host, "object")),
            )
            .function("kind", vec![ParamDesc::value("v", string())], string(), |host, _, _| {
                Ok(text(host, "string"))
            })
            .function(
                "label",
                vec![ParamDesc::value("v", TypeDesc::nullable(names::STRING))],
                string(),
                |host, _, args| match args[0] {
                    ForeignValue::Null => Ok(text(host, "none")),
                    value => Ok(value),
                },
            )
            .function(
                "greet",
                vec![
                    ParamDesc::value("name", string()),
                    ParamDesc::optional("greeting", TypeDesc::nullable(names::STRING)),
                ],
                string(),
                |host, _, args| {
                    let name = str_of(host, args[0]).unwrap_or_default();
                    let greeting = str_of(host, args[1]).unwrap_or_else(|| "Hello".to_string());
                    Ok(text(host, &format!("{}, {}", greeting, name)))
                },
            )
            .function(
                "join",
                vec![ParamDesc::value("sep", string()), ParamDesc::vararg("parts", string())],
                string(),
                |host, _, args| {
                    let sep = str_of(host, args[0]).unwrap_or_default();
                    let parts = args[1]
                        .as_object()
                        .and_then(|list| host.list_items(list))
                        .unwrap_or_default();
                    let parts: Vec<String> = parts.into_iter().filter_map(|p| str_of(host, p)).collect();
                    Ok(text(host, &parts.join(&sep)))
                },
            )
            .function("getSecret", Vec::new(), string(), |host, this, _| {
                host.field_named(receiver(this), "secret")
            })
            .function(
                "setSecret",
                vec![ParamDesc::value("value", string())],
                TypeDesc::Void,
                |host, this, args| {
                    host.set_field_named(receiver(this), "secret", args[0])?;
                    Ok(ForeignValue::Null)
                },
            )
            .static_function(
                "twice",
                vec![ParamDesc::value("x", TypeDesc::Int)],
                TypeDesc::Int,
                |host, _, args| Ok(ForeignValue::Int(int_of(host, args[0]).unwrap_or(0) * 2)),
            ),
    )
    .unwrap();
}

fn calc(host: &Host, start: i32) -> DynamicObject {
    define_calc(host);
    let ctx: &dyn ForeignContext = host;
    DynamicObject::new_instance(ctx, CALC, vec![AnyValue::Int(start)]).unwrap()
}

#[test]
fn test_construct_and_read_property() {
    let host = host();
    let calc = calc(&host, 5);
    assert_eq!(calc.class_name(), CALC);
    assert_eq!(calc.get_int("total").unwrap(), 5);
}

#[test]
fn test_constructor_optional_and_keyword() {
    let host = host();
    define_calc(&host);
    let ctx: &dyn ForeignContext = &host;

    let zero = DynamicObject::new_instance(ctx, CALC, Vec::new()).unwrap();
    assert_eq!(zero.get_int("total").unwrap(), 0);

    let named = DynamicObject::new_instance_named(ctx, CALC, vec![("start", AnyValue::Int(3))]).unwrap();
    assert_eq!(named.get_int("total").unwrap(), 3);
}

#[test]
fn test_overloads_by_arity() {
    let host = host();
    let calc = calc(&host, 10);

    assert_eq!(calc.call_int("add", vec![AnyValue::Int(2)]).unwrap(), 12);
    assert_eq!(calc.call_int("add", vec![AnyValue::Int(2), AnyValue::Int(3)]).unwrap(), 5);
    assert_eq!(calc.get_int("total").unwrap(), 12);
}

#[test]
fn test_overload_selection_is_deterministic() {
    let host = host();
    let calc = calc(&host, 0);

    for _ in 0..3 {
        assert_eq!(calc.call_string("kind", vec![AnyValue::Int(1)]).unwrap(), "int");
        assert_eq!(calc.call_string("kind", vec![AnyValue::Long(1)]).unwrap(), "long");
        assert_eq!(calc.call_string("kind", vec![AnyValue::from("s")]).unwrap(), "string");
    }
    // Widening ties between int and long go to the first declared
    assert_eq!(calc.call_string("kind", vec![AnyValue::Short(1)]).unwrap(), "int");
    assert_eq!(
        calc.call_string("kind", vec![AnyValue::Array(vec![AnyValue::Int(1)])]).unwrap(),
        "object"
    );
}

#[test]
fn test_null_arguments() {
    let host = host();
    let calc = calc(&host, 0);

    assert_eq!(calc.call_string("label", vec![AnyValue::Null]).unwrap(), "none");
    assert_eq!(calc.call_string("label", vec![AnyValue::from("x")]).unwrap(), "x");

    let err = calc.call("add", vec![AnyValue::Null]).unwrap_err();
    assert!(matches!(err, BridgeError::NoSuchMember { .. }));
}

#[test]
fn test_keyword_and_optional_arguments() {
    let host = host();
    let calc = calc(&host, 0);

    assert_eq!(calc.call_string("greet", vec![AnyValue::from("Bo")]).unwrap(), "Hello, Bo");
    let greeting = calc
        .call_named_as::<String>(
            "greet",
            vec![("greeting", AnyValue::from("Hi")), ("name", AnyValue::from("Bo"))],
        )
        .unwrap();
    assert_eq!(greeting, "Hi, Bo");

    let err = calc.call_named("greet", vec![("nickname", AnyValue::from("Bo"))]).unwrap_err();
    assert!(matches!(err, BridgeError::NoSuchMember { .. }));
}

#[test]
fn test_varargs_arrive_as_list() {
    let host = host();
    let calc = calc(&host, 0);

    let args = vec![AnyValue::from("-"), AnyValue::from("a"), AnyValue::from("b"), AnyValue::from("c")];
    assert_eq!(calc.call_string("join", args).unwrap(), "a-b-c");
    assert_eq!(calc.call_string("join", vec![AnyValue::from("-")]).unwrap(), "");
}

#[test]
fn test_property_write_and_accessor_fallback() {
    let host = host();
    let calc = calc(&host, 0);

    calc.set("total", AnyValue::Int(42)).unwrap();
    assert_eq!(calc.get_int("total").unwrap(), 42);

    // No `secret` property: served by setSecret/getSecret
    calc.set("secret", "hunter2").unwrap();
    assert_eq!(calc.get_string("secret").unwrap(), "hunter2");

    let err = calc.get("missing").unwrap_err();
    match err {
        BridgeError::NoSuchMember { member, .. } => assert_eq!(member, "missing"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_static_function_through_class() {
    let host = host();
    define_calc(&host);
    let ctx: &dyn ForeignContext = &host;

    let class = DynamicObject::for_class(ctx, CALC).unwrap();
    assert_eq!(class.call_int("twice", vec![AnyValue::Int(4)]).unwrap(), 8);
    assert!(class.as_object().is_none());

    // Instance members need an instance
    let err = class.call("add", vec![AnyValue::Int(1)]).unwrap_err();
    assert!(matches!(err, BridgeError::NoSuchMember { .. }));
}

#[test]
fn test_bound_method_and_identity() {
    let host = host();
    let calc = calc(&host, 1);
    let ctx: &dyn ForeignContext = &host;

    let add = calc.method("add");
    assert_eq!(add.name(), "add");
    assert_eq!(add.invoke_int(vec![AnyValue::Int(2), AnyValue::Int(3)]).unwrap(), 5);

    let obj = calc.as_object().unwrap();
    let again = DynamicObject::for_instance(ctx, obj).unwrap();
    assert!(again.same_target(&calc));
    assert_eq!(calc.to_foreign(ctx).unwrap(), ForeignValue::Object(obj));
}

#[test]
fn test_unknown_member_reports_arguments() {
    let host = host();
    let calc = calc(&host, 0);

    let err = calc.call("nope", vec![AnyValue::Int(1), AnyValue::from("x")]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("nope"));
    assert!(message.contains(CALC));
    assert!(message.contains("int"));
}
