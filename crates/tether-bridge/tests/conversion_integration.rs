//! Integration tests for value conversion against the reference host

mod common;

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tether_bridge::{AnyValue, Bridgeable, BridgeError, ConversionOptions, Data, Locale};
use tether_sdk::{names, ForeignContext, ForeignValue};
use uuid::Uuid;

use common::{host, obj, str_of};

const PLAIN: ConversionOptions = ConversionOptions::NATIVE_CONTAINER;
const WRAPPED: ConversionOptions = ConversionOptions::NONE;

fn round_trip<T: Bridgeable>(ctx: &dyn ForeignContext, value: T, options: ConversionOptions) -> T {
    let foreign = value.to_foreign(ctx, options).unwrap();
    T::from_foreign(ctx, foreign, options).unwrap()
}

#[test]
fn test_primitive_round_trips() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    assert!(round_trip(ctx, true, WRAPPED));
    assert_eq!(round_trip(ctx, -7i8, WRAPPED), -7);
    assert_eq!(round_trip(ctx, 1234i16, WRAPPED), 1234);
    assert_eq!(round_trip(ctx, i32::MIN, WRAPPED), i32::MIN);
    assert_eq!(round_trip(ctx, i64::MAX, WRAPPED), i64::MAX);
    assert_eq!(round_trip(ctx, 1.5f32, WRAPPED), 1.5);
    assert_eq!(round_trip(ctx, -0.25f64, WRAPPED), -0.25);
    assert_eq!(round_trip(ctx, 'λ', WRAPPED), 'λ');
}

#[test]
fn test_boxed_primitive_accepted() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let boxed = host.boxed(ForeignValue::Int(42));
    assert_eq!(i32::from_foreign(ctx, boxed, WRAPPED).unwrap(), 42);
}

#[test]
fn test_string_round_trip() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let foreign = "hello, world".to_string().to_foreign(ctx, WRAPPED).unwrap();
    assert_eq!(str_of(&host, foreign).as_deref(), Some("hello, world"));
    assert_eq!(round_trip(ctx, String::new(), WRAPPED), "");
}

#[test]
fn test_null_handling() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    assert_eq!(None::<i32>.to_foreign(ctx, WRAPPED).unwrap(), ForeignValue::Null);
    assert_eq!(Option::<String>::from_foreign(ctx, ForeignValue::Null, WRAPPED).unwrap(), None);
    assert_eq!(round_trip(ctx, Some(5i32), WRAPPED), Some(5));

    let err = i32::from_foreign(ctx, ForeignValue::Null, WRAPPED).unwrap_err();
    assert!(matches!(err, BridgeError::UnexpectedNull(_)));
}

#[test]
fn test_nested_optionals_round_trip() -> anyhow::Result<()> {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    for value in [Some(Some(5i32)), Some(None), None] {
        let foreign = value.to_foreign(ctx, WRAPPED)?;
        assert_eq!(Option::<Option<i32>>::from_foreign(ctx, foreign, WRAPPED)?, value);
    }

    let present_absent = Some(None::<i32>).to_foreign(ctx, WRAPPED)?;
    assert!(host.instance_of(obj(present_absent), names::WRAPPED_OPTIONAL));
    assert_eq!(None::<Option<i32>>.to_foreign(ctx, WRAPPED)?, ForeignValue::Null);

    // A plain value from the foreign side is a present inner value
    let five = Some(5i32).to_foreign(ctx, WRAPPED)?;
    assert_eq!(Option::<Option<i32>>::from_foreign(ctx, five, WRAPPED)?, Some(Some(5)));
    Ok(())
}

#[test]
fn test_type_mismatch_reported() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let text = "nope".to_string().to_foreign(ctx, WRAPPED).unwrap();
    let err = i32::from_foreign(ctx, text, WRAPPED).unwrap_err();
    assert!(matches!(err, BridgeError::Conversion { .. }));
}

#[test]
fn test_list_forms() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let plain = vec![1, 2, 3].to_foreign(ctx, PLAIN).unwrap();
    assert!(host.instance_of(obj(plain), names::LIST));
    assert_eq!(host.list_items(obj(plain)).map(|items| items.len()), Some(3));

    let wrapped = vec![1, 2, 3].to_foreign(ctx, WRAPPED).unwrap();
    assert!(host.instance_of(obj(wrapped), names::WRAPPED_ARRAY));

    // Either form reads back
    assert_eq!(Vec::<i32>::from_foreign(ctx, plain, WRAPPED).unwrap(), vec![1, 2, 3]);
    assert_eq!(Vec::<i32>::from_foreign(ctx, wrapped, PLAIN).unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_nested_containers() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let nested = vec![vec!["a".to_string()], vec![], vec!["b".to_string(), "c".to_string()]];
    assert_eq!(round_trip(ctx, nested.clone(), WRAPPED), nested);
    assert_eq!(round_trip(ctx, nested.clone(), PLAIN), nested);
}

#[test]
fn test_interop_flag_only_applies_to_outermost() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let options = ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
    let value = vec![vec![1i32]].to_foreign(ctx, options).unwrap();
    let outer = obj(value);
    assert!(host.instance_of(outer, names::LIST));

    let items = host.list_items(outer).unwrap();
    assert!(host.instance_of(obj(items[0]), names::WRAPPED_ARRAY));
}

#[test]
fn test_set_and_maps() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let set: HashSet<i64> = [3, 1, 2].into_iter().collect();
    assert_eq!(round_trip(ctx, set.clone(), WRAPPED), set);

    let mut map = HashMap::new();
    map.insert("one".to_string(), 1i32);
    map.insert("two".to_string(), 2i32);
    assert_eq!(round_trip(ctx, map.clone(), PLAIN), map);

    let mut ordered = IndexMap::new();
    ordered.insert("z".to_string(), 26i32);
    ordered.insert("a".to_string(), 1i32);
    ordered.insert("m".to_string(), 13i32);
    let back = round_trip(ctx, ordered.clone(), WRAPPED);
    assert_eq!(back.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
}

#[test]
fn test_tuples() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let pair = (1i32, "x".to_string()).to_foreign(ctx, WRAPPED).unwrap();
    assert!(host.instance_of(obj(pair), names::PAIR));
    assert_eq!(
        <(i32, String)>::from_foreign(ctx, pair, WRAPPED).unwrap(),
        (1, "x".to_string())
    );

    let five = (1i32, 2i64, true, 'c', "e".to_string());
    assert_eq!(round_trip(ctx, five.clone(), WRAPPED), five);
}

#[test]
fn test_result_slots() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let ok: Result<i32, BridgeError> = Ok(7);
    assert_eq!(round_trip(ctx, ok, WRAPPED).unwrap(), 7);

    let failed: Result<i32, BridgeError> = Err(BridgeError::msg("boom"));
    let err = round_trip(ctx, failed, WRAPPED).unwrap_err();
    assert_eq!(err.to_string(), "boom");
}

#[test]
fn test_result_payload_is_nested() -> anyhow::Result<()> {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let options = ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
    let ok: Result<Vec<i32>, BridgeError> = Ok(vec![1, 2]);
    let result = obj(ok.to_foreign(ctx, options)?);
    let payload = host.field_named(result, "value").unwrap();
    assert!(host.instance_of(obj(payload), names::WRAPPED_ARRAY));

    let back = Result::<Vec<i32>, BridgeError>::from_foreign(ctx, ForeignValue::Object(result), options)?;
    assert_eq!(back?, vec![1, 2]);
    Ok(())
}

#[test]
fn test_native_error_round_trip() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let foreign = BridgeError::msg("boom").to_foreign(ctx, WRAPPED).unwrap();
    let throwable = obj(foreign);
    assert!(host.instance_of(throwable, names::NATIVE_ERROR));
    assert_eq!(host.exception_message(throwable).as_deref(), Some("boom"));

    let back = BridgeError::from_foreign(ctx, foreign, WRAPPED).unwrap();
    assert!(matches!(back, BridgeError::Message(ref m) if m == "boom"));
}

#[test]
fn test_foreign_error_round_trip_keeps_throwable() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let throwable = host.new_exception(names::EXCEPTION, "boom");
    let error = BridgeError::from_foreign(ctx, ForeignValue::Object(throwable), WRAPPED).unwrap();
    assert!(error.is_foreign());
    assert!(error.to_string().contains("boom"));

    let again = error.to_foreign(ctx, WRAPPED).unwrap();
    assert!(ctx.is_same_object(obj(again), throwable));
}

#[test]
fn test_foundation_values() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let data = Data(vec![0, 1, 2, 255]);
    assert_eq!(round_trip(ctx, data.clone(), PLAIN), data);
    assert_eq!(round_trip(ctx, data.clone(), WRAPPED), data);

    let id = Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
    assert_eq!(round_trip(ctx, id, WRAPPED), id);

    let url = url::Url::parse("https://example.com/a?b=c").unwrap();
    assert_eq!(round_trip(ctx, url.clone(), PLAIN), url);

    let locale = Locale("en-GB".to_string());
    assert_eq!(round_trip(ctx, locale.clone(), WRAPPED), locale);
}

#[test]
fn test_any_value_dispatch() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let list = host.new_list(vec![
        host.boxed(ForeignValue::Int(1)),
        ForeignValue::Object(host.string("two")),
        ForeignValue::Null,
    ]);
    let value = AnyValue::from_foreign(ctx, ForeignValue::Object(list), WRAPPED).unwrap();
    assert_eq!(
        value,
        AnyValue::Array(vec![AnyValue::Int(1), AnyValue::from("two"), AnyValue::Null])
    );

    let map = AnyValue::Map(vec![(AnyValue::from("k"), AnyValue::Long(9))]);
    let back = round_trip(ctx, map, PLAIN);
    assert_eq!(back, AnyValue::Map(vec![(AnyValue::from("k"), AnyValue::Long(9))]));
}

#[test]
fn test_options_cross_as_int() {
    let options = ConversionOptions::NATIVE_CONTAINER | ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
    assert_eq!(ConversionOptions::from_bits(options.bits()), options);
}
