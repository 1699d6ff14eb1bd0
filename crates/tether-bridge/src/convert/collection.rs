//! Optionals and containers
//!
//! Containers are produced as `util/List`, `util/Set`, `util/Map` when the
//! options ask for plain forms, otherwise wrapped in `bridge/Array`,
//! `bridge/Set`, `bridge/Dictionary`. Elements are converted with
//! [`ConversionOptions::nested`], so the interop flag only applies to the
//! outermost container.

use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hash};

use indexmap::IndexMap;
use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, ObjRef};

use super::{expect_object, read_indexed, to_object, unwrap_storage, wrap_storage, Bridgeable};
use crate::call::CallExt;
use crate::error::BridgeResult;
use crate::options::ConversionOptions;

/// `None` is null. When `T` is itself optional, a present value is boxed in
/// `bridge/Optional` so `Some(None)` stays distinct from `None`.
impl<T: Bridgeable> Bridgeable for Option<T> {
    const NULLABLE: bool = true;

    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = match value {
            ForeignValue::Null => return Ok(None),
            ForeignValue::Object(obj) if T::NULLABLE => obj,
            value => return T::from_foreign(ctx, value, options).map(Some),
        };
        if ctx.instance_of(obj, names::WRAPPED_OPTIONAL)? {
            let inner = ctx.field(obj, names::VALUE_FIELD, "Llang/Object;")?;
            return T::from_foreign(ctx, inner, options).map(Some);
        }
        T::from_foreign(ctx, value, options).map(Some)
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        match self {
            None => Ok(ForeignValue::Null),
            Some(value) if T::NULLABLE => {
                let inner = to_object(value, ctx, options)?;
                let marker = ctx.construct(names::WRAPPED_OPTIONAL, "(Llang/Object;)V", &[inner])?;
                Ok(ForeignValue::Object(marker))
            }
            Some(value) => value.to_foreign(ctx, options),
        }
    }
}

// ============================================================================
// Builders shared with the dynamic converter
// ============================================================================

/// Build a list (or wrapped array) from already converted elements
pub(crate) fn build_list(
    ctx: &dyn ForeignContext,
    items: Vec<ForeignValue>,
    options: ConversionOptions,
) -> BridgeResult<ForeignValue> {
    let list = ctx.construct(names::LIST, "()V", &[])?;
    for item in items {
        ctx.call(list, "add", "(Llang/Object;)Z", &[item])?;
    }
    wrap_storage(ctx, list, names::LIST, names::WRAPPED_ARRAY, options)
}

/// Build a set (or wrapped set); duplicates are dropped by the foreign set
pub(crate) fn build_set(
    ctx: &dyn ForeignContext,
    items: Vec<ForeignValue>,
    options: ConversionOptions,
) -> BridgeResult<ForeignValue> {
    let set = ctx.construct(names::SET, "()V", &[])?;
    for item in items {
        ctx.call(set, "add", "(Llang/Object;)Z", &[item])?;
    }
    wrap_storage(ctx, set, names::SET, names::WRAPPED_SET, options)
}

/// Build a map (or wrapped dictionary)
pub(crate) fn build_map(
    ctx: &dyn ForeignContext,
    entries: Vec<(ForeignValue, ForeignValue)>,
    options: ConversionOptions,
) -> BridgeResult<ForeignValue> {
    let map = ctx.construct(names::MAP, "()V", &[])?;
    for (key, value) in entries {
        ctx.call(
            map,
            "put",
            "(Llang/Object;Llang/Object;)Llang/Object;",
            &[key, value],
        )?;
    }
    wrap_storage(ctx, map, names::MAP, names::WRAPPED_DICTIONARY, options)
}

/// Elements of a list or wrapped array
pub(crate) fn list_elements(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Vec<ForeignValue>> {
    let list = unwrap_storage(ctx, obj, names::LIST, names::WRAPPED_ARRAY, "Array")?;
    read_indexed(ctx, list, "get")
}

/// Elements of a set or wrapped set
pub(crate) fn set_elements(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Vec<ForeignValue>> {
    let set = unwrap_storage(ctx, obj, names::SET, names::WRAPPED_SET, "Set")?;
    read_indexed(ctx, set, "elementAt")
}

/// Entries of a map or wrapped dictionary, in map order
pub(crate) fn map_entries(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
) -> BridgeResult<Vec<(ForeignValue, ForeignValue)>> {
    let map = unwrap_storage(ctx, obj, names::MAP, names::WRAPPED_DICTIONARY, "Dictionary")?;
    let keys = read_indexed(ctx, map, "keyAt")?;
    let values = read_indexed(ctx, map, "valueAt")?;
    Ok(keys.into_iter().zip(values).collect())
}

fn convert_all<T: Bridgeable>(
    ctx: &dyn ForeignContext,
    items: Vec<ForeignValue>,
    options: ConversionOptions,
) -> BridgeResult<Vec<T>> {
    items
        .into_iter()
        .map(|item| T::from_foreign(ctx, item, options))
        .collect()
}

fn box_all<T: Bridgeable>(
    ctx: &dyn ForeignContext,
    items: impl IntoIterator<Item = T>,
    options: ConversionOptions,
) -> BridgeResult<Vec<ForeignValue>> {
    items
        .into_iter()
        .map(|item| to_object(item, ctx, options))
        .collect()
}

// ============================================================================
// Native containers
// ============================================================================

impl<T: Bridgeable> Bridgeable for Vec<T> {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Array")?;
        convert_all(ctx, list_elements(ctx, obj)?, options.nested())
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let items = box_all(ctx, self, options.nested())?;
        build_list(ctx, items, options)
    }
}

impl<T, S> Bridgeable for HashSet<T, S>
where
    T: Bridgeable + Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Set")?;
        let items: Vec<T> = convert_all(ctx, set_elements(ctx, obj)?, options.nested())?;
        Ok(items.into_iter().collect())
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let items = box_all(ctx, self, options.nested())?;
        build_set(ctx, items, options)
    }
}

fn convert_entries<K: Bridgeable, V: Bridgeable>(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
    options: ConversionOptions,
) -> BridgeResult<Vec<(K, V)>> {
    map_entries(ctx, obj)?
        .into_iter()
        .map(|(k, v)| {
            Ok((
                K::from_foreign(ctx, k, options)?,
                V::from_foreign(ctx, v, options)?,
            ))
        })
        .collect()
}

fn box_entries<K: Bridgeable, V: Bridgeable>(
    ctx: &dyn ForeignContext,
    entries: impl IntoIterator<Item = (K, V)>,
    options: ConversionOptions,
) -> BridgeResult<Vec<(ForeignValue, ForeignValue)>> {
    entries
        .into_iter()
        .map(|(k, v)| Ok((to_object(k, ctx, options)?, to_object(v, ctx, options)?)))
        .collect()
}

impl<K, V, S> Bridgeable for HashMap<K, V, S>
where
    K: Bridgeable + Eq + Hash,
    V: Bridgeable,
    S: BuildHasher + Default,
{
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Dictionary")?;
        Ok(convert_entries(ctx, obj, options.nested())?.into_iter().collect())
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let entries = box_entries(ctx, self, options.nested())?;
        build_map(ctx, entries, options)
    }
}

/// Keeps the foreign map's iteration order
impl<K, V, S> Bridgeable for IndexMap<K, V, S>
where
    K: Bridgeable + Eq + Hash,
    V: Bridgeable,
    S: BuildHasher + Default,
{
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Dictionary")?;
        Ok(convert_entries(ctx, obj, options.nested())?.into_iter().collect())
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let entries = box_entries(ctx, self, options.nested())?;
        build_map(ctx, entries, options)
    }
}
