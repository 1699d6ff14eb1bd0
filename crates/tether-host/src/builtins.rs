//! Built-in classes of the host runtime
//!
//! Core language classes, boxed primitives, collections, value types,
//! records, callable interfaces with their Rust-backed lambda classes, flows
//! and continuations.

use std::sync::atomic::Ordering;

use tether_sdk::names::{self, invoke_signature, suspend_invoke_signature, MAX_ARITY};
use tether_sdk::ForeignValue;

use crate::class::ClassBuilder;
use crate::heap::Payload;
use crate::host::{Host, HostResult, Thrown};

/// Flow implementation backed by a Rust element source
pub const FLOW_IMPL: &str = "lang/FlowImpl";
/// Continuation that records its outcome for a [`ContinuationProbe`](crate::ContinuationProbe)
pub const COMPLETABLE_CONTINUATION: &str = "lang/CompletableContinuation";

/// Boxed classes and their primitive descriptors
pub const BOXED: [(&str, &str); 8] = [
    (names::BOOLEAN, "Z"),
    (names::BYTE, "B"),
    (names::CHARACTER, "C"),
    (names::SHORT, "S"),
    (names::INTEGER, "I"),
    (names::LONG, "J"),
    (names::FLOAT, "F"),
    (names::DOUBLE, "D"),
];

pub(crate) fn install(host: &Host) {
    let classes = core_classes()
        .into_iter()
        .chain(boxed_classes())
        .chain(collection_classes())
        .chain(value_classes())
        .chain(callable_classes())
        .chain(async_classes());
    for builder in classes {
        if let Err(e) = host.define_class(builder) {
            tracing::error!(error = %e, "failed to install built-in class");
        }
    }
}

fn index_arg(host: &Host, args: &[ForeignValue]) -> HostResult<usize> {
    match args.first() {
        Some(ForeignValue::Int(i)) if *i >= 0 => Ok(*i as usize),
        _ => Err(host.throw_new(names::EXCEPTION, "index out of range")),
    }
}

fn list_of(host: &Host, this: Option<crate::ObjRef>) -> HostResult<(crate::ObjRef, Vec<ForeignValue>)> {
    let this = host.require_receiver(this)?;
    match host.list_items(this) {
        Some(items) => Ok((this, items)),
        None => Err(host.throw_new(names::EXCEPTION, "not a collection")),
    }
}

fn element_at(host: &Host, this: Option<crate::ObjRef>, args: &[ForeignValue]) -> HostResult<ForeignValue> {
    let (_, items) = list_of(host, this)?;
    let index = index_arg(host, args)?;
    items
        .get(index)
        .copied()
        .ok_or_else(|| host.throw_new(names::EXCEPTION, "index out of range"))
}

fn core_classes() -> Vec<ClassBuilder> {
    vec![
        ClassBuilder::root(names::OBJECT)
            .constructor("()V", |_, _, _| Ok(ForeignValue::Null))
            .method("toString", "()Llang/String;", |host, this, _| {
                let this = host.require_receiver(this)?;
                let name = host.class_name_of(this).unwrap_or_default();
                Ok(ForeignValue::Object(
                    host.string(&format!("{}@{}", name, this.raw())),
                ))
            }),
        ClassBuilder::new(names::STRING)
            .method("length", "()I", |host, this, _| {
                let this = host.require_receiver(this)?;
                let len = host.str_value(this).map(|s| s.encode_utf16().count());
                Ok(ForeignValue::Int(len.unwrap_or(0) as i32))
            })
            .method("toString", "()Llang/String;", |_, this, _| {
                Ok(ForeignValue::object(this))
            }),
        ClassBuilder::new(names::BYTE_ARRAY),
        ClassBuilder::new(names::THROWABLE)
            .field("message", "Llang/String;")
            .field_constructor()
            .method("getMessage", "()Llang/String;", |host, this, _| {
                host.field_named(host.require_receiver(this)?, "message")
            })
            .method("toString", "()Llang/String;", |host, this, _| {
                let this = host.require_receiver(this)?;
                let name = host.class_name_of(this).unwrap_or_default();
                let text = match host.exception_message(this) {
                    Some(message) => format!("{}: {}", name, message),
                    None => name,
                };
                Ok(ForeignValue::Object(host.string(&text)))
            }),
        ClassBuilder::new(names::EXCEPTION)
            .extends(names::THROWABLE)
            .constructor("(Llang/String;)V", |host, this, args| {
                host.set_field_named(host.require_receiver(this)?, "message", args[0])?;
                Ok(ForeignValue::Null)
            }),
    ]
}

fn boxed_classes() -> Vec<ClassBuilder> {
    BOXED
        .iter()
        .map(|&(class, sig)| {
            let class_name = class.to_string();
            ClassBuilder::new(class)
                .field(names::VALUE_FIELD, sig)
                .field_constructor()
                .static_method(
                    "valueOf",
                    &format!("({})L{};", sig, class),
                    move |host, _, args| {
                        let obj = host.instantiate(&class_name, &format!("({})V", sig), args)?;
                        Ok(ForeignValue::Object(obj))
                    },
                )
        })
        .collect()
}

fn collection_classes() -> Vec<ClassBuilder> {
    vec![
        ClassBuilder::new(names::LIST)
            .constructor("()V", |_, _, _| Ok(ForeignValue::Null))
            .method("size", "()I", |host, this, _| {
                Ok(ForeignValue::Int(list_of(host, this)?.1.len() as i32))
            })
            .method("get", "(I)Llang/Object;", element_at)
            .method("add", "(Llang/Object;)Z", |host, this, args| {
                let this = host.require_receiver(this)?;
                host.update_payload(this, |p| {
                    if let Payload::List(items) = p {
                        items.push(args[0]);
                    }
                });
                Ok(ForeignValue::Bool(true))
            }),
        ClassBuilder::new(names::SET)
            .constructor("()V", |_, _, _| Ok(ForeignValue::Null))
            .method("size", "()I", |host, this, _| {
                Ok(ForeignValue::Int(list_of(host, this)?.1.len() as i32))
            })
            .method("elementAt", "(I)Llang/Object;", element_at)
            .method("contains", "(Llang/Object;)Z", |host, this, args| {
                let (_, items) = list_of(host, this)?;
                Ok(ForeignValue::Bool(
                    items.iter().any(|item| host.values_equal(*item, args[0])),
                ))
            })
            .method("add", "(Llang/Object;)Z", |host, this, args| {
                let (this, items) = list_of(host, this)?;
                if items.iter().any(|item| host.values_equal(*item, args[0])) {
                    return Ok(ForeignValue::Bool(false));
                }
                host.update_payload(this, |p| {
                    if let Payload::List(items) = p {
                        items.push(args[0]);
                    }
                });
                Ok(ForeignValue::Bool(true))
            }),
        ClassBuilder::new(names::MAP)
            .constructor("()V", |_, _, _| Ok(ForeignValue::Null))
            .method("size", "()I", |host, this, _| {
                let this = host.require_receiver(this)?;
                Ok(ForeignValue::Int(
                    host.map_entries(this).map(|e| e.len()).unwrap_or(0) as i32,
                ))
            })
            .method("keyAt", "(I)Llang/Object;", |host, this, args| {
                map_entry(host, this, args).map(|(k, _)| k)
            })
            .method("valueAt", "(I)Llang/Object;", |host, this, args| {
                map_entry(host, this, args).map(|(_, v)| v)
            })
            .method("get", "(Llang/Object;)Llang/Object;", |host, this, args| {
                let this = host.require_receiver(this)?;
                let entries = host.map_entries(this).unwrap_or_default();
                Ok(entries
                    .into_iter()
                    .find(|(k, _)| host.values_equal(*k, args[0]))
                    .map(|(_, v)| v)
                    .unwrap_or(ForeignValue::Null))
            })
            .method(
                "put",
                "(Llang/Object;Llang/Object;)Llang/Object;",
                |host, this, args| {
                    let this = host.require_receiver(this)?;
                    let entries = host.map_entries(this).unwrap_or_default();
                    let existing = entries
                        .iter()
                        .position(|(k, _)| host.values_equal(*k, args[0]));
                    let previous = host.update_payload(this, |p| {
                        let Payload::Map(entries) = p else {
                            return ForeignValue::Null;
                        };
                        match existing {
                            Some(i) => std::mem::replace(&mut entries[i].1, args[1]),
                            None => {
                                entries.push((args[0], args[1]));
                                ForeignValue::Null
                            }
                        }
                    });
                    Ok(previous.unwrap_or(ForeignValue::Null))
                },
            ),
    ]
}

fn map_entry(
    host: &Host,
    this: Option<crate::ObjRef>,
    args: &[ForeignValue],
) -> HostResult<(ForeignValue, ForeignValue)> {
    let this = host.require_receiver(this)?;
    let index = index_arg(host, args)?;
    host.map_entries(this)
        .and_then(|entries| entries.get(index).copied())
        .ok_or_else(|| host.throw_new(names::EXCEPTION, "index out of range"))
}

fn value_classes() -> Vec<ClassBuilder> {
    vec![
        ClassBuilder::new(names::DATE)
            .field("millis", "J")
            .field_constructor(),
        ClassBuilder::new(names::UUID)
            .field("mostSigBits", "J")
            .field("leastSigBits", "J")
            .field_constructor(),
        ClassBuilder::new(names::URI)
            .field("spec", "Llang/String;")
            .field_constructor(),
        ClassBuilder::new(names::LOCALE)
            .field("identifier", "Llang/String;")
            .field_constructor(),
        ClassBuilder::new(names::PAIR)
            .field("first", "Llang/Object;")
            .field("second", "Llang/Object;")
            .field_constructor(),
        ClassBuilder::new(names::TRIPLE)
            .field("first", "Llang/Object;")
            .field("second", "Llang/Object;")
            .field("third", "Llang/Object;")
            .field_constructor(),
        ClassBuilder::new(names::RESULT)
            .field("value", "Llang/Object;")
            .field("exception", "Llang/Throwable;")
            .field_constructor(),
    ]
}

fn callable_classes() -> Vec<ClassBuilder> {
    let mut out = Vec::new();
    for arity in 0..=MAX_ARITY {
        out.push(
            ClassBuilder::interface(&names::function_class(arity))
                .abstract_method("invoke", &invoke_signature(arity)),
        );
        out.push(
            ClassBuilder::interface(&names::suspend_function_class(arity))
                .abstract_method("invoke", &suspend_invoke_signature(arity)),
        );
        out.push(
            ClassBuilder::new(&format!("lang/Lambda{}", arity))
                .implements(&names::function_class(arity))
                .method("invoke", &invoke_signature(arity), |host, this, args| {
                    let this = host.require_receiver(this)?;
                    match host.payload(this) {
                        Some(Payload::Lambda(f)) => f(host, args),
                        _ => Err(host.throw_new(names::EXCEPTION, "not a lambda")),
                    }
                }),
        );
        out.push(
            ClassBuilder::new(&format!("lang/SuspendLambda{}", arity))
                .implements(&names::suspend_function_class(arity))
                .method(
                    "invoke",
                    &suspend_invoke_signature(arity),
                    move |host, this, args| {
                        let this = host.require_receiver(this)?;
                        let Some(ForeignValue::Object(continuation)) = args.get(arity).copied()
                        else {
                            return Err(host.throw_new(names::EXCEPTION, "missing continuation"));
                        };
                        match host.payload(this) {
                            Some(Payload::SuspendLambda(f)) => {
                                f(host, &args[..arity], continuation)?;
                                Ok(ForeignValue::Null)
                            }
                            _ => Err(host.throw_new(names::EXCEPTION, "not a suspend lambda")),
                        }
                    },
                ),
        );
    }
    out
}

fn async_classes() -> Vec<ClassBuilder> {
    vec![
        ClassBuilder::interface(names::CONTINUATION)
            .abstract_method("resume", "(Llang/Object;)V")
            .abstract_method("resumeWithError", "(Llang/Throwable;)V"),
        ClassBuilder::new(COMPLETABLE_CONTINUATION)
            .implements(names::CONTINUATION)
            .method("resume", "(Llang/Object;)V", |host, this, args| {
                complete(host, this, Ok(args[0]))
            })
            .method("resumeWithError", "(Llang/Throwable;)V", |host, this, args| {
                match args[0].as_object() {
                    Some(throwable) => complete(host, this, Err(throwable)),
                    None => Err(host.throw_new(names::EXCEPTION, "null throwable")),
                }
            }),
        ClassBuilder::new(names::FLOW)
            .abstract_method("collect", "(Llang/Function1;Llang/Function1;)V")
            .abstract_method("cancel", "()V"),
        ClassBuilder::new(FLOW_IMPL)
            .extends(names::FLOW)
            .method(
                "collect",
                "(Llang/Function1;Llang/Function1;)V",
                collect_flow,
            )
            .method("cancel", "()V", |host, this, _| {
                let this = host.require_receiver(this)?;
                if let Some(Payload::Flow { cancelled, .. }) = host.payload(this) {
                    cancelled.store(true, Ordering::SeqCst);
                }
                Ok(ForeignValue::Null)
            }),
    ]
}

fn complete(
    host: &Host,
    this: Option<crate::ObjRef>,
    outcome: crate::Completion,
) -> HostResult<ForeignValue> {
    let this = host.require_receiver(this)?;
    let Some(Payload::Completion(slot)) = host.payload(this) else {
        return Err(host.throw_new(names::EXCEPTION, "not a completable continuation"));
    };
    let mut value = slot.value.lock();
    if value.is_some() {
        return Err(host.throw_new(names::EXCEPTION, "continuation already resumed"));
    }
    *value = Some(outcome);
    slot.ready.notify_all();
    Ok(ForeignValue::Null)
}

/// Emit every element to `onElement`, then report completion to
/// `onComplete` with `null` or the failure. Cancellation stops emission
/// without a completion call.
fn collect_flow(
    host: &Host,
    this: Option<crate::ObjRef>,
    args: &[ForeignValue],
) -> HostResult<ForeignValue> {
    let this = host.require_receiver(this)?;
    let (Some(on_element), Some(on_complete)) = (args[0].as_object(), args[1].as_object()) else {
        return Err(host.throw_new(names::EXCEPTION, "null collector"));
    };
    let Some(Payload::Flow { source, cancelled }) = host.payload(this) else {
        return Err(host.throw_new(names::EXCEPTION, "not a flow"));
    };
    let sig = invoke_signature(1);
    let mut index = 0;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            tracing::debug!(flow = this.raw(), index, "flow cancelled");
            return Ok(ForeignValue::Null);
        }
        match source(host, index) {
            Ok(Some(item)) => {
                host.invoke(on_element, "invoke", &sig, &[host.boxed(item)])?;
                index += 1;
            }
            Ok(None) => {
                host.invoke(on_complete, "invoke", &sig, &[ForeignValue::Null])?;
                return Ok(ForeignValue::Null);
            }
            Err(Thrown(failure)) => {
                host.invoke(on_complete, "invoke", &sig, &[ForeignValue::Object(failure)])?;
                return Ok(ForeignValue::Null);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tether_sdk::{ForeignContext, NativeEntryRegistry};

    use super::*;

    #[test]
    fn test_boxed_value_of() {
        let host = Host::new(NativeEntryRegistry::new());
        let class = host.find_class(names::LONG).unwrap();
        let value_of = host.static_method_id(class, "valueOf", "(J)Llang/Long;").unwrap();
        let boxed = host
            .call_static_method(class, value_of, &[ForeignValue::Long(42)])
            .unwrap();
        assert_eq!(host.unboxed(boxed), Some(ForeignValue::Long(42)));
    }

    #[test]
    fn test_map_put_replaces_equal_keys() {
        let host = Host::new(NativeEntryRegistry::new());
        let map = host.new_map(Vec::new());
        let key = ForeignValue::Object(host.string("k"));
        let same_key = ForeignValue::Object(host.string("k"));
        let sig = "(Llang/Object;Llang/Object;)Llang/Object;";
        host.invoke(map, "put", sig, &[key, ForeignValue::Int(1)]).unwrap();
        let previous = host
            .invoke(map, "put", sig, &[same_key, ForeignValue::Int(2)])
            .unwrap();
        assert_eq!(previous, ForeignValue::Int(1));
        assert_eq!(host.map_entries(map).unwrap().len(), 1);
    }

    #[test]
    fn test_flow_collects_then_completes() {
        let host = Host::new(NativeEntryRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(Mutex::new(None));
        let flow = host.new_flow_of(
            vec![ForeignValue::Int(1), ForeignValue::Int(2)],
            None,
        );
        let seen_in = seen.clone();
        let on_element = host.new_lambda(1, move |h, args| {
            seen_in.lock().push(h.unboxed(args[0]));
            Ok(ForeignValue::Null)
        });
        let done_in = done.clone();
        let on_complete = host.new_lambda(1, move |_, args| {
            *done_in.lock() = Some(args[0]);
            Ok(ForeignValue::Null)
        });
        host.invoke(
            flow,
            "collect",
            "(Llang/Function1;Llang/Function1;)V",
            &[ForeignValue::Object(on_element), ForeignValue::Object(on_complete)],
        )
        .unwrap();
        assert_eq!(
            *seen.lock(),
            vec![Some(ForeignValue::Int(1)), Some(ForeignValue::Int(2))]
        );
        assert_eq!(*done.lock(), Some(ForeignValue::Null));
    }

    #[test]
    fn test_cancelled_flow_stops() {
        let host = Host::new(NativeEntryRegistry::new());
        let flow = host.new_flow(|_, index| Ok(Some(ForeignValue::Int(index as i32))));
        let counter = Arc::new(Mutex::new(0));
        let counter_in = counter.clone();
        let on_element = host.new_lambda(1, move |_, _| {
            *counter_in.lock() += 1;
            Ok(ForeignValue::Null)
        });
        let on_complete = host.new_lambda(1, |_, _| Ok(ForeignValue::Null));
        host.invoke(flow, "cancel", "()V", &[]).unwrap();
        assert!(host.flow_cancelled(flow));
        host.invoke(
            flow,
            "collect",
            "(Llang/Function1;Llang/Function1;)V",
            &[ForeignValue::Object(on_element), ForeignValue::Object(on_complete)],
        )
        .unwrap();
        assert_eq!(*counter.lock(), 0);
    }
}
