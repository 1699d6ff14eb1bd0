//! Bridge support library
//!
//! Classes the native bridge expects to find in the runtime. Each proxy
//! class carries a peer handle in a `peer:J` field, exposes it through
//! `bridge/PeerBridged.peer()J`, and releases it through the
//! `Peer.release` entry when collected.

use tether_sdk::names::{self, invoke_signature, suspend_invoke_signature, MAX_ARITY};
use tether_sdk::ForeignValue;

use crate::class::ClassBuilder;
use crate::host::Host;

pub(crate) fn install(host: &Host) {
    let classes = capability_classes()
        .into_iter()
        .chain(proxy_classes())
        .chain(wrapped_classes());
    for builder in classes {
        if let Err(e) = host.define_class(builder) {
            tracing::error!(error = %e, "failed to install bridge support class");
        }
    }
}

/// A class extending `base` that carries a peer handle
fn peer_class(name: &str, base: &str) -> ClassBuilder {
    ClassBuilder::new(name)
        .extends(base)
        .implements(names::PEER_BRIDGED)
        .field(names::PEER_FIELD, "J")
        .field_constructor()
        .method("peer", "()J", |host, this, _| {
            host.field_named(host.require_receiver(this)?, names::PEER_FIELD)
        })
        .finalizer(names::ENTRY_PEER_RELEASE)
}

fn capability_classes() -> Vec<ClassBuilder> {
    vec![
        ClassBuilder::interface(names::PEER_BRIDGED).abstract_method("peer", "()J"),
        ClassBuilder::interface(names::NATIVE_PROJECTING)
            .abstract_method("projection", "(I)Llang/Function0;"),
    ]
}

fn proxy_classes() -> Vec<ClassBuilder> {
    let mut out = vec![
        peer_class(names::NATIVE_OBJECT, names::OBJECT).native_method(
            "toString",
            "()Llang/String;",
            names::ENTRY_PEER_DESCRIBE,
        ),
        peer_class(names::NATIVE_CONTINUATION, names::OBJECT)
            .implements(names::CONTINUATION)
            .native_method(
                "resume",
                "(Llang/Object;)V",
                names::ENTRY_CONTINUATION_RESUME,
            )
            .native_method(
                "resumeWithError",
                "(Llang/Throwable;)V",
                names::ENTRY_CONTINUATION_RESUME_WITH_ERROR,
            ),
        peer_class(names::NATIVE_STREAM, names::FLOW)
            .native_method(
                "collect",
                "(Llang/Function1;Llang/Function1;)V",
                names::ENTRY_STREAM_COLLECT,
            )
            .native_method("cancel", "()V", names::ENTRY_STREAM_CANCEL),
        peer_class(names::NATIVE_THROWING_STREAM, names::FLOW)
            .native_method(
                "collect",
                "(Llang/Function1;Llang/Function1;)V",
                names::ENTRY_STREAM_COLLECT,
            )
            .native_method("cancel", "()V", names::ENTRY_STREAM_CANCEL),
        // The message is passed to the constructor; the peer points back at
        // the native error
        ClassBuilder::new(names::NATIVE_ERROR)
            .extends(names::EXCEPTION)
            .implements(names::PEER_BRIDGED)
            .field(names::PEER_FIELD, "J")
            .constructor("(Llang/String;J)V", |host, this, args| {
                let this = host.require_receiver(this)?;
                host.set_field_named(this, "message", args[0])?;
                host.set_field_named(this, names::PEER_FIELD, args[1])?;
                Ok(ForeignValue::Null)
            })
            .method("peer", "()J", |host, this, _| {
                host.field_named(host.require_receiver(this)?, names::PEER_FIELD)
            })
            .finalizer(names::ENTRY_PEER_RELEASE),
    ];
    for arity in 0..=MAX_ARITY {
        out.push(
            peer_class(&names::closure_class(arity), names::OBJECT)
                .implements(&names::function_class(arity))
                .native_method(
                    "invoke",
                    &invoke_signature(arity),
                    &names::closure_invoke_entry(arity),
                ),
        );
        out.push(
            peer_class(&names::async_closure_class(arity), names::OBJECT)
                .implements(&names::suspend_function_class(arity))
                .native_method(
                    "invoke",
                    &suspend_invoke_signature(arity),
                    &names::async_closure_invoke_entry(arity),
                ),
        );
    }
    out
}

fn wrapped_classes() -> Vec<ClassBuilder> {
    let storage = [
        (names::WRAPPED_ARRAY, names::LIST),
        (names::WRAPPED_DICTIONARY, names::MAP),
        (names::WRAPPED_SET, names::SET),
        (names::WRAPPED_DATA, names::BYTE_ARRAY),
        (names::WRAPPED_DATE, names::DATE),
        (names::WRAPPED_UUID, names::UUID),
        (names::WRAPPED_URL, names::URI),
        (names::WRAPPED_LOCALE, names::LOCALE),
    ];
    let mut out: Vec<ClassBuilder> = storage
        .iter()
        .map(|(wrapper, plain)| {
            ClassBuilder::new(wrapper)
                .field(names::STORAGE_FIELD, &format!("L{};", plain))
                .field_constructor()
        })
        .collect();
    out.push(
        ClassBuilder::new(names::WRAPPED_OPTIONAL)
            .field(names::VALUE_FIELD, "Llang/Object;")
            .field_constructor(),
    );
    out.push(
        ClassBuilder::new(names::WRAPPED_RESULT)
            .field("value", "Llang/Object;")
            .field("error", "Llang/Throwable;")
            .field_constructor(),
    );
    out.push(
        ClassBuilder::new(names::TUPLE4)
            .field("first", "Llang/Object;")
            .field("second", "Llang/Object;")
            .field("third", "Llang/Object;")
            .field("fourth", "Llang/Object;")
            .field_constructor(),
    );
    out.push(
        ClassBuilder::new(names::TUPLE5)
            .field("first", "Llang/Object;")
            .field("second", "Llang/Object;")
            .field("third", "Llang/Object;")
            .field("fourth", "Llang/Object;")
            .field("fifth", "Llang/Object;")
            .field_constructor(),
    );
    out
}
