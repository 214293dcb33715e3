//! The `streams` capability: a pull-only `ReadableStream` over string chunks.

use crate::bindings::{HostContext, HostFnKind, HostObject, JSError, JSValue, stringify_value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Build the `streams` capability exposing the `ReadableStream` constructor.
pub fn build_streams_capability() -> HostObject {
    HostObject::with_class("StreamsCapability").with_fn(
        "ReadableStream",
        HostFnKind::constructor(construct_readable_stream),
    )
}

/// `new ReadableStream(...chunks)`. Non-string chunks are stringified.
fn construct_readable_stream(
    _context: &HostContext,
    args: Vec<JSValue>,
) -> Result<JSValue, JSError> {
    let chunks = args
        .into_iter()
        .filter(|chunk| !chunk.is_nullish())
        .map(stringify_value)
        .collect();
    Ok(JSValue::from(readable_stream(chunks)))
}

/// Build a stream instance that yields `chunks` in order.
pub fn readable_stream(chunks: VecDeque<String>) -> HostObject {
    let queue = Arc::new(Mutex::new(chunks));
    let read_queue = Arc::clone(&queue);
    let cancel_queue = Arc::clone(&queue);

    HostObject::with_class("ReadableStream")
        .with_fn(
            "read",
            HostFnKind::sync(move |_, _| {
                let next = read_queue
                    .lock()
                    .map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?
                    .pop_front();
                Ok(read_result(next))
            }),
        )
        .with_fn(
            "cancel",
            HostFnKind::sync(move |_, _| {
                cancel_queue
                    .lock()
                    .map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?
                    .clear();
                Ok(JSValue::Undefined)
            }),
        )
}

/// `{ done, value }` as returned by `read()`.
fn read_result(chunk: Option<String>) -> JSValue {
    let result = match chunk {
        Some(chunk) => HostObject::new()
            .with_property("done", JSValue::Boolean(false))
            .with_property("value", JSValue::from(chunk)),
        None => HostObject::new()
            .with_property("done", JSValue::Boolean(true))
            .with_property("value", JSValue::Undefined),
    };
    JSValue::from(result)
}
