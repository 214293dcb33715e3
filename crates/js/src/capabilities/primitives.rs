//! The `core` capability: raw privileged primitives.
//!
//! - `opAsync(name, ...args)` queues a host operation and returns `undefined`.
//! - `print(message, useErrorChannel)` writes synchronously through the host output.
//!
//! Neither is ever installed into a script namespace as-is.

use crate::bindings::{HostContext, HostFnSync, HostObject, HostOutput, JSError, JSValue};
use crate::bindings::{string_arg, stringify_value};
use crate::ops::{OpCall, OpSender};
use std::sync::Arc;

/// Build the `core` capability around an output routine and an op channel.
pub fn build_core_capability(output: Arc<dyn HostOutput>, ops: OpSender) -> HostObject {
    HostObject::with_class("Core")
        .with_sync_fn("opAsync", make_op_async(ops))
        .with_sync_fn("print", make_print(output))
}

fn make_op_async(ops: OpSender) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, mut args: Vec<JSValue>| -> Result<JSValue, JSError> {
            let name = string_arg(&args, 0, "opName")?;
            args.remove(0);
            ops.send(OpCall { name, args })
                .map_err(|err| JSError::InternalError(format!("op channel closed: {err}")))?;
            Ok(JSValue::Undefined)
        },
    )
}

fn make_print(output: Arc<dyn HostOutput>) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            let message = args
                .first()
                .cloned()
                .map(stringify_value)
                .unwrap_or_default();
            let use_error_channel = args.get(1).and_then(JSValue::as_bool).unwrap_or(false);
            output.print(&message, use_error_channel);
            Ok(JSValue::Undefined)
        },
    )
}
