//! One-way host operations queued by script code.
//!
//! `core.opAsync(name, ...args)` turns into an [`OpCall`] sent on an unbounded
//! channel. The host drains the receiving end with an [`OpDispatcher`] on its
//! own task; the script never sees completion or failure.

use crate::bindings::{HostOutput, JSError, JSValue, stringify_arguments};
use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// A queued host operation.
#[derive(Clone, Debug)]
pub struct OpCall {
    /// Host-recognised operation name.
    pub name: String,
    /// Arguments as passed by the caller.
    pub args: Vec<JSValue>,
}

/// Sending half held by the `core` capability.
pub type OpSender = UnboundedSender<OpCall>;
/// Receiving half drained by the host.
pub type OpReceiver = UnboundedReceiver<OpCall>;

/// Create a fresh operation channel.
pub fn op_channel() -> (OpSender, OpReceiver) {
    unbounded_channel()
}

/// Handler for one named operation.
pub type OpHandler = dyn Fn(Vec<JSValue>) -> Result<(), JSError> + Send + Sync + 'static;

/// Routes queued operations to their handlers by name.
#[derive(Default)]
pub struct OpDispatcher {
    handlers: BTreeMap<String, Arc<OpHandler>>,
}

impl OpDispatcher {
    /// Create a dispatcher with no operations registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`.
    pub fn with_op(mut self, name: &str, handler: Arc<OpHandler>) -> Self {
        self.handlers.insert(name.to_owned(), handler);
        self
    }

    /// Run a single call. Unknown names and handler failures are logged, not returned.
    pub fn dispatch(&self, call: OpCall) {
        let Some(handler) = self.handlers.get(&call.name) else {
            warn!("ops: no handler registered for {}", call.name);
            return;
        };
        if let Err(err) = handler(call.args) {
            error!("ops: {} failed: {err}", call.name);
        }
    }

    /// Dispatch everything already queued without waiting. Returns the number of calls run.
    pub fn drain_pending(&self, receiver: &mut OpReceiver) -> usize {
        let mut count = 0;
        loop {
            match receiver.try_recv() {
                Ok(call) => {
                    self.dispatch(call);
                    count += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        count
    }

    /// Dispatch calls until every sender has been dropped.
    pub async fn run(self, mut receiver: OpReceiver) {
        while let Some(call) = receiver.recv().await {
            self.dispatch(call);
        }
        debug!("ops: channel closed, dispatcher exiting");
    }
}

/// Handler for `op_print`: writes its arguments on the standard channel.
pub fn op_print(output: Arc<dyn HostOutput>) -> Arc<OpHandler> {
    Arc::new(move |args: Vec<JSValue>| -> Result<(), JSError> {
        output.print(&stringify_arguments(args), false);
        Ok(())
    })
}
