//! Engine-agnostic sandbox facade for Flubber script contexts.
//!
//! A context starts with nothing. The host builds a [`CapabilityBundle`],
//! starts a [`ScriptContext`] from it, and from then on script code can only
//! reach what [`bootstrap`] installed into the context's [`GlobalNamespace`].
//! Output produced through `Flubber.print` travels as one-way [`OpCall`]s to
//! the host's [`OpDispatcher`].

/// Engine-agnostic host bindings facade: values, host objects and loggers.
pub mod bindings;
pub use bindings::{
    HostContext, HostFnKind, HostFnSync, HostLogger, HostObject, HostOutput, JSError, JSValue,
    LogLevel, NetPolicy, stringify_arguments, stringify_value,
};

/// Privileged capabilities and their default host implementations.
pub mod capabilities;
pub use capabilities::{CapabilityBundle, CapabilityView, build_default_capabilities};

pub mod bootstrap;
pub use bootstrap::{
    APPROVED_GLOBALS, PRINT_NAMESPACE, PRINT_OP, StartupIntegrityFailure, bootstrap,
    routes_to_error_channel,
};

pub mod context;
pub use context::ScriptContext;

pub mod namespace;
pub use namespace::GlobalNamespace;

/// One-way host operations and their dispatcher.
pub mod ops;
pub use ops::{OpCall, OpDispatcher, OpHandler, OpReceiver, OpSender, op_channel, op_print};

/// Host output routines (stdio, `log`, recording).
pub mod output;
pub use output::{LogOutput, RecordingOutput, StdioOutput};
