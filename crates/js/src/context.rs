//! A bootstrapped script context: the environment user code is evaluated in.

use crate::bindings::{HostContext, JSError, JSValue};
use crate::bootstrap::{StartupIntegrityFailure, bootstrap};
use crate::capabilities::CapabilityBundle;
use crate::namespace::GlobalNamespace;

/// One isolated execution context.
///
/// Owns its host state and its global namespace. It never holds the
/// capability bundle it was started from.
pub struct ScriptContext {
    host: HostContext,
    globals: GlobalNamespace,
}

impl ScriptContext {
    /// Start a context: create an empty namespace and bootstrap it from a
    /// single view of `capabilities`.
    ///
    /// # Errors
    /// Returns the bootstrap's `StartupIntegrityFailure`; no context exists then.
    pub fn new(
        host: HostContext,
        capabilities: &CapabilityBundle,
    ) -> Result<Self, StartupIntegrityFailure> {
        let mut globals = GlobalNamespace::new();
        bootstrap(&host, &mut globals, capabilities.grant())?;
        Ok(Self { host, globals })
    }

    /// The populated global namespace.
    pub fn globals(&self) -> &GlobalNamespace {
        &self.globals
    }

    /// Host state handed to callbacks.
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Call the function at a dotted global path, e.g. `console.log`.
    ///
    /// # Errors
    /// `TypeError` when the path does not resolve to a callable, or whatever
    /// the callee reports.
    pub fn call(&self, path: &str, args: Vec<JSValue>) -> Result<JSValue, JSError> {
        let callee = self
            .globals
            .resolve(path)
            .ok_or_else(|| JSError::TypeError(format!("{path} is not defined")))?;
        self.call_value(&callee, args)
            .map_err(|err| rename_not_callable(err, path))
    }

    /// `new` the constructor at a dotted global path, e.g. `URL`.
    ///
    /// # Errors
    /// `TypeError` when the path does not resolve to a constructor, or whatever
    /// the constructor reports.
    pub fn construct(&self, path: &str, args: Vec<JSValue>) -> Result<JSValue, JSError> {
        let callee = self
            .globals
            .resolve(path)
            .ok_or_else(|| JSError::TypeError(format!("{path} is not defined")))?;
        self.construct_value(&callee, args)
    }

    /// Call an arbitrary value.
    ///
    /// # Errors
    /// `TypeError` when `callee` is not a plain function.
    pub fn call_value(&self, callee: &JSValue, args: Vec<JSValue>) -> Result<JSValue, JSError> {
        match callee {
            JSValue::Function(function) => function.call(&self.host, args),
            _ => Err(JSError::TypeError(String::from("value is not a function"))),
        }
    }

    /// `new` an arbitrary value.
    ///
    /// # Errors
    /// `TypeError` when `callee` is not a constructor.
    pub fn construct_value(
        &self,
        callee: &JSValue,
        args: Vec<JSValue>,
    ) -> Result<JSValue, JSError> {
        match callee {
            JSValue::Function(function) => function.construct(&self.host, args),
            _ => Err(JSError::TypeError(String::from("value is not a constructor"))),
        }
    }
}

fn rename_not_callable(err: JSError, path: &str) -> JSError {
    match err {
        JSError::TypeError(message) if message == "value is not a function" => {
            JSError::TypeError(format!("{path} is not a function"))
        }
        other => other,
    }
}
