//! Engine-agnostic host bindings facade for describing functions, objects and
//! properties that are reachable from script code.
//!
//! This module defines a small set of value types that allow the host to
//! hand capabilities to a script context without depending on
//! engine-specific APIs. Capabilities are plain `HostObject`s; the bootstrap
//! copies selected members of them into the context's global namespace.

use std::collections::BTreeMap;
use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

mod values;
pub use values::{JSError, JSValue, LogLevel};
mod logger;
pub use logger::{HostLogger, HostOutput};

use crate::capabilities::net::FetchRegistry;

/// Source of per-process unique context identifiers.
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Network policy applied by the `fetch` capability.
#[derive(Clone, Debug)]
pub struct NetPolicy {
    /// Restrict http(s) to loopback `http` instead of allowing any origin.
    pub strict: bool,
    /// User agent header sent with http(s) requests.
    pub user_agent: String,
}

impl NetPolicy {
    /// Read the policy from `FLUBBER_NET_STRICT` and `FLUBBER_USER_AGENT`.
    pub fn from_env() -> Self {
        let strict = env::var("FLUBBER_NET_STRICT")
            .ok()
            .is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));
        let user_agent = env::var("FLUBBER_USER_AGENT")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(default_user_agent);
        Self {
            strict,
            user_agent,
        }
    }
}

impl Default for NetPolicy {
    fn default() -> Self {
        Self {
            strict: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("flubber/{}", env!("CARGO_PKG_VERSION"))
}

/// Execution context passed to host callbacks.
#[derive(Clone)]
pub struct HostContext {
    /// Identifier of the script context this host state belongs to.
    pub context_id: u64,
    /// Tokio runtime handle for spawning async network tasks.
    pub tokio_handle: tokio::runtime::Handle,
    /// Shared network request registry between `fetch` and its pending handles.
    pub fetch_registry: Arc<Mutex<FetchRegistry>>,
    /// Network policy consulted by `fetch`.
    pub net_policy: NetPolicy,
}

impl HostContext {
    /// Create host state for a fresh context with a new id and empty registry.
    pub fn new(tokio_handle: tokio::runtime::Handle, net_policy: NetPolicy) -> Self {
        Self {
            context_id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            tokio_handle,
            fetch_registry: Arc::new(Mutex::new(FetchRegistry::default())),
            net_policy,
        }
    }
}

/// A synchronous host function signature.
pub type HostFnSync =
    dyn Fn(&HostContext, Vec<JSValue>) -> Result<JSValue, JSError> + Send + Sync + 'static;

/// A single function descriptor the engine adapter can install.
#[derive(Clone)]
pub enum HostFnKind {
    /// Plain synchronous function.
    Sync(Arc<HostFnSync>),
    /// Class constructor, only callable with `new`.
    Constructor(Arc<HostFnSync>),
}

impl HostFnKind {
    /// Wrap a closure as a plain function.
    pub fn sync<F>(function: F) -> Self
    where
        F: Fn(&HostContext, Vec<JSValue>) -> Result<JSValue, JSError> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(function))
    }

    /// Wrap a closure as a constructor.
    pub fn constructor<F>(function: F) -> Self
    where
        F: Fn(&HostContext, Vec<JSValue>) -> Result<JSValue, JSError> + Send + Sync + 'static,
    {
        Self::Constructor(Arc::new(function))
    }

    /// Invoke as a plain call.
    ///
    /// # Errors
    /// Returns `TypeError` when called on a constructor, or whatever the
    /// host function reports.
    pub fn call(&self, context: &HostContext, args: Vec<JSValue>) -> Result<JSValue, JSError> {
        match self {
            Self::Sync(function) => function(context, args),
            Self::Constructor(_) => Err(JSError::TypeError(String::from(
                "class constructor cannot be invoked without 'new'",
            ))),
        }
    }

    /// Invoke with `new` semantics.
    ///
    /// # Errors
    /// Returns `TypeError` when the target is not a constructor, or whatever
    /// the host constructor reports.
    pub fn construct(
        &self,
        context: &HostContext,
        args: Vec<JSValue>,
    ) -> Result<JSValue, JSError> {
        match self {
            Self::Constructor(function) => function(context, args),
            Self::Sync(_) => Err(JSError::TypeError(String::from("value is not a constructor"))),
        }
    }

    /// Identity comparison: `true` when both refer to the same host closure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sync(left), Self::Sync(right))
            | (Self::Constructor(left), Self::Constructor(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl Debug for HostFnKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Sync(_) => formatter.write_str("HostFnKind::Sync(..)"),
            Self::Constructor(_) => formatter.write_str("HostFnKind::Constructor(..)"),
        }
    }
}

/// A host object: a namespace such as `console`, a capability, or a class
/// instance produced by a host constructor.
#[derive(Debug)]
pub struct HostObject {
    /// Class name reported for the object (`Object` for plain namespaces).
    pub class_name: String,
    /// Functions installed on this object.
    pub functions: BTreeMap<String, HostFnKind>,
    /// Constant properties installed on this object.
    pub properties: BTreeMap<String, JSValue>,
}

impl HostObject {
    /// Create an empty plain object.
    pub fn new() -> Self {
        Self::with_class("Object")
    }

    /// Create an empty object reporting the given class name.
    pub fn with_class(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_owned(),
            functions: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Register a synchronous function.
    pub fn with_sync_fn(mut self, name: &str, function: Arc<HostFnSync>) -> Self {
        self.functions
            .insert(name.to_owned(), HostFnKind::Sync(function));
        self
    }

    /// Register an already wrapped function or constructor.
    pub fn with_fn(mut self, name: &str, function: HostFnKind) -> Self {
        self.functions.insert(name.to_owned(), function);
        self
    }

    /// Register a constant property.
    pub fn with_property(mut self, name: &str, value: JSValue) -> Self {
        self.properties.insert(name.to_owned(), value);
        self
    }

    /// Look up a member by name; properties shadow functions.
    pub fn get(&self, name: &str) -> Option<JSValue> {
        self.properties.get(name).cloned().or_else(|| {
            self.functions
                .get(name)
                .map(|function| JSValue::Function(function.clone()))
        })
    }

    /// Names of all members, properties first.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .keys()
            .chain(self.functions.keys())
            .map(String::as_str)
    }

    /// Call a function member by name.
    ///
    /// # Errors
    /// Returns `TypeError` if the member is missing or not callable.
    pub fn call_method(
        &self,
        context: &HostContext,
        name: &str,
        args: Vec<JSValue>,
    ) -> Result<JSValue, JSError> {
        let function = self.functions.get(name).ok_or_else(|| {
            JSError::TypeError(format!("{}.{name} is not a function", self.class_name))
        })?;
        function.call(context, args)
    }
}

impl Default for HostObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a list of JSValue to a space-separated string.
pub fn stringify_arguments(arguments: Vec<JSValue>) -> String {
    arguments
        .into_iter()
        .map(stringify_value)
        .collect::<Vec<_>>()
        .join(" ")
}

/// String rendering of a single value, in the manner of `String(value)`.
pub fn stringify_value(value: JSValue) -> String {
    match value {
        JSValue::Undefined => String::from("undefined"),
        JSValue::Null => String::from("null"),
        JSValue::Boolean(value) => value.to_string(),
        JSValue::Number(value) => value.to_string(),
        JSValue::String(value) => value,
        JSValue::Object(object) => format!("[object {}]", object.class_name),
        JSValue::Function(_) => String::from("function () { [native code] }"),
    }
}

/// Read a required string argument.
///
/// # Errors
/// Returns `TypeError` naming the argument when absent or not a string.
pub fn string_arg(args: &[JSValue], index: usize, name: &str) -> Result<String, JSError> {
    match args.get(index) {
        Some(JSValue::String(value)) => Ok(value.clone()),
        Some(_) => Err(JSError::TypeError(format!("{name} must be a string"))),
        None => Err(JSError::TypeError(format!("{name} is required"))),
    }
}

/// Read an optional string argument; `undefined` and `null` count as absent.
///
/// # Errors
/// Returns `TypeError` naming the argument when present but not a string.
pub fn optional_string_arg(
    args: &[JSValue],
    index: usize,
    name: &str,
) -> Result<Option<String>, JSError> {
    match args.get(index) {
        None | Some(JSValue::Undefined | JSValue::Null) => Ok(None),
        Some(JSValue::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(JSError::TypeError(format!("{name} must be a string"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_joins_with_spaces() {
        let text = stringify_arguments(vec![
            JSValue::from("hello"),
            JSValue::Number(42.0),
            JSValue::Boolean(true),
            JSValue::Null,
            JSValue::Undefined,
        ]);
        assert_eq!(text, "hello 42 true null undefined");
    }

    #[test]
    fn stringify_objects_by_class() {
        let object = JSValue::from(HostObject::with_class("URL"));
        assert_eq!(stringify_value(object), "[object URL]");
    }

    #[test]
    fn constructors_refuse_plain_calls() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let context = HostContext::new(runtime.handle().clone(), NetPolicy::default());
        let ctor = HostFnKind::constructor(|_, _| Ok(JSValue::Null));
        assert!(matches!(ctor.call(&context, Vec::new()), Err(JSError::TypeError(_))));
        assert!(matches!(ctor.construct(&context, Vec::new()), Ok(JSValue::Null)));

        let plain = HostFnKind::sync(|_, _| Ok(JSValue::Null));
        assert!(matches!(plain.construct(&context, Vec::new()), Err(JSError::TypeError(_))));
    }

    #[test]
    fn ptr_eq_tracks_identity() {
        let function = HostFnKind::sync(|_, _| Ok(JSValue::Undefined));
        let copy = function.clone();
        let other = HostFnKind::sync(|_, _| Ok(JSValue::Undefined));
        assert!(function.ptr_eq(&copy));
        assert!(!function.ptr_eq(&other));
    }

    #[test]
    fn properties_shadow_functions() {
        let object = HostObject::new()
            .with_fn("name", HostFnKind::sync(|_, _| Ok(JSValue::Undefined)))
            .with_property("name", JSValue::from("value"));
        assert_eq!(object.get("name").and_then(|value| value.as_str().map(str::to_owned)), Some(String::from("value")));
    }
}
