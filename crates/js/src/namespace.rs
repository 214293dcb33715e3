//! The context-scoped global namespace user code resolves identifiers against.

use crate::bindings::{HostFnKind, HostObject, JSValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Identifier -> value mapping for one script context.
///
/// Only the bootstrap writes to it; user code gets shared access through
/// [`ScriptContext`](crate::ScriptContext).
#[derive(Debug, Default)]
pub struct GlobalNamespace {
    entries: BTreeMap<String, JSValue>,
    initialized: bool,
}

impl GlobalNamespace {
    /// Create the empty namespace a context starts with.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn define(&mut self, name: &str, value: JSValue) {
        self.entries.insert(name.to_owned(), value);
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Whether bootstrap has completed on this namespace.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Look up a top-level identifier.
    pub fn get(&self, name: &str) -> Option<&JSValue> {
        self.entries.get(name)
    }

    /// Installed identifiers in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of installed identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a dotted property path such as `Flubber.print`.
    pub fn resolve(&self, path: &str) -> Option<JSValue> {
        let mut segments = path.split('.');
        let root = self.entries.get(segments.next()?)?.clone();
        segments.try_fold(root, |value, segment| value.as_object()?.get(segment))
    }

    /// Every value reachable by a property path from the namespace, paired with
    /// that path. An object reached twice is listed twice but walked once.
    pub fn reachable(&self) -> Vec<(String, JSValue)> {
        let mut seen: Vec<*const HostObject> = Vec::new();
        let mut out = Vec::new();
        let mut stack: Vec<(String, JSValue)> = self
            .entries
            .iter()
            .rev()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        while let Some((path, value)) = stack.pop() {
            if let JSValue::Object(object) = &value {
                let ptr = Arc::as_ptr(object);
                if !seen.contains(&ptr) {
                    seen.push(ptr);
                    for member in object.member_names().collect::<Vec<_>>().into_iter().rev() {
                        if let Some(child) = object.get(member) {
                            stack.push((format!("{path}.{member}"), child));
                        }
                    }
                }
            }
            out.push((path, value));
        }
        out
    }

    /// Whether any reachable function is the very closure `target`.
    pub fn reaches_function(&self, target: &HostFnKind) -> bool {
        self.reachable().iter().any(|(_, value)| {
            value
                .as_function()
                .is_some_and(|function| function.ptr_eq(target))
        })
    }

    /// Whether any reachable object is the very object `target`.
    pub fn reaches_object(&self, target: &Arc<HostObject>) -> bool {
        self.reachable().iter().any(|(_, value)| {
            value
                .as_object()
                .is_some_and(|object| Arc::ptr_eq(object, target))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GlobalNamespace {
        let inner = HostObject::new().with_property("leaf", JSValue::Number(1.0));
        let outer = HostObject::new()
            .with_property("inner", JSValue::from(inner))
            .with_fn("go", HostFnKind::sync(|_, _| Ok(JSValue::Undefined)));
        let mut namespace = GlobalNamespace::new();
        namespace.define("outer", JSValue::from(outer));
        namespace.define("flag", JSValue::Boolean(true));
        namespace
    }

    #[test]
    fn resolves_nested_paths() {
        let namespace = sample();
        assert_eq!(namespace.resolve("outer.inner.leaf").and_then(|value| value.as_number()), Some(1.0));
        assert!(namespace.resolve("outer.go").is_some_and(|value| value.as_function().is_some()));
        assert!(namespace.resolve("outer.missing").is_none());
        assert!(namespace.resolve("flag.nope").is_none());
        assert!(namespace.resolve("missing").is_none());
    }

    #[test]
    fn reachable_lists_every_path() {
        let namespace = sample();
        let paths: Vec<String> = namespace.reachable().into_iter().map(|(path, _)| path).collect();
        assert_eq!(
            paths,
            vec!["flag", "outer", "outer.inner", "outer.inner.leaf", "outer.go"]
        );
    }

    #[test]
    fn reachable_handles_shared_objects() {
        let shared = Arc::new(HostObject::new().with_property("x", JSValue::Null));
        let mut namespace = GlobalNamespace::new();
        namespace.define("a", JSValue::Object(Arc::clone(&shared)));
        namespace.define("b", JSValue::Object(Arc::clone(&shared)));
        assert!(namespace.reaches_object(&shared));
        assert_eq!(namespace.reachable().len(), 3);
    }
}
