//! The privileged capability bundle handed to a context at startup, and the
//! host's default implementations of each capability.
//!
//! The bundle stays owned by the host. Bootstrap only ever sees a
//! [`CapabilityView`], a borrow that cannot outlive the call it is passed to.

use crate::bindings::{HostFnKind, HostObject, HostOutput, JSValue};
use crate::bootstrap::StartupIntegrityFailure;
use crate::ops::OpSender;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod console;
pub mod fetch;
pub mod net;
pub mod primitives;
pub mod streams;
pub mod urls;
mod util;

/// Capability name of the privileged op/print primitives.
pub const CORE: &str = "core";
/// Capability name of the console implementation.
pub const CONSOLE: &str = "console";
/// Capability name of the URL implementation.
pub const URL: &str = "url";
/// Capability name of the streams implementation.
pub const STREAMS: &str = "streams";
/// Capability name of the fetch suite.
pub const FETCH: &str = "fetch";

/// Host-supplied mapping from capability name to implementation object.
#[derive(Debug, Default)]
pub struct CapabilityBundle {
    capabilities: BTreeMap<String, Arc<HostObject>>,
    grants: AtomicUsize,
}

impl CapabilityBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a capability.
    pub fn with_capability(mut self, name: &str, capability: HostObject) -> Self {
        self.capabilities
            .insert(name.to_owned(), Arc::new(capability));
        self
    }

    /// Remove a capability, if present.
    pub fn without_capability(mut self, name: &str) -> Self {
        self.capabilities.remove(name);
        self
    }

    /// Look up a capability object.
    pub fn get(&self, name: &str) -> Option<&Arc<HostObject>> {
        self.capabilities.get(name)
    }

    /// Names of all capabilities in the bundle.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }

    /// Grant a read-only view for one bootstrap run.
    pub fn grant(&self) -> CapabilityView<'_> {
        self.grants.fetch_add(1, Ordering::SeqCst);
        CapabilityView { bundle: self }
    }

    /// Number of views granted so far. A healthy host grants exactly one per context.
    pub fn grant_count(&self) -> usize {
        self.grants.load(Ordering::SeqCst)
    }
}

/// Borrowed, read-only access to a bundle for the duration of bootstrap.
#[derive(Debug)]
pub struct CapabilityView<'bundle> {
    bundle: &'bundle CapabilityBundle,
}

impl CapabilityView<'_> {
    /// Resolve `capability.member`.
    ///
    /// # Errors
    /// Returns `StartupIntegrityFailure` when the capability or the member is absent.
    pub fn member(&self, capability: &str, member: &str) -> Result<JSValue, StartupIntegrityFailure> {
        let object = self
            .bundle
            .get(capability)
            .ok_or_else(|| StartupIntegrityFailure::missing_capability(capability))?;
        object
            .get(member)
            .ok_or_else(|| StartupIntegrityFailure::missing_member(capability, member))
    }

    /// Resolve `capability.member` and require it to be callable.
    ///
    /// # Errors
    /// Returns `StartupIntegrityFailure` when absent or not a function.
    pub fn function(
        &self,
        capability: &str,
        member: &str,
    ) -> Result<HostFnKind, StartupIntegrityFailure> {
        match self.member(capability, member)? {
            JSValue::Function(function) => Ok(function),
            _ => Err(StartupIntegrityFailure::missing_member(capability, member)),
        }
    }
}

/// Assemble the host's default bundle: `core` wired to `output` and `ops`,
/// plus console, URL, streams and fetch implementations.
pub fn build_default_capabilities(output: Arc<dyn HostOutput>, ops: OpSender) -> CapabilityBundle {
    CapabilityBundle::new()
        .with_capability(CORE, primitives::build_core_capability(output, ops))
        .with_capability(CONSOLE, console::build_console_capability())
        .with_capability(URL, urls::build_url_capability())
        .with_capability(STREAMS, streams::build_streams_capability())
        .with_capability(FETCH, fetch::build_fetch_capability())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::op_channel;
    use crate::output::LogOutput;

    #[test]
    fn default_bundle_has_every_capability() {
        let (sender, _receiver) = op_channel();
        let bundle = build_default_capabilities(Arc::new(LogOutput), sender);
        let names: Vec<&str> = bundle.names().collect();
        assert_eq!(names, vec![CONSOLE, CORE, FETCH, STREAMS, URL]);
    }

    #[test]
    fn views_are_counted() {
        let bundle = CapabilityBundle::new();
        assert_eq!(bundle.grant_count(), 0);
        let view = bundle.grant();
        drop(view);
        assert_eq!(bundle.grant_count(), 1);
    }

    #[test]
    fn missing_members_are_integrity_failures() {
        let bundle = CapabilityBundle::new().with_capability(FETCH, HostObject::new());
        let view = bundle.grant();
        let error = view.member(FETCH, "fetch").unwrap_err();
        assert_eq!(error.capability, FETCH);
        assert_eq!(error.member.as_deref(), Some("fetch"));
        let error = view.member(CORE, "print").unwrap_err();
        assert_eq!(error.member, None);
    }

    #[test]
    fn non_callable_member_is_rejected_as_function() {
        let bundle = CapabilityBundle::new()
            .with_capability(CORE, HostObject::new().with_property("print", JSValue::Null));
        assert!(bundle.grant().function(CORE, "print").is_err());
    }
}
