//! One-shot installation of a context's global namespace.
//!
//! Bootstrap turns a borrowed [`CapabilityView`] into the closed set of
//! globals script code may use:
//!
//! | global           | source                                   |
//! |------------------|------------------------------------------|
//! | `console`        | `console.Console(dispatcher)`            |
//! | `URL`            | `url.URL`                                |
//! | `ReadableStream` | `streams.ReadableStream`                 |
//! | `fetch`          | `fetch.fetch`                            |
//! | `Headers`        | `fetch.Headers`                          |
//! | `Request`        | `fetch.Request`                          |
//! | `Response`       | `fetch.Response`                         |
//! | `Flubber`        | `{ print }`, forwarding to `op_print`    |
//!
//! The raw `core` primitives are only ever captured inside derived closures.
//! The view is consumed, so nothing installed can hold on to the bundle.

use crate::bindings::{HostContext, HostFnKind, HostFnSync, HostObject, JSError, JSValue};
use crate::capabilities::{CONSOLE, CORE, CapabilityView, FETCH, STREAMS, URL};
use crate::namespace::GlobalNamespace;
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

/// Host operation the print entry point forwards to.
pub const PRINT_OP: &str = "op_print";

/// Name of the namespace object exposing `print`.
pub const PRINT_NAMESPACE: &str = "Flubber";

/// Exactly the identifiers a bootstrapped namespace holds, sorted.
pub const APPROVED_GLOBALS: [&str; 8] = [
    "Flubber",
    "Headers",
    "ReadableStream",
    "Request",
    "Response",
    "URL",
    "console",
    "fetch",
];

/// The capability bundle lacks something bootstrap needs. Fatal to context startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupIntegrityFailure {
    /// Capability that was missing or incomplete.
    pub capability: String,
    /// Member of the capability, when the capability itself was present.
    pub member: Option<String>,
}

impl StartupIntegrityFailure {
    pub(crate) fn missing_capability(capability: &str) -> Self {
        Self {
            capability: capability.to_owned(),
            member: None,
        }
    }

    pub(crate) fn missing_member(capability: &str, member: &str) -> Self {
        Self {
            capability: capability.to_owned(),
            member: Some(member.to_owned()),
        }
    }
}

impl Display for StartupIntegrityFailure {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match &self.member {
            Some(member) => write!(
                formatter,
                "capability `{}` has no usable `{member}`",
                self.capability
            ),
            None => write!(formatter, "capability bundle is missing `{}`", self.capability),
        }
    }
}

impl Error for StartupIntegrityFailure {}

/// Whether a console severity goes to the error-style channel.
///
/// 0 debug and 1 info go to the standard channel; 2 warn and 3 error do not.
#[inline]
pub fn routes_to_error_channel(severity: f64) -> bool {
    severity > 1.0
}

/// Everything bootstrap takes from the bundle, resolved up front so a
/// missing piece fails before the namespace is touched.
struct Resolved {
    op_async: HostFnKind,
    print: HostFnKind,
    console: HostFnKind,
    url: JSValue,
    readable_stream: JSValue,
    fetch: JSValue,
    headers: JSValue,
    request: JSValue,
    response: JSValue,
}

impl Resolved {
    fn from_view(view: &CapabilityView<'_>) -> Result<Self, StartupIntegrityFailure> {
        Ok(Self {
            op_async: view.function(CORE, "opAsync")?,
            print: view.function(CORE, "print")?,
            console: view.function(CONSOLE, "Console")?,
            url: view.member(URL, "URL")?,
            readable_stream: view.member(STREAMS, "ReadableStream")?,
            fetch: view.member(FETCH, "fetch")?,
            headers: view.member(FETCH, "Headers")?,
            request: view.member(FETCH, "Request")?,
            response: view.member(FETCH, "Response")?,
        })
    }
}

/// Populate `globals` from `capabilities`. Runs once per context, before any
/// user code.
///
/// # Errors
/// `StartupIntegrityFailure` when a capability or member is missing, or the
/// console capability refuses to construct a console. On error `globals` is
/// left exactly as it was.
pub fn bootstrap(
    context: &HostContext,
    globals: &mut GlobalNamespace,
    capabilities: CapabilityView<'_>,
) -> Result<(), StartupIntegrityFailure> {
    debug!("bootstrap: context {} starting", context.context_id);
    let resolved = Resolved::from_view(&capabilities)?;
    drop(capabilities);

    let print_entry = make_print_entry(resolved.op_async);
    let dispatcher = make_log_dispatcher(resolved.print);
    let console = resolved
        .console
        .construct(context, vec![JSValue::Function(HostFnKind::Sync(dispatcher))])
        .map_err(|err| {
            debug!("bootstrap: Console construction failed: {err}");
            StartupIntegrityFailure::missing_member(CONSOLE, "Console")
        })?;

    globals.define("console", console);
    globals.define("URL", resolved.url);
    globals.define("ReadableStream", resolved.readable_stream);
    globals.define("fetch", resolved.fetch);
    globals.define("Headers", resolved.headers);
    globals.define("Request", resolved.request);
    globals.define("Response", resolved.response);
    globals.define(
        PRINT_NAMESPACE,
        JSValue::from(HostObject::with_class(PRINT_NAMESPACE).with_sync_fn("print", print_entry)),
    );
    globals.mark_initialized();

    debug!(
        "bootstrap: context {} ready with {} globals",
        context.context_id,
        globals.len()
    );
    Ok(())
}

/// `Flubber.print(...args)`: queue `op_print` with the arguments and return.
///
/// Never waits and never reports a failure of the privileged call.
fn make_print_entry(op_async: HostFnKind) -> Arc<HostFnSync> {
    Arc::new(
        move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            let mut forwarded = Vec::with_capacity(args.len() + 1);
            forwarded.push(JSValue::from(PRINT_OP));
            forwarded.extend(args);
            if let Err(err) = op_async.call(context, forwarded) {
                debug!("Flubber.print: {PRINT_OP} dropped: {err}");
            }
            Ok(JSValue::Undefined)
        },
    )
}

/// Console backend: `(message, severity)` -> `core.print(message, severity > 1)`.
fn make_log_dispatcher(print: HostFnKind) -> Arc<HostFnSync> {
    Arc::new(
        move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            let mut args = args.into_iter();
            let message = args.next().unwrap_or(JSValue::Undefined);
            let severity = args.next().and_then(|value| value.as_number()).unwrap_or(0.0);
            print.call(
                context,
                vec![message, JSValue::Boolean(routes_to_error_channel(severity))],
            )
        },
    )
}
