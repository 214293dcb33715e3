//! The `console` capability: a `Console` class whose instances format their
//! arguments and hand the line to a single printer backend.
//!
//! The printer is called as `printer(message, severity)` with the numeric
//! severities of [`LogLevel`]. Which stream a severity lands on is the
//! printer's decision, not the console's.

use crate::bindings::{
    HostContext, HostFnKind, HostFnSync, HostLogger, HostObject, JSError, JSValue, LogLevel,
    stringify_arguments,
};
use log::debug;
use std::sync::Arc;

/// Console methods and the level each one logs at.
const METHODS: [(&str, LogLevel); 5] = [
    ("debug", LogLevel::Debug),
    ("log", LogLevel::Info),
    ("info", LogLevel::Info),
    ("warn", LogLevel::Warn),
    ("error", LogLevel::Error),
];

/// Build the `console` capability exposing the `Console` constructor.
pub fn build_console_capability() -> HostObject {
    HostObject::with_class("ConsoleCapability")
        .with_fn("Console", HostFnKind::constructor(construct_console))
}

/// `new Console(printer)`.
fn construct_console(context: &HostContext, args: Vec<JSValue>) -> Result<JSValue, JSError> {
    let printer = match args.into_iter().next() {
        Some(JSValue::Function(printer)) => printer,
        _ => {
            return Err(JSError::TypeError(String::from(
                "Console(printer) requires a printer function",
            )));
        }
    };
    let logger = PrinterLogger {
        printer,
        context: context.clone(),
    };
    Ok(JSValue::from(build_console_object(Arc::new(logger))))
}

/// Build a console object whose methods all funnel into `logger`.
pub fn build_console_object(logger: Arc<dyn HostLogger>) -> HostObject {
    METHODS
        .iter()
        .fold(HostObject::with_class("Console"), |console, (name, level)| {
            console.with_sync_fn(name, make_log_fn(Arc::clone(&logger), *level))
        })
}

/// Internal helper to build a console logging function for a given level.
fn make_log_fn(logger: Arc<dyn HostLogger>, level: LogLevel) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, arguments: Vec<JSValue>| -> Result<JSValue, JSError> {
            let message = stringify_arguments(arguments);
            logger.log(level, &message);
            Ok(JSValue::Undefined)
        },
    )
}

/// Adapts a script-visible printer function to the `HostLogger` interface.
struct PrinterLogger {
    printer: HostFnKind,
    context: HostContext,
}

impl HostLogger for PrinterLogger {
    fn log(&self, level: LogLevel, message: &str) {
        let args = vec![
            JSValue::from(message),
            JSValue::Number(f64::from(level.severity())),
        ];
        if let Err(err) = self.printer.call(&self.context, args) {
            debug!("console: printer failed: {err}");
        }
    }
}
