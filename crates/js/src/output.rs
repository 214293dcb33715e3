//! Host output routines backing `core.print`.
//!
//! Scripts never write to a stream directly. Everything they print ends up in
//! one of these `HostOutput` implementations, which keeps output routing in one
//! place so it can be swapped (stdio for the runner, `log` for embedding,
//! recording for tests).

use crate::bindings::HostOutput;
use log::{info, warn};
use std::io::{self, Write as _};
use std::sync::Mutex;

/// Writes the standard channel to stdout and the error channel to stderr.
pub struct StdioOutput;

impl HostOutput for StdioOutput {
    fn print(&self, message: &str, use_error_channel: bool) {
        // A closed pipe is not the script's problem.
        let _ignored = if use_error_channel {
            writeln!(io::stderr().lock(), "{message}")
        } else {
            writeln!(io::stdout().lock(), "{message}")
        };
    }
}

/// Routes script output through the `log` facade.
pub struct LogOutput;

impl HostOutput for LogOutput {
    #[inline]
    fn print(&self, message: &str, use_error_channel: bool) {
        if use_error_channel {
            warn!("[JS]: {message}");
        } else {
            info!("[JS]: {message}");
        }
    }
}

/// Keeps every line in memory, tagged with the channel it went to.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    lines: Mutex<Vec<(String, bool)>>,
}

impl RecordingOutput {
    /// Snapshot of `(message, used_error_channel)` pairs in write order.
    pub fn lines(&self) -> Vec<(String, bool)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Messages written to the error-style channel.
    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|(message, error)| error.then_some(message))
            .collect()
    }

    /// Messages written to the standard channel.
    pub fn standard(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|(message, error)| (!error).then_some(message))
            .collect()
    }
}

impl HostOutput for RecordingOutput {
    fn print(&self, message: &str, use_error_channel: bool) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((message.to_owned(), use_error_channel));
        }
    }
}
