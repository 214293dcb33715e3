use super::values::LogLevel;

/// Cross-runtime logger used by bindings like `console.*`.
pub trait HostLogger: Send + Sync {
    /// Log a pre-formatted message with a given level.
    fn log(&self, level: LogLevel, message: &str);
}

/// Host-side output routine with a standard and an error-style channel.
pub trait HostOutput: Send + Sync {
    /// Write one message. `use_error_channel` selects the error-style channel.
    fn print(&self, message: &str, use_error_channel: bool);
}
