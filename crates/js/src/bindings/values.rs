use super::{HostFnKind, HostObject};
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

/// An engine-agnostic representation of JavaScript values.
///
/// Objects and functions are host-owned and shared by reference, so cloning a
/// value never copies the underlying object.
#[derive(Clone, Debug)]
pub enum JSValue {
    /// The `undefined` value.
    Undefined,
    /// The `null` value.
    Null,
    /// A boolean primitive.
    Boolean(bool),
    /// A number (IEEE 754 double precision).
    Number(f64),
    /// A string value (UTF-8).
    String(String),
    /// A host object (namespace, class instance).
    Object(Arc<HostObject>),
    /// A callable host function or constructor.
    Function(HostFnKind),
}

impl JSValue {
    /// Borrow the string payload, if this is a string.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Return the numeric payload, if this is a number.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Return the boolean payload, if this is a boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Borrow the object payload, if this is an object.
    #[inline]
    pub fn as_object(&self) -> Option<&Arc<HostObject>> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Borrow the function payload, if this is callable.
    #[inline]
    pub fn as_function(&self) -> Option<&HostFnKind> {
        match self {
            Self::Function(function) => Some(function),
            _ => None,
        }
    }

    /// `true` for `undefined` and `null`.
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }
}

impl From<&str> for JSValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for JSValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for JSValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for JSValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<HostObject> for JSValue {
    fn from(value: HostObject) -> Self {
        Self::Object(Arc::new(value))
    }
}

/// Error type used by host callbacks.
#[derive(Debug)]
pub enum JSError {
    /// A type error (for example, wrong argument types).
    TypeError(String),
    /// An internal error not exposed to user code in detail.
    InternalError(String),
}

impl Display for JSError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::TypeError(message) => write!(formatter, "TypeError: {message}"),
            Self::InternalError(message) => write!(formatter, "InternalError: {message}"),
        }
    }
}

impl Error for JSError {}

/// Log severity levels understood by the host logger.
///
/// The numeric severities are the ones console backends receive:
/// 0 debug, 1 info, 2 warn, 3 error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Numeric severity passed to console backends.
    #[inline]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Warn => 2,
            Self::Error => 3,
        }
    }
}
