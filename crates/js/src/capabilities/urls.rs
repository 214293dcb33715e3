//! The `url` capability: a `URL` class backed by the `url` crate.

use crate::bindings::{
    HostContext, HostFnKind, HostObject, JSError, JSValue, optional_string_arg, string_arg,
};
use url::Url;

/// Build the `url` capability exposing the `URL` constructor.
pub fn build_url_capability() -> HostObject {
    HostObject::with_class("UrlCapability").with_fn("URL", HostFnKind::constructor(construct_url))
}

/// `new URL(input, base?)`.
fn construct_url(_context: &HostContext, args: Vec<JSValue>) -> Result<JSValue, JSError> {
    let input = string_arg(&args, 0, "url")?;
    let base = optional_string_arg(&args, 1, "base")?;
    let parsed = parse_url(&input, base.as_deref())?;
    Ok(JSValue::from(url_object(&parsed)))
}

/// Parse `input`, resolving it against `base` when given.
///
/// # Errors
/// `TypeError` when either string is not a valid URL.
pub fn parse_url(input: &str, base: Option<&str>) -> Result<Url, JSError> {
    let invalid = || JSError::TypeError(format!("Invalid URL: {input}"));
    match base {
        Some(base) => {
            let base = Url::parse(base)
                .map_err(|_| JSError::TypeError(format!("Invalid base URL: {base}")))?;
            base.join(input).map_err(|_| invalid())
        }
        None => Url::parse(input).map_err(|_| invalid()),
    }
}

/// Snapshot a parsed URL into a `URL` instance.
pub fn url_object(parsed: &Url) -> HostObject {
    let href = parsed.to_string();
    let host = match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        (None, _) => String::new(),
    };
    let search = parsed
        .query()
        .filter(|query| !query.is_empty())
        .map(|query| format!("?{query}"))
        .unwrap_or_default();
    let hash = parsed
        .fragment()
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| format!("#{fragment}"))
        .unwrap_or_default();
    let to_string = href.clone();

    HostObject::with_class("URL")
        .with_property("href", JSValue::from(href))
        .with_property("origin", JSValue::from(parsed.origin().ascii_serialization()))
        .with_property("protocol", JSValue::from(format!("{}:", parsed.scheme())))
        .with_property("username", JSValue::from(parsed.username()))
        .with_property("password", JSValue::from(parsed.password().unwrap_or("")))
        .with_property("host", JSValue::from(host))
        .with_property("hostname", JSValue::from(parsed.host_str().unwrap_or("")))
        .with_property(
            "port",
            JSValue::from(parsed.port().map(|port| port.to_string()).unwrap_or_default()),
        )
        .with_property("pathname", JSValue::from(parsed.path()))
        .with_property("search", JSValue::from(search))
        .with_property("hash", JSValue::from(hash))
        .with_fn(
            "toString",
            HostFnKind::sync(move |_, _| Ok(JSValue::from(to_string.as_str()))),
        )
}
