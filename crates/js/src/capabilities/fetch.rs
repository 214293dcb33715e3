//! The `fetch` capability: `fetch`, `Headers`, `Request` and `Response`.
//!
//! `fetch` does not block. It registers the request in the context's
//! [`FetchRegistry`](super::net::FetchRegistry), spawns the transfer on the
//! context's Tokio handle and returns a pending handle whose `poll()` yields
//! `null` until the response is in.

use super::net::{FetchDone, FetchEntry, FetchRequest, perform};
use super::streams::readable_stream;
use super::urls::parse_url;
use super::util::{header_pairs, parse_header_json};
use crate::bindings::{HostContext, HostFnKind, HostObject, JSError, JSValue, stringify_value};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared, mutable header list behind a `Headers` instance.
type HeaderList = Arc<Mutex<Vec<(String, String)>>>;

/// Build the `fetch` capability.
pub fn build_fetch_capability() -> HostObject {
    HostObject::with_class("FetchCapability")
        .with_fn("fetch", HostFnKind::sync(fetch))
        .with_fn("Headers", HostFnKind::constructor(construct_headers))
        .with_fn("Request", HostFnKind::constructor(construct_request))
        .with_fn("Response", HostFnKind::constructor(construct_response))
}

fn poisoned() -> JSError {
    JSError::InternalError(String::from("mutex poisoned"))
}

// =====================
// Headers
// =====================

fn construct_headers(context: &HostContext, args: Vec<JSValue>) -> Result<JSValue, JSError> {
    let pairs = header_init(context, args.first())?;
    Ok(JSValue::from(headers_object(pairs)))
}

/// Accepts JSON text (object or pair list) or another `Headers` instance.
fn header_init(
    context: &HostContext,
    init: Option<&JSValue>,
) -> Result<Vec<(String, String)>, JSError> {
    match init {
        None | Some(JSValue::Undefined | JSValue::Null) => Ok(Vec::new()),
        Some(JSValue::String(json)) => parse_header_json(json)
            .ok_or_else(|| JSError::TypeError(String::from("headers must be a JSON object or pair list"))),
        Some(JSValue::Object(object)) if object.functions.contains_key("toJSON") => {
            let json = object.call_method(context, "toJSON", Vec::new())?;
            let json = json
                .as_str()
                .ok_or_else(|| JSError::TypeError(String::from("Headers.toJSON returned a non-string")))?;
            parse_header_json(json)
                .ok_or_else(|| JSError::TypeError(String::from("invalid headers")))
        }
        Some(_) => Err(JSError::TypeError(String::from("invalid headers init"))),
    }
}

/// Build a `Headers` instance. Names are stored lower-cased.
pub fn headers_object(pairs: Vec<(String, String)>) -> HostObject {
    let list: HeaderList = Arc::new(Mutex::new(
        pairs
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect(),
    ));

    let get_list = Arc::clone(&list);
    let get = HostFnKind::sync(move |_, args| {
        let name = header_name(&args)?;
        let guard = get_list.lock().map_err(|_| poisoned())?;
        let values: Vec<&str> = guard
            .iter()
            .filter(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
            .collect();
        if values.is_empty() {
            Ok(JSValue::Null)
        } else {
            Ok(JSValue::from(values.join(", ")))
        }
    });

    let has_list = Arc::clone(&list);
    let has = HostFnKind::sync(move |_, args| {
        let name = header_name(&args)?;
        let guard = has_list.lock().map_err(|_| poisoned())?;
        Ok(JSValue::Boolean(guard.iter().any(|(key, _)| *key == name)))
    });

    let set_list = Arc::clone(&list);
    let set = HostFnKind::sync(move |_, args| {
        let name = header_name(&args)?;
        let value = header_value(&args)?;
        let mut guard = set_list.lock().map_err(|_| poisoned())?;
        guard.retain(|(key, _)| *key != name);
        guard.push((name, value));
        Ok(JSValue::Undefined)
    });

    let append_list = Arc::clone(&list);
    let append = HostFnKind::sync(move |_, args| {
        let name = header_name(&args)?;
        let value = header_value(&args)?;
        append_list.lock().map_err(|_| poisoned())?.push((name, value));
        Ok(JSValue::Undefined)
    });

    let delete_list = Arc::clone(&list);
    let delete = HostFnKind::sync(move |_, args| {
        let name = header_name(&args)?;
        delete_list
            .lock()
            .map_err(|_| poisoned())?
            .retain(|(key, _)| *key != name);
        Ok(JSValue::Undefined)
    });

    let json_list = Arc::clone(&list);
    let to_json = HostFnKind::sync(move |_, _| {
        let guard = json_list.lock().map_err(|_| poisoned())?;
        serde_json::to_string(&*guard)
            .map(JSValue::from)
            .map_err(|err| JSError::InternalError(err.to_string()))
    });

    HostObject::with_class("Headers")
        .with_fn("get", get)
        .with_fn("has", has)
        .with_fn("set", set)
        .with_fn("append", append)
        .with_fn("delete", delete)
        .with_fn("toJSON", to_json)
}

fn header_name(args: &[JSValue]) -> Result<String, JSError> {
    match args.first() {
        Some(JSValue::String(name)) if !name.is_empty() => Ok(name.to_ascii_lowercase()),
        _ => Err(JSError::TypeError(String::from("header name must be a non-empty string"))),
    }
}

fn header_value(args: &[JSValue]) -> Result<String, JSError> {
    args.get(1)
        .cloned()
        .map(stringify_value)
        .ok_or_else(|| JSError::TypeError(String::from("header value is required")))
}

/// Read the pairs back out of a `Headers` instance.
fn headers_of(context: &HostContext, object: &HostObject) -> Result<Vec<(String, String)>, JSError> {
    match object.get("headers") {
        Some(headers) => header_init(context, Some(&headers)),
        None => Ok(Vec::new()),
    }
}

// =====================
// Request
// =====================

#[derive(Debug, Default, Deserialize)]
struct RequestInit {
    method: Option<String>,
    headers: Option<Value>,
    body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInit {
    status: Option<u16>,
    status_text: Option<String>,
    headers: Option<Value>,
}

/// Everything needed to build a `Request` instance or start a fetch.
#[derive(Debug)]
struct RequestParts {
    url: url::Url,
    method: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

fn parse_init<T: for<'de> Deserialize<'de> + Default>(
    init: Option<&JSValue>,
) -> Result<T, JSError> {
    match init {
        None | Some(JSValue::Undefined | JSValue::Null) => Ok(T::default()),
        Some(JSValue::String(json)) => serde_json::from_str(json)
            .map_err(|err| JSError::TypeError(format!("invalid init: {err}"))),
        Some(_) => Err(JSError::TypeError(String::from("init must be a JSON string"))),
    }
}

fn init_headers(headers: Option<&Value>) -> Result<Option<Vec<(String, String)>>, JSError> {
    headers
        .map(|headers| {
            header_pairs(headers)
                .ok_or_else(|| JSError::TypeError(String::from("invalid headers in init")))
        })
        .transpose()
}

/// Resolve `(input, init?)` the way `Request` and `fetch` both accept it.
fn request_parts(context: &HostContext, args: &[JSValue]) -> Result<RequestParts, JSError> {
    let mut parts = match args.first() {
        Some(JSValue::String(input)) => RequestParts {
            url: parse_url(input, None)?,
            method: String::from("GET"),
            headers: Vec::new(),
            body: None,
        },
        Some(JSValue::Object(request)) if request.class_name == "Request" => {
            let field = |name: &str| request.get(name).and_then(|value| value.as_str().map(str::to_owned));
            RequestParts {
                url: parse_url(&field("url").unwrap_or_default(), None)?,
                method: field("method").unwrap_or_else(|| String::from("GET")),
                headers: headers_of(context, request)?,
                body: field("body"),
            }
        }
        Some(JSValue::Object(location)) if location.class_name == "URL" => {
            let href = location
                .get("href")
                .and_then(|value| value.as_str().map(str::to_owned))
                .unwrap_or_default();
            RequestParts {
                url: parse_url(&href, None)?,
                method: String::from("GET"),
                headers: Vec::new(),
                body: None,
            }
        }
        _ => return Err(JSError::TypeError(String::from("input must be a URL string or Request"))),
    };

    let init: RequestInit = parse_init(args.get(1))?;
    if let Some(method) = init.method {
        parts.method = method;
    }
    parts.method = parts.method.to_ascii_uppercase();
    if let Some(headers) = init_headers(init.headers.as_ref())? {
        parts.headers = headers;
    }
    if init.body.is_some() {
        parts.body = init.body;
    }
    if parts.body.is_some() && matches!(parts.method.as_str(), "GET" | "HEAD") {
        return Err(JSError::TypeError(String::from(
            "Request with GET/HEAD method cannot have body",
        )));
    }
    Ok(parts)
}

fn construct_request(context: &HostContext, args: Vec<JSValue>) -> Result<JSValue, JSError> {
    let parts = request_parts(context, &args)?;
    let body = parts.body.map_or(JSValue::Null, JSValue::from);
    Ok(JSValue::from(
        HostObject::with_class("Request")
            .with_property("url", JSValue::from(parts.url.to_string()))
            .with_property("method", JSValue::from(parts.method))
            .with_property("headers", JSValue::from(headers_object(parts.headers)))
            .with_property("body", body),
    ))
}

// =====================
// Response
// =====================

fn construct_response(_context: &HostContext, args: Vec<JSValue>) -> Result<JSValue, JSError> {
    let body = match args.first() {
        None | Some(JSValue::Undefined | JSValue::Null) => Bytes::new(),
        Some(value) => Bytes::from(stringify_value(value.clone())),
    };
    let init: ResponseInit = parse_init(args.get(1))?;
    let status = init.status.unwrap_or(200);
    if !(200..=599).contains(&status) {
        return Err(JSError::TypeError(format!("status {status} is outside 200-599")));
    }
    let headers = init_headers(init.headers.as_ref())?.unwrap_or_default();
    Ok(JSValue::from(response_object(FetchDone {
        status,
        status_text: init.status_text.unwrap_or_default(),
        ok: (200..300).contains(&status),
        headers,
        body,
        url: String::new(),
        error: None,
    })))
}

/// Build a `Response` instance from a completed transfer.
pub fn response_object(done: FetchDone) -> HostObject {
    let text = done.body_text();
    let base64 = done.body_base64();
    let stream_text = text.clone();

    HostObject::with_class("Response")
        .with_property("status", JSValue::Number(f64::from(done.status)))
        .with_property("statusText", JSValue::from(done.status_text))
        .with_property("ok", JSValue::Boolean(done.ok))
        .with_property("url", JSValue::from(done.url))
        .with_property("headers", JSValue::from(headers_object(done.headers)))
        .with_fn("text", HostFnKind::sync(move |_, _| Ok(JSValue::from(text.as_str()))))
        .with_fn(
            "bodyBase64",
            HostFnKind::sync(move |_, _| Ok(JSValue::from(base64.as_str()))),
        )
        .with_fn(
            "body",
            HostFnKind::sync(move |_, _| {
                let chunks: VecDeque<String> = if stream_text.is_empty() {
                    VecDeque::new()
                } else {
                    VecDeque::from([stream_text.clone()])
                };
                Ok(JSValue::from(readable_stream(chunks)))
            }),
        )
}

// =====================
// fetch
// =====================

/// `fetch(input, init?)`: start a transfer and return its pending handle.
fn fetch(context: &HostContext, args: Vec<JSValue>) -> Result<JSValue, JSError> {
    let parts = request_parts(context, &args)?;
    let request = FetchRequest {
        method: parts.method,
        url: parts.url,
        headers: parts.headers,
        body: parts.body.map(Bytes::from),
    };

    // Allocate id and insert Pending
    let id = {
        let mut reg = context.fetch_registry.lock().map_err(|_| poisoned())?;
        let id = reg.allocate_id();
        reg.entries.insert(id, FetchEntry::Pending);
        id
    };

    let reg_arc = Arc::clone(&context.fetch_registry);
    let policy = context.net_policy.clone();
    context.tokio_handle.spawn(async move {
        let done = perform(policy, request).await;
        if let Ok(mut reg) = reg_arc.lock() {
            reg.entries.insert(id, FetchEntry::Done(done));
        }
    });

    // The registry only tracks in-flight work; the handle keeps what settled.
    let poll_registry = Arc::clone(&context.fetch_registry);
    let settled: Arc<Mutex<Option<FetchDone>>> = Arc::new(Mutex::new(None));
    let poll = HostFnKind::sync(move |_, _| {
        let mut slot = settled.lock().map_err(|_| poisoned())?;
        if slot.is_none() {
            let mut reg = poll_registry.lock().map_err(|_| poisoned())?;
            match reg.entries.get(&id) {
                None => return Err(JSError::InternalError(format!("unknown fetch id {id}"))),
                Some(FetchEntry::Pending) => return Ok(JSValue::Null),
                Some(FetchEntry::Done(_)) => {
                    if let Some(FetchEntry::Done(done)) = reg.entries.remove(&id) {
                        *slot = Some(done);
                    }
                }
            }
        }
        slot.as_ref().map_or(Ok(JSValue::Null), settled_value)
    });

    Ok(JSValue::from(
        HostObject::with_class("PendingFetch")
            .with_property("id", JSValue::Number(id as f64))
            .with_fn("poll", poll),
    ))
}

/// What `poll()` reports once a transfer has finished.
fn settled_value(done: &FetchDone) -> Result<JSValue, JSError> {
    match &done.error {
        Some(error) => Err(JSError::TypeError(format!("Failed to fetch: {error}"))),
        None => Ok(JSValue::from(response_object(done.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::NetPolicy;

    fn runtime_and_context() -> (tokio::runtime::Runtime, HostContext) {
        runtime_with_policy(NetPolicy::default())
    }

    fn runtime_with_policy(policy: NetPolicy) -> (tokio::runtime::Runtime, HostContext) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let context = HostContext::new(runtime.handle().clone(), policy);
        (runtime, context)
    }

    fn registry_len(context: &HostContext) -> usize {
        context.fetch_registry.lock().unwrap().entries.len()
    }

    fn text(value: &JSValue) -> String {
        value.as_str().unwrap().to_owned()
    }

    #[test]
    fn headers_are_case_insensitive_and_combine() {
        let (_runtime, context) = runtime_and_context();
        let headers = construct_headers(&context, vec![JSValue::from(r#"{"Accept":"text/plain"}"#)])
            .unwrap();
        let headers = headers.as_object().unwrap();
        let get = |name: &str| headers.call_method(&context, "get", vec![JSValue::from(name)]).unwrap();

        assert_eq!(text(&get("ACCEPT")), "text/plain");
        headers
            .call_method(&context, "append", vec![JSValue::from("accept"), JSValue::from("text/html")])
            .unwrap();
        assert_eq!(text(&get("accept")), "text/plain, text/html");
        headers
            .call_method(&context, "set", vec![JSValue::from("Accept"), JSValue::from("*/*")])
            .unwrap();
        assert_eq!(text(&get("accept")), "*/*");
        headers
            .call_method(&context, "delete", vec![JSValue::from("accept")])
            .unwrap();
        assert!(matches!(get("accept"), JSValue::Null));
        let has = headers
            .call_method(&context, "has", vec![JSValue::from("accept")])
            .unwrap();
        assert_eq!(has.as_bool(), Some(false));
    }

    #[test]
    fn headers_copy_from_headers() {
        let (_runtime, context) = runtime_and_context();
        let original = construct_headers(&context, vec![JSValue::from(r#"[["x-a","1"]]"#)]).unwrap();
        let copy = construct_headers(&context, vec![original]).unwrap();
        let value = copy
            .as_object()
            .unwrap()
            .call_method(&context, "get", vec![JSValue::from("x-a")])
            .unwrap();
        assert_eq!(text(&value), "1");
    }

    #[test]
    fn request_applies_init() {
        let (_runtime, context) = runtime_and_context();
        let request = construct_request(
            &context,
            vec![
                JSValue::from("http://localhost/api"),
                JSValue::from(r#"{"method":"post","body":"payload","headers":{"X-Key":"v"}}"#),
            ],
        )
        .unwrap();
        let request = request.as_object().unwrap();
        assert_eq!(text(&request.get("method").unwrap()), "POST");
        assert_eq!(text(&request.get("body").unwrap()), "payload");
        assert_eq!(text(&request.get("url").unwrap()), "http://localhost/api");

        let copied = request_parts(&context, &[JSValue::Object(Arc::clone(request))]).unwrap();
        assert_eq!(copied.method, "POST");
        assert_eq!(copied.headers, vec![(String::from("x-key"), String::from("v"))]);
    }

    #[test]
    fn get_request_with_body_is_rejected() {
        let (_runtime, context) = runtime_and_context();
        let result = construct_request(
            &context,
            vec![JSValue::from("http://localhost/"), JSValue::from(r#"{"body":"x"}"#)],
        );
        assert!(matches!(result, Err(JSError::TypeError(_))));
    }

    #[test]
    fn response_defaults_and_body_access() {
        let (_runtime, context) = runtime_and_context();
        let response = construct_response(&context, vec![JSValue::from("hi")]).unwrap();
        let response = response.as_object().unwrap();
        assert_eq!(response.get("status").and_then(|value| value.as_number()), Some(200.0));
        assert_eq!(response.get("ok").and_then(|value| value.as_bool()), Some(true));
        assert_eq!(text(&response.call_method(&context, "text", Vec::new()).unwrap()), "hi");
        assert_eq!(
            text(&response.call_method(&context, "bodyBase64", Vec::new()).unwrap()),
            "aGk="
        );
    }

    #[test]
    fn response_rejects_bad_status() {
        let (_runtime, context) = runtime_and_context();
        let result = construct_response(&context, vec![JSValue::Null, JSValue::from(r#"{"status":42}"#)]);
        assert!(matches!(result, Err(JSError::TypeError(_))));
    }

    fn poll_until_settled(context: &HostContext, pending: &HostObject) -> Result<JSValue, JSError> {
        for _ in 0..200 {
            match pending.call_method(context, "poll", Vec::new()) {
                Ok(JSValue::Null) => std::thread::sleep(std::time::Duration::from_millis(10)),
                other => return other,
            }
        }
        Err(JSError::InternalError(String::from("fetch did not settle")))
    }

    #[test]
    fn fetch_reads_file_urls() {
        let (_runtime, context) = runtime_and_context();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, "hello world").unwrap();
        let url = url::Url::from_file_path(&path).unwrap();

        let pending = fetch(&context, vec![JSValue::from(url.to_string())]).unwrap();
        let response = poll_until_settled(&context, pending.as_object().unwrap()).unwrap();
        let response = response.as_object().unwrap();
        assert_eq!(text(&response.call_method(&context, "text", Vec::new()).unwrap()), "hello world");
    }

    #[test]
    fn strict_policy_rejects_remote_origin_on_poll() {
        let (_runtime, context) = runtime_with_policy(NetPolicy {
            strict: true,
            ..NetPolicy::default()
        });
        let pending = fetch(&context, vec![JSValue::from("https://example.com/")]).unwrap();
        let pending = pending.as_object().unwrap();
        let result = poll_until_settled(&context, pending);
        assert!(matches!(result, Err(JSError::TypeError(message)) if message.contains("Disallowed")));

        assert_eq!(registry_len(&context), 0);
        let again = pending.call_method(&context, "poll", Vec::new());
        assert!(matches!(again, Err(JSError::TypeError(message)) if message.contains("Disallowed")));
    }

    #[test]
    fn settled_fetches_leave_the_registry() {
        let (_runtime, context) = runtime_and_context();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.txt");
        std::fs::write(&path, "kept by the handle").unwrap();
        let url = url::Url::from_file_path(&path).unwrap().to_string();

        let handles: Vec<JSValue> = (0..20)
            .map(|_| fetch(&context, vec![JSValue::from(url.as_str())]).unwrap())
            .collect();
        for handle in &handles {
            poll_until_settled(&context, handle.as_object().unwrap()).unwrap();
        }
        assert_eq!(registry_len(&context), 0);

        let first = handles[0].as_object().unwrap();
        let response = first.call_method(&context, "poll", Vec::new()).unwrap();
        let response = response.as_object().unwrap();
        assert_eq!(
            text(&response.call_method(&context, "text", Vec::new()).unwrap()),
            "kept by the handle"
        );
    }

    #[test]
    fn fetch_rejects_invalid_urls_synchronously() {
        let (_runtime, context) = runtime_and_context();
        assert!(matches!(fetch(&context, vec![JSValue::from("not a url")]), Err(JSError::TypeError(_))));
    }
}
