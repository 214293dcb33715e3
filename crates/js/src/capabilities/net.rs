//! Transport behind the `fetch` capability: policy check, file and http
//! loaders, and the registry pending fetch handles poll.

use super::util::{apply_headers, collect_headers};
use crate::bindings::NetPolicy;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use reqwest::{Client, Method};
use url::Url;

use std::collections::HashMap;

/// A completed fetch, successful or not.
#[derive(Clone, Debug)]
pub struct FetchDone {
    pub status: u16,
    pub status_text: String,
    pub ok: bool,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub url: String,
    pub error: Option<String>,
}

impl FetchDone {
    /// A network-level failure for `url`.
    pub fn failed(url: String, error: String) -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            ok: false,
            headers: Vec::new(),
            body: Bytes::new(),
            url,
            error: Some(error),
        }
    }

    /// Response body as lossy UTF-8.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Response body as standard base64.
    pub fn body_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.body)
    }
}

#[derive(Clone, Debug)]
pub enum FetchEntry {
    Pending,
    Done(FetchDone),
}

/// Per-context table of in-flight and completed fetches.
#[derive(Debug, Default)]
pub struct FetchRegistry {
    pub next_id: u64,
    pub entries: HashMap<u64, FetchEntry>,
}

impl FetchRegistry {
    pub fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }
}

/// Outgoing request as assembled by `fetch`.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

/// Whether the policy lets `url` through. Files are always readable; a strict
/// policy narrows http(s) to loopback `http`.
pub fn is_allowed(policy: &NetPolicy, url: &Url) -> bool {
    match url.scheme() {
        "file" => true,
        "http" | "https" if !policy.strict => true,
        "http" => url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"),
        _ => false,
    }
}

/// Run a request to completion. Failures are folded into `FetchDone::error`.
pub async fn perform(policy: NetPolicy, request: FetchRequest) -> FetchDone {
    let url_final = request.url.to_string();
    if !is_allowed(&policy, &request.url) {
        return FetchDone::failed(url_final, String::from("Disallowed by policy"));
    }
    let outcome = match request.url.scheme() {
        "file" => fetch_file(&request.url, url_final.clone()).await,
        "http" | "https" => fetch_http(&policy.user_agent, request, url_final.clone()).await,
        scheme => Err(format!("Unsupported scheme: {scheme}")),
    };
    outcome.unwrap_or_else(|error| FetchDone::failed(url_final, error))
}

pub async fn fetch_file(parsed: &Url, url_final: String) -> Result<FetchDone, String> {
    let path = parsed
        .to_file_path()
        .map_err(|()| String::from("Invalid file path"))?;
    let data = tokio::fs::read(path)
        .await
        .map_err(|_| String::from("File read error"))?;
    Ok(FetchDone {
        status: 200,
        status_text: String::from("OK"),
        ok: true,
        headers: Vec::new(),
        body: Bytes::from(data),
        url: url_final,
        error: None,
    })
}

pub async fn fetch_http(
    user_agent: &str,
    request: FetchRequest,
    url_final: String,
) -> Result<FetchDone, String> {
    let client = Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|_| String::from("Client error"))?;
    let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
        .unwrap_or(Method::GET);
    let mut req = apply_headers(client.request(method, request.url), &request.headers);
    if let Some(body) = request.body {
        req = req.body(body);
    }

    let resp = req
        .send()
        .await
        .map_err(|_| String::from("Network error"))?;
    let status = resp.status().as_u16();
    let status_text = resp.status().canonical_reason().unwrap_or("").to_owned();
    let headers = collect_headers(&resp);
    let body = resp
        .bytes()
        .await
        .map_err(|_| String::from("Read body error"))?;
    Ok(FetchDone {
        status,
        status_text,
        ok: (200..300).contains(&status),
        headers,
        body,
        url: url_final,
        error: None,
    })
}
