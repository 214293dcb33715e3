use reqwest::RequestBuilder;
use reqwest::Response;
use serde_json::Value;

/// Parse header init JSON: either an object of name/value strings or an
/// array of `[name, value]` pairs. Non-string entries are skipped.
pub fn parse_header_json(headers_json: &str) -> Option<Vec<(String, String)>> {
    let val = serde_json::from_str::<Value>(headers_json).ok()?;
    header_pairs(&val)
}

/// Same as [`parse_header_json`] for an already parsed value.
pub fn header_pairs(val: &Value) -> Option<Vec<(String, String)>> {
    if let Some(map) = val.as_object() {
        return Some(
            map.iter()
                .filter_map(|(name, value)| value.as_str().map(|text| (name.clone(), text.to_owned())))
                .collect(),
        );
    }
    let arr = val.as_array()?;
    let mut pairs = Vec::with_capacity(arr.len());
    for pair in arr {
        let Some(name) = pair.get(0).and_then(Value::as_str) else {
            continue;
        };
        let Some(value) = pair.get(1).and_then(Value::as_str) else {
            continue;
        };
        pairs.push((name.to_owned(), value.to_owned()));
    }
    Some(pairs)
}

#[inline]
pub fn apply_headers(mut req: RequestBuilder, headers: &[(String, String)]) -> RequestBuilder {
    for (name, value) in headers {
        req = req.header(name, value);
    }
    req
}

#[inline]
pub fn collect_headers(resp: &Response) -> Vec<(String, String)> {
    resp.headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|text| (name.to_string(), text.to_owned()))
        })
        .collect()
}
