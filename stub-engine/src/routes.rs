//! URL routing for the stub engine.
//!
//! Built-in routes live under `stub://`; any other URL is answered from the
//! script table, falling back to a 404.

use std::sync::LazyLock;
use std::time::Duration;

use dashmap::DashMap;

use crate::types::{RawHeader, StubResponse};

/// `None` means "reply with a null response pointer".
static SCRIPTS: LazyLock<DashMap<String, Option<StubResponse>>> = LazyLock::new(DashMap::new);

/// Answer `url` with `response` until replaced.
pub fn script(url: impl Into<String>, response: StubResponse) {
    SCRIPTS.insert(url.into(), Some(response));
}

/// Answer `url` with a null response pointer.
pub fn script_null(url: impl Into<String>) {
    SCRIPTS.insert(url.into(), None);
}

/// A request as the engine received it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Call {
    pub method: String,
    pub url: String,
    pub headers: Option<Vec<RawHeader>>,
    pub body: Option<Vec<u8>>,
}

pub(crate) fn is_reject(url: &str) -> bool {
    url == "stub://reject"
}

/// Milliseconds to wait before answering `url`, if it is a delay route.
pub(crate) fn delay(url: &str) -> Option<Duration> {
    let rest = url.strip_prefix("stub://delay/")?;
    let (ms, _) = rest.split_once('/')?;
    ms.parse().ok().map(Duration::from_millis)
}

/// Produce the reply for `call`. `None` is a null response.
pub(crate) fn route(call: &Call) -> Option<StubResponse> {
    let url = call.url.as_str();

    if url == "stub://echo" {
        return Some(echo(call));
    }
    if url == "stub://null" || is_reject(url) {
        return None;
    }
    if let Some(code) = url.strip_prefix("stub://status/") {
        return Some(match code.parse::<u16>() {
            Ok(status) => StubResponse::new(status).body(format!("status {status}")),
            Err(_) => StubResponse::new(400).body(format!("bad status code: {code}")),
        });
    }
    if let Some(rest) = url.strip_prefix("stub://delay/") {
        if let Some((_, tag)) = rest.split_once('/') {
            return Some(StubResponse::new(200).body(tag).header("x-tag", tag));
        }
    }

    match SCRIPTS.get(url) {
        Some(scripted) => scripted.value().clone(),
        None => Some(StubResponse::new(404).body(format!("no route for {} {url}", call.method))),
    }
}

fn echo(call: &Call) -> StubResponse {
    let content_type = call.headers.iter().flatten().find_map(|(key, value)| match key {
        Some(key) if key.eq_ignore_ascii_case(b"content-type") => value.clone(),
        _ => None,
    });

    StubResponse {
        status: 200,
        body: call.body.clone(),
        content_type,
        headers: call.headers.clone(),
    }
}
