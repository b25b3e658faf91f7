//! Decoding of engine-produced responses.
//!
//! # Design
//! The engine is an external component, so nothing it returns is trusted:
//! any pointer may be null and any string may be malformed. `decode`
//! reports problems through `DecodeFailure` and never produces a partially
//! filled `HttpResponse`.
//!
//! Decoding only borrows the native memory. Releasing it is the job of
//! `OwnedResponse`, which calls the engine's free function exactly once when
//! dropped, whichever way the decode went.

use serde::{Deserialize, Serialize};

use crate::cstr::read_utf8;
use crate::error::{DecodeFailure, ResponseField};
use crate::headers::{self, HeaderMap};
use crate::layout::{FreeFn, NativeResponse};

/// A decoded response.
///
/// `headers` is keyed by lower-cased header name. A `None` value means the
/// engine reported the header without a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub body: Option<String>,
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(default)]
    pub headers: HeaderMap<Option<String>>,
}

impl HttpResponse {
    /// Case-insensitive header lookup; `None` for missing or value-less headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.as_deref())
    }
}

/// Read a native response into host values.
///
/// # Safety
/// `response` must be null or point to a `NativeResponse` laid out as the
/// engine documents, with every non-null string NUL-terminated and the
/// header table valid per [`headers::decode`].
pub unsafe fn decode(response: *const NativeResponse) -> Result<HttpResponse, DecodeFailure> {
    if response.is_null() {
        return Err(DecodeFailure::NullResponse);
    }
    let native = unsafe { &*response };

    let body = unsafe { read_utf8(native.body, ResponseField::Body) }?;
    let content_type = unsafe { read_utf8(native.content_type, ResponseField::ContentType) }?;
    let headers = unsafe { headers::decode(native.headers) }?;

    Ok(HttpResponse {
        body,
        status: native.status,
        content_type,
        headers,
    })
}

/// Scoped owner of an engine response pointer.
///
/// Dropping it frees the response through the engine, once, unless the
/// pointer is null.
#[derive(Debug)]
pub struct OwnedResponse {
    ptr: *mut NativeResponse,
    free: FreeFn,
}

impl OwnedResponse {
    /// Take ownership of `ptr`.
    ///
    /// # Safety
    /// `ptr` must be null or a response produced by the engine `free` belongs
    /// to, not yet freed and not owned by anything else.
    pub unsafe fn new(ptr: *mut NativeResponse, free: FreeFn) -> Self {
        Self { ptr, free }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub fn decode(&self) -> Result<HttpResponse, DecodeFailure> {
        // The pointer is owned and not yet freed for as long as `self` lives.
        unsafe { decode(self.ptr) }
    }
}

impl Drop for OwnedResponse {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.free)(self.ptr) };
        }
    }
}
