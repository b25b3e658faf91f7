//! Host-side request values and their encoding into native call arguments.
//!
//! # Design
//! `headers` and `body` each accept three shapes: absent, host data to be
//! copied into fresh native buffers, or a raw handle to memory the caller
//! already prepared. The shapes are tagged variants (`HeadersArg`,
//! `BodyArg`) and `encode` dispatches on the tag.
//!
//! `encode` never frees anything. The returned `EncodedRequest` owns every
//! buffer it allocated and the client decides when it is dropped: after the
//! synchronous call returns, or after the asynchronous completion fires.

use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr::{self, NonNull};

use crate::config::EmptyHeaders;
use crate::cstr::to_c_string;
use crate::error::{EncodeError, RequestField};
use crate::headers::{self, EncodedHeaders, HeaderMap};
use crate::layout::NativeHeaderTable;

/// Caller-owned native header table, passed to the engine unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeaderTable(NonNull<NativeHeaderTable>);

// The caller of `from_ptr` vouches for cross-thread validity.
unsafe impl Send for RawHeaderTable {}
unsafe impl Sync for RawHeaderTable {}

impl RawHeaderTable {
    /// Wrap a table prepared outside this crate. Returns `None` for null.
    ///
    /// # Safety
    /// The table and everything it points to must stay valid, and unmodified,
    /// until every request it is passed to has returned or completed. The
    /// engine may read it from any thread.
    pub unsafe fn from_ptr(ptr: *const NativeHeaderTable) -> Option<Self> {
        NonNull::new(ptr as *mut NativeHeaderTable).map(Self)
    }

    pub fn as_ptr(self) -> *const NativeHeaderTable {
        self.0.as_ptr()
    }
}

/// Caller-owned NUL-terminated body buffer, passed to the engine unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBody(NonNull<c_char>);

unsafe impl Send for RawBody {}
unsafe impl Sync for RawBody {}

impl RawBody {
    /// Wrap a C string prepared outside this crate. Returns `None` for null.
    ///
    /// # Safety
    /// Same contract as [`RawHeaderTable::from_ptr`]; the buffer must be
    /// NUL-terminated.
    pub unsafe fn from_ptr(ptr: *const c_char) -> Option<Self> {
        NonNull::new(ptr as *mut c_char).map(Self)
    }

    pub fn as_ptr(self) -> *const c_char {
        self.0.as_ptr()
    }
}

/// The `headers` argument of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeadersArg {
    #[default]
    Absent,
    Map(HeaderMap<String>),
    Raw(RawHeaderTable),
}

impl From<()> for HeadersArg {
    fn from(_: ()) -> Self {
        HeadersArg::Absent
    }
}

impl From<HeaderMap<String>> for HeadersArg {
    fn from(map: HeaderMap<String>) -> Self {
        HeadersArg::Map(map)
    }
}

impl From<Option<HeaderMap<String>>> for HeadersArg {
    fn from(map: Option<HeaderMap<String>>) -> Self {
        map.map_or(HeadersArg::Absent, HeadersArg::Map)
    }
}

impl From<RawHeaderTable> for HeadersArg {
    fn from(raw: RawHeaderTable) -> Self {
        HeadersArg::Raw(raw)
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for HeadersArg {
    fn from(pairs: [(K, V); N]) -> Self {
        HeadersArg::Map(pairs.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// The `body` argument of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodyArg {
    #[default]
    Absent,
    Bytes(Vec<u8>),
    Raw(RawBody),
}

impl From<()> for BodyArg {
    fn from(_: ()) -> Self {
        BodyArg::Absent
    }
}

impl From<&str> for BodyArg {
    fn from(s: &str) -> Self {
        BodyArg::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for BodyArg {
    fn from(s: String) -> Self {
        BodyArg::Bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for BodyArg {
    fn from(bytes: Vec<u8>) -> Self {
        BodyArg::Bytes(bytes)
    }
}

impl From<&[u8]> for BodyArg {
    fn from(bytes: &[u8]) -> Self {
        BodyArg::Bytes(bytes.to_vec())
    }
}

impl From<RawBody> for BodyArg {
    fn from(raw: RawBody) -> Self {
        BodyArg::Raw(raw)
    }
}

impl<T: Into<BodyArg>> From<Option<T>> for BodyArg {
    fn from(body: Option<T>) -> Self {
        body.map_or(BodyArg::Absent, Into::into)
    }
}

/// An HTTP request described as plain host data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HeadersArg,
    pub body: BodyArg,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeadersArg::Absent,
            body: BodyArg::Absent,
        }
    }

    /// Add one header. Replaces a raw header handle if one was set.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = match self.headers {
            HeadersArg::Map(map) => map,
            HeadersArg::Absent | HeadersArg::Raw(_) => HeaderMap::new(),
        };
        map.insert(key, value.into());
        self.headers = HeadersArg::Map(map);
        self
    }

    pub fn headers(mut self, headers: impl Into<HeadersArg>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn body(mut self, body: impl Into<BodyArg>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug)]
enum HeadersBuf {
    Null,
    Owned(EncodedHeaders),
    Borrowed(RawHeaderTable),
}

#[derive(Debug)]
enum BodyBuf {
    Null,
    Owned(CString),
    Borrowed(RawBody),
}

/// The four native call arguments plus ownership of every buffer behind them.
///
/// Pointers handed out by the accessors stay valid while this value lives.
#[derive(Debug)]
pub struct EncodedRequest {
    method: CString,
    url: CString,
    headers: HeadersBuf,
    body: BodyBuf,
}

impl EncodedRequest {
    pub fn method_ptr(&self) -> *const c_char {
        self.method.as_ptr()
    }

    pub fn url_ptr(&self) -> *const c_char {
        self.url.as_ptr()
    }

    pub fn headers_ptr(&self) -> *const NativeHeaderTable {
        match &self.headers {
            HeadersBuf::Null => ptr::null(),
            HeadersBuf::Owned(table) => table.as_ptr(),
            HeadersBuf::Borrowed(raw) => raw.as_ptr(),
        }
    }

    pub fn body_ptr(&self) -> *const c_char {
        match &self.body {
            BodyBuf::Null => ptr::null(),
            BodyBuf::Owned(body) => body.as_ptr(),
            BodyBuf::Borrowed(raw) => raw.as_ptr(),
        }
    }
}

/// Build the native arguments for `request`.
pub fn encode(request: &HttpRequest, empty: EmptyHeaders) -> Result<EncodedRequest, EncodeError> {
    let method = to_c_string(request.method.as_str(), RequestField::Method)?;
    let url = to_c_string(request.url.as_str(), RequestField::Url)?;

    let headers = match &request.headers {
        HeadersArg::Absent => HeadersBuf::Null,
        HeadersArg::Map(map) => headers::encode(map, empty)?.map_or(HeadersBuf::Null, HeadersBuf::Owned),
        HeadersArg::Raw(raw) => HeadersBuf::Borrowed(*raw),
    };

    let body = match &request.body {
        BodyArg::Absent => BodyBuf::Null,
        BodyArg::Bytes(bytes) => BodyBuf::Owned(to_c_string(bytes.as_slice(), RequestField::Body)?),
        BodyArg::Raw(raw) => BodyBuf::Borrowed(*raw),
    };

    Ok(EncodedRequest { method, url, headers, body })
}
