//! `#[repr(C)]` response types and their allocation/free pair.
//!
//! # Design
//! These mirror the engine header (`HttpHeaderItem`, `HttpHeaders`,
//! `HttpResponse`) without depending on any host crate. `StubResponse` is the
//! Rust-side description of a reply; `into_raw` turns it into heap memory the
//! host borrows, and `free_raw` releases exactly what `into_raw` allocated.
//! Byte strings are kept as bytes so a script can hand the host invalid UTF-8.

use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

/// A single header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeaderItem {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// A counted array of headers.
#[repr(C)]
pub struct FfiHeaders {
    pub items: *mut FfiHeaderItem,
    pub count: usize,
}

/// An HTTP response as C-compatible plain data.
#[repr(C)]
pub struct FfiHttpResponse {
    pub body: *mut c_char,
    pub status: u16,
    pub content_type: *mut c_char,
    pub headers: *mut FfiHeaders,
}

/// A header as raw bytes; either side may be missing.
pub type RawHeader = (Option<Vec<u8>>, Option<Vec<u8>>);

/// Description of a reply before it is laid out for C.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubResponse {
    pub status: u16,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<Vec<u8>>,
    /// `None` leaves the header table pointer null.
    pub headers: Option<Vec<RawHeader>>,
}

impl StubResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((Some(key.into()), Some(value.into())));
        self
    }

    pub fn raw_header(mut self, key: Option<Vec<u8>>, value: Option<Vec<u8>>) -> Self {
        self.headers.get_or_insert_with(Vec::new).push((key, value));
        self
    }

    /// Lay the response out on the heap. Free with [`free_raw`].
    pub(crate) fn into_raw(self) -> *mut FfiHttpResponse {
        let headers = match self.headers {
            None => ptr::null_mut(),
            Some(list) => {
                let count = list.len();
                let items = if list.is_empty() {
                    ptr::null_mut()
                } else {
                    let items: Vec<FfiHeaderItem> = list
                        .into_iter()
                        .map(|(k, v)| FfiHeaderItem {
                            key: raw_c_string(k),
                            value: raw_c_string(v),
                        })
                        .collect();
                    Box::into_raw(items.into_boxed_slice()) as *mut FfiHeaderItem
                };
                Box::into_raw(Box::new(FfiHeaders { items, count }))
            }
        };

        Box::into_raw(Box::new(FfiHttpResponse {
            body: raw_c_string(self.body),
            status: self.status,
            content_type: raw_c_string(self.content_type),
            headers,
        }))
    }
}

/// Heap C string for `bytes`, truncated at the first NUL. Null for `None`.
fn raw_c_string(bytes: Option<Vec<u8>>) -> *mut c_char {
    match bytes {
        None => ptr::null_mut(),
        Some(mut bytes) => {
            if let Some(nul) = bytes.iter().position(|b| *b == 0) {
                bytes.truncate(nul);
            }
            CString::new(bytes).unwrap_or_default().into_raw()
        }
    }
}

fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Release a response allocated by [`StubResponse::into_raw`].
///
/// # Safety
/// `resp` must come from `into_raw` and not have been freed.
pub(crate) unsafe fn free_raw(resp: *mut FfiHttpResponse) {
    let resp = unsafe { Box::from_raw(resp) };
    free_c_string(resp.body);
    free_c_string(resp.content_type);

    if resp.headers.is_null() {
        return;
    }
    let headers = unsafe { Box::from_raw(resp.headers) };
    if !headers.items.is_null() && headers.count > 0 {
        let slice = ptr::slice_from_raw_parts_mut(headers.items, headers.count);
        let items = unsafe { Box::from_raw(slice) };
        for item in items.iter() {
            free_c_string(item.key);
            free_c_string(item.value);
        }
    }
}
