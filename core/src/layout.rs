//! Fixed byte layouts exchanged with the native engine.
//!
//! # Design
//! The structs are `#[repr(C)]` mirrors of the engine's C header. Decoding
//! goes through these field definitions rather than hand-computed offsets;
//! the offset constants exist so the layout is checked at compile time
//! against the documented byte positions on 64-bit targets.
//!
//! Pointers in a [`NativeResponse`] are owned by the engine. Pointers in a
//! [`NativeHeaderTable`] built by this crate are owned by the host.

use std::ffi::c_void;
use std::os::raw::c_char;

/// A single header as a pair of NUL-terminated UTF-8 strings.
///
/// Either pointer may be null in engine-produced tables.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeHeaderItem {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// A counted array of [`NativeHeaderItem`]s.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeHeaderTable {
    pub items: *const NativeHeaderItem,
    pub count: usize,
}

/// Response produced by the engine and released with its free entry point.
#[repr(C)]
#[derive(Debug)]
pub struct NativeResponse {
    pub body: *const c_char,
    pub status: u16,
    pub content_type: *const c_char,
    pub headers: *const NativeHeaderTable,
}

pub const RESPONSE_BODY_OFFSET: usize = 0x00;
pub const RESPONSE_STATUS_OFFSET: usize = 0x08;
pub const RESPONSE_CONTENT_TYPE_OFFSET: usize = 0x10;
pub const RESPONSE_HEADERS_OFFSET: usize = 0x18;

pub const TABLE_ITEMS_OFFSET: usize = 0x00;
pub const TABLE_COUNT_OFFSET: usize = 0x08;

pub const ITEM_KEY_OFFSET: usize = 0x00;
pub const ITEM_VALUE_OFFSET: usize = 0x08;

/// Distance between consecutive items in a header array.
pub const HEADER_ITEM_STRIDE: usize = 2 * std::mem::size_of::<*const c_char>();

#[cfg(target_pointer_width = "64")]
const _: () = {
    use std::mem::{offset_of, size_of};

    assert!(offset_of!(NativeResponse, body) == RESPONSE_BODY_OFFSET);
    assert!(offset_of!(NativeResponse, status) == RESPONSE_STATUS_OFFSET);
    assert!(offset_of!(NativeResponse, content_type) == RESPONSE_CONTENT_TYPE_OFFSET);
    assert!(offset_of!(NativeResponse, headers) == RESPONSE_HEADERS_OFFSET);
    assert!(size_of::<NativeResponse>() == 0x20);

    assert!(offset_of!(NativeHeaderTable, items) == TABLE_ITEMS_OFFSET);
    assert!(offset_of!(NativeHeaderTable, count) == TABLE_COUNT_OFFSET);
    assert!(size_of::<NativeHeaderTable>() == 0x10);

    assert!(offset_of!(NativeHeaderItem, key) == ITEM_KEY_OFFSET);
    assert!(offset_of!(NativeHeaderItem, value) == ITEM_VALUE_OFFSET);
    assert!(size_of::<NativeHeaderItem>() == HEADER_ITEM_STRIDE);
    assert!(HEADER_ITEM_STRIDE == 0x10);
};

/// `HttpResponse* httpc(const char*, const char*, const HttpHeaders*, const char*)`
pub type RequestFn = unsafe extern "C" fn(
    method: *const c_char,
    url: *const c_char,
    headers: *const NativeHeaderTable,
    body: *const c_char,
) -> *mut NativeResponse;

/// Completion callback handed to the asynchronous entry point.
pub type CompletionFn = unsafe extern "C" fn(response: *mut NativeResponse, context: *mut c_void);

/// `void httpc_async(HttpCallback, void*, const char*, const char*, const HttpHeaders*, const char*)`
///
/// An engine refuses a submission by setting its last error (see
/// [`LastErrorFn`]) and returning without scheduling. The unwinding ABI only
/// lets a Rust engine linked into the host's own binary panic instead; an
/// unwind out of a separately loaded library aborts the process.
pub type RequestAsyncFn = unsafe extern "C-unwind" fn(
    callback: CompletionFn,
    context: *mut c_void,
    method: *const c_char,
    url: *const c_char,
    headers: *const NativeHeaderTable,
    body: *const c_char,
);

/// `void httpc_free(HttpResponse*)`
pub type FreeFn = unsafe extern "C" fn(response: *mut NativeResponse);

/// `const char* httpc_last_error(void)`
///
/// Thread-local refusal reason of the last `httpc_async` call made on this
/// thread, or null if that call was accepted. The string belongs to the
/// engine and is valid until the thread's next engine call.
pub type LastErrorFn = unsafe extern "C" fn() -> *const c_char;
